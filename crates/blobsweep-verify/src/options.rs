/// Tunables for a verification run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Prefix whose storage is verified.
    pub entry_prefix: String,
    /// Capacity of the producer-to-consumer channel. Zero is treated as one.
    pub channel_capacity: usize,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            entry_prefix: "/bs/".to_string(),
            channel_capacity: 64,
        }
    }
}
