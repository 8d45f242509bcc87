use blobsweep_types::BlobRef;

/// Running count of verified blobs.
///
/// Owned by the consumer loop; only the refs of invalid blobs are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub valid: u64,
    pub invalid: u64,
    pub invalid_refs: Vec<BlobRef>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_valid(&mut self) {
        self.valid += 1;
    }

    pub fn record_invalid(&mut self, blob_ref: BlobRef) {
        self.invalid += 1;
        self.invalid_refs.push(blob_ref);
    }

    /// Blobs seen so far.
    pub fn total(&self) -> u64 {
        self.valid + self.invalid
    }

    /// Returns `true` if no invalid blob has been seen.
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}
