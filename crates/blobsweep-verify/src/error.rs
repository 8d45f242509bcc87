use blobsweep_config::ConfigError;
use blobsweep_store::{ResolveError, StoreError};

/// Errors that end a verification run with a tool failure.
///
/// Corrupt blobs are not errors. They are counted in the
/// [`Tally`](crate::Tally).
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The configuration could not be translated.
    #[error("unrecognized server config: {0}")]
    Config(#[from] ConfigError),

    /// The entry-point prefix is not configured.
    #[error("the server config has no {prefix:?} storage prefix")]
    MissingEntryPoint { prefix: String },

    /// The entry-point storage could not be built.
    #[error("failed to load blob storage: {0}")]
    Resolve(#[from] ResolveError),

    /// The entry-point storage cannot stream its blobs.
    #[error("the {handler:?} storage does not support streaming its blobs")]
    Unsupported { handler: String },

    /// The storage failed while streaming.
    #[error("error while streaming blobs: {0}")]
    Stream(#[source] StoreError),

    /// The streaming task died without reporting an error.
    #[error("blob producer task failed: {0}")]
    ProducerFailed(String),
}

/// Result alias for verification operations.
pub type VerifyResult<T> = Result<T, VerifyError>;
