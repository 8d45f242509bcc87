use std::path::PathBuf;

use blobsweep_config::ConfigError;
use blobsweep_types::BlobRef;

/// Errors from storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Contents do not hash to the claimed digest (data corruption).
    #[error("hash mismatch for {claimed}: contents hash to {computed}")]
    HashMismatch { claimed: BlobRef, computed: BlobRef },

    /// Contents are not as long as the ref claims.
    #[error("size mismatch for {claimed}: claimed {} bytes, read {actual}", .claimed.size())]
    SizeMismatch { claimed: BlobRef, actual: u64 },

    /// The blob's bytes could not be read back at all.
    #[error("blob {blob} is unreadable: {reason}")]
    Unreadable { blob: BlobRef, reason: String },

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A backend root directory does not exist or is not a directory.
    #[error("storage directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    /// The backend's `handlerArgs` are malformed.
    #[error("invalid handler arguments: {0}")]
    InvalidArgs(#[from] ConfigError),

    /// A dependency of the backend could not be resolved.
    #[error(transparent)]
    Resolve(Box<ResolveError>),

    /// A backend that must stream (e.g. a packing layer's child) cannot.
    #[error("storage for {prefix} ({handler}) does not support streaming")]
    NotStreamable { prefix: String, handler: String },

    /// A pack file is structurally broken.
    #[error("corrupt pack {pack}: {reason}")]
    CorruptPack { pack: BlobRef, reason: String },

    /// A resume token was not produced by this backend.
    #[error("invalid resume token {0:?}")]
    BadToken(String),

    /// Streaming stopped because it was cancelled or the receiver went away.
    #[error("streaming cancelled")]
    Cancelled,

    /// Streaming failed for a backend-internal reason.
    #[error("stream failed: {0}")]
    Stream(String),
}

impl From<ResolveError> for StoreError {
    fn from(err: ResolveError) -> Self {
        Self::Resolve(Box::new(err))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from resolving a prefix to a storage instance.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Nothing is configured under the prefix.
    #[error("no storage configuration found for prefix {prefix:?}")]
    NoConfig { prefix: String },

    /// The configured handler type has no registered constructor.
    #[error("unknown storage type {handler:?} configured for prefix {prefix:?}")]
    UnknownHandler { prefix: String, handler: String },

    /// The backend's constructor failed.
    #[error("creating {handler:?} storage for prefix {prefix:?}: {source}")]
    Construction {
        prefix: String,
        handler: String,
        #[source]
        source: Box<StoreError>,
    },

    /// Construction of a prefix needs the prefix itself.
    #[error("storage prefixes depend on each other in a cycle: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// The provider deliberately does not implement this operation.
    #[error("the storage loader does not support {operation}")]
    Unsupported { operation: &'static str },
}
