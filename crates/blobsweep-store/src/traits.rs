use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use blobsweep_types::BlobRef;

use crate::blob::{Blob, BlobAndToken};
use crate::error::{ResolveError, StoreResult};

/// A configured blob storage backend.
///
/// Implementations must satisfy these invariants:
/// - Blobs are never modified by reading them.
/// - Concurrent reads are always safe.
/// - All I/O errors are propagated, never silently ignored. A blob whose
///   bytes cannot be read is still returned, as [`Blob::unreadable`].
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// The handler type this instance was built from (e.g. `filesystem`).
    fn handler_type(&self) -> &str;

    /// Read one blob by ref. Returns `Ok(None)` if it is not stored.
    async fn fetch(&self, blob_ref: &BlobRef) -> StoreResult<Option<Blob>>;

    /// This storage's fast bulk-streaming capability, if it has one.
    fn into_streamer(self: Arc<Self>) -> Option<Arc<dyn BlobStreamer>> {
        None
    }
}

/// Streams every blob of a storage, in a backend-defined order.
#[async_trait]
pub trait BlobStreamer: Send + Sync {
    /// Send every blob after `token` (all blobs if empty) to `dest`.
    ///
    /// Each item carries the token that resumes right after it. `dest` is
    /// dropped when this returns, which is how the receiver learns the
    /// stream ended. Stops with [`StoreError::Cancelled`] when `cancel`
    /// fires or the receiver is gone.
    ///
    /// [`StoreError::Cancelled`]: crate::StoreError::Cancelled
    async fn stream_blobs(
        &self,
        cancel: CancellationToken,
        dest: mpsc::Sender<BlobAndToken>,
        token: &str,
    ) -> StoreResult<()>;
}

/// What a backend constructor may ask of whoever is building it.
///
/// Construction is recursive: a layered backend resolves the prefixes it
/// wraps through [`DependencyProvider::resolve_storage`] while it is itself
/// being constructed.
pub trait DependencyProvider: Send + Sync {
    /// The storage configured for another prefix, constructing it if needed.
    fn resolve_storage(&self, prefix: &str) -> Result<Arc<dyn Storage>, ResolveError>;

    /// Make an instance available under a prefix.
    fn register_storage(&self, prefix: &str, storage: Arc<dyn Storage>);

    /// Base URL the handlers are served under.
    fn base_url(&self) -> &str;

    /// Prefix of the handler currently being constructed.
    fn my_prefix(&self) -> &str;

    /// The handler type configured for a prefix.
    fn handler_type(&self, prefix: &str) -> Option<String>;

    /// The first prefix serving the given handler type.
    fn find_handler_by_type(
        &self,
        handler_type: &str,
    ) -> Result<(String, Arc<dyn Storage>), ResolveError>;

    /// Every configured prefix with its handler type.
    fn all_handlers(&self) -> Result<BTreeMap<String, String>, ResolveError>;
}
