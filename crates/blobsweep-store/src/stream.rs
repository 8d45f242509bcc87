use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::blob::BlobAndToken;
use crate::error::{StoreError, StoreResult};

/// Send one streamed item, giving up as soon as `cancel` fires.
///
/// Fails with [`StoreError::Cancelled`] if cancelled or if the receiver has
/// been dropped. Producers should return that error as-is.
pub async fn emit(
    cancel: &CancellationToken,
    dest: &mpsc::Sender<BlobAndToken>,
    item: BlobAndToken,
) -> StoreResult<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        sent = dest.send(item) => sent.map_err(|_| StoreError::Cancelled),
    }
}

/// Blocking form of [`emit`], for producers running on a blocking thread.
pub fn emit_blocking(
    cancel: &CancellationToken,
    dest: &mpsc::Sender<BlobAndToken>,
    item: BlobAndToken,
) -> StoreResult<()> {
    if cancel.is_cancelled() {
        return Err(StoreError::Cancelled);
    }
    dest.blocking_send(item).map_err(|_| StoreError::Cancelled)
}
