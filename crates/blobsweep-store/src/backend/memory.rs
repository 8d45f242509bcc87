use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use blobsweep_config::ConfigObj;
use blobsweep_crypto::ContentHasher;
use blobsweep_types::BlobRef;

use crate::blob::{Blob, BlobAndToken};
use crate::error::StoreResult;
use crate::stream::emit;
use crate::traits::{BlobStreamer, Storage};

/// In-memory blob storage.
///
/// Intended for tests and embedding. Blobs are kept in ref order behind a
/// `RwLock`, and streaming walks a snapshot taken when the stream starts.
/// Resume tokens are ref strings.
pub struct MemoryStorage {
    blobs: RwLock<BTreeMap<BlobRef, Bytes>>,
}

impl MemoryStorage {
    /// Create a new empty storage.
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Build from `handlerArgs`. The memory backend takes no arguments.
    pub fn from_config(args: ConfigObj) -> StoreResult<Self> {
        args.validate()?;
        Ok(Self::new())
    }

    /// Store bytes under their correct ref.
    pub fn insert(&self, data: impl Into<Bytes>) -> BlobRef {
        let data = data.into();
        let blob_ref = ContentHasher::BLOB.blob_ref(&data);
        self.blobs.write().insert(blob_ref, data);
        blob_ref
    }

    /// Store bytes under an arbitrary ref, without checking that they match.
    pub fn insert_unchecked(&self, blob_ref: BlobRef, data: impl Into<Bytes>) {
        self.blobs.write().insert(blob_ref, data.into());
    }

    /// Number of blobs stored.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.blobs.read().values().map(|b| b.len() as u64).sum()
    }

    /// All stored refs, in order.
    pub fn refs(&self) -> Vec<BlobRef> {
        self.blobs.read().keys().copied().collect()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("blob_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn handler_type(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, blob_ref: &BlobRef) -> StoreResult<Option<Blob>> {
        Ok(self
            .blobs
            .read()
            .get(blob_ref)
            .map(|data| Blob::new(*blob_ref, data.clone())))
    }

    fn into_streamer(self: Arc<Self>) -> Option<Arc<dyn BlobStreamer>> {
        Some(self)
    }
}

#[async_trait]
impl BlobStreamer for MemoryStorage {
    async fn stream_blobs(
        &self,
        cancel: CancellationToken,
        dest: mpsc::Sender<BlobAndToken>,
        token: &str,
    ) -> StoreResult<()> {
        let snapshot: Vec<(BlobRef, Bytes)> = self
            .blobs
            .read()
            .iter()
            .map(|(r, b)| (*r, b.clone()))
            .collect();

        for (blob_ref, data) in snapshot {
            let next = blob_ref.to_string();
            if next.as_str() <= token {
                continue;
            }
            emit(&cancel, &dest, BlobAndToken::new(Blob::new(blob_ref, data), next)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    async fn collect(storage: &MemoryStorage, token: &str) -> Vec<BlobAndToken> {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let producer = storage.stream_blobs(cancel, tx, token);
        let consumer = async {
            let mut out = Vec::new();
            while let Some(item) = rx.recv().await {
                out.push(item);
            }
            out
        };
        let (result, items) = tokio::join!(producer, consumer);
        result.unwrap();
        items
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn fetch_returns_stored_bytes() {
        let storage = MemoryStorage::new();
        let r = storage.insert(&b"hello"[..]);
        let blob = storage.fetch(&r).await.unwrap().unwrap();
        assert_eq!(blob.contents().unwrap().as_ref(), b"hello");
        blob.valid_contents().unwrap();
    }

    #[tokio::test]
    async fn fetch_missing_is_none() {
        let storage = MemoryStorage::new();
        let r = ContentHasher::BLOB.blob_ref(b"absent");
        assert!(storage.fetch(&r).await.unwrap().is_none());
    }

    #[test]
    fn counts_and_sizes() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());
        storage.insert(&b"abc"[..]);
        storage.insert(&b"defgh"[..]);
        storage.insert(&b"abc"[..]);
        assert_eq!(storage.len(), 2);
        assert_eq!(storage.total_bytes(), 8);
    }

    #[test]
    fn from_config_rejects_arguments() {
        let args = serde_json::json!({"path": "/tmp"});
        let obj = ConfigObj::from_value("handlerArgs", args).unwrap();
        assert!(matches!(
            MemoryStorage::from_config(obj),
            Err(StoreError::InvalidArgs(_))
        ));
    }

    // ---------------------------------------------------------------
    // Streaming
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn streams_every_blob_in_ref_order() {
        let storage = MemoryStorage::new();
        for i in 0..10u8 {
            storage.insert(vec![i; 16]);
        }
        let items = collect(&storage, "").await;
        let refs: Vec<_> = items.iter().map(|i| *i.blob.blob_ref()).collect();
        assert_eq!(refs, storage.refs());
        assert!(items.iter().all(|i| i.token == i.blob.blob_ref().to_string()));
    }

    #[tokio::test]
    async fn resume_token_skips_already_streamed() {
        let storage = MemoryStorage::new();
        for i in 0..6u8 {
            storage.insert(vec![i; 4]);
        }
        let all = collect(&storage, "").await;
        let rest = collect(&storage, &all[2].token).await;
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].blob, all[3].blob);
    }

    #[tokio::test]
    async fn tampered_blob_streams_unchanged() {
        let storage = MemoryStorage::new();
        let claimed = ContentHasher::BLOB.blob_ref(b"original");
        storage.insert_unchecked(claimed, &b"tampered"[..]);
        let items = collect(&storage, "").await;
        assert_eq!(items.len(), 1);
        assert!(items[0].blob.valid_contents().is_err());
    }

    #[tokio::test]
    async fn stops_when_cancelled() {
        let storage = MemoryStorage::new();
        storage.insert(&b"a"[..]);
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            storage.stream_blobs(cancel, tx, "").await,
            Err(StoreError::Cancelled)
        ));
    }

    #[test]
    fn is_streamable() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        assert!(storage.into_streamer().is_some());
    }
}
