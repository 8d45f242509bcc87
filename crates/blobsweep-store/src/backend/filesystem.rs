use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use blobsweep_config::ConfigObj;
use blobsweep_crypto::ContentHasher;
use blobsweep_types::BlobRef;

use crate::blob::{Blob, BlobAndToken};
use crate::error::{StoreError, StoreResult};
use crate::stream::emit_blocking;
use crate::traits::{BlobStreamer, Storage};

const BLOB_EXTENSION: &str = ".dat";

/// Blobs stored one per file under a root directory.
///
/// Layout: `<root>/<hex[0..2]>/<hex[2..4]>/blake3-<hex>.dat`. Anything else
/// under the root (such as a nested pack directory) is ignored. Resume
/// tokens are ref strings.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Open storage rooted at an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StoreError::MissingDirectory(root));
        }
        Ok(Self { root })
    }

    /// Build from `handlerArgs`: `{"path": "<directory>"}`.
    pub fn from_config(mut args: ConfigObj) -> StoreResult<Self> {
        let path = args.required_string("path");
        if path.is_empty() {
            args.invalid("path", "must name a directory");
        }
        args.validate()?;
        Self::open(path)
    }

    /// Root directory of the storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where a blob with this ref lives.
    pub fn blob_path(&self, blob_ref: &BlobRef) -> PathBuf {
        let hex = blob_ref.digest_hex();
        self.root
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(format!("{blob_ref}{BLOB_EXTENSION}"))
    }

    /// Write bytes under their correct ref. Existing blobs are left alone.
    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn put(&self, data: &[u8]) -> StoreResult<BlobRef> {
        let blob_ref = ContentHasher::BLOB.blob_ref(data);
        let path = self.blob_path(&blob_ref);
        if tokio::fs::try_exists(&path).await? {
            debug!(blob = %blob_ref, "blob already stored");
            return Ok(blob_ref);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(blob_ref)
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    fn handler_type(&self) -> &str {
        "filesystem"
    }

    async fn fetch(&self, blob_ref: &BlobRef) -> StoreResult<Option<Blob>> {
        match tokio::fs::read(self.blob_path(blob_ref)).await {
            Ok(data) => Ok(Some(Blob::new(*blob_ref, data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn into_streamer(self: Arc<Self>) -> Option<Arc<dyn BlobStreamer>> {
        Some(self)
    }
}

#[async_trait]
impl BlobStreamer for FilesystemStorage {
    async fn stream_blobs(
        &self,
        cancel: CancellationToken,
        dest: mpsc::Sender<BlobAndToken>,
        token: &str,
    ) -> StoreResult<()> {
        let root = self.root.clone();
        let token = token.to_string();
        tokio::task::spawn_blocking(move || walk(&root, &cancel, &dest, &token))
            .await
            .map_err(|e| StoreError::Stream(format!("filesystem walk panicked: {e}")))?
    }
}

/// Shard directories are two lowercase hex characters.
fn is_shard_dir(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_dir()
        && name.len() == 2
        && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn in_layout(entry: &DirEntry) -> bool {
    match entry.depth() {
        0 => true,
        1 | 2 => is_shard_dir(entry),
        _ => entry.file_type().is_file(),
    }
}

/// Walk the shard tree in name order, which is also ref order.
fn walk(
    root: &Path,
    cancel: &CancellationToken,
    dest: &mpsc::Sender<BlobAndToken>,
    token: &str,
) -> StoreResult<()> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(3)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(in_layout);

    for entry in walker {
        let entry = entry.map_err(|e| StoreError::Stream(e.to_string()))?;
        if entry.depth() != 3 {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let Some(ref_text) = name.strip_suffix(BLOB_EXTENSION) else {
            continue;
        };
        let digest = match BlobRef::parse_digest(ref_text) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unrecognised file");
                continue;
            }
        };
        if ref_text <= token {
            continue;
        }

        let blob = read_blob(&entry, digest);
        emit_blocking(cancel, dest, BlobAndToken::new(blob, ref_text))?;
    }
    Ok(())
}

/// The claimed size is the size on disk; the bytes are whatever reads back.
///
/// Files carry no separate size record, so a size mismatch cannot show up
/// here. Truncation and damage are both caught by the hash. A file whose
/// metadata cannot be read is passed on as unreadable.
fn read_blob(entry: &DirEntry, digest: [u8; 32]) -> Blob {
    let size = match entry.metadata() {
        Ok(meta) => meta.len(),
        Err(e) => {
            let blob_ref = BlobRef::new(digest, 0);
            warn!(path = %entry.path().display(), error = %e, "blob file metadata unreadable");
            return Blob::unreadable(blob_ref, e.to_string());
        }
    };
    let blob_ref = BlobRef::new(digest, size);
    match std::fs::read(entry.path()) {
        Ok(data) => Blob::new(blob_ref, Bytes::from(data)),
        Err(e) => {
            warn!(blob = %blob_ref, error = %e, "blob file unreadable");
            Blob::unreadable(blob_ref, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn collect(storage: &FilesystemStorage, token: &str) -> StoreResult<Vec<BlobAndToken>> {
        let (tx, mut rx) = mpsc::channel(2);
        let producer = storage.stream_blobs(CancellationToken::new(), tx, token);
        let consumer = async {
            let mut out = Vec::new();
            while let Some(item) = rx.recv().await {
                out.push(item);
            }
            out
        };
        let (result, items) = tokio::join!(producer, consumer);
        result.map(|()| items)
    }

    #[test]
    fn open_requires_existing_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            FilesystemStorage::open(&missing),
            Err(StoreError::MissingDirectory(p)) if p == missing
        ));
    }

    #[test]
    fn from_config_reads_path() {
        let dir = TempDir::new().unwrap();
        let args = serde_json::json!({"path": dir.path().to_str().unwrap()});
        let obj = ConfigObj::from_value("handlerArgs", args).unwrap();
        let storage = FilesystemStorage::from_config(obj).unwrap();
        assert_eq!(storage.root(), dir.path());
    }

    #[test]
    fn from_config_rejects_unknown_args() {
        let dir = TempDir::new().unwrap();
        let args = serde_json::json!({"path": dir.path().to_str().unwrap(), "fsync": true});
        let obj = ConfigObj::from_value("handlerArgs", args).unwrap();
        assert!(matches!(
            FilesystemStorage::from_config(obj),
            Err(StoreError::InvalidArgs(_))
        ));
    }

    #[test]
    fn blob_path_is_sharded() {
        let storage = FilesystemStorage { root: PathBuf::from("/data") };
        let r = BlobRef::new([0xab; 32], 1);
        let path = storage.blob_path(&r);
        assert!(path.starts_with("/data/ab/ab"));
        assert!(path.to_string_lossy().ends_with(".dat"));
    }

    #[tokio::test]
    async fn put_then_fetch() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        let r = storage.put(b"on disk").await.unwrap();
        assert_eq!(storage.put(b"on disk").await.unwrap(), r);
        let blob = storage.fetch(&r).await.unwrap().unwrap();
        blob.valid_contents().unwrap();

        let absent = ContentHasher::BLOB.blob_ref(b"never written");
        assert!(storage.fetch(&absent).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn streams_in_ref_order_and_resumes() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        let mut refs = Vec::new();
        for i in 0..8u8 {
            refs.push(storage.put(&[i; 32]).await.unwrap());
        }
        refs.sort();

        let items = collect(&storage, "").await.unwrap();
        let streamed: Vec<_> = items.iter().map(|i| *i.blob.blob_ref()).collect();
        assert_eq!(streamed, refs);
        assert!(items.iter().all(|i| i.blob.valid_contents().is_ok()));

        let rest = collect(&storage, &items[4].token).await.unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(*rest[0].blob.blob_ref(), refs[5]);
    }

    #[tokio::test]
    async fn overwritten_file_fails_validation() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        let good = storage.put(b"good data").await.unwrap();
        let bad = storage.put(b"soon corrupted").await.unwrap();
        std::fs::write(storage.blob_path(&bad), b"flipped bits!!").unwrap();

        let items = collect(&storage, "").await.unwrap();
        assert_eq!(items.len(), 2);
        for item in items {
            let ok = item.blob.valid_contents().is_ok();
            assert_eq!(ok, *item.blob.blob_ref() == good);
        }
    }

    #[tokio::test]
    async fn truncated_file_is_caught_by_hash() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        let blob_ref = storage.put(b"twenty bytes of data").await.unwrap();
        std::fs::write(storage.blob_path(&blob_ref), b"twenty").unwrap();

        let items = collect(&storage, "").await.unwrap();
        assert_eq!(items[0].blob.blob_ref().size(), 6);
        assert!(matches!(
            items[0].blob.valid_contents(),
            Err(StoreError::HashMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn foreign_files_and_dirs_are_ignored() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        storage.put(b"real blob").await.unwrap();
        std::fs::create_dir_all(dir.path().join("packed/ab/cd")).unwrap();
        std::fs::write(dir.path().join("packed/ab/cd/x.dat"), b"x").unwrap();
        std::fs::write(dir.path().join("README"), b"hello").unwrap();
        std::fs::create_dir_all(dir.path().join("00/00")).unwrap();
        std::fs::write(dir.path().join("00/00/not-a-ref.dat"), b"junk").unwrap();

        let items = collect(&storage, "").await.unwrap();
        assert_eq!(items.len(), 1);
    }

    #[tokio::test]
    async fn empty_root_streams_nothing() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemStorage::open(dir.path()).unwrap();
        assert!(collect(&storage, "").await.unwrap().is_empty());
    }
}
