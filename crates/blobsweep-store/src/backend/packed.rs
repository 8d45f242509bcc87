use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use blobsweep_config::ConfigObj;
use blobsweep_types::BlobRef;

use crate::blob::{Blob, BlobAndToken};
use crate::error::{StoreError, StoreResult};
use crate::pack::PackReader;
use crate::stream::emit;
use crate::traits::{BlobStreamer, DependencyProvider, Storage};

/// Where a packed stream picks up again.
#[derive(Debug, PartialEq, Eq)]
enum Resume<'t> {
    Start,
    /// Inside the loose blobs, after the given inner token.
    Loose(&'t str),
    /// Inside the packs: re-stream packs after `after`, skipping the first
    /// `skip` entries of the first one.
    Pack { after: &'t str, skip: usize },
}

impl<'t> Resume<'t> {
    fn parse(token: &'t str) -> StoreResult<Self> {
        if token.is_empty() {
            return Ok(Self::Start);
        }
        if let Some(inner) = token.strip_prefix("loose:") {
            return Ok(Self::Loose(inner));
        }
        token
            .strip_prefix("pack:")
            .and_then(|rest| rest.rsplit_once(':'))
            .and_then(|(after, skip)| Some(Self::Pack { after, skip: skip.parse().ok()? }))
            .ok_or_else(|| StoreError::BadToken(token.to_string()))
    }
}

/// A packing layer over two other storages.
///
/// Small blobs are kept loose in one storage. Large blobs are kept inside
/// pack files, which are themselves blobs of the other storage. Both are
/// resolved by prefix while this layer is being constructed, and both must
/// be able to stream.
pub struct PackedStorage {
    small: Arc<dyn Storage>,
    small_streamer: Arc<dyn BlobStreamer>,
    large_streamer: Arc<dyn BlobStreamer>,
}

impl PackedStorage {
    /// Layer over already-built storages.
    pub fn new(small: Arc<dyn Storage>, large: Arc<dyn Storage>) -> StoreResult<Self> {
        let small_streamer = streamer_of(&small, "small blobs")?;
        let large_streamer = streamer_of(&large, "large blobs")?;
        Ok(Self {
            small,
            small_streamer,
            large_streamer,
        })
    }

    /// Build from `handlerArgs`:
    /// `{"smallBlobs": "<prefix>", "largeBlobs": "<prefix>", "metaIndex": {...}}`.
    ///
    /// `metaIndex` is accepted but not used; streaming reads packs directly.
    pub fn from_config(provider: &dyn DependencyProvider, mut args: ConfigObj) -> StoreResult<Self> {
        let small_prefix = args.required_string("smallBlobs");
        let large_prefix = args.required_string("largeBlobs");
        let _ = args.optional_object("metaIndex");
        args.validate()?;

        debug!(
            small = %small_prefix,
            large = %large_prefix,
            "building packed storage"
        );
        let small = provider.resolve_storage(&small_prefix)?;
        let large = provider.resolve_storage(&large_prefix)?;
        Ok(Self {
            small_streamer: streamer_of(&small, &small_prefix)?,
            large_streamer: streamer_of(&large, &large_prefix)?,
            small,
        })
    }

    async fn stream_loose(
        &self,
        cancel: &CancellationToken,
        dest: &mpsc::Sender<BlobAndToken>,
        after: &str,
    ) -> StoreResult<()> {
        let (tx, mut rx) = mpsc::channel(1);
        let inner_cancel = cancel.child_token();
        let stop = inner_cancel.clone();
        let producer = self.small_streamer.stream_blobs(inner_cancel, tx, after);
        let forward = async move {
            while let Some(item) = rx.recv().await {
                let token = format!("loose:{}", item.token);
                if let Err(e) = emit(cancel, dest, BlobAndToken::new(item.blob, token)).await {
                    stop.cancel();
                    return Err(e);
                }
            }
            Ok(())
        };
        let (produced, forwarded) = tokio::join!(producer, forward);
        forwarded.and(produced)
    }

    async fn stream_packs(
        &self,
        cancel: &CancellationToken,
        dest: &mpsc::Sender<BlobAndToken>,
        after: &str,
        skip: usize,
    ) -> StoreResult<()> {
        let (tx, mut rx) = mpsc::channel(1);
        let inner_cancel = cancel.child_token();
        let stop = inner_cancel.clone();
        let producer = self.large_streamer.stream_blobs(inner_cancel, tx, after);
        let forward = async move {
            let mut previous = after.to_string();
            let mut skip = skip;
            while let Some(pack) = rx.recv().await {
                if let Err(e) = emit_pack(cancel, dest, &pack, &previous, skip).await {
                    stop.cancel();
                    return Err(e);
                }
                previous = pack.token;
                skip = 0;
            }
            Ok(())
        };
        let (produced, forwarded) = tokio::join!(producer, forward);
        forwarded.and(produced)
    }

    async fn find_in_packs(&self, blob_ref: &BlobRef) -> StoreResult<Option<Blob>> {
        let (tx, mut rx) = mpsc::channel(1);
        let inner_cancel = CancellationToken::new();
        let stop = inner_cancel.clone();
        let producer = self.large_streamer.stream_blobs(inner_cancel, tx, "");
        let search = async move {
            while let Some(pack) = rx.recv().await {
                let Some(reader) = open_pack(&pack.blob)? else {
                    continue;
                };
                for entry in reader.entries() {
                    let entry = entry?;
                    if entry.blob_ref() == blob_ref {
                        stop.cancel();
                        return Ok(Some(entry));
                    }
                }
            }
            Ok::<_, StoreError>(None)
        };
        let (produced, found) = tokio::join!(producer, search);
        match found? {
            Some(blob) => Ok(Some(blob)),
            None => produced.map(|()| None),
        }
    }
}

impl std::fmt::Debug for PackedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackedStorage")
            .field("small", &self.small.handler_type())
            .finish_non_exhaustive()
    }
}

fn streamer_of(storage: &Arc<dyn Storage>, prefix: &str) -> StoreResult<Arc<dyn BlobStreamer>> {
    Arc::clone(storage)
        .into_streamer()
        .ok_or_else(|| StoreError::NotStreamable {
            prefix: prefix.to_string(),
            handler: storage.handler_type().to_string(),
        })
}

/// Open a pack blob, or `None` if the pack itself fails verification.
///
/// A pack whose own hash checks out but whose layout does not parse is a
/// [`StoreError::CorruptPack`].
fn open_pack(pack: &Blob) -> StoreResult<Option<PackReader>> {
    if let Err(e) = pack.valid_contents() {
        warn!(pack = %pack.blob_ref(), error = %e, "pack blob failed verification");
        return Ok(None);
    }
    PackReader::from_bytes(*pack.blob_ref(), pack.contents()?.clone()).map(Some)
}

/// Emit the entries of one pack, skipping the first `skip`.
///
/// Tokens inside a pack point back at the pack before it, so resuming
/// re-reads this pack. The last entry's token points past it.
///
/// A damaged pack is emitted whole in place of its entries, so the
/// consumer counts it as one invalid blob and the sweep moves on.
async fn emit_pack(
    cancel: &CancellationToken,
    dest: &mpsc::Sender<BlobAndToken>,
    pack: &BlobAndToken,
    previous: &str,
    skip: usize,
) -> StoreResult<()> {
    let Some(reader) = open_pack(&pack.blob)? else {
        let token = format!("pack:{}:0", pack.token);
        return emit(cancel, dest, BlobAndToken::new(pack.blob.clone(), token)).await;
    };
    let count = reader.count() as usize;
    for (k, entry) in reader.entries().enumerate() {
        let blob = entry?;
        if k < skip {
            continue;
        }
        let token = if k + 1 == count {
            format!("pack:{}:0", pack.token)
        } else {
            format!("pack:{previous}:{}", k + 1)
        };
        emit(cancel, dest, BlobAndToken::new(blob, token)).await?;
    }
    Ok(())
}

#[async_trait]
impl Storage for PackedStorage {
    fn handler_type(&self) -> &str {
        "packed"
    }

    async fn fetch(&self, blob_ref: &BlobRef) -> StoreResult<Option<Blob>> {
        if let Some(blob) = self.small.fetch(blob_ref).await? {
            return Ok(Some(blob));
        }
        self.find_in_packs(blob_ref).await
    }

    fn into_streamer(self: Arc<Self>) -> Option<Arc<dyn BlobStreamer>> {
        Some(self)
    }
}

#[async_trait]
impl BlobStreamer for PackedStorage {
    /// Loose blobs first, then the contents of every pack.
    async fn stream_blobs(
        &self,
        cancel: CancellationToken,
        dest: mpsc::Sender<BlobAndToken>,
        token: &str,
    ) -> StoreResult<()> {
        match Resume::parse(token)? {
            Resume::Start => {
                self.stream_loose(&cancel, &dest, "").await?;
                self.stream_packs(&cancel, &dest, "", 0).await
            }
            Resume::Loose(after) => {
                self.stream_loose(&cancel, &dest, after).await?;
                self.stream_packs(&cancel, &dest, "", 0).await
            }
            Resume::Pack { after, skip } => self.stream_packs(&cancel, &dest, after, skip).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::backend::MemoryStorage;
    use crate::error::ResolveError;
    use crate::pack::PackWriter;
    use blobsweep_crypto::ContentHasher;
    use serde_json::json;

    /// Serves fixed storages by prefix.
    struct Fixed(BTreeMap<String, Arc<dyn Storage>>);

    impl DependencyProvider for Fixed {
        fn resolve_storage(&self, prefix: &str) -> Result<Arc<dyn Storage>, ResolveError> {
            self.0.get(prefix).cloned().ok_or_else(|| ResolveError::NoConfig {
                prefix: prefix.to_string(),
            })
        }
        fn register_storage(&self, _: &str, _: Arc<dyn Storage>) {}
        fn base_url(&self) -> &str {
            "http://localhost:1234"
        }
        fn my_prefix(&self) -> &str {
            "/bs/"
        }
        fn handler_type(&self, prefix: &str) -> Option<String> {
            self.0.get(prefix).map(|s| s.handler_type().to_string())
        }
        fn find_handler_by_type(&self, _: &str) -> Result<(String, Arc<dyn Storage>), ResolveError> {
            Err(ResolveError::Unsupported {
                operation: "find_handler_by_type",
            })
        }
        fn all_handlers(&self) -> Result<BTreeMap<String, String>, ResolveError> {
            Err(ResolveError::Unsupported {
                operation: "all_handlers",
            })
        }
    }

    struct Fixture {
        small: Arc<MemoryStorage>,
        large: Arc<MemoryStorage>,
        packed: PackedStorage,
    }

    /// Three loose blobs and two packs of two blobs each.
    fn fixture() -> Fixture {
        let small = Arc::new(MemoryStorage::new());
        let large = Arc::new(MemoryStorage::new());
        for i in 0..3u8 {
            small.insert(vec![i; 8]);
        }
        for p in 0..2u8 {
            let mut writer = PackWriter::new();
            writer.add(vec![100 + p; 1024]);
            writer.add(vec![200 + p; 2048]);
            large.insert(writer.finish().unwrap());
        }
        let packed = PackedStorage::new(small.clone(), large.clone()).unwrap();
        Fixture { small, large, packed }
    }

    async fn collect(storage: &PackedStorage, token: &str) -> StoreResult<Vec<BlobAndToken>> {
        let (tx, mut rx) = mpsc::channel(1);
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
    fn parses_resume_tokens() {
        assert_eq!(Resume::parse("").unwrap(), Resume::Start);
        assert_eq!(Resume::parse("loose:abc").unwrap(), Resume::Loose("abc"));
        assert_eq!(
            Resume::parse("pack:a:b:3").unwrap(),
            Resume::Pack { after: "a:b", skip: 3 }
        );
        assert_eq!(
            Resume::parse("pack::0").unwrap(),
            Resume::Pack { after: "", skip: 0 }
        );
        assert!(matches!(Resume::parse("blake3-00"), Err(StoreError::BadToken(_))));
        assert!(matches!(Resume::parse("pack:x:y"), Err(StoreError::BadToken(_))));
    }

    #[tokio::test]
    async fn streams_loose_then_packed() {
        let fx = fixture();
        let items = collect(&fx.packed, "").await.unwrap();
        assert_eq!(items.len(), 3 + 4);
        assert!(items[..3].iter().all(|i| i.token.starts_with("loose:")));
        assert!(items[3..].iter().all(|i| i.token.starts_with("pack:")));
        assert!(items.iter().all(|i| i.blob.valid_contents().is_ok()));
        assert_eq!(fx.small.len(), 3);
        assert_eq!(fx.large.len(), 2);
    }

    #[tokio::test]
    async fn every_token_resumes_exactly_after_its_blob() {
        let fx = fixture();
        let all = collect(&fx.packed, "").await.unwrap();
        for (i, item) in all.iter().enumerate() {
            let rest = collect(&fx.packed, &item.token).await.unwrap();
            let expected: Vec<_> = all[i + 1..].iter().map(|x| x.blob.clone()).collect();
            let got: Vec<_> = rest.into_iter().map(|x| x.blob).collect();
            assert_eq!(got, expected, "resuming after item {i} ({})", item.token);
        }
    }

    #[tokio::test]
    async fn corrupt_pack_entry_is_reported_per_blob() {
        let small = Arc::new(MemoryStorage::new());
        let large = Arc::new(MemoryStorage::new());
        let mut writer = PackWriter::new();
        writer.add(&b"fine"[..]);
        writer.add_unchecked(ContentHasher::BLOB.blob_ref(b"nope"), &b"yeah"[..]);
        large.insert(writer.finish().unwrap());
        let packed = PackedStorage::new(small, large).unwrap();

        let items = collect(&packed, "").await.unwrap();
        let valid: Vec<bool> = items.iter().map(|i| i.blob.valid_contents().is_ok()).collect();
        assert_eq!(valid, vec![true, false]);
    }

    #[tokio::test]
    async fn damaged_pack_is_emitted_whole() {
        let fx = fixture();
        let mut writer = PackWriter::new();
        writer.add(vec![7u8; 4096]);
        writer.add(vec![8u8; 4096]);
        let mut raw = writer.finish().unwrap();
        let pack_ref = ContentHasher::BLOB.blob_ref(&raw);
        let mid = raw.len() / 2;
        raw[mid] ^= 0x01;
        fx.large.insert_unchecked(pack_ref, raw);

        let items = collect(&fx.packed, "").await.unwrap();
        assert_eq!(items.len(), 3 + 4 + 1);
        let invalid: Vec<&BlobRef> = items
            .iter()
            .filter(|i| i.blob.valid_contents().is_err())
            .map(|i| i.blob.blob_ref())
            .collect();
        assert_eq!(invalid, vec![&pack_ref]);

        let damaged = items.iter().position(|i| i.blob.blob_ref() == &pack_ref).unwrap();
        let rest = collect(&fx.packed, &items[damaged].token).await.unwrap();
        assert_eq!(rest.len(), items.len() - damaged - 1);
    }

    #[tokio::test]
    async fn fetch_skips_damaged_packs() {
        let fx = fixture();
        let mut writer = PackWriter::new();
        let hidden = writer.add(vec![9u8; 4096]);
        let mut raw = writer.finish().unwrap();
        let pack_ref = ContentHasher::BLOB.blob_ref(&raw);
        raw[10] ^= 0x80;
        fx.large.insert_unchecked(pack_ref, raw);

        assert!(fx.packed.fetch(&hidden).await.unwrap().is_none());
        let packed_ref = ContentHasher::BLOB.blob_ref(&[200u8; 2048]);
        assert!(fx.packed.fetch(&packed_ref).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn broken_pack_is_a_stream_error() {
        let small = Arc::new(MemoryStorage::new());
        small.insert(&b"loose"[..]);
        let large = Arc::new(MemoryStorage::new());
        large.insert(&b"not a pack at all, just bytes"[..]);
        let packed = PackedStorage::new(small, large).unwrap();
        assert!(matches!(
            collect(&packed, "").await,
            Err(StoreError::CorruptPack { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_finds_loose_and_packed() {
        let fx = fixture();
        let loose = fx.small.refs()[0];
        assert!(fx.packed.fetch(&loose).await.unwrap().is_some());

        let packed_ref = ContentHasher::BLOB.blob_ref(&[201u8; 2048]);
        let blob = fx.packed.fetch(&packed_ref).await.unwrap().unwrap();
        blob.valid_contents().unwrap();

        let absent = ContentHasher::BLOB.blob_ref(b"absent");
        assert!(fx.packed.fetch(&absent).await.unwrap().is_none());
    }

    #[test]
    fn from_config_resolves_through_provider() {
        let fx = fixture();
        let provider = Fixed(BTreeMap::from([
            ("/loose/".to_string(), fx.small.clone() as Arc<dyn Storage>),
            ("/packs/".to_string(), fx.large.clone() as Arc<dyn Storage>),
        ]));
        let args = json!({
            "smallBlobs": "/loose/",
            "largeBlobs": "/packs/",
            "metaIndex": {"type": "leveldb", "file": "/tmp/index"}
        });
        let obj = ConfigObj::from_value("handlerArgs", args).unwrap();
        PackedStorage::from_config(&provider, obj).unwrap();
    }

    #[test]
    fn from_config_propagates_resolve_errors() {
        let provider = Fixed(BTreeMap::new());
        let args = json!({"smallBlobs": "/loose/", "largeBlobs": "/packs/"});
        let obj = ConfigObj::from_value("handlerArgs", args).unwrap();
        match PackedStorage::from_config(&provider, obj) {
            Err(StoreError::Resolve(e)) => {
                assert!(matches!(*e, ResolveError::NoConfig { ref prefix } if prefix == "/loose/"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn from_config_requires_both_prefixes() {
        let provider = Fixed(BTreeMap::new());
        let obj = ConfigObj::from_value("handlerArgs", json!({"smallBlobs": "/loose/"})).unwrap();
        assert!(matches!(
            PackedStorage::from_config(&provider, obj),
            Err(StoreError::InvalidArgs(_))
        ));
    }

    #[test]
    fn children_must_stream() {
        struct Opaque;

        #[async_trait]
        impl Storage for Opaque {
            fn handler_type(&self) -> &str {
                "opaque"
            }
            async fn fetch(&self, _: &BlobRef) -> StoreResult<Option<Blob>> {
                Ok(None)
            }
        }

        let err = PackedStorage::new(Arc::new(MemoryStorage::new()), Arc::new(Opaque)).unwrap_err();
        assert!(matches!(err, StoreError::NotStreamable { handler, .. } if handler == "opaque"));
    }
}
