use bytes::Bytes;

use blobsweep_crypto::ContentHasher;
use blobsweep_types::BlobRef;

use crate::error::{StoreError, StoreResult};

/// What a backend managed to read for a blob.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Contents {
    Bytes(Bytes),
    /// The read failed. At verification time this is indistinguishable from
    /// corruption, so it is carried along instead of aborting the stream.
    Unreadable(String),
}

/// A blob as produced by a backend: the ref it is stored under plus the
/// bytes read back for it.
///
/// Backends never check contents on the way out; that is what
/// [`Blob::valid_contents`] is for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    blob_ref: BlobRef,
    contents: Contents,
}

impl Blob {
    /// A blob claimed to be `blob_ref`, with the bytes actually read.
    pub fn new(blob_ref: BlobRef, data: impl Into<Bytes>) -> Self {
        Self {
            blob_ref,
            contents: Contents::Bytes(data.into()),
        }
    }

    /// A correctly addressed blob for `data`.
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self::new(ContentHasher::BLOB.blob_ref(&data), data)
    }

    /// A blob whose bytes could not be read.
    pub fn unreadable(blob_ref: BlobRef, reason: impl Into<String>) -> Self {
        Self {
            blob_ref,
            contents: Contents::Unreadable(reason.into()),
        }
    }

    /// The ref this blob is stored under.
    pub fn blob_ref(&self) -> &BlobRef {
        &self.blob_ref
    }

    /// The bytes read for this blob.
    pub fn contents(&self) -> StoreResult<&Bytes> {
        match &self.contents {
            Contents::Bytes(data) => Ok(data),
            Contents::Unreadable(reason) => Err(StoreError::Unreadable {
                blob: self.blob_ref,
                reason: reason.clone(),
            }),
        }
    }

    /// Check the contents against the claimed ref: size first, then digest.
    pub fn valid_contents(&self) -> StoreResult<()> {
        let data = self.contents()?;
        let actual = data.len() as u64;
        if actual != self.blob_ref.size() {
            return Err(StoreError::SizeMismatch {
                claimed: self.blob_ref,
                actual,
            });
        }
        if !ContentHasher::BLOB.verify(data, &self.blob_ref) {
            return Err(StoreError::HashMismatch {
                claimed: self.blob_ref,
                computed: ContentHasher::BLOB.blob_ref(data),
            });
        }
        Ok(())
    }
}

/// A streamed blob plus the token that resumes streaming right after it.
#[derive(Clone, Debug)]
pub struct BlobAndToken {
    pub blob: Blob,
    pub token: String,
}

impl BlobAndToken {
    pub fn new(blob: Blob, token: impl Into<String>) -> Self {
        Self {
            blob,
            token: token.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correctly_addressed_blob_is_valid() {
        let blob = Blob::from_data(&b"hello world"[..]);
        blob.valid_contents().unwrap();
        assert_eq!(blob.blob_ref().size(), 11);
    }

    #[test]
    fn tampered_bytes_are_a_hash_mismatch() {
        let claimed = ContentHasher::BLOB.blob_ref(b"original");
        let blob = Blob::new(claimed, &b"tampered"[..]);
        match blob.valid_contents().unwrap_err() {
            StoreError::HashMismatch { claimed: c, computed } => {
                assert_eq!(c, claimed);
                assert_eq!(computed, ContentHasher::BLOB.blob_ref(b"tampered"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_bytes_are_a_size_mismatch() {
        let claimed = ContentHasher::BLOB.blob_ref(b"full contents");
        let blob = Blob::new(claimed, &b"full"[..]);
        assert!(matches!(
            blob.valid_contents().unwrap_err(),
            StoreError::SizeMismatch { actual: 4, .. }
        ));
    }

    #[test]
    fn unreadable_blob_fails_validation() {
        let claimed = ContentHasher::BLOB.blob_ref(b"gone");
        let blob = Blob::unreadable(claimed, "permission denied");
        let err = blob.valid_contents().unwrap_err();
        assert!(matches!(err, StoreError::Unreadable { .. }));
        assert!(err.to_string().contains("permission denied"));
    }
}
