use blobsweep_types::BlobRef;

/// BLAKE3 content hasher with an optional domain tag.
///
/// When a domain is set it is prepended (followed by `:`) to every hash
/// computation, so identical bytes hashed under different domains never
/// collide.
pub struct ContentHasher {
    domain: Option<&'static str>,
}

impl ContentHasher {
    /// Hasher for blob contents. No domain: refs are plain BLAKE3 digests.
    pub const BLOB: Self = Self { domain: None };
    /// Hasher for pack file trailers.
    pub const PACK: Self = Self {
        domain: Some("blobsweep-pack-v1"),
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self {
            domain: Some(domain),
        }
    }

    /// Hash raw bytes, applying the domain tag if any.
    pub fn digest(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        if let Some(domain) = self.domain {
            hasher.update(domain.as_bytes());
            hasher.update(b":");
        }
        hasher.update(data);
        *hasher.finalize().as_bytes()
    }

    /// Compute the ref these bytes would be stored under.
    pub fn blob_ref(&self, data: &[u8]) -> BlobRef {
        BlobRef::new(self.digest(data), data.len() as u64)
    }

    /// Verify that data matches both the digest and the size of a ref.
    pub fn verify(&self, data: &[u8], expected: &BlobRef) -> bool {
        data.len() as u64 == expected.size() && self.digest(data) == *expected.digest()
    }

    /// The domain tag used by this hasher, if any.
    pub fn domain(&self) -> Option<&str> {
        self.domain
    }
}
