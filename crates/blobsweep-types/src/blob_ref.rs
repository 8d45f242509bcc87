use std::fmt;

use crate::error::TypeError;

/// Name of the hash function used for every ref, as it appears in text form.
pub const HASH_NAME: &str = "blake3";

/// Content-addressed identifier of a blob.
///
/// A `BlobRef` claims two things about a blob: the BLAKE3 digest of its
/// contents and their length. Verification recomputes both from the bytes
/// actually read back and compares them against the claim.
///
/// Ordering is by digest first, so iterating refs in order matches iterating
/// their text forms in lexicographic order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobRef {
    digest: [u8; 32],
    size: u64,
}

impl BlobRef {
    /// Build a ref from a pre-computed digest and size.
    pub const fn new(digest: [u8; 32], size: u64) -> Self {
        Self { digest, size }
    }

    /// The raw 32-byte digest.
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    /// Claimed size of the blob contents in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hex-encoded digest without the hash name.
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        hex::encode(&self.digest[..4])
    }

    /// Parse the digest out of a `blake3-<hex>` string.
    pub fn parse_digest(s: &str) -> Result<[u8; 32], TypeError> {
        let hex_part = s
            .strip_prefix(HASH_NAME)
            .and_then(|rest| rest.strip_prefix('-'))
            .ok_or_else(|| TypeError::UnknownHashFunction(s.to_string()))?;
        let bytes = hex::decode(hex_part).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(arr)
    }

    /// Parse a `blake3-<hex>` string, attaching the given size.
    pub fn parse(s: &str, size: u64) -> Result<Self, TypeError> {
        Ok(Self::new(Self::parse_digest(s)?, size))
    }
}

impl fmt::Debug for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobRef({HASH_NAME}-{}, {} bytes)", self.short_hex(), self.size)
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{HASH_NAME}-{}", self.digest_hex())
    }
}
