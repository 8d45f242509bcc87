//! Hashing primitives for blobsweep.
//!
//! Blob refs are plain BLAKE3 digests of the blob bytes, so a ref can be
//! reproduced with any BLAKE3 tool. Pack checksums are domain-separated so a
//! pack trailer can never be confused with a blob digest.
//!
//! All crypto operations wrap established libraries. There is no custom cryptography.

pub mod hasher;

pub use hasher::ContentHasher;
