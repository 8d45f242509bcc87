//! Foundation types for blobsweep.
//!
//! Every blob in a store is identified by a [`BlobRef`]: the BLAKE3 digest of
//! its contents plus its length in bytes. The text form of a ref is
//! `blake3-<64 hex chars>`; this is what appears in file names, resume
//! tokens, and corruption reports.

pub mod blob_ref;
pub mod error;

pub use blob_ref::{BlobRef, HASH_NAME};
pub use error::TypeError;
