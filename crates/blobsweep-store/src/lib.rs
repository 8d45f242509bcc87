//! Blob storage for blobsweep.
//!
//! Every blob lives in a storage backend configured under a path prefix.
//! Backends are built by type name through a [`StorageRegistry`], and may
//! pull in other prefixes while being built via a [`DependencyProvider`].
//! A backend that can enumerate its whole contents also implements
//! [`BlobStreamer`], which is what verification runs on.
//!
//! # Backends
//!
//! - [`MemoryStorage`] -- ordered in-memory store for tests and embedding
//! - [`FilesystemStorage`] -- one file per blob in a sharded directory tree
//! - [`PackedStorage`] -- loose small blobs plus [pack files](pack) of large ones
//!
//! # Design Rules
//!
//! 1. Backends never judge the bytes they return. [`Blob::valid_contents`] does.
//! 2. A blob that cannot be read is still streamed, as an unreadable blob.
//! 3. Streams stop promptly when cancelled or when the receiver goes away.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod backend;
pub mod blob;
pub mod error;
pub mod pack;
pub mod registry;
pub mod stream;
pub mod traits;

pub use backend::{FilesystemStorage, MemoryStorage, PackedStorage};
pub use blob::{Blob, BlobAndToken};
pub use error::{ResolveError, StoreError, StoreResult};
pub use pack::{PackReader, PackWriter};
pub use registry::{Constructor, StorageRegistry};
pub use stream::{emit, emit_blocking};
pub use traits::{BlobStreamer, DependencyProvider, Storage};
