//! Built-in storage backends.

pub mod filesystem;
pub mod memory;
pub mod packed;

pub use filesystem::FilesystemStorage;
pub use memory::MemoryStorage;
pub use packed::PackedStorage;
