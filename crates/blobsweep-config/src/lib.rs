//! Low-level server configuration for blobsweep.
//!
//! A blob server configuration maps path prefixes (such as `/bs/`) to
//! handlers. Only `storage-*` handlers matter to blobsweep; this crate turns
//! the raw JSON document into a [`ResolvedConfig`] holding exactly those,
//! and rejects any shape it does not understand rather than passing it
//! through.
//!
//! [`ConfigObj`] is the strict object reader used for both the document and
//! the per-backend `handlerArgs`: every key it is asked for is marked as
//! consumed, and [`ConfigObj::validate`] fails on whatever is left over.

pub mod error;
pub mod load;
pub mod obj;
pub mod translate;

pub use error::{ConfigError, ConfigResult};
pub use load::{load_file, load_str};
pub use obj::ConfigObj;
pub use translate::{translate, BackendSpec, ResolvedConfig, STORAGE_HANDLER_PREFIX};
