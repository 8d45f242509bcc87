//! Blob integrity verification.
//!
//! A run translates a server configuration, resolves the storage configured
//! under the entry prefix (recursively building whatever it layers over),
//! then streams every blob out of it and checks each against its ref.
//!
//! - [`Loader`] -- per-run prefix resolver and instance cache
//! - [`verify`] -- the producer/consumer sweep over one storage
//! - [`ConsoleReporter`] -- progress and summary output
//! - [`verify_store`] -- the above, end to end
//!
//! Corrupt blobs are outcomes, not errors: they land in the [`Tally`] and
//! map to [`Outcome::CorruptionDetected`].

pub mod error;
pub mod loader;
pub mod options;
pub mod pipeline;
pub mod report;
pub mod run;
pub mod tally;

pub use error::{VerifyError, VerifyResult};
pub use loader::Loader;
pub use options::VerifyOptions;
pub use pipeline::{verify, Outcome, VerifyReport};
pub use report::{ConsoleReporter, ProgressObserver};
pub use run::verify_store;
pub use tally::Tally;
