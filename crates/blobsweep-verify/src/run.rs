use serde_json::Value;
use tracing::debug;

use blobsweep_config::translate;
use blobsweep_store::StorageRegistry;

use crate::error::{VerifyError, VerifyResult};
use crate::loader::Loader;
use crate::options::VerifyOptions;
use crate::pipeline::{verify, VerifyReport};
use crate::report::ProgressObserver;

/// Verify the storage behind the entry prefix of a server configuration.
///
/// Translates `doc`, requires `options.entry_prefix` to be configured,
/// builds it (and whatever it layers over) with a fresh [`Loader`], then
/// runs [`verify`]. The loader lives only as long as this call.
pub async fn verify_store(
    doc: Value,
    registry: StorageRegistry,
    options: &VerifyOptions,
    observer: &mut dyn ProgressObserver,
) -> VerifyResult<VerifyReport> {
    let config = translate(doc)?;
    if !config.contains(&options.entry_prefix) {
        return Err(VerifyError::MissingEntryPoint {
            prefix: options.entry_prefix.clone(),
        });
    }
    debug!(prefixes = config.len(), "configuration translated");

    let loader = Loader::new(config, registry);
    let storage = loader.resolve(&options.entry_prefix)?;
    verify(storage, options, observer).await
}
