use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Read a low-level server configuration file as JSON.
pub fn load_file(path: &Path) -> ConfigResult<Value> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = text.len(), "loaded server config");
    load_str(path, &text)
}

/// Parse configuration text; `origin` is only used in error messages.
pub fn load_str(origin: &Path, text: &str) -> ConfigResult<Value> {
    serde_json::from_str(text).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })
}
