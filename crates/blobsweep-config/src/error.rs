use std::path::PathBuf;

/// Errors from reading or translating a configuration document.
///
/// Every shape error names the object path and the key involved.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value that must be an object is something else.
    #[error("expected {} to be an object, found {found}", at(.path))]
    NotAnObject { path: String, found: &'static str },

    /// A required key is absent.
    #[error("missing required key {key:?} ({expected}) in {}", at(.path))]
    MissingKey {
        path: String,
        key: String,
        expected: &'static str,
    },

    /// A key is present with the wrong JSON type.
    #[error("expected key {key:?} in {} to be {expected}, found {found}", at(.path))]
    WrongType {
        path: String,
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A key has the right type but an unusable value.
    #[error("invalid value for key {key:?} in {}: {reason}", at(.path))]
    InvalidValue {
        path: String,
        key: String,
        reason: String,
    },

    /// A key nothing consumed and nothing removed.
    #[error("unknown key {key:?} in {}", at(.path))]
    UnknownKey { path: String, key: String },

    /// The configuration file could not be read.
    #[error("reading {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON.
    #[error("parsing {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// The object path the error refers to, if it is a shape error.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::NotAnObject { path, .. }
            | Self::MissingKey { path, .. }
            | Self::WrongType { path, .. }
            | Self::InvalidValue { path, .. }
            | Self::UnknownKey { path, .. } => Some(path),
            Self::Read { .. } | Self::Parse { .. } => None,
        }
    }
}

fn at(path: &str) -> String {
    if path.is_empty() {
        "the top-level object".to_string()
    } else {
        path.to_string()
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
