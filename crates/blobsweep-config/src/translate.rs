use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigResult;
use crate::obj::ConfigObj;

/// Handler names carrying this prefix configure a storage backend.
pub const STORAGE_HANDLER_PREFIX: &str = "storage-";

/// One configured storage backend: its type and constructor arguments.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSpec {
    /// Backend type, with the `storage-` marker removed (e.g. `filesystem`).
    pub handler_type: String,
    /// The `handlerArgs` object, untouched. The backend validates it.
    pub handler_args: Map<String, Value>,
}

impl BackendSpec {
    pub fn new(handler_type: impl Into<String>, handler_args: Map<String, Value>) -> Self {
        Self {
            handler_type: handler_type.into(),
            handler_args,
        }
    }
}

/// Storage backends keyed by path prefix.
///
/// Built once per run by [`translate`] and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedConfig {
    prefixes: BTreeMap<String, BackendSpec>,
}

impl ResolvedConfig {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the backend for a prefix.
    pub fn insert(&mut self, prefix: impl Into<String>, spec: BackendSpec) {
        self.prefixes.insert(prefix.into(), spec);
    }

    /// Builder form of [`ResolvedConfig::insert`].
    pub fn with(mut self, prefix: impl Into<String>, spec: BackendSpec) -> Self {
        self.insert(prefix, spec);
        self
    }

    /// The backend configured for a prefix.
    pub fn get(&self, prefix: &str) -> Option<&BackendSpec> {
        self.prefixes.get(prefix)
    }

    /// Returns `true` if a backend is configured for the prefix.
    pub fn contains(&self, prefix: &str) -> bool {
        self.prefixes.contains_key(prefix)
    }

    /// All configured prefixes with their backends, in prefix order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BackendSpec)> {
        self.prefixes.iter().map(|(p, s)| (p.as_str(), s))
    }

    /// Number of configured backends.
    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    /// Returns `true` if no backend is configured.
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}

/// Translate a low-level server configuration into a [`ResolvedConfig`].
///
/// Only the `prefixes` object is read. Under it, keys starting with `_` are
/// comments and skipped unread. Entries whose `handler` is `storage-<type>`
/// become [`BackendSpec`]s and must carry exactly `handler` and
/// `handlerArgs`. Entries with any other handler are not storage: their
/// extra fields are dropped and the entry is left out of the result.
/// Anything else that remains unrecognised is an error naming its path.
pub fn translate(doc: Value) -> ConfigResult<ResolvedConfig> {
    let mut root = ConfigObj::from_value("", doc)?;
    let mut prefixes = root.required_object("prefixes");
    root.drop_unknown();

    let mut result = ResolvedConfig::new();
    let mut keys = prefixes.keys();
    keys.sort();
    for prefix in keys {
        if prefix.starts_with('_') {
            continue;
        }
        let Some(mut entry) = prefixes.object_entry(&prefix) else {
            continue;
        };
        let handler = entry.required_string("handler");
        match handler.strip_prefix(STORAGE_HANDLER_PREFIX) {
            Some("") => entry.invalid("handler", format!("{handler:?} names no storage type")),
            Some(handler_type) => {
                let args = entry.required_object("handlerArgs");
                result.insert(
                    prefix.clone(),
                    BackendSpec::new(handler_type, args.into_fields()),
                );
            }
            None => {
                debug!(prefix = %prefix, handler = %handler, "ignoring non-storage handler");
                entry.drop_unknown();
            }
        }
        entry.validate()?;
    }

    root.validate()?;
    prefixes.validate()?;
    Ok(result)
}
