use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// A JSON object read strictly.
///
/// Every accessor marks its key as consumed. Type errors and missing keys do
/// not fail immediately: they are recorded and the accessor returns a
/// harmless default, so a caller can read all of its keys and then report
/// the first problem from [`ConfigObj::validate`]. Keys starting with `_` are
/// comments and are never reported as unknown.
#[derive(Debug, Default)]
pub struct ConfigObj {
    path: String,
    fields: Map<String, Value>,
    consumed: BTreeSet<String>,
    errors: Vec<ConfigError>,
}

impl ConfigObj {
    /// Wrap an already-extracted map found at `path`.
    pub fn new(path: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            fields,
            consumed: BTreeSet::new(),
            errors: Vec::new(),
        }
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(path: impl Into<String>, value: Value) -> ConfigResult<Self> {
        let path = path.into();
        match value {
            Value::Object(fields) => Ok(Self::new(path, fields)),
            other => Err(ConfigError::NotAnObject {
                path,
                found: json_type(&other),
            }),
        }
    }

    /// Path of this object within the document (empty for the root).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// All keys currently present, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Number of keys currently present.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the object has no keys.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Path of a child key, e.g. `prefixes["/bs/"]` or `handlerArgs.path`.
    pub fn child_path(&self, key: &str) -> String {
        let plain = !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        match (self.path.is_empty(), plain) {
            (true, true) => key.to_string(),
            (true, false) => format!("[{key:?}]"),
            (false, true) => format!("{}.{key}", self.path),
            (false, false) => format!("{}[{key:?}]", self.path),
        }
    }

    fn take(&mut self, key: &str) -> Option<&Value> {
        self.consumed.insert(key.to_string());
        self.fields.get(key)
    }

    fn missing(&mut self, key: &str, expected: &'static str) {
        self.errors.push(ConfigError::MissingKey {
            path: self.path.clone(),
            key: key.to_string(),
            expected,
        });
    }

    fn wrong_type(&mut self, key: &str, expected: &'static str, found: &'static str) {
        self.errors.push(ConfigError::WrongType {
            path: self.path.clone(),
            key: key.to_string(),
            expected,
            found,
        });
    }

    /// Record a problem with a key's value found by the caller.
    pub fn invalid(&mut self, key: &str, reason: impl Into<String>) {
        self.errors.push(ConfigError::InvalidValue {
            path: self.path.clone(),
            key: key.to_string(),
            reason: reason.into(),
        });
    }

    /// Read a required object. On error an empty object is returned.
    pub fn required_object(&mut self, key: &str) -> ConfigObj {
        let child = self.child_path(key);
        match self.take(key).cloned() {
            Some(Value::Object(fields)) => ConfigObj::new(child, fields),
            Some(other) => {
                self.wrong_type(key, "an object", json_type(&other));
                ConfigObj::new(child, Map::new())
            }
            None => {
                self.missing(key, "object");
                ConfigObj::new(child, Map::new())
            }
        }
    }

    /// Read a required object, or `None` if it is missing or mistyped.
    ///
    /// The error is still recorded on `self`, so it surfaces when this
    /// object is validated.
    pub fn object_entry(&mut self, key: &str) -> Option<ConfigObj> {
        let child = self.child_path(key);
        match self.take(key).cloned() {
            Some(Value::Object(fields)) => Some(ConfigObj::new(child, fields)),
            Some(other) => {
                self.wrong_type(key, "an object", json_type(&other));
                None
            }
            None => {
                self.missing(key, "object");
                None
            }
        }
    }

    /// Read an optional object.
    pub fn optional_object(&mut self, key: &str) -> Option<ConfigObj> {
        let child = self.child_path(key);
        match self.take(key).cloned() {
            Some(Value::Object(fields)) => Some(ConfigObj::new(child, fields)),
            Some(Value::Null) | None => None,
            Some(other) => {
                self.wrong_type(key, "an object", json_type(&other));
                None
            }
        }
    }

    /// Read a required string. On error an empty string is returned.
    pub fn required_string(&mut self, key: &str) -> String {
        match self.take(key).cloned() {
            Some(Value::String(s)) => s,
            Some(other) => {
                self.wrong_type(key, "a string", json_type(&other));
                String::new()
            }
            None => {
                self.missing(key, "string");
                String::new()
            }
        }
    }

    /// Read an optional string, falling back to `default`.
    pub fn optional_string(&mut self, key: &str, default: &str) -> String {
        match self.take(key).cloned() {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => default.to_string(),
            Some(other) => {
                self.wrong_type(key, "a string", json_type(&other));
                default.to_string()
            }
        }
    }

    /// Read an optional non-negative integer, falling back to `default`.
    pub fn optional_u64(&mut self, key: &str, default: u64) -> u64 {
        match self.take(key).cloned() {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(v) => v,
                None => {
                    self.invalid(key, format!("{n} is not a non-negative integer"));
                    default
                }
            },
            Some(Value::Null) | None => default,
            Some(other) => {
                self.wrong_type(key, "a number", json_type(&other));
                default
            }
        }
    }

    /// Read an optional boolean, falling back to `default`.
    pub fn optional_bool(&mut self, key: &str, default: bool) -> bool {
        match self.take(key).cloned() {
            Some(Value::Bool(b)) => b,
            Some(Value::Null) | None => default,
            Some(other) => {
                self.wrong_type(key, "a boolean", json_type(&other));
                default
            }
        }
    }

    /// Keys that were neither consumed nor comments.
    pub fn unknown_keys(&self) -> Vec<String> {
        self.fields
            .keys()
            .filter(|k| !k.starts_with('_') && !self.consumed.contains(*k))
            .cloned()
            .collect()
    }

    /// Remove every key that has not been consumed so far.
    pub fn drop_unknown(&mut self) {
        for key in self.unknown_keys() {
            self.fields.remove(&key);
        }
    }

    /// Fail with the first recorded error, or the first unknown key.
    pub fn validate(mut self) -> ConfigResult<()> {
        if !self.errors.is_empty() {
            return Err(self.errors.swap_remove(0));
        }
        match self.unknown_keys().into_iter().next() {
            Some(key) => Err(ConfigError::UnknownKey {
                path: self.path,
                key,
            }),
            None => Ok(()),
        }
    }

    /// The underlying fields, consumed or not.
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Human-readable JSON type name, for error messages.
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
