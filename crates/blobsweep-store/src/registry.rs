use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use blobsweep_config::ConfigObj;

use crate::backend::{FilesystemStorage, MemoryStorage, PackedStorage};
use crate::error::StoreResult;
use crate::traits::{DependencyProvider, Storage};

/// Builds a storage instance from its `handlerArgs`.
///
/// The provider gives access to other configured prefixes. Constructors
/// must validate their arguments, so unknown keys are rejected.
pub type Constructor =
    Arc<dyn Fn(&dyn DependencyProvider, ConfigObj) -> StoreResult<Arc<dyn Storage>> + Send + Sync>;

/// Storage constructors keyed by handler type.
///
/// Passed explicitly to whatever resolves prefixes, so tests can build a
/// registry containing only what they need.
#[derive(Clone, Default)]
pub struct StorageRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl StorageRegistry {
    /// A registry with no constructors.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `memory`, `filesystem`, and `packed` types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("memory", |_, args| {
            Ok(Arc::new(MemoryStorage::from_config(args)?) as Arc<dyn Storage>)
        });
        registry.register("filesystem", |_, args| {
            Ok(Arc::new(FilesystemStorage::from_config(args)?) as Arc<dyn Storage>)
        });
        registry.register("packed", |provider, args| {
            Ok(Arc::new(PackedStorage::from_config(provider, args)?) as Arc<dyn Storage>)
        });
        registry
    }

    /// Register a constructor, replacing any previous one for the type.
    pub fn register<F>(&mut self, handler_type: impl Into<String>, constructor: F)
    where
        F: Fn(&dyn DependencyProvider, ConfigObj) -> StoreResult<Arc<dyn Storage>>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .insert(handler_type.into(), Arc::new(constructor));
    }

    /// The constructor for a handler type.
    pub fn constructor(&self, handler_type: &str) -> Option<&Constructor> {
        self.constructors.get(handler_type)
    }

    /// Build a storage instance of the given type.
    ///
    /// Returns `None` if no constructor is registered for the type.
    pub fn create(
        &self,
        handler_type: &str,
        provider: &dyn DependencyProvider,
        args: ConfigObj,
    ) -> Option<StoreResult<Arc<dyn Storage>>> {
        self.constructor(handler_type)
            .map(|constructor| constructor(provider, args))
    }

    /// Every registered handler type, sorted.
    pub fn handler_types(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("handler_types", &self.handler_types().collect::<Vec<_>>())
            .finish()
    }
}
