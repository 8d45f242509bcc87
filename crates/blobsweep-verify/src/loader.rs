use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use blobsweep_config::{ConfigObj, ResolvedConfig};
use blobsweep_store::{DependencyProvider, ResolveError, Storage, StorageRegistry, StoreError};

const BASE_URL: &str = "http://localhost:1234";
const MY_PREFIX: &str = "/lies/";

/// A prefix's instance, or `None` while unbuilt or after a failed build.
type Slot = Arc<Mutex<Option<Arc<dyn Storage>>>>;

/// Turns configured prefixes into live storage instances.
///
/// One loader exists per run. Each prefix is constructed at most once and
/// cached; constructors may resolve other prefixes while they run. The map
/// lock is only held to find a prefix's slot. Construction runs under that
/// slot's own lock, so a caller racing on the same prefix waits for the
/// instance instead of building a second one.
pub struct Loader {
    config: Arc<ResolvedConfig>,
    registry: StorageRegistry,
    cache: Mutex<HashMap<String, Slot>>,
}

impl Loader {
    pub fn new(config: ResolvedConfig, registry: StorageRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration this loader resolves against.
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// The storage for a prefix, constructing it on first use.
    pub fn resolve(&self, prefix: &str) -> Result<Arc<dyn Storage>, ResolveError> {
        self.root().resolve_storage(prefix)
    }

    /// Make an instance available under a prefix, replacing any cached one.
    ///
    /// The prefix gets a fresh slot, so this never waits on a construction
    /// in progress for the same prefix.
    pub fn register(&self, prefix: &str, storage: Arc<dyn Storage>) {
        self.cache
            .lock()
            .insert(prefix.to_string(), Arc::new(Mutex::new(Some(storage))));
    }

    /// Returns `true` if the prefix has a live instance.
    ///
    /// A prefix still under construction is not loaded yet.
    pub fn is_loaded(&self, prefix: &str) -> bool {
        self.cache
            .lock()
            .get(prefix)
            .and_then(|slot| slot.try_lock().map(|s| s.is_some()))
            .unwrap_or(false)
    }

    fn root(&self) -> Resolving<'_> {
        Resolving {
            loader: self,
            chain: Vec::new(),
        }
    }

    fn slot(&self, prefix: &str) -> Slot {
        Arc::clone(self.cache.lock().entry(prefix.to_string()).or_default())
    }

    /// Resolve `prefix` on behalf of the constructions in `chain`.
    ///
    /// The cycle check comes before the slot lock: a prefix on `chain` is
    /// being built further up this call path and already holds its slot.
    fn resolve_within(
        &self,
        prefix: &str,
        chain: &[String],
    ) -> Result<Arc<dyn Storage>, ResolveError> {
        if chain.iter().any(|p| p == prefix) {
            let mut chain = chain.to_vec();
            chain.push(prefix.to_string());
            return Err(ResolveError::Cycle { chain });
        }

        let slot = self.slot(prefix);
        let mut built = slot.lock();
        if let Some(storage) = built.as_ref() {
            return Ok(Arc::clone(storage));
        }
        let storage = self.construct(prefix, chain)?;
        *built = Some(Arc::clone(&storage));
        Ok(storage)
    }

    fn construct(
        &self,
        prefix: &str,
        chain: &[String],
    ) -> Result<Arc<dyn Storage>, ResolveError> {
        let spec = self
            .config
            .get(prefix)
            .ok_or_else(|| ResolveError::NoConfig {
                prefix: prefix.to_string(),
            })?;
        let handler = spec.handler_type.as_str();

        let mut path = chain.to_vec();
        path.push(prefix.to_string());
        let provider = Resolving {
            loader: self,
            chain: path,
        };
        let args = ConfigObj::new(
            format!("prefixes[{prefix:?}].handlerArgs"),
            spec.handler_args.clone(),
        );

        debug!(prefix, handler, "constructing storage");
        match self.registry.create(handler, &provider, args) {
            None => Err(ResolveError::UnknownHandler {
                prefix: prefix.to_string(),
                handler: handler.to_string(),
            }),
            Some(Ok(storage)) => Ok(storage),
            Some(Err(StoreError::Resolve(inner))) if matches!(*inner, ResolveError::Cycle { .. }) => {
                Err(*inner)
            }
            Some(Err(source)) => Err(ResolveError::Construction {
                prefix: prefix.to_string(),
                handler: handler.to_string(),
                source: Box::new(source),
            }),
        }
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut loaded: Vec<String> = self
            .cache
            .lock()
            .iter()
            .filter(|(_, slot)| slot.try_lock().is_some_and(|s| s.is_some()))
            .map(|(prefix, _)| prefix.clone())
            .collect();
        loaded.sort();
        f.debug_struct("Loader")
            .field("configured", &self.config.len())
            .field("loaded", &loaded)
            .finish()
    }
}

fn unsupported<T>(operation: &'static str) -> Result<T, ResolveError> {
    warn!(operation, "storage loader operation not supported");
    Err(ResolveError::Unsupported { operation })
}

impl DependencyProvider for Loader {
    fn resolve_storage(&self, prefix: &str) -> Result<Arc<dyn Storage>, ResolveError> {
        self.resolve(prefix)
    }

    fn register_storage(&self, prefix: &str, storage: Arc<dyn Storage>) {
        self.register(prefix, storage);
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn my_prefix(&self) -> &str {
        MY_PREFIX
    }

    fn handler_type(&self, prefix: &str) -> Option<String> {
        self.root().handler_type(prefix)
    }

    fn find_handler_by_type(
        &self,
        handler_type: &str,
    ) -> Result<(String, Arc<dyn Storage>), ResolveError> {
        self.root().find_handler_by_type(handler_type)
    }

    fn all_handlers(&self) -> Result<BTreeMap<String, String>, ResolveError> {
        self.root().all_handlers()
    }
}

/// The provider handed to a constructor: the loader plus the prefixes
/// being constructed on this call path. Empty at the top level.
struct Resolving<'a> {
    loader: &'a Loader,
    chain: Vec<String>,
}

impl DependencyProvider for Resolving<'_> {
    fn resolve_storage(&self, prefix: &str) -> Result<Arc<dyn Storage>, ResolveError> {
        self.loader.resolve_within(prefix, &self.chain)
    }

    fn register_storage(&self, prefix: &str, storage: Arc<dyn Storage>) {
        self.loader.register(prefix, storage);
    }

    fn base_url(&self) -> &str {
        BASE_URL
    }

    fn my_prefix(&self) -> &str {
        MY_PREFIX
    }

    fn handler_type(&self, prefix: &str) -> Option<String> {
        self.loader
            .config
            .get(prefix)
            .map(|spec| spec.handler_type.clone())
    }

    fn find_handler_by_type(
        &self,
        _handler_type: &str,
    ) -> Result<(String, Arc<dyn Storage>), ResolveError> {
        unsupported("find_handler_by_type")
    }

    fn all_handlers(&self) -> Result<BTreeMap<String, String>, ResolveError> {
        unsupported("all_handlers")
    }
}
