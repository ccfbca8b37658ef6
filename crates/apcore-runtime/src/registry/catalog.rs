//! Compile-time module catalog.
//!
//! Rust cannot import code from a discovered file the way a scripting
//! runtime does, so the embedding binary registers module *factories*
//! here, keyed `"file_stem:Symbol"`. Discovery then resolves a scanned
//! manifest to a factory: explicitly via metadata `entry_point`, via an
//! ID-map `class` hint, or by auto-inference when exactly one factory is
//! registered for the manifest's file stem.

use apcore_module::Module;
use apcore_types::ModuleError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A factory producing a module instance.
pub type ModuleFactory = Arc<dyn Fn() -> Result<Arc<dyn Module>, ModuleError> + Send + Sync>;

/// Registry of module factories available to discovery.
#[derive(Default)]
pub struct ModuleCatalog {
    factories: Mutex<HashMap<String, ModuleFactory>>,
}

impl ModuleCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `"{stem}:{symbol}"`.
    ///
    /// Later registrations under the same key replace earlier ones.
    pub fn register<F>(&self, stem: &str, symbol: &str, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Module>, ModuleError> + Send + Sync + 'static,
    {
        self.factories
            .lock()
            .insert(format!("{stem}:{symbol}"), Arc::new(factory));
    }

    /// Looks up a factory by full `"stem:Symbol"` key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ModuleFactory> {
        self.factories.lock().get(key).cloned()
    }

    /// All keys registered for a file stem, sorted.
    #[must_use]
    pub fn keys_for_stem(&self, stem: &str) -> Vec<String> {
        let prefix = format!("{stem}:");
        let mut keys: Vec<String> = self
            .factories
            .lock()
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.lock().len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.lock().is_empty()
    }
}
