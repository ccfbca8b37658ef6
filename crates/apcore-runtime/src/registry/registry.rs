//! The central module store and its discovery pipeline.
//!
//! # Locking
//!
//! One reentrant lock guards all registry state. It is held during
//! single mutations *and* during event-callback dispatch, so callbacks
//! may re-enter the registry for queries (the same thread re-acquires
//! the lock). Interior state sits in a `RefCell` behind the reentrant
//! lock; borrows are confined to individual operations and are never
//! held across callback invocations.

use crate::registry::catalog::ModuleCatalog;
use crate::registry::dependencies::resolve_dependencies;
use crate::registry::entry_point::resolve_entry_point;
use crate::registry::metadata::{
    load_id_map, load_metadata, merge_module_metadata, parse_dependencies, IdMapEntry,
};
use crate::registry::scanner::{scan_extensions, scan_multi_root, RootSpec};
use apcore_module::{
    validate_module, DependencyInfo, DiscoveredModule, Module, ModuleDescriptor,
};
use apcore_types::{Config, ErrorKind, JsonMap, ModuleError};
use once_cell::sync::Lazy;
use parking_lot::ReentrantMutex;
use regex::Regex;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};

static MODULE_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)*$")
        .expect("module id pattern is a valid regex")
});

/// Returns `true` when `id` satisfies the module-id grammar.
#[must_use]
pub fn is_valid_module_id(id: &str) -> bool {
    MODULE_ID_RE.is_match(id)
}

/// Registry lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryEvent {
    /// A module was registered.
    Register,
    /// A module was unregistered.
    Unregister,
}

/// Callback invoked on registry events with `(module_id, module)`.
pub type RegistryCallback = Arc<dyn Fn(&str, &Arc<dyn Module>) + Send + Sync>;

#[derive(Default)]
struct RegistryState {
    modules: HashMap<String, Arc<dyn Module>>,
    metadata: HashMap<String, JsonMap>,
    callbacks: HashMap<RegistryEvent, Vec<RegistryCallback>>,
    schema_cache: HashMap<String, Value>,
}

/// Thread-safe module store with filesystem discovery.
///
/// # Example
///
/// ```
/// use apcore_module::FunctionModule;
/// use apcore_runtime::Registry;
/// use std::sync::Arc;
///
/// let registry = Registry::new();
/// let module = FunctionModule::builder("greet.hello")
///     .description("Say hello")
///     .handler(|_, _| Ok(serde_json::Value::Null))
///     .build()
///     .expect("valid module");
///
/// registry.register("greet.hello", Arc::new(module)).expect("registers");
/// assert!(registry.has("greet.hello"));
/// assert_eq!(registry.count(), 1);
/// ```
pub struct Registry {
    state: ReentrantMutex<RefCell<RegistryState>>,
    roots: Vec<RootSpec>,
    id_map: HashMap<String, IdMapEntry>,
    catalog: Arc<ModuleCatalog>,
    config: Config,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a registry with the default `./extensions` root and an
    /// empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(RegistryState::default())),
            roots: vec![RootSpec::new("./extensions")],
            id_map: HashMap::new(),
            catalog: Arc::new(ModuleCatalog::new()),
            config: Config::new(),
        }
    }

    /// Uses the given configuration (`extensions.root`,
    /// `extensions.max_depth`, `extensions.follow_symlinks`).
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        if let Some(root) = config.get("extensions.root").and_then(Value::as_str) {
            self.roots = vec![RootSpec::new(root)];
        }
        self.config = config;
        self
    }

    /// Scans a single extensions root.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots = vec![RootSpec::new(root)];
        self
    }

    /// Scans multiple roots with optional namespaces.
    #[must_use]
    pub fn with_roots(mut self, roots: Vec<RootSpec>) -> Self {
        self.roots = roots;
        self
    }

    /// Uses the given factory catalog for entry-point resolution.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<ModuleCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    /// Loads an ID-map file for canonical-id overrides.
    ///
    /// # Errors
    ///
    /// `CONFIG_NOT_FOUND` / `CONFIG_INVALID` from map loading.
    pub fn with_id_map(mut self, path: impl AsRef<Path>) -> Result<Self, ModuleError> {
        self.id_map = load_id_map(path.as_ref())?;
        Ok(self)
    }

    /// The factory catalog used by discovery.
    #[must_use]
    pub fn catalog(&self) -> &Arc<ModuleCatalog> {
        &self.catalog
    }

    // ----- Manual registration -----

    /// Registers a module instance.
    ///
    /// Invokes the module's `on_load` hook; when it fails, the entry is
    /// removed again and the error propagates. Listeners observe the
    /// `Register` event afterwards; a listener failure (panic) is
    /// logged and swallowed, never failing the registration.
    ///
    /// # Errors
    ///
    /// `GENERAL_INVALID_INPUT` for an id that violates the grammar or is
    /// already registered; anything `on_load` returns.
    pub fn register(&self, module_id: &str, module: Arc<dyn Module>) -> Result<(), ModuleError> {
        if !is_valid_module_id(module_id) {
            return Err(ModuleError::invalid_input(format!(
                "invalid module id: '{module_id}'"
            )));
        }

        let guard = self.state.lock();
        {
            let mut state = guard.borrow_mut();
            if state.modules.contains_key(module_id) {
                return Err(ModuleError::invalid_input(format!(
                    "module already exists: {module_id}"
                )));
            }
            state.modules.insert(module_id.to_string(), Arc::clone(&module));
        }

        if let Err(e) = module.on_load() {
            guard.borrow_mut().modules.remove(module_id);
            return Err(e);
        }

        self.dispatch_event(&guard, RegistryEvent::Register, module_id, &module);
        Ok(())
    }

    /// Removes a module. Returns `false` when it was not registered.
    pub fn unregister(&self, module_id: &str) -> bool {
        let guard = self.state.lock();
        let module = {
            let mut state = guard.borrow_mut();
            let Some(module) = state.modules.remove(module_id) else {
                return false;
            };
            state.metadata.remove(module_id);
            state.schema_cache.remove(module_id);
            module
        };

        module.on_unload();
        self.dispatch_event(&guard, RegistryEvent::Unregister, module_id, &module);
        true
    }

    // ----- Queries -----

    /// Looks up a module by id.
    #[must_use]
    pub fn get(&self, module_id: &str) -> Option<Arc<dyn Module>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.modules.get(module_id).cloned()
    }

    /// Whether a module is registered.
    #[must_use]
    pub fn has(&self, module_id: &str) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.modules.contains_key(module_id)
    }

    /// Number of registered modules.
    #[must_use]
    pub fn count(&self) -> usize {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.modules.len()
    }

    /// Sorted list of registered module ids.
    #[must_use]
    pub fn module_ids(&self) -> Vec<String> {
        let guard = self.state.lock();
        let state = guard.borrow();
        let mut ids: Vec<String> = state.modules.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of `(id, module)` pairs.
    #[must_use]
    pub fn iter(&self) -> Vec<(String, Arc<dyn Module>)> {
        let guard = self.state.lock();
        let state = guard.borrow();
        let mut items: Vec<(String, Arc<dyn Module>)> = state
            .modules
            .iter()
            .map(|(id, module)| (id.clone(), Arc::clone(module)))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    /// Sorted module ids filtered by tags (all must be present) and id
    /// prefix. Tags are read from both the module and merged metadata.
    #[must_use]
    pub fn list(&self, tags: Option<&[String]>, prefix: Option<&str>) -> Vec<String> {
        let (modules, metadata): (Vec<(String, Arc<dyn Module>)>, HashMap<String, JsonMap>) = {
            let guard = self.state.lock();
            let state = guard.borrow();
            (
                state
                    .modules
                    .iter()
                    .map(|(id, module)| (id.clone(), Arc::clone(module)))
                    .collect(),
                state.metadata.clone(),
            )
        };

        let mut ids: Vec<String> = modules
            .into_iter()
            .filter(|(id, _)| prefix.map_or(true, |p| id.starts_with(p)))
            .filter(|(id, module)| {
                let Some(wanted) = tags else { return true };
                let mut have: HashSet<String> =
                    module.tags().iter().cloned().collect();
                if let Some(meta_tags) = metadata
                    .get(id)
                    .and_then(|meta| meta.get("tags"))
                    .and_then(Value::as_array)
                {
                    have.extend(
                        meta_tags
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string),
                    );
                }
                wanted.iter().all(|tag| have.contains(tag))
            })
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        ids
    }

    /// Composes the descriptor for a registered module from its
    /// attributes and merged metadata.
    #[must_use]
    pub fn get_definition(&self, module_id: &str) -> Option<ModuleDescriptor> {
        let (module, meta) = {
            let guard = self.state.lock();
            let state = guard.borrow();
            let module = state.modules.get(module_id)?.clone();
            let meta = state.metadata.get(module_id).cloned().unwrap_or_default();
            (module, meta)
        };

        let meta_str = |key: &str| meta.get(key).and_then(Value::as_str).map(str::to_string);

        let annotations = meta
            .get("annotations")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .or_else(|| Some(module.annotations()));

        let examples = meta
            .get("examples")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_else(|| module.examples());

        let tags = meta
            .get("tags")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_else(|| module.tags().to_vec());

        Some(ModuleDescriptor {
            module_id: module_id.to_string(),
            name: meta_str("name"),
            description: meta_str("description")
                .unwrap_or_else(|| module.description().to_string()),
            documentation: meta_str("documentation")
                .or_else(|| module.documentation().map(str::to_string)),
            input_schema: module.input_schema().json().clone(),
            output_schema: module.output_schema().json().clone(),
            version: meta_str("version").unwrap_or_else(|| module.version().to_string()),
            tags,
            annotations,
            examples,
            metadata: meta
                .get("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_else(|| module.metadata()),
        })
    }

    // ----- Events -----

    /// Registers an event listener.
    pub fn on(&self, event: RegistryEvent, callback: RegistryCallback) {
        let guard = self.state.lock();
        guard
            .borrow_mut()
            .callbacks
            .entry(event)
            .or_default()
            .push(callback);
    }

    fn dispatch_event(
        &self,
        guard: &parking_lot::ReentrantMutexGuard<'_, RefCell<RegistryState>>,
        event: RegistryEvent,
        module_id: &str,
        module: &Arc<dyn Module>,
    ) {
        // Copy callbacks out so no RefCell borrow is held while they
        // run; the reentrant lock stays held, so callbacks may query
        // the registry but concurrent threads cannot interleave.
        let callbacks: Vec<RegistryCallback> = guard
            .borrow()
            .callbacks
            .get(&event)
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(module_id, module);
            }));
            if result.is_err() {
                error!(%module_id, ?event, "registry event callback panicked");
            }
        }
    }

    // ----- Cache -----

    /// Purges the internal schema cache.
    pub fn clear_cache(&self) {
        let guard = self.state.lock();
        guard.borrow_mut().schema_cache.clear();
    }

    // ----- Discovery -----

    /// Runs the 8-step discovery pipeline over the configured roots.
    ///
    /// Returns the number of modules successfully registered; logs a
    /// warning when zero.
    ///
    /// # Errors
    ///
    /// `CONFIG_NOT_FOUND` for a missing root, `CONFIG_INVALID` for
    /// duplicate namespaces, `MODULE_LOAD_ERROR` for a missing required
    /// dependency, `CIRCULAR_DEPENDENCY` for dependency cycles.
    /// Per-module resolution and validation failures are logged and the
    /// module skipped.
    pub fn discover(&self) -> Result<usize, ModuleError> {
        let max_depth = self.config.get_i64("extensions.max_depth", 8).max(0) as usize;
        let follow_symlinks = self.config.get_bool("extensions.follow_symlinks", false);

        // Step 1: scan.
        let has_namespace = self.roots.iter().any(|r| r.namespace.is_some());
        let mut discovered = if self.roots.len() > 1 || has_namespace {
            scan_multi_root(&self.roots, max_depth, follow_symlinks)?
        } else {
            let root = self
                .roots
                .first()
                .map(|spec| spec.root.clone())
                .unwrap_or_else(|| PathBuf::from("./extensions"));
            scan_extensions(&root, max_depth, follow_symlinks)?
        };

        // Step 2: ID-map overrides.
        if !self.id_map.is_empty() {
            let resolved_roots: Vec<PathBuf> = self
                .roots
                .iter()
                .filter_map(|spec| spec.root.canonicalize().ok())
                .collect();
            for module in &mut discovered {
                let rel = resolved_roots.iter().find_map(|root| {
                    module
                        .file_path
                        .strip_prefix(root)
                        .ok()
                        .map(|p| p.to_string_lossy().into_owned())
                });
                if let Some(entry) = rel.and_then(|rel| self.id_map.get(&rel)) {
                    module.canonical_id = entry.id.clone();
                }
            }
        }

        // Step 3: metadata.
        let mut raw_metadata: HashMap<String, JsonMap> = HashMap::new();
        for module in &discovered {
            let meta = match &module.meta_path {
                Some(path) => load_metadata(path)?,
                None => JsonMap::new(),
            };
            raw_metadata.insert(module.canonical_id.clone(), meta);
        }

        // Steps 4 + 5: resolve entry points and validate.
        let mut resolved: HashMap<String, Arc<dyn Module>> = HashMap::new();
        for module in &discovered {
            let meta = raw_metadata
                .get(&module.canonical_id)
                .cloned()
                .unwrap_or_default();
            let class_hint = self.class_hint_for(module);
            let instance =
                match resolve_entry_point(module, &meta, class_hint.as_deref(), &self.catalog) {
                    Ok(instance) => instance,
                    Err(e) => {
                        warn!(
                            module_id = %module.canonical_id,
                            %e,
                            "failed to resolve entry point"
                        );
                        continue;
                    }
                };

            let problems = validate_module(instance.as_ref());
            if !problems.is_empty() {
                warn!(
                    module_id = %module.canonical_id,
                    problems = %problems.join("; "),
                    "module failed validation"
                );
                continue;
            }
            resolved.insert(module.canonical_id.clone(), instance);
        }

        // Step 6: collect dependencies.
        let modules_with_deps: Vec<(String, Vec<DependencyInfo>)> = resolved
            .keys()
            .map(|id| {
                let deps = raw_metadata
                    .get(id)
                    .and_then(|meta| meta.get("dependencies"))
                    .map(parse_dependencies)
                    .unwrap_or_default();
                (id.clone(), deps)
            })
            .collect();

        // Step 7: topological order.
        let known_ids: HashSet<String> = resolved.keys().cloned().collect();
        let load_order = resolve_dependencies(&modules_with_deps, &known_ids)?;

        // Step 8: register in order, merging metadata over code defaults.
        let mut registered = 0usize;
        for module_id in load_order {
            let Some(instance) = resolved.remove(&module_id) else {
                continue;
            };
            let meta = raw_metadata.get(&module_id).cloned().unwrap_or_default();
            let merged = merge_module_metadata(instance.as_ref(), &meta);

            if let Err(e) = self.register(&module_id, Arc::clone(&instance)) {
                error!(%module_id, %e, "failed to register discovered module");
                continue;
            }
            {
                let guard = self.state.lock();
                guard.borrow_mut().metadata.insert(module_id.clone(), merged);
            }
            registered += 1;
        }

        if registered == 0 {
            if discovered.is_empty() {
                warn!("no modules discovered");
            } else {
                warn!(
                    discovered = discovered.len(),
                    "no modules successfully registered"
                );
            }
        }
        Ok(registered)
    }

    fn class_hint_for(&self, module: &DiscoveredModule) -> Option<String> {
        if self.id_map.is_empty() {
            return None;
        }
        let resolved_roots: Vec<PathBuf> = self
            .roots
            .iter()
            .filter_map(|spec| spec.root.canonicalize().ok())
            .collect();
        let rel = resolved_roots.iter().find_map(|root| {
            module
                .file_path
                .strip_prefix(root)
                .ok()
                .map(|p| p.to_string_lossy().into_owned())
        })?;
        self.id_map.get(&rel)?.class_hint.clone()
    }
}
