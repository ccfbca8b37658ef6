//! Per-call execution context.
//!
//! A [`Context`] is created at the root of a call tree and derived once per
//! nested call. It carries the trace id, the caller, the chain of module
//! ids visited so far, the caller identity, and the redacted copy of the
//! current inputs.
//!
//! # Shared data
//!
//! `Context::data()` exposes a [`DataMap`] that is **shared by reference**
//! (via `Arc`) between a parent and every derived child of the same call
//! tree. Middlewares use it to keep per-trace stacks (span stack, timing
//! stacks); a single slot would be clobbered when the same middleware
//! instance appears in overlapping frames of one tree, so the map offers
//! typed stack helpers ([`DataMap::push`] / [`DataMap::pop`]).
//!
//! # Example
//!
//! ```
//! use apcore_types::Context;
//!
//! let root = Context::root();
//! let child = root.child("greet.hello");
//! let grandchild = child.child("greet.format");
//!
//! assert_eq!(child.trace_id, root.trace_id);
//! assert_eq!(child.caller_id, None);
//! assert_eq!(grandchild.caller_id.as_deref(), Some("greet.hello"));
//! assert_eq!(grandchild.call_chain, vec!["greet.hello", "greet.format"]);
//!
//! // data is shared across the whole tree
//! child.data().push("stack", 1u32);
//! assert_eq!(grandchild.data().pop::<u32>("stack"), Some(1));
//! ```

use crate::Identity;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Concurrent, type-erased key/value store shared across one call tree.
///
/// Values are `Box<dyn Any + Send>`; the typed accessors downcast on read.
/// A read with the wrong type behaves like a miss.
#[derive(Default)]
pub struct DataMap {
    entries: Mutex<HashMap<String, Box<dyn Any + Send>>>,
}

impl DataMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any previous entry under the key.
    pub fn insert<T: Any + Send>(&self, key: &str, value: T) {
        self.entries.lock().insert(key.to_string(), Box::new(value));
    }

    /// Returns a clone of the value stored under `key`, if present with
    /// the requested type.
    #[must_use]
    pub fn get<T: Any + Send + Clone>(&self, key: &str) -> Option<T> {
        self.entries
            .lock()
            .get(key)
            .and_then(|boxed| boxed.downcast_ref::<T>())
            .cloned()
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// The entry is removed only when it holds the requested type.
    #[must_use]
    pub fn remove<T: Any + Send>(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock();
        if !entries.get(key).is_some_and(|b| b.is::<T>()) {
            return None;
        }
        entries
            .remove(key)
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    /// Returns `true` if an entry exists under `key` (any type).
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Pushes onto the `Vec<T>` stack stored under `key`, creating the
    /// stack when absent.
    pub fn push<T: Any + Send>(&self, key: &str, value: T) {
        let mut entries = self.entries.lock();
        let slot = entries
            .entry(key.to_string())
            .or_insert_with(|| Box::new(Vec::<T>::new()));
        if let Some(stack) = slot.downcast_mut::<Vec<T>>() {
            stack.push(value);
        }
    }

    /// Pops from the `Vec<T>` stack stored under `key`.
    #[must_use]
    pub fn pop<T: Any + Send>(&self, key: &str) -> Option<T> {
        self.entries
            .lock()
            .get_mut(key)
            .and_then(|boxed| boxed.downcast_mut::<Vec<T>>())
            .and_then(Vec::pop)
    }

    /// Returns a clone of the top of the `Vec<T>` stack under `key`.
    #[must_use]
    pub fn top<T: Any + Send + Clone>(&self, key: &str) -> Option<T> {
        self.entries
            .lock()
            .get(key)
            .and_then(|boxed| boxed.downcast_ref::<Vec<T>>())
            .and_then(|stack| stack.last().cloned())
    }

    /// Current depth of the `Vec<T>` stack under `key` (0 when absent).
    #[must_use]
    pub fn stack_len<T: Any + Send>(&self, key: &str) -> usize {
        self.entries
            .lock()
            .get(key)
            .and_then(|boxed| boxed.downcast_ref::<Vec<T>>())
            .map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for DataMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        f.debug_struct("DataMap").field("keys", &keys).finish()
    }
}

/// Module execution context.
///
/// Derived per call; see the module docs for sharing semantics.
#[derive(Debug, Clone)]
pub struct Context {
    /// Trace id of the whole call tree (UUID v4, generated at the root).
    pub trace_id: String,
    /// The previous module in the chain; `None` for root external calls.
    pub caller_id: Option<String>,
    /// Module ids visited so far, current module last.
    pub call_chain: Vec<String>,
    /// Caller identity; propagated unchanged to descendants.
    pub identity: Option<Identity>,
    /// Copy of the current inputs with sensitive fields masked. Written by
    /// the executor after input validation, read by logging middlewares.
    pub redacted_inputs: Option<Map<String, Value>>,
    data: Arc<DataMap>,
}

impl Context {
    /// Creates a new top-level context with a generated trace id and an
    /// empty call chain.
    #[must_use]
    pub fn root() -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            caller_id: None,
            call_chain: Vec::new(),
            identity: None,
            redacted_inputs: None,
            data: Arc::new(DataMap::new()),
        }
    }

    /// Sets the caller identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Derives a child context for calling `target_module_id`.
    ///
    /// The child appends the target to the call chain, takes the previous
    /// chain tail as its `caller_id`, and shares `data` with this context.
    /// `redacted_inputs` is per-call and starts empty.
    #[must_use]
    pub fn child(&self, target_module_id: &str) -> Self {
        let mut call_chain = self.call_chain.clone();
        call_chain.push(target_module_id.to_string());
        Self {
            trace_id: self.trace_id.clone(),
            caller_id: self.call_chain.last().cloned(),
            call_chain,
            identity: self.identity.clone(),
            redacted_inputs: None,
            data: Arc::clone(&self.data),
        }
    }

    /// The shared per-tree data map.
    #[must_use]
    pub fn data(&self) -> &DataMap {
        &self.data
    }

    /// The module currently executing (`call_chain` tail).
    #[must_use]
    pub fn current_module(&self) -> Option<&str> {
        self.call_chain.last().map(String::as_str)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::root()
    }
}
