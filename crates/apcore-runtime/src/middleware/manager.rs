//! Middleware manager: onion-model execution engine.
//!
//! # Concurrency
//!
//! A single lock protects the registered list. Execution acquires the
//! lock only long enough to take a shallow snapshot (a `Vec` of `Arc`s)
//! and then iterates the snapshot lock-free, so adding or removing a
//! middleware mid-flight never alters the list an in-flight execution
//! iterates.

use crate::middleware::Middleware;
use apcore_types::{Context, JsonMap, ModuleError};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::error;

/// Raised when a `before` hook fails. Carries the original error plus
/// the middlewares executed so far, so the recovery protocol knows whom
/// to consult.
pub struct MiddlewareChainError {
    /// The error the failing hook produced.
    pub original: ModuleError,
    /// Snapshot prefix executed up to and including the failing hook.
    pub executed: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for MiddlewareChainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChainError")
            .field("original", &self.original)
            .field(
                "executed",
                &self.executed.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Orchestrates the middleware pipeline.
#[derive(Default)]
pub struct MiddlewareManager {
    middlewares: Mutex<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware to the end of the execution list.
    pub fn add(&self, middleware: Arc<dyn Middleware>) {
        self.middlewares.lock().push(middleware);
    }

    /// Removes a middleware by identity (`Arc::ptr_eq`). Returns whether
    /// it was found and removed.
    pub fn remove(&self, middleware: &Arc<dyn Middleware>) -> bool {
        let mut middlewares = self.middlewares.lock();
        if let Some(index) = middlewares
            .iter()
            .position(|entry| Arc::ptr_eq(entry, middleware))
        {
            middlewares.remove(index);
            true
        } else {
            false
        }
    }

    /// Returns a shallow snapshot of the current list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<dyn Middleware>> {
        self.middlewares.lock().clone()
    }

    /// Number of registered middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.lock().len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.lock().is_empty()
    }

    /// Runs `before` hooks in registration order.
    ///
    /// Returns the final inputs and the executed snapshot prefix. Each
    /// middleware is appended to the executed list *before* its hook is
    /// called, so a failing hook is part of the prefix its own
    /// `on_error` will see.
    ///
    /// # Errors
    ///
    /// [`MiddlewareChainError`] wrapping the first hook failure.
    pub async fn execute_before(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        context: &Context,
    ) -> Result<(JsonMap, Vec<Arc<dyn Middleware>>), MiddlewareChainError> {
        let mut current = inputs.clone();
        let mut executed = Vec::new();

        for middleware in self.snapshot() {
            executed.push(Arc::clone(&middleware));
            match middleware.before(module_id, &current, context).await {
                Ok(Some(replacement)) => current = replacement,
                Ok(None) => {}
                Err(original) => {
                    return Err(MiddlewareChainError { original, executed });
                }
            }
        }

        Ok((current, executed))
    }

    /// Runs `after` hooks in reverse registration order.
    ///
    /// # Errors
    ///
    /// Hook failures propagate as-is (no wrapping).
    pub async fn execute_after(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        output: JsonMap,
        context: &Context,
    ) -> Result<JsonMap, ModuleError> {
        let mut current = output;
        for middleware in self.snapshot().into_iter().rev() {
            if let Some(replacement) = middleware
                .after(module_id, inputs, &current, context)
                .await?
            {
                current = replacement;
            }
        }
        Ok(current)
    }

    /// Runs `on_error` hooks in reverse over the executed prefix.
    ///
    /// The first non-`None` map returned is the recovery output;
    /// remaining handlers are not consulted. Handler failures are logged
    /// and skipped.
    pub async fn execute_on_error(
        &self,
        executed: &[Arc<dyn Middleware>],
        module_id: &str,
        inputs: &JsonMap,
        error: &ModuleError,
        context: &Context,
    ) -> Option<JsonMap> {
        for middleware in executed.iter().rev() {
            match middleware.on_error(module_id, inputs, error, context).await {
                Ok(Some(recovery)) => return Some(recovery),
                Ok(None) => {}
                Err(handler_error) => {
                    error!(
                        middleware = middleware.name(),
                        %handler_error,
                        "on_error handler failed"
                    );
                }
            }
        }
        None
    }
}
