//! The `Middleware` trait.

use apcore_types::{Context, JsonMap, ModuleError};
use async_trait::async_trait;

/// A middleware participating in the onion pipeline.
///
/// All three hooks default to no-ops, so implementations override only
/// what they need. Hooks receive payloads by reference and signal
/// "replace" by returning `Some(new_map)`; `None` passes the current
/// payload through unchanged. In-place mutation is impossible by
/// construction.
///
/// The interface is uniformly async; synchronous middlewares simply
/// return without suspending.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in chain-error details and logs.
    fn name(&self) -> &str {
        "middleware"
    }

    /// Called before module execution, in registration order.
    ///
    /// # Errors
    ///
    /// A failure aborts the before-chain and triggers the error-recovery
    /// protocol over the already-executed prefix.
    async fn before(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        let _ = (module_id, inputs, context);
        Ok(None)
    }

    /// Called after module execution, in reverse registration order.
    ///
    /// # Errors
    ///
    /// Failures propagate to the caller (after a recovery attempt).
    async fn after(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        output: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        let _ = (module_id, inputs, output, context);
        Ok(None)
    }

    /// Called when execution fails, in reverse order over the executed
    /// prefix. The first middleware returning `Some(map)` provides the
    /// recovery output.
    ///
    /// # Errors
    ///
    /// Failures here are logged and swallowed by the manager; the chain
    /// continues with the next handler.
    async fn on_error(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        error: &ModuleError,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        let _ = (module_id, inputs, error, context);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The base abstraction is concrete: a unit struct with no overrides
    /// is a valid (fully transparent) middleware.
    struct Transparent;

    impl Middleware for Transparent {}

    #[tokio::test]
    async fn default_hooks_are_no_ops() {
        let mw = Transparent;
        let ctx = Context::root().child("m");
        let inputs = JsonMap::new();
        let output = JsonMap::new();
        let error = ModuleError::invalid_input("x");

        assert_eq!(mw.name(), "middleware");
        assert!(mw.before("m", &inputs, &ctx).await.expect("ok").is_none());
        assert!(mw
            .after("m", &inputs, &output, &ctx)
            .await
            .expect("ok")
            .is_none());
        assert!(mw
            .on_error("m", &inputs, &error, &ctx)
            .await
            .expect("ok")
            .is_none());
    }
}
