//! Callback adapters for the middleware system.
//!
//! Wrap a single `before`- or `after`-style callback as a full
//! middleware whose other hooks no-op. Used by the executor's
//! `use_before` / `use_after` conveniences.

use crate::middleware::Middleware;
use apcore_types::{Context, JsonMap, ModuleError};
use async_trait::async_trait;

type BeforeCallback =
    dyn Fn(&str, &JsonMap, &Context) -> Result<Option<JsonMap>, ModuleError> + Send + Sync;
type AfterCallback = dyn Fn(&str, &JsonMap, &JsonMap, &Context) -> Result<Option<JsonMap>, ModuleError>
    + Send
    + Sync;

/// Wraps a before-only callback as a middleware.
pub struct BeforeMiddleware {
    callback: Box<BeforeCallback>,
}

impl BeforeMiddleware {
    /// Wraps the callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, &JsonMap, &Context) -> Result<Option<JsonMap>, ModuleError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Middleware for BeforeMiddleware {
    fn name(&self) -> &str {
        "BeforeMiddleware"
    }

    async fn before(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        (self.callback)(module_id, inputs, context)
    }
}

/// Wraps an after-only callback as a middleware.
pub struct AfterMiddleware {
    callback: Box<AfterCallback>,
}

impl AfterMiddleware {
    /// Wraps the callback.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str, &JsonMap, &JsonMap, &Context) -> Result<Option<JsonMap>, ModuleError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl Middleware for AfterMiddleware {
    fn name(&self) -> &str {
        "AfterMiddleware"
    }

    async fn after(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        output: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        (self.callback)(module_id, inputs, output, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        Context::root().child("m")
    }

    #[tokio::test]
    async fn before_adapter_delegates() {
        let mw = BeforeMiddleware::new(|_, inputs, _| {
            let mut next = inputs.clone();
            next.insert("seen".into(), json!(true));
            Ok(Some(next))
        });
        let result = mw
            .before("m", &JsonMap::new(), &ctx())
            .await
            .expect("ok")
            .expect("replacement");
        assert_eq!(result["seen"], json!(true));

        // Other hooks stay no-ops.
        assert!(mw
            .after("m", &JsonMap::new(), &JsonMap::new(), &ctx())
            .await
            .expect("ok")
            .is_none());
    }

    #[tokio::test]
    async fn after_adapter_delegates() {
        let mw = AfterMiddleware::new(|_, _, output, _| {
            let mut next = output.clone();
            next.insert("stamped".into(), json!(1));
            Ok(Some(next))
        });
        let result = mw
            .after("m", &JsonMap::new(), &JsonMap::new(), &ctx())
            .await
            .expect("ok")
            .expect("replacement");
        assert_eq!(result["stamped"], json!(1));

        assert!(mw
            .before("m", &JsonMap::new(), &ctx())
            .await
            .expect("ok")
            .is_none());
    }
}
