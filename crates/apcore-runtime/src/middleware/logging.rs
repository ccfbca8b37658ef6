//! Call logging middleware built on `tracing`.
//!
//! Logs module call start, completion (with duration) and failure using
//! `context.redacted_inputs` so sensitive values never reach the log.
//! Per-call state lives in a stack on `context.data`, which keeps
//! nested calls of the same middleware instance from clobbering each
//! other.

use crate::middleware::Middleware;
use apcore_types::{Context, JsonMap, ModuleError};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{error, info};

const START_STACK_KEY: &str = "_logging_mw_starts";

/// Structured call logging with security-aware redaction.
pub struct LoggingMiddleware {
    log_inputs: bool,
    log_outputs: bool,
    log_errors: bool,
}

impl Default for LoggingMiddleware {
    fn default() -> Self {
        Self {
            log_inputs: true,
            log_outputs: true,
            log_errors: true,
        }
    }
}

impl LoggingMiddleware {
    /// Creates a middleware that logs inputs, outputs, and errors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Controls input logging.
    #[must_use]
    pub fn with_log_inputs(mut self, log_inputs: bool) -> Self {
        self.log_inputs = log_inputs;
        self
    }

    /// Controls output logging.
    #[must_use]
    pub fn with_log_outputs(mut self, log_outputs: bool) -> Self {
        self.log_outputs = log_outputs;
        self
    }

    /// Controls error logging.
    #[must_use]
    pub fn with_log_errors(mut self, log_errors: bool) -> Self {
        self.log_errors = log_errors;
        self
    }
}

fn redacted_for_log<'a>(context: &'a Context, inputs: &'a JsonMap) -> &'a JsonMap {
    context.redacted_inputs.as_ref().unwrap_or(inputs)
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "LoggingMiddleware"
    }

    async fn before(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        context.data().push(START_STACK_KEY, Instant::now());

        if self.log_inputs {
            info!(
                trace_id = %context.trace_id,
                module_id,
                caller_id = context.caller_id.as_deref().unwrap_or(""),
                inputs = %serde_json::Value::Object(redacted_for_log(context, inputs).clone()),
                "module call start"
            );
        }
        Ok(None)
    }

    async fn after(
        &self,
        module_id: &str,
        _inputs: &JsonMap,
        output: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        let duration_ms = context
            .data()
            .pop::<Instant>(START_STACK_KEY)
            .map_or(0.0, |start| start.elapsed().as_secs_f64() * 1000.0);

        if self.log_outputs {
            info!(
                trace_id = %context.trace_id,
                module_id,
                duration_ms,
                output = %serde_json::Value::Object(output.clone()),
                "module call end"
            );
        }
        Ok(None)
    }

    async fn on_error(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        error: &ModuleError,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        let _ = context.data().pop::<Instant>(START_STACK_KEY);

        if self.log_errors {
            error!(
                trace_id = %context.trace_id,
                module_id,
                %error,
                inputs = %serde_json::Value::Object(redacted_for_log(context, inputs).clone()),
                "module call failed"
            );
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stack_balanced_on_success() {
        let mw = LoggingMiddleware::new();
        let ctx = Context::root().child("m");

        mw.before("m", &JsonMap::new(), &ctx).await.expect("before");
        assert_eq!(ctx.data().stack_len::<Instant>(START_STACK_KEY), 1);

        mw.after("m", &JsonMap::new(), &JsonMap::new(), &ctx)
            .await
            .expect("after");
        assert_eq!(ctx.data().stack_len::<Instant>(START_STACK_KEY), 0);
    }

    #[tokio::test]
    async fn stack_balanced_on_error() {
        let mw = LoggingMiddleware::new().with_log_errors(false);
        let ctx = Context::root().child("m");

        mw.before("m", &JsonMap::new(), &ctx).await.expect("before");
        mw.on_error("m", &JsonMap::new(), &ModuleError::internal("x"), &ctx)
            .await
            .expect("on_error");
        assert_eq!(ctx.data().stack_len::<Instant>(START_STACK_KEY), 0);
    }

    #[tokio::test]
    async fn nested_frames_use_stack() {
        let mw = LoggingMiddleware::new().with_log_inputs(false).with_log_outputs(false);
        let outer = Context::root().child("outer");
        let inner = outer.child("inner");

        mw.before("outer", &JsonMap::new(), &outer).await.expect("before");
        mw.before("inner", &JsonMap::new(), &inner).await.expect("before");
        assert_eq!(outer.data().stack_len::<Instant>(START_STACK_KEY), 2);

        mw.after("inner", &JsonMap::new(), &JsonMap::new(), &inner)
            .await
            .expect("after");
        mw.after("outer", &JsonMap::new(), &JsonMap::new(), &outer)
            .await
            .expect("after");
        assert_eq!(outer.data().stack_len::<Instant>(START_STACK_KEY), 0);
    }
}
