//! The executor: the 10-step module call pipeline.
//!
//! ```text
//!  1. context      derive child Context (trace id, call chain)
//!  2. safety       depth / cycle / frequency checks
//!  3. lookup       Registry.get
//!  4. acl          Acl.check (when configured)
//!  5. input        schema validation + redaction
//!  6. before       middleware chain, registration order
//!  7. execute      handler with timeout enforcement
//!  8. output       schema validation
//!  9. after        middleware chain, reverse order
//! 10. return
//! ```
//!
//! Errors after step 5 trigger the recovery protocol: `on_error` hooks
//! run in reverse over the executed middleware prefix; the first
//! recovery mapping becomes the output (validated against the output
//! schema for failures at steps 7–9).
//!
//! Both synchronous ([`Executor::call`]) and asynchronous
//! ([`Executor::call_async`]) entry points exist, plus a validation-only
//! entry ([`Executor::validate`]) and a streaming one
//! ([`Executor::stream`]).

mod redact;

pub use redact::redact_sensitive;

use crate::middleware::{
    AfterMiddleware, BeforeMiddleware, Middleware, MiddlewareChainError, MiddlewareManager,
};
use crate::registry::Registry;
use apcore_acl::Acl;
use apcore_module::Module;
use apcore_types::{
    Config, Context, ErrorKind, JsonMap, ModuleError, ValidationResult,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

/// Default per-call timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: i64 = 30_000;
/// Default bound on a whole synchronous call, worker dispatch included.
pub const DEFAULT_GLOBAL_TIMEOUT_MS: i64 = 60_000;
/// Default maximum call-chain depth.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 32;
/// Default maximum occurrences of one module in a chain.
pub const DEFAULT_MAX_MODULE_REPEAT: usize = 3;

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Timeout override in milliseconds. `Some(0)` disables enforcement
    /// (with a one-time warning); negative values are rejected.
    pub timeout_ms: Option<i64>,
}

struct ExecutorInner {
    registry: Arc<Registry>,
    middleware: MiddlewareManager,
    acl: Option<Arc<Acl>>,
    default_timeout_ms: i64,
    global_timeout_ms: i64,
    max_call_depth: usize,
    max_module_repeat: usize,
    timeout_disabled_warned: AtomicBool,
}

/// Central execution engine orchestrating the module call pipeline.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<ExecutorInner>,
}

impl Executor {
    /// Creates an executor over a registry with default limits, no ACL,
    /// and an empty middleware chain.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                registry,
                middleware: MiddlewareManager::new(),
                acl: None,
                default_timeout_ms: DEFAULT_TIMEOUT_MS,
                global_timeout_ms: DEFAULT_GLOBAL_TIMEOUT_MS,
                max_call_depth: DEFAULT_MAX_CALL_DEPTH,
                max_module_repeat: DEFAULT_MAX_MODULE_REPEAT,
                timeout_disabled_warned: AtomicBool::new(false),
            }),
        }
    }

    /// Creates an executor with configuration-derived limits
    /// (`executor.default_timeout`, `executor.global_timeout`,
    /// `executor.max_call_depth`, `executor.max_module_repeat`).
    #[must_use]
    pub fn with_config(registry: Arc<Registry>, acl: Option<Arc<Acl>>, config: &Config) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                registry,
                middleware: MiddlewareManager::new(),
                acl,
                default_timeout_ms: config.get_i64("executor.default_timeout", DEFAULT_TIMEOUT_MS),
                global_timeout_ms: config
                    .get_i64("executor.global_timeout", DEFAULT_GLOBAL_TIMEOUT_MS),
                max_call_depth: config
                    .get_i64("executor.max_call_depth", DEFAULT_MAX_CALL_DEPTH as i64)
                    .max(0) as usize,
                max_module_repeat: config
                    .get_i64("executor.max_module_repeat", DEFAULT_MAX_MODULE_REPEAT as i64)
                    .max(0) as usize,
                timeout_disabled_warned: AtomicBool::new(false),
            }),
        }
    }

    /// The registry this executor dispatches against.
    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    /// Adds a middleware to the end of the chain; returns `self` for
    /// chaining.
    pub fn use_middleware(&self, middleware: Arc<dyn Middleware>) -> &Self {
        self.inner.middleware.add(middleware);
        self
    }

    /// Wraps a before-only callback and adds it.
    pub fn use_before<F>(&self, callback: F) -> &Self
    where
        F: Fn(&str, &JsonMap, &Context) -> Result<Option<JsonMap>, ModuleError>
            + Send
            + Sync
            + 'static,
    {
        self.inner
            .middleware
            .add(Arc::new(BeforeMiddleware::new(callback)));
        self
    }

    /// Wraps an after-only callback and adds it.
    pub fn use_after<F>(&self, callback: F) -> &Self
    where
        F: Fn(&str, &JsonMap, &JsonMap, &Context) -> Result<Option<JsonMap>, ModuleError>
            + Send
            + Sync
            + 'static,
    {
        self.inner
            .middleware
            .add(Arc::new(AfterMiddleware::new(callback)));
        self
    }

    /// Removes a middleware by identity.
    pub fn remove_middleware(&self, middleware: &Arc<dyn Middleware>) -> bool {
        self.inner.middleware.remove(middleware)
    }

    /// Snapshot of the current middleware chain.
    #[must_use]
    pub fn middlewares(&self) -> Vec<Arc<dyn Middleware>> {
        self.inner.middleware.snapshot()
    }

    // ----- Synchronous entry points -----

    /// Executes a module synchronously.
    ///
    /// Drives the async pipeline to completion on a detached worker
    /// thread with its own runtime, bounded by the global timeout. On
    /// timeout the worker is abandoned: the handler may keep running,
    /// but this call returns `MODULE_TIMEOUT`.
    ///
    /// # Errors
    ///
    /// Every pipeline error; see the error taxonomy.
    pub fn call(
        &self,
        module_id: &str,
        inputs: JsonMap,
        parent: Option<&Context>,
    ) -> Result<JsonMap, ModuleError> {
        self.call_with(module_id, inputs, parent, CallOptions::default())
    }

    /// [`Executor::call`] with per-call options.
    ///
    /// # Errors
    ///
    /// Every pipeline error; see the error taxonomy.
    pub fn call_with(
        &self,
        module_id: &str,
        inputs: JsonMap,
        parent: Option<&Context>,
        options: CallOptions,
    ) -> Result<JsonMap, ModuleError> {
        let executor = self.clone();
        let module_id_owned = module_id.to_string();
        let parent = parent.cloned();

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::Builder::new()
            .name("apcore-call".to_string())
            .spawn(move || {
                let result = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .map_err(|e| ModuleError::internal(format!("cannot build runtime: {e}")))
                    .and_then(|runtime| {
                        runtime.block_on(executor.call_async_with(
                            &module_id_owned,
                            inputs,
                            parent.as_ref(),
                            options,
                        ))
                    });
                let _ = tx.send(result);
            })
            .map_err(|e| ModuleError::internal(format!("cannot spawn call worker: {e}")))?;

        if self.inner.global_timeout_ms > 0 {
            match rx.recv_timeout(Duration::from_millis(self.inner.global_timeout_ms as u64)) {
                Ok(result) => result,
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Err(ErrorKind::ModuleTimeout {
                    module_id: module_id.to_string(),
                    timeout_ms: self.inner.global_timeout_ms as u64,
                }
                .into()),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    Err(ModuleError::internal("call worker terminated unexpectedly"))
                }
            }
        } else {
            rx.recv()
                .map_err(|_| ModuleError::internal("call worker terminated unexpectedly"))?
        }
    }

    // ----- Asynchronous entry points -----

    /// Executes a module through the asynchronous pipeline.
    ///
    /// # Errors
    ///
    /// Every pipeline error; see the error taxonomy.
    pub async fn call_async(
        &self,
        module_id: &str,
        inputs: JsonMap,
        parent: Option<&Context>,
    ) -> Result<JsonMap, ModuleError> {
        self.call_async_with(module_id, inputs, parent, CallOptions::default())
            .await
    }

    /// [`Executor::call_async`] with per-call options.
    ///
    /// # Errors
    ///
    /// Every pipeline error; see the error taxonomy.
    pub async fn call_async_with(
        &self,
        module_id: &str,
        inputs: JsonMap,
        parent: Option<&Context>,
        options: CallOptions,
    ) -> Result<JsonMap, ModuleError> {
        // Steps 1-5.
        let (module, ctx) = self.prepare(module_id, &inputs, parent)?;

        // Step 6: before chain.
        let (current_inputs, executed) = match self
            .inner
            .middleware
            .execute_before(module_id, &inputs, &ctx)
            .await
        {
            Ok(result) => result,
            Err(chain_error) => {
                let recovery = self
                    .inner
                    .middleware
                    .execute_on_error(
                        &chain_error.executed,
                        module_id,
                        &inputs,
                        &chain_error.original,
                        &ctx,
                    )
                    .await;
                return match recovery {
                    Some(output) => Ok(output),
                    None => Err(wrap_chain_error(chain_error, &ctx)),
                };
            }
        };

        // Steps 7-9, with the recovery protocol around them.
        match self
            .run_module(&module, module_id, &current_inputs, &ctx, options)
            .await
        {
            Ok(output) => Ok(output),
            Err(error) => {
                if !executed.is_empty() {
                    let recovery = self
                        .inner
                        .middleware
                        .execute_on_error(&executed, module_id, &current_inputs, &error, &ctx)
                        .await;
                    if let Some(recovery) = recovery {
                        // Recovery output re-enters step 8; a second
                        // failure surfaces.
                        let result = module.output_schema().validate(&recovery);
                        if !result.valid {
                            return Err(result
                                .into_error("Output validation failed")
                                .with_trace_id(ctx.trace_id.clone()));
                        }
                        return Ok(recovery);
                    }
                }
                Err(error)
            }
        }
    }

    /// Runs steps 1–3 plus input validation, without executing.
    ///
    /// Input problems are reported in the returned record, not raised.
    ///
    /// # Errors
    ///
    /// `MODULE_NOT_FOUND` when the module does not exist; safety errors
    /// when the parent chain is already in violation.
    pub fn validate(
        &self,
        module_id: &str,
        inputs: &JsonMap,
    ) -> Result<ValidationResult, ModuleError> {
        let ctx = Context::root().child(module_id);
        self.check_safety(module_id, &ctx)?;

        let module = self
            .inner
            .registry
            .get(module_id)
            .ok_or_else(|| module_not_found(module_id))?;

        Ok(module.input_schema().validate(inputs))
    }

    /// Executes a module as a stream of output chunks.
    ///
    /// Steps 1–6 run before this returns; their errors surface directly.
    /// Streaming modules push chunks which are forwarded to the returned
    /// receiver and shallow-merged into an accumulated output that is
    /// output-validated and run through the after-chain. Non-streaming
    /// modules fall back to a single-chunk call.
    ///
    /// # Errors
    ///
    /// Errors from steps 1–6; later errors arrive through the channel.
    pub async fn stream(
        &self,
        module_id: &str,
        inputs: JsonMap,
        parent: Option<&Context>,
    ) -> Result<mpsc::Receiver<Result<JsonMap, ModuleError>>, ModuleError> {
        // Steps 1-5.
        let (module, ctx) = self.prepare(module_id, &inputs, parent)?;

        // Step 6.
        let (current_inputs, executed) = match self
            .inner
            .middleware
            .execute_before(module_id, &inputs, &ctx)
            .await
        {
            Ok(result) => result,
            Err(chain_error) => {
                let recovery = self
                    .inner
                    .middleware
                    .execute_on_error(
                        &chain_error.executed,
                        module_id,
                        &inputs,
                        &chain_error.original,
                        &ctx,
                    )
                    .await;
                match recovery {
                    Some(output) => {
                        let (tx, rx) = mpsc::channel(1);
                        let _ = tx.send(Ok(output)).await;
                        return Ok(rx);
                    }
                    None => return Err(wrap_chain_error(chain_error, &ctx)),
                }
            }
        };

        let (out_tx, out_rx) = mpsc::channel(16);
        let executor = self.clone();
        let module_id = module_id.to_string();
        tokio::spawn(async move {
            executor
                .drive_stream(module, &module_id, current_inputs, ctx, executed, out_tx)
                .await;
        });
        Ok(out_rx)
    }

    // ----- Pipeline internals -----

    /// Steps 1–5: context, safety, lookup, ACL, input validation and
    /// redaction.
    fn prepare(
        &self,
        module_id: &str,
        inputs: &JsonMap,
        parent: Option<&Context>,
    ) -> Result<(Arc<dyn Module>, Context), ModuleError> {
        // Step 1: context.
        let mut ctx = match parent {
            Some(parent) => parent.child(module_id),
            None => Context::root().child(module_id),
        };

        // Step 2: safety.
        self.check_safety(module_id, &ctx)
            .map_err(|e| e.with_trace_id(ctx.trace_id.clone()))?;

        // Step 3: lookup.
        let module = self
            .inner
            .registry
            .get(module_id)
            .ok_or_else(|| module_not_found(module_id).with_trace_id(ctx.trace_id.clone()))?;

        // Step 4: ACL.
        if let Some(acl) = &self.inner.acl {
            if !acl.check(ctx.caller_id.as_deref(), module_id, Some(&ctx)) {
                return Err(ModuleError::from(ErrorKind::AclDenied {
                    caller_id: ctx.caller_id.clone(),
                    target_id: module_id.to_string(),
                })
                .with_trace_id(ctx.trace_id.clone()));
            }
        }

        // Step 5: input validation + redaction.
        let result = module.input_schema().validate(inputs);
        if !result.valid {
            return Err(result
                .into_error("Input validation failed")
                .with_trace_id(ctx.trace_id.clone()));
        }
        ctx.redacted_inputs = Some(redact_sensitive(inputs, module.input_schema().json()));

        Ok((module, ctx))
    }

    /// Steps 7–9: timeout-enforced execution, output validation, after
    /// chain.
    async fn run_module(
        &self,
        module: &Arc<dyn Module>,
        module_id: &str,
        inputs: &JsonMap,
        ctx: &Context,
        options: CallOptions,
    ) -> Result<JsonMap, ModuleError> {
        // Step 7: execute with timeout.
        let output = self
            .execute_with_timeout(module, module_id, inputs.clone(), ctx, options)
            .await?;

        // Step 8: output validation.
        let result = module.output_schema().validate(&output);
        if !result.valid {
            return Err(result
                .into_error("Output validation failed")
                .with_trace_id(ctx.trace_id.clone()));
        }

        // Step 9: after chain, reverse order.
        self.inner
            .middleware
            .execute_after(module_id, inputs, output, ctx)
            .await
    }

    async fn execute_with_timeout(
        &self,
        module: &Arc<dyn Module>,
        module_id: &str,
        inputs: JsonMap,
        ctx: &Context,
        options: CallOptions,
    ) -> Result<JsonMap, ModuleError> {
        let timeout_ms = options.timeout_ms.unwrap_or(self.inner.default_timeout_ms);

        if timeout_ms < 0 {
            return Err(ModuleError::invalid_input(format!(
                "Negative timeout: {timeout_ms}ms"
            )));
        }

        if timeout_ms == 0 {
            if !self
                .inner
                .timeout_disabled_warned
                .swap(true, Ordering::Relaxed)
            {
                warn!(module_id, "timeout enforcement disabled");
            }
            return module.execute(inputs, ctx).await;
        }

        match tokio::time::timeout(
            Duration::from_millis(timeout_ms as u64),
            module.execute(inputs, ctx),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ErrorKind::ModuleTimeout {
                module_id: module_id.to_string(),
                timeout_ms: timeout_ms as u64,
            }
            .into()),
        }
    }

    /// Step 2: call-chain safety checks.
    fn check_safety(&self, module_id: &str, ctx: &Context) -> Result<(), ModuleError> {
        let call_chain = &ctx.call_chain;

        // Depth.
        if call_chain.len() > self.inner.max_call_depth {
            return Err(ErrorKind::CallDepthExceeded {
                depth: call_chain.len(),
                max_depth: self.inner.max_call_depth,
                call_chain: call_chain.clone(),
            }
            .into());
        }

        // Cycles of length >= 2: the chain already ends with module_id,
        // so look for its last prior occurrence; a non-empty suffix
        // after it means other modules sit inside the loop.
        let prior = &call_chain[..call_chain.len().saturating_sub(1)];
        if let Some(last_idx) = prior.iter().rposition(|entry| entry == module_id) {
            if last_idx + 1 < prior.len() {
                return Err(ErrorKind::CircularCall {
                    module_id: module_id.to_string(),
                    call_chain: call_chain.clone(),
                }
                .into());
            }
        }

        // Frequency.
        let count = call_chain.iter().filter(|entry| *entry == module_id).count();
        if count > self.inner.max_module_repeat {
            return Err(ErrorKind::CallFrequencyExceeded {
                module_id: module_id.to_string(),
                count,
                max_repeat: self.inner.max_module_repeat,
                call_chain: call_chain.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Drives a streaming call: step 7 (streamed), step 8 on the
    /// accumulated output, step 9, with the recovery protocol applied to
    /// failures.
    async fn drive_stream(
        &self,
        module: Arc<dyn Module>,
        module_id: &str,
        inputs: JsonMap,
        ctx: Context,
        executed: Vec<Arc<dyn Middleware>>,
        out_tx: mpsc::Sender<Result<JsonMap, ModuleError>>,
    ) {
        if !module.supports_stream() {
            // Fallback: one call, one chunk.
            let result = self
                .run_module(&module, module_id, &inputs, &ctx, CallOptions::default())
                .await;
            let result = match result {
                Ok(output) => Ok(output),
                Err(error) => {
                    match self
                        .recover(&module, module_id, &inputs, &ctx, &executed, error)
                        .await
                    {
                        Ok(recovery) => Ok(recovery),
                        Err(error) => Err(error),
                    }
                }
            };
            let _ = out_tx.send(result).await;
            return;
        }

        let (chunk_tx, mut chunk_rx) = mpsc::channel::<JsonMap>(16);
        let stream_module = Arc::clone(&module);
        let stream_ctx = ctx.clone();
        let stream_inputs = inputs.clone();
        let stream_task = tokio::spawn(async move {
            stream_module
                .stream(stream_inputs, &stream_ctx, chunk_tx)
                .await
        });

        let mut accumulated = JsonMap::new();
        while let Some(chunk) = chunk_rx.recv().await {
            for (key, value) in &chunk {
                accumulated.insert(key.clone(), value.clone());
            }
            // A dropped receiver is not an error: keep draining so the
            // module can finish.
            let _ = out_tx.send(Ok(chunk)).await;
        }

        let stream_result = match stream_task.await {
            Ok(result) => result,
            Err(join_error) => Err(ModuleError::internal(format!(
                "stream task failed: {join_error}"
            ))),
        };

        let finish = async {
            stream_result?;
            // Step 8 on the accumulated output.
            let result = module.output_schema().validate(&accumulated);
            if !result.valid {
                return Err(result
                    .into_error("Output validation failed")
                    .with_trace_id(ctx.trace_id.clone()));
            }
            // Step 9 runs for its ordering contract; the accumulated
            // result was already forwarded chunk by chunk.
            self.inner
                .middleware
                .execute_after(module_id, &inputs, accumulated.clone(), &ctx)
                .await?;
            Ok(())
        };

        if let Err(error) = finish.await {
            let result = self
                .recover(&module, module_id, &inputs, &ctx, &executed, error)
                .await;
            let _ = out_tx.send(result).await;
        }
    }

    /// Applies the recovery protocol for a step 7–9 failure.
    async fn recover(
        &self,
        module: &Arc<dyn Module>,
        module_id: &str,
        inputs: &JsonMap,
        ctx: &Context,
        executed: &[Arc<dyn Middleware>],
        error: ModuleError,
    ) -> Result<JsonMap, ModuleError> {
        if executed.is_empty() {
            return Err(error);
        }
        match self
            .inner
            .middleware
            .execute_on_error(executed, module_id, inputs, &error, ctx)
            .await
        {
            Some(recovery) => {
                let result = module.output_schema().validate(&recovery);
                if result.valid {
                    Ok(recovery)
                } else {
                    Err(result
                        .into_error("Output validation failed")
                        .with_trace_id(ctx.trace_id.clone()))
                }
            }
            None => Err(error),
        }
    }
}

fn module_not_found(module_id: &str) -> ModuleError {
    ErrorKind::ModuleNotFound {
        module_id: module_id.to_string(),
    }
    .into()
}

fn wrap_chain_error(chain_error: MiddlewareChainError, ctx: &Context) -> ModuleError {
    let executed = chain_error
        .executed
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    ModuleError::from(ErrorKind::MiddlewareChain {
        message: chain_error.original.to_string(),
        executed,
    })
    .with_cause(chain_error.original)
    .with_trace_id(ctx.trace_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apcore_module::FunctionModule;
    use apcore_schema::ModuleSchema;
    use serde_json::{json, Value};

    fn registry_with_echo() -> Arc<Registry> {
        let registry = Arc::new(Registry::new());
        let module = FunctionModule::builder("echo.back")
            .description("Echo")
            .handler(|inputs, _| Ok(Value::Object(inputs)))
            .build()
            .expect("builds");
        registry.register("echo.back", Arc::new(module)).expect("registers");
        registry
    }

    #[tokio::test]
    async fn call_async_happy_path() {
        let executor = Executor::new(registry_with_echo());
        let inputs = json!({"x": 1}).as_object().cloned().unwrap_or_default();
        let output = executor
            .call_async("echo.back", inputs.clone(), None)
            .await
            .expect("executes");
        assert_eq!(output, inputs);
    }

    #[test]
    fn sync_call_happy_path() {
        let executor = Executor::new(registry_with_echo());
        let inputs = json!({"x": 1}).as_object().cloned().unwrap_or_default();
        let output = executor.call("echo.back", inputs.clone(), None).expect("executes");
        assert_eq!(output, inputs);
    }

    #[tokio::test]
    async fn missing_module_not_found() {
        use apcore_types::ErrorCode;
        let executor = Executor::new(Arc::new(Registry::new()));
        let err = executor
            .call_async("no.such", JsonMap::new(), None)
            .await
            .expect_err("missing");
        assert_eq!(err.code(), "MODULE_NOT_FOUND");
    }

    #[tokio::test]
    async fn timeout_enforced() {
        use apcore_types::ErrorCode;
        let registry = Arc::new(Registry::new());
        let slow = FunctionModule::builder("slow.mod")
            .description("sleeps")
            .async_handler(|_, _| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(Value::Null)
                })
            })
            .build()
            .expect("builds");
        registry.register("slow.mod", Arc::new(slow)).expect("registers");

        let executor = Executor::new(registry);
        let err = executor
            .call_async_with(
                "slow.mod",
                JsonMap::new(),
                None,
                CallOptions {
                    timeout_ms: Some(20),
                },
            )
            .await
            .expect_err("times out");
        assert_eq!(err.code(), "MODULE_TIMEOUT");
        assert_eq!(err.details()["timeout_ms"], 20);
    }

    #[tokio::test]
    async fn negative_timeout_rejected() {
        use apcore_types::ErrorCode;
        let executor = Executor::new(registry_with_echo());
        let err = executor
            .call_async_with(
                "echo.back",
                JsonMap::new(),
                None,
                CallOptions {
                    timeout_ms: Some(-5),
                },
            )
            .await
            .expect_err("negative timeout");
        assert_eq!(err.code(), "GENERAL_INVALID_INPUT");
    }

    #[tokio::test]
    async fn zero_timeout_disables() {
        let executor = Executor::new(registry_with_echo());
        let output = executor
            .call_async_with(
                "echo.back",
                JsonMap::new(),
                None,
                CallOptions {
                    timeout_ms: Some(0),
                },
            )
            .await
            .expect("no timeout");
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn validate_reports_instead_of_raising() {
        let registry = Arc::new(Registry::new());
        let module = FunctionModule::builder("strictin.mod")
            .description("strict input")
            .input_schema(
                ModuleSchema::compile(json!({
                    "type": "object",
                    "properties": {"name": {"type": "string"}},
                    "required": ["name"]
                }))
                .expect("compiles"),
            )
            .handler(|_, _| Ok(Value::Null))
            .build()
            .expect("builds");
        registry
            .register("strictin.mod", Arc::new(module))
            .expect("registers");

        let executor = Executor::new(registry);
        let result = executor
            .validate("strictin.mod", &JsonMap::new())
            .expect("module exists");
        assert!(!result.valid);
        assert_eq!(result.errors[0].constraint, "required");

        let good = json!({"name": "x"}).as_object().cloned().unwrap_or_default();
        assert!(executor.validate("strictin.mod", &good).expect("exists").valid);
    }

    #[tokio::test]
    async fn validate_missing_module_raises() {
        let executor = Executor::new(Arc::new(Registry::new()));
        assert!(executor.validate("no.such", &JsonMap::new()).is_err());
    }

    #[test]
    fn safety_depth_check() {
        use apcore_types::ErrorCode;
        let config = Config::from_value(json!({"executor": {"max_call_depth": 2}}))
            .expect("config");
        let executor = Executor::with_config(registry_with_echo(), None, &config);

        let parent = Context::root().child("a").child("b");
        let err = executor
            .call("echo.back", JsonMap::new(), Some(&parent))
            .expect_err("too deep");
        assert_eq!(err.code(), "CALL_DEPTH_EXCEEDED");
        assert_eq!(err.details()["depth"], 3);
    }

    #[test]
    fn safety_frequency_check() {
        use apcore_types::ErrorCode;
        let config = Config::from_value(json!({"executor": {"max_module_repeat": 1}}))
            .expect("config");
        let executor = Executor::with_config(registry_with_echo(), None, &config);

        // echo.back already appears once; the direct repeat stays a
        // length-1 cycle, so the frequency check fires first.
        let parent = Context::root().child("echo.back");
        let err = executor
            .call("echo.back", JsonMap::new(), Some(&parent))
            .expect_err("repeated too often");
        assert_eq!(err.code(), "CALL_FREQUENCY_EXCEEDED");
    }

    #[test]
    fn safety_cycle_check() {
        use apcore_types::ErrorCode;
        let executor = Executor::new(registry_with_echo());
        let parent = Context::root().child("echo.back").child("other.mod");
        let err = executor
            .call("echo.back", JsonMap::new(), Some(&parent))
            .expect_err("cycle");
        assert_eq!(err.code(), "CIRCULAR_CALL");
        assert_eq!(
            err.details()["call_chain"],
            json!(["echo.back", "other.mod", "echo.back"])
        );
    }

    #[tokio::test]
    async fn stream_fallback_single_chunk() {
        let executor = Executor::new(registry_with_echo());
        let inputs = json!({"k": "v"}).as_object().cloned().unwrap_or_default();
        let mut rx = executor
            .stream("echo.back", inputs.clone(), None)
            .await
            .expect("stream starts");

        let first = rx.recv().await.expect("one chunk").expect("ok");
        assert_eq!(first, inputs);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn stream_chunks_forwarded_and_merged() {
        struct Chunky {
            input: ModuleSchema,
            output: ModuleSchema,
        }

        #[async_trait::async_trait]
        impl Module for Chunky {
            fn description(&self) -> &str {
                "streams two chunks"
            }
            fn input_schema(&self) -> &ModuleSchema {
                &self.input
            }
            fn output_schema(&self) -> &ModuleSchema {
                &self.output
            }
            fn supports_stream(&self) -> bool {
                true
            }
            async fn execute(
                &self,
                _inputs: JsonMap,
                _ctx: &Context,
            ) -> Result<JsonMap, ModuleError> {
                Ok(JsonMap::new())
            }
            async fn stream(
                &self,
                _inputs: JsonMap,
                _ctx: &Context,
                sink: apcore_module::ChunkSink,
            ) -> Result<(), ModuleError> {
                let chunk1 = json!({"part": 1}).as_object().cloned().unwrap_or_default();
                let chunk2 = json!({"done": true}).as_object().cloned().unwrap_or_default();
                let _ = sink.send(chunk1).await;
                let _ = sink.send(chunk2).await;
                Ok(())
            }
        }

        let registry = Arc::new(Registry::new());
        registry
            .register(
                "chunky.mod",
                Arc::new(Chunky {
                    input: ModuleSchema::permissive(),
                    output: ModuleSchema::permissive(),
                }),
            )
            .expect("registers");

        let executor = Executor::new(registry);
        let mut rx = executor
            .stream("chunky.mod", JsonMap::new(), None)
            .await
            .expect("stream starts");

        let c1 = rx.recv().await.expect("chunk 1").expect("ok");
        assert_eq!(c1["part"], 1);
        let c2 = rx.recv().await.expect("chunk 2").expect("ok");
        assert_eq!(c2["done"], true);
        assert!(rx.recv().await.is_none());
    }
}
