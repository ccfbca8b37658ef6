//! End-to-end tests for the 10-step executor pipeline.
//!
//! Covers the happy path, safety checks on nested module-to-module
//! calls, ACL enforcement, input redaction, and middleware ordering and
//! recovery.

use apcore_acl::{Acl, AclRule, Effect};
use apcore_module::{FunctionModule, Module};
use apcore_runtime::{Executor, Middleware, Registry};
use apcore_schema::ModuleSchema;
use apcore_types::{Context, ErrorCode, JsonMap, ModuleError, REDACTED_VALUE};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

fn obj(value: Value) -> JsonMap {
    value.as_object().cloned().expect("object literal")
}

fn schema(value: Value) -> ModuleSchema {
    ModuleSchema::compile(value).expect("schema compiles")
}

// =============================================================================
// Happy path
// =============================================================================

mod happy_path {
    use super::*;

    fn greet_registry(chain_seen: Arc<Mutex<Vec<String>>>) -> Arc<Registry> {
        let registry = Arc::new(Registry::new());
        let module = FunctionModule::builder("greet.hello")
            .description("Say hello")
            .input_schema(schema(json!({
                "type": "object",
                "properties": {"name": {"type": "string"}},
                "required": ["name"]
            })))
            .output_schema(schema(json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            })))
            .handler(move |inputs, ctx| {
                *chain_seen.lock() = ctx.call_chain.clone();
                let name = inputs["name"].as_str().unwrap_or_default();
                Ok(json!({"message": format!("hi {name}")}))
            })
            .build()
            .expect("valid module");
        registry
            .register("greet.hello", Arc::new(module))
            .expect("registers");
        registry
    }

    #[test]
    fn sync_call_returns_output() {
        let chain_seen = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(greet_registry(Arc::clone(&chain_seen)));

        let output = executor
            .call("greet.hello", obj(json!({"name": "Alice"})), None)
            .expect("executes");

        assert_eq!(output["message"], "hi Alice");
        // The handler observed exactly its own frame.
        assert_eq!(*chain_seen.lock(), vec!["greet.hello"]);
    }

    #[tokio::test]
    async fn async_call_returns_output() {
        let chain_seen = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(greet_registry(chain_seen));

        let output = executor
            .call_async("greet.hello", obj(json!({"name": "Bob"})), None)
            .await
            .expect("executes");
        assert_eq!(output["message"], "hi Bob");
    }

    #[test]
    fn input_validation_failure_is_structured() {
        let chain_seen = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(greet_registry(chain_seen));

        let err = executor
            .call("greet.hello", JsonMap::new(), None)
            .expect_err("missing name");
        assert_eq!(err.code(), "SCHEMA_VALIDATION_ERROR");
        let errors = &err.details()["errors"];
        assert_eq!(errors[0]["path"], "/name");
        assert_eq!(errors[0]["constraint"], "required");
    }

    #[test]
    fn output_validation_failure_surfaces() {
        let registry = Arc::new(Registry::new());
        let module = FunctionModule::builder("bad.output")
            .description("returns the wrong shape")
            .output_schema(schema(json!({
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            })))
            .handler(|_, _| Ok(json!({"unexpected": 1})))
            .build()
            .expect("valid module");
        registry.register("bad.output", Arc::new(module)).expect("registers");

        let executor = Executor::new(registry);
        let err = executor
            .call("bad.output", JsonMap::new(), None)
            .expect_err("output invalid");
        assert_eq!(err.code(), "SCHEMA_VALIDATION_ERROR");
        assert!(err.to_string().contains("Output validation"));
    }
}

// =============================================================================
// Safety checks over nested calls
// =============================================================================

mod safety {
    use super::*;

    /// Wires two modules that call each other through the executor.
    fn mutual_recursion() -> (Executor, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        let executor = Executor::new(Arc::clone(&registry));

        let exec_a = executor.clone();
        let module_a = FunctionModule::builder("a")
            .description("calls b")
            .async_handler(move |_, ctx| {
                let exec = exec_a.clone();
                Box::pin(async move {
                    exec.call_async("b", JsonMap::new(), Some(ctx))
                        .await
                        .map(Value::Object)
                })
            })
            .build()
            .expect("valid module");
        registry.register("a", Arc::new(module_a)).expect("registers");

        let exec_b = executor.clone();
        let module_b = FunctionModule::builder("b")
            .description("calls a")
            .async_handler(move |_, ctx| {
                let exec = exec_b.clone();
                Box::pin(async move {
                    exec.call_async("a", JsonMap::new(), Some(ctx))
                        .await
                        .map(Value::Object)
                })
            })
            .build()
            .expect("valid module");
        registry.register("b", Arc::new(module_b)).expect("registers");

        (executor, registry)
    }

    #[tokio::test]
    async fn circular_call_detected() {
        let (executor, _registry) = mutual_recursion();

        let err = executor
            .call_async("a", JsonMap::new(), None)
            .await
            .expect_err("a -> b -> a is a cycle");
        assert_eq!(err.code(), "CIRCULAR_CALL");
        assert_eq!(err.details()["call_chain"], json!(["a", "b", "a"]));
    }

    #[tokio::test]
    async fn self_recursion_capped_by_frequency() {
        let registry = Arc::new(Registry::new());
        let executor = Executor::new(Arc::clone(&registry));

        let exec = executor.clone();
        let module = FunctionModule::builder("again")
            .description("calls itself forever")
            .async_handler(move |_, ctx| {
                let exec = exec.clone();
                Box::pin(async move {
                    exec.call_async("again", JsonMap::new(), Some(ctx))
                        .await
                        .map(Value::Object)
                })
            })
            .build()
            .expect("valid module");
        registry.register("again", Arc::new(module)).expect("registers");

        let err = executor
            .call_async("again", JsonMap::new(), None)
            .await
            .expect_err("direct self-recursion hits the repeat cap");
        assert_eq!(err.code(), "CALL_FREQUENCY_EXCEEDED");
        assert_eq!(err.details()["max_repeat"], 3);
        assert_eq!(err.details()["count"], 4);
    }
}

// =============================================================================
// ACL enforcement (step 4)
// =============================================================================

mod acl {
    use super::*;

    fn admin_registry() -> Arc<Registry> {
        let registry = Arc::new(Registry::new());
        let module = FunctionModule::builder("admin.delete")
            .description("Delete things")
            .handler(|_, _| Ok(Value::Null))
            .build()
            .expect("valid module");
        registry.register("admin.delete", Arc::new(module)).expect("registers");
        registry
    }

    #[test]
    fn deny_rule_blocks_public_caller() {
        let acl = Arc::new(Acl::new(
            vec![
                AclRule::new(vec!["public.*".into()], vec!["admin.*".into()], Effect::Deny),
                AclRule::new(vec!["*".into()], vec!["*".into()], Effect::Allow),
            ],
            Effect::Deny,
        ));
        let executor = Executor::with_config(
            admin_registry(),
            Some(acl),
            &apcore_types::Config::new(),
        );

        let parent = Context::root().child("public.x");
        let err = executor
            .call("admin.delete", JsonMap::new(), Some(&parent))
            .expect_err("public caller denied");
        assert_eq!(err.code(), "ACL_DENIED");
        assert_eq!(err.details()["caller_id"], "public.x");
        assert_eq!(err.details()["target_id"], "admin.delete");

        // A non-public caller falls through to the allow-all rule.
        let parent = Context::root().child("internal.job");
        assert!(executor
            .call("admin.delete", JsonMap::new(), Some(&parent))
            .is_ok());
    }

    #[test]
    fn no_acl_means_no_enforcement() {
        let executor = Executor::new(admin_registry());
        let parent = Context::root().child("public.x");
        assert!(executor
            .call("admin.delete", JsonMap::new(), Some(&parent))
            .is_ok());
    }
}

// =============================================================================
// Redaction (step 5)
// =============================================================================

mod redaction {
    use super::*;

    #[test]
    fn handler_sees_raw_context_sees_redacted() {
        let registry = Arc::new(Registry::new());
        let seen: Arc<Mutex<Option<(JsonMap, Option<JsonMap>)>>> = Arc::new(Mutex::new(None));

        let capture = Arc::clone(&seen);
        let module = FunctionModule::builder("auth.login")
            .description("Log in")
            .input_schema(schema(json!({
                "type": "object",
                "properties": {
                    "password": {"type": "string", "x-sensitive": true},
                    "username": {"type": "string"}
                },
                "required": ["password", "username"]
            })))
            .handler(move |inputs, ctx| {
                *capture.lock() = Some((inputs.clone(), ctx.redacted_inputs.clone()));
                Ok(Value::Null)
            })
            .build()
            .expect("valid module");
        registry.register("auth.login", Arc::new(module)).expect("registers");

        let executor = Executor::new(registry);
        executor
            .call(
                "auth.login",
                obj(json!({"password": "p@ss", "username": "u"})),
                None,
            )
            .expect("executes");

        let (raw, redacted) = seen.lock().clone().expect("handler ran");
        assert_eq!(raw["password"], "p@ss");
        assert_eq!(raw["username"], "u");

        let redacted = redacted.expect("redacted copy stored");
        assert_eq!(redacted["password"], REDACTED_VALUE);
        assert_eq!(redacted["username"], "u");
    }
}

// =============================================================================
// Middleware ordering and recovery
// =============================================================================

mod middleware {
    use super::*;

    struct Tracker {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        recovery: Option<JsonMap>,
    }

    #[async_trait]
    impl Middleware for Tracker {
        fn name(&self) -> &str {
            self.label
        }

        async fn before(
            &self,
            _module_id: &str,
            _inputs: &JsonMap,
            _context: &Context,
        ) -> Result<Option<JsonMap>, ModuleError> {
            self.log.lock().push(format!("{}:before", self.label));
            Ok(None)
        }

        async fn after(
            &self,
            _module_id: &str,
            _inputs: &JsonMap,
            _output: &JsonMap,
            _context: &Context,
        ) -> Result<Option<JsonMap>, ModuleError> {
            self.log.lock().push(format!("{}:after", self.label));
            Ok(None)
        }

        async fn on_error(
            &self,
            _module_id: &str,
            _inputs: &JsonMap,
            _error: &ModuleError,
            _context: &Context,
        ) -> Result<Option<JsonMap>, ModuleError> {
            self.log.lock().push(format!("{}:on_error", self.label));
            Ok(self.recovery.clone())
        }
    }

    fn echo_registry() -> Arc<Registry> {
        let registry = Arc::new(Registry::new());
        let module = FunctionModule::builder("echo")
            .description("Echo")
            .handler(|inputs, _| Ok(Value::Object(inputs)))
            .build()
            .expect("valid module");
        registry.register("echo", Arc::new(module)).expect("registers");
        registry
    }

    #[tokio::test]
    async fn onion_ordering() {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(echo_registry());
        executor.use_middleware(Arc::new(Tracker {
            label: "A",
            log: Arc::clone(&log),
            recovery: None,
        }));
        executor.use_middleware(Arc::new(Tracker {
            label: "B",
            log: Arc::clone(&log),
            recovery: None,
        }));

        executor
            .call_async("echo", JsonMap::new(), None)
            .await
            .expect("executes");

        assert_eq!(
            *log.lock(),
            vec!["A:before", "B:before", "B:after", "A:after"]
        );
    }

    #[tokio::test]
    async fn before_hook_can_replace_inputs() {
        let executor = Executor::new(echo_registry());
        executor.use_before(|_, inputs, _| {
            let mut next = inputs.clone();
            next.insert("stamped".into(), json!(true));
            Ok(Some(next))
        });

        let output = executor
            .call_async("echo", obj(json!({"orig": 1})), None)
            .await
            .expect("executes");
        assert_eq!(output["orig"], 1);
        assert_eq!(output["stamped"], true);
    }

    #[tokio::test]
    async fn after_hook_can_replace_output() {
        let executor = Executor::new(echo_registry());
        executor.use_after(|_, _, output, _| {
            let mut next = output.clone();
            next.insert("post".into(), json!("processed"));
            Ok(Some(next))
        });

        let output = executor
            .call_async("echo", JsonMap::new(), None)
            .await
            .expect("executes");
        assert_eq!(output["post"], "processed");
    }

    #[tokio::test]
    async fn handler_error_recovered_by_on_error() {
        let registry = Arc::new(Registry::new());
        let module = FunctionModule::builder("flaky")
            .description("always fails")
            .output_schema(schema(json!({
                "type": "object",
                "properties": {"result": {"type": "string"}},
                "required": ["result"]
            })))
            .handler(|_, _| Err(ModuleError::internal("handler exploded")))
            .build()
            .expect("valid module");
        registry.register("flaky", Arc::new(module)).expect("registers");

        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(registry);
        executor.use_middleware(Arc::new(Tracker {
            label: "A",
            log: Arc::clone(&log),
            recovery: Some(obj(json!({"result": "fallback"}))),
        }));

        let output = executor
            .call_async("flaky", JsonMap::new(), None)
            .await
            .expect("recovered");
        assert_eq!(output["result"], "fallback");
        assert_eq!(*log.lock(), vec!["A:before", "A:on_error"]);
    }

    #[tokio::test]
    async fn invalid_recovery_output_surfaces() {
        let registry = Arc::new(Registry::new());
        let module = FunctionModule::builder("flaky")
            .description("always fails")
            .output_schema(schema(json!({
                "type": "object",
                "properties": {"result": {"type": "string"}},
                "required": ["result"]
            })))
            .handler(|_, _| Err(ModuleError::internal("handler exploded")))
            .build()
            .expect("valid module");
        registry.register("flaky", Arc::new(module)).expect("registers");

        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(registry);
        executor.use_middleware(Arc::new(Tracker {
            label: "A",
            log,
            recovery: Some(obj(json!({"wrong_shape": 1}))),
        }));

        let err = executor
            .call_async("flaky", JsonMap::new(), None)
            .await
            .expect_err("recovery fails validation");
        assert_eq!(err.code(), "SCHEMA_VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unrecovered_error_propagates() {
        let registry = Arc::new(Registry::new());
        let module = FunctionModule::builder("flaky")
            .description("always fails")
            .handler(|_, _| Err(ModuleError::internal("handler exploded")))
            .build()
            .expect("valid module");
        registry.register("flaky", Arc::new(module)).expect("registers");

        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(registry);
        executor.use_middleware(Arc::new(Tracker {
            label: "A",
            log: Arc::clone(&log),
            recovery: None,
        }));

        let err = executor
            .call_async("flaky", JsonMap::new(), None)
            .await
            .expect_err("no recovery");
        assert_eq!(err.code(), "GENERAL_INTERNAL_ERROR");
        assert_eq!(*log.lock(), vec!["A:before", "A:on_error"]);
    }

    #[tokio::test]
    async fn failing_before_wraps_as_chain_error() {
        struct FailingBefore;
        #[async_trait]
        impl Middleware for FailingBefore {
            fn name(&self) -> &str {
                "FailingBefore"
            }
            async fn before(
                &self,
                _module_id: &str,
                _inputs: &JsonMap,
                _context: &Context,
            ) -> Result<Option<JsonMap>, ModuleError> {
                Err(ModuleError::internal("before exploded"))
            }
        }

        let executor = Executor::new(echo_registry());
        executor.use_middleware(Arc::new(FailingBefore));

        let err = executor
            .call_async("echo", JsonMap::new(), None)
            .await
            .expect_err("before fails, no recovery");
        assert_eq!(err.code(), "MIDDLEWARE_CHAIN_ERROR");
        assert_eq!(err.details()["executed_middlewares"], json!(["FailingBefore"]));
    }

    #[tokio::test]
    async fn removed_middleware_no_longer_runs() {
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let executor = Executor::new(echo_registry());
        let tracker: Arc<dyn Middleware> = Arc::new(Tracker {
            label: "A",
            log: Arc::clone(&log),
            recovery: None,
        });
        executor.use_middleware(Arc::clone(&tracker));

        executor
            .call_async("echo", JsonMap::new(), None)
            .await
            .expect("executes");
        assert!(executor.remove_middleware(&tracker));

        executor
            .call_async("echo", JsonMap::new(), None)
            .await
            .expect("executes");
        // Only the first call logged.
        assert_eq!(*log.lock(), vec!["A:before", "A:after"]);
    }
}

// =============================================================================
// Modules are plain trait objects
// =============================================================================

mod trait_objects {
    use super::*;

    struct HandWritten {
        input: ModuleSchema,
        output: ModuleSchema,
    }

    #[async_trait]
    impl Module for HandWritten {
        fn description(&self) -> &str {
            "hand-written module"
        }
        fn input_schema(&self) -> &ModuleSchema {
            &self.input
        }
        fn output_schema(&self) -> &ModuleSchema {
            &self.output
        }
        async fn execute(&self, _inputs: JsonMap, ctx: &Context) -> Result<JsonMap, ModuleError> {
            Ok(obj(json!({"trace": ctx.trace_id})))
        }
    }

    #[tokio::test]
    async fn hand_written_module_runs() {
        let registry = Arc::new(Registry::new());
        registry
            .register(
                "hand.written",
                Arc::new(HandWritten {
                    input: ModuleSchema::permissive(),
                    output: ModuleSchema::permissive(),
                }),
            )
            .expect("registers");

        let executor = Executor::new(registry);
        let output = executor
            .call_async("hand.written", JsonMap::new(), None)
            .await
            .expect("executes");
        assert!(output["trace"].is_string());
    }
}
