//! End-to-end tests for the observability middlewares riding the
//! executor pipeline.

use apcore_module::FunctionModule;
use apcore_runtime::{
    ContextLogger, Executor, InMemoryExporter, MemorySink, MetricsCollector, MetricsMiddleware,
    ObsLoggingMiddleware, Registry, SamplingStrategy, TracingMiddleware,
};
use apcore_types::{JsonMap, ModuleError};
use serde_json::{json, Value};
use std::sync::Arc;

/// Registry with an outer module that calls an inner module through the
/// executor, plus a failing module.
fn wired() -> (Executor, Arc<Registry>) {
    let registry = Arc::new(Registry::new());
    let executor = Executor::new(Arc::clone(&registry));

    let inner = FunctionModule::builder("work.inner")
        .description("inner work")
        .handler(|_, _| Ok(json!({"inner": true})))
        .build()
        .expect("valid module");
    registry.register("work.inner", Arc::new(inner)).expect("registers");

    let exec = executor.clone();
    let outer = FunctionModule::builder("work.outer")
        .description("calls inner")
        .async_handler(move |_, ctx| {
            let exec = exec.clone();
            Box::pin(async move {
                exec.call_async("work.inner", JsonMap::new(), Some(ctx))
                    .await
                    .map(Value::Object)
            })
        })
        .build()
        .expect("valid module");
    registry.register("work.outer", Arc::new(outer)).expect("registers");

    let failing = FunctionModule::builder("work.broken")
        .description("always fails")
        .handler(|_, _| Err(ModuleError::internal("nope")))
        .build()
        .expect("valid module");
    registry.register("work.broken", Arc::new(failing)).expect("registers");

    (executor, registry)
}

// =============================================================================
// Tracing
// =============================================================================

mod tracing_spans {
    use super::*;

    #[tokio::test]
    async fn nested_calls_produce_parented_spans() {
        let (executor, _registry) = wired();
        let exporter = Arc::new(InMemoryExporter::new());
        executor.use_middleware(Arc::new(
            TracingMiddleware::full(exporter.clone()).expect("valid"),
        ));

        executor
            .call_async("work.outer", JsonMap::new(), None)
            .await
            .expect("executes");

        let spans = exporter.get_spans();
        assert_eq!(spans.len(), 2);

        // Inner completes first and is parented on the outer span.
        let inner = &spans[0];
        let outer = &spans[1];
        assert_eq!(inner.attributes["module_id"], "work.inner");
        assert_eq!(outer.attributes["module_id"], "work.outer");
        assert_eq!(inner.trace_id, outer.trace_id);
        assert_eq!(
            inner.parent_span_id.as_deref(),
            Some(outer.span_id.as_str())
        );
        assert!(outer.parent_span_id.is_none());
        assert_eq!(inner.attributes["caller_id"], "work.outer");
    }

    #[tokio::test]
    async fn sampling_decision_shared_across_trace() {
        let (executor, _registry) = wired();
        let exporter = Arc::new(InMemoryExporter::new());
        // Rate 0: the root decision is "don't sample" and children
        // inherit it, so nothing exports even for nested calls.
        executor.use_middleware(Arc::new(
            TracingMiddleware::new(exporter.clone(), SamplingStrategy::Proportional, 0.0)
                .expect("valid"),
        ));

        executor
            .call_async("work.outer", JsonMap::new(), None)
            .await
            .expect("executes");
        assert!(exporter.get_spans().is_empty());
    }

    #[tokio::test]
    async fn error_spans_carry_code() {
        let (executor, _registry) = wired();
        let exporter = Arc::new(InMemoryExporter::new());
        executor.use_middleware(Arc::new(
            TracingMiddleware::full(exporter.clone()).expect("valid"),
        ));

        let _ = executor
            .call_async("work.broken", JsonMap::new(), None)
            .await
            .expect_err("fails");

        let spans = exporter.get_spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].status, "error");
        assert_eq!(spans[0].attributes["error_code"], "GENERAL_INTERNAL_ERROR");
        assert_eq!(spans[0].attributes["success"], false);
    }
}

// =============================================================================
// Metrics
// =============================================================================

mod metrics {
    use super::*;

    #[tokio::test]
    async fn success_and_error_series() {
        let (executor, _registry) = wired();
        let collector = Arc::new(MetricsCollector::new());
        executor.use_middleware(Arc::new(MetricsMiddleware::new(Arc::clone(&collector))));

        executor
            .call_async("work.inner", JsonMap::new(), None)
            .await
            .expect("executes");
        executor
            .call_async("work.inner", JsonMap::new(), None)
            .await
            .expect("executes");
        let _ = executor
            .call_async("work.broken", JsonMap::new(), None)
            .await
            .expect_err("fails");

        let text = collector.export_prometheus();
        assert!(text.contains(
            "apcore_module_calls_total{module_id=\"work.inner\",status=\"success\"} 2"
        ));
        assert!(text.contains(
            "apcore_module_calls_total{module_id=\"work.broken\",status=\"error\"} 1"
        ));
        assert!(text.contains(
            "apcore_module_errors_total{error_code=\"GENERAL_INTERNAL_ERROR\",module_id=\"work.broken\"} 1"
        ));
        assert!(text.contains("apcore_module_duration_seconds_count{module_id=\"work.inner\"} 2"));
        assert!(text.contains("le=\"+Inf\"}"));
    }

    #[tokio::test]
    async fn nested_calls_time_independently() {
        let (executor, _registry) = wired();
        let collector = Arc::new(MetricsCollector::new());
        executor.use_middleware(Arc::new(MetricsMiddleware::new(Arc::clone(&collector))));

        executor
            .call_async("work.outer", JsonMap::new(), None)
            .await
            .expect("executes");

        let snapshot = collector.snapshot();
        // One duration series per module: the stack kept the frames
        // separate.
        assert_eq!(snapshot.histogram_counts.len(), 2);
    }
}

// =============================================================================
// Structured logging
// =============================================================================

mod logging {
    use super::*;

    #[tokio::test]
    async fn full_stack_emits_lines_with_trace_ids() {
        let (executor, _registry) = wired();
        let sink = Arc::new(MemorySink::new());
        let logger = ContextLogger::new("apcore.obs").with_sink(sink.clone());
        executor.use_middleware(Arc::new(ObsLoggingMiddleware::new(logger)));

        executor
            .call_async("work.outer", JsonMap::new(), None)
            .await
            .expect("executes");

        let lines = sink.lines();
        // start/completed for outer and inner.
        assert_eq!(lines.len(), 4);

        let entries: Vec<Value> = lines
            .iter()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();

        assert_eq!(entries[0]["message"], "Module call started");
        assert_eq!(entries[0]["module_id"], "work.outer");
        assert_eq!(entries[1]["message"], "Module call started");
        assert_eq!(entries[1]["module_id"], "work.inner");
        assert_eq!(entries[2]["message"], "Module call completed");
        assert_eq!(entries[3]["message"], "Module call completed");

        // All lines share the trace id.
        let trace = entries[0]["trace_id"].as_str().expect("trace id");
        assert!(entries.iter().all(|e| e["trace_id"] == trace));
    }

    #[tokio::test]
    async fn failures_logged_at_error() {
        let (executor, _registry) = wired();
        let sink = Arc::new(MemorySink::new());
        let logger = ContextLogger::new("apcore.obs").with_sink(sink.clone());
        executor.use_middleware(Arc::new(ObsLoggingMiddleware::new(logger)));

        let _ = executor
            .call_async("work.broken", JsonMap::new(), None)
            .await
            .expect_err("fails");

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        let failed: Value = serde_json::from_str(&lines[1]).expect("json line");
        assert_eq!(failed["level"], "error");
        assert_eq!(failed["message"], "Module call failed");
        assert!(failed["extra"]["duration_ms"].is_number());
    }
}

// =============================================================================
// The recommended composition: tracing, metrics, logging
// =============================================================================

mod composed {
    use super::*;

    #[tokio::test]
    async fn all_three_observers_coexist() {
        let (executor, _registry) = wired();

        let exporter = Arc::new(InMemoryExporter::new());
        let collector = Arc::new(MetricsCollector::new());
        let sink = Arc::new(MemorySink::new());

        executor.use_middleware(Arc::new(
            TracingMiddleware::full(exporter.clone()).expect("valid"),
        ));
        executor.use_middleware(Arc::new(MetricsMiddleware::new(Arc::clone(&collector))));
        executor.use_middleware(Arc::new(ObsLoggingMiddleware::new(
            ContextLogger::new("apcore.obs").with_sink(sink.clone()),
        )));

        executor
            .call_async("work.outer", JsonMap::new(), None)
            .await
            .expect("executes");

        assert_eq!(exporter.get_spans().len(), 2);
        assert!(collector
            .export_prometheus()
            .contains("apcore_module_calls_total"));
        assert_eq!(sink.lines().len(), 4);
    }
}
