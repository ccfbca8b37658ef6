//! In-memory metrics with Prometheus text exposition.
//!
//! A single lock guards counters, histogram sums/counts and bucket
//! counts; metric updates are cheap enough that finer-grained locking
//! would not pay for itself at the expected call rates.

use crate::middleware::Middleware;
use apcore_types::{Context, ErrorCode, JsonMap, ModuleError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// `context.data` key holding the start-time stack.
pub const START_STACK_KEY: &str = "_metrics_starts";

/// Histogram bucket boundaries in seconds.
pub const DEFAULT_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

const DESCRIPTIONS: &[(&str, &str)] = &[
    ("apcore_module_calls_total", "Total module calls"),
    ("apcore_module_errors_total", "Total module errors"),
    ("apcore_module_duration_seconds", "Module execution duration"),
];

/// Sorted label set used as part of a series key.
type Labels = Vec<(String, String)>;
/// `(metric name, sorted labels)`.
type SeriesKey = (String, Labels);

#[derive(Default)]
struct MetricsState {
    counters: BTreeMap<SeriesKey, u64>,
    histogram_sums: BTreeMap<SeriesKey, f64>,
    histogram_counts: BTreeMap<SeriesKey, u64>,
    /// Per-series bucket counts aligned with the boundary list; the
    /// final slot is the `+Inf` bucket.
    histogram_buckets: BTreeMap<SeriesKey, Vec<u64>>,
}

/// Point-in-time copy of all stored series.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Counter values by series.
    pub counters: BTreeMap<SeriesKey, u64>,
    /// Histogram sums by series.
    pub histogram_sums: BTreeMap<SeriesKey, f64>,
    /// Histogram observation counts by series.
    pub histogram_counts: BTreeMap<SeriesKey, u64>,
    /// Bucket counts by series (last slot is `+Inf`).
    pub histogram_buckets: BTreeMap<SeriesKey, Vec<u64>>,
}

/// Thread-safe in-memory metrics store.
pub struct MetricsCollector {
    buckets: Vec<f64>,
    state: Mutex<MetricsState>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Creates a collector with the default histogram boundaries.
    #[must_use]
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS.to_vec())
    }

    /// Creates a collector with custom boundaries (sorted internally).
    #[must_use]
    pub fn with_buckets(mut buckets: Vec<f64>) -> Self {
        buckets.sort_by(f64::total_cmp);
        Self {
            buckets,
            state: Mutex::new(MetricsState::default()),
        }
    }

    fn series_key(name: &str, labels: &[(&str, &str)]) -> SeriesKey {
        let mut sorted: Labels = labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        sorted.sort();
        (name.to_string(), sorted)
    }

    /// Adds `amount` to a counter series.
    pub fn increment(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = Self::series_key(name, labels);
        *self.state.lock().counters.entry(key).or_insert(0) += amount;
    }

    /// Records a histogram observation.
    ///
    /// Every bucket whose boundary is >= the value is incremented, plus
    /// the `+Inf` bucket.
    pub fn observe(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = Self::series_key(name, labels);
        let mut state = self.state.lock();
        *state.histogram_sums.entry(key.clone()).or_insert(0.0) += value;
        *state.histogram_counts.entry(key.clone()).or_insert(0) += 1;

        let slots = self.buckets.len() + 1;
        let entry = state
            .histogram_buckets
            .entry(key)
            .or_insert_with(|| vec![0; slots]);
        for (i, boundary) in self.buckets.iter().enumerate() {
            if value <= *boundary {
                entry[i] += 1;
            }
        }
        if let Some(inf) = entry.last_mut() {
            *inf += 1;
        }
    }

    /// Copies all stored series.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let state = self.state.lock();
        MetricsSnapshot {
            counters: state.counters.clone(),
            histogram_sums: state.histogram_sums.clone(),
            histogram_counts: state.histogram_counts.clone(),
            histogram_buckets: state.histogram_buckets.clone(),
        }
    }

    /// Clears all stored series.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.counters.clear();
        state.histogram_sums.clear();
        state.histogram_counts.clear();
        state.histogram_buckets.clear();
    }

    /// Renders the standard Prometheus text exposition format.
    ///
    /// `# HELP` / `# TYPE` headers appear once per metric, labels are
    /// sorted alphabetically, and the histogram `le` label is emitted
    /// last.
    #[must_use]
    pub fn export_prometheus(&self) -> String {
        let state = self.state.lock();
        let mut lines: Vec<String> = Vec::new();

        let mut seen_counters: Vec<&str> = Vec::new();
        for ((name, labels), value) in &state.counters {
            if !seen_counters.contains(&name.as_str()) {
                lines.push(format!("# HELP {name} {}", describe(name)));
                lines.push(format!("# TYPE {name} counter"));
                seen_counters.push(name);
            }
            lines.push(format!("{name}{} {value}", format_labels(labels, None)));
        }

        let mut seen_histograms: Vec<&str> = Vec::new();
        for ((name, labels), buckets) in &state.histogram_buckets {
            if !seen_histograms.contains(&name.as_str()) {
                lines.push(format!("# HELP {name} {}", describe(name)));
                lines.push(format!("# TYPE {name} histogram"));
                seen_histograms.push(name);
            }

            for (i, boundary) in self.buckets.iter().enumerate() {
                lines.push(format!(
                    "{name}_bucket{} {}",
                    format_labels(labels, Some(&format_boundary(*boundary))),
                    buckets.get(i).copied().unwrap_or(0)
                ));
            }
            lines.push(format!(
                "{name}_bucket{} {}",
                format_labels(labels, Some("+Inf")),
                buckets.last().copied().unwrap_or(0)
            ));

            let key = (name.clone(), labels.clone());
            let sum = state.histogram_sums.get(&key).copied().unwrap_or(0.0);
            let count = state.histogram_counts.get(&key).copied().unwrap_or(0);
            lines.push(format!("{name}_sum{} {sum}", format_labels(labels, None)));
            lines.push(format!("{name}_count{} {count}", format_labels(labels, None)));
        }

        if lines.is_empty() {
            String::new()
        } else {
            let mut text = lines.join("\n");
            text.push('\n');
            text
        }
    }

    // --- Convenience wrappers for the standard pipeline metrics ---

    /// Increments `apcore_module_calls_total`.
    pub fn increment_calls(&self, module_id: &str, status: &str) {
        self.increment(
            "apcore_module_calls_total",
            &[("module_id", module_id), ("status", status)],
            1,
        );
    }

    /// Increments `apcore_module_errors_total`.
    pub fn increment_errors(&self, module_id: &str, error_code: &str) {
        self.increment(
            "apcore_module_errors_total",
            &[("module_id", module_id), ("error_code", error_code)],
            1,
        );
    }

    /// Observes `apcore_module_duration_seconds`.
    pub fn observe_duration(&self, module_id: &str, duration_seconds: f64) {
        self.observe(
            "apcore_module_duration_seconds",
            &[("module_id", module_id)],
            duration_seconds,
        );
    }
}

fn describe(name: &str) -> &str {
    DESCRIPTIONS
        .iter()
        .find(|(metric, _)| *metric == name)
        .map_or(name, |(_, description)| description)
}

fn format_boundary(boundary: f64) -> String {
    // f64 Display already renders the shortest form the conventional
    // exporters use: 0.005 -> "0.005", 1.0 -> "1", 30.0 -> "30".
    format!("{boundary}")
}

fn format_labels(labels: &[(String, String)], le: Option<&str>) -> String {
    if labels.is_empty() && le.is_none() {
        return String::new();
    }
    let mut pairs: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }
    format!("{{{}}}", pairs.join(","))
}

/// Middleware recording call counts, error counts, and durations.
pub struct MetricsMiddleware {
    collector: Arc<MetricsCollector>,
}

impl MetricsMiddleware {
    /// Creates a middleware feeding the given collector.
    #[must_use]
    pub fn new(collector: Arc<MetricsCollector>) -> Self {
        Self { collector }
    }
}

#[async_trait]
impl Middleware for MetricsMiddleware {
    fn name(&self) -> &str {
        "MetricsMiddleware"
    }

    async fn before(
        &self,
        _module_id: &str,
        _inputs: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        context.data().push(START_STACK_KEY, Instant::now());
        Ok(None)
    }

    async fn after(
        &self,
        module_id: &str,
        _inputs: &JsonMap,
        _output: &JsonMap,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        if let Some(start) = context.data().pop::<Instant>(START_STACK_KEY) {
            self.collector.increment_calls(module_id, "success");
            self.collector
                .observe_duration(module_id, start.elapsed().as_secs_f64());
        }
        Ok(None)
    }

    async fn on_error(
        &self,
        module_id: &str,
        _inputs: &JsonMap,
        error: &ModuleError,
        context: &Context,
    ) -> Result<Option<JsonMap>, ModuleError> {
        if let Some(start) = context.data().pop::<Instant>(START_STACK_KEY) {
            self.collector.increment_calls(module_id, "error");
            self.collector.increment_errors(module_id, error.code());
            self.collector
                .observe_duration(module_id, start.elapsed().as_secs_f64());
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let collector = MetricsCollector::new();
        collector.increment_calls("mod.x", "success");
        collector.increment_calls("mod.x", "success");
        collector.increment_calls("mod.x", "error");

        let snapshot = collector.snapshot();
        let key = (
            "apcore_module_calls_total".to_string(),
            vec![
                ("module_id".to_string(), "mod.x".to_string()),
                ("status".to_string(), "success".to_string()),
            ],
        );
        assert_eq!(snapshot.counters.get(&key), Some(&2));
    }

    #[test]
    fn prometheus_scenario() {
        let collector = MetricsCollector::new();
        collector.increment_calls("mod.x", "success");
        collector.increment_calls("mod.x", "success");
        collector.observe_duration("mod.x", 0.03);

        let text = collector.export_prometheus();
        assert!(text.contains(
            "apcore_module_calls_total{module_id=\"mod.x\",status=\"success\"} 2"
        ));
        assert!(text.contains("# HELP apcore_module_calls_total Total module calls"));
        assert!(text.contains("# TYPE apcore_module_calls_total counter"));
        assert!(text.contains("# TYPE apcore_module_duration_seconds histogram"));

        // 0.03 lands in the 0.05 bucket and everything above it.
        assert!(text.contains(
            "apcore_module_duration_seconds_bucket{module_id=\"mod.x\",le=\"0.05\"} 1"
        ));
        assert!(text.contains(
            "apcore_module_duration_seconds_bucket{module_id=\"mod.x\",le=\"0.025\"} 0"
        ));
        assert!(text.contains(
            "apcore_module_duration_seconds_bucket{module_id=\"mod.x\",le=\"+Inf\"} 1"
        ));
        assert!(text.contains("apcore_module_duration_seconds_sum{module_id=\"mod.x\"} 0.03"));
        assert!(text.contains("apcore_module_duration_seconds_count{module_id=\"mod.x\"} 1"));
    }

    #[test]
    fn buckets_are_cumulative() {
        let collector = MetricsCollector::new();
        collector.observe_duration("m", 0.003);
        collector.observe_duration("m", 0.04);
        collector.observe_duration("m", 100.0);

        let text = collector.export_prometheus();
        assert!(text.contains("le=\"0.005\"} 1"));
        assert!(text.contains("le=\"0.05\"} 2"));
        assert!(text.contains("le=\"60\"} 2"));
        assert!(text.contains("le=\"+Inf\"} 3"));
    }

    #[test]
    fn labels_sorted_with_le_last() {
        let collector = MetricsCollector::new();
        collector.observe("hist", &[("zeta", "1"), ("alpha", "2")], 0.5);
        let text = collector.export_prometheus();
        assert!(text.contains("hist_bucket{alpha=\"2\",zeta=\"1\",le=\"0.5\"} 1"));
    }

    #[test]
    fn boundary_formatting() {
        assert_eq!(format_boundary(0.005), "0.005");
        assert_eq!(format_boundary(1.0), "1");
        assert_eq!(format_boundary(30.0), "30");
        assert_eq!(format_boundary(2.5), "2.5");
    }

    #[test]
    fn reset_clears_everything() {
        let collector = MetricsCollector::new();
        collector.increment_calls("m", "success");
        collector.observe_duration("m", 0.1);
        collector.reset();
        assert!(collector.export_prometheus().is_empty());
    }

    #[test]
    fn empty_export_is_empty_string() {
        assert_eq!(MetricsCollector::new().export_prometheus(), "");
    }

    #[tokio::test]
    async fn middleware_records_success() {
        let collector = Arc::new(MetricsCollector::new());
        let mw = MetricsMiddleware::new(Arc::clone(&collector));
        let ctx = Context::root().child("m");

        mw.before("m", &JsonMap::new(), &ctx).await.expect("before");
        mw.after("m", &JsonMap::new(), &JsonMap::new(), &ctx)
            .await
            .expect("after");

        let text = collector.export_prometheus();
        assert!(text.contains("apcore_module_calls_total{module_id=\"m\",status=\"success\"} 1"));
        assert!(text.contains("apcore_module_duration_seconds_count{module_id=\"m\"} 1"));
    }

    #[tokio::test]
    async fn middleware_records_error_with_code() {
        let collector = Arc::new(MetricsCollector::new());
        let mw = MetricsMiddleware::new(Arc::clone(&collector));
        let ctx = Context::root().child("m");

        mw.before("m", &JsonMap::new(), &ctx).await.expect("before");
        let error = ModuleError::from(apcore_types::ErrorKind::ModuleTimeout {
            module_id: "m".into(),
            timeout_ms: 10,
        });
        mw.on_error("m", &JsonMap::new(), &error, &ctx)
            .await
            .expect("on_error");

        let text = collector.export_prometheus();
        assert!(text.contains("apcore_module_calls_total{module_id=\"m\",status=\"error\"} 1"));
        assert!(text.contains(
            "apcore_module_errors_total{error_code=\"MODULE_TIMEOUT\",module_id=\"m\"} 1"
        ));
    }

    #[tokio::test]
    async fn middleware_stack_survives_nesting() {
        let collector = Arc::new(MetricsCollector::new());
        let mw = MetricsMiddleware::new(Arc::clone(&collector));
        let outer = Context::root().child("outer");
        let inner = outer.child("inner");

        mw.before("outer", &JsonMap::new(), &outer).await.expect("before");
        mw.before("inner", &JsonMap::new(), &inner).await.expect("before");
        mw.after("inner", &JsonMap::new(), &JsonMap::new(), &inner)
            .await
            .expect("after");
        mw.after("outer", &JsonMap::new(), &JsonMap::new(), &outer)
            .await
            .expect("after");

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.histogram_counts.len(), 2);
    }
}
