//! Metrics export for simulation results.
//!
//! [`InMemoryRecorder`] implements [`metrics::Recorder`] and keeps every
//! counter, gauge and histogram in memory. At the end of a run a
//! [`MetricsSnapshot`] is taken and exported as JSON or in the Prometheus
//! text format. Values are aggregated across nodes and also broken down by
//! the `node` label.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wifisim_phy::metric_defs;

// ============================================================================
// Metrics Snapshot Types
// ============================================================================

/// Per-node metric values.
#[derive(Debug, Default, Clone, Serialize)]
pub struct NodeMetrics {
    /// Counter metrics for this node.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub counters: BTreeMap<String, u64>,
    /// Gauge metrics for this node.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub gauges: BTreeMap<String, f64>,
    /// Histogram metrics for this node.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub histograms: BTreeMap<String, HistogramSummary>,
}

/// Collected metric data for export.
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    /// Counter metrics, aggregated across all label sets.
    pub counters: BTreeMap<String, u64>,
    /// Gauge metrics, aggregated across all label sets.
    pub gauges: BTreeMap<String, f64>,
    /// Histogram metrics, aggregated across all label sets.
    pub histograms: BTreeMap<String, HistogramSummary>,
    /// Per-node breakdown.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub nodes: BTreeMap<String, NodeMetrics>,
}

/// Summary statistics for a histogram metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramSummary {
    /// Number of samples recorded.
    pub count: u64,
    /// Sum of all samples.
    pub sum: f64,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// Mean value.
    pub mean: f64,
    /// 50th percentile (median).
    pub p50: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 99th percentile.
    pub p99: f64,
}

impl HistogramSummary {
    /// Summarize a set of samples.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return HistogramSummary {
                count: 0,
                sum: 0.0,
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                p50: 0.0,
                p90: 0.0,
                p99: 0.0,
            };
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let count = sorted.len() as u64;
        let sum: f64 = sorted.iter().sum();
        let percentile = |p: f64| {
            let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
            sorted[idx.min(sorted.len() - 1)]
        };

        HistogramSummary {
            count,
            sum,
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sum / count as f64,
            p50: percentile(50.0),
            p90: percentile(90.0),
            p99: percentile(99.0),
        }
    }
}

// ============================================================================
// Export Functions
// ============================================================================

/// Export metrics as JSON.
pub fn export_json<W: Write>(snapshot: &MetricsSnapshot, writer: &mut W) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut *writer, snapshot)?;
    writeln!(writer)?;
    Ok(())
}

/// Export metrics in Prometheus text exposition format.
///
/// Names are sanitized (`.` becomes `_`). Counters and gauges are emitted per
/// node; histograms as summaries with quantiles.
pub fn export_prometheus<W: Write>(snapshot: &MetricsSnapshot, writer: &mut W) -> std::io::Result<()> {
    for (name, total) in &snapshot.counters {
        let prom = prometheus_name(name);
        write_help(writer, name, &prom, "counter")?;
        if !write_node_values(writer, &prom, snapshot, |n| n.counters.get(name).map(|v| *v as f64))? {
            writeln!(writer, "{} {}", prom, total)?;
        }
    }

    for (name, total) in &snapshot.gauges {
        let prom = prometheus_name(name);
        write_help(writer, name, &prom, "gauge")?;
        if !write_node_values(writer, &prom, snapshot, |n| n.gauges.get(name).copied())? {
            writeln!(writer, "{} {}", prom, format_float(*total))?;
        }
    }

    for (name, summary) in &snapshot.histograms {
        let prom = prometheus_name(name);
        write_help(writer, name, &prom, "summary")?;
        for (quantile, value) in [("0.5", summary.p50), ("0.9", summary.p90), ("0.99", summary.p99)] {
            writeln!(writer, "{}{{quantile=\"{}\"}} {}", prom, quantile, format_float(value))?;
        }
        writeln!(writer, "{}_sum {}", prom, format_float(summary.sum))?;
        writeln!(writer, "{}_count {}", prom, summary.count)?;
    }

    Ok(())
}

fn write_help<W: Write>(writer: &mut W, name: &str, prom: &str, kind: &str) -> std::io::Result<()> {
    if let Some(def) = metric_defs::ALL.iter().find(|d| d.name == name) {
        writeln!(writer, "# HELP {} {}", prom, def.description)?;
    }
    writeln!(writer, "# TYPE {} {}", prom, kind)
}

/// Write one line per node carrying the metric. Returns false when no node did.
fn write_node_values<W, F>(writer: &mut W, prom: &str, snapshot: &MetricsSnapshot, value: F) -> std::io::Result<bool>
where
    W: Write,
    F: Fn(&NodeMetrics) -> Option<f64>,
{
    let mut written = false;
    for (node, metrics) in &snapshot.nodes {
        if let Some(v) = value(metrics) {
            writeln!(writer, "{}{{node=\"{}\"}} {}", prom, node, format_float(v))?;
            written = true;
        }
    }
    Ok(written)
}

fn prometheus_name(name: &str) -> String {
    name.replace(['.', '-'], "_")
}

fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{}", value)
    }
}

// ============================================================================
// In-Memory Recorder
// ============================================================================

/// A counter cell.
#[derive(Debug, Default)]
struct CounterState {
    value: AtomicU64,
}

/// A gauge cell; the f64 is stored as bits.
#[derive(Debug, Default)]
struct GaugeState {
    value: AtomicU64,
}

impl GaugeState {
    fn update(&self, f: impl Fn(f64) -> f64) {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            let next = f(f64::from_bits(current)).to_bits();
            match self.value.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.value.load(Ordering::Relaxed))
    }
}

/// Histogram samples.
#[derive(Debug, Default)]
struct HistogramState {
    samples: RwLock<Vec<f64>>,
}

/// One registered key: its metric name and labels plus the value cell.
#[derive(Debug)]
struct Entry<T> {
    name: String,
    node: Option<String>,
    state: Arc<T>,
}

#[derive(Debug, Default)]
struct RecorderState {
    counters: RwLock<BTreeMap<String, Entry<CounterState>>>,
    gauges: RwLock<BTreeMap<String, Entry<GaugeState>>>,
    histograms: RwLock<BTreeMap<String, Entry<HistogramState>>>,
}

/// Unique key string: name plus sorted labels.
fn key_to_string(key: &Key) -> String {
    let mut labels: Vec<String> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
    if labels.is_empty() {
        return key.name().to_string();
    }
    labels.sort();
    format!("{}|{}", key.name(), labels.join(","))
}

fn get_or_create<T: Default>(map: &RwLock<BTreeMap<String, Entry<T>>>, key: &Key) -> Arc<T> {
    let key_str = key_to_string(key);
    if let Some(entry) = map.read().get(&key_str) {
        return entry.state.clone();
    }
    map.write()
        .entry(key_str)
        .or_insert_with(|| Entry {
            name: key.name().to_string(),
            node: key.labels().find(|l| l.key() == "node").map(|l| l.value().to_string()),
            state: Arc::new(T::default()),
        })
        .state
        .clone()
}

impl RecorderState {
    fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = MetricsSnapshot {
            counters: BTreeMap::new(),
            gauges: BTreeMap::new(),
            histograms: BTreeMap::new(),
            nodes: BTreeMap::new(),
        };

        for entry in self.counters.read().values() {
            let value = entry.state.value.load(Ordering::Relaxed);
            *snapshot.counters.entry(entry.name.clone()).or_default() += value;
            if let Some(node) = &entry.node {
                let node = snapshot.nodes.entry(node.clone()).or_default();
                *node.counters.entry(entry.name.clone()).or_default() += value;
            }
        }

        for entry in self.gauges.read().values() {
            let value = entry.state.get();
            *snapshot.gauges.entry(entry.name.clone()).or_default() += value;
            if let Some(node) = &entry.node {
                let node = snapshot.nodes.entry(node.clone()).or_default();
                *node.gauges.entry(entry.name.clone()).or_default() += value;
            }
        }

        let mut all_samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut node_samples: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
        for entry in self.histograms.read().values() {
            let samples = entry.state.samples.read();
            all_samples.entry(entry.name.clone()).or_default().extend(samples.iter());
            if let Some(node) = &entry.node {
                node_samples
                    .entry((node.clone(), entry.name.clone()))
                    .or_default()
                    .extend(samples.iter());
            }
        }
        for (name, samples) in all_samples {
            snapshot.histograms.insert(name, HistogramSummary::from_samples(&samples));
        }
        for ((node, name), samples) in node_samples {
            let node = snapshot.nodes.entry(node).or_default();
            node.histograms.insert(name, HistogramSummary::from_samples(&samples));
        }

        snapshot
    }

    fn clear(&self) {
        for entry in self.counters.read().values() {
            entry.state.value.store(0, Ordering::Relaxed);
        }
        for entry in self.gauges.read().values() {
            entry.state.value.store(0.0f64.to_bits(), Ordering::Relaxed);
        }
        for entry in self.histograms.read().values() {
            entry.state.samples.write().clear();
        }
    }
}

/// In-memory metrics recorder that collects metrics for later export.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecorder {
    state: Arc<RecorderState>,
}

impl InMemoryRecorder {
    /// Create a new in-memory recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a snapshot of all current metric values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.state.snapshot()
    }

    /// Reset every value, keeping registered keys.
    pub fn clear(&self) {
        self.state.clear();
    }
}

struct InMemoryCounter(Arc<CounterState>);

impl metrics::CounterFn for InMemoryCounter {
    fn increment(&self, value: u64) {
        self.0.value.fetch_add(value, Ordering::Relaxed);
    }

    fn absolute(&self, value: u64) {
        self.0.value.fetch_max(value, Ordering::Relaxed);
    }
}

struct InMemoryGauge(Arc<GaugeState>);

impl metrics::GaugeFn for InMemoryGauge {
    fn increment(&self, value: f64) {
        self.0.update(|v| v + value);
    }

    fn decrement(&self, value: f64) {
        self.0.update(|v| v - value);
    }

    fn set(&self, value: f64) {
        self.0.value.store(value.to_bits(), Ordering::Relaxed);
    }
}

struct InMemoryHistogram(Arc<HistogramState>);

impl metrics::HistogramFn for InMemoryHistogram {
    fn record(&self, value: f64) {
        self.0.samples.write().push(value);
    }
}

impl Recorder for InMemoryRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(InMemoryCounter(get_or_create(&self.state.counters, key))))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(InMemoryGauge(get_or_create(&self.state.gauges, key))))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(InMemoryHistogram(get_or_create(&self.state.histograms, key))))
    }
}
