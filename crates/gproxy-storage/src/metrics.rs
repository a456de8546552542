//! Metrics Sink (§6: `MetricsSink.{counter, gauge, histogram}`) + Prometheus
//! text-format rendering for the `/metrics` route. Grounded on the
//! teacher's `tracing`-event-as-metric convention, generalized into its own
//! named collaborator with an in-memory aggregator rather than piping
//! through a full `metrics`/`prometheus` crate dependency, since this
//! gateway only needs counters/gauges/histograms it renders itself.

use std::collections::BTreeMap;
use std::sync::Mutex;

pub trait MetricsSink: Send + Sync {
    fn counter(&self, name: &str, labels: &[(&str, &str)], value: u64);
    fn gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);
    fn histogram(&self, name: &str, labels: &[(&str, &str)], value: f64);
}

#[derive(Default, Clone)]
struct HistogramState {
    count: u64,
    sum: f64,
}

fn label_key(name: &str, labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return name.to_string();
    }
    let mut sorted: Vec<(&str, &str)> = labels.to_vec();
    sorted.sort_unstable();
    let rendered = sorted.iter().map(|(k, v)| format!(r#"{k}="{v}""#)).collect::<Vec<_>>().join(",");
    format!("{name}{{{rendered}}}")
}

/// In-process aggregator: counters accumulate, gauges are last-write-wins,
/// histograms track count/sum only (no bucket boundaries — enough to
/// compute an average, not a full distribution, matching the "enrichment,
/// not vendor-exact parity" stance already taken for the cost model).
#[derive(Default)]
pub struct InMemoryMetricsSink {
    counters: Mutex<BTreeMap<String, u64>>,
    gauges: Mutex<BTreeMap<String, f64>>,
    histograms: Mutex<BTreeMap<String, HistogramState>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders every recorded series as Prometheus exposition text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in self.counters.lock().expect("metrics lock poisoned").iter() {
            out.push_str(&format!("{key} {value}\n"));
        }
        for (key, value) in self.gauges.lock().expect("metrics lock poisoned").iter() {
            out.push_str(&format!("{key} {value}\n"));
        }
        for (key, state) in self.histograms.lock().expect("metrics lock poisoned").iter() {
            out.push_str(&format!("{key}_count {}\n", state.count));
            out.push_str(&format!("{key}_sum {}\n", state.sum));
        }
        out
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn counter(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        let key = label_key(name, labels);
        let mut counters = self.counters.lock().expect("metrics lock poisoned");
        *counters.entry(key).or_insert(0) += value;
    }

    fn gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = label_key(name, labels);
        self.gauges.lock().expect("metrics lock poisoned").insert(key, value);
    }

    fn histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let key = label_key(name, labels);
        let mut histograms = self.histograms.lock().expect("metrics lock poisoned");
        let state = histograms.entry(key).or_default();
        state.count += 1;
        state.sum += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_calls_with_same_labels() {
        let sink = InMemoryMetricsSink::new();
        sink.counter("requests_total", &[("provider", "openai")], 1);
        sink.counter("requests_total", &[("provider", "openai")], 2);
        sink.counter("requests_total", &[("provider", "anthropic")], 1);
        let rendered = sink.render();
        assert!(rendered.contains(r#"requests_total{provider="openai"} 3"#));
        assert!(rendered.contains(r#"requests_total{provider="anthropic"} 1"#));
    }

    #[test]
    fn histogram_tracks_count_and_sum() {
        let sink = InMemoryMetricsSink::new();
        sink.histogram("latency_ms", &[], 10.0);
        sink.histogram("latency_ms", &[], 30.0);
        let rendered = sink.render();
        assert!(rendered.contains("latency_ms_count 2"));
        assert!(rendered.contains("latency_ms_sum 40"));
    }
}
