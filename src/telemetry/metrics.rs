//! Metric instruments and sinks.
//!
//! Handlers emit [`MetricEvent`]s through the [`MetricsSink`] trait. The
//! production sink is [`PrometheusSink`], which declares every instrument on a
//! `prometheus::Registry` up-front; [`InMemorySink`] keeps the raw events and
//! backs the tests and the offline `check` command.

use ahash::AHashMap as HashMap;
use prometheus::{
    exponential_buckets, linear_buckets, CounterVec, Encoder, GaugeVec, HistogramOpts,
    HistogramVec, Opts, Registry, TextEncoder,
};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, warn};

// ========== Instrument names ==========
pub const FUNCTION_REQUESTS_TOTAL: &str = "function_requests_total";
pub const HEALTH_CHECKS_TOTAL: &str = "health_checks_total";
pub const METRICS_REQUESTS_TOTAL: &str = "metrics_requests_total";
pub const SYSTEM_METRICS_REQUESTS_TOTAL: &str = "system_metrics_requests_total";
pub const FUNCTION_REQUEST_DURATION_MS: &str = "function_request_duration_ms";
pub const SYSTEM_MEMORY_USAGE_BYTES: &str = "system_memory_usage_bytes";
pub const PROCESS_INFO_REQUESTS_TOTAL: &str = "process_info_requests_total";
pub const PROCESS_HEAP_BYTES: &str = "process_heap_bytes";
pub const PROCESS_WORKING_SET_BYTES: &str = "process_working_set_bytes";
pub const PROCESS_CPU_USAGE_PERCENT: &str = "process_cpu_usage_percent";
pub const PROCESS_THREAD_COUNT: &str = "process_thread_count";
pub const RUNTIME_GC_COLLECTIONS_TOTAL: &str = "runtime_gc_collections_total";

/// Labels carried by every request counter.
const REQUEST_LABELS: &[&str] = &["function", "method", "status"];

/// Kind of instrument an event is recorded against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Histogram,
    UpDownCounter,
}

/// A single emitted measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricEvent {
    pub name: String,
    pub kind: MetricKind,
    pub value: f64,
    pub tags: BTreeMap<String, String>,
}

impl MetricEvent {
    pub fn new(name: &str, kind: MetricKind, value: f64, tags: &[(&str, &str)]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            value,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Returns the value of `key`, if the event carries that tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Destination for metric events. Implementations must tolerate concurrent use.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, event: MetricEvent);

    fn add_counter(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.emit(MetricEvent::new(name, MetricKind::Counter, value, tags));
    }

    fn record_histogram(&self, name: &str, value: f64, tags: &[(&str, &str)]) {
        self.emit(MetricEvent::new(name, MetricKind::Histogram, value, tags));
    }

    fn add_up_down(&self, name: &str, delta: f64, tags: &[(&str, &str)]) {
        self.emit(MetricEvent::new(name, MetricKind::UpDownCounter, delta, tags));
    }
}

/// A declared Prometheus instrument with its fixed label set.
enum Instrument {
    Counter(CounterVec),
    Histogram(HistogramVec),
    UpDown(GaugeVec),
}

struct Declared {
    instrument: Instrument,
    labels: &'static [&'static str],
}

/// Sink that aggregates events into Prometheus instruments.
pub struct PrometheusSink {
    registry: Registry,
    instruments: HashMap<&'static str, Declared>,
}

impl PrometheusSink {
    /// Creates and registers all instruments with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let mut sink = Self {
            registry,
            instruments: HashMap::new(),
        };

        // ========== Request counters ==========
        sink.counter(
            FUNCTION_REQUESTS_TOTAL,
            "Total number of function requests",
            REQUEST_LABELS,
        )?;
        sink.counter(
            HEALTH_CHECKS_TOTAL,
            "Total number of health check requests",
            REQUEST_LABELS,
        )?;
        sink.counter(
            METRICS_REQUESTS_TOTAL,
            "Total number of metrics endpoint requests",
            REQUEST_LABELS,
        )?;
        sink.counter(
            SYSTEM_METRICS_REQUESTS_TOTAL,
            "Total number of system metrics requests",
            REQUEST_LABELS,
        )?;

        // ========== Request duration ==========
        sink.histogram(
            FUNCTION_REQUEST_DURATION_MS,
            "Duration of function requests in milliseconds",
            &["function", "method"],
            vec![
                5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 150.0, 200.0, 300.0, 500.0, 1000.0, 2500.0,
                5000.0,
            ],
        )?;

        // ========== Process metrics ==========
        sink.up_down(
            SYSTEM_MEMORY_USAGE_BYTES,
            "Current process working set in bytes",
            &[],
        )?;
        sink.counter(
            PROCESS_INFO_REQUESTS_TOTAL,
            "Process information requests",
            &["function", "process_id"],
        )?;
        sink.histogram(
            PROCESS_HEAP_BYTES,
            "Heap memory in use in bytes",
            &[],
            exponential_buckets(1024.0 * 1024.0, 2.0, 12)?,
        )?;
        sink.histogram(
            PROCESS_WORKING_SET_BYTES,
            "Process working set in bytes",
            &[],
            exponential_buckets(4.0 * 1024.0 * 1024.0, 2.0, 12)?,
        )?;
        sink.histogram(
            PROCESS_CPU_USAGE_PERCENT,
            "Process CPU usage percentage",
            &[],
            linear_buckets(0.0, 10.0, 11)?,
        )?;
        sink.histogram(
            PROCESS_THREAD_COUNT,
            "Current thread count",
            &[],
            exponential_buckets(1.0, 2.0, 10)?,
        )?;
        sink.counter(
            RUNTIME_GC_COLLECTIONS_TOTAL,
            "Total garbage collections",
            &["generation"],
        )?;

        // ========== Standard process collector ==========
        #[cfg(target_os = "linux")]
        {
            let collector = prometheus::process_collector::ProcessCollector::for_self();
            sink.registry.register(Box::new(collector))?;
        }

        debug!("{} instruments registered", sink.instruments.len());
        Ok(sink)
    }

    fn counter(
        &mut self,
        name: &'static str,
        help: &str,
        labels: &'static [&'static str],
    ) -> Result<(), prometheus::Error> {
        let vec = CounterVec::new(Opts::new(name, help), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        self.instruments.insert(
            name,
            Declared {
                instrument: Instrument::Counter(vec),
                labels,
            },
        );
        Ok(())
    }

    fn histogram(
        &mut self,
        name: &'static str,
        help: &str,
        labels: &'static [&'static str],
        buckets: Vec<f64>,
    ) -> Result<(), prometheus::Error> {
        let vec = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        self.instruments.insert(
            name,
            Declared {
                instrument: Instrument::Histogram(vec),
                labels,
            },
        );
        Ok(())
    }

    fn up_down(
        &mut self,
        name: &'static str,
        help: &str,
        labels: &'static [&'static str],
    ) -> Result<(), prometheus::Error> {
        let vec = GaugeVec::new(Opts::new(name, help), labels)?;
        self.registry.register(Box::new(vec.clone()))?;
        self.instruments.insert(
            name,
            Declared {
                instrument: Instrument::UpDown(vec),
                labels,
            },
        );
        Ok(())
    }

    /// Encodes the registry in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::with_capacity(16 * 1024);
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsSink for PrometheusSink {
    fn emit(&self, event: MetricEvent) {
        let Some(declared) = self.instruments.get(event.name.as_str()) else {
            debug!("Dropping event for undeclared instrument {}", event.name);
            return;
        };

        // Label values follow the declared order; absent tags export as ""
        let values: Vec<&str> = declared
            .labels
            .iter()
            .map(|label| event.tag(label).unwrap_or(""))
            .collect();

        let result = match (&declared.instrument, event.kind) {
            (Instrument::Counter(vec), MetricKind::Counter) => {
                if event.value < 0.0 {
                    warn!("Ignoring negative increment {} for {}", event.value, event.name);
                    return;
                }
                vec.get_metric_with_label_values(values.as_slice())
                    .map(|c| c.inc_by(event.value))
            }
            (Instrument::Histogram(vec), MetricKind::Histogram) => vec
                .get_metric_with_label_values(values.as_slice())
                .map(|h| h.observe(event.value)),
            (Instrument::UpDown(vec), MetricKind::UpDownCounter) => vec
                .get_metric_with_label_values(values.as_slice())
                .map(|g| g.add(event.value)),
            (_, kind) => {
                warn!("Instrument {} does not accept {:?} events", event.name, kind);
                return;
            }
        };

        if let Err(e) = result {
            warn!("Failed to record {}: {}", event.name, e);
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Default)]
pub struct InMemorySink {
    events: Mutex<Vec<MetricEvent>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events recorded so far, in emission order.
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Events recorded for the named instrument.
    pub fn events_named(&self, name: &str) -> Vec<MetricEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.name == name)
            .collect()
    }

    /// Number of events recorded for the named instrument.
    pub fn count(&self, name: &str) -> usize {
        self.events_named(name).len()
    }

    /// Sum of all values recorded for the named instrument.
    pub fn sum(&self, name: &str) -> f64 {
        self.events_named(name).iter().map(|e| e.value).sum()
    }
}

impl MetricsSink for InMemorySink {
    fn emit(&self, event: MetricEvent) {
        if let Ok(mut guard) = self.events.lock() {
            guard.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prometheus_sink_counts_requests_by_label() {
        let sink = PrometheusSink::new().expect("instruments should register");
        sink.add_counter(
            FUNCTION_REQUESTS_TOTAL,
            1.0,
            &[("function", "Function1"), ("method", "GET"), ("status", "ok")],
        );
        sink.add_counter(
            FUNCTION_REQUESTS_TOTAL,
            1.0,
            &[("function", "Function1"), ("method", "GET"), ("status", "ok")],
        );

        let output = sink.encode().expect("encoding should succeed");
        assert!(
            output.contains(
                "function_requests_total{function=\"Function1\",method=\"GET\",status=\"ok\"} 2"
            ),
            "unexpected exposition output:\n{output}"
        );
    }

    #[test]
    fn test_prometheus_sink_missing_tag_exports_empty_label() {
        let sink = PrometheusSink::new().expect("instruments should register");
        sink.add_counter(
            METRICS_REQUESTS_TOTAL,
            1.0,
            &[("function", "Metrics"), ("method", "GET")],
        );

        let output = sink.encode().expect("encoding should succeed");
        assert!(output.contains("status=\"\""));
    }

    #[test]
    fn test_prometheus_sink_up_down_tracks_running_value() {
        let sink = PrometheusSink::new().expect("instruments should register");
        sink.add_up_down(SYSTEM_MEMORY_USAGE_BYTES, 1000.0, &[]);
        sink.add_up_down(SYSTEM_MEMORY_USAGE_BYTES, -400.0, &[]);

        let output = sink.encode().expect("encoding should succeed");
        assert!(output.contains("system_memory_usage_bytes 600"));
    }

    #[test]
    fn test_prometheus_sink_ignores_unknown_and_mismatched_events() {
        let sink = PrometheusSink::new().expect("instruments should register");
        sink.add_counter("not_declared_total", 1.0, &[]);
        sink.record_histogram(FUNCTION_REQUESTS_TOTAL, 1.0, &[]);
        sink.add_counter(RUNTIME_GC_COLLECTIONS_TOTAL, -1.0, &[("generation", "0")]);

        let output = sink.encode().expect("encoding should succeed");
        assert!(!output.contains("not_declared_total"));
        assert!(!output.contains("runtime_gc_collections_total{"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_prometheus_sink_exports_standard_process_metrics() {
        let sink = PrometheusSink::new().expect("instruments should register");
        let output = sink.encode().expect("encoding should succeed");
        assert!(output.contains("process_resident_memory_bytes"));
        assert!(output.contains("process_cpu_seconds_total"));
        assert!(output.contains("process_start_time_seconds"));
    }

    #[test]
    fn test_prometheus_sink_histogram_observation() {
        let sink = PrometheusSink::new().expect("instruments should register");
        sink.record_histogram(
            FUNCTION_REQUEST_DURATION_MS,
            120.0,
            &[("function", "Health"), ("method", "GET")],
        );

        let output = sink.encode().expect("encoding should succeed");
        assert!(output
            .contains("function_request_duration_ms_count{function=\"Health\",method=\"GET\"} 1"));
    }

    #[test]
    fn test_in_memory_sink_filters_by_name() {
        let sink = InMemorySink::new();
        sink.add_counter("a_total", 2.0, &[("k", "v")]);
        sink.add_counter("b_total", 5.0, &[]);
        sink.add_counter("a_total", 3.0, &[]);

        assert_eq!(sink.count("a_total"), 2);
        assert_eq!(sink.sum("a_total"), 5.0);
        assert_eq!(sink.events()[0].tag("k"), Some("v"));
        assert_eq!(sink.events().len(), 3);
    }
}
