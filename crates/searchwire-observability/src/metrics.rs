//! Transport metrics definitions.
//!
//! All metrics use OpenTelemetry conventions.
//! They can be exported via OTLP to Prometheus, Grafana, Datadog, etc.

use std::sync::Arc;

use opentelemetry::{
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};

use searchwire_core::diagnostics::{AttemptRecord, CallDiagnostics, DiagnosticsSink};
use searchwire_core::settings::TransportSettings;

/// Central metrics handle for the transport.
///
/// Attempt-level metrics arrive through [`DiagnosticsSink`]; call-level
/// metrics through the status handler installed by [`TransportMetrics::install`].
#[derive(Clone)]
pub struct TransportMetrics {
    pub attempts: Counter<u64>,
    pub attempt_latency_ms: Histogram<f64>,
    pub calls: Counter<u64>,
    pub call_retries: Histogram<u64>,
}

impl TransportMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            attempts: meter
                .u64_counter("searchwire.attempts")
                .with_description("Network attempts (primary, ping, sniff) by outcome")
                .build(),
            attempt_latency_ms: meter
                .f64_histogram("searchwire.attempt_latency_ms")
                .with_description("Duration of a single network attempt in milliseconds")
                .build(),
            calls: meter
                .u64_counter("searchwire.calls")
                .with_description("Completed logical calls by outcome")
                .build(),
            call_retries: meter
                .u64_histogram("searchwire.call_retries")
                .with_description("Failovers needed per logical call")
                .build(),
        }
    }

    /// Route attempt records and call outcomes of `settings` into these
    /// metrics. Replaces any sink or status handler already configured.
    pub fn install(self: Arc<Self>, settings: TransportSettings) -> TransportSettings {
        let handler = Arc::clone(&self);
        settings
            .with_diagnostics_sink(self)
            .with_status_handler(move |d| handler.record_call(d))
    }

    pub fn record_attempt(&self, record: &AttemptRecord) {
        let kind = KeyValue::new("kind", record.kind.to_string());
        self.attempts.add(
            1,
            &[
                kind.clone(),
                KeyValue::new("outcome", outcome(record.success)),
            ],
        );
        self.attempt_latency_ms
            .record(record.elapsed.as_secs_f64() * 1000.0, &[kind]);
    }

    pub fn record_call(&self, diagnostics: &CallDiagnostics) {
        let mut attributes = vec![
            KeyValue::new("method", diagnostics.method.as_str()),
            KeyValue::new("outcome", outcome(diagnostics.success)),
        ];
        if let Some(err) = &diagnostics.error {
            attributes.push(KeyValue::new("error_kind", err.kind().to_string()));
        }
        self.calls.add(1, &attributes);
        self.call_retries.record(diagnostics.retries as u64, &[]);
    }
}

impl DiagnosticsSink for TransportMetrics {
    fn record(&self, record: &AttemptRecord) {
        self.record_attempt(record);
    }
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use searchwire_core::diagnostics::AttemptKind;
    use searchwire_core::Node;

    fn metrics() -> Arc<TransportMetrics> {
        Arc::new(TransportMetrics::new(&opentelemetry::global::meter("searchwire-test")))
    }

    #[test]
    fn install_wires_sink_and_handler() {
        let settings = metrics().install(TransportSettings::default());
        assert!(settings.diagnostics_sink.is_some());
        assert!(settings.status_handler.is_some());
    }

    #[test]
    fn records_without_exporter() {
        let m = metrics();
        m.record(&AttemptRecord {
            started_on: chrono::Utc::now(),
            node: Node::parse("http://a:9200").unwrap(),
            path: "/".into(),
            kind: AttemptKind::Ping,
            elapsed: Duration::from_millis(3),
            success: true,
            status: Some(200),
        });
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(outcome(true), "success");
        assert_eq!(outcome(false), "failure");
    }
}
