//! Prometheus metrics
//!
//! Counters and histograms for the streaming pipeline, exposed at
//! `/metrics`.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the render handle
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_stt_latency(ms: u64) {
    metrics::histogram!("babelroom_stt_latency_ms").record(ms as f64);
}

pub fn record_translation_latency(ms: u64) {
    metrics::histogram!("babelroom_translation_latency_ms").record(ms as f64);
}

pub fn record_tts_latency(ms: u64) {
    metrics::histogram!("babelroom_tts_latency_ms").record(ms as f64);
}

pub fn record_utterance() {
    metrics::counter!("babelroom_utterances_total").increment(1);
}

pub fn record_error(kind: &'static str) {
    metrics::counter!("babelroom_errors_total", "kind" => kind).increment(1);
}

pub fn set_active_sessions(count: usize) {
    metrics::gauge!("babelroom_active_sessions").set(count as f64);
}
