use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const AUDIT_TARGET: &str = "kvdocs::audit";
pub const METRICS_TARGET: &str = "kvdocs::metrics";

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub slow_query_ms: u64,
    pub enable_audit: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let slow = std::env::var("KVDOCS_SLOW_QUERY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(500);
        Self { slow_query_ms: slow, enable_audit: true }
    }
}

#[derive(Default)]
pub struct Metrics {
    pub queries_total: AtomicU64,
    pub queries_slow_total: AtomicU64,
    pub documents_scanned_total: AtomicU64,
    pub writes_total: AtomicU64,
    pub audits_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queries_total: u64,
    pub queries_slow_total: u64,
    pub documents_scanned_total: u64,
    pub writes_total: u64,
    pub audits_total: u64,
}

#[derive(Default)]
pub struct Telemetry {
    pub cfg: RwLock<TelemetryConfig>,
    pub metrics: Metrics,
    // For tests we can capture audit lines in-memory
    audit_sink: RwLock<Option<Arc<RwLock<Vec<String>>>>>,
}

pub(crate) static TELEMETRY: std::sync::LazyLock<Telemetry> =
    std::sync::LazyLock::new(Telemetry::default);

pub fn configure(cfg: TelemetryConfig) {
    *TELEMETRY.cfg.write() = cfg;
}
pub fn set_audit_sink_for_tests(sink: Arc<RwLock<Vec<String>>>) {
    *TELEMETRY.audit_sink.write() = Some(sink);
}

/// Record one full-collection scan.
pub fn log_query(collection: &str, scanned: usize, matched: usize, elapsed: Duration) {
    let m = &TELEMETRY.metrics;
    m.queries_total.fetch_add(1, Ordering::Relaxed);
    m.documents_scanned_total
        .fetch_add(crate::utils::num::usize_to_u64(scanned), Ordering::Relaxed);
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    if duration_ms >= TELEMETRY.cfg.read().slow_query_ms {
        m.queries_slow_total.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "slow query on {collection}: {duration_ms} ms, scanned={scanned} matched={matched}"
        );
    }
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"scan\",\"collection\":\"{}\",\"duration_ms\":{},\"scanned\":{},\"matched\":{}}}",
        collection,
        duration_ms,
        scanned,
        matched
    );
}

pub fn log_audit(op: &str, collection: &str, doc_id: &str) {
    TELEMETRY.metrics.writes_total.fetch_add(1, Ordering::Relaxed);
    if !TELEMETRY.cfg.read().enable_audit {
        return;
    }
    TELEMETRY.metrics.audits_total.fetch_add(1, Ordering::Relaxed);
    let line = serde_json::json!({
        "op": op, "collection": collection, "doc_id": doc_id
    })
    .to_string();
    let audit_clone = TELEMETRY.audit_sink.read().clone();
    if let Some(sink) = audit_clone {
        sink.write().push(line.clone());
    }
    log::info!(target: AUDIT_TARGET, "{line}");
}

#[must_use]
pub fn metrics_snapshot() -> MetricsSnapshot {
    let m = &TELEMETRY.metrics;
    MetricsSnapshot {
        queries_total: m.queries_total.load(Ordering::Relaxed),
        queries_slow_total: m.queries_slow_total.load(Ordering::Relaxed),
        documents_scanned_total: m.documents_scanned_total.load(Ordering::Relaxed),
        writes_total: m.writes_total.load(Ordering::Relaxed),
        audits_total: m.audits_total.load(Ordering::Relaxed),
    }
}

#[must_use]
pub fn metrics_text() -> String {
    // OpenMetrics/Prometheus exposition format (no types/HELP for brevity)
    let m = metrics_snapshot();
    format!(
        "kvdocs_queries_total {}\n\
         kvdocs_queries_slow_total {}\n\
         kvdocs_documents_scanned_total {}\n\
         kvdocs_writes_total {}\n\
         kvdocs_audits_total {}\n",
        m.queries_total,
        m.queries_slow_total,
        m.documents_scanned_total,
        m.writes_total,
        m.audits_total,
    )
}

/// Emit the current counters on the metrics log target.
pub fn flush_metrics() {
    log::info!(target: METRICS_TARGET, "{}", metrics_text().replace('\n', " ").trim_end());
}
