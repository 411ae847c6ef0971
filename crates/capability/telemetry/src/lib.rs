//! 追踪初始化、摄入批次 ID 与链路计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 单次摄入调用的追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 计数器快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub readings_decoded: u64,
    pub readings_invalid: u64,
    pub readings_published: u64,
    pub publish_failure: u64,
    pub messages_received: u64,
    pub readings_persisted: u64,
    pub duplicates_skipped: u64,
    pub persist_failure: u64,
    pub rows_dumped: u64,
}

/// 链路计数器。
pub struct TelemetryMetrics {
    readings_decoded: AtomicU64,
    readings_invalid: AtomicU64,
    readings_published: AtomicU64,
    publish_failure: AtomicU64,
    messages_received: AtomicU64,
    readings_persisted: AtomicU64,
    duplicates_skipped: AtomicU64,
    persist_failure: AtomicU64,
    rows_dumped: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            readings_decoded: AtomicU64::new(0),
            readings_invalid: AtomicU64::new(0),
            readings_published: AtomicU64::new(0),
            publish_failure: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            readings_persisted: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            persist_failure: AtomicU64::new(0),
            rows_dumped: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            readings_decoded: self.readings_decoded.load(Ordering::Relaxed),
            readings_invalid: self.readings_invalid.load(Ordering::Relaxed),
            readings_published: self.readings_published.load(Ordering::Relaxed),
            publish_failure: self.publish_failure.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            readings_persisted: self.readings_persisted.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            persist_failure: self.persist_failure.load(Ordering::Relaxed),
            rows_dumped: self.rows_dumped.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取进程级计数器实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录解码成功的记录数。
pub fn record_reading_decoded() {
    metrics().readings_decoded.fetch_add(1, Ordering::Relaxed);
}

/// 记录未通过校验的记录数。
pub fn record_reading_invalid() {
    metrics().readings_invalid.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布成功次数。
pub fn record_reading_published() {
    metrics().readings_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布失败次数。
pub fn record_publish_failure() {
    metrics().publish_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录总线消息接收次数。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录新写入的行数。
pub fn record_reading_persisted() {
    metrics().readings_persisted.fetch_add(1, Ordering::Relaxed);
}

/// 记录因身份键重复而跳过的写入。
pub fn record_duplicate_skipped() {
    metrics().duplicates_skipped.fetch_add(1, Ordering::Relaxed);
}

/// 记录写入失败次数。
pub fn record_persist_failure() {
    metrics().persist_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录导出行数。
pub fn record_rows_dumped(rows: u64) {
    metrics().rows_dumped.fetch_add(rows, Ordering::Relaxed);
}
