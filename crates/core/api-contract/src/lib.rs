//! 稳定的查询响应契约。
//!
//! 由外部 HTTP 层直接序列化返回，字段名为 camelCase。

use chrono::{DateTime, Utc};
use domain::{ReadingPayload, SensorType};
use serde::{Deserialize, Serialize};

/// 各类传感器的最新值快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub speed: f64,
    pub fuel: f64,
    pub engine_temperature: f64,
    pub revolutions: f64,
}

/// 单个时间桶的均值。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistic {
    pub sensor: SensorType,
    pub value: f64,
    /// 桶起点。
    pub timestamp: DateTime<Utc>,
}

/// 最新位置。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// 数据接入状态。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_ingest_timestamp: Option<DateTime<Utc>>,
}

/// 摄入响应：列出未通过校验的记录。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<ReadingPayload>,
}
