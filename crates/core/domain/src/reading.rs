//! 传感器读数模型。

use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// 传感器类型（固定枚举，不可在运行期扩展）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Speed,
    Fuel,
    Revolution,
    EngineTemperature,
    LocationLatitude,
    LocationLongitude,
}

impl SensorType {
    /// 全部可识别的传感器类型。
    pub const ALL: [SensorType; 6] = [
        SensorType::Speed,
        SensorType::Fuel,
        SensorType::Revolution,
        SensorType::EngineTemperature,
        SensorType::LocationLatitude,
        SensorType::LocationLongitude,
    ];

    /// 存储与传输使用的标签。
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Speed => "speed",
            SensorType::Fuel => "fuel",
            SensorType::Revolution => "revolution",
            SensorType::EngineTemperature => "engine_temperature",
            SensorType::LocationLatitude => "location_latitude",
            SensorType::LocationLongitude => "location_longitude",
        }
    }
}

// 按标签排序，与数据库中 text 列的排序一致。
impl Ord for SensorType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for SensorType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未识别的传感器标签。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown sensor: {0}")]
pub struct UnknownSensor(pub String);

impl FromStr for SensorType {
    type Err = UnknownSensor;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SensorType::ALL
            .into_iter()
            .find(|sensor| sensor.as_str() == value)
            .ok_or_else(|| UnknownSensor(value.to_string()))
    }
}

/// 已通过校验的读数。
///
/// 存储身份键为 `(sensor, timestamp)`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub sensor: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new(sensor: SensorType, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor,
            value,
            timestamp,
        }
    }

    /// 幂等写入使用的身份键。
    pub fn key(&self) -> (DateTime<Utc>, SensorType) {
        (self.timestamp, self.sensor)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.sensor,
            self.value,
            self.timestamp.to_rfc3339()
        )
    }
}

impl From<Reading> for ReadingPayload {
    fn from(reading: Reading) -> Self {
        Self {
            sensor: reading.sensor.as_str().to_string(),
            value: reading.value,
            timestamp: Some(reading.timestamp),
        }
    }
}

/// 校验失败原因。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidReading {
    #[error(transparent)]
    UnknownSensor(#[from] UnknownSensor),
    #[error("timestamp missing")]
    MissingTimestamp,
    #[error("value out of range: {0}")]
    ValueOutOfRange(f64),
}

/// 线上读数（宽松解析）。
///
/// 只要 JSON 结构正确即可解析成功，字段是否合法由 [`ReadingPayload::validate`] 判定，
/// 这样"能解析但不合法"的记录可以被单独上报。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingPayload {
    #[serde(default)]
    pub sensor: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ReadingPayload {
    /// 校验并转换为 [`Reading`]。
    ///
    /// 规则：传感器标签可识别、时间戳已设置（缺省或 `0001-01-01T00:00:00Z` 视为未设置）、
    /// 值为有限且非负。
    ///
    /// 时间戳截断到微秒，与 `timestamptz` 的精度一致。
    pub fn validate(&self) -> Result<Reading, InvalidReading> {
        let sensor = self.sensor.parse::<SensorType>()?;
        let timestamp = match self.timestamp {
            Some(ts) if !is_unset(ts) => ts,
            _ => return Err(InvalidReading::MissingTimestamp),
        };
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(InvalidReading::ValueOutOfRange(self.value));
        }
        Ok(Reading {
            sensor,
            value: self.value,
            timestamp: timestamp.trunc_subsecs(6),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

fn is_unset(ts: DateTime<Utc>) -> bool {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0)
        .single()
        .is_some_and(|zero| zero == ts)
}
