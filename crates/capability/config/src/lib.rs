//! 应用运行配置加载。

use chrono::{FixedOffset, NaiveDate, Offset, TimeDelta, Utc};
use domain::{GapFill, InvalidPolicy};
use std::env;
use std::str::FromStr;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 运行模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// 标准输入 → 总线
    Ingest,
    /// 总线 → 数据库
    Persist,
    /// 数据库 → Blob
    Dump,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Ingest => "ingest",
            RunMode::Persist => "persist",
            RunMode::Dump => "dump",
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ingest" => Ok(RunMode::Ingest),
            "persist" => Ok(RunMode::Persist),
            "dump" => Ok(RunMode::Dump),
            other => Err(other.to_string()),
        }
    }
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RunMode,
    pub database_url: Option<String>,
    pub transport_url: String,
    pub transport_client_id: String,
    pub blob_dir: String,
    pub dump_date: NaiveDate,
    pub utc_offset: FixedOffset,
    pub invalid_policy: InvalidPolicy,
    pub gap_fill: GapFill,
    pub export_batch_size: usize,
    pub ingest_timeout_seconds: u64,
    pub require_timescale: bool,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = read_parsed_with_default("LADA_MODE", RunMode::Persist)?;
        let database_url = read_optional("LADA_DATABASE_URL");
        if database_url.is_none() && mode != RunMode::Ingest {
            return Err(ConfigError::Missing("LADA_DATABASE_URL".to_string()));
        }
        let transport_url = env::var("LADA_TRANSPORT_URL")
            .unwrap_or_else(|_| "mqtt://127.0.0.1:1883/lada/readings".to_string());
        let transport_client_id = read_optional("LADA_TRANSPORT_CLIENT_ID")
            .unwrap_or_else(|| format!("lada-{}", mode.as_str()));
        let blob_dir = env::var("LADA_BLOB_DIR").unwrap_or_else(|_| "./dumps".to_string());
        let utc_offset = read_offset_with_default("LADA_UTC_OFFSET")?;
        let dump_date = match read_optional("LADA_DUMP_DATE") {
            Some(value) => NaiveDate::parse_from_str(&value, "%Y-%m-%d")
                .map_err(|_| ConfigError::Invalid("LADA_DUMP_DATE".to_string(), value))?,
            None => yesterday(utc_offset),
        };
        let invalid_policy = read_parsed_with_default("LADA_INVALID_POLICY", InvalidPolicy::Report)?;
        let gap_fill = read_parsed_with_default("LADA_GAP_FILL", GapFill::CarryForward)?;
        let export_batch_size = read_u64_with_default("LADA_EXPORT_BATCH_SIZE", 100)?;
        if export_batch_size == 0 {
            return Err(ConfigError::Invalid(
                "LADA_EXPORT_BATCH_SIZE".to_string(),
                "0".to_string(),
            ));
        }
        let ingest_timeout_seconds = read_u64_with_default("LADA_INGEST_TIMEOUT_SECONDS", 300)?;
        let require_timescale = read_bool_with_default("LADA_REQUIRE_TIMESCALE", false);

        Ok(Self {
            mode,
            database_url,
            transport_url,
            transport_client_id,
            blob_dir,
            dump_date,
            utc_offset,
            invalid_policy,
            gap_fill,
            export_batch_size: export_batch_size as usize,
            ingest_timeout_seconds,
            require_timescale,
        })
    }
}

fn yesterday(offset: FixedOffset) -> NaiveDate {
    (Utc::now().with_timezone(&offset) - TimeDelta::days(1)).date_naive()
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_parsed_with_default<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    let value = match read_optional(key) {
        Some(value) => value,
        None => return Ok(default),
    };
    value
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

/// 读取 `+HH:MM` / `-HH:MM` 形式的固定偏移。
fn read_offset_with_default(key: &str) -> Result<FixedOffset, ConfigError> {
    let value = match read_optional(key) {
        Some(value) => value,
        None => return Ok(Utc.fix()),
    };
    value
        .parse::<FixedOffset>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
