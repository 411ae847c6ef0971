//! # PostgreSQL 存储实现模块
//!
//! 依赖表 `reading(sensor text, value double precision, timestamp timestamptz)`，
//! 主键 `(sensor, timestamp)`，见 [`crate::connection::ensure_schema`]。
//!
//! ## 事务
//!
//! - `save`：单条 `insert ... on conflict do nothing`，自身即一个短事务
//! - `for_each_on_date`：一个 `REPEATABLE READ, READ ONLY` 事务覆盖全部批次
//! - 统计快照：一个只读事务内读取多个传感器
//!
//! `sqlx::Transaction` 在未提交时被丢弃会自动回滚，错误与取消路径因此不会遗留半完成的事务。

pub mod reading;
pub mod statistics;

pub use reading::*;
pub use statistics::*;

use crate::error::StorageError;
use domain::{Reading, SensorType};
use sqlx::Row;
use sqlx::postgres::PgRow;

fn row_to_reading(row: &PgRow) -> Result<Reading, StorageError> {
    let sensor: String = row.try_get("sensor")?;
    let sensor = sensor
        .parse::<SensorType>()
        .map_err(|err| StorageError::Decode(err.to_string()))?;
    Ok(Reading::new(
        sensor,
        row.try_get("value")?,
        row.try_get("timestamp")?,
    ))
}
