//! 数据库连接管理
//!
//! - connect_pool：建立 Postgres 连接池（最大连接数 8）
//! - ensure_schema：创建 `reading` 表，按需转换为 TimescaleDB hypertable

use crate::error::StorageError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

/// 建立 Postgres 连接池
pub async fn connect_pool(database_url: &str) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// 初始化表结构（可重复执行）。
///
/// 主键 `(sensor, timestamp)` 即幂等写入依赖的唯一约束；
/// `(timestamp, sensor)` 索引服务按日导出的键集分页。
pub async fn ensure_schema(pool: &PgPool, require_timescale: bool) -> Result<(), StorageError> {
    sqlx::query(
        "create table if not exists reading ( \
            sensor text not null, \
            value double precision not null, \
            timestamp timestamptz not null, \
            primary key (sensor, timestamp) \
         )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "create index if not exists reading_timestamp_sensor_idx on reading (timestamp, sensor)",
    )
    .execute(pool)
    .await?;

    if require_timescale {
        sqlx::query("create extension if not exists timescaledb")
            .execute(pool)
            .await?;
        sqlx::query("select create_hypertable('reading', 'timestamp', if_not_exists => true)")
            .execute(pool)
            .await?;
    }

    info!(target: "lada.storage", timescale = require_timescale, "schema_ready");
    Ok(())
}
