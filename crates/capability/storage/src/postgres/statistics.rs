//! Postgres 统计查询（只读）

use crate::error::StorageError;
use crate::traits::{BucketAverage, StatisticsStore};
use chrono::{DateTime, TimeDelta, Utc};
use domain::{DayWindow, SensorType};
use sqlx::{PgPool, Row};

pub struct PgStatisticsStore {
    pub pool: PgPool,
}

impl PgStatisticsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl StatisticsStore for PgStatisticsStore {
    async fn latest_values(
        &self,
        sensors: &[SensorType],
    ) -> Result<Vec<(SensorType, f64)>, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("set transaction isolation level repeatable read, read only")
            .execute(&mut *tx)
            .await?;

        let mut values = Vec::with_capacity(sensors.len());
        for sensor in sensors {
            let row = sqlx::query(
                "select value from reading where sensor = $1 order by timestamp desc limit 1",
            )
            .bind(sensor.as_str())
            .fetch_optional(&mut *tx)
            .await?;
            let value = match row {
                Some(row) => row.try_get("value")?,
                None => 0.0,
            };
            values.push((*sensor, value));
        }

        tx.commit().await?;
        Ok(values)
    }

    async fn bucket_averages(
        &self,
        window: DayWindow,
        sensor: SensorType,
        width: TimeDelta,
    ) -> Result<Vec<BucketAverage>, StorageError> {
        let width_secs = width.num_milliseconds() as f64 / 1000.0;
        if width_secs <= 0.0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "select floor(extract(epoch from (timestamp - $2))::double precision / $4)::bigint as bucket, \
               avg(value) as average, \
               count(*) as samples \
             from reading \
             where sensor = $1 \
             and timestamp >= $2 \
             and timestamp < $3 \
             group by bucket \
             order by bucket asc",
        )
        .bind(sensor.as_str())
        .bind(window.start())
        .bind(window.end())
        .bind(width_secs)
        .fetch_all(&self.pool)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let bucket: i64 = row.try_get("bucket")?;
            items.push(BucketAverage {
                start: window.start() + TimeDelta::milliseconds(bucket * width.num_milliseconds()),
                average: row.try_get("average")?,
                samples: row.try_get("samples")?,
            });
        }
        Ok(items)
    }

    async fn last_reading_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let row = sqlx::query("select max(timestamp) as last from reading")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("last")?)
    }
}
