//! Postgres 读数写入与按日导出

use super::row_to_reading;
use crate::error::StorageError;
use crate::traits::{DEFAULT_BATCH_SIZE, ReadingStore, ReadingVisitor};
use chrono::{DateTime, Utc};
use domain::{CancelSignal, DayWindow, Reading, SensorType};
use sqlx::{PgPool, Row};
use tracing::debug;

pub struct PgReadingStore {
    pub pool: PgPool,
    batch_size: usize,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_batch_size(pool, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(pool: PgPool, batch_size: usize) -> Self {
        Self {
            pool,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn save(&self, reading: &Reading) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "insert into reading (sensor, value, timestamp) values ($1, $2, $3) \
             on conflict (sensor, timestamp) do nothing",
        )
        .bind(reading.sensor.as_str())
        .bind(reading.value)
        .bind(reading.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn for_each_on_date(
        &self,
        window: DayWindow,
        cancel: &CancelSignal,
        visitor: &mut dyn ReadingVisitor,
    ) -> Result<usize, StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("set transaction isolation level repeatable read, read only")
            .execute(&mut *tx)
            .await?;

        // 键集游标：上一批最后一行的 (timestamp, sensor)
        let mut cursor: Option<(DateTime<Utc>, String)> = None;
        let mut visited = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            let (cursor_ts, cursor_sensor) = match cursor.as_ref() {
                Some((ts, sensor)) => (Some(*ts), Some(sensor.clone())),
                None => (None, None),
            };
            let fetch = sqlx::query(
                "select sensor, value, timestamp \
                 from reading \
                 where timestamp >= $1 \
                 and timestamp < $2 \
                 and ($3::timestamptz is null or (timestamp, sensor) > ($3::timestamptz, $4::text)) \
                 order by timestamp asc, sensor asc \
                 limit $5",
            )
            .bind(window.start())
            .bind(window.end())
            .bind(cursor_ts)
            .bind(cursor_sensor)
            .bind(self.batch_size as i64)
            .fetch_all(&mut *tx);
            let rows = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(StorageError::Cancelled),
                rows = fetch => rows?,
            };

            let fetched = rows.len();
            for row in &rows {
                let reading = row_to_reading(row)?;
                cursor = Some((reading.timestamp, reading.sensor.as_str().to_string()));
                visitor.visit(reading).await?;
                visited += 1;
            }
            debug!(
                target: "lada.storage",
                date = %window.date(),
                batch = fetched,
                visited,
                "export_batch"
            );
            if fetched < self.batch_size {
                break;
            }
        }

        tx.commit().await?;
        Ok(visited)
    }

    async fn latest_value(&self, sensor: SensorType) -> Result<f64, StorageError> {
        let row = sqlx::query(
            "select value from reading where sensor = $1 order by timestamp desc limit 1",
        )
        .bind(sensor.as_str())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.try_get("value")?),
            None => Ok(0.0),
        }
    }
}
