//! 读数内存实现

use crate::error::StorageError;
use crate::traits::{
    BucketAverage, DEFAULT_BATCH_SIZE, ReadingStore, ReadingVisitor, StatisticsStore,
};
use chrono::{DateTime, TimeDelta, Utc};
use domain::{CancelSignal, DayWindow, Reading, SensorType};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// 读数内存存储
///
/// 以 `(timestamp, sensor)` 为键，迭代顺序与 PostgreSQL 导出顺序一致。
pub struct InMemoryReadingStore {
    rows: RwLock<BTreeMap<(DateTime<Utc>, SensorType), f64>>,
    batch_size: usize,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// 当前行数（用于测试）
    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self, window: DayWindow) -> Result<Vec<Reading>, StorageError> {
        let rows = self.rows.read().map_err(|_| StorageError::Lock)?;
        Ok(rows
            .iter()
            .filter(|((timestamp, _), _)| window.contains(*timestamp))
            .map(|((timestamp, sensor), value)| Reading::new(*sensor, *value, *timestamp))
            .collect())
    }

    fn latest(
        rows: &BTreeMap<(DateTime<Utc>, SensorType), f64>,
        sensor: SensorType,
    ) -> f64 {
        rows.iter()
            .rev()
            .find(|((_, row_sensor), _)| *row_sensor == sensor)
            .map(|(_, value)| *value)
            .unwrap_or(0.0)
    }
}

impl Default for InMemoryReadingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn save(&self, reading: &Reading) -> Result<bool, StorageError> {
        let mut rows = self.rows.write().map_err(|_| StorageError::Lock)?;
        if rows.contains_key(&reading.key()) {
            return Ok(false);
        }
        rows.insert(reading.key(), reading.value);
        Ok(true)
    }

    async fn for_each_on_date(
        &self,
        window: DayWindow,
        cancel: &CancelSignal,
        visitor: &mut dyn ReadingVisitor,
    ) -> Result<usize, StorageError> {
        // 先取快照，扫描期间的并发写入不可见
        let snapshot = self.snapshot(window)?;
        let mut visited = 0;
        for batch in snapshot.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                return Err(StorageError::Cancelled);
            }
            for reading in batch {
                visitor.visit(*reading).await?;
                visited += 1;
            }
        }
        Ok(visited)
    }

    async fn latest_value(&self, sensor: SensorType) -> Result<f64, StorageError> {
        let rows = self.rows.read().map_err(|_| StorageError::Lock)?;
        Ok(Self::latest(&rows, sensor))
    }
}

#[async_trait::async_trait]
impl StatisticsStore for InMemoryReadingStore {
    async fn latest_values(
        &self,
        sensors: &[SensorType],
    ) -> Result<Vec<(SensorType, f64)>, StorageError> {
        let rows = self.rows.read().map_err(|_| StorageError::Lock)?;
        Ok(sensors
            .iter()
            .map(|sensor| (*sensor, Self::latest(&rows, *sensor)))
            .collect())
    }

    async fn bucket_averages(
        &self,
        window: DayWindow,
        sensor: SensorType,
        width: TimeDelta,
    ) -> Result<Vec<BucketAverage>, StorageError> {
        let width_ms = width.num_milliseconds();
        if width_ms <= 0 {
            return Ok(Vec::new());
        }
        let rows = self.rows.read().map_err(|_| StorageError::Lock)?;
        let mut buckets: BTreeMap<i64, (f64, i64)> = BTreeMap::new();
        for ((timestamp, row_sensor), value) in rows.iter() {
            if *row_sensor != sensor || !window.contains(*timestamp) {
                continue;
            }
            let offset_ms = (*timestamp - window.start()).num_milliseconds();
            let entry = buckets.entry(offset_ms.div_euclid(width_ms)).or_default();
            entry.0 += value;
            entry.1 += 1;
        }

        Ok(buckets
            .into_iter()
            .map(|(index, (sum, samples))| BucketAverage {
                start: window.start() + TimeDelta::milliseconds(index * width_ms),
                average: sum / samples as f64,
                samples,
            })
            .collect())
    }

    async fn last_reading_at(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let rows = self.rows.read().map_err(|_| StorageError::Lock)?;
        Ok(rows.keys().next_back().map(|(timestamp, _)| *timestamp))
    }
}
