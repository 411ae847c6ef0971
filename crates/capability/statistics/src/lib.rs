//! 聚合能力：按 15 分钟分桶的日内序列、最新值快照、位置与接入状态。

mod fill;

pub use fill::{BUCKET_MINUTES, BUCKETS_PER_DAY, bucket_width, fill_day};

use api_contract::{Location, Statistic, Statistics, Status};
use chrono::{FixedOffset, NaiveDate};
use domain::{DayWindow, GapFill, SensorType};
use lada_storage::{StatisticsStore, StorageError};
use std::sync::Arc;
use tracing::debug;

/// 聚合错误。
#[derive(Debug, thiserror::Error)]
pub enum StatisticsError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 统计查询服务（只读）。
#[derive(Clone)]
pub struct StatisticsService {
    store: Arc<dyn StatisticsStore>,
    offset: FixedOffset,
    gap_fill: GapFill,
}

impl StatisticsService {
    pub fn new(store: Arc<dyn StatisticsStore>, offset: FixedOffset, gap_fill: GapFill) -> Self {
        Self {
            store,
            offset,
            gap_fill,
        }
    }

    pub fn gap_fill(&self) -> GapFill {
        self.gap_fill
    }

    /// 速度、油量、发动机温度、转速的最新值（同一快照）。
    pub async fn latest(&self) -> Result<Statistics, StatisticsError> {
        let values = self
            .store
            .latest_values(&[
                SensorType::Speed,
                SensorType::Fuel,
                SensorType::EngineTemperature,
                SensorType::Revolution,
            ])
            .await?;

        let mut stats = Statistics::default();
        for (sensor, value) in values {
            match sensor {
                SensorType::Speed => stats.speed = value,
                SensorType::Fuel => stats.fuel = value,
                SensorType::EngineTemperature => stats.engine_temperature = value,
                SensorType::Revolution => stats.revolutions = value,
                _ => {}
            }
        }
        Ok(stats)
    }

    /// 指定日期、传感器的 96 个桶，按桶起点升序。
    pub async fn for_date(
        &self,
        date: NaiveDate,
        sensor: SensorType,
    ) -> Result<Vec<Statistic>, StatisticsError> {
        let window = DayWindow::new(date, self.offset);
        let averages = self
            .store
            .bucket_averages(window, sensor, bucket_width())
            .await?;
        debug!(
            target: "lada.statistics",
            date = %date,
            sensor = %sensor,
            buckets_with_data = averages.len(),
            "day_series_loaded"
        );
        Ok(fill_day(window, sensor, &averages, self.gap_fill))
    }

    pub async fn location(&self) -> Result<Location, StatisticsError> {
        let values = self
            .store
            .latest_values(&[SensorType::LocationLatitude, SensorType::LocationLongitude])
            .await?;

        let mut location = Location::default();
        for (sensor, value) in values {
            match sensor {
                SensorType::LocationLatitude => location.latitude = value,
                SensorType::LocationLongitude => location.longitude = value,
                _ => {}
            }
        }
        Ok(location)
    }

    pub async fn status(&self) -> Result<Status, StatisticsError> {
        Ok(Status {
            last_ingest_timestamp: self.store.last_reading_at().await?,
        })
    }
}
