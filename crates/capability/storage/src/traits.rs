//! # 存储接口定义
//!
//! 链路核心只依赖这里的 trait；每种后端各有一个适配实现。

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use domain::{CancelSignal, DayWindow, Reading, SensorType};

/// 按日导出的默认批次大小。
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// 导出访问者：每行调用一次，返回错误即停止扫描。
#[async_trait]
pub trait ReadingVisitor: Send {
    async fn visit(&mut self, reading: Reading) -> Result<(), StorageError>;
}

#[async_trait]
impl<F> ReadingVisitor for F
where
    F: FnMut(Reading) -> Result<(), StorageError> + Send,
{
    async fn visit(&mut self, reading: Reading) -> Result<(), StorageError> {
        (self)(reading)
    }
}

/// 读数存储。
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// 幂等写入：返回 `true` 表示新插入，`false` 表示身份键已存在（原行不变）。
    async fn save(&self, reading: &Reading) -> Result<bool, StorageError>;

    /// 按 `(timestamp, sensor)` 顺序分批访问窗口内的全部读数，返回访问行数。
    ///
    /// 在访问者首个错误、数据结束或取消时停止。
    async fn for_each_on_date(
        &self,
        window: DayWindow,
        cancel: &CancelSignal,
        visitor: &mut dyn ReadingVisitor,
    ) -> Result<usize, StorageError>;

    /// 指定传感器最近一条读数的值；无数据时返回 0。
    async fn latest_value(&self, sensor: SensorType) -> Result<f64, StorageError>;
}

/// 单个时间桶的均值（只包含有数据的桶）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketAverage {
    pub start: DateTime<Utc>,
    pub average: f64,
    pub samples: i64,
}

/// 统计查询（只读）。
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// 在同一快照内读取多个传感器的最新值；无数据的传感器为 0。
    async fn latest_values(
        &self,
        sensors: &[SensorType],
    ) -> Result<Vec<(SensorType, f64)>, StorageError>;

    /// 窗口内按固定宽度分桶的均值，按桶起点升序，空桶省略。
    async fn bucket_averages(
        &self,
        window: DayWindow,
        sensor: SensorType,
        width: TimeDelta,
    ) -> Result<Vec<BucketAverage>, StorageError>;

    /// 最近一条读数的时间戳；表为空时为 `None`。
    async fn last_reading_at(&self) -> Result<Option<DateTime<Utc>>, StorageError>;
}
