//! 缺口填充。

use api_contract::Statistic;
use chrono::{DateTime, TimeDelta, Utc};
use domain::{DayWindow, GapFill, SensorType};
use lada_storage::BucketAverage;
use std::collections::BTreeMap;

pub const BUCKET_MINUTES: i64 = 15;

/// 固定偏移下每天恰好 96 个桶。
pub const BUCKETS_PER_DAY: usize = 96;

pub fn bucket_width() -> TimeDelta {
    TimeDelta::minutes(BUCKET_MINUTES)
}

/// 把稀疏的桶均值补齐为整日序列：输出恰好 [`BUCKETS_PER_DAY`] 条，升序。
///
/// 窗口外或未对齐的均值被忽略。
pub fn fill_day(
    window: DayWindow,
    sensor: SensorType,
    averages: &[BucketAverage],
    policy: GapFill,
) -> Vec<Statistic> {
    let by_start: BTreeMap<DateTime<Utc>, f64> = averages
        .iter()
        .map(|bucket| (bucket.start, bucket.average))
        .collect();

    let mut carried = 0.0;
    window
        .bucket_starts(bucket_width())
        .into_iter()
        .map(|start| {
            let value = match by_start.get(&start) {
                Some(average) => {
                    carried = *average;
                    *average
                }
                None => match policy {
                    GapFill::CarryForward => carried,
                    GapFill::Zero => 0.0,
                },
            };
            Statistic {
                sensor,
                value,
                timestamp: start,
            }
        })
        .collect()
}
