//! 自然日时间窗口。

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeDelta, Utc};

/// `[当日零点, 当日零点 + 24h)`，零点按固定时区偏移计算。
///
/// 使用固定偏移保证每天恰好 24 小时（无夏令时跳变）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    date: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DayWindow {
    pub fn new(date: NaiveDate, offset: FixedOffset) -> Self {
        let local_midnight = date.and_time(NaiveTime::MIN).and_utc();
        let start = local_midnight - TimeDelta::seconds(i64::from(offset.local_minus_utc()));
        Self {
            date,
            start,
            end: start + TimeDelta::days(1),
        }
    }

    /// UTC 自然日。
    pub fn utc(date: NaiveDate) -> Self {
        Self::new(date, Utc.fix())
    }

    /// 包含给定时间点的自然日。
    pub fn containing(ts: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::new(ts.with_timezone(&offset).date_naive(), offset)
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }

    /// 按固定宽度切分窗口，返回每个桶的起点（升序）。
    pub fn bucket_starts(&self, width: TimeDelta) -> Vec<DateTime<Utc>> {
        let mut starts = Vec::new();
        if width <= TimeDelta::zero() {
            return starts;
        }
        let mut cursor = self.start;
        while cursor < self.end {
            starts.push(cursor);
            cursor += width;
        }
        starts
    }
}
