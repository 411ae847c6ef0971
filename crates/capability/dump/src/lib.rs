//! 每日导出：把一天的读数写成 gzip 压缩的 JSON 行文件。

mod blob;

pub use blob::{BlobSink, BlobWriter, FsBlobSink, MemoryBlobSink};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use domain::{CancelSignal, DayWindow, Reading};
use flate2::Compression;
use flate2::write::GzEncoder;
use lada_storage::{ReadingStore, ReadingVisitor, StorageError};
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// 导出错误。
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("failed to open blob {0}: {1}")]
    Open(String, #[source] io::Error),
    #[error("failed to read readings: {0}")]
    Storage(StorageError),
    #[error("failed to write blob: {0}")]
    Write(#[source] io::Error),
    #[error("failed to commit blob: {0}")]
    Commit(#[source] io::Error),
    #[error("dump cancelled")]
    Cancelled,
}

impl From<StorageError> for DumpError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Cancelled => DumpError::Cancelled,
            other => DumpError::Storage(other),
        }
    }
}

/// 单次导出结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpReport {
    pub name: String,
    pub rows: usize,
}

/// 每日导出器。
pub struct Dumper {
    readings: Arc<dyn ReadingStore>,
    blobs: Arc<dyn BlobSink>,
    window: DayWindow,
}

impl Dumper {
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        blobs: Arc<dyn BlobSink>,
        date: NaiveDate,
        offset: FixedOffset,
    ) -> Self {
        Self {
            readings,
            blobs,
            window: DayWindow::new(date, offset),
        }
    }

    /// 以时间点所在自然日（该偏移下）为导出日期。
    pub fn for_instant(
        readings: Arc<dyn ReadingStore>,
        blobs: Arc<dyn BlobSink>,
        at: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            readings,
            blobs,
            window: DayWindow::containing(at, offset),
        }
    }

    pub fn window(&self) -> DayWindow {
        self.window
    }

    /// `YYYY-MM-DD.json.gz`
    pub fn blob_name(&self) -> String {
        format!("{}.json.gz", self.window.date().format("%Y-%m-%d"))
    }

    /// 导出整日数据；只有扫描与压缩全部成功后 blob 才会提交。
    pub async fn dump(&self, cancel: &CancelSignal) -> Result<DumpReport, DumpError> {
        let name = self.blob_name();
        let blob = self
            .blobs
            .create(&name)
            .map_err(|err| DumpError::Open(name.clone(), err))?;

        let mut visitor = JsonLines {
            encoder: GzEncoder::new(blob, Compression::default()),
        };
        let rows = match self
            .readings
            .for_each_on_date(self.window, cancel, &mut visitor)
            .await
        {
            Ok(rows) => rows,
            Err(err) => {
                warn!(target: "lada.dump", blob = %name, error = %err, "dump_aborted");
                return Err(err.into());
            }
        };

        let blob = visitor.encoder.finish().map_err(DumpError::Write)?;
        blob.commit().map_err(DumpError::Commit)?;

        lada_telemetry::record_rows_dumped(rows as u64);
        info!(
            target: "lada.dump",
            blob = %name,
            date = %self.window.date(),
            rows,
            "dump_completed"
        );
        Ok(DumpReport { name, rows })
    }
}

/// 逐行写入 JSON 的访问者。
struct JsonLines<W: Write + Send> {
    encoder: GzEncoder<W>,
}

#[async_trait::async_trait]
impl<W: Write + Send> ReadingVisitor for JsonLines<W> {
    async fn visit(&mut self, reading: Reading) -> Result<(), StorageError> {
        serde_json::to_writer(&mut self.encoder, &reading).map_err(StorageError::visitor)?;
        self.encoder
            .write_all(b"\n")
            .map_err(StorageError::visitor)
    }
}
