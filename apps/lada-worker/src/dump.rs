//! 导出装配：PostgreSQL → gzip JSON 行 → 目录 blob。

use crate::database_url;
use domain::CancelSignal;
use lada_config::AppConfig;
use lada_dump::{Dumper, FsBlobSink};
use lada_storage::{PgReadingStore, connect_pool};
use std::sync::Arc;
use tracing::info;

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let pool = connect_pool(database_url(config)?).await?;
    let readings = Arc::new(PgReadingStore::with_batch_size(
        pool,
        config.export_batch_size,
    ));
    let blobs = Arc::new(FsBlobSink::new(&config.blob_dir));

    let dumper = Dumper::new(readings, blobs, config.dump_date, config.utc_offset);
    let report = dumper.dump(&CancelSignal::never()).await?;
    info!(
        target: "lada.dump",
        blob = %report.name,
        rows = report.rows,
        dir = %config.blob_dir,
        "dump_written"
    );
    Ok(())
}
