//! 持久化装配：总线订阅 → 校验 → PostgreSQL 幂等写入。

use crate::database_url;
use domain::CancelSignal;
use lada_config::AppConfig;
use lada_pipeline::{PersistError, Persistor};
use lada_storage::{PgReadingStore, connect_pool, ensure_schema};
use lada_transport::connect_subscriber;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    // 启动期连接失败直接退出
    let pool = connect_pool(database_url(config)?).await?;
    ensure_schema(&pool, config.require_timescale).await?;
    let readings = Arc::new(PgReadingStore::with_batch_size(
        pool,
        config.export_batch_size,
    ));
    let subscriber =
        connect_subscriber(&config.transport_url, &config.transport_client_id).await?;

    let persistor = Persistor::new(readings);
    info!(target: "lada.persist", url = %config.transport_url, "persist_loop_started");
    let result = persistor
        .run(subscriber.as_ref(), &CancelSignal::never())
        .await;

    if let Err(err) = subscriber.shutdown().await {
        warn!(target: "lada.persist", error = %err, "subscriber_shutdown_failed");
    }

    match result {
        Ok(()) | Err(PersistError::Cancelled) => Ok(()),
        Err(err) => {
            warn!(target: "lada.persist", error = %err, "persist_loop_failed");
            Err(err.into())
        }
    }
}
