//! 摄入装配：标准输入 → 流式解码 → 总线。
//!
//! 整次摄入受 `LADA_INGEST_TIMEOUT_SECONDS` 截止时间约束，超时即取消；
//! 不合法记录按 `LADA_INVALID_POLICY` 处理，`report` 策略下以 JSON 输出到标准输出。

use domain::cancel_pair;
use lada_config::AppConfig;
use lada_ingest::Ingestor;
use lada_transport::connect_publisher;
use std::time::Duration;
use tracing::{info, warn};

pub async fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let publisher = connect_publisher(&config.transport_url, &config.transport_client_id).await?;
    let ingestor = Ingestor::new(publisher.clone(), config.invalid_policy);

    let (handle, signal) = cancel_pair();
    let deadline = Duration::from_secs(config.ingest_timeout_seconds);
    let timer = tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        handle.cancel();
    });

    let result = ingestor.ingest(tokio::io::stdin(), &signal).await;
    timer.abort();

    // 无论摄入结果如何都要释放总线连接
    if let Err(err) = publisher.shutdown().await {
        warn!(target: "lada.ingest", error = %err, "publisher_shutdown_failed");
    }

    let report = match result {
        Ok(report) => report,
        Err(err) => {
            warn!(
                target: "lada.ingest",
                error = %err,
                class = ?err.class(),
                "ingest_failed"
            );
            return Err(err.into());
        }
    };

    info!(
        target: "lada.ingest",
        published = report.published,
        invalid = report.invalid.len(),
        policy = ?ingestor.policy(),
        "ingest_finished"
    );
    let response = report.into_response();
    if !response.invalid.is_empty() {
        println!("{}", serde_json::to_string(&response)?);
    }
    Ok(())
}
