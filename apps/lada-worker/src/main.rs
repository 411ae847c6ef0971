//! 读数链路运行时：按 `LADA_MODE` 运行 ingest / persist / dump 之一。

mod dump;
mod ingest;
mod persist;

use lada_config::{AppConfig, ConfigError, RunMode};
use lada_telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();

    info!(target: "lada.worker", mode = config.mode.as_str(), "worker_starting");
    match config.mode {
        RunMode::Ingest => ingest::run(&config).await?,
        RunMode::Persist => persist::run(&config).await?,
        RunMode::Dump => dump::run(&config).await?,
    }

    let snapshot = lada_telemetry::metrics().snapshot();
    info!(target: "lada.worker", metrics = ?snapshot, "worker_finished");
    Ok(())
}

/// persist / dump 模式必需的数据库地址。
pub(crate) fn database_url(config: &AppConfig) -> Result<&str, ConfigError> {
    config
        .database_url
        .as_deref()
        .ok_or_else(|| ConfigError::Missing("LADA_DATABASE_URL".to_string()))
}
