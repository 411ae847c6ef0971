//! 读数总线抽象。
//!
//! 至少一次投递：订阅端在处理器成功后才 ACK；处理失败时 NACK（通道支持时）
//! 或不 ACK，由通道重投。消费端必须幂等。

use async_trait::async_trait;
use domain::CancelSignal;
use std::sync::Arc;
use std::time::Duration;

mod memory;
mod mqtt;

pub use memory::InMemoryBus;
pub use mqtt::{MqttPublisher, MqttSubscriber, MqttTransportConfig, SUBSCRIBER_KEEP_ALIVE};

/// 关闭操作的上限时长。
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// 总线错误。
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid transport url: {0}")]
    Url(String),
    #[error("connect error: {0}")]
    Connect(String),
    #[error("publish error: {0}")]
    Publish(String),
    #[error("receive error: {0}")]
    Receive(String),
    /// 处理器失败，保留原始错误供调用方区分
    #[error("handler error: {0}")]
    Handler(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("shutdown error: {0}")]
    Shutdown(String),
    #[error("transport closed")]
    Closed,
    #[error("cancelled")]
    Cancelled,
}

/// 消息处理器（返回 Ok 才会被 ACK）。
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> Result<(), TransportError>;
}

/// 发布端。
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// 刷出在途消息并断开，最长 [`SHUTDOWN_TIMEOUT`]。
    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// 订阅端。
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// 逐条投递给处理器，直到取消、通道关闭或处理器失败。
    ///
    /// - 取消：返回 [`TransportError::Cancelled`]
    /// - 通道正常关闭：返回 `Ok(())`
    /// - 处理器失败：消息不 ACK，错误原样返回
    async fn receive_loop(
        &self,
        handler: Arc<dyn MessageHandler>,
        cancel: &CancelSignal,
    ) -> Result<(), TransportError>;

    async fn shutdown(&self) -> Result<(), TransportError>;
}

/// 按 URL 建立 MQTT 发布端（启动期连接失败直接返回错误）。
pub async fn connect_publisher(
    url: &str,
    client_id: &str,
) -> Result<Arc<dyn Publisher>, TransportError> {
    let config = MqttTransportConfig::parse_url(url, client_id)?;
    let publisher = MqttPublisher::connect(config).await?;
    Ok(Arc::new(publisher))
}

/// 按 URL 建立 MQTT 订阅端（持久会话 + 手动 ACK）。
pub async fn connect_subscriber(
    url: &str,
    client_id: &str,
) -> Result<Arc<dyn Subscriber>, TransportError> {
    let config = MqttTransportConfig::parse_url(url, client_id)?;
    let subscriber = MqttSubscriber::connect(config).await?;
    Ok(Arc::new(subscriber))
}
