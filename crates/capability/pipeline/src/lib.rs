//! 持久化链路：总线消息 → 校验 → 幂等写入。

use async_trait::async_trait;
use domain::{CancelSignal, InvalidReading, Reading, ReadingPayload};
use lada_storage::{ReadingStore, StorageError};
use lada_transport::{MessageHandler, Subscriber, TransportError};
use std::sync::Arc;
use tracing::{info, warn};

/// 单条消息的处理结果。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PersistOutcome {
    /// 新写入
    Persisted(Reading),
    /// 身份键已存在（重投），原行不变
    Duplicate(Reading),
}

/// 持久化错误。
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to decode reading: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("invalid reading: {0}")]
    Invalid(#[from] InvalidReading),
    #[error("failed to store reading: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transport(TransportError),
    #[error("persist loop cancelled")]
    Cancelled,
}

// 处理器自身的错误原样取回，存储错误不会被折叠成总线错误。
impl From<TransportError> for PersistError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Cancelled => PersistError::Cancelled,
            TransportError::Handler(source) => match source.downcast::<PersistError>() {
                Ok(err) => *err,
                Err(source) => PersistError::Transport(TransportError::Handler(source)),
            },
            other => PersistError::Transport(other),
        }
    }
}

/// 持久化处理器。
///
/// 消息体为单条读数的 JSON；写入前再次校验，不合法的消息不会落库。
#[derive(Clone)]
pub struct Persistor {
    readings: Arc<dyn ReadingStore>,
}

impl Persistor {
    pub fn new(readings: Arc<dyn ReadingStore>) -> Self {
        Self { readings }
    }

    /// 处理一条消息体。重复的身份键返回 [`PersistOutcome::Duplicate`] 而不是错误。
    pub async fn handle_payload(&self, payload: &[u8]) -> Result<PersistOutcome, PersistError> {
        let request: ReadingPayload =
            serde_json::from_slice(payload).map_err(PersistError::Decode)?;
        let reading = request.validate()?;

        let inserted = self.readings.save(&reading).await?;
        if inserted {
            lada_telemetry::record_reading_persisted();
            info!(
                target: "lada.persist",
                sensor = %reading.sensor,
                value = reading.value,
                timestamp = %reading.timestamp,
                "reading_persisted"
            );
            Ok(PersistOutcome::Persisted(reading))
        } else {
            lada_telemetry::record_duplicate_skipped();
            info!(
                target: "lada.persist",
                sensor = %reading.sensor,
                timestamp = %reading.timestamp,
                "reading_duplicate_skipped"
            );
            Ok(PersistOutcome::Duplicate(reading))
        }
    }

    /// 在订阅端上运行接收循环，直到取消、通道关闭或处理失败。
    pub async fn run(
        &self,
        subscriber: &dyn Subscriber,
        cancel: &CancelSignal,
    ) -> Result<(), PersistError> {
        let handler: Arc<dyn MessageHandler> = Arc::new(self.clone());
        subscriber.receive_loop(handler, cancel).await?;
        info!(target: "lada.persist", "persist_loop_drained");
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for Persistor {
    async fn handle(&self, payload: &[u8]) -> Result<(), TransportError> {
        match self.handle_payload(payload).await {
            Ok(_) => Ok(()),
            Err(err) => {
                lada_telemetry::record_persist_failure();
                warn!(target: "lada.persist", error = %err, "reading_persist_failed");
                Err(TransportError::Handler(Box::new(err)))
            }
        }
    }
}
