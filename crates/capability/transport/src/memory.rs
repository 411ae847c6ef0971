//! 进程内总线（测试与单进程接线）。

use crate::{MessageHandler, Publisher, Subscriber, TransportError};
use async_trait::async_trait;
use domain::CancelSignal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug)]
struct Envelope {
    payload: Vec<u8>,
    attempts: u32,
}

enum Take {
    Message(Envelope),
    Drained,
    Empty,
}

#[derive(Debug, Default)]
struct BusState {
    queue: VecDeque<Envelope>,
    closed: bool,
    published: u64,
    acked: u64,
    nacked: u64,
}

/// 进程内队列：ACK 即丢弃，NACK 放回队首等待重投。
#[derive(Debug, Default)]
pub struct InMemoryBus {
    state: Mutex<BusState>,
    notify: Notify,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 关闭通道：不再接受发布，订阅端取完剩余消息后正常返回。
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.notify.notify_waiters();
    }

    /// 未被 ACK 的消息数。
    pub fn pending(&self) -> usize {
        self.state.lock().map(|state| state.queue.len()).unwrap_or(0)
    }

    pub fn published(&self) -> u64 {
        self.state.lock().map(|state| state.published).unwrap_or(0)
    }

    pub fn acked(&self) -> u64 {
        self.state.lock().map(|state| state.acked).unwrap_or(0)
    }

    pub fn nacked(&self) -> u64 {
        self.state.lock().map(|state| state.nacked).unwrap_or(0)
    }

    fn try_take(&self) -> Result<Take, TransportError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| TransportError::Receive("bus lock poisoned".to_string()))?;
        if let Some(envelope) = state.queue.pop_front() {
            return Ok(Take::Message(envelope));
        }
        if state.closed {
            return Ok(Take::Drained);
        }
        Ok(Take::Empty)
    }

    /// 等待下一条消息；`Ok(None)` 表示通道已关闭且已取空。

    async fn next(&self, cancel: &CancelSignal) -> Result<Option<Envelope>, TransportError> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            match self.try_take()? {
                Take::Message(envelope) => return Ok(Some(envelope)),
                Take::Drained => return Ok(None),
                Take::Empty => {}
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = &mut notified => {}
            }
        }
    }

    fn ack(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.acked += 1;
        }
    }

    fn nack(&self, mut envelope: Envelope) {
        envelope.attempts += 1;
        if let Ok(mut state) = self.state.lock() {
            state.nacked += 1;
            state.queue.push_front(envelope);
        }
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl Publisher for InMemoryBus {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TransportError::Publish("bus lock poisoned".to_string()))?;
            if state.closed {
                return Err(TransportError::Closed);
            }
            state.published += 1;
            state.queue.push_back(Envelope {
                payload,
                attempts: 0,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.close();
        Ok(())
    }
}

#[async_trait]
impl Subscriber for InMemoryBus {
    async fn receive_loop(
        &self,
        handler: Arc<dyn MessageHandler>,
        cancel: &CancelSignal,
    ) -> Result<(), TransportError> {
        while let Some(envelope) = self.next(cancel).await? {
            lada_telemetry::record_message_received();
            match handler.handle(&envelope.payload).await {
                Ok(()) => self.ack(),
                Err(err) => {
                    tracing::warn!(
                        target: "lada.transport",
                        attempts = envelope.attempts + 1,
                        error = %err,
                        "message_nacked"
                    );
                    self.nack(envelope);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.close();
        Ok(())
    }
}
