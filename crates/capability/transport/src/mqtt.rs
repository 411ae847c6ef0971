//! MQTT 总线适配（QoS 1）。
//!
//! 发布端以 PUBACK 作为发布成功；连接出错后不重连，错误交给调用方。
//! 订阅端使用持久会话 + 手动 ACK：处理器失败的消息不 ACK，
//! 重连后由 broker 重投。MQTT 没有 NACK。

use crate::{MessageHandler, Publisher, SHUTDOWN_TIMEOUT, Subscriber, TransportError};
use async_trait::async_trait;
use domain::CancelSignal;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_PORT: u16 = 1883;
const KEEP_ALIVE: Duration = Duration::from_secs(30);
/// 订阅端在处理器运行期间不轮询事件循环（也就不发 PINGREQ），
/// 单条消息的处理时长必须小于约 1.5 倍该值，否则 broker 会断开会话。
pub const SUBSCRIBER_KEEP_ALIVE: Duration = Duration::from_secs(300);

/// MQTT 连接配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttTransportConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic: String,
    pub client_id: String,
}

impl MqttTransportConfig {
    /// 解析 `mqtt://[user[:pass]@]host[:port]/topic`。
    pub fn parse_url(url: &str, client_id: &str) -> Result<Self, TransportError> {
        if client_id.trim().is_empty() {
            return Err(TransportError::Url("empty client id".to_string()));
        }
        let rest = url
            .strip_prefix("mqtt://")
            .or_else(|| url.strip_prefix("tcp://"))
            .ok_or_else(|| TransportError::Url(url.to_string()))?;
        let (authority, topic) = rest
            .split_once('/')
            .ok_or_else(|| TransportError::Url(url.to_string()))?;
        if topic.is_empty() {
            return Err(TransportError::Url(url.to_string()));
        }

        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, authority),
        };
        let (username, password) = match userinfo {
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(info.to_string()), None),
            },
            None => (None, None),
        };
        let (host, port) = match hostport.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| TransportError::Url(url.to_string()))?;
                (host, port)
            }
            None => (hostport, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(TransportError::Url(url.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            username,
            password,
            topic: topic.to_string(),
            client_id: client_id.to_string(),
        })
    }

    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some(username) = self.username.as_ref() {
            options.set_credentials(username, self.password.clone().unwrap_or_default());
        }
        options
    }

    /// 订阅端选项：持久会话、手动 ACK、放宽的保活间隔。
    fn subscriber_options(&self) -> MqttOptions {
        let mut options = self.options();
        options.set_keep_alive(SUBSCRIBER_KEEP_ALIVE);
        options.set_clean_session(false);
        options.set_manual_acks(true);
        options
    }
}

/// 轮询事件循环直到收到 CONNACK。
async fn wait_connack(eventloop: &mut EventLoop) -> Result<(), TransportError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
            Ok(_) => {}
            Err(err) => return Err(TransportError::Connect(err.to_string())),
        }
    }
}

/// 等待 PUBACK 的发布请求。
#[derive(Default)]
struct PendingAcks {
    /// 已交给客户端、尚未分配 pkid（按发出顺序）
    queued: VecDeque<oneshot::Sender<Result<(), String>>>,
    inflight: HashMap<u16, oneshot::Sender<Result<(), String>>>,
    /// 事件循环已退出的原因；之后的发布直接失败
    closed: Option<String>,
}

impl PendingAcks {
    fn fail_all(&mut self, reason: &str) {
        self.closed = Some(reason.to_string());
        for done in self.queued.drain(..) {
            let _ = done.send(Err(reason.to_string()));
        }
        for (_, done) in self.inflight.drain() {
            let _ = done.send(Err(reason.to_string()));
        }
    }
}

/// MQTT 发布端。
///
/// `publish` 在收到 broker 的 PUBACK 后才返回成功。事件循环出错即停止，
/// 未确认和之后的发布都返回错误，不做内部重连。
pub struct MqttPublisher {
    client: AsyncClient,
    topic: String,
    acks: Arc<Mutex<PendingAcks>>,
    /// 保证入队顺序与客户端发出顺序一致
    send_order: tokio::sync::Mutex<()>,
    eventloop_task: Mutex<Option<JoinHandle<()>>>,
}

impl MqttPublisher {
    pub async fn connect(config: MqttTransportConfig) -> Result<Self, TransportError> {
        let (client, mut eventloop) = AsyncClient::new(config.options(), 10);
        wait_connack(&mut eventloop).await?;
        info!(
            target: "lada.transport",
            host = %config.host,
            port = config.port,
            topic = %config.topic,
            "mqtt_publisher_connected"
        );

        let acks = Arc::new(Mutex::new(PendingAcks::default()));
        let task = tokio::spawn(drive_publisher(eventloop, acks.clone()));

        Ok(Self {
            client,
            topic: config.topic,
            acks,
            send_order: tokio::sync::Mutex::new(()),
            eventloop_task: Mutex::new(Some(task)),
        })
    }

    fn lock_acks(&self) -> Result<MutexGuard<'_, PendingAcks>, TransportError> {
        self.acks
            .lock()
            .map_err(|_| TransportError::Publish("ack lock poisoned".to_string()))
    }
}

/// 驱动发布端事件循环：按 pkid 完成 PUBACK 等待者，出错即退出。
async fn drive_publisher(mut eventloop: EventLoop, acks: Arc<Mutex<PendingAcks>>) {
    loop {
        let event = eventloop.poll().await;
        let Ok(mut pending) = acks.lock() else {
            return;
        };
        match event {
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                if let Some(done) = pending.queued.pop_front() {
                    pending.inflight.insert(pkid, done);
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                if let Some(done) = pending.inflight.remove(&ack.pkid) {
                    let _ = done.send(Ok(()));
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                pending.fail_all("publisher disconnected");
                return;
            }
            Ok(_) => {}
            Err(err) => {
                warn!(target: "lada.transport", error = %err, "mqtt_publisher_eventloop_error");
                pending.fail_all(&err.to_string());
                return;
            }
        }
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        let (done, acked) = oneshot::channel();
        {
            let _order = self.send_order.lock().await;
            {
                let mut pending = self.lock_acks()?;
                if let Some(reason) = pending.closed.as_ref() {
                    return Err(TransportError::Publish(reason.clone()));
                }
                pending.queued.push_back(done);
            }
            if let Err(err) = self
                .client
                .publish(self.topic.clone(), QoS::AtLeastOnce, false, payload)
                .await
            {
                self.lock_acks()?.queued.pop_back();
                return Err(TransportError::Publish(err.to_string()));
            }
        }

        match acked.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(TransportError::Publish(reason)),
            Err(_) => Err(TransportError::Publish("eventloop stopped".to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let task = self
            .eventloop_task
            .lock()
            .map_err(|_| TransportError::Shutdown("task lock poisoned".to_string()))?
            .take();
        let Some(task) = task else {
            return Ok(());
        };
        let client = self.client.clone();
        let drain = async move {
            // 事件循环已因错误退出时请求通道已关闭，直接等待任务结束
            if let Err(err) = client.disconnect().await {
                debug!(target: "lada.transport", error = %err, "mqtt_publisher_already_stopped");
            }
            task.await
                .map_err(|err| TransportError::Shutdown(err.to_string()))
        };
        tokio::time::timeout(SHUTDOWN_TIMEOUT, drain)
            .await
            .map_err(|_| TransportError::Shutdown("timed out".to_string()))?
    }
}

/// MQTT 订阅端。
pub struct MqttSubscriber {
    client: AsyncClient,
    eventloop: tokio::sync::Mutex<EventLoop>,
}

impl MqttSubscriber {
    pub async fn connect(config: MqttTransportConfig) -> Result<Self, TransportError> {
        let (client, mut eventloop) = AsyncClient::new(config.subscriber_options(), 10);
        wait_connack(&mut eventloop).await?;
        client
            .subscribe(config.topic.clone(), QoS::AtLeastOnce)
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        info!(
            target: "lada.transport",
            host = %config.host,
            port = config.port,
            topic = %config.topic,
            "mqtt_subscriber_connected"
        );

        Ok(Self {
            client,
            eventloop: tokio::sync::Mutex::new(eventloop),
        })
    }
}

#[async_trait]
impl Subscriber for MqttSubscriber {
    async fn receive_loop(
        &self,
        handler: Arc<dyn MessageHandler>,
        cancel: &CancelSignal,
    ) -> Result<(), TransportError> {
        let mut eventloop = self.eventloop.lock().await;
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                event = eventloop.poll() => event,
            };
            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    lada_telemetry::record_message_received();
                    match handler.handle(&publish.payload).await {
                        Ok(()) => self
                            .client
                            .ack(&publish)
                            .await
                            .map_err(|err| TransportError::Receive(err.to_string()))?,
                        Err(err) => {
                            warn!(
                                target: "lada.transport",
                                pkid = publish.pkid,
                                error = %err,
                                "message_not_acked"
                            );
                            return Err(err);
                        }
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => return Ok(()),
                Ok(_) => {}
                Err(err) => return Err(TransportError::Receive(err.to_string())),
            }
        }
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        let drain = async {
            self.client
                .disconnect()
                .await
                .map_err(|err| TransportError::Shutdown(err.to_string()))?;
            let mut eventloop = self.eventloop.lock().await;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => return Ok(()),
                    Ok(_) => {}
                    Err(err) => return Err(TransportError::Shutdown(err.to_string())),
                }
            }
        };
        tokio::time::timeout(SHUTDOWN_TIMEOUT, drain)
            .await
            .map_err(|_| TransportError::Shutdown("timed out".to_string()))?
    }
}
