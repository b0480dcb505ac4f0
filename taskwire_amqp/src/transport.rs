use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::protocol::basic::AMQPProperties;
use lapin::types::FieldTable;
use lapin::ExchangeKind;
use parking_lot::Mutex as SyncMutex;
use tokio::select;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use taskwire_runtime::{AppContext, AppSpindown, AppSpindownToken};
use taskwire_tasks::{RequestCallback, Transport, TransportError};

use crate::config::AmqpTopologyConfig;
use crate::connector::{Connector, Gateway};

/// Drops its entry out of the in-flight correlation table on the way out,
/// whether it was fulfilled or not. Grounded on the same guard the
/// `ResponseTracker`/`RpcToken` pair in Restate's RPC layer uses to keep a
/// cancelled caller from leaking a `DashMap` entry forever.
struct CorrelationGuard {
    pending: Arc<DashMap<String, oneshot::Sender<Vec<u8>>>>,
    correlation_id: String,
}

impl Drop for CorrelationGuard {
    fn drop(&mut self) {
        self.pending.remove(&self.correlation_id);
    }
}

/// An AMQP-backed [`Transport`]: publishes requests to a topic exchange under
/// `<prefix>.<task name>`, awaits the reply on a private exclusive queue
/// keyed by correlation ID, and — when a callback is registered — consumes a
/// durable namespace queue bound to `<prefix>.#` to serve incoming requests.
///
/// Built on top of [`Connector`]/[`Gateway`] for connection management;
/// reconnection is handled there, this type only owns the RPC-shaped
/// request/reply bookkeeping on top of it.
pub struct AmqpTransport {
    config: AmqpTopologyConfig,
    gateway: Gateway,
    pending: Arc<DashMap<String, oneshot::Sender<Vec<u8>>>>,
    callback: SyncMutex<Option<RequestCallback>>,
    reply_queue: SyncMutex<Option<String>>,
    reply_consumer: SyncMutex<Option<JoinHandle<()>>>,
    request_consumer: SyncMutex<Option<JoinHandle<()>>>,
    spindown: SyncMutex<Option<AppSpindownToken>>,
}

impl AmqpTransport {
    /// Creates a transport for the given topology, starting the underlying
    /// [`Connector`] in the background. Call [`Transport::connect`] before
    /// sending or serving requests.
    pub fn new(config: AmqpTopologyConfig) -> Self {
        let gateway = Connector::start(config.handle().clone());

        Self {
            config,
            gateway,
            pending: Arc::new(DashMap::new()),
            callback: SyncMutex::new(None),
            reply_queue: SyncMutex::new(None),
            reply_consumer: SyncMutex::new(None),
            request_consumer: SyncMutex::new(None),
            spindown: SyncMutex::new(None),
        }
    }

    fn request_routing_key(&self, task_name: &str) -> String {
        format!("{}.{task_name}", self.config.prefix())
    }

    async fn declare_topology(&self, channel: &lapin::Channel) -> Result<(), lapin::Error> {
        channel
            .exchange_declare(
                self.config.request_exchange(),
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        if self.config.response_exchange() != self.config.request_exchange() {
            channel
                .exchange_declare(
                    self.config.response_exchange(),
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }

        Ok(())
    }

    async fn declare_reply_queue(&self, channel: &lapin::Channel) -> Result<String, lapin::Error> {
        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let name = queue.name().as_str().to_string();

        channel
            .queue_bind(
                &name,
                self.config.response_exchange(),
                &name,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(name)
    }

    fn spawn_reply_consumer(&self, channel: lapin::Channel, queue: String) -> JoinHandle<()> {
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            let mut consumer = match channel
                .basic_consume(
                    &queue,
                    "taskwire-reply",
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
            {
                Ok(consumer) => consumer,
                Err(error) => {
                    warn!(%error, "failed to start reply consumer");
                    return;
                }
            };

            loop {
                select! {
                    _ = AppContext::terminated() => break,
                    delivery = consumer.next() => {
                        let Some(delivery) = delivery else { break };
                        let Ok(delivery) = delivery else { continue };

                        if let Some(correlation_id) = delivery.properties.correlation_id().as_ref().map(|id| id.to_string()) {
                            if let Some((_, sender)) = pending.remove(&correlation_id) {
                                let _ = sender.send(delivery.data.clone());
                            }
                        }

                        let _ = delivery.ack(BasicAckOptions::default()).await;
                    }
                }
            }
        })
    }

    fn spawn_request_consumer(&self, channel: lapin::Channel, queue: String, callback: RequestCallback) -> JoinHandle<()> {
        let prefix = format!("{}.", self.config.prefix());
        let response_exchange = self.config.response_exchange().to_string();

        tokio::spawn(async move {
            let _ = channel.basic_qos(1, Default::default()).await;

            let mut consumer = match channel
                .basic_consume(
                    &queue,
                    "taskwire-request",
                    BasicConsumeOptions::default(),
                    FieldTable::default(),
                )
                .await
            {
                Ok(consumer) => consumer,
                Err(error) => {
                    warn!(%error, "failed to start request consumer");
                    return;
                }
            };

            loop {
                select! {
                    _ = AppContext::terminated() => break,
                    delivery = consumer.next() => {
                        let Some(delivery) = delivery else { break };
                        let Ok(delivery) = delivery else { continue };

                        let Some(task_name) = delivery.routing_key.as_str().strip_prefix(&prefix) else {
                            let _ = delivery.ack(BasicAckOptions::default()).await;
                            continue;
                        };

                        let reply_to = delivery.properties.reply_to().as_ref().map(|r| r.to_string());
                        let correlation_id = delivery.properties.correlation_id().as_ref().map(|c| c.to_string());

                        let response = callback(task_name.to_string(), delivery.data.clone()).await;
                        let _ = delivery.ack(BasicAckOptions::default()).await;

                        let (Some(reply_to), Some(correlation_id)) = (reply_to, correlation_id) else {
                            continue;
                        };

                        let payload = match response {
                            Ok(bytes) => bytes,
                            Err(error) => {
                                warn!(%error, task_name, "local dispatch failed, dropping request with no reply");
                                continue;
                            }
                        };

                        let properties = AMQPProperties::default().with_correlation_id(correlation_id.into());

                        let _ = channel
                            .basic_publish(
                                &response_exchange,
                                &reply_to,
                                BasicPublishOptions::default(),
                                &payload,
                                properties,
                            )
                            .await;
                    }
                }
            }
        })
    }
}

#[async_trait::async_trait]
impl Transport for AmqpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.spindown.lock().is_some() {
            return Ok(());
        }

        let channel = self.gateway.channel().await;
        self.declare_topology(&channel).await.map_err(|error| {
            warn!(%error, "failed to declare AMQP topology");
            TransportError::ConnectionLost
        })?;

        let reply_queue = self.declare_reply_queue(&channel).await.map_err(|error| {
            warn!(%error, "failed to declare reply queue");
            TransportError::ConnectionLost
        })?;

        let reply_consumer = self.spawn_reply_consumer(channel.clone(), reply_queue.clone());
        *self.reply_queue.lock() = Some(reply_queue);
        *self.reply_consumer.lock() = Some(reply_consumer);

        if let Some(callback) = self.callback.lock().clone() {
            self.start_serving(callback).await?;
        }

        *self.spindown.lock() = Some(AppSpindown::register(format!("taskwire-amqp-transport:{}", self.config.prefix())));

        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        if let Some(handle) = self.reply_consumer.lock().take() {
            handle.abort();
        }
        if let Some(handle) = self.request_consumer.lock().take() {
            handle.abort();
        }
        *self.reply_queue.lock() = None;
        self.spindown.lock().take();

        // Dropping every pending sender wakes each in-flight `send_request` with a
        // receiver error, which is mapped to `TransportError::Disconnected` below.
        self.pending.clear();

        Ok(())
    }

    async fn send_request(&self, task_name: &str, payload: Vec<u8>) -> Result<Vec<u8>, TransportError> {
        let reply_queue = self
            .reply_queue
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)?;

        let correlation_id = Uuid::new_v4().to_string();
        let (sender, receiver) = oneshot::channel();

        match self.pending.entry(correlation_id.clone()) {
            Entry::Occupied(_) => return Err(TransportError::CorrelationCollision(correlation_id)),
            Entry::Vacant(entry) => {
                entry.insert(sender);
            }
        }
        let _guard = CorrelationGuard {
            pending: Arc::clone(&self.pending),
            correlation_id: correlation_id.clone(),
        };

        let channel = self.gateway.channel().await;
        let properties = AMQPProperties::default()
            .with_correlation_id(correlation_id.clone().into())
            .with_reply_to(reply_queue.into());

        channel
            .basic_publish(
                self.config.request_exchange(),
                &self.request_routing_key(task_name),
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|error| {
                warn!(%error, task_name, "failed to publish request");
                TransportError::ConnectionLost
            })?;

        select! {
            response = receiver => response.map_err(|_| TransportError::Disconnected),
            _ = AppContext::terminated() => Err(TransportError::Disconnected),
        }
    }

    async fn register_callback(&self, callback: RequestCallback) {
        *self.callback.lock() = Some(Arc::clone(&callback));

        if self.spindown.lock().is_some() {
            if let Err(error) = self.start_serving(callback).await {
                warn!(%error, "failed to start serving requests after late callback registration");
            }
        }
    }

    async fn unregister_callback(&self) {
        *self.callback.lock() = None;
        if let Some(handle) = self.request_consumer.lock().take() {
            handle.abort();
        }
    }
}

impl AmqpTransport {
    async fn start_serving(&self, callback: RequestCallback) -> Result<(), TransportError> {
        if self.request_consumer.lock().is_some() {
            return Ok(());
        }

        let channel = self.gateway.channel().await;

        let queue = channel
            .queue_declare(
                self.config.queue(),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|error| {
                warn!(%error, "failed to declare request queue");
                TransportError::ConnectionLost
            })?;

        channel
            .queue_bind(
                queue.name().as_str(),
                self.config.request_exchange(),
                &format!("{}.#", self.config.prefix()),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|error| {
                warn!(%error, "failed to bind request queue");
                TransportError::ConnectionLost
            })?;

        info!(queue = self.config.queue(), "serving requests");

        let handle = self.spawn_request_consumer(channel, queue.name().as_str().to_string(), callback);
        *self.request_consumer.lock() = Some(handle);

        Ok(())
    }
}
