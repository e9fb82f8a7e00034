//! Inbound worker: consumes one queue with manual acks and prefetch 1.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error, info, instrument, warn};

use super::connection::BrokerConnection;
use super::topology::declare_topology;
use super::transport::{BrokerChannel, Delivery, Envelope, Transport};
use crate::error::BrokerError;
use crate::types::QueueRegistry;
use crate::DEFAULT_PREFETCH;

/// Result of handling one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerReply {
    pub response: Vec<u8>,
    /// Queue to publish `response` to; `None` means no reply
    pub reply_queue: Option<String>,
}

impl HandlerReply {
    /// Acknowledge without replying.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn to(queue: impl Into<String>, response: Vec<u8>) -> Self {
        let queue = queue.into();
        Self {
            response,
            reply_queue: (!queue.is_empty()).then_some(queue),
        }
    }
}

/// Business callback invoked for every consumed message.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> HandlerReply;
}

#[async_trait]
impl<F> TaskHandler for F
where
    F: Fn(&[u8]) -> HandlerReply + Send + Sync,
{
    async fn handle(&self, payload: &[u8]) -> HandlerReply {
        self(payload)
    }
}

/// What to do when publishing a reply fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplyFailurePolicy {
    /// Stop consuming and return an error; the message stays unacked and
    /// is redelivered once the worker is restarted.
    #[default]
    FailStop,
    /// Reject the message back onto its queue and keep consuming.
    Requeue,
}

/// Consumes a queue one message at a time.
pub struct InboundWorker<T: Transport> {
    connection: Arc<BrokerConnection<T>>,
    registry: QueueRegistry,
    queue: String,
    consumer_tag: String,
    prefetch: u16,
    policy: ReplyFailurePolicy,
}

impl<T: Transport> InboundWorker<T> {
    pub fn new(
        connection: Arc<BrokerConnection<T>>,
        registry: QueueRegistry,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            registry,
            queue: queue.into(),
            consumer_tag: String::new(),
            prefetch: DEFAULT_PREFETCH,
            policy: ReplyFailurePolicy::default(),
        }
    }

    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    pub fn with_reply_policy(mut self, policy: ReplyFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Consume until the broker closes the stream or a reply publish fails
    /// under [`ReplyFailurePolicy::FailStop`].
    ///
    /// Never returns `Ok`: a closed consumer stream is reported as
    /// [`BrokerError::ConsumerClosed`] so the supervisor restarts the
    /// process. Setup failures (channel, declare, QoS, consume) are returned
    /// before any message is processed.
    #[instrument(skip_all, name = "inbound_worker", fields(queue = %self.queue))]
    pub async fn run<H: TaskHandler>(self, handler: H) -> Result<(), BrokerError> {
        self.connection.connect().await;

        let channel = self.connection.open_channel().await?;
        declare_topology(&channel, &self.registry).await?;
        channel.qos(self.prefetch).await?;

        let mut deliveries = channel.consume(&self.queue, &self.consumer_tag).await?;
        info!(queue = %self.queue, prefetch = self.prefetch, "Started consuming");

        let result = loop {
            let delivery = match deliveries.next().await {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(error = %e, "Consumer error");
                    continue;
                }
                None => {
                    error!(queue = %self.queue, "Consumer stream closed by broker");
                    break Err(BrokerError::ConsumerClosed {
                        queue: self.queue.clone(),
                    });
                }
            };

            if let Err(e) = self.process(&channel, &handler, delivery).await {
                break Err(e);
            }
        };

        channel.close().await;
        self.connection.close().await;
        result
    }

    async fn process<H: TaskHandler>(
        &self,
        channel: &T::Channel,
        handler: &H,
        delivery: Delivery,
    ) -> Result<(), BrokerError> {
        let reply = handler.handle(&delivery.data).await;

        if let Some(reply_queue) = reply.reply_queue {
            let envelope = Envelope::reply(reply.response, delivery.correlation_id.clone());
            if let Err(e) = channel.publish(&reply_queue, &envelope).await {
                error!(
                    reply_queue = %reply_queue,
                    correlation_id = ?delivery.correlation_id,
                    error = %e,
                    "Failed to publish reply"
                );
                return match self.policy {
                    ReplyFailurePolicy::FailStop => Err(BrokerError::ReplyPublish {
                        queue: reply_queue,
                        source: Box::new(e),
                    }),
                    ReplyFailurePolicy::Requeue => {
                        warn!(correlation_id = ?delivery.correlation_id, "Requeueing message");
                        delivery.requeue().await
                    }
                };
            }
            debug!(reply_queue = %reply_queue, "Reply published");
        }

        delivery.ack().await
    }
}
