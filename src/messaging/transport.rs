//! Transport seam between the dispatch components and the broker client.
//!
//! [`BrokerConnection`](super::BrokerConnection), the dispatcher and the
//! worker only talk to the broker through these traits. The production
//! implementation is [`AmqpTransport`](super::AmqpTransport).

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BrokerError;
use crate::types::QueueDescriptor;

/// Stream of deliveries from a consumer.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

/// Dials connections and opens channels on them.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: Send + Sync + 'static;
    type Channel: BrokerChannel;

    async fn dial(&self, uri: &str) -> Result<Self::Connection, BrokerError>;

    async fn open_channel(&self, conn: &Self::Connection) -> Result<Self::Channel, BrokerError>;

    async fn close(&self, conn: &Self::Connection);
}

/// A broker channel. Not safe for concurrent use; each long-lived
/// worker owns exactly one.
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    /// Declare a durable, non-exclusive, non-auto-delete queue.
    async fn declare_queue(&self, queue: &QueueDescriptor) -> Result<(), BrokerError>;

    /// Publish to the default exchange with `routing_key` as the queue name.
    async fn publish(&self, routing_key: &str, envelope: &Envelope) -> Result<(), BrokerError>;

    async fn qos(&self, prefetch: u16) -> Result<(), BrokerError>;

    /// Start a manual-ack consumer on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str)
        -> Result<DeliveryStream, BrokerError>;

    async fn close(&self);
}

/// Acknowledges or rejects one delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Reject and put the message back on its queue.
    async fn requeue(&self) -> Result<(), BrokerError>;
}

/// Outbound message. Always published as `text/plain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub body: Vec<u8>,
    pub correlation_id: Option<String>,
    pub priority: Option<u8>,
    pub persistent: bool,
}

impl Envelope {
    pub const CONTENT_TYPE: &'static str = "text/plain";

    /// A persistent task message carrying priority and correlation id.
    pub fn task(body: Vec<u8>, correlation_id: &str, priority: u8) -> Self {
        Self {
            body,
            correlation_id: Some(correlation_id.to_string()),
            priority: Some(priority),
            persistent: true,
        }
    }

    /// A transient reply correlated to the message that produced it.
    pub fn reply(body: Vec<u8>, correlation_id: Option<String>) -> Self {
        Self {
            body,
            correlation_id,
            priority: None,
            persistent: false,
        }
    }
}

/// Inbound message awaiting acknowledgement.
pub struct Delivery {
    pub data: Vec<u8>,
    pub correlation_id: Option<String>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        data: Vec<u8>,
        correlation_id: Option<String>,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            data,
            correlation_id,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    pub async fn requeue(&self) -> Result<(), BrokerError> {
        self.acker.requeue().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("len", &self.data.len())
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}
