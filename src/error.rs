//! Error types for the dispatch subsystem.

use thiserror::Error;

/// Errors raised while talking to the message broker.
///
/// Dial failures never reach callers of [`BrokerConnection::connect`](crate::messaging::BrokerConnection::connect),
/// which retries them forever. Everything else is surfaced to the component
/// that owns the channel in question.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("failed to connect to broker: {0}")]
    Connect(String),

    #[error("no live broker connection")]
    NotConnected,

    #[error("failed to open channel: {0}")]
    Channel(String),

    #[error("failed to declare queue {queue}: {reason}")]
    Declare { queue: String, reason: String },

    #[error("failed to set QoS: {0}")]
    Qos(String),

    #[error("failed to register consumer on {queue}: {reason}")]
    Consume { queue: String, reason: String },

    #[error("failed to publish to {queue}: {reason}")]
    Publish { queue: String, reason: String },

    #[error("failed to acknowledge delivery: {0}")]
    Ack(String),

    #[error("failed to publish reply to {queue}; consumer stopped")]
    ReplyPublish {
        queue: String,
        #[source]
        source: Box<BrokerError>,
    },

    #[error("consumer stream error: {0}")]
    Delivery(String),

    #[error("consumer on {queue} was closed by the broker")]
    ConsumerClosed { queue: String },
}

/// Errors returned by the request/reply gateway.
///
/// Every variant means the work was not confirmed dispatched and the
/// compensating rollback has already run (subject to [`AckTimeoutPolicy`](crate::gateway::AckTimeoutPolicy)).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayError {
    #[error("push task to dispatcher timed out")]
    EnqueueTimeout,

    #[error("dispatcher intake is closed")]
    IntakeClosed,

    #[error("dispatcher failed to publish task")]
    DispatchFailed,

    #[error("timed out waiting for dispatch acknowledgement")]
    AckTimeout,

    #[error("dispatcher dropped the reply handle")]
    ReplyDropped,
}

/// Errors from the provisional record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(u64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
