//! # Messaging Module
//!
//! Broker plumbing for the dispatch service.
//!
//! ## Components
//! - Broker connection with fixed-delay dial and single-flight reconnect
//! - Outbound dispatcher owning the publishing channel
//! - Inbound worker consuming with prefetch 1 and manual acks
//! - Rendezvous handoff between HTTP handlers and the dispatcher

pub mod amqp;
pub mod connection;
pub mod dispatcher;
pub mod handoff;
pub mod topology;
pub mod transport;
pub mod worker;

#[cfg(test)]
pub(crate) mod fake;

pub use amqp::AmqpTransport;
pub use connection::{BrokerConnection, ReconnectOutcome};
pub use dispatcher::{FnSource, OutboundDispatcher, PublishRetryPolicy, TaskSource};
pub use handoff::{handoff, Handoff, Intake};
pub use topology::declare_topology;
pub use transport::{BrokerChannel, Delivery, DeliveryStream, Envelope, Transport};
pub use worker::{HandlerReply, InboundWorker, ReplyFailurePolicy, TaskHandler};
