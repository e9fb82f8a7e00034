//! Task Dispatch Library
//!
//! Bridges synchronous HTTP handlers and an AMQP broker: a single-flight
//! broker connection, a single-owner outbound dispatcher, an inbound worker
//! with manual acks, and a bounded-wait request/reply gateway with
//! compensating rollback.

pub mod api;
pub mod error;
pub mod gateway;
pub mod jobs;
pub mod messaging;
pub mod types;

pub use error::{BrokerError, GatewayError, StoreError};
pub use gateway::{Gateway, ScheduleGateway, TaskGateway};
pub use messaging::{BrokerConnection, InboundWorker, OutboundDispatcher};
pub use types::{DispatchRequest, QueueRegistry, ScheduledTaskRequest, ServiceConfig};

/// Fixed delay between broker dial attempts (seconds)
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Gateway enqueue timeout (milliseconds)
pub const DEFAULT_ENQUEUE_TIMEOUT_MS: u64 = 2000;

/// Gateway acknowledgement timeout (milliseconds)
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 2000;

/// Consumer prefetch count
pub const DEFAULT_PREFETCH: u16 = 1;

/// Default HTTP listen port
pub const DEFAULT_HTTP_PORT: u16 = 3017;
