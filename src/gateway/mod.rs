//! Request/reply gateway used by HTTP handlers.
//!
//! A handler persists provisional state, then calls the gateway, which
//! hands the work to a dispatcher and waits for its acknowledgement. Each
//! step has its own timeout; any failure runs the handler's compensation
//! and surfaces as a retryable [`GatewayError`](crate::GatewayError).

mod compensation;
mod handshake;

pub use compensation::{Compensation, NoCompensation, ProvisionalRollback};
pub use handshake::{AckTimeoutPolicy, Gateway, GatewayConfig, ScheduleGateway, TaskGateway};
