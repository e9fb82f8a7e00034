//! Bounded-wait enqueue/ack handshake used by request handlers.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use super::compensation::Compensation;
use crate::error::GatewayError;
use crate::messaging::Handoff;
use crate::types::{DispatchRequest, GatewaySettings, ReplyHandle, ScheduledTaskRequest};

/// Whether an ack timeout rolls back provisional state.
///
/// An ack timeout is a local observation: the dispatcher may still publish
/// the task afterwards. `Rollback` can therefore delete a record whose task
/// is in flight; `Keep` leaves the record and may leave it pending forever
/// if the publish did fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckTimeoutPolicy {
    #[default]
    Rollback,
    Keep,
}

/// Handshake timeouts.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub enqueue_timeout: Duration,
    pub ack_timeout: Duration,
    pub ack_timeout_policy: AckTimeoutPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&GatewaySettings::default())
    }
}

impl From<&GatewaySettings> for GatewayConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            enqueue_timeout: Duration::from_millis(settings.enqueue_timeout_ms),
            ack_timeout: Duration::from_millis(settings.ack_timeout_ms),
            ack_timeout_policy: if settings.rollback_on_ack_timeout {
                AckTimeoutPolicy::Rollback
            } else {
                AckTimeoutPolicy::Keep
            },
        }
    }
}

/// Hands requests of type `R` to a dispatcher and waits for the outcome.
pub struct Gateway<R> {
    handoff: Handoff<R>,
    config: GatewayConfig,
}

/// Gateway for analysis tasks.
pub type TaskGateway = Gateway<DispatchRequest>;

/// Gateway for schedule updates.
pub type ScheduleGateway = Gateway<ScheduledTaskRequest>;

impl<R: Send> Gateway<R> {
    pub fn new(handoff: Handoff<R>, config: GatewayConfig) -> Self {
        Self { handoff, config }
    }

    /// Enqueue a request and wait for its dispatch acknowledgement, each
    /// step bounded by its own timeout.
    ///
    /// `build` receives the request's private reply handle. On any failure
    /// `compensation` runs once before the error is returned.
    pub async fn handshake<C>(
        &self,
        build: impl FnOnce(ReplyHandle) -> R,
        compensation: &C,
    ) -> Result<(), GatewayError>
    where
        C: Compensation + ?Sized,
    {
        let (reply, ack) = ReplyHandle::pair();

        match timeout(self.config.enqueue_timeout, self.handoff.offer(build(reply))).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                warn!("Dispatcher intake is closed");
                compensation.compensate().await;
                return Err(GatewayError::IntakeClosed);
            }
            Err(_) => {
                warn!(timeout = ?self.config.enqueue_timeout, "Push task to dispatcher timed out");
                compensation.compensate().await;
                return Err(GatewayError::EnqueueTimeout);
            }
        }

        let err = match timeout(self.config.ack_timeout, ack).await {
            Ok(Ok(true)) => {
                debug!("Dispatch acknowledged");
                return Ok(());
            }
            Ok(Ok(false)) => GatewayError::DispatchFailed,
            Ok(Err(_)) => GatewayError::ReplyDropped,
            Err(_) => GatewayError::AckTimeout,
        };

        warn!(error = %err, "Dispatch handshake failed");
        if err != GatewayError::AckTimeout
            || self.config.ack_timeout_policy == AckTimeoutPolicy::Rollback
        {
            compensation.compensate().await;
        }
        Err(err)
    }
}

impl TaskGateway {
    /// Dispatch an analysis task through the task dispatcher.
    pub async fn submit_task<C>(
        &self,
        payload: Vec<u8>,
        correlation_id: &str,
        queue: &str,
        priority: u8,
        compensation: &C,
    ) -> Result<(), GatewayError>
    where
        C: Compensation + ?Sized,
    {
        self.handshake(
            |reply| DispatchRequest::new(payload, correlation_id, queue, priority, reply),
            compensation,
        )
        .await
    }
}

impl ScheduleGateway {
    /// Dispatch a schedule update through the schedule dispatcher.
    pub async fn submit_schedule<C>(
        &self,
        task: Vec<u8>,
        correlation_id: &str,
        queue: &str,
        compensation: &C,
    ) -> Result<(), GatewayError>
    where
        C: Compensation + ?Sized,
    {
        self.handshake(
            |reply| ScheduledTaskRequest {
                correlation_id: correlation_id.to_string(),
                queue: queue.to_string(),
                task,
                reply,
            },
            compensation,
        )
        .await
    }
}
