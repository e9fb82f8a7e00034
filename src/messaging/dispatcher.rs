//! Outbound dispatcher: the single owner of the publishing channel.
//!
//! Broker channels are not safe for concurrent use, so every publish in the
//! process goes through one long-lived dispatcher task. Request handlers hand
//! work over through a [`TaskSource`] and learn the outcome from the
//! request's reply handle.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use super::connection::BrokerConnection;
use super::handoff::Intake;
use super::topology::declare_topology;
use super::transport::{BrokerChannel, Envelope, Transport};
use crate::error::BrokerError;
use crate::types::{DispatchRequest, QueueRegistry, ScheduledTaskRequest};

/// Where the dispatcher pulls its work from. `None` ends the loop.
#[async_trait]
pub trait TaskSource: Send {
    async fn next_request(&mut self) -> Option<DispatchRequest>;
}

#[async_trait]
impl TaskSource for Intake<DispatchRequest> {
    async fn next_request(&mut self) -> Option<DispatchRequest> {
        self.take().await
    }
}

#[async_trait]
impl TaskSource for Intake<ScheduledTaskRequest> {
    async fn next_request(&mut self) -> Option<DispatchRequest> {
        self.take().await.map(Into::into)
    }
}

/// Adapts an async closure into a [`TaskSource`].
pub struct FnSource<F>(pub F);

#[async_trait]
impl<F, Fut> TaskSource for FnSource<F>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Option<DispatchRequest>> + Send,
{
    async fn next_request(&mut self) -> Option<DispatchRequest> {
        (self.0)().await
    }
}

/// What to do when a publish fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishRetryPolicy {
    /// Report the failure immediately
    NoRetry,
    /// Reconnect if needed, open a fresh channel and retry the same
    /// publish exactly once. A failed rebuild or retry is reported.
    #[default]
    RetryOnceAfterRebuild,
}

/// Publishes dispatch requests onto the broker, one at a time.
pub struct OutboundDispatcher<T: Transport> {
    connection: Arc<BrokerConnection<T>>,
    registry: QueueRegistry,
    policy: PublishRetryPolicy,
}

impl<T: Transport> OutboundDispatcher<T> {
    pub fn new(connection: Arc<BrokerConnection<T>>, registry: QueueRegistry) -> Self {
        Self {
            connection,
            registry,
            policy: PublishRetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: PublishRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Connect, declare the topology, then dispatch until the source is
    /// exhausted.
    ///
    /// Errors are only returned for setup failures (opening the first
    /// channel or declaring queues); the caller should treat them as fatal.
    /// Every request pulled from `source` has its reply handle signalled
    /// exactly once.
    #[instrument(skip_all, name = "outbound_dispatcher")]
    pub async fn run<S: TaskSource>(self, mut source: S) -> Result<(), BrokerError> {
        self.connection.connect().await;

        let mut channel = self.connection.open_channel().await.map_err(|e| {
            error!(error = %e, "Failed to open dispatcher channel");
            e
        })?;
        declare_topology(&channel, &self.registry).await?;

        info!(policy = ?self.policy, "Outbound dispatcher ready");

        while let Some(request) = source.next_request().await {
            let DispatchRequest {
                payload,
                correlation_id,
                queue,
                priority,
                reply,
            } = request;

            let envelope = Envelope::task(payload, &correlation_id, priority);
            let dispatched = self.publish(&mut channel, &queue, &envelope).await;

            if !reply.signal(dispatched) {
                debug!(
                    correlation_id = %correlation_id,
                    dispatched,
                    "Requester stopped waiting, discarding ack"
                );
            }
        }

        info!("Task source closed, stopping dispatcher");
        channel.close().await;
        self.connection.close().await;
        Ok(())
    }

    async fn publish(&self, channel: &mut T::Channel, queue: &str, envelope: &Envelope) -> bool {
        let err = match channel.publish(queue, envelope).await {
            Ok(()) => {
                debug!(queue = %queue, correlation_id = ?envelope.correlation_id, "Task published");
                return true;
            }
            Err(e) => e,
        };

        warn!(queue = %queue, error = %err, "Publish failed");
        if self.policy == PublishRetryPolicy::NoRetry {
            return false;
        }

        let fresh = match self.rebuild_channel().await {
            Ok(fresh) => fresh,
            Err(e) => {
                error!(queue = %queue, error = %e, "Failed to rebuild channel, dropping task");
                return false;
            }
        };
        let stale = std::mem::replace(channel, fresh);
        stale.close().await;

        match channel.publish(queue, envelope).await {
            Ok(()) => {
                info!(queue = %queue, "Task published after channel rebuild");
                true
            }
            Err(e) => {
                error!(queue = %queue, error = %e, "Retry after channel rebuild failed");
                false
            }
        }
    }

    async fn rebuild_channel(&self) -> Result<T::Channel, BrokerError> {
        let outcome = self.connection.reconnect().await;
        debug!(?outcome, "Rebuilding dispatcher channel");
        self.connection.open_channel().await
    }
}
