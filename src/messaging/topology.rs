//! Queue declaration shared by the dispatcher and the worker.

use tracing::{error, info};

use super::transport::BrokerChannel;
use crate::error::BrokerError;
use crate::types::QueueRegistry;

/// Declare every queue in the registry. Idempotent on the broker side.
///
/// A failure here means the topology precondition could not be
/// established; callers treat it as fatal.
pub async fn declare_topology<C: BrokerChannel>(
    channel: &C,
    registry: &QueueRegistry,
) -> Result<(), BrokerError> {
    for queue in registry.iter() {
        if let Err(e) = channel.declare_queue(queue).await {
            error!(queue = %queue.name, error = %e, "Failed to declare queue");
            return Err(e);
        }
    }
    info!(
        queues = ?registry.iter().map(|q| q.name.as_str()).collect::<Vec<_>>(),
        "Queues declared"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::fake::FakeTransport;
    use crate::messaging::transport::Transport;
    use tokio_test::assert_err;

    #[tokio::test]
    async fn test_declares_all_queues_in_order() {
        let transport = FakeTransport::new();
        let conn = transport.dial("amqp://fake").await.unwrap();
        let channel = transport.open_channel(&conn).await.unwrap();

        declare_topology(&channel, &QueueRegistry::default())
            .await
            .unwrap();

        let names: Vec<_> = transport.declared().into_iter().map(|q| q.name).collect();
        assert_eq!(names, vec!["taskQueue", "resultQueue", "cronQueue"]);
    }

    #[tokio::test]
    async fn test_declare_failure_is_returned() {
        let transport = FakeTransport::new();
        transport.fail_declares();
        let conn = transport.dial("amqp://fake").await.unwrap();
        let channel = transport.open_channel(&conn).await.unwrap();

        assert_err!(declare_topology(&channel, &QueueRegistry::default()).await);
    }
}
