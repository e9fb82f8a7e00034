//! Scriptable in-process transport for tests.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::transport::{
    Acknowledger, BrokerChannel, Delivery, DeliveryStream, Envelope, Transport,
};
use crate::error::BrokerError;
use crate::types::QueueDescriptor;

type DeliveryResult = Result<Delivery, BrokerError>;

struct FakeState {
    dial_attempts: AtomicUsize,
    dial_failures: AtomicUsize,
    dial_delay_ms: AtomicU64,
    open_failures: AtomicUsize,
    publish_failures: AtomicUsize,
    publish_attempts: AtomicUsize,
    fail_declares: AtomicBool,
    closed_connections: AtomicUsize,
    declared: Mutex<Vec<QueueDescriptor>>,
    published: Mutex<Vec<(String, Envelope)>>,
    prefetch: Mutex<Option<u16>>,
    acked: Mutex<Vec<Option<String>>>,
    requeued: Mutex<Vec<Option<String>>>,
    delivery_tx: Mutex<Option<mpsc::UnboundedSender<DeliveryResult>>>,
    delivery_rx: Mutex<Option<mpsc::UnboundedReceiver<DeliveryResult>>>,
}

/// Fake broker. Clones share state.
#[derive(Clone)]
pub(crate) struct FakeTransport {
    state: Arc<FakeState>,
}

/// Decrement `counter` if positive; returns whether it was.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl FakeTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(FakeState {
                dial_attempts: AtomicUsize::new(0),
                dial_failures: AtomicUsize::new(0),
                dial_delay_ms: AtomicU64::new(0),
                open_failures: AtomicUsize::new(0),
                publish_failures: AtomicUsize::new(0),
                publish_attempts: AtomicUsize::new(0),
                fail_declares: AtomicBool::new(false),
                closed_connections: AtomicUsize::new(0),
                declared: Mutex::new(Vec::new()),
                published: Mutex::new(Vec::new()),
                prefetch: Mutex::new(None),
                acked: Mutex::new(Vec::new()),
                requeued: Mutex::new(Vec::new()),
                delivery_tx: Mutex::new(Some(tx)),
                delivery_rx: Mutex::new(Some(rx)),
            }),
        }
    }

    pub fn fail_next_dials(&self, n: usize) {
        self.state.dial_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_dial_delay(&self, delay: Duration) {
        self.state
            .dial_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_next_opens(&self, n: usize) {
        self.state.open_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_publishes(&self, n: usize) {
        self.state.publish_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_declares(&self) {
        self.state.fail_declares.store(true, Ordering::SeqCst);
    }

    pub fn dial_attempts(&self) -> usize {
        self.state.dial_attempts.load(Ordering::SeqCst)
    }

    pub fn publish_attempts(&self) -> usize {
        self.state.publish_attempts.load(Ordering::SeqCst)
    }

    pub fn closed_connections(&self) -> usize {
        self.state.closed_connections.load(Ordering::SeqCst)
    }

    pub fn declared(&self) -> Vec<QueueDescriptor> {
        self.state.declared.lock().unwrap().clone()
    }

    pub fn published(&self) -> Vec<(String, Envelope)> {
        self.state.published.lock().unwrap().clone()
    }

    pub fn prefetch(&self) -> Option<u16> {
        *self.state.prefetch.lock().unwrap()
    }

    pub fn acked(&self) -> Vec<Option<String>> {
        self.state.acked.lock().unwrap().clone()
    }

    pub fn requeued(&self) -> Vec<Option<String>> {
        self.state.requeued.lock().unwrap().clone()
    }

    /// Queue a message for the consumer.
    pub fn deliver(&self, data: &[u8], correlation_id: Option<&str>) {
        let correlation_id = correlation_id.map(str::to_string);
        let acker = FakeAcker {
            state: Arc::clone(&self.state),
            correlation_id: correlation_id.clone(),
        };
        self.push(Ok(Delivery::new(data.to_vec(), correlation_id, Box::new(acker))));
    }

    /// Queue a consumer-stream error.
    pub fn deliver_error(&self, reason: &str) {
        self.push(Err(BrokerError::Delivery(reason.to_string())));
    }

    /// End the consumer stream once queued messages are drained.
    pub fn finish_deliveries(&self) {
        self.state.delivery_tx.lock().unwrap().take();
    }

    fn push(&self, item: DeliveryResult) {
        if let Some(tx) = self.state.delivery_tx.lock().unwrap().as_ref() {
            let _ = tx.send(item);
        }
    }
}

#[derive(Debug)]
pub(crate) struct FakeConnection;

#[async_trait]
impl Transport for FakeTransport {
    type Connection = FakeConnection;
    type Channel = FakeChannel;

    async fn dial(&self, _uri: &str) -> Result<FakeConnection, BrokerError> {
        self.state.dial_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.dial_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if take_one(&self.state.dial_failures) {
            return Err(BrokerError::Connect("connection refused".to_string()));
        }
        Ok(FakeConnection)
    }

    async fn open_channel(&self, _conn: &FakeConnection) -> Result<FakeChannel, BrokerError> {
        if take_one(&self.state.open_failures) {
            return Err(BrokerError::Channel("connection closed".to_string()));
        }
        Ok(FakeChannel {
            state: Arc::clone(&self.state),
        })
    }

    async fn close(&self, _conn: &FakeConnection) {
        self.state.closed_connections.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct FakeChannel {
    state: Arc<FakeState>,
}

impl std::fmt::Debug for FakeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FakeChannel")
    }
}

#[async_trait]
impl BrokerChannel for FakeChannel {
    async fn declare_queue(&self, queue: &QueueDescriptor) -> Result<(), BrokerError> {
        if self.state.fail_declares.load(Ordering::SeqCst) {
            return Err(BrokerError::Declare {
                queue: queue.name.clone(),
                reason: "access refused".to_string(),
            });
        }
        self.state.declared.lock().unwrap().push(queue.clone());
        Ok(())
    }

    async fn publish(&self, routing_key: &str, envelope: &Envelope) -> Result<(), BrokerError> {
        self.state.publish_attempts.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.state.publish_failures) {
            return Err(BrokerError::Publish {
                queue: routing_key.to_string(),
                reason: "channel closed".to_string(),
            });
        }
        self.state
            .published
            .lock()
            .unwrap()
            .push((routing_key.to_string(), envelope.clone()));
        Ok(())
    }

    async fn qos(&self, prefetch: u16) -> Result<(), BrokerError> {
        *self.state.prefetch.lock().unwrap() = Some(prefetch);
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        _consumer_tag: &str,
    ) -> Result<DeliveryStream, BrokerError> {
        let rx = self
            .state
            .delivery_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| BrokerError::Consume {
                queue: queue.to_string(),
                reason: "already consuming".to_string(),
            })?;

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }

    async fn close(&self) {}
}

struct FakeAcker {
    state: Arc<FakeState>,
    correlation_id: Option<String>,
}

#[async_trait]
impl Acknowledger for FakeAcker {
    async fn ack(&self) -> Result<(), BrokerError> {
        self.state
            .acked
            .lock()
            .unwrap()
            .push(self.correlation_id.clone());
        Ok(())
    }

    async fn requeue(&self) -> Result<(), BrokerError> {
        self.state
            .requeued
            .lock()
            .unwrap()
            .push(self.correlation_id.clone());
        Ok(())
    }
}
