//! Rendezvous handoff between request handlers and a long-lived worker.
//!
//! Unlike a buffered channel, [`Handoff::offer`] completes only once the
//! consumer has actually taken the item, so "enqueued" means "the worker
//! has it". Producers racing to offer are served in lock order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex};

/// Create a connected producer/consumer pair.
pub fn handoff<T: Send>() -> (Handoff<T>, Intake<T>) {
    let (demand_tx, demand_rx) = mpsc::channel(1);
    (
        Handoff {
            demand: Arc::new(Mutex::new(demand_rx)),
        },
        Intake { demand: demand_tx },
    )
}

/// Producer side. Cheap to clone; one per request handler is fine.
pub struct Handoff<T> {
    demand: Arc<Mutex<mpsc::Receiver<oneshot::Sender<T>>>>,
}

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Self {
            demand: Arc::clone(&self.demand),
        }
    }
}

impl<T: Send> Handoff<T> {
    /// Wait for the consumer to take `item`.
    ///
    /// Returns the item back if the consumer has gone away. Cancelling the
    /// returned future before it resolves never loses the item: it is
    /// either still owned by the future or already delivered.
    pub async fn offer(&self, item: T) -> Result<(), T> {
        let mut demand = self.demand.lock().await;
        let mut item = item;
        loop {
            let Some(slot) = demand.recv().await else {
                return Err(item);
            };
            // A slot whose receiver is gone belongs to a cancelled take().
            match slot.send(item) {
                Ok(()) => return Ok(()),
                Err(returned) => item = returned,
            }
        }
    }
}

/// Consumer side, owned by the worker.
pub struct Intake<T> {
    demand: mpsc::Sender<oneshot::Sender<T>>,
}

impl<T: Send> Intake<T> {
    /// Take the next offered item. Returns `None` once every
    /// [`Handoff`] has been dropped.
    pub async fn take(&mut self) -> Option<T> {
        let (slot, rx) = oneshot::channel();
        self.demand.send(slot).await.ok()?;
        rx.await.ok()
    }
}
