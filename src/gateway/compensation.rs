//! Compensating rollback for failed handshakes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::jobs::ProvisionalStore;

/// Undo state persisted before a dispatch attempt.
///
/// Runs at most once per failed handshake and is never retried;
/// implementations log their own failures.
#[async_trait]
pub trait Compensation: Send + Sync {
    async fn compensate(&self);
}

/// For handshakes that persisted nothing up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompensation;

#[async_trait]
impl Compensation for NoCompensation {
    async fn compensate(&self) {}
}

/// Deletes a provisional record and its dependent rows.
///
/// The two deletes are independent: a failure of the first does not stop
/// the second.
pub struct ProvisionalRollback {
    store: Arc<dyn ProvisionalStore>,
    record_id: u64,
}

impl ProvisionalRollback {
    pub fn new(store: Arc<dyn ProvisionalStore>, record_id: u64) -> Self {
        Self { store, record_id }
    }
}

#[async_trait]
impl Compensation for ProvisionalRollback {
    async fn compensate(&self) {
        let id = self.record_id;
        info!(record_id = id, "Rolling back provisional record");

        if let Err(e) = self.store.delete_provisional_record(id).await {
            error!(record_id = id, error = %e, "Failed to delete provisional record");
        }
        if let Err(e) = self.store.delete_dependent_rows(id).await {
            error!(record_id = id, error = %e, "Failed to delete dependent rows");
        }
    }
}
