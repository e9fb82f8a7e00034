//! Records analysis results consumed from the result queue.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::store::ProvisionalStore;
use crate::messaging::{HandlerReply, TaskHandler};

/// Minimal view of an analysis result; the rest of the body is opaque here.
#[derive(Debug, Deserialize)]
struct AnalysisResult {
    id: String,
}

/// Marks records analyzed as results arrive. Never replies.
///
/// Malformed or unknown results are logged and acknowledged so they don't
/// block the queue.
pub struct ResultRecorder {
    store: Arc<dyn ProvisionalStore>,
}

impl ResultRecorder {
    pub fn new(store: Arc<dyn ProvisionalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TaskHandler for ResultRecorder {
    async fn handle(&self, payload: &[u8]) -> HandlerReply {
        let result: AnalysisResult = match serde_json::from_slice(payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Discarding malformed analysis result");
                return HandlerReply::none();
            }
        };

        let Ok(id) = result.id.parse::<u64>() else {
            warn!(id = %result.id, "Analysis result has non-numeric id");
            return HandlerReply::none();
        };

        match self.store.mark_analyzed(id).await {
            Ok(()) => info!(record_id = id, "Analysis result recorded"),
            Err(e) => warn!(record_id = id, error = %e, "Failed to record analysis result"),
        }
        HandlerReply::none()
    }
}
