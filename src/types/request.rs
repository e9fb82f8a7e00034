//! Requests handed from the gateway to the outbound dispatcher.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::queue::MAX_PRIORITY;

/// Sending half of a dispatch acknowledgement.
///
/// Signalling consumes the handle, so a request can be acknowledged at most
/// once. If the waiting side has already given up the signal is discarded.
#[derive(Debug)]
pub struct ReplyHandle {
    tx: oneshot::Sender<bool>,
}

/// Receiving half of a dispatch acknowledgement.
pub type ReplyReceiver = oneshot::Receiver<bool>;

impl ReplyHandle {
    /// Create a connected handle/receiver pair.
    pub fn pair() -> (Self, ReplyReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Report the dispatch outcome. Returns `false` if nobody was listening.
    pub fn signal(self, dispatched: bool) -> bool {
        self.tx.send(dispatched).is_ok()
    }
}

/// A unit of work for the outbound dispatcher.
#[derive(Debug)]
pub struct DispatchRequest {
    pub payload: Vec<u8>,
    pub correlation_id: String,
    pub queue: String,
    pub priority: u8,
    pub reply: ReplyHandle,
}

impl DispatchRequest {
    /// Build a request; priority is clamped to the broker's maximum.
    pub fn new(
        payload: Vec<u8>,
        correlation_id: impl Into<String>,
        queue: impl Into<String>,
        priority: u8,
        reply: ReplyHandle,
    ) -> Self {
        Self {
            payload,
            correlation_id: correlation_id.into(),
            queue: queue.into(),
            priority: priority.min(MAX_PRIORITY),
            reply,
        }
    }
}

/// A recurring-job update for the scheduler queue.
///
/// Each request carries its own reply handle; schedule updates are rare
/// and independent of each other.
#[derive(Debug)]
pub struct ScheduledTaskRequest {
    pub correlation_id: String,
    pub queue: String,
    pub task: Vec<u8>,
    pub reply: ReplyHandle,
}

impl From<ScheduledTaskRequest> for DispatchRequest {
    fn from(req: ScheduledTaskRequest) -> Self {
        DispatchRequest::new(req.task, req.correlation_id, req.queue, 0, req.reply)
    }
}

/// Payload published on the task queue for the analysis worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBlock {
    pub path: String,
    pub file: String,
}

/// Payload published on the schedule queue for the report scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronData {
    pub cron: String,
    pub email: Vec<String>,
    pub appid: String,
    #[serde(rename = "Method")]
    pub method: String,
    #[serde(rename = "report_id")]
    pub id: String,
    pub period: String,
}
