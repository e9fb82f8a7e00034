//! Queue registry.

use serde::{Deserialize, Serialize};

/// Highest priority level accepted by priority queues (`x-max-priority`).
pub const MAX_PRIORITY: u8 = 10;

/// A queue the service declares at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDescriptor {
    pub name: String,
    pub has_priority: bool,
}

impl QueueDescriptor {
    pub fn new(name: impl Into<String>, has_priority: bool) -> Self {
        Self {
            name: name.into(),
            has_priority,
        }
    }
}

/// The fixed set of three queues used by the service.
///
/// Both the dispatcher and the worker declare every queue in the registry,
/// so either can boot against an empty broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRegistry {
    /// High-volume analysis tasks, priority 0..=10
    pub task: QueueDescriptor,
    /// Analysis results coming back from external workers
    pub result: QueueDescriptor,
    /// Recurring report schedules
    pub schedule: QueueDescriptor,
}

impl QueueRegistry {
    pub fn new(task: &str, result: &str, schedule: &str) -> Self {
        Self {
            task: QueueDescriptor::new(task, true),
            result: QueueDescriptor::new(result, false),
            schedule: QueueDescriptor::new(schedule, false),
        }
    }

    /// Iterate over all queues in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueDescriptor> {
        [&self.task, &self.result, &self.schedule].into_iter()
    }
}

impl Default for QueueRegistry {
    fn default() -> Self {
        Self::new("taskQueue", "resultQueue", "cronQueue")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_task_queue_has_priority() {
        let registry = QueueRegistry::default();
        let flagged: Vec<_> = registry
            .iter()
            .filter(|q| q.has_priority)
            .map(|q| q.name.as_str())
            .collect();

        assert_eq!(flagged, vec!["taskQueue"]);
        assert_eq!(registry.iter().count(), 3);
    }
}
