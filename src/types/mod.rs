//! Core types for the dispatch service.

mod config;
mod queue;
mod request;

pub use config::{
    BrokerSettings, GatewaySettings, HttpSettings, QueueNames, ServiceConfig, WorkerSettings,
};
pub use queue::{QueueDescriptor, QueueRegistry, MAX_PRIORITY};
pub use request::{
    CronData, DispatchRequest, ReplyHandle, ReplyReceiver, ScheduledTaskRequest, TaskBlock,
};
