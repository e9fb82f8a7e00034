//! Service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::queue::QueueRegistry;
use crate::{
    DEFAULT_ACK_TIMEOUT_MS, DEFAULT_ENQUEUE_TIMEOUT_MS, DEFAULT_HTTP_PORT, DEFAULT_PREFETCH,
    DEFAULT_RECONNECT_DELAY_SECS,
};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub broker: BrokerSettings,
    pub queues: QueueNames,
    pub gateway: GatewaySettings,
    pub worker: WorkerSettings,
    pub http: HttpSettings,
}

impl ServiceConfig {
    /// Load configuration from `DISPATCH_*` environment variables.
    ///
    /// Nested keys use `__`, e.g. `DISPATCH_BROKER__HOST=rabbit`.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("DISPATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

/// Broker endpoint and credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Fixed delay between dial attempts
    pub reconnect_delay_secs: u64,
}

impl BrokerSettings {
    /// AMQP URI for this endpoint. Credentials are percent-encoded.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port
        )
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "guest".to_string(),
            password: "guest".to_string(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
        }
    }
}

// Keep the password out of logs.
impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .finish_non_exhaustive()
    }
}

/// Queue name overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueNames {
    pub task: String,
    pub result: String,
    pub schedule: String,
}

impl QueueNames {
    pub fn registry(&self) -> QueueRegistry {
        QueueRegistry::new(&self.task, &self.result, &self.schedule)
    }
}

impl Default for QueueNames {
    fn default() -> Self {
        let registry = QueueRegistry::default();
        Self {
            task: registry.task.name,
            result: registry.result.name,
            schedule: registry.schedule.name,
        }
    }
}

/// Handshake timeouts used by the gateways.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub enqueue_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    /// Roll back provisional state when the ack wait times out
    pub rollback_on_ack_timeout: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            enqueue_timeout_ms: DEFAULT_ENQUEUE_TIMEOUT_MS,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            rollback_on_ack_timeout: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub prefetch: u16,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            prefetch: DEFAULT_PREFETCH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub port: u16,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_HTTP_PORT,
        }
    }
}
