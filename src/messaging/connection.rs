//! Broker connection with blocking dial and single-flight reconnect.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use super::transport::{BrokerChannel, Transport};
use crate::error::BrokerError;
use crate::types::BrokerSettings;

/// What a call to [`BrokerConnection::reconnect`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// Another caller holds the reconnect guard; nothing was done
    Contended,
    /// The probe succeeded, the existing connection was kept
    Healthy,
    /// The stale connection was closed and a new one dialed
    Reconnected,
}

/// Owns one physical broker connection.
///
/// Dial failures are never surfaced: [`connect`](Self::connect) retries
/// with a fixed delay until it succeeds. Reconnects are single-flight,
/// guarded by a try-lock so concurrent failing callers don't all redial.
pub struct BrokerConnection<T: Transport> {
    transport: T,
    uri: String,
    endpoint: String,
    retry_delay: Duration,
    conn: RwLock<Option<Arc<T::Connection>>>,
    reconnect_guard: Mutex<()>,
}

impl<T: Transport> BrokerConnection<T> {
    /// Create an unconnected handle. Call [`connect`](Self::connect) before use.
    pub fn new(transport: T, settings: &BrokerSettings) -> Self {
        Self {
            transport,
            uri: settings.uri(),
            endpoint: format!("{}:{}", settings.host, settings.port),
            retry_delay: settings.reconnect_delay(),
            conn: RwLock::new(None),
            reconnect_guard: Mutex::new(()),
        }
    }

    /// Override the delay between dial attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Dial until a connection is established. Returns only on success.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn connect(&self) {
        let conn = loop {
            match self.transport.dial(&self.uri).await {
                Ok(conn) => break conn,
                Err(e) => {
                    error!(
                        error = %e,
                        retry_in = ?self.retry_delay,
                        "Failed to connect to broker"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        };

        *self.conn.write().await = Some(Arc::new(conn));
        info!(endpoint = %self.endpoint, "Connected to broker");
    }

    /// Reconnect if the current connection is dead.
    ///
    /// Returns immediately with [`ReconnectOutcome::Contended`] if another
    /// reconnect is already in flight.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn reconnect(&self) -> ReconnectOutcome {
        let _guard = match self.reconnect_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Reconnect already in progress");
                return ReconnectOutcome::Contended;
            }
        };

        if self.is_alive().await {
            debug!("Broker connection is healthy, skipping reconnect");
            return ReconnectOutcome::Healthy;
        }

        warn!(endpoint = %self.endpoint, "Broker connection lost, reconnecting");
        self.close().await;
        self.connect().await;
        ReconnectOutcome::Reconnected
    }

    /// Probe the connection by opening and closing a throwaway channel.
    pub async fn is_alive(&self) -> bool {
        match self.open_channel().await {
            Ok(channel) => {
                channel.close().await;
                true
            }
            Err(_) => false,
        }
    }

    /// Open a channel on the current connection.
    pub async fn open_channel(&self) -> Result<T::Channel, BrokerError> {
        let conn = self
            .conn
            .read()
            .await
            .clone()
            .ok_or(BrokerError::NotConnected)?;
        self.transport.open_channel(&conn).await
    }

    /// Release the connection. Safe to call more than once.
    pub async fn close(&self) {
        let conn = self.conn.write().await.take();
        if let Some(conn) = conn {
            self.transport.close(&conn).await;
            debug!(endpoint = %self.endpoint, "Broker connection closed");
        }
    }
}
