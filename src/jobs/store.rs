//! Provisional record store.
//!
//! Handlers write a provisional record before dispatching; the gateway's
//! rollback deletes it again if the handshake fails. The relational schema
//! lives elsewhere, so the service talks to it through [`ProvisionalStore`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;

/// Lifecycle of a provisional record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// File received, analysis task pending
    Pending,
    /// Result received from the analysis worker
    Analyzed,
}

/// Input for a new provisional record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub path: String,
    pub file: String,
    /// Stored as dependent rows
    pub tags: Vec<String>,
}

/// A stored provisional record.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionalRecord {
    pub id: u64,
    pub path: String,
    pub file: String,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// Store operations used by the dispatch flow.
#[async_trait]
pub trait ProvisionalStore: Send + Sync {
    async fn insert_provisional_record(&self, record: NewRecord) -> Result<u64, StoreError>;

    async fn delete_provisional_record(&self, id: u64) -> Result<(), StoreError>;

    async fn delete_dependent_rows(&self, id: u64) -> Result<(), StoreError>;

    async fn mark_analyzed(&self, id: u64) -> Result<(), StoreError>;

    async fn get_record(&self, id: u64) -> Option<ProvisionalRecord>;
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    records: HashMap<u64, ProvisionalRecord>,
    dependent_rows: HashMap<u64, Vec<String>>,
}

/// In-memory store for running without a database and for tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.tables.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of dependent rows for a record.
    pub async fn dependent_row_count(&self, id: u64) -> usize {
        self.tables
            .read()
            .await
            .dependent_rows
            .get(&id)
            .map_or(0, Vec::len)
    }
}

#[async_trait]
impl ProvisionalStore for MemoryStore {
    async fn insert_provisional_record(&self, record: NewRecord) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_id += 1;
        let id = tables.next_id;

        tables.records.insert(
            id,
            ProvisionalRecord {
                id,
                path: record.path,
                file: record.file,
                status: RecordStatus::Pending,
                created_at: Utc::now(),
                analyzed_at: None,
            },
        );
        if !record.tags.is_empty() {
            tables.dependent_rows.insert(id, record.tags);
        }
        Ok(id)
    }

    async fn delete_provisional_record(&self, id: u64) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .records
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }

    async fn delete_dependent_rows(&self, id: u64) -> Result<(), StoreError> {
        self.tables.write().await.dependent_rows.remove(&id);
        Ok(())
    }

    async fn mark_analyzed(&self, id: u64) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let record = tables.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = RecordStatus::Analyzed;
        record.analyzed_at = Some(Utc::now());
        Ok(())
    }

    async fn get_record(&self, id: u64) -> Option<ProvisionalRecord> {
        self.tables.read().await.records.get(&id).cloned()
    }
}
