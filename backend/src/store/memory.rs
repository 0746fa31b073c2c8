//! In-memory ledger store

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LedgerStore, WriteBatch, WriteOp};
use crate::error::{AppError, AppResult};
use crate::models::{HistoryEntry, InventoryRecord, LedgerKey, RecordFilter};

#[derive(Default)]
struct Tables {
    records: HashMap<Uuid, InventoryRecord>,
    by_key: HashMap<LedgerKey, Uuid>,
    history: HashMap<Uuid, Vec<HistoryEntry>>,
}

impl Tables {
    /// Reject the batch if a put would give a ledger key a second live record
    fn check(&self, batch: &WriteBatch) -> AppResult<()> {
        let mut owners: HashMap<LedgerKey, Option<Uuid>> = HashMap::new();
        let mut keys_by_id: HashMap<Uuid, LedgerKey> = HashMap::new();

        for op in batch.ops() {
            match op {
                WriteOp::Put(record) => {
                    let key = record.key();
                    let owner = match owners.get(&key) {
                        Some(owner) => *owner,
                        None => self.by_key.get(&key).copied(),
                    };
                    if let Some(existing) = owner {
                        if existing != record.id {
                            return Err(AppError::StorageError(format!(
                                "ledger key {} already belongs to record {}",
                                key, existing
                            )));
                        }
                    }
                    keys_by_id.insert(record.id, key.clone());
                    owners.insert(key, Some(record.id));
                }
                WriteOp::Delete(id) => {
                    let key = keys_by_id
                        .get(id)
                        .cloned()
                        .or_else(|| self.records.get(id).map(|r| r.key()));
                    if let Some(key) = key {
                        owners.insert(key, None);
                    }
                }
                WriteOp::Append(_) => {}
            }
        }
        Ok(())
    }

    fn apply(&mut self, batch: WriteBatch) {
        for op in batch.ops {
            match op {
                WriteOp::Put(record) => {
                    self.by_key.insert(record.key(), record.id);
                    self.records.insert(record.id, record);
                }
                WriteOp::Delete(id) => {
                    if let Some(record) = self.records.remove(&id) {
                        self.by_key.remove(&record.key());
                    }
                }
                WriteOp::Append(entry) => {
                    self.history.entry(entry.record_id).or_default().push(entry);
                }
            }
        }
    }
}

/// Maps behind one async lock. A batch is checked in full before any of it
/// is applied, under the same write guard.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<InventoryRecord>> {
        Ok(self.tables.read().await.records.get(&id).cloned())
    }

    async fn find_by_key(&self, key: &LedgerKey) -> AppResult<Option<InventoryRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_key
            .get(key)
            .and_then(|id| tables.records.get(id))
            .cloned())
    }

    async fn list(&self, filter: &RecordFilter) -> AppResult<Vec<InventoryRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<InventoryRecord> = tables
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn history(&self, record_id: Uuid) -> AppResult<Vec<HistoryEntry>> {
        Ok(self
            .tables
            .read()
            .await
            .history
            .get(&record_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn commit(&self, batch: WriteBatch) -> AppResult<()> {
        let mut tables = self.tables.write().await;
        tables.check(&batch)?;
        tables.apply(batch);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
