//! Persistence backends for the stage ledgers
//!
//! The ledger service only talks to [`LedgerStore`]. Writes go through a
//! [`WriteBatch`] so that every operation lands as a single atomic unit.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{HistoryEntry, InventoryRecord, LedgerKey, RecordFilter};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A single write inside a batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert or replace a record by id
    Put(InventoryRecord),
    /// Hard-delete a record by id. History entries are kept.
    Delete(Uuid),
    /// Append to a record's history
    Append(HistoryEntry),
}

/// Writes applied all-or-nothing by [`LedgerStore::commit`]
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, record: InventoryRecord) -> Self {
        self.ops.push(WriteOp::Put(record));
        self
    }

    pub fn delete(mut self, id: Uuid) -> Self {
        self.ops.push(WriteOp::Delete(id));
        self
    }

    pub fn append(mut self, entry: HistoryEntry) -> Self {
        self.ops.push(WriteOp::Append(entry));
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Records written by this batch
    pub fn records(&self) -> impl Iterator<Item = &InventoryRecord> {
        self.ops.iter().filter_map(|op| match op {
            WriteOp::Put(record) => Some(record),
            _ => None,
        })
    }
}

/// Storage contract consumed by the ledger service
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch a record by id
    async fn get(&self, id: Uuid) -> AppResult<Option<InventoryRecord>>;

    /// Fetch the live record for a ledger key
    async fn find_by_key(&self, key: &LedgerKey) -> AppResult<Option<InventoryRecord>>;

    /// List records matching `filter`, oldest first
    async fn list(&self, filter: &RecordFilter) -> AppResult<Vec<InventoryRecord>>;

    /// History of a record in action order
    async fn history(&self, record_id: Uuid) -> AppResult<Vec<HistoryEntry>>;

    /// Apply every operation of `batch` or none of them
    async fn commit(&self, batch: WriteBatch) -> AppResult<()>;

    /// Backend name for health reporting
    fn backend(&self) -> &'static str;

    /// Connectivity probe
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
