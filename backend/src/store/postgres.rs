//! PostgreSQL ledger store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{LedgerStore, WriteBatch, WriteOp};
use crate::error::{AppError, AppResult};
use crate::models::{HistoryEntry, InventoryRecord, LedgerKey, RecordFilter};

const RECORD_COLUMNS: &str = "id, stage, owner_id, item_ref, quantity, total_amount, status, \
                              source_record_id, created_at, updated_at";

/// Ledger store backed by PostgreSQL. Each batch runs in one transaction.
#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

/// Database row for an inventory record
#[derive(Debug, FromRow)]
struct RecordRow {
    id: Uuid,
    stage: String,
    owner_id: String,
    item_ref: String,
    quantity: Decimal,
    total_amount: Decimal,
    status: String,
    source_record_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for InventoryRecord {
    type Error = AppError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(InventoryRecord {
            id: row.id,
            stage: row
                .stage
                .parse()
                .map_err(|e| AppError::Internal(format!("corrupt record {}: {}", row.id, e)))?,
            owner_id: row.owner_id,
            item_ref: row.item_ref,
            quantity: row.quantity,
            total_amount: row.total_amount,
            status: row
                .status
                .parse()
                .map_err(|e| AppError::Internal(format!("corrupt record {}: {}", row.id, e)))?,
            source_record_id: row.source_record_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row for a history entry
#[derive(Debug, FromRow)]
struct HistoryRow {
    id: Uuid,
    record_id: Uuid,
    action: String,
    quantity: Decimal,
    previous_quantity: Decimal,
    new_quantity: Decimal,
    action_date: DateTime<Utc>,
    action_by: String,
    notes: Option<String>,
    related_record_id: Option<Uuid>,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = AppError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(HistoryEntry {
            id: row.id,
            record_id: row.record_id,
            action: row
                .action
                .parse()
                .map_err(|e| AppError::Internal(format!("corrupt history {}: {}", row.id, e)))?,
            quantity: row.quantity,
            previous_quantity: row.previous_quantity,
            new_quantity: row.new_quantity,
            action_date: row.action_date,
            action_by: row.action_by,
            notes: row.notes,
            related_record_id: row.related_record_id,
        })
    }
}

impl PgStore {
    /// Create a new PgStore instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| AppError::StorageError(format!("migration failed: {}", e)))
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<InventoryRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM inventory_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(InventoryRecord::try_from).transpose()
    }

    async fn find_by_key(&self, key: &LedgerKey) -> AppResult<Option<InventoryRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM inventory_records WHERE stage = $1 AND owner_id = $2 AND item_ref = $3",
            RECORD_COLUMNS
        ))
        .bind(key.stage.as_str())
        .bind(&key.owner_id)
        .bind(&key.item_ref)
        .fetch_optional(&self.db)
        .await?;

        row.map(InventoryRecord::try_from).transpose()
    }

    async fn list(&self, filter: &RecordFilter) -> AppResult<Vec<InventoryRecord>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {} FROM inventory_records WHERE TRUE",
            RECORD_COLUMNS
        ));
        if let Some(stage) = filter.stage {
            query.push(" AND stage = ").push_bind(stage.as_str());
        }
        if let Some(owner_id) = &filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner_id.clone());
        }
        if let Some(item_ref) = &filter.item_ref {
            query.push(" AND item_ref = ").push_bind(item_ref.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at, id");

        let rows = query
            .build_query_as::<RecordRow>()
            .fetch_all(&self.db)
            .await?;

        rows.into_iter().map(InventoryRecord::try_from).collect()
    }

    async fn history(&self, record_id: Uuid) -> AppResult<Vec<HistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, record_id, action, quantity, previous_quantity, new_quantity,
                   action_date, action_by, notes, related_record_id
            FROM inventory_history
            WHERE record_id = $1
            ORDER BY action_date, seq
            "#,
        )
        .bind(record_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    async fn commit(&self, batch: WriteBatch) -> AppResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tx = self.db.begin().await?;

        for op in batch.ops() {
            match op {
                WriteOp::Put(record) => {
                    sqlx::query(
                        r#"
                        INSERT INTO inventory_records (
                            id, stage, owner_id, item_ref, quantity, total_amount, status,
                            source_record_id, created_at, updated_at
                        )
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                        ON CONFLICT (id) DO UPDATE
                        SET quantity = EXCLUDED.quantity,
                            total_amount = EXCLUDED.total_amount,
                            status = EXCLUDED.status,
                            source_record_id = EXCLUDED.source_record_id,
                            updated_at = EXCLUDED.updated_at
                        "#,
                    )
                    .bind(record.id)
                    .bind(record.stage.as_str())
                    .bind(&record.owner_id)
                    .bind(&record.item_ref)
                    .bind(record.quantity)
                    .bind(record.total_amount)
                    .bind(record.status.as_str())
                    .bind(record.source_record_id)
                    .bind(record.created_at)
                    .bind(record.updated_at)
                    .execute(&mut *tx)
                    .await?;
                }
                WriteOp::Delete(id) => {
                    sqlx::query("DELETE FROM inventory_records WHERE id = $1")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
                WriteOp::Append(entry) => {
                    sqlx::query(
                        r#"
                        INSERT INTO inventory_history (
                            id, record_id, action, quantity, previous_quantity, new_quantity,
                            action_date, action_by, notes, related_record_id
                        )
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                        "#,
                    )
                    .bind(entry.id)
                    .bind(entry.record_id)
                    .bind(entry.action.as_str())
                    .bind(entry.quantity)
                    .bind(entry.previous_quantity)
                    .bind(entry.new_quantity)
                    .bind(entry.action_date)
                    .bind(&entry.action_by)
                    .bind(&entry.notes)
                    .bind(entry.related_record_id)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }

        tx.commit().await?;
        tracing::debug!(ops = batch.len(), "ledger batch committed");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }
}
