//! Stage ledger service: quantity movements within and between stages
//!
//! All balance arithmetic lives here. Each mutation locks the ledger keys it
//! touches, re-reads the records under the lock, validates, and commits every
//! record change and history entry as one batch.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{
    has_sufficient_quantity, validate_amount, validate_quantity, validate_reference,
    DeleteOutcome, HistoryAction, HistoryEntry, InventoryRecord, LedgerKey, RecordFilter,
    RecordStatus, Stage, TransferOutcome,
};
use crate::services::locks::KeyedLocks;
use crate::store::{LedgerStore, WriteBatch};

/// Ledger service shared by all handlers
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    locks: Arc<KeyedLocks>,
}

/// Input for adding stock to a stage ledger
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddStockInput {
    pub stage: Stage,
    #[validate(length(min = 1, max = 200, message = "Owner id must be 1-200 characters"))]
    pub owner_id: String,
    #[validate(length(min = 1, max = 200, message = "Item reference must be 1-200 characters"))]
    pub item_ref: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub amount: Decimal,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

/// Input for removing stock from a stage ledger
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RemoveStockInput {
    pub stage: Stage,
    #[validate(length(min = 1, max = 200, message = "Owner id must be 1-200 characters"))]
    pub owner_id: String,
    #[validate(length(min = 1, max = 200, message = "Item reference must be 1-200 characters"))]
    pub item_ref: String,
    pub quantity: Decimal,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

/// Input for moving stock into the next stage's ledger
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReturnToNextStageInput {
    pub source_stage: Stage,
    #[validate(length(min = 1, max = 200, message = "Owner id must be 1-200 characters"))]
    pub source_owner_id: String,
    #[validate(length(min = 1, max = 200, message = "Item reference must be 1-200 characters"))]
    pub source_item_ref: String,
    #[validate(length(min = 1, max = 200, message = "Owner id must be 1-200 characters"))]
    pub dest_owner_id: String,
    #[validate(length(min = 1, max = 200, message = "Item name must be 1-200 characters"))]
    pub new_item_name: String,
    pub quantity: Decimal,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

/// Input for delete-inventory-item
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteItemInput {
    pub quantity: Decimal,
    /// Give the deleted quantity back to the record that fed this one
    #[serde(default)]
    pub return_to_origin: bool,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

fn check_quantity(quantity: Decimal) -> AppResult<()> {
    validate_quantity(quantity).map_err(|msg| AppError::invalid("quantity", msg))
}

fn check_reference(field: &str, value: &str) -> AppResult<()> {
    validate_reference(value).map_err(|msg| AppError::invalid(field, msg))
}

fn check_available(record: &InventoryRecord, requested: Decimal) -> AppResult<()> {
    if has_sufficient_quantity(record.quantity, requested) {
        Ok(())
    } else {
        Err(AppError::InsufficientQuantity {
            resource: record.key().to_string(),
            requested,
            available: record.quantity,
        })
    }
}

fn record_not_found() -> AppError {
    AppError::NotFound("Inventory record".to_string())
}

impl LedgerService {
    /// Create a new LedgerService over `store`
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    /// Create or increment the record for (stage, owner, item)
    pub async fn add(&self, action_by: &str, input: AddStockInput) -> AppResult<InventoryRecord> {
        input.validate()?;
        check_reference("ownerId", &input.owner_id)?;
        check_reference("itemRef", &input.item_ref)?;
        check_quantity(input.quantity)?;
        validate_amount(input.amount).map_err(|msg| AppError::invalid("amount", msg))?;

        let key = LedgerKey::new(input.stage, input.owner_id, input.item_ref);
        let _guard = self.locks.acquire(&key).await;

        let now = Utc::now();
        let (mut record, action) = match self.store.find_by_key(&key).await? {
            Some(record) => (record, HistoryAction::Added),
            None => (InventoryRecord::empty(&key, now), HistoryAction::Created),
        };

        let previous = record.receive(input.quantity, input.amount, now)?;
        let entry = HistoryEntry::for_change(
            &record,
            action,
            input.quantity,
            previous,
            action_by,
            input.notes,
        );

        self.store
            .commit(WriteBatch::new().put(record.clone()).append(entry))
            .await?;

        tracing::info!(
            record_id = %record.id,
            stage = record.stage.as_str(),
            quantity = %input.quantity,
            balance = %record.quantity,
            "Stock {}",
            action.as_str()
        );
        Ok(record)
    }

    /// Take quantity out of an existing record
    pub async fn remove(
        &self,
        action_by: &str,
        input: RemoveStockInput,
    ) -> AppResult<InventoryRecord> {
        input.validate()?;
        check_reference("ownerId", &input.owner_id)?;
        check_reference("itemRef", &input.item_ref)?;
        check_quantity(input.quantity)?;

        let key = LedgerKey::new(input.stage, input.owner_id, input.item_ref);
        let _guard = self.locks.acquire(&key).await;

        let mut record = self
            .store
            .find_by_key(&key)
            .await?
            .ok_or_else(record_not_found)?;
        check_available(&record, input.quantity)?;

        let (previous, _) = record.release(input.quantity, Utc::now())?;
        let entry = HistoryEntry::for_change(
            &record,
            HistoryAction::Removed,
            input.quantity,
            previous,
            action_by,
            input.notes,
        );

        self.store
            .commit(WriteBatch::new().put(record.clone()).append(entry))
            .await?;

        tracing::info!(
            record_id = %record.id,
            stage = record.stage.as_str(),
            quantity = %input.quantity,
            balance = %record.quantity,
            "Stock removed"
        );
        Ok(record)
    }

    /// Move quantity from a record into the next stage's ledger.
    ///
    /// The destination is keyed by (next stage, `dest_owner_id`,
    /// `new_item_name`). A new destination remembers the source record id.
    /// The released share of the source's amount travels with the quantity.
    pub async fn return_to_next_stage(
        &self,
        action_by: &str,
        input: ReturnToNextStageInput,
    ) -> AppResult<TransferOutcome> {
        input.validate()?;
        check_reference("sourceOwnerId", &input.source_owner_id)?;
        check_reference("sourceItemRef", &input.source_item_ref)?;
        check_reference("destOwnerId", &input.dest_owner_id)?;
        check_reference("newItemName", &input.new_item_name)?;
        check_quantity(input.quantity)?;

        let next_stage = input.source_stage.next().ok_or_else(|| {
            AppError::invalid(
                "sourceStage",
                &format!("{} is the final stage", input.source_stage),
            )
        })?;

        let source_key = LedgerKey::new(
            input.source_stage,
            input.source_owner_id,
            input.source_item_ref,
        );
        let dest_key = LedgerKey::new(next_stage, input.dest_owner_id, input.new_item_name);
        let _guard = self
            .locks
            .acquire_all(&[source_key.clone(), dest_key.clone()])
            .await;

        let mut source = self
            .store
            .find_by_key(&source_key)
            .await?
            .ok_or_else(record_not_found)?;
        check_available(&source, input.quantity)?;

        let now = Utc::now();
        let (mut destination, dest_action) = match self.store.find_by_key(&dest_key).await? {
            Some(record) => (record, HistoryAction::Added),
            None => (InventoryRecord::empty(&dest_key, now), HistoryAction::Created),
        };
        if destination.source_record_id.is_none() {
            destination.source_record_id = Some(source.id);
        }

        let (source_previous, released_amount) = source.release(input.quantity, now)?;
        let dest_previous = destination.receive(input.quantity, released_amount, now)?;

        let source_entry = HistoryEntry::for_change(
            &source,
            HistoryAction::Returned,
            input.quantity,
            source_previous,
            action_by,
            input.notes.clone(),
        )
        .related_to(destination.id);
        let dest_entry = HistoryEntry::for_change(
            &destination,
            dest_action,
            input.quantity,
            dest_previous,
            action_by,
            input.notes,
        )
        .related_to(source.id);

        self.store
            .commit(
                WriteBatch::new()
                    .put(source.clone())
                    .put(destination.clone())
                    .append(source_entry)
                    .append(dest_entry),
            )
            .await?;

        tracing::info!(
            source_id = %source.id,
            destination_id = %destination.id,
            from = source.stage.as_str(),
            to = destination.stage.as_str(),
            quantity = %input.quantity,
            "Stock returned to next stage"
        );
        Ok(TransferOutcome {
            source,
            destination,
        })
    }

    /// Delete some or all of a record's quantity.
    ///
    /// Deleting the full remaining quantity removes the record from the store
    /// (its history is kept) and reports it as `Cancelled`. A record already
    /// drained to zero is removed with a quantity of zero. With
    /// `return_to_origin` the quantity is added back to the record this one
    /// was fed from; there is nothing to return when clearing a drained
    /// record.
    pub async fn delete_inventory_item(
        &self,
        action_by: &str,
        record_id: Uuid,
        input: DeleteItemInput,
    ) -> AppResult<DeleteOutcome> {
        input.validate()?;
        let clears_drained = input.quantity.is_zero();
        if !clears_drained {
            check_quantity(input.quantity)?;
        }

        let snapshot = self
            .store
            .get(record_id)
            .await?
            .ok_or_else(record_not_found)?;

        let origin_id = if input.return_to_origin && !clears_drained {
            Some(snapshot.source_record_id.ok_or_else(|| {
                AppError::invalid("returnToOrigin", "Record has no originating stage record")
            })?)
        } else {
            None
        };

        // Ledger keys never change for a record id, so the keys can be
        // resolved before locking and the records re-read afterwards.
        let mut keys = vec![snapshot.key()];
        if let Some(origin_id) = origin_id {
            let origin = self
                .store
                .get(origin_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Originating inventory record".to_string()))?;
            keys.push(origin.key());
        }
        let _guard = self.locks.acquire_all(&keys).await;

        let mut record = self
            .store
            .get(record_id)
            .await?
            .ok_or_else(record_not_found)?;
        if clears_drained {
            if !record.quantity.is_zero() {
                return Err(AppError::invalid(
                    "quantity",
                    "Quantity must be greater than zero",
                ));
            }
        } else {
            check_available(&record, input.quantity)?;
        }

        let mut origin = match origin_id {
            Some(origin_id) => Some(self.store.get(origin_id).await?.ok_or_else(|| {
                AppError::NotFound("Originating inventory record".to_string())
            })?),
            None => None,
        };

        let now = Utc::now();
        let deleted = input.quantity == record.quantity;
        let (previous, released_amount) = record.release(input.quantity, now)?;

        let notes = input
            .notes
            .or_else(|| deleted.then(|| "Inventory item deleted".to_string()));
        let action = if origin.is_some() {
            HistoryAction::Returned
        } else {
            HistoryAction::Removed
        };
        let mut entry =
            HistoryEntry::for_change(&record, action, input.quantity, previous, action_by, notes);

        let mut batch = WriteBatch::new();
        if let Some(origin) = origin.as_mut() {
            let origin_previous = origin.receive(input.quantity, released_amount, now)?;
            let origin_entry = HistoryEntry::for_change(
                origin,
                HistoryAction::Added,
                input.quantity,
                origin_previous,
                action_by,
                Some(format!(
                    "Returned from {} {}",
                    record.stage, record.item_ref
                )),
            )
            .related_to(record.id);
            entry = entry.related_to(origin.id);
            batch = batch.put(origin.clone()).append(origin_entry);
        }

        if deleted {
            record.status = RecordStatus::Cancelled;
            batch = batch.delete(record.id);
        } else {
            batch = batch.put(record.clone());
        }
        batch = batch.append(entry);

        self.store.commit(batch).await?;

        tracing::info!(
            record_id = %record.id,
            stage = record.stage.as_str(),
            quantity = %input.quantity,
            deleted,
            returned = origin.is_some(),
            "Inventory item deleted"
        );
        Ok(DeleteOutcome {
            record,
            deleted,
            origin,
        })
    }

    /// Get a record by id
    pub async fn get(&self, record_id: Uuid) -> AppResult<InventoryRecord> {
        self.store
            .get(record_id)
            .await?
            .ok_or_else(record_not_found)
    }

    /// Get the record for a ledger key
    pub async fn find(&self, key: &LedgerKey) -> AppResult<InventoryRecord> {
        self.store
            .find_by_key(key)
            .await?
            .ok_or_else(record_not_found)
    }

    /// List records matching `filter`
    pub async fn list(&self, filter: &RecordFilter) -> AppResult<Vec<InventoryRecord>> {
        self.store.list(filter).await
    }

    /// History of a record, including records that have since been deleted
    pub async fn history(&self, record_id: Uuid) -> AppResult<Vec<HistoryEntry>> {
        let entries = self.store.history(record_id).await?;
        if entries.is_empty() && self.store.get(record_id).await?.is_none() {
            return Err(record_not_found());
        }
        Ok(entries)
    }
}
