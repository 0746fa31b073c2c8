//! Inventory ledger models

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::Stage;

/// A balance change that does not fit in a `Decimal`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("Quantity would exceed the largest supported balance")]
    QuantityOverflow,
    #[error("Amount would exceed the largest supported total")]
    AmountOverflow,
}

impl BalanceError {
    /// Request field the overflow is reported against
    pub fn field(&self) -> &'static str {
        match self {
            BalanceError::QuantityOverflow => "quantity",
            BalanceError::AmountOverflow => "amount",
        }
    }
}

/// Identity of a record within the stage ledgers.
///
/// At most one live record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub stage: Stage,
    pub owner_id: String,
    pub item_ref: String,
}

impl LedgerKey {
    pub fn new(stage: Stage, owner_id: impl Into<String>, item_ref: impl Into<String>) -> Self {
        Self {
            stage,
            owner_id: owner_id.into(),
            item_ref: item_ref.into(),
        }
    }
}

impl std::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.stage.as_str(), self.owner_id, self.item_ref)
    }
}

/// Lifecycle status of an inventory record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    /// Drained to zero, kept for its history
    Completed,
    /// Deleted through delete-inventory-item
    Cancelled,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Completed => "completed",
            RecordStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RecordStatus::Active),
            "completed" => Ok(RecordStatus::Completed),
            "cancelled" => Ok(RecordStatus::Cancelled),
            other => Err(format!("unknown record status: {}", other)),
        }
    }
}

/// Quantity held by one owner for one item in one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryRecord {
    pub id: Uuid,
    pub stage: Stage,
    pub owner_id: String,
    pub item_ref: String,
    pub quantity: Decimal,
    pub total_amount: Decimal,
    pub status: RecordStatus,
    /// Record in the previous stage that first fed this one
    pub source_record_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// A fresh, empty record for `key`. Quantity is applied afterwards with
    /// [`InventoryRecord::receive`] so the first history entry sees 0 as the
    /// previous quantity.
    pub fn empty(key: &LedgerKey, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: key.stage,
            owner_id: key.owner_id.clone(),
            item_ref: key.item_ref.clone(),
            quantity: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            status: RecordStatus::Active,
            source_record_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> LedgerKey {
        LedgerKey::new(self.stage, self.owner_id.clone(), self.item_ref.clone())
    }

    /// Average cost per unit, zero for an empty record
    pub fn unit_cost(&self) -> Decimal {
        if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.total_amount / self.quantity
        }
    }

    /// Share of `total_amount` attributable to `quantity` units.
    ///
    /// Releasing the whole quantity releases the whole amount, so no residue
    /// is left behind by rounding. Large balances whose product overflows
    /// are priced through the unit cost instead.
    pub fn amount_for(&self, quantity: Decimal) -> Result<Decimal, BalanceError> {
        if quantity >= self.quantity {
            return Ok(self.total_amount);
        }
        let share = self
            .total_amount
            .checked_mul(quantity)
            .and_then(|product| product.checked_div(self.quantity))
            .or_else(|| self.unit_cost().checked_mul(quantity))
            .ok_or(BalanceError::AmountOverflow)?;
        Ok(share
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .min(self.total_amount))
    }

    /// Increase the balance. Returns the quantity before the change.
    ///
    /// Nothing is modified when either sum overflows.
    pub fn receive(
        &mut self,
        quantity: Decimal,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Decimal, BalanceError> {
        let new_quantity = self
            .quantity
            .checked_add(quantity)
            .ok_or(BalanceError::QuantityOverflow)?;
        let new_amount = self
            .total_amount
            .checked_add(amount)
            .ok_or(BalanceError::AmountOverflow)?;

        let previous = self.quantity;
        self.quantity = new_quantity;
        self.total_amount = new_amount;
        self.status = RecordStatus::Active;
        self.updated_at = now;
        Ok(previous)
    }

    /// Decrease the balance. The caller checks availability first.
    ///
    /// Returns the quantity before the change and the amount released.
    pub fn release(
        &mut self,
        quantity: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(Decimal, Decimal), BalanceError> {
        let amount = self.amount_for(quantity)?;
        let new_quantity = self
            .quantity
            .checked_sub(quantity)
            .ok_or(BalanceError::QuantityOverflow)?;

        let previous = self.quantity;
        self.quantity = new_quantity;
        self.total_amount -= amount;
        if self.quantity.is_zero() {
            self.status = RecordStatus::Completed;
        }
        self.updated_at = now;
        Ok((previous, amount))
    }
}

/// Kind of mutation recorded in the history log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Added,
    Removed,
    Returned,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Added => "added",
            HistoryAction::Removed => "removed",
            HistoryAction::Returned => "returned",
        }
    }

    /// Whether this action increases the record's quantity
    pub fn is_inbound(&self) -> bool {
        matches!(self, HistoryAction::Created | HistoryAction::Added)
    }

    /// Signed change this action applies for `quantity` units
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        if self.is_inbound() {
            quantity
        } else {
            -quantity
        }
    }
}

impl std::str::FromStr for HistoryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(HistoryAction::Created),
            "added" => Ok(HistoryAction::Added),
            "removed" => Ok(HistoryAction::Removed),
            "returned" => Ok(HistoryAction::Returned),
            other => Err(format!("unknown history action: {}", other)),
        }
    }
}

/// Immutable audit entry for a single mutation of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub record_id: Uuid,
    pub action: HistoryAction,
    pub quantity: Decimal,
    pub previous_quantity: Decimal,
    pub new_quantity: Decimal,
    pub action_date: DateTime<Utc>,
    pub action_by: String,
    pub notes: Option<String>,
    /// Other side of a transfer or return-to-origin
    pub related_record_id: Option<Uuid>,
}

impl HistoryEntry {
    /// Entry describing the change that left `record` in its current state
    pub fn for_change(
        record: &InventoryRecord,
        action: HistoryAction,
        quantity: Decimal,
        previous_quantity: Decimal,
        action_by: &str,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            record_id: record.id,
            action,
            quantity,
            previous_quantity,
            new_quantity: record.quantity,
            action_date: record.updated_at,
            action_by: action_by.to_string(),
            notes,
            related_record_id: None,
        }
    }

    pub fn related_to(mut self, record_id: Uuid) -> Self {
        self.related_record_id = Some(record_id);
        self
    }

    /// `new_quantity = previous_quantity ± quantity` under the action's sign
    pub fn is_consistent(&self) -> bool {
        self.previous_quantity + self.action.signed(self.quantity) == self.new_quantity
    }
}

/// Result of moving quantity into the next stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub source: InventoryRecord,
    pub destination: InventoryRecord,
}

/// Result of delete-inventory-item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    /// Final state of the record; `Cancelled` when it was removed entirely
    pub record: InventoryRecord,
    pub deleted: bool,
    /// Origin record after receiving the returned quantity
    pub origin: Option<InventoryRecord>,
}

/// Filter for listing records. `None` fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilter {
    pub stage: Option<Stage>,
    pub owner_id: Option<String>,
    pub item_ref: Option<String>,
    pub status: Option<RecordStatus>,
}

impl RecordFilter {
    pub fn matches(&self, record: &InventoryRecord) -> bool {
        self.stage.map_or(true, |s| s == record.stage)
            && self.owner_id.as_deref().map_or(true, |o| o == record.owner_id)
            && self.item_ref.as_deref().map_or(true, |i| i == record.item_ref)
            && self.status.map_or(true, |s| s == record.status)
    }
}
