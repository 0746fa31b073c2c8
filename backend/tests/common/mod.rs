//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use copper_ledger_backend::models::Stage;
use copper_ledger_backend::services::{
    AddStockInput, LedgerService, RemoveStockInput, ReturnToNextStageInput,
};
use copper_ledger_backend::store::MemoryStore;
use rust_decimal::Decimal;

pub const USER: &str = "user-1";

/// Create Decimal from string
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Ledger service over a fresh in-memory store
pub fn service() -> LedgerService {
    LedgerService::new(Arc::new(MemoryStore::new()))
}

pub fn add(stage: Stage, owner: &str, item: &str, quantity: &str, amount: &str) -> AddStockInput {
    AddStockInput {
        stage,
        owner_id: owner.to_string(),
        item_ref: item.to_string(),
        quantity: dec(quantity),
        amount: dec(amount),
        notes: None,
    }
}

pub fn remove(stage: Stage, owner: &str, item: &str, quantity: &str) -> RemoveStockInput {
    RemoveStockInput {
        stage,
        owner_id: owner.to_string(),
        item_ref: item.to_string(),
        quantity: dec(quantity),
        notes: None,
    }
}

pub fn transfer(
    stage: Stage,
    owner: &str,
    item: &str,
    dest_owner: &str,
    new_item: &str,
    quantity: &str,
) -> ReturnToNextStageInput {
    ReturnToNextStageInput {
        source_stage: stage,
        source_owner_id: owner.to_string(),
        source_item_ref: item.to_string(),
        dest_owner_id: dest_owner.to_string(),
        new_item_name: new_item.to_string(),
        quantity: dec(quantity),
        notes: None,
    }
}
