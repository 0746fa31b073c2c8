//! Property and concurrency tests for the stage ledgers
//!
//! - Balance conservation: quantity = sum(added) - sum(removed), never negative
//! - History accuracy: one entry per successful mutation, matching balances
//! - Transfer atomicity when the store rejects the write
//! - Lost-update prevention under concurrent mutation

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use copper_ledger_backend::error::{AppError, AppResult};
use copper_ledger_backend::models::{
    HistoryEntry, InventoryRecord, LedgerKey, RecordFilter, Stage,
};
use copper_ledger_backend::services::LedgerService;
use copper_ledger_backend::store::{LedgerStore, MemoryStore, WriteBatch};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Store that refuses any batch writing a record in `stage`
struct RejectingStore {
    inner: MemoryStore,
    stage: Stage,
}

#[async_trait]
impl LedgerStore for RejectingStore {
    async fn get(&self, id: Uuid) -> AppResult<Option<InventoryRecord>> {
        self.inner.get(id).await
    }

    async fn find_by_key(&self, key: &LedgerKey) -> AppResult<Option<InventoryRecord>> {
        self.inner.find_by_key(key).await
    }

    async fn list(&self, filter: &RecordFilter) -> AppResult<Vec<InventoryRecord>> {
        self.inner.list(filter).await
    }

    async fn history(&self, record_id: Uuid) -> AppResult<Vec<HistoryEntry>> {
        self.inner.history(record_id).await
    }

    async fn commit(&self, batch: WriteBatch) -> AppResult<()> {
        if batch.records().any(|r| r.stage == self.stage) {
            return Err(AppError::StorageError("write rejected".to_string()));
        }
        self.inner.commit(batch).await
    }

    fn backend(&self) -> &'static str {
        "rejecting"
    }
}

// ============================================================================
// Atomicity
// ============================================================================

#[tokio::test]
async fn test_transfer_is_atomic_when_destination_write_fails() {
    let store = Arc::new(RejectingStore {
        inner: MemoryStore::new(),
        stage: Stage::Draw,
    });
    let ledger = LedgerService::new(store.clone());

    let source = ledger
        .add(USER, add(Stage::Kacha, "a", "copper", "70", "700"))
        .await
        .unwrap();

    let err = ledger
        .return_to_next_stage(USER, transfer(Stage::Kacha, "a", "copper", "b", "wire", "40"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StorageError(_)));

    let after = ledger.get(source.id).await.unwrap();
    assert_eq!(after.quantity, dec("70"));
    assert_eq!(after.total_amount, dec("700"));
    assert_eq!(ledger.history(source.id).await.unwrap().len(), 1);
    assert!(ledger
        .list(&RecordFilter {
            stage: Some(Stage::Draw),
            ..Default::default()
        })
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_removes_never_lose_updates() {
    const N: usize = 50;
    let ledger = service();
    let record = ledger
        .add(USER, add(Stage::Kacha, "a", "copper", &N.to_string(), "0"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..N {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            ledger
                .remove(USER, remove(Stage::Kacha, "a", "copper", "1"))
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let after = ledger.get(record.id).await.unwrap();
    assert!(after.quantity.is_zero());

    let history = ledger.history(record.id).await.unwrap();
    assert_eq!(history.len(), N + 1);
    assert!(history.iter().all(|e| e.is_consistent()));

    let err = ledger
        .remove(USER, remove(Stage::Kacha, "a", "copper", "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientQuantity { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_and_adds_conserve_quantity() {
    let ledger = service();
    ledger
        .add(USER, add(Stage::Kacha, "a", "copper", "100", "0"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..40 {
        let ledger = ledger.clone();
        tasks.push(tokio::spawn(async move {
            if i % 4 == 0 {
                ledger
                    .add(USER, add(Stage::Kacha, "a", "copper", "1", "0"))
                    .await
                    .map(|_| ())
            } else {
                ledger
                    .return_to_next_stage(USER, transfer(Stage::Kacha, "a", "copper", "b", "wire", "3"))
                    .await
                    .map(|_| ())
            }
        }));
    }

    let mut transferred = Decimal::ZERO;
    let mut added = Decimal::ZERO;
    for (i, task) in tasks.into_iter().enumerate() {
        let result = task.await.unwrap();
        match (i % 4 == 0, result) {
            (true, Ok(())) => added += Decimal::ONE,
            (false, Ok(())) => transferred += Decimal::from(3),
            (_, Err(AppError::InsufficientQuantity { .. })) => {}
            (_, Err(other)) => panic!("unexpected error: {:?}", other),
        }
    }

    let source = ledger
        .find(&LedgerKey::new(Stage::Kacha, "a", "copper"))
        .await
        .unwrap();
    let dest = ledger
        .find(&LedgerKey::new(Stage::Draw, "b", "wire"))
        .await
        .unwrap();
    assert_eq!(source.quantity, dec("100") + added - transferred);
    assert_eq!(dest.quantity, transferred);
    assert_eq!(source.quantity + dest.quantity, dec("100") + added);
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Add(Decimal),
    Remove(Decimal),
}

/// Strategy for generating valid quantities (0.1 to 100.0)
fn quantity_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=1000i64).prop_map(|n| Decimal::new(n, 1))
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        quantity_strategy().prop_map(Op::Add),
        quantity_strategy().prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Balance = sum(added) - sum(removed); history mirrors each success
    #[test]
    fn prop_add_remove_conserves_balance(
        first in quantity_strategy(),
        ops in prop::collection::vec(op_strategy(), 0..30)
    ) {
        tokio_test::block_on(async move {
            let ledger = service();
            let key = LedgerKey::new(Stage::Draw, "a", "wire");
            let record = ledger
                .add(USER, add(Stage::Draw, "a", "wire", &first.to_string(), "0"))
                .await
                .unwrap();

            let mut expected = first;
            let mut snapshots = vec![expected];

            for op in ops {
                match op {
                    Op::Add(q) => {
                        let r = ledger
                            .add(USER, add(Stage::Draw, "a", "wire", &q.to_string(), "0"))
                            .await
                            .unwrap();
                        expected += q;
                        prop_assert_eq!(r.quantity, expected);
                        snapshots.push(expected);
                    }
                    Op::Remove(q) => {
                        let result = ledger
                            .remove(USER, remove(Stage::Draw, "a", "wire", &q.to_string()))
                            .await;
                        if q > expected {
                            let is_insufficient =
                                matches!(result, Err(AppError::InsufficientQuantity { .. }));
                            prop_assert!(is_insufficient);
                        } else {
                            let r = result.unwrap();
                            expected -= q;
                            prop_assert_eq!(r.quantity, expected);
                            snapshots.push(expected);
                        }
                    }
                }
                let current = ledger.find(&key).await.unwrap();
                prop_assert!(current.quantity >= Decimal::ZERO);
                prop_assert_eq!(current.quantity, expected);
            }

            let history = ledger.history(record.id).await.unwrap();
            prop_assert_eq!(history.len(), snapshots.len());
            for (entry, balance) in history.iter().zip(snapshots.iter()) {
                prop_assert!(entry.is_consistent());
                prop_assert_eq!(entry.new_quantity, *balance);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// A transfer moves exactly the requested quantity or nothing at all
    #[test]
    fn prop_transfer_moves_exact_quantity(
        initial in quantity_strategy(),
        requested in quantity_strategy()
    ) {
        tokio_test::block_on(async move {
            let ledger = service();
            ledger
                .add(USER, add(Stage::ReadyCopper, "a", "bare", &initial.to_string(), "0"))
                .await
                .unwrap();

            let result = ledger
                .return_to_next_stage(
                    USER,
                    transfer(Stage::ReadyCopper, "a", "bare", "b", "bare", &requested.to_string()),
                )
                .await;

            let records = ledger.list(&RecordFilter::default()).await.unwrap();
            let total: Decimal = records.iter().map(|r| r.quantity).sum();
            prop_assert_eq!(total, initial);

            if requested > initial {
                let is_insufficient = matches!(result, Err(AppError::InsufficientQuantity { .. }));
                prop_assert!(is_insufficient);
                prop_assert_eq!(records.len(), 1);
            } else {
                let outcome = result.unwrap();
                prop_assert_eq!(outcome.source.quantity, initial - requested);
                prop_assert_eq!(outcome.destination.quantity, requested);
                prop_assert_eq!(outcome.destination.stage, Stage::PvcPurchase);
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
