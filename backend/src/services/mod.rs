//! Business logic services for the copper ledger

pub mod ledger;
pub mod locks;

pub use ledger::{
    AddStockInput, DeleteItemInput, LedgerService, RemoveStockInput, ReturnToNextStageInput,
};
pub use locks::KeyedLocks;
