//! Domain models for the copper wire inventory ledger

mod inventory;
mod stage;

pub use inventory::*;
pub use stage::*;
