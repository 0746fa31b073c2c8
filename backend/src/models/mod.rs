//! Domain models for the copper ledger
//!
//! Re-exports models and validation rules from the shared crate

pub use shared::models::*;
pub use shared::types::*;
pub use shared::validation::*;
