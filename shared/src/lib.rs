//! Shared types and models for the copper wire inventory ledger
//!
//! This crate contains the ledger domain (stages, records, history) and the
//! validation rules shared by the backend and its API clients.

pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
