//! Shared types and domain logic for the Agro Inventory Platform
//!
//! This crate contains the models and the pure stock, dosification and
//! consumption algorithms shared between the backend, the frontend (via WASM),
//! and the test suites.

pub mod consumption;
pub mod dosing;
pub mod error;
pub mod ledger;
pub mod models;
pub mod orders;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
