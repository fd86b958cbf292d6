//! HTTP handlers

pub mod dosification;
pub mod health;
pub mod inventory;
pub mod order;
pub mod protocol;
pub mod reporting;

pub use dosification::*;
pub use health::*;
pub use inventory::*;
pub use order::*;
pub use protocol::*;
pub use reporting::*;
