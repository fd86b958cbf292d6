//! Business logic services for the agro-input inventory

pub mod dosification;
pub mod inventory;
pub mod order;
pub mod protocol;
pub mod reporting;
pub mod retry;

pub use dosification::DosificationService;
pub use inventory::InventoryService;
pub use order::OrderService;
pub use protocol::ProtocolService;
pub use reporting::ReportingService;
pub use retry::StorePolicy;
