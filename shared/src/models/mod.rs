//! Domain models for the Agro Inventory Platform

mod client;
mod consumption;
mod dosification;
mod movement;
mod order;
mod product;
mod protocol;

pub use client::*;
pub use consumption::*;
pub use dosification::*;
pub use movement::*;
pub use order::*;
pub use product::*;
pub use protocol::*;
