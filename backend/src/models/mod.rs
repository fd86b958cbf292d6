//! Domain models
//!
//! Re-exports the models shared with the WASM module

pub use shared::models::*;
