//! Inventory Transfer - move stock between the stores of one organization
//!
//! # Modules
//!
//! - [`core_types`] - Identifier and quantity aliases
//! - [`transfer`] - State machine, reconciler, ledger, storage and audit events
//! - [`gateway`] - axum HTTP API with OpenAPI docs
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`db`] - PostgreSQL pool

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod transfer;

// Convenient re-exports at crate root
pub use core_types::{
    DriverId, InventoryItemId, Quantity, RecipeId, StoreId, TransferId, TransferItemId, UserId,
};
pub use transfer::{TransferCoordinator, TransferError, TransferStatus};
