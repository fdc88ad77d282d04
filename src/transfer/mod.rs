//! Inventory Transfer workflow
//!
//! Moves stock between two stores of one organization.
//!
//! # State Machine
//!
//! ```text
//! DRAFT → PENDING → APPROVED → DELIVERED
//!            ↓
//!         REJECTED
//! ```
//!
//! - **Approve** takes the shipped quantities out of the source store.
//! - **Deliver** puts them into the destination store.
//! - Recipe lines are expanded into raw items by the [`reconciler`].
//!
//! # Invariants
//!
//! 1. **One unit of work per transition**: status, lines, drivers and stock
//!    commit together or not at all
//! 2. **No negative stock**: the [`ledger`] rejects, never clamps
//! 3. **Status CAS**: a transition only lands if the status it started from
//!    is still current

pub mod audit;
pub mod coordinator;
pub mod error;
pub mod fixtures;
pub mod ledger;
pub mod reconciler;
pub mod state;
pub mod store;
pub mod types;


// Re-exports for convenience
pub use audit::{AuditSink, MemoryAuditSink, TracingAuditSink, TransitionEvent};
pub use coordinator::TransferCoordinator;
pub use error::TransferError;
pub use fixtures::SeedData;
pub use reconciler::{RecipeCatalog, StaticCatalog, reconcile};
pub use state::TransferStatus;
pub use store::{MemoryTransferStore, PgTransferStore, TransferStore, UnitOfWork};
pub use types::{
    ApprovalRequest, CreateTransferRequest, DistributedItems, Driver, DriverSelection,
    Ingredient, ItemQuantity, Line, Paging, RecipeQuantity, StockLevel, Store, Transfer,
    TransferDetail, TransferFilter, TransferItem, UpdateTransferRequest,
};
