//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// Store ID - a physical store/location owned by an organization.
///
/// Both sides of a transfer resolve to a store. Store records themselves
/// belong to the surrounding back-office; this crate only reads them.
pub type StoreId = i64;

/// Inventory item ID - a raw stock-keeping item (flour, cheese, cups, ...).
///
/// Stock is tracked per `(StoreId, InventoryItemId)` pair.
pub type InventoryItemId = i64;

/// Recipe ID - a catalog recipe made of inventory items.
pub type RecipeId = i64;

/// User ID - the acting user of a transition (requester, approver, receiver).
pub type UserId = i64;

/// Driver ID - a driver record scoped to a store.
pub type DriverId = i64;

/// Transfer ID - primary key of a transfer record
pub type TransferId = i64;

/// Transfer item ID - primary key of a transfer line
pub type TransferItemId = i64;

/// Quantity of stock. Always a decimal, never a float.
pub type Quantity = rust_decimal::Decimal;
