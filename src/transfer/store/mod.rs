//! Transfer Record Store
//!
//! Storage seam for transfers, their lines, drivers and per-store stock.
//!
//! Every state-machine transition runs inside one [`UnitOfWork`]: either
//! everything it wrote is committed, or nothing is. Dropping a unit of work
//! without calling [`UnitOfWork::commit`] rolls it back.
//!
//! Back ends:
//! - [`MemoryTransferStore`] - in-process, serialized by an async mutex
//! - [`PgTransferStore`] - PostgreSQL via `sqlx` transactions and row locks

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryTransferStore;
pub use postgres::PgTransferStore;

use async_trait::async_trait;

use super::error::TransferError;
use super::reconciler::RecipeCatalog;
use super::state::TransferStatus;
use super::types::{
    Driver, Line, NewTransfer, Paging, StockLevel, Store, Transfer, TransferFilter, TransferItem,
};
use crate::core_types::{DriverId, InventoryItemId, Quantity, StoreId, TransferId};

/// Read side plus the entry point to a unit of work
#[async_trait]
pub trait TransferStore: RecipeCatalog {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Open a unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransferError>;

    async fn get_transfer(&self, id: TransferId) -> Result<Option<Transfer>, TransferError>;

    /// All lines of a transfer, requested and shipped, in insertion order
    async fn get_items(&self, id: TransferId) -> Result<Vec<TransferItem>, TransferError>;

    /// Filtered page plus the total count matching the filter
    async fn list_transfers(
        &self,
        filter: &TransferFilter,
        paging: Paging,
    ) -> Result<(Vec<Transfer>, u64), TransferError>;

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>, TransferError>;

    async fn stock_level(
        &self,
        store_id: StoreId,
        item_id: InventoryItemId,
    ) -> Result<Option<StockLevel>, TransferError>;

    /// Cheap liveness probe
    async fn health_check(&self) -> Result<(), TransferError>;
}

/// One atomic unit of work
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read a transfer and hold it against concurrent transitions until commit
    async fn lock_transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, TransferError>;

    async fn insert_transfer(&mut self, new: &NewTransfer) -> Result<TransferId, TransferError>;

    /// Delete every requested line of the transfer and insert `lines` as
    /// requested lines. No diffing.
    async fn replace_requested_items(
        &mut self,
        id: TransferId,
        lines: &[Line],
    ) -> Result<(), TransferError>;

    async fn append_items(
        &mut self,
        id: TransferId,
        lines: &[Line],
        is_requested: bool,
    ) -> Result<(), TransferError>;

    async fn load_items(&mut self, id: TransferId) -> Result<Vec<TransferItem>, TransferError>;

    /// Compare-and-swap: write every mutable field of `transfer` only if the
    /// stored status is still `expected`. Returns false on a CAS miss.
    async fn update_transfer_if(
        &mut self,
        expected: TransferStatus,
        transfer: &Transfer,
    ) -> Result<bool, TransferError>;

    async fn get_driver(&mut self, id: DriverId) -> Result<Option<Driver>, TransferError>;

    async fn create_driver(
        &mut self,
        store_id: StoreId,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Driver, TransferError>;

    async fn store_exists(&mut self, id: StoreId) -> Result<bool, TransferError>;

    /// Current quantity on hand, locked for update. `None` if the store never held the item.
    async fn lock_stock(
        &mut self,
        store_id: StoreId,
        item_id: InventoryItemId,
    ) -> Result<Option<Quantity>, TransferError>;

    /// Upsert quantity on hand. Only the ledger calls this.
    async fn write_stock(
        &mut self,
        store_id: StoreId,
        item_id: InventoryItemId,
        quantity_on_hand: Quantity,
    ) -> Result<(), TransferError>;

    async fn commit(&mut self) -> Result<(), TransferError>;
}
