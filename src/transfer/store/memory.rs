//! In-memory transfer store
//!
//! All units of work are serialized by one async mutex. A unit of work
//! mutates a staged copy of the state; commit swaps it in, drop discards it.
//! Recipes belong to the catalog, not to the transactional state, and sit
//! behind their own lock so they can be read while a unit of work is open.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use super::{TransferStore, UnitOfWork};
use crate::core_types::{
    DriverId, InventoryItemId, Quantity, RecipeId, StoreId, TransferId, TransferItemId,
};
use crate::transfer::error::TransferError;
use crate::transfer::reconciler::RecipeCatalog;
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{
    Driver, Ingredient, Line, NewTransfer, Paging, StockLevel, Store, Transfer, TransferFilter,
    TransferItem,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    transfers: BTreeMap<TransferId, Transfer>,
    items: Vec<TransferItem>,
    drivers: BTreeMap<DriverId, Driver>,
    stores: BTreeMap<StoreId, Store>,
    stock: BTreeMap<(StoreId, InventoryItemId), StockLevel>,
    last_transfer_id: TransferId,
    last_item_id: TransferItemId,
    last_driver_id: DriverId,
}

/// In-memory back end
#[derive(Clone, Default)]
pub struct MemoryTransferStore {
    state: Arc<Mutex<MemoryState>>,
    recipes: Arc<RwLock<HashMap<RecipeId, Vec<Ingredient>>>>,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_store(&self, store: Store) {
        self.state.lock().await.stores.insert(store.id, store);
    }

    pub async fn set_stock(&self, store_id: StoreId, item_id: InventoryItemId, quantity: Quantity) {
        let mut state = self.state.lock().await;
        upsert_stock(&mut state, store_id, item_id, quantity);
    }

    pub async fn add_stock_level(&self, level: StockLevel) {
        self.state
            .lock()
            .await
            .stock
            .insert((level.store_id, level.inventory_item_id), level);
    }

    pub fn add_recipe(&self, recipe_id: RecipeId, ingredients: Vec<Ingredient>) {
        match self.recipes.write() {
            Ok(mut recipes) => {
                recipes.insert(recipe_id, ingredients);
            }
            Err(_) => warn!(
                recipe_id = recipe_id,
                "Recipe catalog lock poisoned; recipe not added"
            ),
        }
    }

    pub async fn add_driver(&self, driver: Driver) {
        let mut state = self.state.lock().await;
        state.last_driver_id = state.last_driver_id.max(driver.id);
        state.drivers.insert(driver.id, driver);
    }

    /// Drivers registered for a store, in id order
    pub async fn drivers_for_store(&self, store_id: StoreId) -> Vec<Driver> {
        self.state
            .lock()
            .await
            .drivers
            .values()
            .filter(|d| d.store_id == store_id)
            .cloned()
            .collect()
    }

    /// Every stock row, in `(store, item)` order
    pub async fn stock_snapshot(&self) -> Vec<StockLevel> {
        self.state.lock().await.stock.values().copied().collect()
    }

    /// Make the next commits fail, to exercise rollback paths
    pub fn set_fail_commit(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }
}

fn upsert_stock(
    state: &mut MemoryState,
    store_id: StoreId,
    item_id: InventoryItemId,
    quantity: Quantity,
) {
    state
        .stock
        .entry((store_id, item_id))
        .and_modify(|l| l.quantity_on_hand = quantity)
        .or_insert(StockLevel {
            store_id,
            inventory_item_id: item_id,
            quantity_on_hand: quantity,
            minimum_quantity: Quantity::ZERO,
        });
}

#[async_trait]
impl RecipeCatalog for MemoryTransferStore {
    async fn ingredients(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Option<Vec<Ingredient>>, TransferError> {
        let recipes = self
            .recipes
            .read()
            .map_err(|_| TransferError::SystemError("recipe catalog lock poisoned".to_string()))?;
        Ok(recipes.get(&recipe_id).cloned())
    }
}

#[async_trait]
impl TransferStore for MemoryTransferStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransferError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard: Some(guard),
            staged,
            fail_commit: self.fail_commit.clone(),
        }))
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Option<Transfer>, TransferError> {
        Ok(self.state.lock().await.transfers.get(&id).cloned())
    }

    async fn get_items(&self, id: TransferId) -> Result<Vec<TransferItem>, TransferError> {
        Ok(items_of(&*self.state.lock().await, id))
    }

    async fn list_transfers(
        &self,
        filter: &TransferFilter,
        paging: Paging,
    ) -> Result<(Vec<Transfer>, u64), TransferError> {
        let state = self.state.lock().await;
        let mut matched: Vec<&Transfer> =
            state.transfers.values().filter(|t| filter.matches(t)).collect();
        matched.sort_by(|a, b| {
            b.requested_at
                .cmp(&a.requested_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matched.len() as u64;
        let page = matched
            .into_iter()
            .skip(paging.offset() as usize)
            .take(paging.limit() as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>, TransferError> {
        Ok(self.state.lock().await.stores.get(&id).cloned())
    }

    async fn stock_level(
        &self,
        store_id: StoreId,
        item_id: InventoryItemId,
    ) -> Result<Option<StockLevel>, TransferError> {
        Ok(self.state.lock().await.stock.get(&(store_id, item_id)).copied())
    }

    async fn health_check(&self) -> Result<(), TransferError> {
        Ok(())
    }
}

fn items_of(state: &MemoryState, id: TransferId) -> Vec<TransferItem> {
    state
        .items
        .iter()
        .filter(|i| i.transfer_id == id)
        .cloned()
        .collect()
}

struct MemoryUnitOfWork {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    staged: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryUnitOfWork {
    fn ensure_open(&self) -> Result<(), TransferError> {
        if self.guard.is_none() {
            return Err(TransferError::SystemError(
                "unit of work already committed".to_string(),
            ));
        }
        Ok(())
    }

    fn push_lines(&mut self, id: TransferId, lines: &[Line], is_requested: bool) {
        for line in lines {
            self.staged.last_item_id += 1;
            let item_id = self.staged.last_item_id;
            self.staged.items.push(TransferItem {
                id: item_id,
                transfer_id: id,
                line: *line,
                is_requested,
            });
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, TransferError> {
        self.ensure_open()?;
        Ok(self.staged.transfers.get(&id).cloned())
    }

    async fn insert_transfer(&mut self, new: &NewTransfer) -> Result<TransferId, TransferError> {
        self.ensure_open()?;
        self.staged.last_transfer_id += 1;
        let id = self.staged.last_transfer_id;
        self.staged.transfers.insert(
            id,
            Transfer {
                id,
                from_store_id: new.from_store_id,
                to_store_id: new.to_store_id,
                status: new.status,
                requested_at: new.requested_at,
                received_at: None,
                notes: new.notes.clone(),
                driver_id: None,
                driver_name: None,
                driver_email: None,
                requested_by_user_id: new.requested_by_user_id,
                approved_by_user_id: None,
            },
        );
        Ok(id)
    }

    async fn replace_requested_items(
        &mut self,
        id: TransferId,
        lines: &[Line],
    ) -> Result<(), TransferError> {
        self.ensure_open()?;
        self.staged
            .items
            .retain(|i| !(i.transfer_id == id && i.is_requested));
        self.push_lines(id, lines, true);
        Ok(())
    }

    async fn append_items(
        &mut self,
        id: TransferId,
        lines: &[Line],
        is_requested: bool,
    ) -> Result<(), TransferError> {
        self.ensure_open()?;
        self.push_lines(id, lines, is_requested);
        Ok(())
    }

    async fn load_items(&mut self, id: TransferId) -> Result<Vec<TransferItem>, TransferError> {
        self.ensure_open()?;
        Ok(items_of(&self.staged, id))
    }

    async fn update_transfer_if(
        &mut self,
        expected: TransferStatus,
        transfer: &Transfer,
    ) -> Result<bool, TransferError> {
        self.ensure_open()?;
        match self.staged.transfers.get_mut(&transfer.id) {
            Some(current) if current.status == expected => {
                *current = transfer.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_driver(&mut self, id: DriverId) -> Result<Option<Driver>, TransferError> {
        self.ensure_open()?;
        Ok(self.staged.drivers.get(&id).cloned())
    }

    async fn create_driver(
        &mut self,
        store_id: StoreId,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Driver, TransferError> {
        self.ensure_open()?;
        self.staged.last_driver_id += 1;
        let driver = Driver {
            id: self.staged.last_driver_id,
            store_id,
            name: name.map(str::to_string),
            email: email.map(str::to_string),
        };
        self.staged.drivers.insert(driver.id, driver.clone());
        Ok(driver)
    }

    async fn store_exists(&mut self, id: StoreId) -> Result<bool, TransferError> {
        self.ensure_open()?;
        Ok(self.staged.stores.contains_key(&id))
    }

    async fn lock_stock(
        &mut self,
        store_id: StoreId,
        item_id: InventoryItemId,
    ) -> Result<Option<Quantity>, TransferError> {
        self.ensure_open()?;
        Ok(self
            .staged
            .stock
            .get(&(store_id, item_id))
            .map(|l| l.quantity_on_hand))
    }

    async fn write_stock(
        &mut self,
        store_id: StoreId,
        item_id: InventoryItemId,
        quantity_on_hand: Quantity,
    ) -> Result<(), TransferError> {
        self.ensure_open()?;
        if quantity_on_hand < Quantity::ZERO {
            return Err(TransferError::SystemError(format!(
                "negative stock for item {} at store {}",
                item_id, store_id
            )));
        }
        upsert_stock(&mut self.staged, store_id, item_id, quantity_on_hand);
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), TransferError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(TransferError::DatabaseError(
                "injected commit failure".to_string(),
            ));
        }
        let mut guard = self.guard.take().ok_or_else(|| {
            TransferError::SystemError("unit of work already committed".to_string())
        })?;
        *guard = std::mem::take(&mut self.staged);
        debug!("Memory unit of work committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn new_transfer(from: StoreId, to: StoreId, day: u32) -> NewTransfer {
        NewTransfer {
            from_store_id: Some(from),
            to_store_id: to,
            status: TransferStatus::Pending,
            requested_at: Utc.with_ymd_and_hms(2026, 5, day, 9, 0, 0).unwrap(),
            notes: None,
            requested_by_user_id: 1,
        }
    }

    #[tokio::test]
    async fn test_commit_publishes_staged_state() {
        let store = MemoryTransferStore::new();
        let mut uow = store.begin().await.unwrap();
        let id = uow.insert_transfer(&new_transfer(1, 2, 1)).await.unwrap();
        uow.append_items(id, &[Line::item(10, 3)], true).await.unwrap();

        // Not visible before commit
        drop(uow);
        assert!(store.get_transfer(id).await.unwrap().is_none());

        let mut uow = store.begin().await.unwrap();
        let id = uow.insert_transfer(&new_transfer(1, 2, 1)).await.unwrap();
        uow.append_items(id, &[Line::item(10, 3)], true).await.unwrap();
        uow.commit().await.unwrap();
        drop(uow);

        assert!(store.get_transfer(id).await.unwrap().is_some());
        assert_eq!(store.get_items(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_twice_fails() {
        let store = MemoryTransferStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.commit().await.unwrap();
        assert!(matches!(
            uow.commit().await,
            Err(TransferError::SystemError(_))
        ));
        assert!(uow.lock_transfer(1).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_commit_failure_discards_work() {
        let store = MemoryTransferStore::new();
        store.set_fail_commit(true);
        let mut uow = store.begin().await.unwrap();
        uow.write_stock(1, 10, Decimal::from(9)).await.unwrap();
        assert!(uow.commit().await.is_err());
        drop(uow);
        store.set_fail_commit(false);
        assert!(store.stock_level(1, 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_requested_items_keeps_shipped_lines() {
        let store = MemoryTransferStore::new();
        let mut uow = store.begin().await.unwrap();
        let id = uow.insert_transfer(&new_transfer(1, 2, 1)).await.unwrap();
        uow.append_items(id, &[Line::item(10, 3), Line::item(11, 1)], true)
            .await
            .unwrap();
        uow.append_items(id, &[Line::item(10, 2)], false).await.unwrap();
        uow.replace_requested_items(id, &[Line::recipe(5, 4)])
            .await
            .unwrap();

        let items = uow.load_items(id).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().any(|i| !i.is_requested && i.line == Line::item(10, 2)));
        assert!(items.iter().any(|i| i.is_requested && i.line == Line::recipe(5, 4)));
    }

    #[tokio::test]
    async fn test_update_transfer_if_is_cas() {
        let store = MemoryTransferStore::new();
        let mut uow = store.begin().await.unwrap();
        let id = uow.insert_transfer(&new_transfer(1, 2, 1)).await.unwrap();
        let mut t = uow.lock_transfer(id).await.unwrap().unwrap();
        t.status = TransferStatus::Rejected;

        assert!(!uow.update_transfer_if(TransferStatus::Draft, &t).await.unwrap());
        assert!(uow.update_transfer_if(TransferStatus::Pending, &t).await.unwrap());
        assert!(!uow.update_transfer_if(TransferStatus::Pending, &t).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_stock_refuses_negative() {
        let store = MemoryTransferStore::new();
        let mut uow = store.begin().await.unwrap();
        assert!(uow.write_stock(1, 1, Decimal::from(-1)).await.is_err());
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_and_pages() {
        let store = MemoryTransferStore::new();
        let mut uow = store.begin().await.unwrap();
        for day in 1..=5 {
            uow.insert_transfer(&new_transfer(1, 2, day)).await.unwrap();
        }
        uow.insert_transfer(&new_transfer(3, 4, 6)).await.unwrap();
        uow.commit().await.unwrap();
        drop(uow);

        let filter = TransferFilter {
            store_id: Some(2),
            ..Default::default()
        };
        let (page, total) = store.list_transfers(&filter, Paging::new(1, 2)).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.iter().map(|t| t.id).collect::<Vec<_>>(), vec![5, 4]);

        let (page, _) = store.list_transfers(&filter, Paging::new(3, 2)).await.unwrap();
        assert_eq!(page.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);

        let filter = TransferFilter {
            requested_to: Some(Utc.with_ymd_and_hms(2026, 5, 2, 9, 0, 0).unwrap() + Duration::seconds(1)),
            ..Default::default()
        };
        let (_, total) = store.list_transfers(&filter, Paging::default()).await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_create_driver_ids_follow_seeded_drivers() {
        let store = MemoryTransferStore::new();
        store
            .add_driver(Driver {
                id: 7,
                store_id: 1,
                name: Some("Ana".into()),
                email: None,
            })
            .await;
        let mut uow = store.begin().await.unwrap();
        let d = uow.create_driver(1, Some("Bo"), None).await.unwrap();
        assert_eq!(d.id, 8);
        assert_eq!(uow.get_driver(7).await.unwrap().unwrap().name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn test_poisoned_recipe_lock_is_reported() {
        let store = MemoryTransferStore::new();
        store.add_recipe(7, vec![]);
        let recipes = store.recipes.clone();
        let _ = std::thread::spawn(move || {
            let _guard = recipes.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();

        // Adding logs and moves on; reading surfaces the failure
        store.add_recipe(8, vec![]);
        assert!(matches!(
            store.ingredients(7).await,
            Err(TransferError::SystemError(_))
        ));
    }
}
