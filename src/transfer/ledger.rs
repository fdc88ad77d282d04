//! Inventory Ledger
//!
//! The only code that changes `quantity_on_hand`. Every call runs inside a
//! unit of work opened by the coordinator, so a failure anywhere in the
//! transition rolls the ledger back with it.

use rust_decimal::Decimal;
use tracing::debug;

use super::error::TransferError;
use super::store::UnitOfWork;
use super::types::{ItemQuantity, add_quantity};
use crate::core_types::{InventoryItemId, Quantity, StoreId};

/// Decrease stock of one item. Fails if `amount` exceeds what is on hand;
/// never clamps to zero.
pub async fn decrement(
    uow: &mut dyn UnitOfWork,
    store_id: StoreId,
    item_id: InventoryItemId,
    amount: Quantity,
) -> Result<Quantity, TransferError> {
    decrement_all(uow, store_id, &[ItemQuantity::new(item_id, amount)])
        .await
        .map(|after| after[0].quantity)
}

/// Increase stock of one item, creating the row if the store never held it.
pub async fn increment(
    uow: &mut dyn UnitOfWork,
    store_id: StoreId,
    item_id: InventoryItemId,
    amount: Quantity,
) -> Result<Quantity, TransferError> {
    increment_all(uow, store_id, &[ItemQuantity::new(item_id, amount)])
        .await
        .map(|after| after[0].quantity)
}

/// Decrease stock of several items, all or nothing.
///
/// Rows are locked in ascending item order and every row is checked before
/// any is written. Returns the quantities on hand after the write, in lock order.
pub async fn decrement_all(
    uow: &mut dyn UnitOfWork,
    store_id: StoreId,
    deltas: &[ItemQuantity],
) -> Result<Vec<ItemQuantity>, TransferError> {
    let locked = lock_in_order(uow, store_id, deltas).await?;

    let mut after = Vec::with_capacity(locked.len());
    for (delta, on_hand) in &locked {
        if delta.quantity > *on_hand {
            return Err(TransferError::InsufficientStock {
                store_id,
                item_id: delta.inventory_item_id,
                required: delta.quantity,
                available: *on_hand,
            });
        }
        after.push(ItemQuantity::new(
            delta.inventory_item_id,
            *on_hand - delta.quantity,
        ));
    }

    write_all(uow, store_id, &after).await?;
    Ok(after)
}

/// Increase stock of several items. Same lock order as [`decrement_all`].
pub async fn increment_all(
    uow: &mut dyn UnitOfWork,
    store_id: StoreId,
    deltas: &[ItemQuantity],
) -> Result<Vec<ItemQuantity>, TransferError> {
    let locked = lock_in_order(uow, store_id, deltas).await?;

    let mut after = Vec::with_capacity(locked.len());
    for (delta, on_hand) in &locked {
        after.push(ItemQuantity::new(
            delta.inventory_item_id,
            add_quantity(*on_hand, delta.quantity)?,
        ));
    }

    write_all(uow, store_id, &after).await?;
    Ok(after)
}

/// Validate, merge and lock. A missing row counts as zero on hand.
async fn lock_in_order(
    uow: &mut dyn UnitOfWork,
    store_id: StoreId,
    deltas: &[ItemQuantity],
) -> Result<Vec<(ItemQuantity, Quantity)>, TransferError> {
    let mut sorted: Vec<ItemQuantity> = Vec::with_capacity(deltas.len());
    for delta in deltas {
        if delta.quantity <= Decimal::ZERO {
            return Err(TransferError::Validation(format!(
                "stock adjustment for item {} must be positive, got {}",
                delta.inventory_item_id, delta.quantity
            )));
        }
        match sorted
            .iter_mut()
            .find(|q| q.inventory_item_id == delta.inventory_item_id)
        {
            Some(existing) => {
                existing.quantity = add_quantity(existing.quantity, delta.quantity)?
            }
            None => sorted.push(*delta),
        }
    }
    sorted.sort_by_key(|q| q.inventory_item_id);

    let mut locked = Vec::with_capacity(sorted.len());
    for delta in sorted {
        let on_hand = uow
            .lock_stock(store_id, delta.inventory_item_id)
            .await?
            .unwrap_or(Decimal::ZERO);
        locked.push((delta, on_hand));
    }
    Ok(locked)
}

async fn write_all(
    uow: &mut dyn UnitOfWork,
    store_id: StoreId,
    levels: &[ItemQuantity],
) -> Result<(), TransferError> {
    for level in levels {
        debug!(
            store_id = store_id,
            item_id = level.inventory_item_id,
            quantity_on_hand = %level.quantity,
            "Ledger write"
        );
        uow.write_stock(store_id, level.inventory_item_id, level.quantity)
            .await?;
    }
    Ok(())
}
