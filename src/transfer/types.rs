//! Transfer Core Types
//!
//! Type definitions for the inventory transfer FSM.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::TransferError;
use super::state::TransferStatus;
use crate::core_types::{
    DriverId, InventoryItemId, Quantity, RecipeId, StoreId, TransferId, TransferItemId, UserId,
};

/// One line of a transfer: either a raw inventory item or a recipe.
///
/// Both-or-neither is not representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
    Item {
        inventory_item_id: InventoryItemId,
        quantity: Quantity,
    },
    Recipe {
        recipe_id: RecipeId,
        quantity: Quantity,
    },
}

impl Line {
    pub fn item(inventory_item_id: InventoryItemId, quantity: impl Into<Quantity>) -> Self {
        Line::Item {
            inventory_item_id,
            quantity: quantity.into(),
        }
    }

    pub fn recipe(recipe_id: RecipeId, quantity: impl Into<Quantity>) -> Self {
        Line::Recipe {
            recipe_id,
            quantity: quantity.into(),
        }
    }

    #[inline]
    pub fn quantity(&self) -> Quantity {
        match self {
            Line::Item { quantity, .. } | Line::Recipe { quantity, .. } => *quantity,
        }
    }

    #[inline]
    pub fn inventory_item_id(&self) -> Option<InventoryItemId> {
        match self {
            Line::Item {
                inventory_item_id, ..
            } => Some(*inventory_item_id),
            Line::Recipe { .. } => None,
        }
    }

    #[inline]
    pub fn recipe_id(&self) -> Option<RecipeId> {
        match self {
            Line::Recipe { recipe_id, .. } => Some(*recipe_id),
            Line::Item { .. } => None,
        }
    }

    /// Build a line from the two nullable columns used by storage and the API.
    pub fn from_parts(
        inventory_item_id: Option<InventoryItemId>,
        recipe_id: Option<RecipeId>,
        quantity: Quantity,
    ) -> Result<Self, TransferError> {
        match (inventory_item_id, recipe_id) {
            (Some(inventory_item_id), None) => Ok(Line::Item {
                inventory_item_id,
                quantity,
            }),
            (None, Some(recipe_id)) => Ok(Line::Recipe {
                recipe_id,
                quantity,
            }),
            (Some(_), Some(_)) => Err(TransferError::validation(
                "a line cannot reference both an inventory item and a recipe",
            )),
            (None, None) => Err(TransferError::validation(
                "a line must reference an inventory item or a recipe",
            )),
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Item {
                inventory_item_id,
                quantity,
            } => write!(f, "item {} x {}", inventory_item_id, quantity),
            Line::Recipe {
                recipe_id,
                quantity,
            } => write!(f, "recipe {} x {}", recipe_id, quantity),
        }
    }
}

/// Reject an empty line set or any non-positive quantity
pub fn validate_lines(lines: &[Line]) -> Result<(), TransferError> {
    if lines.is_empty() {
        return Err(TransferError::validation("at least one line is required"));
    }
    if let Some(bad) = lines.iter().find(|l| l.quantity() <= Decimal::ZERO) {
        return Err(TransferError::Validation(format!(
            "quantity must be greater than zero ({})",
            bad
        )));
    }
    for line in lines {
        check_storable(line.quantity())?;
    }
    Ok(())
}

/// Decimal places a stored quantity keeps (`NUMERIC(20, 6)`)
pub const QUANTITY_SCALE: u32 = 6;

/// Largest quantity a stock row or transfer line can hold
pub fn max_quantity() -> Quantity {
    Decimal::from_i128_with_scale(99_999_999_999_999_999_999, QUANTITY_SCALE)
}

/// Reject quantities the storage column would overflow or round
pub fn check_storable(quantity: Quantity) -> Result<Quantity, TransferError> {
    if quantity.abs() > max_quantity() {
        return Err(TransferError::Validation(format!(
            "quantity {} exceeds the maximum of {}",
            quantity,
            max_quantity()
        )));
    }
    if quantity.normalize().scale() > QUANTITY_SCALE {
        return Err(TransferError::Validation(format!(
            "quantity {} has more than {} decimal places",
            quantity, QUANTITY_SCALE
        )));
    }
    Ok(quantity)
}

/// `a + b`, failing instead of overflowing
pub fn add_quantity(a: Quantity, b: Quantity) -> Result<Quantity, TransferError> {
    let sum = a.checked_add(b).ok_or_else(|| {
        TransferError::Validation(format!("quantity {} + {} overflows", a, b))
    })?;
    check_storable(sum)
}

/// `a * b` rounded to [`QUANTITY_SCALE`], failing instead of overflowing
pub fn mul_quantity(a: Quantity, b: Quantity) -> Result<Quantity, TransferError> {
    let product = a.checked_mul(b).ok_or_else(|| {
        TransferError::Validation(format!("quantity {} x {} overflows", a, b))
    })?;
    check_storable(product.round_dp(QUANTITY_SCALE))
}

/// Persisted transfer line
#[derive(Debug, Clone, PartialEq)]
pub struct TransferItem {
    pub id: TransferItemId,
    pub transfer_id: TransferId,
    pub line: Line,
    /// `true` = what was asked for, `false` = what the approver shipped
    pub is_requested: bool,
}

/// Transfer record
#[derive(Debug, Clone, PartialEq)]
pub struct Transfer {
    pub id: TransferId,
    pub from_store_id: Option<StoreId>,
    /// The requesting (receiving) store
    pub to_store_id: StoreId,
    pub status: TransferStatus,
    pub requested_at: DateTime<Utc>,
    pub received_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub driver_id: Option<DriverId>,
    pub driver_name: Option<String>,
    pub driver_email: Option<String>,
    pub requested_by_user_id: UserId,
    pub approved_by_user_id: Option<UserId>,
}

impl fmt::Display for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = self
            .from_store_id
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "Transfer[{}] store {} -> store {} status={}",
            self.id, from, self.to_store_id, self.status
        )
    }
}

/// Row to insert when a transfer is created
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub from_store_id: Option<StoreId>,
    pub to_store_id: StoreId,
    pub status: TransferStatus,
    pub requested_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub requested_by_user_id: UserId,
}

/// Create request from the calling layer
#[derive(Debug, Clone)]
pub struct CreateTransferRequest {
    pub from_store_id: Option<StoreId>,
    /// The requesting store
    pub to_store_id: StoreId,
    /// Defaults to now
    pub requested_at: Option<DateTime<Utc>>,
    pub status: TransferStatus,
    pub notes: Option<String>,
    pub items: Vec<Line>,
}

impl CreateTransferRequest {
    pub fn new(from_store_id: Option<StoreId>, to_store_id: StoreId, items: Vec<Line>) -> Self {
        Self {
            from_store_id,
            to_store_id,
            requested_at: None,
            status: TransferStatus::Pending,
            notes: None,
            items,
        }
    }

    pub fn with_status(mut self, status: TransferStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Edit of a Draft/Pending transfer. Lines are replaced wholesale.
#[derive(Debug, Clone)]
pub struct UpdateTransferRequest {
    pub from_store_id: Option<StoreId>,
    pub status: TransferStatus,
    pub notes: Option<String>,
    pub items: Vec<Line>,
}

/// How the approver picks a driver
#[derive(Debug, Clone, PartialEq)]
pub enum DriverSelection {
    Existing(DriverId),
    /// Always creates a new driver scoped to the source store
    New {
        name: Option<String>,
        email: Option<String>,
    },
}

/// Approval input
#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub driver: Option<DriverSelection>,
    /// Only used when the transfer was created without a source store
    pub from_store_id: Option<StoreId>,
    pub items: Vec<Line>,
    pub notes: Option<String>,
}

impl ApprovalRequest {
    pub fn new(driver: DriverSelection, items: Vec<Line>) -> Self {
        Self {
            driver: Some(driver),
            from_store_id: None,
            items,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Driver record, scoped to a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub store_id: StoreId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Store as resolved from the store directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
    pub organization_id: i64,
}

/// One ingredient of a recipe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub inventory_item_id: InventoryItemId,
    pub quantity_per_unit: Quantity,
}

/// Net quantity of one inventory item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemQuantity {
    pub inventory_item_id: InventoryItemId,
    pub quantity: Quantity,
}

impl ItemQuantity {
    pub fn new(inventory_item_id: InventoryItemId, quantity: impl Into<Quantity>) -> Self {
        Self {
            inventory_item_id,
            quantity: quantity.into(),
        }
    }
}

/// Net quantity of one recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecipeQuantity {
    pub recipe_id: RecipeId,
    pub quantity: Quantity,
}

/// A transfer's lines split by kind
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributedItems {
    pub inventory: Vec<ItemQuantity>,
    pub recipes: Vec<RecipeQuantity>,
}

impl DistributedItems {
    /// Split lines into raw items and recipes, summing duplicates.
    /// Order is the first occurrence of each id.
    pub fn from_lines<'a>(
        lines: impl IntoIterator<Item = &'a Line>,
    ) -> Result<Self, TransferError> {
        let mut out = DistributedItems::default();
        for line in lines {
            match *line {
                Line::Item {
                    inventory_item_id,
                    quantity,
                } => match out
                    .inventory
                    .iter_mut()
                    .find(|q| q.inventory_item_id == inventory_item_id)
                {
                    Some(existing) => {
                        existing.quantity = add_quantity(existing.quantity, quantity)?
                    }
                    None => out.inventory.push(ItemQuantity {
                        inventory_item_id,
                        quantity,
                    }),
                },
                Line::Recipe {
                    recipe_id,
                    quantity,
                } => match out.recipes.iter_mut().find(|q| q.recipe_id == recipe_id) {
                    Some(existing) => {
                        existing.quantity = add_quantity(existing.quantity, quantity)?
                    }
                    None => out.recipes.push(RecipeQuantity {
                        recipe_id,
                        quantity,
                    }),
                },
            }
        }
        Ok(out)
    }

    /// Back to lines (raw items first), e.g. to feed the reconciler
    pub fn to_lines(&self) -> Vec<Line> {
        self.inventory
            .iter()
            .map(|q| Line::item(q.inventory_item_id, q.quantity))
            .chain(self.recipes.iter().map(|r| Line::recipe(r.recipe_id, r.quantity)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.inventory.is_empty() && self.recipes.is_empty()
    }
}

/// Stock of one item at one store
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
    pub store_id: StoreId,
    pub inventory_item_id: InventoryItemId,
    pub quantity_on_hand: Quantity,
    #[serde(default)]
    pub minimum_quantity: Quantity,
}

/// Transfer with everything a detail screen needs
#[derive(Debug, Clone, PartialEq)]
pub struct TransferDetail {
    pub transfer: Transfer,
    pub from_store: Option<Store>,
    pub to_store: Option<Store>,
    pub requested_items: Vec<TransferItem>,
    pub shipped_items: Vec<TransferItem>,
}

/// List filter. Every field is optional.
#[derive(Debug, Clone, Default)]
pub struct TransferFilter {
    /// Matches either side of the transfer
    pub store_id: Option<StoreId>,
    pub from_store_id: Option<StoreId>,
    pub to_store_id: Option<StoreId>,
    pub status: Option<TransferStatus>,
    pub requested_from: Option<DateTime<Utc>>,
    pub requested_to: Option<DateTime<Utc>>,
}

impl TransferFilter {
    pub fn matches(&self, t: &Transfer) -> bool {
        if let Some(store) = self.store_id
            && t.from_store_id != Some(store)
            && t.to_store_id != store
        {
            return false;
        }
        if self.from_store_id.is_some() && t.from_store_id != self.from_store_id {
            return false;
        }
        if let Some(to) = self.to_store_id
            && t.to_store_id != to
        {
            return false;
        }
        if let Some(status) = self.status
            && t.status != status
        {
            return false;
        }
        if let Some(from) = self.requested_from
            && t.requested_at < from
        {
            return false;
        }
        if let Some(to) = self.requested_to
            && t.requested_at > to
        {
            return false;
        }
        true
    }
}

/// 1-based paging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page: u32,
    pub page_size: u32,
}

impl Paging {
    pub const DEFAULT_PAGE_SIZE: u32 = 20;
    pub const MAX_PAGE_SIZE: u32 = 100;

    /// Clamp to page >= 1 and 1 <= page_size <= 100
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE),
        }
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.page_size as u64
    }

    #[inline]
    pub fn limit(&self) -> u64 {
        self.page_size as u64
    }
}

impl Default for Paging {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_PAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn transfer(id: TransferId, from: Option<StoreId>, to: StoreId) -> Transfer {
        Transfer {
            id,
            from_store_id: from,
            to_store_id: to,
            status: TransferStatus::Pending,
            requested_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            received_at: None,
            notes: None,
            driver_id: None,
            driver_name: None,
            driver_email: None,
            requested_by_user_id: 1,
            approved_by_user_id: None,
        }
    }

    #[test]
    fn test_line_from_parts() {
        let dec = Decimal::from(3);
        assert_eq!(
            Line::from_parts(Some(5), None, dec).unwrap(),
            Line::item(5, 3)
        );
        assert_eq!(
            Line::from_parts(None, Some(9), dec).unwrap(),
            Line::recipe(9, 3)
        );
        assert!(matches!(
            Line::from_parts(Some(5), Some(9), dec),
            Err(TransferError::Validation(_))
        ));
        assert!(matches!(
            Line::from_parts(None, None, dec),
            Err(TransferError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_lines() {
        assert!(validate_lines(&[Line::item(1, 1)]).is_ok());
        assert!(matches!(
            validate_lines(&[]),
            Err(TransferError::Validation(_))
        ));
        assert!(matches!(
            validate_lines(&[Line::item(1, 1), Line::recipe(2, 0)]),
            Err(TransferError::Validation(_))
        ));
        assert!(matches!(
            validate_lines(&[Line::item(1, -2)]),
            Err(TransferError::Validation(_))
        ));
        assert!(matches!(
            validate_lines(&[Line::item(1, Decimal::MAX)]),
            Err(TransferError::Validation(_))
        ));
        assert!(matches!(
            validate_lines(&[Line::item(1, Decimal::new(1, 7))]),
            Err(TransferError::Validation(_))
        ));
        // Trailing zeros beyond the scale are fine
        assert!(validate_lines(&[Line::item(1, Decimal::new(15_000_000, 7))]).is_ok());
        assert!(validate_lines(&[Line::item(1, max_quantity())]).is_ok());
    }

    #[test]
    fn test_quantity_arithmetic_never_panics() {
        assert!(matches!(
            add_quantity(Decimal::MAX, Decimal::MAX),
            Err(TransferError::Validation(_))
        ));
        assert!(matches!(
            mul_quantity(Decimal::MAX, Decimal::from(10)),
            Err(TransferError::Validation(_))
        ));
        assert!(matches!(
            add_quantity(max_quantity(), Decimal::ONE),
            Err(TransferError::Validation(_))
        ));
        assert_eq!(add_quantity(Decimal::from(2), Decimal::from(3)), Ok(Decimal::from(5)));
        // 1.5 x 0.3333333 = 0.49999995, kept at six places
        assert_eq!(
            mul_quantity(Decimal::new(15, 1), Decimal::new(3_333_333, 7)),
            Ok(Decimal::new(500_000, 6))
        );
    }

    #[test]
    fn test_distribute_rejects_overflowing_duplicates() {
        let lines = [Line::item(1, Decimal::MAX), Line::item(1, Decimal::MAX)];
        assert!(matches!(
            DistributedItems::from_lines(&lines),
            Err(TransferError::Validation(_))
        ));
    }

    #[test]
    fn test_distribute_merges_and_keeps_first_occurrence_order() {
        let lines = [
            Line::recipe(7, 2),
            Line::item(3, 1),
            Line::item(1, 4),
            Line::recipe(7, 1),
            Line::item(3, 5),
        ];
        let d = DistributedItems::from_lines(&lines).unwrap();
        assert_eq!(
            d.inventory,
            vec![ItemQuantity::new(3, 6), ItemQuantity::new(1, 4)]
        );
        assert_eq!(
            d.recipes,
            vec![RecipeQuantity {
                recipe_id: 7,
                quantity: Decimal::from(3)
            }]
        );
        assert_eq!(
            d.to_lines(),
            vec![Line::item(3, 6), Line::item(1, 4), Line::recipe(7, 3)]
        );
    }

    #[test]
    fn test_filter_matches() {
        let t = transfer(1, Some(1), 2);

        assert!(TransferFilter::default().matches(&t));
        assert!(
            TransferFilter {
                store_id: Some(1),
                ..Default::default()
            }
            .matches(&t)
        );
        assert!(
            TransferFilter {
                store_id: Some(2),
                ..Default::default()
            }
            .matches(&t)
        );
        assert!(
            !TransferFilter {
                store_id: Some(3),
                ..Default::default()
            }
            .matches(&t)
        );
        assert!(
            !TransferFilter {
                status: Some(TransferStatus::Approved),
                ..Default::default()
            }
            .matches(&t)
        );
        assert!(
            !TransferFilter {
                requested_from: Some(Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap()),
                ..Default::default()
            }
            .matches(&t)
        );
    }

    #[test]
    fn test_paging_clamps() {
        let p = Paging::new(0, 0);
        assert_eq!((p.page, p.page_size), (1, 1));
        let p = Paging::new(3, 500);
        assert_eq!(p.page_size, Paging::MAX_PAGE_SIZE);
        assert_eq!(p.offset(), 200);
        assert_eq!(Paging::default().limit(), 20);
    }
}
