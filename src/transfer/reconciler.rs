//! Line-Item Reconciler
//!
//! Turns a mix of raw-item and recipe lines into one net quantity per
//! inventory item. A recipe requested at quantity N consumes
//! `N x quantity_per_unit` of each ingredient.

use async_trait::async_trait;
use tracing::debug;

use super::error::TransferError;
use super::types::{Ingredient, ItemQuantity, Line, add_quantity, check_storable, mul_quantity};
use crate::core_types::{InventoryItemId, Quantity, RecipeId};

/// Recipe lookup, owned by the catalog.
#[async_trait]
pub trait RecipeCatalog: Send + Sync {
    /// Ingredient list of a recipe, `None` if the recipe does not exist
    async fn ingredients(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Option<Vec<Ingredient>>, TransferError>;
}

/// Reconcile lines into per-item deltas.
///
/// Duplicates are summed so the ledger sees one delta per item. Output order
/// is the first occurrence of each item. Recipe contributions are rounded to
/// the stored scale and zero contributions are dropped. An unknown recipe
/// aborts the whole call with `NotFound`; nothing partial is returned.
pub async fn reconcile(
    lines: &[Line],
    catalog: &dyn RecipeCatalog,
) -> Result<Vec<ItemQuantity>, TransferError> {
    let mut deltas = Deltas::default();

    for line in lines {
        match *line {
            Line::Item {
                inventory_item_id,
                quantity,
            } => deltas.add(inventory_item_id, quantity)?,
            Line::Recipe {
                recipe_id,
                quantity,
            } => {
                let ingredients = catalog
                    .ingredients(recipe_id)
                    .await?
                    .ok_or_else(|| TransferError::not_found("Recipe", recipe_id))?;

                debug!(
                    recipe_id = recipe_id,
                    quantity = %quantity,
                    ingredients = ingredients.len(),
                    "Expanding recipe line"
                );

                for ingredient in &ingredients {
                    if ingredient.quantity_per_unit.is_sign_negative() {
                        return Err(TransferError::Validation(format!(
                            "recipe {} has a negative quantity for item {}",
                            recipe_id, ingredient.inventory_item_id
                        )));
                    }
                    deltas.add(
                        ingredient.inventory_item_id,
                        mul_quantity(quantity, ingredient.quantity_per_unit)?,
                    )?;
                }
            }
        }
    }

    Ok(deltas.into_vec())
}

/// Insertion-ordered accumulator
#[derive(Default)]
struct Deltas {
    items: Vec<ItemQuantity>,
}

impl Deltas {
    fn add(
        &mut self,
        inventory_item_id: InventoryItemId,
        quantity: Quantity,
    ) -> Result<(), TransferError> {
        if quantity.is_zero() {
            return Ok(());
        }
        match self
            .items
            .iter_mut()
            .find(|q| q.inventory_item_id == inventory_item_id)
        {
            Some(existing) => existing.quantity = add_quantity(existing.quantity, quantity)?,
            None => self.items.push(ItemQuantity {
                inventory_item_id,
                quantity: check_storable(quantity)?,
            }),
        }
        Ok(())
    }

    fn into_vec(self) -> Vec<ItemQuantity> {
        self.items
    }
}

/// Fixed recipe book, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    recipes: std::collections::HashMap<RecipeId, Vec<Ingredient>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipe(mut self, recipe_id: RecipeId, ingredients: Vec<Ingredient>) -> Self {
        self.recipes.insert(recipe_id, ingredients);
        self
    }
}

#[async_trait]
impl RecipeCatalog for StaticCatalog {
    async fn ingredients(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Option<Vec<Ingredient>>, TransferError> {
        Ok(self.recipes.get(&recipe_id).cloned())
    }
}
