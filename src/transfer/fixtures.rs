//! Seed data
//!
//! Stores, opening stock, recipes and drivers loaded from a YAML file, so a
//! fresh deployment (or the in-memory back end) has something to transfer.
//!
//! ```yaml
//! stores:
//!   - { id: 1, name: Downtown, organization_id: 1 }
//! stock:
//!   - { store_id: 1, inventory_item_id: 100, quantity_on_hand: "50" }
//! recipes:
//!   - id: 7
//!     ingredients:
//!       - { inventory_item_id: 100, quantity_per_unit: "2" }
//! drivers:
//!   - { id: 1, store_id: 1, name: Sam }
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use super::store::MemoryTransferStore;
use super::types::{Driver, Ingredient, StockLevel, Store, check_storable};
use crate::core_types::RecipeId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeSeed {
    pub id: RecipeId,
    #[serde(default)]
    pub ingredients: Vec<Ingredient>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub stores: Vec<Store>,
    #[serde(default)]
    pub stock: Vec<StockLevel>,
    #[serde(default)]
    pub recipes: Vec<RecipeSeed>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
}

impl SeedData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let seed: SeedData = serde_yaml::from_str(content)?;
        seed.validate()?;
        Ok(seed)
    }

    fn validate(&self) -> Result<()> {
        for level in &self.stock {
            if level.quantity_on_hand.is_sign_negative() {
                anyhow::bail!(
                    "negative opening stock for item {} at store {}",
                    level.inventory_item_id,
                    level.store_id
                );
            }
            if !self.stores.iter().any(|s| s.id == level.store_id) {
                anyhow::bail!("stock references unknown store {}", level.store_id);
            }
        }
        for recipe in &self.recipes {
            for ingredient in &recipe.ingredients {
                if ingredient.quantity_per_unit.is_sign_negative() {
                    anyhow::bail!(
                        "recipe {} has a negative quantity for item {}",
                        recipe.id,
                        ingredient.inventory_item_id
                    );
                }
                check_storable(ingredient.quantity_per_unit)
                    .with_context(|| format!("recipe {}", recipe.id))?;
            }
        }
        for driver in &self.drivers {
            if !self.stores.iter().any(|s| s.id == driver.store_id) {
                anyhow::bail!(
                    "driver {} references unknown store {}",
                    driver.id,
                    driver.store_id
                );
            }
        }
        Ok(())
    }

    /// Load everything into the in-memory back end
    pub async fn apply_memory(&self, store: &MemoryTransferStore) {
        for s in &self.stores {
            store.add_store(s.clone()).await;
        }
        for level in &self.stock {
            store.add_stock_level(*level).await;
        }
        for recipe in &self.recipes {
            store.add_recipe(recipe.id, recipe.ingredients.clone());
        }
        for driver in &self.drivers {
            store.add_driver(driver.clone()).await;
        }
        tracing::info!(
            stores = self.stores.len(),
            stock_rows = self.stock.len(),
            recipes = self.recipes.len(),
            drivers = self.drivers.len(),
            "Seed data loaded into memory store"
        );
    }

    /// Upsert everything into PostgreSQL in one transaction. Existing stock
    /// rows are left alone.
    pub async fn apply_postgres(&self, pool: &PgPool) -> Result<()> {
        let mut tx = pool.begin().await?;

        for s in &self.stores {
            sqlx::query(
                "INSERT INTO stores_tb (store_id, name, organization_id) VALUES ($1, $2, $3) \
                 ON CONFLICT (store_id) DO UPDATE SET name = EXCLUDED.name, \
                 organization_id = EXCLUDED.organization_id",
            )
            .bind(s.id)
            .bind(&s.name)
            .bind(s.organization_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to seed store {}", s.id))?;
        }

        for level in &self.stock {
            sqlx::query(
                "INSERT INTO inventory_stock_tb \
                 (store_id, inventory_item_id, quantity_on_hand, minimum_quantity) \
                 VALUES ($1, $2, $3, $4) ON CONFLICT (store_id, inventory_item_id) DO NOTHING",
            )
            .bind(level.store_id)
            .bind(level.inventory_item_id)
            .bind(level.quantity_on_hand)
            .bind(level.minimum_quantity)
            .execute(&mut *tx)
            .await?;
        }

        for recipe in &self.recipes {
            sqlx::query("DELETE FROM recipe_ingredients_tb WHERE recipe_id = $1")
                .bind(recipe.id)
                .execute(&mut *tx)
                .await?;
            for (position, ingredient) in recipe.ingredients.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO recipe_ingredients_tb \
                     (recipe_id, position, inventory_item_id, quantity_per_unit) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(recipe.id)
                .bind(position as i32)
                .bind(ingredient.inventory_item_id)
                .bind(ingredient.quantity_per_unit)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("Failed to seed recipe {}", recipe.id))?;
            }
        }

        for driver in &self.drivers {
            sqlx::query(
                "INSERT INTO drivers_tb (driver_id, store_id, name, email) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (driver_id) DO NOTHING",
            )
            .bind(driver.id)
            .bind(driver.store_id)
            .bind(&driver.name)
            .bind(&driver.email)
            .execute(&mut *tx)
            .await?;
        }

        // Explicit ids above do not advance the sequences
        for (table, column) in [("stores_tb", "store_id"), ("drivers_tb", "driver_id")] {
            sqlx::query(&format!(
                "SELECT setval(pg_get_serial_sequence('{table}', '{column}'), \
                 GREATEST((SELECT COALESCE(MAX({column}), 0) FROM {table}), 1))"
            ))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::info!(
            stores = self.stores.len(),
            stock_rows = self.stock.len(),
            recipes = self.recipes.len(),
            drivers = self.drivers.len(),
            "Seed data applied to PostgreSQL"
        );
        Ok(())
    }
}
