//! PostgreSQL transfer store
//!
//! A unit of work is one `sqlx` transaction. Transfers are locked with
//! `SELECT ... FOR UPDATE`, status changes use CAS updates, and stock rows
//! are locked per `(store, item)` before they are written.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use tracing::debug;

use super::{TransferStore, UnitOfWork};
use crate::core_types::{DriverId, InventoryItemId, Quantity, RecipeId, StoreId, TransferId};
use crate::transfer::error::TransferError;
use crate::transfer::reconciler::RecipeCatalog;
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{
    Driver, Ingredient, Line, NewTransfer, Paging, StockLevel, Store, Transfer, TransferFilter,
    TransferItem,
};

const TRANSFER_COLUMNS: &str = "transfer_id, from_store_id, to_store_id, status, requested_at, \
     received_at, notes, driver_id, driver_name, driver_email, requested_by_user_id, \
     approved_by_user_id";

const ITEM_COLUMNS: &str =
    "transfer_item_id, transfer_id, inventory_item_id, recipe_id, quantity, is_requested";

/// PostgreSQL back end
#[derive(Clone)]
pub struct PgTransferStore {
    pool: PgPool,
}

impl PgTransferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecipeCatalog for PgTransferStore {
    async fn ingredients(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Option<Vec<Ingredient>>, TransferError> {
        let rows = sqlx::query(
            r#"
            SELECT inventory_item_id, quantity_per_unit
            FROM recipe_ingredients_tb
            WHERE recipe_id = $1
            ORDER BY position, inventory_item_id
            "#,
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        rows.iter()
            .map(|row| -> Result<Ingredient, TransferError> {
                Ok(Ingredient {
                    inventory_item_id: row.try_get("inventory_item_id")?,
                    quantity_per_unit: row.try_get("quantity_per_unit")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

#[async_trait]
impl TransferStore for PgTransferStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransferError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }

    async fn get_transfer(&self, id: TransferId) -> Result<Option<Transfer>, TransferError> {
        let sql = format!(
            "SELECT {} FROM transfers_tb WHERE transfer_id = $1",
            TRANSFER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_transfer).transpose()
    }

    async fn get_items(&self, id: TransferId) -> Result<Vec<TransferItem>, TransferError> {
        let sql = format!(
            "SELECT {} FROM transfer_items_tb WHERE transfer_id = $1 ORDER BY transfer_item_id",
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(id).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn list_transfers(
        &self,
        filter: &TransferFilter,
        paging: Paging,
    ) -> Result<(Vec<Transfer>, u64), TransferError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM transfers_tb WHERE TRUE");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut page = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM transfers_tb WHERE TRUE",
            TRANSFER_COLUMNS
        ));
        push_filter(&mut page, filter);
        page.push(" ORDER BY requested_at DESC, transfer_id DESC LIMIT ")
            .push_bind(paging.limit() as i64)
            .push(" OFFSET ")
            .push_bind(paging.offset() as i64);

        let rows = page.build().fetch_all(&self.pool).await?;
        let transfers = rows
            .iter()
            .map(row_to_transfer)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((transfers, total.max(0) as u64))
    }

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>, TransferError> {
        let row = sqlx::query(
            "SELECT store_id, name, organization_id FROM stores_tb WHERE store_id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<Store, TransferError> {
            Ok(Store {
                id: r.try_get("store_id")?,
                name: r.try_get("name")?,
                organization_id: r.try_get("organization_id")?,
            })
        })
        .transpose()
    }

    async fn stock_level(
        &self,
        store_id: StoreId,
        item_id: InventoryItemId,
    ) -> Result<Option<StockLevel>, TransferError> {
        let row = sqlx::query(
            r#"
            SELECT quantity_on_hand, minimum_quantity
            FROM inventory_stock_tb
            WHERE store_id = $1 AND inventory_item_id = $2
            "#,
        )
        .bind(store_id)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| -> Result<StockLevel, TransferError> {
            Ok(StockLevel {
                store_id,
                inventory_item_id: item_id,
                quantity_on_hand: r.try_get("quantity_on_hand")?,
                minimum_quantity: r.try_get("minimum_quantity")?,
            })
        })
        .transpose()
    }

    async fn health_check(&self) -> Result<(), TransferError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &TransferFilter) {
    if let Some(store) = filter.store_id {
        qb.push(" AND (from_store_id = ")
            .push_bind(store)
            .push(" OR to_store_id = ")
            .push_bind(store)
            .push(")");
    }
    if let Some(from) = filter.from_store_id {
        qb.push(" AND from_store_id = ").push_bind(from);
    }
    if let Some(to) = filter.to_store_id {
        qb.push(" AND to_store_id = ").push_bind(to);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.id());
    }
    if let Some(since) = filter.requested_from {
        qb.push(" AND requested_at >= ").push_bind(since);
    }
    if let Some(until) = filter.requested_to {
        qb.push(" AND requested_at <= ").push_bind(until);
    }
}

fn row_to_transfer(row: &PgRow) -> Result<Transfer, TransferError> {
    let status_id: i16 = row.try_get("status")?;
    let status = TransferStatus::from_id(status_id)
        .ok_or_else(|| TransferError::SystemError(format!("Invalid status ID: {}", status_id)))?;

    Ok(Transfer {
        id: row.try_get("transfer_id")?,
        from_store_id: row.try_get("from_store_id")?,
        to_store_id: row.try_get("to_store_id")?,
        status,
        requested_at: row.try_get("requested_at")?,
        received_at: row.try_get("received_at")?,
        notes: row.try_get("notes")?,
        driver_id: row.try_get("driver_id")?,
        driver_name: row.try_get("driver_name")?,
        driver_email: row.try_get("driver_email")?,
        requested_by_user_id: row.try_get("requested_by_user_id")?,
        approved_by_user_id: row.try_get("approved_by_user_id")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<TransferItem, TransferError> {
    let line = Line::from_parts(
        row.try_get("inventory_item_id")?,
        row.try_get("recipe_id")?,
        row.try_get("quantity")?,
    )
    .map_err(|e| TransferError::SystemError(format!("Corrupt transfer line: {}", e)))?;

    Ok(TransferItem {
        id: row.try_get("transfer_item_id")?,
        transfer_id: row.try_get("transfer_id")?,
        line,
        is_requested: row.try_get("is_requested")?,
    })
}

/// One PostgreSQL transaction. Dropped without commit = rolled back.
struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, TransferError> {
        self.tx
            .as_mut()
            .ok_or_else(|| TransferError::SystemError("unit of work already committed".to_string()))
    }

    async fn insert_lines(
        &mut self,
        id: TransferId,
        lines: &[Line],
        is_requested: bool,
    ) -> Result<(), TransferError> {
        let tx = self.tx()?;
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO transfer_items_tb
                    (transfer_id, inventory_item_id, recipe_id, quantity, is_requested)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id)
            .bind(line.inventory_item_id())
            .bind(line.recipe_id())
            .bind(line.quantity())
            .bind(is_requested)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_transfer(&mut self, id: TransferId) -> Result<Option<Transfer>, TransferError> {
        let sql = format!(
            "SELECT {} FROM transfers_tb WHERE transfer_id = $1 FOR UPDATE",
            TRANSFER_COLUMNS
        );
        let tx = self.tx()?;
        let row = sqlx::query(&sql).bind(id).fetch_optional(&mut **tx).await?;
        row.as_ref().map(row_to_transfer).transpose()
    }

    async fn insert_transfer(&mut self, new: &NewTransfer) -> Result<TransferId, TransferError> {
        let tx = self.tx()?;
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO transfers_tb
                (from_store_id, to_store_id, status, requested_at, notes, requested_by_user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING transfer_id
            "#,
        )
        .bind(new.from_store_id)
        .bind(new.to_store_id)
        .bind(new.status.id())
        .bind(new.requested_at)
        .bind(&new.notes)
        .bind(new.requested_by_user_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(id)
    }

    async fn replace_requested_items(
        &mut self,
        id: TransferId,
        lines: &[Line],
    ) -> Result<(), TransferError> {
        let tx = self.tx()?;
        sqlx::query("DELETE FROM transfer_items_tb WHERE transfer_id = $1 AND is_requested")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        self.insert_lines(id, lines, true).await
    }

    async fn append_items(
        &mut self,
        id: TransferId,
        lines: &[Line],
        is_requested: bool,
    ) -> Result<(), TransferError> {
        self.insert_lines(id, lines, is_requested).await
    }

    async fn load_items(&mut self, id: TransferId) -> Result<Vec<TransferItem>, TransferError> {
        let sql = format!(
            "SELECT {} FROM transfer_items_tb WHERE transfer_id = $1 ORDER BY transfer_item_id",
            ITEM_COLUMNS
        );
        let tx = self.tx()?;
        let rows = sqlx::query(&sql).bind(id).fetch_all(&mut **tx).await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn update_transfer_if(
        &mut self,
        expected: TransferStatus,
        transfer: &Transfer,
    ) -> Result<bool, TransferError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            r#"
            UPDATE transfers_tb
            SET from_store_id = $1, status = $2, notes = $3, driver_id = $4,
                driver_name = $5, driver_email = $6, approved_by_user_id = $7,
                received_at = $8, updated_at = NOW()
            WHERE transfer_id = $9 AND status = $10
            "#,
        )
        .bind(transfer.from_store_id)
        .bind(transfer.status.id())
        .bind(&transfer.notes)
        .bind(transfer.driver_id)
        .bind(&transfer.driver_name)
        .bind(&transfer.driver_email)
        .bind(transfer.approved_by_user_id)
        .bind(transfer.received_at)
        .bind(transfer.id)
        .bind(expected.id())
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_driver(&mut self, id: DriverId) -> Result<Option<Driver>, TransferError> {
        let tx = self.tx()?;
        let row = sqlx::query("SELECT driver_id, store_id, name, email FROM drivers_tb WHERE driver_id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        row.map(|r| -> Result<Driver, TransferError> {
            Ok(Driver {
                id: r.try_get("driver_id")?,
                store_id: r.try_get("store_id")?,
                name: r.try_get("name")?,
                email: r.try_get("email")?,
            })
        })
        .transpose()
    }

    async fn create_driver(
        &mut self,
        store_id: StoreId,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Driver, TransferError> {
        let tx = self.tx()?;
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO drivers_tb (store_id, name, email) VALUES ($1, $2, $3) RETURNING driver_id",
        )
        .bind(store_id)
        .bind(name)
        .bind(email)
        .fetch_one(&mut **tx)
        .await?;

        debug!(driver_id = id, store_id = store_id, "Driver created");
        Ok(Driver {
            id,
            store_id,
            name: name.map(str::to_string),
            email: email.map(str::to_string),
        })
    }

    async fn store_exists(&mut self, id: StoreId) -> Result<bool, TransferError> {
        let tx = self.tx()?;
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM stores_tb WHERE store_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
        Ok(exists)
    }

    async fn lock_stock(
        &mut self,
        store_id: StoreId,
        item_id: InventoryItemId,
    ) -> Result<Option<Quantity>, TransferError> {
        let tx = self.tx()?;

        // Materialize the row so that two first-time increments serialize on it
        sqlx::query(
            r#"
            INSERT INTO inventory_stock_tb (store_id, inventory_item_id, quantity_on_hand)
            VALUES ($1, $2, 0)
            ON CONFLICT (store_id, inventory_item_id) DO NOTHING
            "#,
        )
        .bind(store_id)
        .bind(item_id)
        .execute(&mut **tx)
        .await?;

        let on_hand = sqlx::query_scalar::<_, Quantity>(
            r#"
            SELECT quantity_on_hand FROM inventory_stock_tb
            WHERE store_id = $1 AND inventory_item_id = $2
            FOR UPDATE
            "#,
        )
        .bind(store_id)
        .bind(item_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(on_hand)
    }

    async fn write_stock(
        &mut self,
        store_id: StoreId,
        item_id: InventoryItemId,
        quantity_on_hand: Quantity,
    ) -> Result<(), TransferError> {
        let tx = self.tx()?;
        sqlx::query(
            r#"
            INSERT INTO inventory_stock_tb (store_id, inventory_item_id, quantity_on_hand, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (store_id, inventory_item_id)
            DO UPDATE SET quantity_on_hand = EXCLUDED.quantity_on_hand, updated_at = NOW()
            "#,
        )
        .bind(store_id)
        .bind(item_id)
        .bind(quantity_on_hand)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), TransferError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| TransferError::SystemError("unit of work already committed".to_string()))?;
        tx.commit().await?;
        Ok(())
    }
}
