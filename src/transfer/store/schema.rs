use anyhow::Result;
use sqlx::PgPool;

/// Create the transfer tables if they do not exist
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing transfer schema...");

    for (name, ddl) in TABLES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {}: {}", name, e))?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create index: {}", e))?;
    }

    tracing::info!("Transfer schema initialized successfully");
    Ok(())
}

/// Creation order matters: referenced tables first
pub const TABLES: [(&str, &str); 6] = [
    ("stores_tb", CREATE_STORES_TABLE),
    ("inventory_stock_tb", CREATE_STOCK_TABLE),
    ("recipe_ingredients_tb", CREATE_RECIPE_INGREDIENTS_TABLE),
    ("drivers_tb", CREATE_DRIVERS_TABLE),
    ("transfers_tb", CREATE_TRANSFERS_TABLE),
    ("transfer_items_tb", CREATE_TRANSFER_ITEMS_TABLE),
];

pub const INDEXES: [&str; 4] = [
    "CREATE INDEX IF NOT EXISTS transfers_from_store_idx ON transfers_tb (from_store_id, requested_at DESC)",
    "CREATE INDEX IF NOT EXISTS transfers_to_store_idx ON transfers_tb (to_store_id, requested_at DESC)",
    "CREATE INDEX IF NOT EXISTS transfers_status_idx ON transfers_tb (status)",
    "CREATE INDEX IF NOT EXISTS transfer_items_transfer_idx ON transfer_items_tb (transfer_id, is_requested)",
];

pub const CREATE_STORES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stores_tb (
    store_id         BIGSERIAL PRIMARY KEY,
    name             VARCHAR(200) NOT NULL,
    organization_id  BIGINT NOT NULL
)
"#;

pub const CREATE_STOCK_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS inventory_stock_tb (
    store_id           BIGINT NOT NULL REFERENCES stores_tb (store_id),
    inventory_item_id  BIGINT NOT NULL,
    quantity_on_hand   NUMERIC(20, 6) NOT NULL DEFAULT 0 CHECK (quantity_on_hand >= 0),
    minimum_quantity   NUMERIC(20, 6) NOT NULL DEFAULT 0,
    updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (store_id, inventory_item_id)
)
"#;

pub const CREATE_RECIPE_INGREDIENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS recipe_ingredients_tb (
    recipe_id          BIGINT NOT NULL,
    position           INT NOT NULL DEFAULT 0,
    inventory_item_id  BIGINT NOT NULL,
    quantity_per_unit  NUMERIC(20, 6) NOT NULL CHECK (quantity_per_unit >= 0),
    PRIMARY KEY (recipe_id, inventory_item_id)
)
"#;

pub const CREATE_DRIVERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS drivers_tb (
    driver_id   BIGSERIAL PRIMARY KEY,
    store_id    BIGINT NOT NULL REFERENCES stores_tb (store_id),
    name        VARCHAR(200),
    email       VARCHAR(320),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfers_tb (
    transfer_id           BIGSERIAL PRIMARY KEY,
    from_store_id         BIGINT REFERENCES stores_tb (store_id),
    to_store_id           BIGINT NOT NULL REFERENCES stores_tb (store_id),
    status                SMALLINT NOT NULL,
    requested_at          TIMESTAMPTZ NOT NULL,
    received_at           TIMESTAMPTZ,
    notes                 TEXT,
    driver_id             BIGINT REFERENCES drivers_tb (driver_id),
    driver_name           VARCHAR(200),
    driver_email          VARCHAR(320),
    requested_by_user_id  BIGINT NOT NULL,
    approved_by_user_id   BIGINT,
    created_at            TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at            TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_TRANSFER_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS transfer_items_tb (
    transfer_item_id   BIGSERIAL PRIMARY KEY,
    transfer_id        BIGINT NOT NULL REFERENCES transfers_tb (transfer_id),
    inventory_item_id  BIGINT,
    recipe_id          BIGINT,
    quantity           NUMERIC(20, 6) NOT NULL CHECK (quantity > 0),
    is_requested       BOOLEAN NOT NULL,
    CHECK ((inventory_item_id IS NULL) <> (recipe_id IS NULL))
)
"#;
