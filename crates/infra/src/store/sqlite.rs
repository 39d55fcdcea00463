//! SQLite-backed document store.
//!
//! Products and movements live in two tables. Movements are append-only at the
//! database level: triggers abort any UPDATE or DELETE on `movements`.
//!
//! ## Error Mapping
//!
//! | SQLx error | StoreError |
//! |------------|------------|
//! | Database (unique violation) | `Conflict` |
//! | Decode / ColumnDecode | `Corrupt` |
//! | Database (other, e.g. `SQLITE_BUSY`) | `Unavailable` |
//! | PoolTimedOut / PoolClosed / Io / other | `Unavailable` |
//!
//! ## Serialization
//!
//! A stock transaction begins with a no-op write to the product row. SQLite
//! takes the database write lock at the first write of a transaction, so the
//! read that follows observes the latest committed stock and no other writer
//! can commit until this transaction finishes.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::instrument;

use stockroom_core::clock::monotonic_after;
use stockroom_core::{ActorId, Clock, DomainError, MovementId, ProductId, SystemClock};
use stockroom_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockroom_inventory::{
    Movement, MovementDraft, MovementType, Product, ProductDetails, ProductStatus, StockAdjustment,
    StockChange, StockEvent,
};

use super::{ChangeFeed, DocumentStore, StockCommit, StoreError, TransactionError, publish_movement};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        product_id        TEXT PRIMARY KEY NOT NULL,
        name              TEXT NOT NULL,
        description       TEXT NOT NULL,
        barcode           TEXT NOT NULL,
        cost_price        INTEGER NOT NULL CHECK (cost_price >= 0),
        selling_price     INTEGER NOT NULL CHECK (selling_price >= 0),
        current_stock     INTEGER NOT NULL CHECK (current_stock >= 0),
        minimum_stock     INTEGER NOT NULL CHECK (minimum_stock >= 0),
        category          TEXT NOT NULL,
        brand             TEXT NOT NULL,
        unit              TEXT NOT NULL,
        supplier          TEXT NOT NULL,
        location          TEXT NOT NULL,
        status            TEXT NOT NULL,
        notes             TEXT NOT NULL,
        image_ref         TEXT NULL,
        registration_date TEXT NOT NULL,
        last_update_date  TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS products_name_idx ON products (name)",
    r#"
    CREATE TABLE IF NOT EXISTS movements (
        product_id  TEXT NOT NULL,
        movement_id TEXT NOT NULL,
        sequence    INTEGER NOT NULL CHECK (sequence > 0),
        quantity    INTEGER NOT NULL CHECK (quantity > 0),
        kind        TEXT NOT NULL CHECK (kind IN ('inbound', 'outbound')),
        recorded_at TEXT NOT NULL,
        responsible TEXT NULL,
        notes       TEXT NULL,
        PRIMARY KEY (product_id, movement_id),
        UNIQUE (product_id, sequence)
    )
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS movements_no_update
    BEFORE UPDATE ON movements
    BEGIN
        SELECT RAISE(ABORT, 'movements are append-only');
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS movements_no_delete
    BEFORE DELETE ON movements
    BEGIN
        SELECT RAISE(ABORT, 'movements are append-only');
    END
    "#,
];

const PRODUCT_COLUMNS: &str = r#"
    product_id, name, description, barcode, cost_price, selling_price,
    current_stock, minimum_stock, category, brand, unit, supplier, location,
    status, notes, image_ref, registration_date, last_update_date
"#;

/// SQLite document store.
///
/// `SqlitePool` is `Send + Sync`; the store can be shared across tasks. The
/// change feed is in-process: only writers going through this store instance
/// are observed by its subscribers.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    bus: Arc<InMemoryEventBus<EventEnvelope<StockEvent>>>,
    clock: Arc<dyn Clock>,
}

impl SqliteDocumentStore {
    /// Connect to `url` and create the schema if needed.
    ///
    /// In-memory URLs (`sqlite::memory:`) are pinned to one connection that is
    /// never recycled, since each SQLite connection opens its own private
    /// in-memory database.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Unavailable(format!("invalid sqlite url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Wrap an existing pool. Call [`Self::migrate`] before use.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            bus: Arc::new(InMemoryEventBus::new()),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.bus = Arc::new(InMemoryEventBus::with_capacity(capacity));
        self
    }

    /// Create tables, indexes and append-only triggers (idempotent).
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn publish(&self, movement: &Movement) {
        publish_movement(&self.bus, movement);
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_product_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE name = ? ORDER BY rowid ASC LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_product_by_name", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name ASC, product_id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self, product, opening), fields(product_id = %product.id()), err)]
    async fn insert_product(
        &self,
        product: Product,
        opening: Option<StockChange>,
    ) -> Result<Option<Movement>, TransactionError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;

        let d = product.details();
        let inserted = sqlx::query(&format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(product.id().as_str())
        .bind(&d.name)
        .bind(&d.description)
        .bind(&d.barcode)
        .bind(to_i64(d.cost_price, "cost_price")?)
        .bind(to_i64(d.selling_price, "selling_price")?)
        .bind(to_i64(product.current_stock(), "current_stock")?)
        .bind(to_i64(d.minimum_stock, "minimum_stock")?)
        .bind(&d.category)
        .bind(&d.brand)
        .bind(&d.unit)
        .bind(&d.supplier)
        .bind(&d.location)
        .bind(d.status.as_str())
        .bind(&d.notes)
        .bind(d.image_ref.as_deref())
        .bind(product.registration_date())
        .bind(product.last_update_date())
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            return Err(match map_sqlx_error("insert_product", e) {
                StoreError::Conflict(_) => TransactionError::Rejected(DomainError::conflict(format!(
                    "product '{}' already exists",
                    product.id()
                ))),
                other => TransactionError::Store(other),
            });
        }

        let movement = match opening {
            Some(change) => Some(
                append_movement(&mut tx, change.into_movement(), product.registration_date()).await?,
            ),
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;

        if let Some(m) = &movement {
            self.publish(m);
        }
        Ok(movement)
    }

    #[instrument(skip(self, details), fields(product_id = %id), err)]
    async fn replace_details(
        &self,
        id: &ProductId,
        details: ProductDetails,
    ) -> Result<Product, TransactionError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("replace_details", e))?;

        let mut product = lock_and_load(&mut tx, id).await?;
        product.replace_details(details, self.clock.now())?;

        let d = product.details();
        sqlx::query(
            r#"
            UPDATE products SET
                name = ?, description = ?, barcode = ?, cost_price = ?, selling_price = ?,
                minimum_stock = ?, category = ?, brand = ?, unit = ?, supplier = ?,
                location = ?, status = ?, notes = ?, image_ref = ?, last_update_date = ?
            WHERE product_id = ?
            "#,
        )
        .bind(&d.name)
        .bind(&d.description)
        .bind(&d.barcode)
        .bind(to_i64(d.cost_price, "cost_price")?)
        .bind(to_i64(d.selling_price, "selling_price")?)
        .bind(to_i64(d.minimum_stock, "minimum_stock")?)
        .bind(&d.category)
        .bind(&d.brand)
        .bind(&d.unit)
        .bind(&d.supplier)
        .bind(&d.location)
        .bind(d.status.as_str())
        .bind(&d.notes)
        .bind(d.image_ref.as_deref())
        .bind(product.last_update_date())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("replace_details", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("replace_details", e))?;
        Ok(product)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: &ProductId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE product_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(
        skip(self, adjustment),
        fields(product_id = %adjustment.product_id, kind = ?adjustment.kind, quantity = adjustment.quantity),
        err
    )]
    async fn apply_adjustment(
        &self,
        adjustment: &StockAdjustment,
    ) -> Result<StockCommit, TransactionError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("apply_adjustment", e))?;

        let mut product = lock_and_load(&mut tx, &adjustment.product_id).await?;
        // Dropping `tx` on any early return rolls the transaction back.
        let change = adjustment.decide(&product)?;

        let movement = append_movement(&mut tx, change.movement().clone(), self.clock.now()).await?;
        change.apply_to(&mut product, movement.timestamp());

        sqlx::query("UPDATE products SET current_stock = ?, last_update_date = ? WHERE product_id = ?")
            .bind(to_i64(product.current_stock(), "current_stock")?)
            .bind(product.last_update_date())
            .bind(product.id().as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("apply_adjustment", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("apply_adjustment", e))?;

        self.publish(&movement);
        Ok(StockCommit { product, movement })
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn movements(&self, id: &ProductId) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, movement_id, sequence, quantity, kind, recorded_at, responsible, notes
            FROM movements
            WHERE product_id = ?
            ORDER BY sequence DESC
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("movements", e))?;

        rows.iter().map(movement_from_row).collect()
    }

    fn changes(&self) -> ChangeFeed {
        self.bus.subscribe()
    }
}

/// Take the write lock, then read the product inside the transaction.
async fn lock_and_load(
    tx: &mut Transaction<'_, Sqlite>,
    id: &ProductId,
) -> Result<Product, TransactionError> {
    sqlx::query("UPDATE products SET current_stock = current_stock WHERE product_id = ?")
        .bind(id.as_str())
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?;

    let row = sqlx::query(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = ?"
    ))
    .bind(id.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_product", e))?;

    match row {
        Some(row) => Ok(product_from_row(&row)?),
        None => Err(TransactionError::Rejected(DomainError::not_found())),
    }
}

/// Append a movement after the product's latest one (strictly later timestamp, next sequence).
async fn append_movement(
    tx: &mut Transaction<'_, Sqlite>,
    draft: MovementDraft,
    now: DateTime<Utc>,
) -> Result<Movement, TransactionError> {
    let last = sqlx::query(
        "SELECT sequence, recorded_at FROM movements WHERE product_id = ? ORDER BY sequence DESC LIMIT 1",
    )
    .bind(draft.product_id.as_str())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("append_movement", e))?;

    let (last_sequence, last_at) = match last {
        Some(row) => {
            let seq: i64 = row
                .try_get("sequence")
                .map_err(|e| map_sqlx_error("append_movement", e))?;
            let at: DateTime<Utc> = row
                .try_get("recorded_at")
                .map_err(|e| map_sqlx_error("append_movement", e))?;
            (from_i64(seq, "sequence")?, Some(at))
        }
        None => (0, None),
    };

    let movement = draft.record(MovementId::new(), monotonic_after(last_at, now), last_sequence + 1);

    sqlx::query(
        r#"
        INSERT INTO movements
            (product_id, movement_id, sequence, quantity, kind, recorded_at, responsible, notes)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(movement.product_id().as_str())
    .bind(movement.id().to_string())
    .bind(to_i64(movement.sequence(), "sequence")?)
    .bind(to_i64(movement.quantity(), "quantity")?)
    .bind(movement.kind().as_str())
    .bind(movement.timestamp())
    .bind(movement.responsible().map(|a| a.as_str()))
    .bind(movement.notes())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("append_movement", e))?;

    Ok(movement)
}

fn product_from_row(row: &SqliteRow) -> Result<Product, StoreError> {
    let get_text = |column: &str| -> Result<String, StoreError> {
        row.try_get::<String, _>(column)
            .map_err(|e| map_sqlx_error("decode_product", e))
    };
    let get_u64 = |column: &str| -> Result<u64, StoreError> {
        let raw: i64 = row
            .try_get(column)
            .map_err(|e| map_sqlx_error("decode_product", e))?;
        from_i64(raw, column)
    };
    let get_time = |column: &str| -> Result<DateTime<Utc>, StoreError> {
        row.try_get::<DateTime<Utc>, _>(column)
            .map_err(|e| map_sqlx_error("decode_product", e))
    };

    let id = ProductId::parse(get_text("product_id")?)
        .map_err(|e| StoreError::Corrupt(format!("product_id: {e}")))?;
    let image_ref: Option<String> = row
        .try_get("image_ref")
        .map_err(|e| map_sqlx_error("decode_product", e))?;

    let details = ProductDetails {
        name: get_text("name")?,
        description: get_text("description")?,
        barcode: get_text("barcode")?,
        cost_price: get_u64("cost_price")?,
        selling_price: get_u64("selling_price")?,
        minimum_stock: get_u64("minimum_stock")?,
        category: get_text("category")?,
        brand: get_text("brand")?,
        unit: get_text("unit")?,
        supplier: get_text("supplier")?,
        location: get_text("location")?,
        status: ProductStatus::new(get_text("status")?),
        notes: get_text("notes")?,
        image_ref,
    };

    Ok(Product::restore(
        id,
        details,
        get_u64("current_stock")?,
        get_time("registration_date")?,
        get_time("last_update_date")?,
    ))
}

fn movement_from_row(row: &SqliteRow) -> Result<Movement, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_movement", e);

    let product_id: String = row.try_get("product_id").map_err(decode)?;
    let movement_id: String = row.try_get("movement_id").map_err(decode)?;
    let sequence: i64 = row.try_get("sequence").map_err(decode)?;
    let quantity: i64 = row.try_get("quantity").map_err(decode)?;
    let kind: String = row.try_get("kind").map_err(decode)?;
    let recorded_at: DateTime<Utc> = row.try_get("recorded_at").map_err(decode)?;
    let responsible: Option<String> = row.try_get("responsible").map_err(decode)?;
    let notes: Option<String> = row.try_get("notes").map_err(decode)?;

    let draft = MovementDraft {
        product_id: ProductId::parse(product_id)
            .map_err(|e| StoreError::Corrupt(format!("product_id: {e}")))?,
        quantity: from_i64(quantity, "quantity")?,
        kind: MovementType::parse(&kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown movement kind '{kind}'")))?,
        responsible: responsible
            .map(ActorId::parse)
            .transpose()
            .map_err(|e| StoreError::Corrupt(format!("responsible: {e}")))?,
        notes,
    };
    let id = MovementId::from_str(&movement_id)
        .map_err(|e| StoreError::Corrupt(format!("movement_id: {e}")))?;

    Ok(draft.record(id, recorded_at, from_i64(sequence, "sequence")?))
}

fn to_i64(value: u64, field: &str) -> Result<i64, TransactionError> {
    i64::try_from(value).map_err(|_| {
        TransactionError::Rejected(DomainError::validation(format!(
            "{field} exceeds the storable range"
        )))
    })
}

fn from_i64(value: i64, field: &str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{field} is negative: {value}")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            if db_err.is_unique_violation() {
                StoreError::Conflict(msg)
            } else {
                StoreError::Unavailable(msg)
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("decode error in {}: {}", operation, err))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use stockroom_auth::Anonymous;
    use stockroom_core::ManualClock;
    use stockroom_inventory::NewProduct;

    use crate::error::LedgerError;
    use crate::ledger::StockLedger;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 10, 0, 0).unwrap()
    }

    fn pid(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    fn product(id: &str, name: &str, stock: u64) -> Product {
        let mut details = ProductDetails::named(name);
        details.cost_price = 250;
        details.selling_price = 399;
        details.minimum_stock = 2;
        details.image_ref = Some("images/p.jpg".to_string());
        let mut request = NewProduct::new(details);
        request.id = Some(pid(id));
        request.initial_stock = stock;
        Product::register(request, t0()).unwrap()
    }

    async fn store() -> SqliteDocumentStore {
        SqliteDocumentStore::connect("sqlite::memory:", 1)
            .await
            .unwrap()
            .with_clock(Arc::new(ManualClock::new(t0())))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_decreases_on_a_shared_file_serialize() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("stock.db").display());
        let store = Arc::new(SqliteDocumentStore::connect(&url, 5).await.unwrap());

        let p = product("p1", "Cocoa", 5);
        let opening = StockChange::opening_balance(&p, None);
        store.insert_product(p, opening).await.unwrap();

        let ledger = StockLedger::new(store.clone(), Arc::new(Anonymous));
        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.decrease_stock(&pid("p1"), 5, None, None).await })
            })
            .collect();

        let mut succeeded = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(LedgerError::InsufficientStock { available: 0, requested: 5, .. }) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(succeeded, 1);

        assert_eq!(ledger.stock_level(&pid("p1")).await.unwrap(), 0);
        let audit = ledger.reconcile(&pid("p1")).await.unwrap();
        assert!(audit.is_consistent());
        assert_eq!(audit.movement_count, 2);
    }

    #[tokio::test]
    async fn product_roundtrips_through_sqlite() {
        let store = store().await;
        let original = product("p1", "Cocoa", 0);
        store.insert_product(original.clone(), None).await.unwrap();

        let loaded = store.get_product(&pid("p1")).await.unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(
            store.find_product_by_name("Cocoa").await.unwrap().unwrap().id(),
            original.id()
        );
        assert!(store.find_product_by_name("cocoa").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = store().await;
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_id_is_conflict() {
        let store = store().await;
        store.insert_product(product("p1", "Cocoa", 0), None).await.unwrap();
        let err = store
            .insert_product(product("p1", "Vanilla", 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransactionError::Rejected(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn opening_stock_is_recorded_as_movement() {
        let store = store().await;
        let p = product("p1", "Cocoa", 6);
        let opening = StockChange::opening_balance(&p, None);
        let movement = store.insert_product(p, opening).await.unwrap().unwrap();

        assert_eq!(movement.quantity(), 6);
        assert_eq!(movement.sequence(), 1);
        assert_eq!(store.movements(&pid("p1")).await.unwrap(), vec![movement]);
    }

    #[tokio::test]
    async fn adjustments_commit_stock_and_history_together() {
        let store = store().await;
        store.insert_product(product("p1", "Cocoa", 0), None).await.unwrap();

        let up = store
            .apply_adjustment(
                &StockAdjustment::increase(pid("p1"), 10)
                    .responsible(Some(ActorId::parse("clerk-1").unwrap()))
                    .notes(Some("delivery".to_string())),
            )
            .await
            .unwrap();
        assert_eq!(up.product.current_stock(), 10);

        let down = store
            .apply_adjustment(&StockAdjustment::decrease(pid("p1"), 4))
            .await
            .unwrap();
        assert_eq!(down.product.current_stock(), 6);
        assert!(down.movement.timestamp() > up.movement.timestamp());

        let history = store.movements(&pid("p1")).await.unwrap();
        assert_eq!(history, vec![down.movement, up.movement.clone()]);
        assert_eq!(history[1].responsible().unwrap().as_str(), "clerk-1");
        assert_eq!(history[1].notes(), Some("delivery"));

        let stored = store.get_product(&pid("p1")).await.unwrap().unwrap();
        assert_eq!(stored.current_stock(), 6);
    }

    #[tokio::test]
    async fn insufficient_stock_rolls_back() {
        let store = store().await;
        store.insert_product(product("p1", "Cocoa", 0), None).await.unwrap();
        store
            .apply_adjustment(&StockAdjustment::increase(pid("p1"), 3))
            .await
            .unwrap();

        let err = store
            .apply_adjustment(&StockAdjustment::decrease(pid("p1"), 5))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransactionError::Rejected(DomainError::InsufficientStock { available: 3, requested: 5 })
        );
        assert_eq!(
            store.get_product(&pid("p1")).await.unwrap().unwrap().current_stock(),
            3
        );
        assert_eq!(store.movements(&pid("p1")).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_product_is_not_found() {
        let store = store().await;
        let err = store
            .apply_adjustment(&StockAdjustment::increase(pid("ghost"), 1))
            .await
            .unwrap_err();
        assert_eq!(err, TransactionError::Rejected(DomainError::NotFound));
    }

    #[tokio::test]
    async fn movements_table_rejects_updates_and_deletes() {
        let store = store().await;
        store.insert_product(product("p1", "Cocoa", 0), None).await.unwrap();
        store
            .apply_adjustment(&StockAdjustment::increase(pid("p1"), 1))
            .await
            .unwrap();

        assert!(sqlx::query("UPDATE movements SET quantity = 99")
            .execute(store.pool())
            .await
            .is_err());
        assert!(sqlx::query("DELETE FROM movements")
            .execute(store.pool())
            .await
            .is_err());
        assert_eq!(store.movements(&pid("p1")).await.unwrap()[0].quantity(), 1);
    }

    #[tokio::test]
    async fn replace_details_does_not_touch_stock() {
        let store = store().await;
        store.insert_product(product("p1", "Cocoa", 0), None).await.unwrap();
        store
            .apply_adjustment(&StockAdjustment::increase(pid("p1"), 8))
            .await
            .unwrap();

        let mut details = ProductDetails::named("Dark cocoa");
        details.status = ProductStatus::new("Seasonal");
        let updated = store.replace_details(&pid("p1"), details).await.unwrap();
        assert_eq!(updated.current_stock(), 8);

        let loaded = store.get_product(&pid("p1")).await.unwrap().unwrap();
        assert_eq!(loaded.name(), "Dark cocoa");
        assert_eq!(loaded.details().status.as_str(), "seasonal");
        assert_eq!(loaded.current_stock(), 8);
        assert_eq!(loaded.details().image_ref, None);
    }

    #[tokio::test]
    async fn list_is_sorted_by_name_and_delete_removes() {
        let store = store().await;
        store.insert_product(product("p2", "Vanilla", 0), None).await.unwrap();
        store.insert_product(product("p1", "Cocoa", 0), None).await.unwrap();

        let names: Vec<String> = store
            .list_products()
            .await
            .unwrap()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        assert_eq!(names, vec!["Cocoa", "Vanilla"]);

        assert!(store.delete_product(&pid("p1")).await.unwrap());
        assert!(store.get_product(&pid("p1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn change_feed_sees_commits() {
        let store = store().await;
        store.insert_product(product("p1", "Cocoa", 0), None).await.unwrap();
        let mut feed = store.changes();

        let commit = store
            .apply_adjustment(&StockAdjustment::increase(pid("p1"), 2))
            .await
            .unwrap();
        let envelope = feed.recv().await.unwrap();
        assert_eq!(envelope.event_id(), *commit.movement.id().as_uuid());
    }
}
