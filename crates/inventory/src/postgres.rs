use async_trait::async_trait;
use common::{Money, ProductId, ReservationKey};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};

use crate::{
    InventoryError, InventoryStore, NewProduct, Product, ProductUpdate, ReleaseOutcome,
    ReserveOutcome, Reservation, ReservationState, Result,
};

const PRODUCT_COLUMNS: &str =
    "id, name, description, price_cents, quantity_on_hand, created_at, updated_at";

/// PostgreSQL-backed inventory store.
///
/// Reservations rely on a conditional `UPDATE ... WHERE quantity_on_hand >= $n`,
/// so concurrent reservations against the same row are serialized by the
/// row lock and can never drive stock below zero.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: &PgRow) -> Result<Product> {
        let quantity: i64 = row.try_get("quantity_on_hand")?;
        Ok(Product {
            id: ProductId::new(row.try_get("id")?),
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            unit_price: Money::from_cents(row.try_get("price_cents")?),
            quantity_on_hand: to_quantity(quantity)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_reservation(row: &PgRow) -> Result<Reservation> {
        let key: String = row.try_get("reservation_key")?;
        let state: String = row.try_get("state")?;
        let quantity: i64 = row.try_get("quantity")?;
        Ok(Reservation {
            key: key
                .parse()
                .map_err(|e| InventoryError::CorruptData(format!("{e}")))?,
            product_id: ProductId::new(row.try_get("product_id")?),
            quantity: to_quantity(quantity)?,
            state: ReservationState::parse(&state).ok_or_else(|| {
                InventoryError::CorruptData(format!("unknown reservation state '{state}'"))
            })?,
        })
    }

    async fn decrement(
        tx: &mut Transaction<'_, Postgres>,
        id: ProductId,
        quantity: u32,
    ) -> Result<ReserveOutcome> {
        let updated = sqlx::query(
            r#"
            UPDATE products
            SET quantity_on_hand = quantity_on_hand - $2, updated_at = NOW()
            WHERE id = $1 AND quantity_on_hand >= $2
            "#,
        )
        .bind(id.as_i64())
        .bind(i64::from(quantity))
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(ReserveOutcome::Reserved);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(id.as_i64())
            .fetch_one(&mut **tx)
            .await?;

        Ok(if exists {
            ReserveOutcome::InsufficientStock
        } else {
            ReserveOutcome::ProductNotFound
        })
    }

    /// Adds `quantity` back to stock. Returns false for a missing product and
    /// a validation error if the level would leave the `u32` range.
    async fn increment(
        tx: &mut Transaction<'_, Postgres>,
        id: ProductId,
        quantity: u32,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE products
            SET quantity_on_hand = quantity_on_hand + $2, updated_at = NOW()
            WHERE id = $1 AND quantity_on_hand + $2 <= $3
            "#,
        )
        .bind(id.as_i64())
        .bind(i64::from(quantity))
        .bind(i64::from(u32::MAX))
        .execute(&mut **tx)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(true);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(id.as_i64())
            .fetch_one(&mut **tx)
            .await?;

        if exists {
            return Err(InventoryError::Validation(format!(
                "stock overflow for product {id}"
            )));
        }
        Ok(false)
    }
}

fn to_quantity(value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| InventoryError::CorruptData(format!("quantity {value} out of range")))
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn list(&self) -> Result<Vec<Product>> {
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_product).collect()
    }

    async fn insert(&self, product: NewProduct) -> Result<Product> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO products (name, description, price_cents, quantity_on_hand)
            VALUES ($1, $2, $3, $4)
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price.cents())
        .bind(i64::from(product.quantity_on_hand))
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_product(&row)
    }

    async fn update(&self, id: ProductId, update: ProductUpdate) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE products
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                quantity_on_hand = COALESCE($5, quantity_on_hand),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        ))
        .bind(id.as_i64())
        .bind(update.name)
        .bind(update.description)
        .bind(update.unit_price.map(|p| p.cents()))
        .bind(update.quantity_on_hand.map(i64::from))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_product).transpose()
    }

    async fn delete(&self, id: ProductId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_quantity(&self, id: ProductId, quantity: u32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE products SET quantity_on_hand = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.as_i64())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reserve(
        &self,
        id: ProductId,
        quantity: u32,
        key: Option<&ReservationKey>,
    ) -> Result<ReserveOutcome> {
        let mut tx = self.pool.begin().await?;

        if let Some(key) = key {
            // Claim the key first; a conflicting row means it was seen before.
            let claimed = sqlx::query(
                r#"
                INSERT INTO stock_reservations (reservation_key, product_id, quantity, state)
                VALUES ($1, $2, $3, 'applied')
                ON CONFLICT (reservation_key) DO NOTHING
                "#,
            )
            .bind(key.as_str())
            .bind(id.as_i64())
            .bind(i64::from(quantity))
            .execute(&mut *tx)
            .await?;

            if claimed.rows_affected() == 0 {
                let state: String = sqlx::query_scalar(
                    "SELECT state FROM stock_reservations WHERE reservation_key = $1",
                )
                .bind(key.as_str())
                .fetch_one(&mut *tx)
                .await?;
                tx.commit().await?;

                return match ReservationState::parse(&state) {
                    Some(ReservationState::Applied) => Ok(ReserveOutcome::AlreadyApplied),
                    Some(ReservationState::Released) => Ok(ReserveOutcome::AlreadyReleased),
                    None => Err(InventoryError::CorruptData(format!(
                        "unknown reservation state '{state}'"
                    ))),
                };
            }
        }

        let outcome = Self::decrement(&mut tx, id, quantity).await?;
        if outcome == ReserveOutcome::Reserved {
            tx.commit().await?;
        } else {
            // Drops the ledger claim along with the failed decrement.
            tx.rollback().await?;
        }
        Ok(outcome)
    }

    async fn release(
        &self,
        id: ProductId,
        quantity: u32,
        key: Option<&ReservationKey>,
    ) -> Result<ReleaseOutcome> {
        let mut tx = self.pool.begin().await?;

        let Some(key) = key else {
            let found = Self::increment(&mut tx, id, quantity).await?;
            tx.commit().await?;
            return Ok(if found {
                ReleaseOutcome::Released
            } else {
                ReleaseOutcome::ProductNotFound
            });
        };

        let tombstone = sqlx::query(
            r#"
            INSERT INTO stock_reservations (reservation_key, product_id, quantity, state)
            VALUES ($1, $2, $3, 'released')
            ON CONFLICT (reservation_key) DO NOTHING
            "#,
        )
        .bind(key.as_str())
        .bind(id.as_i64())
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await?;

        if tombstone.rows_affected() == 1 {
            tx.commit().await?;
            return Ok(ReleaseOutcome::Tombstoned);
        }

        let row = sqlx::query(
            r#"
            SELECT reservation_key, product_id, quantity, state
            FROM stock_reservations
            WHERE reservation_key = $1
            FOR UPDATE
            "#,
        )
        .bind(key.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let entry = Self::row_to_reservation(&row)?;

        if entry.state == ReservationState::Released {
            tx.commit().await?;
            return Ok(ReleaseOutcome::AlreadyReleased);
        }

        sqlx::query(
            r#"
            UPDATE stock_reservations
            SET state = 'released', updated_at = NOW()
            WHERE reservation_key = $1
            "#,
        )
        .bind(key.as_str())
        .execute(&mut *tx)
        .await?;
        let found = Self::increment(&mut tx, entry.product_id, entry.quantity).await?;
        tx.commit().await?;

        Ok(if found {
            ReleaseOutcome::Released
        } else {
            ReleaseOutcome::ProductNotFound
        })
    }

    async fn reservation(&self, key: &ReservationKey) -> Result<Option<Reservation>> {
        let row = sqlx::query(
            r#"
            SELECT reservation_key, product_id, quantity, state
            FROM stock_reservations
            WHERE reservation_key = $1
            "#,
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_reservation).transpose()
    }
}
