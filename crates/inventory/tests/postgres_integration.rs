//! PostgreSQL inventory store integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p inventory --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{Money, OrderId, ProductId, ReservationKey};
use inventory::{
    InventoryService, InventoryStore, NewProduct, PostgresInventoryStore, ProductUpdate,
    ReleaseOutcome, ReserveOutcome, ReservationState,
};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/004_bound_stock_levels.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

async fn get_test_store() -> PostgresInventoryStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE products, stock_reservations RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();

    PostgresInventoryStore::new(pool)
}

async fn insert_product(store: &PostgresInventoryStore, quantity: u32) -> ProductId {
    store
        .insert(NewProduct {
            name: "Widget".to_string(),
            description: "Blue".to_string(),
            unit_price: Money::from_cents(1250),
            quantity_on_hand: quantity,
        })
        .await
        .unwrap()
        .id
}

async fn on_hand(store: &PostgresInventoryStore, id: ProductId) -> u32 {
    store.get(id).await.unwrap().unwrap().quantity_on_hand
}

#[tokio::test]
async fn test_product_crud() {
    let store = get_test_store().await;
    let id = insert_product(&store, 5).await;

    let product = store.get(id).await.unwrap().unwrap();
    assert_eq!(product.name, "Widget");
    assert_eq!(product.unit_price, Money::from_cents(1250));

    let updated = store
        .update(
            id,
            ProductUpdate {
                unit_price: Some(Money::from_cents(1500)),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.unit_price, Money::from_cents(1500));
    assert_eq!(updated.description, "Blue");

    assert!(store.set_quantity(id, 9).await.unwrap());
    assert_eq!(on_hand(&store, id).await, 9);

    assert_eq!(store.list().await.unwrap().len(), 1);
    assert!(store.delete(id).await.unwrap());
    assert!(store.get(id).await.unwrap().is_none());
    assert!(
        store
            .update(ProductId::new(999), ProductUpdate::default())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_conditional_reserve() {
    let store = get_test_store().await;
    let id = insert_product(&store, 5).await;

    assert_eq!(
        store.reserve(id, 3, None).await.unwrap(),
        ReserveOutcome::Reserved
    );
    assert_eq!(
        store.reserve(id, 3, None).await.unwrap(),
        ReserveOutcome::InsufficientStock
    );
    assert_eq!(
        store.reserve(ProductId::new(999), 1, None).await.unwrap(),
        ReserveOutcome::ProductNotFound
    );
    assert_eq!(on_hand(&store, id).await, 2);
}

#[tokio::test]
async fn test_keyed_reserve_and_release_ledger() {
    let store = get_test_store().await;
    let id = insert_product(&store, 5).await;
    let key = ReservationKey::for_line(OrderId::new(10), 1);

    assert_eq!(
        store.reserve(id, 2, Some(&key)).await.unwrap(),
        ReserveOutcome::Reserved
    );
    assert_eq!(
        store.reserve(id, 2, Some(&key)).await.unwrap(),
        ReserveOutcome::AlreadyApplied
    );
    assert_eq!(on_hand(&store, id).await, 3);

    let entry = store.reservation(&key).await.unwrap().unwrap();
    assert_eq!(entry.state, ReservationState::Applied);
    assert_eq!(entry.quantity, 2);

    assert_eq!(
        store.release(id, 2, Some(&key)).await.unwrap(),
        ReleaseOutcome::Released
    );
    assert_eq!(
        store.release(id, 2, Some(&key)).await.unwrap(),
        ReleaseOutcome::AlreadyReleased
    );
    assert_eq!(on_hand(&store, id).await, 5);
}

#[tokio::test]
async fn test_failed_keyed_reserve_leaves_no_claim() {
    let store = get_test_store().await;
    let id = insert_product(&store, 1).await;
    let key = ReservationKey::for_line(OrderId::new(11), 1);

    assert_eq!(
        store.reserve(id, 2, Some(&key)).await.unwrap(),
        ReserveOutcome::InsufficientStock
    );
    assert!(store.reservation(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_tombstone_blocks_late_reserve() {
    let store = get_test_store().await;
    let id = insert_product(&store, 5).await;
    let key = ReservationKey::for_line(OrderId::new(12), 1);

    assert_eq!(
        store.release(id, 2, Some(&key)).await.unwrap(),
        ReleaseOutcome::Tombstoned
    );
    assert_eq!(
        store.reserve(id, 2, Some(&key)).await.unwrap(),
        ReserveOutcome::AlreadyReleased
    );
    assert_eq!(on_hand(&store, id).await, 5);
}

#[tokio::test]
async fn test_release_past_stock_limit_is_rejected() {
    let store = get_test_store().await;
    let id = insert_product(&store, u32::MAX - 5).await;

    let result = store.release(id, 10, None).await;
    assert!(matches!(result, Err(inventory::InventoryError::Validation(_))));
    // The product is still readable and unchanged
    assert_eq!(on_hand(&store, id).await, u32::MAX - 5);

    let key = ReservationKey::for_line(OrderId::new(13), 1);
    assert_eq!(
        store.reserve(id, 3, Some(&key)).await.unwrap(),
        ReserveOutcome::Reserved
    );
    store.set_quantity(id, u32::MAX).await.unwrap();
    let result = store.release(id, 3, Some(&key)).await;
    assert!(matches!(result, Err(inventory::InventoryError::Validation(_))));
    let entry = store.reservation(&key).await.unwrap().unwrap();
    assert_eq!(entry.state, ReservationState::Applied);

    assert_eq!(
        store.release(ProductId::new(9999), 1, None).await.unwrap(),
        ReleaseOutcome::ProductNotFound
    );
}

#[tokio::test]
async fn test_stock_level_constraint() {
    let store = get_test_store().await;
    let id = insert_product(&store, u32::MAX).await;

    let result =
        sqlx::query("UPDATE products SET quantity_on_hand = quantity_on_hand + 1 WHERE id = $1")
            .bind(id.as_i64())
            .execute(store.pool())
            .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_concurrent_reservations_never_oversell() {
    let store = get_test_store().await;
    let id = insert_product(&store, 10).await;
    let service = Arc::new(InventoryService::new(Arc::new(store.clone())));

    let mut handles = Vec::new();
    for order in 1..=30 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let key = ReservationKey::for_line(OrderId::new(order), 1);
            service.reserve_stock(id, 1, Some(&key)).await.unwrap()
        }));
    }

    let mut reserved = 0;
    for handle in handles {
        if handle.await.unwrap() == ReserveOutcome::Reserved {
            reserved += 1;
        }
    }

    assert_eq!(reserved, 10);
    assert_eq!(on_hand(&store, id).await, 0);
}
