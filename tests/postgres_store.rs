//! Store tests against a live Postgres. Skipped unless DATABASE_URL is set.

use chrono::{DateTime, Utc};
use order_pipeline::models::{Delivery, Item, Order, Payment};
use order_pipeline::storage::{InsertOutcome, OrderRepository, PgOrderStore, StoreError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;

// Concurrent CREATE TABLE IF NOT EXISTS can race on a fresh database.
static SCHEMA: OnceCell<()> = OnceCell::const_new();

async fn store() -> Option<PgOrderStore> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            println!("Skipping store test: DATABASE_URL not set");
            return None;
        }
    };

    let store = PgOrderStore::connect(&database_url, 4)
        .await
        .expect("Failed to connect to test DB");
    SCHEMA
        .get_or_init(|| async { store.ensure_schema().await.expect("Failed to create schema") })
        .await;
    Some(store)
}

fn unique_uid(label: &str) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    format!("{label}-{}-{nanos}", std::process::id())
}

fn order(uid: &str) -> Order {
    Order {
        order_uid: uid.to_string(),
        track_number: "WBILMTESTTRACK".to_string(),
        entry: "WBIL".to_string(),
        delivery: Delivery {
            name: uid.to_string(),
            phone: "+9720000000".to_string(),
            zip: "2639809".to_string(),
            city: "Kiryat Mozkin".to_string(),
            address: "Ploshad Mira 15".to_string(),
            region: "Kraiot".to_string(),
            email: "test@gmail.com".to_string(),
        },
        payment: Payment {
            transaction: format!("{uid}-tx"),
            currency: "USD".to_string(),
            provider: "wbpay".to_string(),
            amount: 1817,
            payment_dt: 1637907727,
            bank: "alpha".to_string(),
            delivery_cost: 1500,
            goods_total: 317,
            ..Default::default()
        },
        items: vec![
            Item {
                chrt_id: 9934930,
                track_number: "WBILMTESTTRACK".to_string(),
                price: 453,
                rid: "ab4219087a764ae0btest".to_string(),
                name: "Mascaras".to_string(),
                sale: 30,
                size: "0".to_string(),
                total_price: 317,
                nm_id: 2389212,
                brand: "Vivienne Sabo".to_string(),
                status: 202,
            },
            Item {
                chrt_id: 9934931,
                name: "Lipstick".to_string(),
                price: 120,
                total_price: 120,
                ..Default::default()
            },
        ],
        locale: "en".to_string(),
        customer_id: "test".to_string(),
        delivery_service: "meest".to_string(),
        shardkey: "9".to_string(),
        sm_id: 99,
        date_created: "2021-11-26T06:22:19Z".parse().ok(),
        oof_shard: "1".to_string(),
        ..Default::default()
    }
}

async fn count(store: &PgOrderStore, sql: &str, bind: &str) -> i64 {
    sqlx::query_scalar(sql)
        .bind(bind)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_insert_then_get_returns_same_order() {
    let Some(store) = store().await else { return };
    let uid = unique_uid("roundtrip");
    let original = order(&uid);

    assert_eq!(store.insert(&original).await.unwrap(), InsertOutcome::Inserted);
    let loaded = store.get(&uid).await.unwrap();

    assert_eq!(loaded, original);
}

#[tokio::test]
async fn test_duplicate_insert_keeps_first_version() {
    let Some(store) = store().await else { return };
    let uid = unique_uid("dup");
    let first = order(&uid);

    let mut second = order(&uid);
    second.payment.transaction = format!("{uid}-tx-second");
    second.delivery.name = format!("{uid}-second");
    second.items.truncate(1);
    second.items[0].name = "Replacement".to_string();

    assert_eq!(store.insert(&first).await.unwrap(), InsertOutcome::Inserted);
    assert_eq!(store.insert(&second).await.unwrap(), InsertOutcome::Duplicate);

    assert_eq!(store.get(&uid).await.unwrap(), first);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM orders WHERE order_uid = $1", &uid).await, 1);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM items WHERE order_uid = $1", &uid).await, 2);
    // The losing attempt leaves no detached delivery or payment behind.
    assert_eq!(
        count(&store, "SELECT COUNT(*) FROM payments WHERE transaction = $1", &second.payment.transaction).await,
        0
    );
    assert_eq!(
        count(&store, "SELECT COUNT(*) FROM deliveries WHERE name = $1", &second.delivery.name).await,
        0
    );
}

#[tokio::test]
async fn test_failed_item_insert_rolls_back_everything() {
    let Some(store) = store().await else { return };
    let uid = unique_uid("atomic");
    let mut broken = order(&uid);
    // Postgres rejects NUL in text columns, so the second item insert fails.
    broken.items[1].name = "bad\u{0}name".to_string();

    let result = store.insert(&broken).await;

    assert!(matches!(result, Err(StoreError::Rejected(_))));
    assert!(matches!(store.get(&uid).await, Err(StoreError::NotFound(_))));
    assert_eq!(count(&store, "SELECT COUNT(*) FROM items WHERE order_uid = $1", &uid).await, 0);
    assert_eq!(
        count(&store, "SELECT COUNT(*) FROM payments WHERE transaction = $1", &broken.payment.transaction).await,
        0
    );
    assert_eq!(count(&store, "SELECT COUNT(*) FROM deliveries WHERE name = $1", &uid).await, 0);
}

#[tokio::test]
async fn test_get_unknown_order_is_not_found() {
    let Some(store) = store().await else { return };
    let uid = unique_uid("ghost");

    match store.get(&uid).await {
        Err(StoreError::NotFound(missing)) => assert_eq!(missing, uid),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[tokio::test]
async fn test_recent_orders_newest_first() {
    let Some(store) = store().await else { return };

    // Far-future dates so rows from other tests never outrank these.
    let base = Utc::now().timestamp() + 500 * 365 * 24 * 3600;
    let mut uids = Vec::new();
    for (i, label) in ["oldest", "middle", "newest"].iter().enumerate() {
        let uid = unique_uid(label);
        let mut o = order(&uid);
        o.date_created = DateTime::<Utc>::from_timestamp(base + i as i64 * 60, 0);
        store.insert(&o).await.unwrap();
        uids.push(uid);
    }

    let recent: Vec<String> = store
        .recent_orders(3)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.order_uid)
        .collect();

    uids.reverse();
    assert_eq!(recent, uids);
}
