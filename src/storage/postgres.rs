use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use super::{InsertOutcome, OrderRepository, StoreError};
use crate::models::{Delivery, Item, Order, Payment};

const SCHEMA: &str = include_str!("schema.sql");

type OrderRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i32,
    Option<DateTime<Utc>>,
    String,
    i64,
    i64,
);

type DeliveryRow = (String, String, String, String, String, String, String);

type PaymentRow = (String, String, String, String, i64, i64, String, i64, i64, i64);

type ItemRow = (i64, String, i64, String, String, i32, String, i64, i64, String, i32);

// ============================================================================
// Postgres Order Store
// ============================================================================
//
// Normalized layout: `deliveries` and `payments` get surrogate BIGSERIAL ids
// that the `orders` row references; `items` rows point back at `order_uid`.
// Each insert is one transaction, so a reader never sees half an aggregate.
//
// ============================================================================

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Open a bounded connection pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .max_lifetime(Duration::from_secs(60 * 60))
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = max_connections, "Connected to Postgres");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the four order tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::debug!("Order schema ensured");
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        // Dropping `tx` on an early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        let delivery = &order.delivery;
        let (delivery_id,): (i64,) = sqlx::query_as(
            "INSERT INTO deliveries (name, phone, zip, city, address, region, email)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING id",
        )
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .fetch_one(&mut *tx)
        .await?;

        let payment = &order.payment;
        let (payment_id,): (i64,) = sqlx::query_as(
            "INSERT INTO payments (
                transaction, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING id",
        )
        .bind(&payment.transaction)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .fetch_one(&mut *tx)
        .await?;

        let inserted: Option<(String,)> = sqlx::query_as(
            "INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created,
                oof_shard, delivery_id, payment_id
             ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (order_uid) DO NOTHING
             RETURNING order_uid",
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .bind(delivery_id)
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            // Redelivery of a known order: keep the stored aggregate as is and
            // drop the delivery/payment rows written above.
            tx.rollback().await?;
            tracing::debug!(order_uid = %order.order_uid, "Order already stored, skipping");
            return Ok(InsertOutcome::Duplicate);
        }

        for item in &order.items {
            sqlx::query(
                "INSERT INTO items (
                    order_uid, chrt_id, track_number, price, rid, name,
                    sale, size, total_price, nm_id, brand, status
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(&order.order_uid)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            order_uid = %order.order_uid,
            delivery_id = delivery_id,
            payment_id = payment_id,
            item_count = order.items.len(),
            "Order aggregate committed"
        );

        Ok(InsertOutcome::Inserted)
    }

    async fn get(&self, order_uid: &str) -> Result<Order, StoreError> {
        let mut conn = self.pool.acquire().await?;

        let row: Option<OrderRow> = sqlx::query_as(
            "SELECT order_uid, track_number, entry, locale, internal_signature,
                    customer_id, delivery_service, shardkey, sm_id, date_created,
                    oof_shard, delivery_id, payment_id
             FROM orders WHERE order_uid = $1",
        )
        .bind(order_uid)
        .fetch_optional(&mut *conn)
        .await?;

        let (
            order_uid,
            track_number,
            entry,
            locale,
            internal_signature,
            customer_id,
            delivery_service,
            shardkey,
            sm_id,
            date_created,
            oof_shard,
            delivery_id,
            payment_id,
        ) = row.ok_or_else(|| StoreError::NotFound(order_uid.to_string()))?;

        let (name, phone, zip, city, address, region, email): DeliveryRow = sqlx::query_as(
            "SELECT name, phone, zip, city, address, region, email
             FROM deliveries WHERE id = $1",
        )
        .bind(delivery_id)
        .fetch_one(&mut *conn)
        .await?;

        let (
            transaction,
            request_id,
            currency,
            provider,
            amount,
            payment_dt,
            bank,
            delivery_cost,
            goods_total,
            custom_fee,
        ): PaymentRow = sqlx::query_as(
            "SELECT transaction, request_id, currency, provider, amount,
                    payment_dt, bank, delivery_cost, goods_total, custom_fee
             FROM payments WHERE id = $1",
        )
        .bind(payment_id)
        .fetch_one(&mut *conn)
        .await?;

        let item_rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT chrt_id, track_number, price, rid, name, sale,
                    size, total_price, nm_id, brand, status
             FROM items WHERE order_uid = $1
             ORDER BY id",
        )
        .bind(&order_uid)
        .fetch_all(&mut *conn)
        .await?;

        let items = item_rows
            .into_iter()
            .map(
                |(chrt_id, track_number, price, rid, name, sale, size, total_price, nm_id, brand, status)| Item {
                    chrt_id,
                    track_number,
                    price,
                    rid,
                    name,
                    sale,
                    size,
                    total_price,
                    nm_id,
                    brand,
                    status,
                },
            )
            .collect();

        Ok(Order {
            order_uid,
            track_number,
            entry,
            delivery: Delivery {
                name,
                phone,
                zip,
                city,
                address,
                region,
                email,
            },
            payment: Payment {
                transaction,
                request_id,
                currency,
                provider,
                amount,
                payment_dt,
                bank,
                delivery_cost,
                goods_total,
                custom_fee,
            },
            items,
            locale,
            internal_signature,
            customer_id,
            delivery_service,
            shardkey,
            sm_id,
            date_created,
            oof_shard,
        })
    }

    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, StoreError> {
        let uids: Vec<(String,)> = sqlx::query_as(
            "SELECT order_uid FROM orders
             ORDER BY date_created DESC NULLS LAST
             LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut orders = Vec::with_capacity(uids.len());
        for (order_uid,) in uids {
            orders.push(self.get(&order_uid).await?);
        }

        tracing::debug!(count = orders.len(), limit = limit, "Loaded recent orders");
        Ok(orders)
    }
}
