use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// The order record as it arrives on the stream and as it is served back over
// HTTP. Producers are lenient: every field may be missing and then takes its
// zero value. Business rules are enforced by `Order::validate`, never by the
// deserializer.
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Order {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: Option<DateTime<Utc>>,
    pub oof_shard: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Delivery {
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Payment {
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: i64,
    /// Unix seconds.
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: i64,
    pub goods_total: i64,
    pub custom_fee: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Item {
    pub chrt_id: i64,
    pub track_number: String,
    pub price: i64,
    pub rid: String,
    pub name: String,
    pub sale: i32,
    pub size: String,
    pub total_price: i64,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

// ============================================================================
// Business Rule Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderError {
    #[error("order_uid is empty")]
    MissingOrderUid,

    #[error("payment transaction is empty")]
    MissingTransaction,
}

impl Order {
    /// Decode a raw stream payload. Unknown fields are ignored.
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Check the invariants an order must hold before it may be persisted.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.order_uid.trim().is_empty() {
            return Err(OrderError::MissingOrderUid);
        }
        if self.payment.transaction.trim().is_empty() {
            return Err(OrderError::MissingTransaction);
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
