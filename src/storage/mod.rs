// ============================================================================
// Order Store
// ============================================================================
//
// Durable home of the order aggregate. The store is the source of truth; the
// in-memory cache only mirrors it.
//
// - postgres - sqlx implementation over the four-table schema
//
// ============================================================================

mod postgres;

use async_trait::async_trait;

use crate::models::Order;

pub use postgres::PgOrderStore;

/// Result of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The aggregate was written in full.
    Inserted,
    /// An order with this `order_uid` already existed; nothing was written.
    Duplicate,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("order not found: {0}")]
    NotFound(String),

    /// The database refused the data itself; retrying cannot help.
    #[error("order rejected by database: {0}")]
    Rejected(sqlx::Error),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        let code = e.as_database_error().and_then(|db| db.code()).map(|c| c.into_owned());
        if code.as_deref().is_some_and(is_data_exception) {
            StoreError::Rejected(e)
        } else {
            StoreError::Database(e)
        }
    }
}

/// SQLSTATE class 22: bad values (NUL bytes, out-of-range numbers, ...).
fn is_data_exception(sqlstate: &str) -> bool {
    sqlstate.starts_with("22")
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist the whole aggregate atomically. Re-inserting a known
    /// `order_uid` is a no-op reported as `Duplicate`.
    async fn insert(&self, order: &Order) -> Result<InsertOutcome, StoreError>;

    /// Load the aggregate for `order_uid`.
    async fn get(&self, order_uid: &str) -> Result<Order, StoreError>;

    /// Up to `limit` orders, newest `date_created` first.
    async fn recent_orders(&self, limit: i64) -> Result<Vec<Order>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_exceptions_are_recognised() {
        assert!(is_data_exception("22021")); // NUL in text
        assert!(is_data_exception("22003")); // numeric out of range
        assert!(!is_data_exception("23505")); // unique violation
        assert!(!is_data_exception("08006")); // connection failure
    }

    #[test]
    fn test_non_database_errors_stay_transient() {
        assert!(matches!(StoreError::from(sqlx::Error::PoolTimedOut), StoreError::Database(_)));
    }
}
