//! Repository layer for database operations.
//!
//! All SQL lives here. Methods are organized across submodules by domain:
//! - `wallets.rs` - Wallet and ledger-entry operations
//! - `payments.rs` - Payment and refund-source operations
//! - `placements.rs` - Ad, category, slot, and placement operations
//!
//! Settlement-path methods take a `&mut SqliteConnection` so the
//! coordinator can span one transaction across all the records a business
//! event touches. Read-only convenience methods run on the pool.

mod payments;
mod placements;
mod wallets;

use crate::domain::Money;
use sqlx::sqlite::SqlitePool;

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// The underlying pool, for opening unit-of-work transactions.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Decode a canonical money string stored in a TEXT column.
pub(crate) fn decode_money(raw: &str, column: &str) -> Result<Money, sqlx::Error> {
    Money::from_str_canonical(raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Wrap a domain parse failure as a column decode error.
pub(crate) fn decode_err(
    column: &str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: source.into(),
    }
}
