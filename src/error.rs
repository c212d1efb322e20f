//! Error taxonomy for the ledger core.
//!
//! Collaborator failures (order/market/price lookups) stay `anyhow` at the
//! service layer and are degraded locally; only the errors callers must
//! distinguish get a variant here.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input to the ledger; indicates a caller bug, never retried
    #[error("missing required field: {0}")]
    Validation(&'static str),

    /// A settlement price outside {0.0, 1.0} was observed. Binary markets
    /// only; computing P&L for anything else would be silently wrong.
    #[error("unsupported settlement price {0}, expected 0.0 or 1.0")]
    UnsupportedSettlement(Decimal),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
