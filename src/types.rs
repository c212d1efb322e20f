//! Core types for the bet ledger and reconciliation loop

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading side of a bet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Default for Side {
    fn default() -> Self {
        Side::Buy
    }
}

impl Side {
    /// Parse from the exchange's side string ("BUY"/"SELL", case-insensitive)
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("sell") {
            Side::Sell
        } else {
            Side::Buy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle status of a bet record.
///
/// Transitions are monotonic: `pending -> active -> settled`, with
/// `pending|active -> cancelled` as alternate terminal paths and the
/// user-triggered soft delete `* -> deleted`. Nothing leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Active,
    Settled,
    Cancelled,
    Deleted,
}

impl BetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BetStatus::Pending => "pending",
            BetStatus::Active => "active",
            BetStatus::Settled => "settled",
            BetStatus::Cancelled => "cancelled",
            BetStatus::Deleted => "deleted",
        }
    }

    /// Parse a stored status string; unrecognized input yields `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(BetStatus::Pending),
            "active" => Some(BetStatus::Active),
            "settled" => Some(BetStatus::Settled),
            "cancelled" => Some(BetStatus::Cancelled),
            "deleted" => Some(BetStatus::Deleted),
            _ => None,
        }
    }

    /// Terminal states never transition again (soft delete aside)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BetStatus::Settled | BetStatus::Cancelled | BetStatus::Deleted
        )
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One intended or executed wager, as persisted in the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRecord {
    /// Store-assigned identifier, immutable
    pub id: i64,
    /// Exchange order id; null until the exchange accepts the order,
    /// unique and immutable once set
    pub order_id: Option<String>,
    /// Outcome token the bet was placed on
    pub token_id: String,
    /// Market/condition id grouping the outcome tokens
    pub market_id: Option<String>,
    pub market_question: String,
    pub outcome: String,
    pub side: Side,
    /// Entry price, 0 < p < 1
    pub price: Decimal,
    /// Size in shares
    pub size: Decimal,
    /// price * size at placement time
    pub amount_spent: Decimal,
    pub status: BetStatus,
    pub placed_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    /// Final market price, 0.0 or 1.0 for binary markets
    pub settled_price: Option<Decimal>,
    pub pnl: Option<Decimal>,
    /// Realized return on cost, in percent
    pub roi: Option<Decimal>,
}

/// Fields supplied by the caller when recording a new bet
#[derive(Debug, Clone, Default)]
pub struct NewBet {
    pub order_id: Option<String>,
    pub token_id: String,
    pub market_id: Option<String>,
    pub market_question: String,
    pub outcome: String,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
}

/// Settlement fields written as one atomic group when a bet settles
#[derive(Debug, Clone)]
pub struct Settlement {
    pub settled_at: DateTime<Utc>,
    pub settled_price: Decimal,
    pub pnl: Decimal,
    pub roi: Decimal,
}

/// Status filter for history queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    Active,
    Settled,
    Cancelled,
}

impl StatusFilter {
    /// The concrete status this filter matches, if any
    pub fn status(&self) -> Option<BetStatus> {
        match self {
            StatusFilter::All => None,
            StatusFilter::Pending => Some(BetStatus::Pending),
            StatusFilter::Active => Some(BetStatus::Active),
            StatusFilter::Settled => Some(BetStatus::Settled),
            StatusFilter::Cancelled => Some(BetStatus::Cancelled),
        }
    }
}

/// History query options; deleted records are always excluded
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: StatusFilter,
    /// Lookback window in days; unset means all time
    pub period_days: Option<i64>,
    /// Substring match against the market question
    pub search: Option<String>,
}

/// Ledger-wide statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total_bets: i64,
    pub active_bets: i64,
    pub settled_bets: i64,
    pub total_pnl: Decimal,
    /// Settled bets with positive pnl over all settled bets, in percent
    pub win_rate: f64,
}

/// A confirmed or pending trade execution reported by the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub token_id: String,
    pub market_id: Option<String>,
    pub outcome: String,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    /// Raw exchange status string; only filled/matched/active count
    pub status: String,
}

impl Fill {
    /// Whether this fill contributes to position
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self.status.to_lowercase().as_str(),
            "filled" | "matched" | "active"
        )
    }
}

/// Net open position for one outcome token, derived from fills.
/// Recomputed on demand, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub token_id: String,
    pub market_id: Option<String>,
    pub outcome: String,
    /// Signed; positive = net long
    pub net_size: Decimal,
    pub avg_entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    /// Percent of cost basis
    pub unrealized_roi: Decimal,
}

/// Normalized order status from the exchange.
///
/// The exchange vocabulary is open; anything unrecognized is carried as
/// `Unknown` so the loop can fall back rather than guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderState {
    /// matched / filled
    Matched,
    /// open / pending, still on the book
    Open,
    /// cancelled / canceled
    Cancelled,
    Unknown(String),
}

impl OrderState {
    pub fn parse(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "matched" | "filled" => OrderState::Matched,
            "open" | "pending" => OrderState::Open,
            "cancelled" | "canceled" => OrderState::Cancelled,
            other => OrderState::Unknown(other.to_string()),
        }
    }
}

/// Resolution state of a market
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Not closed, or closed without a resolved outcome yet
    Pending,
    /// Final settlement price: 1.0 when the resolved outcome is YES, else 0.0
    Resolved(Decimal),
}

/// Event emitted after every committed status transition
#[derive(Debug, Clone)]
pub struct BetEvent {
    pub record: BetRecord,
    pub new_status: BetStatus,
}
