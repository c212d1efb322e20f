//! Bet Tracker Library
//!
//! A position and settlement tracker for Polymarket prediction markets:
//!
//! 1. **Ledger**: a durable SQLite record of every bet placed, from order
//!    submission through settlement.
//! 2. **Reconciliation**: a background monitor that polls the exchange for
//!    order status and market resolution, settles finished bets, and
//!    broadcasts every status change.
//! 3. **Positions**: net open positions derived from raw fills, marked to
//!    the current market price.

pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod pnl;
pub mod positions;
pub mod services;
pub mod types;

pub use client::{ExchangeClient, MarketLookup, OrderLookup, PriceLookup};
pub use config::Config;
pub use db::Database;
pub use error::Error;
pub use services::BetMonitor;
pub use types::{
    BetEvent, BetRecord, BetStatus, Fill, HistoryFilter, LedgerStats, NewBet, PositionSnapshot,
    Settlement, Side, StatusFilter,
};
