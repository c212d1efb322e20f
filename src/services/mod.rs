//! Background services for the bet ledger

pub mod monitor;

pub use monitor::BetMonitor;
