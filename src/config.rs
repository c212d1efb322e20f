//! Configuration for the bet ledger

use anyhow::Result;
use std::env;

/// Runtime configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite ledger database
    pub database_path: String,

    /// Base URL of the CLOB API
    pub clob_base_url: String,

    /// Base URL of the Gamma markets API
    pub gamma_base_url: String,

    /// Reconciliation poll interval in seconds
    pub poll_interval_seconds: u64,

    /// How long shutdown waits for an in-flight sweep, in seconds
    pub join_timeout_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "bets.db".to_string());

        let clob_base_url = env::var("CLOB_BASE_URL")
            .unwrap_or_else(|_| "https://clob.polymarket.com".to_string());

        let gamma_base_url = env::var("GAMMA_BASE_URL")
            .unwrap_or_else(|_| "https://gamma-api.polymarket.com".to_string());

        let poll_interval_seconds = env::var("POLL_INTERVAL_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let join_timeout_seconds = env::var("JOIN_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        if poll_interval_seconds == 0 {
            anyhow::bail!("POLL_INTERVAL_SECONDS must be at least 1");
        }

        Ok(Self {
            database_path,
            clob_base_url,
            gamma_base_url,
            poll_interval_seconds,
            join_timeout_seconds,
        })
    }
}
