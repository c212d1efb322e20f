//! SQLite bet ledger: durable CRUD over bet records.
//!
//! The pool is capped at a single connection, so every operation acquires the
//! one connection and runs serialized; each statement is individually atomic.
//! Throughput does not matter at the scale of one trader's bet log, torn
//! reads do. The store performs no network I/O, so the connection is never
//! held across an external call.

use crate::error::{Error, Result};
use crate::types::{
    BetRecord, BetStatus, HistoryFilter, LedgerStats, NewBet, Settlement, Side,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::info;

/// Ledger database handle
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the ledger at `path`
    pub async fn new(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(Error::Database)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.initialize().await?;

        Ok(db)
    }

    /// Create schema and indexes
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                order_id TEXT UNIQUE,
                token_id TEXT NOT NULL,
                market_id TEXT,
                market_question TEXT NOT NULL,
                outcome TEXT NOT NULL,
                side TEXT NOT NULL DEFAULT 'BUY',
                price TEXT NOT NULL,
                size TEXT NOT NULL,
                amount_spent TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                placed_at TEXT NOT NULL,
                settled_at TEXT,
                settled_price TEXT,
                pnl TEXT,
                roi TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bets_status ON bets(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_bets_placed_at ON bets(placed_at DESC)")
            .execute(&self.pool)
            .await?;

        info!("Ledger database initialized");
        Ok(())
    }

    /// Record a new bet. Status starts at pending, the placement timestamp
    /// is stamped here, and amount_spent is computed from price and size.
    pub async fn insert(&self, bet: NewBet) -> Result<i64> {
        if bet.token_id.is_empty() {
            return Err(Error::Validation("token_id"));
        }
        if bet.outcome.is_empty() {
            return Err(Error::Validation("outcome"));
        }

        let amount_spent = bet.price * bet.size;
        let placed_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO bets (order_id, token_id, market_id, market_question,
                              outcome, side, price, size, amount_spent, status, placed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(&bet.order_id)
        .bind(&bet.token_id)
        .bind(&bet.market_id)
        .bind(&bet.market_question)
        .bind(&bet.outcome)
        .bind(bet.side.as_str())
        .bind(bet.price.to_string())
        .bind(bet.size.to_string())
        .bind(amount_spent.to_string())
        .bind(placed_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Update a bet's status, and the settlement group with it when provided,
    /// as one atomic write.
    ///
    /// Missing ids are a silent no-op. Terminal records never regress: the
    /// only status that may overwrite a terminal one is the soft delete.
    pub async fn update_status(
        &self,
        id: i64,
        status: BetStatus,
        settlement: Option<Settlement>,
    ) -> Result<()> {
        // Soft delete applies from any state; everything else only moves
        // non-terminal records forward.
        let guard = if status == BetStatus::Deleted {
            "status != 'deleted'"
        } else {
            "status IN ('pending', 'active')"
        };

        match settlement {
            Some(s) => {
                let query = format!(
                    "UPDATE bets SET status = ?, settled_at = ?, settled_price = ?, pnl = ?, roi = ? \
                     WHERE id = ? AND {guard}"
                );
                sqlx::query(&query)
                    .bind(status.as_str())
                    .bind(s.settled_at.to_rfc3339())
                    .bind(s.settled_price.to_string())
                    .bind(s.pnl.to_string())
                    .bind(s.roi.to_string())
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                let query = format!("UPDATE bets SET status = ? WHERE id = ? AND {guard}");
                sqlx::query(&query)
                    .bind(status.as_str())
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// All pending and active bets, newest placed first
    pub async fn get_active(&self) -> Result<Vec<BetRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM bets WHERE status IN ('pending', 'active') \
             ORDER BY placed_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_bet).collect()
    }

    /// Bet history with optional status/period/search filters.
    /// Deleted bets are always excluded.
    pub async fn get_history(&self, filter: &HistoryFilter) -> Result<Vec<BetRecord>> {
        let mut query = String::from("SELECT * FROM bets WHERE status != 'deleted'");
        let mut binds: Vec<String> = Vec::new();

        if let Some(status) = filter.status.status() {
            query.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }

        if let Some(days) = filter.period_days {
            let cutoff = Utc::now() - Duration::days(days);
            query.push_str(" AND placed_at >= ?");
            binds.push(cutoff.to_rfc3339());
        }

        if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
            query.push_str(" AND market_question LIKE ?");
            binds.push(format!("%{}%", search));
        }

        query.push_str(" ORDER BY placed_at DESC, id DESC");

        let mut q = sqlx::query(&query);
        for bind in &binds {
            q = q.bind(bind);
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_bet).collect()
    }

    /// Look up one bet by its ledger id; deleted bets remain retrievable here
    pub async fn get_by_id(&self, id: i64) -> Result<Option<BetRecord>> {
        let row = sqlx::query("SELECT * FROM bets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_bet).transpose()
    }

    /// Look up one bet by its exchange order id
    pub async fn get_by_order_id(&self, order_id: &str) -> Result<Option<BetRecord>> {
        let row = sqlx::query("SELECT * FROM bets WHERE order_id = ?")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_bet).transpose()
    }

    /// Ledger-wide statistics
    pub async fn stats(&self) -> Result<LedgerStats> {
        let (total, active, settled): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) as total,
                COALESCE(SUM(CASE WHEN status IN ('pending', 'active') THEN 1 ELSE 0 END), 0) as active,
                COALESCE(SUM(CASE WHEN status = 'settled' THEN 1 ELSE 0 END), 0) as settled
            FROM bets
            WHERE status != 'deleted'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        // Sum pnl as Decimal; the ledger stores exact values, stats keep them
        let pnls: Vec<(String,)> =
            sqlx::query_as("SELECT pnl FROM bets WHERE status = 'settled' AND pnl IS NOT NULL")
                .fetch_all(&self.pool)
                .await?;

        let mut total_pnl = Decimal::ZERO;
        let mut wins = 0i64;
        for (pnl,) in &pnls {
            let pnl = parse_decimal(pnl)?;
            if pnl > Decimal::ZERO {
                wins += 1;
            }
            total_pnl += pnl;
        }

        let win_rate = if settled > 0 {
            wins as f64 / settled as f64 * 100.0
        } else {
            0.0
        };

        Ok(LedgerStats {
            total_bets: total,
            active_bets: active,
            settled_bets: settled,
            total_pnl,
            win_rate,
        })
    }
}

fn row_to_bet(row: &SqliteRow) -> Result<BetRecord> {
    let side: String = row.get("side");
    let status: String = row.get("status");

    let price: String = row.get("price");
    let size: String = row.get("size");
    let amount_spent: String = row.get("amount_spent");
    let placed_at: String = row.get("placed_at");

    let settled_at: Option<String> = row.get("settled_at");
    let settled_price: Option<String> = row.get("settled_price");
    let pnl: Option<String> = row.get("pnl");
    let roi: Option<String> = row.get("roi");

    Ok(BetRecord {
        id: row.get("id"),
        order_id: row.get("order_id"),
        token_id: row.get("token_id"),
        market_id: row.get("market_id"),
        market_question: row.get("market_question"),
        outcome: row.get("outcome"),
        side: Side::parse(&side),
        price: parse_decimal(&price)?,
        size: parse_decimal(&size)?,
        amount_spent: parse_decimal(&amount_spent)?,
        status: BetStatus::parse(&status).ok_or_else(|| {
            Error::Database(sqlx::Error::Decode(
                format!("unknown bet status '{}'", status).into(),
            ))
        })?,
        placed_at: parse_timestamp(&placed_at)?,
        settled_at: settled_at.as_deref().map(parse_timestamp).transpose()?,
        settled_price: settled_price.as_deref().map(parse_decimal).transpose()?,
        pnl: pnl.as_deref().map(parse_decimal).transpose()?,
        roi: roi.as_deref().map(parse_decimal).transpose()?,
    })
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| Error::Database(sqlx::Error::Decode(Box::new(e))))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Database(sqlx::Error::Decode(Box::new(e))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusFilter;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn sample_bet(order_id: Option<&str>) -> NewBet {
        NewBet {
            order_id: order_id.map(String::from),
            token_id: "token-1".to_string(),
            market_id: Some("market-1".to_string()),
            market_question: "Will T1 win the finals?".to_string(),
            outcome: "YES".to_string(),
            side: Side::Buy,
            price: dec!(0.40),
            size: dec!(10),
        }
    }

    #[tokio::test]
    async fn insert_applies_defaults_and_computes_amount() {
        let db = test_db().await;
        let id = db.insert(sample_bet(Some("ord-1"))).await.unwrap();

        let bet = db.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(bet.status, BetStatus::Pending);
        assert_eq!(bet.side, Side::Buy);
        assert_eq!(bet.amount_spent, dec!(4.00));
        assert!(bet.settled_at.is_none());
        assert!(bet.settled_price.is_none());
        assert!(bet.pnl.is_none());
        assert!(bet.roi.is_none());
    }

    #[tokio::test]
    async fn insert_rejects_missing_required_fields() {
        let db = test_db().await;

        let mut bet = sample_bet(None);
        bet.token_id = String::new();
        assert!(matches!(
            db.insert(bet).await,
            Err(Error::Validation("token_id"))
        ));

        let mut bet = sample_bet(None);
        bet.outcome = String::new();
        assert!(matches!(
            db.insert(bet).await,
            Err(Error::Validation("outcome"))
        ));
    }

    #[tokio::test]
    async fn order_id_is_unique() {
        let db = test_db().await;
        db.insert(sample_bet(Some("ord-1"))).await.unwrap();
        assert!(db.insert(sample_bet(Some("ord-1"))).await.is_err());
        // Never-submitted bets have no order id and do not collide
        db.insert(sample_bet(None)).await.unwrap();
        db.insert(sample_bet(None)).await.unwrap();
    }

    #[tokio::test]
    async fn update_status_on_missing_id_is_noop() {
        let db = test_db().await;
        db.update_status(9999, BetStatus::Active, None).await.unwrap();
    }

    #[tokio::test]
    async fn settlement_fields_are_written_as_a_group() {
        let db = test_db().await;
        let id = db.insert(sample_bet(Some("ord-1"))).await.unwrap();

        let before = db.get_by_id(id).await.unwrap().unwrap();
        assert!(before.settled_at.is_none() && before.pnl.is_none());

        db.update_status(
            id,
            BetStatus::Settled,
            Some(Settlement {
                settled_at: Utc::now(),
                settled_price: dec!(1.0),
                pnl: dec!(6.00),
                roi: dec!(150),
            }),
        )
        .await
        .unwrap();

        let after = db.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(after.status, BetStatus::Settled);
        assert!(after.settled_at.is_some());
        assert_eq!(after.settled_price, Some(dec!(1.0)));
        assert_eq!(after.pnl, Some(dec!(6.00)));
        assert_eq!(after.roi, Some(dec!(150)));
    }

    #[tokio::test]
    async fn terminal_records_never_regress() {
        let db = test_db().await;
        let id = db.insert(sample_bet(Some("ord-1"))).await.unwrap();
        db.update_status(id, BetStatus::Cancelled, None).await.unwrap();

        db.update_status(id, BetStatus::Active, None).await.unwrap();
        let bet = db.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(bet.status, BetStatus::Cancelled);

        // Soft delete is the one allowed move out of a terminal status
        db.update_status(id, BetStatus::Deleted, None).await.unwrap();
        let bet = db.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(bet.status, BetStatus::Deleted);
    }

    #[tokio::test]
    async fn soft_deleted_bets_vanish_from_queries_but_not_by_id() {
        let db = test_db().await;
        let id = db.insert(sample_bet(Some("ord-1"))).await.unwrap();

        db.update_status(id, BetStatus::Deleted, None).await.unwrap();

        assert!(db.get_active().await.unwrap().is_empty());
        assert!(db
            .get_history(&HistoryFilter::default())
            .await
            .unwrap()
            .is_empty());
        assert!(db.get_by_id(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn active_query_includes_pending_and_active_only() {
        let db = test_db().await;
        let pending = db.insert(sample_bet(Some("a"))).await.unwrap();
        let active = db.insert(sample_bet(Some("b"))).await.unwrap();
        let cancelled = db.insert(sample_bet(Some("c"))).await.unwrap();

        db.update_status(active, BetStatus::Active, None).await.unwrap();
        db.update_status(cancelled, BetStatus::Cancelled, None).await.unwrap();

        let records = db.get_active().await.unwrap();
        let ids: Vec<i64> = records.iter().map(|b| b.id).collect();
        assert!(ids.contains(&pending));
        assert!(ids.contains(&active));
        assert!(!ids.contains(&cancelled));
    }

    #[tokio::test]
    async fn history_filters_by_status_search_and_period() {
        let db = test_db().await;
        let mut other = sample_bet(Some("a"));
        other.market_question = "Will G2 make playoffs?".to_string();
        db.insert(other).await.unwrap();
        let settled = db.insert(sample_bet(Some("b"))).await.unwrap();
        db.update_status(
            settled,
            BetStatus::Settled,
            Some(Settlement {
                settled_at: Utc::now(),
                settled_price: dec!(1.0),
                pnl: dec!(6.00),
                roi: dec!(150),
            }),
        )
        .await
        .unwrap();

        let filter = HistoryFilter {
            status: StatusFilter::Settled,
            ..Default::default()
        };
        let records = db.get_history(&filter).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, settled);

        let filter = HistoryFilter {
            search: Some("T1".to_string()),
            ..Default::default()
        };
        let records = db.get_history(&filter).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, settled);

        let filter = HistoryFilter {
            period_days: Some(7),
            ..Default::default()
        };
        assert_eq!(db.get_history(&filter).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stats_reflect_settled_outcomes() {
        let db = test_db().await;
        let win = db.insert(sample_bet(Some("a"))).await.unwrap();
        let loss = db.insert(sample_bet(Some("b"))).await.unwrap();
        db.insert(sample_bet(Some("c"))).await.unwrap();

        for (id, pnl, roi, price) in [
            (win, dec!(6.00), dec!(150), dec!(1.0)),
            (loss, dec!(-4.00), dec!(-100), dec!(0.0)),
        ] {
            db.update_status(
                id,
                BetStatus::Settled,
                Some(Settlement {
                    settled_at: Utc::now(),
                    settled_price: price,
                    pnl,
                    roi,
                }),
            )
            .await
            .unwrap();
        }

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total_bets, 3);
        assert_eq!(stats.active_bets, 1);
        assert_eq!(stats.settled_bets, 2);
        assert_eq!(stats.total_pnl, dec!(2.00));
        assert!((stats.win_rate - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn stats_total_pnl_keeps_decimal_precision() {
        let db = test_db().await;

        for (order, pnl) in [("a", dec!(0.10)), ("b", dec!(0.20))] {
            let id = db.insert(sample_bet(Some(order))).await.unwrap();
            db.update_status(
                id,
                BetStatus::Settled,
                Some(Settlement {
                    settled_at: Utc::now(),
                    settled_price: dec!(1.0),
                    pnl,
                    roi: dec!(25),
                }),
            )
            .await
            .unwrap();
        }

        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total_pnl, dec!(0.30));
    }

    #[tokio::test]
    async fn stats_are_zero_on_empty_ledger() {
        let db = test_db().await;
        let stats = db.stats().await.unwrap();
        assert_eq!(stats.total_bets, 0);
        assert_eq!(stats.win_rate, 0.0);
    }

    #[tokio::test]
    async fn concurrent_inserts_lose_nothing() {
        let db = Arc::new(test_db().await);
        let n = 20;

        let tasks: Vec<_> = (0..n)
            .map(|i| {
                let db = db.clone();
                async move {
                    db.insert(sample_bet(Some(&format!("ord-{}", i))))
                        .await
                        .unwrap()
                }
            })
            .collect();

        let mut ids = futures::future::join_all(tasks).await;
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), n);

        let records = db.get_active().await.unwrap();
        assert_eq!(records.len(), n);
    }

    #[tokio::test]
    async fn unknown_stored_status_is_a_decode_error() {
        let db = test_db().await;
        let id = db.insert(sample_bet(Some("ord-1"))).await.unwrap();

        sqlx::query("UPDATE bets SET status = 'finalized' WHERE id = ?")
            .bind(id)
            .execute(&db.pool)
            .await
            .unwrap();

        assert!(db.get_by_id(id).await.is_err());
    }

    #[tokio::test]
    async fn lookup_by_order_id() {
        let db = test_db().await;
        let id = db.insert(sample_bet(Some("ord-42"))).await.unwrap();

        let bet = db.get_by_order_id("ord-42").await.unwrap().unwrap();
        assert_eq!(bet.id, id);
        assert!(db.get_by_order_id("missing").await.unwrap().is_none());
    }
}
