//! Bet Tracker CLI
//!
//! Records bets in a local SQLite ledger and reconciles them against the
//! exchange until they settle.

use anyhow::Result;
use bet_tracker::{
    client, BetMonitor, Config, Database, ExchangeClient, HistoryFilter, NewBet, StatusFilter,
};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "bet-tracker")]
#[command(about = "Position and settlement tracker for Polymarket bets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show all pending and active bets
    Active,

    /// Show bet history
    History {
        /// Filter by status (pending, active, settled, cancelled)
        #[arg(short, long)]
        status: Option<String>,

        /// Only bets placed within the last N days
        #[arg(short, long)]
        days: Option<i64>,

        /// Substring match against the market question
        #[arg(long)]
        search: Option<String>,
    },

    /// Show ledger statistics
    Stats,

    /// Show net open positions marked to current prices
    Positions {
        /// Limit to one market (condition id)
        #[arg(short, long)]
        market: Option<String>,
    },

    /// Place a bet and record it in the ledger
    Bet {
        /// Outcome token id to buy
        #[arg(long)]
        token_id: String,

        /// Limit price per share (0.01 - 0.99)
        #[arg(short, long)]
        price: Decimal,

        /// Size in shares
        #[arg(short, long)]
        size: Option<Decimal>,

        /// Total dollar amount to spend (alternative to --size)
        #[arg(short, long)]
        total: Option<Decimal>,

        /// Outcome label (e.g. YES)
        #[arg(short, long, default_value = "YES")]
        outcome: String,

        /// Market/condition id
        #[arg(short, long)]
        market_id: Option<String>,

        /// Market question, for display in the ledger
        #[arg(short, long, default_value = "")]
        question: String,
    },

    /// Run the reconciliation monitor, printing every status change
    Watch {
        /// Poll interval in seconds (overrides POLL_INTERVAL_SECONDS)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Search open markets by keyword
    Search {
        /// Keywords to match against market questions
        query: String,

        /// Maximum number of markets to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Active => show_active(&config).await?,
        Commands::History { status, days, search } => {
            show_history(&config, status, days, search).await?
        }
        Commands::Stats => show_stats(&config).await?,
        Commands::Positions { market } => show_positions(&config, market).await?,
        Commands::Bet {
            token_id,
            price,
            size,
            total,
            outcome,
            market_id,
            question,
        } => place_bet(&config, token_id, price, size, total, outcome, market_id, question).await?,
        Commands::Watch { interval } => watch(&config, interval).await?,
        Commands::Search { query, limit } => search_markets(&config, &query, limit).await?,
    }

    Ok(())
}

async fn show_active(config: &Config) -> Result<()> {
    let db = Database::new(&config.database_path).await?;
    let bets = db.get_active().await?;

    if bets.is_empty() {
        println!("No open bets.");
        return Ok(());
    }

    println!("\nOpen bets ({}):", bets.len());
    println!("{}", "-".repeat(70));
    for bet in &bets {
        println!(
            "#{:<4} [{}] {} {} @ {} x {} (${})",
            bet.id,
            bet.status,
            bet.side,
            bet.outcome,
            bet.price,
            bet.size,
            bet.amount_spent
        );
        println!("      {}", truncate(&bet.market_question, 60));
    }
    println!();

    Ok(())
}

async fn show_history(
    config: &Config,
    status: Option<String>,
    days: Option<i64>,
    search: Option<String>,
) -> Result<()> {
    let db = Database::new(&config.database_path).await?;

    let filter = HistoryFilter {
        status: status.as_deref().map(parse_status).transpose()?.unwrap_or_default(),
        period_days: days,
        search,
    };
    let bets = db.get_history(&filter).await?;

    if bets.is_empty() {
        println!("No bets match.");
        return Ok(());
    }

    println!("\nBet history ({}):", bets.len());
    println!("{}", "-".repeat(70));
    for bet in &bets {
        let pnl = bet
            .pnl
            .map(|p| format!(" | pnl ${}", p))
            .unwrap_or_default();
        println!(
            "#{:<4} {} [{}] {} {} @ {} x {}{}",
            bet.id,
            bet.placed_at.format("%Y-%m-%d"),
            bet.status,
            bet.side,
            bet.outcome,
            bet.price,
            bet.size,
            pnl
        );
        println!("      {}", truncate(&bet.market_question, 60));
    }
    println!();

    Ok(())
}

async fn show_stats(config: &Config) -> Result<()> {
    let db = Database::new(&config.database_path).await?;
    let stats = db.stats().await?;

    println!("\n{}", "=".repeat(70));
    println!("  LEDGER STATISTICS");
    println!("{}\n", "=".repeat(70));

    println!("  Total Bets:    {}", stats.total_bets);
    println!("  Open Bets:     {}", stats.active_bets);
    println!("  Settled Bets:  {}", stats.settled_bets);
    println!("  Win Rate:      {:.1}%", stats.win_rate);
    println!("  Total PnL:     ${:.2}", stats.total_pnl);
    println!();

    Ok(())
}

async fn show_positions(config: &Config, market: Option<String>) -> Result<()> {
    let client = ExchangeClient::new(config);
    let fills = client.user_fills(market.as_deref()).await?;
    let snapshots =
        bet_tracker::positions::snapshot(&fills, market.as_deref(), &client).await;

    if snapshots.is_empty() {
        println!("No open positions.");
        return Ok(());
    }

    println!("\nOpen positions ({}):", snapshots.len());
    println!("{}", "-".repeat(70));
    for pos in &snapshots {
        let direction = if pos.net_size > Decimal::ZERO { "LONG" } else { "SHORT" };
        println!(
            "{} {} {} | entry {} | mark {} | pnl ${} ({}%)",
            direction,
            pos.net_size.abs(),
            pos.outcome,
            pos.avg_entry_price.round_dp(4),
            pos.current_price,
            pos.unrealized_pnl.round_dp(2),
            pos.unrealized_roi.round_dp(1)
        );
    }
    println!();

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn place_bet(
    config: &Config,
    token_id: String,
    price: Decimal,
    size: Option<Decimal>,
    total: Option<Decimal>,
    outcome: String,
    market_id: Option<String>,
    question: String,
) -> Result<()> {
    let size = client::order_size(price, size, total)?;

    let client = ExchangeClient::new(config);
    let db = Database::new(&config.database_path).await?;

    println!(
        "Submitting order: BUY {} x {} @ {} (${})",
        size, outcome, price, price * size
    );

    let order_id = client
        .submit_order(&token_id, bet_tracker::Side::Buy, price, size)
        .await?;
    println!("Order accepted: {}", order_id);

    let id = db
        .insert(NewBet {
            order_id: Some(order_id),
            token_id,
            market_id,
            market_question: question,
            outcome,
            side: bet_tracker::Side::Buy,
            price,
            size,
        })
        .await?;
    println!("Recorded as bet #{}", id);

    Ok(())
}

async fn watch(config: &Config, interval: Option<u64>) -> Result<()> {
    let poll_interval = interval.unwrap_or(config.poll_interval_seconds);

    let db = Arc::new(Database::new(&config.database_path).await?);
    let client = Arc::new(ExchangeClient::new(config));

    let monitor = Arc::new(BetMonitor::new(
        db,
        client.clone(),
        client,
        Duration::from_secs(poll_interval),
        Duration::from_secs(config.join_timeout_seconds),
    ));
    let mut events = monitor.subscribe();

    println!("Watching open bets every {}s (Ctrl+C to stop)...\n", poll_interval);
    monitor.clone().start().await;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let pnl = event
                        .record
                        .pnl
                        .map(|p| format!(" | pnl ${}", p))
                        .unwrap_or_default();
                    println!(
                        "Bet #{} -> {}{} ({})",
                        event.record.id,
                        event.new_status,
                        pnl,
                        truncate(&event.record.market_question, 50)
                    );
                }
                Err(e) => {
                    error!("Event stream closed: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nStopping...");
                break;
            }
        }
    }

    monitor.stop().await;
    Ok(())
}

async fn search_markets(config: &Config, query: &str, limit: usize) -> Result<()> {
    let client = ExchangeClient::new(config);
    let markets = client.search_markets(query).await?;

    if markets.is_empty() {
        println!("No markets match '{}'.", query);
        return Ok(());
    }

    println!("\nMarkets matching '{}' ({}):", query, markets.len());
    println!("{}", "-".repeat(70));
    for market in markets.iter().take(limit) {
        println!("\n{}", truncate(&market.question, 66));
        println!("  condition: {}", market.condition_id);
        for ((outcome, price), token) in market
            .outcomes
            .iter()
            .zip(&market.outcome_prices)
            .zip(&market.token_ids)
        {
            println!("  {} @ {} (token {})", outcome, price, truncate(token, 20));
        }
    }

    if markets.len() > limit {
        println!("\n   ... and {} more", markets.len() - limit);
    }
    println!();

    Ok(())
}

fn parse_status(s: &str) -> Result<StatusFilter> {
    match s.to_lowercase().as_str() {
        "all" => Ok(StatusFilter::All),
        "pending" => Ok(StatusFilter::Pending),
        "active" => Ok(StatusFilter::Active),
        "settled" => Ok(StatusFilter::Settled),
        "cancelled" | "canceled" => Ok(StatusFilter::Cancelled),
        other => anyhow::bail!("Unknown status filter: {}", other),
    }
}

fn truncate(s: &str, max: usize) -> String {
    // Cut on a char boundary; market questions are routinely non-ASCII
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("¿Ganará el equipo local?", 6), "¿Ganar...");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exact", 5), "exact");
    }
}
