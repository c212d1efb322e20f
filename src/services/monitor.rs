//! Background reconciliation of ledger bets against the exchange.
//!
//! Each sweep walks the pending/active bets, asks the exchange for order
//! status (and market resolution where relevant), and commits at most one
//! status transition per bet. Every committed transition is broadcast to
//! subscribers. A single failing bet never aborts the sweep.

use crate::client::{MarketLookup, OrderLookup};
use crate::db::Database;
use crate::pnl;
use crate::types::{BetEvent, BetRecord, BetStatus, OrderState, Resolution, Settlement};
use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Reconciliation service for open bets
pub struct BetMonitor {
    db: Arc<Database>,
    orders: Arc<dyn OrderLookup>,
    markets: Arc<dyn MarketLookup>,
    events: broadcast::Sender<BetEvent>,
    poll_interval: Duration,
    join_timeout: Duration,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BetMonitor {
    pub fn new(
        db: Arc<Database>,
        orders: Arc<dyn OrderLookup>,
        markets: Arc<dyn MarketLookup>,
        poll_interval: Duration,
        join_timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            db,
            orders,
            markets,
            events,
            poll_interval,
            join_timeout,
            shutdown_tx,
            handle: Mutex::new(None),
        }
    }

    /// Subscribe to committed status transitions
    pub fn subscribe(&self) -> broadcast::Receiver<BetEvent> {
        self.events.subscribe()
    }

    /// Spawn the background poll loop. Starting twice is a no-op.
    pub async fn start(self: Arc<Self>) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            debug!("Bet monitor already running");
            return;
        }

        info!(
            "Starting bet monitor (poll interval {}s)",
            self.poll_interval.as_secs()
        );

        let monitor = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *handle = Some(tokio::spawn(async move {
            loop {
                if let Err(e) = monitor.sweep().await {
                    error!("Reconciliation sweep failed: {}", e);
                }

                tokio::select! {
                    _ = tokio::time::sleep(monitor.poll_interval) => {}
                    _ = shutdown_rx.changed() => {
                        info!("Bet monitor shutting down");
                        break;
                    }
                }
            }
        }));
    }

    /// Signal shutdown and wait for the loop to finish, up to the join
    /// timeout. A loop stuck in a collaborator call is aborted.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);

        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(self.join_timeout, handle).await {
                Ok(_) => info!("Bet monitor stopped"),
                Err(_) => warn!(
                    "Bet monitor did not stop within {}s",
                    self.join_timeout.as_secs()
                ),
            }
        }
    }

    /// Run one reconciliation sweep immediately, outside the poll schedule.
    /// Returns the number of committed transitions.
    pub async fn force_check(&self) -> Result<usize> {
        self.sweep().await
    }

    async fn sweep(&self) -> Result<usize> {
        let bets = self.db.get_active().await?;
        if bets.is_empty() {
            return Ok(0);
        }

        debug!("Checking {} open bets", bets.len());
        let mut changed = 0;

        for bet in &bets {
            match self.check_bet(bet).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => error!("Failed to check bet {}: {}", bet.id, e),
            }
        }

        if changed > 0 {
            info!("Reconciliation sweep committed {} transitions", changed);
        }
        Ok(changed)
    }

    async fn check_bet(&self, bet: &BetRecord) -> Result<bool> {
        // Never submitted to the exchange; nothing to reconcile against
        let Some(order_id) = bet.order_id.as_deref() else {
            return Ok(false);
        };

        match self.orders.order_status(order_id).await {
            Ok(Some(OrderState::Matched)) => {
                if let Some(Resolution::Resolved(price)) = self.resolution_for(bet).await {
                    return self.settle(bet, price).await;
                }
                self.transition(bet, BetStatus::Active, None).await
            }
            Ok(Some(OrderState::Open)) => self.transition(bet, BetStatus::Pending, None).await,
            Ok(Some(OrderState::Cancelled)) => {
                self.transition(bet, BetStatus::Cancelled, None).await
            }
            Ok(Some(OrderState::Unknown(raw))) => {
                debug!("Order {} in unrecognized state '{}'", order_id, raw);
                self.fallback_check(bet).await
            }
            Ok(None) => {
                debug!("Order {} not found on exchange", order_id);
                self.fallback_check(bet).await
            }
            Err(e) => {
                warn!("Order lookup failed for {}: {}", order_id, e);
                self.fallback_check(bet).await
            }
        }
    }

    /// When the order status is unavailable, resolution alone is trusted
    /// only for bets already known to be filled.
    async fn fallback_check(&self, bet: &BetRecord) -> Result<bool> {
        if bet.status != BetStatus::Active {
            return Ok(false);
        }

        if let Some(Resolution::Resolved(price)) = self.resolution_for(bet).await {
            return self.settle(bet, price).await;
        }
        Ok(false)
    }

    async fn resolution_for(&self, bet: &BetRecord) -> Option<Resolution> {
        let market_id = bet.market_id.as_deref()?;

        match self.markets.resolution(market_id).await {
            Ok(resolution) => Some(resolution),
            Err(e) => {
                warn!("Resolution lookup failed for {}: {}", market_id, e);
                None
            }
        }
    }

    async fn settle(&self, bet: &BetRecord, settled_price: Decimal) -> Result<bool> {
        let (pnl, roi) = match pnl::calculate(bet.side, bet.price, bet.size, settled_price) {
            Ok(result) => result,
            Err(e) => {
                warn!("Cannot settle bet {}: {}", bet.id, e);
                return Ok(false);
            }
        };

        info!(
            "Bet {} settled at {} (pnl {}, roi {}%)",
            bet.id, settled_price, pnl, roi
        );

        let settlement = Settlement {
            settled_at: Utc::now(),
            settled_price,
            pnl,
            roi,
        };
        self.transition(bet, BetStatus::Settled, Some(settlement))
            .await
    }

    /// Commit a status transition and broadcast it. The event is sent only
    /// for writes the store actually accepted.
    async fn transition(
        &self,
        bet: &BetRecord,
        new_status: BetStatus,
        settlement: Option<Settlement>,
    ) -> Result<bool> {
        if bet.status == new_status {
            return Ok(false);
        }

        self.db.update_status(bet.id, new_status, settlement).await?;

        let Some(record) = self.db.get_by_id(bet.id).await? else {
            return Ok(false);
        };
        if record.status != new_status {
            return Ok(false);
        }

        debug!("Bet {}: {} -> {}", bet.id, bet.status, new_status);
        let _ = self.events.send(BetEvent { record, new_status });
        Ok(true)
    }
}
