//! Net open positions derived from raw fills.
//!
//! Aggregation is pure over the fill list; marking to the current price goes
//! through the price-lookup collaborator with a fallback to the average entry
//! (which yields zero unrealized P&L rather than an error).

use crate::client::PriceLookup;
use crate::types::{Fill, PositionSnapshot, Side};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use tracing::debug;

/// Positions smaller than this are rounding noise, not holdings
const DUST_THRESHOLD: Decimal = dec!(0.01);

/// A netted position before marking, internal to this module's callers
#[derive(Debug, Clone)]
pub struct OpenPosition {
    pub token_id: String,
    pub market_id: Option<String>,
    pub outcome: String,
    pub net_size: Decimal,
    pub avg_entry_price: Decimal,
}

#[derive(Default)]
struct Accumulator {
    market_id: Option<String>,
    outcome: String,
    buy_size: Decimal,
    buy_cost: Decimal,
    sell_size: Decimal,
    sell_revenue: Decimal,
}

/// Net confirmed fills into open positions, optionally scoped to one market.
///
/// Unconfirmed fills are dropped, flat positions (|net| < 0.01) are excluded,
/// and the average entry follows the dominant side of the net position.
pub fn aggregate(fills: &[Fill], market_id: Option<&str>) -> Vec<OpenPosition> {
    let mut by_token: BTreeMap<String, Accumulator> = BTreeMap::new();

    for fill in fills {
        if !fill.is_confirmed() {
            continue;
        }
        if let Some(wanted) = market_id {
            if fill.market_id.as_deref() != Some(wanted) {
                continue;
            }
        }

        let acc = by_token.entry(fill.token_id.clone()).or_default();
        if acc.outcome.is_empty() {
            acc.market_id = fill.market_id.clone();
            acc.outcome = fill.outcome.clone();
        }

        match fill.side {
            Side::Buy => {
                acc.buy_size += fill.size;
                acc.buy_cost += fill.size * fill.price;
            }
            Side::Sell => {
                acc.sell_size += fill.size;
                acc.sell_revenue += fill.size * fill.price;
            }
        }
    }

    let mut positions = Vec::new();
    for (token_id, acc) in by_token {
        let net_size = acc.buy_size - acc.sell_size;
        if net_size.abs() < DUST_THRESHOLD {
            continue;
        }

        // The dominant side always has size here, but guard the division anyway
        let avg_entry_price = if net_size > Decimal::ZERO {
            if acc.buy_size > Decimal::ZERO {
                acc.buy_cost / acc.buy_size
            } else {
                Decimal::ZERO
            }
        } else if acc.sell_size > Decimal::ZERO {
            acc.sell_revenue / acc.sell_size
        } else {
            Decimal::ZERO
        };

        positions.push(OpenPosition {
            token_id,
            market_id: acc.market_id,
            outcome: acc.outcome,
            net_size,
            avg_entry_price,
        });
    }

    positions
}

/// Aggregate fills and mark each open position at the current price.
pub async fn snapshot(
    fills: &[Fill],
    market_id: Option<&str>,
    prices: &dyn PriceLookup,
) -> Vec<PositionSnapshot> {
    let mut snapshots = Vec::new();

    for pos in aggregate(fills, market_id) {
        let current_price = match prices.price(&pos.token_id).await {
            Ok(Some(p)) => p,
            Ok(None) => pos.avg_entry_price,
            Err(e) => {
                debug!("Price lookup failed for {}: {}", pos.token_id, e);
                pos.avg_entry_price
            }
        };
        snapshots.push(mark(pos, current_price));
    }

    snapshots
}

/// Compute unrealized P&L and ROI for one position at the given mark price
pub fn mark(pos: OpenPosition, current_price: Decimal) -> PositionSnapshot {
    let unrealized_pnl = if pos.net_size > Decimal::ZERO {
        pos.net_size * (current_price - pos.avg_entry_price)
    } else {
        pos.net_size.abs() * (pos.avg_entry_price - current_price)
    };

    let cost_basis = pos.net_size.abs() * pos.avg_entry_price;
    let unrealized_roi = if cost_basis > Decimal::ZERO {
        unrealized_pnl / cost_basis * Decimal::from(100)
    } else {
        Decimal::ZERO
    };

    PositionSnapshot {
        token_id: pos.token_id,
        market_id: pos.market_id,
        outcome: pos.outcome,
        net_size: pos.net_size,
        avg_entry_price: pos.avg_entry_price,
        current_price,
        unrealized_pnl,
        unrealized_roi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;

    fn fill(token: &str, side: Side, size: Decimal, price: Decimal, status: &str) -> Fill {
        Fill {
            token_id: token.to_string(),
            market_id: Some("m1".to_string()),
            outcome: "YES".to_string(),
            side,
            size,
            price,
            status: status.to_string(),
        }
    }

    #[test]
    fn nets_buys_against_sells() {
        let fills = vec![
            fill("t1", Side::Buy, dec!(10), dec!(0.40), "filled"),
            fill("t1", Side::Buy, dec!(10), dec!(0.60), "matched"),
            fill("t1", Side::Sell, dec!(5), dec!(0.70), "filled"),
        ];

        let positions = aggregate(&fills, None);
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].net_size, dec!(15));
        // avg entry follows the long side: (4 + 6) / 20
        assert_eq!(positions[0].avg_entry_price, dec!(0.50));
    }

    #[test]
    fn dust_positions_are_excluded() {
        let fills = vec![
            fill("t1", Side::Buy, dec!(10), dec!(0.40), "filled"),
            fill("t1", Side::Sell, dec!(9.995), dec!(0.40), "filled"),
        ];
        assert!(aggregate(&fills, None).is_empty());
    }

    #[test]
    fn unconfirmed_fills_do_not_contribute() {
        let fills = vec![
            fill("t1", Side::Buy, dec!(10), dec!(0.40), "LIVE"),
            fill("t1", Side::Buy, dec!(3), dec!(0.40), "rejected"),
        ];
        assert!(aggregate(&fills, None).is_empty());
    }

    #[test]
    fn market_filter_scopes_fills() {
        let mut other = fill("t2", Side::Buy, dec!(5), dec!(0.30), "filled");
        other.market_id = Some("m2".to_string());
        let fills = vec![fill("t1", Side::Buy, dec!(10), dec!(0.40), "filled"), other];

        let positions = aggregate(&fills, Some("m2"));
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].token_id, "t2");
    }

    #[test]
    fn short_position_uses_sell_revenue_for_entry() {
        let fills = vec![fill("t1", Side::Sell, dec!(10), dec!(0.60), "matched")];
        let positions = aggregate(&fills, None);
        assert_eq!(positions[0].net_size, dec!(-10));
        assert_eq!(positions[0].avg_entry_price, dec!(0.60));
    }

    #[test]
    fn marks_long_and_short() {
        let long = OpenPosition {
            token_id: "t1".into(),
            market_id: None,
            outcome: "YES".into(),
            net_size: dec!(10),
            avg_entry_price: dec!(0.40),
        };
        let snap = mark(long, dec!(0.55));
        assert_eq!(snap.unrealized_pnl, dec!(1.50));
        assert_eq!(snap.unrealized_roi, dec!(37.5));

        let short = OpenPosition {
            token_id: "t1".into(),
            market_id: None,
            outcome: "YES".into(),
            net_size: dec!(-10),
            avg_entry_price: dec!(0.40),
        };
        let snap = mark(short, dec!(0.25));
        assert_eq!(snap.unrealized_pnl, dec!(1.50));
    }

    struct NoPrices;

    #[async_trait]
    impl PriceLookup for NoPrices {
        async fn price(&self, _token_id: &str) -> Result<Option<Decimal>> {
            Ok(None)
        }
    }

    struct BrokenPrices;

    #[async_trait]
    impl PriceLookup for BrokenPrices {
        async fn price(&self, _token_id: &str) -> Result<Option<Decimal>> {
            anyhow::bail!("price feed down")
        }
    }

    #[tokio::test]
    async fn missing_price_falls_back_to_entry() {
        let fills = vec![fill("t1", Side::Buy, dec!(10), dec!(0.40), "filled")];

        for prices in [&NoPrices as &dyn PriceLookup, &BrokenPrices] {
            let snaps = snapshot(&fills, None, prices).await;
            assert_eq!(snaps.len(), 1);
            assert_eq!(snaps[0].current_price, dec!(0.40));
            assert_eq!(snaps[0].unrealized_pnl, dec!(0));
            assert_eq!(snaps[0].unrealized_roi, dec!(0));
        }
    }
}
