//! Realized P&L for settled binary-market bets.
//!
//! Pure arithmetic over the entry fill and the final settlement price.
//! A winning share pays out $1; a losing share pays nothing.

use crate::error::{Error, Result};
use crate::types::Side;
use rust_decimal::Decimal;

/// Calculate realized (pnl, roi_percent) for a bet settled at `settled_price`.
///
/// Buy side: win pays `size - cost`, loss forfeits the cost.
/// Sell side: the cost is proceeds received up front; a win (the shorted
/// outcome did not occur, price 0.0) keeps all of it, a loss owes `size`.
///
/// Only binary settlement is supported. Any price outside {0.0, 1.0} is
/// rejected with [`Error::UnsupportedSettlement`] rather than mis-computed.
pub fn calculate(
    side: Side,
    entry_price: Decimal,
    size: Decimal,
    settled_price: Decimal,
) -> Result<(Decimal, Decimal)> {
    if settled_price != Decimal::ZERO && settled_price != Decimal::ONE {
        return Err(Error::UnsupportedSettlement(settled_price));
    }

    let cost = entry_price * size;

    let pnl = match side {
        Side::Buy => {
            if settled_price == Decimal::ONE {
                size - cost
            } else {
                -cost
            }
        }
        Side::Sell => {
            if settled_price == Decimal::ZERO {
                cost
            } else {
                cost - size
            }
        }
    };

    let roi = if cost > Decimal::ZERO {
        pnl / cost * Decimal::from(100)
    } else {
        Decimal::ZERO
    };

    Ok((pnl, roi))
}
