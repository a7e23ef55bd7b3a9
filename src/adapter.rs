//! Converts a strategy's target weights into quantized, dead-zoned share
//! orders against current positions and lot-size constraints.
//!
//! This is the only place strategy weights ever become share counts — a
//! strategy itself never sees lot sizes, and the live agent never derives
//! orders any other way.

use crate::strategy::CASH_SYMBOL;
use crate::types::Symbol;
use rustc_hash::FxHashMap;

/// A single resulting order: a signed share delta for one symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrderIntent {
    pub symbol: Symbol,
    /// Positive to buy, negative to sell.
    pub delta_shares: i64,
}

/// Converts target weights to orders.
///
/// `total_equity` is in cents. `prices` and `lot_steps` are looked up per
/// symbol; a symbol with no known price is skipped (can't size an order
/// without one) rather than erroring, since a stale/missing quote is a
/// data-feed gap, not a logic failure. The `"CASH"` pseudo-symbol is
/// always skipped, whatever weight it carries.
///
/// Quantization: `delta_shares` is rounded down in magnitude to a multiple
/// of the lot step (1 share if the broker reports a non-positive step).
/// Deltas smaller than two lot steps are dropped — a dead zone that avoids
/// churning the broker with single-share orders from rounding noise.
pub fn weights_to_orders(
    target_weights: &FxHashMap<Symbol, f64>,
    total_equity: i64,
    current_positions: &FxHashMap<Symbol, i64>,
    prices: &FxHashMap<Symbol, i64>,
    lot_steps: &FxHashMap<Symbol, i64>,
) -> Vec<OrderIntent> {
    let mut orders = Vec::new();

    for (&symbol, &weight) in target_weights {
        if symbol.as_str() == CASH_SYMBOL {
            continue;
        }
        let Some(&price) = prices.get(&symbol) else {
            continue;
        };
        if price <= 0 {
            continue;
        }

        let step = lot_steps.get(&symbol).copied().filter(|&s| s > 0).unwrap_or(1);
        let current_shares = current_positions.get(&symbol).copied().unwrap_or(0);

        let target_value = total_equity as f64 * weight;
        let current_value = current_shares as f64 * price as f64;
        let delta_raw = (target_value - current_value) / price as f64;

        let delta = (delta_raw / step as f64).floor() as i64 * step;

        if delta.abs() < 2 * step {
            continue;
        }

        orders.push(OrderIntent {
            symbol,
            delta_shares: delta,
        });
    }

    orders
}
