//! Order and position provider
//!
//! The trading core talks to the broker through the `Broker` trait: market
//! orders, liquidation, signed position lookup, and tradability checks. A
//! submitted order either returns a handle immediately or fails immediately;
//! there is no partial state in between. `SimBroker` is the in-process
//! implementation used by the backtest runner and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::{Money, Symbol};

/// Order ID type - u64 for performance
pub type OrderId = u64;

/// Atomic counter for fast order ID generation
static ORDER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate next order ID (thread-safe, lock-free)
pub fn next_order_id() -> OrderId {
    ORDER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Broker contract consumed by the trading core.
///
/// `submit_market_order` returns `None` on failure; the core performs no
/// retry and leaves its state untouched in that case.
pub trait Broker {
    /// Submit a market order for `signed_qty` contracts (negative = sell)
    fn submit_market_order(&mut self, symbol: &Symbol, signed_qty: i64) -> Option<OrderId>;

    /// Close the full position on `symbol`; false when the close failed
    fn liquidate(&mut self, symbol: &Symbol) -> bool;

    /// Current signed position in contracts
    fn position(&self, symbol: &Symbol) -> i64;

    /// Whether the symbol has live data, a nonzero price, and is known
    fn is_tradable(&self, symbol: &Symbol) -> bool;
}

/// One simulated fill
#[derive(Debug, Clone)]
pub struct SimFill {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub signed_qty: i64,
    pub price: f64,
}

/// Per-symbol book of the simulated account
#[derive(Debug, Clone, Default)]
struct SimPosition {
    signed_qty: i64,
    avg_entry: f64,
}

/// Immediate-fill simulated broker.
///
/// Fills every order at the symbol's current mark price. Mark prices are
/// pushed by the runner before each bar is processed; a symbol with no mark
/// (or a zero mark) is not tradable.
pub struct SimBroker {
    multiplier: f64,
    marks: HashMap<Symbol, f64>,
    positions: HashMap<Symbol, SimPosition>,
    fills: Vec<SimFill>,
    realized_pnl: Money,
    /// Orders to reject, for exercising the failure path in tests
    reject_next: u32,
}

impl SimBroker {
    pub fn new(multiplier: f64) -> Self {
        SimBroker {
            multiplier,
            marks: HashMap::new(),
            positions: HashMap::new(),
            fills: Vec::new(),
            realized_pnl: Money::ZERO,
            reject_next: 0,
        }
    }

    /// Push the latest mark price for a symbol
    pub fn set_mark(&mut self, symbol: &Symbol, price: f64) {
        self.marks.insert(symbol.clone(), price);
    }

    /// Make the next `count` submissions fail (test hook)
    pub fn reject_next(&mut self, count: u32) {
        self.reject_next = count;
    }

    pub fn fills(&self) -> &[SimFill] {
        &self.fills
    }

    pub fn realized_pnl(&self) -> Money {
        self.realized_pnl
    }

    fn mark(&self, symbol: &Symbol) -> Option<f64> {
        self.marks.get(symbol).copied().filter(|p| *p > 0.0)
    }

    fn apply_fill(&mut self, symbol: &Symbol, signed_qty: i64, price: f64) {
        let pos = self.positions.entry(symbol.clone()).or_default();

        let closing = pos.signed_qty != 0 && pos.signed_qty.signum() != signed_qty.signum();
        if closing {
            // Realize PnL on the closed contracts
            let closed = signed_qty.abs().min(pos.signed_qty.abs());
            let direction = pos.signed_qty.signum() as f64;
            let points = (price - pos.avg_entry) * direction * closed as f64;
            self.realized_pnl += Money::from_f64(points * self.multiplier);
        }

        let new_qty = pos.signed_qty + signed_qty;
        if new_qty == 0 {
            pos.avg_entry = 0.0;
        } else if pos.signed_qty == 0 || pos.signed_qty.signum() != new_qty.signum() {
            // Fresh position or a flip through zero
            pos.avg_entry = price;
        } else if !closing {
            // Scaling in: volume-weighted entry
            let total = pos.signed_qty.abs() + signed_qty.abs();
            pos.avg_entry = (pos.avg_entry * pos.signed_qty.abs() as f64
                + price * signed_qty.abs() as f64)
                / total as f64;
        }
        pos.signed_qty = new_qty;
    }
}

impl Broker for SimBroker {
    fn submit_market_order(&mut self, symbol: &Symbol, signed_qty: i64) -> Option<OrderId> {
        if signed_qty == 0 {
            return None;
        }
        if self.reject_next > 0 {
            self.reject_next -= 1;
            warn!(%symbol, signed_qty, "order rejected");
            return None;
        }
        let price = match self.mark(symbol) {
            Some(p) => p,
            None => {
                warn!(%symbol, "order rejected: no mark price");
                return None;
            }
        };

        let order_id = next_order_id();
        self.apply_fill(symbol, signed_qty, price);
        self.fills.push(SimFill {
            order_id,
            symbol: symbol.clone(),
            signed_qty,
            price,
        });
        debug!(%symbol, signed_qty, price, order_id, "filled");
        Some(order_id)
    }

    fn liquidate(&mut self, symbol: &Symbol) -> bool {
        let qty = self.position(symbol);
        if qty == 0 {
            return true;
        }
        self.submit_market_order(symbol, -qty).is_some()
    }

    fn position(&self, symbol: &Symbol) -> i64 {
        self.positions
            .get(symbol)
            .map(|p| p.signed_qty)
            .unwrap_or(0)
    }

    fn is_tradable(&self, symbol: &Symbol) -> bool {
        self.mark(symbol).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s)
    }

    #[test]
    fn test_order_id_generation() {
        let id1 = next_order_id();
        let id2 = next_order_id();
        assert!(id2 > id1);
    }

    #[test]
    fn test_untradable_without_mark() {
        let mut broker = SimBroker::new(50.0);
        assert!(!broker.is_tradable(&sym("ESH6")));

        broker.set_mark(&sym("ESH6"), 0.0);
        assert!(!broker.is_tradable(&sym("ESH6")));

        broker.set_mark(&sym("ESH6"), 5000.0);
        assert!(broker.is_tradable(&sym("ESH6")));
    }

    #[test]
    fn test_fill_and_position() {
        let mut broker = SimBroker::new(50.0);
        broker.set_mark(&sym("ESH6"), 5000.0);

        let id = broker.submit_market_order(&sym("ESH6"), 2);
        assert!(id.is_some());
        assert_eq!(broker.position(&sym("ESH6")), 2);
        assert_eq!(broker.fills().len(), 1);
    }

    #[test]
    fn test_round_trip_pnl() {
        let mut broker = SimBroker::new(50.0);
        broker.set_mark(&sym("ESH6"), 5000.0);
        broker.submit_market_order(&sym("ESH6"), 1);

        broker.set_mark(&sym("ESH6"), 5010.0);
        assert!(broker.liquidate(&sym("ESH6")));
        assert_eq!(broker.position(&sym("ESH6")), 0);
        // 10 points * $50 multiplier
        assert_eq!(broker.realized_pnl().to_f64(), 500.0);
    }

    #[test]
    fn test_short_round_trip_pnl() {
        let mut broker = SimBroker::new(50.0);
        broker.set_mark(&sym("ESH6"), 5000.0);
        broker.submit_market_order(&sym("ESH6"), -2);

        broker.set_mark(&sym("ESH6"), 4990.0);
        assert!(broker.liquidate(&sym("ESH6")));
        assert_eq!(broker.realized_pnl().to_f64(), 1000.0);
    }

    #[test]
    fn test_rejected_order_mutates_nothing() {
        let mut broker = SimBroker::new(50.0);
        broker.set_mark(&sym("ESH6"), 5000.0);
        broker.reject_next(1);

        assert!(broker.submit_market_order(&sym("ESH6"), 1).is_none());
        assert_eq!(broker.position(&sym("ESH6")), 0);
        assert!(broker.fills().is_empty());

        // Next order goes through
        assert!(broker.submit_market_order(&sym("ESH6"), 1).is_some());
    }

    #[test]
    fn test_liquidate_flat_is_noop_success() {
        let mut broker = SimBroker::new(50.0);
        assert!(broker.liquidate(&sym("ESH6")));
    }
}
