//! Position management
//!
//! The entry/exit/timeout state machine. Owns the open position's metadata
//! as a tagged union (flat, long, or short with the sub-strategy that
//! opened it) so exit and timeout rules branch on the variant instead of
//! loose booleans. At most one position is open at any time.

use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::config::StrategyConfig;
use crate::signals::SignalSet;
use crate::{ClosedTrade, ExitReason, StrategyKind, Symbol};

/// Metadata of an open position; the direction lives on the enum variant
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub kind: StrategyKind,
    pub entry_price: f64,
    /// Bar index at entry; recorded only for mean-reversion entries, which
    /// are the only ones subject to the bar-count timeout
    pub entry_bar_index: Option<u64>,
    /// Contracts, always positive; the variant carries the sign
    pub quantity: i64,
}

/// Current position of the single traded instrument
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PositionState {
    #[default]
    Flat,
    Long(OpenPosition),
    Short(OpenPosition),
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        matches!(self, PositionState::Flat)
    }

    pub fn kind(&self) -> Option<StrategyKind> {
        match self {
            PositionState::Flat => None,
            PositionState::Long(p) | PositionState::Short(p) => Some(p.kind),
        }
    }

    /// Signed contracts: positive long, negative short, zero flat
    pub fn signed_quantity(&self) -> i64 {
        match self {
            PositionState::Flat => 0,
            PositionState::Long(p) => p.quantity,
            PositionState::Short(p) => -p.quantity,
        }
    }
}

/// Entry/exit/timeout state machine over the current contract.
///
/// Entry and exit decisions within one bar both use the broker quantity
/// captured at the start of the bar, so a position opened on a bar is not
/// exit-checked until the next one.
pub struct PositionManager {
    contract: Symbol,
    state: PositionState,
    skip_next_bar: bool,
    low_volume_qty: i64,
    high_volume_qty: i64,
    max_bars_in_trade: u64,
}

impl PositionManager {
    pub fn new(config: &StrategyConfig, initial_contract: Symbol) -> Self {
        PositionManager {
            contract: initial_contract,
            state: PositionState::Flat,
            skip_next_bar: false,
            low_volume_qty: config.low_volume_qty,
            high_volume_qty: config.high_volume_qty,
            max_bars_in_trade: config.max_bars_in_trade as u64,
        }
    }

    pub fn contract(&self) -> &Symbol {
        &self.contract
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    /// True exactly once after a rollover; the engine skips that bar
    pub fn consume_rollover_skip(&mut self) -> bool {
        let skip = self.skip_next_bar;
        self.skip_next_bar = false;
        skip
    }

    /// Process one bar's signals: evaluate entries, then exits and the
    /// mean-reversion timeout. Returns any round trips closed on this bar.
    pub fn on_bar(
        &mut self,
        signals: &SignalSet,
        bar_index: u64,
        volume_high: bool,
        broker: &mut dyn Broker,
    ) -> Vec<ClosedTrade> {
        let qty_at_open = broker.position(&self.contract);

        self.try_enter(signals, qty_at_open, volume_high, bar_index, broker);

        let mut closed = Vec::new();
        self.try_signal_exit(signals, qty_at_open, broker, &mut closed);
        self.try_timeout_exit(signals, qty_at_open, bar_index, broker, &mut closed);
        closed
    }

    fn entry_size(&self, volume_high: bool) -> i64 {
        if volume_high {
            self.high_volume_qty
        } else {
            self.low_volume_qty
        }
    }

    fn try_enter(
        &mut self,
        signals: &SignalSet,
        qty_at_open: i64,
        volume_high: bool,
        bar_index: u64,
        broker: &mut dyn Broker,
    ) {
        if qty_at_open != 0 {
            return;
        }

        let (signed_qty, kind) = if signals.any_long() {
            let kind = if signals.mean_rev_long {
                StrategyKind::MeanRevLong
            } else {
                StrategyKind::TrendLong
            };
            (self.entry_size(volume_high), kind)
        } else if signals.any_short() {
            let kind = if signals.mean_rev_short {
                StrategyKind::MeanRevShort
            } else {
                StrategyKind::TrendShort
            };
            (-self.entry_size(volume_high), kind)
        } else {
            return;
        };

        if !broker.is_tradable(&self.contract) {
            warn!(contract = %self.contract, "entry skipped: symbol not ready");
            return;
        }

        debug!(
            %kind,
            price = signals.price,
            qty = signed_qty,
            rsi = signals.rsi,
            "entering position"
        );

        match broker.submit_market_order(&self.contract, signed_qty) {
            Some(_) => {
                let position = OpenPosition {
                    kind,
                    entry_price: signals.price,
                    // The bar-count timeout applies to mean reversion only
                    entry_bar_index: kind.is_mean_reversion().then_some(bar_index),
                    quantity: signed_qty.abs(),
                };
                self.state = if signed_qty > 0 {
                    PositionState::Long(position)
                } else {
                    PositionState::Short(position)
                };
            }
            None => {
                // Known gap: the missed entry is accepted, not retried
                warn!(%kind, "entry order failed; staying flat");
            }
        }
    }

    fn try_signal_exit(
        &mut self,
        signals: &SignalSet,
        qty_at_open: i64,
        broker: &mut dyn Broker,
        closed: &mut Vec<ClosedTrade>,
    ) {
        // A long exits when neither long signal holds, whichever one opened
        // it; symmetric for shorts.
        let should_exit = (qty_at_open > 0 && !signals.any_long())
            || (qty_at_open < 0 && !signals.any_short());
        if !should_exit {
            return;
        }

        debug!(
            trend_long = signals.trend_long,
            mean_rev_long = signals.mean_rev_long,
            trend_short = signals.trend_short,
            mean_rev_short = signals.mean_rev_short,
            "exit signal"
        );
        self.liquidate_into(signals.price, ExitReason::SignalFlip, broker, closed);
    }

    fn try_timeout_exit(
        &mut self,
        signals: &SignalSet,
        qty_at_open: i64,
        bar_index: u64,
        broker: &mut dyn Broker,
        closed: &mut Vec<ClosedTrade>,
    ) {
        let entry_bar_index = match &self.state {
            PositionState::Long(p) if qty_at_open > 0 => p.entry_bar_index,
            PositionState::Short(p) if qty_at_open < 0 => p.entry_bar_index,
            _ => None,
        };
        let entry_bar_index = match entry_bar_index {
            Some(idx) => idx,
            None => return,
        };

        let elapsed = bar_index.saturating_sub(entry_bar_index);
        if elapsed < self.max_bars_in_trade {
            return;
        }

        debug!(elapsed, "mean-reversion timeout");
        self.liquidate_into(signals.price, ExitReason::Timeout, broker, closed);
    }

    fn liquidate_into(
        &mut self,
        exit_price: f64,
        reason: ExitReason,
        broker: &mut dyn Broker,
        closed: &mut Vec<ClosedTrade>,
    ) {
        if !broker.is_tradable(&self.contract) {
            warn!(contract = %self.contract, "exit skipped: symbol not ready");
            return;
        }
        if !broker.liquidate(&self.contract) {
            warn!(contract = %self.contract, "liquidation failed; position kept");
            return;
        }

        if let Some(trade) = self.take_closed(exit_price, reason) {
            info!(
                kind = %trade.kind,
                qty = trade.quantity,
                entry = trade.entry_price,
                exit = trade.exit_price,
                %reason,
                "position closed"
            );
            closed.push(trade);
        }
    }

    fn take_closed(&mut self, exit_price: f64, reason: ExitReason) -> Option<ClosedTrade> {
        let state = std::mem::take(&mut self.state);
        match state {
            PositionState::Flat => None,
            PositionState::Long(p) => Some(ClosedTrade {
                symbol: self.contract.clone(),
                kind: p.kind,
                quantity: p.quantity,
                entry_price: p.entry_price,
                exit_price,
                reason,
            }),
            PositionState::Short(p) => Some(ClosedTrade {
                symbol: self.contract.clone(),
                kind: p.kind,
                quantity: -p.quantity,
                entry_price: p.entry_price,
                exit_price,
                reason,
            }),
        }
    }

    /// Transfer the position across a contract rollover.
    ///
    /// The old contract is liquidated and the same signed quantity is
    /// re-opened on the new one. If the new contract is not tradable the
    /// exposure is dropped, loudly; that is an accepted gap, not an
    /// error to retry. The bar right after a rollover is skipped entirely.
    pub fn on_contract_changed(
        &mut self,
        old_symbol: &Symbol,
        new_symbol: &Symbol,
        broker: &mut dyn Broker,
    ) {
        info!(%old_symbol, %new_symbol, "futures rollover");

        let old_qty = broker.position(old_symbol);
        if old_qty != 0 {
            if broker.is_tradable(old_symbol) {
                broker.liquidate(old_symbol);
            }

            if !broker.is_tradable(new_symbol) {
                error!(
                    %new_symbol,
                    dropped_qty = old_qty,
                    "rollover: new contract not tradable, exposure dropped"
                );
                self.state = PositionState::Flat;
            } else if broker.submit_market_order(new_symbol, old_qty).is_none() {
                error!(
                    %new_symbol,
                    dropped_qty = old_qty,
                    "rollover: re-entry order failed, exposure dropped"
                );
                self.state = PositionState::Flat;
            }
        }

        self.contract = new_symbol.clone();
        self.skip_next_bar = true;
    }

    /// Force-close whatever is open, e.g. at the end of a run
    pub fn close_all(&mut self, exit_price: f64, broker: &mut dyn Broker) -> Option<ClosedTrade> {
        if self.state.is_flat() {
            return None;
        }
        let mut closed = Vec::new();
        self.liquidate_into(exit_price, ExitReason::EndOfRun, broker, &mut closed);
        closed.pop()
    }
}
