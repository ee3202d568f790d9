//! Per-bar orchestration
//!
//! One explicit state struct threads the whole strategy: session gating,
//! indicator updates, signal computation, position decisions, and stats.
//! Strictly sequential: each bar event is fully processed before the next
//! one is accepted, and all mutable trading state has this single writer.

use tracing::{debug, info, warn};

use crate::broker::Broker;
use crate::config::Config;
use crate::indicators::IndicatorBank;
use crate::position::{PositionManager, PositionState};
use crate::session::SessionGate;
use crate::signals::SignalEngine;
use crate::stats::{StatsSnapshot, StatsTracker};
use crate::{Bar, Symbol};

pub struct StrategyEngine {
    adx_thresh: f64,
    atr_threshold_mult: f64,
    session: SessionGate,
    indicators: IndicatorBank,
    signals: SignalEngine,
    positions: PositionManager,
    stats: StatsTracker,
    minute_bars_seen: usize,
    warmup_minutes: usize,
    stats_interval: u64,
    last_close: f64,
}

impl StrategyEngine {
    pub fn new(config: &Config, initial_contract: Symbol) -> Self {
        let strategy = &config.strategy;
        info!(
            timeframe = strategy.timeframe,
            max_bars_in_trade = strategy.max_bars_in_trade,
            mean_rev_tp = strategy.mean_rev_tp,
            mean_rev_sl = strategy.mean_rev_sl,
            atr_stop_mult = strategy.atr_stop_mult,
            "strategy parameters (scaled to timeframe)"
        );

        StrategyEngine {
            adx_thresh: strategy.adx_thresh,
            atr_threshold_mult: strategy.atr_threshold_mult,
            session: SessionGate::new(strategy),
            indicators: IndicatorBank::new(strategy),
            signals: SignalEngine::new(strategy),
            positions: PositionManager::new(strategy, initial_contract),
            stats: StatsTracker::new(config.instrument.multiplier),
            minute_bars_seen: 0,
            warmup_minutes: strategy.warmup_minutes(),
            stats_interval: strategy.stats_report_interval(),
            last_close: 0.0,
        }
    }

    /// Indicators still accumulate during warm-up; trading does not
    pub fn is_warming_up(&self) -> bool {
        self.minute_bars_seen < self.warmup_minutes
    }

    /// Session accounting on the raw minute stream: date rollover,
    /// pre-market volume, and the once-per-day volume check.
    pub fn on_minute_bar(&mut self, bar: &Bar) {
        self.session.roll_date(bar.end_time.date_naive());
        self.minute_bars_seen += 1;

        if self.is_warming_up() {
            return;
        }

        if self.session.is_pre_market(bar.end_time) {
            self.session.observe_bar(bar.end_time, bar.volume);
        } else {
            self.session.evaluate_volume_flag(bar.end_time);
        }
    }

    /// Process one consolidated bar through the full pipeline
    pub fn on_bar(&mut self, bar: &Bar, broker: &mut dyn Broker) {
        // Indicators consume every consolidated bar, in or out of session
        self.indicators.update(bar);

        if self.is_warming_up() {
            return;
        }

        let bar_index = self.session.next_bar_index();

        if self.positions.consume_rollover_skip() {
            debug!("skipping first bar after rollover");
            return;
        }

        if !self.session.is_in_session(bar.end_time) {
            return;
        }

        let snapshot = self.indicators.snapshot();
        if !snapshot.all_ready() {
            debug!("indicators not ready");
            return;
        }

        if bar.close == 0.0 {
            warn!("bar without a valid close, skipped");
            return;
        }

        if !broker.is_tradable(self.positions.contract()) {
            warn!(contract = %self.positions.contract(), "contract not ready for trading");
            return;
        }

        if !snapshot.volatility_ok(self.atr_threshold_mult) {
            debug!(
                atr = snapshot.atr.value,
                avg_atr = snapshot.avg_atr.value,
                "volatility below threshold, skipping bar"
            );
            return;
        }

        let adx = snapshot.adx.value;
        let is_trending = adx > self.adx_thresh;
        let volume_high = self.session.volume_high();

        let signals = self
            .signals
            .compute(bar, &snapshot, volume_high, is_trending);

        debug!(
            time = %bar.end_time.format("%H:%M"),
            price = bar.close,
            adx,
            is_trending,
            volume_high,
            position = self.positions.state().signed_quantity(),
            "trading bar"
        );

        for trade in self
            .positions
            .on_bar(&signals, bar_index, volume_high, broker)
        {
            self.stats.record_exit(&trade);
        }

        self.last_close = bar.close;

        if bar_index % self.stats_interval == 0 && self.stats.trades() > 0 {
            info!("\n{}", self.stats.snapshot());
        }
    }

    /// Forward a futures rollover event to the position manager
    pub fn on_contract_changed(
        &mut self,
        old_symbol: &Symbol,
        new_symbol: &Symbol,
        broker: &mut dyn Broker,
    ) {
        self.positions
            .on_contract_changed(old_symbol, new_symbol, broker);
    }

    /// Flatten any open position and return the final statistics
    pub fn finish(&mut self, broker: &mut dyn Broker) -> StatsSnapshot {
        if self.last_close > 0.0 {
            if let Some(trade) = self.positions.close_all(self.last_close, broker) {
                self.stats.record_exit(&trade);
            }
        }
        self.stats.snapshot()
    }

    pub fn position_state(&self) -> &PositionState {
        self.positions.state()
    }

    pub fn session(&self) -> &SessionGate {
        &self.session
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}
