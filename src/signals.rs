//! Signal generation
//!
//! Fuses the trend-following and mean-reversion signal sets from one bar
//! plus the current indicator snapshot. The two regimes are mutually
//! exclusive by construction: the ADX trend filter gates trend signals on
//! and mean-reversion signals off.

use tracing::debug;

use crate::config::StrategyConfig;
use crate::indicators::IndicatorSnapshot;
use crate::Bar;

/// Signals derived for one bar.
///
/// Carries the raw price, RSI, and band readings alongside the boolean
/// signals for downstream logging and sizing.
#[derive(Debug, Clone, Copy)]
pub struct SignalSet {
    pub trend_long: bool,
    pub trend_short: bool,
    pub mean_rev_long: bool,
    pub mean_rev_short: bool,
    pub bullish_reversal: bool,
    pub bearish_reversal: bool,
    pub rsi: f64,
    pub bb_lower: f64,
    pub bb_upper: f64,
    pub price: f64,
}

impl SignalSet {
    pub fn any_long(&self) -> bool {
        self.trend_long || self.mean_rev_long
    }

    pub fn any_short(&self) -> bool {
        self.trend_short || self.mean_rev_short
    }
}

/// Computes the per-bar signal set.
///
/// Retains exactly one bar of history (the previous bar's open and close)
/// for candle-reversal detection; the contract is one `compute` call per
/// bar, in bar order.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    rsi_ob: f64,
    rsi_os: f64,
    prev_bar: Option<(f64, f64)>,
}

impl SignalEngine {
    pub fn new(config: &StrategyConfig) -> Self {
        SignalEngine {
            rsi_ob: config.rsi_ob,
            rsi_os: config.rsi_os,
            prev_bar: None,
        }
    }

    /// Derive the signal set for one bar.
    ///
    /// Indicator readiness is the caller's precondition; this method does
    /// not gate on it. `volume_high` selects the SuperTrend/SAR parameter
    /// pair, `is_trending` is the externally-evaluated ADX regime.
    pub fn compute(
        &mut self,
        bar: &Bar,
        indicators: &IndicatorSnapshot,
        volume_high: bool,
        is_trending: bool,
    ) -> SignalSet {
        let price = bar.close;

        // Candle reversal against the previous bar; first bar of a run has
        // no history and yields neither flag.
        let (bullish_reversal, bearish_reversal) = match self.prev_bar {
            Some((prev_open, prev_close)) => (
                bar.is_up() && prev_close < prev_open,
                bar.is_down() && prev_close > prev_open,
            ),
            None => (false, false),
        };
        self.prev_bar = Some((bar.open, bar.close));

        // The day's volume flag picks which SuperTrend/SAR pair drives the
        // trend side.
        let (supertrend, psar) = if volume_high {
            (indicators.supertrend_high.value, indicators.psar_high.value)
        } else {
            (indicators.supertrend_low.value, indicators.psar_low.value)
        };

        let (trend_long, trend_short) = if is_trending {
            (
                price > supertrend && price > psar,
                price < supertrend && price < psar,
            )
        } else {
            (false, false)
        };

        let rsi = indicators.rsi.value;
        let bb_lower = indicators.bb_lower.value;
        let bb_upper = indicators.bb_upper.value;

        let mean_rev_long =
            !is_trending && price < bb_lower && rsi < self.rsi_os && bullish_reversal;
        let mean_rev_short =
            !is_trending && price > bb_upper && rsi > self.rsi_ob && bearish_reversal;

        let signals = SignalSet {
            trend_long,
            trend_short,
            mean_rev_long,
            mean_rev_short,
            bullish_reversal,
            bearish_reversal,
            rsi,
            bb_lower,
            bb_upper,
            price,
        };

        debug!(
            price,
            trend_long,
            trend_short,
            mean_rev_long,
            mean_rev_short,
            rsi,
            "signals"
        );

        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::Reading;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: usize, open: f64, close: f64) -> Bar {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 6, 45, 0).unwrap();
        let high = open.max(close) + 1.0;
        let low = open.min(close) - 1.0;
        Bar {
            end_time: start + Duration::minutes(5 * i as i64),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            atr: Reading {
                value: 2.0,
                ready: true,
            },
            avg_atr: Reading {
                value: 1.5,
                ready: true,
            },
            adx: Reading {
                value: 25.0,
                ready: true,
            },
            supertrend_low: Reading {
                value: 95.0,
                ready: true,
            },
            supertrend_high: Reading {
                value: 97.0,
                ready: true,
            },
            psar_low: Reading {
                value: 94.0,
                ready: true,
            },
            psar_high: Reading {
                value: 96.0,
                ready: true,
            },
            rsi: Reading {
                value: 50.0,
                ready: true,
            },
            bb_upper: Reading {
                value: 110.0,
                ready: true,
            },
            bb_lower: Reading {
                value: 90.0,
                ready: true,
            },
        }
    }

    fn engine() -> SignalEngine {
        SignalEngine::new(&StrategyConfig::default())
    }

    #[test]
    fn test_trend_long_above_both_lines() {
        let mut engine = engine();
        let signals = engine.compute(&bar(0, 99.0, 100.0), &snapshot(), false, true);

        assert!(signals.trend_long);
        assert!(!signals.trend_short);
        assert!(!signals.mean_rev_long);
        assert!(!signals.mean_rev_short);
    }

    #[test]
    fn test_trend_suppressed_when_not_trending() {
        let mut engine = engine();
        // Price is above both lines but the regime filter is off
        let signals = engine.compute(&bar(0, 99.0, 100.0), &snapshot(), false, false);

        assert!(!signals.trend_long);
        assert!(!signals.trend_short);
    }

    #[test]
    fn test_volume_flag_selects_parameter_pair() {
        // Price between the low pair (below) and the high pair (above):
        // long on the low pair, flat on the high pair.
        let mut ind = snapshot();
        ind.supertrend_low = Reading {
            value: 95.0,
            ready: true,
        };
        ind.psar_low = Reading {
            value: 94.0,
            ready: true,
        };
        ind.supertrend_high = Reading {
            value: 101.0,
            ready: true,
        };
        ind.psar_high = Reading {
            value: 102.0,
            ready: true,
        };

        let mut low_day = engine();
        assert!(low_day.compute(&bar(0, 99.0, 100.0), &ind, false, true).trend_long);

        let mut high_day = engine();
        let s = high_day.compute(&bar(0, 99.0, 100.0), &ind, true, true);
        assert!(!s.trend_long);
        assert!(s.trend_short);
    }

    #[test]
    fn test_reversal_needs_previous_bar() {
        let mut engine = engine();
        // First bar ever: no history, no reversal flags
        let first = engine.compute(&bar(0, 101.0, 100.0), &snapshot(), false, false);
        assert!(!first.bullish_reversal && !first.bearish_reversal);

        // Down bar then up bar: bullish reversal
        let second = engine.compute(&bar(1, 100.0, 102.0), &snapshot(), false, false);
        assert!(second.bullish_reversal);
        assert!(!second.bearish_reversal);
    }

    #[test]
    fn test_mean_reversion_long_requires_all_conditions() {
        let mut ind = snapshot();
        ind.rsi = Reading {
            value: 25.0,
            ready: true,
        };

        let mut engine = engine();
        // Previous bar down, current bar up, price below lower band, RSI oversold
        engine.compute(&bar(0, 90.0, 88.0), &ind, false, false);
        let signals = engine.compute(&bar(1, 88.0, 89.0), &ind, false, false);
        assert!(signals.mean_rev_long);
        assert!(!signals.trend_long);

        // Same setup while trending: mean reversion is off
        let mut engine = SignalEngine::new(&StrategyConfig::default());
        engine.compute(&bar(0, 90.0, 88.0), &ind, false, false);
        let signals = engine.compute(&bar(1, 88.0, 89.0), &ind, false, true);
        assert!(!signals.mean_rev_long);
    }

    #[test]
    fn test_mean_reversion_short() {
        let mut ind = snapshot();
        ind.rsi = Reading {
            value: 80.0,
            ready: true,
        };

        let mut engine = engine();
        // Previous bar up, current bar down, price above upper band, RSI overbought
        engine.compute(&bar(0, 111.0, 113.0), &ind, false, false);
        let signals = engine.compute(&bar(1, 113.0, 112.0), &ind, false, false);
        assert!(signals.mean_rev_short);
        assert!(!signals.mean_rev_long);
    }

    #[test]
    fn test_signal_set_carries_raw_values() {
        let mut engine = engine();
        let signals = engine.compute(&bar(0, 99.0, 100.0), &snapshot(), false, true);

        assert_eq!(signals.price, 100.0);
        assert_eq!(signals.rsi, 50.0);
        assert_eq!(signals.bb_lower, 90.0);
        assert_eq!(signals.bb_upper, 110.0);
    }
}
