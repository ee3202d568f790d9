//! Configuration management
//!
//! Handles loading and parsing of JSON configuration files. Strategy
//! parameters default to the production values; time-based exit parameters
//! are scaled once at load time as a function of the bar timeframe.

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
}

impl Config {
    /// Load configuration from JSON file.
    ///
    /// Timeframe scaling is applied here, exactly once; the rest of the
    /// system only ever sees scaled parameters.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.validate()?;
        config.strategy = config.strategy.scaled();
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if s.timeframe == 0 {
            bail!("timeframe must be at least 1 minute");
        }
        if s.low_volume_qty <= 0 || s.high_volume_qty <= 0 {
            bail!("position quantities must be positive");
        }
        if s.pre_start > s.pre_end {
            bail!("pre_start must not be after pre_end");
        }
        if s.session_start > s.session_end {
            bail!("session_start must not be after session_end");
        }
        if s.max_bars_in_trade < 1 {
            bail!("max_bars_in_trade must be at least 1");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            instrument: InstrumentConfig::default(),
            strategy: StrategyConfig::default(),
            backtest: BacktestConfig::default(),
        }
    }
}

/// Traded instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Root symbol of the futures chain, e.g. "ES"
    pub root: String,
    /// Contract multiplier applied when converting point PnL to currency
    pub multiplier: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        InstrumentConfig {
            root: "ES".to_string(),
            multiplier: 50.0,
        }
    }
}

/// Strategy parameter set, fixed at start.
///
/// The low/high pairs of SuperTrend and SAR parameters correspond to the
/// low-volume and high-volume day regimes; the day's pre-market volume flag
/// picks which pair drives trend signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Bar aggregation size in minutes
    #[serde(default = "default_timeframe")]
    pub timeframe: u32,

    /// Pre-market volume that marks a high-volume day
    #[serde(default = "default_volume_requirement")]
    pub volume_requirement: f64,
    /// Contracts per entry on low-volume days
    #[serde(default = "default_low_volume_qty")]
    pub low_volume_qty: i64,
    /// Contracts per entry on high-volume days
    #[serde(default = "default_high_volume_qty")]
    pub high_volume_qty: i64,

    #[serde(default = "default_supertrend_atr")]
    pub supertrend_atr: usize,
    #[serde(default = "default_supertrend_factor")]
    pub supertrend_factor: f64,
    #[serde(default = "default_supertrend_atr2")]
    pub supertrend_atr2: usize,
    #[serde(default = "default_supertrend_factor2")]
    pub supertrend_factor2: f64,

    #[serde(default = "default_sar_start")]
    pub sar_start: f64,
    #[serde(default = "default_sar_increment")]
    pub sar_increment: f64,
    #[serde(default = "default_sar_max")]
    pub sar_max: f64,
    #[serde(default = "default_sar_start2")]
    pub sar_start2: f64,
    #[serde(default = "default_sar_increment2")]
    pub sar_increment2: f64,
    #[serde(default = "default_sar_max2")]
    pub sar_max2: f64,

    /// Mean-reversion profit target in points (scaled by sqrt(timeframe))
    #[serde(default = "default_mean_rev_tp")]
    pub mean_rev_tp: f64,
    /// Mean-reversion stop in points (scaled by sqrt(timeframe))
    #[serde(default = "default_mean_rev_sl")]
    pub mean_rev_sl: f64,
    /// Bars a mean-reversion position may stay open before forced close
    #[serde(default = "default_max_bars_in_trade")]
    pub max_bars_in_trade: usize,

    #[serde(default = "default_atr_stop_len")]
    pub atr_stop_len: usize,
    #[serde(default = "default_atr_stop_mult")]
    pub atr_stop_mult: f64,

    #[serde(default = "default_adx_len")]
    pub adx_len: usize,
    /// ADX above this value marks the trending regime
    #[serde(default = "default_adx_thresh")]
    pub adx_thresh: f64,

    #[serde(default = "default_atr_len")]
    pub atr_len: usize,
    /// Trading requires ATR > avg ATR * this multiplier
    #[serde(default = "default_atr_threshold_mult")]
    pub atr_threshold_mult: f64,

    #[serde(default = "default_rsi_len")]
    pub rsi_len: usize,
    #[serde(default = "default_rsi_ob")]
    pub rsi_ob: f64,
    #[serde(default = "default_rsi_os")]
    pub rsi_os: f64,

    #[serde(default = "default_bb_len")]
    pub bb_len: usize,
    #[serde(default = "default_bb_mult")]
    pub bb_mult: f64,

    /// Pre-market volume accumulation window
    #[serde(default = "default_pre_start")]
    pub pre_start: NaiveTime,
    #[serde(default = "default_pre_end")]
    pub pre_end: NaiveTime,
    /// Trading session window
    #[serde(default = "default_session_start")]
    pub session_start: NaiveTime,
    #[serde(default = "default_session_end")]
    pub session_end: NaiveTime,
}

fn default_timeframe() -> u32 {
    5
}
fn default_volume_requirement() -> f64 {
    90_000.0
}
fn default_low_volume_qty() -> i64 {
    1
}
fn default_high_volume_qty() -> i64 {
    2
}
fn default_supertrend_atr() -> usize {
    3
}
fn default_supertrend_factor() -> f64 {
    1.7
}
fn default_supertrend_atr2() -> usize {
    5
}
fn default_supertrend_factor2() -> f64 {
    2.1
}
fn default_sar_start() -> f64 {
    0.008
}
fn default_sar_increment() -> f64 {
    0.004
}
fn default_sar_max() -> f64 {
    0.1
}
fn default_sar_start2() -> f64 {
    0.01
}
fn default_sar_increment2() -> f64 {
    0.006
}
fn default_sar_max2() -> f64 {
    0.1
}
fn default_mean_rev_tp() -> f64 {
    10.0
}
fn default_mean_rev_sl() -> f64 {
    6.0
}
fn default_max_bars_in_trade() -> usize {
    5
}
fn default_atr_stop_len() -> usize {
    23
}
fn default_atr_stop_mult() -> f64 {
    1.5
}
fn default_adx_len() -> usize {
    13
}
fn default_adx_thresh() -> f64 {
    18.0
}
fn default_atr_len() -> usize {
    14
}
fn default_atr_threshold_mult() -> f64 {
    0.8
}
fn default_rsi_len() -> usize {
    14
}
fn default_rsi_ob() -> f64 {
    70.0
}
fn default_rsi_os() -> f64 {
    30.0
}
fn default_bb_len() -> usize {
    20
}
fn default_bb_mult() -> f64 {
    2.0
}
fn default_pre_start() -> NaiveTime {
    NaiveTime::from_hms_opt(6, 30, 0).unwrap()
}
fn default_pre_end() -> NaiveTime {
    NaiveTime::from_hms_opt(6, 45, 0).unwrap()
}
fn default_session_start() -> NaiveTime {
    NaiveTime::from_hms_opt(6, 45, 0).unwrap()
}
fn default_session_end() -> NaiveTime {
    NaiveTime::from_hms_opt(8, 0, 0).unwrap()
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            timeframe: default_timeframe(),
            volume_requirement: default_volume_requirement(),
            low_volume_qty: default_low_volume_qty(),
            high_volume_qty: default_high_volume_qty(),
            supertrend_atr: default_supertrend_atr(),
            supertrend_factor: default_supertrend_factor(),
            supertrend_atr2: default_supertrend_atr2(),
            supertrend_factor2: default_supertrend_factor2(),
            sar_start: default_sar_start(),
            sar_increment: default_sar_increment(),
            sar_max: default_sar_max(),
            sar_start2: default_sar_start2(),
            sar_increment2: default_sar_increment2(),
            sar_max2: default_sar_max2(),
            mean_rev_tp: default_mean_rev_tp(),
            mean_rev_sl: default_mean_rev_sl(),
            max_bars_in_trade: default_max_bars_in_trade(),
            atr_stop_len: default_atr_stop_len(),
            atr_stop_mult: default_atr_stop_mult(),
            adx_len: default_adx_len(),
            adx_thresh: default_adx_thresh(),
            atr_len: default_atr_len(),
            atr_threshold_mult: default_atr_threshold_mult(),
            rsi_len: default_rsi_len(),
            rsi_ob: default_rsi_ob(),
            rsi_os: default_rsi_os(),
            bb_len: default_bb_len(),
            bb_mult: default_bb_mult(),
            pre_start: default_pre_start(),
            pre_end: default_pre_end(),
            session_start: default_session_start(),
            session_end: default_session_end(),
        }
    }
}

impl StrategyConfig {
    /// Scale time-based parameters to the configured timeframe.
    ///
    /// Point targets grow with sqrt(timeframe), the ATR stop multiplier is
    /// normalized against the 5-minute baseline, and the bar-count timeout
    /// shrinks by the same factor (floored, never below 2) so it stays
    /// roughly constant in wall-clock time.
    pub fn scaled(mut self) -> Self {
        if self.timeframe > 1 {
            let factor = (self.timeframe as f64).sqrt();

            self.mean_rev_tp *= factor;
            self.mean_rev_sl *= factor;
            self.atr_stop_mult *= factor / 5.0_f64.sqrt();
            self.max_bars_in_trade =
                ((self.max_bars_in_trade as f64 / factor) as usize).max(2);
        }
        self
    }

    /// Longest indicator lookback, which drives the warm-up length
    pub fn max_lookback(&self) -> usize {
        self.atr_len
            .max(self.adx_len)
            .max(self.supertrend_atr2)
            .max(self.atr_stop_len)
            .max(self.bb_len)
            .max(self.rsi_len)
    }

    /// Warm-up length in minute bars
    pub fn warmup_minutes(&self) -> usize {
        self.max_lookback() * self.timeframe.max(1) as usize * 3
    }

    /// Consolidated bars between periodic stats reports (~30 minutes)
    pub fn stats_report_interval(&self) -> u64 {
        (30 / self.timeframe.max(1) as u64).max(1)
    }
}

/// Backtest runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub data_dir: String,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            data_dir: "data".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scaling_at_five_minutes() {
        let s = StrategyConfig::default().scaled();
        let factor = 5.0_f64.sqrt();

        approx::assert_relative_eq!(s.mean_rev_tp, 10.0 * factor);
        approx::assert_relative_eq!(s.mean_rev_sl, 6.0 * factor);
        // factor / sqrt(5) is exactly 1 at the 5-minute baseline
        approx::assert_relative_eq!(s.atr_stop_mult, 1.5);
        // 5 / sqrt(5) = 2.23 -> floored to 2
        assert_eq!(s.max_bars_in_trade, 2);
    }

    #[test]
    fn test_scaling_noop_at_one_minute() {
        let s = StrategyConfig {
            timeframe: 1,
            ..StrategyConfig::default()
        }
        .scaled();

        assert_eq!(s.mean_rev_tp, 10.0);
        assert_eq!(s.max_bars_in_trade, 5);
    }

    #[test]
    fn test_max_bars_floor_is_two() {
        let s = StrategyConfig {
            timeframe: 60,
            ..StrategyConfig::default()
        }
        .scaled();

        // 5 / sqrt(60) < 1 but the timeout never drops below 2 bars
        assert_eq!(s.max_bars_in_trade, 2);
    }

    #[test]
    fn test_max_lookback_and_warmup() {
        let s = StrategyConfig::default();
        // atr_stop_len = 23 is the longest default lookback
        assert_eq!(s.max_lookback(), 23);
        assert_eq!(s.warmup_minutes(), 23 * 5 * 3);
    }

    #[test]
    fn test_stats_interval() {
        let s = StrategyConfig::default();
        assert_eq!(s.stats_report_interval(), 6);

        let hourly = StrategyConfig {
            timeframe: 60,
            ..StrategyConfig::default()
        };
        assert_eq!(hourly.stats_report_interval(), 1);
    }
}
