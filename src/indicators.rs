//! Technical indicators
//!
//! Incremental implementations updated once per consolidated bar. The bank
//! runs them in explicit dependency order (ATR first, then the average-ATR
//! fed from its current value) and exposes a read-only snapshot per bar.

use std::collections::VecDeque;

use crate::config::StrategyConfig;
use crate::Bar;

/// One indicator reading: current value plus readiness
#[derive(Debug, Clone, Copy, Default)]
pub struct Reading {
    pub value: f64,
    pub ready: bool,
}

impl Reading {
    fn new(value: f64, ready: bool) -> Self {
        Reading { value, ready }
    }
}

/// Per-bar snapshot of every indicator the strategy consumes.
///
/// Produced fresh each bar; the trading core never mutates it.
#[derive(Debug, Clone, Copy)]
pub struct IndicatorSnapshot {
    pub atr: Reading,
    pub avg_atr: Reading,
    pub adx: Reading,
    pub supertrend_low: Reading,
    pub supertrend_high: Reading,
    pub psar_low: Reading,
    pub psar_high: Reading,
    pub rsi: Reading,
    pub bb_upper: Reading,
    pub bb_lower: Reading,
}

impl IndicatorSnapshot {
    /// Caller-side precondition for signal computation
    pub fn all_ready(&self) -> bool {
        self.atr.ready
            && self.avg_atr.ready
            && self.adx.ready
            && self.supertrend_low.ready
            && self.supertrend_high.ready
            && self.psar_low.ready
            && self.psar_high.ready
            && self.rsi.ready
            && self.bb_upper.ready
            && self.bb_lower.ready
    }

    /// Volatility gate: trading requires ATR above its own average
    pub fn volatility_ok(&self, threshold_mult: f64) -> bool {
        self.atr.ready && self.avg_atr.ready && self.atr.value > self.avg_atr.value * threshold_mult
    }
}

/// Simple Moving Average over a fixed window
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    pub fn new(period: usize) -> Self {
        SimpleMovingAverage {
            period: period.max(1),
            window: VecDeque::new(),
            sum: 0.0,
        }
    }

    pub fn update(&mut self, value: f64) {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.window.len() >= self.period
    }

    pub fn value(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }
}

/// Average True Range with Wilder smoothing
#[derive(Debug, Clone)]
pub struct AverageTrueRange {
    period: usize,
    prev_close: Option<f64>,
    seed_sum: f64,
    samples: usize,
    value: f64,
}

impl AverageTrueRange {
    pub fn new(period: usize) -> Self {
        AverageTrueRange {
            period: period.max(1),
            prev_close: None,
            seed_sum: 0.0,
            samples: 0,
            value: 0.0,
        }
    }

    fn true_range(&self, bar: &Bar) -> f64 {
        match self.prev_close {
            Some(pc) => (bar.high - bar.low)
                .max((bar.high - pc).abs())
                .max((bar.low - pc).abs()),
            None => bar.high - bar.low,
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        let tr = self.true_range(bar);
        self.prev_close = Some(bar.close);

        let p = self.period as f64;
        if self.samples < self.period {
            // Seed with a simple average of the first `period` true ranges
            self.seed_sum += tr;
            self.samples += 1;
            if self.samples == self.period {
                self.value = self.seed_sum / p;
            }
        } else {
            self.value = (self.value * (p - 1.0) + tr) / p;
            self.samples += 1;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.samples >= self.period
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Relative Strength Index with Wilder smoothing
#[derive(Debug, Clone)]
pub struct RelativeStrengthIndex {
    period: usize,
    prev: Option<f64>,
    gain_seed: f64,
    loss_seed: f64,
    avg_gain: f64,
    avg_loss: f64,
    samples: usize,
}

impl RelativeStrengthIndex {
    pub fn new(period: usize) -> Self {
        RelativeStrengthIndex {
            period: period.max(1),
            prev: None,
            gain_seed: 0.0,
            loss_seed: 0.0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            samples: 0,
        }
    }

    pub fn update(&mut self, close: f64) {
        let prev = match self.prev.replace(close) {
            Some(p) => p,
            None => return,
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let p = self.period as f64;

        if self.samples < self.period {
            self.gain_seed += gain;
            self.loss_seed += loss;
            self.samples += 1;
            if self.samples == self.period {
                self.avg_gain = self.gain_seed / p;
                self.avg_loss = self.loss_seed / p;
            }
        } else {
            self.avg_gain = (self.avg_gain * (p - 1.0) + gain) / p;
            self.avg_loss = (self.avg_loss * (p - 1.0) + loss) / p;
            self.samples += 1;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.samples >= self.period
    }

    pub fn value(&self) -> f64 {
        if !self.is_ready() {
            return 0.0;
        }
        if self.avg_loss == 0.0 {
            return 100.0;
        }
        let rs = self.avg_gain / self.avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

/// Average Directional Index with Wilder smoothing
#[derive(Debug, Clone)]
pub struct AverageDirectionalIndex {
    period: usize,
    prev: Option<(f64, f64, f64)>,
    tr_smooth: f64,
    plus_smooth: f64,
    minus_smooth: f64,
    dm_samples: usize,
    dx_seed: f64,
    dx_samples: usize,
    adx: f64,
    ready: bool,
}

impl AverageDirectionalIndex {
    pub fn new(period: usize) -> Self {
        AverageDirectionalIndex {
            period: period.max(1),
            prev: None,
            tr_smooth: 0.0,
            plus_smooth: 0.0,
            minus_smooth: 0.0,
            dm_samples: 0,
            dx_seed: 0.0,
            dx_samples: 0,
            adx: 0.0,
            ready: false,
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        let prev = self.prev.replace((bar.high, bar.low, bar.close));
        let (ph, pl, pc) = match prev {
            Some(t) => t,
            None => return,
        };

        let tr = (bar.high - bar.low)
            .max((bar.high - pc).abs())
            .max((bar.low - pc).abs());
        let up_move = bar.high - ph;
        let down_move = pl - bar.low;
        let plus_dm = if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        };
        let minus_dm = if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        };

        let p = self.period as f64;
        if self.dm_samples < self.period {
            self.tr_smooth += tr;
            self.plus_smooth += plus_dm;
            self.minus_smooth += minus_dm;
            self.dm_samples += 1;
            if self.dm_samples < self.period {
                return;
            }
        } else {
            self.tr_smooth = self.tr_smooth - self.tr_smooth / p + tr;
            self.plus_smooth = self.plus_smooth - self.plus_smooth / p + plus_dm;
            self.minus_smooth = self.minus_smooth - self.minus_smooth / p + minus_dm;
        }

        if self.tr_smooth <= 0.0 {
            return;
        }

        let plus_di = 100.0 * self.plus_smooth / self.tr_smooth;
        let minus_di = 100.0 * self.minus_smooth / self.tr_smooth;
        let di_sum = plus_di + minus_di;
        let dx = if di_sum > 0.0 {
            100.0 * (plus_di - minus_di).abs() / di_sum
        } else {
            0.0
        };

        if !self.ready {
            self.dx_seed += dx;
            self.dx_samples += 1;
            if self.dx_samples == self.period {
                self.adx = self.dx_seed / p;
                self.ready = true;
            }
        } else {
            self.adx = (self.adx * (p - 1.0) + dx) / p;
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn value(&self) -> f64 {
        self.adx
    }
}

/// SuperTrend: ATR band that ratchets behind price and flips on a cross.
///
/// The value is the active band: the lower band while the trend is up, the
/// upper band while it is down.
#[derive(Debug, Clone)]
pub struct SuperTrend {
    factor: f64,
    atr: AverageTrueRange,
    prev_close: Option<f64>,
    final_upper: Option<f64>,
    final_lower: Option<f64>,
    trend_up: bool,
}

impl SuperTrend {
    pub fn new(atr_period: usize, factor: f64) -> Self {
        SuperTrend {
            factor,
            atr: AverageTrueRange::new(atr_period),
            prev_close: None,
            final_upper: None,
            final_lower: None,
            trend_up: true,
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        self.atr.update(bar);
        if !self.atr.is_ready() {
            self.prev_close = Some(bar.close);
            return;
        }

        let mid = (bar.high + bar.low) / 2.0;
        let basic_upper = mid + self.factor * self.atr.value();
        let basic_lower = mid - self.factor * self.atr.value();

        // Bands only ratchet toward price unless the previous close broke out
        let final_upper = match (self.final_upper, self.prev_close) {
            (Some(prev_band), Some(prev_close)) => {
                if basic_upper < prev_band || prev_close > prev_band {
                    basic_upper
                } else {
                    prev_band
                }
            }
            _ => basic_upper,
        };
        let final_lower = match (self.final_lower, self.prev_close) {
            (Some(prev_band), Some(prev_close)) => {
                if basic_lower > prev_band || prev_close < prev_band {
                    basic_lower
                } else {
                    prev_band
                }
            }
            _ => basic_lower,
        };

        if bar.close > final_upper {
            self.trend_up = true;
        } else if bar.close < final_lower {
            self.trend_up = false;
        }

        self.final_upper = Some(final_upper);
        self.final_lower = Some(final_lower);
        self.prev_close = Some(bar.close);
    }

    pub fn is_ready(&self) -> bool {
        self.final_upper.is_some()
    }

    pub fn value(&self) -> f64 {
        if self.trend_up {
            self.final_lower.unwrap_or(0.0)
        } else {
            self.final_upper.unwrap_or(0.0)
        }
    }
}

/// Parabolic Stop-And-Reverse
#[derive(Debug, Clone)]
pub struct ParabolicSar {
    af_start: f64,
    af_increment: f64,
    af_max: f64,
    first: Option<(f64, f64, f64)>,
    state: Option<SarState>,
    recent_lows: VecDeque<f64>,
    recent_highs: VecDeque<f64>,
}

#[derive(Debug, Clone)]
struct SarState {
    sar: f64,
    extreme: f64,
    af: f64,
    rising: bool,
}

impl ParabolicSar {
    pub fn new(af_start: f64, af_increment: f64, af_max: f64) -> Self {
        ParabolicSar {
            af_start,
            af_increment,
            af_max,
            first: None,
            state: None,
            recent_lows: VecDeque::new(),
            recent_highs: VecDeque::new(),
        }
    }

    fn remember(&mut self, bar: &Bar) {
        self.recent_lows.push_back(bar.low);
        self.recent_highs.push_back(bar.high);
        if self.recent_lows.len() > 2 {
            self.recent_lows.pop_front();
            self.recent_highs.pop_front();
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        let mut state = match self.state.take() {
            Some(s) => s,
            None => {
                match self.first.take() {
                    None => {
                        self.first = Some((bar.high, bar.low, bar.close));
                    }
                    Some((fh, fl, fc)) => {
                        // Direction of the first two closes seeds the trend
                        let rising = bar.close >= fc;
                        let (sar, extreme) = if rising {
                            (fl.min(bar.low), fh.max(bar.high))
                        } else {
                            (fh.max(bar.high), fl.min(bar.low))
                        };
                        self.state = Some(SarState {
                            sar,
                            extreme,
                            af: self.af_start,
                            rising,
                        });
                    }
                }
                self.remember(bar);
                return;
            }
        };

        let mut sar = state.sar + state.af * (state.extreme - state.sar);

        // SAR may never enter the range of the last two bars
        if state.rising {
            for &low in &self.recent_lows {
                sar = sar.min(low);
            }
        } else {
            for &high in &self.recent_highs {
                sar = sar.max(high);
            }
        }

        if state.rising {
            if bar.low < sar {
                // Reverse to falling
                state.rising = false;
                state.sar = state.extreme;
                state.extreme = bar.low;
                state.af = self.af_start;
            } else {
                state.sar = sar;
                if bar.high > state.extreme {
                    state.extreme = bar.high;
                    state.af = (state.af + self.af_increment).min(self.af_max);
                }
            }
        } else if bar.high > sar {
            // Reverse to rising
            state.rising = true;
            state.sar = state.extreme;
            state.extreme = bar.high;
            state.af = self.af_start;
        } else {
            state.sar = sar;
            if bar.low < state.extreme {
                state.extreme = bar.low;
                state.af = (state.af + self.af_increment).min(self.af_max);
            }
        }

        self.state = Some(state);
        self.remember(bar);
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    pub fn value(&self) -> f64 {
        self.state.as_ref().map(|s| s.sar).unwrap_or(0.0)
    }
}

/// Bollinger Bands on an SMA basis
#[derive(Debug, Clone)]
pub struct BollingerBands {
    period: usize,
    mult: f64,
    window: VecDeque<f64>,
}

impl BollingerBands {
    pub fn new(period: usize, mult: f64) -> Self {
        BollingerBands {
            period: period.max(1),
            mult,
            window: VecDeque::new(),
        }
    }

    pub fn update(&mut self, close: f64) {
        self.window.push_back(close);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.window.len() >= self.period
    }

    fn mean(&self) -> f64 {
        self.window.iter().sum::<f64>() / self.window.len() as f64
    }

    fn std_dev(&self) -> f64 {
        let mean = self.mean();
        let variance = self
            .window
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f64>()
            / self.window.len() as f64;
        variance.sqrt()
    }

    pub fn upper(&self) -> f64 {
        self.mean() + self.mult * self.std_dev()
    }

    pub fn lower(&self) -> f64 {
        self.mean() - self.mult * self.std_dev()
    }
}

/// The full indicator set the strategy consumes, updated once per bar.
///
/// Two SuperTrend/SAR instances run side by side: the tight pair for
/// low-volume days and the wide pair for high-volume days. The signal layer
/// picks one per the day's volume flag; both stay warm either way.
pub struct IndicatorBank {
    atr: AverageTrueRange,
    avg_atr: SimpleMovingAverage,
    adx: AverageDirectionalIndex,
    supertrend_low: SuperTrend,
    supertrend_high: SuperTrend,
    psar_low: ParabolicSar,
    psar_high: ParabolicSar,
    rsi: RelativeStrengthIndex,
    bb: BollingerBands,
}

impl IndicatorBank {
    pub fn new(config: &StrategyConfig) -> Self {
        IndicatorBank {
            atr: AverageTrueRange::new(config.atr_len),
            avg_atr: SimpleMovingAverage::new(config.atr_len),
            adx: AverageDirectionalIndex::new(config.adx_len),
            supertrend_low: SuperTrend::new(config.supertrend_atr, config.supertrend_factor),
            supertrend_high: SuperTrend::new(config.supertrend_atr2, config.supertrend_factor2),
            psar_low: ParabolicSar::new(config.sar_start, config.sar_increment, config.sar_max),
            psar_high: ParabolicSar::new(config.sar_start2, config.sar_increment2, config.sar_max2),
            rsi: RelativeStrengthIndex::new(config.rsi_len),
            bb: BollingerBands::new(config.bb_len, config.bb_mult),
        }
    }

    /// Feed one consolidated bar through every indicator.
    ///
    /// Order matters for the dependent average: ATR updates first, then the
    /// average-ATR is fed from its fresh value.
    pub fn update(&mut self, bar: &Bar) {
        self.atr.update(bar);
        if self.atr.is_ready() {
            self.avg_atr.update(self.atr.value());
        }

        self.adx.update(bar);
        self.supertrend_low.update(bar);
        self.supertrend_high.update(bar);
        self.psar_low.update(bar);
        self.psar_high.update(bar);
        self.rsi.update(bar.close);
        self.bb.update(bar.close);
    }

    pub fn snapshot(&self) -> IndicatorSnapshot {
        IndicatorSnapshot {
            atr: Reading::new(self.atr.value(), self.atr.is_ready()),
            avg_atr: Reading::new(self.avg_atr.value(), self.avg_atr.is_ready()),
            adx: Reading::new(self.adx.value(), self.adx.is_ready()),
            supertrend_low: Reading::new(
                self.supertrend_low.value(),
                self.supertrend_low.is_ready(),
            ),
            supertrend_high: Reading::new(
                self.supertrend_high.value(),
                self.supertrend_high.is_ready(),
            ),
            psar_low: Reading::new(self.psar_low.value(), self.psar_low.is_ready()),
            psar_high: Reading::new(self.psar_high.value(), self.psar_high.is_ready()),
            rsi: Reading::new(self.rsi.value(), self.rsi.is_ready()),
            bb_upper: Reading::new(self.bb.upper(), self.bb.is_ready()),
            bb_lower: Reading::new(self.bb.lower(), self.bb.is_ready()),
        }
    }
}
