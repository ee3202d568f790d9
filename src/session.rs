//! Trading session gate
//!
//! Classifies bars against the session and pre-market windows, accumulates
//! pre-market volume, and latches the day's high-volume flag. Also owns the
//! monotonic bar counter the timeout logic keys on; that counter survives
//! date rollovers and resets only with the process.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;

use crate::config::StrategyConfig;

#[derive(Debug, Clone)]
pub struct SessionGate {
    timeframe: u32,
    volume_requirement: f64,
    pre_start: chrono::NaiveTime,
    pre_end: chrono::NaiveTime,
    session_start: chrono::NaiveTime,
    session_end: chrono::NaiveTime,

    pre_volume: f64,
    volume_high: bool,
    volume_checked: bool,
    last_trade_date: Option<NaiveDate>,
    bar_index: u64,
}

impl SessionGate {
    pub fn new(config: &StrategyConfig) -> Self {
        SessionGate {
            timeframe: config.timeframe,
            volume_requirement: config.volume_requirement,
            pre_start: config.pre_start,
            pre_end: config.pre_end,
            session_start: config.session_start,
            session_end: config.session_end,
            pre_volume: 0.0,
            volume_high: false,
            volume_checked: false,
            last_trade_date: None,
            bar_index: 0,
        }
    }

    /// Reset the daily accumulators when the calendar date changes.
    ///
    /// Returns true on the first bar of a new trading day. The bar counter
    /// is deliberately not touched here.
    pub fn roll_date(&mut self, date: NaiveDate) -> bool {
        if self.last_trade_date == Some(date) {
            return false;
        }
        self.pre_volume = 0.0;
        self.volume_high = false;
        self.volume_checked = false;
        self.last_trade_date = Some(date);
        debug!("new trading day: {date}");
        true
    }

    /// Accumulate pre-market volume while inside the pre-market window
    pub fn observe_bar(&mut self, timestamp: DateTime<Utc>, bar_volume: f64) {
        let t = timestamp.time();
        if t >= self.pre_start && t <= self.pre_end {
            self.pre_volume += bar_volume;
            debug!(pre_volume = self.pre_volume, "pre-market volume");
        }
    }

    /// Latch the day's volume flag once the pre-market window has closed.
    ///
    /// The first call after `pre_end` decides the flag; later calls return
    /// the latched value untouched.
    pub fn evaluate_volume_flag(&mut self, timestamp: DateTime<Utc>) -> bool {
        if !self.volume_checked && timestamp.time() > self.pre_end {
            self.volume_high = self.pre_volume >= self.volume_requirement;
            self.volume_checked = true;
            debug!(
                pre_volume = self.pre_volume,
                requirement = self.volume_requirement,
                volume_high = self.volume_high,
                "pre-market volume check"
            );
        }
        self.volume_high
    }

    pub fn volume_high(&self) -> bool {
        self.volume_high
    }

    pub fn pre_volume(&self) -> f64 {
        self.pre_volume
    }

    /// Whether a bar ending at `bar_end` belongs to the trading session.
    ///
    /// A consolidated bar spans `[bar_end - (timeframe - 1), bar_end]`
    /// minutes and may straddle the exact session-open instant; such a bar
    /// counts as in-session rather than being dropped.
    pub fn is_in_session(&self, bar_end: DateTime<Utc>) -> bool {
        let end = bar_end.time();

        if self.timeframe > 1 {
            let start = (bar_end - Duration::minutes(self.timeframe as i64 - 1)).time();
            if start < self.session_start && self.session_start <= end {
                return true;
            }
            return self.session_start <= start && end <= self.session_end;
        }

        self.session_start <= end && end <= self.session_end
    }

    /// Whether a timestamp falls inside the pre-market window
    pub fn is_pre_market(&self, timestamp: DateTime<Utc>) -> bool {
        let t = timestamp.time();
        t >= self.pre_start && t <= self.pre_end
    }

    /// Advance and return the bar counter; called once per processed bar
    pub fn next_bar_index(&mut self) -> u64 {
        self.bar_index += 1;
        self.bar_index
    }

    pub fn bar_index(&self) -> u64 {
        self.bar_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gate(timeframe: u32) -> SessionGate {
        let config = StrategyConfig {
            timeframe,
            ..StrategyConfig::default()
        };
        SessionGate::new(&config)
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, h, m, 0).unwrap()
    }

    #[test]
    fn test_premarket_volume_latches_high() {
        let mut gate = gate(5);
        gate.roll_date(at(6, 30).date_naive());

        gate.observe_bar(at(6, 31), 50_000.0);
        gate.observe_bar(at(6, 40), 45_000.0);
        assert_eq!(gate.pre_volume(), 95_000.0);

        assert!(gate.evaluate_volume_flag(at(6, 46)));
        assert!(gate.volume_high());

        // Latched: later volume changes cannot flip the flag back
        gate.observe_bar(at(7, 0), 0.0);
        assert!(gate.evaluate_volume_flag(at(7, 30)));
    }

    #[test]
    fn test_low_volume_day_stays_low() {
        let mut gate = gate(5);
        gate.roll_date(at(6, 30).date_naive());

        gate.observe_bar(at(6, 35), 10_000.0);
        assert!(!gate.evaluate_volume_flag(at(6, 50)));

        // More volume after the window closes does not count
        gate.observe_bar(at(7, 0), 500_000.0);
        assert!(!gate.evaluate_volume_flag(at(7, 5)));
    }

    #[test]
    fn test_volume_outside_window_ignored() {
        let mut gate = gate(5);
        gate.roll_date(at(6, 0).date_naive());

        gate.observe_bar(at(6, 29), 100_000.0);
        gate.observe_bar(at(6, 46), 100_000.0);
        assert_eq!(gate.pre_volume(), 0.0);
    }

    #[test]
    fn test_daily_reset() {
        let mut gate = gate(5);
        assert!(gate.roll_date(at(6, 30).date_naive()));
        gate.observe_bar(at(6, 35), 95_000.0);
        assert!(gate.evaluate_volume_flag(at(6, 50)));

        // Same date: no reset
        assert!(!gate.roll_date(at(6, 30).date_naive()));
        assert!(gate.volume_high());

        // New date: accumulator and flag reset, bar counter untouched
        gate.next_bar_index();
        let next_day = Utc.with_ymd_and_hms(2025, 3, 4, 6, 30, 0).unwrap();
        assert!(gate.roll_date(next_day.date_naive()));
        assert_eq!(gate.pre_volume(), 0.0);
        assert!(!gate.volume_high());
        assert_eq!(gate.bar_index(), 1);
    }

    #[test]
    fn test_single_minute_session_bounds() {
        let gate = gate(1);
        assert!(!gate.is_in_session(at(6, 44)));
        assert!(gate.is_in_session(at(6, 45)));
        assert!(gate.is_in_session(at(8, 0)));
        assert!(!gate.is_in_session(at(8, 1)));
    }

    #[test]
    fn test_consolidated_bar_straddles_open() {
        let gate = gate(5);
        // Bar covering 06:41-06:45 starts before the 06:45 open and ends on it
        assert!(gate.is_in_session(at(6, 45)));
        // Bar covering 06:36-06:40 is entirely pre-open
        assert!(!gate.is_in_session(at(6, 40)));
        // Bar fully inside the session
        assert!(gate.is_in_session(at(7, 0)));
        // Bar ending after the close is dropped
        assert!(!gate.is_in_session(at(8, 4)));
    }

    #[test]
    fn test_bar_index_monotonic() {
        let mut gate = gate(5);
        assert_eq!(gate.next_bar_index(), 1);
        assert_eq!(gate.next_bar_index(), 2);
        gate.roll_date(at(6, 30).date_naive());
        assert_eq!(gate.next_bar_index(), 3);
    }
}
