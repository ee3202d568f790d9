//! Core data types used across the trading system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for bar data
#[derive(Debug, Error)]
pub enum BarValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// OHLCV bar.
///
/// `end_time` is the close timestamp of the interval the bar covers: a
/// one-minute bar ending 06:45 covers 06:44-06:45, a consolidated 5-minute
/// bar ending 06:45 covers 06:40-06:45. Input data is expected in the
/// exchange-local clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub end_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Create a new bar with validation
    pub fn new(
        end_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarValidationError> {
        let bar = Self {
            end_time,
            open,
            high,
            low,
            close,
            volume,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Validate the bar data
    pub fn validate(&self) -> Result<(), BarValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(BarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume < 0.0 {
            return Err(BarValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(BarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(BarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Close up or down on the interval
    pub fn is_up(&self) -> bool {
        self.close > self.open
    }

    pub fn is_down(&self) -> bool {
        self.close < self.open
    }
}

/// Contract symbol using Arc<str> for cheap cloning
///
/// Symbols are cloned into orders, fills, and position records on every
/// entry and rollover; Arc<str> keeps those clones allocation-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sub-strategy that opened a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    TrendLong,
    TrendShort,
    MeanRevLong,
    MeanRevShort,
}

impl StrategyKind {
    pub fn family(self) -> StrategyFamily {
        match self {
            StrategyKind::TrendLong | StrategyKind::TrendShort => StrategyFamily::Trend,
            StrategyKind::MeanRevLong | StrategyKind::MeanRevShort => {
                StrategyFamily::MeanReversion
            }
        }
    }

    /// Only mean-reversion positions carry the bar-count timeout
    pub fn is_mean_reversion(self) -> bool {
        self.family() == StrategyFamily::MeanReversion
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyKind::TrendLong => "trend_long",
            StrategyKind::TrendShort => "trend_short",
            StrategyKind::MeanRevLong => "mr_long",
            StrategyKind::MeanRevShort => "mr_short",
        };
        write!(f, "{s}")
    }
}

/// Strategy family, the axis trade statistics are split on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyFamily {
    Trend,
    MeanReversion,
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Neither signal of the position's category held on the bar
    SignalFlip,
    /// Mean-reversion bar-count timeout
    Timeout,
    /// Forced close at the end of a run
    EndOfRun,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::SignalFlip => "signal",
            ExitReason::Timeout => "timeout",
            ExitReason::EndOfRun => "end_of_run",
        };
        write!(f, "{s}")
    }
}

/// Completed round trip, as observed by the stats tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub symbol: Symbol,
    pub kind: StrategyKind,
    /// Signed contracts: positive long, negative short
    pub quantity: i64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub reason: ExitReason,
}

impl ClosedTrade {
    /// PnL in index points times contracts; the stats tracker applies the
    /// contract multiplier.
    pub fn point_pnl(&self) -> f64 {
        (self.exit_price - self.entry_price) * self.quantity as f64
    }
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Monetary Values
// ============================================================================

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

/// Money type for precise decimal arithmetic in PnL accumulation.
///
/// Wraps `rust_decimal::Decimal`. Running PnL totals are summed across the
/// whole run; accumulating them in f64 drifts, so the counters keep Decimal
/// and convert to f64 only for display.
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    /// Zero value
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Create from f64
    /// Note: NaN and infinities collapse to zero
    pub fn from_f64(value: f64) -> Self {
        Money(Decimal::try_from(value).unwrap_or_else(|_| {
            if value.is_nan() || value.is_infinite() {
                Decimal::ZERO
            } else {
                Decimal::from_f64_retain(value).unwrap_or(Decimal::ZERO)
            }
        }))
    }

    /// Convert to f64 (for display and ratio computation)
    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Money {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Money {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self::Output {
        Money(self.0 * rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bar_validation() {
        let t = Utc.with_ymd_and_hms(2025, 3, 3, 6, 45, 0).unwrap();
        assert!(Bar::new(t, 100.0, 105.0, 95.0, 102.0, 1000.0).is_ok());
        assert!(Bar::new(t, 100.0, 95.0, 105.0, 102.0, 1000.0).is_err()); // high < low
        assert!(Bar::new(t, 100.0, 105.0, 95.0, 110.0, 1000.0).is_err()); // close out of range
        assert!(Bar::new(t, 100.0, 105.0, 95.0, 102.0, -1.0).is_err()); // negative volume
    }

    #[test]
    fn test_bar_direction() {
        let t = Utc.with_ymd_and_hms(2025, 3, 3, 6, 45, 0).unwrap();
        let up = Bar::new(t, 100.0, 103.0, 99.0, 102.0, 1.0).unwrap();
        let down = Bar::new(t, 102.0, 103.0, 99.0, 100.0, 1.0).unwrap();
        assert!(up.is_up() && !up.is_down());
        assert!(down.is_down() && !down.is_up());
    }

    #[test]
    fn test_strategy_kind_family() {
        assert_eq!(StrategyKind::TrendLong.family(), StrategyFamily::Trend);
        assert_eq!(
            StrategyKind::MeanRevShort.family(),
            StrategyFamily::MeanReversion
        );
        assert!(StrategyKind::MeanRevLong.is_mean_reversion());
        assert!(!StrategyKind::TrendShort.is_mean_reversion());
    }

    #[test]
    fn test_closed_trade_point_pnl() {
        let trade = ClosedTrade {
            symbol: Symbol::new("ESH6"),
            kind: StrategyKind::TrendShort,
            quantity: -2,
            entry_price: 5000.0,
            exit_price: 4990.0,
            reason: ExitReason::SignalFlip,
        };
        assert_eq!(trade.point_pnl(), 20.0);
    }

    #[test]
    fn test_money_precision() {
        // Classic floating point problem: 0.1 + 0.2 != 0.3 in f64
        let a = Money::from_f64(0.1);
        let b = Money::from_f64(0.2);
        let c = Money::from_f64(0.3);
        assert_eq!(a + b, c, "Money should handle 0.1 + 0.2 = 0.3 correctly");
    }

    #[test]
    fn test_money_sum() {
        let values = vec![
            Money::from_f64(10.0),
            Money::from_f64(-2.5),
            Money::from_f64(30.0),
        ];
        let total: Money = values.into_iter().sum();
        assert_eq!(total.to_f64(), 37.5);
    }
}
