//! Trade statistics
//!
//! Pure bookkeeping: counts and PnL split by strategy family, updated when
//! a position exit is observed. Reporting is a read-only snapshot and never
//! feeds back into trading decisions.

use serde::Serialize;

use crate::{ClosedTrade, Money, StrategyFamily};

/// Running trade statistics for one run
#[derive(Debug, Default)]
pub struct StatsTracker {
    multiplier: f64,
    trades: u32,
    winners: u32,
    losers: u32,
    total_pnl: Money,
    trend_trades: u32,
    trend_pnl: Money,
    mean_rev_trades: u32,
    mean_rev_pnl: Money,
}

impl StatsTracker {
    pub fn new(multiplier: f64) -> Self {
        StatsTracker {
            multiplier,
            ..StatsTracker::default()
        }
    }

    /// Record one completed round trip
    pub fn record_exit(&mut self, trade: &ClosedTrade) {
        let pnl = Money::from_f64(trade.point_pnl() * self.multiplier);

        self.trades += 1;
        if pnl.is_positive() {
            self.winners += 1;
        } else {
            self.losers += 1;
        }
        self.total_pnl += pnl;

        match trade.kind.family() {
            StrategyFamily::Trend => {
                self.trend_trades += 1;
                self.trend_pnl += pnl;
            }
            StrategyFamily::MeanReversion => {
                self.mean_rev_trades += 1;
                self.mean_rev_pnl += pnl;
            }
        }
    }

    pub fn trades(&self) -> u32 {
        self.trades
    }

    /// Read-only snapshot for reporting
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            trades: self.trades,
            winners: self.winners,
            losers: self.losers,
            win_rate: if self.trades > 0 {
                self.winners as f64 / self.trades as f64 * 100.0
            } else {
                0.0
            },
            total_pnl: self.total_pnl.to_f64(),
            avg_trade: if self.trades > 0 {
                self.total_pnl.to_f64() / self.trades as f64
            } else {
                0.0
            },
            trend_trades: self.trend_trades,
            trend_pnl: self.trend_pnl.to_f64(),
            mean_rev_trades: self.mean_rev_trades,
            mean_rev_pnl: self.mean_rev_pnl.to_f64(),
        }
    }
}

/// Point-in-time view of the counters
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub trades: u32,
    pub winners: u32,
    pub losers: u32,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub avg_trade: f64,
    pub trend_trades: u32,
    pub trend_pnl: f64,
    pub mean_rev_trades: u32,
    pub mean_rev_pnl: f64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== TRADE STATS ===")?;
        writeln!(
            f,
            "Total Trades: {} | Win Rate: {:.1}%",
            self.trades, self.win_rate
        )?;
        writeln!(f, "Winners: {} | Losers: {}", self.winners, self.losers)?;
        writeln!(
            f,
            "Total PnL: {:.2} | Avg Trade: {:.2}",
            self.total_pnl, self.avg_trade
        )?;
        writeln!(
            f,
            "Trend Trades: {} | Trend PnL: {:.2}",
            self.trend_trades, self.trend_pnl
        )?;
        write!(
            f,
            "MR Trades: {} | MR PnL: {:.2}",
            self.mean_rev_trades, self.mean_rev_pnl
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExitReason, StrategyKind, Symbol};

    fn trade(kind: StrategyKind, qty: i64, entry: f64, exit: f64) -> ClosedTrade {
        ClosedTrade {
            symbol: Symbol::new("ESH6"),
            kind,
            quantity: qty,
            entry_price: entry,
            exit_price: exit,
            reason: ExitReason::SignalFlip,
        }
    }

    #[test]
    fn test_family_split() {
        let mut stats = StatsTracker::new(50.0);
        // Trend long: +10 points * 1 contract * $50
        stats.record_exit(&trade(StrategyKind::TrendLong, 1, 5000.0, 5010.0));
        // MR short: -4 points against * 2 contracts * $50
        stats.record_exit(&trade(StrategyKind::MeanRevShort, -2, 5000.0, 5002.0));

        let snap = stats.snapshot();
        assert_eq!(snap.trades, 2);
        assert_eq!(snap.winners, 1);
        assert_eq!(snap.losers, 1);
        assert_eq!(snap.trend_trades, 1);
        assert_eq!(snap.trend_pnl, 500.0);
        assert_eq!(snap.mean_rev_trades, 1);
        assert_eq!(snap.mean_rev_pnl, -200.0);
        assert_eq!(snap.total_pnl, 300.0);
        assert_eq!(snap.win_rate, 50.0);
    }

    #[test]
    fn test_zero_pnl_counts_as_loss() {
        let mut stats = StatsTracker::new(50.0);
        stats.record_exit(&trade(StrategyKind::TrendLong, 1, 5000.0, 5000.0));

        let snap = stats.snapshot();
        assert_eq!(snap.winners, 0);
        assert_eq!(snap.losers, 1);
    }

    #[test]
    fn test_empty_snapshot_has_no_nan() {
        let stats = StatsTracker::new(50.0);
        let snap = stats.snapshot();
        assert_eq!(snap.win_rate, 0.0);
        assert_eq!(snap.avg_trade, 0.0);
    }

    #[test]
    fn test_snapshot_is_read_only() {
        let mut stats = StatsTracker::new(50.0);
        stats.record_exit(&trade(StrategyKind::MeanRevLong, 1, 100.0, 110.0));

        let before = stats.snapshot();
        let _ = stats.snapshot();
        let after = stats.snapshot();
        assert_eq!(before.trades, after.trades);
        assert_eq!(before.total_pnl, after.total_pnl);
    }
}
