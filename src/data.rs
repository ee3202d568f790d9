//! Data loading and consolidation
//!
//! Loads 1-minute OHLCV bars from CSV and aggregates them into the
//! configured timeframe. Consolidation is a collaborator of the trading
//! core: the core only ever sees finished bars.

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use std::path::Path;
use tracing::info;

use crate::{Bar, Symbol};

/// One row of the minute feed: the bar plus the contract that traded it
#[derive(Debug, Clone)]
pub struct MinuteRecord {
    pub bar: Bar,
    pub contract: Symbol,
}

/// Load minute bars from a CSV file.
///
/// Expected columns: `datetime,open,high,low,close,volume[,contract]`.
/// Timestamps are bar end times in the exchange-local clock. Rows without
/// a contract column are assigned `default_contract` (a continuous-contract
/// file).
pub fn load_csv(path: impl AsRef<Path>, default_contract: &str) -> Result<Vec<MinuteRecord>> {
    let mut reader = csv::Reader::from_path(path.as_ref()).context("Failed to open CSV file")?;

    let default_contract = Symbol::new(default_contract);
    let mut records = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let end_time = dt_str
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                // Try parsing without timezone and keep the local clock
                chrono::NaiveDateTime::parse_from_str(dt_str, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            })
            .context(format!("Failed to parse datetime: {}", dt_str))?;

        let open: f64 = record
            .get(1)
            .context("Missing open column")?
            .parse()
            .context("Failed to parse open")?;
        let high: f64 = record
            .get(2)
            .context("Missing high column")?
            .parse()
            .context("Failed to parse high")?;
        let low: f64 = record
            .get(3)
            .context("Missing low column")?
            .parse()
            .context("Failed to parse low")?;
        let close: f64 = record
            .get(4)
            .context("Missing close column")?
            .parse()
            .context("Failed to parse close")?;
        let volume: f64 = record
            .get(5)
            .context("Missing volume column")?
            .parse()
            .context("Failed to parse volume")?;

        let contract = match record.get(6) {
            Some(c) if !c.is_empty() => Symbol::new(c),
            _ => default_contract.clone(),
        };

        records.push(MinuteRecord {
            bar: Bar {
                end_time,
                open,
                high,
                low,
                close,
                volume,
            },
            contract,
        });
    }

    info!(
        "Loaded {} minute bars from {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(records)
}

// =============================================================================
// Data Validation
// =============================================================================

/// Validate minute bars for consistency
pub fn validate_records(records: &[MinuteRecord]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if records.is_empty() {
        errors.push("No bars provided".to_string());
        return ValidationResult { errors, warnings };
    }

    for (i, record) in records.iter().enumerate() {
        let bar = &record.bar;
        if bar.high < bar.low {
            errors.push(format!("Bar {}: high ({}) < low ({})", i, bar.high, bar.low));
        }
        if bar.close <= 0.0 {
            errors.push(format!("Bar {}: invalid close price ({})", i, bar.close));
        }
        if bar.volume < 0.0 {
            errors.push(format!("Bar {}: negative volume ({})", i, bar.volume));
        }
        if i > 0 && bar.end_time <= records[i - 1].bar.end_time {
            warnings.push(format!("Bar {}: not chronological", i));
        }
    }

    ValidationResult { errors, warnings }
}

/// Result of data validation
#[derive(Debug)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Bar Consolidation
// =============================================================================

/// Aggregates minute bars into `timeframe`-minute bars.
///
/// Windows are calendar-aligned: a 5-minute bar finishes when the incoming
/// minute bar's end time lands on a multiple of 5 minutes past midnight.
/// For a 1-minute timeframe bars pass through untouched.
#[derive(Debug, Clone)]
pub struct Consolidator {
    timeframe: u32,
    working: Option<Bar>,
}

impl Consolidator {
    pub fn new(timeframe: u32) -> Self {
        Consolidator {
            timeframe: timeframe.max(1),
            working: None,
        }
    }

    /// Feed one minute bar; returns the finished consolidated bar if this
    /// minute closed the window.
    pub fn update(&mut self, bar: &Bar) -> Option<Bar> {
        if self.timeframe == 1 {
            return Some(bar.clone());
        }

        match self.working.as_mut() {
            Some(working) => {
                working.high = working.high.max(bar.high);
                working.low = working.low.min(bar.low);
                working.close = bar.close;
                working.volume += bar.volume;
                working.end_time = bar.end_time;
            }
            None => {
                self.working = Some(bar.clone());
            }
        }

        let minute_of_day = bar.end_time.hour() * 60 + bar.end_time.minute();
        if minute_of_day % self.timeframe == 0 {
            return self.working.take();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn minute_bar(h: u32, m: u32, open: f64, close: f64, volume: f64) -> Bar {
        Bar {
            end_time: Utc.with_ymd_and_hms(2025, 3, 3, h, m, 0).unwrap(),
            open,
            high: open.max(close) + 0.5,
            low: open.min(close) - 0.5,
            close,
            volume,
        }
    }

    #[test]
    fn test_passthrough_at_one_minute() {
        let mut consolidator = Consolidator::new(1);
        let bar = minute_bar(6, 46, 100.0, 101.0, 10.0);
        let out = consolidator.update(&bar).expect("bar");
        assert_eq!(out.close, 101.0);
    }

    #[test]
    fn test_five_minute_aggregation() {
        let mut consolidator = Consolidator::new(5);

        // Window 06:41 .. 06:45
        assert!(consolidator.update(&minute_bar(6, 41, 100.0, 101.0, 10.0)).is_none());
        assert!(consolidator.update(&minute_bar(6, 42, 101.0, 99.0, 10.0)).is_none());
        assert!(consolidator.update(&minute_bar(6, 43, 99.0, 102.0, 10.0)).is_none());
        assert!(consolidator.update(&minute_bar(6, 44, 102.0, 103.0, 10.0)).is_none());
        let out = consolidator
            .update(&minute_bar(6, 45, 103.0, 104.0, 10.0))
            .expect("window closes at 06:45");

        assert_eq!(out.open, 100.0);
        assert_eq!(out.close, 104.0);
        assert_eq!(out.volume, 50.0);
        assert_eq!(out.high, 104.5);
        assert_eq!(out.low, 98.5);
        assert_eq!(
            out.end_time,
            Utc.with_ymd_and_hms(2025, 3, 3, 6, 45, 0).unwrap()
        );
    }

    #[test]
    fn test_partial_window_emits_on_boundary() {
        let mut consolidator = Consolidator::new(5);
        // Stream starts mid-window: the partial bar still closes on the
        // aligned boundary
        assert!(consolidator.update(&minute_bar(6, 44, 100.0, 101.0, 10.0)).is_none());
        let out = consolidator.update(&minute_bar(6, 45, 101.0, 102.0, 10.0));
        assert!(out.is_some());
        assert_eq!(out.unwrap().volume, 20.0);
    }

    #[test]
    fn test_validation_catches_bad_rows() {
        let contract = Symbol::new("ESH6");
        let good = MinuteRecord {
            bar: minute_bar(6, 45, 100.0, 101.0, 10.0),
            contract: contract.clone(),
        };
        let mut bad_bar = minute_bar(6, 46, 100.0, 101.0, 10.0);
        bad_bar.low = 200.0; // high < low
        let bad = MinuteRecord {
            bar: bad_bar,
            contract,
        };

        let result = validate_records(&[good, bad]);
        assert!(!result.is_valid());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn test_validation_warns_on_out_of_order() {
        let contract = Symbol::new("ESH6");
        let first = MinuteRecord {
            bar: minute_bar(6, 46, 100.0, 101.0, 10.0),
            contract: contract.clone(),
        };
        let mut second = first.clone();
        second.bar.end_time = second.bar.end_time - Duration::minutes(1);

        let result = validate_records(&[first, second]);
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }
}
