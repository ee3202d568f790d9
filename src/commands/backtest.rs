//! Backtest command implementation
//!
//! Wires the minute feed, consolidator, simulated broker, and strategy
//! engine together and replays the data in strict time order.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use futures_strategies::broker::SimBroker;
use futures_strategies::data::{self, Consolidator};
use futures_strategies::engine::StrategyEngine;
use futures_strategies::Config;

pub fn run(config_path: String, data_override: Option<String>) -> Result<()> {
    info!("Starting backtest");

    let config = if Path::new(&config_path).exists() {
        let config = Config::from_file(&config_path)?;
        info!("Loaded configuration from: {}", config_path);
        config
    } else {
        warn!("Config file {} not found, using defaults", config_path);
        let mut config = Config::default();
        config.strategy = config.strategy.scaled();
        config
    };

    let data_path = data_override.unwrap_or_else(|| {
        format!(
            "{}/{}_1m.csv",
            config.backtest.data_dir, config.instrument.root
        )
    });

    info!("Loading data from: {}", data_path);
    let records = data::load_csv(&data_path, &config.instrument.root)?;

    let validation = data::validate_records(&records);
    for warning in &validation.warnings {
        warn!("{warning}");
    }
    if !validation.is_valid() {
        for error in &validation.errors {
            warn!("{error}");
        }
        anyhow::bail!("Data validation failed with {} errors", validation.errors.len());
    }

    let mut broker = SimBroker::new(config.instrument.multiplier);
    let mut consolidator = Consolidator::new(config.strategy.timeframe);

    let mut current_contract = records[0].contract.clone();
    let mut engine = StrategyEngine::new(&config, current_contract.clone());

    info!("Running backtest...");
    for record in &records {
        broker.set_mark(&record.contract, record.bar.close);

        if record.contract != current_contract {
            engine.on_contract_changed(&current_contract, &record.contract, &mut broker);
            current_contract = record.contract.clone();
        }

        engine.on_minute_bar(&record.bar);

        if let Some(bar) = consolidator.update(&record.bar) {
            engine.on_bar(&bar, &mut broker);
        }
    }

    let summary = engine.finish(&mut broker);

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Minute Bars:        {}", records.len());
    println!("Total Trades:       {}", summary.trades);
    println!("Win Rate:           {:.2}%", summary.win_rate);
    println!("Winning Trades:     {}", summary.winners);
    println!("Losing Trades:      {}", summary.losers);
    println!("Total PnL:          ${:.2}", summary.total_pnl);
    println!("Average Trade:      ${:.2}", summary.avg_trade);
    println!("Trend Trades:       {}", summary.trend_trades);
    println!("Trend PnL:          ${:.2}", summary.trend_pnl);
    println!("Mean-Rev Trades:    {}", summary.mean_rev_trades);
    println!("Mean-Rev PnL:       ${:.2}", summary.mean_rev_pnl);
    println!(
        "Broker Realized:    ${:.2}",
        broker.realized_pnl().to_f64()
    );
    println!("{}", "=".repeat(60));

    info!("Backtest completed successfully");

    Ok(())
}
