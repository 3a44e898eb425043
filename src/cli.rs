//! CLI definition and dispatch.

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::controller::{run_loop, Controller};
use crate::domain::error::ForesightError;
use crate::domain::metrics::{calculate_metrics, metric_history, MetricName};
use crate::domain::prediction::{Horizon, ModelType};
use crate::domain::scheduler::Scheduler;
use crate::domain::settings::build_app_config;
use crate::domain::strategy::Action;

#[derive(Parser, Debug)]
#[command(
    name = "foresight",
    about = "Forecast evaluation and simulated trading controller"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the scheduled controller loop
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run one data-fetch cycle immediately
    Fetch {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Backfill realized prices into pending predictions
    Reconcile {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the evaluation sweep and retraining check immediately
    Evaluate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the live trading strategy once
    Trade {
        #[arg(short, long)]
        config: PathBuf,
        /// Live price to decide against; defaults to the newest bar
        #[arg(long)]
        price: Option<f64>,
    },
    /// Replay logged predictions against archived bars
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print portfolio performance metrics
    Report {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print current accuracy metrics and their history for one
    /// (model, horizon) pair
    Metrics {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, default_value = "arima")]
        model: String,
        #[arg(long, default_value = "24h")]
        horizon: String,
        #[arg(long, default_value = "mape")]
        metric: String,
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
    /// Print portfolio state and retraining bookkeeping
    Status {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run { config } => run_scheduler(&config),
        Command::Fetch { config } => run_fetch(&config),
        Command::Reconcile { config } => run_reconcile(&config),
        Command::Evaluate { config } => run_evaluate(&config),
        Command::Trade { config, price } => run_trade(&config, price),
        Command::Backtest { config } => run_backtest(&config),
        Command::Report { config } => run_report(&config),
        Command::Metrics {
            config,
            model,
            horizon,
            metric,
            days,
        } => run_metrics(&config, &model, &horizon, &metric, days),
        Command::Status { config } => run_status(&config),
    }
}

fn build_controller(config_path: &Path) -> Result<Controller, ExitCode> {
    let adapter = FileConfigAdapter::from_file(config_path).map_err(|e| {
        let err = ForesightError::ConfigParse {
            file: config_path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })?;
    let config = build_app_config(&adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;
    Controller::from_config(config).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn fail(e: &ForesightError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

fn run_scheduler(config_path: &Path) -> ExitCode {
    let mut controller = match build_controller(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let (fetch_hours, reconcile_hours, evaluate_hours) = {
        let config = controller.config();
        (
            config.fetch_interval_hours,
            config.reconcile_interval_hours,
            config.evaluate_interval_hours,
        )
    };
    let mut scheduler = Scheduler::new(
        Utc::now(),
        Duration::hours(fetch_hours),
        Duration::hours(reconcile_hours),
        Duration::hours(evaluate_hours),
    );
    run_loop(&mut controller, &mut scheduler);
    ExitCode::SUCCESS
}

fn run_fetch(config_path: &Path) -> ExitCode {
    let mut controller = match build_controller(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match controller.run_fetch_cycle(Utc::now()) {
        Ok(outcome) => {
            match outcome.bar {
                Some(bar) => println!(
                    "Fetched bar at {} (close {:.2}); resolved {} predictions, logged {} forecasts",
                    bar.timestamp.to_rfc3339(),
                    bar.close,
                    outcome.resolved,
                    outcome.logged_forecasts
                ),
                None => println!("No new market data."),
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_reconcile(config_path: &Path) -> ExitCode {
    let controller = match build_controller(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match controller.run_reconcile(Utc::now()) {
        Ok(summary) => {
            println!(
                "Reconciled {} of {} pending predictions ({} local, {} remote); {} still pending",
                summary.resolved(),
                summary.pending,
                summary.resolved_local,
                summary.resolved_remote,
                summary.unresolved
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_evaluate(config_path: &Path) -> ExitCode {
    let controller = match build_controller(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match controller.run_evaluation(Utc::now()) {
        Ok(outcome) => {
            println!("Stored {} metric records.", outcome.stored);
            if outcome.retrain_needed {
                println!(
                    "Thresholds breached; retraining {}.",
                    if outcome.retrained {
                        "completed"
                    } else {
                        "failed (see logs)"
                    }
                );
            } else {
                println!("All metrics within thresholds.");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_trade(config_path: &Path, price: Option<f64>) -> ExitCode {
    let mut controller = match build_controller(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match controller.run_strategy(price, Utc::now()) {
        Ok(outcome) => {
            let action = match outcome.action {
                Action::Buy { .. } => "BUY",
                Action::Sell { .. } => "SELL",
                Action::Hold => "HOLD",
            };
            println!(
                "Decision: {action} ({})",
                if outcome.executed { "executed" } else { "no order" }
            );
            if let Some(value) = outcome.portfolio_value {
                println!("Portfolio value: {value:.2}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_backtest(config_path: &Path) -> ExitCode {
    let controller = match build_controller(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match controller.run_backtest() {
        Ok(result) => {
            println!(
                "Replayed {} predictions, executed {} orders",
                result.steps, result.executed_orders
            );
            println!("Final cash: {:.2}", result.final_state.cash);
            if let Some(last) = result.value_history.last() {
                println!("Final portfolio value: {:.2}", last.portfolio_value);
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_report(config_path: &Path) -> ExitCode {
    let controller = match build_controller(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match controller.performance() {
        Ok(metrics) => {
            println!("Total return:           {:>8.2}%", metrics.total_return * 100.0);
            println!(
                "Annualized return:      {:>8.2}%",
                metrics.annualized_return * 100.0
            );
            println!(
                "Annualized volatility:  {:>8.2}%",
                metrics.annualized_volatility * 100.0
            );
            println!("Sharpe ratio:           {:>8.2}", metrics.sharpe_ratio);
            println!("Max drawdown:           {:>8.2}%", metrics.max_drawdown * 100.0);
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

fn run_metrics(
    config_path: &Path,
    model: &str,
    horizon: &str,
    metric: &str,
    days: i64,
) -> ExitCode {
    let invalid = |key: &str, value: &str| {
        let err = ForesightError::ConfigInvalid {
            section: "metrics".into(),
            key: key.into(),
            reason: format!("unknown value {value:?}"),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    };
    let Some(model) = ModelType::parse(model) else {
        return invalid("model", model);
    };
    let Some(horizon) = Horizon::parse(horizon) else {
        return invalid("horizon", horizon);
    };
    let Some(metric) = MetricName::parse(metric) else {
        return invalid("metric", metric);
    };

    let controller = match build_controller(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let now = Utc::now();
    let symbol = controller.config().symbol.clone();

    let records = match controller.predictions().load() {
        Ok(records) => records,
        Err(e) => return fail(&e),
    };
    match calculate_metrics(
        &records,
        model,
        horizon,
        &symbol,
        controller.config().lookback_days,
        now,
    ) {
        Some(current) => {
            println!("MAE:  {:.4}", current.mae);
            println!("RMSE: {:.4}", current.rmse);
            match current.mape {
                Some(mape) => println!("MAPE: {mape:.4}%"),
                None => println!("MAPE: undefined (zero actual price in window)"),
            }
        }
        None => println!("No resolved predictions in the lookback window."),
    }

    let stored = match controller.metrics_store().load() {
        Ok(stored) => stored,
        Err(e) => return fail(&e),
    };
    let history = metric_history(&stored, model, horizon, &symbol, metric, days, now);
    println!("History ({} points over {days} days):", history.len());
    for point in history {
        println!("  {}  {:.4}", point.timestamp.to_rfc3339(), point.value);
    }
    ExitCode::SUCCESS
}

fn run_status(config_path: &Path) -> ExitCode {
    let controller = match build_controller(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let state = controller.ledger().state();
    println!("Cash: {:.2}", state.cash);
    if state.holdings.is_empty() {
        println!("Holdings: none");
    } else {
        println!("Holdings:");
        for (symbol, quantity) in &state.holdings {
            println!("  {symbol}: {quantity:.6}");
        }
    }

    let transactions = match controller.ledger().store().transactions() {
        Ok(transactions) => transactions,
        Err(e) => return fail(&e),
    };
    println!("Transactions: {}", transactions.len());
    for transaction in transactions.iter().rev().take(5) {
        println!(
            "  {} {} {:.6} {} @ {:.2}",
            transaction.timestamp.to_rfc3339(),
            transaction.side,
            transaction.quantity,
            transaction.symbol,
            transaction.price_per_unit
        );
    }

    match controller.predictions().fetch_unresolved(Utc::now()) {
        Ok(pending) => println!("Pending predictions: {}", pending.len()),
        Err(e) => return fail(&e),
    }

    let rows = match controller.tracker().rows_since_retrain() {
        Ok(rows) => rows,
        Err(e) => return fail(&e),
    };
    println!("Rows since last retrain: {rows}");
    match controller.tracker().last_retrain() {
        Ok(Some(when)) => println!("Last retrain: {}", when.to_rfc3339()),
        Ok(None) => println!("Last retrain: never"),
        Err(e) => return fail(&e),
    }
    ExitCode::SUCCESS
}
