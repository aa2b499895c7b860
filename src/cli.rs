//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::paper_account::PaperAccount;
use crate::domain::cancellation::CancellationToken;
use crate::domain::adf::AdfResult;
use crate::domain::cointegration::cointegration_test;
use crate::domain::config_validation::{
    parse_date, parse_trade_time, validate_config, validate_data_config,
};
use crate::domain::error::EastwoodError;
use crate::domain::pair::{CointegratedPair, DeviationScore};
use crate::domain::price_panel::PricePanel;
use crate::domain::strategy::{
    default_trade_time, HistoryWindow, PairsStrategy, DEFAULT_POLL_INTERVAL, DEFAULT_TOLERANCE,
};
use crate::domain::trader::{PairAction, PairsTrader};
use crate::domain::universe::{distinct_tickers, parse_pair, parse_pairs, TickerPair};
use crate::ports::account_port::AccountPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_history_port::PriceHistoryPort;

pub const DEFAULT_INITIAL_CASH: f64 = 100_000.0;

#[derive(Parser, Debug)]
#[command(name = "eastwood", about = "Cointegration pairs trader")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List tickers with price files and their date ranges
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
    },
    /// ADF p-value of the residual of one ticker regressed on another
    Coint {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        pair: String,
        #[arg(long)]
        logs: bool,
    },
    /// Fit the configured pairs and show the selected models
    Select {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        pair: Option<String>,
    },
    /// Deviation score of a live observation for one pair
    Score {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        pair: String,
        /// TICKER=PRICE, once per leg
        #[arg(long = "price", value_parser = parse_price_arg)]
        prices: Vec<(String, f64)>,
    },
    /// Run the daily trading loop on a paper account until interrupted
    Trade {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Fit on history before a date and trade each later day
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        split: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, ticker } => run_info(&config, ticker.as_deref()),
        Command::Coint { config, pair, logs } => run_coint(&config, &pair, logs),
        Command::Select { config, pair } => run_select(&config, pair.as_deref()),
        Command::Score {
            config,
            pair,
            prices,
        } => run_score(&config, &pair, prices),
        Command::Trade { config } => run_trade(&config),
        Command::Replay { config, split } => run_replay(&config, &split),
    }
}

fn fail(err: EastwoodError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

/// Parse a `TICKER=PRICE` argument.
pub fn parse_price_arg(arg: &str) -> Result<(String, f64), String> {
    let (ticker, price) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected TICKER=PRICE, got '{}'", arg))?;
    let ticker = ticker.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(format!("missing ticker in '{}'", arg));
    }
    let price: f64 = price
        .trim()
        .parse()
        .map_err(|e| format!("invalid price in '{}': {}", arg, e))?;
    Ok((ticker, price))
}

pub fn build_strategy(config: &dyn ConfigPort) -> Result<PairsStrategy, EastwoodError> {
    let pairs = resolve_pairs(None, config)?;
    let trade_time = match config.get_string("strategy", "trade_time") {
        Some(s) => parse_trade_time(&s)?,
        None => default_trade_time(),
    };
    let poll_secs = config.get_int(
        "strategy",
        "poll_interval_secs",
        DEFAULT_POLL_INTERVAL.as_secs() as i64,
    );
    Ok(PairsStrategy {
        pairs,
        trade_time,
        tolerance: config.get_double("strategy", "tolerance", DEFAULT_TOLERANCE),
        poll_interval: Duration::from_secs(poll_secs.max(1) as u64),
    })
}

/// `[data] start_date` through `end_date`, or through today when no end is set.
pub fn build_history_window(config: &dyn ConfigPort) -> Result<HistoryWindow, EastwoodError> {
    let start = match config.get_string("data", "start_date") {
        Some(s) => parse_date(&s, "start_date")?,
        None => {
            return Err(EastwoodError::ConfigMissing {
                section: "data".to_string(),
                key: "start_date".to_string(),
            })
        }
    };
    let end = match config.get_string("data", "end_date") {
        Some(s) => parse_date(&s, "end_date")?,
        None => Local::now().date_naive(),
    };
    Ok(HistoryWindow { start, end })
}

/// Pairs from `--pair` if given, otherwise from `[strategy] pairs`.
pub fn resolve_pairs(
    pair_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<TickerPair>, EastwoodError> {
    if let Some(token) = pair_override {
        return Ok(vec![parse_pair(token)?]);
    }
    match config.get_string("strategy", "pairs") {
        Some(s) if !s.trim().is_empty() => Ok(parse_pairs(&s)?),
        _ => Err(EastwoodError::ConfigMissing {
            section: "strategy".to_string(),
            key: "pairs".to_string(),
        }),
    }
}

pub fn build_price_source(config: &dyn ConfigPort) -> Result<CsvAdapter, EastwoodError> {
    match config.get_string("data", "path") {
        Some(p) if !p.trim().is_empty() => Ok(CsvAdapter::new(PathBuf::from(p.trim()))),
        _ => Err(EastwoodError::ConfigMissing {
            section: "data".to_string(),
            key: "path".to_string(),
        }),
    }
}

pub fn initial_cash(config: &dyn ConfigPort) -> f64 {
    config.get_double("account", "initial_cash", DEFAULT_INITIAL_CASH)
}

/// Closing prices for every ticker the pairs mention.
pub fn fetch_pair_history(
    source: &dyn PriceHistoryPort,
    pairs: &[TickerPair],
    window: &HistoryWindow,
) -> Result<PricePanel, EastwoodError> {
    let tickers = distinct_tickers(pairs);
    source.fetch_closes(&tickers, window.start, window.end)
}

/// Fit each pair independently, fetching its own history. One pair failing
/// does not stop the others.
pub fn run_select_pipeline(
    source: &dyn PriceHistoryPort,
    pairs: &[TickerPair],
    window: &HistoryWindow,
) -> Vec<(TickerPair, Result<CointegratedPair, EastwoodError>)> {
    pairs
        .iter()
        .map(|p| {
            let fitted = CointegratedPair::from_source(&p.first, &p.second, source, window);
            (p.clone(), fitted)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub days: usize,
    pub opened: usize,
    pub closed: usize,
    pub skipped: usize,
    pub initial_value: f64,
    pub final_value: f64,
}

/// Fit on rows before `split`, then run one tick per later row with the
/// paper account quoting that row's closes. Everything is closed at the end.
pub fn run_replay_pipeline(
    source: &dyn PriceHistoryPort,
    strategy: &PairsStrategy,
    window: &HistoryWindow,
    split: NaiveDate,
    cash: f64,
) -> Result<ReplaySummary, EastwoodError> {
    let panel = fetch_pair_history(source, &strategy.pairs, window)?;
    let (history, live) = panel.split_at(split);
    if live.is_empty() {
        return Err(EastwoodError::InsufficientData {
            reason: format!("no rows on or after {} to replay", split),
        });
    }

    let account = PaperAccount::new(cash).with_quotes(history.latest_prices());
    let mut trader = PairsTrader::from_history(account, strategy, &history)?;

    let mut summary = ReplaySummary {
        days: 0,
        opened: 0,
        closed: 0,
        skipped: 0,
        initial_value: cash,
        final_value: cash,
    };
    for row in live.rows() {
        let quotes: HashMap<String, f64> = row
            .prices
            .iter()
            .filter(|(_, p)| p.is_finite())
            .map(|(t, p)| (t.clone(), *p))
            .collect();
        trader.account().set_quotes(quotes);

        for outcome in trader.trade_tick()? {
            match outcome.result {
                Ok(eval) => {
                    for action in &eval.actions {
                        match action {
                            PairAction::Opened { direction, .. } => {
                                summary.opened += 1;
                                println!(
                                    "{}  {}  open {}  ({:+.3})",
                                    row.date, outcome.pair, direction, eval.deviation
                                );
                            }
                            PairAction::Closed(direction) => {
                                summary.closed += 1;
                                println!(
                                    "{}  {}  close {}  ({:+.3})",
                                    row.date, outcome.pair, direction, eval.deviation
                                );
                            }
                            PairAction::InsufficientCapital => {}
                        }
                    }
                }
                Err(_) => summary.skipped += 1,
            }
        }
        summary.days += 1;
    }

    trader.close_all_positions()?;
    summary.final_value = trader.account().get_account_value()?;
    Ok(summary)
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&adapter) {
        return fail(e);
    }
    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    eprintln!("\nPairs:");
    for pair in &strategy.pairs {
        eprintln!("  {}", pair);
    }
    eprintln!("Trade time:    {}", strategy.trade_time.format("%H:%M"));
    eprintln!("Tolerance:     {}", strategy.tolerance);
    eprintln!("Poll interval: {}s", strategy.poll_interval.as_secs());
    eprintln!("\nConfiguration is valid");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, ticker: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let source = match build_price_source(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let tickers = match ticker {
        Some(t) => vec![t.to_uppercase()],
        None => match source.list_tickers() {
            Ok(t) => t,
            Err(e) => return fail(e),
        },
    };
    if tickers.is_empty() {
        eprintln!("No price files found");
        return ExitCode::SUCCESS;
    }

    for t in &tickers {
        match source.get_data_range(t) {
            Ok(Some((first, last, count))) => {
                println!("{:<8} {} .. {}  {:>6} rows", t, first, last, count)
            }
            Ok(None) => println!("{:<8} no data", t),
            Err(e) => eprintln!("warning: {}: {}", t, e),
        }
    }
    ExitCode::SUCCESS
}

fn coint_pipeline(
    adapter: &dyn ConfigPort,
    pair: &str,
    logs: bool,
) -> Result<(TickerPair, AdfResult), EastwoodError> {
    validate_data_config(adapter)?;
    let pair = parse_pair(pair)?;
    let window = build_history_window(adapter)?;
    let source = build_price_source(adapter)?;
    let panel = fetch_pair_history(&source, std::slice::from_ref(&pair), &window)?;
    let result = cointegration_test(&pair.first, &pair.second, &panel, logs)?;
    Ok((pair, result))
}

fn run_coint(config_path: &Path, pair: &str, logs: bool) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    match coint_pipeline(&adapter, pair, logs) {
        Ok((pair, adf)) => {
            println!(
                "{} on {} ({}): ADF p-value {:.6}",
                pair.first,
                pair.second,
                if logs { "log" } else { "raw" },
                adf.p_value
            );
            println!(
                "  statistic {:.4}, lags {}, observations {}",
                adf.statistic, adf.used_lag, adf.nobs
            );
            let critical: Vec<String> = adf
                .critical_values
                .iter()
                .map(|(level, value)| format!("{} {:.4}", level, value))
                .collect();
            println!("  critical values: {}", critical.join(", "));
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn select_from_config(
    adapter: &dyn ConfigPort,
    pair: Option<&str>,
) -> Result<Vec<(TickerPair, Result<CointegratedPair, EastwoodError>)>, EastwoodError> {
    validate_data_config(adapter)?;
    let pairs = resolve_pairs(pair, adapter)?;
    let window = build_history_window(adapter)?;
    let source = build_price_source(adapter)?;
    eprintln!(
        "Fitting {} pairs on {} .. {}",
        pairs.len(),
        window.start,
        window.end
    );
    Ok(run_select_pipeline(&source, &pairs, &window))
}

fn run_select(config_path: &Path, pair: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let results = match select_from_config(&adapter, pair) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    println!(
        "{:<12} {:<6} {:<6} {:<5} {:>12} {:>12} {:>10}",
        "pair", "dep", "indep", "logs", "coef", "resid std", "ecm p"
    );
    let mut failures = 0;
    for (requested, fitted) in &results {
        match fitted {
            Ok(p) => println!(
                "{:<12} {:<6} {:<6} {:<5} {:>12.6} {:>12.6} {:>10.6}",
                requested.to_string(),
                p.dependent(),
                p.independent(),
                p.use_logs(),
                p.relationship().coefficient(),
                p.residual_std(),
                p.selection_pvalue()
            ),
            Err(e) => {
                failures += 1;
                eprintln!("warning: {}: {}", requested, e);
            }
        }
    }
    if failures == results.len() {
        return ExitCode::from(5);
    }
    ExitCode::SUCCESS
}

fn score_pipeline(
    adapter: &dyn ConfigPort,
    pair: &str,
    prices: Vec<(String, f64)>,
) -> Result<(CointegratedPair, DeviationScore), EastwoodError> {
    validate_data_config(adapter)?;
    let pair = parse_pair(pair)?;
    let window = build_history_window(adapter)?;
    let source = build_price_source(adapter)?;
    let fitted = CointegratedPair::from_source(&pair.first, &pair.second, &source, &window)?;
    let live: HashMap<String, f64> = prices.into_iter().collect();
    let score = fitted.score(&live)?;
    Ok((fitted, score))
}

fn run_score(config_path: &Path, pair: &str, prices: Vec<(String, f64)>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    match score_pipeline(&adapter, pair, prices) {
        Ok((fitted, score)) => {
            eprintln!("{}", fitted);
            println!("{}", score);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn trade_from_config(adapter: &dyn ConfigPort) -> Result<f64, EastwoodError> {
    let strategy = build_strategy(adapter)?;
    let window = build_history_window(adapter)?;
    let source = build_price_source(adapter)?;
    let panel = fetch_pair_history(&source, &strategy.pairs, &window)?;

    let account = PaperAccount::new(initial_cash(adapter)).with_quotes(panel.latest_prices());
    let mut trader = PairsTrader::from_history(account, &strategy, &panel)?;
    log::warn!(
        "The paper account quotes the last historical closes and has no live feed; \
         every tick scores the same observation. Use `replay` to trade through history."
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let token = CancellationToken::new();
    eprintln!("Trading; press Ctrl-C to close all positions and exit");
    runtime.block_on(async {
        install_interrupt_handler(token.clone());
        trader.run(&token).await
    })?;
    trader.account().get_account_value()
}

fn run_trade(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&adapter) {
        return fail(e);
    }

    match trade_from_config(&adapter) {
        Ok(value) => {
            println!("Final account value: {:.2}", value);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

/// Cancel `token` on Ctrl-C. Spawned on the current runtime.
fn install_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Interrupt received");
                token.cancel();
            }
            Err(e) => log::error!("Unable to listen for interrupt: {}", e),
        }
    });
}

fn replay_from_config(adapter: &dyn ConfigPort, split: &str) -> Result<ReplaySummary, EastwoodError> {
    let split = NaiveDate::parse_from_str(split.trim(), "%Y-%m-%d").map_err(|_| {
        EastwoodError::ConfigInvalid {
            section: "replay".to_string(),
            key: "split".to_string(),
            reason: format!("invalid split date '{}', expected YYYY-MM-DD", split),
        }
    })?;
    let strategy = build_strategy(adapter)?;
    let window = build_history_window(adapter)?;
    let source = build_price_source(adapter)?;
    run_replay_pipeline(&source, &strategy, &window, split, initial_cash(adapter))
}

fn run_replay(config_path: &Path, split: &str) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&adapter) {
        return fail(e);
    }

    match replay_from_config(&adapter, split) {
        Ok(summary) => {
            eprintln!("\n=== Replay ===");
            eprintln!("Days:           {}", summary.days);
            eprintln!("Opened:         {}", summary.opened);
            eprintln!("Closed:         {}", summary.closed);
            eprintln!("Skipped:        {}", summary.skipped);
            eprintln!("Initial value:  {:.2}", summary.initial_value);
            println!("Final value:    {:.2}", summary.final_value);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}
