//! fxlens CLI - fetch, schedule and inspect FX carry/vol snapshots
//!
//! ## Example Usage
//!
//! ```bash
//! # One fetch cycle
//! FRED_API_KEY=... fxlens fetch
//!
//! # Fetch every 6 hours until interrupted
//! fxlens watch --interval-hours 6
//!
//! # Latest records, or one currency
//! fxlens show
//! fxlens show JPY
//!
//! # Snapshot history for a currency
//! fxlens history EUR --limit 20
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rusty_fxlens::config::FxLensConfig;
use rusty_fxlens::orchestrator::{build_live_orchestrator, CycleResult};
use rusty_fxlens::record::{CurrencyRecord, Horizon};
use rusty_fxlens::store::{RecordStore, SqliteStore};
use std::path::PathBuf;
use std::process;

/// fxlens: FX carry and realised-volatility snapshots
#[derive(Parser)]
#[command(name = "fxlens")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "Robert Fall")]
#[command(about = "FX carry and realised-volatility snapshots", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single fetch cycle
    Fetch {
        /// Print the cycle result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run fetch cycles on a fixed interval until interrupted
    Watch {
        /// Hours between cycles (defaults to the config value)
        #[arg(long)]
        interval_hours: Option<u64>,
    },

    /// Show the latest stored records
    Show {
        /// Currency code; all currencies when omitted
        #[arg(value_name = "CODE")]
        code: Option<String>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show stored snapshots for one currency, newest first
    History {
        #[arg(value_name = "CODE")]
        code: String,

        /// Maximum number of snapshots
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match FxLensConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(1);
        }
    };
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    if cli.verbose {
        println!("{} v{}", "fxlens".cyan().bold(), env!("CARGO_PKG_VERSION"));
        println!("Database: {}", config.db_path.display().to_string().dimmed());
    }

    let result = match cli.command {
        Commands::Fetch { json } => run_fetch(&config, json),
        Commands::Watch { interval_hours } => run_watch(config, interval_hours),
        Commands::Show { code, json } => show_latest(&config, code.as_deref(), json),
        Commands::History { code, limit } => show_history(&config, &code, limit),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Returns false when the cycle produced nothing usable
fn run_fetch(config: &FxLensConfig, json: bool) -> anyhow::Result<bool> {
    let orchestrator = build_live_orchestrator(config)?;
    let result = runtime()?.block_on(orchestrator.run_cycle())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_cycle(&result);
    }
    Ok(!result.fatal)
}

fn run_watch(mut config: FxLensConfig, interval_hours: Option<u64>) -> anyhow::Result<bool> {
    if let Some(hours) = interval_hours {
        config.interval_hours = hours;
        config.validate()?;
    }
    let interval = config.interval();
    let orchestrator = build_live_orchestrator(&config)?;

    println!(
        "{} every {}h, Ctrl-C to stop",
        "Watching".green().bold(),
        config.interval_hours
    );

    runtime()?.block_on(async {
        loop {
            match orchestrator.run_cycle().await {
                Ok(result) => {
                    print_cycle(&result);
                    if let Err(e) = result.ensure_success() {
                        log::error!("{}", e);
                    }
                }
                // A store failure loses this cycle only; the next one retries
                Err(e) => log::error!("Cycle failed: {}", e),
            }

            log::info!("Next cycle in {:?}", interval);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    println!("{}", "Stopped".yellow());
                    break;
                }
            }
        }
    });
    Ok(true)
}

fn open_store(config: &FxLensConfig) -> anyhow::Result<SqliteStore> {
    SqliteStore::open_read_only(&config.db_path)
        .with_context(|| format!("cannot open {}", config.db_path.display()))
}

fn show_latest(config: &FxLensConfig, code: Option<&str>, json: bool) -> anyhow::Result<bool> {
    let store = open_store(config)?;
    let records = match code {
        Some(code) => vec![store.get_latest(&code.to_uppercase())?],
        None => store.get_all()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(true);
    }
    if records.is_empty() {
        println!("{}", "No records stored yet. Run `fxlens fetch` first.".yellow());
        return Ok(true);
    }

    print_header();
    for record in &records {
        print_row(record);
    }
    Ok(true)
}

fn show_history(config: &FxLensConfig, code: &str, limit: usize) -> anyhow::Result<bool> {
    let store = open_store(config)?;
    let history = store.get_history(&code.to_uppercase(), limit)?;
    if history.is_empty() {
        println!("{} no snapshots for {}", "Note:".yellow(), code.to_uppercase());
        return Ok(true);
    }

    println!(
        "{:<22} {:>8} {:>8} {:>12} {:>8} {:>8} {:>8}",
        "FETCHED".bold(),
        "RATE".bold(),
        "USD".bold(),
        "SPOT".bold(),
        "CARRY".bold(),
        "VOL".bold(),
        "C/V".bold()
    );
    for record in &history {
        println!(
            "{:<22} {:>8} {:>8} {:>12} {:>8} {:>8} {:>8}",
            record.fetched_at.format("%Y-%m-%d %H:%M UTC"),
            fmt_opt(record.policy_rate, 2),
            fmt_opt(record.usd_rate, 2),
            fmt_opt(record.spot, 4),
            fmt_opt(record.carry, 2),
            fmt_pct(record.realised_vol),
            fmt_opt(record.carry_vol_ratio, 2)
        );
    }
    Ok(true)
}

fn print_cycle(result: &CycleResult) {
    let status = if result.fatal {
        "FATAL".red().bold()
    } else if result.is_partial() {
        "PARTIAL".yellow().bold()
    } else {
        "OK".green().bold()
    };
    println!(
        "{} cycle {} at {}",
        status,
        result.cycle_id.to_string().dimmed(),
        result.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  {} {}", "Stored:".bold(), result.succeeded_currencies.len());

    for failure in &result.failed_currencies {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failure.currency_code,
            failure.reasons.join("; ")
        );
    }
    if !result.stale_currencies.is_empty() {
        println!(
            "  {} {}",
            "Stale feeds:".yellow(),
            result.stale_currencies.join(", ")
        );
    }
}

fn print_header() {
    println!(
        "{:<5} {:<7} {:>8} {:>12} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "CCY".bold(),
        "GROUP".bold(),
        "RATE".bold(),
        "SPOT".bold(),
        "CARRY".bold(),
        "VOL".bold(),
        "C/V".bold(),
        "1Y".bold(),
        "3Y".bold(),
        "5Y".bold(),
        "10Y".bold()
    );
}

fn print_row(record: &CurrencyRecord) {
    let carry = match record.carry {
        Some(c) if c > 0.0 => format!("{:+.2}", c).green(),
        Some(c) if c < 0.0 => format!("{:+.2}", c).red(),
        Some(c) => format!("{:.2}", c).normal(),
        None => "n/a".dimmed(),
    };
    let mut code = record.currency_code.normal();
    if record.is_pegged {
        code = code.dimmed();
    }
    if record.stale_feed {
        code = code.yellow();
    }

    let ratios: Vec<String> = Horizon::ALL
        .iter()
        .map(|h| fmt_opt(record.hist_ratios.get(*h), 2))
        .collect();

    println!(
        "{:<5} {:<7} {:>8} {:>12} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        code,
        record.group.as_str(),
        fmt_opt(record.policy_rate, 2),
        fmt_opt(record.spot, 4),
        carry,
        fmt_pct(record.realised_vol),
        fmt_opt(record.carry_vol_ratio, 2),
        ratios[0],
        ratios[1],
        ratios[2],
        ratios[3]
    );
}

fn fmt_opt(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "n/a".to_string(),
    }
}

/// Vol is stored unitless; shown as a percentage
fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.2}%", v * 100.0),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["fxlens", "show", "jpy", "--json"]).unwrap();
        match cli.command {
            Commands::Show { code, json } => {
                assert_eq!(code.as_deref(), Some("jpy"));
                assert!(json);
            }
            _ => panic!("expected show"),
        }
    }

    #[test]
    fn test_watch_interval_flag() {
        let cli = Cli::try_parse_from(["fxlens", "watch", "--interval-hours", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Watch {
                interval_hours: Some(3)
            }
        ));
    }

    #[test]
    fn test_history_requires_code() {
        assert!(Cli::try_parse_from(["fxlens", "history"]).is_err());
    }

    #[test]
    fn test_formatting() {
        assert_eq!(fmt_opt(None, 2), "n/a");
        assert_eq!(fmt_opt(Some(-1.754), 2), "-1.75");
        assert_eq!(fmt_pct(Some(0.0635)), "6.35%");
        assert_eq!(fmt_pct(None), "n/a");
    }
}
