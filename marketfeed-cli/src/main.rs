//! marketfeed CLI: realtime quotes, history, capital flow and cache management.
//!
//! Commands:
//! - `quote`: snapshot row of one stock
//! - `gainers` / `losers`: top movers by change percent
//! - `search`: match stocks by name or code
//! - `history`: daily/weekly/monthly bars of a stock
//! - `index`: daily/weekly/monthly bars of an index
//! - `sector-flow`: industry boards ranked by main-force net inflow
//! - `north-flow`: latest northbound (Stock Connect) trading day
//! - `cache stats` / `cache clear`: inspect or drop cached data
//!
//! Every command prints one JSON document on stdout. Failures print
//! `{"error": ...}` and exit with status 1. Logs go to stderr (`RUST_LOG`).

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDate};
use clap::{Parser, Subcommand};
use marketfeed_core::data::HistoryRequest;
use marketfeed_core::domain::{normalize_symbol, Adjust, HistoricalRecord, Period};
use marketfeed_core::{ClearScope, Direction, MarketData, MarketFeedConfig};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const MIN_DAYS: i64 = 30;
const MAX_DAYS: i64 = 3650;

#[derive(Parser)]
#[command(
    name = "marketfeed",
    about = "marketfeed CLI: A-share quotes and history with local caching"
)]
struct Cli {
    /// TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the Parquet cache directory.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Realtime quote of one stock (e.g. 600000, sh600000, 600000.SH).
    Quote {
        #[arg(long)]
        symbol: String,
    },
    /// Top gainers by change percent.
    Gainers {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Top losers by change percent.
    Losers {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Search stocks by name or code fragment.
    Search {
        #[arg(long)]
        keyword: String,
    },
    /// Historical bars of a stock.
    History {
        #[arg(long)]
        symbol: String,

        /// daily, weekly or monthly.
        #[arg(long, default_value = "daily")]
        period: Period,

        /// Calendar days back from today (clamped to 30..=3650).
        #[arg(long, default_value_t = 365)]
        days: i64,

        /// Price adjustment: none, qfq or hfq.
        #[arg(long, default_value = "qfq")]
        adjust: Adjust,
    },
    /// Historical bars of an index (e.g. 000300, 399006).
    Index {
        #[arg(long)]
        symbol: String,

        #[arg(long, default_value = "daily")]
        period: Period,

        #[arg(long, default_value_t = 365)]
        days: i64,
    },
    /// Industry boards ranked by today's main-force net inflow.
    SectorFlow {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Northbound capital flow of the latest trading day.
    NorthFlow,
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report memory keys and Parquet files.
    Stats,
    /// Drop cached data.
    Clear {
        /// memory, local or all.
        #[arg(long, default_value = "memory")]
        scope: ClearScope,

        /// Only remove partitions of this symbol.
        #[arg(long)]
        symbol: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => print_json(&output),
        Err(e) => {
            print_json(&json!({ "error": format!("{e:#}") }));
            std::process::exit(1);
        }
    }
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

fn load_config(path: Option<&PathBuf>, cache_dir: Option<PathBuf>) -> Result<MarketFeedConfig> {
    let mut config = match path {
        Some(path) => MarketFeedConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MarketFeedConfig::default(),
    };
    if let Some(dir) = cache_dir {
        config.cache_dir = dir;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<Value> {
    let config = load_config(cli.config.as_ref(), cli.cache_dir)?;
    let mut market = MarketData::from_config(&config).context("initializing market data")?;

    let output = match cli.command {
        Commands::Quote { symbol } => serde_json::to_value(market.stock_quote(&symbol)?)?,
        Commands::Gainers { limit } => movers(&mut market, limit, Direction::Gainers)?,
        Commands::Losers { limit } => movers(&mut market, limit, Direction::Losers)?,
        Commands::Search { keyword } => {
            let results = market.search(&keyword)?;
            json!({ "keyword": keyword, "count": results.len(), "results": results })
        }
        Commands::History {
            symbol,
            period,
            days,
            adjust,
        } => {
            let req = history_request(&symbol, period, days)?.with_adjust(adjust);
            let rows = market.stock_history(&req)?;
            history_output(&req, &rows)
        }
        Commands::Index {
            symbol,
            period,
            days,
        } => {
            let req = history_request(&symbol, period, days)?.with_adjust(Adjust::None);
            let rows = market.index_history(&req)?;
            history_output(&req, &rows)
        }
        Commands::SectorFlow { limit } => {
            let sectors = market.sector_flow(limit)?;
            json!({ "count": sectors.len(), "sectors": sectors })
        }
        Commands::NorthFlow => serde_json::to_value(market.north_flow()?)?,
        Commands::Cache { action } => match action {
            CacheAction::Stats => serde_json::to_value(market.cache_stats())?,
            CacheAction::Clear { scope, symbol } => {
                serde_json::to_value(market.clear_cache(scope, symbol.as_deref())?)?
            }
        },
    };
    Ok(output)
}

fn movers(market: &mut MarketData, limit: usize, direction: Direction) -> Result<Value> {
    let quotes = market.top_movers(limit, direction)?;
    Ok(json!({ "count": quotes.len(), "quotes": quotes }))
}

/// Window ending today, `days` back, clamped to the supported span.
fn history_request(symbol: &str, period: Period, days: i64) -> Result<HistoryRequest> {
    let end = Local::now().date_naive();
    let start = window_start(end, days);
    Ok(HistoryRequest::new(normalize_symbol(symbol), period, start, end))
}

fn window_start(end: NaiveDate, days: i64) -> NaiveDate {
    end - Duration::days(days.clamp(MIN_DAYS, MAX_DAYS))
}

fn history_output(req: &HistoryRequest, rows: &[HistoricalRecord]) -> Value {
    json!({
        "symbol": req.symbol,
        "period": req.period.as_str(),
        "start": req.start.to_string(),
        "end": req.end.to_string(),
        "count": rows.len(),
        "records": rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_are_clamped() {
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        assert_eq!(window_start(end, 5), end - Duration::days(30));
        assert_eq!(window_start(end, 100), end - Duration::days(100));
        assert_eq!(window_start(end, 100_000), end - Duration::days(3650));
    }

    #[test]
    fn parses_history_arguments() {
        let cli = Cli::try_parse_from([
            "marketfeed",
            "history",
            "--symbol",
            "sh600000",
            "--period",
            "weekly",
            "--adjust",
            "hfq",
        ])
        .unwrap();
        match cli.command {
            Commands::History {
                symbol,
                period,
                days,
                adjust,
            } => {
                assert_eq!(symbol, "sh600000");
                assert_eq!(period, Period::Weekly);
                assert_eq!(days, 365);
                assert_eq!(adjust, Adjust::Hfq);
            }
            _ => panic!("expected history"),
        }
    }

    #[test]
    fn parses_cache_clear_with_global_cache_dir() {
        let cli = Cli::try_parse_from([
            "marketfeed",
            "cache",
            "clear",
            "--scope",
            "local",
            "--symbol",
            "600000",
            "--cache-dir",
            "/tmp/mf",
        ])
        .unwrap();
        assert_eq!(cli.cache_dir, Some(PathBuf::from("/tmp/mf")));
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Clear {
                    scope: ClearScope::Local,
                    ..
                }
            }
        ));
    }

    #[test]
    fn bare_cache_clear_only_touches_memory() {
        let cli = Cli::try_parse_from(["marketfeed", "cache", "clear"]).unwrap();
        match cli.command {
            Commands::Cache {
                action: CacheAction::Clear { scope, symbol },
            } => {
                assert_eq!(scope, ClearScope::Memory);
                assert_eq!(symbol, None);
            }
            _ => panic!("expected cache clear"),
        }
    }

    #[test]
    fn parses_flow_commands() {
        let cli = Cli::try_parse_from(["marketfeed", "sector-flow", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::SectorFlow { limit: 5 }));

        let cli = Cli::try_parse_from(["marketfeed", "sector-flow"]).unwrap();
        assert!(matches!(cli.command, Commands::SectorFlow { limit: 20 }));

        let cli = Cli::try_parse_from(["marketfeed", "north-flow"]).unwrap();
        assert!(matches!(cli.command, Commands::NorthFlow));
    }

    #[test]
    fn rejects_unknown_period() {
        let parsed = Cli::try_parse_from([
            "marketfeed",
            "index",
            "--symbol",
            "000300",
            "--period",
            "hourly",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn history_request_normalizes_symbol() {
        let req = history_request("600000.SH", Period::Daily, 30).unwrap();
        assert_eq!(req.symbol, "600000");
        assert_eq!(req.end - req.start, Duration::days(30));
    }
}
