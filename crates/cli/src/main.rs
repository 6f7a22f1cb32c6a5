use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use bubble_radar_core::ConfigLoader;
use bubble_radar_data::{CsvPriceSource, InMemoryResultStore, SqliteResultStore};
use bubble_radar_lppl::{sweep, DiagnosisEngine};

#[derive(Parser)]
#[command(name = "bubble-radar")]
#[command(about = "LPPL bubble diagnostics over daily price histories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diagnose a symbol from a CSV price file
    Diagnose {
        /// Symbol to analyze
        #[arg(long)]
        symbol: String,
        /// CSV price file (date,symbol,close)
        #[arg(short, long)]
        data: String,
        /// Analysis end date, YYYY-MM-DD (defaults to the last price date)
        #[arg(long)]
        end: Option<String>,
        /// Recompute even when a fresh cached analysis exists
        #[arg(long)]
        force: bool,
        /// SQLite result cache URL (runs uncached when omitted)
        #[arg(long)]
        db: Option<String>,
        /// Seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
        /// Pretty-print the JSON response
        #[arg(long)]
        pretty: bool,
    },
    /// Print the window schedule a series length produces
    SweepInfo {
        /// Series length in observations
        #[arg(long)]
        length: usize,
    },
    /// Drop the cached analysis for a symbol
    Invalidate {
        #[arg(long)]
        symbol: String,
        /// SQLite result cache URL
        #[arg(long)]
        db: String,
    },
    /// Show cache metadata for a symbol
    CacheInfo {
        #[arg(long)]
        symbol: String,
        /// SQLite result cache URL
        #[arg(long)]
        db: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Diagnose { symbol, data, end, force, db, seed, pretty } => {
            run_diagnose(&symbol, &data, end, force, db, seed, pretty).await?;
        }
        Commands::SweepInfo { length } => {
            run_sweep_info(length)?;
        }
        Commands::Invalidate { symbol, db } => {
            run_invalidate(&symbol, &db).await?;
        }
        Commands::CacheInfo { symbol, db } => {
            run_cache_info(&symbol, &db).await?;
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_diagnose(
    symbol: &str,
    data_path: &str,
    end: Option<String>,
    force: bool,
    db: Option<String>,
    seed: Option<u64>,
    pretty: bool,
) -> anyhow::Result<()> {
    let app_config = ConfigLoader::load()?;
    let mut analysis = app_config.analysis;
    if let Some(seed) = seed {
        analysis = analysis.with_seed(seed);
    }

    let end = end
        .map(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d"))
        .transpose()?;

    tracing::info!(symbol, data = data_path, "loading price file");
    let source = CsvPriceSource::from_path(data_path)?;

    let response = match db {
        Some(url) => {
            let store =
                SqliteResultStore::connect(&url, app_config.database.max_connections).await?;
            let engine = DiagnosisEngine::new(source, store, analysis)?;
            engine.diagnose(symbol, end, force).await?
        }
        None => {
            let engine = DiagnosisEngine::new(source, InMemoryResultStore::new(), analysis)?;
            engine.diagnose(symbol, end, force).await?
        }
    };

    let rendered = if pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{rendered}");

    Ok(())
}

fn run_sweep_info(length: usize) -> anyhow::Result<()> {
    let config = ConfigLoader::load()?.analysis;
    let schedule = sweep::window_schedule(length, &config);

    if schedule.is_empty() {
        println!("series of {length} observations is below the 30-observation minimum");
        return Ok(());
    }

    println!(
        "{} windows: {}..={} step {}",
        schedule.len(),
        schedule[0],
        schedule[schedule.len() - 1],
        config.window_step,
    );
    Ok(())
}

async fn run_invalidate(symbol: &str, db: &str) -> anyhow::Result<()> {
    let app_config = ConfigLoader::load()?;
    let store = SqliteResultStore::connect(db, app_config.database.max_connections).await?;

    let removed = store.invalidate(symbol).await?;
    println!("removed {removed} cached analysis record(s) for {symbol}");
    Ok(())
}

async fn run_cache_info(symbol: &str, db: &str) -> anyhow::Result<()> {
    let app_config = ConfigLoader::load()?;
    let store = SqliteResultStore::connect(db, app_config.database.max_connections).await?;

    match store.cache_info(symbol).await? {
        None => println!("no cached analysis for {symbol}"),
        Some(info) => {
            println!("symbol:               {}", info.symbol);
            println!("analysis date:        {}", info.analysis_date);
            println!("state:                {}", info.state);
            println!("confidence indicator: {:.1}", info.confidence_indicator);
            println!(
                "window range:         {}..={} step {}",
                info.window_min, info.window_max, info.window_step
            );
            println!("total windows:        {}", info.total_windows);
            println!("computation seconds:  {:.2}", info.computation_seconds);
            println!("created at:           {}", info.created_at);
        }
    }
    Ok(())
}
