mod fetcher;
mod forecast;
mod harvest;
mod net;
mod parser;
mod pipeline;
mod rose;
mod settings;
mod store;
mod table;

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use fetcher::ItemError;
use net::HttpFetcher;
use parser::listing::SummaryRow;
use pipeline::harvester;
use settings::Settings;
use store::{DatasetKind, DatasetStore, Stored};
use table::Table;

#[derive(Parser)]
#[command(name = "uac_scraper", about = "Utah Avalanche Center observation and forecast scraper")]
struct Cli {
    /// Directory holding the CSV datasets (overrides UAC_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<std::path::PathBuf>,
    /// Concurrent report fetches (overrides UAC_CONCURRENCY)
    #[arg(short = 'j', long, global = true)]
    concurrency: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Range {
    /// First day to harvest (default: day after the stored dataset, or season start)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day to harvest (default: today)
    #[arg(long)]
    end: Option<NaiveDate>,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest observation list rows into the observations dataset
    List {
        #[command(flatten)]
        range: Range,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Extract avalanche reports into the avalanches dataset
    Avalanches {
        #[command(flatten)]
        range: Range,
    },
    /// Extract general observations into the general dataset
    General {
        #[command(flatten)]
        range: Range,
    },
    /// Decode one day's forecast danger rose and avalanche problems
    Forecast {
        /// Forecast region, e.g. "Salt Lake"
        #[arg(short, long)]
        region: String,
        /// Forecast date (default: today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// List forecasts from the forecast archive
    Archive {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show stored datasets
    Datasets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }
    if let Some(n) = cli.concurrency {
        settings.concurrency = n;
    }
    info!(settings_loaded = ?settings, "Starting");

    let store = DatasetStore::new(&settings.data_dir);

    let result = match cli.command {
        Commands::List { range, limit } => {
            let fetcher = HttpFetcher::new(settings.fetch_timeout())?;
            let Some((start, end)) = resolve_range(&store, DatasetKind::Observations, &range)? else {
                return Ok(());
            };
            let rows = harvester(&fetcher, &settings).harvest(start, end).await;
            print_summaries(&rows, limit);
            let stored = store.merge_and_save(
                DatasetKind::Observations,
                None,
                start,
                Table::from_summaries(&rows),
                end,
            )?;
            println!();
            print_stored(&stored);
            Ok(())
        }
        Commands::Avalanches { range } => {
            extract_reports(&settings, &store, &range, DatasetKind::Avalanches).await
        }
        Commands::General { range } => {
            extract_reports(&settings, &store, &range, DatasetKind::General).await
        }
        Commands::Forecast { region, date } => {
            let fetcher = HttpFetcher::new(settings.fetch_timeout())?;
            let date = date.unwrap_or_else(today);
            let record = forecast::read_forecast(
                &fetcher,
                &settings.base_url,
                date,
                &region,
                settings.retry(),
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&record)?);

            let table = Table::from_forecasts(std::slice::from_ref(&record))?;
            let stored = store
                .merge_and_save(DatasetKind::Forecasts, Some(region.as_str()), date, table, date)
                .with_context(|| format!("Forecast for {} on {} was not stored", region, date))?;
            println!();
            print_stored(&stored);
            Ok(())
        }
        Commands::Archive { limit } => {
            let fetcher = HttpFetcher::new(settings.fetch_timeout())?;
            let rows = harvester(&fetcher, &settings)
                .harvest_forecast_archive()
                .await;
            print_summaries(&rows, limit);
            Ok(())
        }
        Commands::Datasets => {
            let keys = store.list()?;
            if keys.is_empty() {
                println!("No datasets in {}.", store.dir().display());
                return Ok(());
            }
            println!("{:<12} | {:<16} | {:<10} | {:<10}", "Kind", "Region", "Start", "End");
            println!("{}", "-".repeat(58));
            for key in &keys {
                println!(
                    "{:<12} | {:<16} | {:<10} | {:<10}",
                    key.kind.as_str(),
                    truncate(key.region.as_deref().unwrap_or("-"), 16),
                    key.start,
                    key.end
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Explicit dates win; otherwise resume after the stored dataset, or from the
/// start of the season. `None` when there is nothing left to harvest.
fn resolve_range(
    store: &DatasetStore,
    kind: DatasetKind,
    range: &Range,
) -> anyhow::Result<Option<(NaiveDate, NaiveDate)>> {
    let end = range.end.unwrap_or_else(today);
    let resolved = pipeline::resolve_range(store, kind, range.start, end)?;
    if resolved.is_none() {
        println!("{} is up to date through {}.", kind.as_str(), end);
    }
    Ok(resolved)
}

/// Harvest → filter → fetch reports → extract → merge into the dataset.
async fn extract_reports(
    settings: &Settings,
    store: &DatasetStore,
    range: &Range,
    kind: DatasetKind,
) -> anyhow::Result<()> {
    let Some(range) = resolve_range(store, kind, range)? else {
        return Ok(());
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight fetches");
            let _ = cancel_tx.send(true);
        }
    });

    let t_fetch = Instant::now();
    let fetcher = Arc::new(HttpFetcher::new(settings.fetch_timeout())?);
    println!("Extracting {} from {} to {}...", kind.as_str(), range.0, range.1);
    let report = pipeline::extract_reports(fetcher, settings, store, kind, range, cancel_rx).await?;
    println!(
        "Extracted {} of {} listed reports ({} errors) in {:.1}s",
        report.records,
        report.listed,
        report.errors.len(),
        t_fetch.elapsed().as_secs_f64()
    );
    print_errors(&report.errors);

    match &report.stored {
        Some(stored) => print_stored(stored),
        None => println!("Interrupted: dataset left unchanged."),
    }
    Ok(())
}

fn print_stored(stored: &Stored) {
    match stored {
        Stored::UpToDate(d) => println!("{} already covers this range; nothing written.", d.key),
        Stored::Created(d) | Stored::Extended(d) if d.table.is_empty() => {
            println!("No rows yet; stored {}", d.key)
        }
        Stored::Created(d) | Stored::Extended(d) => {
            println!("{} rows stored as {}", d.table.len(), d.key)
        }
    }
}

fn print_summaries(rows: &[SummaryRow], limit: usize) {
    if rows.is_empty() {
        println!("No rows found.");
        return;
    }
    println!(
        "{:>3} | {:<10} | {:<11} | {:<20} | {:<40} | {:<16}",
        "#", "Date", "Type", "Region", "Title", "Author"
    );
    println!("{}", "-".repeat(114));
    for (i, r) in rows.iter().take(limit).enumerate() {
        println!(
            "{:>3} | {:<10} | {:<11} | {:<20} | {:<40} | {:<16}",
            i + 1,
            r.date,
            r.record_type.as_str(),
            truncate(&r.region_path.join(" » "), 20),
            truncate(&r.title, 40),
            truncate(&r.author, 16)
        );
    }
    println!("\n{} rows", rows.len());
}

fn print_errors(errors: &[ItemError]) {
    if errors.is_empty() {
        return;
    }
    println!("\n--- {} failed ---", errors.len());
    for e in errors {
        println!("  {}: {}", truncate(&e.extension, 60), e.error);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
