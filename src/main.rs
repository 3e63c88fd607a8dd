mod config;
mod fetch;
mod store;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Offset;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use icalsync_core::{parse_calendar, FeedFetcher, Syncer, TimezoneMap};

use crate::fetch::HttpFetcher;
use crate::store::JsonStore;

#[derive(Parser)]
#[command(name = "icalsync")]
#[command(about = "Import remote iCalendar feeds into a local event catalog")]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "icalsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every configured feed and reconcile it with the catalog
    Sync {
        /// Compute and print decisions without touching the state file
        #[arg(long)]
        dry_run: bool,
    },
    /// Parse a feed URL or local .ics file and print the normalized events
    Inspect {
        /// URL (http/https/webcal) or path of an .ics file
        source: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Sync { dry_run } => cmd_sync(&cli.config, dry_run),
        Commands::Inspect { source } => cmd_inspect(&cli.config, &source),
    }
}

fn load_zones(config: &config::Config) -> Result<TimezoneMap> {
    match &config.timezone_table {
        Some(path) => TimezoneMap::from_path(path)
            .with_context(|| format!("Failed to load timezone table {}", path.display())),
        None => Ok(TimezoneMap::bundled()),
    }
}

fn cmd_sync(config_path: &PathBuf, dry_run: bool) -> Result<()> {
    let config = config::load(config_path)?;
    if config.feeds.is_empty() {
        println!("No feeds configured in {}", config_path.display());
        return Ok(());
    }

    let zones = load_zones(&config)?;
    let report_offset = config.report_offset()?;
    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
    let mut store = JsonStore::load(&config.state_path)?;

    let reports = {
        let syncer = Syncer::new(&fetcher, &store, &zones, report_offset);
        syncer.sync(&config.feeds)
    };

    let mut totals = (0usize, 0usize, 0usize);
    for (feed, report) in config.feeds.iter().zip(&reports) {
        println!("{}", report.feed_url.bold());
        match &report.error {
            Some(err) => println!("   {}", err.to_string().red()),
            None => {
                println!(
                    "   {} created, {} updated, {} deleted",
                    report.created, report.updated, report.deleted
                );
                totals.0 += report.created;
                totals.1 += report.updated;
                totals.2 += report.deleted;
                if !dry_run {
                    store.apply(feed, report);
                }
            }
        }
    }

    if dry_run {
        println!(
            "\n{} {} created, {} updated, {} deleted",
            "Dry run:".yellow(),
            totals.0,
            totals.1,
            totals.2
        );
    } else {
        store.save()?;
        println!(
            "\nSynced {} created, {} updated, {} deleted ({} events in catalog)",
            totals.0,
            totals.1,
            totals.2,
            store.len()
        );
    }

    Ok(())
}

fn cmd_inspect(config_path: &PathBuf, source: &str) -> Result<()> {
    // Inspect should work without a config file; fall back to defaults.
    let config = config::load(config_path).ok();
    let zones = match &config {
        Some(config) => load_zones(config)?,
        None => TimezoneMap::bundled(),
    };
    let report_offset = config
        .as_ref()
        .map(|c| c.report_offset())
        .transpose()?
        .unwrap_or_else(|| chrono::Utc.fix());

    let text = if source.starts_with("http://")
        || source.starts_with("https://")
        || source.starts_with("webcal://")
    {
        let timeout = config.as_ref().map(|c| c.fetch_timeout_secs).unwrap_or(30);
        let fetcher = HttpFetcher::new(Duration::from_secs(timeout))?;
        fetcher.fetch(source)?
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))?
    };

    let events = parse_calendar(&text, &zones, report_offset);
    println!("{} event(s)\n", events.len());

    for event in &events {
        let (start, end) = event.display_times(report_offset);
        println!("{}", event.summary.bold());
        println!("   uid:      {}", event.uid);
        if event.all_day {
            println!("   when:     {} (all day)", start.date());
        } else {
            println!("   when:     {start} - {end}");
        }
        if !event.tzid.is_empty() {
            println!("   tzid:     {}", event.tzid);
        }
        if !event.rrule.is_empty() {
            match &event.recurrence {
                Some(rule) => println!("   repeats:  {rule:?}"),
                None => println!("   repeats:  {} ({})", "unsupported".yellow(), event.rrule),
            }
        }
        println!();
    }

    Ok(())
}
