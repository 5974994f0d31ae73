mod config;
mod crawl;
mod db;
mod discover;
mod fetch;
mod metadata;
mod parser;
mod sales;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "checklist_scraper", about = "Trading-card checklist ingestion pipeline")]
struct Cli {
    /// Path to a JSON config file (built-in site profiles when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl seed and index pages plus the sitemap to populate the URL queue
    Discover {
        /// Restrict to one site profile by name
        #[arg(short, long)]
        site: Option<String>,
    },
    /// Fetch unvisited checklist pages and ingest them into the catalog
    Crawl {
        /// Max pages to process (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Re-run the parser over stored HTML without refetching
    Reparse {
        /// Max pages to reparse (default: all stored)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Query sold listings for catalog entries and record prices
    Sales {
        /// Max entries to query
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show queue and catalog statistics
    Stats,
    /// Card sets overview table
    Overview {
        /// Filter by sport (basketball, football, ...)
        #[arg(short, long)]
        sport: Option<String>,
        /// Filter by year (e.g. "2023-24")
        #[arg(short, long)]
        year: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
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
    let cfg = config::Config::load(cli.config.as_deref())?;
    let conn = db::connect(&cfg.db_path)?;
    db::init_schema(&conn)?;

    let result = match cli.command {
        Commands::Discover { site } => {
            let queued = crawl::discover_sites(&conn, &cfg, site.as_deref()).await?;
            println!("Queued {} new checklist URLs", queued);
            Ok(())
        }
        Commands::Crawl { limit } => {
            let counters = crawl::crawl(&conn, &cfg, limit).await?;
            if counters.processed == 0 {
                println!("No unvisited pages. Run 'discover' first or all pages are ingested.");
            }
            Ok(())
        }
        Commands::Reparse { limit } => {
            let counters = crawl::reparse(&conn, limit)?;
            if counters.processed == 0 {
                println!("No stored pages. Run 'crawl' first.");
            }
            Ok(())
        }
        Commands::Sales { limit } => {
            let counters = sales::run(&conn, &cfg.sales, limit).await?;
            if counters.queried == 0 {
                println!("No catalog entries to price. Run 'crawl' first.");
            } else {
                println!(
                    "Queried {} entries: {} sales recorded, {} linked, {} failed.",
                    counters.queried, counters.recorded, counters.linked, counters.failed
                );
            }
            Ok(())
        }
        Commands::Stats => {
            let s = db::get_stats(&conn)?;
            println!("Queued URLs:  {}", s.queued);
            println!("Visited:      {}", s.visited);
            println!("Unvisited:    {}", s.unvisited);
            println!("Fetched:      {}", s.fetched);
            println!("Fetch errors: {}", s.fetch_errors);
            println!("Card sets:    {}", s.sets);
            println!("Card entries: {}", s.entries);
            println!("Sales:        {}", s.sales);
            Ok(())
        }
        Commands::Overview { sport, year, limit } => {
            let rows = db::fetch_overview(&conn, sport.as_deref(), year.as_deref(), limit)?;
            if rows.is_empty() {
                println!("No card sets found.");
                return Ok(());
            }

            // Compact, readable table
            println!(
                "{:>3} | {:<44} | {:<7} | {:<10} | {:<12} | {:<14} | {:>7}",
                "#", "Set", "Year", "Sport", "Maker", "Line", "Entries"
            );
            println!("{}", "-".repeat(115));

            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<44} | {:<7} | {:<10} | {:<12} | {:<14} | {:>7}",
                    i + 1,
                    truncate(&r.name, 44),
                    r.year,
                    r.sport,
                    truncate(&r.manufacturer, 12),
                    truncate(&r.product_line, 14),
                    r.entry_count,
                );
            }

            println!("\n{} sets", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
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
