//! booksdb CLI - load scraped book and quote records into a relational store

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Instant;

use booksdb::config::{self, BooksDbConfig};
use booksdb::ingest::{Ingestor, OnError, RecordSet};
use booksdb::report;
use booksdb::storage::SqliteStore;
use booksdb::ui::{self, Icons};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "booksdb")]
#[command(version)]
#[command(about = "Normalized relational store for scraped books, quotes, authors and tags")]
#[command(long_about = r#"
booksdb loads records produced by a catalogue scraper into SQLite:
  • categories, publishers, authors, books, quotes and tags
  • explicit book-author and quote-tag association tables
  • idempotent upserts, so re-running an ingestion is always safe

Example usage:
  booksdb init --database data/books.db
  booksdb ingest --input scraped.json
  booksdb report categories
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config file)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file and create the database schema
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Ingest a JSON file of scraped records
    Ingest {
        /// Records file ({"authors": [...], "books": [...], "quotes": [...]})
        #[arg(short, long)]
        input: PathBuf,

        /// What to do with a record that violates a constraint (skip, abort)
        #[arg(long)]
        on_error: Option<OnError>,

        /// Publisher for book records that do not name one
        #[arg(long)]
        default_publisher: Option<String>,
    },

    /// Show row counts per table
    Stats {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Run one of the summary queries
    Report {
        #[arg(value_enum)]
        kind: ReportKind,

        /// Maximum number of rows for listings
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Delete every row from every table
    Purge {
        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportKind {
    /// Books with category, publisher and price
    Books,
    /// Number of books per author
    Authors,
    /// Book count and average price per category
    Categories,
    /// Quotes with author and tags
    Quotes,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let settings = config::load_config(Some(&config_path))?.unwrap_or_default();
    let database = cli.database.as_deref();

    match cli.command {
        Commands::Init { force } => run_init(&config_path, &settings, database, force),
        Commands::Ingest { input, on_error, default_publisher } => {
            run_ingest(&settings, database, &input, on_error, default_publisher)
        }
        Commands::Stats { json } => run_stats(&settings, database, json),
        Commands::Report { kind, limit, json } => run_report(&settings, database, kind, limit, json),
        Commands::Purge { yes } => run_purge(&settings, database, yes),
    }
}

/// Open an existing database; read-only commands never create one
fn open_existing(settings: &BooksDbConfig, database: Option<&Path>) -> anyhow::Result<SqliteStore> {
    let store_config = settings.store_config(database).create_if_missing(false);
    match SqliteStore::connect(&store_config) {
        Ok(store) => Ok(store),
        Err(err @ booksdb::Error::Connection { .. }) => {
            anyhow::bail!("{} (run `booksdb init` or `booksdb ingest` first)", err)
        }
        Err(err) => Err(err.into()),
    }
}

fn run_init(config_path: &Path, settings: &BooksDbConfig, database: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let db_path = settings.database_path(database);
    let new_config = BooksDbConfig {
        database: Some(db_path.display().to_string()),
        busy_timeout_ms: settings.busy_timeout_ms,
        on_error: Some(settings.on_error.unwrap_or_default()),
        default_publisher: settings.default_publisher.clone(),
    };
    config::write_config(config_path, &new_config, force)?;

    config::ensure_db_dir(&db_path)?;
    let store = SqliteStore::connect(&new_config.store_config(None))?;
    store.close()?;

    ui::header(Icons::DATABASE, "Initialized booksdb");
    ui::success(&format!("Wrote {}", config_path.display()));
    ui::info("Database", &db_path.display().to_string());
    Ok(())
}

fn run_ingest(
    settings: &BooksDbConfig,
    database: Option<&Path>,
    input: &Path,
    on_error: Option<OnError>,
    default_publisher: Option<String>,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let records = RecordSet::from_path(input)?;

    let mut options = settings.ingest_options();
    if let Some(policy) = on_error {
        options.on_error = policy;
    }
    if default_publisher.is_some() {
        options.default_publisher = default_publisher;
    }

    let db_path = settings.database_path(database);
    config::ensure_db_dir(&db_path)?;
    let mut store = SqliteStore::connect(&settings.store_config(database))?;

    ui::header(Icons::ROCKET, &format!("Ingesting {}", input.display()));
    ui::info("Database", &db_path.display().to_string());
    ui::info("On error", options.on_error.as_str());

    let progress = ui::RecordProgress::new(records.len());
    let report = Ingestor::new(&mut store, options)
        .ingest_with_progress(&records, |key| progress.record_done(key))?;
    progress.finish_with_summary(started.elapsed(), report.books, report.quotes, report.failures.len());

    ui::section("Summary");
    ui::summary_row("Authors", &report.authors.to_string());
    ui::summary_row("Books", &report.books.to_string());
    ui::summary_row("Quotes", &report.quotes.to_string());
    ui::summary_row("New book-author links", &report.book_author_links.to_string());
    ui::summary_row("New quote-tag links", &report.quote_tag_links.to_string());

    if !report.is_clean() {
        ui::section("Failed records");
        for failure in &report.failures {
            ui::warn(&format!("{}: {}", failure.record, failure.error));
        }
    }

    store.close()?;
    Ok(())
}

fn run_stats(settings: &BooksDbConfig, database: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let store = open_existing(settings, database)?;
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    ui::header(Icons::STATS, &format!("booksdb Statistics ({})", settings.database_path(database).display()));
    let rows: Vec<(String, String)> = stats
        .rows()
        .iter()
        .map(|(table, count)| (table.to_string(), count.to_string()))
        .collect();
    let pairs: Vec<(&str, &str)> = rows.iter().map(|(t, c)| (t.as_str(), c.as_str())).collect();
    println!("{}", ui::stats_table(&pairs));
    Ok(())
}

fn run_report(
    settings: &BooksDbConfig,
    database: Option<&Path>,
    kind: ReportKind,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let store = open_existing(settings, database)?;
    let started = Instant::now();

    let (title, table, value) = match kind {
        ReportKind::Books => {
            let rows = report::list_books(&store, limit)?;
            ("Books", ui::render(&rows), serde_json::to_value(&rows)?)
        }
        ReportKind::Authors => {
            let rows = report::books_per_author(&store)?;
            ("Books per author", ui::render(&rows), serde_json::to_value(&rows)?)
        }
        ReportKind::Categories => {
            let rows = report::category_stats(&store)?;
            ("Categories", ui::render(&rows), serde_json::to_value(&rows)?)
        }
        ReportKind::Quotes => {
            let rows = report::quotes_with_tags(&store, limit)?;
            ("Quotes", ui::render(&rows), serde_json::to_value(&rows)?)
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if table.is_empty() {
        ui::warn(&format!("{}: no rows", title));
    } else {
        ui::section(title);
        println!("{}", table);
        ui::timing(&format!("{:.1?}", started.elapsed()));
    }
    Ok(())
}

fn run_purge(settings: &BooksDbConfig, database: Option<&Path>, yes: bool) -> anyhow::Result<()> {
    if !yes {
        ui::error("Purge deletes every row; pass --yes to confirm");
        anyhow::bail!("purge not confirmed");
    }

    let mut store = open_existing(settings, database)?;
    let removed = store.purge()?;
    ui::header(Icons::BROOM, &format!("Purged {} rows", removed));
    store.close()?;
    Ok(())
}
