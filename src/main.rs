use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use block_migrator::analyzer::catalog::TemplateCatalog;
use block_migrator::config::MigrationConfig;
use block_migrator::migrate::bulk;
use block_migrator::migrate::fetch::{self, HttpFetcher};
use block_migrator::migrate::media::MediaLibrary;
use block_migrator::migrate::store::SqlitePageStore;
use block_migrator::migrate::Migrator;
use block_migrator::{classify_document, db, parser, sitemap};

#[derive(Parser)]
#[command(name = "block_migrator", about = "Convert HTML pages into block markup and migrate whole sites")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that win over `MIGRATOR_*` environment variables.
#[derive(Args)]
struct Overrides {
    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Directory re-hosted images are written to
    #[arg(long, global = true)]
    media_dir: Option<PathBuf>,
    /// Public URL prefix for re-hosted images
    #[arg(long, global = true)]
    media_url: Option<String>,
    /// Base URL for relative image links (default: the page URL)
    #[arg(long, global = true)]
    source_url: Option<String>,
    /// Concurrent fetches
    #[arg(short = 'c', long, global = true)]
    concurrency: Option<usize>,
    /// Per-page timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

impl Overrides {
    fn apply(self, config: &mut MigrationConfig) {
        if let Some(db) = self.db {
            config.db_path = db;
        }
        if let Some(dir) = self.media_dir {
            config.media_dir = dir;
        }
        if let Some(url) = self.media_url {
            config.media_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = self.source_url {
            config.source_base_url = Some(url);
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n.max(1);
        }
        if let Some(secs) = self.timeout {
            config.page_timeout = std::time::Duration::from_secs(secs);
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a local HTML file and print its block markup
    Convert {
        file: PathBuf,
    },
    /// Classify a local HTML file and print the ranked recommendations as JSON
    Analyze {
        file: PathBuf,
        /// Stylesheet to take style preferences from
        #[arg(long)]
        css: Option<PathBuf>,
        /// Free-text description of what the site is for
        #[arg(long, default_value = "")]
        intent: String,
        /// Template catalog JSON (default: built-in catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Create the database schema
    Init,
    /// Queue pages from a sitemap or an explicit URL list
    Enqueue {
        /// Sitemap (or sitemap index) URL
        #[arg(long)]
        sitemap: Option<String>,
        urls: Vec<String>,
    },
    /// Fetch unvisited pages
    Fetch {
        /// Max pages to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Convert and classify fetched pages
    Process {
        /// Max pages to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Re-host images and store converted pages as drafts
    Publish {
        /// Max pages to publish (default: all unpublished)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch + process + publish in one pipeline
    Run {
        /// Max pages to fetch
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Migrate a single page and print its step log
    Page {
        url: String,
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
    /// Show migration statistics
    Stats,
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
    let mut config = MigrationConfig::from_env()?;
    cli.overrides.apply(&mut config);

    let result = match cli.command {
        Commands::Convert { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let blocks = parser::convert_bytes(&bytes)?;
            println!("{}", parser::serialize::serialize(&blocks));
            Ok(())
        }
        Commands::Analyze { file, css, intent, catalog } => {
            let html = read_text(&file)?;
            let css = match css {
                Some(path) => read_text(&path)?,
                None => String::new(),
            };
            let catalog = load_catalog(catalog.as_deref())?;
            let result = classify_document(&html, &css, &intent, &catalog);
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Init => {
            open_db(&config)?;
            println!("Schema ready at {}", config.db_path.display());
            Ok(())
        }
        Commands::Enqueue { sitemap, urls } => {
            let conn = open_db(&config)?;
            let mut pages: Vec<(String, String)> = urls
                .into_iter()
                .map(|u| {
                    let slug = sitemap::page_slug(&u);
                    (u, slug)
                })
                .collect();
            if let Some(sitemap_url) = sitemap {
                let client = fetch::build_client(&config)?;
                pages.extend(sitemap::fetch_site_urls(&client, &sitemap_url).await?);
            }
            if pages.is_empty() {
                println!("Nothing to enqueue. Pass --sitemap or one or more URLs.");
                return Ok(());
            }
            let inserted = db::insert_pages(&conn, &pages)?;
            println!("Inserted {} new URLs ({} total given)", inserted, pages.len());
            Ok(())
        }
        Commands::Fetch { limit } => {
            let conn = open_db(&config)?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'enqueue' first or all pages are fetched.");
                return Ok(());
            }
            println!("Fetching {} pages (streaming to DB)...", pages.len());
            let fetcher = HttpFetcher::new(fetch::build_client(&config)?, &config);
            let stats = fetch::fetch_pages_streaming(&conn, &fetcher, pages, config.concurrency).await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit, catalog } => {
            let conn = open_db(&config)?;
            let catalog = load_catalog(catalog.as_deref())?;
            let pages = db::fetch_unprocessed(&conn, limit)?;
            if pages.is_empty() {
                println!("No unprocessed pages. Run 'fetch' first.");
                return Ok(());
            }
            println!("Processing {} pages...", pages.len());
            let counts = bulk::process_pages(&conn, &pages, &catalog)?;
            counts.print();
            Ok(())
        }
        Commands::Publish { limit } => {
            let conn = open_db(&config)?;
            let pages = db::fetch_unpublished(&conn, limit)?;
            if pages.is_empty() {
                println!("Nothing to publish. Run 'process' first.");
                return Ok(());
            }
            println!("Publishing {} pages...", pages.len());
            let media = media_library(&config)?;
            let counts = bulk::publish_pages(&conn, &media, pages, config.source_base_url.as_deref()).await?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit, catalog } => {
            let conn = open_db(&config)?;
            let catalog = load_catalog(catalog.as_deref())?;
            let pages = db::fetch_unvisited(&conn, limit)?;
            if pages.is_empty() {
                println!("No unvisited pages. Run 'enqueue' first.");
                return Ok(());
            }

            // Phase 1: Fetch (streaming to DB)
            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} pages (streaming to DB)...", pages.len());
            let fetcher = HttpFetcher::new(fetch::build_client(&config)?, &config);
            let stats = fetch::fetch_pages_streaming(&conn, &fetcher, pages, config.concurrency).await?;
            println!(
                "Fetched {} pages ({} ok, {} errors) in {:.1}s",
                stats.total, stats.ok, stats.errors, t_fetch.elapsed().as_secs_f64()
            );

            // Phase 2: Process
            let t_process = Instant::now();
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process (all fetched pages had errors).");
                return Ok(());
            }
            println!("Processing {} pages...", unprocessed.len());
            let counts = bulk::process_pages(&conn, &unprocessed, &catalog)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();

            // Phase 3: Publish
            let t_publish = Instant::now();
            let pending = db::fetch_unpublished(&conn, None)?;
            println!("Publishing {} pages...", pending.len());
            let media = media_library(&config)?;
            let published =
                bulk::publish_pages(&conn, &media, pending, config.source_base_url.as_deref()).await?;
            println!("Published in {:.1}s", t_publish.elapsed().as_secs_f64());
            published.print();
            Ok(())
        }
        Commands::Page { url, catalog } => {
            let conn = open_db(&config)?;
            let catalog = load_catalog(catalog.as_deref())?;
            let fetcher = HttpFetcher::new(fetch::build_client(&config)?, &config);
            let migrator = Migrator::new(
                fetcher,
                SqlitePageStore::new(conn),
                media_library(&config)?,
                Arc::new(catalog),
            )
            .with_timeout(config.page_timeout)
            .with_source_base(config.source_base_url.clone());

            let report = migrator.migrate_page(&url).await?;
            for entry in &report.log {
                println!("[{}] {}", entry.timestamp.format("%H:%M:%S%.3f"), entry.message);
            }
            println!(
                "Page {} \"{}\": {} blocks, {} images ({} failed), template {}",
                report.page_id,
                report.title,
                report.blocks,
                report.images_uploaded,
                report.images_failed,
                report.template_id.as_deref().unwrap_or("-"),
            );
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&config)?;
            let s = db::get_stats(&conn)?;
            println!("Total:       {}", s.total);
            println!("Visited:     {}", s.visited);
            println!("Unvisited:   {}", s.unvisited);
            println!("Fetched:     {}", s.fetched);
            println!("Errors:      {}", s.errors);
            println!("Converted:   {}", s.converted);
            println!("Conv errors: {}", s.conversion_errors);
            println!("Migrated:    {}", s.migrated);
            println!("Media:       {}", s.media);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(config: &MigrationConfig) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(&config.db_path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

fn media_library(config: &MigrationConfig) -> anyhow::Result<MediaLibrary> {
    let client = fetch::build_client(config)?;
    Ok(MediaLibrary::new(client, config).with_index(open_db(config)?))
}

fn load_catalog(path: Option<&Path>) -> anyhow::Result<TemplateCatalog> {
    match path {
        Some(path) => TemplateCatalog::from_json_file(path),
        None => Ok(TemplateCatalog::builtin()),
    }
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
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
