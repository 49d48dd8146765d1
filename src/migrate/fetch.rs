use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::StatusCode;
use rusqlite::Connection;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::PageFetcher;
use crate::config::MigrationConfig;
use crate::db::{self, FetchRow};

/// Fetch stats returned after completion.
pub struct FetchStats {
    pub total: usize,
    pub ok: usize,
    pub errors: usize,
}

/// Plain HTTP fetcher for source pages.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
    base_backoff: Duration,
}

pub fn build_client(config: &MigrationConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.page_timeout)
        .build()
        .context("Failed to build HTTP client")
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, config: &MigrationConfig) -> Self {
        HttpFetcher {
            client,
            max_retries: config.max_retries,
            base_backoff: config.base_backoff,
        }
    }

    async fn fetch_once(&self, page_id: i64, url: &str, slug: &str) -> FetchRow {
        let start = Instant::now();
        let response = self.client.get(url).send().await;
        let mut row = FetchRow {
            page_id,
            url: url.to_string(),
            slug: slug.to_string(),
            html: None,
            status: None,
            error: None,
            latency_ms: None,
        };

        match response {
            Ok(resp) => {
                let status = resp.status();
                row.status = Some(status.as_u16());
                if status.is_success() {
                    match resp.text().await {
                        Ok(body) => row.html = Some(body),
                        Err(e) => row.error = Some(e.to_string()),
                    }
                } else {
                    row.error = Some(format!("HTTP {}", status));
                }
            }
            Err(e) => row.error = Some(e.to_string()),
        }
        row.latency_ms = Some(start.elapsed().as_millis() as i64);
        row
    }

    /// Fetch with exponential backoff on rate limiting and server errors.
    pub async fn fetch_with_retry(&self, page_id: i64, url: &str, slug: &str) -> FetchRow {
        let mut attempt = 0;
        loop {
            let row = self.fetch_once(page_id, url, slug).await;
            if !should_retry(&row) || attempt >= self.max_retries {
                return row;
            }

            let backoff = self.base_backoff * 2u32.pow(attempt);
            warn!(
                "Retryable failure on {} (attempt {}/{}), backing off {:.1}s",
                slug,
                attempt + 1,
                self.max_retries,
                backoff.as_secs_f64()
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

fn should_retry(row: &FetchRow) -> bool {
    match row.status.and_then(|s| StatusCode::from_u16(s).ok()) {
        Some(status) => status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error(),
        // transport errors (timeouts, resets) are worth another try
        None => row.error.is_some(),
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let row = self.fetch_with_retry(0, url, url).await;
        match (row.html, row.error) {
            (Some(html), _) => Ok(html),
            (None, Some(e)) => anyhow::bail!("Failed to fetch {}: {}", url, e),
            (None, None) => anyhow::bail!("Empty response from {}", url),
        }
    }
}

/// Fetch pages concurrently, saving each result to DB as it arrives.
pub async fn fetch_pages_streaming(
    conn: &Connection,
    fetcher: &HttpFetcher,
    pages: Vec<(i64, String, String)>,
    concurrency: usize,
) -> Result<FetchStats> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = pages.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    // Channel: workers send results, main loop saves to DB
    let (tx, mut rx) = tokio::sync::mpsc::channel::<FetchRow>(concurrency.max(1) * 2);

    for (page_id, url, slug) in pages {
        let fetcher = fetcher.clone();
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire().await else {
                return;
            };
            let row = fetcher.fetch_with_retry(page_id, &url, &slug).await;
            let _ = tx.send(row).await;
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish
    drop(tx);

    let mut ok = 0usize;
    let mut errors = 0usize;

    while let Some(row) = rx.recv().await {
        if row.error.is_some() {
            warn!("Fetch failed for {}: {}", row.slug, row.error.as_deref().unwrap_or_default());
            errors += 1;
        } else {
            ok += 1;
        }
        db::save_fetch(conn, &row)?;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!("Fetched {} pages ({} ok, {} errors)", total, ok, errors);

    Ok(FetchStats { total, ok, errors })
}
