pub mod bulk;
pub mod content;
pub mod fetch;
pub mod media;
pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::analyzer::catalog::TemplateCatalog;
use crate::analyzer::{classify_document, RankedRecommendations};
use crate::parser::blocks::{collect_image_urls, BlockRecord};
use crate::parser::{self, serialize};
use content::PageMetadata;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ── Collaborators ──

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

#[async_trait::async_trait]
pub trait PageStore: Send + Sync {
    /// Store a draft page, returning its id.
    async fn persist_page(&self, title: &str, markup: &str, meta: &PageMeta) -> Result<i64>;
}

#[async_trait::async_trait]
pub trait MediaStore: Send + Sync {
    /// Re-host an image and return the URL it is now served from.
    async fn upload_image(&self, url: &str) -> Result<String>;
}

/// Stored alongside each migrated page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageMeta {
    pub source_url: String,
    pub migration_date: DateTime<Utc>,
    pub template_id: Option<String>,
    pub content_type: Option<String>,
    #[serde(flatten)]
    pub metadata: PageMetadata,
}

impl PageMeta {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ── Conversion ──

pub struct ConvertedPage {
    pub metadata: PageMetadata,
    pub blocks: Vec<BlockRecord>,
    pub analysis: RankedRecommendations,
}

impl ConvertedPage {
    /// Page title, or the source URL when the document has none.
    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.metadata.title.is_empty() {
            fallback
        } else {
            &self.metadata.title
        }
    }

    pub fn template_id(&self) -> Option<&str> {
        self.analysis.top_template().map(|t| t.template_id.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.analysis.content_types.first().map(|c| c.label.as_str())
    }

    pub fn page_meta(&self, source_url: &str) -> PageMeta {
        PageMeta {
            source_url: source_url.to_string(),
            migration_date: Utc::now(),
            template_id: self.template_id().map(str::to_string),
            content_type: self.content_type().map(str::to_string),
            metadata: self.metadata.clone(),
        }
    }
}

/// Extract the main content, convert it to blocks and classify the whole
/// page. Synchronous and CPU-bound.
pub fn convert_page(html: &str, catalog: &TemplateCatalog) -> ConvertedPage {
    let page = content::extract(html);
    let blocks = parser::convert_tree(&page.content);
    let analysis = classify_document(html, "", "", catalog);
    ConvertedPage {
        metadata: page.metadata,
        blocks,
        analysis,
    }
}

// ── Media ──

#[derive(Debug, Default)]
pub struct ImageUploads {
    /// Original block URL → hosted URL.
    pub mapping: HashMap<String, String>,
    pub uploaded: usize,
    pub failed: usize,
}

/// Upload every distinct image in `blocks`. Relative URLs are resolved
/// against `base`; an image that fails keeps its original URL.
pub async fn rehost_images<M: MediaStore + ?Sized>(
    media: &M,
    blocks: &[BlockRecord],
    base: &str,
) -> ImageUploads {
    let mut uploads = ImageUploads::default();
    for original in collect_image_urls(blocks) {
        let resolved = media::resolve_url(&original, Some(base));
        match media.upload_image(&resolved).await {
            Ok(hosted) => {
                uploads.mapping.insert(original, hosted);
                uploads.uploaded += 1;
            }
            Err(e) => {
                warn!("Image upload failed for {}: {:#}", resolved, e);
                uploads.failed += 1;
            }
        }
    }
    uploads
}

// ── Single-page migration ──

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub page_id: i64,
    pub title: String,
    pub template_id: Option<String>,
    pub blocks: usize,
    pub images_uploaded: usize,
    pub images_failed: usize,
    pub log: Vec<LogEntry>,
    pub duration: Duration,
}

#[derive(Default)]
struct StepLog(Vec<LogEntry>);

impl StepLog {
    fn push(&mut self, message: String) {
        info!("{}", message);
        self.0.push(LogEntry {
            timestamp: Utc::now(),
            message,
        });
    }
}

/// Moves single pages from a source site into a page store.
pub struct Migrator<F, S, M> {
    fetcher: F,
    store: S,
    media: M,
    catalog: Arc<TemplateCatalog>,
    timeout: Duration,
    source_base: Option<String>,
}

impl<F: PageFetcher, S: PageStore, M: MediaStore> Migrator<F, S, M> {
    pub fn new(fetcher: F, store: S, media: M, catalog: Arc<TemplateCatalog>) -> Self {
        Migrator {
            fetcher,
            store,
            media,
            catalog,
            timeout: DEFAULT_TIMEOUT,
            source_base: None,
        }
    }

    /// Upper bound for converting and classifying one page.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base for relative image links instead of the page URL.
    pub fn with_source_base(mut self, base: Option<String>) -> Self {
        self.source_base = base;
        self
    }

    pub async fn migrate_page(&self, url: &str) -> Result<MigrationReport> {
        let start = Instant::now();
        let mut log = StepLog::default();

        log.push(format!("Fetching {}", url));
        let html = self
            .fetcher
            .fetch_page(url)
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;
        log.push(format!("Fetched {} bytes", html.len()));

        let converted = self.convert(html).await?;
        let mut blocks = converted.blocks.clone();
        log.push(format!(
            "Converted {} blocks (template: {})",
            blocks.len(),
            converted.template_id().unwrap_or("none")
        ));

        let base = self.source_base.as_deref().unwrap_or(url);
        let uploads = rehost_images(&self.media, &blocks, base).await;
        log.push(format!(
            "Uploaded {} images ({} failed)",
            uploads.uploaded, uploads.failed
        ));
        for block in &mut blocks {
            block.rewrite_image_urls(&uploads.mapping);
        }

        let markup = serialize::serialize(&blocks);
        let title = converted.title_or(url).to_string();
        let meta = converted.page_meta(url);
        let page_id = self
            .store
            .persist_page(&title, &markup, &meta)
            .await
            .with_context(|| format!("Failed to store page for {}", url))?;
        log.push(format!("Stored draft page {}", page_id));

        Ok(MigrationReport {
            page_id,
            title,
            template_id: meta.template_id,
            blocks: blocks.len(),
            images_uploaded: uploads.uploaded,
            images_failed: uploads.failed,
            log: log.0,
            duration: start.elapsed(),
        })
    }

    async fn convert(&self, html: String) -> Result<ConvertedPage> {
        let catalog = Arc::clone(&self.catalog);
        let task = tokio::task::spawn_blocking(move || convert_page(&html, &catalog));
        tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| anyhow!("Conversion timed out after {:.1}s", self.timeout.as_secs_f64()))?
            .context("Conversion task failed")
    }
}
