use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use tracing::{info, warn};

use super::content::PageMetadata;
use super::{convert_page, rehost_images, MediaStore, PageMeta};
use crate::analyzer::catalog::TemplateCatalog;
use crate::db::{self, ConversionRow, FetchedPage, MigratedPageRow, PendingConversion};
use crate::parser::blocks::collect_image_urls;
use crate::parser::serialize;

const CHUNK_SIZE: usize = 500;

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

// ── Process ──

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessCounts {
    pub converted: usize,
    pub empty: usize,
    pub blocks: usize,
    pub images: usize,
}

impl ProcessCounts {
    pub fn print(&self) {
        println!(
            "Converted {} pages ({} without content): {} blocks, {} images.",
            self.converted, self.empty, self.blocks, self.images,
        );
    }
}

/// Convert one fetched page into its conversion row. A page that yields no
/// blocks is recorded as an error.
pub fn process_page(page: &FetchedPage, catalog: &TemplateCatalog) -> ConversionRow {
    let converted = convert_page(&page.html, catalog);
    let mut row = ConversionRow {
        page_data_id: page.page_data_id,
        slug: page.slug.clone(),
        url: page.url.clone(),
        ..Default::default()
    };
    if converted.blocks.is_empty() {
        row.error = Some("no content blocks".to_string());
        return row;
    }

    row.title = Some(converted.title_or(&page.slug).to_string());
    row.markup = Some(serialize::serialize(&converted.blocks));
    row.block_count = converted.blocks.len();
    row.image_count = collect_image_urls(&converted.blocks).len();
    row.content_type = converted.content_type().map(str::to_string);
    row.template_id = converted.template_id().map(str::to_string);
    row.confidence = converted.analysis.content_types.first().map(|c| c.confidence);
    row.meta = serde_json::to_string(&converted.metadata).ok();
    row
}

/// Convert and classify pages in parallel chunks, saving each chunk.
pub fn process_pages(
    conn: &Connection,
    pages: &[FetchedPage],
    catalog: &TemplateCatalog,
) -> Result<ProcessCounts> {
    let pb = progress_bar(pages.len())?;
    let mut counts = ProcessCounts::default();

    for chunk in pages.chunks(CHUNK_SIZE) {
        let rows: Vec<ConversionRow> = chunk.par_iter().map(|p| process_page(p, catalog)).collect();

        for row in &rows {
            if let Some(e) = &row.error {
                warn!("Skipping {}: {}", row.slug, e);
                counts.empty += 1;
            } else {
                counts.converted += 1;
                counts.blocks += row.block_count;
                counts.images += row.image_count;
            }
        }
        db::save_conversions(conn, &rows)?;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

// ── Publish ──

#[derive(Debug, Default, PartialEq, Eq)]
pub struct PublishCounts {
    pub published: usize,
    pub failed: usize,
    pub images_uploaded: usize,
    pub images_failed: usize,
}

impl PublishCounts {
    pub fn print(&self) {
        println!(
            "Published {} drafts ({} failed), {} images re-hosted ({} failed).",
            self.published, self.failed, self.images_uploaded, self.images_failed,
        );
    }
}

/// Re-host media for converted pages and store them as drafts.
pub async fn publish_pages<M: MediaStore + ?Sized>(
    conn: &Connection,
    media: &M,
    pages: Vec<PendingConversion>,
    source_base: Option<&str>,
) -> Result<PublishCounts> {
    let pb = progress_bar(pages.len())?;
    let mut counts = PublishCounts::default();

    for page in pages {
        let mut blocks = match serialize::parse_markup(&page.markup) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("Stored markup for {} is unreadable: {}", page.url, e);
                counts.failed += 1;
                pb.inc(1);
                continue;
            }
        };

        let uploads = rehost_images(media, &blocks, source_base.unwrap_or(&page.url)).await;
        counts.images_uploaded += uploads.uploaded;
        counts.images_failed += uploads.failed;
        for block in &mut blocks {
            block.rewrite_image_urls(&uploads.mapping);
        }

        let metadata: PageMetadata = page
            .meta
            .as_deref()
            .and_then(|m| serde_json::from_str(m).ok())
            .unwrap_or_default();
        let meta = PageMeta {
            source_url: page.url.clone(),
            migration_date: Utc::now(),
            template_id: page.template_id.clone(),
            content_type: page.content_type.clone(),
            metadata,
        };
        let markup = serialize::serialize(&blocks);
        db::insert_migrated_page(
            conn,
            &MigratedPageRow {
                conversion_id: Some(page.conversion_id),
                title: &page.title,
                markup: &markup,
                source_url: Some(&page.url),
                template_id: page.template_id.as_deref(),
                meta: &meta.to_json(),
            },
        )?;
        counts.published += 1;
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Published {} pages ({} failed)",
        counts.published, counts.failed
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::db::FetchRow;

    struct PrefixMedia(Mutex<usize>);

    #[async_trait::async_trait]
    impl MediaStore for PrefixMedia {
        async fn upload_image(&self, url: &str) -> Result<String> {
            *self.0.lock().unwrap() += 1;
            Ok(url.replace("https://museum.test/", "/media/"))
        }
    }

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        db::insert_pages(
            &conn,
            &[
                ("https://museum.test/spitfire".into(), "spitfire".into()),
                ("https://museum.test/blank".into(), "blank".into()),
            ],
        )
        .unwrap();
        let landing = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        for (id, url, html) in [
            (1, "https://museum.test/spitfire", landing),
            (2, "https://museum.test/blank", "<html><body>   </body></html>".to_string()),
        ] {
            db::save_fetch(
                &conn,
                &FetchRow {
                    page_id: id,
                    url: url.into(),
                    slug: url.rsplit('/').next().unwrap().into(),
                    html: Some(html),
                    status: Some(200),
                    error: None,
                    latency_ms: None,
                },
            )
            .unwrap();
        }
        conn
    }

    #[test]
    fn empty_pages_become_error_rows() {
        let page = FetchedPage {
            page_data_id: 9,
            slug: "blank".into(),
            url: "https://museum.test/blank".into(),
            html: String::new(),
        };
        let row = process_page(&page, &TemplateCatalog::builtin());
        assert_eq!(row.error.as_deref(), Some("no content blocks"));
        assert!(row.markup.is_none());
    }

    #[test]
    fn processes_fetched_pages() {
        let conn = seeded();
        let pages = db::fetch_unprocessed(&conn, None).unwrap();
        let counts = process_pages(&conn, &pages, &TemplateCatalog::builtin()).unwrap();
        assert_eq!(
            counts,
            ProcessCounts { converted: 1, empty: 1, blocks: 8, images: 8 }
        );

        let (title, template, confidence): (String, String, u32) = conn
            .query_row(
                "SELECT title, template_id, confidence FROM conversions WHERE slug = 'spitfire'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(title, "Spitfire Heritage Museum");
        assert_eq!(template, "historic-modern");
        assert_eq!(confidence, 60);
        assert!(db::fetch_unprocessed(&conn, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn publishes_with_rehosted_media() {
        let conn = seeded();
        let pages = db::fetch_unprocessed(&conn, None).unwrap();
        process_pages(&conn, &pages, &TemplateCatalog::builtin()).unwrap();

        let pending = db::fetch_unpublished(&conn, None).unwrap();
        assert_eq!(pending.len(), 1);
        let media = PrefixMedia(Mutex::new(0));
        let counts = publish_pages(&conn, &media, pending, None).await.unwrap();
        assert_eq!(counts.published, 1);
        assert_eq!(counts.images_uploaded, 8);
        assert_eq!(*media.0.lock().unwrap(), 8);

        let (markup, meta): (String, String) = conn
            .query_row("SELECT markup, meta FROM migrated_pages", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert!(markup.contains("/media/images/g1.jpg"));
        assert!(!markup.contains("\"/images/g1.jpg\""));
        assert!(meta.contains("\"content_type\":\"gallery\""));
        assert!(meta.contains("\"keywords\":\"aviation, history, museum\""));
        assert!(db::fetch_unpublished(&conn, None).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_markup_is_counted() {
        let conn = seeded();
        let pending = vec![PendingConversion {
            conversion_id: 1,
            url: "https://museum.test/x".into(),
            title: "x".into(),
            markup: "<!-- block:paragraph {} -->".into(),
            template_id: None,
            content_type: None,
            meta: None,
        }];
        let counts = publish_pages(&conn, &PrefixMedia(Mutex::new(0)), pending, None)
            .await
            .unwrap();
        assert_eq!(counts, PublishCounts { failed: 1, ..Default::default() });
    }
}
