use std::path::Path;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            slug       TEXT NOT NULL,
            visited    BOOLEAN NOT NULL DEFAULT 0,
            visited_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_visited ON pages(visited);

        CREATE TABLE IF NOT EXISTS page_data (
            id         INTEGER PRIMARY KEY,
            page_id    INTEGER NOT NULL REFERENCES pages(id),
            url        TEXT NOT NULL,
            slug       TEXT NOT NULL,
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_page_data_slug ON page_data(slug);

        CREATE TABLE IF NOT EXISTS conversions (
            id             INTEGER PRIMARY KEY,
            page_data_id   INTEGER NOT NULL UNIQUE REFERENCES page_data(id),
            slug           TEXT NOT NULL,
            url            TEXT NOT NULL,
            title          TEXT,
            markup         TEXT,
            block_count    INTEGER NOT NULL DEFAULT 0,
            image_count    INTEGER NOT NULL DEFAULT 0,
            content_type   TEXT,
            template_id    TEXT,
            confidence     INTEGER,
            meta           TEXT,
            error          TEXT,
            processed_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS media (
            source_url  TEXT PRIMARY KEY,
            hosted_url  TEXT NOT NULL,
            local_path  TEXT NOT NULL,
            bytes       INTEGER NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS migrated_pages (
            id            INTEGER PRIMARY KEY,
            conversion_id INTEGER UNIQUE REFERENCES conversions(id),
            title         TEXT NOT NULL,
            markup        TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'draft' CHECK(status IN ('draft','published')),
            source_url    TEXT,
            template_id   TEXT,
            meta          TEXT,
            migrated_at   TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_migrated_source ON migrated_pages(source_url);
        ",
    )?;
    Ok(())
}

// ── Queue ──

pub fn insert_pages(conn: &Connection, pages: &[(String, String)]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("INSERT OR IGNORE INTO pages (url, slug) VALUES (?1, ?2)")?;
        for (url, slug) in pages {
            count += stmt.execute(rusqlite::params![url, slug])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

fn limit_clause(limit: Option<usize>) -> String {
    match limit {
        Some(n) => format!(" LIMIT {}", n),
        None => String::new(),
    }
}

pub fn fetch_unvisited(
    conn: &Connection,
    limit: Option<usize>,
) -> Result<Vec<(i64, String, String)>> {
    let sql = format!(
        "SELECT id, url, slug FROM pages WHERE visited = 0 ORDER BY id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct FetchRow {
    pub page_id: i64,
    pub url: String,
    pub slug: String,
    pub html: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Record one fetch result and mark its queue entry visited.
pub fn save_fetch(conn: &Connection, row: &FetchRow) -> Result<()> {
    let mut insert = conn.prepare_cached(
        "INSERT INTO page_data (page_id, url, slug, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    insert.execute(rusqlite::params![
        row.page_id, row.url, row.slug, row.html, row.status, row.error, row.latency_ms,
    ])?;
    let mut update = conn.prepare_cached(
        "UPDATE pages SET visited = 1, visited_at = datetime('now') WHERE id = ?1",
    )?;
    update.execute(rusqlite::params![row.page_id])?;
    Ok(())
}

// ── Processing ──

pub struct FetchedPage {
    pub page_data_id: i64,
    pub slug: String,
    pub url: String,
    pub html: String,
}

pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<FetchedPage>> {
    let sql = format!(
        "SELECT pd.id, pd.slug, pd.url, pd.html
         FROM page_data pd
         LEFT JOIN conversions c ON c.page_data_id = pd.id
         WHERE pd.html IS NOT NULL AND c.id IS NULL
         ORDER BY pd.id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(FetchedPage {
                page_data_id: row.get(0)?,
                slug: row.get(1)?,
                url: row.get(2)?,
                html: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Default)]
pub struct ConversionRow {
    pub page_data_id: i64,
    pub slug: String,
    pub url: String,
    pub title: Option<String>,
    pub markup: Option<String>,
    pub block_count: usize,
    pub image_count: usize,
    pub content_type: Option<String>,
    pub template_id: Option<String>,
    pub confidence: Option<u32>,
    /// Page metadata as a JSON object.
    pub meta: Option<String>,
    pub error: Option<String>,
}

pub fn save_conversions(conn: &Connection, rows: &[ConversionRow]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO conversions
             (page_data_id, slug, url, title, markup, block_count, image_count,
              content_type, template_id, confidence, meta, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for r in rows {
            stmt.execute(rusqlite::params![
                r.page_data_id, r.slug, r.url, r.title, r.markup, r.block_count, r.image_count,
                r.content_type, r.template_id, r.confidence, r.meta, r.error,
            ])?;
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Publishing ──

pub struct PendingConversion {
    pub conversion_id: i64,
    pub url: String,
    pub title: String,
    pub markup: String,
    pub template_id: Option<String>,
    pub content_type: Option<String>,
    pub meta: Option<String>,
}

pub fn fetch_unpublished(conn: &Connection, limit: Option<usize>) -> Result<Vec<PendingConversion>> {
    let sql = format!(
        "SELECT c.id, c.url, COALESCE(c.title, c.slug), c.markup, c.template_id, c.content_type, c.meta
         FROM conversions c
         LEFT JOIN migrated_pages m ON m.conversion_id = c.id
         WHERE c.error IS NULL AND c.markup IS NOT NULL AND m.id IS NULL
         ORDER BY c.id{}",
        limit_clause(limit)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PendingConversion {
                conversion_id: row.get(0)?,
                url: row.get(1)?,
                title: row.get(2)?,
                markup: row.get(3)?,
                template_id: row.get(4)?,
                content_type: row.get(5)?,
                meta: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct MigratedPageRow<'a> {
    pub conversion_id: Option<i64>,
    pub title: &'a str,
    pub markup: &'a str,
    pub source_url: Option<&'a str>,
    pub template_id: Option<&'a str>,
    pub meta: &'a str,
}

/// Store a draft page and return its id.
pub fn insert_migrated_page(conn: &Connection, row: &MigratedPageRow<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO migrated_pages (conversion_id, title, markup, source_url, template_id, meta)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            row.conversion_id, row.title, row.markup, row.source_url, row.template_id, row.meta,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Media ──

pub struct MediaRow {
    pub source_url: String,
    pub hosted_url: String,
    pub local_path: String,
    pub bytes: usize,
}

pub fn find_media(conn: &Connection, source_url: &str) -> Result<Option<String>> {
    let hosted = conn
        .query_row(
            "SELECT hosted_url FROM media WHERE source_url = ?1",
            [source_url],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hosted)
}

pub fn save_media(conn: &Connection, row: &MediaRow) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO media (source_url, hosted_url, local_path, bytes)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![row.source_url, row.hosted_url, row.local_path, row.bytes],
    )?;
    Ok(())
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub visited: usize,
    pub unvisited: usize,
    pub fetched: usize,
    pub errors: usize,
    pub converted: usize,
    pub conversion_errors: usize,
    pub migrated: usize,
    pub media: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<usize> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    let total = count("SELECT COUNT(*) FROM pages")?;
    let visited = count("SELECT COUNT(*) FROM pages WHERE visited = 1")?;
    Ok(Stats {
        total,
        visited,
        unvisited: total - visited,
        fetched: count("SELECT COUNT(*) FROM page_data")?,
        errors: count("SELECT COUNT(*) FROM page_data WHERE error IS NOT NULL")?,
        converted: count("SELECT COUNT(*) FROM conversions WHERE error IS NULL")?,
        conversion_errors: count("SELECT COUNT(*) FROM conversions WHERE error IS NOT NULL")?,
        migrated: count("SELECT COUNT(*) FROM migrated_pages")?,
        media: count("SELECT COUNT(*) FROM media")?,
    })
}
