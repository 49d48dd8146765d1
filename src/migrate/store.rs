use std::sync::Mutex;

use anyhow::{anyhow, Result};
use rusqlite::Connection;

use super::{PageMeta, PageStore};
use crate::db::{self, MigratedPageRow};

/// Draft pages in the `migrated_pages` table.
pub struct SqlitePageStore {
    conn: Mutex<Connection>,
}

impl SqlitePageStore {
    pub fn new(conn: Connection) -> Self {
        SqlitePageStore {
            conn: Mutex::new(conn),
        }
    }

    pub fn into_inner(self) -> Result<Connection> {
        self.conn
            .into_inner()
            .map_err(|_| anyhow!("page store lock poisoned"))
    }
}

#[async_trait::async_trait]
impl PageStore for SqlitePageStore {
    async fn persist_page(&self, title: &str, markup: &str, meta: &PageMeta) -> Result<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("page store lock poisoned"))?;
        db::insert_migrated_page(
            &conn,
            &MigratedPageRow {
                conversion_id: None,
                title,
                markup,
                source_url: Some(&meta.source_url),
                template_id: meta.template_id.as_deref(),
                meta: &meta.to_json(),
            },
        )
    }
}
