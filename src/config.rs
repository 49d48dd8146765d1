use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const DB_PATH: &str = "data/migration.sqlite";
const MEDIA_DIR: &str = "data/media";
const MEDIA_BASE_URL: &str = "/media";
const CONCURRENCY: usize = 10;
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const TIMEOUT_SECS: u64 = 30;
const USER_AGENT: &str = concat!("block_migrator/", env!("CARGO_PKG_VERSION"));

/// Settings for migration runs: defaults, then `MIGRATOR_*` environment
/// variables, then whatever the CLI sets explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationConfig {
    pub db_path: PathBuf,
    pub media_dir: PathBuf,
    /// Public prefix under which re-hosted media is served.
    pub media_base_url: String,
    /// Base for resolving relative image links; defaults to the page URL.
    pub source_base_url: Option<String>,
    pub concurrency: usize,
    pub max_retries: u32,
    pub base_backoff: Duration,
    /// Upper bound for converting a single page.
    pub page_timeout: Duration,
    pub user_agent: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        MigrationConfig {
            db_path: PathBuf::from(DB_PATH),
            media_dir: PathBuf::from(MEDIA_DIR),
            media_base_url: MEDIA_BASE_URL.to_string(),
            source_base_url: None,
            concurrency: CONCURRENCY,
            max_retries: MAX_RETRIES,
            base_backoff: Duration::from_millis(BASE_BACKOFF_MS),
            page_timeout: Duration::from_secs(TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl MigrationConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from any key lookup, so tests need not touch the
    /// process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup("MIGRATOR_DB") {
            self.db_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("MIGRATOR_MEDIA_DIR") {
            self.media_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("MIGRATOR_MEDIA_URL") {
            self.media_base_url = value.trim_end_matches('/').to_string();
        }
        if let Some(value) = lookup("MIGRATOR_SOURCE_URL") {
            self.source_base_url = Some(value);
        }
        if let Some(value) = parsed::<usize>(&lookup, "MIGRATOR_CONCURRENCY")? {
            self.concurrency = value.max(1);
        }
        if let Some(value) = parsed::<u32>(&lookup, "MIGRATOR_MAX_RETRIES")? {
            self.max_retries = value;
        }
        if let Some(value) = parsed::<u64>(&lookup, "MIGRATOR_BACKOFF_MS")? {
            self.base_backoff = Duration::from_millis(value);
        }
        if let Some(value) = parsed::<u64>(&lookup, "MIGRATOR_TIMEOUT_SECS")? {
            self.page_timeout = Duration::from_secs(value);
        }
        if let Some(value) = lookup("MIGRATOR_USER_AGENT") {
            self.user_agent = value;
        }
        Ok(())
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid {} value {:?}", key, value)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let mut config = MigrationConfig::default();
        config.apply_overrides(lookup(&[])).unwrap();
        assert_eq!(config, MigrationConfig::default());
        assert_eq!(config.concurrency, 10);
    }

    #[test]
    fn overrides_apply() {
        let mut config = MigrationConfig::default();
        config
            .apply_overrides(lookup(&[
                ("MIGRATOR_DB", "/tmp/x.sqlite"),
                ("MIGRATOR_MEDIA_URL", "https://cdn.example.org/media/"),
                ("MIGRATOR_CONCURRENCY", "0"),
                ("MIGRATOR_TIMEOUT_SECS", " 5 "),
            ]))
            .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(config.media_base_url, "https://cdn.example.org/media");
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.page_timeout, Duration::from_secs(5));
    }

    #[test]
    fn bad_number_is_an_error() {
        let mut config = MigrationConfig::default();
        let err = config
            .apply_overrides(lookup(&[("MIGRATOR_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("MIGRATOR_MAX_RETRIES"));
    }
}
