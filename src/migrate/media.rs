use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use base64::Engine;
use reqwest::Url;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::MediaStore;
use crate::config::MigrationConfig;
use crate::db;

/// Where an image's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Inline `data:image/...;base64,` payload.
    Inline { bytes: Vec<u8>, extension: String },
    Remote(String),
}

/// Turn an `<img src>` value into an absolute URL: protocol-relative links
/// get `https:`, relative links are joined onto `base`. `data:` URLs and
/// absolute URLs pass through unchanged.
pub fn resolve_url(src: &str, base: Option<&str>) -> String {
    let src = src.trim();
    if src.starts_with("data:") || src.starts_with("http://") || src.starts_with("https://") {
        return src.to_string();
    }
    if let Some(rest) = src.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    match base.and_then(|b| Url::parse(b).ok()) {
        Some(base) => base
            .join(src)
            .map(String::from)
            .unwrap_or_else(|_| src.to_string()),
        None => src.to_string(),
    }
}

pub fn classify_source(url: &str) -> Result<ImageSource> {
    if let Some(payload) = url.strip_prefix("data:") {
        return decode_data_url(payload);
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(ImageSource::Remote(url.to_string()));
    }
    bail!("Cannot fetch image from non-absolute URL {:?}", url)
}

fn decode_data_url(payload: &str) -> Result<ImageSource> {
    let (header, data) = payload
        .split_once(',')
        .context("data URL has no payload")?;
    let mime = header.split(';').next().unwrap_or_default();
    let Some(kind) = mime.strip_prefix("image/") else {
        bail!("data URL is not an image ({})", mime);
    };
    if !header.ends_with(";base64") {
        bail!("only base64 data URLs are supported");
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .context("invalid base64 in data URL")?;
    Ok(ImageSource::Inline {
        bytes,
        extension: extension_for_mime(kind).to_string(),
    })
}

fn extension_for_mime(kind: &str) -> &str {
    match kind {
        "jpeg" => "jpg",
        "svg+xml" => "svg",
        "x-icon" | "vnd.microsoft.icon" => "ico",
        other => other,
    }
}

fn extension_for_url(url: &str) -> String {
    let path = Url::parse(url).map(|u| u.path().to_string()).unwrap_or_default();
    Path::new(&path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| e.len() <= 5 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string())
}

/// File name for a source URL: the first 16 hex digits of its SHA-256, so
/// the same source maps to the same file across runs and releases.
fn file_name(source: &str, extension: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(source.as_bytes()));
    format!("{}.{}", &digest[..16], extension)
}

/// Downloads images into the media directory and serves them under the
/// configured public prefix. Each source URL is stored once per library,
/// and once ever when an index database is attached.
pub struct MediaLibrary {
    client: reqwest::Client,
    dir: PathBuf,
    public_base: String,
    source_base: Option<String>,
    seen: Mutex<HashMap<String, String>>,
    index: Option<Mutex<Connection>>,
}

impl MediaLibrary {
    pub fn new(client: reqwest::Client, config: &MigrationConfig) -> Self {
        MediaLibrary {
            client,
            dir: config.media_dir.clone(),
            public_base: config.media_base_url.trim_end_matches('/').to_string(),
            source_base: config.source_base_url.clone(),
            seen: Mutex::new(HashMap::new()),
            index: None,
        }
    }

    /// Persist the source → hosted mapping in the `media` table.
    pub fn with_index(mut self, conn: Connection) -> Self {
        self.index = Some(Mutex::new(conn));
        self
    }

    fn cached(&self, source: &str) -> Result<Option<String>> {
        if let Some(hosted) = self.lock_seen()?.get(source) {
            return Ok(Some(hosted.clone()));
        }
        match &self.index {
            Some(conn) => {
                let conn = conn.lock().map_err(|_| anyhow::anyhow!("media index lock poisoned"))?;
                db::find_media(&conn, source)
            }
            None => Ok(None),
        }
    }

    fn lock_seen(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.seen
            .lock()
            .map_err(|_| anyhow::anyhow!("media cache lock poisoned"))
    }

    fn remember(&self, source: &str, hosted: &str, path: &Path, bytes: usize) -> Result<()> {
        self.lock_seen()?.insert(source.to_string(), hosted.to_string());
        if let Some(conn) = &self.index {
            let conn = conn.lock().map_err(|_| anyhow::anyhow!("media index lock poisoned"))?;
            db::save_media(
                &conn,
                &db::MediaRow {
                    source_url: source.to_string(),
                    hosted_url: hosted.to_string(),
                    local_path: path.display().to_string(),
                    bytes,
                },
            )?;
        }
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to download image {}", url))?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait::async_trait]
impl MediaStore for MediaLibrary {
    async fn upload_image(&self, url: &str) -> Result<String> {
        let source = resolve_url(url, self.source_base.as_deref());
        if let Some(hosted) = self.cached(&source)? {
            debug!(url = %source, "image already hosted");
            return Ok(hosted);
        }

        let (bytes, extension) = match classify_source(&source)? {
            ImageSource::Inline { bytes, extension } => (bytes, extension),
            ImageSource::Remote(remote) => {
                let bytes = self.download(&remote).await?;
                (bytes, extension_for_url(&remote))
            }
        };

        let name = file_name(&source, &extension);
        let path = self.dir.join(&name);
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let hosted = format!("{}/{}", self.public_base, name);
        self.remember(&source, &hosted, &path, bytes.len())?;
        info!("Stored image {} ({} bytes)", hosted, bytes.len());
        Ok(hosted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_urls() {
        let base = Some("https://museum.test/exhibits/page.html");
        assert_eq!(resolve_url("//cdn.test/a.png", base), "https://cdn.test/a.png");
        assert_eq!(resolve_url("img/a.png", base), "https://museum.test/exhibits/img/a.png");
        assert_eq!(resolve_url("/img/a.png", base), "https://museum.test/img/a.png");
        assert_eq!(resolve_url("https://x.test/a.png", base), "https://x.test/a.png");
        assert_eq!(resolve_url("img/a.png", None), "img/a.png");
        assert_eq!(resolve_url("data:image/png;base64,AAAA", base), "data:image/png;base64,AAAA");
    }

    #[test]
    fn decodes_data_urls() {
        let source = classify_source("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(
            source,
            ImageSource::Inline { bytes: b"hello".to_vec(), extension: "png".into() }
        );
        assert!(classify_source("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(classify_source("data:image/svg+xml,<svg/>").is_err());
        assert!(classify_source("relative/a.png").is_err());
    }

    #[test]
    fn file_names_are_fixed_per_source() {
        let name = file_name("https://x.test/a.png", "png");
        assert_eq!(name.len(), 20);
        assert!(name.ends_with(".png"));
        assert_eq!(name, file_name("https://x.test/a.png", "png"));
        assert_ne!(name, file_name("https://x.test/b.png", "png"));
        assert_eq!(file_name("", "bin"), "e3b0c44298fc1c14.bin");
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for_url("https://x.test/a/B.JPG?w=200"), "jpg");
        assert_eq!(extension_for_url("https://x.test/image"), "bin");
        assert_eq!(extension_for_mime("svg+xml"), "svg");
    }

    #[tokio::test]
    async fn inline_images_are_written_once() {
        let dir = std::env::temp_dir().join(format!("media-test-{}", std::process::id()));
        let config = MigrationConfig {
            media_dir: dir.clone(),
            media_base_url: "https://site.test/uploads/".into(),
            ..Default::default()
        };
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let library = MediaLibrary::new(reqwest::Client::new(), &config).with_index(conn);

        let url = "data:image/gif;base64,R0lGODlhAQABAAAAACw=";
        let hosted = library.upload_image(url).await.unwrap();
        assert!(hosted.starts_with("https://site.test/uploads/"));
        assert!(hosted.ends_with(".gif"));
        assert_eq!(library.upload_image(url).await.unwrap(), hosted);

        let name = hosted.rsplit('/').next().unwrap();
        assert!(dir.join(name).exists());
        std::fs::remove_dir_all(&dir).ok();
    }
}
