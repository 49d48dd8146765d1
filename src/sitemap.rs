use anyhow::{Context, Result};
use reqwest::Url;
use tracing::info;

/// Fetch a sitemap and return `(url, slug)` pairs for pages on the
/// sitemap's own host. Sitemap indexes are followed one level deep.
pub async fn fetch_site_urls(client: &reqwest::Client, sitemap_url: &str) -> Result<Vec<(String, String)>> {
    let root = Url::parse(sitemap_url).with_context(|| format!("Invalid sitemap URL {}", sitemap_url))?;

    info!("Fetching sitemap: {}", sitemap_url);
    let xml = fetch_text(client, sitemap_url).await?;
    let mut entries = parse_urlset(&xml)?;

    // an index lists further sitemaps rather than pages
    if entries.iter().all(|u| u.ends_with(".xml")) && !entries.is_empty() {
        let mut pages = Vec::new();
        for child in &entries {
            info!("Fetching child sitemap: {}", child);
            let xml = fetch_text(client, child).await?;
            pages.extend(parse_urlset(&xml)?);
        }
        entries = pages;
    }
    info!("Total URLs in sitemap: {}", entries.len());

    let filtered = same_host_pages(&root, entries);
    info!("Pages after filtering: {}", filtered.len());
    Ok(filtered)
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("Failed to fetch sitemap {}", url))
}

fn same_host_pages(root: &Url, urls: Vec<String>) -> Vec<(String, String)> {
    let mut seen = std::collections::HashSet::new();
    urls.into_iter()
        .filter_map(|url| {
            let parsed = Url::parse(&url).ok()?;
            if parsed.host_str() != root.host_str() || !seen.insert(url.clone()) {
                return None;
            }
            let slug = page_slug(&url);
            Some((url, slug))
        })
        .collect()
}

/// Stable per-page key from the URL path: `/about/team/` → `about-team`,
/// the site root → `index`.
pub fn page_slug(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    let slug: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches(".html")
                .trim_end_matches(".htm")
                .trim_end_matches(".php")
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
                .collect()
        })
        .collect();
    if slug.is_empty() {
        "index".to_string()
    } else {
        slug.join("-")
    }
}

/// Parse a urlset (or sitemapindex) XML and return all <loc> URLs.
fn parse_urlset(xml: &str) -> Result<Vec<String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut urls = Vec::new();
    let mut in_entry = false;
    let mut in_loc = false;

    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Start(e)) => match e.local_name().as_ref() {
                b"url" | b"sitemap" => in_entry = true,
                b"loc" if in_entry => in_loc = true,
                _ => {}
            },
            Ok(quick_xml::events::Event::Text(e)) if in_loc => {
                let url = e.unescape()?.trim().to_string();
                if !url.is_empty() {
                    urls.push(url);
                }
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = false,
                b"url" | b"sitemap" => in_entry = false,
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://museum.test/</loc></url>
  <url><loc> https://museum.test/exhibits/spitfire.html </loc><lastmod>2024-01-01</lastmod></url>
  <url><loc>https://museum.test/a?b=1&amp;c=2</loc></url>
  <url><loc>https://cdn.other.test/file.pdf</loc></url>
  <url><loc>https://museum.test/</loc></url>
</urlset>"#;

    #[test]
    fn parses_locs() {
        let urls = parse_urlset(URLSET).unwrap();
        assert_eq!(urls.len(), 5);
        assert_eq!(urls[1], "https://museum.test/exhibits/spitfire.html");
        assert_eq!(urls[2], "https://museum.test/a?b=1&c=2");
    }

    #[test]
    fn keeps_same_host_once() {
        let root = Url::parse("https://museum.test/sitemap.xml").unwrap();
        let pages = same_host_pages(&root, parse_urlset(URLSET).unwrap());
        let slugs: Vec<_> = pages.iter().map(|(_, s)| s.as_str()).collect();
        assert_eq!(slugs, vec!["index", "exhibits-spitfire", "a"]);
    }

    #[test]
    fn slugs() {
        assert_eq!(page_slug("https://x.test/About/Our_Team/"), "about-our-team");
        assert_eq!(page_slug("https://x.test"), "index");
    }
}
