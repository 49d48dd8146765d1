use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::parser::dom::{self, DocumentNode};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub keywords: String,
    /// `og:*` properties with the prefix stripped.
    pub og: BTreeMap<String, String>,
}

pub struct ExtractedPage {
    pub metadata: PageMetadata,
    /// Main content subtree, already cleaned.
    pub content: DocumentNode,
}

/// Locate the main content of a page and read its metadata.
pub fn extract(html: &str) -> ExtractedPage {
    let root = dom::parse(html);
    let metadata = metadata(&root);
    let content = clean(content_root(&root));
    ExtractedPage { metadata, content }
}

/// First `div` classed `content`, else `main`, else `article`, else the
/// whole document.
pub fn content_root(root: &DocumentNode) -> &DocumentNode {
    let probes: [&dyn Fn(&DocumentNode) -> bool; 3] = [
        &|n| n.tag == "div" && n.class_contains("content"),
        &|n| n.tag == "main",
        &|n| n.tag == "article",
    ];
    probes
        .iter()
        .find_map(|probe| root.find_first(*probe))
        .unwrap_or(root)
}

/// Drop scripts, styles and decorative bordered images.
pub fn clean(node: &DocumentNode) -> DocumentNode {
    node.without(&|n| {
        matches!(n.tag.as_str(), "script" | "style") || (n.tag == "img" && n.has_attr("border"))
    })
}

pub fn metadata(root: &DocumentNode) -> PageMetadata {
    let mut meta = PageMetadata::default();
    if let Some(title) = root.descendants_by_tag("title").first() {
        meta.title = collapse(&title.text_content());
    }
    for tag in root.descendants_by_tag("meta") {
        let content = tag.attr_or_empty("content").trim().to_string();
        match (tag.attr("name"), tag.attr("property")) {
            (Some("description"), _) => meta.description = content,
            (Some("keywords"), _) => meta.keywords = content,
            (_, Some(prop)) if prop.starts_with("og:") => {
                meta.og.insert(prop["og:".len()..].to_string(), content);
            }
            _ => {}
        }
    }
    if meta.title.is_empty() {
        meta.title = meta
            .og
            .get("title")
            .cloned()
            .or_else(|| root.descendants_by_tag("h1").first().map(|h| collapse(&h.text_content())))
            .unwrap_or_default();
    }
    meta
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_div_wins() {
        let html = r#"<main><p>outer</p></main><div class="page-content"><p>inner</p></div>"#;
        let page = extract(html);
        assert_eq!(page.content.tag, "div");
        assert_eq!(page.content.text_content(), "inner");
    }

    #[test]
    fn falls_back_to_main_then_article_then_document() {
        assert_eq!(extract("<article>a</article><main>m</main>").content.tag, "main");
        assert_eq!(extract("<div><article>a</article></div>").content.tag, "article");
        assert_eq!(extract("<p>bare</p>").content.tag, "html");
    }

    #[test]
    fn bordered_images_and_scripts_are_removed() {
        let html = r#"<main><img src="spacer.gif" border="0"><img src="a.jpg"><script>x()</script></main>"#;
        let page = extract(html);
        let imgs = page.content.descendants_by_tag("img");
        assert_eq!(imgs.len(), 1);
        assert_eq!(imgs[0].attr("src"), Some("a.jpg"));
        assert!(page.content.descendants_by_tag("script").is_empty());
    }

    #[test]
    fn reads_metadata() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let meta = extract(&html).metadata;
        assert_eq!(meta.title, "Spitfire Heritage Museum");
        assert_eq!(meta.description, "Restored aircraft from the 1940s");
        assert_eq!(meta.keywords, "aviation, history, museum");
        assert_eq!(meta.og.get("image").map(String::as_str), Some("https://example.org/og.jpg"));
    }

    #[test]
    fn title_falls_back_to_heading() {
        let meta = extract("<h1> Hangar   Tour </h1>").metadata;
        assert_eq!(meta.title, "Hangar Tour");
    }
}
