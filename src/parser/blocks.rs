use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::dom::{escape_attribute, unescape_attribute};

static SRC_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\s(src|srcset)\s*=\s*)(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub alt: String,
    pub caption: String,
}

/// Block payload. The serialized name of each variant is its tag in the
/// block markup, and the remaining fields become the attribute JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BlockKind {
    Heading {
        level: u8,
        content: String,
    },
    Paragraph {
        content: String,
    },
    Image {
        url: String,
        alt: String,
        caption: String,
    },
    Gallery {
        images: Vec<ImageRef>,
        columns: u32,
    },
    List {
        ordered: bool,
        items: Vec<String>,
    },
    Table {
        head: Vec<Vec<String>>,
        body: Vec<Vec<String>>,
    },
    Quote {
        text: String,
        citation: String,
    },
    /// Children live in the markup structure, not in the attribute JSON.
    Columns {
        #[serde(skip)]
        children: Vec<Vec<BlockRecord>>,
    },
    /// Transparent container; flattened into its parent's sequence.
    Group {
        #[serde(skip)]
        children: Vec<BlockRecord>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRecord {
    pub kind: BlockKind,
    pub align: Align,
    /// Source fragment (outer HTML) the block was built from.
    pub raw: String,
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Heading { .. } => "heading",
            BlockKind::Paragraph { .. } => "paragraph",
            BlockKind::Image { .. } => "image",
            BlockKind::Gallery { .. } => "gallery",
            BlockKind::List { .. } => "list",
            BlockKind::Table { .. } => "table",
            BlockKind::Quote { .. } => "quote",
            BlockKind::Columns { .. } => "columns",
            BlockKind::Group { .. } => "group",
        }
    }
}

impl BlockRecord {
    pub fn new(kind: BlockKind, align: Align, raw: String) -> Self {
        BlockRecord { kind, align, raw }
    }

    /// Image URLs in document order, descending into galleries and columns.
    pub fn image_urls(&self) -> Vec<&str> {
        let mut urls = Vec::new();
        self.push_image_urls(&mut urls);
        urls
    }

    fn push_image_urls<'a>(&'a self, urls: &mut Vec<&'a str>) {
        match &self.kind {
            BlockKind::Image { url, .. } => urls.push(url),
            BlockKind::Gallery { images, .. } => urls.extend(images.iter().map(|i| i.url.as_str())),
            BlockKind::Columns { children } => {
                for column in children {
                    for block in column {
                        block.push_image_urls(urls);
                    }
                }
            }
            BlockKind::Group { children } => {
                for block in children {
                    block.push_image_urls(urls);
                }
            }
            _ => {}
        }
    }

    /// Point image sources at new locations. URLs missing from `mapping` are
    /// left untouched. In the retained raw fragment only `src` and `srcset`
    /// attribute values are rewritten, each looked up once.
    pub fn rewrite_image_urls(&mut self, mapping: &HashMap<String, String>) {
        if !mapping.is_empty() && !self.raw.is_empty() {
            self.raw = rewrite_src_attributes(&self.raw, mapping);
        }
        let swap = |url: &mut String| {
            if let Some(to) = mapping.get(url.as_str()) {
                *url = to.clone();
            }
        };
        match &mut self.kind {
            BlockKind::Image { url, .. } => swap(url),
            BlockKind::Gallery { images, .. } => images.iter_mut().for_each(|i| swap(&mut i.url)),
            BlockKind::Columns { children } => {
                for block in children.iter_mut().flatten() {
                    block.rewrite_image_urls(mapping);
                }
            }
            BlockKind::Group { children } => {
                for block in children.iter_mut() {
                    block.rewrite_image_urls(mapping);
                }
            }
            _ => {}
        }
    }
}

fn rewrite_src_attributes(raw: &str, mapping: &HashMap<String, String>) -> String {
    SRC_ATTR_RE
        .replace_all(raw, |caps: &Captures<'_>| {
            let value = caps.get(3).or_else(|| caps.get(4)).map_or("", |m| m.as_str());
            let rewritten = if caps[2].eq_ignore_ascii_case("srcset") {
                rewrite_srcset(value, mapping)
            } else {
                mapping.get(&unescape_attribute(value)).map(|to| escape_attribute(to))
            };
            match rewritten {
                Some(v) => format!("{}\"{}\"", &caps[1], v),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// `url [descriptor], ...` with each mapped url swapped; `None` when no
/// candidate changed.
fn rewrite_srcset(value: &str, mapping: &HashMap<String, String>) -> Option<String> {
    let mut changed = false;
    let candidates: Vec<String> = unescape_attribute(value)
        .split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            let (url, descriptor) = candidate.split_once(char::is_whitespace).unwrap_or((candidate, ""));
            match mapping.get(url) {
                Some(to) => {
                    changed = true;
                    format!("{} {}", to, descriptor.trim()).trim_end().to_string()
                }
                None => candidate.to_string(),
            }
        })
        .collect();
    changed.then(|| escape_attribute(&candidates.join(", ")))
}

/// Every distinct image URL across `blocks`, first occurrence order.
pub fn collect_image_urls(blocks: &[BlockRecord]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    blocks
        .iter()
        .flat_map(|b| b.image_urls())
        .filter(|u| !u.is_empty() && seen.insert(*u))
        .map(str::to_string)
        .collect()
}
