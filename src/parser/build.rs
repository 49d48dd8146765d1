use super::blocks::{Align, BlockKind, BlockRecord, ImageRef};
use super::classify::BlockHint;
use super::dom::DocumentNode;

/// Gallery column count by image count. Anything past the last row gets
/// `GALLERY_MAX_COLUMNS`.
const GALLERY_COLUMNS: &[(usize, u32)] = &[
    (0, 0),
    (1, 1),
    (2, 2),
    (3, 3),
    (4, 3),
    (5, 3),
    (6, 3),
];
const GALLERY_MAX_COLUMNS: u32 = 4;

/// Where a node sits in its parent, for lookups that need siblings or the
/// nearest enclosing `<figure>`.
#[derive(Debug, Clone, Copy)]
pub struct Position<'a> {
    pub parent: Option<&'a DocumentNode>,
    pub index: usize,
    pub figure: Option<&'a DocumentNode>,
}

impl<'a> Position<'a> {
    pub fn root() -> Self {
        Position {
            parent: None,
            index: 0,
            figure: None,
        }
    }

    pub fn child_of(parent: &'a DocumentNode, index: usize) -> Self {
        Position::root().child(parent, index)
    }

    /// Position of child `index` of `parent`, where `self` is the position
    /// of `parent`.
    pub fn child(self, parent: &'a DocumentNode, index: usize) -> Self {
        Position {
            parent: Some(parent),
            index,
            figure: if parent.tag == "figure" { Some(parent) } else { self.figure },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionSource {
    /// `<figcaption>` inside the enclosing `<figure>`.
    Figcaption(String),
    /// Following sibling element whose class contains "caption"; the index
    /// points into the parent's children.
    Sibling(usize, String),
    Title(String),
    None,
}

/// Turn a classified node into a block. Returns `None` for hints that do not
/// produce a block on their own (skipped nodes, blank inline content).
pub fn build<'a>(node: &'a DocumentNode, hint: BlockHint, pos: Position<'a>) -> Option<BlockRecord> {
    let align = alignment(node);

    let kind = match hint {
        BlockHint::Heading(level) => BlockKind::Heading {
            level,
            content: flat_text(node),
        },
        BlockHint::Paragraph => BlockKind::Paragraph {
            content: node.inner_html().trim().to_string(),
        },
        BlockHint::Image => {
            let caption = match caption_source(node, pos) {
                CaptionSource::Figcaption(text)
                | CaptionSource::Sibling(_, text)
                | CaptionSource::Title(text) => text,
                CaptionSource::None => String::new(),
            };
            BlockKind::Image {
                url: node.attr_or_empty("src").to_string(),
                alt: node.attr_or_empty("alt").to_string(),
                caption,
            }
        }
        BlockHint::List { ordered } => BlockKind::List {
            ordered,
            items: node
                .element_children()
                .filter(|c| c.tag == "li")
                .map(flat_text)
                .collect(),
        },
        BlockHint::Table => {
            let (head, body) = table_rows(node);
            BlockKind::Table { head, body }
        }
        BlockHint::Quote => BlockKind::Quote {
            text: flat_text(node),
            citation: node.attr_or_empty("cite").to_string(),
        },
        BlockHint::Gallery => {
            let images: Vec<ImageRef> = node
                .descendants_by_tag("img")
                .into_iter()
                .map(|img| ImageRef {
                    url: img.attr_or_empty("src").to_string(),
                    alt: img.attr_or_empty("alt").to_string(),
                    caption: img.attr_or_empty("title").to_string(),
                })
                .collect();
            let columns = gallery_columns(images.len());
            BlockKind::Gallery { images, columns }
        }
        BlockHint::Columns => {
            let children = node
                .children
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_element())
                .map(|(i, c)| super::walk_node(c, pos.child(node, i)))
                .collect();
            return Some(BlockRecord::new(
                BlockKind::Columns { children },
                align,
                String::new(),
            ));
        }
        BlockHint::Group | BlockHint::Descend => {
            return Some(BlockRecord::new(
                BlockKind::Group {
                    children: super::walk_children(node, pos),
                },
                align,
                String::new(),
            ));
        }
        BlockHint::Inline => return inline_paragraph(&[node]),
        BlockHint::Skip => return None,
    };

    Some(BlockRecord::new(kind, align, node.outer_html()))
}

/// Paragraph for a run of text and phrasing nodes; `None` when the run holds
/// no visible text.
pub fn inline_paragraph(run: &[&DocumentNode]) -> Option<BlockRecord> {
    let has_text = run.iter().any(|n| !n.text_content().trim().is_empty());
    if !has_text {
        return None;
    }
    let content = run
        .iter()
        .map(|n| n.outer_html())
        .collect::<String>()
        .trim()
        .to_string();
    let raw = format!("<p>{}</p>", content);
    Some(BlockRecord::new(
        BlockKind::Paragraph { content },
        Align::Left,
        raw,
    ))
}

pub fn gallery_columns(count: usize) -> u32 {
    GALLERY_COLUMNS
        .iter()
        .find(|(n, _)| *n == count)
        .map(|(_, cols)| *cols)
        .unwrap_or(GALLERY_MAX_COLUMNS)
}

/// Alignment from inline `text-align` or a class fragment; center is checked
/// before right, left is the default.
pub fn alignment(node: &DocumentNode) -> Align {
    let style: String = node
        .attr_or_empty("style")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    let class = node.class();

    if style.contains("text-align:center") || class.contains("center") {
        Align::Center
    } else if style.contains("text-align:right") || class.contains("right") {
        Align::Right
    } else {
        Align::Left
    }
}

/// Caption lookup for an image, most specific source first.
pub fn caption_source(img: &DocumentNode, pos: Position<'_>) -> CaptionSource {
    if let Some(figure) = pos.figure {
        if let Some(fc) = figure.descendants_by_tag("figcaption").first() {
            let text = flat_text(fc);
            if !text.is_empty() {
                return CaptionSource::Figcaption(text);
            }
        }
    }

    if let Some(parent) = pos.parent {
        let next = parent
            .children
            .iter()
            .enumerate()
            .skip(pos.index + 1)
            .find(|(_, c)| !c.is_blank_text());
        if let Some((i, sibling)) = next {
            if sibling.is_element() && sibling.class().to_ascii_lowercase().contains("caption") {
                let text = flat_text(sibling);
                if !text.is_empty() {
                    return CaptionSource::Sibling(i, text);
                }
            }
        }
    }

    match img.attr("title") {
        Some(title) if !title.is_empty() => CaptionSource::Title(title.to_string()),
        _ => CaptionSource::None,
    }
}

/// Rows under `<thead>` form the head; every other row (tbody, tfoot, bare
/// rows) is body.
fn table_rows(table: &DocumentNode) -> (Vec<Vec<String>>, Vec<Vec<String>>) {
    let mut head = Vec::new();
    let mut body = Vec::new();

    for section in table.element_children() {
        match section.tag.as_str() {
            "thead" => head.extend(rows_of(section)),
            "tbody" | "tfoot" => body.extend(rows_of(section)),
            "tr" => body.push(cells_of(section)),
            _ => {}
        }
    }
    (head, body)
}

fn rows_of(section: &DocumentNode) -> Vec<Vec<String>> {
    section
        .element_children()
        .filter(|r| r.tag == "tr")
        .map(cells_of)
        .collect()
}

fn cells_of(row: &DocumentNode) -> Vec<String> {
    row.element_children().map(flat_text).collect()
}

/// Text content with whitespace runs collapsed.
fn flat_text(node: &DocumentNode) -> String {
    node.text_content()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
