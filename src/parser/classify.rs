use super::dom::DocumentNode;

/// What a node should turn into. Decided from the tag name first, then (for
/// `div` only) from class substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHint {
    Heading(u8),
    Paragraph,
    Image,
    List { ordered: bool },
    Table,
    Quote,
    Gallery,
    Columns,
    /// Plain `div`: a container whose children are walked.
    Group,
    /// Any other element: no block of its own, children are walked.
    Descend,
    /// Text or phrasing element that belongs to a paragraph run.
    Inline,
    Skip,
}

/// Class fragments that turn a `div` into a column layout, checked only
/// after the gallery test has failed.
const COLUMN_MARKERS: &[&str] = &["video", "columns", "row", "grid"];

/// Elements whose subtree never produces content blocks.
const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "svg", "iframe", "form", "nav",
    "button", "input", "select", "textarea", "figcaption", "link", "meta", "title",
];

/// Phrasing elements that can be folded into a paragraph run.
const INLINE_TAGS: &[&str] = &[
    "a", "b", "strong", "i", "em", "span", "u", "small", "code", "br", "sup", "sub", "mark",
    "abbr", "s", "q", "time", "label",
];

pub fn classify(node: &DocumentNode) -> BlockHint {
    if node.is_text() {
        return if node.is_blank_text() {
            BlockHint::Skip
        } else {
            BlockHint::Inline
        };
    }

    match node.tag.as_str() {
        "h1" => BlockHint::Heading(1),
        "h2" => BlockHint::Heading(2),
        "h3" => BlockHint::Heading(3),
        "h4" => BlockHint::Heading(4),
        "h5" => BlockHint::Heading(5),
        "h6" => BlockHint::Heading(6),
        "p" => BlockHint::Paragraph,
        "img" => BlockHint::Image,
        "ul" => BlockHint::List { ordered: false },
        "ol" => BlockHint::List { ordered: true },
        "table" => BlockHint::Table,
        "blockquote" => BlockHint::Quote,
        "div" => classify_div(node),
        tag if SKIPPED_TAGS.contains(&tag) => BlockHint::Skip,
        tag if INLINE_TAGS.contains(&tag) && !contains_block_content(node) => BlockHint::Inline,
        _ if node.children.is_empty() => BlockHint::Skip,
        _ => BlockHint::Descend,
    }
}

/// First match wins: a div classed both "gallery" and "columns" is a gallery.
fn classify_div(node: &DocumentNode) -> BlockHint {
    let class = node.class();
    if class.contains("gallery") {
        BlockHint::Gallery
    } else if COLUMN_MARKERS.iter().any(|m| class.contains(m)) {
        BlockHint::Columns
    } else {
        BlockHint::Group
    }
}

/// Tags that always produce a block of their own (`div` becomes a gallery,
/// columns or a group).
const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "img", "ul", "ol", "table", "blockquote", "div",
];

/// True when any descendant would classify as its own block. Each node is
/// visited once.
fn contains_block_content(node: &DocumentNode) -> bool {
    node.children.iter().any(|child| {
        child.is_element()
            && (BLOCK_TAGS.contains(&child.tag.as_str()) || contains_block_content(child))
    })
}
