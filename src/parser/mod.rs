pub mod blocks;
pub mod build;
pub mod classify;
pub mod dom;
pub mod serialize;

use tracing::{debug, trace};

use crate::error::ConvertResult;
use blocks::{BlockKind, BlockRecord};
use build::{CaptionSource, Position};
use classify::BlockHint;
use dom::DocumentNode;

/// Four-stage pipeline: html → tree → classified nodes → blocks → markup.
pub fn convert_to_markup(html: &str) -> String {
    serialize::serialize(&convert_html(html))
}

/// Parse and convert a document into blocks in document order.
pub fn convert_html(html: &str) -> Vec<BlockRecord> {
    let root = dom::parse(html);
    let blocks = convert_tree(&root);
    debug!(blocks = blocks.len(), "converted document");
    blocks
}

/// Byte input; fails only when the bytes cannot be decoded.
pub fn convert_bytes(bytes: &[u8]) -> ConvertResult<Vec<BlockRecord>> {
    let root = dom::parse_bytes(bytes)?;
    Ok(convert_tree(&root))
}

pub fn convert_tree(root: &DocumentNode) -> Vec<BlockRecord> {
    walk_node(root, Position::root())
}

/// Blocks for a subtree rooted at `node`, the node itself included.
pub(crate) fn walk_node<'a>(node: &'a DocumentNode, pos: Position<'a>) -> Vec<BlockRecord> {
    let mut out = Vec::new();
    emit(node, classify::classify(node), pos, &mut out);
    out
}

/// Blocks for the children of `node`. Consecutive inline children are
/// folded into one paragraph.
pub(crate) fn walk_children<'a>(node: &'a DocumentNode, pos: Position<'a>) -> Vec<BlockRecord> {
    let mut out = Vec::new();
    let mut run: Vec<&DocumentNode> = Vec::new();
    let mut consumed: Option<usize> = None;

    for (i, child) in node.children.iter().enumerate() {
        if consumed == Some(i) {
            continue;
        }

        let hint = classify::classify(child);
        match hint {
            BlockHint::Inline => {
                run.push(child);
                continue;
            }
            // whitespace between inline siblings stays part of the run
            BlockHint::Skip if child.is_blank_text() => {
                if !run.is_empty() {
                    run.push(child);
                }
                continue;
            }
            _ => {}
        }

        flush_run(&mut run, &mut out);
        let pos = pos.child(node, i);
        if hint == BlockHint::Image {
            if let CaptionSource::Sibling(idx, _) = build::caption_source(child, pos) {
                consumed = Some(idx);
            }
        }
        emit(child, hint, pos, &mut out);
    }
    flush_run(&mut run, &mut out);
    out
}

fn flush_run(run: &mut Vec<&DocumentNode>, out: &mut Vec<BlockRecord>) {
    if run.is_empty() {
        return;
    }
    if let Some(block) = build::inline_paragraph(run) {
        out.push(block);
    }
    run.clear();
}

fn emit<'a>(node: &'a DocumentNode, hint: BlockHint, pos: Position<'a>, out: &mut Vec<BlockRecord>) {
    match build::build(node, hint, pos) {
        Some(BlockRecord {
            kind: BlockKind::Group { children },
            ..
        }) => out.extend(children),
        Some(block) => out.push(block),
        None => trace!(tag = %node.tag, "skipped node"),
    }
}

#[cfg(test)]
mod tests {
    use super::blocks::Align;
    use super::*;

    #[test]
    fn end_to_end_scenario() {
        let html = r#"<div class="content"><h1>Title</h1><p>Hello <b>world</b></p><img src="a.jpg" alt="A"></div>"#;
        let blocks = convert_html(html);
        let kinds: Vec<_> = blocks.iter().map(|b| b.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Heading { level: 1, content: "Title".into() },
                BlockKind::Paragraph { content: "Hello <b>world</b>".into() },
                BlockKind::Image { url: "a.jpg".into(), alt: "A".into(), caption: String::new() },
            ]
        );
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(convert_html("").is_empty());
        assert_eq!(convert_to_markup(""), "");
    }

    #[test]
    fn whitespace_only_input_yields_nothing() {
        assert!(convert_html("  \n\t ").is_empty());
        assert!(convert_html("<div>   </div><section>\n</section>").is_empty());
    }

    #[test]
    fn order_is_preserved_across_nesting() {
        let html = "<h2>one</h2><section><p>two</p><div><blockquote>three</blockquote></div></section><ul><li>four</li></ul>";
        let names: Vec<_> = convert_html(html).iter().map(|b| b.kind.name()).collect();
        assert_eq!(names, vec!["heading", "paragraph", "quote", "list"]);
    }

    #[test]
    fn conversion_is_deterministic() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        assert_eq!(convert_to_markup(&html), convert_to_markup(&html));
    }

    #[test]
    fn gallery_div_is_not_columns() {
        let html = r#"<div class="gallery columns"><img src="1.jpg"><img src="2.jpg"></div>"#;
        let blocks = convert_html(html);
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0].kind, BlockKind::Gallery { columns: 2, .. }));
    }

    #[test]
    fn columns_recurse_per_child() {
        let html = r#"<div class="row"><div class="col"><h2>Left</h2><p>a</p></div><div class="col"><img src="r.jpg"></div></div>"#;
        let blocks = convert_html(html);
        assert_eq!(blocks.len(), 1);
        match &blocks[0].kind {
            BlockKind::Columns { children } => {
                assert_eq!(children.len(), 2);
                assert_eq!(children[0].len(), 2);
                assert!(matches!(&children[1][0].kind, BlockKind::Image { url, .. } if url == "r.jpg"));
            }
            other => panic!("expected columns, got {:?}", other),
        }
    }

    #[test]
    fn stray_text_becomes_paragraph() {
        let blocks = convert_html("<div>Loose <em>text</em> here<p>Real</p></div>");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Paragraph { content: "Loose <em>text</em> here".into() });
        assert_eq!(blocks[0].align, Align::Left);
    }

    #[test]
    fn figure_caption_is_not_repeated() {
        let html = r#"<figure><img src="a.jpg"><figcaption>Cap</figcaption></figure>"#;
        let blocks = convert_html(html);
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0].kind, BlockKind::Image { caption, .. } if caption == "Cap"));
    }

    #[test]
    fn sibling_caption_is_consumed() {
        let html = r#"<div><img src="a.jpg"><p class="caption">Under the image</p><p>Body</p></div>"#;
        let blocks = convert_html(html);
        assert_eq!(blocks.len(), 2);
        assert!(matches!(&blocks[0].kind, BlockKind::Image { caption, .. } if caption == "Under the image"));
        assert_eq!(blocks[1].kind, BlockKind::Paragraph { content: "Body".into() });
    }

    #[test]
    fn malformed_html_still_converts() {
        let blocks = convert_html("<p>one<p>two<ul><li>x</ul></div></span><h2>end");
        let names: Vec<_> = blocks.iter().map(|b| b.kind.name()).collect();
        assert_eq!(names, vec!["paragraph", "paragraph", "list", "heading"]);
    }

    #[test]
    fn invalid_bytes_fail() {
        assert!(convert_bytes(b"<p>\xff</p>").is_err());
        assert_eq!(convert_bytes(b"<p>ok</p>").unwrap().len(), 1);
    }

    #[test]
    fn fixture_has_expected_shape() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let blocks = convert_html(&html);
        let names: Vec<_> = blocks.iter().map(|b| b.kind.name()).collect();
        assert_eq!(
            names,
            vec!["heading", "paragraph", "image", "gallery", "columns", "table", "quote", "list"]
        );
    }

    #[test]
    fn deeply_nested_inline_markup_converts_quickly() {
        let depth = 40;
        let html = format!(
            "<div><em>{}deep text{}</em><p>after</p></div>",
            "<span>".repeat(depth),
            "</span>".repeat(depth)
        );
        let start = std::time::Instant::now();
        let blocks = convert_html(&html);
        assert!(start.elapsed() < std::time::Duration::from_secs(2));
        let names: Vec<_> = blocks.iter().map(|b| b.kind.name()).collect();
        assert_eq!(names, vec!["paragraph", "paragraph"]);
        assert!(matches!(&blocks[0].kind, BlockKind::Paragraph { content } if content.contains("deep text")));
    }

    #[test]
    fn figure_caption_reaches_linked_image() {
        let html = r#"<figure class="wp-block-image"><a href="big.jpg"><img src="a.jpg" alt="A" title="t"></a><figcaption>Caption</figcaption></figure>"#;
        let blocks = convert_html(html);
        assert_eq!(blocks.len(), 1);
        assert!(matches!(&blocks[0].kind, BlockKind::Image { caption, .. } if caption == "Caption"));
    }
}
