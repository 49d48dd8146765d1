use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::blocks::{Align, BlockKind, BlockRecord};
use super::dom::{escape_attribute, escape_html};
use crate::error::{ConvertError, ConvertResult};

static DELIMITER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- (/?)block:([a-z]+)(?: (\{[^\n]*?\}))? -->").unwrap());

const BLOCK_SEPARATOR: &str = "\n\n\n";
const COLUMN_NAME: &str = "column";

// ── Writing ──

/// Render blocks as tagged-comment markup, two blank lines between
/// top-level blocks. Group blocks are flattened into the sequence.
pub fn serialize(blocks: &[BlockRecord]) -> String {
    flatten(blocks)
        .into_iter()
        .map(serialize_block)
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

fn flatten(blocks: &[BlockRecord]) -> Vec<&BlockRecord> {
    let mut out = Vec::with_capacity(blocks.len());
    for block in blocks {
        match &block.kind {
            BlockKind::Group { children } => out.extend(flatten(children)),
            _ => out.push(block),
        }
    }
    out
}

pub fn serialize_block(block: &BlockRecord) -> String {
    let name = block.kind.name();
    let open = format!("<!-- block:{} {} -->", name, attrs_json(block));
    let close = format!("<!-- /block:{} -->", name);

    if let BlockKind::Columns { children } = &block.kind {
        let mut parts = vec![open];
        for column in children {
            parts.push(format!("<!-- block:{} -->", COLUMN_NAME));
            let inner = flatten(column)
                .into_iter()
                .map(serialize_block)
                .collect::<Vec<_>>()
                .join("\n\n");
            if !inner.is_empty() {
                parts.push(inner);
            }
            parts.push(format!("<!-- /block:{} -->", COLUMN_NAME));
        }
        parts.push(close);
        return parts.join("\n");
    }

    let inner = if block.raw.is_empty() {
        reconstruct(&block.kind)
    } else {
        block.raw.clone()
    };
    format!("{}\n{}\n{}", open, neutralize_delimiters(&inner), close)
}

/// Block content must never contain text the reader would take for a
/// delimiter, e.g. from a script body inside the source fragment.
fn neutralize_delimiters(inner: &str) -> String {
    if !DELIMITER_RE.is_match(inner) {
        return inner.to_string();
    }
    DELIMITER_RE
        .replace_all(inner, |caps: &regex::Captures<'_>| format!("&lt;{}", &caps[0][1..]))
        .into_owned()
}

/// Attribute JSON with keys in alphabetical order. Characters that could end
/// or confuse the surrounding comment are written as \u escapes.
pub fn attrs_json(block: &BlockRecord) -> String {
    let mut attrs: BTreeMap<String, Value> = match serde_json::to_value(&block.kind) {
        Ok(Value::Object(map)) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    };
    attrs.remove("kind");
    attrs.insert(
        "align".to_string(),
        serde_json::to_value(block.align).unwrap_or(Value::Null),
    );

    serde_json::to_string(&attrs)
        .unwrap_or_else(|_| "{}".to_string())
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace("--", "\\u002d\\u002d")
}

/// Inner HTML for blocks that carry no source fragment.
fn reconstruct(kind: &BlockKind) -> String {
    match kind {
        BlockKind::Heading { level, content } => {
            format!("<h{0}>{1}</h{0}>", level, escape_html(content))
        }
        BlockKind::Paragraph { content } => format!("<p>{}</p>", content),
        BlockKind::Image { url, alt, caption } => {
            let mut html = format!(
                r#"<figure class="wp-block-image"><img src="{}" alt="{}">"#,
                escape_attribute(url),
                escape_attribute(alt)
            );
            if !caption.is_empty() {
                html.push_str(&format!("<figcaption>{}</figcaption>", escape_html(caption)));
            }
            html.push_str("</figure>");
            html
        }
        BlockKind::Gallery { images, columns } => {
            let items: String = images
                .iter()
                .map(|i| {
                    format!(
                        r#"<figure class="wp-block-image"><img src="{}" alt="{}"></figure>"#,
                        escape_attribute(&i.url),
                        escape_attribute(&i.alt)
                    )
                })
                .collect();
            format!(
                r#"<figure class="wp-block-gallery columns-{}">{}</figure>"#,
                columns, items
            )
        }
        BlockKind::List { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            let lis: String = items
                .iter()
                .map(|i| format!("<li>{}</li>", escape_html(i)))
                .collect();
            format!("<{0}>{1}</{0}>", tag, lis)
        }
        BlockKind::Table { head, body } => {
            let rows = |rows: &[Vec<String>], cell: &str| -> String {
                rows.iter()
                    .map(|r| {
                        let cells: String = r
                            .iter()
                            .map(|c| format!("<{0}>{1}</{0}>", cell, escape_html(c)))
                            .collect();
                        format!("<tr>{}</tr>", cells)
                    })
                    .collect()
            };
            let mut html = String::from(r#"<figure class="wp-block-table"><table>"#);
            if !head.is_empty() {
                html.push_str(&format!("<thead>{}</thead>", rows(head, "th")));
            }
            html.push_str(&format!("<tbody>{}</tbody></table></figure>", rows(body, "td")));
            html
        }
        BlockKind::Quote { text, citation } => {
            let mut html = format!(r#"<blockquote class="wp-block-quote"><p>{}</p>"#, escape_html(text));
            if !citation.is_empty() {
                html.push_str(&format!("<cite>{}</cite>", escape_html(citation)));
            }
            html.push_str("</blockquote>");
            html
        }
        BlockKind::Columns { .. } | BlockKind::Group { .. } => String::new(),
    }
}

// ── Reading ──

struct Frame {
    name: String,
    attrs: Option<String>,
    open_at: usize,
    content_start: usize,
    blocks: Vec<BlockRecord>,
    columns: Vec<Vec<BlockRecord>>,
}

/// Read tagged-comment markup back into blocks. Text outside block comments
/// is ignored.
pub fn parse_markup(markup: &str) -> ConvertResult<Vec<BlockRecord>> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut top = Vec::new();

    for caps in DELIMITER_RE.captures_iter(markup) {
        let Some(whole) = caps.get(0) else { continue };
        let closing = &caps[1] == "/";
        let name = caps[2].to_string();

        if !closing {
            stack.push(Frame {
                name,
                attrs: caps.get(3).map(|m| m.as_str().to_string()),
                open_at: whole.start(),
                content_start: whole.end(),
                blocks: Vec::new(),
                columns: Vec::new(),
            });
            continue;
        }

        let frame = stack
            .pop()
            .ok_or_else(|| ConvertError::markup(whole.start(), format!("unexpected close of '{}'", name)))?;
        if frame.name != name {
            return Err(ConvertError::markup(
                whole.start(),
                format!("'{}' closed while '{}' is open", name, frame.name),
            ));
        }
        let in_columns = stack.last().is_some_and(|f| f.name == "columns");

        if name == COLUMN_NAME {
            match stack.last_mut() {
                Some(parent) if parent.name == "columns" => parent.columns.push(frame.blocks),
                _ => return Err(ConvertError::markup(frame.open_at, "column outside columns")),
            }
            continue;
        }
        if in_columns {
            return Err(ConvertError::markup(frame.open_at, "block directly inside columns"));
        }

        let inner = &markup[frame.content_start..whole.start()];
        let block = decode_block(frame, inner)?;
        match stack.last_mut() {
            Some(parent) => parent.blocks.push(block),
            None => top.push(block),
        }
    }

    if let Some(open) = stack.last() {
        return Err(ConvertError::markup(open.open_at, format!("'{}' is never closed", open.name)));
    }
    Ok(top)
}

fn decode_block(frame: Frame, inner: &str) -> ConvertResult<BlockRecord> {
    let mut attrs = match frame.attrs.as_deref() {
        Some(json) => match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(map)) => map,
            Ok(_) => return Err(ConvertError::markup(frame.open_at, "attributes are not an object")),
            Err(e) => return Err(ConvertError::markup(frame.open_at, e.to_string())),
        },
        None => Map::new(),
    };

    let align = match attrs.remove("align") {
        Some(v) => serde_json::from_value::<Align>(v)
            .map_err(|e| ConvertError::markup(frame.open_at, e.to_string()))?,
        None => Align::default(),
    };

    if frame.name == "columns" {
        return Ok(BlockRecord::new(
            BlockKind::Columns {
                children: frame.columns,
            },
            align,
            String::new(),
        ));
    }

    attrs.insert("kind".to_string(), Value::String(frame.name.clone()));
    let kind = serde_json::from_value::<BlockKind>(Value::Object(attrs))
        .map_err(|e| ConvertError::markup(frame.open_at, format!("block '{}': {}", frame.name, e)))?;

    let raw = inner.strip_prefix('\n').unwrap_or(inner);
    let raw = raw.strip_suffix('\n').unwrap_or(raw);
    Ok(BlockRecord::new(kind, align, raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::blocks::ImageRef;
    use crate::parser::convert_html;

    fn heading(level: u8, text: &str) -> BlockRecord {
        BlockRecord::new(
            BlockKind::Heading { level, content: text.into() },
            Align::Left,
            format!("<h{0}>{1}</h{0}>", level, text),
        )
    }

    #[test]
    fn heading_block_format() {
        let out = serialize(&[heading(3, "Text")]);
        assert_eq!(
            out,
            "<!-- block:heading {\"align\":\"left\",\"content\":\"Text\",\"level\":3} -->\n<h3>Text</h3>\n<!-- /block:heading -->"
        );
        assert!(out.contains("\"level\":3"));
    }

    #[test]
    fn two_blank_lines_between_blocks() {
        let out = serialize(&[heading(1, "A"), heading(2, "B")]);
        assert!(out.contains("<!-- /block:heading -->\n\n\n<!-- block:heading"));
    }

    #[test]
    fn attribute_keys_sorted() {
        let block = BlockRecord::new(
            BlockKind::Image { url: "u".into(), alt: "a".into(), caption: "c".into() },
            Align::Center,
            String::new(),
        );
        assert_eq!(
            attrs_json(&block),
            r#"{"align":"center","alt":"a","caption":"c","url":"u"}"#
        );
    }

    #[test]
    fn comment_breaking_characters_are_escaped() {
        let block = BlockRecord::new(
            BlockKind::Paragraph { content: "a --> <b>b</b> & c".into() },
            Align::Left,
            String::new(),
        );
        let json = attrs_json(&block);
        assert!(!json.contains("-->"));
        assert!(!json.contains('<'));
        let parsed = parse_markup(&serialize(&[block.clone()])).unwrap();
        assert_eq!(parsed[0].kind, block.kind);
    }

    #[test]
    fn groups_are_flattened() {
        let group = BlockRecord::new(
            BlockKind::Group { children: vec![heading(1, "A"), heading(2, "B")] },
            Align::Left,
            String::new(),
        );
        let out = serialize(&[group]);
        assert!(!out.contains("block:group"));
        assert_eq!(out.matches("<!-- block:heading").count(), 2);
    }

    #[test]
    fn columns_round_trip() {
        let columns = BlockRecord::new(
            BlockKind::Columns {
                children: vec![vec![heading(2, "Left")], vec![heading(2, "Right"), heading(3, "More")]],
            },
            Align::Left,
            String::new(),
        );
        let out = serialize(&[columns.clone()]);
        assert_eq!(out.matches("<!-- block:column -->").count(), 2);
        assert_eq!(parse_markup(&out).unwrap(), vec![columns]);
    }

    #[test]
    fn converted_document_round_trips() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let blocks = convert_html(&html);
        let markup = serialize(&blocks);
        let reread = parse_markup(&markup).unwrap();
        assert_eq!(serialize(&reread), markup);
    }

    #[test]
    fn delimiter_text_in_attributes_round_trips() {
        let markup = crate::parser::convert_to_markup(r#"<p title="<!-- /block:paragraph -->">hello</p>"#);
        let blocks = parse_markup(&markup).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Paragraph { content: "hello".into() });
        assert_eq!(serialize(&blocks), markup);
    }

    #[test]
    fn delimiter_text_in_raw_fragment_is_neutralized() {
        let block = BlockRecord::new(
            BlockKind::Paragraph { content: "x".into() },
            Align::Left,
            "<p>x<script>var s = '<!-- /block:paragraph -->';</script></p>".into(),
        );
        let out = serialize(&[block]);
        assert!(out.contains("&lt;!-- /block:paragraph -->';"));
        let reread = parse_markup(&out).unwrap();
        assert_eq!(reread.len(), 1);
        assert_eq!(serialize(&reread), out);
    }

    #[test]
    fn reconstructs_inner_html_when_raw_missing() {
        let gallery = BlockRecord::new(
            BlockKind::Gallery {
                images: vec![ImageRef { url: "a.jpg".into(), alt: "A".into(), caption: String::new() }],
                columns: 1,
            },
            Align::Left,
            String::new(),
        );
        let out = serialize(&[gallery]);
        assert!(out.contains(r#"<figure class="wp-block-gallery columns-1"><figure class="wp-block-image"><img src="a.jpg" alt="A"></figure></figure>"#));
    }

    #[test]
    fn rejects_unbalanced_markup() {
        assert!(parse_markup("<!-- block:heading {\"level\":1,\"content\":\"x\"} -->").is_err());
        assert!(parse_markup("<!-- /block:heading -->").is_err());
        assert!(parse_markup("<!-- block:quote {\"text\":\"x\",\"citation\":\"\"} -->\n<!-- /block:list -->").is_err());
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = parse_markup("<!-- block:video {} -->\nx\n<!-- /block:video -->").unwrap_err();
        assert!(matches!(err, ConvertError::Markup { .. }));
    }

    #[test]
    fn empty_input() {
        assert_eq!(serialize(&[]), "");
        assert!(parse_markup("").unwrap().is_empty());
    }
}
