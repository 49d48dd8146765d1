use scraper::{ElementRef, Html, Node};

use crate::error::{ConvertError, ConvertResult};

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// One node of a parsed document. Text nodes have an empty `tag` and carry
/// their content in `text`; elements keep attributes in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentNode {
    pub tag: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<DocumentNode>,
    pub text: String,
}

/// Parse a document leniently. Missing closing tags, stray end tags and bare
/// fragments are repaired the way browsers do (implicit html/head/body,
/// implied tbody). The returned root is the `<html>` element.
pub fn parse(html: &str) -> DocumentNode {
    let document = Html::parse_document(html);
    from_element(document.root_element())
}

/// Parse raw bytes. The only fatal condition is an undecodable byte stream.
pub fn parse_bytes(bytes: &[u8]) -> ConvertResult<DocumentNode> {
    let html = std::str::from_utf8(bytes).map_err(|e| ConvertError::Parse {
        offset: e.valid_up_to(),
    })?;
    Ok(parse(html))
}

fn from_element(element: ElementRef<'_>) -> DocumentNode {
    let value = element.value();
    let mut children = Vec::new();
    for child in element.children() {
        match child.value() {
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    children.push(from_element(el));
                }
            }
            Node::Text(text) => children.push(DocumentNode::text_node(text)),
            // comments, doctype and processing instructions carry no content
            _ => {}
        }
    }

    DocumentNode {
        tag: value.name().to_ascii_lowercase(),
        attrs: value
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        children,
        text: String::new(),
    }
}

impl DocumentNode {
    pub fn text_node(text: &str) -> Self {
        DocumentNode {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn is_text(&self) -> bool {
        self.tag.is_empty()
    }

    pub fn is_element(&self) -> bool {
        !self.tag.is_empty()
    }

    pub fn is_void(&self) -> bool {
        VOID_TAGS.contains(&self.tag.as_str())
    }

    /// Whitespace-only text node.
    pub fn is_blank_text(&self) -> bool {
        self.is_text() && self.text.trim().is_empty()
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value, or "" when absent.
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).unwrap_or("")
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn class(&self) -> &str {
        self.attr_or_empty("class")
    }

    /// Case-sensitive substring test on the raw class attribute.
    pub fn class_contains(&self, fragment: &str) -> bool {
        self.class().contains(fragment)
    }

    pub fn element_children(&self) -> impl Iterator<Item = &DocumentNode> {
        self.children.iter().filter(|c| c.is_element())
    }

    /// Concatenated text of every descendant text node, like DOM `textContent`.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        if self.is_text() {
            out.push_str(&self.text);
            return;
        }
        for child in &self.children {
            child.push_text(out);
        }
    }

    /// All descendant elements with `tag`, in document order (self excluded).
    pub fn descendants_by_tag(&self, tag: &str) -> Vec<&DocumentNode> {
        let mut found = Vec::new();
        for child in &self.children {
            child.collect_by_tag(tag, &mut found);
        }
        found
    }

    fn collect_by_tag<'a>(&'a self, tag: &str, found: &mut Vec<&'a DocumentNode>) {
        if self.tag == tag {
            found.push(self);
        }
        for child in &self.children {
            child.collect_by_tag(tag, found);
        }
    }

    /// Every descendant element in document order (self excluded).
    pub fn descendants(&self) -> Vec<&DocumentNode> {
        let mut found = Vec::new();
        for child in self.element_children() {
            child.collect_elements(&mut found);
        }
        found
    }

    fn collect_elements<'a>(&'a self, found: &mut Vec<&'a DocumentNode>) {
        found.push(self);
        for child in self.element_children() {
            child.collect_elements(found);
        }
    }

    /// Pre-order search including self.
    pub fn find_first(&self, pred: &dyn Fn(&DocumentNode) -> bool) -> Option<&DocumentNode> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_first(pred))
    }

    /// Copy of the subtree with every descendant matching `drop` removed.
    pub fn without(&self, drop: &dyn Fn(&DocumentNode) -> bool) -> DocumentNode {
        DocumentNode {
            tag: self.tag.clone(),
            attrs: self.attrs.clone(),
            text: self.text.clone(),
            children: self
                .children
                .iter()
                .filter(|c| !drop(c))
                .map(|c| c.without(drop))
                .collect(),
        }
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        let raw = RAW_TEXT_TAGS.contains(&self.tag.as_str());
        for child in &self.children {
            child.write_html(&mut out, raw);
        }
        out
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out, false);
        out
    }

    fn write_html(&self, out: &mut String, raw_text: bool) {
        if self.is_text() {
            if raw_text {
                out.push_str(&self.text);
            } else {
                escape_text(&self.text, out);
            }
            return;
        }

        out.push('<');
        out.push_str(&self.tag);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            escape_attr(v, out);
            out.push('"');
        }
        out.push('>');
        if self.is_void() {
            return;
        }
        out.push_str(&self.inner_html());
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }
}

/// Escape text for use as HTML character data.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_text(s, &mut out);
    out
}

/// Escape a value for a double-quoted HTML attribute.
pub fn escape_attribute(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    escape_attr(s, &mut out);
    out
}

/// Reverse of [`escape_attribute`].
pub fn unescape_attribute(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(root: &DocumentNode) -> &DocumentNode {
        root.element_children().find(|c| c.tag == "body").unwrap()
    }

    #[test]
    fn empty_input_has_skeleton() {
        let root = parse("");
        assert_eq!(root.tag, "html");
        assert!(body(&root).children.is_empty());
    }

    #[test]
    fn recovers_unclosed_tags() {
        let root = parse("<div><p>one<p>two</div>");
        let ps = root.descendants_by_tag("p");
        assert_eq!(ps.len(), 2);
        assert_eq!(ps[0].text_content(), "one");
        assert_eq!(ps[1].text_content(), "two");
    }

    #[test]
    fn inner_html_keeps_inline_markup() {
        let root = parse("<p>Hello <b>world</b> &amp; more</p>");
        let p = root.descendants_by_tag("p")[0];
        assert_eq!(p.inner_html(), "Hello <b>world</b> &amp; more");
    }

    #[test]
    fn void_elements_have_no_closing_tag() {
        let root = parse(r#"<img src="a.jpg" alt="A">"#);
        let img = root.descendants_by_tag("img")[0];
        assert_eq!(img.outer_html(), r#"<img src="a.jpg" alt="A">"#);
    }

    #[test]
    fn attribute_values_are_escaped() {
        let root = parse(r#"<p title="a <b> &amp; &quot;c&quot;">x</p>"#);
        let p = root.descendants_by_tag("p")[0];
        let html = p.outer_html();
        assert_eq!(html, r#"<p title="a &lt;b&gt; &amp; &quot;c&quot;">x</p>"#);
        assert_eq!(unescape_attribute("a &lt;b&gt; &amp;amp;"), "a <b> &amp;");
    }

    #[test]
    fn attribute_lookup() {
        let root = parse(r#"<div class="gallery wide" data-x="1"></div>"#);
        let div = root.descendants_by_tag("div")[0];
        assert!(div.class_contains("gallery"));
        assert!(!div.class_contains("Gallery"));
        assert_eq!(div.attr("data-x"), Some("1"));
        assert_eq!(div.attr_or_empty("id"), "");
    }

    #[test]
    fn comments_are_dropped() {
        let root = parse("<p>a<!-- hidden -->b</p>");
        let p = root.descendants_by_tag("p")[0];
        assert_eq!(p.inner_html(), "ab");
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let err = parse_bytes(&[b'<', b'p', b'>', 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ConvertError::Parse { offset: 3 }));
    }

    #[test]
    fn without_removes_matching_descendants() {
        let root = parse(r#"<div><img src="a" border="0"><img src="b"></div>"#);
        let cleaned = root.without(&|n| n.tag == "img" && n.has_attr("border"));
        let imgs = cleaned.descendants_by_tag("img");
        assert_eq!(imgs.len(), 1);
        assert_eq!(imgs[0].attr("src"), Some("b"));
    }
}
