use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parser::dom::{self, DocumentNode};

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").unwrap());
static MEASUREMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b\d+(\.\d+)?\s*(mm|cm|m|kg|mph|km/h)\b").unwrap());
static COLOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)#(?:[a-f0-9]{3}){1,2}\b").unwrap());
static FONT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)font-family:\s*([^;]+);").unwrap());
static SPACING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:padding|margin)(?:-[a-z]+)?\s*:\s*(\d+(?:\.\d+)?)px").unwrap()
});
static CSS_GRID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)display\s*:\s*(?:inline-)?grid\b|grid-template-columns").unwrap()
});

/// Elements whose text is not part of the readable page.
const HIDDEN_TAGS: &[&str] = &["head", "script", "style", "noscript", "template"];

const COMPACT_MAX_PX: f64 = 8.0;
const SPACIOUS_MIN_PX: f64 = 32.0;
const MAX_STRUCTURE_SCORE: u32 = 8;

/// Document properties that no single regex can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// At least three images and fewer than 40 words per image.
    HighImageRatio,
    /// At least 300 words and text is a quarter or more of the markup.
    HighTextRatio,
    /// At least three years mentioned, one per 50 words or denser.
    HighDateDensity,
    /// Two or more headings lead with a year, in ascending order.
    OrderedSections,
    /// Three or more sibling elements share tag and class.
    SimilarSections,
    /// CSS grid in a stylesheet or inline style.
    GridLayout,
    /// A multi-column table quoting measurements.
    TechnicalComparison,
    /// Two or more headings with no skipped levels.
    ProperHierarchy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    Compact,
    Balanced,
    Spacious,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Imagery {
    pub uses_hero: bool,
    pub has_slider: bool,
    pub image_heavy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StylePreferences {
    pub colors: Vec<String>,
    pub fonts: Vec<String>,
    /// None when the stylesheet gives no pixel padding or margin.
    pub spacing: Option<Spacing>,
    pub imagery: Imagery,
}

impl StylePreferences {
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty() && self.fonts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureScore {
    pub score: u32,
    pub max_score: u32,
    pub percentage: f64,
}

/// Coarse page skeleton used for template structure compatibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StructureProfile {
    /// Deepest heading level present, 1 when there are none.
    pub hierarchy_depth: u8,
    pub has_header: bool,
    pub has_footer: bool,
    pub has_sidebar: bool,
    pub has_navigation: bool,
}

/// Everything the classifier reads from one document, computed once.
pub struct DocumentSignals<'a> {
    pub html: &'a str,
    /// Lowercased readable text.
    pub text: String,
    pub words: usize,
    pub images: usize,
    pub videos: usize,
    pub galleries: usize,
    pub heading_counts: [usize; 6],
    pub classed_sections: usize,
    pub has_nav: bool,
    pub style: StylePreferences,
    pub profile: StructureProfile,
    indicators: Vec<Indicator>,
}

impl<'a> DocumentSignals<'a> {
    pub fn collect(html: &'a str, css: &str) -> Self {
        let root = dom::parse(html);
        let readable = root.without(&|n| HIDDEN_TAGS.contains(&n.tag.as_str()));
        let text = readable.text_content().to_lowercase();
        let words = text.split_whitespace().count();
        let elements = root.descendants();

        let count = |pred: &dyn Fn(&DocumentNode) -> bool| {
            elements.iter().filter(|&&n| pred(n)).count()
        };
        let images = count(&|n| n.tag == "img");
        let videos = count(&|n| n.tag == "video");
        let galleries = count(&|n| n.tag == "div" && n.class_contains("gallery"));
        let classed_sections = count(&|n| {
            matches!(n.tag.as_str(), "article" | "section" | "div") && n.has_attr("class")
        });
        let has_nav = elements.iter().any(|n| n.tag == "nav");

        let mut heading_counts = [0usize; 6];
        let mut heading_years = Vec::new();
        for node in &elements {
            if let Some(level) = heading_level(&node.tag) {
                heading_counts[level as usize - 1] += 1;
                if let Some(year) = leading_year(&node.text_content()) {
                    heading_years.push(year);
                }
            }
        }

        // stylesheet text: the supplied css plus every <style> element
        let mut stylesheet = css.to_string();
        for node in root.descendants_by_tag("style") {
            stylesheet.push('\n');
            stylesheet.push_str(&node.text_content());
        }
        let inline_styles: String = elements
            .iter()
            .filter_map(|n| n.attr("style"))
            .collect::<Vec<_>>()
            .join(";");

        let style = StylePreferences {
            colors: unique(COLOR_RE.find_iter(&stylesheet).map(|m| m.as_str().to_lowercase())),
            fonts: unique(FONT_RE.captures_iter(&stylesheet).map(|c| c[1].trim().to_string())),
            spacing: spacing_class(&stylesheet),
            imagery: Imagery {
                uses_hero: html.contains("hero"),
                has_slider: html.contains("slider"),
                image_heavy: images > 10,
            },
        };

        let profile = StructureProfile {
            hierarchy_depth: heading_counts
                .iter()
                .rposition(|&c| c > 0)
                .map_or(1, |i| i as u8 + 1),
            has_header: elements.iter().any(|n| n.tag == "header" || n.class_contains("header")),
            has_footer: elements.iter().any(|n| n.tag == "footer" || n.class_contains("footer")),
            has_sidebar: elements.iter().any(|n| n.tag == "aside" || n.class_contains("sidebar")),
            has_navigation: has_nav,
        };

        let years = YEAR_RE.find_iter(&text).count();
        let total_headings: usize = heading_counts.iter().sum();

        let mut indicators = Vec::new();
        if images >= 3 && words < images * 40 {
            indicators.push(Indicator::HighImageRatio);
        }
        if words >= 300 && text.len() * 4 >= html.len() {
            indicators.push(Indicator::HighTextRatio);
        }
        if years >= 3 && years * 50 >= words {
            indicators.push(Indicator::HighDateDensity);
        }
        if heading_years.len() >= 2 && heading_years.windows(2).all(|w| w[0] <= w[1]) {
            indicators.push(Indicator::OrderedSections);
        }
        if elements.iter().any(|n| has_similar_children(n)) {
            indicators.push(Indicator::SimilarSections);
        }
        if CSS_GRID_RE.is_match(&stylesheet) || CSS_GRID_RE.is_match(&inline_styles) {
            indicators.push(Indicator::GridLayout);
        }
        if root.descendants_by_tag("table").iter().any(|t| is_spec_table(t)) {
            indicators.push(Indicator::TechnicalComparison);
        }
        if total_headings >= 2 && headings_in_order(&heading_counts) {
            indicators.push(Indicator::ProperHierarchy);
        }

        DocumentSignals {
            html,
            text,
            words,
            images,
            videos,
            galleries,
            heading_counts,
            classed_sections,
            has_nav,
            style,
            profile,
            indicators,
        }
    }

    pub fn has(&self, indicator: Indicator) -> bool {
        self.indicators.contains(&indicator)
    }

    /// Heading order (+2), classed sections (+1 per five, up to 3),
    /// navigation (+1), media (+1 per ten, up to 2).
    pub fn structure_score(&self) -> StructureScore {
        let mut score = 0u32;
        if headings_in_order(&self.heading_counts) {
            score += 2;
        }
        score += (self.classed_sections as u32 / 5).min(3);
        if self.has_nav {
            score += 1;
        }
        let media = (self.images + self.videos + self.galleries) as u32;
        score += (media / 10).min(2);

        StructureScore {
            score,
            max_score: MAX_STRUCTURE_SCORE,
            percentage: f64::from(score) / f64::from(MAX_STRUCTURE_SCORE) * 100.0,
        }
    }
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn leading_year(text: &str) -> Option<u32> {
    let m = YEAR_RE.find(text.trim_start())?;
    if m.start() != 0 {
        return None;
    }
    m.as_str().parse().ok()
}

/// No level used after a gap: h1 then h3 without an h2 is out of order.
fn headings_in_order(counts: &[usize; 6]) -> bool {
    let mut last = 0;
    for (i, &count) in counts.iter().enumerate() {
        let level = i + 1;
        if count > 0 {
            if last > 0 && level - last > 1 {
                return false;
            }
            last = level;
        }
    }
    true
}

fn has_similar_children(node: &DocumentNode) -> bool {
    let mut groups: HashMap<(&str, &str), usize> = HashMap::new();
    for child in node.element_children() {
        let class = child.class();
        if class.is_empty() {
            continue;
        }
        let n = groups.entry((child.tag.as_str(), class)).or_insert(0);
        *n += 1;
        if *n >= 3 {
            return true;
        }
    }
    false
}

fn is_spec_table(table: &DocumentNode) -> bool {
    let wide = table
        .descendants_by_tag("tr")
        .iter()
        .any(|row| row.element_children().count() >= 2);
    wide && MEASUREMENT_RE.is_match(&table.text_content())
}

fn spacing_class(stylesheet: &str) -> Option<Spacing> {
    let values: Vec<f64> = SPACING_RE
        .captures_iter(stylesheet)
        .filter_map(|c| c[1].parse().ok())
        .collect();
    if values.is_empty() {
        return None;
    }
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    Some(if avg <= COMPACT_MAX_PX {
        Spacing::Compact
    } else if avg >= SPACIOUS_MIN_PX {
        Spacing::Spacious
    } else {
        Spacing::Balanced
    })
}

fn unique(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
