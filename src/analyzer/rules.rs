use std::sync::LazyLock;

use regex::Regex;

use super::signals::Indicator;

/// A single test against a document: a regex over the raw HTML, or a
/// computed indicator.
pub enum Probe {
    Pattern(Regex),
    Computed(Indicator),
}

pub struct ContentTypeRule {
    pub label: &'static str,
    /// Counted by occurrence in the visible text, and by presence in the intent.
    pub keywords: &'static [&'static str],
    pub probes: Vec<Probe>,
}

pub struct LayoutRule {
    pub label: &'static str,
    /// Worth 2 each when they match.
    pub structure: Vec<Probe>,
    /// Worth 1 each when they match.
    pub indicators: Vec<Probe>,
    /// Worth 1 each when present anywhere in the HTML.
    pub keywords: &'static [&'static str],
}

fn re(pattern: &str) -> Probe {
    Probe::Pattern(Regex::new(pattern).unwrap())
}

fn div_class(fragment: &str) -> Probe {
    re(&format!(r#"<div[^>]*class="[^"]*{}[^"]*"[^>]*>"#, fragment))
}

// ── Content types ──

pub static CONTENT_TYPES: LazyLock<Vec<ContentTypeRule>> = LazyLock::new(|| {
    vec![
        ContentTypeRule {
            label: "blog",
            keywords: &["posts", "articles", "news"],
            probes: vec![],
        },
        ContentTypeRule {
            label: "portfolio",
            keywords: &["gallery", "projects", "work"],
            probes: vec![],
        },
        ContentTypeRule {
            label: "business",
            keywords: &["services", "about", "contact"],
            probes: vec![],
        },
        ContentTypeRule {
            label: "ecommerce",
            keywords: &["products", "shop", "store"],
            probes: vec![],
        },
        ContentTypeRule {
            label: "educational",
            keywords: &["courses", "lessons", "resources"],
            probes: vec![],
        },
        ContentTypeRule {
            label: "historical",
            keywords: &[
                "history", "historical", "vintage", "classic", "era", "period", "ancient",
                "traditional", "timeline", "artifacts", "exhibits",
            ],
            probes: vec![
                re(r"(?i)\b\d{4}s?\b|\b\d{1,2}(st|nd|rd|th) century\b"),
                re(r"(?i)\b(war|battle|empire|dynasty|kingdom|civilization)\b"),
            ],
        },
        ContentTypeRule {
            label: "technical",
            keywords: &[
                "specifications", "technical", "engineering", "performance", "system", "design",
            ],
            probes: vec![
                re(r"(?i)\b\d+(\.\d+)?\s*(mm|cm|m|kg|mph|km/h)\b"),
                re(r"(?i)\b(engine|power|capacity|speed|efficiency|output)\b"),
            ],
        },
        ContentTypeRule {
            label: "gallery",
            keywords: &[],
            probes: vec![
                Probe::Computed(Indicator::HighImageRatio),
                div_class("gallery"),
                re(r"<img[^>]+>(?:\s*<img[^>]+>){2,}"),
            ],
        },
        ContentTypeRule {
            label: "article",
            keywords: &[],
            probes: vec![
                Probe::Computed(Indicator::HighTextRatio),
                re(r"(?is)<(article|section|main)[^>]*>.*?</(article|section|main)>"),
                re(r"(?is)<h[1-6][^>]*>.*?</h[1-6]>"),
            ],
        },
        ContentTypeRule {
            label: "showcase",
            keywords: &[],
            probes: vec![div_class("feature"), div_class("hero"), div_class("showcase")],
        },
    ]
});

// ── Layouts ──

pub static LAYOUTS: LazyLock<Vec<LayoutRule>> = LazyLock::new(|| {
    vec![
        LayoutRule {
            label: "timeline",
            structure: vec![
                re(r"(?i)\b(before|after|during|since|until)\b"),
                re(r"\b\d{4}\b.*?\b\d{4}\b"),
                div_class("timeline"),
            ],
            indicators: vec![
                Probe::Computed(Indicator::HighDateDensity),
                Probe::Computed(Indicator::OrderedSections),
            ],
            keywords: &[],
        },
        LayoutRule {
            label: "grid",
            structure: vec![div_class("grid"), div_class("col"), div_class("card")],
            indicators: vec![
                Probe::Computed(Indicator::SimilarSections),
                Probe::Computed(Indicator::GridLayout),
            ],
            keywords: &[],
        },
        LayoutRule {
            label: "comparison",
            structure: vec![
                re(r"<table[^>]*>"),
                div_class("compare"),
                re(r"(?is)<dl[^>]*>.*?</dl>"),
            ],
            indicators: vec![
                re(r"(?i)\b(?:vs\.|(?:versus|compared to|better than)\b)"),
                Probe::Computed(Indicator::TechnicalComparison),
            ],
            keywords: &[],
        },
        LayoutRule {
            label: "article",
            structure: vec![
                re(r"<article[^>]*>"),
                re(r"(?is)<main[^>]*>.*?</main>"),
                re(r"<hr[^>]*>"),
            ],
            indicators: vec![
                Probe::Computed(Indicator::HighTextRatio),
                Probe::Computed(Indicator::ProperHierarchy),
            ],
            keywords: &[],
        },
        LayoutRule {
            label: "catalog",
            structure: vec![],
            indicators: vec![],
            keywords: &["products", "items", "listings"],
        },
        LayoutRule {
            label: "blog",
            structure: vec![],
            indicators: vec![],
            keywords: &["posts", "articles", "news"],
        },
        LayoutRule {
            label: "showcase",
            structure: vec![],
            indicators: vec![],
            keywords: &["features", "highlights", "spotlight"],
        },
    ]
});

// ── Recommendation reasons ──

pub fn content_type_reasons(label: &str) -> &'static [&'static str] {
    match label {
        "historical" => &[
            "Optimized for historical content presentation",
            "Includes timeline and artifact display features",
            "Preserves historical context and chronology",
        ],
        "technical" => &[
            "Designed for technical specifications",
            "Includes comparison and specification tables",
            "Optimized for technical documentation",
        ],
        "gallery" => &[
            "Enhanced gallery and showcase features",
            "Optimized for visual content display",
            "Includes lightbox and zoom capabilities",
        ],
        "article" => &[
            "Clean and readable article layout",
            "Optimized for long-form content",
            "Includes table of contents feature",
        ],
        "showcase" => &[
            "Designed for feature highlighting",
            "Includes showcase and spotlight sections",
            "Optimized for promotional content",
        ],
        _ => &[],
    }
}

pub fn layout_reasons(label: &str) -> &'static [&'static str] {
    match label {
        "timeline" => &[
            "Chronological content organization",
            "Visual timeline navigation",
            "Date-based content filtering",
        ],
        "grid" => &[
            "Organized grid layout",
            "Responsive card-based design",
            "Filterable grid categories",
        ],
        "comparison" => &[
            "Side-by-side comparison layout",
            "Specification table format",
            "Feature comparison highlights",
        ],
        "article" => &[
            "Clear content hierarchy",
            "Enhanced readability",
            "Proper section organization",
        ],
        _ => &[],
    }
}
