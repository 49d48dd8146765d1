pub mod catalog;
pub mod rules;
pub mod signals;

use std::fmt;

use serde::Serialize;
use tracing::debug;

use catalog::{TemplateCatalog, TemplateDescriptor};
use rules::{ContentTypeRule, LayoutRule, Probe};
use signals::{DocumentSignals, StructureProfile, StructureScore, StylePreferences};

/// Raw scores are normalized against this, then clamped to 100.
pub const ASSUMED_MAX_SCORE: u32 = 10;
const MAX_TEMPLATES: usize = 5;
const MAX_ALTERNATIVES: usize = 2;
const MAX_REASONS: usize = 5;

const INTENT_WEIGHT: u32 = 5;
const PATTERN_WEIGHT: u32 = 2;
const STRUCTURE_WEIGHT: u32 = 2;
const CONTENT_MATCH_WEIGHT: f64 = 2.0;
const LAYOUT_MATCH_WEIGHT: f64 = 1.5;
const STYLE_BONUS: f64 = 10.0;
const STRUCTURE_BONUS: f64 = 15.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationScore {
    pub label: String,
    pub score: u32,
    /// Percentage in 0..=100.
    pub confidence: u32,
}

impl ClassificationScore {
    fn new(label: &str, score: u32) -> Self {
        ClassificationScore {
            label: label.to_string(),
            score,
            confidence: confidence(score),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "label", rename_all = "snake_case")]
pub enum MatchReason {
    ContentType(String),
    Layout(String),
    Style,
    Structure,
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchReason::ContentType(label) => write!(f, "Perfect for {} content", label),
            MatchReason::Layout(label) => write!(f, "Supports {} layout", label),
            MatchReason::Style => write!(f, "Matches your current style preferences"),
            MatchReason::Structure => write!(f, "Compatible with your content structure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateMatch {
    pub template_id: String,
    pub name: String,
    pub score: f64,
    pub reasons: Vec<MatchReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutRecommendation {
    pub template_id: String,
    pub content_type: String,
    pub layout: Option<String>,
    pub confidence: u32,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedRecommendations {
    /// Only labels that scored, highest first.
    pub content_types: Vec<ClassificationScore>,
    pub layouts: Vec<ClassificationScore>,
    pub structure: StructureScore,
    pub style: StylePreferences,
    pub profile: StructureProfile,
    /// Never empty while the catalog has templates.
    pub templates: Vec<TemplateMatch>,
    pub recommendations: Vec<LayoutRecommendation>,
}

impl RankedRecommendations {
    pub fn top_template(&self) -> Option<&TemplateMatch> {
        self.templates.first()
    }
}

pub fn confidence(score: u32) -> u32 {
    (score.saturating_mul(100) / ASSUMED_MAX_SCORE).min(100)
}

/// Score a document against every content type and layout, then rank the
/// catalog. Never fails: a document with no signals ranks the catalog in
/// registration order.
pub fn classify_document(
    html: &str,
    css: &str,
    intent: &str,
    catalog: &TemplateCatalog,
) -> RankedRecommendations {
    let signals = DocumentSignals::collect(html, css);
    let intent = intent.to_lowercase();

    let content_types = rank(
        rules::CONTENT_TYPES
            .iter()
            .map(|rule| ClassificationScore::new(rule.label, score_content_type(rule, &signals, &intent)))
            .collect(),
    );
    let layouts = rank(
        rules::LAYOUTS
            .iter()
            .map(|rule| ClassificationScore::new(rule.label, score_layout(rule, &signals)))
            .collect(),
    );
    debug!(
        content_types = content_types.len(),
        layouts = layouts.len(),
        "scored document"
    );

    let templates = rank_templates(catalog, &content_types, &layouts, &signals);
    let recommendations = recommend_layouts(catalog, &content_types, &layouts);

    RankedRecommendations {
        content_types,
        layouts,
        structure: signals.structure_score(),
        style: signals.style,
        profile: signals.profile,
        templates,
        recommendations,
    }
}

fn probe_matches(probe: &Probe, signals: &DocumentSignals<'_>) -> bool {
    match probe {
        Probe::Pattern(re) => re.is_match(signals.html),
        Probe::Computed(indicator) => signals.has(*indicator),
    }
}

fn score_content_type(rule: &ContentTypeRule, signals: &DocumentSignals<'_>, intent: &str) -> u32 {
    let mut score = 0u32;
    for keyword in rule.keywords {
        score += signals.text.matches(keyword).count() as u32;
        if intent.contains(keyword) {
            score += INTENT_WEIGHT;
        }
    }
    let matched = rule.probes.iter().filter(|p| probe_matches(p, signals)).count() as u32;
    score + PATTERN_WEIGHT * matched
}

fn score_layout(rule: &LayoutRule, signals: &DocumentSignals<'_>) -> u32 {
    let structure = rule.structure.iter().filter(|p| probe_matches(p, signals)).count() as u32;
    let indicators = rule.indicators.iter().filter(|p| probe_matches(p, signals)).count() as u32;
    let keywords = rule.keywords.iter().filter(|k| signals.html.contains(*k)).count() as u32;
    STRUCTURE_WEIGHT * structure + indicators + keywords
}

/// Drop zero scores and sort descending; ties keep table order.
fn rank(mut scores: Vec<ClassificationScore>) -> Vec<ClassificationScore> {
    scores.retain(|s| s.score > 0);
    scores.sort_by(|a, b| b.score.cmp(&a.score));
    scores
}

fn score_of(scores: &[ClassificationScore], label: &str) -> u32 {
    scores.iter().find(|s| s.label == label).map_or(0, |s| s.score)
}

fn rank_templates(
    catalog: &TemplateCatalog,
    content_types: &[ClassificationScore],
    layouts: &[ClassificationScore],
    signals: &DocumentSignals<'_>,
) -> Vec<TemplateMatch> {
    let mut matches: Vec<TemplateMatch> = catalog
        .templates
        .iter()
        .map(|t| match_template(t, content_types, layouts, signals))
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(MAX_TEMPLATES);
    matches
}

fn match_template(
    template: &TemplateDescriptor,
    content_types: &[ClassificationScore],
    layouts: &[ClassificationScore],
    signals: &DocumentSignals<'_>,
) -> TemplateMatch {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    for label in &template.suitable_for {
        let s = score_of(content_types, label);
        if s > 0 {
            score += CONTENT_MATCH_WEIGHT * f64::from(s);
            reasons.push(MatchReason::ContentType(label.clone()));
        }
    }
    for label in &template.layouts {
        let s = score_of(layouts, label);
        if s > 0 {
            score += LAYOUT_MATCH_WEIGHT * f64::from(s);
            reasons.push(MatchReason::Layout(label.clone()));
        }
    }
    if template.style_compatible(&signals.style) {
        score += STYLE_BONUS;
        reasons.push(MatchReason::Style);
    }
    if template.structure_compatible(&signals.profile) {
        score += STRUCTURE_BONUS;
        reasons.push(MatchReason::Structure);
    }

    TemplateMatch {
        template_id: template.id.clone(),
        name: template.name.clone(),
        score,
        reasons,
    }
}

/// Primary pick from the top content type and top layout, then up to two
/// alternatives from the next layouts down.
fn recommend_layouts(
    catalog: &TemplateCatalog,
    content_types: &[ClassificationScore],
    layouts: &[ClassificationScore],
) -> Vec<LayoutRecommendation> {
    let Some(primary) = content_types.first() else {
        return Vec::new();
    };
    let build = |layout: Option<&ClassificationScore>, confidence: u32| {
        let layout_label = layout.map(|l| l.label.as_str());
        let template_id = catalog
            .pick(&primary.label, layout_label)
            .map(|t| t.id.clone())
            .unwrap_or_default();
        let reasons = rules::content_type_reasons(&primary.label)
            .iter()
            .chain(layout_label.map_or(&[][..], rules::layout_reasons))
            .take(MAX_REASONS)
            .map(|r| r.to_string())
            .collect();
        LayoutRecommendation {
            template_id,
            content_type: primary.label.clone(),
            layout: layout_label.map(str::to_string),
            confidence,
            reasons,
        }
    };

    let mut out = vec![build(layouts.first(), primary.confidence)];
    for alt in layouts.iter().skip(1).take(MAX_ALTERNATIVES) {
        out.push(build(Some(alt), alt.confidence));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::catalog::{StructureKind, StyleTokens};
    use super::signals::Spacing;
    use super::*;

    fn labels(scores: &[ClassificationScore]) -> Vec<&str> {
        scores.iter().map(|s| s.label.as_str()).collect()
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(confidence(0), 0);
        assert_eq!(confidence(4), 40);
        assert_eq!(confidence(10), 100);
        assert_eq!(confidence(37), 100);
        assert_eq!(confidence(u32::MAX), 100);
    }

    #[test]
    fn empty_input_falls_back_to_catalog_order() {
        let catalog = TemplateCatalog::builtin();
        let result = classify_document("", "", "", &catalog);
        assert!(result.content_types.is_empty());
        assert!(result.layouts.is_empty());
        assert!(result.recommendations.is_empty());

        let ids: Vec<_> = result.templates.iter().map(|t| t.template_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["historic-modern", "aviation-tech", "storefront", "journal", "portfolio-showcase"]
        );
        assert!(result.templates.iter().all(|t| t.score == 25.0));
    }

    #[test]
    fn landing_fixture_scores() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let result = classify_document(&html, "", "", &TemplateCatalog::builtin());

        assert_eq!(labels(&result.content_types), vec!["gallery", "historical", "technical", "article"]);
        assert_eq!(result.content_types[0].score, 6);
        assert_eq!(result.content_types[0].confidence, 60);
        assert_eq!(result.content_types[1].score, 5);

        assert_eq!(labels(&result.layouts), vec!["timeline", "grid", "comparison"]);
        assert_eq!(result.layouts[0].score, 5);

        let top = result.top_template().unwrap();
        assert_eq!(top.template_id, "historic-modern");
        assert_eq!(
            top.reasons,
            vec![
                MatchReason::ContentType("historical".into()),
                MatchReason::ContentType("gallery".into()),
                MatchReason::Layout("timeline".into()),
                MatchReason::Layout("grid".into()),
                MatchReason::Style,
                MatchReason::Structure,
            ]
        );
        // 2*(5+6) + 1.5*(5+2) + 10 + 15
        assert_eq!(top.score, 57.5);
    }

    #[test]
    fn landing_layout_recommendations() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let result = classify_document(&html, "", "", &TemplateCatalog::builtin());
        let recs = &result.recommendations;
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].content_type, "gallery");
        assert_eq!(recs[0].layout.as_deref(), Some("timeline"));
        assert_eq!(recs[0].confidence, 60);
        assert_eq!(recs[0].reasons.len(), MAX_REASONS);
        assert_eq!(recs[0].reasons[0], "Enhanced gallery and showcase features");
        assert_eq!(recs[0].reasons[3], "Chronological content organization");
        assert_eq!(recs[1].layout.as_deref(), Some("grid"));
        assert_eq!(recs[2].layout.as_deref(), Some("comparison"));
        assert_eq!(recs[2].confidence, 20);
    }

    #[test]
    fn intent_adds_weight_per_keyword() {
        let html = std::fs::read_to_string("tests/fixtures/shop.html").unwrap();
        let catalog = TemplateCatalog::builtin();
        let plain = classify_document(&html, "", "", &catalog);
        let steered = classify_document(&html, "", "I want an online STORE", &catalog);
        assert_eq!(score_of(&plain.content_types, "ecommerce"), 6);
        assert_eq!(score_of(&steered.content_types, "ecommerce"), 11);
        assert_eq!(steered.top_template().unwrap().template_id, "storefront");
    }

    #[test]
    fn shop_layouts() {
        let html = std::fs::read_to_string("tests/fixtures/shop.html").unwrap();
        let result = classify_document(&html, "", "", &TemplateCatalog::builtin());
        assert_eq!(score_of(&result.layouts, "grid"), 5);
        assert_eq!(score_of(&result.layouts, "comparison"), 3);
        assert_eq!(score_of(&result.layouts, "catalog"), 3);
        // the sidebar rules out linear templates
        let journal = result.templates.iter().find(|t| t.template_id == "journal").unwrap();
        assert!(!journal.reasons.contains(&MatchReason::Structure));
    }

    #[test]
    fn ranking_is_deterministic() {
        let html = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let catalog = TemplateCatalog::builtin();
        assert_eq!(
            classify_document(&html, "", "", &catalog),
            classify_document(&html, "", "", &catalog)
        );
    }

    #[test]
    fn only_top_five_templates() {
        let extra = (0..7)
            .map(|i| TemplateDescriptor {
                id: format!("t{}", i),
                name: format!("T{}", i),
                suitable_for: vec![],
                layouts: vec![],
                style: StyleTokens {
                    colors: vec![],
                    fonts: vec![],
                    spacing: Spacing::Balanced,
                    adaptive: true,
                },
                structure: StructureKind::Flexible,
                blocks: vec![],
            })
            .collect();
        let result = classify_document("<p>x</p>", "", "", &TemplateCatalog::new(extra));
        assert_eq!(result.templates.len(), MAX_TEMPLATES);
        assert_eq!(result.templates[0].template_id, "t0");
    }

    #[test]
    fn reasons_render_as_sentences() {
        assert_eq!(MatchReason::ContentType("blog".into()).to_string(), "Perfect for blog content");
        assert_eq!(MatchReason::Layout("grid".into()).to_string(), "Supports grid layout");
    }
}
