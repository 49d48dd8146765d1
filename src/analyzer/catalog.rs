use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::signals::{Spacing, StructureProfile, StylePreferences};

/// Deepest heading level a linear template lays out well.
const LINEAR_MAX_DEPTH: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    /// Handles any page skeleton.
    Flexible,
    /// Single column, shallow heading tree, no sidebar.
    Linear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleTokens {
    pub colors: Vec<String>,
    pub fonts: Vec<String>,
    pub spacing: Spacing,
    /// Template restyles itself to whatever the source site uses.
    #[serde(default)]
    pub adaptive: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    pub id: String,
    pub name: String,
    pub suitable_for: Vec<String>,
    pub layouts: Vec<String>,
    pub style: StyleTokens,
    pub structure: StructureKind,
    #[serde(default)]
    pub blocks: Vec<String>,
}

impl TemplateDescriptor {
    pub fn supports_content(&self, label: &str) -> bool {
        self.suitable_for.iter().any(|l| l == label)
    }

    pub fn supports_layout(&self, label: &str) -> bool {
        self.layouts.iter().any(|l| l == label)
    }

    /// Adaptive templates, unstyled sources, a shared font family or the same
    /// spacing class all count as compatible.
    pub fn style_compatible(&self, prefs: &StylePreferences) -> bool {
        if self.style.adaptive || prefs.is_empty() {
            return true;
        }
        let shared_font = self.style.fonts.iter().any(|font| {
            let font = font.to_lowercase();
            prefs.fonts.iter().any(|f| f.to_lowercase().contains(&font))
        });
        shared_font || prefs.spacing == Some(self.style.spacing)
    }

    pub fn structure_compatible(&self, profile: &StructureProfile) -> bool {
        match self.structure {
            StructureKind::Flexible => true,
            StructureKind::Linear => {
                !profile.has_sidebar && profile.hierarchy_depth <= LINEAR_MAX_DEPTH
            }
        }
    }
}

/// Read-only template table handed to the classifier. Registration order is
/// the tie-break order when scores are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateCatalog {
    pub templates: Vec<TemplateDescriptor>,
}

impl TemplateCatalog {
    pub fn new(templates: Vec<TemplateDescriptor>) -> Self {
        TemplateCatalog { templates }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let catalog: TemplateCatalog =
            serde_json::from_str(json).context("Invalid template catalog JSON")?;
        if catalog.templates.is_empty() {
            anyhow::bail!("Template catalog has no templates");
        }
        Ok(catalog)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn get(&self, id: &str) -> Option<&TemplateDescriptor> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// First template suited to `content_type`, preferring one that also
    /// supports `layout`; the first registered template otherwise.
    pub fn pick(&self, content_type: &str, layout: Option<&str>) -> Option<&TemplateDescriptor> {
        let suited = |t: &&TemplateDescriptor| t.supports_content(content_type);
        layout
            .and_then(|l| self.templates.iter().filter(suited).find(|t| t.supports_layout(l)))
            .or_else(|| self.templates.iter().find(suited))
            .or_else(|| self.templates.first())
    }

    pub fn builtin() -> Self {
        TemplateCatalog::new(vec![
            template(
                "historic-modern",
                "Historic Modern",
                &["historical", "educational", "gallery"],
                &["timeline", "grid", "article"],
                StyleTokens {
                    colors: strings(&["#2c3e50", "#e74c3c", "#ecf0f1"]),
                    fonts: strings(&["Playfair Display", "Source Sans Pro"]),
                    spacing: Spacing::Spacious,
                    adaptive: true,
                },
                StructureKind::Flexible,
                &["timeline", "artifact", "gallery"],
            ),
            template(
                "aviation-tech",
                "Aviation Technology",
                &["technical", "article", "showcase"],
                &["comparison", "showcase"],
                StyleTokens {
                    colors: strings(&["#1e88e5", "#ffc107", "#fafafa", "#212121"]),
                    fonts: strings(&["Roboto", "Open Sans"]),
                    spacing: Spacing::Balanced,
                    adaptive: false,
                },
                StructureKind::Linear,
                &["specs", "comparison", "showcase"],
            ),
            template(
                "storefront",
                "Storefront",
                &["ecommerce", "business"],
                &["catalog", "grid", "comparison"],
                StyleTokens {
                    colors: strings(&["#111827", "#10b981", "#ffffff"]),
                    fonts: strings(&["Inter"]),
                    spacing: Spacing::Compact,
                    adaptive: true,
                },
                StructureKind::Flexible,
                &["product-grid", "pricing-table"],
            ),
            template(
                "journal",
                "Journal",
                &["blog", "article", "educational"],
                &["blog", "article", "timeline"],
                StyleTokens {
                    colors: strings(&["#333333", "#b91c1c", "#fdfcf9"]),
                    fonts: strings(&["Merriweather", "Lato"]),
                    spacing: Spacing::Balanced,
                    adaptive: false,
                },
                StructureKind::Linear,
                &["post-list", "table-of-contents"],
            ),
            template(
                "portfolio-showcase",
                "Portfolio Showcase",
                &["portfolio", "gallery", "showcase"],
                &["grid", "showcase"],
                StyleTokens {
                    colors: strings(&["#000000", "#f5f5f5"]),
                    fonts: strings(&["Montserrat"]),
                    spacing: Spacing::Spacious,
                    adaptive: true,
                },
                StructureKind::Flexible,
                &["lightbox-gallery", "feature-grid"],
            ),
        ])
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn template(
    id: &str,
    name: &str,
    suitable_for: &[&str],
    layouts: &[&str],
    style: StyleTokens,
    structure: StructureKind,
    blocks: &[&str],
) -> TemplateDescriptor {
    TemplateDescriptor {
        id: id.to_string(),
        name: name.to_string(),
        suitable_for: strings(suitable_for),
        layouts: strings(layouts),
        style,
        structure,
        blocks: strings(blocks),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_are_unique() {
        let catalog = TemplateCatalog::builtin();
        let mut ids: Vec<_> = catalog.templates.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), catalog.templates.len());
    }

    #[test]
    fn pick_prefers_layout_then_content() {
        let catalog = TemplateCatalog::builtin();
        assert_eq!(catalog.pick("historical", None).unwrap().id, "historic-modern");
        assert_eq!(catalog.pick("technical", None).unwrap().id, "aviation-tech");
        assert_eq!(catalog.pick("gallery", Some("showcase")).unwrap().id, "portfolio-showcase");
        assert_eq!(catalog.pick("gallery", Some("comparison")).unwrap().id, "historic-modern");
        assert_eq!(catalog.pick("unknown", None).unwrap().id, "historic-modern");
    }

    #[test]
    fn linear_structure_rejects_sidebars() {
        let catalog = TemplateCatalog::builtin();
        let linear = catalog.get("journal").unwrap();
        let mut profile = StructureProfile { hierarchy_depth: 2, ..Default::default() };
        assert!(linear.structure_compatible(&profile));
        profile.has_sidebar = true;
        assert!(!linear.structure_compatible(&profile));
        profile.has_sidebar = false;
        profile.hierarchy_depth = 4;
        assert!(!linear.structure_compatible(&profile));
        assert!(catalog.get("storefront").unwrap().structure_compatible(&profile));
    }

    #[test]
    fn style_compatibility() {
        let catalog = TemplateCatalog::builtin();
        let tech = catalog.get("aviation-tech").unwrap();
        assert!(tech.style_compatible(&StylePreferences::default()));

        let mut prefs = StylePreferences {
            colors: vec!["#000".into()],
            fonts: vec!["'Roboto', sans-serif".into()],
            ..Default::default()
        };
        assert!(tech.style_compatible(&prefs));
        prefs.fonts = vec!["Georgia".into()];
        assert!(!tech.style_compatible(&prefs));
        prefs.spacing = Some(Spacing::Balanced);
        assert!(tech.style_compatible(&prefs));
    }

    #[test]
    fn catalog_from_json() {
        let json = r#"{"templates":[{"id":"plain","name":"Plain","suitable_for":["blog"],
            "layouts":["blog"],"style":{"colors":[],"fonts":[],"spacing":"compact"},
            "structure":"linear"}]}"#;
        let catalog = TemplateCatalog::from_json(json).unwrap();
        assert_eq!(catalog.templates[0].structure, StructureKind::Linear);
        assert!(!catalog.templates[0].style.adaptive);
        assert!(TemplateCatalog::from_json(r#"{"templates":[]}"#).is_err());
        assert!(TemplateCatalog::from_json("not json").is_err());
    }
}
