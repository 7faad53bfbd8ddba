// 🏷️ Award Classifier - Award codes as data
// Maps an award code to point-based / no-point / display / special

use crate::record::AwardRecord;
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

// ============================================================================
// AWARD CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AwardCategory {
    PointBased,
    NoPoint,
    Display,
    Special,
}

impl AwardCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AwardCategory::PointBased => "point-based",
            AwardCategory::NoPoint => "no-point",
            AwardCategory::Display => "display",
            AwardCategory::Special => "special",
        }
    }

    /// Only point-based awards carry a numeric score
    pub fn carries_points(&self) -> bool {
        matches!(self, AwardCategory::PointBased)
    }

    /// Display and special awards have no parentage and may have no plant
    pub fn is_display_like(&self) -> bool {
        matches!(self, AwardCategory::Display | AwardCategory::Special)
    }
}

// ============================================================================
// AWARD CATALOG
// ============================================================================

/// Fixed membership sets plus aliases, loadable per dialect
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct AwardCatalog {
    pub point_codes: BTreeSet<String>,
    pub display_codes: BTreeSet<String>,
    pub special_codes: BTreeSet<String>,
    pub no_point_codes: BTreeSet<String>,

    /// Substrings of the award text that mark a display award
    pub display_tokens: Vec<String>,

    /// Substrings of the identifier that mark a display award
    pub identifier_display_tokens: Vec<String>,

    /// Long-form award names written out in some documents
    pub aliases: BTreeMap<String, String>,

    /// Description used when a special award has none
    pub default_descriptions: BTreeMap<String, String>,
}

fn code_set(codes: &[&str]) -> BTreeSet<String> {
    codes.iter().map(|c| c.to_string()).collect()
}

impl Default for AwardCatalog {
    fn default() -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert("SHOW TROPHY".to_string(), "ST".to_string());
        aliases.insert("SILVER CERTIFICATE".to_string(), "SC".to_string());
        aliases.insert("EXHIBITION EXCELLENCE CERTIFICATE".to_string(), "EEC".to_string());

        let mut default_descriptions = BTreeMap::new();
        default_descriptions.insert("AQ".to_string(), "Plant meets AQ standards".to_string());
        default_descriptions.insert(
            "JC".to_string(),
            "Judges' Commendation awarded for distinctive characteristics".to_string(),
        );

        AwardCatalog {
            point_codes: code_set(&["AM", "HCC", "CCM", "CCE", "FCC"]),
            display_codes: code_set(&["ST", "SC", "EEC"]),
            special_codes: code_set(&["AQ", "JC"]),
            no_point_codes: code_set(&["AQ", "JC", "CBR", "CHM", "AD", "ST", "SC", "EEC"]),
            display_tokens: vec!["TROPHY".into(), "CERTIFICATE".into(), "DISPLAY".into()],
            identifier_display_tokens: vec!["-display".into()],
            aliases,
            default_descriptions,
        }
    }
}

impl AwardCatalog {
    /// Load a catalog from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read award catalog: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse award catalog JSON")
    }

    pub fn is_known_code(&self, code: &str) -> bool {
        let code = code.trim().to_uppercase();
        self.point_codes.contains(&code)
            || self.display_codes.contains(&code)
            || self.special_codes.contains(&code)
            || self.no_point_codes.contains(&code)
    }

    pub fn is_no_point(&self, code: &str) -> bool {
        self.no_point_codes.contains(&code.trim().to_uppercase())
    }

    /// Every recognized code, longest first so regex alternation prefers "CCM" over "CC"
    pub fn all_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self
            .point_codes
            .iter()
            .chain(&self.display_codes)
            .chain(&self.special_codes)
            .chain(&self.no_point_codes)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        codes.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        codes
    }

    /// Resolve a written-out award name ("Show Trophy") to its code
    pub fn resolve_alias(&self, text: &str) -> Option<&str> {
        let key = text.trim().to_uppercase();
        self.aliases.get(&key).map(|s| s.as_str())
    }

    pub fn default_description(&self, code: &str) -> Option<&str> {
        self.default_descriptions
            .get(&code.trim().to_uppercase())
            .map(|s| s.as_str())
    }
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct AwardClassifier {
    catalog: AwardCatalog,
}

impl AwardClassifier {
    pub fn new(catalog: AwardCatalog) -> Self {
        AwardClassifier { catalog }
    }

    pub fn catalog(&self) -> &AwardCatalog {
        &self.catalog
    }

    /// Classify an award code. Display tokens in the award text or the
    /// identifier win over set membership.
    pub fn classify(&self, award: &str, award_num: &str) -> AwardCategory {
        let code = award.trim().to_uppercase();

        let token_hit = self
            .catalog
            .display_tokens
            .iter()
            .any(|t| !t.is_empty() && code.contains(&t.to_uppercase()));
        let id_lower = award_num.to_lowercase();
        let id_hit = self
            .catalog
            .identifier_display_tokens
            .iter()
            .any(|t| !t.is_empty() && id_lower.contains(&t.to_lowercase()));

        if token_hit || id_hit || self.catalog.display_codes.contains(&code) {
            AwardCategory::Display
        } else if self.catalog.special_codes.contains(&code) {
            AwardCategory::Special
        } else if self.catalog.no_point_codes.contains(&code) {
            AwardCategory::NoPoint
        } else {
            AwardCategory::PointBased
        }
    }

    pub fn classify_record(&self, record: &AwardRecord) -> AwardCategory {
        self.classify(&record.award, &record.award_num)
    }
}

impl Default for AwardClassifier {
    fn default() -> Self {
        Self::new(AwardCatalog::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_membership_sets() {
        let classifier = AwardClassifier::default();

        assert_eq!(classifier.classify("AM", "20225001"), AwardCategory::PointBased);
        assert_eq!(classifier.classify("hcc", "20225001"), AwardCategory::PointBased);
        assert_eq!(classifier.classify("ST", "20225001"), AwardCategory::Display);
        assert_eq!(classifier.classify("SC", "20225001"), AwardCategory::Display);
        assert_eq!(classifier.classify("AQ", "20225001"), AwardCategory::Special);
        assert_eq!(classifier.classify("JC", "20225001"), AwardCategory::Special);
        assert_eq!(classifier.classify("CBR", "20225001"), AwardCategory::NoPoint);
        assert_eq!(classifier.classify("AD", "20225001"), AwardCategory::NoPoint);
    }

    #[test]
    fn test_display_tokens_override_membership() {
        let classifier = AwardClassifier::default();

        assert_eq!(classifier.classify("SHOW TROPHY", "20225001"), AwardCategory::Display);
        assert_eq!(classifier.classify("AM", "20225001-display"), AwardCategory::Display);
        assert_eq!(classifier.classify("Certificate of Merit", "20225001"), AwardCategory::Display);
    }

    #[test]
    fn test_unknown_code_is_point_based() {
        let classifier = AwardClassifier::default();
        assert_eq!(classifier.classify("XYZ", "20225001"), AwardCategory::PointBased);
        assert_eq!(classifier.classify("", "20225001"), AwardCategory::PointBased);
    }

    #[test]
    fn test_category_helpers() {
        assert!(AwardCategory::PointBased.carries_points());
        assert!(!AwardCategory::NoPoint.carries_points());
        assert!(AwardCategory::Special.is_display_like());
        assert!(!AwardCategory::NoPoint.is_display_like());
        assert_eq!(AwardCategory::NoPoint.as_str(), "no-point");
    }

    #[test]
    fn test_catalog_codes_and_aliases() {
        let catalog = AwardCatalog::default();

        let codes = catalog.all_codes();
        assert!(codes.iter().position(|c| c == "CCM") < codes.iter().position(|c| c == "AM"));
        assert!(catalog.is_known_code("fcc"));
        assert!(!catalog.is_known_code("XYZ"));
        assert!(catalog.is_no_point("chm"));
        assert_eq!(catalog.resolve_alias("Show Trophy"), Some("ST"));
        assert_eq!(catalog.default_description("AQ"), Some("Plant meets AQ standards"));
    }

    #[test]
    fn test_catalog_from_json() {
        let json = r#"{ "display_codes": ["GOLD"], "no_point_codes": ["GOLD"] }"#;
        let catalog: AwardCatalog = serde_json::from_str(json).unwrap();
        let classifier = AwardClassifier::new(catalog);

        assert_eq!(classifier.classify("GOLD", "20265001"), AwardCategory::Display);
        // Unlisted sets fall back to the defaults
        assert_eq!(classifier.classify("AQ", "20265001"), AwardCategory::Special);
    }
}
