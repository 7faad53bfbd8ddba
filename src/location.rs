// 📍 Location Normalizer - canonical venue names
// Free-text venue strings drift between years and between the award page
// and the yearly listing. Disagreements are reported, never auto-resolved.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Two location strings for one record that do not normalize to the same venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationConflict {
    pub award_num: String,
    pub first: String,
    pub first_source: String,
    pub second: String,
    pub second_source: String,
    pub first_canonical: String,
    pub second_canonical: String,
}

impl LocationConflict {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} says \"{}\", {} says \"{}\"",
            self.award_num, self.first_source, self.first, self.second_source, self.second
        )
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Clone)]
pub struct LocationNormalizer {
    /// Normalized key -> canonical display name
    synonyms: BTreeMap<String, String>,
}

fn default_synonyms() -> Vec<(&'static str, &'static str)> {
    const FILOLI: &str = "Filoli Historic House";
    const SAN_FRANCISCO: &str = "San Francisco";
    const POS_GCCS: &str = "Peninsula Orchid Society and Gold Coast Cymbidium Society Show";

    vec![
        ("Filoli", FILOLI),
        ("Filoli Historic House Monthly", FILOLI),
        ("Filoli Historic House & Garden", FILOLI),
        ("POS/GCCS Show", POS_GCCS),
        ("San Francisco Monthly", SAN_FRANCISCO),
        ("San Fransisco", SAN_FRANCISCO),
        ("Santa Clara Valley OS Outreach Judging", "Santa Clara Valley OS Outreach"),
        ("Sonoma County OS Show", "Sonoma County Orchid Society Show"),
    ]
}

/// Lowercase, single-spaced, without trailing punctuation
pub fn normalize_key(location: &str) -> String {
    location
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':'))
        .to_lowercase()
}

impl LocationNormalizer {
    pub fn new() -> Self {
        Self::with_synonyms(BTreeMap::new())
    }

    /// Default table extended (or overridden) by `extra`
    pub fn with_synonyms(extra: BTreeMap<String, String>) -> Self {
        let mut synonyms: BTreeMap<String, String> = default_synonyms()
            .into_iter()
            .map(|(k, v)| (normalize_key(k), v.to_string()))
            .collect();
        for (k, v) in extra {
            synonyms.insert(normalize_key(&k), v);
        }
        LocationNormalizer { synonyms }
    }

    /// Canonical display form; unknown locations come back whitespace-cleaned
    pub fn canonical(&self, location: &str) -> String {
        let mut key = normalize_key(location);
        let mut resolved: Option<&String> = None;
        // Follow chains (extra synonym -> old name -> standard name), bounded
        for _ in 0..=self.synonyms.len() {
            match self.synonyms.get(&key) {
                Some(next) if normalize_key(next) != key => {
                    resolved = Some(next);
                    key = normalize_key(next);
                }
                _ => break,
            }
        }
        if let Some(canonical) = resolved {
            return canonical.clone();
        }
        if let Some(canonical) = self.synonyms.values().find(|c| normalize_key(c) == key) {
            return canonical.clone();
        }
        location.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Equivalent when both normalize identically or one maps to the other
    pub fn equivalent(&self, a: &str, b: &str) -> bool {
        let (ka, kb) = (normalize_key(a), normalize_key(b));
        if ka == kb {
            return true;
        }
        if normalize_key(&self.canonical(a)) == normalize_key(&self.canonical(b)) {
            return true;
        }
        self.synonyms.get(&ka).map(|c| normalize_key(c)) == Some(kb.clone())
            || self.synonyms.get(&kb).map(|c| normalize_key(c)) == Some(ka)
    }

    /// Compare two independently derived strings; empty strings never conflict
    pub fn check(
        &self,
        award_num: &str,
        first: (&str, &str),
        second: (&str, &str),
    ) -> Option<LocationConflict> {
        let (first_value, first_source) = first;
        let (second_value, second_source) = second;

        if first_value.trim().is_empty() || second_value.trim().is_empty() {
            return None;
        }
        if self.equivalent(first_value, second_value) {
            return None;
        }

        Some(LocationConflict {
            award_num: award_num.to_string(),
            first: first_value.to_string(),
            first_source: first_source.to_string(),
            second: second_value.to_string(),
            second_source: second_source.to_string(),
            first_canonical: self.canonical(first_value),
            second_canonical: self.canonical(second_value),
        })
    }

    pub fn synonym_count(&self) -> usize {
        self.synonyms.len()
    }
}

impl Default for LocationNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filoli_variants_are_equivalent() {
        let normalizer = LocationNormalizer::new();

        assert_eq!(
            normalizer.canonical("Filoli Historic House"),
            normalizer.canonical("Filoli Historic House & Garden")
        );
        assert!(normalizer.equivalent("Filoli Historic House", "Filoli Historic House & Garden"));
        assert!(normalizer
            .check(
                "20225300",
                ("Filoli Historic House", "award-page"),
                ("Filoli Historic House & Garden", "listing")
            )
            .is_none());
    }

    #[test]
    fn test_standard_names() {
        let normalizer = LocationNormalizer::new();

        assert_eq!(normalizer.canonical("San Francisco Monthly"), "San Francisco");
        assert_eq!(normalizer.canonical("Filoli"), "Filoli Historic House");
        assert_eq!(normalizer.canonical("Filoli Historic House Monthly"), "Filoli Historic House");
        assert_eq!(
            normalizer.canonical("POS/GCCS Show"),
            "Peninsula Orchid Society and Gold Coast Cymbidium Society Show"
        );
        assert_eq!(
            normalizer.canonical("Santa Clara Valley OS Outreach Judging"),
            "Santa Clara Valley OS Outreach"
        );
        // Already standard
        assert_eq!(normalizer.canonical("San Francisco"), "San Francisco");
    }

    #[test]
    fn test_typo_and_sonoma_pairs_do_not_conflict() {
        let normalizer = LocationNormalizer::new();

        assert!(normalizer
            .check("20235001", ("San Fransisco", "award-page"), ("San Francisco", "listing"))
            .is_none());
        assert!(normalizer
            .check(
                "20235002",
                ("Sonoma County OS Show", "award-page"),
                ("Sonoma County Orchid Society Show", "listing")
            )
            .is_none());
        assert!(normalizer.equivalent("San Fransisco", "San Francisco Monthly"));
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let normalizer = LocationNormalizer::new();
        assert!(normalizer.equivalent("San  Francisco", "san francisco monthly"));
        assert!(normalizer.equivalent("Santa Cruz Orchid Society Show.", "santa cruz orchid society show"));
    }

    #[test]
    fn test_unknown_location_passes_through() {
        let normalizer = LocationNormalizer::new();
        assert_eq!(normalizer.canonical("  Sacramento   Show "), "Sacramento Show");
    }

    #[test]
    fn test_conflict_reported_not_resolved() {
        let normalizer = LocationNormalizer::new();

        let conflict = normalizer
            .check("20255010", ("San Francisco", "award-page"), ("Filoli", "listing"))
            .expect("different venues must conflict");

        assert_eq!(conflict.first_canonical, "San Francisco");
        assert_eq!(conflict.second_canonical, "Filoli Historic House");
        assert!(conflict.summary().contains("listing"));
    }

    #[test]
    fn test_empty_side_never_conflicts() {
        let normalizer = LocationNormalizer::new();
        assert!(normalizer.check("20255010", ("", "award-page"), ("Filoli", "listing")).is_none());
    }

    #[test]
    fn test_extra_synonyms() {
        let mut extra = BTreeMap::new();
        extra.insert("SCOS Show".to_string(), "Santa Cruz Orchid Society Show".to_string());
        let normalizer = LocationNormalizer::with_synonyms(extra);

        assert!(normalizer.equivalent("scos show", "Santa Cruz Orchid Society Show"));

        // Extra entry pointing at an old name still reaches the standard one
        let mut extra = BTreeMap::new();
        extra.insert("SF Monthly".to_string(), "San Francisco Monthly".to_string());
        let normalizer = LocationNormalizer::with_synonyms(extra);
        assert_eq!(normalizer.canonical("sf monthly"), "San Francisco");
        assert!(normalizer.equivalent("SF Monthly", "San Francisco"));
        assert!(normalizer.synonym_count() > default_synonyms().len());
    }
}
