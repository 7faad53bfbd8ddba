// 📝 Override Registry - manual corrections as data
// Per-identifier patches from manual review, loaded once at startup and
// read-only during a batch. The only component allowed to overwrite a
// populated field, and only when the entry is authoritative.

use crate::record::{
    AwardRecord, MeasureField, MeasureValue, MeasurementType, Quantity, TextField,
};
use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const OVERRIDE_SOURCE: &str = "override-registry";

/// Measurement part of a patch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementPatch {
    #[serde(rename = "type", default)]
    pub kind: Option<MeasurementType>,

    #[serde(default)]
    pub values: BTreeMap<MeasureField, MeasureValue>,

    #[serde(default)]
    pub num_flowers: Option<Quantity>,

    #[serde(default)]
    pub num_buds: Option<Quantity>,

    #[serde(default)]
    pub num_inflorescences: Option<Quantity>,

    #[serde(default)]
    pub description: Option<String>,
}

/// One row of the override table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideEntry {
    pub award_num: String,

    /// Why the correction exists (copied into provenance)
    #[serde(default)]
    pub reason: String,

    /// Authoritative entries replace populated fields
    #[serde(default)]
    pub authoritative: bool,

    #[serde(default)]
    pub award: Option<String>,
    #[serde(default)]
    pub award_points: Option<Quantity>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub genus: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub clone: Option<String>,
    #[serde(default)]
    pub cross: Option<String>,
    #[serde(default)]
    pub exhibitor: Option<String>,
    #[serde(default)]
    pub photographer: Option<String>,
    #[serde(default)]
    pub photo_ref: Option<String>,
    #[serde(default)]
    pub is_display: Option<bool>,

    #[serde(default)]
    pub measurements: Option<MeasurementPatch>,

    /// Sentinel written into every empty expected measurement field
    #[serde(default)]
    pub fill_measurements: Option<MeasureValue>,
}

impl OverrideEntry {
    fn text_patch(&self, field: TextField) -> Option<&str> {
        let value = match field {
            TextField::Award => &self.award,
            TextField::Date => &self.date,
            TextField::Location => &self.location,
            TextField::Genus => &self.genus,
            TextField::Species => &self.species,
            TextField::Clone => &self.clone,
            TextField::Cross => &self.cross,
            TextField::Exhibitor => &self.exhibitor,
            TextField::Photographer => &self.photographer,
            TextField::PhotoRef => &self.photo_ref,
        };
        value.as_deref()
    }
}

/// Result of looking a record up in the registry
#[derive(Debug, Clone)]
pub struct OverrideOutcome {
    pub record: AwardRecord,
    pub fields: Vec<String>,
    pub reason: Option<String>,
}

impl OverrideOutcome {
    pub fn applied(&self) -> bool {
        !self.fields.is_empty()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct OverrideRegistry {
    entries: BTreeMap<String, OverrideEntry>,
}

impl OverrideRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate identifiers are a configuration error
    pub fn from_entries(entries: Vec<OverrideEntry>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for entry in entries {
            if entry.award_num.trim().is_empty() {
                bail!("Override entry without awardNum");
            }
            let key = entry.award_num.trim().to_string();
            if map.insert(key.clone(), entry).is_some() {
                bail!("Duplicate override entry for {}", key);
            }
        }
        Ok(OverrideRegistry { entries: map })
    }

    /// Load the override table from a JSON array
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read override file: {:?}", path.as_ref()))?;

        let entries: Vec<OverrideEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse override file: {:?}", path.as_ref()))?;

        Self::from_entries(entries)
    }

    pub fn get(&self, award_num: &str) -> Option<&OverrideEntry> {
        self.entries.get(award_num)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Patch a record. Returns a new value; provenance is appended only
    /// when something actually changed.
    pub fn apply(&self, record: &AwardRecord) -> OverrideOutcome {
        let Some(entry) = self.entries.get(&record.award_num) else {
            return OverrideOutcome {
                record: record.clone(),
                fields: Vec::new(),
                reason: None,
            };
        };

        let mut next = record.clone();
        let fields = patch_record(&mut next, entry);

        if !fields.is_empty() {
            let note = (!entry.reason.is_empty()).then(|| entry.reason.clone());
            next.add_provenance(
                OVERRIDE_SOURCE,
                &format!("override:{}", entry.award_num),
                fields.clone(),
                note,
            );
        }

        OverrideOutcome {
            record: next,
            fields,
            reason: Some(entry.reason.clone()),
        }
    }
}

fn patch_record(record: &mut AwardRecord, entry: &OverrideEntry) -> Vec<String> {
    let force = entry.authoritative;
    let mut fields = Vec::new();

    for field in TextField::ALL {
        let Some(value) = entry.text_patch(field) else { continue };
        let current = record.text(field);
        if current == value || (!force && !record.is_text_empty(field)) {
            continue;
        }
        *record.text_mut(field) = value.to_string();
        fields.push(field.name().to_string());
    }

    if let Some(points) = entry.award_points {
        if record.award_points != Some(points) && (force || record.award_points.is_none()) {
            record.award_points = Some(points);
            fields.push("awardPoints".to_string());
        }
    }

    if let Some(is_display) = entry.is_display {
        if record.is_display != is_display && (force || !record.is_display) {
            record.is_display = is_display;
            fields.push("isDisplay".to_string());
        }
    }

    if let Some(patch) = &entry.measurements {
        patch_measurements(record, patch, force, &mut fields);
    }

    if let Some(fill) = entry.fill_measurements {
        let m = &mut record.measurements;
        // No table at the source means no derived subset: fill every field
        let expected = m.kind.expected_fields();
        let targets: &[MeasureField] = if expected.is_empty() { &MeasureField::ALL } else { expected };
        for field in targets {
            if m.is_field_empty(*field) {
                m.values.insert(*field, fill);
                fields.push(format!("measurements.{}", field.label()));
            }
        }
    }

    fields
}

fn patch_measurements(record: &mut AwardRecord, patch: &MeasurementPatch, force: bool, fields: &mut Vec<String>) {
    let m = &mut record.measurements;

    if let Some(kind) = patch.kind {
        if m.kind != kind && (force || m.kind == MeasurementType::Unset) {
            m.kind = kind;
            fields.push("measurements.type".to_string());
        }
    }

    for (field, value) in &patch.values {
        let current = m.get(*field);
        if current == Some(*value) || (!force && !m.is_field_empty(*field)) {
            continue;
        }
        m.values.insert(*field, *value);
        fields.push(format!("measurements.{}", field.label()));
    }

    for (name, patch_value, slot) in [
        ("numFlowers", patch.num_flowers, &mut m.num_flowers),
        ("numBuds", patch.num_buds, &mut m.num_buds),
        ("numInflorescences", patch.num_inflorescences, &mut m.num_inflorescences),
    ] {
        let Some(value) = patch_value else { continue };
        let empty = slot.map_or(true, |c| c.is_zero());
        if *slot != Some(value) && (force || empty) {
            *slot = Some(value);
            fields.push(format!("measurements.{}", name));
        }
    }

    if let Some(description) = &patch.description {
        if m.description != *description && (force || !m.has_description()) {
            m.description = description.clone();
            fields.push("measurements.description".to_string());
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_record() -> AwardRecord {
        let mut r = AwardRecord::new("20225262");
        r.award = "AM".into();
        r.genus = "Cattleya".into();
        r.exhibitor = String::new();
        r
    }

    #[test]
    fn test_non_authoritative_fills_only_empty() {
        let registry = OverrideRegistry::from_entries(vec![OverrideEntry {
            award_num: "20225262".into(),
            reason: "exhibitor missing at source".into(),
            genus: Some("Laelia".into()),
            exhibitor: Some("Orchid Acres".into()),
            ..Default::default()
        }])
        .unwrap();

        let outcome = registry.apply(&base_record());
        assert_eq!(outcome.fields, vec!["exhibitor".to_string()]);
        assert_eq!(outcome.record.genus, "Cattleya");
        assert_eq!(outcome.record.exhibitor, "Orchid Acres");

        let entry = &outcome.record.provenance[0];
        assert_eq!(entry.source, OVERRIDE_SOURCE);
        assert_eq!(entry.rule, "override:20225262");
        assert_eq!(entry.note.as_deref(), Some("exhibitor missing at source"));
    }

    #[test]
    fn test_authoritative_overwrites() {
        let registry = OverrideRegistry::from_entries(vec![OverrideEntry {
            award_num: "20225262".into(),
            reason: "award code mis-transcribed".into(),
            authoritative: true,
            award: Some("ST".into()),
            award_points: Some(Quantity::NotApplicable),
            ..Default::default()
        }])
        .unwrap();

        let mut record = base_record();
        record.award_points = Some(Quantity::Count(80));
        let outcome = registry.apply(&record);

        assert_eq!(outcome.record.award, "ST");
        assert_eq!(outcome.record.award_points, Some(Quantity::NotApplicable));
        assert_eq!(outcome.fields, vec!["award".to_string(), "awardPoints".to_string()]);
    }

    #[test]
    fn test_reapplying_adds_no_provenance() {
        let registry = OverrideRegistry::from_entries(vec![OverrideEntry {
            award_num: "20225262".into(),
            authoritative: true,
            award: Some("ST".into()),
            ..Default::default()
        }])
        .unwrap();

        let once = registry.apply(&base_record());
        let twice = registry.apply(&once.record);
        assert!(!twice.applied());
        assert_eq!(twice.record, once.record);
    }

    #[test]
    fn test_unknown_identifier_is_untouched() {
        let registry = OverrideRegistry::new();
        let outcome = registry.apply(&base_record());
        assert!(!outcome.applied());
        assert!(outcome.reason.is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_measurement_patch_and_fill() {
        let mut patch = MeasurementPatch::default();
        patch.values.insert(MeasureField::Ns, MeasureValue::Value(9.5));
        patch.description = Some("Two flowers on one inflorescence".into());

        let registry = OverrideRegistry::from_entries(vec![OverrideEntry {
            award_num: "20225262".into(),
            measurements: Some(patch),
            fill_measurements: Some(MeasureValue::NotMeasured),
            ..Default::default()
        }])
        .unwrap();

        let mut record = base_record();
        record.measurements.kind = MeasurementType::General;
        let r = registry.apply(&record).record;

        assert_eq!(r.measurements.get(MeasureField::Ns), Some(MeasureValue::Value(9.5)));
        assert_eq!(r.measurements.get(MeasureField::Petl), Some(MeasureValue::NotMeasured));
        assert_eq!(r.measurements.description, "Two flowers on one inflorescence");
        // Outside the General subset
        assert_eq!(r.measurements.get(MeasureField::Lipw), None);
    }

    #[test]
    fn test_fill_without_measurement_table() {
        let registry = OverrideRegistry::from_entries(vec![OverrideEntry {
            award_num: "20225262".into(),
            reason: "no measurement table on the page".into(),
            fill_measurements: Some(MeasureValue::NotMeasured),
            ..Default::default()
        }])
        .unwrap();

        let mut record = base_record();
        record.measurements.kind = MeasurementType::NotApplicable;
        let outcome = registry.apply(&record);

        assert_eq!(outcome.fields.len(), MeasureField::ALL.len());
        for field in MeasureField::ALL {
            assert_eq!(outcome.record.measurements.get(field), Some(MeasureValue::NotMeasured));
        }
    }

    #[test]
    fn test_duplicate_entries_rejected() {
        let entry = OverrideEntry {
            award_num: "20225262".into(),
            ..Default::default()
        };
        assert!(OverrideRegistry::from_entries(vec![entry.clone(), entry]).is_err());
        assert!(OverrideRegistry::from_entries(vec![OverrideEntry::default()]).is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{ "awardNum": "20225262", "reason": "manual review", "authoritative": true,
                   "award": "ST", "awardPoints": "N/A", "fillMeasurements": "N/A" }},
                {{ "awardNum": "20235010", "photographer": "J. Smith",
                   "measurements": {{ "values": {{ "NS": 8.1 }}, "numFlowers": 3 }} }}
            ]"#
        )
        .unwrap();

        let registry = OverrideRegistry::from_file(file.path()).unwrap();
        assert_eq!(registry.len(), 2);

        let entry = registry.get("20225262").unwrap();
        assert!(entry.authoritative);
        assert_eq!(entry.award_points, Some(Quantity::NotApplicable));
        assert_eq!(entry.fill_measurements, Some(MeasureValue::NotApplicable));

        let entry = registry.get("20235010").unwrap();
        let patch = entry.measurements.as_ref().unwrap();
        assert_eq!(patch.values.get(&MeasureField::Ns), Some(&MeasureValue::Value(8.1)));
        assert_eq!(patch.num_flowers, Some(Quantity::Count(3)));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(OverrideRegistry::from_file(file.path()).is_err());
        assert!(OverrideRegistry::from_file("/nonexistent/overrides.json").is_err());
    }
}
