// 🔧 Repair Orchestrator - re-derive missing fields from the source
// Non-destructive: only fields empty in the current record are adopted,
// each with its own provenance entry, and only after a backup exists.

use crate::error::ExtractionError;
use crate::location::{LocationConflict, LocationNormalizer};
use crate::parser::{AwardParser, MeasurementExtractor, SourceDocument};
use crate::record::{AwardRecord, MeasurementType, Measurements, TextField};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairStrategy {
    /// Re-run the whole extractor
    #[default]
    Full,
    /// Measurement table only
    Measurements,
}

impl std::str::FromStr for RepairStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(RepairStrategy::Full),
            "measurements" => Ok(RepairStrategy::Measurements),
            other => Err(format!("unknown repair strategy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedField {
    pub field: String,
    pub value: serde_json::Value,
    pub rule: String,
}

/// Both sides populated and different: left for manual review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefusedMerge {
    pub field: String,
    pub current: serde_json::Value,
    pub fresh: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub record: AwardRecord,
    pub backup: Option<PathBuf>,
    pub merged: Vec<MergedField>,
    pub refused: Vec<RefusedMerge>,
    pub location_conflicts: Vec<LocationConflict>,

    /// Re-extraction failed; the record is unchanged
    pub extraction_failure: Option<String>,
}

impl RepairOutcome {
    pub fn changed(&self) -> bool {
        !self.merged.is_empty()
    }

    fn unchanged(record: &AwardRecord) -> Self {
        RepairOutcome {
            record: record.clone(),
            backup: None,
            merged: Vec::new(),
            refused: Vec::new(),
            location_conflicts: Vec::new(),
            extraction_failure: None,
        }
    }
}

/// Fresh values plus the rule that produced each
struct FreshDraft {
    record: AwardRecord,
    rules: BTreeMap<String, String>,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

pub struct RepairOrchestrator {
    strategy: RepairStrategy,
    normalizer: LocationNormalizer,
}

impl RepairOrchestrator {
    pub fn new(strategy: RepairStrategy, normalizer: LocationNormalizer) -> Self {
        RepairOrchestrator { strategy, normalizer }
    }

    pub fn strategy(&self) -> RepairStrategy {
        self.strategy
    }

    /// Repair one record against its source. The backup is written before
    /// the returned record differs from the input; a failed backup aborts.
    pub fn repair<P, S>(
        &self,
        record: &AwardRecord,
        doc: &SourceDocument,
        parser: &P,
        store: &S,
        run_id: &str,
    ) -> Result<RepairOutcome, ExtractionError>
    where
        P: AwardParser + MeasurementExtractor,
        S: RecordStore + ?Sized,
    {
        let fresh = match self.fresh_draft(record, doc, parser) {
            Ok(fresh) => fresh,
            Err(err) => {
                // Nothing re-derived means nothing to change
                debug!(award_num = %record.award_num, error = %err, "re-extraction failed");
                let mut outcome = RepairOutcome::unchanged(record);
                outcome.extraction_failure = Some(err.to_string());
                return Ok(outcome);
            }
        };

        let mut next = record.clone();
        let mut merged = Vec::new();
        let mut refused = Vec::new();
        merge_text_fields(&mut next, &fresh, &mut merged, &mut refused);
        merge_measurements(&mut next.measurements, &fresh, &mut merged, &mut refused);

        let mut location_conflicts = Vec::new();
        let fresh_location = fresh.record.location.as_str();
        if let Some(conflict) = self.normalizer.check(
            &record.award_num,
            (next.location.as_str(), "record"),
            (fresh_location, "award-page"),
        ) {
            location_conflicts.push(conflict);
        }
        if let Some(listing) = doc.listing_location.as_deref() {
            if let Some(conflict) =
                self.normalizer
                    .check(&record.award_num, (next.location.as_str(), "record"), (listing, "listing"))
            {
                location_conflicts.push(conflict);
            }
        }

        if merged.is_empty() {
            let mut outcome = RepairOutcome::unchanged(record);
            outcome.refused = refused;
            outcome.location_conflicts = location_conflicts;
            return Ok(outcome);
        }

        let backup = store.write_backup(run_id, record).map_err(|err| {
            warn!(award_num = %record.award_num, "backup failed, record left untouched");
            ExtractionError::io(&record.award_num, &err)
        })?;

        let source = format!("sha256:{}", doc.fingerprint());
        for merge in &merged {
            next.add_provenance(&source, &merge.rule, vec![merge.field.clone()], Some("repair".to_string()));
        }

        Ok(RepairOutcome {
            record: next,
            backup: Some(backup),
            merged,
            refused,
            location_conflicts,
            extraction_failure: None,
        })
    }

    fn fresh_draft<P>(&self, record: &AwardRecord, doc: &SourceDocument, parser: &P) -> Result<FreshDraft, ExtractionError>
    where
        P: AwardParser + MeasurementExtractor,
    {
        match self.strategy {
            RepairStrategy::Full => {
                let extraction = parser.parse(doc)?;
                Ok(FreshDraft {
                    record: extraction.record,
                    rules: extraction.field_rules,
                })
            }
            RepairStrategy::Measurements => {
                let mut fresh = AwardRecord::new(record.award_num.clone());
                fresh.measurements = parser.extract_measurements(doc);
                Ok(FreshDraft {
                    record: fresh,
                    rules: BTreeMap::new(),
                })
            }
        }
    }
}

impl Default for RepairOrchestrator {
    fn default() -> Self {
        Self::new(RepairStrategy::default(), LocationNormalizer::default())
    }
}

fn rule_for(fresh: &FreshDraft, field: &str, fallback: &str) -> String {
    fresh
        .rules
        .get(field)
        .cloned()
        .unwrap_or_else(|| fallback.to_string())
}

fn merge_text_fields(
    next: &mut AwardRecord,
    fresh: &FreshDraft,
    merged: &mut Vec<MergedField>,
    refused: &mut Vec<RefusedMerge>,
) {
    for field in TextField::ALL {
        let name = field.name();
        let value = fresh.record.text(field);
        if value.trim().is_empty() {
            continue;
        }
        if next.is_text_empty(field) {
            *next.text_mut(field) = value.to_string();
            merged.push(MergedField {
                field: name.to_string(),
                value: serde_json::Value::from(value),
                rule: rule_for(fresh, name, "extractor"),
            });
        } else if next.text(field) != value {
            refused.push(RefusedMerge {
                field: name.to_string(),
                current: serde_json::Value::from(next.text(field)),
                fresh: serde_json::Value::from(value),
            });
        }
    }

    if let Some(points) = fresh.record.award_points {
        match next.award_points {
            None => {
                next.award_points = Some(points);
                merged.push(MergedField {
                    field: "awardPoints".to_string(),
                    value: serde_json::to_value(points).unwrap_or_default(),
                    rule: rule_for(fresh, "awardPoints", "extractor"),
                });
            }
            Some(current) if current != points => refused.push(RefusedMerge {
                field: "awardPoints".to_string(),
                current: serde_json::to_value(current).unwrap_or_default(),
                fresh: serde_json::to_value(points).unwrap_or_default(),
            }),
            Some(_) => {}
        }
    }
}

fn merge_measurements(
    current: &mut Measurements,
    fresh: &FreshDraft,
    merged: &mut Vec<MergedField>,
    refused: &mut Vec<RefusedMerge>,
) {
    let incoming = &fresh.record.measurements;

    for (field, value) in &incoming.values {
        if value.is_empty() {
            continue;
        }
        let name = format!("measurements.{}", field.label());
        if current.is_field_empty(*field) {
            current.values.insert(*field, *value);
            merged.push(MergedField {
                value: serde_json::to_value(value).unwrap_or_default(),
                rule: rule_for(fresh, &name, "measurement_table"),
                field: name,
            });
        } else if current.get(*field) != Some(*value) {
            refused.push(RefusedMerge {
                current: serde_json::to_value(current.get(*field)).unwrap_or_default(),
                fresh: serde_json::to_value(value).unwrap_or_default(),
                field: name,
            });
        }
    }

    for (name, slot, value) in [
        ("numFlowers", &mut current.num_flowers, incoming.num_flowers),
        ("numBuds", &mut current.num_buds, incoming.num_buds),
        ("numInflorescences", &mut current.num_inflorescences, incoming.num_inflorescences),
    ] {
        let Some(value) = value.filter(|v| !v.is_zero()) else { continue };
        if slot.map_or(true, |c| c.is_zero()) {
            *slot = Some(value);
            merged.push(MergedField {
                field: format!("measurements.{}", name),
                value: serde_json::to_value(value).unwrap_or_default(),
                rule: "flower_counts".to_string(),
            });
        }
    }

    if !current.has_description() && incoming.has_description() {
        current.description = incoming.description.clone();
        merged.push(MergedField {
            field: "measurements.description".to_string(),
            value: serde_json::Value::from(incoming.description.as_str()),
            rule: rule_for(fresh, "measurements.description", "description_block"),
        });
    }

    if current.kind.is_unset_or_na() && !incoming.kind.is_unset_or_na() {
        let derived = MeasurementType::derive(&current.values);
        if current.kind != derived {
            current.kind = derived;
            merged.push(MergedField {
                field: "measurements.type".to_string(),
                value: serde_json::to_value(derived).unwrap_or_default(),
                rule: "measurement_type".to_string(),
            });
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
