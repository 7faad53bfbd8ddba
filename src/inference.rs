// 🧩 Missing-Info Inference - category-driven gap filling
// Pure: takes a record, returns a new one. Only empty fields are filled,
// except cross on display records, which can never carry parentage.

use crate::classifier::{AwardCategory, AwardClassifier};
use crate::record::{
    AwardRecord, MeasureValue, MeasurementType, Quantity, TextField, DISPLAY_GENUS,
    DISPLAY_SPECIES, NOT_APPLICABLE,
};

/// Provenance source for inferred values
pub const INFERENCE_SOURCE: &str = "inference-engine";

#[derive(Debug, Clone)]
pub struct Inference {
    pub record: AwardRecord,

    /// Classification after the rules ran
    pub category: AwardCategory,

    /// Fields this pass changed, in rule order
    pub changed: Vec<String>,
}

impl Inference {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

pub struct InferenceEngine {
    classifier: AwardClassifier,
}

impl InferenceEngine {
    pub fn new(classifier: AwardClassifier) -> Self {
        InferenceEngine { classifier }
    }

    pub fn classifier(&self) -> &AwardClassifier {
        &self.classifier
    }

    /// Apply every rule for the record's current classification.
    ///
    /// Running this on its own output changes nothing.
    pub fn infer(&self, record: &AwardRecord) -> Inference {
        let mut next = record.clone();
        let mut changed = Vec::new();

        let category = self.classifier.classify_record(&next);
        self.apply_category_rules(&mut next, category, &mut changed);

        // All categories
        if next.is_text_empty(TextField::Cross) {
            next.cross = NOT_APPLICABLE.to_string();
            changed.push("cross".to_string());
        }

        // Classification is never cached: a rewritten award code may have
        // moved the record into the display group.
        let settled = self.classifier.classify_record(&next);
        if settled != category {
            self.apply_category_rules(&mut next, settled, &mut changed);
        }

        if !changed.is_empty() {
            next.add_provenance(
                INFERENCE_SOURCE,
                &format!("inference:{}", settled.as_str()),
                changed.clone(),
                None,
            );
        }

        Inference {
            record: next,
            category: settled,
            changed,
        }
    }

    fn apply_category_rules(&self, record: &mut AwardRecord, category: AwardCategory, changed: &mut Vec<String>) {
        if category.is_display_like() {
            apply_display_rules(record, changed);
        }

        if !category.carries_points() {
            let empty = record.award_points.map_or(true, |p| p.is_zero());
            if empty {
                record.award_points = Some(Quantity::NotApplicable);
                changed.push("awardPoints".to_string());
            }
        }

        if category == AwardCategory::Special && !record.measurements.has_description() {
            if let Some(sentence) = self.classifier.catalog().default_description(&record.award) {
                record.measurements.description = sentence.to_string();
                changed.push("measurements.description".to_string());
            }
        }
    }
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new(AwardClassifier::default())
    }
}

fn apply_display_rules(record: &mut AwardRecord, changed: &mut Vec<String>) {
    if !record.is_display {
        record.is_display = true;
        changed.push("isDisplay".to_string());
    }

    for (field, placeholder) in [
        (TextField::Genus, DISPLAY_GENUS),
        (TextField::Species, DISPLAY_SPECIES),
        (TextField::Clone, NOT_APPLICABLE),
    ] {
        if record.is_text_empty(field) {
            *record.text_mut(field) = placeholder.to_string();
            changed.push(field.name().to_string());
        }
    }

    // Overwritten unconditionally
    if record.cross != NOT_APPLICABLE {
        record.cross = NOT_APPLICABLE.to_string();
        changed.push("cross".to_string());
    }

    let measurements = &mut record.measurements;
    if measurements.kind.is_unset_or_na() {
        measurements.kind = if record.award.trim().eq_ignore_ascii_case("AQ") {
            MeasurementType::AwardQualifying
        } else {
            MeasurementType::Display
        };
        changed.push("measurements.type".to_string());
    }

    for field in measurements.kind.expected_fields() {
        if measurements.is_field_empty(*field) {
            measurements.values.insert(*field, MeasureValue::NotApplicable);
            changed.push(format!("measurements.{}", field.label()));
        }
    }

    for (name, count) in [
        ("numFlowers", &mut measurements.num_flowers),
        ("numBuds", &mut measurements.num_buds),
        ("numInflorescences", &mut measurements.num_inflorescences),
    ] {
        if count.map_or(true, |c| c.is_zero()) {
            *count = Some(Quantity::NotApplicable);
            changed.push(format!("measurements.{}", name));
        }
    }
}

/// True when a display record satisfies every display guarantee
pub fn display_invariant_holds(record: &AwardRecord) -> bool {
    if !record.is_display {
        return true;
    }
    let m = &record.measurements;
    let counts_ok = [m.num_flowers, m.num_buds, m.num_inflorescences]
        .iter()
        .all(|c| c.map_or(false, |c| !c.is_zero()));

    record.cross == NOT_APPLICABLE
        && !record.is_text_empty(TextField::Genus)
        && !record.is_text_empty(TextField::Species)
        && m.kind.expected_fields().iter().all(|f| !m.is_field_empty(*f))
        && counts_ok
}

// ============================================================================
// TESTS
// ============================================================================
