// ✅ Data Quality - issue severity scoring
// Every finished record lands in exactly one tier: the worst one it fails.
//
// Tiers, in precedence order: critical, important, measurement, clean.

use crate::classifier::{AwardCategory, AwardClassifier};
use crate::record::{is_blank, AwardRecord, MeasureField, MeasureValue, TextField, NOT_APPLICABLE};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;

// ============================================================================
// SEVERITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Critical,    // Identity, award or plant missing
    Important,   // Photographer or parentage missing
    Measurement, // No description or no usable measurement
    Clean,
}

impl IssueSeverity {
    pub const ALL: [IssueSeverity; 4] = [
        IssueSeverity::Critical,
        IssueSeverity::Important,
        IssueSeverity::Measurement,
        IssueSeverity::Clean,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Critical => "critical",
            IssueSeverity::Important => "important",
            IssueSeverity::Measurement => "measurement",
            IssueSeverity::Clean => "clean",
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, IssueSeverity::Clean)
    }
}

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    pub rule_name: String,
    pub field: String,
    pub tier: IssueSeverity,
}

impl ValidationResult {
    fn check(passed: bool, rule_name: &str, field: &str, tier: IssueSeverity) -> Self {
        ValidationResult {
            passed,
            rule_name: rule_name.to_string(),
            field: field.to_string(),
            tier,
        }
    }
}

/// Severity of one record plus the fields behind it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueAssessment {
    pub award_num: String,
    pub severity: IssueSeverity,
    pub category: AwardCategory,

    /// Missing fields of the reported tier only
    pub missing_fields: Vec<String>,

    #[serde(skip)]
    pub validations: Vec<ValidationResult>,
}

impl IssueAssessment {
    pub fn summary(&self) -> String {
        if self.severity.is_clean() {
            format!("{}: clean", self.award_num)
        } else {
            format!(
                "{}: {} (missing {})",
                self.award_num,
                self.severity.as_str(),
                self.missing_fields.join(", ")
            )
        }
    }
}

// ============================================================================
// ISSUE CLASSIFIER
// ============================================================================

pub struct IssueClassifier {
    classifier: AwardClassifier,
}

impl IssueClassifier {
    pub fn new(classifier: AwardClassifier) -> Self {
        IssueClassifier { classifier }
    }

    /// Score a finished record
    pub fn assess(&self, record: &AwardRecord) -> IssueAssessment {
        let category = self.classifier.classify_record(record);

        let mut validations = Vec::new();
        validations.extend(self.critical_checks(record));
        validations.extend(self.important_checks(record, category));
        validations.extend(self.measurement_checks(record));

        // First failing tier wins
        let severity = validations
            .iter()
            .filter(|v| !v.passed)
            .map(|v| v.tier)
            .min()
            .unwrap_or(IssueSeverity::Clean);

        let missing_fields = validations
            .iter()
            .filter(|v| !v.passed && v.tier == severity)
            .map(|v| v.field.clone())
            .collect();

        IssueAssessment {
            award_num: record.award_num.clone(),
            severity,
            category,
            missing_fields,
            validations,
        }
    }

    pub fn assess_batch(&self, records: &[AwardRecord]) -> Vec<IssueAssessment> {
        records.iter().map(|r| self.assess(r)).collect()
    }

    fn critical_checks(&self, record: &AwardRecord) -> Vec<ValidationResult> {
        let tier = IssueSeverity::Critical;
        let mut checks = vec![
            ValidationResult::check(!is_blank(&record.award_num), "award_num_present", "awardNum", tier),
            ValidationResult::check(!record.is_text_empty(TextField::Award), "award_present", "award", tier),
            ValidationResult::check(record.award_points.is_some(), "award_points_present", "awardPoints", tier),
        ];

        for field in [
            TextField::Date,
            TextField::Location,
            TextField::Genus,
            TextField::Species,
            TextField::Exhibitor,
        ] {
            checks.push(ValidationResult::check(
                !record.is_text_empty(field),
                &format!("{}_present", field.name()),
                field.name(),
                tier,
            ));
        }

        checks
    }

    fn important_checks(&self, record: &AwardRecord, category: AwardCategory) -> Vec<ValidationResult> {
        let tier = IssueSeverity::Important;

        let photographer_ok = !is_blank(&record.photographer) && record.photographer != NOT_APPLICABLE;
        let cross_ok = if category.is_display_like() {
            true
        } else {
            !is_blank(&record.cross) && record.cross != NOT_APPLICABLE
        };

        vec![
            ValidationResult::check(photographer_ok, "photographer_present", "photographer", tier),
            ValidationResult::check(cross_ok, "cross_present", "cross", tier),
        ]
    }

    fn measurement_checks(&self, record: &AwardRecord) -> Vec<ValidationResult> {
        let tier = IssueSeverity::Measurement;
        let m = &record.measurements;

        let expected = m.kind.expected_fields();
        let fields: &[MeasureField] = if expected.is_empty() { &MeasureField::ALL } else { expected };
        let has_value = fields.iter().any(|f| match m.get(*f) {
            Some(MeasureValue::Value(v)) => v != 0.0,
            Some(MeasureValue::NotApplicable) | Some(MeasureValue::NotMeasured) => true,
            None => false,
        });

        vec![
            ValidationResult::check(m.has_description(), "description_present", "measurements.description", tier),
            ValidationResult::check(has_value, "measurement_value_present", "measurements.values", tier),
        ]
    }
}

impl Default for IssueClassifier {
    fn default() -> Self {
        Self::new(AwardClassifier::default())
    }
}

// ============================================================================
// ISSUE REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierCounts {
    pub critical: usize,
    pub important: usize,
    pub measurement: usize,
    pub clean: usize,
}

impl TierCounts {
    pub(crate) fn add(&mut self, severity: IssueSeverity) {
        match severity {
            IssueSeverity::Critical => self.critical += 1,
            IssueSeverity::Important => self.important += 1,
            IssueSeverity::Measurement => self.measurement += 1,
            IssueSeverity::Clean => self.clean += 1,
        }
    }

    pub fn get(&self, severity: IssueSeverity) -> usize {
        match severity {
            IssueSeverity::Critical => self.critical,
            IssueSeverity::Important => self.important,
            IssueSeverity::Measurement => self.measurement,
            IssueSeverity::Clean => self.clean,
        }
    }

    pub fn total(&self) -> usize {
        self.critical + self.important + self.measurement + self.clean
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueListing {
    pub award_num: String,
    pub award: String,
    pub plant: String,
    pub exhibitor: String,
    pub severity: IssueSeverity,
    pub missing_fields: Vec<String>,
}

/// Flat CSV row (csv cannot serialize nested sequences)
#[derive(Debug, Serialize)]
struct IssueRow<'a> {
    award_num: &'a str,
    award: &'a str,
    plant: &'a str,
    exhibitor: &'a str,
    severity: &'static str,
    missing_fields: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueReport {
    pub generated_at: DateTime<Utc>,
    pub counts: TierCounts,
    pub critical: Vec<IssueListing>,
    pub important: Vec<IssueListing>,
    pub measurement: Vec<IssueListing>,
    pub by_award_type: BTreeMap<String, TierCounts>,
    pub by_exhibitor: BTreeMap<String, TierCounts>,
}

impl IssueReport {
    pub fn build(records: &[AwardRecord], assessments: &[IssueAssessment]) -> Self {
        let mut report = IssueReport {
            generated_at: Utc::now(),
            counts: TierCounts::default(),
            critical: Vec::new(),
            important: Vec::new(),
            measurement: Vec::new(),
            by_award_type: BTreeMap::new(),
            by_exhibitor: BTreeMap::new(),
        };

        for (record, assessment) in records.iter().zip(assessments) {
            let severity = assessment.severity;
            report.counts.add(severity);

            let award = if is_blank(&record.award) { "UNKNOWN" } else { record.award.as_str() };
            report.by_award_type.entry(award.to_string()).or_default().add(severity);

            let exhibitor = if is_blank(&record.exhibitor) { "Unknown" } else { record.exhibitor.as_str() };
            report.by_exhibitor.entry(exhibitor.to_string()).or_default().add(severity);

            let listing = IssueListing {
                award_num: record.award_num.clone(),
                award: record.award.clone(),
                plant: record.plant_label(),
                exhibitor: record.exhibitor.clone(),
                severity,
                missing_fields: assessment.missing_fields.clone(),
            };
            match severity {
                IssueSeverity::Critical => report.critical.push(listing),
                IssueSeverity::Important => report.important.push(listing),
                IssueSeverity::Measurement => report.measurement.push(listing),
                IssueSeverity::Clean => {}
            }
        }

        report
    }

    pub fn listings(&self) -> impl Iterator<Item = &IssueListing> {
        self.critical.iter().chain(&self.important).chain(&self.measurement)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} records: {} critical, {} important, {} measurement, {} clean",
            self.counts.total(),
            self.counts.critical,
            self.counts.important,
            self.counts.measurement,
            self.counts.clean
        )
    }

    /// Flat listing of every non-clean record
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for listing in self.listings() {
            wtr.serialize(IssueRow {
                award_num: &listing.award_num,
                award: &listing.award,
                plant: &listing.plant,
                exhibitor: &listing.exhibitor,
                severity: listing.severity.as_str(),
                missing_fields: listing.missing_fields.join(";"),
            })
            .context("Failed to write issue row")?;
        }
        wtr.flush().context("Failed to flush issue CSV")?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
