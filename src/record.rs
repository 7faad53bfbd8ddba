// 🗂️ Award Record - the normalized output entity
// One record per award identifier, mutated stage by stage, never deleted.
//
// Sentinels are explicit variants instead of magic strings so that an empty
// value can never masquerade as "not applicable".

use chrono::{DateTime, Utc};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Not-applicable sentinel as it appears in output records
pub const NOT_APPLICABLE: &str = "N/A";

/// Not-measured sentinel (distinct from not-applicable)
pub const NOT_MEASURED: &str = "NM";

/// Cross value for a natural species (no hybrid parentage)
pub const SPECIES_MARKER: &str = "species";

/// Placeholders used for display awards with no plant name
pub const DISPLAY_GENUS: &str = "Display";
pub const DISPLAY_SPECIES: &str = "Award";

// ============================================================================
// QUANTITY (award points, flower counts)
// ============================================================================

/// Integer value or the not-applicable sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Count(u32),
    NotApplicable,
}

impl Quantity {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case(NOT_APPLICABLE) {
            return Some(Quantity::NotApplicable);
        }
        text.parse::<u32>().ok().map(Quantity::Count)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Quantity::Count(0))
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quantity::Count(n) => write!(f, "{}", n),
            Quantity::NotApplicable => f.write_str(NOT_APPLICABLE),
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Quantity::Count(n) => serializer.serialize_u32(*n),
            Quantity::NotApplicable => serializer.serialize_str(NOT_APPLICABLE),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawScalar::deserialize(deserializer)? {
            RawScalar::Number(n) if n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => {
                Ok(Quantity::Count(n as u32))
            }
            RawScalar::Number(n) => Err(D::Error::custom(format!("invalid quantity: {}", n))),
            RawScalar::Text(s) => {
                Quantity::parse(&s).ok_or_else(|| D::Error::custom(format!("invalid quantity: {:?}", s)))
            }
        }
    }
}

/// Older records stored unknown points as "" - read those back as unset
fn optional_quantity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Quantity>, D::Error> {
    let raw: Option<RawScalar> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(RawScalar::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawScalar::Text(s)) => Quantity::parse(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid quantity: {:?}", s))),
        Some(RawScalar::Number(n)) if n >= 0.0 && n.fract() == 0.0 => Ok(Some(Quantity::Count(n as u32))),
        Some(RawScalar::Number(n)) => Err(D::Error::custom(format!("invalid quantity: {}", n))),
    }
}

// ============================================================================
// MEASUREMENTS
// ============================================================================

/// Numeric measurement fields recognized in the measurement table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasureField {
    Ns,
    Nsv,
    Dsw,
    Dsl,
    Petw,
    Petl,
    Lsw,
    Lsl,
    Lipw,
    Lipl,
    Pchw,
    Pchl,
    Synsl,
    Synsw,
}

impl MeasureField {
    pub const ALL: [MeasureField; 14] = [
        MeasureField::Ns,
        MeasureField::Nsv,
        MeasureField::Dsw,
        MeasureField::Dsl,
        MeasureField::Petw,
        MeasureField::Petl,
        MeasureField::Lsw,
        MeasureField::Lsl,
        MeasureField::Lipw,
        MeasureField::Lipl,
        MeasureField::Pchw,
        MeasureField::Pchl,
        MeasureField::Synsl,
        MeasureField::Synsw,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MeasureField::Ns => "NS",
            MeasureField::Nsv => "NSV",
            MeasureField::Dsw => "DSW",
            MeasureField::Dsl => "DSL",
            MeasureField::Petw => "PETW",
            MeasureField::Petl => "PETL",
            MeasureField::Lsw => "LSW",
            MeasureField::Lsl => "LSL",
            MeasureField::Lipw => "LIPW",
            MeasureField::Lipl => "LIPL",
            MeasureField::Pchw => "PCHW",
            MeasureField::Pchl => "PCHL",
            MeasureField::Synsl => "SYNSL",
            MeasureField::Synsw => "SYNSW",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().trim_end_matches(':');
        MeasureField::ALL
            .iter()
            .copied()
            .find(|f| f.label().eq_ignore_ascii_case(label))
    }

    fn is_lip(&self) -> bool {
        matches!(self, MeasureField::Lipw | MeasureField::Lipl)
    }

    fn is_sepal(&self) -> bool {
        matches!(
            self,
            MeasureField::Ns | MeasureField::Nsv | MeasureField::Lsw | MeasureField::Lsl
        )
    }
}

const GENERAL_FIELDS: &[MeasureField] = &[
    MeasureField::Ns,
    MeasureField::Nsv,
    MeasureField::Dsw,
    MeasureField::Dsl,
    MeasureField::Petw,
    MeasureField::Petl,
];

const LATERAL_SEPAL_FIELDS: &[MeasureField] = &[
    MeasureField::Ns,
    MeasureField::Nsv,
    MeasureField::Dsw,
    MeasureField::Dsl,
    MeasureField::Petw,
    MeasureField::Petl,
    MeasureField::Lsw,
    MeasureField::Lsl,
];

const LIP_FIELDS: &[MeasureField] = &[
    MeasureField::Ns,
    MeasureField::Nsv,
    MeasureField::Dsw,
    MeasureField::Dsl,
    MeasureField::Petw,
    MeasureField::Petl,
    MeasureField::Lipw,
    MeasureField::Lipl,
];

const LIP_AND_LATERAL_SEPAL_FIELDS: &[MeasureField] = &[
    MeasureField::Ns,
    MeasureField::Nsv,
    MeasureField::Dsw,
    MeasureField::Dsl,
    MeasureField::Petw,
    MeasureField::Petl,
    MeasureField::Lsw,
    MeasureField::Lsl,
    MeasureField::Lipw,
    MeasureField::Lipl,
];

const DISPLAY_FIELDS: &[MeasureField] = &[
    MeasureField::Ns,
    MeasureField::Nsv,
    MeasureField::Dsw,
    MeasureField::Dsl,
    MeasureField::Petw,
    MeasureField::Petl,
    MeasureField::Lipw,
    MeasureField::Lsw,
    MeasureField::Pchw,
    MeasureField::Synsl,
    MeasureField::Synsw,
];

/// Which measurement fields a record is expected to carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeasurementType {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "Lip&LateralSepal")]
    LipAndLateralSepal,
    #[serde(rename = "LateralSepal")]
    LateralSepal,
    #[serde(rename = "Lip")]
    Lip,
    #[serde(rename = "General")]
    General,
    #[serde(rename = "Display")]
    Display,
    #[serde(rename = "Award Qualifying")]
    AwardQualifying,
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl MeasurementType {
    /// Expected subset for this type. An unset type expects every field;
    /// not-applicable expects none.
    pub fn expected_fields(&self) -> &'static [MeasureField] {
        match self {
            MeasurementType::Unset => &MeasureField::ALL,
            MeasurementType::LipAndLateralSepal => LIP_AND_LATERAL_SEPAL_FIELDS,
            MeasurementType::LateralSepal => LATERAL_SEPAL_FIELDS,
            MeasurementType::Lip => LIP_FIELDS,
            MeasurementType::General => GENERAL_FIELDS,
            MeasurementType::Display | MeasurementType::AwardQualifying => DISPLAY_FIELDS,
            MeasurementType::NotApplicable => &[],
        }
    }

    /// Infer the type from the measurements actually present
    pub fn derive(values: &BTreeMap<MeasureField, MeasureValue>) -> Self {
        let present: Vec<MeasureField> = values
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(f, _)| *f)
            .collect();

        if present.is_empty() {
            return MeasurementType::NotApplicable;
        }

        let has_lip = present.iter().any(|f| f.is_lip());
        let has_sepal = present.iter().any(|f| f.is_sepal());

        match (has_lip, has_sepal) {
            (true, true) => MeasurementType::LipAndLateralSepal,
            (true, false) => MeasurementType::Lip,
            (false, true) => MeasurementType::LateralSepal,
            (false, false) => MeasurementType::General,
        }
    }

    pub fn is_unset_or_na(&self) -> bool {
        matches!(self, MeasurementType::Unset | MeasurementType::NotApplicable)
    }
}

/// Number, not-applicable or not-measured
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeasureValue {
    Value(f64),
    NotApplicable,
    NotMeasured,
}

impl MeasureValue {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case(NOT_APPLICABLE) {
            Some(MeasureValue::NotApplicable)
        } else if text.eq_ignore_ascii_case(NOT_MEASURED) {
            Some(MeasureValue::NotMeasured)
        } else {
            text.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MeasureValue::Value)
        }
    }

    /// Zero readings are what an unfilled template cell looks like
    pub fn is_empty(&self) -> bool {
        matches!(self, MeasureValue::Value(v) if *v == 0.0)
    }
}

impl Serialize for MeasureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MeasureValue::Value(v) => serializer.serialize_f64(*v),
            MeasureValue::NotApplicable => serializer.serialize_str(NOT_APPLICABLE),
            MeasureValue::NotMeasured => serializer.serialize_str(NOT_MEASURED),
        }
    }
}

impl<'de> Deserialize<'de> for MeasureValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawScalar::deserialize(deserializer)? {
            RawScalar::Number(n) => Ok(MeasureValue::Value(n)),
            RawScalar::Text(s) => MeasureValue::parse(&s)
                .ok_or_else(|| D::Error::custom(format!("invalid measurement: {:?}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurements {
    #[serde(rename = "type", default)]
    pub kind: MeasurementType,

    #[serde(default)]
    pub values: BTreeMap<MeasureField, MeasureValue>,

    #[serde(default)]
    pub num_flowers: Option<Quantity>,

    #[serde(default)]
    pub num_buds: Option<Quantity>,

    #[serde(default)]
    pub num_inflorescences: Option<Quantity>,

    #[serde(default)]
    pub description: String,
}

impl Measurements {
    pub fn get(&self, field: MeasureField) -> Option<MeasureValue> {
        self.values.get(&field).copied()
    }

    /// Absent or zero
    pub fn is_field_empty(&self, field: MeasureField) -> bool {
        self.values.get(&field).map_or(true, |v| v.is_empty())
    }

    pub fn has_description(&self) -> bool {
        !self.description.trim().is_empty()
    }
}

// ============================================================================
// PROVENANCE
// ============================================================================

/// Audit entry: which rule/source changed which fields, and when
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceEntry {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub fields: Vec<String>,
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

// ============================================================================
// AWARD RECORD
// ============================================================================

/// Free-text fields addressable by name (used by overrides and repair)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Award,
    Date,
    Location,
    Genus,
    Species,
    Clone,
    Cross,
    Exhibitor,
    Photographer,
    PhotoRef,
}

impl TextField {
    pub const ALL: [TextField; 10] = [
        TextField::Award,
        TextField::Date,
        TextField::Location,
        TextField::Genus,
        TextField::Species,
        TextField::Clone,
        TextField::Cross,
        TextField::Exhibitor,
        TextField::Photographer,
        TextField::PhotoRef,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TextField::Award => "award",
            TextField::Date => "date",
            TextField::Location => "location",
            TextField::Genus => "genus",
            TextField::Species => "species",
            TextField::Clone => "clone",
            TextField::Cross => "cross",
            TextField::Exhibitor => "exhibitor",
            TextField::Photographer => "photographer",
            TextField::PhotoRef => "photoRef",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardRecord {
    /// Unique identifier: four-digit year followed by a sequence number
    pub award_num: String,

    #[serde(default)]
    pub award: String,

    #[serde(default, deserialize_with = "optional_quantity")]
    pub award_points: Option<Quantity>,

    #[serde(default)]
    pub date: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub genus: String,

    #[serde(default)]
    pub species: String,

    #[serde(default)]
    pub clone: String,

    #[serde(default)]
    pub cross: String,

    #[serde(default)]
    pub exhibitor: String,

    #[serde(default)]
    pub photographer: String,

    #[serde(default)]
    pub photo_ref: String,

    #[serde(default)]
    pub is_display: bool,

    #[serde(default)]
    pub measurements: Measurements,

    /// SHA-256 of the source document this record was derived from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_hash: String,

    #[serde(default)]
    pub provenance: Vec<ProvenanceEntry>,
}

impl AwardRecord {
    /// Draft record with every field empty
    pub fn new(award_num: impl Into<String>) -> Self {
        let award_num = award_num.into();
        AwardRecord {
            photo_ref: format!("images/{}.jpg", award_num),
            award_num,
            award: String::new(),
            award_points: None,
            date: String::new(),
            location: String::new(),
            genus: String::new(),
            species: String::new(),
            clone: String::new(),
            cross: String::new(),
            exhibitor: String::new(),
            photographer: String::new(),
            is_display: false,
            measurements: Measurements::default(),
            source_hash: String::new(),
            provenance: Vec::new(),
        }
    }

    pub fn text(&self, field: TextField) -> &str {
        match field {
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
        }
    }

    pub fn text_mut(&mut self, field: TextField) -> &mut String {
        match field {
            TextField::Award => &mut self.award,
            TextField::Date => &mut self.date,
            TextField::Location => &mut self.location,
            TextField::Genus => &mut self.genus,
            TextField::Species => &mut self.species,
            TextField::Clone => &mut self.clone,
            TextField::Cross => &mut self.cross,
            TextField::Exhibitor => &mut self.exhibitor,
            TextField::Photographer => &mut self.photographer,
            TextField::PhotoRef => &mut self.photo_ref,
        }
    }

    pub fn is_text_empty(&self, field: TextField) -> bool {
        is_blank(self.text(field))
    }

    /// Competition year encoded in the identifier, if any
    pub fn year(&self) -> Option<i32> {
        self.award_num.get(..4).and_then(|y| y.parse().ok())
    }

    /// "Genus species 'Clone'" for reports
    pub fn plant_label(&self) -> String {
        let genus = if self.genus.is_empty() { "Unknown" } else { &self.genus };
        let species = if self.species.is_empty() { "Unknown" } else { &self.species };
        if is_blank(&self.clone) || self.clone == NOT_APPLICABLE {
            format!("{} {}", genus, species)
        } else {
            format!("{} {} '{}'", genus, species, self.clone)
        }
    }

    pub fn add_provenance(&mut self, source: &str, rule: &str, fields: Vec<String>, note: Option<String>) {
        self.provenance.push(ProvenanceEntry {
            timestamp: Utc::now(),
            source: source.to_string(),
            fields,
            rule: rule.to_string(),
            note,
        });
    }

    /// Equality ignoring provenance timestamps
    pub fn content_eq(&self, other: &AwardRecord) -> bool {
        let strip = |r: &AwardRecord| {
            let mut r = r.clone();
            for entry in &mut r.provenance {
                entry.timestamp = DateTime::<Utc>::default();
            }
            r
        };
        strip(self) == strip(other)
    }
}

pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// SHA-256 hex digest of a source document
pub fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_empty_draft() {
        let record = AwardRecord::new("20225262");

        assert_eq!(record.award_num, "20225262");
        assert_eq!(record.photo_ref, "images/20225262.jpg");
        assert!(record.award_points.is_none());
        assert!(record.is_text_empty(TextField::Genus));
        assert_eq!(record.measurements.kind, MeasurementType::Unset);
        assert_eq!(record.year(), Some(2022));
    }

    #[test]
    fn test_award_points_never_serialize_as_empty_string() {
        let mut record = AwardRecord::new("20235001");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["awardPoints"].is_null());

        record.award_points = Some(Quantity::Count(80));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["awardPoints"], 80);

        record.award_points = Some(Quantity::NotApplicable);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["awardPoints"], "N/A");
    }

    #[test]
    fn test_legacy_empty_points_read_back_as_unset() {
        let json = r#"{"awardNum":"20245100","award":"AM","awardPoints":""}"#;
        let record: AwardRecord = serde_json::from_str(json).unwrap();
        assert!(record.award_points.is_none());

        let json = r#"{"awardNum":"20245100","award":"AM","awardPoints":"82"}"#;
        let record: AwardRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.award_points, Some(Quantity::Count(82)));
    }

    #[test]
    fn test_measure_value_sentinels() {
        assert_eq!(MeasureValue::parse("N/A"), Some(MeasureValue::NotApplicable));
        assert_eq!(MeasureValue::parse("nm"), Some(MeasureValue::NotMeasured));
        assert_eq!(MeasureValue::parse(" 7.5 "), Some(MeasureValue::Value(7.5)));
        assert_eq!(MeasureValue::parse("about 7"), None);
        assert!(MeasureValue::Value(0.0).is_empty());
        assert!(!MeasureValue::NotMeasured.is_empty());
    }

    #[test]
    fn test_measurements_serialize_with_labels() {
        let mut m = Measurements::default();
        m.kind = MeasurementType::LipAndLateralSepal;
        m.values.insert(MeasureField::Ns, MeasureValue::Value(10.2));
        m.values.insert(MeasureField::Lipw, MeasureValue::NotMeasured);

        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["type"], "Lip&LateralSepal");
        assert_eq!(json["values"]["NS"], 10.2);
        assert_eq!(json["values"]["LIPW"], "NM");

        let back: Measurements = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_measurement_type_derivation() {
        let mut values = BTreeMap::new();
        assert_eq!(MeasurementType::derive(&values), MeasurementType::NotApplicable);

        values.insert(MeasureField::Dsw, MeasureValue::Value(2.1));
        assert_eq!(MeasurementType::derive(&values), MeasurementType::General);

        values.insert(MeasureField::Lsw, MeasureValue::Value(1.4));
        assert_eq!(MeasurementType::derive(&values), MeasurementType::LateralSepal);

        values.insert(MeasureField::Lipl, MeasureValue::Value(3.0));
        assert_eq!(MeasurementType::derive(&values), MeasurementType::LipAndLateralSepal);

        values.remove(&MeasureField::Lsw);
        assert_eq!(MeasurementType::derive(&values), MeasurementType::Lip);
    }

    #[test]
    fn test_expected_fields_by_type() {
        assert!(MeasurementType::Lip.expected_fields().contains(&MeasureField::Lipw));
        assert!(!MeasurementType::Lip.expected_fields().contains(&MeasureField::Lsw));
        assert!(MeasurementType::NotApplicable.expected_fields().is_empty());
        assert_eq!(MeasurementType::Unset.expected_fields().len(), MeasureField::ALL.len());
    }

    #[test]
    fn test_content_eq_ignores_timestamps() {
        let mut a = AwardRecord::new("20225300");
        a.add_provenance("override-registry", "override:20225300", vec!["cross".into()], None);
        let mut b = a.clone();
        b.provenance[0].timestamp = Utc::now() + chrono::Duration::seconds(30);

        assert_ne!(a, b);
        assert!(a.content_eq(&b));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("").len(), 64);
    }

    #[test]
    fn test_plant_label() {
        let mut record = AwardRecord::new("20225300");
        record.genus = "Cattleya".into();
        record.species = "Little Bit".into();
        record.clone = "Pele".into();
        assert_eq!(record.plant_label(), "Cattleya Little Bit 'Pele'");

        record.clone = NOT_APPLICABLE.into();
        assert_eq!(record.plant_label(), "Cattleya Little Bit");
    }
}
