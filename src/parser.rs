// 🏗️ Field Extractor - award notice → draft record
// One generalized parser driven by a declarative dialect instead of one
// script per competition year.

use crate::classifier::AwardCatalog;
use crate::error::ExtractionError;
use crate::location::{LocationConflict, LocationNormalizer};
use crate::record::{
    fingerprint, AwardRecord, MeasureField, MeasureValue, MeasurementType, Measurements, Quantity,
    TextField, SPECIES_MARKER,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Raw source document as supplied by the retrieval collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub award_num: String,
    pub content: String,

    /// Location for this award according to the yearly listing page, if known
    pub listing_location: Option<String>,
}

impl SourceDocument {
    pub fn new(award_num: impl Into<String>, content: impl Into<String>) -> Self {
        SourceDocument {
            award_num: award_num.into(),
            content: content.into(),
            listing_location: None,
        }
    }

    pub fn with_listing_location(mut self, location: impl Into<String>) -> Self {
        self.listing_location = Some(location.into());
        self
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.content)
    }
}

/// Ordered line rules. The first rule matching a line consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineRule {
    DateLocation,
    PlantWithClone,
    PlantName,
    Parentage,
    SpeciesMarker,
    AwardAlias,
    AwardWithPoints,
    AwardOnly,
    Exhibitor,
    Photographer,
}

impl LineRule {
    pub const DEFAULT_ORDER: [LineRule; 10] = [
        LineRule::DateLocation,
        LineRule::PlantWithClone,
        LineRule::PlantName,
        LineRule::Parentage,
        LineRule::SpeciesMarker,
        LineRule::AwardAlias,
        LineRule::AwardWithPoints,
        LineRule::AwardOnly,
        LineRule::Exhibitor,
        LineRule::Photographer,
    ];

    /// Stable identifier recorded in provenance
    pub fn id(&self) -> &'static str {
        match self {
            LineRule::DateLocation => "date_location",
            LineRule::PlantWithClone => "plant_with_clone",
            LineRule::PlantName => "plant_name",
            LineRule::Parentage => "parentage",
            LineRule::SpeciesMarker => "species_marker",
            LineRule::AwardAlias => "award_alias",
            LineRule::AwardWithPoints => "award_with_points",
            LineRule::AwardOnly => "award_only",
            LineRule::Exhibitor => "exhibitor_prefix",
            LineRule::Photographer => "photographer_prefix",
        }
    }
}

/// Document dialect: everything that varies between yearly batches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Dialect {
    pub name: String,
    pub year: Option<i32>,

    /// Separators between date and location on the first content line
    pub date_location_separators: Vec<String>,

    /// Regex whose first capture group is the primary content block
    pub primary_block_pattern: String,

    /// Content lines matching this are headings, not data
    pub skip_line_pattern: String,

    pub rules: Vec<LineRule>,

    /// Extra written-out award names for this dialect ("Show Trophy" -> ST)
    pub award_aliases: BTreeMap<String, String>,

    /// Point-carrying codes this dialect adds to the catalog
    pub extra_award_codes: Vec<String>,
}

impl Dialect {
    /// Catalog widened with this dialect's aliases and codes
    pub fn extend_catalog(&self, mut catalog: AwardCatalog) -> AwardCatalog {
        for (alias, code) in &self.award_aliases {
            catalog
                .aliases
                .insert(alias.trim().to_uppercase(), code.trim().to_uppercase());
        }
        for code in &self.extra_award_codes {
            catalog.point_codes.insert(code.trim().to_uppercase());
        }
        catalog
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect {
            name: "notice-markup".to_string(),
            year: None,
            date_location_separators: vec![" - ".into(), " – ".into(), " — ".into()],
            primary_block_pattern: r#"(?is)<font[^>]*size\s*=\s*["']?\+1["']?[^>]*>(.*?)</font>"#
                .to_string(),
            skip_line_pattern: r"(?i)^award\s+\d+".to_string(),
            rules: LineRule::DEFAULT_ORDER.to_vec(),
            award_aliases: BTreeMap::new(),
            extra_award_codes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedLine {
    pub index: usize,
    pub text: String,
}

/// A line that matched a rule whose field was already populated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnoredLine {
    pub index: usize,
    pub text: String,
    pub rule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionDiagnostics {
    pub line_count: usize,
    pub unmatched: Vec<UnmatchedLine>,
    pub ignored: Vec<IgnoredLine>,
    pub location_conflict: Option<LocationConflict>,
}

/// Output of parse(): the draft plus which rule produced each field
#[derive(Debug, Clone)]
pub struct Extraction {
    pub record: AwardRecord,

    /// Field name -> rule id
    pub field_rules: BTreeMap<String, String>,

    pub diagnostics: ExtractionDiagnostics,
}

impl Extraction {
    pub fn rule_for(&self, field: &str) -> Option<&str> {
        self.field_rules.get(field).map(|s| s.as_str())
    }
}

// ============================================================================
// COMPOSABLE TRAITS
// ============================================================================

/// AwardParser - core trait: one source document in, one draft record out
pub trait AwardParser: Send + Sync {
    /// Parse a document. Failures come back as values, never panics.
    fn parse(&self, doc: &SourceDocument) -> Result<Extraction, ExtractionError>;

    /// Dialect this parser was built for
    fn dialect_name(&self) -> &str;

    /// Parser version (for provenance tracking)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

/// MeasurementExtractor - optional capability: the measurement table alone
pub trait MeasurementExtractor {
    fn extract_measurements(&self, doc: &SourceDocument) -> Measurements;
}

// ============================================================================
// MARKUP HELPERS
// ============================================================================

fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex must compile"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?s)<[^>]*>")
}

fn line_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?i)<br\s*/?>|\r?\n|\|")
}

fn block_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?i)<br\s*/?>|</p>|</tr>|</div>|</h\d>")
}

fn numeric_entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"&#(\d{1,6});")
}

fn row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?is)<tr[^>]*>(.*?)</tr>")
}

fn cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?is)<t[dh][^>]*>(.*?)</t[dh]>")
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?is)<title[^>]*>(.*?)</title>")
}

fn description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?is)Description\s*:\s*(.*?)(?:</table>|\z)")
}

fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    let numeric = numeric_entity_re().replace_all(&named, |caps: &regex::Captures| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    // &amp; last so "&amp;lt;" stays literal
    numeric.replace("&amp;", "&")
}

/// Markup fragment -> single-spaced text
fn fragment_text(fragment: &str) -> String {
    let stripped = tag_re().replace_all(fragment, " ");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whole document -> text with one line per visual line
fn document_text(content: &str) -> String {
    let broken = block_break_re().replace_all(content, "\n");
    tag_re()
        .replace_all(&broken, " ")
        .lines()
        .map(|l| decode_entities(l).split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// NOTICE PARSER
// ============================================================================

struct LinePatterns {
    plant_with_clone: Regex,
    plant_name: Regex,
    parentage: Regex,
    award_with_points: Regex,
    award_only: Regex,
    exhibitor: Regex,
    photographer: Regex,
    loose_date_location: Regex,
    title_plant_with_clone: Regex,
    title_plant_name: Regex,
    body_exhibitor: Regex,
    body_photographer: Regex,
}

impl LinePatterns {
    fn build(catalog: &AwardCatalog) -> Result<Self> {
        let codes = catalog
            .all_codes()
            .iter()
            .map(|c| regex::escape(c))
            .collect::<Vec<_>>()
            .join("|");

        Ok(LinePatterns {
            plant_with_clone: Regex::new(r"^([A-Z][a-z]+)\s+(.+?)\s+['‘]([^'’]+)['’]$")?,
            plant_name: Regex::new(r"^([A-Z][a-z]+)\s+([a-z][a-zA-Z\s]+)$")?,
            parentage: Regex::new(r"^\((.+)\)$")?,
            award_with_points: Regex::new(&format!(r"(?i)^({})\s+(\d+)$", codes))?,
            award_only: Regex::new(&format!(r"(?i)^({})$", codes))?,
            exhibitor: Regex::new(r"(?i)^Exhibited\s+by:?\s*(.+)$")?,
            photographer: Regex::new(r"(?i)^(?:Photographer|Photo\s+by):?\s*(.+)$")?,
            loose_date_location: Regex::new(r"^([A-Z][a-z]+\.?\s+\d{1,2},?\s*\d{4})\s+(.+)$")?,
            title_plant_with_clone: Regex::new(r"([A-Z][a-zA-Z]+)\s+([a-zA-Z][a-zA-Z\s]+?)\s+'([^']+)'")?,
            title_plant_name: Regex::new(r"([A-Z][a-zA-Z]+)\s+([a-z][a-zA-Z\s]+)")?,
            body_exhibitor: Regex::new(r"(?im)Exhibited\s+by[:\s]+(.+?)\s*$")?,
            body_photographer: Regex::new(r"(?im)(?:Photographer:|Photo\s+by:?)\s*(.+?)\s*$")?,
        })
    }
}

/// What a rule did with a line
enum RuleOutcome {
    NoMatch,
    Applied,
    AlreadySet,
}

/// Working state for one parse
struct Draft {
    record: AwardRecord,
    field_rules: BTreeMap<String, String>,
}

impl Draft {
    /// Fill a text field if empty; returns false when it was already set
    fn fill(&mut self, field: TextField, value: &str, rule: &str) -> bool {
        let value = value.trim();
        if value.is_empty() {
            return false;
        }
        if !self.record.is_text_empty(field) {
            return false;
        }
        *self.record.text_mut(field) = value.to_string();
        self.field_rules.insert(field.name().to_string(), rule.to_string());
        true
    }

    fn fill_points(&mut self, points: Quantity, rule: &str) {
        if self.record.award_points.is_none() {
            self.record.award_points = Some(points);
            self.field_rules.insert("awardPoints".to_string(), rule.to_string());
        }
    }
}

/// Dialect-driven parser for award notice documents
pub struct NoticeParser {
    dialect: Dialect,
    catalog: AwardCatalog,
    normalizer: LocationNormalizer,
    primary_block: Regex,
    skip_line: Regex,
    patterns: LinePatterns,
}

impl NoticeParser {
    pub fn new(dialect: Dialect, catalog: AwardCatalog, normalizer: LocationNormalizer) -> Result<Self> {
        let catalog = dialect.extend_catalog(catalog);
        let primary_block = Regex::new(&dialect.primary_block_pattern)
            .with_context(|| format!("Invalid primary block pattern in dialect {}", dialect.name))?;
        let skip_line = Regex::new(&dialect.skip_line_pattern)
            .with_context(|| format!("Invalid skip line pattern in dialect {}", dialect.name))?;
        let patterns = LinePatterns::build(&catalog).context("Failed to build line patterns")?;

        Ok(NoticeParser {
            dialect,
            catalog,
            normalizer,
            primary_block,
            skip_line,
            patterns,
        })
    }

    /// Parser with the default dialect, catalog and synonym table
    pub fn with_defaults() -> Result<Self> {
        Self::new(Dialect::default(), AwardCatalog::default(), LocationNormalizer::new())
    }

    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Content lines of the primary block, headings and blanks removed
    pub fn primary_lines(&self, content: &str) -> Option<Vec<String>> {
        let caps = self.primary_block.captures(content)?;
        let block = caps.get(1).or_else(|| caps.get(0))?.as_str();

        let lines = line_break_re()
            .split(block)
            .map(fragment_text)
            .filter(|l| !l.is_empty())
            .filter(|l| !self.skip_line.is_match(l))
            .collect();
        Some(lines)
    }

    fn apply_rule(&self, rule: LineRule, index: usize, line: &str, draft: &mut Draft) -> RuleOutcome {
        let p = &self.patterns;
        let id = rule.id();

        match rule {
            LineRule::DateLocation => {
                if index != 0 {
                    return RuleOutcome::NoMatch;
                }
                let Some((date, location)) = self.split_date_location(line) else {
                    return RuleOutcome::NoMatch;
                };
                let date_set = draft.fill(TextField::Date, &date, id);
                let location_set = draft.fill(TextField::Location, &location, id);
                if date_set || location_set {
                    RuleOutcome::Applied
                } else {
                    RuleOutcome::AlreadySet
                }
            }
            LineRule::PlantWithClone => match p.plant_with_clone.captures(line) {
                Some(_) if !draft.record.is_text_empty(TextField::Genus) => RuleOutcome::AlreadySet,
                Some(caps) => {
                    draft.fill(TextField::Genus, &caps[1], id);
                    draft.fill(TextField::Species, &caps[2], id);
                    draft.fill(TextField::Clone, &caps[3], id);
                    RuleOutcome::Applied
                }
                None => RuleOutcome::NoMatch,
            },
            LineRule::PlantName => {
                if line.contains("by:") {
                    return RuleOutcome::NoMatch;
                }
                match p.plant_name.captures(line) {
                    Some(_) if !draft.record.is_text_empty(TextField::Genus) => RuleOutcome::AlreadySet,
                    Some(caps) => {
                        draft.fill(TextField::Genus, &caps[1], id);
                        draft.fill(TextField::Species, &caps[2], id);
                        RuleOutcome::Applied
                    }
                    None => RuleOutcome::NoMatch,
                }
            }
            LineRule::Parentage => match p.parentage.captures(line) {
                Some(caps) => fill_outcome(draft.fill(TextField::Cross, &caps[1], id)),
                None => RuleOutcome::NoMatch,
            },
            LineRule::SpeciesMarker => {
                if line.trim().eq_ignore_ascii_case(SPECIES_MARKER) {
                    fill_outcome(draft.fill(TextField::Cross, SPECIES_MARKER, id))
                } else {
                    RuleOutcome::NoMatch
                }
            }
            LineRule::AwardAlias => match self.catalog.resolve_alias(line) {
                Some(code) => {
                    let code = code.to_string();
                    self.fill_award(draft, &code, None, id)
                }
                None => RuleOutcome::NoMatch,
            },
            LineRule::AwardWithPoints => match p.award_with_points.captures(line) {
                Some(caps) => {
                    let code = caps[1].to_uppercase();
                    let points = caps[2].parse::<u32>().ok();
                    self.fill_award(draft, &code, points, id)
                }
                None => RuleOutcome::NoMatch,
            },
            LineRule::AwardOnly => match p.award_only.captures(line) {
                Some(caps) => {
                    let code = caps[1].to_uppercase();
                    self.fill_award(draft, &code, None, id)
                }
                None => RuleOutcome::NoMatch,
            },
            LineRule::Exhibitor => match p.exhibitor.captures(line) {
                Some(caps) => fill_outcome(draft.fill(TextField::Exhibitor, &caps[1], id)),
                None => RuleOutcome::NoMatch,
            },
            LineRule::Photographer => match p.photographer.captures(line) {
                Some(caps) => fill_outcome(draft.fill(TextField::Photographer, &caps[1], id)),
                None => RuleOutcome::NoMatch,
            },
        }
    }

    fn fill_award(&self, draft: &mut Draft, code: &str, points: Option<u32>, rule: &str) -> RuleOutcome {
        if !draft.record.is_text_empty(TextField::Award) {
            return RuleOutcome::AlreadySet;
        }
        draft.fill(TextField::Award, code, rule);

        if self.catalog.is_no_point(code) {
            draft.fill_points(Quantity::NotApplicable, rule);
        } else if let Some(points) = points {
            draft.fill_points(Quantity::Count(points), rule);
        }
        RuleOutcome::Applied
    }

    fn split_date_location(&self, line: &str) -> Option<(String, String)> {
        for separator in &self.dialect.date_location_separators {
            if let Some((date, location)) = line.split_once(separator.as_str()) {
                let (date, location) = (date.trim(), location.trim());
                if !date.is_empty() && !location.is_empty() {
                    return Some((date.to_string(), location.to_string()));
                }
            }
        }

        self.patterns
            .loose_date_location
            .captures(line)
            .map(|caps| (caps[1].trim().to_string(), caps[2].trim().to_string()))
    }

    /// Fallbacks outside the primary block: title and body text
    fn apply_fallbacks(&self, doc: &SourceDocument, draft: &mut Draft) {
        let p = &self.patterns;

        if draft.record.is_text_empty(TextField::Genus) {
            if let Some(title) = title_re().captures(&doc.content).map(|c| fragment_text(&c[1])) {
                if let Some(caps) = p.title_plant_with_clone.captures(&title) {
                    draft.fill(TextField::Genus, &caps[1], "title_plant_with_clone");
                    draft.fill(TextField::Species, &caps[2], "title_plant_with_clone");
                    draft.fill(TextField::Clone, &caps[3], "title_plant_with_clone");
                } else if let Some(caps) = p.title_plant_name.captures(&title) {
                    draft.fill(TextField::Genus, &caps[1], "title_plant_name");
                    draft.fill(TextField::Species, &caps[2], "title_plant_name");
                }
            }
        }

        let needs_exhibitor = draft.record.is_text_empty(TextField::Exhibitor);
        let needs_photographer = draft.record.is_text_empty(TextField::Photographer);
        if !needs_exhibitor && !needs_photographer {
            return;
        }

        let text = document_text(&doc.content);
        if needs_exhibitor {
            if let Some(caps) = p.body_exhibitor.captures(&text) {
                draft.fill(TextField::Exhibitor, &caps[1], "body_exhibitor");
            }
        }
        if needs_photographer {
            let found = p
                .body_photographer
                .captures_iter(&text)
                .map(|caps| caps[1].trim().to_string())
                .find(|v| !v.is_empty() && !v.to_lowercase().contains("unknown"));
            if let Some(name) = found {
                draft.fill(TextField::Photographer, &name, "body_photographer");
            }
        }
    }
}

fn fill_outcome(applied: bool) -> RuleOutcome {
    if applied {
        RuleOutcome::Applied
    } else {
        RuleOutcome::AlreadySet
    }
}

impl AwardParser for NoticeParser {
    fn parse(&self, doc: &SourceDocument) -> Result<Extraction, ExtractionError> {
        let lines = self
            .primary_lines(&doc.content)
            .ok_or_else(|| ExtractionError::structural(&doc.award_num, "primary content block not found"))?;
        if lines.is_empty() {
            return Err(ExtractionError::structural(&doc.award_num, "primary content block is empty"));
        }

        let mut draft = Draft {
            record: AwardRecord::new(doc.award_num.clone()),
            field_rules: BTreeMap::new(),
        };
        let mut diagnostics = ExtractionDiagnostics {
            line_count: lines.len(),
            ..Default::default()
        };

        for (index, line) in lines.iter().enumerate() {
            let mut consumed = false;
            for rule in &self.dialect.rules {
                match self.apply_rule(*rule, index, line, &mut draft) {
                    RuleOutcome::NoMatch => continue,
                    RuleOutcome::Applied => {}
                    RuleOutcome::AlreadySet => diagnostics.ignored.push(IgnoredLine {
                        index,
                        text: line.clone(),
                        rule: rule.id().to_string(),
                    }),
                }
                consumed = true;
                break;
            }
            if !consumed {
                debug!(award_num = %doc.award_num, line = %line, "line matched no rule");
                diagnostics.unmatched.push(UnmatchedLine {
                    index,
                    text: line.clone(),
                });
            }
        }

        self.apply_fallbacks(doc, &mut draft);

        if let Some(listing) = doc.listing_location.as_deref() {
            diagnostics.location_conflict = self.normalizer.check(
                &doc.award_num,
                (draft.record.location.as_str(), "award-page"),
                (listing, "listing"),
            );
            draft.fill(TextField::Location, listing, "listing_location");
        }

        let measurements = self.extract_measurements(doc);
        for (field, _) in &measurements.values {
            draft
                .field_rules
                .insert(format!("measurements.{}", field.label()), "measurement_table".into());
        }
        if measurements.has_description() {
            draft
                .field_rules
                .insert("measurements.description".into(), "description_block".into());
        }
        draft.record.measurements = measurements;
        draft.record.source_hash = doc.fingerprint();

        Ok(Extraction {
            record: draft.record,
            field_rules: draft.field_rules,
            diagnostics,
        })
    }

    fn dialect_name(&self) -> &str {
        &self.dialect.name
    }
}

impl MeasurementExtractor for NoticeParser {
    fn extract_measurements(&self, doc: &SourceDocument) -> Measurements {
        let mut measurements = Measurements::default();

        for row in row_re().captures_iter(&doc.content) {
            let cells: Vec<String> = cell_re()
                .captures_iter(&row[1])
                .map(|c| fragment_text(&c[1]))
                .collect();

            for pair in cells.chunks(2) {
                let [label, value] = pair else { continue };

                if let Some(field) = MeasureField::from_label(label) {
                    // Only numbers from the table; sentinels are decided later
                    if let Ok(number) = value.trim().parse::<f64>() {
                        if number.is_finite() {
                            measurements
                                .values
                                .entry(field)
                                .or_insert(MeasureValue::Value(number));
                        }
                    }
                    continue;
                }

                let label = label.to_lowercase();
                let Ok(count) = value.trim().parse::<u32>() else { continue };
                let slot = if label.contains("flwrs") || label.contains("flowers") {
                    &mut measurements.num_flowers
                } else if label.contains("buds") {
                    &mut measurements.num_buds
                } else if label.contains("infl") {
                    &mut measurements.num_inflorescences
                } else {
                    continue;
                };
                slot.get_or_insert(Quantity::Count(count));
            }
        }

        if let Some(caps) = description_re().captures(&doc.content) {
            measurements.description = fragment_text(&caps[1]);
        }

        measurements.kind = MeasurementType::derive(&measurements.values);
        measurements
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn notice(lines: &[&str], extra: &str) -> String {
        format!(
            r#"<html><head><title>Award Notice</title></head><body>
<table><tr><td><font size="+1">{}</font></td></tr></table>
{}
</body></html>"#,
            lines.join("<br>\n"),
            extra
        )
    }

    const MEASUREMENT_TABLE: &str = r#"<table>
<tr><td>NS</td><td>10.2</td><td>NSV</td><td>9.8</td></tr>
<tr><td>DSW</td><td>2.1</td><td>DSL</td><td>4.5</td></tr>
<tr><td>LIPW</td><td>3.0</td><td>LSL</td><td>n/a</td></tr>
<tr><td># flwrs</td><td>4</td><td># buds</td><td>2</td><td># infl</td><td>1</td></tr>
</table>
<table><tr><td>Description: Four flowers and two buds
on one inflorescence; sepals white.</td></tr></table>"#;

    fn parse(content: &str) -> Extraction {
        let parser = NoticeParser::with_defaults().unwrap();
        parser.parse(&SourceDocument::new("20225300", content)).unwrap()
    }

    #[test]
    fn test_full_plant_name_with_points() {
        let content = notice(
            &[
                "Award 20225300",
                "October 4, 2022 - San Francisco Monthly",
                "Cattleya Little Bit 'Pele'",
                "(Cattleya Hsinying Catherine x Cattleya Pink Doll)",
                "AM 80",
                "Exhibited by: Jane Doe",
                "Photographer: J. Smith",
            ],
            "",
        );

        let extraction = parse(&content);
        let record = &extraction.record;

        assert_eq!(record.date, "October 4, 2022");
        assert_eq!(record.location, "San Francisco Monthly");
        assert_eq!(record.genus, "Cattleya");
        assert_eq!(record.species, "Little Bit");
        assert_eq!(record.clone, "Pele");
        assert_eq!(record.cross, "Cattleya Hsinying Catherine x Cattleya Pink Doll");
        assert_eq!(record.award, "AM");
        assert_eq!(record.award_points, Some(Quantity::Count(80)));
        assert_eq!(record.exhibitor, "Jane Doe");
        assert_eq!(record.photographer, "J. Smith");
        assert!(extraction.diagnostics.unmatched.is_empty());
        assert_eq!(extraction.rule_for("genus"), Some("plant_with_clone"));
        assert_eq!(extraction.rule_for("awardPoints"), Some("award_with_points"));
        assert_eq!(record.source_hash, fingerprint(&content));
    }

    #[test]
    fn test_first_plant_name_wins() {
        let content = notice(
            &[
                "May 2, 2023 - Filoli Historic House",
                "Paphiopedilum rothschildianum 'Leo'",
                "Paphiopedilum adductum 'Ace'",
                "HCC 77",
            ],
            "",
        );

        let extraction = parse(&content);
        assert_eq!(extraction.record.species, "rothschildianum");
        assert_eq!(extraction.record.clone, "Leo");
        assert_eq!(extraction.diagnostics.ignored.len(), 1);
        assert_eq!(extraction.diagnostics.ignored[0].rule, "plant_with_clone");
    }

    #[test]
    fn test_species_marker_and_plain_species() {
        let content = notice(
            &["March 1, 2024 - San Francisco", "Dendrobium kingianum", "species", "CCM 84"],
            "",
        );

        let record = parse(&content).record;
        assert_eq!(record.genus, "Dendrobium");
        assert_eq!(record.species, "kingianum");
        assert_eq!(record.clone, "");
        assert_eq!(record.cross, SPECIES_MARKER);
        assert_eq!(record.award, "CCM");
    }

    #[test]
    fn test_no_point_codes_force_not_applicable() {
        let content = notice(&["March 1, 2024 - San Francisco", "Masdevallia veitchiana", "CBR 82"], "");
        let record = parse(&content).record;
        assert_eq!(record.award, "CBR");
        assert_eq!(record.award_points, Some(Quantity::NotApplicable));

        let content = notice(&["March 1, 2024 - San Francisco", "jc"], "");
        let record = parse(&content).record;
        assert_eq!(record.award, "JC");
        assert_eq!(record.award_points, Some(Quantity::NotApplicable));
    }

    #[test]
    fn test_award_alias_line() {
        let content = notice(&["March 1, 2024 - Pacific Orchid Exposition", "Show Trophy"], "");
        let record = parse(&content).record;
        assert_eq!(record.award, "ST");
        assert_eq!(record.award_points, Some(Quantity::NotApplicable));
    }

    #[test]
    fn test_point_award_without_points_leaves_points_unset() {
        let content = notice(&["March 1, 2024 - San Francisco", "Cymbidium eburneum", "FCC"], "");
        let record = parse(&content).record;
        assert_eq!(record.award, "FCC");
        assert!(record.award_points.is_none());
    }

    #[test]
    fn test_unmatched_lines_are_retained() {
        let content = notice(
            &["March 1, 2024 - San Francisco", "Oncidium Sharry Baby", "Best in show, table 4"],
            "",
        );

        let extraction = parse(&content);
        let unmatched: Vec<&str> = extraction
            .diagnostics
            .unmatched
            .iter()
            .map(|u| u.text.as_str())
            .collect();
        // Hybrid grex without clone is not a recognized plant form
        assert_eq!(unmatched, vec!["Oncidium Sharry Baby", "Best in show, table 4"]);
        assert!(extraction.record.genus.is_empty());
    }

    #[test]
    fn test_loose_first_line_without_separator() {
        let content = notice(&["October 4, 2022 San Francisco Monthly", "AM 80"], "");
        let record = parse(&content).record;
        assert_eq!(record.date, "October 4, 2022");
        assert_eq!(record.location, "San Francisco Monthly");
    }

    #[test]
    fn test_missing_primary_block_is_structural_failure() {
        let parser = NoticeParser::with_defaults().unwrap();
        let doc = SourceDocument::new("20225263", "<html><body><p>Page moved</p></body></html>");

        let err = parser.parse(&doc).unwrap_err();
        assert_eq!(err.reason_code(), "structural-parse-failure");
        assert_eq!(err.award_num(), "20225263");

        let empty_block = SourceDocument::new("20225264", r#"<font size="+1"> <br> </font>"#);
        assert!(parser.parse(&empty_block).is_err());
    }

    #[test]
    fn test_measurement_table() {
        let content = notice(&["March 1, 2024 - San Francisco", "Cattleya Little Bit 'Pele'", "AM 80"], MEASUREMENT_TABLE);
        let extraction = parse(&content);
        let m = &extraction.record.measurements;

        assert_eq!(m.get(MeasureField::Ns), Some(MeasureValue::Value(10.2)));
        assert_eq!(m.get(MeasureField::Dsl), Some(MeasureValue::Value(4.5)));
        assert_eq!(m.get(MeasureField::Lipw), Some(MeasureValue::Value(3.0)));
        // Non-numeric value left unset
        assert_eq!(m.get(MeasureField::Lsl), None);
        assert_eq!(m.num_flowers, Some(Quantity::Count(4)));
        assert_eq!(m.num_buds, Some(Quantity::Count(2)));
        assert_eq!(m.num_inflorescences, Some(Quantity::Count(1)));
        assert_eq!(
            m.description,
            "Four flowers and two buds on one inflorescence; sepals white."
        );
        assert_eq!(m.kind, MeasurementType::LipAndLateralSepal);
        assert_eq!(extraction.rule_for("measurements.NS"), Some("measurement_table"));
    }

    #[test]
    fn test_no_measurements_gives_not_applicable_type() {
        let content = notice(&["March 1, 2024 - San Francisco", "AM 80"], "");
        let record = parse(&content).record;
        assert_eq!(record.measurements.kind, MeasurementType::NotApplicable);
        assert!(record.measurements.values.is_empty());
        assert!(record.measurements.description.is_empty());
    }

    #[test]
    fn test_body_fallbacks() {
        let content = notice(
            &["March 1, 2024 - San Francisco", "AM 80"],
            "<p>Exhibited by: Orchid Acres</p><table><tr><td>Photographer:</td><td>J. Smith</td></tr></table>",
        )
        .replace("<title>Award Notice</title>", "<title>Vanda coerulea 'Blue Sky' AM/AOS</title>");

        let extraction = parse(&content);
        let record = &extraction.record;
        assert_eq!(record.genus, "Vanda");
        assert_eq!(record.species, "coerulea");
        assert_eq!(record.clone, "Blue Sky");
        assert_eq!(record.exhibitor, "Orchid Acres");
        assert_eq!(record.photographer, "J. Smith");
        assert_eq!(extraction.rule_for("photographer"), Some("body_photographer"));
    }

    #[test]
    fn test_listing_location_conflict_is_reported() {
        let parser = NoticeParser::with_defaults().unwrap();
        let content = notice(&["March 1, 2024 - San Francisco", "AM 80"], "");

        let agreeing = SourceDocument::new("20245001", content.clone()).with_listing_location("San Francisco Monthly");
        assert!(parser.parse(&agreeing).unwrap().diagnostics.location_conflict.is_none());

        let disagreeing = SourceDocument::new("20245001", content).with_listing_location("Filoli");
        let extraction = parser.parse(&disagreeing).unwrap();
        let conflict = extraction.diagnostics.location_conflict.expect("conflict");
        assert_eq!(conflict.first, "San Francisco");
        assert_eq!(conflict.second, "Filoli");
        // Extracted value is kept as-is
        assert_eq!(extraction.record.location, "San Francisco");
    }

    #[test]
    fn test_listing_location_fills_empty_location() {
        let parser = NoticeParser::with_defaults().unwrap();
        let content = notice(&["Cattleya Little Bit 'Pele'", "AM 80"], "");
        let doc = SourceDocument::new("20245002", content).with_listing_location("Filoli Historic House");

        let extraction = parser.parse(&doc).unwrap();
        assert_eq!(extraction.record.location, "Filoli Historic House");
        assert_eq!(extraction.rule_for("location"), Some("listing_location"));
        assert!(extraction.record.date.is_empty());
    }

    #[test]
    fn test_pipe_separated_plain_text_dialect() {
        let dialect = Dialect {
            name: "plain-text".into(),
            primary_block_pattern: r"(?s)\A(.*?)(?:\n\s*\n|\z)".into(),
            ..Dialect::default()
        };
        let parser = NoticeParser::new(dialect, AwardCatalog::default(), LocationNormalizer::new()).unwrap();
        let doc = SourceDocument::new(
            "20265001",
            "January 7, 2026 - San Francisco | Phalaenopsis Matthew Berry 'My Love' | HCC 78 | Exhibited by: Lee Park\n\nnotes follow",
        );

        let record = parser.parse(&doc).unwrap().record;
        assert_eq!(record.location, "San Francisco");
        assert_eq!(record.species, "Matthew Berry");
        assert_eq!(record.award_points, Some(Quantity::Count(78)));
        assert_eq!(record.exhibitor, "Lee Park");
        assert_eq!(parser.dialect_name(), "plain-text");
    }

    #[test]
    fn test_dialect_aliases_and_codes() {
        let mut dialect = Dialect::default();
        dialect.award_aliases.insert("Judges Commendation".into(), "JC".into());
        dialect.extra_award_codes.push("GM".into());
        let parser = NoticeParser::new(dialect, AwardCatalog::default(), LocationNormalizer::new()).unwrap();

        let doc = SourceDocument::new("20215001", notice(&["June 5, 2021 - Filoli", "Judges Commendation"], ""));
        let record = parser.parse(&doc).unwrap().record;
        assert_eq!(record.award, "JC");
        assert_eq!(record.award_points, Some(Quantity::NotApplicable));

        let doc = SourceDocument::new("20215002", notice(&["June 5, 2021 - Filoli", "GM 90"], ""));
        let record = parser.parse(&doc).unwrap().record;
        assert_eq!(record.award, "GM");
        assert_eq!(record.award_points, Some(Quantity::Count(90)));
    }

    #[test]
    fn test_invalid_dialect_pattern_is_config_error() {
        let dialect = Dialect {
            primary_block_pattern: "(unclosed".into(),
            ..Dialect::default()
        };
        assert!(NoticeParser::new(dialect, AwardCatalog::default(), LocationNormalizer::new()).is_err());
    }

    #[test]
    fn test_entities_decoded() {
        assert_eq!(fragment_text("Filoli Historic House &amp; Garden"), "Filoli Historic House & Garden");
        assert_eq!(fragment_text("<b>O&#39;Brien</b>&nbsp;Farms"), "O'Brien Farms");
    }
}
