// 💾 Store - filesystem collaborators
// Source documents in, one JSON file per record out, plus backups,
// reports and the JSON-lines event log.

use crate::data_quality::IssueReport;
use crate::parser::SourceDocument;
use crate::record::AwardRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Extracted,
    UnmatchedLine,
    OverrideApplied,
    Inferred,
    Scored,
    BackupWritten,
    RepairMerged,
    MergeRefused,
    LocationConflict,
    Failed,
}

/// Every stage change is an event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub award_num: String,
    pub kind: EventKind,
    pub detail: serde_json::Value,
}

impl PipelineEvent {
    pub fn new(award_num: &str, kind: EventKind, detail: serde_json::Value) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            award_num: award_num.to_string(),
            kind,
            detail,
        }
    }
}

// ============================================================================
// DOCUMENT SOURCE
// ============================================================================

/// Retrieval collaborator: raw documents by identifier
pub trait DocumentSource {
    /// `Ok(None)` when no document exists for the identifier
    fn fetch(&self, award_num: &str) -> Result<Option<SourceDocument>>;

    /// Every identifier with a document, sorted
    fn list_ids(&self) -> Result<Vec<String>>;
}

const DOCUMENT_EXTENSIONS: [&str; 3] = ["html", "htm", "txt"];

/// `<dir>/<awardNum>.html` plus an optional yearly listing
pub struct FsDocumentSource {
    dir: PathBuf,

    /// awardNum -> location according to the listing page
    listing: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ListingRow {
    #[serde(rename = "awardNum")]
    award_num: String,
    location: String,
}

impl FsDocumentSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        FsDocumentSource {
            dir: dir.as_ref().to_path_buf(),
            listing: BTreeMap::new(),
        }
    }

    /// Listing CSV with `awardNum,location` columns
    pub fn with_listing_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(path.as_ref())
            .with_context(|| format!("Failed to open listing file: {:?}", path.as_ref()))?;

        for result in rdr.deserialize() {
            let row: ListingRow = result.context("Failed to deserialize listing row")?;
            let location = row.location.trim();
            if !location.is_empty() {
                self.listing.insert(row.award_num.trim().to_string(), location.to_string());
            }
        }
        Ok(self)
    }

    pub fn listing_len(&self) -> usize {
        self.listing.len()
    }

    fn path_for(&self, award_num: &str) -> Option<PathBuf> {
        DOCUMENT_EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", award_num, ext)))
            .find(|p| p.is_file())
    }
}

impl DocumentSource for FsDocumentSource {
    fn fetch(&self, award_num: &str) -> Result<Option<SourceDocument>> {
        let Some(path) = self.path_for(award_num) else {
            return Ok(None);
        };

        let bytes = fs::read(&path).with_context(|| format!("Failed to read source document: {:?}", path))?;
        // Older pages are not always valid UTF-8
        let content = String::from_utf8_lossy(&bytes).into_owned();

        let mut doc = SourceDocument::new(award_num, content);
        if let Some(location) = self.listing.get(award_num) {
            doc = doc.with_listing_location(location.clone());
        }
        Ok(Some(doc))
    }

    fn list_ids(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read source directory: {:?}", self.dir))?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.context("Failed to read directory entry")?.path();
            let known_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| DOCUMENT_EXTENSIONS.contains(&e));
            if !known_ext {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        ids.dedup();
        Ok(ids)
    }
}

// ============================================================================
// RECORD STORE
// ============================================================================

/// Persistence collaborator
pub trait RecordStore {
    fn read_record(&self, award_num: &str) -> Result<Option<AwardRecord>>;
    fn write_record(&self, record: &AwardRecord) -> Result<PathBuf>;

    /// Every identifier with a stored record, sorted
    fn list_record_ids(&self) -> Result<Vec<String>>;

    /// Copy of the pre-repair state, written before the record is replaced
    fn write_backup(&self, run_id: &str, record: &AwardRecord) -> Result<PathBuf>;

    /// Named run report (summary, issue listings)
    fn write_report(&self, name: &str, contents: &[u8]) -> Result<PathBuf>;

    fn append_events(&self, events: &[PipelineEvent]) -> Result<()>;
}

pub const REPORTS_DIR: &str = "reports";
pub const EVENTS_FILE: &str = "events.jsonl";

/// Pretty-printed JSON, one file per identifier
pub struct JsonStore {
    output_dir: PathBuf,
    backup_dir: PathBuf,
}

impl JsonStore {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(output_dir: P, backup_dir: Q) -> Self {
        JsonStore {
            output_dir: output_dir.as_ref().to_path_buf(),
            backup_dir: backup_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.output_dir.join(REPORTS_DIR)
    }

    fn record_path(&self, award_num: &str) -> PathBuf {
        self.output_dir.join(format!("{}.json", award_num))
    }

    /// Every record in the output directory, sorted by identifier
    pub fn list_records(&self) -> Result<Vec<AwardRecord>> {
        self.list_record_ids()?
            .iter()
            .map(|id| read_json::<AwardRecord>(&self.record_path(id)))
            .collect()
    }

    /// Write a JSON report document under `reports/`
    pub fn write_report_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.reports_dir().join(name);
        write_json(&path, value)?;
        Ok(path)
    }

    pub fn read_events(&self) -> Result<Vec<PipelineEvent>> {
        let path = self.reports_dir().join(EVENTS_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path).with_context(|| format!("Failed to read {:?}", path))?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).context("Failed to parse event line"))
            .collect()
    }
}

impl RecordStore for JsonStore {
    fn read_record(&self, award_num: &str) -> Result<Option<AwardRecord>> {
        let path = self.record_path(award_num);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    fn write_record(&self, record: &AwardRecord) -> Result<PathBuf> {
        let path = self.record_path(&record.award_num);
        write_json(&path, record)?;
        Ok(path)
    }

    fn list_record_ids(&self) -> Result<Vec<String>> {
        if !self.output_dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.output_dir)
            .with_context(|| format!("Failed to read output directory: {:?}", self.output_dir))?;

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.context("Failed to read directory entry")?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn write_backup(&self, run_id: &str, record: &AwardRecord) -> Result<PathBuf> {
        let path = self
            .backup_dir
            .join(run_id)
            .join(format!("{}.json", record.award_num));
        write_json(&path, record)?;
        Ok(path)
    }

    fn write_report(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let dir = self.reports_dir();
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;
        let path = dir.join(name);
        fs::write(&path, contents).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }

    /// Append events as JSON lines
    fn append_events(&self, events: &[PipelineEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let dir = self.reports_dir();
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {:?}", dir))?;

        let path = dir.join(EVENTS_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open event log: {:?}", path))?;

        for event in events {
            let line = serde_json::to_string(event).context("Failed to serialize event")?;
            writeln!(file, "{}", line).context("Failed to append event")?;
        }
        Ok(())
    }
}

/// issues.json plus the flat issues.csv
pub fn write_issue_report<S: RecordStore + ?Sized>(store: &S, report: &IssueReport) -> Result<()> {
    let json = serde_json::to_vec_pretty(report).context("Failed to serialize issue report")?;
    store.write_report("issues.json", &json)?;

    let mut csv_bytes = Vec::new();
    report.write_csv(&mut csv_bytes)?;
    store.write_report("issues.csv", &csv_bytes)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    fs::write(path, json + "\n").with_context(|| format!("Failed to write {:?}", path))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Quantity;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_fetch_and_list_documents() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("20225262.html"), "<html>ST</html>").unwrap();
        fs::write(dir.path().join("20225001.html"), "<html>AM</html>").unwrap();
        fs::write(dir.path().join("notes.md"), "ignore me").unwrap();

        let source = FsDocumentSource::new(dir.path());
        assert_eq!(source.list_ids().unwrap(), vec!["20225001", "20225262"]);

        let doc = source.fetch("20225262").unwrap().unwrap();
        assert_eq!(doc.content, "<html>ST</html>");
        assert!(doc.listing_location.is_none());

        assert!(source.fetch("20229999").unwrap().is_none());
    }

    #[test]
    fn test_listing_file_attaches_location() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("20225262.html"), "<html></html>").unwrap();
        let listing = dir.path().join("listing.csv");
        fs::write(&listing, "awardNum,location\n20225262,Filoli Historic House\n20225263,\n").unwrap();

        let source = FsDocumentSource::new(dir.path()).with_listing_file(&listing).unwrap();
        assert_eq!(source.listing_len(), 1);

        let doc = source.fetch("20225262").unwrap().unwrap();
        assert_eq!(doc.listing_location.as_deref(), Some("Filoli Historic House"));
    }

    #[test]
    fn test_record_round_trip_and_listing() {
        let out = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let store = JsonStore::new(out.path(), backups.path());

        let mut record = AwardRecord::new("20225300");
        record.award = "AM".into();
        record.award_points = Some(Quantity::Count(80));
        store.write_record(&record).unwrap();
        store.write_report_json("summary.json", &json!({"processed": 1})).unwrap();

        assert_eq!(store.read_record("20225300").unwrap(), Some(record.clone()));
        assert!(store.read_record("20225301").unwrap().is_none());
        // Reports live in a subdirectory and are not records
        assert_eq!(store.list_records().unwrap(), vec![record]);
        assert_eq!(store.list_record_ids().unwrap(), vec!["20225300".to_string()]);
    }

    #[test]
    fn test_backup_path_by_run() {
        let out = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let store = JsonStore::new(out.path(), backups.path());

        let record = AwardRecord::new("20225300");
        let path = store.write_backup("run-1", &record).unwrap();

        assert_eq!(path, backups.path().join("run-1").join("20225300.json"));
        let saved: AwardRecord = read_json(&path).unwrap();
        assert_eq!(saved, record);
    }

    #[test]
    fn test_event_log_appends() {
        let out = TempDir::new().unwrap();
        let store = JsonStore::new(out.path(), out.path().join("backups"));

        store
            .append_events(&[PipelineEvent::new("20225300", EventKind::Extracted, json!({"lines": 5}))])
            .unwrap();
        store
            .append_events(&[PipelineEvent::new("20225300", EventKind::Scored, json!({"severity": "clean"}))])
            .unwrap();

        let events = store.read_events().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Extracted);
        assert_eq!(events[1].detail["severity"], "clean");
        assert_ne!(events[0].event_id, events[1].event_id);
    }

    #[test]
    fn test_event_kind_names() {
        let json = serde_json::to_value(EventKind::LocationConflict).unwrap();
        assert_eq!(json, "location-conflict");
    }
}
