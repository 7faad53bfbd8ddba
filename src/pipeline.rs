// 🔄 Pipeline - extract → classify → infer → override → score → repair
// One identifier at a time. A failed identifier is recorded and the batch
// moves on; stopping is only checked between identifiers.

use crate::classifier::AwardClassifier;
use crate::config::PipelineConfig;
use crate::data_quality::{IssueAssessment, IssueClassifier, IssueReport, IssueSeverity, TierCounts};
use crate::error::ExtractionError;
use crate::inference::InferenceEngine;
use crate::location::LocationConflict;
use crate::overrides::OverrideRegistry;
use crate::parser::{AwardParser, NoticeParser, SourceDocument};
use crate::record::AwardRecord;
use crate::repair::RepairOrchestrator;
use crate::store::{
    write_issue_report, DocumentSource, EventKind, FsDocumentSource, JsonStore, PipelineEvent, RecordStore,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub award_num: String,
    pub reason_code: String,
    pub message: String,
}

impl From<&ExtractionError> for BatchFailure {
    fn from(err: &ExtractionError) -> Self {
        BatchFailure {
            award_num: err.award_num().to_string(),
            reason_code: err.reason_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Everything one identifier produced
#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub record: AwardRecord,
    pub initial: IssueAssessment,
    pub final_assessment: IssueAssessment,
    pub repaired: bool,
    pub location_conflicts: Vec<LocationConflict>,
    pub events: Vec<PipelineEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub repaired: usize,
    pub stopped_early: bool,
    pub initial_severity: TierCounts,
    pub final_severity: TierCounts,
    pub failures: Vec<BatchFailure>,
    pub location_conflicts: Vec<LocationConflict>,
}

impl BatchSummary {
    fn new(run_id: &str) -> Self {
        BatchSummary {
            run_id: run_id.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            processed: 0,
            succeeded: 0,
            failed: 0,
            repaired: 0,
            stopped_early: false,
            initial_severity: TierCounts::default(),
            final_severity: TierCounts::default(),
            failures: Vec::new(),
            location_conflicts: Vec::new(),
        }
    }

    fn record_success(&mut self, outcome: &RecordOutcome) {
        self.processed += 1;
        self.succeeded += 1;
        if outcome.repaired {
            self.repaired += 1;
        }
        self.initial_severity.add(outcome.initial.severity);
        self.final_severity.add(outcome.final_assessment.severity);
        self.location_conflicts.extend(outcome.location_conflicts.iter().cloned());
    }

    fn record_failure(&mut self, err: &ExtractionError) {
        self.processed += 1;
        self.failed += 1;
        self.failures.push(BatchFailure::from(err));
    }

    pub fn summary(&self) -> String {
        format!(
            "{} processed, {} succeeded, {} failed, {} repaired, {} clean",
            self.processed, self.succeeded, self.failed, self.repaired, self.final_severity.clean
        )
    }
}

/// Batch result: summary, final issue report, every event
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub issues: IssueReport,
    pub events: Vec<PipelineEvent>,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline<D: DocumentSource, S: RecordStore> {
    parser: NoticeParser,
    inference: InferenceEngine,
    overrides: OverrideRegistry,
    scorer: IssueClassifier,
    repair: Option<RepairOrchestrator>,
    source: D,
    store: S,
    run_id: String,
}

impl Pipeline<FsDocumentSource, JsonStore> {
    /// Wire every stage from configuration. Configuration errors surface
    /// here, before any identifier is processed.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let catalog = config.catalog()?;
        let parser = config.parser()?;
        let overrides = config.overrides()?;

        let mut source = FsDocumentSource::new(&config.source_dir);
        if let Some(listing) = &config.listing_file {
            source = source.with_listing_file(listing)?;
        }
        let store = JsonStore::new(&config.output_dir, &config.backup_dir);

        let repair = config
            .repair
            .then(|| RepairOrchestrator::new(config.repair_strategy, config.normalizer()));

        Ok(Pipeline::new(
            parser,
            InferenceEngine::new(AwardClassifier::new(catalog.clone())),
            overrides,
            IssueClassifier::new(AwardClassifier::new(catalog)),
            repair,
            source,
            store,
        ))
    }
}

impl<D: DocumentSource, S: RecordStore> Pipeline<D, S> {
    pub fn new(
        parser: NoticeParser,
        inference: InferenceEngine,
        overrides: OverrideRegistry,
        scorer: IssueClassifier,
        repair: Option<RepairOrchestrator>,
        source: D,
        store: S,
    ) -> Self {
        Pipeline {
            parser,
            inference,
            overrides,
            scorer,
            repair,
            source,
            store,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn fetch(&self, award_num: &str) -> Result<SourceDocument, ExtractionError> {
        self.source
            .fetch(award_num)
            .map_err(|err| ExtractionError::io(award_num, &err))?
            .ok_or_else(|| ExtractionError::SourceMissing {
                award_num: award_num.to_string(),
            })
    }

    /// Full pipeline for one identifier; the record is written on success.
    /// A stored record that would change is backed up first.
    pub fn process(&self, award_num: &str) -> Result<RecordOutcome, ExtractionError> {
        let mut events = Vec::new();
        let doc = self.fetch(award_num)?;
        let stored = self
            .store
            .read_record(award_num)
            .map_err(|err| ExtractionError::io(award_num, &err))?;

        // Extract
        let extraction = self.parser.parse(&doc)?;
        events.push(PipelineEvent::new(
            award_num,
            EventKind::Extracted,
            json!({
                "dialect": self.parser.dialect_name(),
                "parserVersion": self.parser.version(),
                "lines": extraction.diagnostics.line_count,
                "fields": extraction.field_rules,
                "sourceHash": extraction.record.source_hash,
            }),
        ));
        for line in &extraction.diagnostics.unmatched {
            events.push(PipelineEvent::new(
                award_num,
                EventKind::UnmatchedLine,
                json!({ "index": line.index, "text": line.text }),
            ));
        }
        let mut location_conflicts = Vec::new();
        if let Some(conflict) = &extraction.diagnostics.location_conflict {
            warn!(award_num, "{}", conflict.summary());
            events.push(PipelineEvent::new(award_num, EventKind::LocationConflict, json!(conflict)));
            location_conflicts.push(conflict.clone());
        }

        // Classify + infer + override
        let mut record = self.settle(award_num, &extraction.record, &mut events);

        // Score
        let initial = self.score(award_num, &record, "initial", &mut events);

        // Repair
        let mut final_assessment = initial.clone();
        let mut repaired = false;
        if !initial.severity.is_clean() {
            if let Some(merged) = self.repair_stage(award_num, &record, &doc, &mut events, &mut location_conflicts)? {
                record = merged;
                final_assessment = self.score(award_num, &record, "final", &mut events);
                repaired = true;
            }
        }

        self.replace_record(award_num, stored.as_ref(), &record, &mut events)?;
        debug!(award_num, severity = final_assessment.severity.as_str(), repaired, "record written");

        Ok(RecordOutcome {
            record,
            initial,
            final_assessment,
            repaired,
            location_conflicts,
            events,
        })
    }

    /// Repair a previously stored record against its source. Only fields
    /// empty in the stored record are filled; nothing is written when
    /// nothing changes.
    pub fn repair_record(&self, award_num: &str) -> Result<RecordOutcome, ExtractionError> {
        let mut events = Vec::new();
        let stored = self
            .store
            .read_record(award_num)
            .map_err(|err| ExtractionError::io(award_num, &err))?
            .ok_or_else(|| ExtractionError::RecordMissing {
                award_num: award_num.to_string(),
            })?;
        let doc = self.fetch(award_num)?;

        let initial = self.score(award_num, &stored, "initial", &mut events);

        let mut location_conflicts = Vec::new();
        let mut record = stored.clone();
        let mut repaired = false;
        if !initial.severity.is_clean() {
            if let Some(merged) = self.repair_stage(award_num, &stored, &doc, &mut events, &mut location_conflicts)? {
                record = merged;
                repaired = true;
            }
        }

        // Overrides added since the record was written apply here too
        record = self.settle(award_num, &record, &mut events);
        let final_assessment = if record.content_eq(&stored) {
            initial.clone()
        } else {
            let assessment = self.score(award_num, &record, "final", &mut events);
            self.replace_record(award_num, Some(&stored), &record, &mut events)?;
            assessment
        };
        debug!(award_num, severity = final_assessment.severity.as_str(), repaired, "stored record repaired");

        Ok(RecordOutcome {
            record,
            initial,
            final_assessment,
            repaired,
            location_conflicts,
            events,
        })
    }

    /// infer, then overrides, then infer again: an override may rewrite the award code
    fn settle(&self, award_num: &str, record: &AwardRecord, events: &mut Vec<PipelineEvent>) -> AwardRecord {
        let inferred = self.inference.infer(record);
        if !inferred.is_noop() {
            events.push(PipelineEvent::new(
                award_num,
                EventKind::Inferred,
                json!({ "category": inferred.category.as_str(), "fields": inferred.changed }),
            ));
        }

        let overridden = self.overrides.apply(&inferred.record);
        if !overridden.applied() {
            return inferred.record;
        }
        events.push(PipelineEvent::new(
            award_num,
            EventKind::OverrideApplied,
            json!({ "fields": overridden.fields, "reason": overridden.reason }),
        ));

        let settled = self.inference.infer(&overridden.record);
        if !settled.is_noop() {
            events.push(PipelineEvent::new(
                award_num,
                EventKind::Inferred,
                json!({ "category": settled.category.as_str(), "fields": settled.changed, "after": "override" }),
            ));
        }
        settled.record
    }

    fn score(&self, award_num: &str, record: &AwardRecord, stage: &str, events: &mut Vec<PipelineEvent>) -> IssueAssessment {
        let assessment = self.scorer.assess(record);
        events.push(PipelineEvent::new(
            award_num,
            EventKind::Scored,
            json!({ "stage": stage, "severity": assessment.severity, "missing": assessment.missing_fields }),
        ));
        assessment
    }

    /// Settled record with merged fields, or `None` when nothing merged
    fn repair_stage(
        &self,
        award_num: &str,
        record: &AwardRecord,
        doc: &SourceDocument,
        events: &mut Vec<PipelineEvent>,
        location_conflicts: &mut Vec<LocationConflict>,
    ) -> Result<Option<AwardRecord>, ExtractionError> {
        let Some(orchestrator) = &self.repair else {
            return Ok(None);
        };
        let outcome = orchestrator.repair(record, doc, &self.parser, &self.store, &self.run_id)?;

        for refusal in &outcome.refused {
            events.push(PipelineEvent::new(award_num, EventKind::MergeRefused, json!(refusal)));
        }
        for conflict in &outcome.location_conflicts {
            if !location_conflicts.contains(conflict) {
                events.push(PipelineEvent::new(award_num, EventKind::LocationConflict, json!(conflict)));
                location_conflicts.push(conflict.clone());
            }
        }
        if let Some(failure) = &outcome.extraction_failure {
            debug!(award_num, "{}", failure);
        }
        if let Some(backup) = &outcome.backup {
            events.push(PipelineEvent::new(
                award_num,
                EventKind::BackupWritten,
                json!({ "path": backup.display().to_string(), "runId": self.run_id }),
            ));
        }
        if !outcome.changed() {
            return Ok(None);
        }
        events.push(PipelineEvent::new(award_num, EventKind::RepairMerged, json!({ "fields": outcome.merged })));

        // Merged values can change the category (a recovered award code)
        Ok(Some(self.inference.infer(&outcome.record).record))
    }

    /// Write `record`, backing up a differing stored version under this run
    fn replace_record(
        &self,
        award_num: &str,
        stored: Option<&AwardRecord>,
        record: &AwardRecord,
        events: &mut Vec<PipelineEvent>,
    ) -> Result<(), ExtractionError> {
        if let Some(previous) = stored {
            if previous.content_eq(record) {
                return Ok(());
            }
            // Same path as any repair backup this run: the stored state wins
            let backup = self
                .store
                .write_backup(&self.run_id, previous)
                .map_err(|err| ExtractionError::io(award_num, &err))?;
            if !events.iter().any(|e| e.kind == EventKind::BackupWritten) {
                events.push(PipelineEvent::new(
                    award_num,
                    EventKind::BackupWritten,
                    json!({ "path": backup.display().to_string(), "runId": self.run_id }),
                ));
            }
        }
        self.store
            .write_record(record)
            .map_err(|err| ExtractionError::io(award_num, &err))?;
        Ok(())
    }

    /// Extract every identifier in order. `ids` defaults to every document
    /// in the source; `stop` is honoured between identifiers only.
    pub fn run_batch(&self, ids: Option<Vec<String>>, stop: Option<&AtomicBool>) -> Result<BatchReport> {
        let ids = match ids {
            Some(ids) => ids,
            None => self.source.list_ids()?,
        };
        Ok(self.run_each(ids, stop, |id| self.process(id)))
    }

    /// Repair stored records in order. `ids` defaults to every stored record.
    pub fn repair_stored(&self, ids: Option<Vec<String>>, stop: Option<&AtomicBool>) -> Result<BatchReport> {
        let ids = match ids {
            Some(ids) => ids,
            None => self.store.list_record_ids()?,
        };
        Ok(self.run_each(ids, stop, |id| self.repair_record(id)))
    }

    fn run_each<F>(&self, ids: Vec<String>, stop: Option<&AtomicBool>, step: F) -> BatchReport
    where
        F: Fn(&str) -> Result<RecordOutcome, ExtractionError>,
    {
        info!(run_id = %self.run_id, count = ids.len(), "starting batch");

        let mut summary = BatchSummary::new(&self.run_id);
        let mut events = Vec::new();
        let mut records = Vec::new();
        let mut assessments = Vec::new();

        for award_num in &ids {
            if stop.map_or(false, |s| s.load(Ordering::SeqCst)) {
                info!(run_id = %self.run_id, "stop requested, ending batch");
                summary.stopped_early = true;
                break;
            }

            match step(award_num) {
                Ok(outcome) => {
                    summary.record_success(&outcome);
                    events.extend(outcome.events);
                    records.push(outcome.record);
                    assessments.push(outcome.final_assessment);
                }
                Err(err) => {
                    warn!(award_num = %award_num, reason = err.reason_code(), "{}", err);
                    events.push(PipelineEvent::new(
                        award_num,
                        EventKind::Failed,
                        json!({ "reasonCode": err.reason_code(), "message": err.to_string() }),
                    ));
                    summary.record_failure(&err);
                }
            }
        }

        summary.finished_at = Some(Utc::now());
        info!(run_id = %self.run_id, "{}", summary.summary());

        BatchReport {
            summary,
            issues: IssueReport::build(&records, &assessments),
            events,
        }
    }

    /// summary.json, issues.json, issues.csv, events.jsonl
    pub fn persist(&self, report: &BatchReport) -> Result<()> {
        let summary = serde_json::to_vec_pretty(&report.summary).context("Failed to serialize summary")?;
        self.store.write_report("summary.json", &summary)?;
        write_issue_report(&self.store, &report.issues)?;
        self.store.append_events(&report.events)?;
        Ok(())
    }
}

/// Re-score an existing output directory without extraction
pub fn analyze(store: &JsonStore, scorer: &IssueClassifier) -> Result<IssueReport> {
    let records = store.list_records()?;
    let assessments = scorer.assess_batch(&records);
    let report = IssueReport::build(&records, &assessments);

    for severity in IssueSeverity::ALL {
        debug!(severity = severity.as_str(), count = report.counts.get(severity), "tier");
    }
    write_issue_report(store, &report)?;
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
