// Award Pipeline - Core Library
// Exposes all modules for use in the CLI and in tests

pub mod record;       // Award record, measurements, provenance
pub mod error;        // Per-identifier extraction failures
pub mod classifier;   // Award catalog + category classification
pub mod location;     // Location normalization + conflicts
pub mod parser;       // Dialect-driven notice parser
pub mod inference;    // Category-driven field inference
pub mod overrides;    // Manual correction registry
pub mod data_quality; // Issue tiers + reports
pub mod repair;       // Re-derive missing fields from source
pub mod store;        // Source documents, record store, event log
pub mod config;       // TOML + CLI configuration
pub mod pipeline;     // Batch orchestration

// Re-export commonly used types
pub use record::{
    AwardRecord, Measurements, MeasureField, MeasureValue, MeasurementType,
    ProvenanceEntry, Quantity, TextField,
    fingerprint, NOT_APPLICABLE, NOT_MEASURED,
};
pub use error::ExtractionError;
pub use classifier::{AwardCatalog, AwardCategory, AwardClassifier};
pub use location::{LocationConflict, LocationNormalizer};
pub use parser::{
    AwardParser, MeasurementExtractor, NoticeParser,
    Dialect, LineRule, SourceDocument, Extraction, ExtractionDiagnostics,
};
pub use inference::{Inference, InferenceEngine};
pub use overrides::{OverrideEntry, OverrideOutcome, OverrideRegistry};
pub use data_quality::{
    IssueAssessment, IssueClassifier, IssueReport, IssueSeverity, TierCounts,
};
pub use repair::{RepairOrchestrator, RepairOutcome, RepairStrategy};
pub use store::{
    DocumentSource, FsDocumentSource, JsonStore, RecordStore,
    EventKind, PipelineEvent,
};
pub use config::{CliOverrides, PipelineConfig};
pub use pipeline::{analyze, BatchFailure, BatchReport, BatchSummary, Pipeline, RecordOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
