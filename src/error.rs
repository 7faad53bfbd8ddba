//! Failure taxonomy for the per-identifier pipeline
//!
//! Every variant maps to a stable reason code so batch reports can be
//! grouped and diffed across runs.

use thiserror::Error;

/// Why an identifier could not be turned into a record
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// No document exists for the identifier
    #[error("source document not found for {award_num}")]
    SourceMissing { award_num: String },

    /// Repair asked for an identifier with no stored record
    #[error("no stored record for {award_num}")]
    RecordMissing { award_num: String },

    /// Primary content block absent or unparseable
    #[error("structural parse failure for {award_num}: {detail}")]
    StructuralParse { award_num: String, detail: String },

    /// Reading the source or writing the output failed
    #[error("I/O failure for {award_num}: {detail}")]
    Io { award_num: String, detail: String },
}

impl ExtractionError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            ExtractionError::SourceMissing { .. } => "source-missing",
            ExtractionError::RecordMissing { .. } => "record-missing",
            ExtractionError::StructuralParse { .. } => "structural-parse-failure",
            ExtractionError::Io { .. } => "io-failure",
        }
    }

    pub fn award_num(&self) -> &str {
        match self {
            ExtractionError::SourceMissing { award_num }
            | ExtractionError::RecordMissing { award_num }
            | ExtractionError::StructuralParse { award_num, .. }
            | ExtractionError::Io { award_num, .. } => award_num,
        }
    }

    pub fn io(award_num: &str, err: &anyhow::Error) -> Self {
        ExtractionError::Io {
            award_num: award_num.to_string(),
            detail: format!("{:#}", err),
        }
    }

    pub fn structural(award_num: &str, detail: impl Into<String>) -> Self {
        ExtractionError::StructuralParse {
            award_num: award_num.to_string(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        let missing = ExtractionError::SourceMissing {
            award_num: "20225001".into(),
        };
        assert_eq!(missing.reason_code(), "source-missing");
        assert_eq!(missing.award_num(), "20225001");

        let parse = ExtractionError::structural("20225002", "primary content block not found");
        assert_eq!(parse.reason_code(), "structural-parse-failure");
        assert!(parse.to_string().contains("primary content block"));

        let io = ExtractionError::Io {
            award_num: "20225003".into(),
            detail: "disk full".into(),
        };
        assert_eq!(io.reason_code(), "io-failure");

        let stored = ExtractionError::RecordMissing {
            award_num: "20225004".into(),
        };
        assert_eq!(stored.reason_code(), "record-missing");
    }
}
