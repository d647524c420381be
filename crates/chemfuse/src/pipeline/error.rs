use std::fmt;

use thiserror::Error;

use crate::align::AlignError;
use crate::collaborators::CollaboratorError;
use crate::db::DatabaseError;
use crate::model::RecordKind;
use crate::store::StoreError;
use crate::worker::job::FailureKind;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("Identity resolution failed: {0}")]
    Align(#[from] AlignError),

    #[error("Persisting failed: {0}")]
    Store(#[from] StoreError),

    #[error("Persisting failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Job was cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Collaborator(e) => match e {
                CollaboratorError::Parse(_) => FailureKind::Parse,
                CollaboratorError::Classification(_) => FailureKind::Classification,
                CollaboratorError::Recognition(_) => FailureKind::Recognition,
                CollaboratorError::Extraction(_) => FailureKind::Extraction,
                CollaboratorError::Judge(_) => FailureKind::Review,
                CollaboratorError::Timeout { .. } => FailureKind::Timeout,
            },
            // Structure problems never abort a job, so any aligner error that
            // reaches here is the identity table failing.
            PipelineError::Align(_) => FailureKind::AlignerStoreUnavailable,
            PipelineError::Store(_) | PipelineError::Database(_) => FailureKind::StoreUnavailable,
            PipelineError::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// Non-fatal findings collected while a job runs.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    /// A figure region could not be tied to a compound label.
    UnlabeledRegion { figure_id: String, region: String },
    /// Recognition below the acceptance threshold; the structure is ignored.
    RejectedRecognition { label: String, confidence: f64 },
    /// Recognition accepted but below the comfort threshold.
    LowConfidence { label: String, confidence: f64 },
    /// Two regions claimed the same label with different structures.
    ConflictingStructures { label: String, kept: String, dropped: String },
    /// The canonicalizer rejected a structure; the label stays provisional.
    StructureRejected { label: String, issue: String },
    /// An extracted row carried no compound label.
    UnlabeledRecord { table_id: String },
    /// An extracted row could not be turned into a record.
    UnreadableRecord { table_id: String, error: String },
    /// A table matched no extraction schema.
    UnroutedTable { table_id: String },
    /// Two rows of one kind landed on the same compound and measurement
    /// context. They are stored as one record carrying the worse flag.
    DuplicateContext {
        kind: RecordKind,
        label: String,
        duplicate_of: String,
        context: String,
    },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::UnlabeledRegion { figure_id, region } => {
                write!(f, "region {} of figure {} has no compound label", region, figure_id)
            }
            PipelineWarning::RejectedRecognition { label, confidence } => write!(
                f,
                "structure for {} ignored, confidence {:.2} too low",
                label, confidence
            ),
            PipelineWarning::LowConfidence { label, confidence } => {
                write!(f, "structure for {} has low confidence {:.2}", label, confidence)
            }
            PipelineWarning::ConflictingStructures {
                label,
                kept,
                dropped,
            } => write!(
                f,
                "conflicting structures for {}: kept {}, dropped {}",
                label, kept, dropped
            ),
            PipelineWarning::StructureRejected { label, issue } => {
                write!(f, "structure for {} rejected: {}", label, issue)
            }
            PipelineWarning::UnlabeledRecord { table_id } => {
                write!(f, "row in table {} has no compound label", table_id)
            }
            PipelineWarning::UnreadableRecord { table_id, error } => {
                write!(f, "row in table {} skipped: {}", table_id, error)
            }
            PipelineWarning::UnroutedTable { table_id } => {
                write!(f, "table {} matched no extraction schema", table_id)
            }
            PipelineWarning::DuplicateContext {
                kind,
                label,
                duplicate_of,
                context,
            } => write!(
                f,
                "{} row for {} duplicates the row for {} in context '{}', merged",
                kind, label, duplicate_of, context
            ),
        }
    }
}
