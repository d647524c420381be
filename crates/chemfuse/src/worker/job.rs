use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::align::Resolution;
use crate::broadcast::job_progress::JobStage;
use crate::quality::QualityReport;

/// Opaque job handle returned by `submit`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One submission of one document.
#[derive(Debug, Clone)]
pub struct Job {
    pub key: JobKey,
    pub document_id: String,
    pub source_ref: String,
    cancel: Arc<AtomicBool>,
}

impl Job {
    pub fn new(document_id: &str, source_ref: &str) -> Self {
        Self {
            key: JobKey::generate(),
            document_id: document_id.to_string(),
            source_ref: source_ref.to_string(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag the orchestrator sets to request cancellation.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Parse,
    Classification,
    Recognition,
    Extraction,
    Review,
    Timeout,
    AlignerStoreUnavailable,
    StoreUnavailable,
    Cancelled,
    /// The job could not be started.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Parse => "parse_error",
            FailureKind::Classification => "classification_error",
            FailureKind::Recognition => "recognition_error",
            FailureKind::Extraction => "extraction_error",
            FailureKind::Review => "review_error",
            FailureKind::Timeout => "timeout",
            FailureKind::AlignerStoreUnavailable => "aligner_store_unavailable",
            FailureKind::StoreUnavailable => "store_unavailable",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Internal => "internal_error",
        };
        f.write_str(s)
    }
}

/// Error detail of a failed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
    pub failed_stage: JobStage,
    pub last_completed_stage: JobStage,
}

impl JobFailure {
    /// Message stored on the document row.
    pub fn describe(&self) -> String {
        format!("[{}] {} (during {})", self.kind, self.message, self.failed_stage)
    }
}

/// How one local label of the document was resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelResolution {
    pub local_label: String,
    #[serde(flatten)]
    pub resolution: Resolution,
}

/// Result payload of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub document_id: String,
    pub compounds: Vec<LabelResolution>,
    pub record_ids: Vec<String>,
    /// Extracted rows that could not become records, e.g. without a label.
    pub skipped_records: usize,
    pub quality: QualityReport,
    pub warnings: Vec<String>,
}

impl JobSummary {
    /// Compounds that were left provisional by this job.
    pub fn provisional_labels(&self) -> Vec<&str> {
        self.compounds
            .iter()
            .filter(|c| {
                matches!(
                    c.resolution.outcome,
                    crate::align::ResolutionOutcome::Provisional
                )
            })
            .map(|c| c.local_label.as_str())
            .collect()
    }
}

#[derive(Debug)]
pub struct JobResult {
    pub job_key: JobKey,
    pub document_id: String,
    pub success: bool,
    pub summary: Option<JobSummary>,
    pub failure: Option<JobFailure>,
}

impl JobResult {
    pub fn success(job: &Job, summary: JobSummary) -> Self {
        Self {
            job_key: job.key.clone(),
            document_id: job.document_id.clone(),
            success: true,
            summary: Some(summary),
            failure: None,
        }
    }

    pub fn failure(job: &Job, failure: JobFailure) -> Self {
        Self {
            job_key: job.key.clone(),
            document_id: job.document_id.clone(),
            success: false,
            summary: None,
            failure: Some(failure),
        }
    }
}
