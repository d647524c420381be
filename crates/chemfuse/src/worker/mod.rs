pub mod job;
pub mod orchestrator;

pub use job::{FailureKind, Job, JobFailure, JobKey, JobResult, JobSummary, LabelResolution};
pub use orchestrator::{CancelOutcome, JobOrchestrator};
