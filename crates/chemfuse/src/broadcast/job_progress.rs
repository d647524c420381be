//! Job progress broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::worker::job::{Job, JobFailure, JobKey, JobSummary};

/// Stage of the per-document state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    Queued,
    Parsing,
    Classifying,
    Recognizing,
    Extracting,
    Aligning,
    Validating,
    Persisting,
    Completed,
    Failed,
    /// Pseudo-stage for keys this process does not know.
    Expired,
}

impl JobStage {
    /// The working stages in execution order.
    pub const PIPELINE: [JobStage; 7] = [
        JobStage::Parsing,
        JobStage::Classifying,
        JobStage::Recognizing,
        JobStage::Extracting,
        JobStage::Aligning,
        JobStage::Validating,
        JobStage::Persisting,
    ];

    /// Fixed progress percentage of a stage. `Failed` and `Expired` carry
    /// no percentage of their own.
    pub fn progress(&self) -> Option<f64> {
        match self {
            JobStage::Queued => Some(0.0),
            JobStage::Parsing => Some(12.5),
            JobStage::Classifying => Some(25.0),
            JobStage::Recognizing => Some(37.5),
            JobStage::Extracting => Some(50.0),
            JobStage::Aligning => Some(62.5),
            JobStage::Validating => Some(75.0),
            JobStage::Persisting => Some(87.5),
            JobStage::Completed => Some(100.0),
            JobStage::Failed | JobStage::Expired => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Queued => write!(f, "Queued"),
            JobStage::Parsing => write!(f, "Parsing"),
            JobStage::Classifying => write!(f, "Classifying"),
            JobStage::Recognizing => write!(f, "Recognizing"),
            JobStage::Extracting => write!(f, "Extracting"),
            JobStage::Aligning => write!(f, "Aligning"),
            JobStage::Validating => write!(f, "Validating"),
            JobStage::Persisting => write!(f, "Persisting"),
            JobStage::Completed => write!(f, "Completed"),
            JobStage::Failed => write!(f, "Failed"),
            JobStage::Expired => write!(f, "Expired"),
        }
    }
}

/// Progress event for a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    /// Unique job key.
    pub job_key: JobKey,
    /// Document being processed.
    pub document_id: String,
    /// Stage the job entered.
    pub stage: JobStage,
    /// Percentage at this event. For failures, the percentage of the stage
    /// that failed.
    pub progress: f64,
    /// Human-readable message describing current activity.
    pub message: String,
    /// Timestamp of this event.
    pub timestamp: DateTime<Utc>,
    /// Result payload (set on completion).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JobSummary>,
    /// Error detail (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
}

impl JobProgressEvent {
    /// Creates a new progress event for a working stage.
    pub fn new(job_key: &JobKey, document_id: &str, stage: JobStage, message: &str) -> Self {
        Self {
            job_key: job_key.clone(),
            document_id: document_id.to_string(),
            stage,
            progress: stage.progress().unwrap_or_default(),
            message: message.to_string(),
            timestamp: Utc::now(),
            summary: None,
            failure: None,
        }
    }

    /// Creates a completion event.
    pub fn completed(job_key: &JobKey, document_id: &str, summary: JobSummary) -> Self {
        let message = format!(
            "Integrated {} records for {} compounds",
            summary.record_ids.len(),
            summary.compounds.len()
        );
        Self {
            summary: Some(summary),
            ..Self::new(job_key, document_id, JobStage::Completed, &message)
        }
    }

    /// Creates a failure event.
    pub fn failed(job_key: &JobKey, document_id: &str, failure: JobFailure) -> Self {
        Self {
            job_key: job_key.clone(),
            document_id: document_id.to_string(),
            stage: JobStage::Failed,
            progress: failure.failed_stage.progress().unwrap_or_default(),
            message: format!("{} failed", failure.failed_stage),
            timestamp: Utc::now(),
            summary: None,
            failure: Some(failure),
        }
    }
}

/// Broadcasts job progress events for streaming.
#[derive(Clone)]
pub struct JobProgressBroadcaster {
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressBroadcaster {
    /// Creates a new job progress broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends a progress event to all subscribers.
    pub fn send(&self, event: JobProgressEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    /// Creates a new subscriber for progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for a submitted job and announces it as queued.
    pub fn start_job(&self, job: &Job) -> JobProgressTracker {
        let tracker = JobProgressTracker::new(&job.key, &job.document_id, Arc::clone(&self.sender));
        tracker.update_stage(JobStage::Queued, "Job queued for processing");
        tracker
    }
}

impl Default for JobProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single job.
pub struct JobProgressTracker {
    job_key: JobKey,
    document_id: String,
    sender: Arc<broadcast::Sender<JobProgressEvent>>,
}

impl JobProgressTracker {
    pub fn new(
        job_key: &JobKey,
        document_id: &str,
        sender: Arc<broadcast::Sender<JobProgressEvent>>,
    ) -> Self {
        Self {
            job_key: job_key.clone(),
            document_id: document_id.to_string(),
            sender,
        }
    }

    pub fn job_key(&self) -> &JobKey {
        &self.job_key
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Publishes an event built elsewhere for this job.
    pub fn send(&self, event: JobProgressEvent) {
        let _ = self.sender.send(event);
    }

    /// Publishes an event and returns it so callers can mirror it elsewhere.
    fn publish(&self, event: JobProgressEvent) -> JobProgressEvent {
        let _ = self.sender.send(event.clone());
        event
    }

    /// Enters a working stage.
    pub fn update_stage(&self, stage: JobStage, message: &str) -> JobProgressEvent {
        self.publish(JobProgressEvent::new(
            &self.job_key,
            &self.document_id,
            stage,
            message,
        ))
    }

    /// Marks the job as completed with its result payload.
    pub fn completed(&self, summary: JobSummary) -> JobProgressEvent {
        self.publish(JobProgressEvent::completed(
            &self.job_key,
            &self.document_id,
            summary,
        ))
    }

    /// Marks the job as failed.
    pub fn failed(&self, failure: JobFailure) -> JobProgressEvent {
        self.publish(JobProgressEvent::failed(
            &self.job_key,
            &self.document_id,
            failure,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityReport;
    use crate::worker::job::FailureKind;

    fn summary() -> JobSummary {
        JobSummary {
            document_id: "D1".to_string(),
            compounds: vec![],
            record_ids: vec!["r1".to_string(), "r2".to_string()],
            skipped_records: 0,
            quality: QualityReport::default(),
            warnings: vec![],
        }
    }

    #[test]
    fn test_stage_percentages_increase() {
        let mut last = JobStage::Queued.progress().unwrap();
        for stage in JobStage::PIPELINE {
            let p = stage.progress().unwrap();
            assert!(p > last, "{} should advance progress", stage);
            last = p;
        }
        assert_eq!(JobStage::Completed.progress(), Some(100.0));
        assert_eq!(JobStage::Failed.progress(), None);
    }

    #[test]
    fn test_start_job() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();
        let job = Job::new("D1", "d1.json");

        let tracker = broadcaster.start_job(&job);

        let received = rx.try_recv().unwrap();
        assert_eq!(received.job_key, job.key);
        assert_eq!(received.stage, JobStage::Queued);
        assert_eq!(received.progress, 0.0);

        tracker.update_stage(JobStage::Parsing, "Parsing document...");
        let received = rx.try_recv().unwrap();
        assert_eq!(received.stage, JobStage::Parsing);
        assert_eq!(received.progress, 12.5);
        assert_eq!(received.message, "Parsing document...");
    }

    #[test]
    fn test_job_completion() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();
        let tracker = broadcaster.start_job(&Job::new("D1", "d1.json"));
        let _ = rx.try_recv(); // queued

        tracker.completed(summary());

        let received = rx.try_recv().unwrap();
        assert_eq!(received.stage, JobStage::Completed);
        assert_eq!(received.progress, 100.0);
        assert_eq!(received.summary.unwrap().record_ids.len(), 2);
    }

    #[test]
    fn test_failure_keeps_stage_percentage() {
        let broadcaster = JobProgressBroadcaster::new(10);
        let mut rx = broadcaster.subscribe();
        let tracker = broadcaster.start_job(&Job::new("D1", "d1.json"));
        let _ = rx.try_recv();

        tracker.failed(JobFailure {
            kind: FailureKind::Extraction,
            message: "extractor offline".to_string(),
            failed_stage: JobStage::Extracting,
            last_completed_stage: JobStage::Recognizing,
        });

        let received = rx.try_recv().unwrap();
        assert_eq!(received.stage, JobStage::Failed);
        assert_eq!(received.progress, 50.0);
        assert_eq!(received.failure.unwrap().kind, FailureKind::Extraction);
    }

    #[test]
    fn test_send_without_subscribers() {
        let broadcaster = JobProgressBroadcaster::default();
        let job = Job::new("D1", "d1.json");
        broadcaster.send(JobProgressEvent::new(&job.key, "D1", JobStage::Queued, "queued"));
    }
}
