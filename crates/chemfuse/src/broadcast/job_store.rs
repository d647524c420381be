//! Process-local job store with a declared retention policy.
//!
//! Running jobs live in a map until they reach a terminal stage, then move
//! into a TTL cache. Once a finished job ages out of the cache, or after a
//! restart, its key is unknown here and polls fall through to `Expired`.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::Serialize;

use crate::broadcast::job_progress::{JobProgressEvent, JobStage};
use crate::model::{Document, DocumentStatus};
use crate::worker::job::{JobFailure, JobKey, JobSummary};

/// What `poll` reports for a job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_key: JobKey,
    /// `None` only for expired keys that match no document.
    pub document_id: Option<String>,
    pub stage: JobStage,
    /// 0-100, never lowered over the life of a job.
    pub progress: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<JobSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub cancel_requested: bool,
    /// Durable outcome of the document, reported with `Expired`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_status: Option<DocumentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// Creates a snapshot from the first event seen for a job.
    pub fn from_event(event: &JobProgressEvent) -> Self {
        let finished_at = event.stage.is_terminal().then_some(event.timestamp);
        Self {
            job_key: event.job_key.clone(),
            document_id: Some(event.document_id.clone()),
            stage: event.stage,
            progress: event.progress,
            message: event.message.clone(),
            summary: event.summary.clone(),
            failure: event.failure.clone(),
            cancel_requested: false,
            document_status: None,
            started_at: Some(event.timestamp),
            updated_at: event.timestamp,
            finished_at,
        }
    }

    /// The `Expired` answer for a key this process does not know.
    /// `document` is the document whose last job had this key, if any.
    pub fn expired(job_key: &JobKey, document: Option<&Document>) -> Self {
        let status = document.map(|d| d.status);
        Self {
            job_key: job_key.clone(),
            document_id: document.map(|d| d.document_id.clone()),
            stage: JobStage::Expired,
            progress: match status {
                Some(DocumentStatus::Completed) => 100.0,
                _ => 0.0,
            },
            message: match status {
                Some(status) => format!("Job is no longer tracked; document is {}", status),
                None => "Job is no longer tracked".to_string(),
            },
            summary: None,
            failure: None,
            cancel_requested: false,
            document_status: status,
            started_at: None,
            updated_at: Utc::now(),
            finished_at: document.and_then(|d| d.completed_at),
        }
    }

    /// Updates the job from a progress event.
    pub fn update_from_event(&mut self, event: &JobProgressEvent) {
        self.stage = event.stage;
        self.message = event.message.clone();
        self.updated_at = event.timestamp;
        if event.progress > self.progress {
            self.progress = event.progress;
        }
        if event.stage.is_terminal() {
            self.finished_at = Some(event.timestamp);
        }
        if event.summary.is_some() {
            self.summary = event.summary.clone();
        }
        if event.failure.is_some() {
            self.failure = event.failure.clone();
        }
    }

    /// Returns true if this job is finished (completed or failed).
    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn is_expired(&self) -> bool {
        self.stage == JobStage::Expired
    }
}

/// In-memory job registry.
pub struct JobStore {
    running: RwLock<HashMap<JobKey, JobSnapshot>>,
    finished: Cache<JobKey, JobSnapshot>,
    retention: Duration,
}

impl JobStore {
    /// Finished jobs stay pollable for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self {
            running: RwLock::new(HashMap::new()),
            finished: Cache::builder().time_to_live(retention).build(),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn read_running(&self) -> RwLockReadGuard<'_, HashMap<JobKey, JobSnapshot>> {
        match self.running.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("JobStore lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_running(&self) -> RwLockWriteGuard<'_, HashMap<JobKey, JobSnapshot>> {
        match self.running.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("JobStore lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Applies a progress event. Terminal events move the job to the
    /// retention cache. Events for jobs that already finished are ignored.
    pub fn update_from_event(&self, event: &JobProgressEvent) {
        let mut running = self.write_running();

        if !running.contains_key(&event.job_key) {
            if self.finished.contains_key(&event.job_key) {
                log::debug!(
                    "Ignoring {} event for finished job {}",
                    event.stage,
                    event.job_key
                );
                return;
            }
            running.insert(event.job_key.clone(), JobSnapshot::from_event(event));
        } else if let Some(job) = running.get_mut(&event.job_key) {
            job.update_from_event(event);
        }

        if event.stage.is_terminal() {
            if let Some(job) = running.remove(&event.job_key) {
                log::debug!("Job {} finished as {}", job.job_key, job.stage);
                self.finished.insert(job.job_key.clone(), job);
            }
        }
    }

    /// Flags a running job as cancel-requested. Returns false when the job
    /// is not running.
    pub fn mark_cancel_requested(&self, job_key: &JobKey) -> bool {
        match self.write_running().get_mut(job_key) {
            Some(job) => {
                job.cancel_requested = true;
                true
            }
            None => false,
        }
    }

    /// Gets a job by key, running or retained.
    pub fn get(&self, job_key: &JobKey) -> Option<JobSnapshot> {
        if let Some(job) = self.read_running().get(job_key) {
            return Some(job.clone());
        }
        self.finished.get(job_key)
    }

    pub fn is_running(&self, job_key: &JobKey) -> bool {
        self.read_running().contains_key(job_key)
    }

    /// Snapshots of every running job.
    pub fn running(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = self.read_running().values().cloned().collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        jobs
    }

    pub fn running_count(&self) -> usize {
        self.read_running().len()
    }

    /// Drops a retained job ahead of its retention window.
    pub fn evict(&self, job_key: &JobKey) {
        self.finished.invalidate(job_key);
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityReport;
    use crate::worker::job::{FailureKind, Job};

    fn event(job: &Job, stage: JobStage) -> JobProgressEvent {
        JobProgressEvent::new(&job.key, &job.document_id, stage, &stage.to_string())
    }

    #[test]
    fn test_running_job_is_tracked() {
        let store = JobStore::default();
        let job = Job::new("D1", "d1.json");

        store.update_from_event(&event(&job, JobStage::Queued));
        store.update_from_event(&event(&job, JobStage::Parsing));

        let snapshot = store.get(&job.key).unwrap();
        assert_eq!(snapshot.stage, JobStage::Parsing);
        assert_eq!(snapshot.progress, 12.5);
        assert!(store.is_running(&job.key));
        assert_eq!(store.running_count(), 1);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let store = JobStore::default();
        let job = Job::new("D1", "d1.json");

        store.update_from_event(&event(&job, JobStage::Aligning));
        store.update_from_event(&event(&job, JobStage::Parsing));

        let snapshot = store.get(&job.key).unwrap();
        assert_eq!(snapshot.stage, JobStage::Parsing);
        assert_eq!(snapshot.progress, 62.5);
    }

    #[test]
    fn test_finished_job_moves_to_cache() {
        let store = JobStore::default();
        let job = Job::new("D1", "d1.json");
        store.update_from_event(&event(&job, JobStage::Queued));

        let summary = JobSummary {
            document_id: "D1".to_string(),
            compounds: vec![],
            record_ids: vec![],
            skipped_records: 0,
            quality: QualityReport::default(),
            warnings: vec![],
        };
        store.update_from_event(&JobProgressEvent::completed(&job.key, "D1", summary));

        assert!(!store.is_running(&job.key));
        let snapshot = store.get(&job.key).unwrap();
        assert!(snapshot.is_finished());
        assert_eq!(snapshot.progress, 100.0);
        assert!(snapshot.summary.is_some());

        // late events do not resurrect the job
        store.update_from_event(&event(&job, JobStage::Persisting));
        assert!(!store.is_running(&job.key));
        assert_eq!(store.get(&job.key).unwrap().stage, JobStage::Completed);
    }

    #[test]
    fn test_failed_job_keeps_progress() {
        let store = JobStore::default();
        let job = Job::new("D1", "d1.json");
        store.update_from_event(&event(&job, JobStage::Recognizing));

        store.update_from_event(&JobProgressEvent::failed(
            &job.key,
            "D1",
            JobFailure {
                kind: FailureKind::Recognition,
                message: "timeout".to_string(),
                failed_stage: JobStage::Recognizing,
                last_completed_stage: JobStage::Classifying,
            },
        ));

        let snapshot = store.get(&job.key).unwrap();
        assert_eq!(snapshot.stage, JobStage::Failed);
        assert_eq!(snapshot.progress, 37.5);
        assert_eq!(
            snapshot.failure.unwrap().last_completed_stage,
            JobStage::Classifying
        );
    }

    #[test]
    fn test_retention_expires_finished_jobs() {
        let store = JobStore::new(Duration::from_millis(50));
        let job = Job::new("D1", "d1.json");
        store.update_from_event(&event(&job, JobStage::Queued));
        store.update_from_event(&JobProgressEvent::failed(
            &job.key,
            "D1",
            JobFailure {
                kind: FailureKind::Cancelled,
                message: "cancelled".to_string(),
                failed_stage: JobStage::Parsing,
                last_completed_stage: JobStage::Queued,
            },
        ));
        assert!(store.get(&job.key).is_some());

        std::thread::sleep(Duration::from_millis(150));
        assert!(store.get(&job.key).is_none());
    }

    #[test]
    fn test_cancel_request_only_for_running() {
        let store = JobStore::default();
        let job = Job::new("D1", "d1.json");
        assert!(!store.mark_cancel_requested(&job.key));

        store.update_from_event(&event(&job, JobStage::Queued));
        assert!(store.mark_cancel_requested(&job.key));
        assert!(store.get(&job.key).unwrap().cancel_requested);
    }

    #[test]
    fn test_expired_snapshot_without_document() {
        let snapshot = JobSnapshot::expired(&JobKey::from("gone"), None);
        assert!(snapshot.is_expired());
        assert!(snapshot.document_id.is_none());
        assert!(snapshot.document_status.is_none());
    }
}
