use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::align::EntityAligner;
use crate::broadcast::{JobProgressBroadcaster, JobProgressEvent, JobSnapshot, JobStage, JobStore};
use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::db::{default_database_path, document_repo, Database};
use crate::error::{ChemfuseError, ConfigError, OrchestratorError};
use crate::pipeline::{BroadcastProgress, Pipeline, PipelineConfig, PipelineContext};
use crate::store::IntegrationStore;
use crate::worker::job::{FailureKind, Job, JobFailure, JobKey};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Answer to a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job will stop at its next stage boundary.
    Requested,
    AlreadyFinished,
    NotFound,
}

type CancelFlags = Arc<Mutex<HashMap<JobKey, Arc<AtomicBool>>>>;

/// Accepts submissions and runs each job on its own thread.
pub struct JobOrchestrator {
    pipeline: Arc<Pipeline>,
    jobs: Arc<JobStore>,
    broadcaster: JobProgressBroadcaster,
    cancel_flags: CancelFlags,
    expired_poll_tolerance: u32,
}

impl JobOrchestrator {
    pub fn new(pipeline: Arc<Pipeline>, jobs: Arc<JobStore>) -> Self {
        Self {
            pipeline,
            jobs,
            broadcaster: JobProgressBroadcaster::default(),
            cancel_flags: Arc::new(Mutex::new(HashMap::new())),
            expired_poll_tolerance: 3,
        }
    }

    pub fn with_expired_poll_tolerance(mut self, tolerance: u32) -> Self {
        self.expired_poll_tolerance = tolerance;
        self
    }

    /// Opens the configured database and wires the pipeline around it.
    pub fn from_config(
        config: &Config,
        collaborators: Collaborators,
    ) -> Result<Self, ChemfuseError> {
        let path = config
            .database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(default_database_path)
            .ok_or_else(|| ConfigError::Validation {
                message: "no database_path configured and no home directory found".to_string(),
            })?;
        let db = Database::open(&path)?;

        let store = IntegrationStore::new(db.clone()).with_export_tasks(config.export.tasks.clone());
        let pipeline = Pipeline::new(
            Arc::new(PipelineConfig::from_config(config)),
            collaborators,
            Arc::new(EntityAligner::new(db)),
            store,
        );
        let jobs = Arc::new(JobStore::new(Duration::from_secs(config.jobs.retention_secs)));

        Ok(Self::new(Arc::new(pipeline), jobs)
            .with_expired_poll_tolerance(config.jobs.expired_poll_tolerance))
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn store(&self) -> &IntegrationStore {
        self.pipeline.store()
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn expired_poll_tolerance(&self) -> u32 {
        self.expired_poll_tolerance
    }

    /// Receives every progress event of every job from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<JobProgressEvent> {
        self.broadcaster.subscribe()
    }

    fn lock_flags(&self) -> MutexGuard<'_, HashMap<JobKey, Arc<AtomicBool>>> {
        lock_flags(&self.cancel_flags)
    }

    /// Registers the document and starts a job for it. Re-submitting a
    /// document starts a new job that replaces its records when it persists.
    pub fn submit(&self, document_id: &str, source_ref: &str) -> Result<JobKey, OrchestratorError> {
        let document_id = document_id.trim();
        if document_id.is_empty() {
            return Err(OrchestratorError::EmptyDocumentId);
        }

        let job = Job::new(document_id, source_ref);
        let key = job.key.clone();
        document_repo::register_submission(
            self.pipeline.store().database(),
            document_id,
            source_ref,
            key.as_str(),
        )?;

        self.jobs.update_from_event(&JobProgressEvent::new(
            &key,
            document_id,
            JobStage::Queued,
            "Job queued for processing",
        ));
        let progress = BroadcastProgress::new(self.broadcaster.start_job(&job), Arc::clone(&self.jobs));
        self.lock_flags().insert(key.clone(), job.cancel_flag());

        let pipeline = Arc::clone(&self.pipeline);
        let flags = Arc::clone(&self.cancel_flags);
        let spawned = thread::Builder::new()
            .name(format!("job-{}", key))
            .spawn(move || {
                let key = job.key.clone();
                let (result, _ctx) = pipeline.run(PipelineContext::new(job), &progress);
                lock_flags(&flags).remove(&key);
                if result.success {
                    debug!("Job {} completed", key);
                } else {
                    debug!("Job {} failed", key);
                }
            });

        match spawned {
            Ok(_) => {
                info!("Submitted document {} as job {}", document_id, key);
                Ok(key)
            }
            Err(e) => {
                error!("Failed to start job {}: {}", key, e);
                self.lock_flags().remove(&key);
                let failure = JobFailure {
                    kind: FailureKind::Internal,
                    message: e.to_string(),
                    failed_stage: JobStage::Queued,
                    last_completed_stage: JobStage::Queued,
                };
                if let Err(db_err) = document_repo::update_status(
                    self.pipeline.store().database(),
                    document_id,
                    key.as_str(),
                    crate::model::DocumentStatus::Failed,
                    Some(&failure.describe()),
                ) {
                    warn!("Failed to record start failure of {}: {}", key, db_err);
                }
                let event = JobProgressEvent::failed(&key, document_id, failure);
                self.jobs.update_from_event(&event);
                self.broadcaster.send(event);
                Err(OrchestratorError::Spawn(e))
            }
        }
    }

    /// Current state of a job. Keys this process does not know report
    /// `Expired`, with the document's durable status when the key was the
    /// document's last job.
    pub fn poll(&self, job_key: &JobKey) -> JobSnapshot {
        if let Some(snapshot) = self.jobs.get(job_key) {
            return snapshot;
        }
        let document = match self.pipeline.store().document_for_job(job_key.as_str()) {
            Ok(document) => document,
            Err(e) => {
                warn!("Document lookup for expired job {} failed: {}", job_key, e);
                None
            }
        };
        JobSnapshot::expired(job_key, document.as_ref())
    }

    /// Requests cooperative cancellation. The job stops before its next
    /// stage; records it already persisted stay.
    pub fn cancel(&self, job_key: &JobKey) -> CancelOutcome {
        let flag = self.lock_flags().get(job_key).cloned();
        match flag {
            Some(flag) if self.jobs.is_running(job_key) => {
                flag.store(true, Ordering::SeqCst);
                self.jobs.mark_cancel_requested(job_key);
                info!("Cancellation requested for job {}", job_key);
                CancelOutcome::Requested
            }
            _ if self.jobs.get(job_key).is_some() => CancelOutcome::AlreadyFinished,
            _ => CancelOutcome::NotFound,
        }
    }

    /// Polls until the job reaches `Completed` or `Failed`.
    ///
    /// An `Expired` answer is accepted after `expired_tolerance` consecutive
    /// polls when it carries the document's durable status; otherwise the
    /// job is reported as unrecoverable.
    pub fn wait(
        &self,
        job_key: &JobKey,
        timeout: Duration,
        expired_tolerance: u32,
    ) -> Result<JobSnapshot, OrchestratorError> {
        let deadline = Instant::now() + timeout;
        let mut expired_polls = 0u32;

        loop {
            let snapshot = self.poll(job_key);
            if snapshot.is_finished() {
                return Ok(snapshot);
            }

            if snapshot.is_expired() {
                expired_polls += 1;
                if expired_polls > expired_tolerance {
                    return match snapshot.document_status {
                        Some(_) => Ok(snapshot),
                        None => Err(OrchestratorError::Unrecoverable(job_key.to_string())),
                    };
                }
            } else {
                expired_polls = 0;
            }

            if Instant::now() >= deadline {
                return Err(OrchestratorError::WaitTimeout {
                    job_key: job_key.to_string(),
                    seconds: timeout.as_secs(),
                });
            }
            thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Snapshots of jobs still running.
    pub fn running(&self) -> Vec<JobSnapshot> {
        self.jobs.running()
    }
}

fn lock_flags(flags: &CancelFlags) -> MutexGuard<'_, HashMap<JobKey, Arc<AtomicBool>>> {
    match flags.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Cancel flag lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
