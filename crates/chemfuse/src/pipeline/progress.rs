use std::sync::{Arc, Mutex};

use crate::broadcast::job_progress::{JobProgressEvent, JobProgressTracker, JobStage};
use crate::broadcast::JobStore;
use crate::worker::job::{JobFailure, JobSummary};

/// Events emitted by the pipeline during processing.
pub enum ProgressEvent {
    Stage { stage: JobStage, message: String },
    Completed { summary: JobSummary },
    Failed { failure: JobFailure },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Records every event, for tests that check the stage sequence.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<JobStage>>,
}

impl RecordingProgress {
    pub fn stages(&self) -> Vec<JobStage> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        let stage = match event {
            ProgressEvent::Stage { stage, .. } => stage,
            ProgressEvent::Completed { .. } => JobStage::Completed,
            ProgressEvent::Failed { .. } => JobStage::Failed,
        };
        match self.events.lock() {
            Ok(mut events) => events.push(stage),
            Err(poisoned) => poisoned.into_inner().push(stage),
        }
    }
}

/// Bridges pipeline events to the job store and the broadcast channel.
///
/// The store is updated before the event is broadcast, so a subscriber that
/// polls on receipt always observes the event.
pub struct BroadcastProgress {
    tracker: JobProgressTracker,
    store: Arc<JobStore>,
}

impl BroadcastProgress {
    pub fn new(tracker: JobProgressTracker, store: Arc<JobStore>) -> Self {
        Self { tracker, store }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        let key = self.tracker.job_key();
        let document_id = self.tracker.document_id();
        let event = match event {
            ProgressEvent::Stage { stage, message } => {
                JobProgressEvent::new(key, document_id, stage, &message)
            }
            ProgressEvent::Completed { summary } => {
                JobProgressEvent::completed(key, document_id, summary)
            }
            ProgressEvent::Failed { failure } => JobProgressEvent::failed(key, document_id, failure),
        };
        self.store.update_from_event(&event);
        self.tracker.send(event);
    }
}
