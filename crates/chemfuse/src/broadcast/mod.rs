//! Job progress streaming and the process-local job store.

pub mod job_progress;
pub mod job_store;

pub use job_progress::{JobProgressBroadcaster, JobProgressEvent, JobProgressTracker, JobStage};
pub use job_store::{JobSnapshot, JobStore};
