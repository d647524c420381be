//! Per-document processing: parse, classify, recognize, extract, align,
//! validate and persist.

pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod runner;

pub use config::PipelineConfig;
pub use context::{ExtractedRecord, PipelineContext, RecognizedStructure, StagedIdentity};
pub use error::{PipelineError, PipelineWarning};
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter, RecordingProgress};
pub use runner::Pipeline;
