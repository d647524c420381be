use std::path::PathBuf;

use thiserror::Error;

pub use crate::align::AlignError;
pub use crate::collaborators::CollaboratorError;
pub use crate::db::DatabaseError;
pub use crate::logging::LoggingError;
pub use crate::pipeline::PipelineError;
pub use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ChemfuseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Alignment error: {0}")]
    Align(#[from] AlignError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
}

pub type Result<T> = std::result::Result<T, ChemfuseError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid quality rule for '{field}': {reason}")]
    InvalidRule { field: String, reason: String },

    #[error("Invalid export task '{name}': {reason}")]
    InvalidExportTask { name: String, reason: String },
}

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Document id must not be empty")]
    EmptyDocumentId,

    #[error("Failed to register submission: {0}")]
    Store(#[from] DatabaseError),

    #[error("Failed to spawn job thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Job {job_key} did not finish within {seconds}s")]
    WaitTimeout { job_key: String, seconds: u64 },

    #[error("Job {0} stayed expired past the poll tolerance")]
    Unrecoverable(String),
}
