pub mod align;
pub mod broadcast;
pub mod collaborators;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod quality;
pub mod review;
pub mod store;
pub mod worker;

pub use align::{EntityAligner, Resolution, ResolutionOutcome};
pub use broadcast::{JobProgressBroadcaster, JobSnapshot, JobStage, JobStore};
pub use collaborators::{Collaborators, FixtureBundle, FixtureCollaborators};
pub use config::{load_config, load_config_from_str, Config};
pub use db::Database;
pub use error::{ChemfuseError, ConfigError, OrchestratorError, Result};
pub use logging::init_logging;
pub use model::{MeasurementRecord, QualityFlag, RecordKind};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext};
pub use quality::{QualityReport, QualityRuleEngine, RuleSet};
pub use review::{LlmReviewer, Verdict};
pub use store::{ExportFilter, ExportTask, IntegrationStore};
pub use worker::{CancelOutcome, JobKey, JobOrchestrator};
