use std::collections::BTreeMap;

use crate::align::PreparedStructure;
use crate::broadcast::JobStage;
use crate::collaborators::{FigureBlock, ParsedDocument};
use crate::model::MeasurementRecord;
use crate::quality::QualityReport;
use crate::review::ReviewedRecord;
use crate::worker::job::Job;

use super::error::PipelineWarning;

/// Structure recognized for one local label.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedStructure {
    pub figure_id: String,
    pub region: String,
    /// `None` when the recognition was below the acceptance threshold.
    pub smiles: Option<String>,
    pub confidence: f64,
}

/// A record read from a table, with the text it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    pub record: MeasurementRecord,
    pub source_context: String,
}

/// Identity input for one label, resolved only when persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedIdentity {
    pub local_label: String,
    pub prepared: PreparedStructure,
    pub display_name: Option<String>,
}

pub struct PipelineContext {
    // Input
    pub job: Job,

    // Last stage that finished without error
    pub last_completed: JobStage,

    // Parsing result
    pub parsed: Option<ParsedDocument>,

    // Classifying result: figures showing molecular structures
    pub structure_figures: Vec<FigureBlock>,

    // Recognizing result, keyed by local label
    pub recognitions: BTreeMap<String, RecognizedStructure>,

    // Extracting result
    pub extracted: Vec<ExtractedRecord>,
    pub skipped_records: usize,

    // Aligning result
    pub identities: Vec<StagedIdentity>,

    // Validating result
    pub validated: Vec<ReviewedRecord>,
    pub quality: Option<QualityReport>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl PipelineContext {
    pub fn new(job: Job) -> Self {
        Self {
            job,
            last_completed: JobStage::Queued,
            parsed: None,
            structure_figures: Vec::new(),
            recognitions: BTreeMap::new(),
            extracted: Vec::new(),
            skipped_records: 0,
            identities: Vec::new(),
            validated: Vec::new(),
            quality: None,
            warnings: Vec::new(),
        }
    }

    pub fn warn(&mut self, warning: PipelineWarning) {
        tracing::warn!(job_key = %self.job.key, "{}", warning);
        self.warnings.push(warning);
    }
}
