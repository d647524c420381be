//! External collaborators invoked by the pipeline.
//!
//! Document parsing, image classification, structure recognition, field
//! extraction and review run outside this crate. Each is reached through a
//! trait that returns a typed result or fails; nothing is retried.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{FieldMap, MeasurementRecord, RecordKind};
use crate::review::Verdict;

pub mod fixture;
pub mod routing;

pub use fixture::{FixtureBundle, FixtureCollaborators};
pub use routing::route_table;

/// Errors reported by collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollaboratorError {
    #[error("Document parsing failed: {0}")]
    Parse(String),

    #[error("Image classification failed: {0}")]
    Classification(String),

    #[error("Structure recognition failed: {0}")]
    Recognition(String),

    #[error("Field extraction failed: {0}")]
    Extraction(String),

    #[error("Review failed: {0}")]
    Judge(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },
}

/// A table as returned by the document parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableBlock {
    pub table_id: String,
    pub caption: String,
    /// Table body, usually markdown or HTML.
    pub content: String,
}

/// A figure, optionally segmented into regions that each show one structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureBlock {
    pub figure_id: String,
    pub caption: String,
    pub image_ref: String,
    /// Image refs of the segmented regions, in reading order. Empty means
    /// the whole figure is one region.
    pub regions: Vec<String>,
}

impl FigureBlock {
    pub fn region_refs(&self) -> Vec<&str> {
        if self.regions.is_empty() {
            vec![self.image_ref.as_str()]
        } else {
            self.regions.iter().map(String::as_str).collect()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedDocument {
    pub tables: Vec<TableBlock>,
    pub figures: Vec<FigureBlock>,
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCategory {
    MolecularStructure,
    EnergyLevelDiagram,
    DeviceStructure,
    Spectrum,
    Other,
}

impl fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ImageCategory::MolecularStructure => "molecular_structure",
            ImageCategory::EnergyLevelDiagram => "energy_level_diagram",
            ImageCategory::DeviceStructure => "device_structure",
            ImageCategory::Spectrum => "spectrum",
            ImageCategory::Other => "other",
        };
        f.write_str(s)
    }
}

/// A recognized structure with the recognizer's confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub smiles: String,
    pub confidence: f64,
}

/// Which record schema a table is extracted into.
pub type ExtractionSchema = RecordKind;

/// What the field extractor is asked to read.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionSource<'a> {
    pub source_ref: &'a str,
    pub table: &'a TableBlock,
}

pub trait DocumentParser: Send + Sync {
    fn parse(&self, source_ref: &str) -> Result<ParsedDocument, CollaboratorError>;
}

pub trait ImageClassifier: Send + Sync {
    fn classify(&self, image_ref: &str) -> Result<ImageCategory, CollaboratorError>;
}

pub trait StructureRecognizer: Send + Sync {
    fn recognize(&self, image_ref: &str) -> Result<Recognition, CollaboratorError>;
}

pub trait FieldExtractor: Send + Sync {
    fn extract(
        &self,
        source: &ExtractionSource<'_>,
        schema: ExtractionSchema,
    ) -> Result<Vec<FieldMap>, CollaboratorError>;
}

pub trait Judge: Send + Sync {
    fn judge(
        &self,
        record: &MeasurementRecord,
        source_context: &str,
    ) -> Result<Verdict, CollaboratorError>;
}

/// The set of collaborators one pipeline runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub parser: Arc<dyn DocumentParser>,
    pub classifier: Arc<dyn ImageClassifier>,
    pub recognizer: Arc<dyn StructureRecognizer>,
    pub extractor: Arc<dyn FieldExtractor>,
    /// Review is skipped when no judge is configured.
    pub judge: Option<Arc<dyn Judge>>,
}

impl Collaborators {
    /// Serves every role, the judge included, from one fixture source.
    pub fn from_fixtures(fixtures: Arc<FixtureCollaborators>) -> Self {
        Self {
            parser: fixtures.clone(),
            classifier: fixtures.clone(),
            recognizer: fixtures.clone(),
            extractor: fixtures.clone(),
            judge: Some(fixtures),
        }
    }

    pub fn without_judge(mut self) -> Self {
        self.judge = None;
        self
    }
}
