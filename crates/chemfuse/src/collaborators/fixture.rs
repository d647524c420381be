//! Collaborators backed by pre-computed extraction bundles.
//!
//! A bundle is one JSON file per document holding everything the external
//! services produced for it: the parsed layout, image classifications,
//! structure recognitions, per-table extractions and optional review
//! verdicts. `source_ref` is the bundle path, resolved against an optional
//! root directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::Deserialize;
use serde_json::Value;

use super::{
    CollaboratorError, DocumentParser, ExtractionSchema, ExtractionSource, FieldExtractor,
    ImageCategory, ImageClassifier, Judge, ParsedDocument, Recognition, StructureRecognizer,
};
use crate::model::{FieldMap, MeasurementRecord};
use crate::review::Verdict;

/// Extraction outputs for one table, per schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TableExtractions {
    pub photophysics: Vec<FieldMap>,
    pub device: Vec<FieldMap>,
}

/// All collaborator outputs recorded for one document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixtureBundle {
    #[serde(flatten)]
    pub document: ParsedDocument,
    pub classifications: HashMap<String, ImageCategory>,
    pub recognitions: HashMap<String, Recognition>,
    /// Keyed by table id.
    pub extractions: HashMap<String, TableExtractions>,
    /// Keyed by `<table_id>/<local_label>`; values in any form
    /// [`Verdict::from_review_json`] accepts.
    pub reviews: HashMap<String, Value>,
}

impl FixtureBundle {
    pub fn from_json_str(json: &str) -> Result<Self, CollaboratorError> {
        serde_json::from_str(json).map_err(|e| CollaboratorError::Parse(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, CollaboratorError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CollaboratorError::Parse(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }
}

/// Serves every collaborator trait from fixture bundles.
#[derive(Default)]
pub struct FixtureCollaborators {
    root: Option<PathBuf>,
    bundles: RwLock<HashMap<String, Arc<FixtureBundle>>>,
}

impl FixtureCollaborators {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves relative source refs against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            bundles: RwLock::default(),
        }
    }

    /// Registers an in-memory bundle under a source ref.
    pub fn insert(&self, source_ref: &str, bundle: FixtureBundle) {
        self.write_bundles()
            .insert(source_ref.to_string(), Arc::new(bundle));
    }

    fn write_bundles(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<FixtureBundle>>> {
        match self.bundles.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Fixture bundle lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn read_bundles(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<FixtureBundle>>> {
        match self.bundles.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Fixture bundle lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn bundle(&self, source_ref: &str) -> Result<Arc<FixtureBundle>, CollaboratorError> {
        if let Some(bundle) = self.read_bundles().get(source_ref) {
            return Ok(Arc::clone(bundle));
        }
        let path = match &self.root {
            Some(root) => root.join(source_ref),
            None => PathBuf::from(source_ref),
        };
        let bundle = Arc::new(FixtureBundle::load(&path)?);
        self.write_bundles()
            .insert(source_ref.to_string(), Arc::clone(&bundle));
        Ok(bundle)
    }

    /// First loaded bundle for which `f` yields a value.
    fn find<T>(&self, f: impl Fn(&FixtureBundle) -> Option<T>) -> Option<T> {
        self.read_bundles().values().find_map(|b| f(&**b))
    }
}

impl DocumentParser for FixtureCollaborators {
    fn parse(&self, source_ref: &str) -> Result<ParsedDocument, CollaboratorError> {
        Ok(self.bundle(source_ref)?.document.clone())
    }
}

impl ImageClassifier for FixtureCollaborators {
    fn classify(&self, image_ref: &str) -> Result<ImageCategory, CollaboratorError> {
        Ok(self
            .find(|b| b.classifications.get(image_ref).copied())
            .unwrap_or(ImageCategory::Other))
    }
}

impl StructureRecognizer for FixtureCollaborators {
    fn recognize(&self, image_ref: &str) -> Result<Recognition, CollaboratorError> {
        self.find(|b| b.recognitions.get(image_ref).cloned())
            .ok_or_else(|| {
                CollaboratorError::Recognition(format!("no recognition recorded for '{}'", image_ref))
            })
    }
}

impl FieldExtractor for FixtureCollaborators {
    fn extract(
        &self,
        source: &ExtractionSource<'_>,
        schema: ExtractionSchema,
    ) -> Result<Vec<FieldMap>, CollaboratorError> {
        let bundle = self.bundle(source.source_ref)?;
        let Some(tables) = bundle.extractions.get(&source.table.table_id) else {
            return Ok(Vec::new());
        };
        Ok(match schema {
            ExtractionSchema::Photophysics => tables.photophysics.clone(),
            ExtractionSchema::Device => tables.device.clone(),
        })
    }
}

impl Judge for FixtureCollaborators {
    fn judge(
        &self,
        record: &MeasurementRecord,
        _source_context: &str,
    ) -> Result<Verdict, CollaboratorError> {
        let key = format!(
            "{}/{}",
            record.table_id().unwrap_or_default(),
            record.local_label()
        );
        let value = self
            .find(|b| b.reviews.get(&key).cloned())
            .ok_or_else(|| CollaboratorError::Judge(format!("no verdict recorded for '{}'", key)))?;
        Verdict::from_review_json(&value).map_err(|e| CollaboratorError::Judge(e.to_string()))
    }
}
