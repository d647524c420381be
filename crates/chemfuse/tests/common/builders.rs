//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use serde_json::Value;

use chemfuse::collaborators::fixture::TableExtractions;
use chemfuse::collaborators::{FigureBlock, FixtureBundle, ImageCategory, Recognition, TableBlock};
use chemfuse::config::Config;
use chemfuse::model::FieldMap;

/// Builder for per-document fixture bundles.
pub struct BundleBuilder {
    bundle: FixtureBundle,
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self {
            bundle: FixtureBundle::default(),
        }
    }

    /// Add a table; the caption decides which schemas it is extracted into.
    pub fn table(mut self, table_id: &str, caption: &str) -> Self {
        self.bundle.document.tables.push(TableBlock {
            table_id: table_id.to_string(),
            caption: caption.to_string(),
            content: String::new(),
        });
        self
    }

    /// Add a structure figure with one region per `(smiles, confidence)`.
    /// Region refs are `<figure_id>_<n>.png`.
    pub fn structures(mut self, figure_id: &str, caption: &str, regions: &[(&str, f64)]) -> Self {
        let image_ref = format!("{}.png", figure_id);
        let region_refs: Vec<String> = (0..regions.len())
            .map(|i| format!("{}_{}.png", figure_id, i))
            .collect();
        for (region, (smiles, confidence)) in region_refs.iter().zip(regions) {
            self.bundle.recognitions.insert(
                region.clone(),
                Recognition {
                    smiles: smiles.to_string(),
                    confidence: *confidence,
                },
            );
        }
        self.bundle
            .classifications
            .insert(image_ref.clone(), ImageCategory::MolecularStructure);
        self.bundle.document.figures.push(FigureBlock {
            figure_id: figure_id.to_string(),
            caption: caption.to_string(),
            image_ref,
            regions: region_refs,
        });
        self
    }

    /// Add a figure that is not a structure drawing.
    pub fn other_figure(mut self, figure_id: &str, category: ImageCategory) -> Self {
        let image_ref = format!("{}.png", figure_id);
        self.bundle.classifications.insert(image_ref.clone(), category);
        self.bundle.document.figures.push(FigureBlock {
            figure_id: figure_id.to_string(),
            caption: String::new(),
            image_ref,
            regions: vec![],
        });
        self
    }

    /// Add an extracted photophysics row for a table.
    pub fn photophysics(mut self, table_id: &str, row: Value) -> Self {
        self.extractions(table_id).photophysics.push(field_map(row));
        self
    }

    /// Add an extracted device row for a table.
    pub fn device(mut self, table_id: &str, row: Value) -> Self {
        self.extractions(table_id).device.push(field_map(row));
        self
    }

    /// Record a verdict for `<table_id>/<local_label>`.
    pub fn review(mut self, table_id: &str, label: &str, verdict: Value) -> Self {
        self.bundle
            .reviews
            .insert(format!("{}/{}", table_id, label), verdict);
        self
    }

    fn extractions(&mut self, table_id: &str) -> &mut TableExtractions {
        self.bundle
            .extractions
            .entry(table_id.to_string())
            .or_default()
    }

    pub fn build(self) -> FixtureBundle {
        self.bundle
    }
}

fn field_map(row: Value) -> FieldMap {
    serde_json::from_value(row).expect("Row must be a JSON object")
}

/// Builder for creating `Config` instances.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn database_path(mut self, path: &str) -> Self {
        self.config.database_path = Some(path.to_string());
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.jobs.retention_secs = secs;
        self
    }

    pub fn review_enabled(mut self, enabled: bool) -> Self {
        self.config.review.enabled = enabled;
        self
    }

    pub fn confidence_thresholds(mut self, min: f64, low: f64) -> Self {
        self.config.recognition.min_confidence = min;
        self.config.recognition.low_confidence = low;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
