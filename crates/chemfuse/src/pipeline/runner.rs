use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info, info_span};

use crate::align::{map_regions_to_labels, EntityAligner};
use crate::broadcast::JobStage;
use crate::collaborators::{
    route_table, Collaborators, ExtractionSource, FieldExtractor, ImageCategory,
};
use crate::db::document_repo;
use crate::model::{DocumentStatus, FieldError, MeasurementRecord, RecordKind};
use crate::quality::{QualityReport, QualityRuleEngine};
use crate::review::{LlmReviewer, ReviewedRecord};
use crate::store::IntegrationStore;
use crate::worker::job::{JobFailure, JobResult, JobSummary, LabelResolution};

use super::config::PipelineConfig;
use super::context::{ExtractedRecord, PipelineContext, RecognizedStructure, StagedIdentity};
use super::error::{PipelineError, PipelineWarning};
use super::progress::{ProgressEvent, ProgressReporter};

/// Drives one document through the staged state machine.
///
/// Every stage before `Persisting` only fills the context; the canonical
/// dataset is written in a single transaction at the end, so a job that
/// fails or is cancelled earlier leaves it untouched.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    collaborators: Collaborators,
    aligner: Arc<EntityAligner>,
    engine: QualityRuleEngine,
    reviewer: Option<LlmReviewer>,
    store: IntegrationStore,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        collaborators: Collaborators,
        aligner: Arc<EntityAligner>,
        store: IntegrationStore,
    ) -> Self {
        let engine = QualityRuleEngine::new(config.rules.clone());
        let reviewer = match (&collaborators.judge, config.review_enabled) {
            (Some(judge), true) => Some(LlmReviewer::new(Arc::clone(judge), engine.clone())),
            _ => None,
        };
        Self {
            config,
            collaborators,
            aligner,
            engine,
            reviewer,
            store,
        }
    }

    pub fn store(&self) -> &IntegrationStore {
        &self.store
    }

    pub fn aligner(&self) -> &Arc<EntityAligner> {
        &self.aligner
    }

    /// Run the full pipeline for a single document.
    /// Returns a (JobResult, PipelineContext) pair.
    pub fn run(
        &self,
        mut ctx: PipelineContext,
        progress: &dyn ProgressReporter,
    ) -> (JobResult, PipelineContext) {
        let _pipeline_span = info_span!("pipeline",
            job_key = %ctx.job.key,
            document_id = %ctx.job.document_id,
        )
        .entered();

        self.mark_document(&ctx, DocumentStatus::Processing, None);

        for stage in &JobStage::PIPELINE[..JobStage::PIPELINE.len() - 1] {
            let stage = *stage;
            let _step = info_span!("stage", stage = %stage).entered();
            if let Err(e) = self.enter(&ctx, stage, progress) {
                return self.fail(ctx, stage, e, progress);
            }

            let outcome = match stage {
                JobStage::Parsing => self.step_parse(&mut ctx),
                JobStage::Classifying => self.step_classify(&mut ctx),
                JobStage::Recognizing => self.step_recognize(&mut ctx),
                JobStage::Extracting => self.step_extract(&mut ctx),
                JobStage::Aligning => {
                    self.step_align(&mut ctx);
                    Ok(())
                }
                JobStage::Validating => {
                    self.step_validate(&mut ctx);
                    Ok(())
                }
                _ => Ok(()),
            };
            if let Err(e) = outcome {
                return self.fail(ctx, stage, e, progress);
            }
            ctx.last_completed = stage;
        }

        let stage = JobStage::Persisting;
        let _step = info_span!("stage", stage = %stage).entered();
        let summary = match self
            .enter(&ctx, stage, progress)
            .and_then(|()| self.step_persist(&mut ctx))
        {
            Ok(summary) => summary,
            Err(e) => return self.fail(ctx, stage, e, progress),
        };
        ctx.last_completed = stage;

        info!(
            records = summary.record_ids.len(),
            compounds = summary.compounds.len(),
            skipped = summary.skipped_records,
            "document integrated"
        );
        progress.report(ProgressEvent::Completed {
            summary: summary.clone(),
        });
        (JobResult::success(&ctx.job, summary), ctx)
    }

    /// Announces the stage, then stops if cancellation was requested, so a
    /// cancelled job fails in a stage it has announced.
    fn enter(
        &self,
        ctx: &PipelineContext,
        stage: JobStage,
        progress: &dyn ProgressReporter,
    ) -> Result<(), PipelineError> {
        progress.report(ProgressEvent::Stage {
            stage,
            message: stage_message(stage).to_string(),
        });
        if ctx.job.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }

    fn fail(
        &self,
        ctx: PipelineContext,
        stage: JobStage,
        error: PipelineError,
        progress: &dyn ProgressReporter,
    ) -> (JobResult, PipelineContext) {
        let failure = JobFailure {
            kind: error.kind(),
            message: error.to_string(),
            failed_stage: stage,
            last_completed_stage: ctx.last_completed,
        };
        tracing::error!(kind = %failure.kind, stage = %stage, "job failed: {}", failure.message);
        self.mark_document(&ctx, DocumentStatus::Failed, Some(&failure.describe()));
        progress.report(ProgressEvent::Failed {
            failure: failure.clone(),
        });
        (JobResult::failure(&ctx.job, failure), ctx)
    }

    /// Document rows are bookkeeping; failing to update one never fails the job.
    fn mark_document(&self, ctx: &PipelineContext, status: DocumentStatus, error: Option<&str>) {
        match document_repo::update_status(
            self.store.database(),
            &ctx.job.document_id,
            ctx.job.key.as_str(),
            status,
            error,
        ) {
            Ok(true) => {}
            Ok(false) => debug!(status = %status, "document was resubmitted, status not updated"),
            Err(e) => tracing::warn!(error = %e, "failed to update document status"),
        }
    }

    fn step_parse(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let parsed = self.collaborators.parser.parse(&ctx.job.source_ref)?;
        debug!(
            tables = parsed.tables.len(),
            figures = parsed.figures.len(),
            "document parsed"
        );
        ctx.parsed = Some(parsed);
        Ok(())
    }

    fn step_classify(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let figures = ctx
            .parsed
            .as_ref()
            .map(|p| p.figures.clone())
            .unwrap_or_default();
        for figure in figures {
            let category = self.collaborators.classifier.classify(&figure.image_ref)?;
            debug!(figure_id = %figure.figure_id, category = %category, "figure classified");
            if category == ImageCategory::MolecularStructure {
                ctx.structure_figures.push(figure);
            }
        }
        Ok(())
    }

    fn step_recognize(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let figures = std::mem::take(&mut ctx.structure_figures);
        for figure in &figures {
            let regions = figure.region_refs();
            for (region, label) in map_regions_to_labels(&regions, &figure.caption) {
                let Some(label) = label else {
                    ctx.warn(PipelineWarning::UnlabeledRegion {
                        figure_id: figure.figure_id.clone(),
                        region: region.to_string(),
                    });
                    continue;
                };

                let recognition = self.collaborators.recognizer.recognize(region)?;
                let accepted = recognition.confidence >= self.config.min_confidence;
                if !accepted {
                    ctx.warn(PipelineWarning::RejectedRecognition {
                        label: label.clone(),
                        confidence: recognition.confidence,
                    });
                } else if recognition.confidence < self.config.low_confidence {
                    ctx.warn(PipelineWarning::LowConfidence {
                        label: label.clone(),
                        confidence: recognition.confidence,
                    });
                }

                let candidate = RecognizedStructure {
                    figure_id: figure.figure_id.clone(),
                    region: region.to_string(),
                    smiles: accepted.then(|| recognition.smiles.clone()),
                    confidence: recognition.confidence,
                };
                Self::keep_best(ctx, label, candidate);
            }
        }
        ctx.structure_figures = figures;
        Ok(())
    }

    /// Keeps the better of two structures seen for one label: an accepted
    /// structure beats a rejected one, then higher confidence wins.
    fn keep_best(ctx: &mut PipelineContext, label: String, candidate: RecognizedStructure) {
        let Some(existing) = ctx.recognitions.get(&label).cloned() else {
            ctx.recognitions.insert(label, candidate);
            return;
        };
        let rank = |r: &RecognizedStructure| (r.smiles.is_some(), r.confidence);
        let (kept, dropped) = if rank(&candidate) > rank(&existing) {
            (candidate, existing)
        } else {
            (existing, candidate)
        };
        if let (Some(k), Some(d)) = (&kept.smiles, &dropped.smiles) {
            if k != d {
                ctx.warn(PipelineWarning::ConflictingStructures {
                    label: label.clone(),
                    kept: k.clone(),
                    dropped: d.clone(),
                });
            }
        }
        ctx.recognitions.insert(label, kept);
    }

    fn step_extract(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let tables = ctx
            .parsed
            .as_ref()
            .map(|p| p.tables.clone())
            .unwrap_or_default();
        let source_ref = ctx.job.source_ref.clone();
        let extractor: &dyn FieldExtractor = self.collaborators.extractor.as_ref();

        for table in &tables {
            let schemas = route_table(&table.caption);
            if schemas.is_empty() {
                ctx.warn(PipelineWarning::UnroutedTable {
                    table_id: table.table_id.clone(),
                });
                continue;
            }
            let source = ExtractionSource {
                source_ref: &source_ref,
                table,
            };
            for schema in schemas {
                let rows = extractor.extract(&source, schema)?;
                debug!(table_id = %table.table_id, schema = %schema, rows = rows.len(), "table extracted");
                for row in rows {
                    match MeasurementRecord::from_field_map(schema, &row) {
                        Ok(mut record) => {
                            if record.table_id().is_none() {
                                record.set_table_id(&table.table_id);
                            }
                            ctx.extracted.push(ExtractedRecord {
                                record,
                                source_context: format!("{}\n{}", table.caption, table.content),
                            });
                        }
                        Err(FieldError::MissingLabel) => {
                            ctx.skipped_records += 1;
                            ctx.warn(PipelineWarning::UnlabeledRecord {
                                table_id: table.table_id.clone(),
                            });
                        }
                        Err(e) => {
                            ctx.skipped_records += 1;
                            ctx.warn(PipelineWarning::UnreadableRecord {
                                table_id: table.table_id.clone(),
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Canonicalizes the structure of every label the document mentions.
    /// Resolution against the identity table is deferred to persisting.
    fn step_align(&self, ctx: &mut PipelineContext) {
        let mut names: BTreeMap<String, String> = BTreeMap::new();
        for extracted in &ctx.extracted {
            if let Some(name) = extracted.record.compound_name() {
                names
                    .entry(extracted.record.local_label().to_string())
                    .or_insert_with(|| name.to_string());
            }
        }

        let labels: BTreeSet<String> = ctx
            .recognitions
            .keys()
            .cloned()
            .chain(ctx.extracted.iter().map(|e| e.record.local_label().to_string()))
            .collect();

        for label in labels {
            let smiles = ctx
                .recognitions
                .get(&label)
                .and_then(|r| r.smiles.as_deref());
            let prepared = self.aligner.prepare(smiles);
            if let Some(issue) = &prepared.issue {
                let warning = PipelineWarning::StructureRejected {
                    label: label.clone(),
                    issue: issue.clone(),
                };
                ctx.warn(warning);
            }
            ctx.identities.push(StagedIdentity {
                display_name: names.get(&label).cloned(),
                local_label: label,
                prepared,
            });
        }
        debug!(labels = ctx.identities.len(), strategy = self.aligner.strategy_name(), "identities staged");
    }

    fn step_validate(&self, ctx: &mut PipelineContext) {
        for extracted in std::mem::take(&mut ctx.extracted) {
            let validation = self.engine.validate(&extracted.record);
            let reviewed = match &self.reviewer {
                Some(reviewer) => {
                    reviewer.review(extracted.record, validation, &extracted.source_context)
                }
                None => ReviewedRecord {
                    record: extracted.record,
                    validation,
                    review_note: None,
                },
            };
            ctx.validated.push(reviewed);
        }

        let report = QualityReport::from_records(
            ctx.validated
                .iter()
                .map(|r| (r.record.kind(), r.validation.flag)),
        );
        info!(
            photophysics_total = report.photophysics.total,
            photophysics_valid = report.photophysics.valid,
            device_total = report.device.total,
            device_valid = report.device.valid,
            "validation finished"
        );
        ctx.quality = Some(report);
    }

    /// Resolves identities and replaces the document's records in one
    /// transaction, then marks the document completed in the same one.
    ///
    /// Rows that share a compound and measurement context would overwrite
    /// each other on upsert; they are folded into one record first and
    /// reported as [`PipelineWarning::DuplicateContext`].
    fn step_persist(&self, ctx: &mut PipelineContext) -> Result<JobSummary, PipelineError> {
        let document_id = ctx.job.document_id.clone();
        let document_id = document_id.as_str();
        let _guard = self.aligner.lock_labels(
            document_id,
            ctx.identities.iter().map(|i| i.local_label.as_str()),
        );

        let (compounds, record_ids, duplicates) =
            self.store.database().with_transaction(|conn| {
                let removed = self.store.delete_document_records_in(conn, document_id)?;
                if removed > 0 {
                    debug!(removed, "replacing records of resubmitted document");
                }

                let mut compounds = Vec::with_capacity(ctx.identities.len());
                let mut ids: HashMap<&str, String> = HashMap::new();
                for identity in &ctx.identities {
                    let resolution = self.aligner.resolve_prepared_in(
                        conn,
                        document_id,
                        &identity.local_label,
                        &identity.prepared,
                        identity.display_name.as_deref(),
                    )?;
                    ids.insert(identity.local_label.as_str(), resolution.compound_id.clone());
                    compounds.push(LabelResolution {
                        local_label: identity.local_label.clone(),
                        resolution,
                    });
                }

                let mut rows: Vec<(String, ReviewedRecord)> = Vec::with_capacity(ctx.validated.len());
                let mut slots: HashMap<(RecordKind, String, String), usize> = HashMap::new();
                let mut duplicates = Vec::new();
                for reviewed in &ctx.validated {
                    let label = reviewed.record.local_label();
                    let Some(compound_id) = ids.get(label) else {
                        // every record label was staged during alignment
                        return Err(PipelineError::Align(crate::align::AlignError::UnknownCompound(
                            format!("{}/{}", document_id, label),
                        )));
                    };
                    let kind = reviewed.record.kind();
                    let context = reviewed.record.context_key();
                    match slots.get(&(kind, compound_id.clone(), context.clone())).copied() {
                        Some(slot) => {
                            let kept = &mut rows[slot].1;
                            duplicates.push(PipelineWarning::DuplicateContext {
                                kind,
                                label: label.to_string(),
                                duplicate_of: kept.record.local_label().to_string(),
                                context,
                            });
                            fold_duplicate(kept, reviewed.clone());
                        }
                        None => {
                            slots.insert((kind, compound_id.clone(), context), rows.len());
                            rows.push((compound_id.clone(), reviewed.clone()));
                        }
                    }
                }

                let mut record_ids = Vec::with_capacity(rows.len());
                for (compound_id, reviewed) in &rows {
                    record_ids.push(self.store.upsert_in(conn, document_id, compound_id, reviewed)?);
                }

                document_repo::update_status_in(
                    conn,
                    document_id,
                    ctx.job.key.as_str(),
                    DocumentStatus::Completed,
                    None,
                )?;
                Ok::<_, PipelineError>((compounds, record_ids, duplicates))
            })?;

        for warning in duplicates {
            ctx.warn(warning);
        }

        Ok(JobSummary {
            document_id: document_id.to_string(),
            compounds,
            record_ids,
            skipped_records: ctx.skipped_records,
            quality: ctx.quality.clone().unwrap_or_default(),
            warnings: ctx.warnings.iter().map(|w| w.to_string()).collect(),
        })
    }
}

/// Folds `incoming` into `kept`. The worse-flagged record survives and
/// carries the reasons of both.
fn fold_duplicate(kept: &mut ReviewedRecord, incoming: ReviewedRecord) {
    let dropped = if incoming.validation.flag > kept.validation.flag {
        std::mem::replace(kept, incoming)
    } else {
        incoming
    };
    for reason in dropped.validation.reasons {
        if !kept.validation.reasons.contains(&reason) {
            kept.validation.reasons.push(reason);
        }
    }
    kept.validation.reasons.push(format!(
        "merged duplicate row for {} flagged {}",
        dropped.record.local_label(),
        dropped.validation.flag
    ));
}

fn stage_message(stage: JobStage) -> &'static str {
    match stage {
        JobStage::Parsing => "Parsing document layout...",
        JobStage::Classifying => "Classifying figures...",
        JobStage::Recognizing => "Recognizing molecular structures...",
        JobStage::Extracting => "Extracting measurement tables...",
        JobStage::Aligning => "Preparing compound identities...",
        JobStage::Validating => "Validating records...",
        JobStage::Persisting => "Writing to the integration store...",
        _ => "",
    }
}
