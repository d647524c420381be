//! Review driven by an external judge.

use std::sync::Arc;

use super::verdict::{apply_review, ReviewedRecord};
use crate::collaborators::Judge;
use crate::model::MeasurementRecord;
use crate::quality::{QualityRuleEngine, Validation};

/// Asks a [`Judge`] for a verdict on each record and applies it.
///
/// Review is advisory: when the judge fails the record passes through
/// unchanged.
pub struct LlmReviewer {
    judge: Arc<dyn Judge>,
    engine: QualityRuleEngine,
}

impl LlmReviewer {
    pub fn new(judge: Arc<dyn Judge>, engine: QualityRuleEngine) -> Self {
        Self { judge, engine }
    }

    pub fn review(
        &self,
        record: MeasurementRecord,
        validation: Validation,
        source_context: &str,
    ) -> ReviewedRecord {
        match self.judge.judge(&record, source_context) {
            Ok(verdict) => {
                tracing::debug!(label = record.local_label(), ?verdict, "review verdict");
                apply_review(&self.engine, record, validation, &verdict)
            }
            Err(e) => {
                tracing::warn!(label = record.local_label(), error = %e, "review failed, keeping record as validated");
                ReviewedRecord {
                    record,
                    validation,
                    review_note: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::CollaboratorError;
    use crate::model::{PhotophysicsRecord, QualityFlag};
    use crate::review::Verdict;

    struct FixedJudge(Result<Verdict, CollaboratorError>);

    impl Judge for FixedJudge {
        fn judge(
            &self,
            _record: &MeasurementRecord,
            _source_context: &str,
        ) -> Result<Verdict, CollaboratorError> {
            self.0.clone()
        }
    }

    fn record() -> MeasurementRecord {
        MeasurementRecord::Photophysics(PhotophysicsRecord::new("1"))
    }

    #[test]
    fn test_judge_verdict_is_applied() {
        let reviewer = LlmReviewer::new(
            Arc::new(FixedJudge(Ok(Verdict::Demote {
                severity: QualityFlag::Invalid,
                reason: "wrong table".to_string(),
            }))),
            QualityRuleEngine::default(),
        );
        let reviewed = reviewer.review(record(), Validation::valid(), "table 1");
        assert_eq!(reviewed.validation.flag, QualityFlag::Invalid);
    }

    #[test]
    fn test_judge_failure_leaves_record_unchanged() {
        let reviewer = LlmReviewer::new(
            Arc::new(FixedJudge(Err(CollaboratorError::Judge("offline".to_string())))),
            QualityRuleEngine::default(),
        );
        let reviewed = reviewer.review(record(), Validation::valid(), "table 1");
        assert_eq!(reviewed.validation, Validation::valid());
        assert_eq!(reviewed.record, record());
        assert!(reviewed.review_note.is_none());
    }
}
