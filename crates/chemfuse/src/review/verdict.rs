//! External review verdicts and how they change a record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{MeasurementRecord, QualityFlag};
use crate::quality::{QualityRuleEngine, Validation};

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("Unrecognized review payload: {0}")]
    Unrecognized(String),

    #[error("Malformed review payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a reviewer decided about one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Confirm,
    Demote {
        severity: QualityFlag,
        #[serde(default)]
        reason: String,
    },
    Amend {
        fields: Map<String, Value>,
        #[serde(default)]
        reason: String,
    },
}

impl Verdict {
    /// Parses either the native tagged form or the status form
    /// `{"status": "ok" | "needs_review", "issues": [...], "confidence": f}`.
    pub fn from_review_json(value: &Value) -> Result<Self, ReviewError> {
        if value.get("verdict").is_some() {
            return Ok(serde_json::from_value(value.clone())?);
        }

        match value.get("status").and_then(Value::as_str) {
            Some("ok") => Ok(Verdict::Confirm),
            Some("needs_review") => {
                let issues: Vec<&str> = value
                    .get("issues")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                let mut reason = if issues.is_empty() {
                    "flagged for review".to_string()
                } else {
                    issues.join("; ")
                };
                if let Some(confidence) = value.get("confidence").and_then(Value::as_f64) {
                    reason.push_str(&format!(" (confidence {:.2})", confidence));
                }
                Ok(Verdict::Demote {
                    severity: QualityFlag::Suspect,
                    reason,
                })
            }
            Some(other) => Err(ReviewError::Unrecognized(format!("status '{}'", other))),
            None => Err(ReviewError::Unrecognized(value.to_string())),
        }
    }

    /// Parses a raw reviewer reply. Text around the JSON object is ignored.
    pub fn from_review_text(text: &str) -> Result<Self, ReviewError> {
        let start = text.find('{');
        let end = text.rfind('}');
        let json = match (start, end) {
            (Some(s), Some(e)) if s < e => &text[s..=e],
            _ => return Err(ReviewError::Unrecognized(text.trim().to_string())),
        };
        let value: Value = serde_json::from_str(json)?;
        Self::from_review_json(&value)
    }
}

/// A record after review, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewedRecord {
    pub record: MeasurementRecord,
    pub validation: Validation,
    pub review_note: Option<String>,
}

/// Applies a verdict to a validated record.
///
/// `Confirm` keeps the flag, `Demote` makes it at least `suspect` and never
/// better, and `Amend` overwrites fields and takes the flag from a fresh
/// validation. Amendments to the compound label are rejected into the note.
pub fn apply_review(
    engine: &QualityRuleEngine,
    record: MeasurementRecord,
    validation: Validation,
    verdict: &Verdict,
) -> ReviewedRecord {
    match verdict {
        Verdict::Confirm => ReviewedRecord {
            record,
            validation,
            review_note: Some("confirmed by review".to_string()),
        },
        Verdict::Demote { severity, reason } => {
            let severity = severity.worst(QualityFlag::Suspect);
            let mut validation = validation;
            validation.flag = validation.flag.worst(severity);
            validation.reasons.push(format!("review: {}", reason));
            ReviewedRecord {
                record,
                validation,
                review_note: Some(format!("demoted to {} by review: {}", severity, reason)),
            }
        }
        Verdict::Amend { fields, reason } => {
            let mut record = record;
            let mut amended = Vec::new();
            let mut rejected = Vec::new();
            for (name, value) in fields {
                match record.amend_field(&name.to_ascii_lowercase(), value) {
                    Ok(()) => amended.push(name.as_str()),
                    Err(e) => rejected.push(e.to_string()),
                }
            }

            let validation = engine.validate(&record);
            let mut note = format!("amended by review ({}): {}", amended.join(", "), reason);
            if !rejected.is_empty() {
                note.push_str(&format!("; rejected: {}", rejected.join("; ")));
            }
            ReviewedRecord {
                record,
                validation,
                review_note: Some(note),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhotophysicsRecord;
    use serde_json::json;

    fn invalid_record() -> (MeasurementRecord, Validation) {
        let mut r = PhotophysicsRecord::new("1");
        r.lambda_pl_nm = Some(900.0);
        let record = MeasurementRecord::Photophysics(r);
        let validation = QualityRuleEngine::default().validate(&record);
        (record, validation)
    }

    #[test]
    fn test_confirm_keeps_flag() {
        let (record, validation) = invalid_record();
        let reviewed = apply_review(
            &QualityRuleEngine::default(),
            record,
            validation,
            &Verdict::Confirm,
        );
        assert_eq!(reviewed.validation.flag, QualityFlag::Invalid);
    }

    #[test]
    fn test_demote_never_upgrades() {
        let (record, validation) = invalid_record();
        let reviewed = apply_review(
            &QualityRuleEngine::default(),
            record,
            validation,
            &Verdict::Demote {
                severity: QualityFlag::Suspect,
                reason: "looks fine".to_string(),
            },
        );
        assert_eq!(reviewed.validation.flag, QualityFlag::Invalid);
    }

    #[test]
    fn test_demote_lowers_valid_record() {
        let record = MeasurementRecord::Photophysics(PhotophysicsRecord::new("1"));
        let reviewed = apply_review(
            &QualityRuleEngine::default(),
            record,
            Validation::valid(),
            &Verdict::Demote {
                severity: QualityFlag::Suspect,
                reason: "column shift".to_string(),
            },
        );
        assert_eq!(reviewed.validation.flag, QualityFlag::Suspect);
        assert!(reviewed.review_note.unwrap().contains("column shift"));
    }

    #[test]
    fn test_amend_revalidates() {
        let (record, validation) = invalid_record();
        let mut fields = Map::new();
        fields.insert("lambda_pl_nm".to_string(), json!(490));
        let reviewed = apply_review(
            &QualityRuleEngine::default(),
            record,
            validation,
            &Verdict::Amend {
                fields,
                reason: "unit error".to_string(),
            },
        );
        assert_eq!(reviewed.validation.flag, QualityFlag::Valid);
        assert_eq!(reviewed.record.numeric_by_name("lambda_pl_nm"), Some(490.0));
    }

    #[test]
    fn test_amend_rejects_unknown_fields() {
        let record = MeasurementRecord::Photophysics(PhotophysicsRecord::new("1"));
        let mut fields = Map::new();
        fields.insert("melting_point".to_string(), json!(120));
        let reviewed = apply_review(
            &QualityRuleEngine::default(),
            record.clone(),
            Validation::valid(),
            &Verdict::Amend {
                fields,
                reason: "extra".to_string(),
            },
        );
        assert_eq!(reviewed.record, record);
        assert!(reviewed.review_note.unwrap().contains("melting_point"));
    }

    #[test]
    fn test_demote_to_valid_still_demotes() {
        let record = MeasurementRecord::Photophysics(PhotophysicsRecord::new("1"));
        let verdict = Verdict::from_review_json(&json!({"verdict": "demote", "severity": "valid"}))
            .unwrap();
        let reviewed = apply_review(
            &QualityRuleEngine::default(),
            record,
            Validation::valid(),
            &verdict,
        );
        assert_eq!(reviewed.validation.flag, QualityFlag::Suspect);
        assert!(reviewed.review_note.unwrap().starts_with("demoted to suspect"));
    }

    #[test]
    fn test_amend_cannot_change_label() {
        let mut r = PhotophysicsRecord::new("1");
        r.lambda_pl_nm = Some(470.0);
        let record = MeasurementRecord::Photophysics(r);
        let mut fields = Map::new();
        fields.insert("local_label".to_string(), json!("99"));
        fields.insert("Paper_Local_ID".to_string(), json!("98"));
        fields.insert("lambda_pl_nm".to_string(), json!(480));
        let reviewed = apply_review(
            &QualityRuleEngine::default(),
            record,
            Validation::valid(),
            &Verdict::Amend {
                fields,
                reason: "relabel".to_string(),
            },
        );
        assert_eq!(reviewed.record.local_label(), "1");
        assert_eq!(reviewed.record.numeric_by_name("lambda_pl_nm"), Some(480.0));
        let note = reviewed.review_note.unwrap();
        assert!(note.contains("amended by review (lambda_pl_nm)"));
        assert!(note.contains("local_label"));
        assert!(note.contains("paper_local_id"));
    }

    #[test]
    fn test_status_form_parsing() {
        assert_eq!(
            Verdict::from_review_json(&json!({"status": "ok", "issues": [], "confidence": 0.9}))
                .unwrap(),
            Verdict::Confirm
        );

        let verdict = Verdict::from_review_json(
            &json!({"status": "needs_review", "issues": ["EQE column shifted"], "confidence": 0.4}),
        )
        .unwrap();
        match verdict {
            Verdict::Demote { severity, reason } => {
                assert_eq!(severity, QualityFlag::Suspect);
                assert!(reason.starts_with("EQE column shifted"));
            }
            other => panic!("unexpected verdict {:?}", other),
        }

        assert!(Verdict::from_review_json(&json!({"status": "maybe"})).is_err());
        assert!(Verdict::from_review_json(&json!({"issues": []})).is_err());
    }

    #[test]
    fn test_tagged_form_and_surrounding_text() {
        let verdict = Verdict::from_review_text(
            "Here is my review:\n{\"verdict\": \"demote\", \"severity\": \"invalid\", \"reason\": \"wrong table\"}\nThanks",
        )
        .unwrap();
        assert_eq!(
            verdict,
            Verdict::Demote {
                severity: QualityFlag::Invalid,
                reason: "wrong table".to_string()
            }
        );
        assert!(Verdict::from_review_text("no json here").is_err());
    }
}
