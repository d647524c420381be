//! Rule evaluation.

use serde::{Deserialize, Serialize};

use super::rules::{FieldRule, RuleSet};
use crate::model::{MeasurementRecord, NumericFields, QualityFlag};

/// Outcome of validating one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    pub flag: QualityFlag,
    pub reasons: Vec<String>,
}

impl Validation {
    pub fn valid() -> Self {
        Self {
            flag: QualityFlag::Valid,
            reasons: Vec::new(),
        }
    }
}

/// Validates records against a rule table. Holds no mutable state.
#[derive(Debug, Clone, Default)]
pub struct QualityRuleEngine {
    rules: RuleSet,
}

impl QualityRuleEngine {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Flags a record with the most severe outcome across its rules.
    pub fn validate(&self, record: &MeasurementRecord) -> Validation {
        match record {
            MeasurementRecord::Photophysics(r) => apply(r, &self.rules.photophysics),
            MeasurementRecord::Device(r) => apply(r, &self.rules.device),
        }
    }
}

fn apply<R: NumericFields>(record: &R, rules: &[FieldRule<R::Field>]) -> Validation {
    let mut validation = Validation::valid();
    for rule in rules {
        if let Some((flag, reason)) = rule.evaluate(record.numeric(rule.field)) {
            validation.flag = validation.flag.worst(flag);
            validation.reasons.push(reason);
        }
    }
    validation
}
