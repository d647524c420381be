//! Declarative field rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{DeviceField, PhotophysicsField, QualityFlag};

/// Range constraints for one numeric field.
///
/// A value outside `[hard_min, hard_max]` (or a non-finite value, or a
/// missing value on a required field) makes the record invalid. A value
/// inside the hard range but outside `[soft_min, soft_max]` makes it
/// suspect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule<F> {
    pub field: F,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_max: Option<f64>,
}

impl<F: Copy + fmt::Display> FieldRule<F> {
    pub fn range(field: F, min: f64, max: f64) -> Self {
        Self {
            field,
            required: false,
            hard_min: Some(min),
            hard_max: Some(max),
            soft_min: None,
            soft_max: None,
        }
    }

    pub fn at_least(field: F, min: f64) -> Self {
        Self {
            field,
            required: false,
            hard_min: Some(min),
            hard_max: None,
            soft_min: None,
            soft_max: None,
        }
    }

    pub fn with_soft_max(mut self, max: f64) -> Self {
        self.soft_max = Some(max);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Applies the rule to a field value. `None` means the value passes.
    pub fn evaluate(&self, value: Option<f64>) -> Option<(QualityFlag, String)> {
        let Some(v) = value else {
            return self
                .required
                .then(|| (QualityFlag::Invalid, format!("{} is required but missing", self.field)));
        };

        if !v.is_finite() {
            return Some((QualityFlag::Invalid, format!("{}={} is not finite", self.field, v)));
        }
        if self.hard_min.is_some_and(|min| v < min) || self.hard_max.is_some_and(|max| v > max) {
            return Some((
                QualityFlag::Invalid,
                format!(
                    "{}={} outside allowed range {}",
                    self.field,
                    v,
                    bounds(self.hard_min, self.hard_max)
                ),
            ));
        }
        if self.soft_min.is_some_and(|min| v < min) || self.soft_max.is_some_and(|max| v > max) {
            return Some((
                QualityFlag::Suspect,
                format!(
                    "{}={} outside expected range {}",
                    self.field,
                    v,
                    bounds(self.soft_min, self.soft_max)
                ),
            ));
        }
        None
    }

    /// Describes the first ordering violation among the four bounds.
    pub fn consistency_error(&self) -> Option<String> {
        let ordered = [self.hard_min, self.soft_min, self.soft_max, self.hard_max];
        let present: Vec<f64> = ordered.iter().flatten().copied().collect();
        if present.iter().any(|b| !b.is_finite()) {
            return Some(format!("rule for {} has a non-finite bound", self.field));
        }
        present.windows(2).find(|w| w[0] > w[1]).map(|_| {
            format!(
                "rule for {} must satisfy hard_min <= soft_min <= soft_max <= hard_max",
                self.field
            )
        })
    }
}

fn bounds(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(lo), Some(hi)) => format!("[{}, {}]", lo, hi),
        (Some(lo), None) => format!(">= {}", lo),
        (None, Some(hi)) => format!("<= {}", hi),
        (None, None) => "(unbounded)".to_string(),
    }
}

/// Rule tables for every record kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default = "default_photophysics_rules")]
    pub photophysics: Vec<FieldRule<PhotophysicsField>>,
    #[serde(default = "default_device_rules")]
    pub device: Vec<FieldRule<DeviceField>>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            photophysics: default_photophysics_rules(),
            device: default_device_rules(),
        }
    }
}

const WAVELENGTH_NM: (f64, f64) = (200.0, 800.0);
const FWHM_NM: (f64, f64) = (5.0, 200.0);
const DELTA_EST_EV: (f64, f64) = (0.0, 1.5);
const DELTA_EST_SOFT_MAX_EV: f64 = 1.0;
const UNIT_FRACTION: (f64, f64) = (0.0, 1.0);
const PERCENT: (f64, f64) = (0.0, 100.0);

pub fn default_photophysics_rules() -> Vec<FieldRule<PhotophysicsField>> {
    use PhotophysicsField as P;
    vec![
        FieldRule::range(P::LambdaPlNm, WAVELENGTH_NM.0, WAVELENGTH_NM.1),
        FieldRule::range(P::LambdaEmNm, WAVELENGTH_NM.0, WAVELENGTH_NM.1),
        FieldRule::range(P::FwhmNm, FWHM_NM.0, FWHM_NM.1),
        FieldRule::range(P::DeltaEstEv, DELTA_EST_EV.0, DELTA_EST_EV.1)
            .with_soft_max(DELTA_EST_SOFT_MAX_EV),
        FieldRule::range(P::PhiPl, UNIT_FRACTION.0, UNIT_FRACTION.1),
        FieldRule::at_least(P::TauPromptNs, 0.0),
        FieldRule::at_least(P::TauDelayedUs, 0.0),
        FieldRule::at_least(P::Kr, 0.0),
        FieldRule::at_least(P::Kisc, 0.0),
        FieldRule::at_least(P::Krisc, 0.0),
        FieldRule::range(P::DopingWtPercent, PERCENT.0, PERCENT.1),
        FieldRule::at_least(P::TemperatureK, 0.0),
    ]
}

pub fn default_device_rules() -> Vec<FieldRule<DeviceField>> {
    use DeviceField as D;
    vec![
        FieldRule::range(D::LambdaElNm, WAVELENGTH_NM.0, WAVELENGTH_NM.1),
        FieldRule::range(D::EqeMaxPercent, PERCENT.0, PERCENT.1),
        FieldRule::range(D::Eqe100CdM2, PERCENT.0, PERCENT.1),
        FieldRule::range(D::Eqe1000CdM2, PERCENT.0, PERCENT.1),
        FieldRule::range(D::CieX, UNIT_FRACTION.0, UNIT_FRACTION.1),
        FieldRule::range(D::CieY, UNIT_FRACTION.0, UNIT_FRACTION.1),
        FieldRule::at_least(D::LMaxCdM2, 0.0),
        FieldRule::range(D::DopingWtPercent, PERCENT.0, PERCENT.1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_optional_passes() {
        let rule = FieldRule::range(PhotophysicsField::PhiPl, 0.0, 1.0);
        assert!(rule.evaluate(None).is_none());
    }

    #[test]
    fn test_missing_required_is_invalid() {
        let rule = FieldRule::range(PhotophysicsField::PhiPl, 0.0, 1.0).required();
        let (flag, reason) = rule.evaluate(None).unwrap();
        assert_eq!(flag, QualityFlag::Invalid);
        assert!(reason.contains("phi_pl"));
    }

    #[test]
    fn test_hard_bounds_are_inclusive() {
        let rule = FieldRule::range(PhotophysicsField::LambdaPlNm, 200.0, 800.0);
        assert!(rule.evaluate(Some(200.0)).is_none());
        assert!(rule.evaluate(Some(800.0)).is_none());
        assert_eq!(rule.evaluate(Some(900.0)).unwrap().0, QualityFlag::Invalid);
    }

    #[test]
    fn test_soft_bound_yields_suspect() {
        let rule =
            FieldRule::range(PhotophysicsField::DeltaEstEv, 0.0, 1.5).with_soft_max(1.0);
        assert!(rule.evaluate(Some(0.2)).is_none());
        assert_eq!(rule.evaluate(Some(1.2)).unwrap().0, QualityFlag::Suspect);
        assert_eq!(rule.evaluate(Some(1.6)).unwrap().0, QualityFlag::Invalid);
    }

    #[test]
    fn test_non_finite_is_invalid() {
        let rule = FieldRule::at_least(DeviceField::LMaxCdM2, 0.0);
        assert_eq!(rule.evaluate(Some(f64::NAN)).unwrap().0, QualityFlag::Invalid);
        assert_eq!(rule.evaluate(Some(f64::INFINITY)).unwrap().0, QualityFlag::Invalid);
    }

    #[test]
    fn test_consistency_error() {
        let ok = FieldRule::range(PhotophysicsField::DeltaEstEv, 0.0, 1.5).with_soft_max(1.0);
        assert!(ok.consistency_error().is_none());

        let bad = FieldRule::range(PhotophysicsField::DeltaEstEv, 0.0, 1.5).with_soft_max(2.0);
        assert!(bad.consistency_error().is_some());
    }

    #[test]
    fn test_rules_deserialize_with_defaults() {
        let json = r#"{ "photophysics": [ { "field": "fwhm_nm", "hard_min": 5, "hard_max": 150 } ] }"#;
        let rules: RuleSet = serde_json::from_str(json).unwrap();
        assert_eq!(rules.photophysics.len(), 1);
        assert_eq!(rules.photophysics[0].field, PhotophysicsField::FwhmNm);
        assert!(!rules.photophysics[0].required);
        assert_eq!(rules.device, default_device_rules());
    }
}
