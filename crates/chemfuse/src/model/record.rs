//! Measurement records extracted from a document.
//!
//! Records are a tagged variant per kind so the set of fields is known at
//! compile time. Numeric fields are addressable through per-kind field enums,
//! which is what the quality rule table refers to.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A raw field map as returned by the field extractor.
pub type FieldMap = HashMap<String, Value>;

/// Quality classification attached to every persisted record.
///
/// Ordering follows severity: `Valid < Suspect < Invalid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    Valid,
    Suspect,
    Invalid,
}

impl QualityFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::Valid => "valid",
            QualityFlag::Suspect => "suspect",
            QualityFlag::Invalid => "invalid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(QualityFlag::Valid),
            "suspect" => Some(QualityFlag::Suspect),
            "invalid" => Some(QualityFlag::Invalid),
            _ => None,
        }
    }

    /// Returns the less trustworthy of the two flags.
    pub fn worst(self, other: QualityFlag) -> QualityFlag {
        self.max(other)
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Photophysics,
    Device,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Photophysics => "photophysics",
            RecordKind::Device => "device",
        }
    }

    pub(crate) fn table(&self) -> &'static str {
        match self {
            RecordKind::Photophysics => "photophysics_records",
            RecordKind::Device => "device_records",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Unknown {kind} field '{name}'")]
    UnknownField { kind: RecordKind, name: String },

    #[error("Field '{name}' expects a number, got {value}")]
    NotNumeric { name: String, value: String },

    #[error("Record has no compound label")]
    MissingLabel,

    #[error("Field '{0}' names the compound and cannot be amended")]
    LabelField(String),
}

/// Extractor keys that carry the document-local compound label.
pub const LABEL_FIELDS: [&str; 3] = ["local_label", "paper_local_id", "compound_label"];

/// Access to the numeric fields of a record kind, keyed by a field enum.
pub trait NumericFields {
    type Field: Copy + Eq + fmt::Debug + fmt::Display;

    fn numeric(&self, field: Self::Field) -> Option<f64>;
}

// ─── Photophysics ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhotophysicsField {
    #[serde(rename = "doping_wt_percent")]
    DopingWtPercent,
    #[serde(rename = "temperature_k")]
    TemperatureK,
    #[serde(rename = "lambda_pl_nm")]
    LambdaPlNm,
    #[serde(rename = "lambda_em_nm")]
    LambdaEmNm,
    #[serde(rename = "fwhm_nm")]
    FwhmNm,
    #[serde(rename = "phi_pl")]
    PhiPl,
    #[serde(rename = "delta_est_ev")]
    DeltaEstEv,
    #[serde(rename = "tau_prompt_ns")]
    TauPromptNs,
    #[serde(rename = "tau_delayed_us")]
    TauDelayedUs,
    #[serde(rename = "k_r")]
    Kr,
    #[serde(rename = "k_isc")]
    Kisc,
    #[serde(rename = "k_risc")]
    Krisc,
}

impl PhotophysicsField {
    pub const ALL: [PhotophysicsField; 12] = [
        PhotophysicsField::DopingWtPercent,
        PhotophysicsField::TemperatureK,
        PhotophysicsField::LambdaPlNm,
        PhotophysicsField::LambdaEmNm,
        PhotophysicsField::FwhmNm,
        PhotophysicsField::PhiPl,
        PhotophysicsField::DeltaEstEv,
        PhotophysicsField::TauPromptNs,
        PhotophysicsField::TauDelayedUs,
        PhotophysicsField::Kr,
        PhotophysicsField::Kisc,
        PhotophysicsField::Krisc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhotophysicsField::DopingWtPercent => "doping_wt_percent",
            PhotophysicsField::TemperatureK => "temperature_k",
            PhotophysicsField::LambdaPlNm => "lambda_pl_nm",
            PhotophysicsField::LambdaEmNm => "lambda_em_nm",
            PhotophysicsField::FwhmNm => "fwhm_nm",
            PhotophysicsField::PhiPl => "phi_pl",
            PhotophysicsField::DeltaEstEv => "delta_est_ev",
            PhotophysicsField::TauPromptNs => "tau_prompt_ns",
            PhotophysicsField::TauDelayedUs => "tau_delayed_us",
            PhotophysicsField::Kr => "k_r",
            PhotophysicsField::Kisc => "k_isc",
            PhotophysicsField::Krisc => "k_risc",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for PhotophysicsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One photophysical measurement of one compound in one context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotophysicsRecord {
    /// Label the document uses for the compound ("1", "2a", "BNCz").
    pub local_label: String,
    pub name: Option<String>,
    pub environment_type: Option<String>,
    pub environment_detail: Option<String>,
    pub host: Option<String>,
    pub doping_wt_percent: Option<f64>,
    pub temperature_k: Option<f64>,
    pub lambda_pl_nm: Option<f64>,
    pub lambda_em_nm: Option<f64>,
    pub fwhm_nm: Option<f64>,
    pub phi_pl: Option<f64>,
    pub delta_est_ev: Option<f64>,
    pub tau_prompt_ns: Option<f64>,
    pub tau_delayed_us: Option<f64>,
    pub k_r: Option<f64>,
    pub k_isc: Option<f64>,
    pub k_risc: Option<f64>,
    pub table_id: Option<String>,
    pub source_snippet: Option<String>,
    pub note: Option<String>,
}

impl PhotophysicsRecord {
    pub fn new(local_label: &str) -> Self {
        Self {
            local_label: local_label.to_string(),
            ..Default::default()
        }
    }

    fn numeric_slot(&mut self, field: PhotophysicsField) -> &mut Option<f64> {
        match field {
            PhotophysicsField::DopingWtPercent => &mut self.doping_wt_percent,
            PhotophysicsField::TemperatureK => &mut self.temperature_k,
            PhotophysicsField::LambdaPlNm => &mut self.lambda_pl_nm,
            PhotophysicsField::LambdaEmNm => &mut self.lambda_em_nm,
            PhotophysicsField::FwhmNm => &mut self.fwhm_nm,
            PhotophysicsField::PhiPl => &mut self.phi_pl,
            PhotophysicsField::DeltaEstEv => &mut self.delta_est_ev,
            PhotophysicsField::TauPromptNs => &mut self.tau_prompt_ns,
            PhotophysicsField::TauDelayedUs => &mut self.tau_delayed_us,
            PhotophysicsField::Kr => &mut self.k_r,
            PhotophysicsField::Kisc => &mut self.k_isc,
            PhotophysicsField::Krisc => &mut self.k_risc,
        }
    }

    /// Text columns persisted alongside the numeric fields.
    pub const TEXT_FIELDS: [&'static str; 7] = [
        "name",
        "environment_type",
        "environment_detail",
        "host",
        "table_id",
        "source_snippet",
        "note",
    ];

    fn text_slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "name" | "compound_name" => Some(&mut self.name),
            "environment_type" => Some(&mut self.environment_type),
            "environment_detail" => Some(&mut self.environment_detail),
            "host" => Some(&mut self.host),
            "table_id" => Some(&mut self.table_id),
            "source_snippet" => Some(&mut self.source_snippet),
            "note" => Some(&mut self.note),
            _ => None,
        }
    }

    fn text(&self, name: &str) -> Option<&str> {
        match name {
            "name" => self.name.as_deref(),
            "environment_type" => self.environment_type.as_deref(),
            "environment_detail" => self.environment_detail.as_deref(),
            "host" => self.host.as_deref(),
            "table_id" => self.table_id.as_deref(),
            "source_snippet" => self.source_snippet.as_deref(),
            "note" => self.note.as_deref(),
            _ => None,
        }
    }
}

impl NumericFields for PhotophysicsRecord {
    type Field = PhotophysicsField;

    fn numeric(&self, field: PhotophysicsField) -> Option<f64> {
        match field {
            PhotophysicsField::DopingWtPercent => self.doping_wt_percent,
            PhotophysicsField::TemperatureK => self.temperature_k,
            PhotophysicsField::LambdaPlNm => self.lambda_pl_nm,
            PhotophysicsField::LambdaEmNm => self.lambda_em_nm,
            PhotophysicsField::FwhmNm => self.fwhm_nm,
            PhotophysicsField::PhiPl => self.phi_pl,
            PhotophysicsField::DeltaEstEv => self.delta_est_ev,
            PhotophysicsField::TauPromptNs => self.tau_prompt_ns,
            PhotophysicsField::TauDelayedUs => self.tau_delayed_us,
            PhotophysicsField::Kr => self.k_r,
            PhotophysicsField::Kisc => self.k_isc,
            PhotophysicsField::Krisc => self.k_risc,
        }
    }
}

// ─── Device ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceField {
    #[serde(rename = "doping_wt_percent")]
    DopingWtPercent,
    #[serde(rename = "lambda_el_nm")]
    LambdaElNm,
    #[serde(rename = "cie_x")]
    CieX,
    #[serde(rename = "cie_y")]
    CieY,
    #[serde(rename = "eqe_max_percent")]
    EqeMaxPercent,
    #[serde(rename = "eqe_100_cd_m2")]
    Eqe100CdM2,
    #[serde(rename = "eqe_1000_cd_m2")]
    Eqe1000CdM2,
    #[serde(rename = "l_max_cd_m2")]
    LMaxCdM2,
    #[serde(rename = "von_v")]
    VonV,
    #[serde(rename = "current_efficiency")]
    CurrentEfficiency,
    #[serde(rename = "power_efficiency")]
    PowerEfficiency,
}

impl DeviceField {
    pub const ALL: [DeviceField; 11] = [
        DeviceField::DopingWtPercent,
        DeviceField::LambdaElNm,
        DeviceField::CieX,
        DeviceField::CieY,
        DeviceField::EqeMaxPercent,
        DeviceField::Eqe100CdM2,
        DeviceField::Eqe1000CdM2,
        DeviceField::LMaxCdM2,
        DeviceField::VonV,
        DeviceField::CurrentEfficiency,
        DeviceField::PowerEfficiency,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceField::DopingWtPercent => "doping_wt_percent",
            DeviceField::LambdaElNm => "lambda_el_nm",
            DeviceField::CieX => "cie_x",
            DeviceField::CieY => "cie_y",
            DeviceField::EqeMaxPercent => "eqe_max_percent",
            DeviceField::Eqe100CdM2 => "eqe_100_cd_m2",
            DeviceField::Eqe1000CdM2 => "eqe_1000_cd_m2",
            DeviceField::LMaxCdM2 => "l_max_cd_m2",
            DeviceField::VonV => "von_v",
            DeviceField::CurrentEfficiency => "current_efficiency",
            DeviceField::PowerEfficiency => "power_efficiency",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for DeviceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OLED device measurement using a compound as emitter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceRecord {
    /// Label the document uses for the emitter compound.
    pub local_label: String,
    pub emitter_name: Option<String>,
    pub device_structure: Option<String>,
    pub host: Option<String>,
    pub doping_wt_percent: Option<f64>,
    pub lambda_el_nm: Option<f64>,
    pub cie_x: Option<f64>,
    pub cie_y: Option<f64>,
    pub eqe_max_percent: Option<f64>,
    pub eqe_100_cd_m2: Option<f64>,
    pub eqe_1000_cd_m2: Option<f64>,
    pub l_max_cd_m2: Option<f64>,
    pub von_v: Option<f64>,
    pub current_efficiency: Option<f64>,
    pub power_efficiency: Option<f64>,
    pub table_id: Option<String>,
    pub source_snippet: Option<String>,
}

impl DeviceRecord {
    pub fn new(local_label: &str) -> Self {
        Self {
            local_label: local_label.to_string(),
            ..Default::default()
        }
    }

    fn numeric_slot(&mut self, field: DeviceField) -> &mut Option<f64> {
        match field {
            DeviceField::DopingWtPercent => &mut self.doping_wt_percent,
            DeviceField::LambdaElNm => &mut self.lambda_el_nm,
            DeviceField::CieX => &mut self.cie_x,
            DeviceField::CieY => &mut self.cie_y,
            DeviceField::EqeMaxPercent => &mut self.eqe_max_percent,
            DeviceField::Eqe100CdM2 => &mut self.eqe_100_cd_m2,
            DeviceField::Eqe1000CdM2 => &mut self.eqe_1000_cd_m2,
            DeviceField::LMaxCdM2 => &mut self.l_max_cd_m2,
            DeviceField::VonV => &mut self.von_v,
            DeviceField::CurrentEfficiency => &mut self.current_efficiency,
            DeviceField::PowerEfficiency => &mut self.power_efficiency,
        }
    }

    /// Text columns persisted alongside the numeric fields.
    pub const TEXT_FIELDS: [&'static str; 5] = [
        "emitter_name",
        "device_structure",
        "host",
        "table_id",
        "source_snippet",
    ];

    fn text_slot(&mut self, name: &str) -> Option<&mut Option<String>> {
        match name {
            "emitter_name" | "name" => Some(&mut self.emitter_name),
            "device_structure" => Some(&mut self.device_structure),
            "host" => Some(&mut self.host),
            "table_id" => Some(&mut self.table_id),
            "source_snippet" => Some(&mut self.source_snippet),
            _ => None,
        }
    }

    fn text(&self, name: &str) -> Option<&str> {
        match name {
            "emitter_name" => self.emitter_name.as_deref(),
            "device_structure" => self.device_structure.as_deref(),
            "host" => self.host.as_deref(),
            "table_id" => self.table_id.as_deref(),
            "source_snippet" => self.source_snippet.as_deref(),
            _ => None,
        }
    }
}

impl NumericFields for DeviceRecord {
    type Field = DeviceField;

    fn numeric(&self, field: DeviceField) -> Option<f64> {
        match field {
            DeviceField::DopingWtPercent => self.doping_wt_percent,
            DeviceField::LambdaElNm => self.lambda_el_nm,
            DeviceField::CieX => self.cie_x,
            DeviceField::CieY => self.cie_y,
            DeviceField::EqeMaxPercent => self.eqe_max_percent,
            DeviceField::Eqe100CdM2 => self.eqe_100_cd_m2,
            DeviceField::Eqe1000CdM2 => self.eqe_1000_cd_m2,
            DeviceField::LMaxCdM2 => self.l_max_cd_m2,
            DeviceField::VonV => self.von_v,
            DeviceField::CurrentEfficiency => self.current_efficiency,
            DeviceField::PowerEfficiency => self.power_efficiency,
        }
    }
}

// ─── MeasurementRecord ──────────────────────────────────────────────────────

/// A measurement record of either kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeasurementRecord {
    Photophysics(PhotophysicsRecord),
    Device(DeviceRecord),
}

impl MeasurementRecord {
    /// Builds a typed record from an extractor field map.
    ///
    /// Keys are matched case-insensitively, so both `lambda_PL_nm` and
    /// `lambda_pl_nm` land in the same field. Unknown keys are ignored and
    /// placeholder values ("-", "n.d.", "") become missing values.
    pub fn from_field_map(kind: RecordKind, map: &FieldMap) -> Result<Self, FieldError> {
        let mut record = Self::empty(kind);

        for (key, value) in map {
            match record.set_field(&key.to_ascii_lowercase(), value) {
                Ok(()) => {}
                Err(FieldError::UnknownField { name, .. }) => {
                    tracing::trace!(field = %name, "ignoring unknown extracted field");
                }
                Err(FieldError::NotNumeric { name, value }) => {
                    tracing::warn!(field = %name, value = %value, "dropping non-numeric value");
                }
                Err(e) => return Err(e),
            }
        }

        if record.local_label().trim().is_empty() {
            return Err(FieldError::MissingLabel);
        }
        Ok(record)
    }

    /// A record of `kind` with no label and every field missing.
    pub fn empty(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Photophysics => MeasurementRecord::Photophysics(Default::default()),
            RecordKind::Device => MeasurementRecord::Device(Default::default()),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            MeasurementRecord::Photophysics(_) => RecordKind::Photophysics,
            MeasurementRecord::Device(_) => RecordKind::Device,
        }
    }

    pub fn local_label(&self) -> &str {
        match self {
            MeasurementRecord::Photophysics(r) => &r.local_label,
            MeasurementRecord::Device(r) => &r.local_label,
        }
    }

    /// Compound name reported next to the measurement, if any.
    pub fn compound_name(&self) -> Option<&str> {
        match self {
            MeasurementRecord::Photophysics(r) => r.name.as_deref(),
            MeasurementRecord::Device(r) => r.emitter_name.as_deref(),
        }
    }

    pub fn table_id(&self) -> Option<&str> {
        match self {
            MeasurementRecord::Photophysics(r) => r.table_id.as_deref(),
            MeasurementRecord::Device(r) => r.table_id.as_deref(),
        }
    }

    pub fn set_table_id(&mut self, table_id: &str) {
        let slot = match self {
            MeasurementRecord::Photophysics(r) => &mut r.table_id,
            MeasurementRecord::Device(r) => &mut r.table_id,
        };
        *slot = Some(table_id.to_string());
    }

    /// Numeric value of a field by its snake_case name.
    pub fn numeric_by_name(&self, name: &str) -> Option<f64> {
        match self {
            MeasurementRecord::Photophysics(r) => {
                PhotophysicsField::from_name(name).and_then(|f| r.numeric(f))
            }
            MeasurementRecord::Device(r) => DeviceField::from_name(name).and_then(|f| r.numeric(f)),
        }
    }

    /// Text value of a field by its snake_case name.
    pub fn text_by_name(&self, name: &str) -> Option<&str> {
        match self {
            MeasurementRecord::Photophysics(r) => r.text(name),
            MeasurementRecord::Device(r) => r.text(name),
        }
    }

    /// Names of the text columns for this record kind.
    pub fn text_fields(&self) -> &'static [&'static str] {
        match self {
            MeasurementRecord::Photophysics(_) => &PhotophysicsRecord::TEXT_FIELDS,
            MeasurementRecord::Device(_) => &DeviceRecord::TEXT_FIELDS,
        }
    }

    /// Names of the numeric columns for this record kind.
    pub fn numeric_fields(&self) -> Vec<&'static str> {
        match self {
            MeasurementRecord::Photophysics(_) => {
                PhotophysicsField::ALL.iter().map(|f| f.as_str()).collect()
            }
            MeasurementRecord::Device(_) => DeviceField::ALL.iter().map(|f| f.as_str()).collect(),
        }
    }

    /// Whether `name` is a numeric or text column of this kind.
    pub fn has_field(&self, name: &str) -> bool {
        self.numeric_fields().contains(&name) || self.text_fields().contains(&name)
    }

    pub fn set_numeric(&mut self, name: &str, value: Option<f64>) -> Result<(), FieldError> {
        let kind = self.kind();
        let slot = match self {
            MeasurementRecord::Photophysics(r) => match PhotophysicsField::from_name(name) {
                Some(field) => Some(r.numeric_slot(field)),
                None => None,
            },
            MeasurementRecord::Device(r) => match DeviceField::from_name(name) {
                Some(field) => Some(r.numeric_slot(field)),
                None => None,
            },
        };
        match slot {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(FieldError::UnknownField {
                kind,
                name: name.to_string(),
            }),
        }
    }

    pub fn set_text(&mut self, name: &str, value: Option<String>) -> Result<(), FieldError> {
        let kind = self.kind();
        if LABEL_FIELDS.contains(&name) {
            let label = value.unwrap_or_default();
            match self {
                MeasurementRecord::Photophysics(r) => r.local_label = label,
                MeasurementRecord::Device(r) => r.local_label = label,
            }
            return Ok(());
        }
        let slot = match self {
            MeasurementRecord::Photophysics(r) => r.text_slot(name),
            MeasurementRecord::Device(r) => r.text_slot(name),
        };
        match slot {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(FieldError::UnknownField {
                kind,
                name: name.to_string(),
            }),
        }
    }

    /// Overwrites one field by name from a JSON value. Used for extractor
    /// maps and review amendments.
    pub fn set_field(&mut self, name: &str, value: &Value) -> Result<(), FieldError> {
        if self.numeric_fields().contains(&name) {
            let parsed = numeric_value(name, value)?;
            return self.set_numeric(name, parsed);
        }
        self.set_text(name, text_value(value))
    }

    /// Like [`set_field`](Self::set_field), but the compound label is
    /// fixed once the record exists.
    pub fn amend_field(&mut self, name: &str, value: &Value) -> Result<(), FieldError> {
        if LABEL_FIELDS.contains(&name) {
            return Err(FieldError::LabelField(name.to_string()));
        }
        self.set_field(name, value)
    }

    /// Measurement-context discriminator used for the upsert key.
    pub fn context_key(&self) -> String {
        match self {
            MeasurementRecord::Photophysics(r) => [
                norm_text(&r.environment_type),
                norm_text(&r.environment_detail),
                norm_text(&r.host),
                norm_number(r.doping_wt_percent),
                norm_number(r.temperature_k),
            ]
            .join("|"),
            MeasurementRecord::Device(r) => [
                norm_text(&r.device_structure),
                norm_text(&r.host),
                norm_number(r.doping_wt_percent),
            ]
            .join("|"),
        }
    }
}

/// A record as persisted in the integration store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub record_id: String,
    pub document_id: String,
    pub compound_id: String,
    pub quality_flag: QualityFlag,
    #[serde(default)]
    pub quality_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
    pub record: MeasurementRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ─── Value helpers ──────────────────────────────────────────────────────────

const MISSING_MARKERS: &[&str] = &["", "-", "–", "—", "n.d.", "nd", "n/a", "na", "null", "none"];

fn numeric_value(name: &str, value: &Value) -> Result<Option<f64>, FieldError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) => {
            let trimmed = s.trim().trim_end_matches('%').trim();
            if MISSING_MARKERS.contains(&trimmed.to_ascii_lowercase().as_str()) {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| FieldError::NotNumeric {
                    name: name.to_string(),
                    value: s.clone(),
                })
        }
        other => Err(FieldError::NotNumeric {
            name: name.to_string(),
            value: other.to_string(),
        }),
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        other => Some(other.to_string()),
    }
}

fn norm_text(value: &Option<String>) -> String {
    value
        .as_deref()
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_default()
}

fn norm_number(value: Option<f64>) -> String {
    value.map(|v| format!("{}", v)).unwrap_or_default()
}
