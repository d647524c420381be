//! Declarative export views over the canonical dataset.
//!
//! A task names a record kind, the field a row must carry to be exported and
//! the fields copied into each row. Rows are joined with their compound and
//! only compounds with a canonical structure are exported.

use std::collections::HashMap;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::record_repo::{self, RecordQuery};
use crate::db::{compound_repo, DatabaseError};
use crate::model::{Compound, MeasurementRecord, QualityFlag, RecordKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportTask {
    pub name: String,
    pub kind: RecordKind,
    /// Rows without a value here are left out.
    pub required_field: String,
    /// Fields copied into each row, in order.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ExportTask {
    pub fn new(name: &str, kind: RecordKind, required_field: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required_field: required_field.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Names every field that is not a column of the task's kind.
    pub fn unknown_fields(&self) -> Vec<&str> {
        let probe = MeasurementRecord::empty(self.kind);
        std::iter::once(self.required_field.as_str())
            .chain(self.fields.iter().map(String::as_str))
            .filter(|f| !probe.has_field(f))
            .collect()
    }
}

/// The regression datasets the dataset builder has always produced.
pub fn default_export_tasks() -> Vec<ExportTask> {
    vec![
        ExportTask::new(
            "delta_est",
            RecordKind::Photophysics,
            "delta_est_ev",
            &["delta_est_ev", "environment_type", "temperature_k"],
        ),
        ExportTask::new(
            "fwhm",
            RecordKind::Photophysics,
            "fwhm_nm",
            &["fwhm_nm", "lambda_pl_nm", "environment_type"],
        ),
        ExportTask::new(
            "eqe",
            RecordKind::Device,
            "eqe_max_percent",
            &["eqe_max_percent", "host", "doping_wt_percent", "lambda_el_nm"],
        ),
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportFilter {
    /// Accepted quality flags.
    pub flags: Vec<QualityFlag>,
    pub document_id: Option<String>,
}

impl Default for ExportFilter {
    fn default() -> Self {
        Self {
            flags: vec![QualityFlag::Valid],
            document_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub compound_id: String,
    pub structure: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub document_id: String,
    pub local_label: String,
    pub quality_flag: QualityFlag,
    pub values: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportView {
    pub task: String,
    pub kind: RecordKind,
    pub rows: Vec<ExportRow>,
}

impl ExportView {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn field_value(record: &MeasurementRecord, name: &str) -> Value {
    if let Some(v) = record.numeric_by_name(name) {
        return serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    record
        .text_by_name(name)
        .map(|t| Value::String(t.to_string()))
        .unwrap_or(Value::Null)
}

pub(crate) fn build_view(
    conn: &Connection,
    task: &ExportTask,
    filter: &ExportFilter,
) -> Result<ExportView, DatabaseError> {
    let records = record_repo::query(
        conn,
        task.kind,
        &RecordQuery {
            document_id: filter.document_id.clone(),
            compound_id: None,
            flags: filter.flags.clone(),
            with_structure_only: true,
        },
    )?;

    let mut compounds: HashMap<String, Option<Compound>> = HashMap::new();
    let mut rows = Vec::new();
    for stored in records {
        if stored.record.numeric_by_name(&task.required_field).is_none()
            && stored.record.text_by_name(&task.required_field).is_none()
        {
            continue;
        }
        if !compounds.contains_key(&stored.compound_id) {
            let compound = compound_repo::find_by_id(conn, &stored.compound_id)?;
            compounds.insert(stored.compound_id.clone(), compound);
        }
        let Some(Some(compound)) = compounds.get(&stored.compound_id) else {
            continue;
        };
        let Some(structure) = compound.canonical_structure.clone() else {
            continue;
        };

        let values = task
            .fields
            .iter()
            .map(|f| (f.clone(), field_value(&stored.record, f)))
            .collect();
        rows.push(ExportRow {
            compound_id: stored.compound_id,
            structure,
            display_name: compound.display_name.clone(),
            document_id: stored.document_id,
            local_label: stored.record.local_label().to_string(),
            quality_flag: stored.quality_flag,
            values,
        });
    }

    Ok(ExportView {
        task: task.name.clone(),
        kind: task.kind,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tasks_reference_real_fields() {
        for task in default_export_tasks() {
            assert!(task.unknown_fields().is_empty(), "{}", task.name);
        }
    }

    #[test]
    fn test_unknown_fields_are_reported() {
        let task = ExportTask::new("bad", RecordKind::Device, "phi_pl", &["eqe_max_percent", "nope"]);
        assert_eq!(task.unknown_fields(), vec!["phi_pl", "nope"]);
    }

    #[test]
    fn test_default_filter_is_valid_only() {
        assert_eq!(ExportFilter::default().flags, vec![QualityFlag::Valid]);
    }

    #[test]
    fn test_task_from_json() {
        let task: ExportTask = serde_json::from_str(
            r#"{"name": "plqy", "kind": "photophysics", "required_field": "phi_pl"}"#,
        )
        .unwrap();
        assert_eq!(task.kind, RecordKind::Photophysics);
        assert!(task.fields.is_empty());
    }
}
