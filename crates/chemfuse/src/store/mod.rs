//! Integration store: the canonical relational dataset.
//!
//! Records are written only through this type. Every write checks that the
//! target compound exists and is live, so nothing ever points at a compound
//! that was merged away.

use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

use crate::db::record_repo::{self, Annotation, RecordQuery};
use crate::db::{compound_repo, document_repo, Database, DatabaseError};
use crate::model::{Document, DocumentStatus, QualityFlag, RecordKind, StoredRecord};
use crate::review::ReviewedRecord;

pub mod export;

pub use export::{default_export_tasks, ExportFilter, ExportRow, ExportTask, ExportView};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Database(#[from] DatabaseError),

    #[error("Unknown compound: {0}")]
    UnknownCompound(String),

    #[error("Compound {compound_id} was retired into {retired_into}")]
    RetiredCompound {
        compound_id: String,
        retired_into: String,
    },

    #[error("Unknown export task: {0}")]
    UnknownExportTask(String),
}

/// Dataset totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatistics {
    pub photophysics_total: u64,
    pub photophysics_valid: u64,
    pub device_total: u64,
    pub device_valid: u64,
    pub compounds_total: u64,
    pub compounds_with_structure: u64,
    pub compounds_provisional: u64,
    pub compounds_retired: u64,
}

#[derive(Clone)]
pub struct IntegrationStore {
    db: Database,
    export_tasks: Vec<ExportTask>,
}

impl IntegrationStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            export_tasks: default_export_tasks(),
        }
    }

    pub fn with_export_tasks(mut self, tasks: Vec<ExportTask>) -> Self {
        self.export_tasks = tasks;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn export_tasks(&self) -> &[ExportTask] {
        &self.export_tasks
    }

    /// Upserts one record in its own transaction. Returns the record id.
    pub fn upsert(
        &self,
        document_id: &str,
        compound_id: &str,
        reviewed: &ReviewedRecord,
    ) -> Result<String, StoreError> {
        self.db
            .with_transaction(|conn| self.upsert_in(conn, document_id, compound_id, reviewed))
    }

    /// Upserts on a connection the caller holds, normally inside the
    /// persisting transaction.
    pub fn upsert_in(
        &self,
        conn: &Connection,
        document_id: &str,
        compound_id: &str,
        reviewed: &ReviewedRecord,
    ) -> Result<String, StoreError> {
        let compound = compound_repo::find_by_id(conn, compound_id)?
            .ok_or_else(|| StoreError::UnknownCompound(compound_id.to_string()))?;
        if let Some(retired_into) = compound.retired_into {
            return Err(StoreError::RetiredCompound {
                compound_id: compound_id.to_string(),
                retired_into,
            });
        }

        let annotation = Annotation {
            flag: reviewed.validation.flag,
            reasons: &reviewed.validation.reasons,
            review_note: reviewed.review_note.as_deref(),
        };
        Ok(record_repo::upsert(
            conn,
            document_id,
            compound_id,
            &reviewed.record,
            &annotation,
        )?)
    }

    /// Deletes every record of a document. Returns the number removed.
    pub fn delete_document_records_in(
        &self,
        conn: &Connection,
        document_id: &str,
    ) -> Result<usize, StoreError> {
        Ok(record_repo::delete_by_document(conn, document_id)?)
    }

    /// Replaces all records of a document in one transaction. Nothing
    /// changes if any record is rejected.
    pub fn replace_document_records(
        &self,
        document_id: &str,
        records: &[(String, ReviewedRecord)],
    ) -> Result<Vec<String>, StoreError> {
        self.db.with_transaction(|conn| {
            let removed = self.delete_document_records_in(conn, document_id)?;
            let mut ids = Vec::with_capacity(records.len());
            for (compound_id, reviewed) in records {
                ids.push(self.upsert_in(conn, document_id, compound_id, reviewed)?);
            }
            log::debug!(
                "Replaced records of {}: {} removed, {} written",
                document_id,
                removed,
                ids.len()
            );
            Ok(ids)
        })
    }

    fn list(&self, query: RecordQuery) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.db.with_conn(|conn| {
            let mut records = record_repo::query(conn, RecordKind::Photophysics, &query)?;
            records.extend(record_repo::query(conn, RecordKind::Device, &query)?);
            Ok(records)
        })?)
    }

    /// Every record of a compound, photophysics first.
    pub fn list_by_compound(&self, compound_id: &str) -> Result<Vec<StoredRecord>, StoreError> {
        self.list(RecordQuery {
            compound_id: Some(compound_id.to_string()),
            ..Default::default()
        })
    }

    /// Every record of a document, photophysics first.
    pub fn list_by_document(&self, document_id: &str) -> Result<Vec<StoredRecord>, StoreError> {
        self.list(RecordQuery {
            document_id: Some(document_id.to_string()),
            ..Default::default()
        })
    }

    /// Records of one kind matching an arbitrary query.
    pub fn query(
        &self,
        kind: RecordKind,
        query: &RecordQuery,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.db.with_conn(|conn| record_repo::query(conn, kind, query))?)
    }

    pub fn export_view(
        &self,
        task_name: &str,
        filter: &ExportFilter,
    ) -> Result<ExportView, StoreError> {
        let task = self
            .export_tasks
            .iter()
            .find(|t| t.name == task_name)
            .ok_or_else(|| StoreError::UnknownExportTask(task_name.to_string()))?;
        let view = self
            .db
            .with_conn(|conn| export::build_view(conn, task, filter))?;
        log::info!("Export view '{}': {} rows", task_name, view.len());
        Ok(view)
    }

    pub fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        Ok(self.db.with_conn(|conn| {
            let compounds = compound_repo::counts(conn)?;
            Ok(StoreStatistics {
                photophysics_total: record_repo::count(conn, RecordKind::Photophysics, None)?,
                photophysics_valid: record_repo::count(
                    conn,
                    RecordKind::Photophysics,
                    Some(QualityFlag::Valid),
                )?,
                device_total: record_repo::count(conn, RecordKind::Device, None)?,
                device_valid: record_repo::count(conn, RecordKind::Device, Some(QualityFlag::Valid))?,
                compounds_total: compounds.live,
                compounds_with_structure: compounds.with_structure,
                compounds_provisional: compounds.provisional,
                compounds_retired: compounds.retired,
            })
        })?)
    }

    /// Records still pointing at a retired compound. Zero when the merge
    /// bookkeeping is sound.
    pub fn records_referencing_retired(&self) -> Result<u64, StoreError> {
        Ok(self.db.with_conn(record_repo::count_referencing_retired)?)
    }

    pub fn list_documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>, StoreError> {
        Ok(document_repo::list(&self.db, status)?)
    }

    pub fn document(&self, document_id: &str) -> Result<Option<Document>, StoreError> {
        Ok(document_repo::find_by_id(&self.db, document_id)?)
    }

    /// The document whose most recent job had this key.
    pub fn document_for_job(&self, job_key: &str) -> Result<Option<Document>, StoreError> {
        Ok(document_repo::find_by_job_key(&self.db, job_key)?)
    }
}
