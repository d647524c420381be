//! Document repository: bookkeeping rows for submitted documents.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{now_timestamp, parse_timestamp, Database, DatabaseError};
use crate::model::{Document, DocumentStatus};

fn document_from_row(row: &Row<'_>) -> Result<Document, rusqlite::Error> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(Document {
        document_id: row.get("document_id")?,
        source_ref: row.get("source_ref")?,
        status: DocumentStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown document status '{}'", status).into(),
            )
        })?,
        last_job_key: row.get("last_job_key")?,
        last_error: row.get("last_error")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

/// Records a submission. A re-submitted document is reset to `queued`
/// in place and bound to the new job key.
pub fn register_submission(
    db: &Database,
    document_id: &str,
    source_ref: &str,
    job_key: &str,
) -> Result<(), DatabaseError> {
    let now = now_timestamp();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO documents (document_id, source_ref, status, last_job_key, created_at, updated_at)
             VALUES (?1, ?2, 'queued', ?3, ?4, ?4)
             ON CONFLICT(document_id) DO UPDATE SET
                source_ref = excluded.source_ref,
                status = 'queued',
                last_job_key = excluded.last_job_key,
                last_error = NULL,
                completed_at = NULL,
                updated_at = excluded.updated_at",
            params![document_id, source_ref, job_key, now],
        )?;
        Ok(())
    })
}

/// Updates the status of a document, but only while `job_key` is still the
/// job the document is bound to. Returns whether a row changed.
pub fn update_status(
    db: &Database,
    document_id: &str,
    job_key: &str,
    status: DocumentStatus,
    last_error: Option<&str>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| update_status_in(conn, document_id, job_key, status, last_error))
}

/// Same as [`update_status`] on a connection the caller holds.
pub fn update_status_in(
    conn: &Connection,
    document_id: &str,
    job_key: &str,
    status: DocumentStatus,
    last_error: Option<&str>,
) -> Result<bool, DatabaseError> {
    let now = now_timestamp();
    let completed_at = matches!(status, DocumentStatus::Completed | DocumentStatus::Failed)
        .then(|| now.clone());
    let changed = conn.execute(
        "UPDATE documents SET status = ?3, last_error = ?4, updated_at = ?5, completed_at = ?6
         WHERE document_id = ?1 AND last_job_key = ?2",
        params![
            document_id,
            job_key,
            status.as_str(),
            last_error,
            now,
            completed_at
        ],
    )?;
    Ok(changed > 0)
}

/// Finds a document by its id.
pub fn find_by_id(db: &Database, document_id: &str) -> Result<Option<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE document_id = ?1",
                params![document_id],
                document_from_row,
            )
            .optional()?;
        Ok(doc)
    })
}

/// Finds the document whose most recent job had the given key.
pub fn find_by_job_key(db: &Database, job_key: &str) -> Result<Option<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let doc = conn
            .query_row(
                "SELECT * FROM documents WHERE last_job_key = ?1",
                params![job_key],
                document_from_row,
            )
            .optional()?;
        Ok(doc)
    })
}

/// Lists documents, optionally filtered by status, newest first.
pub fn list(db: &Database, status: Option<DocumentStatus>) -> Result<Vec<Document>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM documents WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, document_id",
        )?;
        let rows = stmt
            .query_map(params![status.map(|s| s.as_str())], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
