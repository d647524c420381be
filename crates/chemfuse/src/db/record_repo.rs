//! Record repository: `photophysics_records` and `device_records`.
//!
//! Columns mirror the typed record fields one-to-one, so statements are
//! assembled from the field name lists instead of being spelled out per kind.

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};

use super::{now_timestamp, parse_timestamp, DatabaseError};
use crate::model::{MeasurementRecord, QualityFlag, RecordKind, StoredRecord};

const KINDS: [RecordKind; 2] = [RecordKind::Photophysics, RecordKind::Device];

/// Filter for record listing.
#[derive(Debug, Default, Clone)]
pub struct RecordQuery {
    pub document_id: Option<String>,
    pub compound_id: Option<String>,
    /// Empty means any flag.
    pub flags: Vec<QualityFlag>,
    /// Only records whose compound carries a canonical structure.
    pub with_structure_only: bool,
}

/// Quality annotation written with a record.
#[derive(Debug, Clone)]
pub struct Annotation<'a> {
    pub flag: QualityFlag,
    pub reasons: &'a [String],
    pub review_note: Option<&'a str>,
}

fn conversion_error(msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, msg.into())
}

fn stored_from_row(kind: RecordKind, row: &Row<'_>) -> Result<StoredRecord, rusqlite::Error> {
    let mut record = MeasurementRecord::empty(kind);
    record
        .set_text("local_label", row.get("local_label")?)
        .map_err(|e| conversion_error(e.to_string()))?;
    for name in record.text_fields() {
        let value: Option<String> = row.get(*name)?;
        record
            .set_text(name, value)
            .map_err(|e| conversion_error(e.to_string()))?;
    }
    for name in record.numeric_fields() {
        let value: Option<f64> = row.get(name)?;
        record
            .set_numeric(name, value)
            .map_err(|e| conversion_error(e.to_string()))?;
    }

    let flag: String = row.get("quality_flag")?;
    let reasons: String = row.get("quality_reasons")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(StoredRecord {
        record_id: row.get("record_id")?,
        document_id: row.get("document_id")?,
        compound_id: row.get("compound_id")?,
        quality_flag: QualityFlag::parse(&flag)
            .ok_or_else(|| conversion_error(format!("unknown quality flag '{}'", flag)))?,
        quality_reasons: serde_json::from_str(&reasons)
            .map_err(|e| conversion_error(e.to_string()))?,
        review_note: row.get("review_note")?,
        record,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

/// Inserts or updates a record keyed on `(document_id, compound_id, context_key)`.
///
/// An update keeps the existing record id and creation time. Returns the
/// record id.
pub fn upsert(
    conn: &Connection,
    document_id: &str,
    compound_id: &str,
    record: &MeasurementRecord,
    annotation: &Annotation<'_>,
) -> Result<String, DatabaseError> {
    let reasons =
        serde_json::to_string(annotation.reasons).map_err(|e| DatabaseError::Json {
            column: "quality_reasons",
            source: e,
        })?;
    let now = now_timestamp();

    let mut columns: Vec<&str> = vec![
        "record_id",
        "document_id",
        "compound_id",
        "local_label",
        "context_key",
    ];
    let mut values: Vec<SqlValue> = vec![
        SqlValue::Text(uuid::Uuid::new_v4().to_string()),
        SqlValue::Text(document_id.to_string()),
        SqlValue::Text(compound_id.to_string()),
        SqlValue::Text(record.local_label().to_string()),
        SqlValue::Text(record.context_key()),
    ];

    for name in record.text_fields() {
        columns.push(*name);
        values.push(match record.text_by_name(name) {
            Some(text) => SqlValue::Text(text.to_string()),
            None => SqlValue::Null,
        });
    }
    for name in record.numeric_fields() {
        columns.push(name);
        values.push(match record.numeric_by_name(name) {
            Some(v) if v.is_finite() => SqlValue::Real(v),
            _ => SqlValue::Null,
        });
    }

    columns.extend(["quality_flag", "quality_reasons", "review_note", "created_at", "updated_at"]);
    values.push(SqlValue::Text(annotation.flag.as_str().to_string()));
    values.push(SqlValue::Text(reasons));
    values.push(match annotation.review_note {
        Some(note) => SqlValue::Text(note.to_string()),
        None => SqlValue::Null,
    });
    values.push(SqlValue::Text(now.clone()));
    values.push(SqlValue::Text(now));

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| {
            !matches!(
                **c,
                "record_id" | "document_id" | "compound_id" | "context_key" | "created_at"
            )
        })
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    let sql = format!(
        "INSERT INTO {table} ({columns}) VALUES ({placeholders})
         ON CONFLICT(document_id, compound_id, context_key) DO UPDATE SET {updates}
         RETURNING record_id",
        table = record.kind().table(),
        columns = columns.join(", "),
        placeholders = placeholders.join(", "),
        updates = updates.join(", "),
    );

    let record_id: String = conn.query_row(&sql, params_from_iter(values), |r| r.get(0))?;
    Ok(record_id)
}

/// Deletes every record of a document. Returns the number removed.
pub fn delete_by_document(conn: &Connection, document_id: &str) -> Result<usize, DatabaseError> {
    let mut removed = 0;
    for kind in KINDS {
        removed += conn.execute(
            &format!("DELETE FROM {} WHERE document_id = ?1", kind.table()),
            params![document_id],
        )?;
    }
    Ok(removed)
}

/// Re-points every record of `from` to `to` across both record tables.
///
/// A record colliding with one already held by `to` for the same document
/// and context replaces it.
pub fn repoint_compound(conn: &Connection, from: &str, to: &str) -> Result<usize, DatabaseError> {
    let mut moved = 0;
    for kind in KINDS {
        moved += conn.execute(
            &format!(
                "UPDATE OR REPLACE {} SET compound_id = ?2, updated_at = ?3 WHERE compound_id = ?1",
                kind.table()
            ),
            params![from, to, now_timestamp()],
        )?;
    }
    Ok(moved)
}

/// Re-points the records one document files under a label.
pub fn repoint_label(
    conn: &Connection,
    document_id: &str,
    local_label: &str,
    to: &str,
) -> Result<usize, DatabaseError> {
    let mut moved = 0;
    for kind in KINDS {
        moved += conn.execute(
            &format!(
                "UPDATE OR REPLACE {} SET compound_id = ?3, updated_at = ?4
                 WHERE document_id = ?1 AND local_label = ?2",
                kind.table()
            ),
            params![document_id, local_label, to, now_timestamp()],
        )?;
    }
    Ok(moved)
}

/// Lists records of one kind matching the query, oldest first.
pub fn query(
    conn: &Connection,
    kind: RecordKind,
    filter: &RecordQuery,
) -> Result<Vec<StoredRecord>, DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<SqlValue> = Vec::new();

    if let Some(ref document_id) = filter.document_id {
        param_values.push(SqlValue::Text(document_id.clone()));
        conditions.push(format!("document_id = ?{}", param_values.len()));
    }
    if let Some(ref compound_id) = filter.compound_id {
        param_values.push(SqlValue::Text(compound_id.clone()));
        conditions.push(format!("compound_id = ?{}", param_values.len()));
    }
    if !filter.flags.is_empty() {
        let mut slots = Vec::new();
        for flag in &filter.flags {
            param_values.push(SqlValue::Text(flag.as_str().to_string()));
            slots.push(format!("?{}", param_values.len()));
        }
        conditions.push(format!("quality_flag IN ({})", slots.join(", ")));
    }
    if filter.with_structure_only {
        conditions.push(
            "compound_id IN (SELECT compound_id FROM compounds WHERE canonical_structure IS NOT NULL)"
                .to_string(),
        );
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let sql = format!(
        "SELECT * FROM {} {} ORDER BY created_at, record_id",
        kind.table(),
        where_clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(param_values), |row| stored_from_row(kind, row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Counts records of one kind, optionally restricted to one flag.
pub fn count(
    conn: &Connection,
    kind: RecordKind,
    flag: Option<QualityFlag>,
) -> Result<u64, DatabaseError> {
    let count: u64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} WHERE (?1 IS NULL OR quality_flag = ?1)",
            kind.table()
        ),
        params![flag.map(|f| f.as_str())],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Counts records whose compound has been retired. Always zero when the
/// merge bookkeeping is sound.
pub fn count_referencing_retired(conn: &Connection) -> Result<u64, DatabaseError> {
    let mut total = 0;
    for kind in KINDS {
        let n: u64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} r JOIN compounds c ON c.compound_id = r.compound_id
                 WHERE c.retired_into IS NOT NULL",
                kind.table()
            ),
            [],
            |r| r.get(0),
        )?;
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::compound_repo::{self, NewCompound};
    use crate::db::{document_repo, Database};
    use crate::model::{DeviceRecord, PhotophysicsRecord};

    fn seeded_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        document_repo::register_submission(&db, "D1", "d1.json", "k1").unwrap();
        db.with_conn(|conn| {
            for id in ["cmp_a", "cmp_b"] {
                compound_repo::insert(
                    conn,
                    &NewCompound {
                        compound_id: id,
                        ..Default::default()
                    },
                )?;
            }
            Ok(())
        })
        .unwrap();
        db
    }

    fn valid() -> Annotation<'static> {
        Annotation {
            flag: QualityFlag::Valid,
            reasons: &[],
            review_note: None,
        }
    }

    fn film(label: &str, lambda: f64) -> MeasurementRecord {
        let mut r = PhotophysicsRecord::new(label);
        r.environment_type = Some("film".to_string());
        r.lambda_pl_nm = Some(lambda);
        MeasurementRecord::Photophysics(r)
    }

    #[test]
    fn test_upsert_keeps_record_id() {
        let db = seeded_db();
        db.with_conn(|conn| {
            let first = upsert(conn, "D1", "cmp_a", &film("1", 470.0), &valid())?;
            let second = upsert(conn, "D1", "cmp_a", &film("1", 475.0), &valid())?;
            assert_eq!(first, second);

            let rows = query(conn, RecordKind::Photophysics, &RecordQuery::default())?;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].record.numeric_by_name("lambda_pl_nm"), Some(475.0));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_round_trips_fields_and_annotation() {
        let db = seeded_db();
        db.with_conn(|conn| {
            let mut device = DeviceRecord::new("2");
            device.device_structure = Some("ITO/HATCN/EML/TPBi/LiF/Al".to_string());
            device.eqe_max_percent = Some(31.2);
            device.cie_y = Some(0.08);
            let record = MeasurementRecord::Device(device);
            let reasons = vec!["cie_y below expected".to_string()];
            upsert(
                conn,
                "D1",
                "cmp_b",
                &record,
                &Annotation {
                    flag: QualityFlag::Suspect,
                    reasons: &reasons,
                    review_note: Some("checked"),
                },
            )?;

            let rows = query(
                conn,
                RecordKind::Device,
                &RecordQuery {
                    compound_id: Some("cmp_b".to_string()),
                    ..Default::default()
                },
            )?;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].record, record);
            assert_eq!(rows[0].quality_flag, QualityFlag::Suspect);
            assert_eq!(rows[0].quality_reasons, reasons);
            assert_eq!(rows[0].review_note.as_deref(), Some("checked"));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_unknown_compound_is_rejected_by_foreign_key() {
        let db = seeded_db();
        let result =
            db.with_conn(|conn| upsert(conn, "D1", "cmp_missing", &film("1", 470.0), &valid()));
        assert!(result.is_err());
    }

    #[test]
    fn test_repoint_and_delete() {
        let db = seeded_db();
        db.with_conn(|conn| {
            upsert(conn, "D1", "cmp_a", &film("1", 470.0), &valid())?;
            assert_eq!(repoint_label(conn, "D1", "1", "cmp_b")?, 1);
            assert_eq!(
                query(conn, RecordKind::Photophysics, &RecordQuery::default())?[0].compound_id,
                "cmp_b"
            );

            assert_eq!(repoint_compound(conn, "cmp_b", "cmp_a")?, 1);
            assert_eq!(delete_by_document(conn, "D1")?, 1);
            assert_eq!(count(conn, RecordKind::Photophysics, None)?, 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_repoint_collision_replaces_existing_row() {
        let db = seeded_db();
        db.with_conn(|conn| {
            upsert(conn, "D1", "cmp_a", &film("1", 470.0), &valid())?;
            upsert(conn, "D1", "cmp_b", &film("1", 471.0), &valid())?;

            repoint_compound(conn, "cmp_b", "cmp_a")?;
            let rows = query(conn, RecordKind::Photophysics, &RecordQuery::default())?;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].compound_id, "cmp_a");
            assert_eq!(rows[0].record.numeric_by_name("lambda_pl_nm"), Some(471.0));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_query_filters_by_flag() {
        let db = seeded_db();
        db.with_conn(|conn| {
            upsert(conn, "D1", "cmp_a", &film("1", 470.0), &valid())?;
            upsert(
                conn,
                "D1",
                "cmp_b",
                &film("2", 900.0),
                &Annotation {
                    flag: QualityFlag::Invalid,
                    reasons: &[],
                    review_note: None,
                },
            )?;

            let invalid = query(
                conn,
                RecordKind::Photophysics,
                &RecordQuery {
                    flags: vec![QualityFlag::Invalid],
                    ..Default::default()
                },
            )?;
            assert_eq!(invalid.len(), 1);
            assert_eq!(invalid[0].compound_id, "cmp_b");
            assert_eq!(count(conn, RecordKind::Photophysics, Some(QualityFlag::Valid))?, 1);
            Ok(())
        })
        .unwrap();
    }
}
