//! Compound identity repository: `compounds` and `compound_provenance`.
//!
//! Functions take a `&Connection` so the aligner can compose them inside
//! a single transaction.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{now_timestamp, parse_timestamp, DatabaseError};
use crate::model::{Compound, Provenance};

fn compound_from_row(row: &Row<'_>) -> Result<Compound, rusqlite::Error> {
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    Ok(Compound {
        compound_id: row.get("compound_id")?,
        canonical_structure: row.get("canonical_structure")?,
        match_key: row.get("match_key")?,
        display_name: row.get("display_name")?,
        provisional: row.get("provisional")?,
        retired_into: row.get("retired_into")?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn provenance_from_row(row: &Row<'_>) -> Result<Provenance, rusqlite::Error> {
    Ok(Provenance {
        document_id: row.get("document_id")?,
        local_label: row.get("local_label")?,
        compound_id: row.get("compound_id")?,
    })
}

/// Column values for a freshly minted compound.
#[derive(Debug, Clone, Default)]
pub struct NewCompound<'a> {
    pub compound_id: &'a str,
    pub canonical_structure: Option<&'a str>,
    pub match_key: Option<&'a str>,
    pub display_name: Option<&'a str>,
    pub provisional: bool,
}

pub fn insert(conn: &Connection, compound: &NewCompound<'_>) -> Result<(), DatabaseError> {
    let now = now_timestamp();
    conn.execute(
        "INSERT INTO compounds (compound_id, canonical_structure, match_key, display_name,
         provisional, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
        params![
            compound.compound_id,
            compound.canonical_structure,
            compound.match_key,
            compound.display_name,
            compound.provisional,
            now
        ],
    )?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, compound_id: &str) -> Result<Option<Compound>, DatabaseError> {
    let compound = conn
        .query_row(
            "SELECT * FROM compounds WHERE compound_id = ?1",
            params![compound_id],
            compound_from_row,
        )
        .optional()?;
    Ok(compound)
}

/// Finds the live compound holding a match key.
pub fn find_live_by_match_key(
    conn: &Connection,
    match_key: &str,
) -> Result<Option<Compound>, DatabaseError> {
    let compound = conn
        .query_row(
            "SELECT * FROM compounds WHERE match_key = ?1 AND retired_into IS NULL",
            params![match_key],
            compound_from_row,
        )
        .optional()?;
    Ok(compound)
}

/// Sets the display name only if none has been recorded yet.
pub fn fill_display_name(
    conn: &Connection,
    compound_id: &str,
    name: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE compounds SET display_name = ?2, updated_at = ?3
         WHERE compound_id = ?1 AND display_name IS NULL",
        params![compound_id, name, now_timestamp()],
    )?;
    Ok(())
}

/// Overwrites the display name. Returns whether the compound exists.
pub fn set_display_name(
    conn: &Connection,
    compound_id: &str,
    name: &str,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE compounds SET display_name = ?2, updated_at = ?3 WHERE compound_id = ?1",
        params![compound_id, name, now_timestamp()],
    )?;
    Ok(changed > 0)
}

/// Marks a compound as merged into another one.
pub fn retire(conn: &Connection, compound_id: &str, into: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE compounds SET retired_into = ?2, updated_at = ?3 WHERE compound_id = ?1",
        params![compound_id, into, now_timestamp()],
    )?;
    Ok(())
}

pub fn list_live(conn: &Connection) -> Result<Vec<Compound>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM compounds WHERE retired_into IS NULL ORDER BY created_at, compound_id",
    )?;
    let rows = stmt
        .query_map([], compound_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Identity table totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompoundCounts {
    pub live: u64,
    pub with_structure: u64,
    pub provisional: u64,
    pub retired: u64,
}

pub fn counts(conn: &Connection) -> Result<CompoundCounts, DatabaseError> {
    let counts = conn.query_row(
        "SELECT
            COALESCE(SUM(retired_into IS NULL), 0),
            COALESCE(SUM(retired_into IS NULL AND canonical_structure IS NOT NULL), 0),
            COALESCE(SUM(retired_into IS NULL AND provisional = 1), 0),
            COALESCE(SUM(retired_into IS NOT NULL), 0)
         FROM compounds",
        [],
        |r| {
            Ok(CompoundCounts {
                live: r.get(0)?,
                with_structure: r.get(1)?,
                provisional: r.get(2)?,
                retired: r.get(3)?,
            })
        },
    )?;
    Ok(counts)
}

// ─── Provenance ─────────────────────────────────────────────────────────────

pub fn find_binding(
    conn: &Connection,
    document_id: &str,
    local_label: &str,
) -> Result<Option<Provenance>, DatabaseError> {
    let binding = conn
        .query_row(
            "SELECT * FROM compound_provenance WHERE document_id = ?1 AND local_label = ?2",
            params![document_id, local_label],
            provenance_from_row,
        )
        .optional()?;
    Ok(binding)
}

pub fn insert_binding(
    conn: &Connection,
    document_id: &str,
    local_label: &str,
    compound_id: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO compound_provenance (document_id, local_label, compound_id, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![document_id, local_label, compound_id, now_timestamp()],
    )?;
    Ok(())
}

/// Points an existing `(document, label)` binding at another compound.
pub fn rebind(
    conn: &Connection,
    document_id: &str,
    local_label: &str,
    compound_id: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE compound_provenance SET compound_id = ?3
         WHERE document_id = ?1 AND local_label = ?2",
        params![document_id, local_label, compound_id],
    )?;
    Ok(())
}

/// Moves every binding of `from` onto `to`. Returns the number moved.
pub fn move_bindings(conn: &Connection, from: &str, to: &str) -> Result<usize, DatabaseError> {
    let moved = conn.execute(
        "UPDATE compound_provenance SET compound_id = ?2 WHERE compound_id = ?1",
        params![from, to],
    )?;
    Ok(moved)
}

pub fn bindings_for(conn: &Connection, compound_id: &str) -> Result<Vec<Provenance>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM compound_provenance WHERE compound_id = ?1 ORDER BY document_id, local_label",
    )?;
    let rows = stmt
        .query_map(params![compound_id], provenance_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn with_db<T>(f: impl FnOnce(&Connection) -> Result<T, DatabaseError>) -> T {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.with_conn(f).unwrap()
    }

    fn minted<'a>(id: &'a str, key: Option<&'a str>) -> NewCompound<'a> {
        NewCompound {
            compound_id: id,
            canonical_structure: key,
            match_key: key,
            display_name: None,
            provisional: key.is_none(),
        }
    }

    #[test]
    fn test_insert_and_lookup_by_key() {
        with_db(|conn| {
            insert(conn, &minted("cmp_a", Some("c1ccccc1")))?;
            let found = find_live_by_match_key(conn, "c1ccccc1")?.unwrap();
            assert_eq!(found.compound_id, "cmp_a");
            assert!(!found.provisional);
            assert!(find_live_by_match_key(conn, "CCO")?.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_display_name_first_seen_wins() {
        with_db(|conn| {
            insert(conn, &minted("cmp_a", None))?;
            fill_display_name(conn, "cmp_a", "BNCz")?;
            fill_display_name(conn, "cmp_a", "other")?;
            assert_eq!(
                find_by_id(conn, "cmp_a")?.unwrap().display_name.as_deref(),
                Some("BNCz")
            );

            assert!(set_display_name(conn, "cmp_a", "override")?);
            assert!(!set_display_name(conn, "cmp_missing", "x")?);
            assert_eq!(
                find_by_id(conn, "cmp_a")?.unwrap().display_name.as_deref(),
                Some("override")
            );
            Ok(())
        });
    }

    #[test]
    fn test_bindings_move_and_retire() {
        with_db(|conn| {
            insert(conn, &minted("cmp_p", None))?;
            insert(conn, &minted("cmp_l", Some("CCO")))?;
            insert_binding(conn, "D1", "1", "cmp_p")?;
            insert_binding(conn, "D2", "3", "cmp_p")?;

            assert_eq!(move_bindings(conn, "cmp_p", "cmp_l")?, 2);
            retire(conn, "cmp_p", "cmp_l")?;

            assert!(bindings_for(conn, "cmp_p")?.is_empty());
            assert_eq!(bindings_for(conn, "cmp_l")?.len(), 2);
            assert_eq!(
                find_by_id(conn, "cmp_p")?.unwrap().retired_into.as_deref(),
                Some("cmp_l")
            );
            assert_eq!(list_live(conn)?.len(), 1);
            Ok(())
        });
    }

    #[test]
    fn test_binding_primary_key_is_document_and_label() {
        with_db(|conn| {
            insert(conn, &minted("cmp_a", None))?;
            insert_binding(conn, "D1", "1", "cmp_a")?;
            assert!(insert_binding(conn, "D1", "1", "cmp_a").is_err());

            rebind(conn, "D1", "1", "cmp_a")?;
            let binding = find_binding(conn, "D1", "1")?.unwrap();
            assert_eq!(binding.compound_id, "cmp_a");
            Ok(())
        });
    }

    #[test]
    fn test_counts() {
        with_db(|conn| {
            insert(conn, &minted("cmp_p", None))?;
            insert(conn, &minted("cmp_l", Some("CCO")))?;
            insert(conn, &minted("cmp_q", None))?;
            retire(conn, "cmp_q", "cmp_l")?;

            let c = counts(conn)?;
            assert_eq!(c.live, 2);
            assert_eq!(c.with_structure, 1);
            assert_eq!(c.provisional, 1);
            assert_eq!(c.retired, 1);
            Ok(())
        });
    }
}
