//! Entity resolution against the compound identity table.

use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;

use super::canonical::{SmilesCanonicalizer, StructureCanonicalizer};
use super::error::{AlignError, StructureError};
use super::locks::{KeyLockGuard, KeyLocks};
use super::strategy::{CanonicalStringEquality, MatchStrategy};
use crate::db::compound_repo::{self, NewCompound};
use crate::db::{record_repo, Database};
use crate::model::{new_compound_id, Compound, Provenance};

/// Retirement chains longer than this indicate corrupt bookkeeping.
const MAX_RETIREMENT_HOPS: usize = 64;

/// How a `(document, label)` was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Bound to an existing live compound with the same key.
    Matched,
    /// A new compound was created for a structure seen for the first time.
    Minted,
    /// No usable structure; a provisional compound was created.
    Provisional,
    /// The provisional compound previously bound here was merged away.
    Merged { retired: String },
    /// The label was bound to a different compound before.
    Relabelled { previous: String },
    /// The existing binding was reused.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub compound_id: String,
    #[serde(flatten)]
    pub outcome: ResolutionOutcome,
    /// Set when the candidate structure was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structure_issue: Option<String>,
}

/// A candidate structure after canonicalization, ready to be resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedStructure {
    pub canonical: Option<String>,
    pub match_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

/// Maps `(document, local label, structure)` to a stable compound id.
pub struct EntityAligner {
    db: Database,
    canonicalizer: Arc<dyn StructureCanonicalizer>,
    strategy: Arc<dyn MatchStrategy>,
    locks: KeyLocks,
}

impl EntityAligner {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            canonicalizer: Arc::new(SmilesCanonicalizer),
            strategy: Arc::new(CanonicalStringEquality),
            locks: KeyLocks::new(),
        }
    }

    pub fn with_canonicalizer(mut self, canonicalizer: Arc<dyn StructureCanonicalizer>) -> Self {
        self.canonicalizer = canonicalizer;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn MatchStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Canonicalizes a candidate and derives its match key. Touches no state.
    pub fn prepare(&self, candidate: Option<&str>) -> PreparedStructure {
        let canonical = match candidate {
            Some(raw) => self.canonicalizer.canonicalize(raw),
            None => Err(StructureError::Empty),
        };
        match canonical {
            Ok(canonical) => PreparedStructure {
                match_key: Some(self.strategy.match_key(&canonical)),
                canonical: Some(canonical),
                issue: None,
            },
            Err(e) => PreparedStructure {
                canonical: None,
                match_key: None,
                issue: candidate.map(|_| e.to_string()),
            },
        }
    }

    /// Resolves one label in its own transaction.
    pub fn resolve(
        &self,
        document_id: &str,
        local_label: &str,
        candidate_structure: Option<&str>,
    ) -> Result<Resolution, AlignError> {
        let prepared = self.prepare(candidate_structure);
        let _guard = self.lock_labels(document_id, [local_label]);
        self.db.with_transaction(|conn| {
            self.resolve_prepared_in(conn, document_id, local_label, &prepared, None)
        })
    }

    /// Takes the per-key locks for a set of labels of one document.
    pub fn lock_labels<'a, I>(&self, document_id: &str, labels: I) -> KeyLockGuard<'_>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.locks.lock_all(
            labels
                .into_iter()
                .map(|label| format!("{}\u{1f}{}", document_id, label)),
        )
    }

    /// Resolves a prepared structure on a connection the caller already holds,
    /// normally inside a larger transaction. The caller must hold the key lock
    /// for `(document_id, local_label)`.
    pub fn resolve_prepared_in(
        &self,
        conn: &Connection,
        document_id: &str,
        local_label: &str,
        prepared: &PreparedStructure,
        display_name: Option<&str>,
    ) -> Result<Resolution, AlignError> {
        let bound = match compound_repo::find_binding(conn, document_id, local_label)? {
            Some(binding) => Some(live_compound_in(conn, &binding.compound_id)?),
            None => None,
        };

        let resolution = |compound_id: String, outcome: ResolutionOutcome| Resolution {
            compound_id,
            outcome,
            structure_issue: prepared.issue.clone(),
        };

        let Some(key) = prepared.match_key.as_deref() else {
            if let Some(current) = bound {
                name_if_unset(conn, &current.compound_id, display_name)?;
                return Ok(resolution(current.compound_id, ResolutionOutcome::Unchanged));
            }
            let compound_id = new_compound_id();
            compound_repo::insert(
                conn,
                &NewCompound {
                    compound_id: &compound_id,
                    display_name,
                    provisional: true,
                    ..Default::default()
                },
            )?;
            compound_repo::insert_binding(conn, document_id, local_label, &compound_id)?;
            tracing::debug!(document_id, local_label, compound_id = %compound_id, "minted provisional compound");
            return Ok(resolution(compound_id, ResolutionOutcome::Provisional));
        };

        match bound {
            Some(current) if current.match_key.as_deref() == Some(key) => {
                name_if_unset(conn, &current.compound_id, display_name)?;
                Ok(resolution(current.compound_id, ResolutionOutcome::Unchanged))
            }
            Some(current) if current.provisional && current.match_key.is_none() => {
                let name = display_name.or(current.display_name.as_deref());
                let (target, _) = self.live_or_mint(conn, prepared, key, name)?;
                let records = record_repo::repoint_compound(conn, &current.compound_id, &target)?;
                let bindings = compound_repo::move_bindings(conn, &current.compound_id, &target)?;
                compound_repo::retire(conn, &current.compound_id, &target)?;
                log::info!(
                    "Retired provisional compound {} into {} ({} records, {} bindings moved)",
                    current.compound_id,
                    target,
                    records,
                    bindings
                );
                Ok(resolution(
                    target,
                    ResolutionOutcome::Merged {
                        retired: current.compound_id,
                    },
                ))
            }
            Some(current) => {
                let (target, _) = self.live_or_mint(conn, prepared, key, display_name)?;
                compound_repo::rebind(conn, document_id, local_label, &target)?;
                record_repo::repoint_label(conn, document_id, local_label, &target)?;
                log::info!(
                    "Relabelled {}/{} from {} to {}",
                    document_id,
                    local_label,
                    current.compound_id,
                    target
                );
                Ok(resolution(
                    target,
                    ResolutionOutcome::Relabelled {
                        previous: current.compound_id,
                    },
                ))
            }
            None => {
                let (target, minted) = self.live_or_mint(conn, prepared, key, display_name)?;
                compound_repo::insert_binding(conn, document_id, local_label, &target)?;
                let outcome = if minted {
                    ResolutionOutcome::Minted
                } else {
                    ResolutionOutcome::Matched
                };
                Ok(resolution(target, outcome))
            }
        }
    }

    /// Returns the live compound holding `key`, minting one if needed.
    fn live_or_mint(
        &self,
        conn: &Connection,
        prepared: &PreparedStructure,
        key: &str,
        display_name: Option<&str>,
    ) -> Result<(String, bool), AlignError> {
        if let Some(existing) = compound_repo::find_live_by_match_key(conn, key)? {
            name_if_unset(conn, &existing.compound_id, display_name)?;
            return Ok((existing.compound_id, false));
        }
        let compound_id = new_compound_id();
        compound_repo::insert(
            conn,
            &NewCompound {
                compound_id: &compound_id,
                canonical_structure: prepared.canonical.as_deref(),
                match_key: Some(key),
                display_name,
                provisional: false,
            },
        )?;
        tracing::debug!(compound_id = %compound_id, "minted compound");
        Ok((compound_id, true))
    }

    pub fn compound(&self, compound_id: &str) -> Result<Option<Compound>, AlignError> {
        Ok(self
            .db
            .with_conn(|conn| compound_repo::find_by_id(conn, compound_id))?)
    }

    /// The compound a document currently files under `local_label`.
    pub fn find_by_label(
        &self,
        document_id: &str,
        local_label: &str,
    ) -> Result<Option<Compound>, AlignError> {
        self.db.with_conn(|conn| {
            match compound_repo::find_binding(conn, document_id, local_label)? {
                Some(binding) => compound_repo::find_by_id(conn, &binding.compound_id),
                None => Ok(None),
            }
        })
        .map_err(AlignError::from)
    }

    /// Follows the retirement chain to the live id. `None` if unknown.
    pub fn live_compound_id(&self, compound_id: &str) -> Result<Option<String>, AlignError> {
        self.db.with_transaction(|conn| {
            if compound_repo::find_by_id(conn, compound_id)?.is_none() {
                return Ok(None);
            }
            Ok(Some(live_compound_in(conn, compound_id)?.compound_id))
        })
    }

    /// Overrides the display name of a compound.
    pub fn set_display_name(&self, compound_id: &str, name: &str) -> Result<(), AlignError> {
        let found = self
            .db
            .with_conn(|conn| compound_repo::set_display_name(conn, compound_id, name))?;
        if !found {
            return Err(AlignError::UnknownCompound(compound_id.to_string()));
        }
        Ok(())
    }

    pub fn provenance(&self, compound_id: &str) -> Result<Vec<Provenance>, AlignError> {
        Ok(self
            .db
            .with_conn(|conn| compound_repo::bindings_for(conn, compound_id))?)
    }
}

fn name_if_unset(
    conn: &Connection,
    compound_id: &str,
    display_name: Option<&str>,
) -> Result<(), AlignError> {
    if let Some(name) = display_name {
        compound_repo::fill_display_name(conn, compound_id, name)?;
    }
    Ok(())
}

fn live_compound_in(conn: &Connection, compound_id: &str) -> Result<Compound, AlignError> {
    let mut id = compound_id.to_string();
    for _ in 0..MAX_RETIREMENT_HOPS {
        let compound = compound_repo::find_by_id(conn, &id)?
            .ok_or_else(|| AlignError::UnknownCompound(id.clone()))?;
        match compound.retired_into {
            Some(next) => id = next,
            None => return Ok(compound),
        }
    }
    Err(AlignError::UnknownCompound(compound_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::record_repo::{Annotation, RecordQuery};
    use crate::db::document_repo;
    use crate::model::{MeasurementRecord, PhotophysicsRecord, QualityFlag, RecordKind};

    const BENZENE: &str = "c1ccccc1";
    const PYRIDINE: &str = "c1ccncc1";

    fn aligner() -> (EntityAligner, Database) {
        let db = Database::open_in_memory().expect("Failed to create test database");
        (EntityAligner::new(db.clone()), db)
    }

    #[test]
    fn test_first_sighting_mints() {
        let (aligner, _) = aligner();
        let r = aligner.resolve("D1", "1", Some(BENZENE)).unwrap();
        assert_eq!(r.outcome, ResolutionOutcome::Minted);
        assert!(r.compound_id.starts_with("cmp_"));

        let compound = aligner.compound(&r.compound_id).unwrap().unwrap();
        assert_eq!(compound.canonical_structure.as_deref(), Some(BENZENE));
        assert!(!compound.provisional);
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let (aligner, _) = aligner();
        let first = aligner.resolve("D1", "1", Some(BENZENE)).unwrap();
        let second = aligner.resolve("D1", "1", Some(BENZENE)).unwrap();
        assert_eq!(first.compound_id, second.compound_id);
        assert_eq!(second.outcome, ResolutionOutcome::Unchanged);
        assert_eq!(aligner.provenance(&first.compound_id).unwrap().len(), 1);
    }

    #[test]
    fn test_same_structure_across_documents_matches() {
        let (aligner, _) = aligner();
        let d1 = aligner.resolve("D1", "1", Some(BENZENE)).unwrap();
        let d2 = aligner.resolve("D2", "3", Some(BENZENE)).unwrap();
        assert_eq!(d2.outcome, ResolutionOutcome::Matched);
        assert_eq!(d1.compound_id, d2.compound_id);
        assert_eq!(aligner.provenance(&d1.compound_id).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_structure_mints_provisional() {
        let (aligner, _) = aligner();
        let r = aligner.resolve("D1", "1", Some("C(C")).unwrap();
        assert_eq!(r.outcome, ResolutionOutcome::Provisional);
        assert!(r.structure_issue.is_some());
        assert!(aligner.compound(&r.compound_id).unwrap().unwrap().provisional);

        let again = aligner.resolve("D1", "1", None).unwrap();
        assert_eq!(again.compound_id, r.compound_id);
        assert_eq!(again.outcome, ResolutionOutcome::Unchanged);
        assert!(again.structure_issue.is_none());
    }

    #[test]
    fn test_provisional_merges_into_live_compound() {
        let (aligner, db) = aligner();
        document_repo::register_submission(&db, "D1", "d1.json", "k1").unwrap();
        let live = aligner.resolve("D2", "7", Some(BENZENE)).unwrap();
        let provisional = aligner.resolve("D1", "1", None).unwrap();

        db.with_conn(|conn| {
            record_repo::upsert(
                conn,
                "D1",
                &provisional.compound_id,
                &MeasurementRecord::Photophysics(PhotophysicsRecord::new("1")),
                &Annotation {
                    flag: QualityFlag::Valid,
                    reasons: &[],
                    review_note: None,
                },
            )?;
            Ok(())
        })
        .unwrap();

        let merged = aligner.resolve("D1", "1", Some(BENZENE)).unwrap();
        assert_eq!(merged.compound_id, live.compound_id);
        assert_eq!(
            merged.outcome,
            ResolutionOutcome::Merged {
                retired: provisional.compound_id.clone()
            }
        );

        let retired = aligner.compound(&provisional.compound_id).unwrap().unwrap();
        assert_eq!(retired.retired_into.as_deref(), Some(live.compound_id.as_str()));
        assert_eq!(
            aligner.live_compound_id(&provisional.compound_id).unwrap(),
            Some(live.compound_id.clone())
        );

        db.with_conn(|conn| {
            assert_eq!(record_repo::count_referencing_retired(conn)?, 0);
            let rows = record_repo::query(
                conn,
                RecordKind::Photophysics,
                &RecordQuery {
                    compound_id: Some(live.compound_id.clone()),
                    ..Default::default()
                },
            )?;
            assert_eq!(rows.len(), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_changed_structure_relabels() {
        let (aligner, _) = aligner();
        let first = aligner.resolve("D1", "1", Some(BENZENE)).unwrap();
        let second = aligner.resolve("D1", "1", Some(PYRIDINE)).unwrap();
        assert_ne!(first.compound_id, second.compound_id);
        assert_eq!(
            second.outcome,
            ResolutionOutcome::Relabelled {
                previous: first.compound_id.clone()
            }
        );
        let bound = aligner.find_by_label("D1", "1").unwrap().unwrap();
        assert_eq!(bound.compound_id, second.compound_id);
    }

    #[test]
    fn test_set_display_name() {
        let (aligner, _) = aligner();
        let r = aligner.resolve("D1", "1", Some(BENZENE)).unwrap();
        aligner.set_display_name(&r.compound_id, "benzene").unwrap();
        assert_eq!(
            aligner.compound(&r.compound_id).unwrap().unwrap().display_name.as_deref(),
            Some("benzene")
        );
        assert!(matches!(
            aligner.set_display_name("cmp_missing", "x"),
            Err(AlignError::UnknownCompound(_))
        ));
    }

    #[test]
    fn test_concurrent_resolution_of_same_label() {
        let (aligner, _) = aligner();
        let aligner = Arc::new(aligner);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let aligner = Arc::clone(&aligner);
                std::thread::spawn(move || aligner.resolve("D1", "1", Some(BENZENE)).unwrap())
            })
            .collect();
        let ids: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().unwrap().compound_id)
            .collect();
        assert!(ids.iter().all(|id| id == &ids[0]));
        assert_eq!(aligner.provenance(&ids[0]).unwrap().len(), 1);
    }
}
