//! Aligner error types.

use thiserror::Error;

use crate::db::DatabaseError;

/// Why a candidate structure could not be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    #[error("structure is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {position}")]
    InvalidCharacter { ch: char, position: usize },

    #[error("unbalanced {0}")]
    Unbalanced(&'static str),

    #[error("ring closure {0} is never closed")]
    UnclosedRing(u32),

    #[error("structure contains no atoms")]
    NoAtoms,
}

/// Errors from entity resolution.
#[derive(Error, Debug)]
pub enum AlignError {
    /// Recoverable: the caller falls back to a provisional identity.
    #[error("Invalid structure: {0}")]
    StructureInvalid(#[from] StructureError),

    /// Fatal to the owning job.
    #[error("Aligner store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),

    #[error("Unknown compound '{0}'")]
    UnknownCompound(String),
}
