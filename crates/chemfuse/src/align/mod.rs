//! Entity resolution: stable global compound ids across documents.

pub mod aligner;
pub mod canonical;
pub mod error;
pub mod labels;
pub mod locks;
pub mod strategy;

pub use aligner::{EntityAligner, PreparedStructure, Resolution, ResolutionOutcome};
pub use canonical::{SmilesCanonicalizer, StructureCanonicalizer};
pub use error::{AlignError, StructureError};
pub use labels::{map_regions_to_labels, parse_caption_labels};
pub use locks::{KeyLockGuard, KeyLocks};
pub use strategy::{CanonicalStringEquality, MatchStrategy};
