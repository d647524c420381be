//! Compound identity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of every minted compound id.
pub const COMPOUND_ID_PREFIX: &str = "cmp_";

/// Mints a new, never reused compound id.
pub fn new_compound_id() -> String {
    format!("{}{}", COMPOUND_ID_PREFIX, uuid::Uuid::new_v4().simple())
}

/// A physical compound known to the identity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compound {
    pub compound_id: String,
    pub canonical_structure: Option<String>,
    pub match_key: Option<String>,
    pub display_name: Option<String>,
    /// Minted without a valid structure; may later be merged away.
    pub provisional: bool,
    /// Set when this compound was merged into another one.
    pub retired_into: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Compound {
    pub fn is_live(&self) -> bool {
        self.retired_into.is_none()
    }
}

/// A `(document, local label) → compound` binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub document_id: String,
    pub local_label: String,
    pub compound_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compound_ids_are_prefixed_and_unique() {
        let a = new_compound_id();
        let b = new_compound_id();
        assert!(a.starts_with(COMPOUND_ID_PREFIX));
        assert_eq!(a.len(), COMPOUND_ID_PREFIX.len() + 32);
        assert_ne!(a, b);
    }
}
