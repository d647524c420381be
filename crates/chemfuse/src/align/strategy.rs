//! Match-key strategies.

/// Derives the identity key two canonical structures must share to be
/// treated as the same compound.
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn match_key(&self, canonical: &str) -> String;
}

/// Exact string equality of canonical forms. Stereoisomers and tautomers
/// with different strings stay distinct compounds.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalStringEquality;

impl MatchStrategy for CanonicalStringEquality {
    fn name(&self) -> &str {
        "canonical_string_equality"
    }

    fn match_key(&self, canonical: &str) -> String {
        canonical.to_string()
    }
}
