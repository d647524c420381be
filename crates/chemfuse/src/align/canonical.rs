//! Structure canonicalization.

use std::collections::HashSet;

use super::error::StructureError;

/// Normalizes a recognized structure string into its canonical form.
pub trait StructureCanonicalizer: Send + Sync {
    fn canonicalize(&self, raw: &str) -> Result<String, StructureError>;
}

/// Syntactic SMILES checker.
///
/// Takes the first whitespace-delimited token and accepts it when it is
/// well formed. The token is returned unchanged: two structures are the
/// same compound exactly when their SMILES strings are equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmilesCanonicalizer;

const BOND_CHARS: &str = "-=#$:/\\.";
const ORGANIC_SINGLE: &str = "BCNOPSFI";
const AROMATIC: &str = "bcnops";

impl StructureCanonicalizer for SmilesCanonicalizer {
    fn canonicalize(&self, raw: &str) -> Result<String, StructureError> {
        let token = raw.split_whitespace().next().ok_or(StructureError::Empty)?;
        let chars: Vec<char> = token.chars().collect();

        let mut depth = 0usize;
        let mut in_bracket = false;
        let mut atoms = 0usize;
        let mut open_rings: HashSet<u32> = HashSet::new();
        let mut i = 0;

        while i < chars.len() {
            let ch = chars[i];
            let invalid = StructureError::InvalidCharacter { ch, position: i };

            if in_bracket {
                match ch {
                    ']' => in_bracket = false,
                    '[' => return Err(StructureError::Unbalanced("brackets")),
                    c if c.is_ascii_alphanumeric() || "@+-:".contains(c) => {}
                    _ => return Err(invalid),
                }
                i += 1;
                continue;
            }

            match ch {
                '[' => {
                    in_bracket = true;
                    atoms += 1;
                }
                ']' => return Err(StructureError::Unbalanced("brackets")),
                '(' => depth += 1,
                ')' => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or(StructureError::Unbalanced("parentheses"))?;
                }
                '%' => {
                    let digits: String = chars.iter().skip(i + 1).take(2).collect();
                    if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
                        return Err(invalid);
                    }
                    toggle_ring(&mut open_rings, digits.parse().map_err(|_| invalid)?);
                    i += 3;
                    continue;
                }
                d if d.is_ascii_digit() => {
                    toggle_ring(&mut open_rings, d.to_digit(10).unwrap_or_default());
                }
                'C' if chars.get(i + 1) == Some(&'l') => {
                    atoms += 1;
                    i += 2;
                    continue;
                }
                'B' if chars.get(i + 1) == Some(&'r') => {
                    atoms += 1;
                    i += 2;
                    continue;
                }
                '*' => atoms += 1,
                c if ORGANIC_SINGLE.contains(c) || AROMATIC.contains(c) => atoms += 1,
                c if BOND_CHARS.contains(c) => {}
                _ => return Err(invalid),
            }
            i += 1;
        }

        if in_bracket {
            return Err(StructureError::Unbalanced("brackets"));
        }
        if depth != 0 {
            return Err(StructureError::Unbalanced("parentheses"));
        }
        if let Some(ring) = open_rings.into_iter().min() {
            return Err(StructureError::UnclosedRing(ring));
        }
        if atoms == 0 {
            return Err(StructureError::NoAtoms);
        }

        Ok(token.to_string())
    }
}

fn toggle_ring(open: &mut HashSet<u32>, ring: u32) {
    if !open.remove(&ring) {
        open.insert(ring);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(s: &str) -> Result<String, StructureError> {
        SmilesCanonicalizer.canonicalize(s)
    }

    #[test]
    fn test_accepts_common_structures() {
        assert_eq!(canon("c1ccccc1").unwrap(), "c1ccccc1");
        assert_eq!(canon("CC(=O)Oc1ccccc1C(=O)O").unwrap(), "CC(=O)Oc1ccccc1C(=O)O");
        assert_eq!(canon("ClC(Br)[C@@H](N)C").unwrap(), "ClC(Br)[C@@H](N)C");
        assert_eq!(canon("[Na+].[Cl-]").unwrap(), "[Na+].[Cl-]");
        assert_eq!(canon("C%10CCCCC%10").unwrap(), "C%10CCCCC%10");
    }

    #[test]
    fn test_takes_first_token() {
        assert_eq!(canon("  c1ccncc1 pyridine 0.93").unwrap(), "c1ccncc1");
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(canon("").unwrap_err(), StructureError::Empty);
        assert_eq!(canon("   ").unwrap_err(), StructureError::Empty);
    }

    #[test]
    fn test_rejects_unbalanced() {
        assert_eq!(
            canon("CC(C").unwrap_err(),
            StructureError::Unbalanced("parentheses")
        );
        assert_eq!(canon("CC)C").unwrap_err(), StructureError::Unbalanced("parentheses"));
        assert_eq!(canon("C[NH4+").unwrap_err(), StructureError::Unbalanced("brackets"));
    }

    #[test]
    fn test_rejects_open_ring() {
        assert_eq!(canon("c1ccccc").unwrap_err(), StructureError::UnclosedRing(1));
    }

    #[test]
    fn test_rejects_foreign_alphabet() {
        assert!(matches!(
            canon("CXC").unwrap_err(),
            StructureError::InvalidCharacter { ch: 'X', position: 1 }
        ));
        assert!(matches!(
            canon("<error>").unwrap_err(),
            StructureError::InvalidCharacter { .. }
        ));
    }

    #[test]
    fn test_rejects_no_atoms() {
        assert_eq!(canon("==").unwrap_err(), StructureError::NoAtoms);
    }
}
