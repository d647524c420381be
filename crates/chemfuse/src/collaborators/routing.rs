//! Caption-keyword routing of tables to extraction schemas.

use std::sync::LazyLock;

use regex::Regex;

use super::ExtractionSchema;

// Acronyms match as whole words with their original casing; "EL" must
// not fire on "model" and "PL" must not fire on "complex".
static RE_PHOTOPHYSICS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:photophysical|optical|luminescence|emission)|\b(?:PL|FWHM|PLQY)\b").unwrap()
});
static RE_DEVICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i:device|current efficiency|brightness)|\b(?:OLEDs?|EQE|EL)\b").unwrap()
});

/// Returns every schema whose keywords appear in the caption. A table can
/// feed both schemas.
pub fn route_table(caption: &str) -> Vec<ExtractionSchema> {
    let mut schemas = Vec::new();
    if RE_PHOTOPHYSICS.is_match(caption) {
        schemas.push(ExtractionSchema::Photophysics);
    }
    if RE_DEVICE.is_match(caption) {
        schemas.push(ExtractionSchema::Device);
    }
    schemas
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photophysical_caption() {
        assert_eq!(
            route_table("Table 1. Photophysical properties of 1-3 in toluene"),
            vec![ExtractionSchema::Photophysics]
        );
        assert_eq!(
            route_table("PLQY and FWHM of doped films"),
            vec![ExtractionSchema::Photophysics]
        );
    }

    #[test]
    fn test_device_caption() {
        assert_eq!(
            route_table("Table 2. EL performance of the OLEDs"),
            vec![ExtractionSchema::Device]
        );
    }

    #[test]
    fn test_both_and_neither() {
        assert_eq!(
            route_table("Optical and device data"),
            vec![ExtractionSchema::Photophysics, ExtractionSchema::Device]
        );
        assert!(route_table("Calculated HOMO/LUMO levels (DFT model)").is_empty());
    }
}
