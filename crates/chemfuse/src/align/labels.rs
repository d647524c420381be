//! Compound labels from figure captions.
//!
//! Captions such as "Chemical structures of compounds 1-4" or
//! "Molecules 1a, 1b and 2" name the compounds drawn in a figure. The
//! labels are expanded, deduplicated and sorted so that segmented figure
//! regions can be paired with them in reading order.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

const LIST: &str =
    r"\d+[a-zA-Z]?(?:\s*(?:[-–,]|(?i:and))\s*\d+[a-zA-Z]?)*";

static RE_INTRODUCED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i:compounds?|molecules?|emitters?|structures?\s+of)\s+({LIST})"
    ))
    .unwrap()
});
static RE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+[a-zA-Z]?)\s*(?:(?i:and)|,)\s*(\d+[a-zA-Z]?)\b").unwrap()
});
static RE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:,|(?i:\band\b))\s*").unwrap());
static RE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)([a-zA-Z]?)\s*[-–]\s*(\d+)([a-zA-Z]?)$").unwrap()
});

/// Ranges wider than this are treated as noise (page or year spans).
const MAX_RANGE_SPAN: u32 = 50;

/// Extracts compound labels from a caption, sorted numerically. Labels keep
/// the caption's letter case so they compare equal to table labels.
pub fn parse_caption_labels(caption: &str) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();

    for caps in RE_INTRODUCED.captures_iter(caption) {
        for item in RE_SEPARATOR.split(&caps[1]) {
            expand_item(item.trim(), &mut labels);
        }
    }
    for caps in RE_PAIR.captures_iter(caption) {
        labels.push(caps[1].to_string());
        labels.push(caps[2].to_string());
    }

    labels.sort_by(|a, b| compare_labels(a, b));
    labels.dedup();
    labels
}

/// Pairs figure regions with caption labels in order. Regions beyond the
/// number of labels get `None`.
pub fn map_regions_to_labels<'a, R>(regions: &'a [R], caption: &str) -> Vec<(&'a R, Option<String>)> {
    let labels = parse_caption_labels(caption);
    if labels.is_empty() && !regions.is_empty() {
        tracing::warn!(caption, "no compound labels found in caption");
    }
    let mut labels = labels.into_iter();
    regions.iter().map(|r| (r, labels.next())).collect()
}

fn expand_item(item: &str, out: &mut Vec<String>) {
    if item.is_empty() {
        return;
    }
    let Some(caps) = RE_RANGE.captures(item) else {
        out.push(item.to_string());
        return;
    };
    let (Ok(start), Ok(end)) = (caps[1].parse::<u32>(), caps[3].parse::<u32>()) else {
        return;
    };
    let (start_suffix, end_suffix) = (&caps[2], &caps[4]);

    match (start_suffix.chars().next(), end_suffix.chars().next()) {
        // 1-4
        (None, None) => {
            if start <= end && end - start <= MAX_RANGE_SPAN {
                out.extend((start..=end).map(|n| n.to_string()));
            }
        }
        // 1a-1c
        (Some(first), Some(last))
            if start == end
                && first <= last
                && first.is_ascii_lowercase() == last.is_ascii_lowercase() =>
        {
            out.extend((first..=last).map(|c| format!("{}{}", start, c)));
        }
        // 1a-2b and other mixed forms: keep both ends as written
        _ => {
            out.push(format!("{}{}", start, start_suffix));
            out.push(format!("{}{}", end, end_suffix));
        }
    }
}

fn numeric_part(label: &str) -> u32 {
    label
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(u32::MAX)
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    numeric_part(a)
        .cmp(&numeric_part(b))
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_expanded() {
        assert_eq!(
            parse_caption_labels("Figure 1. Chemical structures of compounds 1-4."),
            vec!["1", "2", "3", "4"]
        );
    }

    #[test]
    fn test_list_with_suffixes_and_conjunction() {
        assert_eq!(
            parse_caption_labels("Molecules 1a, 1b and 2 used in this work"),
            vec!["1a", "1b", "2"]
        );
    }

    #[test]
    fn test_sorted_numerically_and_deduplicated() {
        assert_eq!(
            parse_caption_labels("Compounds 10, 2 and 2 shown with molecules 9"),
            vec!["2", "9", "10"]
        );
    }

    #[test]
    fn test_no_labels() {
        assert!(parse_caption_labels("Energy level diagram of the device").is_empty());
        assert!(parse_caption_labels("").is_empty());
    }

    #[test]
    fn test_implausible_range_ignored() {
        assert!(parse_caption_labels("compounds 1-2000").is_empty());
    }

    #[test]
    fn test_lettered_range_is_expanded() {
        assert_eq!(
            parse_caption_labels("Structures of compounds 1a-1c"),
            vec!["1a", "1b", "1c"]
        );
        assert_eq!(
            parse_caption_labels("compounds 1a-2b"),
            vec!["1a", "2b"]
        );
    }

    #[test]
    fn test_label_case_is_preserved() {
        assert_eq!(
            parse_caption_labels("Chemical Structures of Compounds 1A and 1B"),
            vec!["1A", "1B"]
        );
        assert_eq!(parse_caption_labels("Emitters 2A-2C"), vec!["2A", "2B", "2C"]);
    }

    #[test]
    fn test_regions_mapped_in_order() {
        let regions = ["r1", "r2", "r3"];
        let mapped = map_regions_to_labels(&regions, "structures of 5 and 6");
        assert_eq!(mapped[0], (&"r1", Some("5".to_string())));
        assert_eq!(mapped[1], (&"r2", Some("6".to_string())));
        assert_eq!(mapped[2], (&"r3", None));
    }
}
