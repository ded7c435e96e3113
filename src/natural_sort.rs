//! Natural ordering for item ids: `page_2` sorts before `page_10`.

use std::cmp::Ordering;

/// One run of an id, as compared by [`natural_cmp`].
///
/// Digit runs sort before text runs at the same position. A digit run holds
/// its significant digits and their count, so derived ordering is numeric
/// for any length.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Segment {
    Number { len: usize, digits: String },
    Text(String),
}

/// Split `s` into alternating digit and non-digit runs.
///
/// Text runs are lower-cased; leading zeros are dropped from digit runs.
pub fn natural_sort_key(s: &str) -> Vec<Segment> {
    let mut key = Vec::new();
    let mut rest = s;
    while let Some(first) = rest.chars().next() {
        let is_digit = first.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != is_digit)
            .unwrap_or(rest.len());
        let (run, tail) = rest.split_at(end);
        if is_digit {
            let digits = run.trim_start_matches('0').to_string();
            key.push(Segment::Number {
                len: digits.len(),
                digits,
            });
        } else {
            key.push(Segment::Text(run.to_lowercase()));
        }
        rest = tail;
    }
    key
}

/// Compare two ids by natural key, falling back to the raw strings on a tie.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_sort_key(a)
        .cmp(&natural_sort_key(b))
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(ids: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        v.sort_by(|a, b| natural_cmp(a, b));
        v
    }

    #[test]
    fn numeric_runs_compare_by_value() {
        assert_eq!(
            sorted(&["item_10", "item_2", "item_20", "item_1"]),
            vec!["item_1", "item_2", "item_10", "item_20"]
        );
    }

    #[test]
    fn leading_zeros_and_case_do_not_matter_except_as_tiebreak() {
        assert_ne!(natural_cmp("page_007", "page_7"), Ordering::Equal);
        assert_eq!(natural_sort_key("Page_007"), natural_sort_key("page_7"));
        assert_eq!(sorted(&["page_9", "page_010"]), vec!["page_9", "page_010"]);
    }

    #[test]
    fn compound_ids_compare_run_by_run() {
        assert_eq!(
            sorted(&["page_1_v10", "page_10_v1", "page_1_v2"]),
            vec!["page_1_v2", "page_1_v10", "page_10_v1"]
        );
    }

    #[test]
    fn very_long_digit_runs_do_not_overflow() {
        let big = "n_123456789012345678901234567890";
        assert_eq!(natural_cmp("n_99", big), Ordering::Less);
    }
}
