//! Phone number extraction
//!
//! Pure functions that pull Vietnamese phone numbers out of free text and
//! normalize them to the local leading-zero form used as the customer lookup
//! key.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Digit runs, optionally interleaved with spaces, dots, dashes or parentheses
static CANDIDATE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\(?\d[\d \t.\-()]*").expect("static phone regex"));

const COUNTRY_CODE: &str = "84";
const MIN_CANDIDATE_DIGITS: usize = 9;
const MAX_CANDIDATE_DIGITS: usize = 12;

/// Normalize one raw phone string
///
/// Strips non-digits, then:
/// - `84` followed by 9–10 digits becomes `0` + tail
/// - a leading `0` with 10–11 digits total is kept as-is
/// - anything else is rejected
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if let Some(tail) = digits.strip_prefix(COUNTRY_CODE) {
        if (9..=10).contains(&tail.len()) {
            return Some(format!("0{}", tail));
        }
    }

    if digits.starts_with('0') && (10..=11).contains(&digits.len()) {
        return Some(digits);
    }

    None
}

/// Extract every normalized phone found in `text`
///
/// Never fails; absent or empty input yields an empty set.
pub fn extract_phones(text: Option<&str>) -> BTreeSet<String> {
    let mut phones = BTreeSet::new();
    let Some(text) = text else {
        return phones;
    };

    for run in CANDIDATE_RUN.find_iter(text) {
        let groups: Vec<&str> = run
            .as_str()
            .split(|c: char| !c.is_ascii_digit())
            .filter(|g| !g.is_empty())
            .collect();
        collect_from_groups(&groups, &mut phones);
    }

    phones
}

/// Walk the digit groups of one run, joining neighbours until they form a
/// valid number. Two numbers separated only by a space stay apart because the
/// shortest valid join wins.
fn collect_from_groups(groups: &[&str], phones: &mut BTreeSet<String>) {
    let mut start = 0;
    while start < groups.len() {
        let mut joined = String::new();
        let mut matched = None;

        for (offset, group) in groups[start..].iter().enumerate() {
            joined.push_str(group);
            if joined.len() > MAX_CANDIDATE_DIGITS {
                break;
            }
            if joined.len() < MIN_CANDIDATE_DIGITS {
                continue;
            }
            if let Some(phone) = normalize_phone(&joined) {
                matched = Some((phone, offset));
                break;
            }
        }

        match matched {
            Some((phone, offset)) => {
                phones.insert(phone);
                start += offset + 1;
            }
            None => start += 1,
        }
    }
}
