//! Deduplication of the merged record list.
//!
//! Only exact identifiers are compared. The same work posted to two archives
//! carries two different ids and survives twice; such pairs are logged by
//! DOI but never merged.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::models::Record;

/// Keep the first record for each id, in input order.
/// Returns the survivors and how many records were dropped.
pub fn deduplicate(records: Vec<Record>) -> (Vec<Record>, usize) {
    let before = records.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(before);
    let mut kept = Vec::with_capacity(before);

    for record in records {
        if seen.insert(record.id.clone()) {
            kept.push(record);
        } else {
            debug!(id = %record.id, source = record.source.as_str(), "Dropping duplicate");
        }
    }

    log_shared_dois(&kept);
    let removed = before - kept.len();
    (kept, removed)
}

fn log_shared_dois(records: &[Record]) {
    let mut by_doi: HashMap<String, &str> = HashMap::new();
    for record in records {
        let Some(doi) = record.doi.as_deref() else { continue };
        let doi = doi.trim().to_lowercase();
        if doi.is_empty() {
            continue;
        }
        if let Some(first) = by_doi.get(&doi) {
            debug!(doi = %doi, first = %first, other = %record.id, "Same DOI under two ids");
        } else {
            by_doi.insert(doi, &record.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, record_with_text};
    use pretty_assertions::assert_eq;

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_first_occurrence_wins() {
        let first = record_with_text("a", "first title", "");
        let later = record_with_text("a", "later title", "");
        let (kept, removed) = deduplicate(vec![first, record("b"), later, record("c"), record("b")]);
        assert_eq!(ids(&kept), vec!["a", "b", "c"]);
        assert_eq!(kept[0].title, "first title");
        assert_eq!(removed, 2);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let input = vec![record("x"), record("y"), record("x"), record("z"), record("y")];
        let (once, _) = deduplicate(input);
        let (twice, removed) = deduplicate(once.clone());
        assert_eq!(once, twice);
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_same_doi_different_ids_both_kept() {
        let mut a = record("arxiv_2401.00001");
        a.doi = Some("10.1101/abc".into());
        let mut b = record("medrxiv_10_1101_abc");
        b.doi = Some("10.1101/ABC".into());
        let (kept, removed) = deduplicate(vec![a, b]);
        assert_eq!(kept.len(), 2);
        assert_eq!(removed, 0);
    }

    #[test]
    fn test_empty_input() {
        let (kept, removed) = deduplicate(Vec::new());
        assert!(kept.is_empty());
        assert_eq!(removed, 0);
    }
}
