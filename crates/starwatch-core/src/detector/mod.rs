//! Change detection between the watermark and a fresh snapshot
//!
//! The detector is a pure set-difference: given the stored watermark and a
//! freshly fetched snapshot, it yields the items whose keys have never been
//! seen, plus the key set the watermark should become after the cycle.
//!
//! Order of new items is unspecified; the dispatcher treats each item
//! independently and the upstream listing carries no ordering guarantee.

use std::collections::BTreeSet;

use crate::traits::snapshot_source::Repo;

/// Result of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Items present in the snapshot but absent from the watermark
    pub new_items: Vec<Repo>,
    /// The full key set of the snapshot; becomes the next watermark
    pub next_watermark: BTreeSet<String>,
}

impl ChangeSet {
    /// True when the snapshot contained nothing unseen.
    pub fn is_empty(&self) -> bool {
        self.new_items.is_empty()
    }
}

/// Compute `new = keys(snapshot) − watermark`.
///
/// The returned `next_watermark` is the snapshot's key set exactly, not the
/// union: items removed upstream are dropped from tracking without any
/// event. Duplicate keys within one snapshot are collapsed.
pub fn detect(watermark: &BTreeSet<String>, snapshot: &[Repo]) -> ChangeSet {
    let mut next_watermark = BTreeSet::new();
    let mut new_items = Vec::new();

    for repo in snapshot {
        let first_occurrence = next_watermark.insert(repo.full_name.clone());
        if first_occurrence && !watermark.contains(&repo.full_name) {
            new_items.push(repo.clone());
        }
    }

    ChangeSet {
        new_items,
        next_watermark,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(key: &str) -> Repo {
        Repo::new(key, format!("https://github.com/{key}"))
    }

    fn keys(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_watermark_reports_everything_as_new() {
        let snapshot = vec![repo("a/one"), repo("b/two")];
        let changes = detect(&BTreeSet::new(), &snapshot);

        assert_eq!(changes.new_items.len(), 2);
        assert_eq!(changes.next_watermark, keys(&["a/one", "b/two"]));
    }

    #[test]
    fn only_unseen_keys_are_new() {
        let watermark = keys(&["a/repo1"]);
        let snapshot = vec![repo("a/repo1"), repo("b/repo2")];

        let changes = detect(&watermark, &snapshot);

        assert_eq!(changes.new_items.len(), 1);
        assert_eq!(changes.new_items[0].full_name, "b/repo2");
        assert_eq!(changes.next_watermark, keys(&["a/repo1", "b/repo2"]));
    }

    #[test]
    fn removed_keys_are_dropped_from_next_watermark() {
        let watermark = keys(&["a/one", "a/two"]);
        let snapshot = vec![repo("a/one")];

        let changes = detect(&watermark, &snapshot);

        assert!(changes.is_empty());
        assert_eq!(changes.next_watermark, keys(&["a/one"]));
    }

    #[test]
    fn unchanged_snapshot_yields_nothing() {
        let watermark = keys(&["a/one", "b/two"]);
        let snapshot = vec![repo("a/one"), repo("b/two")];

        let changes = detect(&watermark, &snapshot);

        assert!(changes.is_empty());
        assert_eq!(changes.next_watermark, watermark);
    }

    #[test]
    fn empty_snapshot_yields_no_new_items() {
        let watermark = keys(&["a/one"]);
        let changes = detect(&watermark, &[]);

        assert!(changes.is_empty());
        assert!(changes.next_watermark.is_empty());
    }

    #[test]
    fn duplicate_keys_within_a_snapshot_collapse() {
        let snapshot = vec![repo("a/one"), repo("a/one")];
        let changes = detect(&BTreeSet::new(), &snapshot);

        assert_eq!(changes.new_items.len(), 1);
        assert_eq!(changes.next_watermark.len(), 1);
    }
}
