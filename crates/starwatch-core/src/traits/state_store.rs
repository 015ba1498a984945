// # State Store Trait
//
// Defines the interface for persisting the watermark: the set of repository
// keys already processed.
//
// ## Purpose
//
// The watermark is what makes restarts safe. After any successful cycle it
// equals exactly the key set of the most recent snapshot, so a restarted
// daemon never re-announces repositories it already posted about.
//
// ## Implementations
//
// - File-based: JSON file, atomic writes (`state::FileStateStore`)
// - In-memory: tests and throwaway deployments (`state::MemoryStateStore`)
//
// Single process, single writer: the engine is the only mutator, between
// cycles. No cross-process locking is needed.

use async_trait::async_trait;
use std::collections::BTreeSet;

/// Persisted set of repository keys already processed, plus the time of
/// the last update.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Watermark {
    /// Keys (`owner/name`) of every repository already seen
    pub starred: BTreeSet<String>,
    /// When the watermark last changed
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl Watermark {
    /// An empty watermark, as on a first run with no persisted state.
    pub fn empty() -> Self {
        Self {
            starred: BTreeSet::new(),
            last_updated: chrono::Utc::now(),
        }
    }

    /// Build a watermark from a key set, stamped now.
    pub fn from_keys(keys: BTreeSet<String>) -> Self {
        Self {
            starred: keys,
            last_updated: chrono::Utc::now(),
        }
    }

    /// Replace the tracked key set with the latest snapshot's keys.
    ///
    /// Keys absent from the new set are silently dropped from tracking;
    /// no "un-star" events are ever emitted.
    pub fn replace(&mut self, keys: BTreeSet<String>) {
        self.starred = keys;
        self.last_updated = chrono::Utc::now();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.starred.contains(key)
    }

    pub fn len(&self) -> usize {
        self.starred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starred.is_empty()
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::empty()
    }
}

/// Trait for watermark persistence
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks,
/// even though the engine serializes access by construction.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the persisted watermark.
    ///
    /// A missing or corrupt state file is not fatal: implementations log a
    /// warning and return an empty watermark, which triggers baselining.
    /// `Err` is reserved for genuine storage failures.
    async fn load(&self) -> Result<Watermark, crate::Error>;

    /// Persist the watermark.
    ///
    /// Best-effort from the engine's point of view: a failure is logged by
    /// the caller and the in-memory watermark remains authoritative for
    /// the current process.
    async fn save(&self, watermark: &Watermark) -> Result<(), crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_drops_absent_keys() {
        let mut watermark =
            Watermark::from_keys(["a/one".to_string(), "a/two".to_string()].into());
        watermark.replace(["a/one".to_string(), "b/three".to_string()].into());

        assert!(watermark.contains("a/one"));
        assert!(watermark.contains("b/three"));
        assert!(!watermark.contains("a/two"));
        assert_eq!(watermark.len(), 2);
    }

    #[test]
    fn empty_watermark_is_empty() {
        assert!(Watermark::empty().is_empty());
        assert_eq!(Watermark::empty().len(), 0);
    }
}
