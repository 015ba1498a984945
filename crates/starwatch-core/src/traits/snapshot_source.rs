// # Snapshot Source Trait
//
// Defines the interface for fetching the current set of starred repositories.
//
// ## Implementations
//
// - GitHub REST API: `starwatch-source-github` crate
//
// ## Contract
//
// A snapshot source is a read-only collaborator. It yields the full current
// collection of items on demand and surfaces transient failures as errors,
// never as panics. It makes no decisions about what is "new"; that is the
// change detector's job.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fallback text used wherever a repository has no description.
pub const NO_DESCRIPTION: &str = "No description";

/// One starred repository as reported by the snapshot source.
///
/// Immutable once fetched; read-only to the core. The `full_name`
/// (e.g. `"rust-lang/rust"`) is the stable unique key used by the
/// watermark and the change detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    /// Stable unique key, `owner/name`
    pub full_name: String,
    /// Short repository name
    pub name: String,
    /// Web URL of the repository
    pub html_url: String,
    /// Free-text description, if any
    pub description: Option<String>,
    /// Primary language, if detected
    pub language: Option<String>,
    /// Stargazer count at fetch time
    pub stargazers_count: u64,
    /// Fork count at fetch time
    pub forks_count: u64,
    /// Owner avatar image URL, if any
    pub owner_avatar_url: Option<String>,
}

impl Repo {
    /// Create a minimal repo from its key and URL.
    ///
    /// The short name is derived from the key. Mostly useful in tests and
    /// for sources that only know the identifiers.
    pub fn new(full_name: impl Into<String>, html_url: impl Into<String>) -> Self {
        let full_name = full_name.into();
        let name = full_name
            .rsplit('/')
            .next()
            .unwrap_or(full_name.as_str())
            .to_string();

        Self {
            full_name,
            name,
            html_url: html_url.into(),
            description: None,
            language: None,
            stargazers_count: 0,
            forks_count: 0,
            owner_avatar_url: None,
        }
    }

    /// Description text with the literal fallback applied.
    pub fn description_or_fallback(&self) -> &str {
        self.description.as_deref().unwrap_or(NO_DESCRIPTION)
    }
}

/// Trait for snapshot source implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current full collection of starred repositories.
    ///
    /// Item order is unspecified; the upstream API gives no ordering
    /// guarantee and the dispatcher treats items independently.
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<Repo>)`: The current snapshot
    /// - `Err(Error)`: Transient or permanent fetch failure. The engine
    ///   treats failures after startup as transient and skips the cycle.
    async fn current_items(&self) -> Result<Vec<Repo>, crate::Error>;

    /// Human-readable description of the source (for logging).
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_derived_from_key() {
        let repo = Repo::new("rust-lang/rust", "https://github.com/rust-lang/rust");
        assert_eq!(repo.name, "rust");
        assert_eq!(repo.full_name, "rust-lang/rust");
    }

    #[test]
    fn description_fallback_applies_only_when_missing() {
        let mut repo = Repo::new("a/b", "https://example.invalid/a/b");
        assert_eq!(repo.description_or_fallback(), NO_DESCRIPTION);

        repo.description = Some("a tool".to_string());
        assert_eq!(repo.description_or_fallback(), "a tool");
    }
}
