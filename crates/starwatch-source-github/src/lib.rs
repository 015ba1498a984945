// # GitHub Snapshot Source
//
// This crate provides the GitHub implementation of the starwatch
// SnapshotSource trait: a token-authenticated, paginated listing of a
// user's starred repositories via the REST API.
//
// ## Contract
//
// - One `current_items()` call fetches the complete current star set
// - Transient API failures come back as `Error::Source` (the engine skips
//   the cycle); 401/403 come back as `Error::Authentication` so a bad
//   token fails fast at startup
// - No retry logic here (scheduling is owned by the engine)
//
// ## API Reference
//
// - List starred: GET `/user/starred` (token's own account) or
//   GET `/users/{username}/starred`
// - Pagination: `per_page` up to 100; a short page terminates the listing

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

use starwatch_core::config::GithubConfig;
use starwatch_core::traits::{Repo, SnapshotSource};
use starwatch_core::{Error, Result};

/// GitHub REST API base URL
const GITHUB_API_BASE: &str = "https://api.github.com";

/// Page size for the starred listing (GitHub's maximum)
const PER_PAGE: usize = 100;

/// Safety cap on pagination; 100 pages of 100 stars each
const MAX_PAGES: usize = 100;

/// HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire format of one starred-listing entry (the fields we keep)
#[derive(Debug, Deserialize)]
struct StarredEntry {
    full_name: String,
    name: String,
    html_url: String,
    description: Option<String>,
    language: Option<String>,
    #[serde(default)]
    stargazers_count: u64,
    #[serde(default)]
    forks_count: u64,
    owner: Option<EntryOwner>,
}

#[derive(Debug, Deserialize)]
struct EntryOwner {
    avatar_url: Option<String>,
}

impl From<StarredEntry> for Repo {
    fn from(entry: StarredEntry) -> Self {
        Repo {
            full_name: entry.full_name,
            name: entry.name,
            html_url: entry.html_url,
            description: entry.description,
            language: entry.language,
            stargazers_count: entry.stargazers_count,
            forks_count: entry.forks_count,
            owner_avatar_url: entry.owner.and_then(|o| o.avatar_url),
        }
    }
}

/// Snapshot source backed by the GitHub starred-repositories listing.
// Custom Debug implementation that hides the access token
impl std::fmt::Debug for GithubStarsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubStarsSource")
            .field("token", &"<REDACTED>")
            .field("username", &self.username)
            .field("api_base", &self.api_base)
            .finish()
    }
}

pub struct GithubStarsSource {
    /// Personal access token
    /// ⚠️ NEVER log this value
    token: String,

    /// Account to watch; `None` means the token's own account
    username: Option<String>,

    /// API base URL (overridable for tests)
    api_base: String,

    /// HTTP client with a bounded timeout
    client: reqwest::Client,
}

impl GithubStarsSource {
    /// Create a GitHub snapshot source from configuration.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(Error::config("GitHub access token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::source(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            token: config.token.clone(),
            username: config.username.clone(),
            api_base: GITHUB_API_BASE.to_string(),
            client,
        })
    }

    /// Override the API base URL (for tests against a local server).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// URL of one page of the starred listing.
    fn page_url(&self, page: usize) -> String {
        match &self.username {
            Some(username) => format!(
                "{}/users/{}/starred?per_page={}&page={}",
                self.api_base, username, PER_PAGE, page
            ),
            None => format!(
                "{}/user/starred?per_page={}&page={}",
                self.api_base, PER_PAGE, page
            ),
        }
    }

    /// Fetch one page of the starred listing.
    async fn fetch_page(&self, page: usize) -> Result<Vec<StarredEntry>> {
        let url = self.page_url(page);

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "starwatch")
            .send()
            .await
            .map_err(|e| Error::source(format!("starred listing request failed: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(Error::auth(format!(
                    "GitHub rejected the access token ({})",
                    response.status()
                )));
            }
            status if !status.is_success() => {
                return Err(Error::source(format!("GitHub API returned {}", status)));
            }
            _ => {}
        }

        response
            .json::<Vec<StarredEntry>>()
            .await
            .map_err(|e| Error::source(format!("failed to parse starred listing: {}", e)))
    }
}

#[async_trait]
impl SnapshotSource for GithubStarsSource {
    async fn current_items(&self) -> Result<Vec<Repo>> {
        let mut items = Vec::new();

        for page in 1..=MAX_PAGES {
            let batch = self.fetch_page(page).await?;
            let batch_len = batch.len();
            items.extend(batch.into_iter().map(Repo::from));

            if batch_len < PER_PAGE {
                return Ok(items);
            }
        }

        tracing::warn!(
            pages = MAX_PAGES,
            items = items.len(),
            "starred listing pagination cap reached, snapshot may be partial"
        );
        Ok(items)
    }

    fn describe(&self) -> String {
        match &self.username {
            Some(username) => format!("GitHub stars of {}", username),
            None => "GitHub stars of the authenticated user".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(username: Option<&str>) -> GithubStarsSource {
        GithubStarsSource::new(&GithubConfig {
            token: "ghp_testtoken".to_string(),
            username: username.map(String::from),
        })
        .unwrap()
    }

    #[test]
    fn page_url_uses_own_account_without_username() {
        let url = source(None).page_url(1);
        assert_eq!(
            url,
            "https://api.github.com/user/starred?per_page=100&page=1"
        );
    }

    #[test]
    fn page_url_targets_configured_username() {
        let url = source(Some("octocat")).page_url(3);
        assert_eq!(
            url,
            "https://api.github.com/users/octocat/starred?per_page=100&page=3"
        );
    }

    #[test]
    fn empty_token_is_rejected() {
        let result = GithubStarsSource::new(&GithubConfig {
            token: String::new(),
            username: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn listing_entry_maps_into_repo() {
        let json = r#"{
            "full_name": "rust-lang/rust",
            "name": "rust",
            "html_url": "https://github.com/rust-lang/rust",
            "description": "The Rust programming language",
            "language": "Rust",
            "stargazers_count": 90000,
            "forks_count": 12000,
            "owner": { "avatar_url": "https://avatars.githubusercontent.com/u/5430905" }
        }"#;

        let entry: StarredEntry = serde_json::from_str(json).unwrap();
        let repo = Repo::from(entry);

        assert_eq!(repo.full_name, "rust-lang/rust");
        assert_eq!(repo.name, "rust");
        assert_eq!(repo.language.as_deref(), Some("Rust"));
        assert_eq!(repo.stargazers_count, 90000);
        assert_eq!(
            repo.owner_avatar_url.as_deref(),
            Some("https://avatars.githubusercontent.com/u/5430905")
        );
    }

    #[test]
    fn missing_optional_fields_deserialize() {
        let json = r#"{
            "full_name": "a/b",
            "name": "b",
            "html_url": "https://github.com/a/b",
            "description": null,
            "language": null,
            "owner": null
        }"#;

        let entry: StarredEntry = serde_json::from_str(json).unwrap();
        let repo = Repo::from(entry);

        assert!(repo.description.is_none());
        assert!(repo.owner_avatar_url.is_none());
        assert_eq!(repo.stargazers_count, 0);
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let debug = format!("{:?}", source(None));
        assert!(debug.contains("<REDACTED>"));
        assert!(!debug.contains("ghp_testtoken"));
    }
}
