// # Mastodon Connector
//
// Posts new-star statuses to a Mastodon instance with an OAuth access
// token.
//
// ## Behavior
//
// - Message ceiling: 500 characters (the common instance default),
//   truncated with a marker
// - `test_connection` verifies the token via
//   GET `/api/v1/accounts/verify_credentials`
// - The created status id goes into the envelope handles; Mastodon gets
//   no update path here, so `update_post` keeps the unsupported default

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use starwatch_core::traits::connector::{Connector, Envelope, truncate_for_platform};
use starwatch_core::{Error, Result};

/// Default Mastodon status ceiling
const MESSAGE_LIMIT: usize = 500;

/// HTTP timeout for API calls
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Account {
    username: String,
}

#[derive(Debug, Deserialize)]
struct Status {
    id: String,
    url: Option<String>,
}

/// Connector for Mastodon instances.
// Custom Debug implementation that hides the access token
impl std::fmt::Debug for MastodonConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MastodonConnector")
            .field("base_url", &self.base_url)
            .field("access_token", &"<REDACTED>")
            .finish()
    }
}

pub struct MastodonConnector {
    /// Instance base URL without a trailing slash
    base_url: String,
    access_token: String,
    client: reqwest::Client,
    initialized: bool,
}

impl MastodonConnector {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Self {
            base_url,
            access_token: access_token.into(),
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            initialized: false,
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Connector for MastodonConnector {
    fn name(&self) -> &'static str {
        "mastodon"
    }

    async fn initialize(&mut self) -> Result<()> {
        if !self.base_url.starts_with("https://") && !self.base_url.starts_with("http://") {
            return Err(Error::connector(
                self.name(),
                "instance base URL must be an HTTP(S) URL",
            ));
        }
        if self.access_token.is_empty() {
            return Err(Error::connector(self.name(), "access token is empty"));
        }

        self.initialized = true;
        tracing::info!(instance = %self.base_url, "Mastodon connector initialized");
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        let response = self
            .client
            .get(self.api_url("/api/v1/accounts/verify_credentials"))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("instance unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("credential check returned {}", response.status()),
            ));
        }

        let account: Account = response
            .json()
            .await
            .map_err(|e| Error::connector(self.name(), format!("bad account response: {}", e)))?;

        tracing::info!(username = %account.username, "Mastodon connection test successful");
        Ok(())
    }

    async fn post(&self, envelope: &mut Envelope) -> Result<()> {
        let status = truncate_for_platform(&envelope.message, MESSAGE_LIMIT);

        let response = self
            .client
            .post(self.api_url("/api/v1/statuses"))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("status post failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("status post returned {}", response.status()),
            ));
        }

        let created: Status = response
            .json()
            .await
            .map_err(|e| Error::connector(self.name(), format!("bad status response: {}", e)))?;

        envelope
            .handles
            .insert(self.name().to_string(), created.id);

        tracing::info!(
            url = created.url.as_deref().unwrap_or("<unknown>"),
            "posted to Mastodon"
        );
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initialize_rejects_non_http_base_url() {
        let mut connector = MastodonConnector::new("mastodon.social", "token");
        assert!(connector.initialize().await.is_err());
        assert!(!connector.is_ready());
    }

    #[tokio::test]
    async fn initialize_rejects_empty_token() {
        let mut connector = MastodonConnector::new("https://mastodon.social", "");
        assert!(connector.initialize().await.is_err());
    }

    #[tokio::test]
    async fn initialize_accepts_valid_settings() {
        let mut connector = MastodonConnector::new("https://mastodon.social/", "token");
        assert!(connector.initialize().await.is_ok());
        assert!(connector.is_ready());
    }

    #[test]
    fn trailing_slash_is_normalized_away() {
        let connector = MastodonConnector::new("https://mastodon.social/", "token");
        assert_eq!(
            connector.api_url("/api/v1/statuses"),
            "https://mastodon.social/api/v1/statuses"
        );
    }

    #[test]
    fn debug_output_redacts_the_token() {
        let connector = MastodonConnector::new("https://mastodon.social", "secret-token");
        let debug = format!("{:?}", connector);
        assert!(debug.contains("<REDACTED>"));
        assert!(!debug.contains("secret-token"));
    }

    #[tokio::test]
    async fn update_post_is_unsupported() {
        let mut connector = MastodonConnector::new("https://mastodon.social", "token");
        connector.initialize().await.unwrap();

        let updated = connector
            .update_post("https://github.com/a/b", "edited")
            .await
            .unwrap();
        assert!(!updated);
    }
}
