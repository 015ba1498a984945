// # Bluesky Connector
//
// Posts new-star messages to Bluesky over the AT Protocol, attaching a
// rich link-preview card when one can be built.
//
// ## Behavior
//
// - Message ceiling: 300 characters, truncated with a marker
// - `initialize` creates a session from the handle and app password;
//   the JWT and DID live for the connector's process lifetime
// - The preview card prefers the structured repository metadata; when
//   the description is missing the repository page is fetched with a
//   bounded timeout and its `og:` meta tags are scraped; when even that
//   fails the post degrades to plain text rather than failing
// - The owner avatar is uploaded as the card thumbnail on a best-effort
//   basis
// - `test_connection` resolves the account's own profile

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

use starwatch_core::traits::connector::{Connector, Envelope, truncate_for_platform};
use starwatch_core::traits::snapshot_source::Repo;
use starwatch_core::{Error, Result};

/// Bluesky post ceiling in characters
const MESSAGE_LIMIT: usize = 300;

/// HTTP timeout for API calls
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the optional preview-card page fetch
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default PDS endpoint
pub const DEFAULT_SERVICE_URL: &str = "https://bsky.social";

static META_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<meta\s[^>]*>").expect("meta tag regex"));
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(property|name|content)\s*=\s*["']([^"']*)["']"#).expect("meta attr regex")
});
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>([^<]*)</title>").expect("title regex"));

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    did: String,
}

#[derive(Debug, Deserialize)]
struct CreatedRecord {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct UploadedBlob {
    blob: serde_json::Value,
}

/// Title and description pulled from a repository page.
#[derive(Debug, Default, PartialEq)]
struct PageCard {
    title: Option<String>,
    description: Option<String>,
}

/// Scrape `og:` meta tags out of an HTML document.
///
/// Falls back to `name="description"` and the `<title>` element when the
/// OpenGraph tags are absent. Tolerates attribute order and quoting
/// differences; this is not a full HTML parser and does not need to be.
fn extract_page_card(html: &str) -> PageCard {
    let mut card = PageCard::default();
    let mut plain_description = None;

    for tag in META_TAG_RE.find_iter(html) {
        let mut key = None;
        let mut content = None;
        for attr in ATTR_RE.captures_iter(tag.as_str()) {
            match attr[1].to_ascii_lowercase().as_str() {
                "property" | "name" => key = Some(attr[2].to_string()),
                "content" => content = Some(attr[2].to_string()),
                _ => {}
            }
        }

        let (Some(key), Some(content)) = (key, content) else {
            continue;
        };
        match key.as_str() {
            "og:title" if card.title.is_none() => card.title = Some(content),
            "og:description" if card.description.is_none() => card.description = Some(content),
            "description" if plain_description.is_none() => plain_description = Some(content),
            _ => {}
        }
    }

    if card.description.is_none() {
        card.description = plain_description;
    }
    if card.title.is_none() {
        card.title = TITLE_RE
            .captures(html)
            .map(|c| c[1].trim().to_string())
            .filter(|t| !t.is_empty());
    }

    card
}

/// Connector for Bluesky accounts.
// Custom Debug implementation that hides credentials
impl std::fmt::Debug for BlueskyConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueskyConnector")
            .field("handle", &self.handle)
            .field("service_url", &self.service_url)
            .field("app_password", &"<REDACTED>")
            .finish()
    }
}

pub struct BlueskyConnector {
    handle: String,
    app_password: String,
    /// PDS base URL without a trailing slash
    service_url: String,
    client: reqwest::Client,
    session: Option<Session>,
}

impl BlueskyConnector {
    pub fn new(
        handle: impl Into<String>,
        app_password: impl Into<String>,
        service_url: impl Into<String>,
    ) -> Self {
        let service_url = service_url.into().trim_end_matches('/').to_string();

        Self {
            handle: handle.into(),
            app_password: app_password.into(),
            service_url,
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            session: None,
        }
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service_url, method)
    }

    fn session(&self) -> Result<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| Error::connector(self.name(), "no active session"))
    }

    /// Build the external-link embed for one repository.
    ///
    /// Uses the structured metadata when it is complete; otherwise
    /// fetches the page and scrapes its meta tags. Returns `None` when
    /// no usable card could be assembled, letting the post degrade to
    /// plain text.
    async fn build_external_embed(&self, repo: &Repo) -> Option<serde_json::Value> {
        let (title, description) = match &repo.description {
            Some(description) => (
                format!("⭐ {}", repo.full_name),
                description.clone(),
            ),
            None => {
                let card = self.scrape_page(&repo.html_url).await?;
                let title = card
                    .title
                    .unwrap_or_else(|| format!("⭐ {}", repo.full_name));
                (title, card.description.unwrap_or_default())
            }
        };

        let mut external = serde_json::json!({
            "uri": repo.html_url,
            "title": title,
            "description": description,
        });

        if let Some(avatar_url) = &repo.owner_avatar_url {
            if let Some(blob) = self.upload_thumbnail(avatar_url).await {
                external["thumb"] = blob;
            }
        }

        Some(serde_json::json!({
            "$type": "app.bsky.embed.external",
            "external": external,
        }))
    }

    /// Fetch the repository page and scrape its meta tags.
    async fn scrape_page(&self, url: &str) -> Option<PageCard> {
        let response = self
            .client
            .get(url)
            .timeout(SCRAPE_TIMEOUT)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "preview page fetch failed");
            return None;
        }

        let html = response.text().await.ok()?;
        let card = extract_page_card(&html);
        if card.title.is_none() && card.description.is_none() {
            return None;
        }
        Some(card)
    }

    /// Upload the owner avatar so the card gets a thumbnail.
    ///
    /// Any failure here is swallowed: the card is still worth posting
    /// without an image.
    async fn upload_thumbnail(&self, avatar_url: &str) -> Option<serde_json::Value> {
        let session = self.session.as_ref()?;

        let image = self.client.get(avatar_url).send().await.ok()?;
        if !image.status().is_success() {
            return None;
        }
        let content_type = image
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = image.bytes().await.ok()?;

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "avatar blob upload failed");
            return None;
        }

        let uploaded: UploadedBlob = response.json().await.ok()?;
        Some(uploaded.blob)
    }
}

#[async_trait]
impl Connector for BlueskyConnector {
    fn name(&self) -> &'static str {
        "bluesky"
    }

    async fn initialize(&mut self) -> Result<()> {
        if self.handle.is_empty() || self.app_password.is_empty() {
            return Err(Error::connector(
                self.name(),
                "handle and app password are required",
            ));
        }

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&serde_json::json!({
                "identifier": self.handle,
                "password": self.app_password,
            }))
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("session request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("session create returned {}", response.status()),
            ));
        }

        let session: Session = response
            .json()
            .await
            .map_err(|e| Error::connector(self.name(), format!("bad session response: {}", e)))?;

        tracing::info!(handle = %self.handle, did = %session.did, "Bluesky session created");
        self.session = Some(session);
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        let session = self.session()?;

        let response = self
            .client
            .get(self.xrpc_url("app.bsky.actor.getProfile"))
            .query(&[("actor", self.handle.as_str())])
            .bearer_auth(&session.access_jwt)
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("service unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("profile lookup returned {}", response.status()),
            ));
        }

        tracing::info!(handle = %self.handle, "Bluesky connection test successful");
        Ok(())
    }

    async fn post(&self, envelope: &mut Envelope) -> Result<()> {
        let session = self.session()?;
        let text = truncate_for_platform(&envelope.message, MESSAGE_LIMIT);

        let mut record = serde_json::json!({
            "$type": "app.bsky.feed.post",
            "text": text,
            "createdAt": chrono::Utc::now().to_rfc3339(),
        });

        // Card assembly never fails the post; a bare text post still
        // carries the repository URL.
        if let Some(embed) = self.build_external_embed(&envelope.repo).await {
            record["embed"] = embed;
        } else {
            tracing::debug!(repo = %envelope.repo.full_name, "posting without a preview card");
        }

        let response = self
            .client
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&serde_json::json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("record create failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("record create returned {}", response.status()),
            ));
        }

        let created: CreatedRecord = response
            .json()
            .await
            .map_err(|e| Error::connector(self.name(), format!("bad record response: {}", e)))?;

        envelope
            .handles
            .insert(self.name().to_string(), created.uri);

        tracing::info!(handle = %self.handle, "posted to Bluesky");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.session.is_some()
    }
}
