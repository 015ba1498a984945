// # Discord Connector
//
// Delivers new-star messages to a Discord channel through an incoming
// webhook, with a rich embed built from the repository metadata.
//
// ## Behavior
//
// - Message ceiling: 2000 characters, truncated with a marker
// - `?wait=true` on create so Discord returns the message id; the id is
//   retained in a connector-owned map and written into the envelope
//   handles
// - `update_post` edits a previously delivered message in place via
//   PATCH `/webhooks/{id}/{token}/messages/{message_id}` (this is the one
//   platform with an update path)
// - `test_connection` GETs the webhook, which validates it without
//   sending anything into the channel

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use starwatch_core::traits::connector::{Connector, Envelope, truncate_for_platform};
use starwatch_core::traits::snapshot_source::Repo;
use starwatch_core::{Error, Result};

/// Discord hard message ceiling
const MESSAGE_LIMIT: usize = 2000;

/// Embed field value ceiling
const FIELD_VALUE_LIMIT: usize = 1024;

/// Embed accent color (gold, to match the star)
const EMBED_COLOR: u32 = 0xFFD700;

/// HTTP timeout for webhook calls
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepted webhook URL prefixes
const WEBHOOK_PREFIXES: [&str; 2] = [
    "https://discord.com/api/webhooks/",
    "https://discordapp.com/api/webhooks/",
];

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedThumbnail {
    url: String,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    url: String,
    color: u32,
    fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<EmbedThumbnail>,
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    embeds: Vec<Embed>,
}

/// Build the rich embed for one repository.
///
/// Prefers the structured metadata the dispatcher already carries; no
/// page scraping is ever needed here.
fn build_embed(message: &str, repo: &Repo) -> Embed {
    let mut fields = Vec::new();

    if let Some(description) = &repo.description {
        fields.push(EmbedField {
            name: "Description".to_string(),
            value: truncate_for_platform(description, FIELD_VALUE_LIMIT),
            inline: false,
        });
    }

    if let Some(language) = &repo.language {
        fields.push(EmbedField {
            name: "Language".to_string(),
            value: language.clone(),
            inline: true,
        });
    }

    fields.push(EmbedField {
        name: "Stars".to_string(),
        value: repo.stargazers_count.to_string(),
        inline: true,
    });

    fields.push(EmbedField {
        name: "Forks".to_string(),
        value: repo.forks_count.to_string(),
        inline: true,
    });

    Embed {
        title: format!("⭐ Starred: {}", repo.full_name),
        description: truncate_for_platform(message, MESSAGE_LIMIT),
        url: repo.html_url.clone(),
        color: EMBED_COLOR,
        fields,
        thumbnail: repo
            .owner_avatar_url
            .clone()
            .map(|url| EmbedThumbnail { url }),
    }
}

/// Connector for Discord incoming webhooks.
pub struct DiscordConnector {
    webhook_url: String,
    client: reqwest::Client,
    initialized: bool,

    /// Repo URL → delivered webhook message id, backing `update_post`
    delivered: Mutex<HashMap<String, String>>,
}

impl DiscordConnector {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            initialized: false,
            delivered: Mutex::new(HashMap::new()),
        }
    }

    fn message_url(&self, message_id: &str) -> String {
        format!("{}/messages/{}", self.webhook_url, message_id)
    }
}

#[async_trait]
impl Connector for DiscordConnector {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn initialize(&mut self) -> Result<()> {
        if !WEBHOOK_PREFIXES
            .iter()
            .any(|prefix| self.webhook_url.starts_with(prefix))
        {
            return Err(Error::connector(
                self.name(),
                "webhook URL is not a Discord webhook",
            ));
        }

        self.initialized = true;
        tracing::info!("Discord connector initialized");
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        // GET on a webhook returns its metadata without posting anything
        let response = self
            .client
            .get(&self.webhook_url)
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("webhook unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("webhook check returned {}", response.status()),
            ));
        }

        tracing::info!("Discord connection test successful");
        Ok(())
    }

    async fn post(&self, envelope: &mut Envelope) -> Result<()> {
        let payload = WebhookPayload {
            content: None,
            embeds: vec![build_embed(&envelope.message, &envelope.repo)],
        };

        // wait=true makes Discord return the created message object
        let url = format!("{}?wait=true", self.webhook_url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("webhook post failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("webhook post returned {}", response.status()),
            ));
        }

        let created: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::connector(self.name(), format!("bad webhook response: {}", e)))?;

        if let Some(message_id) = created.get("id").and_then(|id| id.as_str()) {
            self.delivered
                .lock()
                .unwrap()
                .insert(envelope.repo.html_url.clone(), message_id.to_string());
            envelope
                .handles
                .insert(self.name().to_string(), message_id.to_string());
        }

        tracing::info!(repo = %envelope.repo.full_name, "posted to Discord via webhook");
        Ok(())
    }

    async fn update_post(&self, repo_url: &str, message: &str) -> Result<bool> {
        let message_id = match self.delivered.lock().unwrap().get(repo_url) {
            Some(id) => id.clone(),
            // Only reachable when the original post succeeded
            None => return Ok(false),
        };

        let body = serde_json::json!({
            "content": truncate_for_platform(message, MESSAGE_LIMIT),
        });

        let response = self
            .client
            .patch(self.message_url(&message_id))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("webhook edit failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("webhook edit returned {}", response.status()),
            ));
        }

        tracing::info!(repo_url, "updated Discord message");
        Ok(true)
    }

    fn is_ready(&self) -> bool {
        self.initialized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> Repo {
        let mut repo = Repo::new("rust-lang/rust", "https://github.com/rust-lang/rust");
        repo.description = Some("The Rust programming language".to_string());
        repo.language = Some("Rust".to_string());
        repo.stargazers_count = 90000;
        repo.forks_count = 12000;
        repo.owner_avatar_url =
            Some("https://avatars.githubusercontent.com/u/5430905".to_string());
        repo
    }

    #[tokio::test]
    async fn initialize_rejects_non_discord_urls() {
        let mut connector = DiscordConnector::new("https://example.com/webhook");
        assert!(connector.initialize().await.is_err());
        assert!(!connector.is_ready());
    }

    #[tokio::test]
    async fn initialize_accepts_webhook_urls() {
        let mut connector =
            DiscordConnector::new("https://discord.com/api/webhooks/1/token");
        assert!(connector.initialize().await.is_ok());
        assert!(connector.is_ready());
    }

    #[test]
    fn embed_carries_repo_metadata() {
        let embed = build_embed("starred!", &repo());

        assert_eq!(embed.title, "⭐ Starred: rust-lang/rust");
        assert_eq!(embed.url, "https://github.com/rust-lang/rust");
        assert_eq!(embed.color, EMBED_COLOR);
        assert!(embed.thumbnail.is_some());

        let names: Vec<&str> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Description", "Language", "Stars", "Forks"]);
    }

    #[test]
    fn embed_omits_absent_metadata() {
        let mut repo = repo();
        repo.description = None;
        repo.language = None;
        repo.owner_avatar_url = None;

        let embed = build_embed("starred!", &repo);

        assert!(embed.thumbnail.is_none());
        let names: Vec<&str> = embed.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Stars", "Forks"]);
    }

    #[test]
    fn embed_description_respects_the_ceiling() {
        let embed = build_embed(&"x".repeat(3000), &repo());
        assert!(embed.description.chars().count() <= MESSAGE_LIMIT);
        assert!(embed.description.ends_with("..."));
    }

    #[tokio::test]
    async fn update_without_prior_delivery_is_a_noop() {
        let mut connector =
            DiscordConnector::new("https://discord.com/api/webhooks/1/token");
        connector.initialize().await.unwrap();

        let updated = connector
            .update_post("https://github.com/a/b", "edited")
            .await
            .unwrap();
        assert!(!updated);
    }
}
