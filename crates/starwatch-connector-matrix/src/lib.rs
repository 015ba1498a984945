// # Matrix Connector
//
// Posts new-star messages into a Matrix room via the client-server API.
//
// ## Authentication precedence
//
// A configured access token always wins. Only when no token exists does
// `initialize` perform an `m.login.password` exchange, submitting the
// local part of the user id (`@alice:example.org` logs in as `alice`).
// The acquired token lives for the connector's process lifetime.
//
// ## Behavior
//
// - No hard message ceiling; Matrix events carry the full text
// - Messages are sent as `m.text` with an HTML `formatted_body`
// - A repeat post about an already-delivered URL is threaded onto the
//   original event via an `m.thread` relation
// - `test_connection` hits `/account/whoami`

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use starwatch_core::traits::connector::{Connector, Envelope};
use starwatch_core::{Error, Result};

/// HTTP timeout for API calls
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    user_id: String,
}

/// Extract the local part of a Matrix user id.
///
/// `@alice:example.org` → `alice`; a bare localpart passes through.
fn localpart(user_id: &str) -> &str {
    let trimmed = user_id.strip_prefix('@').unwrap_or(user_id);
    trimmed.split(':').next().unwrap_or(trimmed)
}

/// Percent-encode a Matrix identifier for use in a URL path.
///
/// Room ids carry `!` and `:`, event transaction ids stay plain ASCII.
fn encode_identifier(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '!' => out.push_str("%21"),
            '#' => out.push_str("%23"),
            ':' => out.push_str("%3A"),
            '@' => out.push_str("%40"),
            '/' => out.push_str("%2F"),
            _ => out.push(c),
        }
    }
    out
}

/// Build the plain and HTML bodies for one new-star message.
fn build_bodies(message: &str, description: Option<&str>) -> (String, String) {
    let mut plain = format!("⭐ Starred Repository\n\n{}", message);
    if let Some(description) = description {
        plain.push_str(&format!("\n\n{}", description));
    }

    let html = plain.replace('\n', "<br>");
    (plain, html)
}

/// Connector for Matrix rooms.
// Custom Debug implementation that hides credentials
impl std::fmt::Debug for MatrixConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixConnector")
            .field("homeserver", &self.homeserver)
            .field("room_id", &self.room_id)
            .field("user_id", &self.user_id)
            .field("access_token", &"<REDACTED>")
            .finish()
    }
}

pub struct MatrixConnector {
    /// Homeserver base URL without a trailing slash
    homeserver: String,
    room_id: String,
    user_id: String,
    password: Option<String>,
    access_token: Option<String>,
    client: reqwest::Client,
    initialized: bool,

    /// Repo URL → delivered event id, backing thread relations
    delivered: Mutex<HashMap<String, String>>,

    /// Monotonic component of transaction ids
    txn_counter: AtomicU64,
}

impl MatrixConnector {
    pub fn new(
        homeserver: impl Into<String>,
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        access_token: Option<String>,
        password: Option<String>,
    ) -> Self {
        let homeserver = homeserver.into().trim_end_matches('/').to_string();

        Self {
            homeserver,
            room_id: room_id.into(),
            user_id: user_id.into(),
            password,
            access_token,
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            initialized: false,
            delivered: Mutex::new(HashMap::new()),
            txn_counter: AtomicU64::new(0),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/_matrix/client/v3{}", self.homeserver, path)
    }

    /// Unique-per-process transaction id for idempotent event sends.
    fn next_txn_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let seq = self.txn_counter.fetch_add(1, Ordering::SeqCst);
        format!("starwatch-{}-{}", millis, seq)
    }

    /// Perform the password login exchange and keep the session token.
    async fn login(&mut self) -> Result<()> {
        let password = self
            .password
            .as_deref()
            .ok_or_else(|| Error::connector(self.name(), "no access token and no password"))?;

        let body = serde_json::json!({
            "type": "m.login.password",
            "identifier": {
                "type": "m.id.user",
                "user": localpart(&self.user_id),
            },
            "password": password,
        });

        let response = self
            .client
            .post(self.api_url("/login"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("login request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("login returned {}", response.status()),
            ));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| Error::connector(self.name(), format!("bad login response: {}", e)))?;

        self.access_token = Some(login.access_token);
        tracing::info!(user = %self.user_id, "Matrix login successful");
        Ok(())
    }

    fn token(&self) -> Result<&str> {
        self.access_token
            .as_deref()
            .ok_or_else(|| Error::connector(self.name(), "no access token"))
    }
}

#[async_trait]
impl Connector for MatrixConnector {
    fn name(&self) -> &'static str {
        "matrix"
    }

    async fn initialize(&mut self) -> Result<()> {
        if !self.homeserver.starts_with("https://") && !self.homeserver.starts_with("http://") {
            return Err(Error::connector(
                self.name(),
                "homeserver must be an HTTP(S) URL",
            ));
        }

        // An existing access token always wins; only without one do we
        // fall back to the password login exchange.
        if self.access_token.is_none() {
            self.login().await?;
        }

        self.initialized = true;
        tracing::info!(user = %self.user_id, "Matrix connector initialized");
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        let response = self
            .client
            .get(self.api_url("/account/whoami"))
            .bearer_auth(self.token()?)
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("homeserver unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("whoami returned {}", response.status()),
            ));
        }

        let whoami: WhoamiResponse = response
            .json()
            .await
            .map_err(|e| Error::connector(self.name(), format!("bad whoami response: {}", e)))?;

        tracing::info!(user = %whoami.user_id, "Matrix connection test successful");
        Ok(())
    }

    async fn post(&self, envelope: &mut Envelope) -> Result<()> {
        let (plain, html) = build_bodies(&envelope.message, envelope.repo.description.as_deref());

        let mut content = serde_json::json!({
            "msgtype": "m.text",
            "body": plain,
            "format": "org.matrix.custom.html",
            "formatted_body": html,
        });

        // A repeat post about the same URL becomes a thread reply on the
        // original event.
        let prior = self
            .delivered
            .lock()
            .unwrap()
            .get(&envelope.repo.html_url)
            .cloned();
        if let Some(event_id) = prior {
            content["m.relates_to"] = serde_json::json!({
                "rel_type": "m.thread",
                "event_id": event_id,
            });
        }

        let path = format!(
            "/rooms/{}/send/m.room.message/{}",
            encode_identifier(&self.room_id),
            self.next_txn_id()
        );

        let response = self
            .client
            .put(self.api_url(&path))
            .bearer_auth(self.token()?)
            .json(&content)
            .send()
            .await
            .map_err(|e| Error::connector(self.name(), format!("room send failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::connector(
                self.name(),
                format!("room send returned {}", response.status()),
            ));
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| Error::connector(self.name(), format!("bad send response: {}", e)))?;

        self.delivered
            .lock()
            .unwrap()
            .insert(envelope.repo.html_url.clone(), sent.event_id.clone());
        envelope
            .handles
            .insert(self.name().to_string(), sent.event_id);

        tracing::info!(room = %self.room_id, "posted to Matrix room");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.initialized && self.access_token.is_some()
    }
}
