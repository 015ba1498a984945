// # Connector Trait
//
// Defines the interface for delivering new-star messages to one destination
// platform (Discord, Mastodon, Matrix, Bluesky, ...).
//
// ## Lifecycle
//
// 1. `initialize()`: validate credentials/URLs, establish a session where
//    the protocol needs one
// 2. `test_connection()`: lightweight reachability/auth probe, run once at
//    startup; a connector that fails it is excluded from dispatch for the
//    process lifetime
// 3. `post()`: deliver one message, repeatedly, from the daemon loop
//
// ## Trust Level
//
// Connectors are isolated integrations with strict limitations:
//
// - ✅ Perform HTTP/HTTPS calls to their own endpoints only
// - ✅ Keep connector-local auxiliary state (e.g. a URL → message-id map
//   backing threading and update support)
// - ❌ Access the state store or the watermark (owned by the engine)
// - ❌ Access other connectors (must be isolated)
// - ❌ Retry within a cycle (a failed post is reported and dropped)
// - ❌ Spawn background tasks
//
// All operations are normalized to a single awaited call at this boundary,
// regardless of the underlying transport. Every connector-built HTTP client
// must carry a bounded timeout so one stalled destination cannot stall the
// cycle indefinitely.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::traits::snapshot_source::Repo;

/// Marker appended to messages cut down to a platform's length ceiling.
pub const TRUNCATION_MARKER: &str = "...";

/// Outcome of a guarded delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// The destination accepted the message
    Delivered,
    /// The delivery failed; logged, never retried within the cycle
    Failed,
    /// The connector was not ready and `post` was never invoked
    Skipped,
}

/// Per-item, per-cycle dispatch envelope.
///
/// Built once by the dispatcher and handed to every active connector in
/// turn. Connectors may write their created-message identifier into
/// `handles` (keyed by connector name) during one fan-out; the map is
/// never persisted and dies with the envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Canonical message text rendered from the template
    pub message: String,
    /// The repository this fan-out is about
    pub repo: Repo,
    /// Connector-populated response handles, keyed by connector name
    pub handles: HashMap<String, String>,
}

impl Envelope {
    /// Create an envelope for one item's fan-out.
    pub fn new(message: impl Into<String>, repo: Repo) -> Self {
        Self {
            message: message.into(),
            repo,
            handles: HashMap::new(),
        }
    }
}

/// Trait for destination platform connectors
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
/// Mutable auxiliary state (session tokens acquired after `initialize`,
/// posted-message maps) belongs behind connector-internal locks.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Platform name (for logging and envelope handles).
    fn name(&self) -> &'static str;

    /// Validate credentials/URLs and establish a client session if the
    /// protocol requires one.
    ///
    /// Errors must be returned, never panicked. A connector that fails
    /// initialization is excluded from dispatch for the process lifetime;
    /// there is no automatic re-initialization.
    async fn initialize(&mut self) -> Result<(), crate::Error>;

    /// Lightweight reachability/auth check, run once at startup
    /// immediately after `initialize`.
    async fn test_connection(&self) -> Result<(), crate::Error>;

    /// Deliver one message to the destination.
    ///
    /// Implementations render the envelope message down to the platform's
    /// length ceiling (see [`truncate_for_platform`]), may attach a rich
    /// preview built from the repo metadata, may thread onto a previously
    /// delivered message, and may write their created-message identifier
    /// into `envelope.handles`.
    async fn post(&self, envelope: &mut Envelope) -> Result<(), crate::Error>;

    /// Idempotently update a previously delivered message about `repo_url`.
    ///
    /// Only reachable when the original post succeeded and its identifier
    /// was retained by the connector. Platforms without an update path
    /// keep this default and report `Ok(false)`.
    async fn update_post(&self, _repo_url: &str, _message: &str) -> Result<bool, crate::Error> {
        Ok(false)
    }

    /// Whether the connector is enabled, initialized, and passed its
    /// connection test.
    fn is_ready(&self) -> bool;

    /// Guarded delivery: never calls `post` unless [`Connector::is_ready`],
    /// and converts any `post` error into [`PostOutcome::Failed`] after
    /// logging it. A single destination's failure must never abort the
    /// fan-out to other destinations.
    async fn safe_post(&self, envelope: &mut Envelope) -> PostOutcome {
        if !self.is_ready() {
            tracing::warn!(connector = self.name(), "connector is not ready, skipping");
            return PostOutcome::Skipped;
        }

        match self.post(envelope).await {
            Ok(()) => PostOutcome::Delivered,
            Err(e) => {
                tracing::error!(
                    connector = self.name(),
                    repo = %envelope.repo.full_name,
                    error = %e,
                    "delivery failed"
                );
                PostOutcome::Failed
            }
        }
    }
}

/// Cut `message` down to at most `limit` characters.
///
/// Messages at or under the ceiling pass through unmodified; longer ones
/// are cut so that the result, including the trailing
/// [`TRUNCATION_MARKER`], fits within `limit` characters.
pub fn truncate_for_platform(message: &str, limit: usize) -> String {
    if message.chars().count() <= limit {
        return message.to_string();
    }

    if limit <= TRUNCATION_MARKER.len() {
        return message.chars().take(limit).collect();
    }

    let keep = limit - TRUNCATION_MARKER.len();
    let mut out: String = message.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}
