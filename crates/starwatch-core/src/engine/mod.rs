//! Core starwatch engine
//!
//! The StarwatchEngine drives the daemon loop:
//!
//! 1. Fetch a snapshot of the starred repositories
//! 2. Detect newly seen items against the watermark
//! 3. Dispatch each new item to every active connector
//! 4. Replace and persist the watermark
//!
//! ## Lifecycle
//!
//! `Initializing → Running → ShuttingDown → Stopped`
//!
//! Initialization performs the first snapshot fetch (failure here is fatal,
//! since it usually means bad source credentials), loads the watermark,
//! baselines on an empty watermark without dispatching anything, and
//! activates connectors. A connector that fails `initialize` or
//! `test_connection` is excluded from the active set for the process
//! lifetime.
//!
//! While running, a transient fetch failure skips the cycle and the loop
//! continues on schedule. A persistence failure is logged as a warning and
//! the in-memory watermark stays authoritative. Shutdown (SIGINT/SIGTERM
//! or a test-provided oneshot) exits after the current tick, never
//! mid-dispatch, with a final best-effort state flush.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::detector;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::template::MessageTemplate;
use crate::traits::{Connector, PostOutcome, SnapshotSource, StateStore, Watermark};

/// Events emitted by the engine for external observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine finished initializing
    Started {
        /// Number of connectors in the active dispatch set
        connectors: usize,
    },

    /// First run: watermark seeded from the full snapshot, zero dispatches
    BaselineEstablished {
        /// Number of repositories now tracked
        tracked: usize,
    },

    /// A newly starred repository was detected
    NewStarDetected {
        /// Repository key
        full_name: String,
    },

    /// A connector accepted the message
    PostDelivered {
        connector: &'static str,
        full_name: String,
    },

    /// A connector failed to deliver the message
    PostFailed {
        connector: &'static str,
        full_name: String,
    },

    /// The cycle was skipped (transient fetch failure or empty snapshot)
    CycleSkipped {
        reason: String,
    },

    /// Engine stopped
    Stopped {
        reason: String,
    },
}

/// The detect → dispatch → persist engine.
///
/// Owns the snapshot source, the active connector set, the state store,
/// and the in-memory watermark. The watermark is mutated only between
/// cycles; dispatch reads it indirectly through the change set, so there
/// are no concurrent writers by construction.
pub struct StarwatchEngine {
    /// Snapshot source for the starred listing
    source: Box<dyn SnapshotSource>,

    /// Connector candidates before activation, the active set after
    connectors: Vec<Box<dyn Connector>>,

    /// Watermark persistence
    state_store: Box<dyn StateStore>,

    /// Message building and fan-out
    dispatcher: Dispatcher,

    /// The authoritative in-memory watermark
    watermark: Watermark,

    /// Sleep between cycles
    check_interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl StarwatchEngine {
    /// Create a new engine.
    ///
    /// Connectors are passed uninitialized; [`StarwatchEngine::run`] (via
    /// initialization) decides which of them make it into the active
    /// dispatch set.
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields
    /// engine events.
    pub fn new(
        source: Box<dyn SnapshotSource>,
        connectors: Vec<Box<dyn Connector>>,
        state_store: Box<dyn StateStore>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            source,
            connectors,
            state_store,
            dispatcher: Dispatcher::new(MessageTemplate::new(config.message_template)),
            watermark: Watermark::empty(),
            check_interval: Duration::from_secs(config.check_interval_secs),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// The current in-memory watermark.
    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// Number of connectors in the active dispatch set.
    ///
    /// Before initialization this counts the candidates instead.
    pub fn connector_count(&self) -> usize {
        self.connectors.len()
    }

    /// Initialize the engine: verify the source, load or baseline the
    /// watermark, and activate connectors.
    ///
    /// # Errors
    ///
    /// The only fatal condition: the first snapshot fetch fails, which at
    /// startup means unreachable or unauthenticated source credentials.
    pub async fn initialize(&mut self) -> Result<()> {
        let snapshot = self
            .source
            .current_items()
            .await
            .map_err(|e| Error::source(format!("startup snapshot fetch failed: {}", e)))?;

        info!(
            source = %self.source.describe(),
            items = snapshot.len(),
            "snapshot source reachable"
        );

        self.watermark = match self.state_store.load().await {
            Ok(watermark) => watermark,
            Err(e) => {
                warn!(error = %e, "could not load state, starting with empty watermark");
                Watermark::empty()
            }
        };

        if self.watermark.is_empty() {
            // Baseline run: seed tracking from the current snapshot so
            // existing stars are never posted.
            let keys: BTreeSet<String> =
                snapshot.iter().map(|r| r.full_name.clone()).collect();
            let tracked = keys.len();
            self.watermark.replace(keys);

            if let Err(e) = self.state_store.save(&self.watermark).await {
                warn!(error = %e, "failed to persist baseline watermark");
            }

            info!(tracked, "baseline established; existing stars will not be posted");
            self.emit_event(EngineEvent::BaselineEstablished { tracked });
        } else {
            info!(tracked = self.watermark.len(), "loaded watermark");
        }

        self.activate_connectors().await;

        Ok(())
    }

    /// Initialize and connection-test every candidate connector.
    ///
    /// Failures are logged and the connector is simply absent from the
    /// active set; there is no re-initialization later.
    async fn activate_connectors(&mut self) {
        let candidates = std::mem::take(&mut self.connectors);
        let mut active = Vec::with_capacity(candidates.len());

        for mut connector in candidates {
            let name = connector.name();

            if let Err(e) = connector.initialize().await {
                error!(connector = name, error = %e, "initialization failed, excluding from dispatch");
                continue;
            }

            if let Err(e) = connector.test_connection().await {
                error!(connector = name, error = %e, "connection test failed, excluding from dispatch");
                continue;
            }

            info!(connector = name, "connector ready");
            active.push(connector);
        }

        if active.is_empty() {
            warn!("no connectors ready; new stars will be tracked but not posted");
        } else {
            info!(connectors = active.len(), "active dispatch set established");
        }

        self.connectors = active;
    }

    /// Execute exactly one detect → dispatch → persist cycle.
    ///
    /// Never fatal: fetch failures skip the cycle, persistence failures
    /// leave the in-memory watermark authoritative.
    pub async fn run_once(&mut self) {
        let snapshot = match self.source.current_items().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "snapshot fetch failed, skipping cycle");
                self.emit_event(EngineEvent::CycleSkipped {
                    reason: e.to_string(),
                });
                return;
            }
        };

        if snapshot.is_empty() && !self.watermark.is_empty() {
            // A transient empty listing must not be mistaken for mass
            // un-starring; keep tracking what we have.
            warn!("snapshot came back empty, keeping existing watermark");
            self.emit_event(EngineEvent::CycleSkipped {
                reason: "empty snapshot".to_string(),
            });
            return;
        }

        let changes = detector::detect(&self.watermark.starred, &snapshot);

        if !changes.is_empty() {
            info!(count = changes.new_items.len(), "new starred repositories detected");

            for repo in &changes.new_items {
                info!(repo = %repo.full_name, "new star detected");
                self.emit_event(EngineEvent::NewStarDetected {
                    full_name: repo.full_name.clone(),
                });

                let outcomes = self.dispatcher.dispatch(&self.connectors, repo).await;
                for record in outcomes {
                    match record.outcome {
                        PostOutcome::Delivered => self.emit_event(EngineEvent::PostDelivered {
                            connector: record.connector,
                            full_name: repo.full_name.clone(),
                        }),
                        PostOutcome::Failed => self.emit_event(EngineEvent::PostFailed {
                            connector: record.connector,
                            full_name: repo.full_name.clone(),
                        }),
                        PostOutcome::Skipped => {}
                    }
                }
            }
        }

        if changes.next_watermark != self.watermark.starred {
            self.watermark.replace(changes.next_watermark);
            if let Err(e) = self.state_store.save(&self.watermark).await {
                warn!(
                    error = %e,
                    "failed to persist watermark; in-memory state remains authoritative"
                );
            }
        } else {
            debug!("no changes this cycle");
        }
    }

    /// Run the engine until a shutdown signal is received.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: Fatal initialization error
    pub async fn run(&mut self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the engine with a controlled shutdown signal instead of OS
    /// signals. Used by tests; production code should use `run()`.
    pub async fn run_with_shutdown(
        &mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &mut self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.initialize().await?;

        self.emit_event(EngineEvent::Started {
            connectors: self.connectors.len(),
        });
        info!(
            interval_secs = self.check_interval.as_secs(),
            "watching for new stars"
        );

        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        if let Some(mut rx) = shutdown_rx {
            // Test mode: wait for the provided shutdown signal
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = &mut rx => {
                        info!("shutdown signal received");
                        self.emit_event(EngineEvent::Stopped {
                            reason: "shutdown signal".to_string(),
                        });
                        break;
                    }
                }
            }
        } else {
            // Production mode: wait for SIGINT/SIGTERM
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown_signal() => {
                        info!("shutdown signal received");
                        self.emit_event(EngineEvent::Stopped {
                            reason: "shutdown signal".to_string(),
                        });
                        break;
                    }
                }
            }
        }

        // Final best-effort flush before exiting
        if let Err(e) = self.state_store.save(&self.watermark).await {
            warn!(error = %e, "failed to persist watermark during shutdown");
        }
        info!("engine stopped");

        Ok(())
    }

    /// Emit an engine event, dropping it with a warning if nothing keeps
    /// up with the channel.
    fn emit_event(&self, event: EngineEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("event channel full or closed, dropping engine event");
        }
    }
}

/// Resolve when SIGTERM or SIGINT is delivered.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

/// Resolve when ctrl-c is delivered (non-Unix fallback).
#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
