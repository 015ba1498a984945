//! Test doubles and common utilities for engine contract tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use starwatch_core::error::{Error, Result};
use starwatch_core::traits::{Connector, Envelope, Repo, SnapshotSource};
use starwatch_core::{EngineConfig, EngineEvent, MemoryStateStore, StarwatchEngine};
use tokio::sync::mpsc;

/// Build a repo fixture for a key.
pub fn repo(key: &str) -> Repo {
    let mut repo = Repo::new(key, format!("https://github.com/{key}"));
    repo.description = Some(format!("description of {key}"));
    repo.language = Some("Rust".to_string());
    repo.stargazers_count = 42;
    repo
}

/// A snapshot source that replays a scripted sequence of responses.
///
/// Once the script is exhausted, the last successful snapshot repeats
/// forever (matching a stable upstream).
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<Repo>>>>,
    last_ok: Mutex<Vec<Repo>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<Repo>>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last_ok: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn current_items(&self) -> Result<Vec<Repo>> {
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(snapshot)) => {
                *self.last_ok.lock().unwrap() = snapshot.clone();
                Ok(snapshot)
            }
            Some(Err(e)) => Err(e),
            None => Ok(self.last_ok.lock().unwrap().clone()),
        }
    }

    fn describe(&self) -> String {
        "scripted test source".to_string()
    }
}

/// A connector that records every post and can be told to fail at any
/// lifecycle stage.
pub struct RecordingConnector {
    name: &'static str,
    fail_init: bool,
    fail_test: bool,
    fail_post: bool,
    initialized: AtomicBool,
    posts: Arc<Mutex<Vec<String>>>,
}

impl RecordingConnector {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fail_init: false,
            fail_test: false,
            fail_post: false,
            initialized: AtomicBool::new(false),
            posts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    pub fn failing_test(mut self) -> Self {
        self.fail_test = true;
        self
    }

    pub fn failing_post(mut self) -> Self {
        self.fail_post = true;
        self
    }

    /// Shared view of the posted repo keys; survives moving the connector
    /// into the engine.
    pub fn posts_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.posts)
    }
}

#[async_trait]
impl Connector for RecordingConnector {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn initialize(&mut self) -> Result<()> {
        if self.fail_init {
            return Err(Error::connector(self.name, "scripted init failure"));
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn test_connection(&self) -> Result<()> {
        if self.fail_test {
            return Err(Error::connector(self.name, "scripted test failure"));
        }
        Ok(())
    }

    async fn post(&self, envelope: &mut Envelope) -> Result<()> {
        self.posts
            .lock()
            .unwrap()
            .push(envelope.repo.full_name.clone());

        if self.fail_post {
            return Err(Error::connector(self.name, "scripted post failure"));
        }

        envelope
            .handles
            .insert(self.name.to_string(), format!("msg-{}", envelope.repo.full_name));
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

/// Wire an engine from a scripted source, connectors, and a fresh memory
/// store with a short test interval. Returns the store view alongside so
/// tests can inspect what got persisted.
pub fn make_engine(
    source: ScriptedSource,
    connectors: Vec<Box<dyn Connector>>,
) -> (
    StarwatchEngine,
    mpsc::Receiver<EngineEvent>,
    MemoryStateStore,
) {
    let store = MemoryStateStore::new();
    let store_view = store.clone();

    let config = EngineConfig {
        check_interval_secs: 1,
        ..EngineConfig::default()
    };

    let (engine, events) = StarwatchEngine::new(
        Box::new(source),
        connectors,
        Box::new(store),
        config,
    )
    .expect("engine config is valid");

    (engine, events, store_view)
}

/// Drain everything currently buffered on the event channel.
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
