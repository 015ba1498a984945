//! Baseline and idempotency behavior of the engine
//!
//! First run with no persisted watermark: the engine seeds tracking from
//! the full current snapshot and dispatches nothing. Subsequent cycles
//! with an unchanged snapshot also dispatch nothing.

mod common;

use common::{ScriptedSource, RecordingConnector, drain_events, make_engine, repo};
use starwatch_core::EngineEvent;
use starwatch_core::traits::Connector;

#[tokio::test]
async fn baseline_seeds_watermark_without_dispatch() {
    let source = ScriptedSource::new(vec![Ok(vec![repo("a/one"), repo("b/two")])]);
    let connector = RecordingConnector::new("recorder");
    let posts = connector.posts_handle();

    let (mut engine, mut events, store) =
        make_engine(source, vec![Box::new(connector) as Box<dyn Connector>]);

    engine.initialize().await.unwrap();

    // Nothing posted, everything tracked
    assert!(posts.lock().unwrap().is_empty());
    let persisted = store.current().await.expect("baseline was persisted");
    assert!(persisted.contains("a/one"));
    assert!(persisted.contains("b/two"));
    assert_eq!(persisted.len(), 2);

    let events = drain_events(&mut events);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, EngineEvent::BaselineEstablished { tracked: 2 })),
        "expected a baseline event, got {events:?}"
    );
}

#[tokio::test]
async fn unchanged_snapshot_dispatches_nothing() {
    // Script exhausts after the first fetch; the source then repeats the
    // same snapshot forever.
    let source = ScriptedSource::new(vec![Ok(vec![repo("a/one")])]);
    let connector = RecordingConnector::new("recorder");
    let posts = connector.posts_handle();

    let (mut engine, _events, store) =
        make_engine(source, vec![Box::new(connector) as Box<dyn Connector>]);

    engine.initialize().await.unwrap();
    engine.run_once().await;
    engine.run_once().await;

    assert!(posts.lock().unwrap().is_empty());
    assert_eq!(store.current().await.unwrap().len(), 1);
}

#[tokio::test]
async fn startup_fetch_failure_is_fatal() {
    let source = ScriptedSource::new(vec![Err(starwatch_core::Error::auth("bad token"))]);
    let (mut engine, _events, _store) = make_engine(source, Vec::new());

    assert!(engine.initialize().await.is_err());
}
