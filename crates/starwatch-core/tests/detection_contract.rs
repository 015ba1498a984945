//! Detection and watermark-advancement behavior across cycles

mod common;

use common::{ScriptedSource, RecordingConnector, make_engine, repo};
use starwatch_core::traits::Connector;

#[tokio::test]
async fn new_star_is_dispatched_and_watermark_replaced() {
    let source = ScriptedSource::new(vec![
        Ok(vec![repo("a/repo1")]),                   // startup fetch (baseline)
        Ok(vec![repo("a/repo1"), repo("b/repo2")]),  // first cycle
    ]);
    let connector = RecordingConnector::new("recorder");
    let posts = connector.posts_handle();

    let (mut engine, _events, store) =
        make_engine(source, vec![Box::new(connector) as Box<dyn Connector>]);

    engine.initialize().await.unwrap();
    engine.run_once().await;

    assert_eq!(*posts.lock().unwrap(), vec!["b/repo2".to_string()]);

    let persisted = store.current().await.unwrap();
    assert!(persisted.contains("a/repo1"));
    assert!(persisted.contains("b/repo2"));
    assert_eq!(persisted.len(), 2);
}

#[tokio::test]
async fn unstarred_repo_is_dropped_without_events() {
    let source = ScriptedSource::new(vec![
        Ok(vec![repo("a/one"), repo("a/two")]), // baseline
        Ok(vec![repo("a/one")]),                // a/two was un-starred
    ]);
    let connector = RecordingConnector::new("recorder");
    let posts = connector.posts_handle();

    let (mut engine, _events, store) =
        make_engine(source, vec![Box::new(connector) as Box<dyn Connector>]);

    engine.initialize().await.unwrap();
    engine.run_once().await;

    // No un-star events, and the key is gone from tracking
    assert!(posts.lock().unwrap().is_empty());
    let persisted = store.current().await.unwrap();
    assert!(!persisted.contains("a/two"));
    assert_eq!(persisted.len(), 1);

    // Re-starring it later makes it "new" again
}

#[tokio::test]
async fn empty_snapshot_never_clears_the_watermark() {
    let source = ScriptedSource::new(vec![
        Ok(vec![repo("a/one")]), // baseline
        Ok(vec![]),              // transient empty listing
    ]);
    let connector = RecordingConnector::new("recorder");
    let posts = connector.posts_handle();

    let (mut engine, _events, store) =
        make_engine(source, vec![Box::new(connector) as Box<dyn Connector>]);

    engine.initialize().await.unwrap();
    engine.run_once().await;

    assert!(posts.lock().unwrap().is_empty());
    assert!(store.current().await.unwrap().contains("a/one"));
    assert!(engine.watermark().contains("a/one"));
}

#[tokio::test]
async fn transient_fetch_failure_skips_the_cycle() {
    let source = ScriptedSource::new(vec![
        Ok(vec![repo("a/one")]),                          // baseline
        Err(starwatch_core::Error::http("502 upstream")), // transient failure
        Ok(vec![repo("a/one"), repo("b/two")]),           // recovery
    ]);
    let connector = RecordingConnector::new("recorder");
    let posts = connector.posts_handle();

    let (mut engine, _events, store) =
        make_engine(source, vec![Box::new(connector) as Box<dyn Connector>]);

    engine.initialize().await.unwrap();

    engine.run_once().await; // failed fetch: skipped, nothing changes
    assert!(posts.lock().unwrap().is_empty());
    assert_eq!(store.current().await.unwrap().len(), 1);

    engine.run_once().await; // recovered: new star flows through
    assert_eq!(*posts.lock().unwrap(), vec!["b/two".to_string()]);
    assert_eq!(store.current().await.unwrap().len(), 2);
}

#[tokio::test]
async fn restarred_repo_is_new_again_after_removal() {
    let source = ScriptedSource::new(vec![
        Ok(vec![repo("a/one"), repo("a/two")]), // baseline
        Ok(vec![repo("a/one")]),                // un-starred
        Ok(vec![repo("a/one"), repo("a/two")]), // starred again
    ]);
    let connector = RecordingConnector::new("recorder");
    let posts = connector.posts_handle();

    let (mut engine, _events, _store) =
        make_engine(source, vec![Box::new(connector) as Box<dyn Connector>]);

    engine.initialize().await.unwrap();
    engine.run_once().await;
    engine.run_once().await;

    assert_eq!(*posts.lock().unwrap(), vec!["a/two".to_string()]);
}
