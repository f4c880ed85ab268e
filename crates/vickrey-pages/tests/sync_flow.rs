// End-to-end synchronizer behavior over a real (in-memory) store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;

use vickrey_core::config::SyncConfig;
use vickrey_core::draft::DraftSnapshot;
use vickrey_core::page::PageDocument;
use vickrey_core::paths;
use vickrey_core::store::{
    resource_name, ChangeEvent, ChangeKind, DocumentStore, DocumentStoreExt, Fields,
    Precondition, SqliteStore,
};
use vickrey_pages::{run_sync_worker, SyncError, SyncOutcome, Synchronizer, SYNC_CONSUMER};

fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory("test-vickrey").unwrap())
}

fn fields(value: serde_json::Value) -> Fields {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

fn put_draft(store: &SqliteStore, draft_id: &str, value: serde_json::Value) -> u64 {
    store
        .set(&paths::draft(draft_id).unwrap(), fields(value), Precondition::None)
        .unwrap()
        .version
}

fn page(store: &SqliteStore, draft_id: &str, key: &str) -> Option<PageDocument> {
    store
        .get_as::<PageDocument>(&paths::page(draft_id, key).unwrap())
        .unwrap()
        .map(|(page, _)| page)
}

fn event(kind: ChangeKind, draft_id: &str) -> ChangeEvent {
    ChangeEvent {
        seq: 1,
        kind,
        resource: resource_name("test-vickrey", &paths::draft(draft_id).unwrap()),
        version: 1,
        time: chrono::Utc::now(),
    }
}

fn minimal_draft() -> serde_json::Value {
    json!({
        "league_id": "L1",
        "users": [{"display_name": "A"}],
        "players": [{"full_name": "QB One", "search_rank": 5, "fantasy_positions": ["QB"]}]
    })
}

#[test]
fn minimal_snapshot_produces_public_and_team_page() {
    let store = store();
    put_draft(&store, "d1", minimal_draft());
    let sync = Synchronizer::new(store.clone());

    let outcome = sync.handle_change(&event(ChangeKind::Created, "d1")).unwrap();
    let SyncOutcome::Synced(report) = outcome else {
        panic!("expected a sync, got {outcome:?}");
    };
    assert_eq!(report.draft_id, "d1");
    assert_eq!(report.written, 2);
    assert_eq!(report.skipped_stale, 0);

    let public = page(&store, "d1", "public").unwrap();
    assert!(public.html.contains("A"));
    assert!(public.html.contains("QB One"));

    let pages = store.list(&paths::pages_collection("d1")).unwrap();
    let keys: Vec<&str> = pages.iter().map(|d| d.path.id()).collect();
    assert_eq!(keys, vec!["A", "public"]);

    let team = page(&store, "d1", "A").unwrap();
    assert!(team.html.contains("<p>Users: A</p>"));
    assert!(team.html.contains("<p>Players: QB One</p>"));
    assert_eq!(team.source_version, 1);
}

#[test]
fn second_pass_on_unchanged_draft_is_identical() {
    let store = store();
    put_draft(&store, "d1", minimal_draft());
    let sync = Synchronizer::new(store.clone());

    sync.sync_draft("d1").unwrap();
    let first = (page(&store, "d1", "public"), page(&store, "d1", "A"));
    sync.sync_draft("d1").unwrap();
    let second = (page(&store, "d1", "public"), page(&store, "d1", "A"));
    assert_eq!(first, second);
}

#[test]
fn update_rerenders_pages() {
    let store = store();
    put_draft(&store, "d1", minimal_draft());
    let sync = Synchronizer::new(store.clone());
    sync.sync_draft("d1").unwrap();

    let version = put_draft(
        &store,
        "d1",
        json!({
            "league_id": "L1",
            "users": [{"display_name": "A", "current_budget": 60}, {"display_name": "B"}],
            "players": []
        }),
    );
    sync.handle_change(&event(ChangeKind::Updated, "d1")).unwrap();

    let team_a = page(&store, "d1", "A").unwrap();
    assert!(team_a.html.contains("<p>Budget: $60</p>"));
    assert!(!team_a.html.contains("QB One"));
    assert_eq!(team_a.source_version, version);
    assert!(page(&store, "d1", "B").is_some());
}

#[test]
fn delete_leaves_pages_alone() {
    let store = store();
    put_draft(&store, "d1", minimal_draft());
    let sync = Synchronizer::new(store.clone());
    sync.sync_draft("d1").unwrap();
    let before = store.list(&paths::pages_collection("d1")).unwrap();

    store.delete(&paths::draft("d1").unwrap()).unwrap();
    let outcome = sync.handle_change(&event(ChangeKind::Deleted, "d1")).unwrap();
    assert_eq!(outcome, SyncOutcome::Ignored);
    assert_eq!(store.list(&paths::pages_collection("d1")).unwrap(), before);
}

#[test]
fn reserved_participant_name_fails_before_any_write() {
    let store = store();
    put_draft(
        &store,
        "d1",
        json!({"league_id": "L1", "users": [{"display_name": "A"}, {"display_name": "public"}]}),
    );
    let sync = Synchronizer::new(store.clone());

    match sync.sync_draft("d1") {
        Err(SyncError::Write { page_key, .. }) => assert_eq!(page_key, "public"),
        other => panic!("expected write error, got {other:?}"),
    }
    assert!(store.list(&paths::pages_collection("d1")).unwrap().is_empty());
}

#[test]
fn duplicate_participant_names_fail_before_any_write() {
    let store = store();
    put_draft(
        &store,
        "d1",
        json!({"league_id": "L1", "users": [{"display_name": "A"}, {"display_name": "A"}]}),
    );

    match Synchronizer::new(store.clone()).sync_draft("d1") {
        Err(SyncError::Write { page_key, .. }) => assert_eq!(page_key, "A"),
        other => panic!("expected write error, got {other:?}"),
    }
    assert!(store.list(&paths::pages_collection("d1")).unwrap().is_empty());
}

#[test]
fn stale_pass_does_not_overwrite_newer_pages() {
    let store = store();
    put_draft(&store, "d1", minimal_draft());
    let sync = Synchronizer::new(store.clone());

    // A newer pass already landed.
    let newer = PageDocument {
        html: "<p>from v9</p>".into(),
        source_version: 9,
    };
    store
        .set_from(&paths::page("d1", "public").unwrap(), &newer, Precondition::None)
        .unwrap();

    let report = sync.sync_draft("d1").unwrap();
    assert_eq!(report.written, 1);
    assert_eq!(report.skipped_stale, 1);
    assert_eq!(page(&store, "d1", "public").unwrap(), newer);
}

#[test]
fn drafts_with_null_lists_still_render() {
    let store = store();
    put_draft(&store, "d1", json!({"league_id": "L1", "users": null, "players": null}));
    let report = Synchronizer::new(store.clone()).sync_draft("d1").unwrap();
    assert_eq!(report.written, 1);
    let snapshot: DraftSnapshot = store
        .get_as(&paths::draft("d1").unwrap())
        .unwrap()
        .map(|(s, _)| s)
        .unwrap();
    assert!(snapshot.users.is_empty());
}

fn worker_config() -> SyncConfig {
    SyncConfig {
        poll_interval_ms: 10,
        batch_size: 10,
    }
}

/// Run the worker in the background; send on the returned channel to stop it.
fn spawn_worker(
    store: &Arc<SqliteStore>,
) -> (
    oneshot::Sender<()>,
    tokio::task::JoinHandle<Result<(), vickrey_core::store::StoreError>>,
) {
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let store: Arc<dyn DocumentStore> = store.clone();
    let worker = tokio::spawn(async move {
        run_sync_worker(store, &worker_config(), async {
            let _ = stop_rx.await;
        })
        .await
    });
    (stop_tx, worker)
}

async fn wait_for(mut ready: impl FnMut() -> bool, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !ready() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn worker_follows_new_drafts_until_shutdown() {
    let store = store();
    let (stop_tx, worker) = spawn_worker(&store);

    tokio::time::sleep(Duration::from_millis(50)).await;
    put_draft(&store, "d1", minimal_draft());

    wait_for(|| page(&store, "d1", "A").is_some(), "team page").await;
    assert!(page(&store, "d1", "public").is_some());

    stop_tx.send(()).unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn worker_picks_up_drafts_seeded_before_it_started() {
    let store = store();
    store
        .create_from(
            &paths::draft("d1").unwrap(),
            &serde_json::from_value::<DraftSnapshot>(minimal_draft()).unwrap(),
        )
        .unwrap();

    let (stop_tx, worker) = spawn_worker(&store);
    // The team page is written after the public one.
    wait_for(|| page(&store, "d1", "A").is_some(), "team page").await;
    assert!(page(&store, "d1", "public").is_some());

    stop_tx.send(()).unwrap();
    worker.await.unwrap().unwrap();
    assert!(store.load_cursor(SYNC_CONSUMER).unwrap().is_some());
}

#[tokio::test]
async fn restarted_worker_handles_changes_made_while_down() {
    let store = store();
    put_draft(&store, "d1", minimal_draft());

    let (stop_tx, worker) = spawn_worker(&store);
    wait_for(|| page(&store, "d1", "A").is_some(), "first pass").await;
    stop_tx.send(()).unwrap();
    worker.await.unwrap().unwrap();

    let version = put_draft(
        &store,
        "d1",
        json!({"league_id": "L1", "users": [{"display_name": "A", "current_budget": 42}]}),
    );

    let (stop_tx, worker) = spawn_worker(&store);
    wait_for(
        || page(&store, "d1", "A").is_some_and(|p| p.source_version == version),
        "update made while stopped",
    )
    .await;
    assert!(page(&store, "d1", "A").unwrap().html.contains("<p>Budget: $42</p>"));

    stop_tx.send(()).unwrap();
    worker.await.unwrap().unwrap();
}

#[tokio::test]
async fn worker_compacts_the_change_log_behind_it() {
    let store = store();
    put_draft(&store, "d1", minimal_draft());

    assert_eq!(store.changes_since(paths::DRAFTS, 0, 10).unwrap().len(), 1);

    let (stop_tx, worker) = spawn_worker(&store);
    wait_for(
        || store.changes_since(paths::DRAFTS, 0, 10).unwrap().is_empty(),
        "handled change to be compacted",
    )
    .await;
    stop_tx.send(()).unwrap();
    worker.await.unwrap().unwrap();

    let cursor = store.load_cursor(SYNC_CONSUMER).unwrap().unwrap();
    assert!(page(&store, "d1", "public").is_some());
    assert!(store.changes_since("drafts/d1/pages", 0, 10).unwrap().iter().all(|c| c.seq > cursor));
}
