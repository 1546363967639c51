/*!
 * Sync engine integration tests
 *
 * Full scans and handler-driven reloads against a real SQLite store and an
 * in-memory command catalog.
 */

mod test_utils;

use std::collections::BTreeSet;
use std::sync::Arc;

use command_sync::file_watcher::ReloadHandler;
use command_sync::remote::{Partition, PartitionOutcome, Reconciler};
use command_sync::storage::SyncStore;
use command_sync::{SyncEngine, SyncEvent};

use test_utils::catalog::{CatalogCall, RecordingCatalog};
use test_utils::fixtures::{CommandTree, SwitchableStore};
use test_utils::helpers::drain_events;

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

async fn scanned_tree() -> (CommandTree, Arc<RecordingCatalog>, Arc<SyncEngine>) {
    let tree = CommandTree::new();
    tree.write_command("foo.toml", "foo", &["f"], "global");
    tree.write_command("admin/bar.toml", "bar", &[], "restricted");

    let catalog = Arc::new(RecordingCatalog::new());
    let engine = tree.engine(Arc::clone(&catalog)).await;
    let report = engine.full_scan().await;
    assert_eq!(report.loaded, 2);
    assert!(report.failed.is_empty());
    (tree, catalog, engine)
}

#[tokio::test]
async fn test_full_scan_registers_and_reconciles_both_partitions() {
    let (_tree, catalog, engine) = scanned_tree().await;

    assert_eq!(engine.registry().names(), set(&["bar", "f", "foo"]));
    assert_eq!(engine.registry().owner_of("f").as_deref(), Some("foo"));

    assert_eq!(catalog.names(Partition::Global), names(&["f", "foo"]));
    assert_eq!(catalog.names(Partition::Restricted), names(&["bar"]));

    let schema = catalog.schema(Partition::Global, "f").unwrap();
    assert_eq!(schema["name"], "f");
    assert_eq!(schema["description"], "The foo command");
}

#[tokio::test]
async fn test_second_scan_is_idempotent() {
    let (_tree, catalog, engine) = scanned_tree().await;
    let before_global = catalog.names(Partition::Global);

    let report = engine.full_scan().await;
    assert_eq!(report.loaded, 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(report.retired, 0);
    assert_eq!(report.pruned_aliases, 0);
    assert!(report.reconcile.unwrap().is_success());

    assert_eq!(engine.registry().names(), set(&["bar", "f", "foo"]));
    assert_eq!(catalog.names(Partition::Global), before_global);
}

#[tokio::test]
async fn test_alias_swap_replaces_old_alias_everywhere() {
    let (tree, catalog, engine) = scanned_tree().await;

    tree.write_command("foo.toml", "foo", &["g"], "global");
    let report = engine.full_scan().await;
    assert_eq!(report.loaded, 1);
    assert_eq!(report.unchanged, 1);

    assert!(!engine.registry().has("f"));
    assert_eq!(engine.registry().owner_of("g").as_deref(), Some("foo"));

    let desired = Reconciler::desired_state(engine.registry());
    assert_eq!(
        desired.global.keys().cloned().collect::<Vec<_>>(),
        names(&["foo", "g"])
    );

    let store = tree.open_store().await;
    assert_eq!(store.get_aliases("foo").await.unwrap(), set(&["g"]));
    assert_eq!(catalog.names(Partition::Global), names(&["foo", "g"]));
}

#[tokio::test]
async fn test_removed_file_is_retired_on_rescan() {
    let (tree, catalog, engine) = scanned_tree().await;

    tree.remove("foo.toml");
    let report = engine.full_scan().await;
    assert_eq!(report.retired, 1);

    assert!(!engine.registry().has("foo"));
    assert!(!engine.registry().has("f"));
    assert_eq!(catalog.names(Partition::Global), Vec::<String>::new());
    assert_eq!(catalog.names(Partition::Restricted), names(&["bar"]));

    let store = tree.open_store().await;
    assert!(store.get_hash(&tree.path("foo.toml")).await.unwrap().is_none());
    assert!(store.get_aliases("foo").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_file_deleted_while_offline_is_retired_after_restart() {
    let tree = CommandTree::new();
    tree.write_command("foo.toml", "foo", &["f"], "global");
    tree.write_command("baz.toml", "baz", &[], "global");

    {
        let catalog = Arc::new(RecordingCatalog::new());
        let engine = tree.engine(catalog).await;
        engine.full_scan().await;
    }

    tree.remove("foo.toml");

    let catalog = Arc::new(RecordingCatalog::new());
    catalog.seed(Partition::Global, &["baz", "f", "foo"]);
    let engine = tree.engine(Arc::clone(&catalog)).await;
    let report = engine.full_scan().await;

    assert_eq!(report.retired, 1);
    assert_eq!(engine.registry().names(), set(&["baz"]));
    assert_eq!(catalog.names(Partition::Global), names(&["baz"]));

    let store = tree.open_store().await;
    let hashes = store.list_all_hashes().await.unwrap();
    assert_eq!(hashes.len(), 1);
    assert!(hashes.contains_key(&tree.path("baz.toml")));
    assert!(store.list_all_aliases().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_file_is_reported_and_others_still_load() {
    let tree = CommandTree::new();
    tree.write_command("good.toml", "good", &[], "global");
    tree.write_raw("broken.toml", "name = \"broken\"\n");

    let catalog = Arc::new(RecordingCatalog::new());
    let engine = tree.engine(Arc::clone(&catalog)).await;
    let mut events = engine.subscribe();

    let report = engine.full_scan().await;
    assert_eq!(report.loaded, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, tree.path("broken.toml"));
    assert_eq!(engine.registry().names(), set(&["good"]));

    let events = drain_events(&mut events);
    assert!(events.iter().any(|event| matches!(
        event,
        SyncEvent::FileRejected { kind: "validation", path, .. } if *path == tree.path("broken.toml")
    )));
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::ReconcileCompleted { .. })));
}

#[tokio::test]
async fn test_bad_edit_keeps_previous_definition() {
    let (tree, _catalog, engine) = scanned_tree().await;

    tree.write_raw("foo.toml", "name = \"foo\"\nscope = [\n");
    let error = engine.reload(&tree.path("foo.toml")).await.unwrap_err();
    assert_eq!(error.kind(), "validation");

    let entry = engine.registry().get("foo").unwrap();
    assert_eq!(entry.descriptor.aliases, names(&["f"]));
    assert!(engine.registry().has("f"));
}

#[tokio::test]
async fn test_restricted_failure_does_not_block_global() {
    let tree = CommandTree::new();
    tree.write_command("foo.toml", "foo", &["f"], "global");
    tree.write_command("bar.toml", "bar", &[], "restricted");

    let catalog = Arc::new(RecordingCatalog::new());
    catalog.fail_partition(Partition::Restricted);
    let engine = tree.engine(Arc::clone(&catalog)).await;
    let mut events = engine.subscribe();

    let report = engine.full_scan().await;
    let reconcile = report.reconcile.unwrap();
    assert!(reconcile.restricted.is_failed());
    assert!(!reconcile.global.is_failed());
    assert!(!reconcile.is_success());

    assert_eq!(catalog.names(Partition::Global), names(&["f", "foo"]));
    assert_eq!(engine.registry().names(), set(&["bar", "f", "foo"]));

    let failed: Vec<Partition> = drain_events(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            SyncEvent::PartitionFailed { partition, .. } => Some(partition),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![Partition::Restricted]);

    // next pass converges once the partition recovers
    catalog.heal_partition(Partition::Restricted);
    let reconcile = engine.reconcile().await;
    assert!(reconcile.is_success());
    assert_eq!(catalog.names(Partition::Restricted), names(&["bar"]));
}

#[tokio::test]
async fn test_stale_remote_commands_are_deleted() {
    let tree = CommandTree::new();
    tree.write_command("foo.toml", "foo", &[], "global");

    let catalog = Arc::new(RecordingCatalog::new());
    catalog.seed(Partition::Global, &["foo", "legacy"]);
    catalog.seed(Partition::Restricted, &["old-admin"]);
    let engine = tree.engine(Arc::clone(&catalog)).await;

    let report = engine.full_scan().await;
    match report.reconcile.unwrap().global {
        PartitionOutcome::Synced { deleted, .. } => assert_eq!(deleted, 1),
        other => panic!("unexpected outcome: {:?}", other),
    }

    assert_eq!(catalog.names(Partition::Global), names(&["foo"]));
    assert!(catalog.names(Partition::Restricted).is_empty());
    assert!(catalog
        .calls()
        .contains(&CatalogCall::Delete(Partition::Global, "legacy".to_string())));
    // nothing desired in the restricted partition: delete without a bulk replace
    assert_eq!(catalog.replace_count(Partition::Restricted), 0);
}

#[tokio::test]
async fn test_scope_change_moves_command_between_partitions() {
    let (tree, catalog, engine) = scanned_tree().await;

    tree.write_command("foo.toml", "foo", &["f"], "restricted");
    engine.full_scan().await;

    assert!(catalog.names(Partition::Global).is_empty());
    assert_eq!(
        catalog.names(Partition::Restricted),
        names(&["bar", "f", "foo"])
    );
}

#[tokio::test]
async fn test_colliding_names_first_claimant_wins() {
    let tree = CommandTree::new();
    // sorted discovery order: a-first.toml loads before b-second.toml
    tree.write_command("a-first.toml", "first", &["shared"], "global");
    tree.write_command("b-second.toml", "second", &["shared", "own"], "global");
    tree.write_command("c-dupe.toml", "first", &[], "global");

    let catalog = Arc::new(RecordingCatalog::new());
    let engine = tree.engine(Arc::clone(&catalog)).await;
    let report = engine.full_scan().await;

    assert_eq!(report.loaded, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, tree.path("c-dupe.toml"));

    let registry = engine.registry();
    assert_eq!(registry.owner_of("shared").as_deref(), Some("first"));
    assert_eq!(registry.owner_of("own").as_deref(), Some("second"));
    assert_eq!(registry.aliases_of("second"), set(&["own"]));

    let store = tree.open_store().await;
    assert_eq!(store.get_aliases("second").await.unwrap(), set(&["own"]));
    assert_eq!(
        catalog.names(Partition::Global),
        names(&["first", "own", "second", "shared"])
    );
}

#[tokio::test]
async fn test_shadowed_primary_takes_over_when_owner_is_retired() {
    let tree = CommandTree::new();
    let first = tree.write_command("a-first.toml", "foo", &[], "global");
    let second = tree.write_command("b-second.toml", "foo", &["fo"], "restricted");

    let catalog = Arc::new(RecordingCatalog::new());
    let engine = tree.engine(Arc::clone(&catalog)).await;
    let report = engine.full_scan().await;
    assert_eq!(report.loaded, 1);
    assert_eq!(report.failed.len(), 1);

    tree.remove("a-first.toml");
    engine.retire(&first).await.unwrap();

    let entry = engine.registry().get("foo").unwrap();
    assert_eq!(entry.descriptor.source_path, second);
    assert_eq!(engine.registry().owner_of("fo").as_deref(), Some("foo"));

    let store = tree.open_store().await;
    assert!(store.get_hash(&second).await.unwrap().is_some());
    assert_eq!(store.get_aliases("foo").await.unwrap(), set(&["fo"]));

    engine.reconcile().await;
    assert!(catalog.names(Partition::Global).is_empty());
    assert_eq!(catalog.names(Partition::Restricted), names(&["fo", "foo"]));
}

#[tokio::test]
async fn test_freed_alias_goes_to_waiting_claimant_on_rescan() {
    let tree = CommandTree::new();
    tree.write_command("a-first.toml", "first", &["shared"], "global");
    tree.write_command("b-second.toml", "second", &["shared", "own"], "global");

    let catalog = Arc::new(RecordingCatalog::new());
    let engine = tree.engine(Arc::clone(&catalog)).await;
    engine.full_scan().await;
    assert_eq!(engine.registry().owner_of("shared").as_deref(), Some("first"));

    // b-second.toml is byte-identical but still wants "shared"
    tree.write_command("a-first.toml", "first", &[], "global");
    let report = engine.full_scan().await;
    assert_eq!(report.loaded, 2);
    assert_eq!(report.unchanged, 0);

    assert_eq!(engine.registry().owner_of("shared").as_deref(), Some("second"));
    assert_eq!(engine.registry().aliases_of("second"), set(&["own", "shared"]));

    let store = tree.open_store().await;
    assert!(store.get_aliases("first").await.unwrap().is_empty());
    assert_eq!(store.get_aliases("second").await.unwrap(), set(&["own", "shared"]));
    assert_eq!(
        catalog.names(Partition::Global),
        names(&["first", "own", "second", "shared"])
    );
}

#[tokio::test]
async fn test_freed_alias_goes_to_waiting_claimant_on_reload() {
    let tree = CommandTree::new();
    let first = tree.write_command("a-first.toml", "first", &["shared"], "global");
    tree.write_command("b-second.toml", "second", &["shared"], "global");

    let catalog = Arc::new(RecordingCatalog::new());
    let engine = tree.engine(Arc::clone(&catalog)).await;
    engine.full_scan().await;
    let mut events = engine.subscribe();

    tree.write_command("a-first.toml", "first", &[], "global");
    engine.reload(&first).await.unwrap();

    assert_eq!(engine.registry().owner_of("shared").as_deref(), Some("second"));
    let loaded: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter(|event| matches!(event, SyncEvent::FileLoaded { .. }))
        .collect();
    assert_eq!(loaded.len(), 2);
}

#[tokio::test]
async fn test_orphan_alias_records_are_pruned() {
    let tree = CommandTree::new();
    tree.write_command("foo.toml", "foo", &["f"], "global");

    let store = tree.open_store().await;
    store.set_alias("ghost", "gh").await.unwrap();
    store.set_alias("foo", "stale").await.unwrap();

    let catalog = Arc::new(RecordingCatalog::new());
    let engine = SyncEngine::new(tree.config(), Arc::new(store), Arc::clone(&catalog) as _);
    let report = engine.full_scan().await;
    assert_eq!(report.loaded, 1);

    let store = tree.open_store().await;
    let aliases = store.list_all_aliases().await.unwrap();
    assert_eq!(aliases.len(), 1);
    assert_eq!(aliases.get("foo"), Some(&set(&["f"])));
    assert!(!engine.registry().has("stale"));
}

#[tokio::test]
async fn test_handler_reload_and_retire() {
    let (tree, _catalog, engine) = scanned_tree().await;

    let path = tree.write_command("extra.toml", "extra", &["x"], "global");
    engine.reload(&path).await.unwrap();
    assert_eq!(engine.registry().owner_of("x").as_deref(), Some("extra"));

    // same bytes again: nothing to do
    let outcome = engine.load_path(&path).await.unwrap();
    assert!(outcome.is_unchanged());

    tree.remove("extra.toml");
    engine.retire(&path).await.unwrap();
    assert!(!engine.registry().has("extra"));
    assert!(!engine.registry().has("x"));

    let mut tracked = engine.tracked_paths();
    tracked.sort();
    assert_eq!(tracked, vec![tree.path("admin/bar.toml"), tree.path("foo.toml")]);
}

#[tokio::test]
async fn test_rename_inside_file_retires_old_name() {
    let (tree, catalog, engine) = scanned_tree().await;

    tree.write_command("foo.toml", "food", &["f"], "global");
    engine.full_scan().await;

    assert!(!engine.registry().has("foo"));
    assert_eq!(engine.registry().owner_of("f").as_deref(), Some("food"));
    assert_eq!(catalog.names(Partition::Global), names(&["f", "food"]));

    let store = tree.open_store().await;
    assert!(store.get_aliases("foo").await.unwrap().is_empty());
    assert_eq!(store.get_aliases("food").await.unwrap(), set(&["f"]));
}

#[tokio::test]
async fn test_store_outage_scans_without_committing_or_reconciling() {
    let tree = CommandTree::new();
    tree.write_command("foo.toml", "foo", &[], "global");
    tree.write_raw("broken.toml", "handler = \"x\"\n");

    let store = Arc::new(SwitchableStore::new(tree.open_store().await));
    store.set_down(true);
    let catalog = Arc::new(RecordingCatalog::new());
    catalog.seed(Partition::Global, &["foo", "keep-me"]);
    let engine = SyncEngine::new(
        tree.config(),
        Arc::clone(&store) as Arc<dyn SyncStore>,
        Arc::clone(&catalog) as _,
    );
    let mut events = engine.subscribe();

    let report = engine.full_scan().await;
    assert!(report.degraded);
    assert!(engine.is_degraded());
    assert!(report.reconcile.is_none());
    assert_eq!(report.failed.len(), 1);
    assert!(engine.registry().is_empty());

    // the remote catalog is left alone while degraded
    assert!(catalog.calls().is_empty());
    assert_eq!(catalog.names(Partition::Global), names(&["foo", "keep-me"]));
    assert!(drain_events(&mut events)
        .iter()
        .any(|event| matches!(event, SyncEvent::StoreDegraded { .. })));

    let skipped = engine.reconcile().await;
    assert_eq!(skipped.global, PartitionOutcome::Skipped);
    assert!(catalog.calls().is_empty());

    store.set_down(false);
    let report = engine.full_scan().await;
    assert!(!report.degraded);
    assert!(!engine.is_degraded());
    assert_eq!(report.loaded, 1);
    assert_eq!(catalog.names(Partition::Global), names(&["foo"]));
}
