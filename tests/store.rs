use flowlog::preferences::{FilePreferences, PreferencesStore};
use flowlog::{Axis, Error, Reflection, SqliteStore, Store, SyncOutcome};
use tempfile::TempDir;

fn memory_store() -> Store {
    Store::spawn(SqliteStore::open_in_memory().unwrap(), None).unwrap()
}

fn names(reflections: &[Reflection]) -> Vec<&str> {
    reflections.iter().map(|r| r.name.as_str()).collect()
}

#[tokio::test]
async fn test_add_is_visible_when_future_resolves() {
    let store = memory_store();
    assert_eq!(store.snapshot().generation, 0);

    let id = store
        .add_reflection(Reflection::new("Climb", "Default", 90, 40, 10).with_tags(["outdoor"]))
        .await
        .unwrap();

    let snapshot = store.snapshot();
    assert_eq!(id, 1);
    assert_eq!(snapshot.generation, 1);
    assert_eq!(names(&snapshot.reflections), vec!["Climb"]);
    assert_eq!(snapshot.axis_tag_names, vec!["outdoor"]);
    assert_eq!(snapshot.tag_names, vec!["outdoor"]);
}

#[tokio::test]
async fn test_concurrent_syncs_all_complete() {
    let store = memory_store();
    store
        .add_reflection(Reflection::new("Read", "Default", 40, 10, 1))
        .await
        .unwrap();

    let (a, b, c) = tokio::join!(store.sync(None), store.sync(None), store.sync(None));
    let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, SyncOutcome::Published { .. })));

    // Whatever was rejected, the published snapshot is a complete read
    let snapshot = store.snapshot();
    assert_eq!(names(&snapshot.reflections), vec!["Read"]);
    assert_eq!(snapshot.activity_names, vec!["Read"]);
    assert_eq!(snapshot.axis.as_ref().map(|a| a.name.as_str()), Some("Default"));
}

#[tokio::test]
async fn test_queued_renames_apply_before_next_mutation() {
    let store = memory_store();
    store
        .add_reflection(Reflection::new("Jog", "Default", 60, 20, 1).with_tags(["am"]))
        .await
        .unwrap();

    store.rename_activity("Jog", "Trot");
    store.rename_activity("Trot", "Run");
    store.rename_tag("am", "morning");
    assert_eq!(store.pending_renames().len(), 3);
    // enqueue alone does not publish
    assert_eq!(store.snapshot().activity_names, vec!["Jog"]);

    store
        .add_reflection(Reflection::new("Swim", "Default", 70, 30, 2))
        .await
        .unwrap();

    let snapshot = store.snapshot();
    assert!(store.pending_renames().is_empty());
    assert_eq!(snapshot.activity_names, vec!["Run", "Swim"]);
    assert_eq!(snapshot.tag_names, vec!["morning"]);
}

#[tokio::test]
async fn test_flush_renames_publishes() {
    let store = memory_store();
    store
        .add_reflection(Reflection::new("Nap", "Default", 10, 50, 1))
        .await
        .unwrap();
    store.rename_activity("Nap", "Rest");

    assert_eq!(store.flush_renames().await.unwrap(), 1);
    assert_eq!(store.snapshot().activity_names, vec!["Rest"]);
    assert_eq!(store.flush_renames().await.unwrap(), 0);
}

#[tokio::test]
async fn test_update_and_delete() {
    let store = memory_store();
    let id = store
        .add_reflection(Reflection::new("Draft", "Default", 30, -10, 1))
        .await
        .unwrap();
    let other = store
        .add_reflection(Reflection::new("Edit", "Default", 50, 0, 2))
        .await
        .unwrap();

    let updated = Reflection::new("Draft", "Default", 80, 20, 1)
        .with_note("second pass")
        .with_id(id);
    store.update_reflection(updated.clone()).await.unwrap();
    assert_eq!(store.fetch_reflection(id).await.unwrap(), Some(updated));

    assert_eq!(store.delete_reflections(vec![other, 999]).await.unwrap(), 1);
    assert_eq!(store.delete_reflections(vec![]).await.unwrap(), 0);
    let ids: Vec<i64> = store.snapshot().reflections.iter().filter_map(|r| r.id).collect();
    assert_eq!(ids, vec![id]);
}

#[tokio::test]
async fn test_axis_operations() {
    let store = memory_store();
    store
        .add_reflection(Reflection::new("Code", "Work", 80, 0, 1))
        .await
        .unwrap();
    let side = store.add_axis("Side", false).await.unwrap();
    let archive = store.add_axis("Archive", true).await.unwrap();

    let snapshot = store.snapshot();
    let visible: Vec<&str> = snapshot.visible_axes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(visible, vec!["Default", "Work", "Side"]);
    assert_eq!(snapshot.hidden_axes, vec![archive.clone()]);

    // an axis with reflections cannot be deleted
    let err = store.delete_axes(vec!["Work".into()]).await.unwrap_err();
    assert!(err.is_constraint_violation());

    assert_eq!(store.merge_axis("Work", "Side").await.unwrap(), 1);
    assert_eq!(store.delete_axes(vec!["Archive".into()]).await.unwrap(), 1);

    let snapshot = store.sync(Some("Side")).await.unwrap();
    assert!(matches!(snapshot, SyncOutcome::Published { .. }));
    let snapshot = store.snapshot();
    assert_eq!(snapshot.axis, Some(side));
    assert_eq!(names(&snapshot.reflections), vec!["Code"]);
    assert!(snapshot.hidden_axes.is_empty());

    assert!(matches!(
        store.merge_axis("Nope", "Side").await,
        Err(Error::AxisNotFound(name)) if name == "Nope"
    ));
}

#[tokio::test]
async fn test_hide_axis_keeps_reflections() {
    let store = memory_store();
    let work = store.add_axis("Work", false).await.unwrap();
    store
        .add_reflection(Reflection::new("Plan", "Work", 50, 5, 1))
        .await
        .unwrap();

    store
        .update_axis(Axis {
            is_hidden: true,
            ..work.clone()
        })
        .await
        .unwrap();

    store.sync(Some("Work")).await.unwrap();
    let snapshot = store.snapshot();
    assert_eq!(snapshot.hidden_axes.len(), 1);
    assert_eq!(names(&snapshot.reflections), vec!["Plan"]);
}

#[tokio::test]
async fn test_subscribers_see_each_publication() {
    let store = memory_store();
    let mut rx = store.subscribe();

    store
        .add_reflection(Reflection::new("Walk", "Default", 40, 30, 1))
        .await
        .unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().generation, 1);

    store.sync(None).await.unwrap();
    rx.changed().await.unwrap();
    assert_eq!(rx.borrow_and_update().generation, 2);
}

/// Reflections of one axis with ids cleared
async fn axis_contents(store: &Store, axis: &str) -> Vec<Reflection> {
    store.sync(Some(axis)).await.unwrap();
    let mut reflections = store.snapshot().reflections.clone();
    reflections.iter_mut().for_each(|r| r.id = None);
    reflections
}

#[tokio::test]
async fn test_export_import_between_stores() {
    let source = memory_store();
    for (i, name) in ["Read", "Write", "Rest"].into_iter().enumerate() {
        let axis = if i == 1 { "Work" } else { "Home" };
        let reflection = Reflection::new(name, axis, 50 + i as i32, -(i as i32), i as i64)
            .with_flow_state(i % 2 == 0)
            .with_note("tab\there\nand a newline")
            .with_tags(["t1", "semi;colon"]);
        source.add_reflection(reflection).await.unwrap();
    }
    let text = source.export().await.unwrap();

    let target = memory_store();
    assert_eq!(target.import(text).await.unwrap(), 3);

    for axis in ["Home", "Work"] {
        assert_eq!(axis_contents(&source, axis).await, axis_contents(&target, axis).await);
    }
    assert_eq!(axis_contents(&target, "Home").await.len(), 2);
}

#[tokio::test]
async fn test_malformed_import_changes_nothing_but_still_publishes() {
    let store = memory_store();
    store
        .add_reflection(Reflection::new("Keep", "Default", 10, 10, 1))
        .await
        .unwrap();
    let before = store.snapshot().generation;

    let text = "{\"schemaVersion\":4}\nview\tname\tisFlowState\tengagement\tenergy\tdate\tnote\ttags\nDefault\tNew\t0\t1\t1\t2\t\t\nbroken line\n";
    assert!(matches!(store.import(text.to_string()).await, Err(Error::Import(_))));

    let snapshot = store.snapshot();
    assert!(snapshot.generation > before);
    assert_eq!(names(&snapshot.reflections), vec!["Keep"]);
    assert_eq!(store.stats().await.unwrap().reflections, 1);
}

#[tokio::test]
async fn test_active_axis_persists_across_restarts() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("flowlog.db");
    let prefs_path = dir.path().join("preferences.toml");

    {
        let storage = SqliteStore::open(&db).unwrap();
        storage.insert_axis("Work", false).unwrap();
        let store = Store::spawn(storage, Some(Box::new(FilePreferences::new(&prefs_path)))).unwrap();
        store.sync(Some("Work")).await.unwrap();
    }
    assert_eq!(
        FilePreferences::new(&prefs_path).load().unwrap().active_axis.as_deref(),
        Some("Work")
    );

    let store = Store::spawn(
        SqliteStore::open(&db).unwrap(),
        Some(Box::new(FilePreferences::new(&prefs_path))),
    )
    .unwrap();
    store.sync(None).await.unwrap();
    assert_eq!(store.snapshot().axis_name(), Some("Work"));
}

#[tokio::test]
async fn test_unknown_axis_sync_fails() {
    let store = memory_store();
    assert!(matches!(
        store.sync(Some("Missing")).await,
        Err(Error::AxisNotFound(_))
    ));
    assert!(matches!(
        store.sync(None).await,
        Ok(SyncOutcome::Published { .. })
    ));
}

#[tokio::test]
async fn test_tag_renamed_to_itself_survives_flush() {
    let store = memory_store();
    store
        .add_reflection(Reflection::new("Row", "Default", 60, 10, 1).with_tags(["x"]))
        .await
        .unwrap();

    store.rename_tag("x", "x");
    assert_eq!(store.flush_renames().await.unwrap(), 0);
    assert_eq!(store.snapshot().tag_names, vec!["x"]);
}

#[tokio::test]
async fn test_blank_rename_is_refused_and_export_still_imports() {
    let store = memory_store();
    store
        .add_reflection(Reflection::new("Run", "Default", 60, 10, 1))
        .await
        .unwrap();

    store.rename_activity("Run", "");
    assert!(matches!(
        store.flush_renames().await,
        Err(Error::InvalidReflection(_))
    ));
    assert!(store.pending_renames().is_empty());
    assert_eq!(store.snapshot().activity_names, vec!["Run"]);

    let text = store.export().await.unwrap();
    assert_eq!(memory_store().import(text).await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_axis_update_still_publishes_renames() {
    let store = memory_store();
    store
        .add_reflection(Reflection::new("Jog", "Default", 50, 0, 1))
        .await
        .unwrap();
    let before = store.snapshot().generation;

    store.rename_activity("Jog", "Run");
    let missing = Axis {
        id: 99,
        name: "Ghost".into(),
        is_hidden: false,
    };
    assert!(matches!(
        store.update_axis(missing).await,
        Err(Error::AxisNotFound(_))
    ));

    let snapshot = store.snapshot();
    assert!(snapshot.generation > before);
    assert_eq!(snapshot.activity_names, vec!["Run"]);
}
