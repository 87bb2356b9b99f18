//! Integration tests for the reconciliation engine
//!
//! These drive full passes over fixture payloads against a temporary
//! database, the same path the binary takes after fetching, and verify the
//! idempotence and derived-data guarantees end to end.

use habitsync::db::TaskType;
use habitsync::{sync, Database};
use serde_json::{json, Value};
use tempfile::TempDir;

/// 2024-03-05T00:00:00Z
const MARCH_5: i64 = 1709596800;

fn test_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let db = Database::open_at(dir.path().join("test.db")).unwrap();
    (dir, db)
}

fn habit_with_history(id: &str, history: Value) -> Value {
    json!({
        "id": id,
        "text": "Morning pushups",
        "type": "habit",
        "createdAt": "2015-01-01T00:00:00.000Z",
        "tags": [],
        "history": history,
        "checklist": []
    })
}

#[test]
fn full_pass_is_idempotent() {
    let (_dir, db) = test_db();
    let tags = vec![json!({"id": "tag-1", "name": "health"})];
    let tasks = vec![json!({
        "id": "task-1",
        "text": "Morning pushups",
        "type": "habit",
        "createdAt": 1420070400000i64,
        "tags": ["tag-1"],
        "history": [
            {"date": 1420070400000i64, "value": 1.0},
            {"date": 1420156800000i64, "value": 2.0}
        ],
        "checklist": [
            {"text": "warm up", "completed": true}
        ]
    })];
    let completed = vec![json!({
        "id": "task-2",
        "text": "File taxes",
        "type": "todo",
        "createdAt": "2015-01-03T12:00:00.000Z",
        "dateCompleted": "2015-01-04T08:30:00.000Z",
        "tags": [],
        "history": []
    })];

    let first = sync::reconcile_all(&db, &tags, &tasks, &completed, MARCH_5).unwrap();
    assert_eq!(first.tasks_processed, 2);
    assert_eq!(first.tasks_skipped, 0);
    let counts_after_first = first.after;

    let second = sync::reconcile_all(&db, &tags, &tasks, &completed, MARCH_5).unwrap();
    assert_eq!(second.tasks_processed, 2);
    assert_eq!(second.after, counts_after_first);
    assert_eq!(second.after.tags, 1);
    assert_eq!(second.after.tasks, 2);
    // Two real snapshots for the habit plus one synthesized for the todo.
    assert_eq!(second.after.history, 3);
    // One checklist item per habit snapshot.
    assert_eq!(second.after.checklist_items, 2);
}

#[test]
fn adjust_sequence_tracks_value_direction() {
    let (_dir, db) = test_db();
    let tasks = vec![habit_with_history(
        "task-1",
        json!([
            {"date": 1000000i64, "value": 3.0},
            {"date": 2000000i64, "value": 3.0},
            {"date": 3000000i64, "value": 5.0},
            {"date": 4000000i64, "value": 2.0}
        ]),
    )];

    sync::reconcile_all(&db, &[], &tasks, &[], MARCH_5).unwrap();

    let snapshots = db.list_history("task-1").unwrap();
    let adjusts: Vec<i32> = snapshots.iter().map(|h| h.adjust).collect();
    assert_eq!(adjusts, vec![0, 0, 1, -1]);
}

#[test]
fn empty_history_synthesizes_one_snapshot_for_today() {
    let (_dir, db) = test_db();
    let tasks = vec![habit_with_history("task-1", json!([]))];

    sync::reconcile_all(&db, &[], &tasks, &[], MARCH_5).unwrap();

    let snapshots = db.list_history("task-1").unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].date_created, MARCH_5);
    assert_eq!(snapshots[0].value, 0.0);
    assert_eq!(snapshots[0].adjust, 0);

    // Re-running the same day adds nothing.
    sync::reconcile_all(&db, &[], &tasks, &[], MARCH_5).unwrap();
    assert_eq!(db.count_history().unwrap(), 1);
}

#[test]
fn unresolvable_tag_is_silently_excluded() {
    let (_dir, db) = test_db();
    let tags = vec![json!({"id": "tag-live", "name": "alive"})];
    let tasks = vec![json!({
        "id": "task-1",
        "text": "Run",
        "type": "habit",
        "createdAt": 1420070400000i64,
        "tags": ["tag-live", "tag-deleted-upstream"],
        "history": []
    })];

    let report = sync::reconcile_all(&db, &tags, &tasks, &[], MARCH_5).unwrap();
    assert_eq!(report.tasks_processed, 1);
    assert_eq!(db.task_tag_ids("task-1").unwrap(), vec!["tag-live"]);
}

#[test]
fn checklist_completed_flag_sticks_across_passes() {
    let (_dir, db) = test_db();
    let base = |completed: bool| {
        vec![json!({
            "id": "task-1",
            "text": "Shopping",
            "type": "todo",
            "createdAt": 1420070400000i64,
            "tags": [],
            "history": [{"date": 1420070400000i64, "value": 1.0}],
            "checklist": [{"text": "buy milk", "completed": completed}]
        })]
    };

    sync::reconcile_all(&db, &[], &base(true), &[], MARCH_5).unwrap();
    sync::reconcile_all(&db, &[], &base(false), &[], MARCH_5).unwrap();

    let snapshots = db.list_history("task-1").unwrap();
    let items = db.list_checklist_items(snapshots[0].id).unwrap();
    assert_eq!(items.len(), 1);
    // The existing row wins; the later `completed: false` is a no-op.
    assert!(items[0].completed);
}

#[test]
fn malformed_task_is_skipped_without_aborting_the_pass() {
    let (_dir, db) = test_db();
    let tasks = vec![
        json!({"id": "task-bad", "text": "no type or date"}),
        habit_with_history("task-good", json!([{"date": 1000000i64, "value": 1.0}])),
    ];

    let report = sync::reconcile_all(&db, &[], &tasks, &[], MARCH_5).unwrap();
    assert_eq!(report.tasks_skipped, 1);
    assert_eq!(report.tasks_processed, 1);
    assert!(db.find_task("task-good").unwrap().is_some());
}

#[test]
fn unparseable_history_date_skips_only_that_snapshot() {
    let (_dir, db) = test_db();
    let tasks = vec![habit_with_history(
        "task-1",
        json!([
            {"date": 1000000i64, "value": 1.0},
            {"date": "not a date", "value": 2.0},
            {"date": 3000000i64, "value": 3.0}
        ]),
    )];

    let report = sync::reconcile_all(&db, &[], &tasks, &[], MARCH_5).unwrap();
    assert_eq!(report.tasks_processed, 1);

    let snapshots = db.list_history("task-1").unwrap();
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[0].value, 1.0);
    assert_eq!(snapshots[1].value, 3.0);
}

#[test]
fn tag_rename_propagates_but_task_scalars_do_not() {
    let (_dir, db) = test_db();
    let pass = |tag_name: &str, task_name: &str| {
        (
            vec![json!({"id": "tag-1", "name": tag_name})],
            vec![json!({
                "id": "task-1",
                "text": task_name,
                "type": "daily",
                "createdAt": 1420070400000i64,
                "tags": ["tag-1"],
                "history": []
            })],
        )
    };

    let (tags, tasks) = pass("chores", "Dishes");
    sync::reconcile_all(&db, &tags, &tasks, &[], MARCH_5).unwrap();

    let (tags, tasks) = pass("housework", "Dishes and counters");
    sync::reconcile_all(&db, &tags, &tasks, &[], MARCH_5).unwrap();

    // Tag names track upstream; task scalars are fixed at creation.
    assert_eq!(db.find_tag("tag-1").unwrap().unwrap().name, "housework");
    let task = db.find_task("task-1").unwrap().unwrap();
    assert_eq!(task.name, "Dishes");
    assert_eq!(task.task_type, TaskType::Daily.as_str());
}

#[test]
fn completed_todos_reconcile_like_active_tasks() {
    let (_dir, db) = test_db();
    let completed = vec![json!({
        "id": "todo-1",
        "text": "Mail the form",
        "type": "todo",
        "createdAt": "2015-01-01T00:00:00.000Z",
        "dateCompleted": "garbage date is tolerated",
        "tags": [],
        "history": []
    })];

    let report = sync::reconcile_all(&db, &[], &[], &completed, MARCH_5).unwrap();
    assert_eq!(report.tasks_processed, 1);
    let task = db.find_task("todo-1").unwrap().unwrap();
    assert_eq!(task.date_created, 1420070400);
    // The completion date is consumed transiently and never stored, so a
    // garbage value costs nothing.
    assert_eq!(db.count_history().unwrap(), 1);
}
