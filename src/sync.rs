//! Reconciliation engine
//!
//! Takes the nested task/tag/history/checklist payloads fetched from the
//! remote API and merges them idempotently into the local store. Everything
//! is create-or-update keyed by a stable identity; nothing is ever deleted,
//! so tags or tasks removed upstream linger locally (a known limitation).
//!
//! Failure policy: the health check and profile fetch are pass-wide fatal
//! and run before any write. After that, every failure is recovered at the
//! narrowest scope that keeps the pass moving - a bad tag, task, history
//! entry, or checklist item is logged and skipped, never aborting the run.

use crate::api::{ApiError, HabitApi, HistoryPayload, TagPayload, TaskPayload};
use crate::db::{ChecklistItem, Database, DbError, History, Tag, Task, TaskType};
use crate::timestamp::{self, FormatError};
use chrono::{NaiveTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Snapshots younger than this window are what the integrity check calls
/// "recent activity".
const ACTIVITY_WINDOW_SECS: i64 = 3600 * 24 * 3;

// ============================================================================
// Errors
// ============================================================================

/// Fatal startup conditions. These are the only errors that abort a pass;
/// they are all detected before the first write.
#[derive(Debug)]
pub enum SyncError {
    /// The status endpoint could not be reached or made no sense
    Health(ApiError),
    /// The remote reported a status other than "up"
    Unhealthy { status: String },
    /// The user profile could not be fetched or was malformed
    Profile(ApiError),
    /// The local store is unusable
    Store(DbError),
}

impl SyncError {
    /// Process exit code for this failure. 3 is reserved for the remote
    /// explicitly reporting itself down; anything else fatal is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            SyncError::Unhealthy { .. } => 3,
            SyncError::Health(_) | SyncError::Profile(_) | SyncError::Store(_) => 1,
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Health(e) => write!(f, "Health check failed: {}", e),
            SyncError::Unhealthy { status } => {
                write!(f, "API is not healthy, status is {:?} rather than \"up\"", status)
            }
            SyncError::Profile(e) => write!(f, "Could not load user profile: {}", e),
            SyncError::Store(e) => write!(f, "Store error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<DbError> for SyncError {
    fn from(e: DbError) -> Self {
        SyncError::Store(e)
    }
}

/// Per-item reconciliation failure. Callers log these and move on to the
/// next tag/task/snapshot/checklist item.
#[derive(Debug)]
pub enum ReconcileError {
    Store(DbError),
    Timestamp(FormatError),
    Payload(serde_json::Error),
}

impl std::fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileError::Store(e) => write!(f, "{}", e),
            ReconcileError::Timestamp(e) => write!(f, "{}", e),
            ReconcileError::Payload(e) => write!(f, "unexpected payload shape: {}", e),
        }
    }
}

impl std::error::Error for ReconcileError {}

impl From<DbError> for ReconcileError {
    fn from(e: DbError) -> Self {
        ReconcileError::Store(e)
    }
}

impl From<FormatError> for ReconcileError {
    fn from(e: FormatError) -> Self {
        ReconcileError::Timestamp(e)
    }
}

impl From<serde_json::Error> for ReconcileError {
    fn from(e: serde_json::Error) -> Self {
        ReconcileError::Payload(e)
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Deserialize one raw payload element into its typed form.
fn parse_payload<T: serde::de::DeserializeOwned>(raw: &Value) -> Result<T> {
    Ok(serde_json::from_value(raw.clone())?)
}

// ============================================================================
// Reconcilers
// ============================================================================

/// Create a tag, or refresh its name to the latest upstream value.
pub fn upsert_tag(db: &Database, id: &str, name: &str) -> Result<Tag> {
    match db.find_tag(id)? {
        None => {
            let tag = db.create_tag(id, name)?;
            debug!(tag = %tag.id, name = %tag.name, "new tag created");
            Ok(tag)
        }
        Some(tag) => {
            if !name.is_empty() && tag.name != name {
                let renamed = db.update_tag_name(id, name)?;
                debug!(tag = %renamed.id, from = %tag.name, to = %renamed.name, "tag renamed");
                Ok(renamed)
            } else {
                Ok(tag)
            }
        }
    }
}

/// Create a task if it is not already known, then rebuild its tag
/// associations from scratch.
///
/// Scalar fields on an existing task are left untouched; only the tag set is
/// refreshed. `None` entries in `tags` are references to tags that no longer
/// resolve upstream and are skipped. A single association failure is logged
/// and does not abort the task.
pub fn upsert_task(
    db: &Database,
    id: &str,
    name: &str,
    task_type: TaskType,
    date_created: i64,
    tags: &[Option<Tag>],
) -> Result<Task> {
    let task = match db.find_task(id)? {
        Some(existing) => {
            debug!(task = %existing.id, name = %existing.name, "task already exists");
            existing
        }
        None => {
            let created = db.create_task(id, name, task_type, date_created)?;
            debug!(task = %created.id, name = %created.name, "new task created");
            created
        }
    };

    // Remove all associations and re-add them, so the set is cleanly up to
    // date and no stale tag survives.
    db.clear_task_tags(id)?;
    for tag in tags.iter().flatten() {
        if let Err(e) = db.add_task_tag(id, &tag.id) {
            warn!(task = %id, tag = %tag.id, error = %e, "failed to attach tag, skipping");
        }
    }

    Ok(task)
}

/// Record a value snapshot for a task unless the exact
/// `(task, date, value)` triple is already present.
///
/// For a new snapshot the direction signal is derived here: the value is
/// compared against the most recently dated snapshot for the same task,
/// giving +1 on a rise, -1 on a fall, and 0 when equal or when the task has
/// no history yet. Snapshots are immutable once recorded.
pub fn upsert_history(db: &Database, task_id: &str, date_created: i64, value: f64) -> Result<History> {
    if let Some(existing) = db.find_history(task_id, date_created, value)? {
        debug!(task = %task_id, date = date_created, "history already exists");
        return Ok(existing);
    }

    let adjust = match db.latest_history(task_id)? {
        Some(prev) if prev.value < value => 1,
        Some(prev) if prev.value > value => -1,
        _ => 0,
    };

    let snapshot = db.create_history(task_id, date_created, value, adjust)?;
    debug!(
        task = %task_id,
        date = date_created,
        value,
        adjust,
        "new history created"
    );
    Ok(snapshot)
}

/// Record a checklist line item under a snapshot unless the
/// `(snapshot, text)` pair is already present.
///
/// An existing row keeps its original `completed` flag; re-syncing the same
/// text does not flip it.
pub fn upsert_checklist_item(
    db: &Database,
    history_id: i32,
    name: &str,
    completed: bool,
) -> Result<ChecklistItem> {
    if let Some(existing) = db.find_checklist_item(history_id, name)? {
        debug!(history = history_id, item = %name, "checklist item already exists");
        return Ok(existing);
    }
    let item = db.create_checklist_item(history_id, name, completed)?;
    debug!(history = history_id, item = %name, completed, "new checklist item created");
    Ok(item)
}

/// Reconcile one task payload: resolve its tags, upsert the task row, then
/// upsert its history snapshots and their checklist items.
///
/// A task with no history of its own gets a single synthesized zero-value
/// snapshot dated `today` (midnight UTC, epoch seconds). A history entry
/// that fails - unparseable date or a store error recording it - is skipped;
/// the rest of the task continues.
pub fn process_task(db: &Database, task: &TaskPayload, today: i64) -> Result<Task> {
    // Tag ids deleted upstream no longer resolve; those references are
    // dropped from the rebuilt set without surfacing an error.
    let mut tag_rows = Vec::with_capacity(task.tags.len());
    for tag_id in &task.tags {
        let row = db.find_tag(tag_id)?;
        if row.is_none() {
            debug!(task = %task.id, tag = %tag_id, "tag no longer resolvable, dropping reference");
        }
        tag_rows.push(row);
    }

    let date_created = timestamp::normalize(&task.created_at)?;

    // Completed todos carry a completion date. It is observed, not stored,
    // and a bad one just means "absent".
    if let Some(raw) = &task.date_completed {
        match timestamp::normalize(raw) {
            Ok(ts) => debug!(task = %task.id, date_completed = ts, "task has a completion date"),
            Err(e) => debug!(task = %task.id, error = %e, "ignoring unparseable completion date"),
        }
    }

    let row = upsert_task(db, &task.id, &task.text, task.task_type, date_created, &tag_rows)?;

    // Without any history of its own, the task gets one zero-value snapshot
    // for today so the timeline always has an entry per sync day.
    let synthesized = [HistoryPayload {
        date: Value::from(today * 1000),
        value: 0.0,
    }];
    let entries: &[HistoryPayload] = if task.history.is_empty() {
        &synthesized
    } else {
        &task.history
    };

    for entry in entries {
        let snap_date = match timestamp::normalize(&entry.date) {
            Ok(ts) => ts,
            Err(e) => {
                warn!(task = %task.id, error = %e, "skipping history entry with unparseable date");
                continue;
            }
        };
        let snapshot = match upsert_history(db, &task.id, snap_date, entry.value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    task = %task.id,
                    date = snap_date,
                    error = %e,
                    "failed to reconcile history entry, skipping"
                );
                continue;
            }
        };
        for item in &task.checklist {
            if let Err(e) = upsert_checklist_item(db, snapshot.id, &item.text, item.completed) {
                warn!(
                    task = %task.id,
                    item = %item.text,
                    error = %e,
                    "failed to reconcile checklist item, skipping"
                );
            }
        }
    }

    Ok(row)
}

// ============================================================================
// Orchestration
// ============================================================================

/// Row counts across the four entity tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub tags: i64,
    pub tasks: i64,
    pub history: i64,
    pub checklist_items: i64,
}

impl std::fmt::Display for StoreCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tags, {} tasks, {} history, {} checklist items",
            self.tags, self.tasks, self.history, self.checklist_items
        )
    }
}

/// Outcome of one full sync pass
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub before: StoreCounts,
    pub after: StoreCounts,
    pub tasks_processed: usize,
    pub tasks_skipped: usize,
    /// Non-fatal integrity findings
    pub warnings: Vec<String>,
}

fn store_counts(db: &Database) -> std::result::Result<StoreCounts, DbError> {
    Ok(StoreCounts {
        tags: db.count_tags()?,
        tasks: db.count_tasks()?,
        history: db.count_history()?,
        checklist_items: db.count_checklist_items()?,
    })
}

/// Midnight UTC of the current day, in epoch seconds.
pub fn today_midnight_utc() -> i64 {
    Utc::now()
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_utc()
        .timestamp()
}

/// Reconcile already-fetched payloads into the store. Tags first (tasks
/// resolve against them), then active tasks, then completed todos. Every
/// element is handled individually so one bad payload is logged and skipped.
pub fn reconcile_all(
    db: &Database,
    tags: &[Value],
    active: &[Value],
    completed: &[Value],
    today: i64,
) -> std::result::Result<SyncReport, SyncError> {
    let mut report = SyncReport {
        before: store_counts(db)?,
        ..SyncReport::default()
    };
    info!(counts = %report.before, "database before");

    info!("checking {} tags", tags.len());
    for raw in tags {
        let tag: TagPayload = match parse_payload(raw) {
            Ok(tag) => tag,
            Err(e) => {
                warn!(error = %e, "skipping malformed tag payload");
                continue;
            }
        };
        match upsert_tag(db, &tag.id, &tag.name) {
            Ok(row) => info!(tag = %row.id, name = %row.name, "tag reconciled"),
            Err(e) => warn!(tag = %tag.id, error = %e, "failed to reconcile tag, skipping"),
        }
    }

    info!("checking {} tasks", active.len());
    reconcile_task_batch(db, active, today, &mut report);

    info!("checking {} completed tasks", completed.len());
    reconcile_task_batch(db, completed, today, &mut report);

    report.after = store_counts(db)?;
    info!(counts = %report.after, "database after");

    Ok(report)
}

fn reconcile_task_batch(db: &Database, batch: &[Value], today: i64, report: &mut SyncReport) {
    for raw in batch {
        let task: TaskPayload = match parse_payload(raw) {
            Ok(task) => task,
            Err(e) => {
                warn!(error = %e, "skipping malformed task payload");
                report.tasks_skipped += 1;
                continue;
            }
        };
        match process_task(db, &task, today) {
            Ok(row) => {
                info!(task = %row.id, name = %row.name, "task reconciled");
                report.tasks_processed += 1;
            }
            Err(e) => {
                warn!(task = %task.id, error = %e, "failed to reconcile task, skipping");
                report.tasks_skipped += 1;
            }
        }
    }
}

/// Non-fatal sanity pass over the store: an empty task table or no snapshot
/// within the last three days is suspicious, but never changes the outcome.
pub fn integrity_check(db: &Database, now: i64) -> Vec<String> {
    let mut warnings = Vec::new();

    match db.count_tasks() {
        Ok(0) => warnings.push("unexpected, no tasks present".to_string()),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "integrity check could not count tasks"),
    }

    match db.count_history_since(now - ACTIVITY_WINDOW_SECS) {
        Ok(0) => warnings.push("unexpected, no activity in the last 3 days".to_string()),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "integrity check could not count history"),
    }

    for w in &warnings {
        warn!("{}", w);
    }
    warnings
}

/// Drive one full pass: health gate, profile gate, fetch, reconcile,
/// integrity check. Only the two gates abort; a failed task-list fetch
/// degrades to an empty batch.
pub fn run(db: &Database, api: &HabitApi) -> std::result::Result<SyncReport, SyncError> {
    let status = api.status().map_err(SyncError::Health)?;
    if status != "up" {
        return Err(SyncError::Unhealthy { status });
    }

    let profile = api.user().map_err(SyncError::Profile)?;
    debug!("user profile fetched");

    let tags: Vec<Value> = match profile.get("tags") {
        Some(Value::Array(items)) => items.clone(),
        _ => {
            warn!("user profile has no tag list");
            Vec::new()
        }
    };

    let active = fetch_batch(api.tasks(), "task list");
    let completed = fetch_batch(api.completed_tasks(), "completed task list");

    let today = today_midnight_utc();
    let mut report = reconcile_all(db, &tags, &active, &completed, today)?;

    if tracing::enabled!(tracing::Level::DEBUG) {
        dump_store(db);
    }

    report.warnings = integrity_check(db, Utc::now().timestamp());
    Ok(report)
}

fn fetch_batch(result: crate::api::Result<Vec<Value>>, what: &str) -> Vec<Value> {
    match result {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "failed to fetch {}, skipping", what);
            Vec::new()
        }
    }
}

/// Debug dump of everything in the store, nested the way it relates.
fn dump_store(db: &Database) {
    if let Ok(all_tags) = db.list_tags() {
        debug!("--------------------- TAGS IN DATABASE ---------------------");
        for tag in all_tags {
            debug!(tag = %tag.id, name = %tag.name, "tag");
        }
    }
    if let Ok(all_tasks) = db.list_tasks() {
        debug!("--------------------- TASKS IN DATABASE --------------------");
        for task in all_tasks {
            debug!(task = %task.id, name = %task.name, kind = %task.task_type, "task");
            let snapshots = db.list_history(&task.id).unwrap_or_default();
            for snapshot in snapshots {
                debug!(
                    date = snapshot.date_created,
                    value = snapshot.value,
                    adjust = snapshot.adjust,
                    "  history"
                );
                let items = db.list_checklist_items(snapshot.id).unwrap_or_default();
                for item in items {
                    debug!(item = %item.name, completed = item.completed, "    checklist");
                }
            }
        }
    }
}
