//! SQLite entity store with Diesel ORM
//!
//! Holds the local mirror of Habitica data: tags, tasks, task-tag
//! associations, per-task value history, and checklist items. The schema is
//! created on open; a sync pass only ever inserts or updates, never deletes.

use crate::schema::*;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The four Habitica task categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Habit,
    Daily,
    Todo,
    Reward,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Habit => "habit",
            TaskType::Daily => "daily",
            TaskType::Todo => "todo",
            TaskType::Reward => "reward",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Diesel Models
// ============================================================================

/// Insertable tag
#[derive(Insertable)]
#[diesel(table_name = tags)]
pub struct NewTag<'a> {
    pub id: &'a str,
    pub name: &'a str,
}

/// Queryable tag
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = tags)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// Insertable task
#[derive(Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub task_type: &'a str,
    pub date_created: i64,
}

/// Queryable task
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub task_type: String,
    pub date_created: i64,
}

/// Insertable task-tag association
#[derive(Insertable)]
#[diesel(table_name = task_tags)]
pub struct NewTaskTag<'a> {
    pub task_id: &'a str,
    pub tag_id: &'a str,
}

/// Insertable history snapshot
#[derive(Insertable)]
#[diesel(table_name = history)]
pub struct NewHistory<'a> {
    pub task_id: &'a str,
    pub date_created: i64,
    pub value: f64,
    pub adjust: i32,
}

/// Queryable history snapshot
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = history)]
pub struct History {
    pub id: i32,
    pub task_id: String,
    pub date_created: i64,
    pub value: f64,
    pub adjust: i32,
}

/// Insertable checklist item
#[derive(Insertable)]
#[diesel(table_name = checklist_items)]
pub struct NewChecklistItem<'a> {
    pub history_id: i32,
    pub name: &'a str,
    pub completed: bool,
}

/// Queryable checklist item
#[derive(Queryable, Selectable, Debug, Clone, PartialEq, Eq, Serialize)]
#[diesel(table_name = checklist_items)]
pub struct ChecklistItem {
    pub id: i32,
    pub history_id: i32,
    pub name: String,
    pub completed: bool,
}

// ============================================================================
// Database Connection
// ============================================================================

type DbPool = Pool<ConnectionManager<SqliteConnection>>;
type DbConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Database connection wrapper
pub struct Database {
    pool: DbPool,
}

/// Error type for database operations
#[derive(Debug)]
pub enum DbError {
    Connection(String),
    Query(diesel::result::Error),
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DbError::Query(e) => write!(f, "Query error: {}", e),
        }
    }
}

impl std::error::Error for DbError {}

impl From<diesel::result::Error> for DbError {
    fn from(e: diesel::result::Error) -> Self {
        DbError::Query(e)
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl Database {
    /// Open (creating if necessary) the database at the given path.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).ok();
            }
        }
        let manager = ConnectionManager::<SqliteConnection>::new(&path_str);
        // One sync pass, one process: a single connection is all we need.
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn get_conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| DbError::Connection(e.to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let mut conn = self.get_conn()?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                task_type TEXT NOT NULL,
                date_created BIGINT NOT NULL
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS task_tags (
                task_id TEXT NOT NULL,
                tag_id TEXT NOT NULL,
                PRIMARY KEY (task_id, tag_id),
                FOREIGN KEY (task_id) REFERENCES tasks(id),
                FOREIGN KEY (tag_id) REFERENCES tags(id)
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                task_id TEXT NOT NULL,
                date_created BIGINT NOT NULL,
                value DOUBLE NOT NULL,
                adjust INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (task_id) REFERENCES tasks(id),
                UNIQUE(task_id, date_created, value)
            )
        "#,
        )
        .execute(&mut conn)?;

        diesel::sql_query(
            r#"
            CREATE TABLE IF NOT EXISTS checklist_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                history_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                completed BOOLEAN NOT NULL DEFAULT 0,
                FOREIGN KEY (history_id) REFERENCES history(id),
                UNIQUE(history_id, name)
            )
        "#,
        )
        .execute(&mut conn)?;

        // Indexes
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_history_task ON history(task_id)")
            .execute(&mut conn)?;
        diesel::sql_query("CREATE INDEX IF NOT EXISTS idx_history_date ON history(date_created)")
            .execute(&mut conn)?;
        diesel::sql_query(
            "CREATE INDEX IF NOT EXISTS idx_checklist_history ON checklist_items(history_id)",
        )
        .execute(&mut conn)?;

        Ok(())
    }

    // ========================================================================
    // Tag Operations
    // ========================================================================

    /// Find a tag by its Habitica id
    pub fn find_tag(&self, tag_id: &str) -> Result<Option<Tag>> {
        let mut conn = self.get_conn()?;
        let tag = tags::table
            .filter(tags::id.eq(tag_id))
            .select(Tag::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(tag)
    }

    /// Create a tag, returning the persisted row
    pub fn create_tag(&self, tag_id: &str, name: &str) -> Result<Tag> {
        let mut conn = self.get_conn()?;
        let new_tag = NewTag { id: tag_id, name };
        diesel::insert_into(tags::table)
            .values(&new_tag)
            .execute(&mut conn)?;
        Ok(Tag {
            id: tag_id.to_string(),
            name: name.to_string(),
        })
    }

    /// Rename a tag, returning the persisted row
    pub fn update_tag_name(&self, tag_id: &str, name: &str) -> Result<Tag> {
        let mut conn = self.get_conn()?;
        diesel::update(tags::table.filter(tags::id.eq(tag_id)))
            .set(tags::name.eq(name))
            .execute(&mut conn)?;
        Ok(Tag {
            id: tag_id.to_string(),
            name: name.to_string(),
        })
    }

    /// List all tags
    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        let mut conn = self.get_conn()?;
        let rows = tags::table
            .order(tags::name.asc())
            .select(Tag::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    pub fn count_tags(&self) -> Result<i64> {
        let mut conn = self.get_conn()?;
        Ok(tags::table.count().get_result(&mut conn)?)
    }

    // ========================================================================
    // Task Operations
    // ========================================================================

    /// Find a task by its Habitica id
    pub fn find_task(&self, task_id: &str) -> Result<Option<Task>> {
        let mut conn = self.get_conn()?;
        let task = tasks::table
            .filter(tasks::id.eq(task_id))
            .select(Task::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(task)
    }

    /// Create a task, returning the persisted row
    pub fn create_task(
        &self,
        task_id: &str,
        name: &str,
        task_type: TaskType,
        date_created: i64,
    ) -> Result<Task> {
        let mut conn = self.get_conn()?;
        let new_task = NewTask {
            id: task_id,
            name,
            task_type: task_type.as_str(),
            date_created,
        };
        diesel::insert_into(tasks::table)
            .values(&new_task)
            .execute(&mut conn)?;
        Ok(Task {
            id: task_id.to_string(),
            name: name.to_string(),
            task_type: task_type.as_str().to_string(),
            date_created,
        })
    }

    /// List all tasks, oldest first
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        let mut conn = self.get_conn()?;
        let rows = tasks::table
            .order(tasks::date_created.asc())
            .select(Task::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    pub fn count_tasks(&self) -> Result<i64> {
        let mut conn = self.get_conn()?;
        Ok(tasks::table.count().get_result(&mut conn)?)
    }

    // ========================================================================
    // Task-Tag Associations
    // ========================================================================

    /// Drop every tag association for a task
    pub fn clear_task_tags(&self, task_id: &str) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let n = diesel::delete(task_tags::table.filter(task_tags::task_id.eq(task_id)))
            .execute(&mut conn)?;
        Ok(n)
    }

    /// Associate a task with a tag
    pub fn add_task_tag(&self, task_id: &str, tag_id: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        let new_assoc = NewTaskTag { task_id, tag_id };
        diesel::insert_into(task_tags::table)
            .values(&new_assoc)
            .execute(&mut conn)?;
        Ok(())
    }

    /// Tag ids currently associated with a task
    pub fn task_tag_ids(&self, task_id: &str) -> Result<Vec<String>> {
        let mut conn = self.get_conn()?;
        let ids = task_tags::table
            .filter(task_tags::task_id.eq(task_id))
            .order(task_tags::tag_id.asc())
            .select(task_tags::tag_id)
            .load(&mut conn)?;
        Ok(ids)
    }

    // ========================================================================
    // History Operations
    // ========================================================================

    /// Find a snapshot by its full identity triple
    pub fn find_history(
        &self,
        task_id: &str,
        date_created: i64,
        value: f64,
    ) -> Result<Option<History>> {
        let mut conn = self.get_conn()?;
        let row = history::table
            .filter(history::task_id.eq(task_id))
            .filter(history::date_created.eq(date_created))
            .filter(history::value.eq(value))
            .select(History::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    /// Most recently dated snapshot for a task, if any
    pub fn latest_history(&self, task_id: &str) -> Result<Option<History>> {
        let mut conn = self.get_conn()?;
        let row = history::table
            .filter(history::task_id.eq(task_id))
            .order(history::date_created.desc())
            .select(History::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    /// Create a snapshot, returning the persisted row
    pub fn create_history(
        &self,
        task_id: &str,
        date_created: i64,
        value: f64,
        adjust: i32,
    ) -> Result<History> {
        let mut conn = self.get_conn()?;
        let new_history = NewHistory {
            task_id,
            date_created,
            value,
            adjust,
        };
        diesel::insert_into(history::table)
            .values(&new_history)
            .execute(&mut conn)?;

        let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>(
            "last_insert_rowid()",
        ))
        .first(&mut conn)?;

        Ok(History {
            id,
            task_id: task_id.to_string(),
            date_created,
            value,
            adjust,
        })
    }

    /// All snapshots for a task, oldest first
    pub fn list_history(&self, task_id: &str) -> Result<Vec<History>> {
        let mut conn = self.get_conn()?;
        let rows = history::table
            .filter(history::task_id.eq(task_id))
            .order(history::date_created.asc())
            .select(History::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    pub fn count_history(&self) -> Result<i64> {
        let mut conn = self.get_conn()?;
        Ok(history::table.count().get_result(&mut conn)?)
    }

    /// Snapshots dated strictly after the given epoch second
    pub fn count_history_since(&self, cutoff: i64) -> Result<i64> {
        let mut conn = self.get_conn()?;
        Ok(history::table
            .filter(history::date_created.gt(cutoff))
            .count()
            .get_result(&mut conn)?)
    }

    // ========================================================================
    // Checklist Operations
    // ========================================================================

    /// Find a checklist item by its identity pair
    pub fn find_checklist_item(
        &self,
        history_id: i32,
        name: &str,
    ) -> Result<Option<ChecklistItem>> {
        let mut conn = self.get_conn()?;
        let row = checklist_items::table
            .filter(checklist_items::history_id.eq(history_id))
            .filter(checklist_items::name.eq(name))
            .select(ChecklistItem::as_select())
            .first(&mut conn)
            .optional()?;
        Ok(row)
    }

    /// Create a checklist item, returning the persisted row
    pub fn create_checklist_item(
        &self,
        history_id: i32,
        name: &str,
        completed: bool,
    ) -> Result<ChecklistItem> {
        let mut conn = self.get_conn()?;
        let new_item = NewChecklistItem {
            history_id,
            name,
            completed,
        };
        diesel::insert_into(checklist_items::table)
            .values(&new_item)
            .execute(&mut conn)?;

        let id: i32 = diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>(
            "last_insert_rowid()",
        ))
        .first(&mut conn)?;

        Ok(ChecklistItem {
            id,
            history_id,
            name: name.to_string(),
            completed,
        })
    }

    /// Checklist items attached to a snapshot
    pub fn list_checklist_items(&self, history_id: i32) -> Result<Vec<ChecklistItem>> {
        let mut conn = self.get_conn()?;
        let rows = checklist_items::table
            .filter(checklist_items::history_id.eq(history_id))
            .order(checklist_items::name.asc())
            .select(ChecklistItem::as_select())
            .load(&mut conn)?;
        Ok(rows)
    }

    pub fn count_checklist_items(&self) -> Result<i64> {
        let mut conn = self.get_conn()?;
        Ok(checklist_items::table.count().get_result(&mut conn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("test.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn test_tag_roundtrip() {
        let (_dir, db) = test_db();
        assert!(db.find_tag("t1").unwrap().is_none());
        let tag = db.create_tag("t1", "work").unwrap();
        assert_eq!(tag.name, "work");
        let found = db.find_tag("t1").unwrap().unwrap();
        assert_eq!(found, tag);
        let renamed = db.update_tag_name("t1", "career").unwrap();
        assert_eq!(renamed.name, "career");
        assert_eq!(db.find_tag("t1").unwrap().unwrap().name, "career");
        assert_eq!(db.count_tags().unwrap(), 1);
    }

    #[test]
    fn test_task_tag_associations_cleared() {
        let (_dir, db) = test_db();
        db.create_tag("a", "a").unwrap();
        db.create_tag("b", "b").unwrap();
        db.create_task("task1", "Floss", TaskType::Daily, 100).unwrap();
        db.add_task_tag("task1", "a").unwrap();
        db.add_task_tag("task1", "b").unwrap();
        assert_eq!(db.task_tag_ids("task1").unwrap(), vec!["a", "b"]);
        assert_eq!(db.clear_task_tags("task1").unwrap(), 2);
        assert!(db.task_tag_ids("task1").unwrap().is_empty());
    }

    #[test]
    fn test_history_create_returns_row_id() {
        let (_dir, db) = test_db();
        db.create_task("task1", "Run", TaskType::Habit, 100).unwrap();
        let first = db.create_history("task1", 1000, 1.5, 0).unwrap();
        let second = db.create_history("task1", 2000, 2.5, 1).unwrap();
        assert!(second.id > first.id);
        let latest = db.latest_history("task1").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(db.count_history_since(1500).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_history_triple_rejected() {
        let (_dir, db) = test_db();
        db.create_task("task1", "Run", TaskType::Habit, 100).unwrap();
        db.create_history("task1", 1000, 1.5, 0).unwrap();
        assert!(db.create_history("task1", 1000, 1.5, 0).is_err());
        // Same date with a different value is a distinct snapshot.
        db.create_history("task1", 1000, 2.0, 1).unwrap();
        assert_eq!(db.count_history().unwrap(), 2);
    }

    #[test]
    fn test_checklist_identity_pair() {
        let (_dir, db) = test_db();
        db.create_task("task1", "Shop", TaskType::Todo, 100).unwrap();
        let hist = db.create_history("task1", 1000, 0.0, 0).unwrap();
        let item = db.create_checklist_item(hist.id, "buy milk", true).unwrap();
        assert!(item.completed);
        assert!(db.find_checklist_item(hist.id, "buy milk").unwrap().is_some());
        assert!(db.find_checklist_item(hist.id, "buy bread").unwrap().is_none());
        assert!(db.create_checklist_item(hist.id, "buy milk", false).is_err());
    }
}
