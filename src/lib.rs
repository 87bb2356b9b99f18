//! habitsync - mirror your Habitica tasks into a local SQLite database
//!
//! One invocation performs one full fetch-and-merge pass: pull the user's
//! tags and tasks from the Habitica API, reconcile them into the local
//! store, and exit. Snapshots of each task's accumulated value are kept
//! over time, with a derived +1/0/-1 signal for whether the value rose,
//! fell, or held against the previous snapshot.
//!
//! Reconciliation is idempotent: re-running a pass over the same remote
//! state creates no duplicate rows, so an interrupted run is safe to retry.
//!
//! # Quick Start
//!
//! ```no_run
//! use habitsync::{Database, HabitApi};
//!
//! let db = Database::open_at("habitica_data.db").unwrap();
//! let api = HabitApi::new("user-id", "api-key", None).unwrap();
//! let report = habitsync::sync::run(&db, &api).unwrap();
//! println!("{} tasks reconciled", report.tasks_processed);
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod schema;
pub mod sync;
pub mod timestamp;

pub use api::{ApiError, HabitApi, TaskPayload};
pub use config::Settings;
pub use db::{ChecklistItem, Database, DbError, History, Tag, Task, TaskType};
pub use sync::{ReconcileError, StoreCounts, SyncError, SyncReport};
pub use timestamp::FormatError;
