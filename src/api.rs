//! Habitica API client
//!
//! Thin wrapper over the v3 read endpoints this tool consumes: health check,
//! user profile, and the user's task lists. Every response arrives as a
//! `{"data": ...}` envelope; authentication is two static headers.

use crate::db::TaskType;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const API_PREFIX: &str = "api/v3";
const DEFAULT_BASE_URL: &str = "https://habitica.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP verbs the client supports. The sync pass is read-only, so this is
/// deliberately a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
}

/// Error type for API operations
#[derive(Debug)]
pub enum ApiError {
    /// Transport-level failure (connect, timeout, TLS)
    Http(reqwest::Error),
    /// Non-success HTTP status
    Status { path: String, code: u16 },
    /// Response body did not have the expected envelope shape
    Shape { path: String, message: String },
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http(e) => write!(f, "HTTP error: {}", e),
            ApiError::Status { path, code } => {
                write!(f, "Request to {} returned status {}", path, code)
            }
            ApiError::Shape { path, message } => {
                write!(f, "Malformed response from {}: {}", path, message)
            }
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Http(e)
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

// ============================================================================
// Wire Payloads
// ============================================================================

/// A tag as it appears in the user profile
#[derive(Debug, Clone, Deserialize)]
pub struct TagPayload {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// One entry of a task's value history
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPayload {
    /// Millisecond epoch or wall-clock string; normalized later
    pub date: Value,
    pub value: f64,
}

/// One checklist line item on a task
#[derive(Debug, Clone, Deserialize)]
pub struct ChecklistPayload {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// A task as returned by the tasks endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct TaskPayload {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    #[serde(rename = "createdAt")]
    pub created_at: Value,
    /// Present on completed todos only
    #[serde(rename = "dateCompleted", default)]
    pub date_completed: Option<Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub history: Vec<HistoryPayload>,
    #[serde(default)]
    pub checklist: Vec<ChecklistPayload>,
}

/// Pull the `data` field out of a response envelope.
fn envelope_data(body: Value, path: &str) -> Result<Value> {
    match body {
        Value::Object(mut obj) => obj.remove("data").ok_or_else(|| ApiError::Shape {
            path: path.to_string(),
            message: "missing 'data' field".to_string(),
        }),
        other => Err(ApiError::Shape {
            path: path.to_string(),
            message: format!("expected object envelope, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated Habitica client
pub struct HabitApi {
    client: reqwest::blocking::Client,
    user_id: String,
    api_key: String,
    base_url: String,
}

impl HabitApi {
    pub fn new(user_id: &str, api_key: &str, base_url: Option<&str>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            user_id: user_id.to_string(),
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
        })
    }

    fn request(&self, verb: Verb, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            API_PREFIX,
            path
        );
        let builder = match verb {
            Verb::Get => self.client.get(&url),
        };
        let response = builder
            .header("x-api-user", &self.user_id)
            .header("x-api-key", &self.api_key)
            .query(query)
            .send()?;

        let code = response.status().as_u16();
        if !response.status().is_success() {
            return Err(ApiError::Status {
                path: path.to_string(),
                code,
            });
        }
        Ok(response.json()?)
    }

    /// Remote service status string; anything other than `"up"` means the
    /// sync pass should not start.
    pub fn status(&self) -> Result<String> {
        let data = envelope_data(self.request(Verb::Get, "status", &[])?, "status")?;
        data.get("status")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::Shape {
                path: "status".to_string(),
                message: "missing 'data.status' field".to_string(),
            })
    }

    /// The authenticated user's profile object.
    pub fn user(&self) -> Result<Value> {
        let data = envelope_data(self.request(Verb::Get, "user", &[])?, "user")?;
        if !data.is_object() {
            return Err(ApiError::Shape {
                path: "user".to_string(),
                message: format!("expected profile object, got {}", json_kind(&data)),
            });
        }
        Ok(data)
    }

    /// All of the user's current tasks, as raw JSON values. Elements are
    /// deserialized one at a time downstream so a single malformed task
    /// cannot poison the batch.
    pub fn tasks(&self) -> Result<Vec<Value>> {
        self.task_list("tasks/user", &[])
    }

    /// The user's completed todos (filtered server-side).
    pub fn completed_tasks(&self) -> Result<Vec<Value>> {
        self.task_list("tasks/user", &[("type", "completedTodos")])
    }

    /// A single task by id.
    pub fn task(&self, task_id: &str) -> Result<Value> {
        let path = format!("tasks/{}", task_id);
        envelope_data(self.request(Verb::Get, &path, &[])?, &path)
    }

    fn task_list(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        let data = envelope_data(self.request(Verb::Get, path, query)?, path)?;
        match data {
            Value::Array(items) => Ok(items),
            other => Err(ApiError::Shape {
                path: path.to_string(),
                message: format!("expected task array, got {}", json_kind(&other)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_data_extraction() {
        let body = json!({"success": true, "data": {"status": "up"}});
        let data = envelope_data(body, "status").unwrap();
        assert_eq!(data, json!({"status": "up"}));
    }

    #[test]
    fn test_envelope_missing_data() {
        assert!(envelope_data(json!({"success": true}), "status").is_err());
        assert!(envelope_data(json!([1, 2, 3]), "status").is_err());
        assert!(envelope_data(json!("nope"), "status").is_err());
    }

    #[test]
    fn test_task_payload_deserializes() {
        let raw = json!({
            "id": "abc-123",
            "text": "Morning run",
            "type": "habit",
            "createdAt": "2015-01-01T00:00:00.000Z",
            "tags": ["tag-1", "tag-2"],
            "history": [
                {"date": 1420070400000i64, "value": 1.0},
                {"date": "2015-01-02T00:00:00.000Z", "value": 2.5}
            ],
            "checklist": [
                {"text": "stretch", "completed": true}
            ],
            "priority": 1.5,
            "notes": "ignored extra field"
        });
        let task: TaskPayload = serde_json::from_value(raw).unwrap();
        assert_eq!(task.id, "abc-123");
        assert_eq!(task.task_type, TaskType::Habit);
        assert_eq!(task.tags.len(), 2);
        assert_eq!(task.history.len(), 2);
        assert!(task.checklist[0].completed);
        assert!(task.date_completed.is_none());
    }

    #[test]
    fn test_task_payload_defaults() {
        let raw = json!({
            "id": "abc-456",
            "text": "Buy groceries",
            "type": "todo",
            "createdAt": 1420070400000i64
        });
        let task: TaskPayload = serde_json::from_value(raw).unwrap();
        assert!(task.tags.is_empty());
        assert!(task.history.is_empty());
        assert!(task.checklist.is_empty());
    }

    #[test]
    fn test_unknown_task_type_rejected() {
        let raw = json!({
            "id": "abc-789",
            "text": "???",
            "type": "quest",
            "createdAt": 0
        });
        assert!(serde_json::from_value::<TaskPayload>(raw).is_err());
    }
}
