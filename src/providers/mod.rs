//! Remote generation API.
//!
//! Only the fields arkmesh actually reads are modelled; everything else in
//! the vendor payloads is ignored during deserialization.

pub mod ark;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ArkError, Result};

pub use ark::ArkClient;

/// Whether the image endpoint may return a related series of images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequentialMode {
    Auto,
    #[default]
    Disabled,
}

impl SequentialMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Disabled => "disabled",
        }
    }
}

/// Identifier returned when a model task is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskHandle {
    pub id: String,
}

/// Lifecycle state of a model task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Unknown(String),
}

impl TaskStatus {
    /// No further polling will change the outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "cancelled" | "canceled" => Self::Cancelled,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.to_string()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Running => f.write_str("running"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Unknown(s) => f.write_str(s),
        }
    }
}

/// Output of a finished task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskContent {
    /// Download URL of the generated model archive.
    #[serde(default)]
    pub file_url: Option<String>,
}

/// Failure details reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskFailure {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => write!(f, "{}: {}", code, msg),
            (None, Some(msg)) => f.write_str(msg),
            (Some(code), None) => f.write_str(code),
            (None, None) => f.write_str("no details"),
        }
    }
}

/// One status read of a model task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub content: Option<TaskContent>,
    #[serde(default)]
    pub error: Option<TaskFailure>,
}

/// Operations against the remote generation service.
#[async_trait]
pub trait GenerationApi: Send + Sync {
    /// Generate images for `prompt`; returns their URLs in order.
    async fn generate_images(&self, prompt: &str, sequential: SequentialMode)
        -> Result<Vec<String>>;

    /// Submit an image-to-3D task for the image at `image_url`.
    async fn create_model_task(&self, image_url: &str) -> Result<TaskHandle>;

    /// Read the current state of a task.
    async fn get_task(&self, task_id: &str) -> Result<TaskSnapshot>;
}

/// Map a non-success HTTP response to an [`ArkError`].
///
/// 401/403 become `Unauthorized`; other statuses become `Provider` with the
/// service's `error.message` when the body carries one.
pub fn parse_api_error(status: u16, body: &str) -> ArkError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.chars().take(300).collect());

    match status {
        401 | 403 => ArkError::Unauthorized(format!("{} {}", status, detail)),
        _ => ArkError::Provider(format!("API error {}: {}", status, detail)),
    }
}

/// Scripted API for tests: returns queued snapshots in order.
#[cfg(test)]
pub struct MockApi {
    pub snapshots: std::sync::Mutex<std::collections::VecDeque<Result<TaskSnapshot>>>,
    pub polls: std::sync::atomic::AtomicU32,
    pub task_id: String,
}

#[cfg(test)]
impl MockApi {
    pub fn with_statuses(task_id: &str, statuses: &[&str], file_url: Option<&str>) -> Self {
        let snapshots = statuses
            .iter()
            .map(|status| {
                Ok(TaskSnapshot {
                    id: task_id.to_string(),
                    status: TaskStatus::from(status.to_string()),
                    content: Some(TaskContent {
                        file_url: file_url.map(String::from),
                    }),
                    error: None,
                })
            })
            .collect();
        Self {
            snapshots: std::sync::Mutex::new(snapshots),
            polls: std::sync::atomic::AtomicU32::new(0),
            task_id: task_id.to_string(),
        }
    }

    pub fn push(&self, snapshot: Result<TaskSnapshot>) {
        self.snapshots.lock().unwrap().push_back(snapshot);
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl GenerationApi for MockApi {
    async fn generate_images(
        &self,
        prompt: &str,
        _sequential: SequentialMode,
    ) -> Result<Vec<String>> {
        Ok(vec![format!("https://img.example.com/{}.png", prompt.len())])
    }

    async fn create_model_task(&self, _image_url: &str) -> Result<TaskHandle> {
        Ok(TaskHandle {
            id: self.task_id.clone(),
        })
    }

    async fn get_task(&self, task_id: &str) -> Result<TaskSnapshot> {
        self.polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let next = self.snapshots.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(TaskSnapshot {
                id: task_id.to_string(),
                status: TaskStatus::Running,
                content: None,
                error: None,
            })
        })
    }
}
