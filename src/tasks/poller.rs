//! Fixed-interval polling of a model task until it reaches a terminal state.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::PollConfig;
use crate::error::{ArkError, Result};
use crate::providers::{GenerationApi, TaskContent, TaskStatus};

/// Polls `get_task` every `interval` until the task finishes.
pub struct TaskPoller<'a, A: GenerationApi + ?Sized> {
    api: &'a A,
    interval: Duration,
    max_attempts: Option<u32>,
}

impl<'a, A: GenerationApi + ?Sized> TaskPoller<'a, A> {
    pub fn new(api: &'a A, interval: Duration) -> Self {
        Self {
            api,
            interval,
            max_attempts: None,
        }
    }

    pub fn from_config(api: &'a A, config: &PollConfig) -> Self {
        Self::new(api, config.interval()).with_max_attempts(config.max_attempts)
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Wait for `task_id` to succeed and return its content.
    ///
    /// Failed or cancelled tasks, an exhausted attempt budget and a shutdown
    /// signal all end the wait with [`ArkError::Task`]. Errors from the API
    /// itself are returned as-is without retrying.
    pub async fn wait_for_completion(
        &self,
        task_id: &str,
        mut shutdown: Option<watch::Receiver<bool>>,
    ) -> Result<TaskContent> {
        let mut attempts: u32 = 0;
        loop {
            let snapshot = self.api.get_task(task_id).await?;
            attempts = attempts.saturating_add(1);
            info!(task_id, status = %snapshot.status, attempt = attempts, "Polled model task");

            if snapshot.status.is_terminal() {
                if snapshot.status == TaskStatus::Succeeded {
                    return snapshot.content.ok_or_else(|| {
                        ArkError::Task(format!("Task {} succeeded without content", task_id))
                    });
                }
                let detail = snapshot
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no details".to_string());
                return Err(ArkError::Task(format!(
                    "Task {} {}: {}",
                    task_id, snapshot.status, detail
                )));
            }

            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    return Err(ArkError::Task(format!(
                        "Task {} still {} - gave up after {} polls",
                        task_id, snapshot.status, attempts
                    )));
                }
            }

            debug!(task_id, "Task not finished, retrying in {:?}", self.interval);
            let cancelled = match shutdown.as_mut() {
                Some(rx) => sleep_or_shutdown(rx, self.interval).await,
                None => {
                    tokio::time::sleep(self.interval).await;
                    false
                }
            };
            if cancelled {
                info!(task_id, "Stopped waiting for task");
                return Err(ArkError::Task(format!("Waiting for task {} cancelled", task_id)));
            }
        }
    }
}

/// Sleep for `interval`; returns `true` if shutdown was signalled first.
async fn sleep_or_shutdown(rx: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    if *rx.borrow() {
        return true;
    }
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = rx.changed() => match changed {
                Ok(()) if *rx.borrow() => return true,
                Ok(()) => continue,
                // Sender gone: nobody can cancel any more.
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}
