//! Single-consumer task processor
//!
//! ```text
//! TaskProcessor
//!     │
//!     ├─► claim_next_pending (oldest pending -> running)
//!     ├─► HandlerRegistry::dispatch (one handler per task type, panics caught)
//!     └─► update_status (completed with result / failed with error)
//! ```

use super::handler::HandlerRegistry;
use super::task_state::TaskStatus;
use crate::db::{Database, TaskRepository};
use crate::errors::Error;
use crate::utils::panic_message;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Attempts at recording a task's terminal status before giving up
const TERMINAL_WRITE_ATTEMPTS: u32 = 3;

/// Timing of the polling loop
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Wait between polls when no task is pending
    pub poll_interval: Duration,
    /// Wait after the store itself fails
    pub error_backoff: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Cooperative stop flag shared between the loop and signal listeners
///
/// Requesting shutdown never interrupts a running handler; it only stops
/// new claims and cuts short an idle wait.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless shutdown is requested first
    async fn sleep(&self, duration: Duration) {
        if self.is_requested() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.wake.notified() => {}
        }
    }
}

/// Outcome of one processed task
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedTask {
    pub id: String,
    pub status: TaskStatus,
}

/// The consumer loop draining the task store
pub struct TaskProcessor {
    database: Database,
    registry: Arc<HandlerRegistry>,
    config: ProcessorConfig,
    shutdown: ShutdownHandle,
}

impl TaskProcessor {
    pub fn new(database: Database, registry: Arc<HandlerRegistry>) -> Self {
        Self::with_config(database, registry, ProcessorConfig::default())
    }

    pub fn with_config(
        database: Database,
        registry: Arc<HandlerRegistry>,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            database,
            registry,
            config,
            shutdown: ShutdownHandle::new(),
        }
    }

    /// Handle to stop the loop from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Claims and runs at most one task
    ///
    /// # Returns
    ///
    /// The processed task's id and terminal status, or `None` when nothing
    /// is pending
    ///
    /// # Errors
    ///
    /// Only store failures are returned. Handler failures, timeouts and
    /// unsupported task types are recorded on the task as `Failed`.
    pub async fn process_next_task(&self) -> Result<Option<ProcessedTask>, Error> {
        let task = {
            let mut conn = self.database.get_conn()?;
            TaskRepository::new(&mut conn).claim_next_pending()?
        };
        let Some(task) = task else {
            return Ok(None);
        };

        info!(task_id = %task.id, task_type = %task.task_type, "processing task");

        let outcome = match AssertUnwindSafe(self.registry.dispatch(&task))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task_id = %task.id, panic = %message, "handler panicked");
                Err(Error::HandlerFailed(format!("handler panicked: {}", message)))
            }
        };

        let status = match outcome {
            Ok(result) => {
                self.record(&task.id, TaskStatus::Completed, Some(&result), None)
                    .await?;
                info!(task_id = %task.id, task_type = %task.task_type, "task completed");
                TaskStatus::Completed
            }
            Err(e) => {
                let mut message = e.to_string();
                if message.trim().is_empty() {
                    message = format!("{:?}", e);
                }
                self.record(&task.id, TaskStatus::Failed, None, Some(&message))
                    .await?;
                warn!(task_id = %task.id, task_type = %task.task_type, error = %message, "task failed");
                TaskStatus::Failed
            }
        };

        Ok(Some(ProcessedTask {
            id: task.id,
            status,
        }))
    }

    /// Writes a terminal status, retrying store failures after the back-off
    ///
    /// A task whose outcome cannot be written stays `Running`; the last
    /// store error is returned.
    async fn record(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), Error> {
        let mut attempt = 1;
        loop {
            let written = self.database.get_conn().and_then(|mut conn| {
                TaskRepository::new(&mut conn).update_status(task_id, status, result, error)
            });
            match written {
                Err(e) if e.is_store_error() && attempt < TERMINAL_WRITE_ATTEMPTS => {
                    warn!(
                        task_id = %task_id,
                        status = %status,
                        attempt,
                        error = %e,
                        "failed to record task outcome, retrying"
                    );
                    tokio::time::sleep(self.config.error_backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Polls the store until shutdown is requested
    ///
    /// Sleeps `poll_interval` when idle and `error_backoff` after a store
    /// failure; neither ends the loop.
    pub async fn run(&self) {
        info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            error_backoff_ms = self.config.error_backoff.as_millis() as u64,
            handlers = self.registry.len(),
            "task processor starting"
        );

        while !self.shutdown.is_requested() {
            match self.process_next_task().await {
                Ok(Some(processed)) => {
                    debug!(task_id = %processed.id, status = %processed.status, "task done");
                }
                Ok(None) => self.shutdown.sleep(self.config.poll_interval).await,
                Err(e) => {
                    error!(error = %e, "failed to claim or record task, backing off");
                    self.shutdown.sleep(self.config.error_backoff).await;
                }
            }
        }

        info!("task processor stopped");
    }

    /// Runs the loop until SIGINT or SIGTERM
    ///
    /// The task in flight when the signal arrives is finished and recorded
    /// before this returns.
    pub async fn run_until_shutdown(self) {
        let shutdown = self.shutdown_handle();
        let listener = tokio::spawn(async move {
            wait_for_signal().await;
            info!("received shutdown signal, finishing current task");
            shutdown.request();
        });

        self.run().await;
        listener.abort();
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM, only Ctrl+C stops the daemon");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
