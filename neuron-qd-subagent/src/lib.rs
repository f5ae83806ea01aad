//! Sub-agent scheduler: spawn a worker under a tool profile, poll its
//! status, or block until it completes. Cancellation is cooperative —
//! workers observe a shared flag — backed by `AbortHandle` for the cases
//! where the worker is also a plain `tokio` task that can be stopped
//! outright (e.g. one still waiting on a sender call).
//!
//! Modeled on `brain::v2::JobManager`'s job table: a `Mutex<HashMap<id,
//! Entry>>` of handle-bearing entries, status reads taken under a
//! short-held lock rather than a dedicated actor.

mod error;

pub use error::SchedulerError;

use chrono::{DateTime, Utc};
use neuron_qd_core::Profile;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::AbortHandle;

/// Lifecycle state of a sub-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAgentStatus {
    /// Worker task is executing.
    Running,
    /// Worker completed successfully.
    Done,
    /// Worker failed, panicked, or was cancelled.
    Error,
}

/// A cooperative cancellation flag handed to a worker closure. Workers are
/// expected to check `is_cancelled()` at their own suspension points;
/// `cancel()` additionally calls `AbortHandle::abort` on the worker's task,
/// which stops it immediately if it's currently suspended on an `.await`.
#[derive(Clone)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    /// Whether this sub-agent has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// A non-blocking snapshot of a sub-agent's state, as returned by
/// [`Scheduler::status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentSnapshot {
    /// Current lifecycle status.
    pub status: SubAgentStatus,
    /// The tool profile this sub-agent was spawned with.
    pub profile: Profile,
    /// The prompt it was given.
    pub prompt: String,
    /// The worker's result, present once `status` is `Done`.
    pub result: Option<Value>,
    /// The error message, present once `status` is `Error`.
    pub error: Option<String>,
    /// When the sub-agent was spawned.
    pub created_at: DateTime<Utc>,
}

struct Entry {
    created_at: DateTime<Utc>,
    status: SubAgentStatus,
    profile: Profile,
    prompt: String,
    result: Option<Value>,
    error: Option<String>,
    cancel_flag: Arc<AtomicBool>,
    handle: Option<AbortHandle>,
    notify: Arc<Notify>,
}

/// Scheduler for concurrent sub-agent workers.
///
/// Must be held behind an `Arc` to call [`Scheduler::spawn`], since the
/// worker's completion callback needs to reach back into the shared table.
pub struct Scheduler {
    entries: Mutex<HashMap<String, Entry>>,
    next_id: AtomicU64,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Spawn a worker under `profile`, allocating a fresh `"task-<n>"` id.
    ///
    /// `run_fn` receives the prompt, the profile it was granted, and a
    /// [`CancelSignal`] to check cooperatively; it resolves to `Ok(value)`
    /// on success or `Err(message)` on a recoverable failure. A panic
    /// inside `run_fn` is caught by the runtime and reported the same way
    /// as a cancellation: `status = error`.
    pub async fn spawn<F, Fut>(
        self: &Arc<Self>,
        prompt: impl Into<String>,
        profile: Profile,
        run_fn: F,
    ) -> String
    where
        F: FnOnce(String, Profile, CancelSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let prompt = prompt.into();
        let id = format!("task-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());

        {
            let mut entries = self.entries.lock().await;
            entries.insert(
                id.clone(),
                Entry {
                    created_at: Utc::now(),
                    status: SubAgentStatus::Running,
                    profile,
                    prompt: prompt.clone(),
                    result: None,
                    error: None,
                    cancel_flag: Arc::clone(&cancel_flag),
                    handle: None,
                    notify: Arc::clone(&notify),
                },
            );
        }

        let signal = CancelSignal(cancel_flag);
        let worker = tokio::spawn(run_fn(prompt, profile, signal));
        let abort_handle = worker.abort_handle();

        {
            let mut entries = self.entries.lock().await;
            if let Some(entry) = entries.get_mut(&id) {
                entry.handle = Some(abort_handle);
            }
        }

        let scheduler = Arc::clone(self);
        let id_for_task = id.clone();
        tokio::spawn(async move {
            let result = match worker.await {
                Ok(r) => r,
                Err(join_err) if join_err.is_cancelled() => Err("cancelled".to_string()),
                Err(join_err) => Err(format!("sub-agent panicked: {join_err}")),
            };
            let mut entries = scheduler.entries.lock().await;
            if let Some(entry) = entries.get_mut(&id_for_task) {
                match result {
                    Ok(value) => {
                        entry.status = SubAgentStatus::Done;
                        entry.result = Some(value);
                    }
                    Err(message) => {
                        tracing::warn!(id = %id_for_task, %message, "sub-agent: worker failed");
                        entry.status = SubAgentStatus::Error;
                        entry.error = Some(message);
                    }
                }
                entry.handle = None;
                entry.notify.notify_waiters();
            }
        });

        id
    }

    /// Non-blocking snapshot of a sub-agent's current state.
    pub async fn status(&self, id: &str) -> Result<SubAgentSnapshot, SchedulerError> {
        let entries = self.entries.lock().await;
        let entry = entries
            .get(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        Ok(SubAgentSnapshot {
            status: entry.status,
            profile: entry.profile,
            prompt: entry.prompt.clone(),
            result: entry.result.clone(),
            error: entry.error.clone(),
            created_at: entry.created_at,
        })
    }

    /// Block until the sub-agent reaches a terminal state, returning its
    /// result or propagating its error.
    pub async fn await_result(&self, id: &str) -> Result<Value, SchedulerError> {
        loop {
            let notify = {
                let entries = self.entries.lock().await;
                let entry = entries
                    .get(id)
                    .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
                match entry.status {
                    SubAgentStatus::Done => return Ok(entry.result.clone().unwrap_or(Value::Null)),
                    SubAgentStatus::Error => {
                        return Err(SchedulerError::Worker(
                            entry.error.clone().unwrap_or_default(),
                        ))
                    }
                    SubAgentStatus::Running => Arc::clone(&entry.notify),
                }
            };
            notify.notified().await;
        }
    }

    /// Cancel a running sub-agent. Idempotent: cancelling an already
    /// terminal sub-agent is a no-op. The worker transitions to
    /// `status = error, error = "cancelled"` once its task unwinds.
    pub async fn cancel(&self, id: &str) -> Result<(), SchedulerError> {
        let entries = self.entries.lock().await;
        let entry = entries
            .get(id)
            .ok_or_else(|| SchedulerError::NotFound(id.to_string()))?;
        entry.cancel_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = &entry.handle {
            handle.abort();
        }
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
