//! Poll-until-terminal loop for long-running backend jobs.
//!
//! A job is submitted once; the returned handle becomes the active handle
//! for its job class and a spawned loop queries its status on a fixed
//! interval until the job succeeds or fails. Starting another job of the
//! same class supersedes the first: the old loop stops at its next check and
//! its result, should one still arrive, is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::status::{Progress, TaskFailure, TaskHandle, TaskOutcome, TaskStatus};
use crate::api::ApiError;

/// Default delay between status queries.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A kind of backend job that can be started and observed.
#[async_trait]
pub trait TaskSource<R>: Send + Sync {
    async fn submit(&self) -> Result<TaskHandle, ApiError>;

    async fn fetch_status(&self, handle: &TaskHandle) -> Result<TaskStatus<R>, ApiError>;
}

/// Source of delays between polls, swappable in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[derive(Debug, Clone)]
struct ActiveTask {
    generation: u64,
    handle: TaskHandle,
}

/// Returned by [`TaskPoller::start`] once the job has been submitted.
#[derive(Debug)]
pub struct PollTicket {
    pub handle: TaskHandle,
    pub generation: u64,
    join: JoinHandle<()>,
}

impl PollTicket {
    /// Wait for the poll loop to exit, whether terminal or superseded.
    pub async fn finished(self) {
        if let Err(e) = self.join.await {
            warn!(handle = %self.handle, error = %e, "Poll loop aborted");
        }
    }
}

#[derive(Clone)]
pub struct TaskPoller {
    interval: Duration,
    sleeper: Arc<dyn Sleeper>,
    active: Arc<Mutex<HashMap<String, ActiveTask>>>,
    next_generation: Arc<AtomicU64>,
}

impl Default for TaskPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl TaskPoller {
    pub fn new(interval: Duration) -> Self {
        Self::with_sleeper(interval, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(interval: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            interval,
            sleeper,
            active: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Handle currently tracked for `job_class`, if a job is in flight.
    pub fn active_handle(&self, job_class: &str) -> Option<TaskHandle> {
        self.lock_active().get(job_class).map(|t| t.handle.clone())
    }

    pub fn is_active(&self, job_class: &str) -> bool {
        self.lock_active().contains_key(job_class)
    }

    /// Stop tracking `job_class`. Its loop exits at the next check and its
    /// result is never delivered.
    pub fn reset(&self, job_class: &str) {
        if let Some(task) = self.lock_active().remove(job_class) {
            debug!(job_class, handle = %task.handle, "Task tracking reset");
        }
    }

    /// Submit a job and poll it until it reaches a terminal state.
    ///
    /// `on_terminal` runs at most once, and never for a superseded job.
    /// A failed submission is returned directly and starts no loop.
    pub async fn start<R, S, F>(&self, job_class: &str, source: Arc<S>, on_terminal: F) -> Result<PollTicket, ApiError>
    where
        R: Send + 'static,
        S: TaskSource<R> + ?Sized + 'static,
        F: FnOnce(TaskOutcome<R>) + Send + 'static,
    {
        self.start_with_progress(job_class, source, |_: &Progress| {}, on_terminal)
            .await
    }

    /// Like [`start`](Self::start), additionally reporting progress from
    /// `Running` statuses.
    pub async fn start_with_progress<R, S, P, F>(
        &self,
        job_class: &str,
        source: Arc<S>,
        on_progress: P,
        on_terminal: F,
    ) -> Result<PollTicket, ApiError>
    where
        R: Send + 'static,
        S: TaskSource<R> + ?Sized + 'static,
        P: FnMut(&Progress) + Send + 'static,
        F: FnOnce(TaskOutcome<R>) + Send + 'static,
    {
        let handle = source.submit().await?;
        let generation = self.activate(job_class, handle.clone());
        info!(job_class, handle = %handle, generation, "Task submitted, polling for status");

        let poller = self.clone();
        let job_class = job_class.to_string();
        let loop_handle = handle.clone();
        let join = tokio::spawn(async move {
            poller
                .run(job_class, generation, loop_handle, source, on_progress, on_terminal)
                .await;
        });

        Ok(PollTicket {
            handle,
            generation,
            join,
        })
    }

    async fn run<R, S, P, F>(
        self,
        job_class: String,
        generation: u64,
        handle: TaskHandle,
        source: Arc<S>,
        mut on_progress: P,
        on_terminal: F,
    ) where
        S: TaskSource<R> + ?Sized,
        P: FnMut(&Progress),
        F: FnOnce(TaskOutcome<R>),
    {
        let mut queries: u64 = 0;
        loop {
            if !self.is_current(&job_class, generation) {
                debug!(job_class = %job_class, handle = %handle, queries, "Task superseded, poll loop stopping");
                return;
            }

            queries += 1;
            let outcome = match source.fetch_status(&handle).await {
                Ok(TaskStatus::Succeeded(result)) => TaskOutcome::Succeeded(result),
                Ok(TaskStatus::Failed(message)) => TaskOutcome::Failed(TaskFailure::Job(message)),
                Ok(TaskStatus::Pending) => {
                    self.sleeper.sleep(self.interval).await;
                    continue;
                }
                Ok(TaskStatus::Running(progress)) => {
                    if let Some(ref progress) = progress {
                        if self.is_current(&job_class, generation) {
                            on_progress(progress);
                        }
                    }
                    self.sleeper.sleep(self.interval).await;
                    continue;
                }
                Err(e) => {
                    warn!(handle = %handle, error = %e, "Status query failed, abandoning task");
                    TaskOutcome::Failed(TaskFailure::Transport(e))
                }
            };

            if self.finish(&job_class, generation) {
                info!(
                    job_class = %job_class,
                    handle = %handle,
                    queries,
                    success = outcome.is_success(),
                    "Task reached terminal state"
                );
                on_terminal(outcome);
            } else {
                debug!(handle = %handle, "Ignoring terminal result of superseded task");
            }
            return;
        }
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, ActiveTask>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn activate(&self, job_class: &str, handle: TaskHandle) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self
            .lock_active()
            .insert(job_class.to_string(), ActiveTask { generation, handle });
        if let Some(previous) = previous {
            info!(job_class, superseded = %previous.handle, "Superseding active task");
        }
        generation
    }

    fn is_current(&self, job_class: &str, generation: u64) -> bool {
        self.lock_active()
            .get(job_class)
            .map(|t| t.generation == generation)
            .unwrap_or(false)
    }

    /// Clear the active slot if it still belongs to `generation`.
    fn finish(&self, job_class: &str, generation: u64) -> bool {
        let mut active = self.lock_active();
        match active.get(job_class) {
            Some(task) if task.generation == generation => {
                active.remove(job_class);
                true
            }
            _ => false,
        }
    }
}
