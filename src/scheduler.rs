//! Lightweight periodic job engine.
//!
//! Each job is a spawned loop over a `tokio::time::interval`. Two
//! properties hold by construction:
//!
//! - **Single instance per job**: the loop awaits the job future before
//!   polling the ticker again, so a running execution blocks the next tick.
//! - **Coalescing**: `MissedTickBehavior::Skip` folds any backlog of missed
//!   ticks into one catch-up execution.
//!
//! Jobs registered before [`Scheduler::start`] stay dormant until `start`;
//! jobs added afterwards begin ticking immediately. The first execution of
//! a job happens one full period after it starts ticking.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Job {
    interval: Duration,
    task: JobFn,
    handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

/// Info snapshot returned by [`Scheduler::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub interval: Duration,
    pub running: bool,
}

struct SchedulerState {
    started: bool,
    jobs: HashMap<String, Job>,
}

pub struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                started: false,
                jobs: HashMap::new(),
            }),
        }
    }

    /// Registers (or replaces) a periodic job.
    pub async fn add<F, Fut>(&self, job_id: &str, interval: Duration, task: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task: JobFn = Arc::new(move || Box::pin(task()));

        let mut state = self.state.lock().await;

        // Replacing an existing job stops its loop first
        if let Some(mut previous) = state.jobs.remove(job_id) {
            stop_job(&mut previous, false).await;
        }

        let mut job = Job {
            interval,
            task,
            handle: None,
            shutdown_tx: None,
        };
        if state.started {
            spawn_job(job_id, &mut job);
        }
        state.jobs.insert(job_id.to_string(), job);
        tracing::info!(job = %job_id, interval_secs = interval.as_secs(), "Scheduled job");
    }

    /// Changes a job's interval. Returns `false` for unknown ids.
    ///
    /// A running execution is not interrupted; the new interval applies
    /// from the restart of the job loop.
    pub async fn reschedule(&self, job_id: &str, interval: Duration) -> bool {
        let mut state = self.state.lock().await;
        let started = state.started;
        let Some(job) = state.jobs.get_mut(job_id) else {
            return false;
        };

        stop_job(job, false).await;
        job.interval = interval;
        if started {
            spawn_job(job_id, job);
        }
        tracing::info!(job = %job_id, interval_secs = interval.as_secs(), "Rescheduled job");
        true
    }

    /// Removes a job, stopping its loop. Returns `false` for unknown ids.
    pub async fn remove(&self, job_id: &str) -> bool {
        let mut state = self.state.lock().await;
        match state.jobs.remove(job_id) {
            Some(mut job) => {
                stop_job(&mut job, false).await;
                tracing::info!(job = %job_id, "Removed job");
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, job_id: &str) -> Option<JobInfo> {
        let state = self.state.lock().await;
        state.jobs.get(job_id).map(|job| JobInfo {
            interval: job.interval,
            running: job.handle.is_some(),
        })
    }

    /// Starts ticking all registered jobs. Idempotent.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if state.started {
            return;
        }
        state.started = true;
        for (job_id, job) in state.jobs.iter_mut() {
            spawn_job(job_id, job);
        }
        tracing::info!(jobs = state.jobs.len(), "Scheduler started");
    }

    /// Stops all job loops.
    ///
    /// With `wait = true`, in-flight executions finish before this returns;
    /// otherwise they are aborted.
    pub async fn shutdown(&self, wait: bool) {
        let mut state = self.state.lock().await;
        if !state.started {
            return;
        }
        state.started = false;

        for job in state.jobs.values_mut() {
            stop_job(job, wait).await;
        }
        tracing::info!("Scheduler shut down");
    }
}

fn spawn_job(job_id: &str, job: &mut Job) {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let task = Arc::clone(&job.task);
    let interval = job.interval;
    let id = job_id.to_string();

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval completes immediately;
        // consume it so the first execution lands one period out.
        ticker.tick().await;

        loop {
            tokio::select! {
                // Shutdown wins when both are ready
                biased;
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    tracing::debug!(job = %id, "Job tick");
                    (task)().await;
                }
            }
        }
    });

    job.handle = Some(handle);
    job.shutdown_tx = Some(shutdown_tx);
}

async fn stop_job(job: &mut Job, wait: bool) {
    if let Some(shutdown_tx) = job.shutdown_tx.take() {
        let _ = shutdown_tx.send(true);
    }
    if let Some(handle) = job.handle.take() {
        if wait {
            let _ = handle.await;
        } else {
            handle.abort();
        }
    }
}
