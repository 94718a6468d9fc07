//! Polling driver and scheduler.
//!
//! Each cycle loads every unfinished job and dispatches it to the handler for
//! its shape. Jobs are processed one at a time; a failing job is moved to
//! `ERROR` and never aborts the cycle.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::parallel::ParallelHandler;
use super::parallel_child::ParallelChildHandler;
use super::parser::determine_shape;
use super::sequential::SequentialHandler;
use crate::error::EngineError;
use crate::models::job::{Job, JobStatus, WorkflowShape};
use crate::state::AppState;

/// Counts from one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub processed: usize,
    pub failed: usize,
}

pub struct Poller {
    state: AppState,
    sequential: SequentialHandler,
    parallel: ParallelHandler,
    child: ParallelChildHandler,
}

impl Poller {
    pub fn new(state: AppState) -> Self {
        Self {
            sequential: SequentialHandler::new(state.clone()),
            parallel: ParallelHandler::new(state.clone()),
            child: ParallelChildHandler::new(state.clone()),
            state,
        }
    }

    /// Run one cycle over all unfinished jobs.
    pub async fn poll_once(&self) -> Result<PollSummary, EngineError> {
        let jobs = self.state.job_store.find_unfinished().await?;
        let mut summary = PollSummary::default();

        if !jobs.is_empty() {
            tracing::debug!("[Poller] {} unfinished jobs", jobs.len());
        }

        for job_id in jobs.into_iter().map(|j| j.id) {
            // Handlers earlier in the cycle may have touched this job.
            let job = match self.state.job_store.find_by_id(&job_id).await {
                Ok(Some(job)) if !job.status.is_terminal() => job,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("[Poller] Could not reload job {}: {}", job_id, e);
                    continue;
                }
            };
            summary.processed += 1;
            if let Err(e) = self.process(job).await {
                summary.failed += 1;
                tracing::error!("[Poller] Job {} failed: {}", job_id, e);
                self.mark_error(&job_id).await;
            }
        }
        Ok(summary)
    }

    async fn process(&self, job: Job) -> Result<(), EngineError> {
        if job.is_child() {
            return self.child.handle(job).await;
        }

        let job = match job.workflow_shape {
            WorkflowShape::Unknown => self.resolve_shape(job).await?,
            _ => job,
        };

        match job.workflow_shape {
            WorkflowShape::Sequence => self.sequential.handle(job).await,
            WorkflowShape::Parallel => self.parallel.handle(job).await,
            WorkflowShape::Unknown => Err(EngineError::Internal(format!(
                "cannot determine workflow shape of {}",
                job.workflow_path
            ))),
        }
    }

    async fn resolve_shape(&self, job: Job) -> Result<Job, EngineError> {
        let shape = determine_shape(&job.workflow_path);
        if shape == WorkflowShape::Unknown {
            return Ok(job);
        }
        tracing::info!("[Poller] Job {} resolved as {}", job.id, shape.as_str());
        self.state.job_store.save(&job.with_shape(shape)).await
    }

    async fn mark_error(&self, job_id: &str) {
        match self.state.job_store.find_by_id(job_id).await {
            Ok(Some(job)) if !job.status.is_terminal() => {
                if let Err(e) = self.state.job_store.save(&job.with_status(JobStatus::Error)).await {
                    tracing::warn!("[Poller] Could not mark job {} as ERROR: {}", job_id, e);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("[Poller] Could not reload job {}: {}", job_id, e),
        }
    }
}

/// Owns the repeating poll task.
pub struct Scheduler {
    poller: Poller,
}

impl Scheduler {
    pub fn new(poller: Poller) -> Self {
        Self { poller }
    }

    /// Start polling every `interval`. The first cycle runs immediately.
    pub fn start(self, interval: Duration) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let poller = self.poller;

        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!("[Scheduler] Polling every {:?}", interval);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = tick.tick() => {
                        match poller.poll_once().await {
                            Ok(summary) if summary.processed > 0 => tracing::info!(
                                "[Scheduler] Cycle done: {} jobs, {} failed",
                                summary.processed,
                                summary.failed
                            ),
                            Ok(_) => {}
                            Err(e) => tracing::error!("[Scheduler] Poll cycle failed: {}", e),
                        }
                    }
                }
            }
            tracing::info!("[Scheduler] Stopped");
        });

        SchedulerHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

pub struct SchedulerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop after the cycle in progress and wait for the task to end.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!("[Scheduler] Poll task ended abnormally: {}", e);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
