//! Timeout tracking.
//!
//! All state lives on the job: `timeout_millis` and the
//! `workflow_start_time` marker. Persistence failures are logged and the
//! original job is returned; the next poll cycle retries.

use chrono::{DateTime, Utc};

use crate::models::job::Job;
use crate::store::JobStore;

/// One consistent read of a job's timeout state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutCheck {
    pub reached: bool,
    pub elapsed_millis: i64,
    pub timeout_millis: Option<i64>,
}

#[derive(Clone)]
pub struct TimeoutTracker {
    jobs: JobStore,
}

impl TimeoutTracker {
    pub fn new(jobs: JobStore) -> Self {
        Self { jobs }
    }

    async fn persist(&self, original: Job, updated: Job) -> Job {
        match self.jobs.save(&updated).await {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!(
                    "[TimeoutTracker] Failed to persist start time for job {}: {}",
                    original.id,
                    e
                );
                original
            }
        }
    }

    /// Stamp the start marker if a timeout is configured and none exists.
    pub async fn ensure_start_time_set(&self, job: Job) -> Job {
        if !job.has_timeout() || job.workflow_start_time.is_some() {
            return job;
        }
        let updated = job.clone().with_workflow_start_time(Utc::now());
        self.persist(job, updated).await
    }

    /// Re-stamp the start marker to now. Used right after a fresh launch.
    pub async fn reset_start_time_if_needed(&self, job: Job) -> Job {
        if !job.has_timeout() {
            return job;
        }
        let updated = job.clone().with_workflow_start_time(Utc::now());
        tracing::debug!("[TimeoutTracker] Timer reset for job {}", job.id);
        self.persist(job, updated).await
    }

    /// Self-heal for non-terminal jobs: re-stamp only a missing marker.
    pub async fn reset_stale_start_time(&self, job: Job) -> Job {
        if job.status.is_terminal() || !job.has_timeout() || job.workflow_start_time.is_some() {
            return job;
        }
        tracing::info!(
            "[TimeoutTracker] Job {} has a timeout but no start time, stamping now",
            job.id
        );
        let updated = job.clone().with_workflow_start_time(Utc::now());
        self.persist(job, updated).await
    }
}

pub fn elapsed_millis_at(job: &Job, now: DateTime<Utc>) -> i64 {
    match (job.timeout_millis, job.workflow_start_time) {
        (Some(_), Some(start)) => (now - start).num_milliseconds().max(0),
        _ => 0,
    }
}

pub fn elapsed_millis(job: &Job) -> i64 {
    elapsed_millis_at(job, Utc::now())
}

pub fn check_timeout_at(job: &Job, now: DateTime<Utc>) -> TimeoutCheck {
    let elapsed_millis = elapsed_millis_at(job, now);
    let reached = match (job.remote_agent_id.as_ref(), job.timeout_millis) {
        (Some(_), Some(timeout)) => job.workflow_start_time.is_some() && elapsed_millis >= timeout,
        _ => false,
    };
    TimeoutCheck {
        reached,
        elapsed_millis,
        timeout_millis: job.timeout_millis,
    }
}

pub fn check_timeout(job: &Job) -> TimeoutCheck {
    check_timeout_at(job, Utc::now())
}

pub fn has_reached_timeout_at(job: &Job, now: DateTime<Utc>) -> bool {
    check_timeout_at(job, now).reached
}

pub fn has_reached_timeout(job: &Job) -> bool {
    has_reached_timeout_at(job, Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::job::{JobStatus, WorkflowShape};
    use chrono::Duration;

    fn job() -> Job {
        Job::new(
            "job-t".to_string(),
            "/wf/workflow.xml".to_string(),
            "m".to_string(),
            "r".to_string(),
            WorkflowShape::Sequence,
        )
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let start = Utc::now();
        let job = job()
            .with_timeout(Some(1_000))
            .with_workflow_start_time(start);
        let t1 = elapsed_millis_at(&job, start + Duration::milliseconds(300));
        let t2 = elapsed_millis_at(&job, start + Duration::milliseconds(900));
        assert!(t2 >= t1);
        assert_eq!(t1, 300);
    }

    #[test]
    fn test_reached_at_boundary() {
        let start = Utc::now();
        let job = job()
            .with_timeout(Some(1_000))
            .with_workflow_start_time(start)
            .with_remote_agent_id("bc-1".to_string());
        assert!(!has_reached_timeout_at(&job, start + Duration::milliseconds(999)));
        assert!(has_reached_timeout_at(&job, start + Duration::milliseconds(1_000)));
        assert!(has_reached_timeout_at(&job, start + Duration::milliseconds(5_000)));
    }

    #[test]
    fn test_not_reached_without_remote_agent_or_timeout() {
        let start = Utc::now() - Duration::hours(1);
        let no_agent = job()
            .with_timeout(Some(1_000))
            .with_workflow_start_time(start);
        assert!(!has_reached_timeout(&no_agent));

        let no_timeout = job()
            .with_workflow_start_time(start)
            .with_remote_agent_id("bc-1".to_string());
        assert!(!has_reached_timeout(&no_timeout));
        assert_eq!(elapsed_millis(&no_timeout), 0);
    }

    #[tokio::test]
    async fn test_start_time_helpers() {
        let store = JobStore::new(Database::open_in_memory().unwrap());
        let tracker = TimeoutTracker::new(store.clone());

        let untimed = tracker.ensure_start_time_set(job()).await;
        assert!(untimed.workflow_start_time.is_none());

        let timed = tracker
            .ensure_start_time_set(job().with_timeout(Some(5_000)))
            .await;
        let first = timed.workflow_start_time.unwrap();
        assert!(first <= Utc::now());
        assert!(store.find_by_id("job-t").await.unwrap().unwrap().workflow_start_time.is_some());

        let kept = tracker.reset_stale_start_time(timed.clone()).await;
        assert_eq!(kept.workflow_start_time, Some(first));

        let healed = tracker
            .reset_stale_start_time(job().with_timeout(Some(5_000)).with_status(JobStatus::Running))
            .await;
        assert!(healed.workflow_start_time.is_some());

        let old = timed.with_workflow_start_time(first - Duration::minutes(10));
        let reset = tracker.reset_start_time_if_needed(old).await;
        assert!(reset.workflow_start_time.unwrap() >= first);
    }
}
