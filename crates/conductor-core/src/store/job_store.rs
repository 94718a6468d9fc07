use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::EngineError;
use crate::models::job::{Job, JobStatus, WorkflowShape};
use crate::models::prompt::Prompt;
use crate::store::prompt_store::{row_to_prompt, PROMPT_COLUMNS};

const JOB_COLUMNS: &str = "id, workflow_path, model, repository, status, remote_agent_id, \
     parent_job_id, bound_value, workflow_type, timeout_millis, workflow_start_time, \
     fallback_src, fallback_executed, fan_out_result, branch_index, created_at, updated_at";

#[derive(Clone)]
pub struct JobStore {
    db: Database,
}

impl JobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or update a job. Returns the job as persisted.
    pub async fn save(&self, job: &Job) -> Result<Job, EngineError> {
        let j = job.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO jobs (id, workflow_path, model, repository, status, remote_agent_id,
                         parent_job_id, bound_value, workflow_type, timeout_millis, workflow_start_time,
                         fallback_src, fallback_executed, fan_out_result, branch_index, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                     ON CONFLICT(id) DO UPDATE SET
                       workflow_path = excluded.workflow_path,
                       model = excluded.model,
                       repository = excluded.repository,
                       status = excluded.status,
                       remote_agent_id = excluded.remote_agent_id,
                       parent_job_id = excluded.parent_job_id,
                       bound_value = excluded.bound_value,
                       workflow_type = excluded.workflow_type,
                       timeout_millis = excluded.timeout_millis,
                       workflow_start_time = excluded.workflow_start_time,
                       fallback_src = excluded.fallback_src,
                       fallback_executed = excluded.fallback_executed,
                       fan_out_result = excluded.fan_out_result,
                       branch_index = excluded.branch_index,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        j.id,
                        j.workflow_path,
                        j.model,
                        j.repository,
                        j.status.as_str(),
                        j.remote_agent_id,
                        j.parent_job_id,
                        j.bound_value,
                        j.workflow_shape.to_column(),
                        j.timeout_millis,
                        j.workflow_start_time.map(|t| t.timestamp_millis()),
                        j.fallback_src,
                        j.fallback_executed as i64,
                        j.fan_out_result,
                        j.branch_index,
                        j.created_at.timestamp_millis(),
                        j.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(job.clone())
    }

    pub async fn find_by_id(&self, job_id: &str) -> Result<Option<Job>, EngineError> {
        let id = job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_job(row)),
                )
                .optional()
            })
            .await
    }

    /// Like `find_by_id`, but a missing job is an error.
    pub async fn get(&self, job_id: &str) -> Result<Job, EngineError> {
        self.find_by_id(job_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Job {}", job_id)))
    }

    /// A job together with its prompts in sequence order.
    pub async fn find_with_details(
        &self,
        job_id: &str,
    ) -> Result<Option<(Job, Vec<Prompt>)>, EngineError> {
        let id = job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let job = conn
                    .query_row(
                        &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                        rusqlite::params![id],
                        |row| Ok(row_to_job(row)),
                    )
                    .optional()?;
                let Some(job) = job else { return Ok(None) };

                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM prompts WHERE job_id = ?1 ORDER BY position ASC, created_at ASC",
                    PROMPT_COLUMNS
                ))?;
                let prompts = stmt
                    .query_map(rusqlite::params![job.id], |row| Ok(row_to_prompt(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some((job, prompts)))
            })
            .await
    }

    /// All jobs that are not in a terminal status, oldest first.
    pub async fn find_unfinished(&self) -> Result<Vec<Job>, EngineError> {
        let [a, b, c] = JobStatus::terminal().map(|s| s.as_str());
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE status NOT IN (?1, ?2, ?3) ORDER BY created_at ASC",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![a, b, c], |row| Ok(row_to_job(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn find_by_parent_id(&self, parent_job_id: &str) -> Result<Vec<Job>, EngineError> {
        let pid = parent_job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE parent_job_id = ?1 ORDER BY created_at ASC",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![pid], |row| Ok(row_to_job(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn find_all(&self) -> Result<Vec<Job>, EngineError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs ORDER BY created_at DESC",
                    JOB_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_job(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete_by_id(&self, job_id: &str) -> Result<bool, EngineError> {
        let id = job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let n = conn.execute("DELETE FROM jobs WHERE id = ?1", rusqlite::params![id])?;
                Ok(n > 0)
            })
            .await
    }
}

fn row_to_job(row: &Row<'_>) -> Job {
    let to_dt = |ms: Option<i64>| ms.and_then(DateTime::<Utc>::from_timestamp_millis);
    let shape: Option<String> = row.get(8).unwrap_or(None);
    let fallback_executed: Option<i64> = row.get(12).unwrap_or(None);

    Job {
        id: row.get(0).unwrap_or_default(),
        workflow_path: row.get(1).unwrap_or_default(),
        model: row.get(2).unwrap_or_default(),
        repository: row.get(3).unwrap_or_default(),
        status: JobStatus::from_str(&row.get::<_, String>(4).unwrap_or_default())
            .unwrap_or(JobStatus::Local),
        remote_agent_id: row.get(5).unwrap_or(None),
        parent_job_id: row.get(6).unwrap_or(None),
        bound_value: row.get(7).unwrap_or(None),
        workflow_shape: WorkflowShape::from_column(shape.as_deref()),
        timeout_millis: row.get(9).unwrap_or(None),
        workflow_start_time: to_dt(row.get(10).unwrap_or(None)),
        fallback_src: row.get(11).unwrap_or(None),
        fallback_executed: fallback_executed.unwrap_or(0) != 0,
        fan_out_result: row.get(13).unwrap_or(None),
        branch_index: row.get(14).unwrap_or(None),
        created_at: to_dt(row.get(15).ok()).unwrap_or_else(Utc::now),
        updated_at: to_dt(row.get(16).ok()).unwrap_or_else(Utc::now),
    }
}
