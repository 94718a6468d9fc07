use chrono::{DateTime, Utc};
use rusqlite::Row;

use crate::db::Database;
use crate::error::EngineError;
use crate::models::prompt::{Prompt, PromptStatus};

pub(crate) const PROMPT_COLUMNS: &str = "id, job_id, src, position, status, created_at, updated_at";

#[derive(Clone)]
pub struct PromptStore {
    db: Database,
}

impl PromptStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, prompt: &Prompt) -> Result<Prompt, EngineError> {
        let p = prompt.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO prompts (id, job_id, src, position, status, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                       src = excluded.src,
                       position = excluded.position,
                       status = excluded.status,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        p.id,
                        p.job_id,
                        p.src,
                        p.position,
                        p.status.as_str(),
                        p.created_at.timestamp_millis(),
                        p.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(prompt.clone())
    }

    pub async fn find_by_job_id(&self, job_id: &str) -> Result<Vec<Prompt>, EngineError> {
        let id = job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM prompts WHERE job_id = ?1 ORDER BY position ASC, created_at ASC",
                    PROMPT_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![id], |row| Ok(row_to_prompt(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn delete_by_job_id(&self, job_id: &str) -> Result<usize, EngineError> {
        let id = job_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute("DELETE FROM prompts WHERE job_id = ?1", rusqlite::params![id])
            })
            .await
    }
}

pub(crate) fn row_to_prompt(row: &Row<'_>) -> Prompt {
    let to_dt = |ms: Option<i64>| ms.and_then(DateTime::<Utc>::from_timestamp_millis);

    Prompt {
        id: row.get(0).unwrap_or_default(),
        job_id: row.get(1).unwrap_or_default(),
        src: row.get(2).unwrap_or_default(),
        position: row.get(3).unwrap_or(0),
        status: PromptStatus::from_str(&row.get::<_, String>(4).unwrap_or_default())
            .unwrap_or(PromptStatus::Unknown),
        created_at: to_dt(row.get(5).ok()).unwrap_or_else(Utc::now),
        updated_at: to_dt(row.get(6).ok()).unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_updates_status_in_place() {
        let store = PromptStore::new(Database::open_in_memory().unwrap());
        let prompt = Prompt::new("p1".into(), "j1".into(), "launch.xml".into(), 0);
        store.save(&prompt).await.unwrap();
        store
            .save(&prompt.clone().with_status(PromptStatus::Completed))
            .await
            .unwrap();

        let prompts = store.find_by_job_id("j1").await.unwrap();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].status, PromptStatus::Completed);
    }

    #[tokio::test]
    async fn test_delete_by_job_id() {
        let store = PromptStore::new(Database::open_in_memory().unwrap());
        for (i, src) in ["a.xml", "b.md"].iter().enumerate() {
            store
                .save(&Prompt::new(format!("p{}", i), "j1".into(), src.to_string(), i as i64))
                .await
                .unwrap();
        }
        store
            .save(&Prompt::new("other".into(), "j2".into(), "c.txt".into(), 0))
            .await
            .unwrap();

        assert_eq!(store.delete_by_job_id("j1").await.unwrap(), 2);
        assert!(store.find_by_job_id("j1").await.unwrap().is_empty());
        assert_eq!(store.find_by_job_id("j2").await.unwrap().len(), 1);
    }
}
