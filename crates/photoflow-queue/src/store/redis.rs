//! Redis-backed job store for multi-node deployments.
//!
//! Jobs live in a hash keyed by id; the waiting queue is a sorted set
//! scored by priority so that ZPOPMAX yields the most urgent job. A Lua
//! script makes the claim atomic across the queue and the hash.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info};

use photoflow_core::config::RedisConfig;
use photoflow_core::error::AppError;
use photoflow_core::result::AppResult;
use photoflow_core::types::{BatchJob, JobState};

use super::{JobCounts, JobStore};

/// Lua script for an atomic claim.
///
/// KEYS[1] = waiting sorted set
/// KEYS[2] = jobs hash
///
/// Pops the highest-priority waiting id and returns its serialized job,
/// or false when the queue is empty.
const CLAIM_SCRIPT: &str = r#"
    local popped = redis.call('ZPOPMAX', KEYS[1], 1)
    if #popped == 0 then
        return false
    end
    return redis.call('HGET', KEYS[2], popped[1])
"#;

/// Redis-backed [`JobStore`].
#[derive(Clone)]
pub struct RedisJobStore {
    conn: redis::aio::ConnectionManager,
    waiting_key: String,
    jobs_key: String,
}

// ConnectionManager does not implement Debug.
impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("waiting_key", &self.waiting_key)
            .field("jobs_key", &self.jobs_key)
            .finish_non_exhaustive()
    }
}

impl RedisJobStore {
    /// Connect to Redis using the queue connection parameters.
    pub async fn connect(config: &RedisConfig) -> AppResult<Self> {
        let auth = config
            .password
            .as_deref()
            .map(|p| format!(":{p}@"))
            .unwrap_or_default();
        let url = format!(
            "redis://{auth}{}:{}/{}",
            config.host, config.port, config.db
        );

        let client = redis::Client::open(url)
            .map_err(|e| AppError::queue(format!("Redis connection failed: {e}")))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| AppError::queue(format!("Redis connection manager failed: {e}")))?;

        info!(host = %config.host, port = config.port, "Redis job store connected");

        Ok(Self {
            conn,
            waiting_key: format!("{}jobs:waiting", config.key_prefix),
            jobs_key: format!("{}jobs:data", config.key_prefix),
        })
    }

    async fn write_job(&self, job: &BatchJob) -> AppResult<()> {
        let serialized = serde_json::to_string(job)?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(&self.jobs_key, &job.job_id, serialized)
            .await
            .map_err(|e| AppError::queue(format!("Redis HSET failed: {e}")))?;
        Ok(())
    }

    async fn read_job(&self, job_id: &str) -> AppResult<Option<BatchJob>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(&self.jobs_key, job_id)
            .await
            .map_err(|e| AppError::queue(format!("Redis HGET failed: {e}")))?;
        raw.map(|r| serde_json::from_str(&r).map_err(AppError::from))
            .transpose()
    }

    async fn all_jobs(&self) -> AppResult<Vec<BatchJob>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .hvals(&self.jobs_key)
            .await
            .map_err(|e| AppError::queue(format!("Redis HVALS failed: {e}")))?;
        raw.iter()
            .map(|r| serde_json::from_str(r).map_err(AppError::from))
            .collect()
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn submit(&self, job: BatchJob) -> AppResult<()> {
        self.write_job(&job).await?;
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(&self.waiting_key, &job.job_id, job.options.priority)
            .await
            .map_err(|e| AppError::queue(format!("Redis ZADD failed: {e}")))?;
        debug!(job_id = %job.job_id, "Submitted job to Redis queue");
        Ok(())
    }

    async fn claim_next(&self) -> AppResult<Option<BatchJob>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::Script::new(CLAIM_SCRIPT)
            .key(&self.waiting_key)
            .key(&self.jobs_key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::queue(format!("Redis claim failed: {e}")))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut job: BatchJob = serde_json::from_str(&raw)?;
        job.state = JobState::Active;
        job.attempts_made += 1;
        self.write_job(&job).await?;
        Ok(Some(job))
    }

    async fn complete(&self, job_id: &str) -> AppResult<()> {
        let mut job = self
            .read_job(job_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Unknown job: {job_id}")))?;
        job.state = JobState::Completed;
        job.finished_at = Some(chrono::Utc::now());
        self.write_job(&job).await
    }

    async fn fail(&self, job_id: &str, error: &str) -> AppResult<()> {
        let mut job = self
            .read_job(job_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Unknown job: {job_id}")))?;
        job.state = JobState::Failed;
        job.error_message = Some(error.to_string());
        job.finished_at = Some(chrono::Utc::now());
        self.write_job(&job).await
    }

    async fn requeue(&self, job_id: &str) -> AppResult<()> {
        let mut job = self
            .read_job(job_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Unknown job: {job_id}")))?;
        job.state = JobState::Waiting;
        job.error_message = None;
        job.finished_at = None;
        self.write_job(&job).await?;

        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(&self.waiting_key, job_id, job.options.priority)
            .await
            .map_err(|e| AppError::queue(format!("Redis ZADD failed: {e}")))?;
        Ok(())
    }

    async fn get(&self, job_id: &str) -> AppResult<Option<BatchJob>> {
        self.read_job(job_id).await
    }

    async fn counts(&self) -> AppResult<JobCounts> {
        let mut counts = JobCounts::default();
        for job in self.all_jobs().await? {
            match job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Failed => counts.failed += 1,
                JobState::Completed => {}
            }
        }
        Ok(counts)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::queue(format!("Redis PING failed: {e}")))?;
        Ok(())
    }

    async fn cleanup(
        &self,
        keep_completed: usize,
        keep_failed: usize,
        max_age_ms: i64,
    ) -> AppResult<usize> {
        let now = chrono::Utc::now();
        let mut removable: Vec<String> = Vec::new();

        for state in [JobState::Completed, JobState::Failed] {
            let keep = match state {
                JobState::Completed => keep_completed,
                _ => keep_failed,
            };
            let mut finished: Vec<BatchJob> = self
                .all_jobs()
                .await?
                .into_iter()
                .filter(|j| j.state == state)
                .collect();
            finished.sort_by(|a, b| {
                b.finished_at
                    .unwrap_or(b.created_at)
                    .cmp(&a.finished_at.unwrap_or(a.created_at))
            });
            for (idx, job) in finished.iter().enumerate() {
                let age_ms = (now - job.finished_at.unwrap_or(job.created_at)).num_milliseconds();
                if idx >= keep || age_ms > max_age_ms {
                    removable.push(job.job_id.clone());
                }
            }
        }

        let removed = removable.len();
        let mut conn = self.conn.clone();
        for id in removable {
            let _: () = conn
                .hdel(&self.jobs_key, &id)
                .await
                .map_err(|e| AppError::queue(format!("Redis HDEL failed: {e}")))?;
        }
        Ok(removed)
    }

    async fn close(&self) -> AppResult<()> {
        // ConnectionManager has no explicit close; dropping the last clone
        // tears the connection down.
        Ok(())
    }
}
