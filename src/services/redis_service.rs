// src/services/redis_service.rs
use crate::errors::IngestError;
use crate::models::BackfillProgress;
use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use uuid::Uuid;

const JOB_TTL_SECS: usize = 86400;

pub fn job_key(job_id: &Uuid) -> String {
    format!("backfill:{}", job_id)
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn store_progress(&self, progress: &BackfillProgress) -> Result<(), IngestError>;

    async fn get_progress(&self, job_id: &Uuid) -> Result<Option<BackfillProgress>, IngestError>;
}

/// Progress of backfill jobs, kept for a day.
pub struct RedisService {
    client: Client,
}

impl RedisService {
    pub async fn new(redis_url: &str) -> Result<Self, IngestError> {
        let client = Client::open(redis_url).map_err(|e| IngestError::Redis(e.to_string()))?;

        // Test connection
        let mut conn = client
            .get_async_connection()
            .await
            .map_err(|e| IngestError::Redis(e.to_string()))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| IngestError::Redis(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl ProgressStore for RedisService {
    async fn store_progress(&self, progress: &BackfillProgress) -> Result<(), IngestError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| IngestError::Redis(e.to_string()))?;

        let value = serde_json::to_string(progress)
            .map_err(|e| IngestError::Serialization(e.to_string()))?;

        conn.set_ex::<_, _, ()>(job_key(&progress.job_id), value, JOB_TTL_SECS)
            .await
            .map_err(|e| IngestError::Redis(e.to_string()))?;

        Ok(())
    }

    async fn get_progress(&self, job_id: &Uuid) -> Result<Option<BackfillProgress>, IngestError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| IngestError::Redis(e.to_string()))?;

        let value: Option<String> = conn
            .get(job_key(job_id))
            .await
            .map_err(|e| IngestError::Redis(e.to_string()))?;

        value
            .map(|v| serde_json::from_str(&v).map_err(|e| IngestError::Serialization(e.to_string())))
            .transpose()
    }
}
