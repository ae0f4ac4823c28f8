// src/config.rs
use crate::errors::IngestError;
use std::str::FromStr;
use std::time::Duration;

/// Target box and quality for one derived asset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleTarget {
    pub max_dim: u32,
    /// Fractional, 0 < quality <= 1.
    pub quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub main: ResampleTarget,
    pub thumbnail: ResampleTarget,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            main: ResampleTarget {
                max_dim: 1280,
                quality: 0.82,
            },
            thumbnail: ResampleTarget {
                max_dim: 400,
                quality: 0.6,
            },
        }
    }
}

/// How the orchestrator re-attempts a failed upload. The uploader itself never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    None,
    ExponentialBackoff {
        max_retries: u32,
        base_delay: Duration,
    },
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), or `None` once exhausted.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        match *self {
            RetryPolicy::None => None,
            RetryPolicy::ExponentialBackoff {
                max_retries,
                base_delay,
            } => {
                if attempt == 0 || attempt > max_retries {
                    return None;
                }
                let factor = 1u32 << (attempt - 1).min(16);
                Some(base_delay.saturating_mul(factor))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_key: String,
    pub storage_bucket: String,
    pub redis_url: String,
    pub bind_addr: String,
    pub pipeline: PipelineConfig,
    pub retry: RetryPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests need not touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| IngestError::Config(format!("{} must be set", key)))
        };

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            main: ResampleTarget {
                max_dim: parse_or(&lookup, "MAIN_MAX_DIM", defaults.main.max_dim)?,
                quality: parse_quality(&lookup, "MAIN_QUALITY", defaults.main.quality)?,
            },
            thumbnail: ResampleTarget {
                max_dim: parse_or(&lookup, "THUMB_MAX_DIM", defaults.thumbnail.max_dim)?,
                quality: parse_quality(&lookup, "THUMB_QUALITY", defaults.thumbnail.quality)?,
            },
        };
        if pipeline.main.max_dim == 0 || pipeline.thumbnail.max_dim == 0 {
            return Err(IngestError::Config(
                "maximum dimensions must be positive".to_string(),
            ));
        }

        let max_retries: u32 = parse_or(&lookup, "UPLOAD_RETRIES", 0)?;
        let retry = if max_retries == 0 {
            RetryPolicy::None
        } else {
            RetryPolicy::ExponentialBackoff {
                max_retries,
                base_delay: Duration::from_millis(parse_or(&lookup, "UPLOAD_RETRY_BASE_MS", 250)?),
            }
        };

        Ok(Self {
            supabase_url: required("SUPABASE_URL")?.trim_end_matches('/').to_string(),
            supabase_key: required("SUPABASE_KEY")?,
            storage_bucket: lookup("STORAGE_BUCKET").unwrap_or_else(|| "artworks".to_string()),
            redis_url: lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            pipeline,
            retry,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, IngestError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| IngestError::Config(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

fn parse_quality<F>(lookup: &F, key: &str, default: f32) -> Result<f32, IngestError>
where
    F: Fn(&str) -> Option<String>,
{
    let quality: f32 = parse_or(lookup, key, default)?;
    if quality > 0.0 && quality <= 1.0 {
        Ok(quality)
    } else {
        Err(IngestError::Config(format!(
            "{} must be in (0, 1], got {}",
            key, quality
        )))
    }
}
