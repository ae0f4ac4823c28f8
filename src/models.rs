// src/models.rs
use crate::errors::IngestError;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const WEBP_CONTENT_TYPE: &str = "image/webp";
pub const WEBP_EXTENSION: &str = "webp";
pub const THUMB_SUFFIX: &str = "_thumb";
pub const ORIGINAL_SUFFIX: &str = "_original";

/// A freshly selected file: raw bytes plus whatever the browser told us about it.
#[derive(Debug, Clone)]
pub struct BinaryImage {
    pub name: Option<String>,
    pub content_type: String,
    pub bytes: Bytes,
}

impl BinaryImage {
    pub fn new(name: Option<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name,
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Decodes `data:<mime>;base64,<payload>`.
    pub fn from_data_uri(uri: &str) -> Result<Self, IngestError> {
        let rest = uri
            .trim_start()
            .strip_prefix("data:")
            .ok_or_else(|| IngestError::Validation("not a data URI".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| IngestError::Validation("data URI has no payload separator".to_string()))?;

        let mut parts = header.split(';');
        let mime = parts.next().unwrap_or_default().trim();
        if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
            return Err(IngestError::Validation(
                "data URI is not base64 encoded".to_string(),
            ));
        }

        let bytes = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| IngestError::Validation(format!("invalid base64 in data URI: {}", e)))?;

        let content_type = if mime.is_empty() {
            "application/octet-stream"
        } else {
            mime
        };

        Ok(Self::new(None, content_type, bytes))
    }

    /// True when the payload should go through the resampler.
    pub fn is_raster(&self) -> bool {
        let ct = self.content_type.to_ascii_lowercase();
        if ct.starts_with("image/") {
            return true;
        }
        if ct.starts_with("video/") || ct.starts_with("audio/") {
            return false;
        }
        image::guess_format(&self.bytes).is_ok()
    }
}

/// Either a new payload or a reference previously returned by the pipeline.
#[derive(Debug, Clone)]
pub enum SourceImage {
    Binary(BinaryImage),
    Reference(String),
}

impl SourceImage {
    pub fn classify(reference: &str) -> Result<Self, IngestError> {
        if is_data_uri(reference) {
            BinaryImage::from_data_uri(reference).map(SourceImage::Binary)
        } else {
            Ok(SourceImage::Reference(reference.to_string()))
        }
    }
}

pub fn is_data_uri(reference: &str) -> bool {
    reference.trim_start().starts_with("data:")
}

/// Output of the resampler: always WebP.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub name: String,
    pub content_type: String,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// A payload ready to be written under a storage key.
#[derive(Debug, Clone)]
pub struct NamedBinary {
    pub key: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestedAsset {
    pub url: String,
    pub thumbnail_url: Option<String>,
    /// False when the bytes were stored untransformed.
    pub processed: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackfillReport {
    pub attempted: usize,
    pub succeeded: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillProgress {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub current: usize,
    pub total: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl BackfillProgress {
    pub fn started(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Running,
            current: 0,
            total: 0,
            attempted: 0,
            succeeded: 0,
            error: None,
            updated_at: Utc::now(),
        }
    }
}

// Rows read back from the relational store. Only the image columns matter here.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artwork {
    pub id: i64,
    #[serde(default)]
    pub image_urls: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exhibition {
    pub id: i64,
    #[serde(default)]
    pub image_urls: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImaginationArtwork {
    pub id: i64,
    #[serde(default)]
    pub original_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingRow {
    pub key: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// Normalizes the many shapes an image-reference column has been stored in.
pub fn parse_image_urls(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::Array(items) => {
            if let [serde_json::Value::String(single)] = items.as_slice() {
                return parse_image_url_str(single);
            }
            items
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }
        serde_json::Value::String(s) => parse_image_url_str(s),
        _ => Vec::new(),
    }
}

fn parse_image_url_str(raw: &str) -> Vec<String> {
    let s = raw.trim();
    if s.is_empty() {
        return Vec::new();
    }

    if s.starts_with('[') && s.ends_with(']') {
        if let Ok(serde_json::Value::Array(items)) = serde_json::from_str::<serde_json::Value>(s) {
            return items
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|u| !u.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    // Postgres array literal: {a,"b"}
    if s.starts_with('{') && s.ends_with('}') {
        return s[1..s.len() - 1]
            .split(',')
            .map(|item| item.trim().trim_matches('"').to_string())
            .filter(|item| !item.is_empty())
            .collect();
    }

    vec![s.to_string()]
}

// HTTP bodies

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Additional uploads as data URIs, appended after `image_urls`.
    #[serde(default)]
    pub new_images: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub image_urls: Vec<String>,
}
