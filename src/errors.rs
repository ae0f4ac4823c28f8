// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Thumbnail error: {0}")]
    Thumbnail(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl IngestError {
    /// Decode and encode failures leave the source untouched, so the caller
    /// can still store the original bytes.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, IngestError::Decode(_) | IngestError::Encode(_))
    }
}

impl ResponseError for IngestError {
    fn error_response(&self) -> HttpResponse {
        match self {
            IngestError::Decode(_) | IngestError::Validation(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Invalid image",
                    "message": self.to_string()
                }))
            }
            IngestError::Upload(_) => HttpResponse::BadGateway().json(serde_json::json!({
                "error": "Storage error",
                "message": self.to_string()
            })),
            IngestError::Catalog(_) => HttpResponse::BadGateway().json(serde_json::json!({
                "error": "Database error",
                "message": self.to_string()
            })),
            IngestError::Redis(_) => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Job store error",
                "message": self.to_string()
            })),
            IngestError::Encode(_) | IngestError::Thumbnail(_) | IngestError::Task(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Image processing error",
                    "message": self.to_string()
                }))
            }
            IngestError::Serialization(_) | IngestError::Config(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Data processing error",
                    "message": self.to_string()
                }))
            }
        }
    }
}
