// src/services/mod.rs
pub mod backfill_service;
pub mod catalog_service;
pub mod image_processor;
pub mod ingest_service;
pub mod naming;
pub mod redis_service;
pub mod storage_service;

pub use backfill_service::BackfillService;
pub use catalog_service::{Catalog, RestCatalog};
pub use image_processor::{Resampler, ThumbnailGenerator, WebpResampler};
pub use ingest_service::IngestService;
pub use redis_service::{ProgressStore, RedisService};
pub use storage_service::{AssetUploader, MemoryStore, ObjectStore, SupabaseStorage};
