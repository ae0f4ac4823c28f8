// src/lib.rs
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;

use crate::services::{BackfillService, Catalog, IngestService, ProgressStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub backfill: Arc<BackfillService>,
    pub catalog: Arc<dyn Catalog>,
    pub jobs: Arc<dyn ProgressStore>,
}
