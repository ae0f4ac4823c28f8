// src/services/backfill_service.rs
use crate::config::ResampleTarget;
use crate::errors::IngestError;
use crate::models::{BackfillReport, BinaryImage, WEBP_CONTENT_TYPE};
use crate::services::catalog_service::Catalog;
use crate::services::image_processor::{Resampler, ThumbnailGenerator};
use crate::services::naming;
use crate::services::storage_service::ObjectStore;
use bytes::Bytes;
use log::{info, warn};
use std::collections::HashSet;
use std::sync::Arc;

/// Generates missing thumbnails for assets stored before thumbnails existed.
///
/// Items are processed one at a time to keep load on the backend bounded.
pub struct BackfillService {
    store: Arc<dyn ObjectStore>,
    thumbnails: ThumbnailGenerator,
}

/// A main asset lacking its thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillCandidate {
    pub key: String,
    pub thumbnail_key: String,
}

impl BackfillService {
    pub fn new(store: Arc<dyn ObjectStore>, resampler: Arc<dyn Resampler>, target: ResampleTarget) -> Self {
        Self {
            store,
            thumbnails: ThumbnailGenerator::new(resampler, target),
        }
    }

    /// Enumerate the catalog, then backfill. Only enumeration failure is an error.
    pub async fn run<F>(&self, catalog: &dyn Catalog, progress: F) -> Result<BackfillReport, IngestError>
    where
        F: FnMut(usize, usize) + Send,
    {
        let refs = catalog.list_image_refs().await?;
        Ok(self.backfill(&refs, progress).await)
    }

    /// Reports `(current, total)` after every attempted item, success or not.
    pub async fn backfill<F>(&self, all_refs: &[String], mut progress: F) -> BackfillReport
    where
        F: FnMut(usize, usize) + Send,
    {
        let candidates = self.candidates(all_refs).await;
        let total = candidates.len();
        let mut report = BackfillReport::default();

        info!("backfill: {} of {} references need thumbnails", total, all_refs.len());

        for (index, candidate) in candidates.iter().enumerate() {
            report.attempted += 1;
            match self.backfill_one(candidate).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => warn!("backfill of {} failed: {}", candidate.key, e),
            }
            progress(index + 1, total);
        }

        info!(
            "backfill finished: {}/{} thumbnails created",
            report.succeeded, report.attempted
        );
        report
    }

    pub async fn candidates(&self, all_refs: &[String]) -> Vec<BackfillCandidate> {
        let known: HashSet<String> = all_refs
            .iter()
            .filter_map(|url| self.store.key_from_url(url))
            .collect();

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for url in all_refs {
            let Some(key) = self.store.key_from_url(url) else {
                continue;
            };
            if naming::is_thumbnail_key(&key) {
                continue;
            }
            let Some(thumbnail_key) = naming::thumbnail_key_for(&key) else {
                continue;
            };
            if known.contains(&thumbnail_key) || !seen.insert(key.clone()) {
                continue;
            }
            match self.store.exists(&thumbnail_key).await {
                Ok(true) => continue,
                Ok(false) => {}
                // let the attempt itself succeed or fail
                Err(e) => warn!("could not check {}: {}", thumbnail_key, e),
            }
            candidates.push(BackfillCandidate { key, thumbnail_key });
        }

        candidates
    }

    async fn backfill_one(&self, candidate: &BackfillCandidate) -> Result<(), IngestError> {
        let bytes = self.store.get(&candidate.key).await?;
        let source = BinaryImage::new(Some(candidate.key.clone()), WEBP_CONTENT_TYPE, bytes);

        let generator = self.thumbnails.clone();
        let thumb = tokio::task::spawn_blocking(move || generator.thumbnail(&source))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))??;

        self.store
            .put(&candidate.thumbnail_key, Bytes::from(thumb.bytes), WEBP_CONTENT_TYPE)
            .await
    }
}
