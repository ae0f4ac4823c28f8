// src/services/ingest_service.rs
use crate::config::{PipelineConfig, ResampleTarget, RetryPolicy};
use crate::errors::IngestError;
use crate::models::{BinaryImage, CompressedImage, IngestedAsset, NamedBinary, SourceImage, WEBP_CONTENT_TYPE};
use crate::services::image_processor::{Resampler, ThumbnailGenerator};
use crate::services::naming;
use crate::services::storage_service::{AssetUploader, ObjectStore};
use bytes::Bytes;
use futures_util::future::try_join_all;
use log::{debug, info, warn};
use std::sync::Arc;

/// Turns picked files and kept references into the final reference list of an entity.
#[derive(Clone)]
pub struct IngestService {
    resampler: Arc<dyn Resampler>,
    thumbnails: ThumbnailGenerator,
    uploader: AssetUploader,
    config: PipelineConfig,
    retry: RetryPolicy,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        resampler: Arc<dyn Resampler>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            thumbnails: ThumbnailGenerator::new(resampler.clone(), config.thumbnail),
            resampler,
            uploader: AssetUploader::new(store),
            config,
            retry: RetryPolicy::None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Thumbnail URL for a main asset hosted by our store. `None` for foreign
    /// URLs, unprocessed `_original` uploads and thumbnails themselves.
    pub fn thumbnail_url_for(&self, url: &str) -> Option<String> {
        let store = self.uploader.store_handle();
        let key = store.key_from_url(url)?;
        naming::thumbnail_key_for(&key).map(|thumb| store.public_url(&thumb))
    }

    /// Existing hosted references come first in their original order, then
    /// data-URI entries of `existing_refs`, then `new_sources`, each group in
    /// input order. Any main-asset failure fails the whole call.
    pub async fn reconcile(
        &self,
        existing_refs: &[String],
        new_sources: Vec<BinaryImage>,
    ) -> Result<Vec<String>, IngestError> {
        let mut refs = Vec::with_capacity(existing_refs.len() + new_sources.len());
        let mut pending = Vec::new();

        for reference in existing_refs {
            match SourceImage::classify(reference)? {
                SourceImage::Binary(binary) => pending.push(binary),
                SourceImage::Reference(url) => refs.push(url),
            }
        }
        pending.extend(new_sources);

        if pending.is_empty() {
            return Ok(refs);
        }

        debug!(
            "reconcile: {} kept, {} to ingest",
            refs.len(),
            pending.len()
        );

        // try_join_all yields results in input order, whatever finishes first.
        let uploaded = try_join_all(pending.into_iter().map(|source| self.ingest(source))).await?;
        refs.extend(uploaded.into_iter().map(|asset| asset.url));

        Ok(refs)
    }

    /// Process and store a single new source.
    pub async fn ingest(&self, source: BinaryImage) -> Result<IngestedAsset, IngestError> {
        let base = naming::asset_base();

        if !source.is_raster() {
            return self.store_original(&source, &base).await;
        }

        let main = match self.resample(&source, self.config.main).await {
            Ok(main) => main,
            Err(e) if e.is_recoverable() => {
                warn!(
                    "could not transform {}, storing original: {}",
                    source.name.as_deref().unwrap_or("upload"),
                    e
                );
                return self.store_original(&source, &base).await;
            }
            Err(e) => return Err(e),
        };

        let main_file = NamedBinary {
            key: naming::main_key(&base),
            bytes: Bytes::from(main.bytes),
        };
        let url = self.upload(&main_file, WEBP_CONTENT_TYPE).await?;

        let thumbnail_url = match self.store_thumbnail(&source, &base).await {
            Ok(thumb_url) => Some(thumb_url),
            Err(e) => {
                warn!("thumbnail skipped for {}: {}", main_file.key, e);
                None
            }
        };

        Ok(IngestedAsset {
            url,
            thumbnail_url,
            processed: true,
        })
    }

    async fn store_original(
        &self,
        source: &BinaryImage,
        base: &str,
    ) -> Result<IngestedAsset, IngestError> {
        let extension = naming::extension_for(source.name.as_deref(), &source.content_type);
        let file = NamedBinary {
            key: naming::original_key(base, &extension),
            bytes: source.bytes.clone(),
        };
        let url = self.upload(&file, &source.content_type).await?;

        Ok(IngestedAsset {
            url,
            thumbnail_url: None,
            processed: false,
        })
    }

    async fn store_thumbnail(&self, source: &BinaryImage, base: &str) -> Result<String, IngestError> {
        let generator = self.thumbnails.clone();
        let owned = source.clone();
        let thumb = tokio::task::spawn_blocking(move || generator.thumbnail(&owned))
            .await
            .map_err(|e| IngestError::Thumbnail(format!("thumbnail task failed: {}", e)))??;

        let file = NamedBinary {
            key: naming::thumbnail_key(base),
            bytes: Bytes::from(thumb.bytes),
        };
        self.upload(&file, WEBP_CONTENT_TYPE)
            .await
            .map_err(|e| IngestError::Thumbnail(e.to_string()))
    }

    async fn resample(
        &self,
        source: &BinaryImage,
        target: ResampleTarget,
    ) -> Result<CompressedImage, IngestError> {
        let resampler = self.resampler.clone();
        let owned = source.clone();
        tokio::task::spawn_blocking(move || resampler.resample(&owned, &target))
            .await
            .map_err(|e| IngestError::Task(e.to_string()))?
    }

    async fn upload(&self, file: &NamedBinary, content_type: &str) -> Result<String, IngestError> {
        let mut attempt = 0;
        loop {
            match self.uploader.store(file, content_type).await {
                Ok(url) => return Ok(url),
                Err(e) => {
                    attempt += 1;
                    let Some(delay) = self.retry.delay_for(attempt) else {
                        return Err(e);
                    };
                    info!(
                        "upload of {} failed ({}), retry {} in {:?}",
                        file.key, e, attempt, delay
                    );
                    tokio::time::sleep(delay).await;

                    // A put whose response was lost may still have landed.
                    let store = self.uploader.store_handle();
                    if let Ok(true) = store.exists(&file.key).await {
                        info!("{} already stored, not re-sending", file.key);
                        return Ok(store.public_url(&file.key));
                    }
                }
            }
        }
    }
}
