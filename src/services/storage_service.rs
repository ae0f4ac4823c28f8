// src/services/storage_service.rs
use crate::errors::IngestError;
use crate::models::NamedBinary;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Flat-namespace object store. No locking; keys are made unique by the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), IngestError>;

    async fn get(&self, key: &str) -> Result<Bytes, IngestError>;

    async fn exists(&self, key: &str) -> Result<bool, IngestError>;

    fn public_url(&self, key: &str) -> String;

    /// Inverse of `public_url`. `None` if the URL is not hosted by this store.
    fn key_from_url(&self, url: &str) -> Option<String>;
}

fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Supabase Storage over its REST API.
pub struct SupabaseStorage {
    base_url: String,
    api_key: String,
    bucket: String,
    client: Client,
}

impl SupabaseStorage {
    pub fn new(base_url: &str, api_key: String, bucket: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            bucket,
            client: Client::new(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }

    fn public_prefix(&self) -> String {
        format!("{}/storage/v1/object/public/{}/", self.base_url, self.bucket)
    }
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), IngestError> {
        let response = self
            .client
            .post(self.object_url(key))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("apikey", &self.api_key)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| IngestError::Upload(format!("Storage request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(IngestError::Upload(format!(
                "Storage rejected {} ({}): {}",
                key, status, error_text
            )));
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, IngestError> {
        let response = self
            .client
            .get(self.public_url(key))
            .send()
            .await
            .map_err(|e| IngestError::Upload(format!("Storage fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(IngestError::Upload(format!(
                "Storage fetch of {} returned {}",
                key,
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| IngestError::Upload(format!("Failed to read {}: {}", key, e)))
    }

    async fn exists(&self, key: &str) -> Result<bool, IngestError> {
        let response = self
            .client
            .head(self.public_url(key))
            .send()
            .await
            .map_err(|e| IngestError::Upload(format!("Storage existence check failed: {}", e)))?;

        Ok(response.status().is_success())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.public_prefix(), key)
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        strip_query(url)
            .strip_prefix(&self.public_prefix())
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

/// In-process store, used by tests and local runs without a backend.
pub struct MemoryStore {
    base_url: String,
    objects: RwLock<HashMap<String, (Bytes, String)>>,
}

impl MemoryStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: format!("{}/", base_url.trim_end_matches('/')),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().await.get(key).map(|(_, ct)| ct.clone())
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<(), IngestError> {
        let mut objects = self.objects.write().await;
        if objects.contains_key(key) {
            return Err(IngestError::Upload(format!("The resource already exists: {}", key)));
        }
        objects.insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, IngestError> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| IngestError::Upload(format!("Object not found: {}", key)))
    }

    async fn exists(&self, key: &str) -> Result<bool, IngestError> {
        Ok(self.objects.read().await.contains_key(key))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}{}", self.base_url, key)
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        strip_query(url)
            .strip_prefix(&self.base_url)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

/// One put per asset, then hand back the public URL. Errors pass through as-is.
#[derive(Clone)]
pub struct AssetUploader {
    store: Arc<dyn ObjectStore>,
}

impl AssetUploader {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store_handle(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub async fn store(&self, file: &NamedBinary, content_type: &str) -> Result<String, IngestError> {
        self.store
            .put(&file.key, file.bytes.clone(), content_type)
            .await?;
        log::info!("stored {} ({} bytes, {})", file.key, file.bytes.len(), content_type);
        Ok(self.store.public_url(&file.key))
    }
}
