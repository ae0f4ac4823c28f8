// src/services/catalog_service.rs
use crate::errors::IngestError;
use crate::models::{Artwork, Exhibition, ImaginationArtwork, SettingRow, parse_image_urls};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::collections::HashSet;

/// Settings rows that hold a single image URL.
pub const IMAGE_SETTING_KEYS: &[&str] = &["landingBackgroundUrl", "profileImageUrl"];

/// Read side of the relational store: every image reference any entity holds.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_image_refs(&self) -> Result<Vec<String>, IngestError>;
}

/// Supabase PostgREST tables of the portfolio.
pub struct RestCatalog {
    base_url: String,
    api_key: String,
    client: Client,
}

impl RestCatalog {
    pub fn new(base_url: &str, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: Client::new(),
        }
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &str) -> Result<Vec<T>, IngestError> {
        let response = self
            .client
            .get(format!("{}/rest/v1/{}?{}", self.base_url, table, query))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| IngestError::Catalog(format!("{} request failed: {}", table, e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(IngestError::Catalog(format!("{} error: {}", table, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| IngestError::Catalog(format!("Failed to parse {} rows: {}", table, e)))
    }
}

#[async_trait]
impl Catalog for RestCatalog {
    async fn list_image_refs(&self) -> Result<Vec<String>, IngestError> {
        let artworks: Vec<Artwork> = self.select("artworks", "select=id,image_urls").await?;
        let exhibitions: Vec<Exhibition> = self.select("exhibitions", "select=id,image_urls").await?;
        let imaginations: Vec<ImaginationArtwork> = self
            .select("imagination_artworks", "select=id,original_image_url")
            .await?;
        let settings: Vec<SettingRow> = self
            .select(
                "settings",
                &format!("select=key,value&key=in.({})", IMAGE_SETTING_KEYS.join(",")),
            )
            .await?;

        let refs = collect_refs(&artworks, &exhibitions, &imaginations, &settings);
        log::info!(
            "catalog: {} references from {} artworks, {} exhibitions, {} imaginations",
            refs.len(),
            artworks.len(),
            exhibitions.len(),
            imaginations.len()
        );
        Ok(refs)
    }
}

/// Flattens entity rows into one deduplicated list, first occurrence wins.
pub fn collect_refs(
    artworks: &[Artwork],
    exhibitions: &[Exhibition],
    imaginations: &[ImaginationArtwork],
    settings: &[SettingRow],
) -> Vec<String> {
    let all = artworks
        .iter()
        .flat_map(|a| parse_image_urls(&a.image_urls))
        .chain(exhibitions.iter().flat_map(|e| parse_image_urls(&e.image_urls)))
        .chain(imaginations.iter().filter_map(|i| i.original_image_url.clone()))
        .chain(
            settings
                .iter()
                .filter(|s| IMAGE_SETTING_KEYS.contains(&s.key.as_str()))
                .flat_map(|s| parse_image_urls(&s.value)),
        );

    let mut seen = HashSet::new();
    all.filter(|url| !url.is_empty() && seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_every_entity_kind_once() {
        let artworks = vec![
            Artwork { id: 1, image_urls: json!(["u/a.webp", "u/b.webp"]) },
            Artwork { id: 2, image_urls: json!("{u/c.webp,u/a.webp}") },
        ];
        let exhibitions = vec![Exhibition { id: 1, image_urls: json!(r#"["u/d.webp"]"#) }];
        let imaginations = vec![
            ImaginationArtwork { id: 1, original_image_url: Some("u/e.webp".into()) },
            ImaginationArtwork { id: 2, original_image_url: None },
        ];
        let settings = vec![
            SettingRow { key: "landingBackgroundUrl".into(), value: json!("u/f.webp") },
            SettingRow { key: "adminPassword".into(), value: json!("000000") },
        ];

        assert_eq!(
            collect_refs(&artworks, &exhibitions, &imaginations, &settings),
            vec!["u/a.webp", "u/b.webp", "u/c.webp", "u/d.webp", "u/e.webp", "u/f.webp"]
        );
    }

    #[test]
    fn rows_deserialize_with_missing_columns() {
        let rows: Vec<ImaginationArtwork> = serde_json::from_value(json!([{ "id": 4 }])).unwrap();
        assert!(rows[0].original_image_url.is_none());
        let rows: Vec<Artwork> = serde_json::from_value(json!([{ "id": 4, "image_urls": null }])).unwrap();
        assert!(parse_image_urls(&rows[0].image_urls).is_empty());
    }
}
