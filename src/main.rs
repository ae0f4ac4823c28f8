// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use gallery_ingest::AppState;
use gallery_ingest::config::AppConfig;
use gallery_ingest::handlers::routes;
use gallery_ingest::services::{
    BackfillService, IngestService, RedisService, RestCatalog, SupabaseStorage, WebpResampler,
};
use log::info;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting gallery-ingest service...");

    let config = AppConfig::from_env().context("invalid configuration")?;

    // Initialize services
    let store = Arc::new(SupabaseStorage::new(
        &config.supabase_url,
        config.supabase_key.clone(),
        config.storage_bucket.clone(),
    ));
    let resampler = Arc::new(WebpResampler::new());
    let ingest = Arc::new(
        IngestService::new(store.clone(), resampler.clone(), config.pipeline).with_retry(config.retry),
    );
    let backfill = Arc::new(BackfillService::new(store, resampler, config.pipeline.thumbnail));
    let catalog = Arc::new(RestCatalog::new(&config.supabase_url, config.supabase_key.clone()));
    let jobs = Arc::new(
        RedisService::new(&config.redis_url)
            .await
            .with_context(|| format!("cannot reach redis at {}", config.redis_url))?,
    );

    let app_state = AppState {
        ingest,
        backfill,
        catalog,
        jobs,
    };

    info!(
        "Starting HTTP server on {} (bucket {}, main {}px, thumbnail {}px)",
        config.bind_addr,
        config.storage_bucket,
        config.pipeline.main.max_dim,
        config.pipeline.thumbnail.max_dim
    );

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::PayloadConfig::new(64 * 1024 * 1024))
            .app_data(web::JsonConfig::default().limit(64 * 1024 * 1024))
            .wrap(middleware::Logger::default())
            .configure(routes)
    })
    .bind(&config.bind_addr)?
    .run()
    .await?;

    Ok(())
}
