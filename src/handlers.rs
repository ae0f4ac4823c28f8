// src/handlers.rs
use crate::{AppState, errors::IngestError, models::*};
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use chrono::Utc;
use futures_util::TryStreamExt;
use futures_util::future::try_join_all;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use tokio::sync::watch;
use uuid::Uuid;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/upload", web::post().to(upload_images))
            .route("/reconcile", web::post().to(reconcile_images))
            .route("/backfill", web::post().to(start_backfill))
            .route("/backfill/{job_id}", web::get().to(get_backfill))
            .route("/thumbnail", web::get().to(thumbnail_url)),
    )
    .route("/health", web::get().to(health_check));
}

pub async fn upload_images(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let mut sources = Vec::new();

    while let Some(mut field) = payload.try_next().await? {
        let Some(filename) = field
            .content_disposition()
            .get_filename()
            .map(|name| name.to_string())
        else {
            // plain form field, not a file
            while field.try_next().await?.is_some() {}
            debug!("skipping multipart field {:?}", field.name());
            continue;
        };

        let content_type = field
            .content_type()
            .map(|ct| ct.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut file_data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            file_data.extend_from_slice(&chunk);
        }

        if file_data.is_empty() {
            return Err(IngestError::Validation(format!("{} is empty", filename)).into());
        }

        sources.push(BinaryImage::new(Some(filename), content_type, file_data));
    }

    if sources.is_empty() {
        return Err(IngestError::Validation("No files provided".to_string()).into());
    }

    let assets = try_join_all(sources.into_iter().map(|source| data.ingest.ingest(source))).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "count": assets.len(),
        "assets": assets,
    })))
}

pub async fn reconcile_images(
    data: web::Data<AppState>,
    body: web::Json<ReconcileRequest>,
) -> Result<HttpResponse, Error> {
    let request = body.into_inner();

    let new_sources = request
        .new_images
        .iter()
        .map(|uri| BinaryImage::from_data_uri(uri))
        .collect::<Result<Vec<_>, _>>()?;

    let image_urls = data
        .ingest
        .reconcile(&request.image_urls, new_sources)
        .await?;

    Ok(HttpResponse::Ok().json(ReconcileResponse { image_urls }))
}

pub async fn start_backfill(data: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let job_id = Uuid::new_v4();
    let started = BackfillProgress::started(job_id);
    data.jobs.store_progress(&started).await?;

    let state = data.get_ref().clone();
    actix_web::rt::spawn(async move {
        run_backfill_job(state, started).await;
    });

    info!("backfill job {} started", job_id);
    Ok(HttpResponse::Accepted().json(serde_json::json!({ "job_id": job_id })))
}

/// Drives one job to completion, mirroring progress into the job store as it goes.
pub async fn run_backfill_job(state: AppState, started: BackfillProgress) -> BackfillProgress {
    let job_id = started.job_id;
    let (tx, mut rx) = watch::channel(started.clone());

    let jobs = state.jobs.clone();
    let writer = actix_web::rt::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if let Err(e) = jobs.store_progress(&snapshot).await {
                warn!("backfill {}: progress not saved: {}", snapshot.job_id, e);
            }
        }
    });

    let result = state
        .backfill
        .run(state.catalog.as_ref(), |current, total| {
            tx.send_modify(|p| {
                p.current = current;
                p.total = total;
                p.updated_at = Utc::now();
            });
        })
        .await;

    let mut last = tx.borrow().clone();
    drop(tx);
    if writer.await.is_err() {
        warn!("backfill {}: progress writer stopped early", job_id);
    }

    match result {
        Ok(report) => {
            last.status = JobStatus::Completed;
            last.attempted = report.attempted;
            last.succeeded = report.succeeded;
            last.current = report.attempted;
            last.total = report.attempted;
        }
        Err(e) => {
            error!("backfill {} failed: {}", job_id, e);
            last.status = JobStatus::Failed;
            last.error = Some(e.to_string());
        }
    }
    last.updated_at = Utc::now();

    if let Err(e) = state.jobs.store_progress(&last).await {
        error!("backfill {}: final status not saved: {}", job_id, e);
    }
    last
}

pub async fn get_backfill(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let job_id = path.into_inner();

    match data.jobs.get_progress(&job_id).await? {
        Some(progress) => Ok(HttpResponse::Ok().json(progress)),
        None => Ok(HttpResponse::NotFound().json(serde_json::json!({
            "error": "Unknown job",
            "message": format!("No backfill job {}", job_id)
        }))),
    }
}

pub async fn thumbnail_url(
    query: web::Query<HashMap<String, String>>,
    data: web::Data<AppState>,
) -> HttpResponse {
    match query.get("url").and_then(|url| data.ingest.thumbnail_url_for(url)) {
        Some(thumbnail_url) => HttpResponse::Ok().json(serde_json::json!({
            "thumbnail_url": thumbnail_url
        })),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": "No thumbnail",
            "message": "Only stored WebP assets have thumbnails"
        })),
    }
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "gallery-ingest",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
