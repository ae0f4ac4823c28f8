use actix_web::{App, test, web};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use gallery_ingest::AppState;
use gallery_ingest::config::PipelineConfig;
use gallery_ingest::errors::IngestError;
use gallery_ingest::handlers::{routes, run_backfill_job};
use gallery_ingest::models::{BackfillProgress, JobStatus, ReconcileResponse, WEBP_CONTENT_TYPE};
use gallery_ingest::services::{
    BackfillService, Catalog, IngestService, MemoryStore, ObjectStore, ProgressStore, WebpResampler,
};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const BASE: &str = "https://cdn.test/artworks/";

struct FixedCatalog(Vec<String>);

#[async_trait]
impl Catalog for FixedCatalog {
    async fn list_image_refs(&self) -> Result<Vec<String>, IngestError> {
        Ok(self.0.clone())
    }
}

struct DownCatalog;

#[async_trait]
impl Catalog for DownCatalog {
    async fn list_image_refs(&self) -> Result<Vec<String>, IngestError> {
        Err(IngestError::Catalog("artworks request failed: connection refused".to_string()))
    }
}

#[derive(Default)]
struct MemoryJobs(Mutex<HashMap<Uuid, BackfillProgress>>);

#[async_trait]
impl ProgressStore for MemoryJobs {
    async fn store_progress(&self, progress: &BackfillProgress) -> Result<(), IngestError> {
        self.0.lock().await.insert(progress.job_id, progress.clone());
        Ok(())
    }

    async fn get_progress(&self, job_id: &Uuid) -> Result<Option<BackfillProgress>, IngestError> {
        Ok(self.0.lock().await.get(job_id).cloned())
    }
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let buffer = ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 90]));
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(buffer)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

fn state(store: Arc<MemoryStore>, catalog_refs: Vec<String>) -> (AppState, Arc<MemoryJobs>) {
    let resampler = Arc::new(WebpResampler::new());
    let config = PipelineConfig::default();
    let jobs = Arc::new(MemoryJobs::default());
    let state = AppState {
        ingest: Arc::new(IngestService::new(store.clone(), resampler.clone(), config)),
        backfill: Arc::new(BackfillService::new(store, resampler, config.thumbnail)),
        catalog: Arc::new(FixedCatalog(catalog_refs)),
        jobs: jobs.clone(),
    };
    (state, jobs)
}

#[actix_web::test]
async fn health_reports_service_name() {
    let (state, _) = state(Arc::new(MemoryStore::new(BASE)), vec![]);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes)).await;

    let body: serde_json::Value =
        test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(body["service"], "gallery-ingest");
}

#[actix_web::test]
async fn reconcile_keeps_existing_and_appends_uploads() {
    let store = Arc::new(MemoryStore::new(BASE));
    let (state, _) = state(store.clone(), vec![]);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes)).await;
    let data_uri = format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png(30, 20)));

    let req = test::TestRequest::post()
        .uri("/api/v1/reconcile")
        .set_json(serde_json::json!({
            "image_urls": ["https://cdn.test/artworks/old.webp", data_uri],
            "new_images": [data_uri],
        }))
        .to_request();
    let body: ReconcileResponse = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body.image_urls.len(), 3);
    assert_eq!(body.image_urls[0], "https://cdn.test/artworks/old.webp");
    assert_ne!(body.image_urls[1], body.image_urls[2]);
    for url in &body.image_urls[1..] {
        let key = store.key_from_url(url).unwrap();
        assert_eq!(store.content_type(&key).await.as_deref(), Some(WEBP_CONTENT_TYPE));
    }
}

#[actix_web::test]
async fn reconcile_rejects_broken_data_uri() {
    let store = Arc::new(MemoryStore::new(BASE));
    let (state, _) = state(store.clone(), vec![]);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/reconcile")
        .set_json(serde_json::json!({ "image_urls": ["data:image/png;base64,!!"] }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
    assert!(store.is_empty().await);
}

#[actix_web::test]
async fn multipart_upload_stores_image_and_video() {
    let store = Arc::new(MemoryStore::new(BASE));
    let (state, _) = state(store.clone(), vec![]);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes)).await;

    let boundary = "galleryboundary";
    let video = b"\x00\x00\x00\x18ftypmp42 not really a movie".to_vec();
    let mut body = Vec::new();
    for (name, content_type, bytes) in [("cover.png", "image/png", png(50, 40)), ("loop.mp4", "video/mp4", video.clone())] {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                boundary, name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(&bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    let req = test::TestRequest::post()
        .uri("/api/v1/upload")
        .insert_header(("content-type", format!("multipart/form-data; boundary={}", boundary)))
        .set_payload(body)
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["count"], 2);
    let image = &resp["assets"][0];
    assert_eq!(image["processed"], true);
    assert!(image["thumbnail_url"].as_str().unwrap().ends_with("_thumb.webp"));

    let clip = &resp["assets"][1];
    assert_eq!(clip["processed"], false);
    let key = store.key_from_url(clip["url"].as_str().unwrap()).unwrap();
    assert!(key.ends_with("_original.mp4"));
    assert_eq!(&store.get(&key).await.unwrap()[..], &video[..]);
}

#[actix_web::test]
async fn thumbnail_lookup() {
    let (state, _) = state(Arc::new(MemoryStore::new(BASE)), vec![]);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes)).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/thumbnail?url=https%3A%2F%2Fcdn.test%2Fartworks%2F1_a.webp")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["thumbnail_url"], "https://cdn.test/artworks/1_a_thumb.webp");

    let req = test::TestRequest::get()
        .uri("/api/v1/thumbnail?url=https%3A%2F%2Fcdn.test%2Fartworks%2F1_a.png")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn thumbnail_lookup_ignores_foreign_and_original_urls() {
    let (state, _) = state(Arc::new(MemoryStore::new(BASE)), vec![]);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes)).await;

    for url in [
        "https%3A%2F%2Fother.example%2Fimg%2F1_a.webp",
        "https%3A%2F%2Fcdn.test%2Fartworks%2F1_a_original.webp",
    ] {
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/thumbnail?url={}", url))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404, "{}", url);
    }
}

#[actix_web::test]
async fn multipart_upload_skips_plain_form_fields() {
    let store = Arc::new(MemoryStore::new(BASE));
    let (state, _) = state(store.clone(), vec![]);
    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes)).await;

    let boundary = "galleryboundary";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nSpring study\r\n",
            boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"study.png\"\r\nContent-Type: image/png\r\n\r\n",
            boundary
        )
        .as_bytes(),
    );
    body.extend_from_slice(&png(40, 40));
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let req = test::TestRequest::post()
        .uri("/api/v1/upload")
        .insert_header(("content-type", format!("multipart/form-data; boundary={}", boundary)))
        .set_payload(body)
        .to_request();
    let resp: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(resp["count"], 1);
    assert_eq!(resp["assets"][0]["processed"], true);
    // main + thumbnail, no stray `_original.bin`
    let keys = store.keys().await;
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|key| key.ends_with(".webp")));
}

#[actix_web::test]
async fn backfill_job_records_final_tally() {
    let store = Arc::new(MemoryStore::new(BASE));
    let webp = {
        let mut out = Vec::new();
        image::load_from_memory(&png(800, 800))
            .unwrap()
            .write_to(&mut Cursor::new(&mut out), ImageFormat::WebP)
            .unwrap();
        out
    };
    store.put("p.webp", webp.into(), WEBP_CONTENT_TYPE).await.unwrap();

    let refs = vec![format!("{}p.webp", BASE), format!("{}lost.webp", BASE)];
    let (state, jobs) = state(store.clone(), refs);
    let job_id = Uuid::new_v4();

    let done = run_backfill_job(state.clone(), BackfillProgress::started(job_id)).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!((done.attempted, done.succeeded), (2, 1));
    assert!(store.exists("p_thumb.webp").await.unwrap());

    let app = test::init_service(App::new().app_data(web::Data::new(state)).configure(routes)).await;
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/backfill/{}", job_id))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["succeeded"], 1);
    assert_eq!(jobs.get_progress(&job_id).await.unwrap().unwrap().total, 2);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/backfill/{}", Uuid::new_v4()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn backfill_job_records_catalog_failure() {
    let (mut state, jobs) = state(Arc::new(MemoryStore::new(BASE)), vec![]);
    state.catalog = Arc::new(DownCatalog);
    let job_id = Uuid::new_v4();

    let done = run_backfill_job(state, BackfillProgress::started(job_id)).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error.as_deref().unwrap().contains("connection refused"));
    let stored = jobs.get_progress(&job_id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error, done.error);
}
