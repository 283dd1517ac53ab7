//! End-to-end tests of the HTTP surface with a stand-in renderer

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tokio::sync::Barrier;
use tower::ServiceExt;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use zip2pdf_server::artifact::ArtifactId;
use zip2pdf_server::config::Config;
use zip2pdf_server::render::{PdfRenderer, RenderError, RenderProfile, RenderSlot};
use zip2pdf_server::state::AppState;

const ZIP: &str = "application/x-zip-compressed";
const BOUNDARY: &str = "zip2pdf-test-boundary";

/// Wraps the entry document in a fake PDF header
struct EchoRenderer;

#[async_trait::async_trait]
impl PdfRenderer for EchoRenderer {
    async fn render(
        &self,
        entry: &Path,
        _profile: &RenderProfile,
        _slot: RenderSlot,
    ) -> Result<Vec<u8>, RenderError> {
        let html = tokio::fs::read(entry)
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
        let mut pdf = b"%PDF-1.4\n".to_vec();
        pdf.extend_from_slice(&html);
        Ok(pdf)
    }
}

/// Holds two renders in flight together; the follower outlives the leader
/// and re-reads its entry after the leader has cleaned up.
struct OverlappingRenderer {
    barrier: Barrier,
}

#[async_trait::async_trait]
impl PdfRenderer for OverlappingRenderer {
    async fn render(
        &self,
        entry: &Path,
        profile: &RenderProfile,
        slot: RenderSlot,
    ) -> Result<Vec<u8>, RenderError> {
        if !self.barrier.wait().await.is_leader() {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        EchoRenderer.render(entry, profile, slot).await
    }
}

fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn multipart_upload(bytes: &[u8], content_type: &str) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"site.zip\"\r\n",
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn test_app(dir: &TempDir, renderer: Arc<dyn PdfRenderer>, max_upload: Option<u64>) -> (Router, AppState) {
    let mut config = Config::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.server.public_dir = dir.path().join("no-public-dir");
    if let Some(max) = max_upload {
        config.upload.max_upload_bytes = max;
    }

    let state = AppState::with_renderer(config, renderer).await.unwrap();
    (zip2pdf_server::app(state.clone()), state)
}

fn count_entries(path: &Path) -> usize {
    std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
}

fn location(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect should carry a location")
        .to_str()
        .unwrap()
        .to_string()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn upload_redirects_and_download_is_stable() {
    let dir = TempDir::new().unwrap();
    let (app, state) = test_app(&dir, Arc::new(EchoRenderer), None).await;

    let archive = zip_bytes(&[("index.html", "<h1>report</h1>"), ("style.css", "h1{}")]);
    let response = app.clone().oneshot(multipart_upload(&archive, ZIP)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response);
    let id: ArtifactId = target.trim_start_matches("/convert/").parse().unwrap();

    assert!(!state.store().working_dir(&id).exists());
    assert!(state.store().pdf_exists(&id).await);

    let first = app.clone().oneshot(get(&target)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[header::CONTENT_TYPE], "application/pdf");
    assert!(first.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .starts_with("attachment"));
    let length: usize = first.headers()[header::CONTENT_LENGTH]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    let first = to_bytes(first.into_body(), usize::MAX).await.unwrap();

    let second = app.oneshot(get(&target)).await.unwrap();
    let second = to_bytes(second.into_body(), usize::MAX).await.unwrap();

    assert!(!first.is_empty());
    assert_eq!(first.len(), length);
    assert_eq!(first, second);
}

#[tokio::test]
async fn bad_file_type_is_rejected_without_side_effects() {
    let dir = TempDir::new().unwrap();
    let (app, state) = test_app(&dir, Arc::new(EchoRenderer), None).await;

    let archive = zip_bytes(&[("index.html", "<p>x</p>")]);
    let response = app
        .oneshot(multipart_upload(&archive, "application/zip"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body_json(response).await["error"], "bad file type");
    assert_eq!(count_entries(&state.store().uploads_dir()), 0);
    assert_eq!(count_entries(&state.store().originals_dir()), 0);
    assert_eq!(count_entries(&state.store().pdf_dir()), 0);
}

#[tokio::test]
async fn archive_without_root_index_leaves_nothing_behind() {
    let dir = TempDir::new().unwrap();
    let (app, state) = test_app(&dir, Arc::new(EchoRenderer), None).await;

    let archive = zip_bytes(&[("docs/index.html", "<p>nested</p>")]);
    let response = app.oneshot(multipart_upload(&archive, ZIP)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("index.html"));

    assert_eq!(count_entries(&state.store().uploads_dir()), 0);
    assert_eq!(count_entries(&state.store().originals_dir()), 0);
    assert_eq!(count_entries(&state.store().pdf_dir()), 0);
}

#[tokio::test]
async fn upload_size_boundary() {
    let archive = zip_bytes(&[("index.html", "<p>sized</p>")]);
    let exact = archive.len() as u64;

    let dir = TempDir::new().unwrap();
    let (app, _state) = test_app(&dir, Arc::new(EchoRenderer), Some(exact)).await;
    let response = app.oneshot(multipart_upload(&archive, ZIP)).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let dir = TempDir::new().unwrap();
    let (app, state) = test_app(&dir, Arc::new(EchoRenderer), Some(exact - 1)).await;
    let response = app.oneshot(multipart_upload(&archive, ZIP)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body_json(response).await["error"], "file too large");
    assert_eq!(count_entries(&state.store().uploads_dir()), 0);
}

#[tokio::test]
async fn unknown_download_is_not_found() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = test_app(&dir, Arc::new(EchoRenderer), None).await;

    let unused = format!("/convert/{}", ArtifactId::new());
    let response = app.clone().oneshot(get(&unused)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"], "not found");

    let response = app.oneshot(get("/convert/not-an-id")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = test_app(&dir, Arc::new(EchoRenderer), None).await;

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body_json(response).await["error"], "no file provided");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_uploads_are_isolated() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(OverlappingRenderer {
        barrier: Barrier::new(2),
    });
    let (app, state) = test_app(&dir, renderer, None).await;

    let first = zip_bytes(&[("index.html", "<p>first</p>")]);
    let second = zip_bytes(&[("index.html", "<p>second</p>")]);

    let (a, b) = tokio::join!(
        app.clone().oneshot(multipart_upload(&first, ZIP)),
        app.clone().oneshot(multipart_upload(&second, ZIP)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.status(), StatusCode::SEE_OTHER);
    assert_eq!(b.status(), StatusCode::SEE_OTHER);

    for (response, expected) in [(a, "<p>first</p>"), (b, "<p>second</p>")] {
        let download = app.clone().oneshot(get(&location(&response))).await.unwrap();
        let pdf = to_bytes(download.into_body(), usize::MAX).await.unwrap();
        assert!(pdf.ends_with(expected.as_bytes()));
    }

    assert_eq!(count_entries(&state.store().originals_dir()), 0);
}

#[tokio::test]
async fn health_reports_service() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = test_app(&dir, Arc::new(EchoRenderer), None).await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["service"], "zip2pdf-server");
}
