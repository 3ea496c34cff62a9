use std::io::Cursor;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN,
};
use axum::http::{Request, StatusCode};
use axum::Router;
use facematch_server::errors::AppResult;
use facematch_server::faces::{
    BoundingBox, ComparisonSettings, FaceEmbeddingBackend, FaceEmbeddingRecord, FaceModelConfig,
};
use facematch_server::http::{build_router, AppState};
use facematch_server::settings::ServerSettings;
use facematch_server::worker::FaceWorker;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "facematch-test-boundary";

/// The first pixel stands in for the face; a black frame has nobody in it.
struct PixelBackend;

impl FaceEmbeddingBackend for PixelBackend {
    fn extract(
        &self,
        image: &RgbImage,
        _num_jitters: u32,
        _upsample: u32,
    ) -> AppResult<Vec<FaceEmbeddingRecord>> {
        let Rgb([r, g, b]) = *image.get_pixel(0, 0);
        if (r, g, b) == (0, 0, 0) {
            return Ok(Vec::new());
        }
        Ok(vec![FaceEmbeddingRecord {
            bounding_box: BoundingBox {
                left: 0,
                top: 0,
                right: 4,
                bottom: 4,
            },
            embedding: [r, g, b].iter().map(|v| f64::from(*v) / 255.0).collect(),
        }])
    }
}

fn settings(reference_dir: &Path, max_upload_bytes: usize) -> ServerSettings {
    settings_with_origins(reference_dir, max_upload_bytes, None)
}

fn settings_with_origins(
    reference_dir: &Path,
    max_upload_bytes: usize,
    cors_allow_origins: Option<Vec<String>>,
) -> ServerSettings {
    ServerSettings {
        host: "127.0.0.1".into(),
        port: 0,
        reference_dir: reference_dir.to_path_buf(),
        comparison: ComparisonSettings::default(),
        models: FaceModelConfig::default(),
        max_upload_bytes,
        cors_allow_origins,
    }
}

fn router_for(settings: ServerSettings) -> Router {
    let worker = FaceWorker::spawn(|| Ok(PixelBackend)).expect("worker starts");
    build_router(AppState::new(worker, &settings), &settings).expect("router builds")
}

fn router_with_limit(reference_dir: &Path, max_upload_bytes: usize) -> Router {
    router_for(settings(reference_dir, max_upload_bytes))
}

fn router(reference_dir: &Path) -> Router {
    router_with_limit(reference_dir, 10 * 1024 * 1024)
}

fn png(color: [u8; 3]) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb(color)))
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

fn multipart_request(parts: &[(&str, Vec<u8>)]) -> Request<Body> {
    let mut body = Vec::new();
    for (name, bytes) in parts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{name}.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/compare")
        .header(
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn scratch_dir() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("Personas_Autorizadas");
    std::fs::create_dir(&dir).unwrap();
    (tmp, dir)
}

#[tokio::test]
async fn same_person_matches() {
    let (_tmp, dir) = scratch_dir();
    let request = multipart_request(&[
        ("dni", png([180, 140, 120])),
        ("selfie", png([178, 142, 118])),
    ]);

    let (status, body) = send(router(&dir), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["match"], true);
    assert!(body["distance"].as_f64().unwrap() < 0.6);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn different_people_do_not_match() {
    let (_tmp, dir) = scratch_dir();
    let request = multipart_request(&[("dni", png([255, 0, 0])), ("selfie", png([0, 0, 255]))]);

    let (status, body) = send(router(&dir), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["match"], false);
    assert!(body["distance"].as_f64().unwrap() > 0.6);
}

#[tokio::test]
async fn repeated_part_keeps_last_upload() {
    let (_tmp, dir) = scratch_dir();
    let request = multipart_request(&[
        ("dni", png([0, 0, 0])),
        ("selfie", png([178, 142, 118])),
        ("dni", png([180, 140, 120])),
    ]);

    let (status, body) = send(router(&dir), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("error").is_none(), "unexpected body: {body}");
    assert_eq!(body["match"], true);
}

#[tokio::test]
async fn malformed_image_returns_error_body() {
    let (_tmp, dir) = scratch_dir();
    let request = multipart_request(&[
        ("dni", b"this is not an image".to_vec()),
        ("selfie", png([10, 10, 10])),
    ]);

    let (status, body) = send(router(&dir), request).await;
    assert_eq!(status, StatusCode::OK);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("DNI"), "unexpected error: {error}");
    assert!(body.get("match").is_none());
}

#[tokio::test]
async fn faceless_selfie_returns_error_body() {
    let (_tmp, dir) = scratch_dir();
    let request = multipart_request(&[("dni", png([90, 60, 30])), ("selfie", png([0, 0, 0]))]);

    let (status, body) = send(router(&dir), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "no face detected in the selfie image");
}

#[tokio::test]
async fn missing_selfie_part_is_unprocessable() {
    let (_tmp, dir) = scratch_dir();
    let request = multipart_request(&[("dni", png([90, 60, 30])), ("notes", b"hi".to_vec())]);

    let (status, body) = send(router(&dir), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "missing multipart field 'selfie'");
}

#[tokio::test]
async fn non_multipart_body_is_unprocessable() {
    let (_tmp, dir) = scratch_dir();
    let request = Request::builder()
        .method("POST")
        .uri("/compare")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"dni": "x"}"#))
        .unwrap();

    let (status, body) = send(router(&dir), request).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().starts_with("invalid multipart upload"));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let (_tmp, dir) = scratch_dir();
    let request = multipart_request(&[("dni", vec![7_u8; 8 * 1024]), ("selfie", png([1, 2, 3]))]);

    let (status, body) = send(router_with_limit(&dir, 1024), request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn reference_images_lists_directory() {
    let (_tmp, dir) = scratch_dir();
    for name in ["maria.png", "juan.jpg", "ana.jpeg", "contrato.pdf"] {
        std::fs::write(dir.join(name), b"x").unwrap();
    }

    let request = Request::builder()
        .uri("/reference-images")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router(&dir), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"images": ["ana.jpeg", "juan.jpg", "maria.png"]}));
}

#[tokio::test]
async fn reference_images_reads_directory_per_request() {
    let (_tmp, dir) = scratch_dir();
    let app = router(&dir);

    let first = send(
        app.clone(),
        Request::builder()
            .uri("/reference-images")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(first.1, json!({"images": []}));

    std::fs::write(dir.join("nuevo.png"), b"x").unwrap();
    let second = send(
        app,
        Request::builder()
            .uri("/reference-images")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(second.1, json!({"images": ["nuevo.png"]}));
}

#[tokio::test]
async fn missing_reference_directory_returns_error_body() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("gone");

    let request = Request::builder()
        .uri("/reference-images")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(router(&missing), request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("failed to read reference image directory"));
}

#[tokio::test]
async fn cors_allows_any_origin_with_credentials() {
    let (_tmp, dir) = scratch_dir();
    let request = Request::builder()
        .uri("/reference-images")
        .header(ORIGIN, "https://kyc.example")
        .body(Body::empty())
        .unwrap();

    let response = router(&dir).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://kyc.example"
    );
    assert_eq!(
        headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn cors_origin_list_excludes_unlisted_origins() {
    let (_tmp, dir) = scratch_dir();
    let app = router_for(settings_with_origins(
        &dir,
        10 * 1024 * 1024,
        Some(vec!["https://kyc.example".to_string()]),
    ));
    let request_from = |origin: &str| {
        Request::builder()
            .uri("/reference-images")
            .header(ORIGIN, origin)
            .body(Body::empty())
            .unwrap()
    };

    let rejected = app
        .clone()
        .oneshot(request_from("https://evil.example"))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::OK);
    assert!(rejected.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    let allowed = app.oneshot(request_from("https://kyc.example")).await.unwrap();
    let headers = allowed.headers();
    assert_eq!(
        headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://kyc.example"
    );
    assert_eq!(
        headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}
