use super::*;
use crate::config::UploadLimit;
use crate::decode::test_wav;
use crate::model::{fixtures, EmotionModel};
use axum::body::Body;
use axum::http::{header, Request};
use std::path::Path;
use tower::ServiceExt;

const BOUNDARY: &str = "emotion-api-test-boundary";

struct TestApp {
    router: Router,
    scratch: tempfile::TempDir,
    _artifacts: tempfile::TempDir,
}

fn app_with_limit(max_bytes: usize) -> TestApp {
    let artifacts = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let model = EmotionModel::load(&fixtures::write_artifacts(artifacts.path())).unwrap();

    let config = AppConfig {
        scratch_dir: scratch.path().to_path_buf(),
        upload_limit: UploadLimit::new(max_bytes).unwrap(),
        ..AppConfig::default()
    };
    let service = PredictionService::new(Arc::new(model), &config.scratch_dir);
    let router = router(AppState::new(service), &config).unwrap();
    TestApp {
        router,
        scratch,
        _artifacts: artifacts,
    }
}

fn app() -> TestApp {
    app_with_limit(crate::config::DEFAULT_MAX_UPLOAD_BYTES)
}

fn part(name: &str, file_name: Option<&str>, content: &[u8]) -> Vec<u8> {
    let disposition = match file_name {
        Some(f) => format!("form-data; name=\"{name}\"; filename=\"{f}\""),
        None => format!("form-data; name=\"{name}\""),
    };
    let mut out = format!(
        "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    out.extend_from_slice(content);
    out.extend_from_slice(b"\r\n");
    out
}

fn multipart_request(parts: &[Vec<u8>]) -> Request<Body> {
    let mut body: Vec<u8> = parts.concat();
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(router: &Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn health_is_ok() {
    let app = app();
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn valid_wav_returns_single_label_key() {
    let app = app();
    let wav = test_wav::tone_wav(22_050, 1.0);
    let (status, json) = send(
        &app.router,
        multipart_request(&[part("file", Some("tone.wav"), &wav)]),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let obj = json.as_object().unwrap();
    assert_eq!(obj.len(), 1);
    let label = obj["predicted_emotion"].as_str().unwrap();
    assert!(fixtures::LABELS.contains(&label));
    assert!(scratch_is_empty(app.scratch.path()));
}

#[tokio::test]
async fn missing_file_field_is_no_file_part() {
    let app = app();
    let (status, json) = send(
        &app.router,
        multipart_request(&[part("audio", Some("tone.wav"), b"abc")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No file part");
}

#[tokio::test]
async fn file_field_without_filename_is_no_file_part() {
    let app = app();
    let (status, json) = send(&app.router, multipart_request(&[part("file", None, b"abc")])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No file part");
}

#[tokio::test]
async fn file_value_without_filename_is_skipped_for_later_upload() {
    let app = app();
    let wav = test_wav::tone_wav(22_050, 0.5);
    let (status, json) = send(
        &app.router,
        multipart_request(&[
            part("file", None, b"text"),
            part("file", Some("tone.wav"), &wav),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let label = json["predicted_emotion"].as_str().unwrap();
    assert!(fixtures::LABELS.contains(&label));
    assert!(scratch_is_empty(app.scratch.path()));
}

#[tokio::test]
async fn non_multipart_body_is_no_file_part() {
    let app = app();
    let req = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, json) = send(&app.router, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No file part");
}

#[tokio::test]
async fn empty_filename_is_no_selected_file() {
    let app = app();
    let (status, json) = send(
        &app.router,
        multipart_request(&[part("file", Some(""), b"abc")]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "No selected file");
    assert!(scratch_is_empty(app.scratch.path()));
}

#[tokio::test]
async fn non_audio_is_500_and_service_keeps_serving() {
    let app = app();
    let (status, json) = send(
        &app.router,
        multipart_request(&[part("file", Some("notes.txt"), b"this is not audio")]),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!json["error"].as_str().unwrap().is_empty());
    assert!(scratch_is_empty(app.scratch.path()));

    let wav = test_wav::tone_wav(22_050, 0.5);
    let (status, _) = send(
        &app.router,
        multipart_request(&[part("file", Some("tone.wav"), &wav)]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn file_field_found_after_other_fields() {
    let app = app();
    let wav = test_wav::tone_wav(22_050, 0.5);
    let (status, json) = send(
        &app.router,
        multipart_request(&[
            part("note", None, b"hello"),
            part("file", Some("tone.wav"), &wav),
        ]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["predicted_emotion"].is_string());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = app_with_limit(1024);
    let wav = test_wav::tone_wav(22_050, 1.0);
    let (status, json) = send(
        &app.router,
        multipart_request(&[part("file", Some("tone.wav"), &wav)]),
    )
    .await;
    assert!(status.is_client_error());
    assert!(json["error"].is_string());
    assert!(scratch_is_empty(app.scratch.path()));
}

#[tokio::test]
async fn cors_allows_configured_origin() {
    let app = app();
    let req = Request::builder()
        .uri("/health")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );
}

#[test]
fn api_errors_map_to_status_codes() {
    assert_eq!(ApiError::NoFilePart.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ApiError::NoSelectedFile.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        ApiError::Processing("boom".into()).status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(ApiError::Processing("boom".into()).to_string(), "boom");
}
