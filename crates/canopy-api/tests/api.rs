use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use canopy_api::{build_router, ApiConfig, AppState};
use canopy_contract::ImportContract;
use canopy_pipeline::PipelineRunner;
use canopy_store::LocalDirStore;

const TOKEN: &str = "test-token";
const BOUNDARY: &str = "X-CANOPY-TEST-BOUNDARY";

const TREESUM: &str = "\
TractName,StandID,StandAcres,CruiseDate,CruiseType,Size_BAF,PlotNum,PlotID,Species,DBH,MerchHt,TopDIB,TreeClass\n\
T1,S1,25,2024-03-15,Plot,1.0,1,S1-P1,SPP1,9.5,48,6,Saw\n\
T1,S1,25,2024-03-15,Plot,1.0,1,S1-P1,SPP2,11.2,52,6,Saw\n";

const PRICES: &str = r#"{"SPP1": 10, "SPP2": 20}"#;

fn app(dir: &Path, origins: Vec<String>) -> Router {
    let config = ApiConfig {
        port: 0,
        api_token: TOKEN.to_string(),
        secret_key: "test-secret".to_string(),
        uploads_dir: dir.join("uploads"),
        outputs_dir: dir.join("outputs"),
        allowed_origins: origins,
        contract_path: None,
        max_upload_bytes: 8 * 1024 * 1024,
    };
    let state = AppState {
        store: Arc::new(LocalDirStore::new(config.outputs_dir.clone())),
        runner: Arc::new(PipelineRunner::new(ImportContract::builtin())),
        config: Arc::new(config),
    };
    build_router(state)
}

#[derive(Default)]
struct MultipartBody {
    parts: Vec<u8>,
}

impl MultipartBody {
    fn text(mut self, name: &str, value: &str) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, filename: &str, content_type: &str, body: &str) -> Self {
        self.parts.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; \
                 filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n{body}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.parts
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.parts
    }
}

fn standard_form() -> MultipartBody {
    MultipartBody::default()
        .file("treesum", "treesum.csv", "text/csv", TREESUM)
        .file("prices", "prices.json", "application/json", PRICES)
        .text("cruise_type", "Plot")
        .text("size_value", "1.0")
        .text("discount", "5")
        .text("owner", "Acme")
        .text("tract", "T1")
}

fn process_request(body: Vec<u8>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/process")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_or_wrong_token_is_unauthorized_before_the_body_is_touched() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    // A body that is not even multipart: auth must fail first, so this is
    // still a 401, not a 400.
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/process")
        .body(Body::from("not multipart"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(process_request(standard_form().finish(), Some("wrong")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["error"], "unauthorized");

    // Nothing was written anywhere.
    assert!(!dir.path().join("uploads").exists());
    assert!(!dir.path().join("outputs").exists());
}

#[tokio::test]
async fn missing_required_files_are_bad_requests() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let no_treesum = MultipartBody::default()
        .file("prices", "prices.json", "application/json", PRICES)
        .finish();
    let response = app
        .clone()
        .oneshot(process_request(no_treesum, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "bad_request");
    assert!(body["message"].as_str().unwrap().contains("treesum"));

    let no_prices = MultipartBody::default()
        .file("treesum", "treesum.csv", "text/csv", TREESUM)
        .finish();
    let response = app
        .clone()
        .oneshot(process_request(no_prices, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // No run directory appears for a rejected request.
    assert!(!dir.path().join("outputs").exists());
}

#[tokio::test]
async fn scalar_field_validation() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let bad_discount = standard_form().text("discount", "abc").finish();
    let response = app
        .clone()
        .oneshot(process_request(bad_discount, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().contains("discount"));

    let bad_cruise = standard_form().text("cruise_type", "Strip").finish();
    let response = app
        .clone()
        .oneshot(process_request(bad_cruise, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bad_size = standard_form().text("size_value", "-1").finish();
    let response = app
        .clone()
        .oneshot(process_request(bad_size, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsupported_extension_is_a_bad_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let body = MultipartBody::default()
        .file("treesum", "treesum.xlsx", "application/octet-stream", "junk")
        .file("prices", "prices.json", "application/json", PRICES)
        .finish();
    let response = app
        .oneshot(process_request(body, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().contains("treesum.xlsx"));
}

#[tokio::test]
async fn contract_violation_names_the_missing_column() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let body = MultipartBody::default()
        .file("treesum", "treesum.csv", "text/csv", "TractName,StandID\nT1,S1\n")
        .file("prices", "prices.json", "application/json", PRICES)
        .finish();
    let response = app
        .oneshot(process_request(body, Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["error"], "contract_violation");
    let violations = body["violations"].as_array().unwrap();
    assert!(violations
        .iter()
        .any(|v| v["column"] == "Species"));

    // A rejected import publishes nothing: no run directory, no report.
    assert!(!dir.path().join("outputs").exists());
}

#[tokio::test]
async fn successful_run_returns_links_and_persists_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let response = app
        .clone()
        .oneshot(process_request(standard_form().finish(), Some(TOKEN)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    let run_id = body["run_id"].as_str().unwrap().to_string();
    let report_url = body["report_url"].as_str().unwrap().to_string();
    assert!(report_url.ends_with("out_owner_report.html"));
    assert_eq!(body["import"]["rows"], 2);
    assert_eq!(body["import"]["stands"], 1);

    let artifacts = body["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 6);
    assert!(artifacts
        .iter()
        .any(|a| a["name"] == "out_stand_summary.csv"));

    // Artifacts and uploads are on disk under the run id.
    let run_dir = dir.path().join("outputs").join(&run_id);
    assert!(run_dir.join("out_owner_report.html").exists());
    assert!(run_dir.join("out_stand_summary.csv").exists());
    assert!(dir
        .path()
        .join("uploads")
        .join(&run_id)
        .join("treesum.csv")
        .exists());

    // The report link resolves through the download route.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri(&report_url)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Owner Report"));
    assert!(html.contains("Acme"));
}

#[tokio::test]
async fn repeated_identical_requests_get_their_own_runs_with_identical_numbers() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let first = json_body(
        app.clone()
            .oneshot(process_request(standard_form().finish(), Some(TOKEN)))
            .await
            .unwrap(),
    )
    .await;
    let second = json_body(
        app.clone()
            .oneshot(process_request(standard_form().finish(), Some(TOKEN)))
            .await
            .unwrap(),
    )
    .await;

    let run_a = first["run_id"].as_str().unwrap();
    let run_b = second["run_id"].as_str().unwrap();
    assert_ne!(run_a, run_b);

    let summary_a =
        std::fs::read(dir.path().join("outputs").join(run_a).join("out_stand_summary.csv"))
            .unwrap();
    let summary_b =
        std::fs::read(dir.path().join("outputs").join(run_b).join("out_stand_summary.csv"))
            .unwrap();
    assert_eq!(summary_a, summary_b);
}

#[tokio::test]
async fn foreign_origin_is_rejected_when_an_allowlist_is_configured() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(
        dir.path(),
        vec!["http://allowed.example".to_string()],
    );

    let mut request = process_request(standard_form().finish(), Some(TOKEN));
    request.headers_mut().insert(
        header::ORIGIN,
        "http://evil.example".parse().unwrap(),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["message"].as_str().unwrap().contains("evil.example"));

    let mut request = process_request(standard_form().finish(), Some(TOKEN));
    request.headers_mut().insert(
        header::ORIGIN,
        "http://allowed.example".parse().unwrap(),
    );
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_artifacts_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/download/nope/missing.csv")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = app(dir.path(), Vec::new());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::GET)
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["ok"], true);
    assert!(body["time"].as_str().is_some());
}
