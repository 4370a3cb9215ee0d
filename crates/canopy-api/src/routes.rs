use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use canopy_pipeline::{
    CruiseDesign, CruiseType, PipelineInput, RunOutput, RunParams,
};
use canopy_store::{ArtifactLink, StoreError};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ProcessResponse {
    pub run_id: String,
    pub report_url: String,
    pub artifacts: Vec<ArtifactLink>,
    pub import: ImportSummary,
}

#[derive(Serialize)]
pub struct ImportSummary {
    pub rows: usize,
    pub stands: usize,
    pub warnings: Vec<String>,
    pub source_hash: String,
}

/// The one stateful operation: accept a bundle of input files plus
/// parameters, run the pipeline exactly once, and answer with stable links
/// to the derived artifacts.
///
/// Takes the raw request so the auth and origin gates run before any body
/// byte is consumed; multipart parsing starts only for authorized calls.
pub async fn process(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<ProcessResponse>, ApiError> {
    authorize(request.headers(), &state.config)?;
    check_origin(request.headers(), &state.config)?;

    let multipart = Multipart::from_request(request, &state)
        .await
        .map_err(|err| ApiError::BadRequest(format!("expected multipart form data: {err}")))?;
    let form = collect_form(multipart).await?;
    let (request, uploads) = build_request(form)?;

    let run_id = new_run_id();
    info!(%run_id, "processing request accepted");

    persist_uploads(&state.config, &run_id, &uploads).await?;

    let runner = state.runner.clone();
    let output = tokio::task::spawn_blocking(move || runner.run(&request))
        .await
        .map_err(|err| ApiError::Processing {
            stage: "runner".to_string(),
            message: format!("pipeline task failed: {err}"),
        })?
        .map_err(|err| {
            error!(%run_id, stage = err.stage_name(), "pipeline failed: {err}");
            ApiError::from(err)
        })?;

    let response = publish_artifacts(&state, &run_id, output).await?;
    info!(%run_id, artifacts = response.artifacts.len(), "processing complete");
    Ok(Json(response))
}

pub async fn download(
    State(state): State<AppState>,
    Path((run_id, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let bytes = state
        .store
        .get_artifact(&run_id, &filename)
        .await
        .map_err(|err| match err {
            StoreError::NotFound(key) => ApiError::NotFound(format!("no artifact at {key}")),
            StoreError::InvalidName(name) => {
                ApiError::NotFound(format!("invalid artifact name '{name}'"))
            }
            other => ApiError::Storage(other.to_string()),
        })?;

    let content_type = content_type_for(&filename);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "time": Utc::now().to_rfc3339() }))
}

fn authorize(headers: &HeaderMap, config: &ApiConfig) -> Result<(), ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let token = value.strip_prefix("Bearer ").ok_or(ApiError::Unauthorized)?;
    if token != config.api_token {
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

/// Pass/fail origin gate. The CORS layer handles the browser-facing headers;
/// this rejects foreign origins outright when an allowlist is configured.
fn check_origin(headers: &HeaderMap, config: &ApiConfig) -> Result<(), ApiError> {
    if config.allowed_origins.is_empty() {
        return Ok(());
    }
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin
            .to_str()
            .map_err(|_| ApiError::BadRequest("invalid Origin header".to_string()))?;
        if !config.allowed_origins.iter().any(|allowed| allowed == origin) {
            return Err(ApiError::BadRequest(format!(
                "origin '{origin}' is not allowed"
            )));
        }
    }
    Ok(())
}

struct UploadedFile {
    filename: String,
    bytes: Bytes,
}

#[derive(Default)]
struct ProcessForm {
    files: HashMap<String, UploadedFile>,
    fields: HashMap<String, String>,
}

impl ProcessForm {
    fn field_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.fields.get(name).map(String::as_str) {
            Some(value) if !value.trim().is_empty() => value.trim(),
            _ => default,
        }
    }
}

async fn collect_form(mut multipart: Multipart) -> Result<ProcessForm, ApiError> {
    let mut form = ProcessForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("malformed multipart body: {err}")))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match field.file_name().map(str::to_string) {
            Some(filename) => {
                // Browsers submit empty filename parts for unset optional
                // file inputs.
                if filename.is_empty() {
                    continue;
                }
                let bytes = field.bytes().await.map_err(|err| {
                    ApiError::BadRequest(format!("failed to read '{name}' upload: {err}"))
                })?;
                form.files.insert(name, UploadedFile { filename, bytes });
            }
            None => {
                let value = field.text().await.map_err(|err| {
                    ApiError::BadRequest(format!("failed to read '{name}' field: {err}"))
                })?;
                form.fields.insert(name, value);
            }
        }
    }
    Ok(form)
}

/// Uploaded inputs kept for the run's working directory.
struct Uploads {
    files: Vec<(String, Bytes)>,
}

fn build_request(mut form: ProcessForm) -> Result<(PipelineInput, Uploads), ApiError> {
    let treesum = require_file(&mut form, "treesum", &["csv"])?;
    let prices = require_file(&mut form, "prices", &["json"])?;
    let events = optional_file(&mut form, "events", &["csv"])?;
    let calibration = optional_file(&mut form, "calibration", &["json"])?;

    let cruise_type: CruiseType = form
        .field_or("cruise_type", "Plot")
        .parse()
        .map_err(ApiError::BadRequest)?;
    let size_value: f64 = form
        .field_or("size_value", "0.1")
        .parse()
        .map_err(|_| ApiError::BadRequest("size_value must be numeric".to_string()))?;
    let design = CruiseDesign::new(cruise_type, size_value).map_err(ApiError::BadRequest)?;

    let discount_pct: f64 = form
        .field_or("discount", "5")
        .parse()
        .map_err(|_| ApiError::BadRequest("discount must be numeric".to_string()))?;
    if discount_pct <= -100.0 {
        return Err(ApiError::BadRequest(
            "discount must be greater than -100%".to_string(),
        ));
    }

    let params = RunParams {
        design,
        owner: form.field_or("owner", "Owner").to_string(),
        tract: form.field_or("tract", "Tract").to_string(),
        discount_pct,
        species_col: form.field_or("species_col", "CalSpecies").to_string(),
        reference_date: Utc::now().date_naive(),
    };

    let mut uploads = Uploads { files: Vec::new() };
    uploads.files.push((treesum.filename.clone(), treesum.bytes.clone()));
    uploads.files.push((prices.filename.clone(), prices.bytes.clone()));
    if let Some(file) = &events {
        uploads.files.push((file.filename.clone(), file.bytes.clone()));
    }
    if let Some(file) = &calibration {
        uploads.files.push((file.filename.clone(), file.bytes.clone()));
    }

    let input = PipelineInput {
        treesum: treesum.bytes.to_vec(),
        prices: prices.bytes.to_vec(),
        events: events.map(|file| file.bytes.to_vec()),
        calibration: calibration.map(|file| file.bytes.to_vec()),
        params,
    };

    Ok((input, uploads))
}

fn require_file(
    form: &mut ProcessForm,
    name: &str,
    allowed: &[&str],
) -> Result<UploadedFile, ApiError> {
    optional_file(form, name, allowed)?.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "missing required file field '{name}' (.{})",
            allowed.join("/.")
        ))
    })
}

fn optional_file(
    form: &mut ProcessForm,
    name: &str,
    allowed: &[&str],
) -> Result<Option<UploadedFile>, ApiError> {
    let Some(file) = form.files.remove(name) else {
        return Ok(None);
    };
    let extension = file
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if allowed.contains(&ext.as_str()) => Ok(Some(file)),
        _ => Err(ApiError::BadRequest(format!(
            "'{name}' must be a .{} file, got '{}'",
            allowed.join("/."),
            file.filename
        ))),
    }
}

/// Collision-free run identity: wall-clock prefix for operators, uuid suffix
/// for uniqueness.
fn new_run_id() -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), suffix)
}

async fn persist_uploads(
    config: &ApiConfig,
    run_id: &str,
    uploads: &Uploads,
) -> Result<(), ApiError> {
    let dir = config.uploads_dir.join(run_id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|err| ApiError::Storage(format!("failed to create upload dir: {err}")))?;
    for (filename, bytes) in &uploads.files {
        let path = dir.join(sanitize_filename(filename));
        tokio::fs::write(&path, bytes).await.map_err(|err| {
            ApiError::Storage(format!("failed to persist upload '{filename}': {err}"))
        })?;
    }
    Ok(())
}

/// Keeps uploads to a single safe path component, in the spirit of
/// werkzeug's secure_filename.
fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.').to_string();
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed
    }
}

async fn publish_artifacts(
    state: &AppState,
    run_id: &str,
    output: RunOutput,
) -> Result<ProcessResponse, ApiError> {
    let report_name = output.report_name();
    let mut links = Vec::with_capacity(output.artifacts.len());
    for artifact in output.artifacts {
        let link = state
            .store
            .put_artifact(
                run_id,
                artifact.name,
                Bytes::from(artifact.bytes),
                artifact.content_type,
            )
            .await?;
        links.push(link);
    }

    let report_url = links
        .iter()
        .find(|link| link.name == report_name)
        .map(|link| link.url.clone())
        .ok_or_else(|| ApiError::Storage("owner report artifact was not stored".to_string()))?;

    Ok(ProcessResponse {
        run_id: run_id.to_string(),
        report_url,
        artifacts: links,
        import: ImportSummary {
            rows: output.import_report.rows,
            stands: output.import_report.stands_detected.len(),
            warnings: output.import_report.warnings,
            source_hash: output.import_report.source_hash,
        },
    })
}

fn content_type_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("html") => "text/html; charset=utf-8",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_and_shaped() {
        let a = new_run_id();
        let b = new_run_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), "20260115-101500-".len() + 8);
    }

    #[test]
    fn filenames_are_sanitized_to_one_component() {
        assert_eq!(sanitize_filename("tree sum.csv"), "tree_sum.csv");
        assert_eq!(sanitize_filename("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_filename("..."), "upload");
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for("a.html"), "text/html; charset=utf-8");
        assert_eq!(content_type_for("a.csv"), "text/csv");
        assert_eq!(content_type_for("a"), "application/octet-stream");
    }
}
