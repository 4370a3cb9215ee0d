use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use canopy_contract::{ImportReport, Violation};
use canopy_pipeline::PipelineError;
use canopy_store::StoreError;

/// Error taxonomy of the processing API. Every failure is converted to one
/// of these at the gateway boundary and rendered as a structured JSON body;
/// nothing propagates as a panic.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    ContractViolation(Box<ImportReport>),
    Processing { stage: String, message: String },
    Storage(String),
    NotFound(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    violations: Option<Vec<Violation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
}

impl ApiError {
    fn category(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "unauthorized",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::ContractViolation(_) => "contract_violation",
            ApiError::Processing { .. } => "processing_failure",
            ApiError::Storage(_) => "storage_failure",
            ApiError::NotFound(_) => "not_found",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ContractViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Processing { .. } | ApiError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let category = self.category();
        let body = match self {
            ApiError::Unauthorized => ErrorBody {
                error: category,
                message: "missing or invalid bearer token".to_string(),
                stage: None,
                violations: None,
                warnings: None,
            },
            ApiError::BadRequest(message)
            | ApiError::Storage(message)
            | ApiError::NotFound(message) => ErrorBody {
                error: category,
                message,
                stage: None,
                violations: None,
                warnings: None,
            },
            ApiError::ContractViolation(report) => ErrorBody {
                error: category,
                message: format!(
                    "TreeSum file failed the import contract with {} violation(s)",
                    report.errors.len()
                ),
                stage: Some("validate".to_string()),
                violations: Some(report.errors),
                warnings: (!report.warnings.is_empty()).then_some(report.warnings),
            },
            ApiError::Processing { stage, message } => ErrorBody {
                error: category,
                message,
                stage: Some(stage),
                violations: None,
                warnings: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::ContractViolation(report) => ApiError::ContractViolation(report),
            other => ApiError::Processing {
                stage: other.stage_name().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Storage(err.to_string())
    }
}
