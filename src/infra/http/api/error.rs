use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};

use deckport_api_types::{ApiErrorBody, ApiErrorMessage};

use crate::application::error::ErrorReport;
use crate::application::exports::ExportError;

pub mod codes {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const NOT_READY: &str = "NOT_READY";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

const SOURCE: &str = "infra::http::api";

/// JSON error response. `message` and `details` reach the client; `report`
/// only reaches the logs.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
    report: Option<ErrorReport>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            report: None,
        }
    }

    /// Single-field validation failure, reported as `details.{field}`.
    pub fn validation(field: &str, reason: impl Into<String>) -> Self {
        let mut details = Map::new();
        details.insert(field.to_string(), Value::String(reason.into()));
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::VALIDATION_ERROR,
            "Request validation failed",
        )
        .with_details(Value::Object(details))
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Workspace identity required",
        )
    }

    pub fn not_found(message: &'static str) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    /// Generic 500. The cause is logged, never returned.
    pub fn internal(error: &dyn std::error::Error) -> Self {
        let mut api_error = Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            "An internal error occurred",
        );
        api_error.report = Some(ErrorReport::from_error(
            SOURCE,
            StatusCode::INTERNAL_SERVER_ERROR,
            error,
        ));
        api_error
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<ExportError> for ApiError {
    fn from(error: ExportError) -> Self {
        match error {
            ExportError::Validation { field, message } => ApiError::validation(field, message),
            ExportError::DeckNotFound => ApiError::not_found("Deck not found"),
            ExportError::JobNotFound => ApiError::not_found("Export job not found"),
            ExportError::NotReady { status } => ApiError::new(
                StatusCode::CONFLICT,
                codes::NOT_READY,
                "Export is not finished yet",
            )
            .with_details(serde_json::json!({ "status": status })),
            other => ApiError::internal(&other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(SOURCE, self.status, format!("{}: {}", self.code, self.message))
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
                details: self.details,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        // Structured report for the shared logging middleware.
        report.attach(&mut response);
        response
    }
}
