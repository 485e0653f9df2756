//! Uniform `{error}` envelope and the mapping from library errors to
//! HTTP statuses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::warn;

use mediahub_core::{ExtractorError, FactoryError, ProxyError, SourceError, TranscodeError};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error on its way to the client.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// Map an adapter error raised while serving from `source`.
    ///
    /// Resolver failures are counted and logged here with their stage; the
    /// client only sees a generic message.
    pub fn source(source: &str, err: SourceError) -> Self {
        match err {
            SourceError::NotFound(what) => Self::not_found(format!("not found: {}", what)),
            SourceError::BadId(id) => Self::bad_request(format!("malformed id: {}", id)),
            SourceError::Fetch { stage } => {
                warn!(source, stage = %stage, "Upstream fetch failed");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    format!("upstream fetch failed: {}", stage),
                )
            }
            SourceError::Parse { what } => {
                warn!(source, what = %what, "Failed to parse upstream response");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to parse upstream response",
                )
            }
            SourceError::Resolve(e) => {
                e.record(source);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "media resolution failed")
            }
            SourceError::Tool(e) => Self::from(e),
            SourceError::Cancelled => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "request cancelled")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<FactoryError> for ApiError {
    fn from(err: FactoryError) -> Self {
        match err {
            FactoryError::Unknown { .. } | FactoryError::Disabled { .. } => {
                Self::not_found(err.to_string())
            }
            FactoryError::Build { .. } => {
                warn!(error = %err, "Source could not be built");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

impl From<ExtractorError> for ApiError {
    fn from(err: ExtractorError) -> Self {
        match err {
            ExtractorError::ToolMissing { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            ExtractorError::Timeout { .. } => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, err.to_string())
            }
            other => {
                warn!(error = %other, "Extractor failed");
                Self::new(StatusCode::BAD_GATEWAY, "external extractor failed")
            }
        }
    }
}

impl From<TranscodeError> for ApiError {
    fn from(err: TranscodeError) -> Self {
        let status = match &err {
            TranscodeError::ToolMissing { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TranscodeError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            TranscodeError::TaskNotFound { .. } | TranscodeError::OutputNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            TranscodeError::NotReady { .. } => StatusCode::CONFLICT,
            TranscodeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            TranscodeError::OutputDirectoryFailed { .. }
            | TranscodeError::Failed { .. }
            | TranscodeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        let status = match &err {
            ProxyError::BadTarget => StatusCode::BAD_REQUEST,
            ProxyError::UnknownSource(_) => StatusCode::NOT_FOUND,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}
