//! Error-to-HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use nzbdav_common::Error;
use serde_json::json;

/// Wrapper so handlers can return `Result<T, AppError>` and use `?` on
/// [`nzbdav_common::Error`].
#[derive(Debug)]
pub struct AppError(Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) | Error::InvalidNzb(_) => StatusCode::BAD_REQUEST,
            Error::ArticleNotFound(_)
            | Error::CouldNotConnect(_)
            | Error::CouldNotLogin(_)
            | Error::Protocol(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::PoolShutdown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            Error::NotFound(_) => "not_found",
            Error::InvalidInput(_) => "invalid_input",
            Error::InvalidNzb(_) => "invalid_nzb",
            Error::ArticleNotFound(_) => "article_not_found",
            Error::CouldNotConnect(_) | Error::CouldNotLogin(_) | Error::Protocol(_) => {
                "usenet_error"
            }
            Error::Timeout(_) => "timeout",
            Error::PoolShutdown => "unavailable",
            Error::Database(_) => "database_error",
            Error::Io(_) => "io_error",
            _ => "internal_error",
        }
    }
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.0, "server error in API handler");
        }

        let body = json!({
            "error": self.0.to_string(),
            "code": self.code(),
        });
        (status, axum::Json(body)).into_response()
    }
}
