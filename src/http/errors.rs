use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use thiserror;

use crate::errors::Error as CoreError;
use crate::protocol::ErrorBody;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid listen address")]
    InvalidListenAddress(#[from] std::net::AddrParseError),

    #[error("server error")]
    ServerError(#[from] hyper::Error),

    #[error(transparent)]
    CoreError(#[from] CoreError),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::CoreError(e) => core_error_to_response(e),
            Error::InvalidListenAddress(_) | Error::ServerError(_) => {
                tracing::warn!("{:?}", self);
                internal_server_error()
            }
        }
    }
}

#[inline]
fn into_error_response(status: StatusCode, code: &str, message: String) -> Response {
    let body = ErrorBody {
        code: code.to_string(),
        message,
    };
    (status, Json(body)).into_response()
}

#[inline]
fn internal_server_error() -> Response {
    into_error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        String::from("internal server error"),
    )
}

#[inline]
fn core_error_to_response(e: CoreError) -> Response {
    let message = format!("{e}");
    match e {
        CoreError::InvalidInput(_) => {
            into_error_response(StatusCode::BAD_REQUEST, "invalid_input", message)
        }
        CoreError::InvalidManifest(_) | CoreError::PlanIncomplete(_) => {
            into_error_response(StatusCode::BAD_REQUEST, "invalid_manifest", message)
        }
        CoreError::InitiateFailed(_) => {
            tracing::warn!("{message}");
            into_error_response(StatusCode::BAD_GATEWAY, "initiate_failed", message)
        }
        CoreError::CredentialIssuanceFailed { .. } => {
            tracing::warn!("{message}");
            into_error_response(StatusCode::BAD_GATEWAY, "credential_issuance_failed", message)
        }
        CoreError::CompletionFailed(_) => {
            tracing::warn!("{message}");
            into_error_response(StatusCode::BAD_GATEWAY, "completion_failed", message)
        }
        CoreError::AbortFailed(_) => {
            tracing::warn!("{message}");
            into_error_response(StatusCode::BAD_GATEWAY, "abort_failed", message)
        }
        CoreError::ObjectStoreError(_) => {
            tracing::warn!("{message}");
            into_error_response(StatusCode::BAD_GATEWAY, "backend_error", message)
        }
        CoreError::PartTransferFailed { .. }
        | CoreError::PartsFailed { .. }
        | CoreError::Cancelled
        | CoreError::Unfinished { .. }
        | CoreError::ConfigError(_)
        | CoreError::IOError(_)
        | CoreError::HTTPClientError(_) => {
            tracing::warn!("{message}");
            internal_server_error()
        }
    }
}
