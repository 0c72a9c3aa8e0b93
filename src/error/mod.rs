//! Error handling module

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::crypto::EncryptionError;
use crate::router::RouterError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Router(#[from] RouterError),
}

impl From<EncryptionError> for AppError {
    fn from(e: EncryptionError) -> Self {
        AppError::Router(e.into())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Router(e) => router_status(e),
        }
    }
}

fn router_status(e: &RouterError) -> StatusCode {
    match e {
        RouterError::InvalidAddress(_)
        | RouterError::Validation { .. }
        | RouterError::Encryption(_) => StatusCode::BAD_REQUEST,
        RouterError::Authentication(_) => StatusCode::UNAUTHORIZED,
        RouterError::RpcTimeout => StatusCode::GATEWAY_TIMEOUT,
        RouterError::TransportUnavailable(_)
        | RouterError::RpcTransport { .. }
        | RouterError::RouterUnreachable { .. }
        | RouterError::CommandExecution { .. }
        | RouterError::RpcFault(_) => StatusCode::BAD_GATEWAY,
        RouterError::IncompleteRule { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let mut body = serde_json::json!({
            "ok": false,
            "error": self.to_string(),
            "status": status.as_u16()
        });
        if let AppError::Router(e) = &self {
            body["retryable"] = serde_json::json!(e.is_retryable());
        }
        match &self {
            AppError::Router(RouterError::Validation { field, .. }) => {
                body["field"] = serde_json::json!(field);
            }
            // The section exists; hand its id back so the caller can clean up
            AppError::Router(RouterError::IncompleteRule { native_id, .. }) => {
                body["nativeId"] = serde_json::json!(native_id);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}
