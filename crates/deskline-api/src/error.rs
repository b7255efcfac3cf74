// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maps engine errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use deskline_core::DesklineError;
use serde::Serialize;

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    Engine(DesklineError),
    /// Malformed request that never reached the engine.
    BadRequest(String),
}

impl From<DesklineError> for ApiError {
    fn from(e: DesklineError) -> Self {
        Self::Engine(e)
    }
}

pub fn status_for(err: &DesklineError) -> StatusCode {
    match err {
        DesklineError::AlreadyClaimed { .. }
        | DesklineError::InvalidTransition { .. }
        | DesklineError::NoQueueAssigned { .. }
        | DesklineError::PairingInProgress { .. } => StatusCode::CONFLICT,
        DesklineError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
        DesklineError::NotFound { .. } => StatusCode::NOT_FOUND,
        DesklineError::Config(_) => StatusCode::BAD_REQUEST,
        DesklineError::GatewayUnreachable { .. } | DesklineError::AiUnavailable { .. } => {
            StatusCode::BAD_GATEWAY
        }
        DesklineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        DesklineError::FeedDisconnected
        | DesklineError::Storage { .. }
        | DesklineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Engine(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    tracing::error!(error = %err, "request failed");
                }
                (status, err.to_string())
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_actionable_errors_are_client_errors() {
        let conflicts = [
            DesklineError::AlreadyClaimed { ticket: "t".into() },
            DesklineError::invalid_transition("ticket", "closed", "pending"),
            DesklineError::NoQueueAssigned { ticket: "t".into() },
            DesklineError::PairingInProgress {
                instance: "i".into(),
            },
        ];
        for err in &conflicts {
            assert_eq!(status_for(err), StatusCode::CONFLICT, "{err}");
        }
        assert_eq!(
            status_for(&DesklineError::QuotaExceeded {
                resource: "instances".into(),
                limit: 1
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(&DesklineError::not_found("ticket", "t")),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn infrastructure_errors_are_server_errors() {
        assert_eq!(
            status_for(&DesklineError::GatewayUnreachable {
                message: "refused".into(),
                source: None
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&DesklineError::FeedDisconnected),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
