// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::envelope::EnvelopeError;
use crate::issuance::IssueError;
use crate::scan::ScanError;
use crate::storage::StoreError;

/// Wire message for every envelope verification failure.
pub const INVALID_ENVELOPE_MESSAGE: &str = "Invalid or expired envelope";

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<EnvelopeError> for ApiError {
    fn from(err: EnvelopeError) -> Self {
        // The failing step stays in the logs only.
        warn!(error_kind = err.kind(), "Envelope rejected");
        Self::bad_request(INVALID_ENVELOPE_MESSAGE)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        error!(error = %err, "Storage failure");
        Self::internal("Storage error")
    }
}

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::BatchComplete { .. } => Self::conflict(err.to_string()),
            IssueError::InvalidIdentifier { .. } | IssueError::InvalidCount(_) => {
                Self::unprocessable(err.to_string())
            }
            IssueError::Envelope(e) => {
                error!(error_kind = e.kind(), "Envelope minting failed");
                Self::internal("Failed to mint envelope")
            }
            IssueError::Store(e) => e.into(),
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Envelope(e) => e.into(),
            ScanError::BatchNotFound(_) | ScanError::ProductNotFound(_) => {
                Self::not_found(err.to_string())
            }
            ScanError::InvalidLocation => Self::unprocessable(err.to_string()),
            ScanError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn constructors_set_status_and_message() {
        let nf = ApiError::not_found("missing");
        assert_eq!(nf.status, StatusCode::NOT_FOUND);
        assert_eq!(nf.message, "missing");

        let bad = ApiError::bad_request("bad");
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);

        let unp = ApiError::unprocessable("oops");
        assert_eq!(unp.status, StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(ApiError::conflict("taken").status, StatusCode::CONFLICT);
        assert_eq!(
            ApiError::internal("boom").status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data"}"#);
    }

    #[test]
    fn envelope_failures_are_indistinguishable() {
        for err in [
            EnvelopeError::MalformedEnvelope,
            EnvelopeError::HmacMismatch,
            EnvelopeError::TokenInvalid,
            EnvelopeError::TokenExpired,
            EnvelopeError::DecryptionFailed,
            EnvelopeError::PayloadCorrupt,
            EnvelopeError::UnrecognizedEnvelopeType,
        ] {
            let api: ApiError = ScanError::Envelope(err).into();
            assert_eq!(api.status, StatusCode::BAD_REQUEST);
            assert_eq!(api.message, INVALID_ENVELOPE_MESSAGE);
        }
    }

    #[test]
    fn domain_errors_map_to_status() {
        let complete: ApiError = IssueError::BatchComplete {
            batch_id: "B-1".into(),
            total_count: 3,
        }
        .into();
        assert_eq!(complete.status, StatusCode::CONFLICT);

        let invalid: ApiError = IssueError::InvalidIdentifier { field: "name" }.into();
        assert_eq!(invalid.status, StatusCode::UNPROCESSABLE_ENTITY);

        let missing: ApiError = ScanError::ProductNotFound("u-1".into()).into();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);

        let location: ApiError = ScanError::InvalidLocation.into();
        assert_eq!(location.status, StatusCode::UNPROCESSABLE_ENTITY);

        let store: ApiError = StoreError::Conflict("x".into()).into();
        assert_eq!(store.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(store.message, "Storage error");
    }
}
