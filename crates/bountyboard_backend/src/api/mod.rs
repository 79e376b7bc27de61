pub mod bounty;
pub mod metadata;
pub mod user;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use log::{debug, error};
use serde_json::json;

use crate::{
    error::{ActionError, ChainError, MetadataError, PreconditionError, ValidationError},
    AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .nest("/metadata", metadata::router())
        .nest("/bounty", bounty::router())
        .nest("/user", user::router())
}

async fn health() -> &'static str {
    "health!"
}

/// Error body `{"error": "..."}` with a status picked from the error kind
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, err: impl ToString) -> Self {
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{} {}", self.status, self.message);
        } else {
            debug!("{} {}", self.status, self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, err)
    }
}

impl From<PreconditionError> for ApiError {
    fn from(err: PreconditionError) -> Self {
        ApiError::new(StatusCode::CONFLICT, err)
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        let status = match err {
            ChainError::Connectivity(_) | ChainError::Decode(_) => StatusCode::BAD_GATEWAY,
            ChainError::Reverted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ChainError::UnknownBounty(_) => StatusCode::NOT_FOUND,
            ChainError::NoSigner => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err)
    }
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Validation(e) => e.into(),
            ActionError::Precondition(e) => e.into(),
            ActionError::Chain(e) => e.into(),
        }
    }
}

impl From<MetadataError> for ApiError {
    fn from(err: MetadataError) -> Self {
        let status = match err {
            MetadataError::InvalidReference(_) => StatusCode::BAD_REQUEST,
            MetadataError::Timeout { .. }
            | MetadataError::Gateway { .. }
            | MetadataError::Exhausted { .. }
            | MetadataError::Malformed(_) => StatusCode::BAD_GATEWAY,
            MetadataError::NotConfigured(_) | MetadataError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, Address, BountyState};

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (ValidationError::MissingField("title").into(), StatusCode::BAD_REQUEST),
            (
                PreconditionError::WrongState {
                    action: ActionKind::Vote,
                    state: BountyState::Closed,
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                ChainError::UnknownBounty(Address::zero()).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                ChainError::Connectivity("refused".into()).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ActionError::Chain(ChainError::Reverted { reason: None }).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                MetadataError::NotConfigured("PINATA_JWT").into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                MetadataError::Exhausted {
                    cid: "bafy".into(),
                    attempts: 3,
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                MetadataError::InvalidReference("??".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status, status, "{}", err.message);
        }
    }
}
