//! HTTP mapping for errors raised by the arena components

use crate::error::ArenaError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tracing::{error, warn};

/// Error returned by HTTP handlers
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<ArenaError>() {
            Some(ArenaError::Unauthenticated { .. }) => StatusCode::UNAUTHORIZED,
            Some(ArenaError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            Some(ArenaError::Validation { .. }) => StatusCode::BAD_REQUEST,
            Some(ArenaError::Conflict { .. }) => StatusCode::CONFLICT,
            Some(ArenaError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Some(ArenaError::Timeout { .. }) => StatusCode::REQUEST_TIMEOUT,
            Some(ArenaError::Upstream { .. }) => StatusCode::BAD_GATEWAY,
            Some(ArenaError::Configuration { .. }) | Some(ArenaError::Internal { .. }) | None => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> Value {
        match self.0.downcast_ref::<ArenaError>() {
            Some(ArenaError::Unauthenticated { reason })
            | Some(ArenaError::Forbidden { reason })
            | Some(ArenaError::Validation { reason }) => json!({ "error": reason }),
            Some(ArenaError::Conflict {
                reason,
                match_id,
                status,
            }) => json!({ "error": reason, "match_id": match_id, "status": status }),
            Some(ArenaError::NotFound { entity, .. }) => {
                json!({ "error": format!("{} not found", entity) })
            }
            Some(ArenaError::Timeout { match_id }) => {
                json!({ "error": "Match has timed out", "match_id": match_id })
            }
            Some(ArenaError::Upstream { .. }) => json!({ "error": "Upstream service failed" }),
            _ => json!({ "error": "Internal server error" }),
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:#}", self.0);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self.0);
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ArenaError, StatusCode)> = vec![
            (
                ArenaError::Unauthenticated {
                    reason: "x".to_string(),
                },
                StatusCode::UNAUTHORIZED,
            ),
            (
                ArenaError::Forbidden {
                    reason: "x".to_string(),
                },
                StatusCode::FORBIDDEN,
            ),
            (ArenaError::conflict("x"), StatusCode::CONFLICT),
            (ArenaError::match_not_found("m"), StatusCode::NOT_FOUND),
            (
                ArenaError::Timeout {
                    match_id: "m".to_string(),
                },
                StatusCode::REQUEST_TIMEOUT,
            ),
            (
                ArenaError::Upstream {
                    message: "x".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
        assert_eq!(
            ApiError::from(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_details_not_leaked() {
        let err = ApiError::from(ArenaError::Internal {
            message: "lock poisoned at store.rs".to_string(),
        });
        assert_eq!(err.body()["error"], "Internal server error");
    }

    #[test]
    fn test_conflict_carries_match() {
        let err = ApiError::from(ArenaError::Conflict {
            reason: "Already in a match".to_string(),
            match_id: Some("m-1".to_string()),
            status: Some("active".to_string()),
        });
        let body = err.body();
        assert_eq!(body["match_id"], "m-1");
        assert_eq!(body["status"], "active");
    }
}
