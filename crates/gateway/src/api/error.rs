//! Mapping from domain errors to HTTP responses.
//!
//! Every error body is `{"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tr_domain::error::Error;

#[derive(Debug)]
pub enum ApiError {
    Domain(Error),
    NotFound(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Domain(Error::Validation(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Domain(e) => match e {
                Error::Validation(_) | Error::InvalidRun(_) => StatusCode::BAD_REQUEST,
                Error::Auth(_) => StatusCode::UNAUTHORIZED,
                Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self::Domain(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Domain(e) => {
                if status.is_server_error() {
                    tracing::error!(error = %e, "request failed");
                }
                e.to_string()
            }
            Self::NotFound(m) => m,
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(Error::InvalidRun("pending_1".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::from(Error::RateLimited).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ApiError::from(Error::Auth("no key".into())).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(Error::Upstream {
                operation: "create_run".into(),
                status: 502,
                message: "bad gateway".into(),
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(Error::ThreadCreation("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::NotFound("nope".into()).status(), StatusCode::NOT_FOUND);
    }
}
