// SPDX-License-Identifier: Apache-2.0
use actix_session::{SessionGetError, SessionInsertError};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;
use tracing::error;

use crate::middleware::SECURITY_HEADERS;
use crate::models::ModelError;

/// Failures a handler or middleware cannot turn into a regular page.
///
/// Responses carry only the canonical status text; the detail goes to the log.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("failed to read session: {0}")]
    SessionGet(#[from] SessionGetError),

    #[error("failed to write session: {0}")]
    SessionInsert(#[from] SessionInsertError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("handler panicked: {0}")]
    Panic(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::NotFound | ServerError::Model(ModelError::NoRecord) => StatusCode::NOT_FOUND,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Internal server error");
        }

        let mut builder = HttpResponse::build(status);
        // Errors that escape the middleware stack never pass through `DefaultHeaders`.
        for pair in SECURITY_HEADERS {
            builder.insert_header(pair);
        }
        if matches!(self, ServerError::Panic(_)) {
            // State touched by the panicking request may be inconsistent.
            builder.force_close();
        }
        builder
            .content_type("text/plain; charset=utf-8")
            .body(status.canonical_reason().unwrap_or("Error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn hides_details_from_the_client() {
        let res = ServerError::Panic("secret internals".into()).error_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(res.headers().get("X-Frame-Options").unwrap(), "deny");
        assert_eq!(res.headers().get("X-Content-Type-Options").unwrap(), "nosniff");
        assert!(!res.head().keep_alive());

        let body = to_bytes(res.into_body()).await.unwrap();
        assert_eq!(body, "Internal Server Error");
    }

    #[test]
    fn missing_records_are_not_found() {
        assert_eq!(
            ServerError::from(ModelError::NoRecord).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ServerError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServerError::BadRequest("form".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
