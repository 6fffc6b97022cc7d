// SPDX-License-Identifier: Apache-2.0
//! Anti-forgery tokens bound to the session.
//!
//! Every session owns one random token, minted the first time a form is rendered.
//! State-changing requests must echo it back in the `csrf_token` form field (or the
//! `X-CSRF-Token` header for non-form bodies). The token is reusable for the lifetime
//! of the session.

use actix_session::{Session, SessionExt, SessionInsertError};
use actix_web::body::EitherBody;
use actix_web::dev::{Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::{header, Method};
use actix_web::{web, Error, HttpResponse};
use futures::future::{ok, LocalBoxFuture, Ready};
use rand::distr::{Alphanumeric, SampleString};
use std::collections::HashMap;
use std::rc::Rc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

use crate::error::ServerError;
use crate::session::CSRF_TOKEN;

/// Name of the hidden form field carrying the token.
pub const CSRF_FORM_FIELD: &str = "csrf_token";
pub const CSRF_HEADER_NAME: &str = "X-CSRF-Token";
pub const CSRF_TOKEN_LENGTH: usize = 32;

/// Returns the session's token, minting and storing one on first use.
pub fn csrf_token(session: &Session) -> Result<String, SessionInsertError> {
    if let Ok(Some(token)) = session.get::<String>(CSRF_TOKEN) {
        return Ok(token);
    }

    let token = Alphanumeric.sample_string(&mut rand::rng(), CSRF_TOKEN_LENGTH);
    session.insert(CSRF_TOKEN, &token)?;
    debug!("Minted CSRF token for session");
    Ok(token)
}

fn is_unsafe(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

/// Compares in time independent of where the first difference is.
pub(crate) fn tokens_match(expected: &str, submitted: &str) -> bool {
    let (a, b) = (expected.as_bytes(), submitted.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn is_form(req: &ServiceRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"))
}

fn form_token(body: &[u8]) -> Option<String> {
    serde_urlencoded::from_bytes::<HashMap<String, String>>(body)
        .ok()?
        .remove(CSRF_FORM_FIELD)
}

/// Reads the submitted token, leaving the request body intact for the handler.
async fn submitted_token(req: &mut ServiceRequest) -> Result<Option<String>, Error> {
    if !is_form(req) {
        return Ok(req
            .headers()
            .get(CSRF_HEADER_NAME)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned));
    }

    let body = req.extract::<web::Bytes>().await?;
    let token = form_token(&body);
    req.set_payload(Payload::from(body));
    Ok(token)
}

/// Rejects unsafe-method requests that do not carry the session's token.
#[derive(Clone, Default)]
pub struct CsrfGuard;

impl CsrfGuard {
    pub fn new() -> Self {
        CsrfGuard
    }
}

impl<S, B> Transform<S, ServiceRequest> for CsrfGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CsrfGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(CsrfGuardService {
            service: Rc::new(service),
        })
    }
}

pub struct CsrfGuardService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for CsrfGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        if !is_unsafe(req.method()) {
            let fut = service.call(req);
            return Box::pin(async move { Ok(fut.await?.map_into_left_body()) });
        }

        Box::pin(async move {
            let expected = req
                .get_session()
                .get::<String>(CSRF_TOKEN)
                .map_err(ServerError::from)?;
            let submitted = submitted_token(&mut req).await?;

            let valid = match (expected.as_deref(), submitted.as_deref()) {
                (Some(expected), Some(submitted)) => tokens_match(expected, submitted),
                _ => false,
            };

            if valid {
                return Ok(service.call(req).await?.map_into_left_body());
            }

            warn!(
                method = %req.method(),
                path = %req.path(),
                has_session_token = expected.is_some(),
                has_submitted_token = submitted.is_some(),
                "Rejected request with invalid CSRF token"
            );
            let (request, _) = req.into_parts();
            let response = HttpResponse::BadRequest()
                .content_type("text/plain; charset=utf-8")
                .body("Bad Request");
            Ok(ServiceResponse::new(request, response).map_into_right_body())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[::core::prelude::v1::test]
    fn compares_tokens() {
        assert!(tokens_match("abc123", "abc123"));
        assert!(!tokens_match("abc123", "abc124"));
        assert!(!tokens_match("abc123", "abc12"));
        assert!(!tokens_match("abc123", ""));
    }

    #[::core::prelude::v1::test]
    fn only_state_changing_methods_are_checked() {
        assert!(is_unsafe(&Method::POST));
        assert!(is_unsafe(&Method::PUT));
        assert!(is_unsafe(&Method::PATCH));
        assert!(is_unsafe(&Method::DELETE));
        assert!(!is_unsafe(&Method::GET));
        assert!(!is_unsafe(&Method::HEAD));
    }

    #[::core::prelude::v1::test]
    fn reads_token_from_form_body() {
        assert_eq!(
            form_token(b"title=x&csrf_token=s3cr3t&content=y").as_deref(),
            Some("s3cr3t")
        );
        assert_eq!(form_token(b"title=x"), None);
    }

    #[actix_web::test]
    async fn token_is_minted_once_per_session() {
        let req = test::TestRequest::default().to_srv_request();
        let session = req.get_session();

        let first = csrf_token(&session).unwrap();
        let second = csrf_token(&session).unwrap();

        assert_eq!(first.len(), CSRF_TOKEN_LENGTH);
        assert_eq!(first, second);
        assert_eq!(session.get::<String>(CSRF_TOKEN).unwrap(), Some(first));
    }

    #[actix_web::test]
    async fn unreadable_session_token_is_a_server_error() {
        let guard = CsrfGuard::new().new_transform(test::ok_service()).await.unwrap();

        let req = test::TestRequest::post()
            .insert_header((CSRF_HEADER_NAME, "anything"))
            .to_srv_request();
        req.get_session().insert(CSRF_TOKEN, 42).unwrap();

        let err = guard.call(req).await.err().expect("corrupt session must fail");
        assert_eq!(
            err.as_response_error().status_code(),
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
