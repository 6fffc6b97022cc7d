// SPDX-License-Identifier: Apache-2.0
use actix_session::SessionExt;
use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{self, HeaderValue};
use actix_web::http::Method;
use actix_web::middleware::DefaultHeaders;
use actix_web::{Error, HttpMessage, HttpRequest, HttpResponse};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, info_span, instrument, Instrument};
use uuid::Uuid;

use crate::error::ServerError;
use crate::models::UserModel;
use crate::session::{AUTHENTICATED_USER_ID, REDIRECT_PATH_AFTER_LOGIN};

pub const LOGIN_PATH: &str = "/user/login";

/// Request extension set by [`Authenticate`] for users whose session is still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsAuthenticated(pub bool);

/// Whether [`Authenticate`] vouched for the current request.
pub fn is_authenticated(req: &HttpRequest) -> bool {
    req.extensions()
        .get::<IsAuthenticated>()
        .is_some_and(|flag| flag.0)
}

/// Security headers every response carries, including the 500 sent after a panic.
pub const SECURITY_HEADERS: [(&str, &str); 6] = [
    (
        "Content-Security-Policy",
        "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com",
    ),
    ("Referrer-Policy", "origin-when-cross-origin"),
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "deny"),
    ("X-XSS-Protection", "0"),
    ("Server", "snippetbox"),
];

/// Adds [`SECURITY_HEADERS`] to every response that does not set them itself.
pub fn common_headers() -> DefaultHeaders {
    SECURITY_HEADERS
        .iter()
        .fold(DefaultHeaders::new(), |headers, &pair| headers.add(pair))
}

/// Access log line per request, plus a span correlating everything logged downstream.
#[derive(Clone, Default)]
pub struct LogRequest;

impl<S, B> Transform<S, ServiceRequest> for LogRequest
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = LogRequestService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(LogRequestService { service })
    }
}

pub struct LogRequestService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for LogRequestService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let span = info_span!("request", request_id = %Uuid::new_v4());
        {
            let _entered = span.enter();
            let ip = req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("unknown")
                .to_owned();
            info!(
                ip = %ip,
                proto = ?req.version(),
                method = %req.method(),
                uri = %req.uri(),
                "received request"
            );
        }

        let fut = span.in_scope(|| self.service.call(req));
        Box::pin(fut.instrument(span))
    }
}

/// Resolves whether the session belongs to a user that still exists.
///
/// Never rejects a request; it only records the outcome as [`IsAuthenticated`].
#[derive(Clone)]
pub struct Authenticate {
    users: Arc<dyn UserModel>,
}

impl Authenticate {
    pub fn new(users: Arc<dyn UserModel>) -> Self {
        Authenticate { users }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authenticate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthenticateService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthenticateService {
            service: Rc::new(service),
            users: Arc::clone(&self.users),
        })
    }
}

pub struct AuthenticateService<S> {
    service: Rc<S>,
    users: Arc<dyn UserModel>,
}

impl<S, B> Service<ServiceRequest> for AuthenticateService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, ctx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let users = Arc::clone(&self.users);

        Box::pin(async move {
            let user_id = req
                .get_session()
                .get::<i64>(AUTHENTICATED_USER_ID)
                .map_err(ServerError::from)?;

            if let Some(id) = user_id {
                // A deleted user's old session must not stay privileged.
                let exists = users.exists(id).await.map_err(ServerError::from)?;
                debug!(user_id = id, exists, "Resolved session user");
                if exists {
                    req.extensions_mut().insert(IsAuthenticated(true));
                }
            }

            service.call(req).await
        })
    }
}

/// Redirects to the login page unless [`Authenticate`] marked the request.
#[derive(Clone, Default)]
pub struct RequireAuthentication;

impl RequireAuthentication {
    pub fn new() -> Self {
        RequireAuthentication
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequireAuthentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RequireAuthenticationService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RequireAuthenticationService {
            service: Rc::new(service),
        })
    }
}

pub struct RequireAuthenticationService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequireAuthenticationService<S>
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

    #[instrument(name = "require_authentication", skip(self, req), fields(path = %req.path(), method = %req.method()))]
    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        if is_authenticated(req.request()) {
            let fut = service.call(req);

            return Box::pin(async move {
                let mut res = fut.await?;
                res.headers_mut()
                    .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
                Ok(res.map_into_left_body())
            });
        }

        info!("Unauthenticated access attempt, redirecting to login");
        // Only pages can be returned to; the login redirect is always a GET.
        let path = (req.method() == Method::GET).then(|| req.path().to_owned());

        Box::pin(async move {
            if let Some(path) = path {
                req.get_session()
                    .insert(REDIRECT_PATH_AFTER_LOGIN, path)
                    .map_err(ServerError::from)?;
            }

            let (request, _) = req.into_parts();
            let response = HttpResponse::SeeOther()
                .append_header((header::LOCATION, LOGIN_PATH))
                .append_header((header::CACHE_CONTROL, "no-store"))
                .finish();
            Ok(ServiceResponse::new(request, response).map_into_right_body())
        })
    }
}
