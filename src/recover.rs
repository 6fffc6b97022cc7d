// SPDX-License-Identifier: Apache-2.0
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::Error;
use futures::future::{ok, LocalBoxFuture, Ready};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::task::{Context, Poll};
use tracing::error;

use crate::error::ServerError;

/// Contains a panic raised anywhere downstream to the request that raised it.
///
/// The panicking request is answered with a generic 500 and its connection is closed;
/// the worker keeps serving. Must be the outermost middleware.
#[derive(Clone, Default)]
pub struct RecoverPanic;

impl<S, B> Transform<S, ServiceRequest> for RecoverPanic
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RecoverPanicService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(RecoverPanicService {
            service: Rc::new(service),
        })
    }
}

pub struct RecoverPanicService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RecoverPanicService<S>
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
        let method = req.method().clone();
        let uri = req.uri().clone();

        // The inner `call` runs inside the guarded future, so a panic in a
        // middleware's synchronous part is caught as well as one in a handler.
        let guarded = AssertUnwindSafe(async move { service.call(req).await }).catch_unwind();

        Box::pin(async move {
            match guarded.await {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(method = %method, uri = %uri, panic = %message, "Recovered from panic");
                    Err(ServerError::Panic(message).into())
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App, HttpResponse};

    async fn boom() -> HttpResponse {
        panic!("deliberate")
    }

    #[actix_web::test]
    async fn passes_through_normal_responses() {
        let app = test::init_service(
            App::new()
                .wrap(RecoverPanic)
                .route("/", web::get().to(|| async { HttpResponse::Ok().body("fine") })),
        )
        .await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn turns_a_handler_panic_into_a_closed_500() {
        let app = test::init_service(
            App::new()
                .wrap(RecoverPanic)
                .route("/panic", web::get().to(boom)),
        )
        .await;

        let err = test::try_call_service(&app, test::TestRequest::get().uri("/panic").to_request())
            .await
            .err()
            .expect("panic should surface as an error");
        let res = err.error_response();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!res.head().keep_alive());
    }

    #[::core::prelude::v1::test]
    fn extracts_panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
