// SPDX-License-Identifier: Apache-2.0
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, Route};
use actix_service::boxed::BoxService;
use std::rc::Rc;

type Layer = Rc<dyn Fn(Route) -> Route>;

/// Ordered list of middleware composed around a terminal route.
///
/// The first middleware added is the outermost: it sees the request first and the
/// response last. Chains are values; `append` leaves the original untouched.
#[derive(Clone, Default)]
pub struct Chain {
    layers: Vec<Layer>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a middleware after every middleware already in the chain.
    ///
    /// `make` is called once per route the chain is applied to.
    pub fn wrap<F, M, B>(mut self, make: F) -> Self
    where
        F: Fn() -> M + 'static,
        M: Transform<
                BoxService<ServiceRequest, ServiceResponse, Error>,
                ServiceRequest,
                Response = ServiceResponse<B>,
                Error = Error,
                InitError = (),
            > + 'static,
        B: MessageBody + 'static,
    {
        self.layers.push(Rc::new(move |route: Route| route.wrap(make())));
        self
    }

    /// A new chain equal to this one with `make`'s middleware just before the route.
    pub fn append<F, M, B>(&self, make: F) -> Self
    where
        F: Fn() -> M + 'static,
        M: Transform<
                BoxService<ServiceRequest, ServiceResponse, Error>,
                ServiceRequest,
                Response = ServiceResponse<B>,
                Error = Error,
                InitError = (),
            > + 'static,
        B: MessageBody + 'static,
    {
        self.clone().wrap(make)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Composes the chain around `route`.
    pub fn then(&self, route: Route) -> Route {
        // actix runs the most recently wrapped middleware first, so fold innermost-first.
        self.layers.iter().rev().fold(route, |route, layer| layer(route))
    }
}
