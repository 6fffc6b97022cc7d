// SPDX-License-Identifier: Apache-2.0
use actix_web::body::MessageBody;
use actix_web::cookie::Key;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{web, App, Error};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::ServerError;
use crate::handlers;
use crate::memory_session_store::MemorySessionStore;
use crate::middleware::{common_headers, LogRequest};
use crate::models::{SnippetModel, UserModel};
use crate::recover::RecoverPanic;
use crate::routes;
use crate::session::SessionLocks;

/// Dependencies shared by every worker.
pub struct Application {
    pub snippets: Arc<dyn SnippetModel>,
    pub users: Arc<dyn UserModel>,
    pub sessions: MemorySessionStore,
    pub session_locks: SessionLocks,
    pub session_key: Key,
    pub secure_cookies: bool,
    pub static_dir: PathBuf,
}

impl Application {
    pub fn new(
        config: &AppConfig,
        session_key: Key,
        snippets: Arc<dyn SnippetModel>,
        users: Arc<dyn UserModel>,
    ) -> Self {
        Self {
            snippets,
            users,
            sessions: MemorySessionStore::new(),
            session_locks: SessionLocks::new(),
            session_key,
            secure_cookies: config.secure_cookies,
            static_dir: config.static_dir.clone(),
        }
    }
}

/// The full application: process-wide middleware around the routing table.
///
/// `RecoverPanic` is registered last so it is the outermost layer.
pub fn build(
    app: web::Data<Application>,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    App::new()
        .app_data(app.clone())
        .app_data(
            web::FormConfig::default()
                .error_handler(|err, _| ServerError::BadRequest(err.to_string()).into()),
        )
        .configure(|cfg| routes::configure(cfg, &app))
        .default_service(web::to(handlers::not_found))
        .wrap(common_headers())
        .wrap(LogRequest)
        .wrap(RecoverPanic)
}
