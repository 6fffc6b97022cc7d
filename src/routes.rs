// SPDX-License-Identifier: Apache-2.0
use actix_files::Files;
use actix_web::web;
use std::sync::Arc;

use crate::app::Application;
use crate::chain::Chain;
use crate::csrf::CsrfGuard;
use crate::handlers;
use crate::middleware::{Authenticate, RequireAuthentication};
use crate::session::{session_middleware, SessionLock};

/// Session, CSRF and authentication state for pages that render per-user content.
pub fn dynamic_chain(app: &Application) -> Chain {
    let locks = app.session_locks.clone();
    let store = app.sessions.clone();
    let key = app.session_key.clone();
    let secure = app.secure_cookies;
    let users = Arc::clone(&app.users);

    Chain::new()
        .wrap(move || SessionLock::new(locks.clone()))
        .wrap(move || session_middleware(store.clone(), key.clone(), secure))
        .wrap(CsrfGuard::new)
        .wrap(move || Authenticate::new(Arc::clone(&users)))
}

/// Registers every route. Exact routes come before the static mount.
pub fn configure(cfg: &mut web::ServiceConfig, app: &Application) {
    let dynamic = dynamic_chain(app);
    let protected = dynamic.append(RequireAuthentication::new);

    cfg.route("/ping", web::get().to(handlers::ping))
        .route("/", dynamic.then(web::get().to(handlers::home)))
        .route("/about", dynamic.then(web::get().to(handlers::about)))
        .route(
            "/snippet/view/{id}",
            dynamic.then(web::get().to(handlers::snippet_view)),
        )
        .route(
            "/snippet/create",
            protected.then(web::get().to(handlers::snippet_create)),
        )
        .route(
            "/snippet/create",
            protected.then(web::post().to(handlers::snippet_create_post)),
        )
        .route("/user/signup", dynamic.then(web::get().to(handlers::user_signup)))
        .route(
            "/user/signup",
            dynamic.then(web::post().to(handlers::user_signup_post)),
        )
        .route("/user/login", dynamic.then(web::get().to(handlers::user_login)))
        .route(
            "/user/login",
            dynamic.then(web::post().to(handlers::user_login_post)),
        )
        .route(
            "/user/logout",
            protected.then(web::post().to(handlers::user_logout_post)),
        )
        .route(
            "/account/view",
            protected.then(web::get().to(handlers::account_view)),
        )
        .route(
            "/account/password/update",
            protected.then(web::get().to(handlers::account_password_update)),
        )
        .route(
            "/account/password/update",
            protected.then(web::post().to(handlers::account_password_update_post)),
        )
        .service(Files::new("/static", &app.static_dir));
}
