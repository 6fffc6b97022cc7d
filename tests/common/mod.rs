// SPDX-License-Identifier: Apache-2.0
#![allow(dead_code)]

use actix_web::cookie::Key;
use actix_web::{web, HttpServer};
use argon2::{Algorithm, Argon2, Params, Version};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::redirect::Policy;
use std::net::TcpListener;
use std::sync::Arc;

use snippetbox::app::{self, Application};
use snippetbox::config::AppConfig;
use snippetbox::models::{MemorySnippetModel, MemoryUserModel, SnippetModel, UserModel};

pub const ALICE_EMAIL: &str = "alice@example.com";
pub const ALICE_PASSWORD: &str = "pa$$word";
pub const DUPE_EMAIL: &str = "dupe@example.com";

static CSRF_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<input type='hidden' name='csrf_token' value='(.+)'>").unwrap());

/// Hashing at production cost makes every login test take seconds.
pub fn cheap_users() -> MemoryUserModel {
    let params = Params::new(Params::MIN_M_COST, Params::MIN_T_COST, 1, None).unwrap();
    MemoryUserModel::with_hasher(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

pub async fn seeded_users() -> MemoryUserModel {
    let users = cheap_users();
    users.insert("Alice", ALICE_EMAIL, ALICE_PASSWORD).await.unwrap();
    users.insert("Dupe", DUPE_EMAIL, ALICE_PASSWORD).await.unwrap();
    users
}

pub async fn seeded_snippets() -> MemorySnippetModel {
    let snippets = MemorySnippetModel::new();
    snippets
        .insert("An old silent pond", "An old silent pond...", 365)
        .await
        .unwrap();
    snippets
}

pub fn application_with(
    snippets: Arc<dyn SnippetModel>,
    users: Arc<dyn UserModel>,
) -> web::Data<Application> {
    let config = AppConfig {
        static_dir: concat!(env!("CARGO_MANIFEST_DIR"), "/ui/static").into(),
        ..AppConfig::default()
    };
    web::Data::new(Application::new(&config, Key::generate(), snippets, users))
}

pub async fn application() -> web::Data<Application> {
    application_with(
        Arc::new(seeded_snippets().await),
        Arc::new(seeded_users().await),
    )
}

/// Binds an ephemeral port and returns it with its base URL.
pub fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    (listener, format!("http://127.0.0.1:{}", port))
}

/// Serves `application` on a real socket in the background.
pub fn spawn(application: web::Data<Application>) -> String {
    let (listener, address) = listener();
    let server = HttpServer::new(move || app::build(application.clone()))
        .workers(1)
        .listen(listener)
        .expect("Failed to listen")
        .run();
    actix_web::rt::spawn(server);
    address
}

pub async fn spawn_app() -> String {
    spawn(application().await)
}

/// A browser-like client: keeps cookies, never follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(Policy::none())
        .build()
        .unwrap()
}

pub fn extract_csrf_token(body: &str) -> String {
    CSRF_RX
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_owned())
        .expect("no csrf token in page")
}

/// Fetches `path` and returns the CSRF token from its form.
pub async fn csrf_token_from(client: &reqwest::Client, address: &str, path: &str) -> String {
    let body = client
        .get(format!("{}{}", address, path))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    extract_csrf_token(&body)
}

pub fn location(res: &reqwest::Response) -> Option<&str> {
    res.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

pub async fn login(client: &reqwest::Client, address: &str, email: &str, password: &str) -> reqwest::Response {
    let token = csrf_token_from(client, address, "/user/login").await;
    client
        .post(format!("{}/user/login", address))
        .form(&[("email", email), ("password", password), ("csrf_token", token.as_str())])
        .send()
        .await
        .unwrap()
}
