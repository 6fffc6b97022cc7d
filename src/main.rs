// SPDX-License-Identifier: Apache-2.0
use actix_web::{web, HttpServer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use snippetbox::app::{self, Application};
use snippetbox::config::{self, AppConfig, LogFormat};
use snippetbox::logging::{init_console_tracing, init_tracing, install_panic_hook};
use snippetbox::models::{MemorySnippetModel, MemoryUserModel};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    match config.log_format {
        LogFormat::Json => init_tracing("snippetbox", std::io::stdout),
        LogFormat::Pretty => init_console_tracing(),
    }
    install_panic_hook();

    let application = web::Data::new(Application::new(
        &config,
        config::session_key(),
        Arc::new(MemorySnippetModel::new()),
        Arc::new(MemoryUserModel::new()),
    ));

    info!(addr = %config.addr, "starting server");

    let mut server = HttpServer::new(move || app::build(application.clone()))
        .client_request_timeout(Duration::from_secs(5))
        .keep_alive(Duration::from_secs(60));
    if let Some(workers) = config.workers {
        server = server.workers(workers);
    }

    let result = server.bind(&config.addr)?.run().await;
    if let Err(e) = &result {
        error!(error = %e, "server stopped");
    }
    result
}
