// SPDX-License-Identifier: Apache-2.0
pub mod app;
pub mod chain;
pub mod config;
pub mod csrf;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod logging;
pub mod memory_session_store;
pub mod middleware;
pub mod models;
pub mod recover;
pub mod routes;
pub mod session;
pub mod templates;
