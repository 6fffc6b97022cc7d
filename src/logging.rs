// SPDX-License-Identifier: Apache-2.0
use std::backtrace::Backtrace;
use std::panic;
use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry,
};

fn env_filter(default: impl FnOnce() -> String) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default()))
}

/// Initialize the tracing subscriber for the application
///
/// `RUST_LOG` takes precedence over the default `<name>=info,actix_web=info` filter.
pub fn init_tracing<Sink>(name: &str, sink: Sink)
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    // Skip setting LogTracer if it's already been set
    let _ = LogTracer::init();

    let env_filter = env_filter(|| format!("{}=info,actix_web=info", name));

    let formatting_layer = BunyanFormattingLayer::new(name.into(), sink);

    let subscriber = Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer);

    set_global_default(subscriber).expect("Failed to set tracing subscriber");
    tracing::info!("Tracing initialized with Bunyan formatter");
}

/// Initialize a more readable console logger for development
pub fn init_console_tracing() {
    let _ = LogTracer::init();

    let env_filter = env_filter(|| "snippetbox=debug,actix_web=info".into());

    let subscriber = tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(env_filter)
        .finish();

    set_global_default(subscriber).expect("Failed to set tracing subscriber");
    tracing::info!("Console tracing initialized");
}

/// Routes panic reports through tracing, with the stack at the point of the panic.
///
/// The request that panicked is answered by `RecoverPanic`; this only records it.
pub fn install_panic_hook() {
    panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_owned());
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_owned());
        let backtrace = Backtrace::force_capture();

        tracing::error!(
            panic.location = %location,
            panic.backtrace = %backtrace,
            "panic: {}",
            message
        );
    }));
}
