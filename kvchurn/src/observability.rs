//! Logging and error reporting setup.

use std::env;
use std::io::IsTerminal;

use sentry::integrations::tracing as sentry_tracing;
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, prelude::*};

use crate::config::{Config, LogFormat};

/// Initializes Sentry if a DSN is configured. Keep the guard alive for the whole process.
pub fn init_sentry(config: &Config) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry.dsn.as_deref()?;

    Some(sentry::init(sentry::ClientOptions {
        dsn: dsn.parse().ok(),
        enable_logs: true,
        environment: config.sentry.environment.clone(),
        sample_rate: config.sentry.sample_rate,
        release: sentry::release_name!(),
        ..Default::default()
    }))
}

/// Installs the global `tracing` subscriber.
pub fn init_tracing(config: &Config) {
    // Same as the default filter, except it converts warnings into events
    // and also sends everything at or above INFO as logs instead of breadcrumbs.
    let sentry_layer = config.sentry.is_enabled().then(|| {
        sentry_tracing::layer().event_filter(|metadata| match *metadata.level() {
            Level::ERROR | Level::WARN => {
                sentry_tracing::EventFilter::Event | sentry_tracing::EventFilter::Log
            }
            Level::INFO => sentry_tracing::EventFilter::Log,
            Level::DEBUG | Level::TRACE => sentry_tracing::EventFilter::Ignore,
        })
    });

    let format = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let format = match (config.logging.format, std::io::stderr().is_terminal()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => format.pretty().boxed(),
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            format.compact().with_ansi(false).boxed()
        }
        (LogFormat::Json, _) => format.json().flatten_event(true).boxed(),
    };

    let env_filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(value) => parse_rust_log(&value),
        Err(_) => default_filter(config.logging.level),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(env_filter))
        .with(sentry_layer)
        .init();
}

/// Try to parse RUST_LOG as a simple level filter and apply default levels internally.
/// Otherwise, use it literally if the user knows which overrides they want to run.
fn parse_rust_log(value: &str) -> EnvFilter {
    match value.parse::<LevelFilter>() {
        Ok(level) => default_filter(level),
        Err(_) => EnvFilter::new(value),
    }
}

fn default_filter(level: LevelFilter) -> EnvFilter {
    // Dependencies such as hyper and reqwest only ever contribute warnings.
    EnvFilter::new("WARN").add_directive(
        format!("kvchurn={level}")
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    )
}
