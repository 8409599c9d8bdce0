use std::sync::Arc;

use envconfig::Envconfig;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use fpl_sage::config::Config;
use fpl_sage::engine_http::HttpEngine;
use fpl_sage::server::serve;

async fn shutdown() {
    let mut term = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");
    let mut interrupt = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .expect("failed to register SIGINT handler");

    tokio::select! {
        _ = term.recv() => {},
        _ = interrupt.recv() => {},
    };

    tracing::info!("shutting down gracefully...");
}

#[tokio::main]
async fn main() {
    let config = Config::init_from_env().expect("invalid configuration");

    let log_layer = if config.debug.0 {
        tracing_subscriber::fmt::layer()
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .with_filter(EnvFilter::from_default_env())
            .boxed()
    };
    tracing_subscriber::registry().with(log_layer).init();

    let engine = Arc::new(HttpEngine::new(config.engine_url.clone(), config.engine_timeout_seconds));

    let listener = tokio::net::TcpListener::bind(config.address)
        .await
        .expect("could not bind port");
    serve(config, listener, engine, shutdown()).await
}
