//! Pulseboard server binary.
//!
//! Wires the adapters to the application core and runs the axum server:
//! PostgreSQL supplies the aggregates and the change feed, WebSocket
//! connections carry the live pushes, and a REST endpoint serves the
//! initial fetch.

use std::error::Error;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use http::HeaderValue;
use sqlx::postgres::PgPoolOptions;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pulseboard::adapters::http::{aggregate_router, AggregateApiState};
use pulseboard::adapters::websocket::{websocket_router, ClientChannels, WebSocketState};
use pulseboard::adapters::{PgChangeFeed, PostgresAggregateSource};
use pulseboard::application::{BroadcastCoordinator, ChangeNotifier, SessionRegistry};
use pulseboard::config::AppConfig;
use pulseboard::ports::{AggregateSource, ChangeFeed, TransportSink};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing(&config);
    tracing::info!(
        environment = ?config.server.environment,
        "Starting pulseboard"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .idle_timeout(config.database.idle_timeout())
        .connect(&config.database.url)
        .await?;
    tracing::info!("Connected to PostgreSQL");

    // Application core.
    let registry = Arc::new(SessionRegistry::new());
    let source: Arc<dyn AggregateSource> = Arc::new(PostgresAggregateSource::new(
        pool.clone(),
        config.engine.compute_timeout(),
    ));
    let channels = Arc::new(ClientChannels::new(config.engine.push_channel_capacity));
    let coordinator = BroadcastCoordinator::new(
        registry,
        Arc::clone(&source),
        Arc::clone(&channels) as Arc<dyn TransportSink>,
        &config.engine,
    );

    // Change feed -> coalesced signal -> fan-out.
    let feed: Arc<dyn ChangeFeed> = Arc::new(PgChangeFeed::new(
        pool.clone(),
        config.database.notify_channel.clone(),
    ));
    let mut notifier = ChangeNotifier::spawn(feed);
    let fanout = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            loop {
                match notifier.changed().await {
                    Ok(()) => coordinator.on_change_signal(),
                    Err(err) => {
                        // Fatal for this subscription: sessions keep their
                        // last aggregate until the process is restarted.
                        tracing::error!(error = %err, "Change feed failed, live pushes stopped");
                        break;
                    }
                }
            }
        })
    };

    let app = router(&config, coordinator.clone(), channels, source);

    let addr = config.server.socket_addr();
    tracing::info!(%addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain in-flight recomputes before tearing down the transport/pool.
    tracing::info!("Shutting down");
    fanout.abort();
    coordinator.shutdown().await;
    pool.close().await;

    Ok(())
}

/// Builds the full application router with middleware layers.
fn router(
    config: &AppConfig,
    coordinator: Arc<BroadcastCoordinator>,
    channels: Arc<ClientChannels>,
    source: Arc<dyn AggregateSource>,
) -> Router {
    let ws_state = WebSocketState::new(coordinator, channels);
    let api_state = AggregateApiState::new(source);

    let api = aggregate_router(api_state).merge(websocket_router().with_state(ws_state));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(config))
                .layer(TimeoutLayer::new(std::time::Duration::from_secs(
                    config.server.request_timeout_secs,
                ))),
        )
}

/// Liveness probe.
async fn healthz() -> &'static str {
    "ok"
}

/// CORS from configured origins; permissive when none are set (development).
fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level));

    if config.is_production() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
