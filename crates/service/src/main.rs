//! Orderflow service - order ingestion and lookup.
//!
//! This binary runs two long-lived tasks sharing one cancellation token:
//!
//! - The ingestion consumer, pulling orders from NATS `JetStream`
//! - The HTTP lookup API on port 8081
//!
//! A shutdown signal cancels the token; each task finishes the unit of work
//! it is on and the process exits once both have stopped.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use sentry::integrations::tracing as sentry_tracing;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orderflow_service::cache::OrderCache;
use orderflow_service::config::{LogFormat, ServiceConfig};
use orderflow_service::db::{self, OrderRepository, OrderStore};
use orderflow_service::ingest::{self, Consumer, ConsumerSettings, JetStreamSink, JetStreamSource};
use orderflow_service::routes;
use orderflow_service::services::OrderService;
use orderflow_service::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ServiceConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = ServiceConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "orderflow_service=info,tower_http=info".into());
    let json = config.log_format == LogFormat::Json;

    tracing_subscriber::registry()
        .with(env_filter)
        .with((!json).then(tracing_subscriber::fmt::layer))
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    // Initialize database connection pool
    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");
    tracing::info!("Database pool created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p orderflow-cli -- migrate

    let store: Arc<dyn OrderStore> = Arc::new(OrderRepository::new(pool.clone()));
    let cache = Arc::new(OrderCache::new(config.cache.capacity));
    let orders = OrderService::new(store, cache);

    if let Err(e) = orders.preload_cache(config.cache.preload_limit).await {
        tracing::warn!(error = %e, "Cache preload failed, starting cold");
    }

    // Broker setup fails fast: without it the service cannot ingest.
    let jetstream = ingest::jetstream::connect(&config.broker)
        .await
        .expect("Failed to connect to NATS");
    let source = JetStreamSource::connect(&jetstream, &config.broker)
        .await
        .expect("Failed to set up ingestion consumer");
    let dead_letters = JetStreamSink::connect(
        jetstream,
        &config.broker.dead_letter_stream,
        &config.broker.dead_letter_subject,
    )
    .await
    .expect("Failed to set up dead-letter stream");

    let cancel = CancellationToken::new();

    let consumer = Consumer::new(
        source,
        dead_letters,
        orders.clone(),
        ConsumerSettings::from(&config.broker),
    );
    let consumer_task = tokio::spawn(consumer.run(cancel.clone()));

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    let addr = config.socket_addr();
    let state = AppState::new(pool, orders);

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(routes::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    tracing::info!("orderflow-service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await;
    if let Err(e) = served {
        tracing::error!(error = %e, "Server error");
    }

    // A server failure also stops ingestion.
    cancel.cancel();
    if let Err(e) = consumer_task.await {
        tracing::error!(error = %e, "Consumer task failed");
    }

    tracing::info!("Shutdown complete");
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
