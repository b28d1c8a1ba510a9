//! Orbis Server - Library Circulation Server
//!
//! REST API server for the circulation engine: availability, reservations,
//! fulfillment, loans and consistency auditing.

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orbis_server::{api, config::AppConfig, repository::Repository, services::Services, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().expect("Failed to load configuration");

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("orbis_server={},tower_http=debug", config.logging.level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Orbis Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    // Save server address before moving config
    let server_host = config.server.host.clone();
    let server_port = config.server.port;

    // Create repository and services
    let repository = Repository::new(pool);
    let services = Services::new(
        repository,
        config.circulation.clone(),
        config.email.clone(),
    );

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    spawn_background_sweeps(&state);

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(
        server_host.parse().expect("Invalid host address"),
        server_port,
    );

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodic jobs: the reservation-expiry sweep and, when enabled, the
/// scheduled consistency audit. Both are also reachable on demand through
/// the API.
fn spawn_background_sweeps(state: &AppState) {
    let sweep_minutes = state.config.circulation.expiry_sweep_interval_minutes;
    if sweep_minutes > 0 {
        let services = state.services.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(sweep_minutes * 60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = services.reservations.expire_due(chrono::Utc::now()).await {
                    tracing::error!("reservation expiry sweep failed: {}", err);
                }
            }
        });
        tracing::info!(minutes = sweep_minutes, "reservation expiry sweep scheduled");
    }

    let audit_minutes = state.config.circulation.audit_interval_minutes;
    if audit_minutes > 0 {
        let services = state.services.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(audit_minutes * 60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match services.audit.run(false).await {
                    Ok(report) if !report.is_clean() => {
                        tracing::warn!(
                            run_id = %report.run_id,
                            issues = report.issues.len(),
                            "scheduled audit found inconsistencies"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!("scheduled audit failed: {}", err),
                }
            }
        });
        tracing::info!(minutes = audit_minutes, "scheduled consistency audit enabled");
    }
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Documents (inventory counters)
        .route("/documents", post(api::documents::create_document))
        .route("/documents/:id", get(api::documents::get_document))
        .route("/documents/:id", delete(api::documents::delete_document))
        .route("/documents/:id/copies", put(api::documents::update_copies))
        .route("/documents/:id/availability", get(api::documents::get_availability))
        .route("/documents/:id/queue", get(api::documents::get_queue))
        // Borrowers
        .route("/borrowers", get(api::borrowers::list_borrowers))
        .route("/borrowers", post(api::borrowers::create_borrower))
        .route("/borrowers/:id", get(api::borrowers::get_borrower))
        .route("/borrowers/:id", put(api::borrowers::update_borrower))
        .route("/borrowers/:id", delete(api::borrowers::delete_borrower))
        .route("/borrowers/:id/loans", get(api::borrowers::get_borrower_loans))
        .route("/borrowers/:id/reservations", get(api::borrowers::get_borrower_reservations))
        // Loans
        .route("/loans", post(api::loans::create_loan))
        .route("/loans/:id/return", post(api::loans::return_loan))
        .route("/loans/:id/extend", post(api::loans::extend_loan))
        .route("/loans/:id", delete(api::loans::delete_loan))
        // Reservations
        .route("/reservations", post(api::reservations::create_reservation))
        .route("/reservations/expire", post(api::reservations::expire_reservations))
        .route("/reservations/:id", get(api::reservations::get_reservation))
        .route("/reservations/:id/cancel", post(api::reservations::cancel_reservation))
        .route("/reservations/:id/fulfill", post(api::reservations::fulfill_reservation))
        // Audit
        .route("/audit", post(api::audit::run_audit))
        .with_state(state.clone());

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
