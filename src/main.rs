use rusty_lab_reservation::{
    adapters::memory::InMemoryBookingStore,
    adapters::mock::MockResourceCatalog,
    adapters::postgres::{PostgresAuditLog, PostgresBookingStore, PostgresResourceCatalog},
    api::{handlers::AppState, router::create_router},
    application::reservation::{ServiceDependencies, prime_resource_cache},
    config::Config,
    domain::Resource,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rusty_lab_reservation=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Invalid configuration");
    let settings = config
        .engine
        .settings()
        .expect("Invalid reservation engine configuration");

    // Initialize adapters
    let service_deps = match &config.database.url {
        Some(database_url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .connect(database_url)
                .await
                .expect("Failed to connect to database");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            tracing::info!("Using PostgreSQL adapters");
            ServiceDependencies::new(
                Arc::new(PostgresBookingStore::new(pool.clone())),
                Arc::new(PostgresAuditLog::new(pool.clone())),
                Arc::new(PostgresResourceCatalog::new(pool)),
                settings,
            )
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, bookings are kept in memory only");
            let resources = match &config.engine.resource_seed_path {
                Some(path) => load_seed_resources(path),
                None => Vec::new(),
            };
            let store = Arc::new(InMemoryBookingStore::new());
            ServiceDependencies::new(
                store.clone(),
                store,
                Arc::new(MockResourceCatalog::with_resources(resources)),
                settings,
            )
        }
    };

    // Warm the scan cache; scanning still works through remote lookups if this fails
    if let Err(e) = prime_resource_cache(&service_deps, None).await {
        tracing::warn!("Could not prime resource cache: {}", e);
    }

    // Create application state
    let app_state = Arc::new(AppState { service_deps });

    // Create router
    let app = create_router(app_state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

/// Read catalog entries for the in-memory catalog
fn load_seed_resources(path: &str) -> Vec<Resource> {
    let raw = std::fs::read_to_string(path).expect("Failed to read RESOURCE_SEED_PATH");
    let resources: Vec<Resource> =
        serde_json::from_str(&raw).expect("RESOURCE_SEED_PATH is not a JSON list of resources");
    tracing::info!("Loaded {} resources from {}", resources.len(), path);
    resources
}
