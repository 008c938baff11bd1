use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use paper_ledger_rs::{
    config::Config,
    db,
    routes,
    store::{LedgerStore, MemoryStore, PgStore},
    LedgerEngine,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting paper ledger service...");

    // Load configuration from environment
    let config = Config::from_env()
        .expect("Failed to load configuration from environment");

    tracing::info!(
        "Configuration loaded: host={}, port={}, store_type={}",
        config.host,
        config.port,
        config.store_type
    );

    // Create the ledger store
    let store: Arc<dyn LedgerStore> = match config.store_type.to_lowercase().as_str() {
        "memory" => {
            tracing::info!("Using in-memory ledger store");
            Arc::new(MemoryStore::new())
        }
        "postgres" => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL checked by Config::from_env");

            tracing::info!("Connecting to database...");
            let pool = db::init_pool(database_url)
                .await
                .expect("Failed to connect to database");

            tracing::info!("Running migrations...");
            sqlx::migrate!("./db/migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");

            Arc::new(PgStore::new(pool))
        }
        _ => panic!(
            "Invalid STORE_TYPE: {}. Must be 'postgres' or 'memory'",
            config.store_type
        ),
    };

    let engine = LedgerEngine::new(store);

    // Build the application router
    let app = routes::router(engine).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    // Bind to the configured address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Paper ledger service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    // Start the server
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
