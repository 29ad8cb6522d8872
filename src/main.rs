// src/main.rs

use std::{sync::Arc, time::Duration};

use quiz_rewards::{
    config::Config,
    repository::postgres::PgQuizRepository,
    routes,
    state::AppState,
    store::{SecondaryStore, postgres::PgDocumentStore},
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env included)
    let config = Config::from_env().expect("Invalid configuration");

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    // Initialize Database Pool with Retry
    let mut retry_count = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.database_url)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to database after 5 retries: {}", e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!("Database connected...");

    // Run Migrations Automatically
    tracing::info!("Running migrations...");
    let repo = PgQuizRepository::new(pool);
    repo.run_migrations()
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Migrations applied successfully.");

    let store = connect_secondary_store(&config).await;

    let state = AppState::new(config.clone(), Arc::new(repo), store);

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .expect("Failed to bind listening address");
    tracing::info!("Listening on {}", config.bind_address);

    // Start the server
    axum::serve(listener, app).await.expect("Server error");
}

/// The document store is optional: without it the service still scores and
/// ranks, and every XP / badge call becomes a no-op.
async fn connect_secondary_store(config: &Config) -> SecondaryStore {
    let Some(url) = config.docstore_url.as_deref() else {
        tracing::warn!("DOCSTORE_URL not set; gamification disabled");
        return SecondaryStore::unavailable();
    };

    let store = match PgDocumentStore::connect(url).await {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!("Document store unreachable ({}); gamification disabled", e);
            return SecondaryStore::unavailable();
        }
    };

    if let Err(e) = store.init_schema().await {
        tracing::warn!("Document store schema setup failed ({}); gamification disabled", e);
        return SecondaryStore::unavailable();
    }

    tracing::info!("Document store connected.");
    SecondaryStore::available(Arc::new(store))
}
