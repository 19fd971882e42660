use std::sync::Arc;

use course_groups::api::router;
use course_groups::config::AppConfig;
use course_groups::db::SqliteSessionStore;
use course_groups::roble::{RobleAuthClient, RobleHttpClient};
use course_groups::state::AppState;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "course_groups=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let sessions = SqliteSessionStore::migrated(pool).await?;

    let store = RobleHttpClient::new(&config.roble_base_url, &config.project_id)?;
    let auth = RobleAuthClient::new(&config.roble_base_url, &config.project_id)?;
    info!("using Roble record store at {}", store.database_url());

    let state = AppState {
        store: Arc::new(store),
        auth: Arc::new(auth),
        sessions: Arc::new(sessions),
        compensate_on_failure: config.compensate_on_failure,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
