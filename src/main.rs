use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use staybook::config::AppConfig;
use staybook::db;
use staybook::handlers;
use staybook::services::cleanup;
use staybook::state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    if config.admin_token == "changeme" {
        tracing::warn!("ADMIN_TOKEN is not set, using the default token");
    }

    let conn = db::init_db(&config.database_url)?;
    let state = build_state(config.clone(), conn)?;
    tracing::info!(
        statuses = state.taxonomy.entries().len(),
        initial = state.taxonomy.initial(),
        "status table loaded"
    );

    if config.stale_booking_minutes > 0 {
        tracing::info!(max_age_minutes = config.stale_booking_minutes, "stale booking cleanup enabled");
        tokio::spawn(cleanup::run_stale_booking_cleanup(
            state.clone(),
            config.stale_booking_minutes,
        ));
    }

    let app = handlers::router(state).layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
