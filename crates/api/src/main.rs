use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use domain::ports::LogMailer;
use entity_manager_api::{app, config, middleware};
use persistence::PgDataContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics()?;

    info!("Starting Entity Manager API v{}", env!("CARGO_PKG_VERSION"));

    let db_config = persistence::DatabaseConfig::from(&config.database);
    let pool = persistence::create_pool(&db_config).await?;

    info!("Running database migrations...");
    persistence::run_migrations(&pool).await?;
    info!("Migrations completed");

    let ctx = Arc::new(PgDataContext::new(pool));
    let app = app::create_app(&config, ctx, Arc::new(LogMailer))?;

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
