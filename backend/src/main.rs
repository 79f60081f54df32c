use std::{error::Error, sync::Arc};

use shadepath::{
    AppState, config::ServerConfig, create_router, dataset::Dataset, planner::RoutePlanner,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shadepath=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let dataset = Dataset::load(&config.data_dir)?;
    tracing::info!("loaded dataset from {}", config.data_dir.display());

    let planner = RoutePlanner::new(dataset, config.engine.clone())?;
    let state = AppState {
        planner: Arc::new(planner),
        request_timeout: config.request_timeout,
    };
    let app = create_router(state);

    tracing::info!("starting shadepath on http://{}", config.bind_addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /api/route - Shade-ranked route candidates");
    tracing::info!("  GET  /api/landmarks?q= - Landmark list and autocomplete");

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
