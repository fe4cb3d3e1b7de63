use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use mock_mpesa::config::AppConfig;
use mock_mpesa::errors::Result;
use mock_mpesa::routes::build_router;
use mock_mpesa::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // reads .env first so RUST_LOG from it reaches the filter
    let config = AppConfig::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Simulator config: {}", config.get_config_info());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = build_router(AppState::new(config));

    start_server(addr, app).await?;
    Ok(())
}

async fn start_server(addr: SocketAddr, app: axum::Router) -> Result<()> {
    tracing::info!("Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
