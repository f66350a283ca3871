use std::net::SocketAddr;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use calshare_core::config::ServerConfig;
use calshare_server::{AppState, router};

const DEFAULT_LOG_FILTER: &str = "calshare_core=info,calshare_server=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config_path = ServerConfig::config_path();
    let config = ServerConfig::load_from(&config_path)
        .with_context(|| format!("loading configuration ({})", config_path.display()))?;

    let state = AppState::from_config(&config)?;
    let app = router(state);

    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.bind))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(database = %config.database.display(), "calshare-server listening on http://{addr}");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
