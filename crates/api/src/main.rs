use anyhow::Context;

use stockroom_api::ApiConfig;
use stockroom_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    stockroom_observability::init(LogFormat::from_env());

    let config = ApiConfig::from_env()?;
    let app = stockroom_api::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
