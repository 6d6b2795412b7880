use anyhow::Context;

use pos_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pos_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let port = config.port;

    let app = pos_api::app::build_app_with_config(&config)
        .await
        .context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{port}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
