use anyhow::Context;

use factoryerp_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    factoryerp_observability::init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    tracing::info!(
        bind = %config.bind,
        qc_policy = ?config.receiving.qc_policy,
        posting_timeout_ms = config.receiving.posting_timeout.as_millis() as u64,
        "configuration loaded"
    );

    let app = factoryerp_api::app::build_app(config.receiving.clone());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
