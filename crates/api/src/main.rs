use anyhow::Context;

use fiscalpos_infra::ComplianceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ComplianceConfig::from_env().context("invalid configuration")?;
    fiscalpos_observability::init(config.log_format);

    let services = fiscalpos_api::app::services::build_services(&config).await?;
    let app = fiscalpos_api::app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
