use std::sync::Arc;

use anyhow::Context;

use kiosk_api::app::{self, services};
use kiosk_infra::KioskConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = KioskConfig::from_env().context("invalid configuration")?;
    kiosk_observability::init(config.log_format);

    let services = Arc::new(
        services::build_services(&config)
            .await
            .context("failed to initialize stores")?,
    );
    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
