use std::sync::Arc;

use anyhow::Context;

use critica_api::app::{build_app, services::build_services};
use critica_api::config::AppConfig;
use critica_auth::Hs256Jwt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    critica_observability::init(&config.logging);
    config.validate().context("invalid configuration")?;

    let jwt = Arc::new(Hs256Jwt::new(config.auth.jwt_secret.as_bytes()));
    let services = Arc::new(build_services(&config, jwt.clone()).await?);
    let app = build_app(services, jwt);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
