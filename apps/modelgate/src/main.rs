use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use modelgate_core::{
    GatewayState, MemoryAuth, NoopAuth, NoopSensitiveWordGuard, StaticPriceBook,
    TracingStatisticsSink, UpstreamClientConfig, WreqUpstreamClient,
};
use modelgate_provider::{
    CircuitBreakerRegistry, MemoryProviderRepository, Provider, RateLimitGuard, StickySessions,
    UsageLedger,
};

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut patch = cli::env_patch();
    patch.overlay(cli::Cli::parse().into_patch());
    let config = patch.into_config().context("merge configuration")?;

    let providers: Vec<Provider> = {
        let raw = std::fs::read(&config.providers_path)
            .with_context(|| format!("read provider table {}", config.providers_path))?;
        serde_json::from_slice(&raw).context("parse provider table")?
    };
    tracing::info!(event = "providers_loaded", count = providers.len());

    let auth: Arc<dyn modelgate_core::AuthProvider> = match &config.keys_path {
        Some(path) => {
            let raw = std::fs::read(path).with_context(|| format!("read key table {path}"))?;
            let entries = serde_json::from_slice(&raw).context("parse key table")?;
            Arc::new(MemoryAuth::new(entries))
        }
        None => Arc::new(NoopAuth),
    };

    let upstream_config = UpstreamClientConfig {
        proxy: config.proxy.clone(),
        ..UpstreamClientConfig::default()
    };
    let client = Arc::new(WreqUpstreamClient::new(upstream_config)?);

    let ledger = Arc::new(UsageLedger::new());
    let state = Arc::new(GatewayState {
        repo: Arc::new(MemoryProviderRepository::new(providers)),
        auth,
        sensitive: Arc::new(NoopSensitiveWordGuard),
        price_book: Arc::new(StaticPriceBook),
        stats: Arc::new(TracingStatisticsSink),
        circuit: Arc::new(CircuitBreakerRegistry::new()),
        ledger: ledger.clone(),
        limits: RateLimitGuard::new(ledger),
        sticky: Arc::new(StickySessions::new(config.sticky_ttl_secs as i64)),
        client,
    });

    let app = modelgate_core::router(state);
    let bind = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    tracing::info!(event = "listening", bind = %bind);
    axum::serve(listener, app).await?;
    Ok(())
}
