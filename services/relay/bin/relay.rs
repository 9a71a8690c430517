//! Main Entrypoint for the Relay Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Loading the tenant registry.
//! 3. Constructing the Axum router.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::{Context, anyhow};
use relay_api::{config::Config, router::create_router, state::AppState};
use relay_core::tenant::StaticTenantRegistry;
use std::{net::SocketAddr, sync::Arc};
use tracing::info;

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    // The AI socket is wss://, so a TLS provider must exist before the first call.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    // --- 3. Load Tenants ---
    let tenants_json = std::fs::read_to_string(&config.tenants_path).with_context(|| {
        format!(
            "Failed to read tenant file {}",
            config.tenants_path.display()
        )
    })?;
    let registry =
        StaticTenantRegistry::from_json(&tenants_json).context("Failed to load tenants")?;
    info!(tenants = ?registry.keys(), default_tenant = %config.default_tenant, "Tenants loaded.");
    if registry.is_empty() {
        anyhow::bail!("Tenant file {} defines no tenants", config.tenants_path.display());
    }

    let app_state = Arc::new(AppState {
        registry: Arc::new(registry),
        config: Arc::new(config.clone()),
    });

    // --- 4. Create Router ---
    let app = create_router(app_state);

    // --- 5. Start Server ---
    info!(
        model = %config.gemini_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
