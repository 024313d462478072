//! Release Watch Controller
//!
//! Keeps the dependents of one rendered release under watch:
//! - decodes the release manifest and registers one watch per dependent kind
//! - routes dependent changes back to the owning custom resource
//! - re-registers when the owner is enqueued, retrying while kinds are not yet discovered

mod backoff;
mod config;
mod controller;
mod error;
mod watcher;

use crate::config::Config;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt::init();
    install_crypto_provider();

    info!("Starting Release Watch Controller");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Manifest: {}", config.manifest_path.display());
    info!("  Owner: {} {}", config.owner_api_version, config.owner_kind);
    info!(
        "  Owner name: {}/{}",
        if config.owner_namespace.is_empty() { "<cluster>" } else { config.owner_namespace.as_str() },
        config.owner_name
    );
    info!(
        "  Resolve retry: {}s..{}s",
        config.resolve_retry_min_seconds, config.resolve_retry_max_seconds
    );

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}

/// Install ring as the process-wide rustls crypto provider.
///
/// Must run before the first kube client is built. Repeated calls are no-ops.
fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }
}
