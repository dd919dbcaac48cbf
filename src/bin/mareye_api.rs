//! mareye_api - HTTP threat detection service
//!
//! This daemon:
//! 1. Loads configuration (`MAREYE_CONFIG` file + environment)
//! 2. Builds the configured detector backend
//! 3. Serves the detection API until Ctrl-C

use anyhow::{anyhow, Result};
use std::sync::{mpsc, Arc};

use mareye::{
    api::{ApiConfig, ApiServer},
    MarEyeConfig, ThreatAnalyzer,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = MarEyeConfig::load()?;
    let analyzer = ThreatAnalyzer::from_config(&config)?;
    log::info!(
        "detector backend '{}' ready (model {}, threshold {}, {} classes)",
        analyzer.backend_name(),
        config.model.path.display(),
        config.model.confidence_threshold,
        analyzer.class_names().len()
    );

    let api_handle =
        ApiServer::new(ApiConfig::from_settings(&config.api), Arc::new(analyzer)).spawn()?;
    log::info!("mareye_api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("mareye_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
