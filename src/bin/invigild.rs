//! invigild - presence monitor daemon
//!
//! This daemon:
//! 1. Loads configuration and builds the detector/encoder backends
//! 2. Serves the monitor API (`POST /detect/`, `POST /set-reference/`)
//! 3. Holds all tracker state in memory, keyed per session

use anyhow::Result;
use std::sync::mpsc;

use invigil::api::{ApiConfig, ApiServer};
use invigil::config::InvigildConfig;
use invigil::detect::{BackendRegistry, DetectionCapability, StubDetector};
use invigil::identity::{FaceEncoder, StubEncoder};
use invigil::monitor::{Monitor, MonitorSettings};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = InvigildConfig::load()?;

    let registry = build_registry(&config)?;
    let encoder = build_encoder(&config)?;
    let settings = MonitorSettings {
        away_threshold: config.session.away_threshold,
        match_threshold: config.identity.match_threshold,
        session_idle: config.session.idle,
    };
    let monitor = Monitor::new(registry, encoder, settings);

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        max_body_bytes: config.max_frame_bytes,
    };
    let api_handle = ApiServer::new(api_config, monitor).spawn()?;
    log::info!("monitor api listening on {}", api_handle.addr);
    log::info!(
        "invigild running. backend={} away_threshold={}s",
        config.detector.backend,
        config.session.away_threshold.as_secs()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("invigild waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;
    log::info!("invigild stopped");
    Ok(())
}

fn build_registry(config: &InvigildConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    match config.detector.backend.as_str() {
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let face_model = config
                .detector
                .face_model
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("tract backend requires a face model"))?;
            registry.register(invigil::TractDetector::new(
                face_model,
                DetectionCapability::FrontalFace,
            )?);
            match &config.detector.body_model {
                Some(body_model) => registry.register(invigil::TractDetector::new(
                    body_model,
                    DetectionCapability::FullBody,
                )?),
                None => log::warn!(
                    "no body model configured; electronic_devices will always be false"
                ),
            }
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => {
            anyhow::bail!("this build does not include the tract backend (feature backend-tract)")
        }
        _ => {
            log::warn!("using stub detector backends; reports are driven by marker pixels");
            registry.register(StubDetector::new(DetectionCapability::FrontalFace));
            registry.register(StubDetector::new(DetectionCapability::FullBody));
        }
    }
    Ok(registry)
}

fn build_encoder(config: &InvigildConfig) -> Result<Box<dyn FaceEncoder>> {
    #[cfg(feature = "backend-tract")]
    if let Some(model) = &config.identity.encoder_model {
        return Ok(Box::new(invigil::TractEncoder::new(model)?));
    }
    #[cfg(not(feature = "backend-tract"))]
    if config.identity.encoder_model.is_some() {
        anyhow::bail!("this build does not include the tract encoder (feature backend-tract)");
    }
    log::warn!("using stub face encoder; identity matching is digest-based");
    Ok(Box::new(StubEncoder::new()))
}
