use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::MAX_IMAGE_BYTES;
use crate::identity::DEFAULT_MATCH_THRESHOLD;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8471";
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_AWAY_SECS: u64 = 5;
const DEFAULT_SESSION_IDLE_SECS: u64 = 60 * 60;

#[derive(Debug, Deserialize, Default)]
struct InvigildConfigFile {
    api: Option<ApiConfigFile>,
    detector: Option<DetectorConfigFile>,
    identity: Option<IdentityConfigFile>,
    session: Option<SessionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_frame_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    face_model: Option<PathBuf>,
    body_model: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct IdentityConfigFile {
    encoder_model: Option<PathBuf>,
    match_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    away_threshold_secs: Option<u64>,
    idle_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct InvigildConfig {
    pub api_addr: String,
    pub max_frame_bytes: usize,
    pub detector: DetectorSettings,
    pub identity: IdentitySettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Backend family: "stub" or "tract".
    pub backend: String,
    pub face_model: Option<PathBuf>,
    pub body_model: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub encoder_model: Option<PathBuf>,
    pub match_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub away_threshold: Duration,
    pub idle: Duration,
}

impl InvigildConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("INVIGIL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: InvigildConfigFile) -> Self {
        let api_addr = file
            .api
            .as_ref()
            .and_then(|api| api.addr.clone())
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());
        let max_frame_bytes = file
            .api
            .and_then(|api| api.max_frame_bytes)
            .unwrap_or(MAX_IMAGE_BYTES * 2);
        let detector = DetectorSettings {
            backend: file
                .detector
                .as_ref()
                .and_then(|detector| detector.backend.clone())
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            face_model: file
                .detector
                .as_ref()
                .and_then(|detector| detector.face_model.clone()),
            body_model: file.detector.and_then(|detector| detector.body_model),
        };
        let identity = IdentitySettings {
            encoder_model: file
                .identity
                .as_ref()
                .and_then(|identity| identity.encoder_model.clone()),
            match_threshold: file
                .identity
                .and_then(|identity| identity.match_threshold)
                .unwrap_or(DEFAULT_MATCH_THRESHOLD),
        };
        let session = SessionSettings {
            away_threshold: Duration::from_secs(
                file.session
                    .as_ref()
                    .and_then(|session| session.away_threshold_secs)
                    .unwrap_or(DEFAULT_AWAY_SECS),
            ),
            idle: Duration::from_secs(
                file.session
                    .and_then(|session| session.idle_secs)
                    .unwrap_or(DEFAULT_SESSION_IDLE_SECS),
            ),
        };
        Self {
            api_addr,
            max_frame_bytes,
            detector,
            identity,
            session,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("INVIGIL_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(backend) = std::env::var("INVIGIL_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend;
            }
        }
        if let Ok(path) = std::env::var("INVIGIL_FACE_MODEL") {
            if !path.trim().is_empty() {
                self.detector.face_model = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("INVIGIL_BODY_MODEL") {
            if !path.trim().is_empty() {
                self.detector.body_model = Some(PathBuf::from(path));
            }
        }
        if let Ok(path) = std::env::var("INVIGIL_ENCODER_MODEL") {
            if !path.trim().is_empty() {
                self.identity.encoder_model = Some(PathBuf::from(path));
            }
        }
        if let Ok(threshold) = std::env::var("INVIGIL_MATCH_THRESHOLD") {
            let parsed: f32 = threshold
                .parse()
                .map_err(|_| anyhow!("INVIGIL_MATCH_THRESHOLD must be a number"))?;
            self.identity.match_threshold = parsed;
        }
        if let Ok(secs) = std::env::var("INVIGIL_AWAY_SECS") {
            let parsed: u64 = secs
                .parse()
                .map_err(|_| anyhow!("INVIGIL_AWAY_SECS must be an integer number of seconds"))?;
            self.session.away_threshold = Duration::from_secs(parsed);
        }
        if let Ok(secs) = std::env::var("INVIGIL_SESSION_IDLE_SECS") {
            let parsed: u64 = secs.parse().map_err(|_| {
                anyhow!("INVIGIL_SESSION_IDLE_SECS must be an integer number of seconds")
            })?;
            self.session.idle = Duration::from_secs(parsed);
        }
        if let Ok(bytes) = std::env::var("INVIGIL_MAX_FRAME_BYTES") {
            let parsed: usize = bytes
                .parse()
                .map_err(|_| anyhow!("INVIGIL_MAX_FRAME_BYTES must be an integer byte count"))?;
            self.max_frame_bytes = parsed;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        match self.detector.backend.as_str() {
            "stub" | "tract" => {}
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        if self.detector.backend == "tract" && self.detector.face_model.is_none() {
            return Err(anyhow!(
                "tract backend requires a face model (INVIGIL_FACE_MODEL)"
            ));
        }
        if !(self.identity.match_threshold > 0.0) {
            return Err(anyhow!("match threshold must be greater than zero"));
        }
        if self.session.idle.as_secs() == 0 {
            return Err(anyhow!("session idle window must be greater than zero"));
        }
        if self.max_frame_bytes == 0 {
            return Err(anyhow!("max frame bytes must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<InvigildConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
