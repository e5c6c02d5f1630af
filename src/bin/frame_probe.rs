//! frame_probe - run the frame processor over a local image and print the report

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use invigil::detect::{BackendRegistry, DetectionCapability, StubDetector};
use invigil::identity::{FaceEncoder, StubEncoder};
use invigil::monitor::{Monitor, MonitorSettings};
use invigil::{Frame, DEFAULT_SESSION};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the image to analyze (JPEG or PNG).
    image: PathBuf,
    /// Detector backend (stub|tract).
    #[arg(long, default_value = "stub", env = "INVIGIL_BACKEND")]
    backend: String,
    /// Face detection model (tract backend).
    #[arg(long, env = "INVIGIL_FACE_MODEL")]
    face_model: Option<PathBuf>,
    /// Secondary-object model (tract backend).
    #[arg(long, env = "INVIGIL_BODY_MODEL")]
    body_model: Option<PathBuf>,
    /// Face embedding model (tract backend).
    #[arg(long, env = "INVIGIL_ENCODER_MODEL")]
    encoder_model: Option<PathBuf>,
    /// Optional reference photo; when set, same_person is checked against it.
    #[arg(long)]
    reference: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut registry = BackendRegistry::new();
    match args.backend.as_str() {
        #[cfg(feature = "backend-tract")]
        "tract" => {
            let face_model = args
                .face_model
                .as_ref()
                .context("--face-model is required with the tract backend")?;
            registry.register(invigil::TractDetector::new(
                face_model,
                DetectionCapability::FrontalFace,
            )?);
            if let Some(body_model) = &args.body_model {
                registry.register(invigil::TractDetector::new(
                    body_model,
                    DetectionCapability::FullBody,
                )?);
            }
        }
        #[cfg(not(feature = "backend-tract"))]
        "tract" => {
            anyhow::bail!("this build does not include the tract backend (feature backend-tract)")
        }
        "stub" => {
            registry.register(StubDetector::new(DetectionCapability::FrontalFace));
            registry.register(StubDetector::new(DetectionCapability::FullBody));
        }
        other => anyhow::bail!("unknown detector backend '{}'", other),
    }

    let encoder = build_encoder(&args)?;
    let mut monitor = Monitor::new(registry, encoder, MonitorSettings::default());

    if let Some(reference) = &args.reference {
        let bytes = std::fs::read(reference)
            .with_context(|| format!("failed to read {}", reference.display()))?;
        let photo = Frame::decode(&bytes)?;
        monitor.set_reference(DEFAULT_SESSION, &photo)?;
    }

    let bytes = std::fs::read(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    let frame = Frame::decode(&bytes)?;
    let report = monitor.process_frame(DEFAULT_SESSION, &frame)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn build_encoder(args: &Args) -> Result<Box<dyn FaceEncoder>> {
    #[cfg(feature = "backend-tract")]
    if let Some(model) = &args.encoder_model {
        return Ok(Box::new(invigil::TractEncoder::new(model)?));
    }
    #[cfg(not(feature = "backend-tract"))]
    if args.encoder_model.is_some() {
        anyhow::bail!("this build does not include the tract encoder (feature backend-tract)");
    }
    Ok(Box::new(StubEncoder::new()))
}
