//! Invigil - exam presence monitor kernel.
//!
//! This crate implements the core of a small proctoring service: it accepts
//! decoded camera frames and reference photos, runs face and secondary-object
//! detection, and reports per-frame presence heuristics.
//!
//! # Architecture
//!
//! - `frame`: decoded RGB frames (base64/raw image ingress, zeroized on drop)
//! - `detect`: detector backend trait, registry, and backends
//! - `identity`: face encodings and the encoder backends that produce them
//! - `session`: per-session absence timer and reference identity store
//! - `monitor`: the frame processor tying the above together
//! - `api`: the HTTP surface (`POST /detect/`, `POST /set-reference/`)
//!
//! Tracker state is keyed per session. Two clients streaming frames at the
//! same daemon never share an absence timer or a reference identity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod api;
pub mod config;
pub mod detect;
pub mod frame;
pub mod identity;
pub mod monitor;
pub mod session;

pub use detect::{
    BackendRegistry, Detection, DetectionCapability, DetectionResult, DetectorBackend,
    StubDetector,
};
pub use frame::Frame;
pub use identity::{FaceEncoder, FaceEncoding, StubEncoder, DEFAULT_MATCH_THRESHOLD};
pub use monitor::{Monitor, MonitorSettings};
pub use session::{SessionState, SessionStore};

#[cfg(feature = "backend-tract")]
pub use detect::TractDetector;
#[cfg(feature = "backend-tract")]
pub use identity::TractEncoder;

/// Session id used when a request does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// Errors surfaced by frame processing and the reference setter.
///
/// The API layer maps each variant to an HTTP status. Only `Unexpected`
/// carries internal detail, and that detail is logged server-side rather
/// than returned to the client.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A required request field was absent.
    #[error("missing required field '{0}'")]
    MissingInput(&'static str),

    /// The payload was not valid base64 or not a decodable image.
    #[error("could not decode image data: {0}")]
    Decode(String),

    /// The reference image contained no detectable face.
    #[error("no face detected in reference image")]
    NoFaceFound,

    /// Anything else: backend failures, model errors, poisoned locks.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl MonitorError {
    /// HTTP status code for this error kind.
    pub fn status(&self) -> u16 {
        match self {
            MonitorError::MissingInput(_) => 400,
            MonitorError::Decode(_) => 400,
            MonitorError::NoFaceFound => 400,
            MonitorError::Unexpected(_) => 500,
        }
    }
}

/// Per-frame presence report. Serialized as the `/detect/` response body.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameReport {
    /// Number of frontal faces detected in the frame (post-NMS).
    pub person_count: usize,
    /// True when zero faces have been observed continuously for at least the
    /// configured absence threshold.
    pub looking_away: bool,
    /// True when the secondary-object detector reported any detection.
    pub electronic_devices: bool,
    /// False only when a stored reference identity exists and the frame's
    /// primary face does not match it.
    pub same_person: bool,
}

impl Default for FrameReport {
    fn default() -> Self {
        Self {
            person_count: 0,
            looking_away: false,
            electronic_devices: false,
            same_person: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_client_or_server_status() {
        assert_eq!(MonitorError::MissingInput("frame").status(), 400);
        assert_eq!(MonitorError::Decode("bad png".into()).status(), 400);
        assert_eq!(MonitorError::NoFaceFound.status(), 400);
        assert_eq!(
            MonitorError::Unexpected(anyhow::anyhow!("backend died")).status(),
            500
        );
    }

    #[test]
    fn report_defaults_are_benign() {
        let report = FrameReport::default();
        assert_eq!(report.person_count, 0);
        assert!(!report.looking_away);
        assert!(!report.electronic_devices);
        assert!(report.same_person);
    }

    #[test]
    fn report_serializes_with_wire_field_names() {
        let report = FrameReport {
            person_count: 2,
            looking_away: false,
            electronic_devices: true,
            same_person: true,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["person_count"], 2);
        assert_eq!(json["electronic_devices"], true);
        assert_eq!(json["same_person"], true);
    }
}
