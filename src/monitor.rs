//! Frame processor and reference setter.
//!
//! `Monitor` owns the detector registry, the face encoder, and the session
//! store. The API layer hands it decoded frames; it hands back per-frame
//! reports.

use std::time::{Duration, Instant};

use crate::detect::{BackendRegistry, DetectionCapability, DetectionResult};
use crate::frame::Frame;
use crate::identity::{FaceEncoder, DEFAULT_MATCH_THRESHOLD};
use crate::session::{SessionStore, DEFAULT_SESSION_IDLE};
use crate::{FrameReport, MonitorError};

/// Thresholds governing frame processing.
#[derive(Clone, Copy, Debug)]
pub struct MonitorSettings {
    /// How long zero faces must persist before `looking_away` trips.
    pub away_threshold: Duration,
    /// Maximum encoding distance still counted as the same person.
    pub match_threshold: f32,
    /// Idle window after which session state is evicted.
    pub session_idle: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            away_threshold: Duration::from_secs(5),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            session_idle: DEFAULT_SESSION_IDLE,
        }
    }
}

/// The frame processor.
pub struct Monitor {
    registry: BackendRegistry,
    encoder: Box<dyn FaceEncoder>,
    sessions: SessionStore,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        registry: BackendRegistry,
        encoder: Box<dyn FaceEncoder>,
        settings: MonitorSettings,
    ) -> Self {
        if !registry.has_capability(DetectionCapability::FullBody) {
            log::warn!("no full-body backend registered; electronic_devices will always be false");
        }
        Self {
            registry,
            encoder,
            sessions: SessionStore::new(settings.session_idle),
            settings,
        }
    }

    /// Process one frame for `session`, using the current time.
    pub fn process_frame(
        &mut self,
        session: &str,
        frame: &Frame,
    ) -> Result<FrameReport, MonitorError> {
        self.process_frame_at(session, frame, Instant::now())
    }

    /// Process one frame at an explicit timestamp.
    ///
    /// The timestamp parameter exists so the absence timer can be exercised
    /// in tests without sleeping.
    pub fn process_frame_at(
        &mut self,
        session: &str,
        frame: &Frame,
        now: Instant,
    ) -> Result<FrameReport, MonitorError> {
        let faces = self.registry.detect_with_capability(
            DetectionCapability::FrontalFace,
            frame.pixels(),
            frame.width,
            frame.height,
        )?;
        let objects = self.detect_objects(frame)?;

        let state = self.sessions.state(session, now);
        let looking_away =
            state.observe_faces(faces.count(), now, self.settings.away_threshold);

        let mut same_person = true;
        if let (Some(primary), Some(reference)) = (faces.primary(), state.reference()) {
            let encoded =
                self.encoder
                    .encode(frame.pixels(), frame.width, frame.height, primary)?;
            if let Some(encoding) = encoded {
                same_person = reference.matches(&encoding, self.settings.match_threshold);
            }
        }

        Ok(FrameReport {
            person_count: faces.count(),
            looking_away,
            electronic_devices: objects.count() > 0,
            same_person,
        })
    }

    /// Store the reference identity for `session` from a reference photo.
    ///
    /// Fails with `NoFaceFound` when the photo contains no detectable face,
    /// leaving any previously stored reference untouched.
    pub fn set_reference(&mut self, session: &str, image: &Frame) -> Result<(), MonitorError> {
        self.set_reference_at(session, image, Instant::now())
    }

    /// Store the reference identity at an explicit timestamp.
    pub fn set_reference_at(
        &mut self,
        session: &str,
        image: &Frame,
        now: Instant,
    ) -> Result<(), MonitorError> {
        let faces = self.registry.detect_with_capability(
            DetectionCapability::FrontalFace,
            image.pixels(),
            image.width,
            image.height,
        )?;
        let primary = match faces.primary() {
            Some(primary) => primary,
            None => return Err(MonitorError::NoFaceFound),
        };

        let encoding = self
            .encoder
            .encode(image.pixels(), image.width, image.height, primary)?
            .ok_or(MonitorError::NoFaceFound)?;

        self.sessions.state(session, now).set_reference(encoding);
        log::info!("reference identity set for session '{}'", session);
        Ok(())
    }

    fn detect_objects(&self, frame: &Frame) -> Result<DetectionResult, MonitorError> {
        if !self.registry.has_capability(DetectionCapability::FullBody) {
            return Ok(DetectionResult::default());
        }
        Ok(self.registry.detect_with_capability(
            DetectionCapability::FullBody,
            frame.pixels(),
            frame.width,
            frame.height,
        )?)
    }

    /// Number of live sessions (diagnostics).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
