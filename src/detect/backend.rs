use anyhow::Result;

use crate::detect::result::DetectionResult;

/// Detection capabilities a backend can serve.
///
/// `FrontalFace` drives `person_count` and the absence timer. `FullBody` is
/// the secondary-object capability behind the `electronic_devices` flag; the
/// model it runs is deployment-configured.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    FrontalFace,
    FullBody,
}

/// Detector backend trait.
///
/// Implementations must treat the pixel slice as read-only and ephemeral:
/// no copies retained beyond the `detect` call, no disk writes, no network
/// requests. One backend instance serves one capability.
pub trait DetectorBackend: Send {
    /// Backend identifier, unique per registered instance.
    fn name(&self) -> &'static str;

    /// Returns true when the backend serves a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on an RGB8 frame.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
