pub mod backend;
pub mod backends;
pub mod registry;
pub mod result;

pub use backend::{DetectionCapability, DetectorBackend};
pub use backends::StubDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use registry::BackendRegistry;
pub use result::{Detection, DetectionResult};
