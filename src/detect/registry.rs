use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::detect::result::DetectionResult;

use super::backend::{DetectionCapability, DetectorBackend};

/// Thread-safe registry of detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes
/// `&mut self`. The frame processor looks backends up by capability, so a
/// daemon registers one face backend and optionally one full-body backend.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<Mutex<dyn DetectorBackend>>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// True when some registered backend serves the capability.
    pub fn has_capability(&self, capability: DetectionCapability) -> bool {
        self.backend_for_capability(capability).is_ok()
    }

    /// Select a backend that serves the requested capability.
    ///
    /// Prefers the default backend when it serves the capability.
    pub fn backend_for_capability(
        &self,
        capability: DetectionCapability,
    ) -> Result<Arc<Mutex<dyn DetectorBackend>>> {
        if let Some(default_backend) = self.default_backend() {
            let supports = {
                let guard = default_backend
                    .lock()
                    .map_err(|_| anyhow!("default backend lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(default_backend);
            }
        }

        for backend in self.backends.values() {
            let supports = {
                let guard = backend
                    .lock()
                    .map_err(|_| anyhow!("backend lock poisoned"))?;
                guard.supports(capability)
            };
            if supports {
                return Ok(backend.clone());
            }
        }

        Err(anyhow!(
            "no registered backend serves capability {:?}",
            capability
        ))
    }

    /// Run detection using a backend that serves the requested capability.
    pub fn detect_with_capability(
        &self,
        capability: DetectionCapability,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<DetectionResult> {
        let backend = self.backend_for_capability(capability)?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        guard.detect(pixels, width, height)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubDetector;

    #[test]
    fn selects_backend_by_capability() {
        let mut registry = BackendRegistry::new();
        registry.register(StubDetector::new(DetectionCapability::FrontalFace));
        registry.register(StubDetector::new(DetectionCapability::FullBody));

        assert!(registry.has_capability(DetectionCapability::FrontalFace));
        assert!(registry.has_capability(DetectionCapability::FullBody));
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn missing_capability_is_an_error() {
        let mut registry = BackendRegistry::new();
        registry.register(StubDetector::new(DetectionCapability::FrontalFace));

        assert!(registry
            .detect_with_capability(DetectionCapability::FullBody, &[0u8; 12], 2, 2)
            .is_err());
    }

    #[test]
    fn detect_routes_to_matching_backend() {
        let mut registry = BackendRegistry::new();
        registry.register(StubDetector::new(DetectionCapability::FrontalFace));
        registry.register(StubDetector::new(DetectionCapability::FullBody));

        // First pixel: R = 2 faces, G = 0 objects.
        let mut pixels = vec![0u8; 4 * 4 * 3];
        pixels[0] = 2;
        let faces = registry
            .detect_with_capability(DetectionCapability::FrontalFace, &pixels, 4, 4)
            .unwrap();
        assert_eq!(faces.count(), 2);

        let objects = registry
            .detect_with_capability(DetectionCapability::FullBody, &pixels, 4, 4)
            .unwrap();
        assert_eq!(objects.count(), 0);
    }
}
