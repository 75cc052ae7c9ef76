//! Simulated device provider

use slotpool_core::{DeviceDescriptor, DeviceProvider};
use std::sync::Arc;

use crate::SimBackend;

/// Provider exposing one `SimBackend` per device name
///
/// Backends are kept so tests can script and inspect them after the
/// scheduler has taken its descriptors.
#[derive(Debug, Clone, Default)]
pub struct SimProvider {
    backends: Vec<SimBackend>,
}

impl SimProvider {
    /// Creates a provider with default-scripted backends
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backends: names.into_iter().map(SimBackend::new).collect(),
        }
    }

    /// Adds a preconfigured backend
    pub fn with_backend(mut self, backend: SimBackend) -> Self {
        self.backends.push(backend);
        self
    }

    /// Get the backend for a device
    pub fn backend(&self, name: &str) -> Option<&SimBackend> {
        self.backends.iter().find(|b| b.device() == name)
    }
}

impl DeviceProvider for SimProvider {
    fn devices(&self) -> Vec<DeviceDescriptor> {
        self.backends
            .iter()
            .map(|backend| DeviceDescriptor::new(backend.device(), Arc::new(backend.clone())))
            .collect()
    }
}
