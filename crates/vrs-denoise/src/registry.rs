//! Backend registry
//!
//! Holds the fixed, ordered list of backend probes and answers two
//! questions: which backends to try for a given preference, and whether a
//! given backend can be set up right now.

use crate::backend::{Backend, BackendParams};
use crate::error::{DenoiseError, DenoiseResult};
use crate::probe::{BackendProbe, platform_probes};

/// Ordered set of backend probes
pub struct BackendRegistry {
    probes: Vec<Box<dyn BackendProbe>>,
}

impl BackendRegistry {
    /// Registry over an explicit probe list
    pub fn new(probes: Vec<Box<dyn BackendProbe>>) -> Self {
        Self { probes }
    }

    /// Registry over the platform capability table
    pub fn platform_default() -> Self {
        Self::new(platform_probes())
    }

    /// Backends to try, in order, without duplicates
    ///
    /// - fallback disallowed with a concrete preference: `[preferred]`
    /// - `Auto`: fixed priority order, NPU first, CPU last
    /// - otherwise: preferred first, then the priority order if fallback is allowed
    pub fn fallback_order(&self, preferred: Backend, allow_fallback: bool) -> Vec<Backend> {
        fallback_order(preferred, allow_fallback)
    }

    /// Probe registered for a backend
    pub fn probe_for(&self, backend: Backend) -> Option<&dyn BackendProbe> {
        self.probes
            .iter()
            .find(|p| p.backend() == backend)
            .map(|p| p.as_ref())
    }

    /// Check static availability (registered and compiled in)
    pub fn is_compiled_in(&self, backend: Backend) -> bool {
        self.probe_for(backend).is_some_and(|p| p.compiled_in())
    }

    /// Run the backend's runtime setup
    pub fn probe(&self, backend: Backend, params: &BackendParams) -> DenoiseResult<()> {
        let probe = self
            .probe_for(backend)
            .ok_or_else(|| DenoiseError::BackendUnavailable {
                backend,
                reason: "no probe registered".into(),
            })?;
        probe.probe_and_load(params)
    }

    /// Registered backends in table order
    pub fn backends(&self) -> Vec<Backend> {
        self.probes.iter().map(|p| p.backend()).collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends())
            .finish()
    }
}

/// Fallback order for a preference
pub fn fallback_order(preferred: Backend, allow_fallback: bool) -> Vec<Backend> {
    if preferred == Backend::Auto {
        return Backend::PRIORITY.to_vec();
    }
    if !allow_fallback {
        return vec![preferred];
    }

    let mut order = Vec::with_capacity(Backend::PRIORITY.len());
    order.push(preferred);
    order.extend(Backend::PRIORITY.iter().copied().filter(|b| *b != preferred));
    order
}
