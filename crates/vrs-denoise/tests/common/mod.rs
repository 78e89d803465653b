//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use vrs_denoise::session::copy_frame;
use vrs_denoise::{
    Backend, BackendParams, BackendProbe, BackendRegistry, CpuProbe, DenoiseError, DenoiseResult,
    FrameModel, LoadedModel, ModelLoader, SessionManager, StreamDenoiser,
};

/// Model that returns its input
pub struct IdentityModel;

impl FrameModel for IdentityModel {
    fn run(&mut self, input: &[f32], output: &mut [f32]) -> DenoiseResult<()> {
        copy_frame(input, output);
        Ok(())
    }
}

/// Loader producing identity models on every backend
pub struct IdentityLoader;

impl ModelLoader for IdentityLoader {
    fn supports(&self, _backend: Backend) -> bool {
        true
    }

    fn load(
        &self,
        _path: &Path,
        _backend: Backend,
        _params: &BackendParams,
        _frame_size: usize,
    ) -> DenoiseResult<LoadedModel> {
        Ok(LoadedModel {
            model: Box::new(IdentityModel),
            input_shape: vec![1, -1],
            input_name: "input".into(),
            output_name: "output".into(),
        })
    }
}

/// Probe with a fixed outcome that counts how often it runs
pub struct CountingProbe {
    pub backend: Backend,
    pub succeeds: bool,
    pub calls: Arc<AtomicUsize>,
}

impl CountingProbe {
    pub fn new(backend: Backend, succeeds: bool) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = Self {
            backend,
            succeeds,
            calls: calls.clone(),
        };
        (probe, calls)
    }
}

impl BackendProbe for CountingProbe {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn compiled_in(&self) -> bool {
        true
    }

    fn probe_and_load(&self, _params: &BackendParams) -> DenoiseResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.succeeds {
            Ok(())
        } else {
            Err(DenoiseError::BackendUnavailable {
                backend: self.backend,
                reason: "probe always fails".into(),
            })
        }
    }
}

/// Placeholder model file; the mock loaders never parse it
pub fn model_file() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"onnx").unwrap();
    file
}

/// Denoiser with an identity model on the CPU backend
pub fn identity_denoiser(model: &Path) -> StreamDenoiser {
    let registry = BackendRegistry::new(vec![Box::new(CpuProbe)]);
    let sessions = SessionManager::with_components(registry, Box::new(IdentityLoader));
    let mut denoiser = StreamDenoiser::with_session_manager(sessions);
    denoiser.set_model_path(model);
    denoiser
}

/// Sine wave
pub fn sine(freq: f64, sample_rate: f64, len: usize, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let t = i as f64 / sample_rate;
            amplitude * (2.0 * std::f64::consts::PI * freq * t).sin() as f32
        })
        .collect()
}
