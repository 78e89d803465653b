//! Inference session management
//!
//! A [`Session`] is one loaded model bound to one backend. The
//! [`SessionManager`] owns at most one live session, rebuilds it wholesale
//! whenever the model path or backend policy changes, and walks the
//! registry's fallback order until some backend produces a working session.
//!
//! Loading is not real-time safe. It is triggered from configuration calls
//! and `prepare`, never from the audio path.

use std::path::{Path, PathBuf};

use crate::MODEL_FRAME_SIZE;
use crate::backend::{Backend, BackendParams};
use crate::discovery;
use crate::error::{DenoiseError, DenoiseResult};
use crate::registry::BackendRegistry;

/// Runs the model on exactly one frame
pub trait FrameModel: Send {
    /// Process `input` (one frame) into `output` (same length)
    fn run(&mut self, input: &[f32], output: &mut [f32]) -> DenoiseResult<()>;
}

/// Result of building a model for one backend
pub struct LoadedModel {
    pub model: Box<dyn FrameModel>,
    /// Declared input template (negative = wildcard)
    pub input_shape: Vec<i64>,
    pub input_name: String,
    pub output_name: String,
}

/// Builds frame models for the backends it knows how to drive
pub trait ModelLoader: Send + Sync {
    /// Whether this loader can bind a model to `backend`
    fn supports(&self, backend: Backend) -> bool;

    /// Load `path` for `backend`, sized for `frame_size` samples
    fn load(
        &self,
        path: &Path,
        backend: Backend,
        params: &BackendParams,
        frame_size: usize,
    ) -> DenoiseResult<LoadedModel>;
}

/// Fill template wildcards with the frame length and pin batch/channel to 1
///
/// - empty template: `[1, frame]`
/// - rank 1: `[frame]`
/// - rank 2: `[1, frame]`
/// - rank 3: `[1, 1, frame]`
/// - higher ranks: wildcards replaced, fixed dims kept
pub fn resolve_input_shape(template: &[i64], frame: usize) -> Vec<i64> {
    let frame = frame as i64;
    match template.len() {
        0 => vec![1, frame],
        1 => vec![frame],
        2 => vec![1, frame],
        3 => vec![1, 1, frame],
        _ => template
            .iter()
            .map(|&dim| if dim < 0 { frame } else { dim })
            .collect(),
    }
}

/// Copy the model output into a frame, zero-filling when it is short
pub fn copy_frame(model_output: &[f32], frame: &mut [f32]) {
    let n = model_output.len().min(frame.len());
    frame[..n].copy_from_slice(&model_output[..n]);
    frame[n..].fill(0.0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRACT (CPU)
// ═══════════════════════════════════════════════════════════════════════════════

type TractPlan = tract_onnx::prelude::SimplePlan<
    tract_onnx::prelude::TypedFact,
    Box<dyn tract_onnx::prelude::TypedOp>,
    tract_onnx::prelude::Graph<
        tract_onnx::prelude::TypedFact,
        Box<dyn tract_onnx::prelude::TypedOp>,
    >,
>;

/// Pure-Rust ONNX loader driving the CPU backend
#[derive(Debug, Default, Clone, Copy)]
pub struct TractLoader;

impl TractLoader {
    /// Declared shape of the first input; empty if it cannot be read
    fn template_shape(model: &tract_onnx::prelude::InferenceModel) -> Vec<i64> {
        use tract_onnx::prelude::*;

        let Ok(typed) = model.clone().into_typed() else {
            return Vec::new();
        };
        let Ok(fact) = typed.input_fact(0) else {
            return Vec::new();
        };
        fact.shape
            .iter()
            .map(|dim| dim.to_i64().unwrap_or(-1))
            .collect()
    }

    /// Tensor name of the first outlet, falling back to its node name
    fn outlet_name(
        model: &tract_onnx::prelude::InferenceModel,
        outlets: &[tract_onnx::prelude::OutletId],
    ) -> String {
        outlets
            .first()
            .map(|outlet| match model.outlet_label(*outlet) {
                Some(label) => label.to_string(),
                None => model.node(outlet.node).name.clone(),
            })
            .unwrap_or_default()
    }
}

fn tract_err(e: impl std::fmt::Display) -> DenoiseError {
    DenoiseError::TractError(e.to_string())
}

impl ModelLoader for TractLoader {
    fn supports(&self, backend: Backend) -> bool {
        backend == Backend::Cpu
    }

    fn load(
        &self,
        path: &Path,
        backend: Backend,
        _params: &BackendParams,
        frame_size: usize,
    ) -> DenoiseResult<LoadedModel> {
        use tract_onnx::prelude::*;

        if !self.supports(backend) {
            return Err(DenoiseError::BackendUnavailable {
                backend,
                reason: "tract runs on CPU only".into(),
            });
        }

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| DenoiseError::ModelLoadFailed {
                reason: format!("{}: {}", path.display(), e),
            })?;

        let template = Self::template_shape(&model);
        let resolved = resolve_input_shape(&template, frame_size);
        let dims = resolved
            .iter()
            .map(|&d| usize::try_from(d).ok().filter(|d| *d > 0))
            .collect::<Option<Vec<usize>>>()
            .filter(|dims| dims.iter().product::<usize>() == frame_size)
            .ok_or_else(|| DenoiseError::InvalidInputShape {
                expected: format!("{frame_size} elements"),
                got: format!("{resolved:?}"),
            })?;

        let input_name = Self::outlet_name(&model, model.input_outlets().map_err(tract_err)?);
        let output_name = Self::outlet_name(&model, model.output_outlets().map_err(tract_err)?);

        let plan = model
            .with_input_fact(0, f32::fact(dims.iter().copied()).into())
            .map_err(tract_err)?
            .into_optimized()
            .map_err(tract_err)?
            .into_runnable()
            .map_err(tract_err)?;

        Ok(LoadedModel {
            model: Box::new(TractFrameModel { plan, dims }),
            input_shape: template,
            input_name,
            output_name,
        })
    }
}

struct TractFrameModel {
    plan: TractPlan,
    dims: Vec<usize>,
}

impl FrameModel for TractFrameModel {
    fn run(&mut self, input: &[f32], output: &mut [f32]) -> DenoiseResult<()> {
        use tract_onnx::prelude::*;

        let tensor = Tensor::from_shape(&self.dims, input).map_err(tract_err)?;
        let outputs = self.plan.run(tvec!(tensor.into())).map_err(tract_err)?;

        let first = outputs.first().ok_or_else(|| DenoiseError::InferenceFailed {
            reason: "model produced no outputs".into(),
        })?;
        let data = first.as_slice::<f32>().map_err(tract_err)?;
        copy_frame(data, output);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SESSION
// ═══════════════════════════════════════════════════════════════════════════════

/// One loaded model bound to one backend
pub struct Session {
    model: Box<dyn FrameModel>,
    backend: Backend,
    input_shape: Vec<i64>,
    input_name: String,
    output_name: String,
    model_path: PathBuf,
}

impl Session {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Declared input template
    pub fn input_shape(&self) -> &[i64] {
        &self.input_shape
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }
}

impl FrameModel for Session {
    fn run(&mut self, input: &[f32], output: &mut [f32]) -> DenoiseResult<()> {
        self.model.run(input, output)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend)
            .field("input_shape", &self.input_shape)
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("model_path", &self.model_path)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns the live session and the policy used to build it
pub struct SessionManager {
    registry: BackendRegistry,
    loader: Box<dyn ModelLoader>,
    params: BackendParams,
    preferred: Backend,
    allow_fallback: bool,
    model_path: Option<PathBuf>,
    /// Extra model search directories, tried after the environment override
    search_dirs: Vec<PathBuf>,
    session: Option<Session>,
    frame_size: usize,
}

impl SessionManager {
    /// Manager over the platform registry and the tract CPU loader
    pub fn new() -> Self {
        Self::with_components(BackendRegistry::platform_default(), Box::new(TractLoader))
    }

    /// Manager over a custom registry and loader
    pub fn with_components(registry: BackendRegistry, loader: Box<dyn ModelLoader>) -> Self {
        Self {
            registry,
            loader,
            params: BackendParams::default(),
            preferred: Backend::Auto,
            allow_fallback: true,
            model_path: None,
            search_dirs: Vec::new(),
            session: None,
            frame_size: MODEL_FRAME_SIZE,
        }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Backends to try for the current preference
    pub fn fallback_order(&self) -> Vec<Backend> {
        self.registry.fallback_order(self.preferred, self.allow_fallback)
    }

    /// Compiled in and drivable by the loader
    pub fn is_backend_usable(&self, backend: Backend) -> bool {
        self.registry.is_compiled_in(backend) && self.loader.supports(backend)
    }

    /// Load `path` on the first backend that works
    ///
    /// Probe and load failures of individual backends are logged and skipped.
    /// On overall failure no session exists.
    pub fn load_model(&mut self, path: &Path) -> DenoiseResult<Backend> {
        self.session = None;

        if !path.is_file() {
            return Err(DenoiseError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        for backend in self.fallback_order() {
            if !self.is_backend_usable(backend) {
                log::debug!("Skipping {}: not usable in this build", backend);
                continue;
            }

            if let Err(e) = self.registry.probe(backend, &self.params) {
                log::debug!("Backend {} rejected: {}", backend, e);
                continue;
            }

            match self.loader.load(path, backend, &self.params, self.frame_size) {
                Ok(loaded) => {
                    log::info!(
                        "Denoise model {} loaded on {} (input {:?})",
                        path.display(),
                        backend,
                        loaded.input_shape
                    );
                    self.session = Some(Session {
                        model: loaded.model,
                        backend,
                        input_shape: loaded.input_shape,
                        input_name: loaded.input_name,
                        output_name: loaded.output_name,
                        model_path: path.to_path_buf(),
                    });
                    return Ok(backend);
                }
                Err(e) => {
                    log::debug!("Loading {} on {} failed: {}", path.display(), backend, e);
                }
            }
        }

        log::warn!("No usable backend for {}", path.display());
        Err(DenoiseError::NoUsableBackend {
            path: path.display().to_string(),
        })
    }

    /// Make sure a session exists, loading the configured or a discovered model
    ///
    /// Returns `true` when a session is live afterwards.
    pub fn ensure_loaded(&mut self) -> bool {
        if self.session.is_some() {
            return true;
        }

        if let Some(path) = self.model_path.clone().filter(|p| p.is_file()) {
            if self.load_model(&path).is_ok() {
                return true;
            }
        }

        let dirs = discovery::default_search_dirs(&self.search_dirs);
        for candidate in discovery::existing_candidates(self.preferred, &dirs) {
            if self.load_model(&candidate).is_ok() {
                self.model_path = Some(candidate);
                return true;
            }
        }

        false
    }

    /// Infer one frame on the live session
    pub fn run_frame(&mut self, input: &[f32], output: &mut [f32]) -> DenoiseResult<()> {
        match self.session.as_mut() {
            Some(session) => session.run(input, output),
            None => Err(DenoiseError::InferenceFailed {
                reason: "no session loaded".into(),
            }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_some()
    }

    /// Live session, if any
    pub fn session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Backend of the live session, `Auto` when none
    pub fn active_backend(&self) -> Backend {
        self.session.as_ref().map_or(Backend::Auto, Session::backend)
    }

    /// Drop the live session
    pub fn unload(&mut self) {
        self.session = None;
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn set_model_path(&mut self, path: impl Into<PathBuf>) {
        self.model_path = Some(path.into());
        self.session = None;
    }

    pub fn clear_model_path(&mut self) {
        self.model_path = None;
        self.session = None;
    }

    pub fn preferred_backend(&self) -> Backend {
        self.preferred
    }

    pub fn set_preferred_backend(&mut self, backend: Backend) {
        self.preferred = backend;
        self.session = None;
    }

    pub fn allow_fallback(&self) -> bool {
        self.allow_fallback
    }

    pub fn set_allow_fallback(&mut self, allow: bool) {
        self.allow_fallback = allow;
        self.session = None;
    }

    pub fn params(&self) -> &BackendParams {
        &self.params
    }

    /// Set a backend parameter. Invalidates the session on success.
    pub fn set_parameter(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        self.params.set(key, value)?;
        self.session = None;
        Ok(())
    }

    pub fn set_params(&mut self, params: BackendParams) {
        self.params = params;
        self.session = None;
    }

    /// Extra model search directories
    pub fn set_search_dirs(&mut self, dirs: Vec<PathBuf>) {
        self.search_dirs = dirs;
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
