//! Backend probe adapters
//!
//! Every backend is reduced to one capability: "can you be set up on this
//! machine right now?". The registry only sees [`BackendProbe`]; all
//! platform-coupled work (support library names, search directories, entry
//! symbols, device parameters) lives in the adapters below.
//!
//! ## Adapters
//!
//! - [`CpuProbe`]: always compiled in, always succeeds
//! - [`NativeLibraryProbe`]: dynamically loads a backend support library and
//!   keeps it resident once found

use std::path::{Path, PathBuf};

use libloading::Library;
use parking_lot::Mutex;

use crate::backend::{Backend, BackendParams};
use crate::error::{DenoiseError, DenoiseResult};

/// Setup check for one execution backend
pub trait BackendProbe: Send + Sync {
    /// Backend this probe describes
    fn backend(&self) -> Backend;

    /// Whether support for this backend was built into the binary
    fn compiled_in(&self) -> bool;

    /// Locate and load whatever the backend needs at runtime
    ///
    /// Not real-time safe: performs file system lookups and library loads.
    fn probe_and_load(&self, params: &BackendParams) -> DenoiseResult<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// CPU
// ═══════════════════════════════════════════════════════════════════════════════

/// Universal CPU backend
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuProbe;

impl BackendProbe for CpuProbe {
    fn backend(&self) -> Backend {
        Backend::Cpu
    }

    fn compiled_in(&self) -> bool {
        true
    }

    fn probe_and_load(&self, _params: &BackendParams) -> DenoiseResult<()> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NATIVE LIBRARY
// ═══════════════════════════════════════════════════════════════════════════════

/// Backend whose availability hinges on a dynamically loadable library
pub struct NativeLibraryProbe {
    backend: Backend,
    /// Library base names, tried in order (`onnxruntime_providers_cuda`, ...)
    libraries: Vec<&'static str>,
    /// Symbol that must resolve in at least one loaded library
    entry_symbol: Option<&'static str>,
    compiled_in: bool,
    /// Libraries stay loaded for the process lifetime once probed
    resident: Mutex<Vec<Library>>,
}

impl NativeLibraryProbe {
    /// Create probe
    pub fn new(
        backend: Backend,
        libraries: Vec<&'static str>,
        entry_symbol: Option<&'static str>,
        compiled_in: bool,
    ) -> Self {
        Self {
            backend,
            libraries,
            entry_symbol,
            compiled_in,
            resident: Mutex::new(Vec::new()),
        }
    }

    /// DirectML adapter (platform GPU)
    pub fn directml() -> Self {
        Self::new(
            Backend::DirectMl,
            vec![
                "onnxruntime_providers_dml",
                "onnxruntime_providers_shared",
                "onnxruntime",
            ],
            Some("OrtSessionOptionsAppendExecutionProvider_DML"),
            cfg!(all(feature = "directml", windows)),
        )
    }

    /// QNN adapter (NPU). Always compiled in; availability is decided at runtime.
    pub fn qnn() -> Self {
        Self::new(Backend::Qnn, vec!["onnxruntime_providers_qnn"], None, true)
    }

    /// CUDA adapter
    pub fn cuda() -> Self {
        Self::new(
            Backend::Cuda,
            vec!["onnxruntime_providers_cuda", "onnxruntime_providers_shared"],
            None,
            cfg!(feature = "cuda"),
        )
    }

    /// ROCm adapter
    pub fn rocm() -> Self {
        Self::new(
            Backend::Rocm,
            vec!["onnxruntime_providers_rocm", "onnxruntime_providers_shared"],
            None,
            cfg!(feature = "rocm"),
        )
    }

    /// CoreML adapter
    pub fn coreml() -> Self {
        Self::new(
            Backend::CoreMl,
            vec!["onnxruntime"],
            Some("OrtSessionOptionsAppendExecutionProvider_CoreML"),
            cfg!(all(feature = "coreml", target_os = "macos")),
        )
    }

    /// Number of libraries currently held resident
    pub fn resident_count(&self) -> usize {
        self.resident.lock().len()
    }

    fn check_params(&self, params: &BackendParams) -> DenoiseResult<()> {
        match self.backend {
            Backend::Qnn => {
                let path = params.resolved_qnn_backend_path().ok_or_else(|| {
                    self.unavailable("accelerator library path not configured".into())
                })?;
                if !path.is_file() {
                    return Err(self.unavailable(format!(
                        "accelerator library not found: {}",
                        path.display()
                    )));
                }
            }
            Backend::DirectMl => {
                log::debug!("DirectML device index {}", params.resolved_dml_device_id());
            }
            _ => {}
        }
        Ok(())
    }

    fn unavailable(&self, reason: String) -> DenoiseError {
        DenoiseError::BackendUnavailable {
            backend: self.backend,
            reason,
        }
    }

    fn has_entry_symbol(&self, library: &Library) -> bool {
        let Some(symbol) = self.entry_symbol else {
            return true;
        };
        // Only resolved, never called.
        unsafe { library.get::<unsafe extern "C" fn()>(symbol.as_bytes()).is_ok() }
    }
}

impl BackendProbe for NativeLibraryProbe {
    fn backend(&self) -> Backend {
        self.backend
    }

    fn compiled_in(&self) -> bool {
        self.compiled_in
    }

    fn probe_and_load(&self, params: &BackendParams) -> DenoiseResult<()> {
        if !self.compiled_in {
            return Err(self.unavailable("not compiled in".into()));
        }
        self.check_params(params)?;

        let mut resident = self.resident.lock();
        if !resident.is_empty() {
            return Ok(());
        }

        let accelerator_dir = params
            .resolved_qnn_backend_path()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));

        let mut loaded = Vec::new();
        for name in &self.libraries {
            let candidates = library_candidates(name, accelerator_dir.as_deref(), exe_dir.as_deref());
            for candidate in candidates {
                // Loading runs the library's initialisers; these are vendor
                // runtime libraries from the system or install directory.
                match unsafe { Library::new(&candidate) } {
                    Ok(library) => {
                        log::debug!("{}: loaded {}", self.backend, candidate.display());
                        loaded.push(library);
                        break;
                    }
                    Err(e) => {
                        log::debug!("{}: {} not loadable: {}", self.backend, candidate.display(), e);
                    }
                }
            }
        }

        if loaded.is_empty() {
            return Err(self.unavailable("support library not found".into()));
        }
        if !loaded.iter().any(|lib| self.has_entry_symbol(lib)) {
            return Err(self.unavailable(format!(
                "entry point {} missing",
                self.entry_symbol.unwrap_or_default()
            )));
        }

        *resident = loaded;
        Ok(())
    }
}

impl std::fmt::Debug for NativeLibraryProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibraryProbe")
            .field("backend", &self.backend)
            .field("libraries", &self.libraries)
            .field("compiled_in", &self.compiled_in)
            .field("resident", &self.resident_count())
            .finish()
    }
}

/// Paths to try for one library base name
///
/// Order: bare platform file name (system loader search), accelerator
/// library directory, executable directory.
pub fn library_candidates(
    base_name: &str,
    accelerator_dir: Option<&Path>,
    exe_dir: Option<&Path>,
) -> Vec<PathBuf> {
    let file_name = PathBuf::from(libloading::library_filename(base_name));
    let mut candidates = vec![file_name.clone()];
    candidates.extend(accelerator_dir.map(|dir| dir.join(&file_name)));
    candidates.extend(exe_dir.map(|dir| dir.join(&file_name)));
    candidates
}

/// Capability table for the current platform, in priority order
pub fn platform_probes() -> Vec<Box<dyn BackendProbe>> {
    vec![
        Box::new(NativeLibraryProbe::qnn()),
        Box::new(NativeLibraryProbe::directml()),
        Box::new(NativeLibraryProbe::cuda()),
        Box::new(NativeLibraryProbe::rocm()),
        Box::new(NativeLibraryProbe::coreml()),
        Box::new(CpuProbe),
    ]
}
