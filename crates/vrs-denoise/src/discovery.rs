//! Model file discovery
//!
//! When no explicit model path is configured the session manager looks for
//! `<dir>/models/<file>` across a few well-known directories. File names are
//! biased toward the preferred backend: a backend-tuned export is tried
//! before the CPU export, which is tried before the bare default.

use std::path::{Path, PathBuf};

use crate::backend::Backend;

/// Environment override for the model search directory
pub const MODEL_DIR_ENV: &str = "VRS_MODEL_DIR";

/// Sub-directory holding model files inside every search directory
pub const MODELS_SUBDIR: &str = "models";

/// Generic CPU export
pub const CPU_MODEL_FILE: &str = "rnnoise_48k_olive_cpu.onnx";

/// Bare default model
pub const DEFAULT_MODEL_FILE: &str = "rnnoise_48k.onnx";

/// Backend-tuned model file name
pub fn backend_model_file(backend: Backend) -> Option<String> {
    backend
        .model_suffix()
        .map(|suffix| format!("rnnoise_48k_olive_{suffix}.onnx"))
}

/// Model file names in the order they are tried
pub fn model_file_priority(preferred: Backend) -> Vec<String> {
    let mut names: Vec<String> = if preferred == Backend::Auto {
        Backend::PRIORITY
            .iter()
            .filter_map(|b| backend_model_file(*b))
            .collect()
    } else {
        backend_model_file(preferred).into_iter().collect()
    };

    for fallback in [CPU_MODEL_FILE, DEFAULT_MODEL_FILE] {
        if !names.iter().any(|n| n == fallback) {
            names.push(fallback.to_string());
        }
    }
    names
}

/// Search directories, deduplicated, in order:
/// environment override, extra configured directories, executable
/// directory, install root (parent of the executable directory).
pub fn search_dirs(env_dir: Option<&str>, extra: &[PathBuf], exe_dir: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut add = |dir: PathBuf| {
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    };

    if let Some(env) = env_dir.map(str::trim).filter(|d| !d.is_empty()) {
        add(PathBuf::from(env));
    }
    for dir in extra {
        add(dir.clone());
    }
    if let Some(exe_dir) = exe_dir {
        add(exe_dir.to_path_buf());
        if let Some(root) = exe_dir.parent() {
            add(root.to_path_buf());
        }
    }
    dirs
}

/// Search directories for the running process
pub fn default_search_dirs(extra: &[PathBuf]) -> Vec<PathBuf> {
    let env_dir = std::env::var(MODEL_DIR_ENV).ok();
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf));
    search_dirs(env_dir.as_deref(), extra, exe_dir.as_deref())
}

/// Every candidate path, directory-major
pub fn candidate_paths(preferred: Backend, dirs: &[PathBuf]) -> Vec<PathBuf> {
    let names = model_file_priority(preferred);
    dirs.iter()
        .flat_map(|dir| {
            let models = dir.join(MODELS_SUBDIR);
            names.iter().map(move |name| models.join(name))
        })
        .collect()
}

/// Candidates that exist as files
pub fn existing_candidates(preferred: Backend, dirs: &[PathBuf]) -> Vec<PathBuf> {
    candidate_paths(preferred, dirs)
        .into_iter()
        .filter(|p| p.is_file())
        .collect()
}
