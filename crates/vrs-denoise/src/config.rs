//! Denoiser settings store
//!
//! Persistent provider preference, fallback policy, backend parameters and
//! model path. Stored as pretty JSON in the per-user config directory;
//! missing or unreadable files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::{Backend, BackendParams};
use crate::error::DenoiseResult;

/// Settings file name inside the config directory
const SETTINGS_FILE: &str = "denoise.json";

/// Persisted denoiser configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DenoiseSettings {
    /// Preferred backend by canonical name ("Auto", "CPU", "DML", ...)
    pub provider: String,
    /// Try other backends when the preferred one fails
    pub allow_fallback: bool,
    /// DirectML adapter index (negative = environment / 0)
    pub dml_device_id: i32,
    /// QNN accelerator library path (empty = environment)
    pub qnn_backend_path: String,
    /// Explicit model file (empty = discover)
    pub model_path: String,
}

impl Default for DenoiseSettings {
    fn default() -> Self {
        Self {
            provider: Backend::Auto.as_str().to_string(),
            allow_fallback: true,
            dml_device_id: 0,
            qnn_backend_path: String::new(),
            model_path: String::new(),
        }
    }
}

impl DenoiseSettings {
    /// Preferred backend; unknown names map to `Auto`
    pub fn backend(&self) -> Backend {
        Backend::from_name(&self.provider)
    }

    pub fn set_backend(&mut self, backend: Backend) {
        self.provider = backend.as_str().to_string();
    }

    /// Backend parameters described by these settings
    pub fn backend_params(&self) -> BackendParams {
        let path = self.qnn_backend_path.trim();
        BackendParams {
            dml_device_id: self.dml_device_id,
            qnn_backend_path: (!path.is_empty()).then(|| PathBuf::from(path)),
        }
    }

    /// Explicit model path, if any
    pub fn model_path(&self) -> Option<PathBuf> {
        let path = self.model_path.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }

    /// Load settings from standard location
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load settings from specified path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path.as_ref()) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("Ignoring corrupt settings {}: {}", path.as_ref().display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save settings to standard location
    pub fn save(&self) -> DenoiseResult<()> {
        self.save_to(Self::default_path())
    }

    /// Save settings to specified path
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> DenoiseResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Get default settings file path
    pub fn default_path() -> PathBuf {
        let base = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .map(|h| h.join("Library/Application Support/VRS Denoise"))
                .unwrap_or_else(|| PathBuf::from("."))
        } else if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .map(|d| d.join("VRS Denoise"))
                .unwrap_or_else(|| PathBuf::from("."))
        } else {
            dirs::config_dir()
                .map(|d| d.join("vrs-denoise"))
                .unwrap_or_else(|| PathBuf::from("."))
        };
        base.join(SETTINGS_FILE)
    }
}
