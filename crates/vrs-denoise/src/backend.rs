//! Execution backend identifiers and backend-specific parameters

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DenoiseError, DenoiseResult};

/// Environment override for the DirectML adapter index
pub const DML_DEVICE_ENV: &str = "VRS_DML_DEVICE_ID";

/// Environment override for the QNN accelerator library path
pub const QNN_BACKEND_PATH_ENV: &str = "VRS_QNN_BACKEND_PATH";

/// Hardware execution backend for the denoising model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Backend {
    /// Pick the best available backend
    #[default]
    Auto,
    /// Portable CPU execution
    #[serde(rename = "CPU")]
    Cpu,
    /// DirectML (platform GPU)
    #[serde(rename = "DML")]
    DirectMl,
    /// Qualcomm QNN (NPU)
    #[serde(rename = "QNN")]
    Qnn,
    /// NVIDIA CUDA
    #[serde(rename = "CUDA")]
    Cuda,
    /// AMD ROCm
    #[serde(rename = "ROCM")]
    Rocm,
    /// Apple CoreML
    #[serde(rename = "CoreML")]
    CoreMl,
}

impl Backend {
    /// Concrete backends in fixed priority order. NPU first, CPU last.
    pub const PRIORITY: [Backend; 6] = [
        Backend::Qnn,
        Backend::DirectMl,
        Backend::Cuda,
        Backend::Rocm,
        Backend::CoreMl,
        Backend::Cpu,
    ];

    /// Canonical name used for persistence and display
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Auto => "Auto",
            Backend::Cpu => "CPU",
            Backend::DirectMl => "DML",
            Backend::Qnn => "QNN",
            Backend::Cuda => "CUDA",
            Backend::Rocm => "ROCM",
            Backend::CoreMl => "CoreML",
        }
    }

    /// Parse a backend name. Unknown names map to [`Backend::Auto`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "cpu" => Backend::Cpu,
            "dml" | "directml" => Backend::DirectMl,
            "qnn" | "npu" => Backend::Qnn,
            "cuda" => Backend::Cuda,
            "rocm" => Backend::Rocm,
            "coreml" => Backend::CoreMl,
            _ => Backend::Auto,
        }
    }

    /// Model file suffix preferred when this backend is selected
    pub fn model_suffix(&self) -> Option<&'static str> {
        match self {
            Backend::DirectMl => Some("dml"),
            Backend::Qnn => Some("qnn"),
            Backend::Cuda => Some("cuda"),
            Backend::Rocm => Some("rocm"),
            Backend::CoreMl => Some("coreml"),
            Backend::Cpu | Backend::Auto => None,
        }
    }

    /// Check if this backend runs on an accelerator
    pub fn is_accelerated(&self) -> bool {
        !matches!(self, Backend::Cpu | Backend::Auto)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

/// Backend-specific parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendParams {
    /// DirectML adapter index. Negative means "resolve from environment".
    pub dml_device_id: i32,
    /// Path to the QNN accelerator backend library
    pub qnn_backend_path: Option<PathBuf>,
}

impl BackendParams {
    /// Set a parameter by key
    ///
    /// Recognised keys: `dml_device_id` (alias `device_index`) and
    /// `qnn_backend_path` (alias `accelerator_library_path`). An empty path
    /// clears the setting.
    pub fn set(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        match key.trim() {
            "dml_device_id" | "device_index" => {
                self.dml_device_id = value.trim().parse().map_err(|_| {
                    DenoiseError::InvalidConfig(format!("device index must be an integer: {value}"))
                })?;
            }
            "qnn_backend_path" | "accelerator_library_path" => {
                let value = value.trim();
                self.qnn_backend_path = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            other => return Err(DenoiseError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    /// DirectML adapter index with environment fallback applied
    pub fn resolved_dml_device_id(&self) -> i32 {
        resolve_device_id(self.dml_device_id, std::env::var(DML_DEVICE_ENV).ok().as_deref())
    }

    /// QNN backend library path with environment fallback applied
    pub fn resolved_qnn_backend_path(&self) -> Option<PathBuf> {
        resolve_backend_path(
            self.qnn_backend_path.as_ref(),
            std::env::var(QNN_BACKEND_PATH_ENV).ok().as_deref(),
        )
    }
}

fn resolve_device_id(configured: i32, env_value: Option<&str>) -> i32 {
    if configured >= 0 {
        return configured;
    }
    env_value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(0)
}

fn resolve_backend_path(configured: Option<&PathBuf>, env_value: Option<&str>) -> Option<PathBuf> {
    configured.cloned().or_else(|| {
        env_value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    })
}
