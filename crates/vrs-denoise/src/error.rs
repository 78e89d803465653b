//! Error types for the streaming denoiser

use thiserror::Error;

use crate::backend::Backend;

/// Denoiser error types
#[derive(Error, Debug)]
pub enum DenoiseError {
    /// Model file not found
    #[error("Model not found: {path}")]
    ModelNotFound { path: String },

    /// Model loading failed
    #[error("Failed to load model: {reason}")]
    ModelLoadFailed { reason: String },

    /// A single backend could not be set up
    #[error("Backend {backend} unavailable: {reason}")]
    BackendUnavailable { backend: Backend, reason: String },

    /// Every candidate backend failed for this model
    #[error("No usable backend for model: {path}")]
    NoUsableBackend { path: String },

    /// Inference failed
    #[error("Inference failed: {reason}")]
    InferenceFailed { reason: String },

    /// Invalid input shape
    #[error("Invalid input shape: expected {expected}, got {got}")]
    InvalidInputShape { expected: String, got: String },

    /// Invalid stream configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Backend parameter key not recognised
    #[error("Unknown backend parameter: {0}")]
    UnknownParameter(String),

    /// Tract error
    #[error("Tract error: {0}")]
    TractError(String),

    /// Settings (de)serialization error
    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for denoiser operations
pub type DenoiseResult<T> = Result<T, DenoiseError>;
