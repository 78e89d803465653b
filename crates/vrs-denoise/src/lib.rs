//! # VRS Streaming Neural Denoiser
//!
//! Real-time noise suppression with an externally trained ONNX model:
//! - Host-rate ⇄ model-rate streaming conversion (Rate Bridge)
//! - Host block ⇄ model frame reshaping (Elastic Frame Buffer)
//! - Multi-backend execution with probing and safe fallback
//! - Dry/wet mixing with bit-exact passthrough when no model runs
//!
//! ## Architecture
//!
//! ```text
//! StreamDenoiser ──► ChannelPipeline × N ──► RateBridge / ElasticFrameBuffer
//!       │
//!       └──► SessionManager ──► BackendRegistry ──► BackendProbe adapters
//!                  └──► ModelLoader (tract CPU, or host supplied)
//! ```
//!
//! ## Real-time Considerations
//!
//! - Model: 48 kHz, 480-sample (10 ms) frames
//! - `process_block` never allocates, locks or loads
//! - Model loading and backend probing happen in `prepare` and on
//!   configuration changes only

// Many internal items don't need docs
#![allow(missing_docs)]

pub mod backend;
pub mod buffer;
pub mod channel;
pub mod config;
pub mod denoiser;
pub mod discovery;
pub mod error;
pub mod probe;
pub mod registry;
pub mod resample;
pub mod session;

pub use backend::{Backend, BackendParams};
pub use buffer::ElasticFrameBuffer;
pub use channel::{BridgeRatios, ChannelPipeline};
pub use config::DenoiseSettings;
pub use denoiser::{StreamDenoiser, StreamState, StreamStats};
pub use error::{DenoiseError, DenoiseResult};
pub use probe::{BackendProbe, CpuProbe, NativeLibraryProbe};
pub use registry::BackendRegistry;
pub use resample::RateBridge;
pub use session::{
    FrameModel, LoadedModel, ModelLoader, Session, SessionManager, TractLoader, resolve_input_shape,
};

/// Sample rate the model runs at
pub const MODEL_SAMPLE_RATE: u32 = 48_000;

/// Samples per model invocation (10 ms at 48 kHz)
pub const MODEL_FRAME_SIZE: usize = 480;

/// Elastic frame buffer capacity, in model frames, per direction
pub const FIFO_FRAMES: usize = 32;
