//! Stream denoiser
//!
//! Public entry point, called once per host audio callback. Fans the block
//! out to one [`ChannelPipeline`] per channel, applies the dry/wet mix and
//! guarantees passthrough whenever no model is running.
//!
//! ## States
//!
//! - `Unprepared`: nothing sized, `process_block` is a no-op
//! - `PreparedNoSession`: buffers sized, model missing or no backend works;
//!   audio passes through untouched
//! - `PreparedActive`: a session is live and frames are inferred
//!
//! `prepare` always lands in a prepared state. Model path or backend policy
//! changes rebuild the session; `reset` keeps the state and clears audio.
//!
//! ## Real-time contract
//!
//! `process_block` and `process_interleaved` never allocate, lock, load or
//! log. All model loading happens in `prepare` and the configuration calls.

use std::path::PathBuf;

use crate::backend::Backend;
use crate::channel::{BridgeRatios, ChannelPipeline};
use crate::config::DenoiseSettings;
use crate::error::{DenoiseError, DenoiseResult};
use crate::resample::RateBridge;
use crate::session::SessionManager;
use crate::{FIFO_FRAMES, MODEL_SAMPLE_RATE};

/// Lifecycle state of the denoiser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Unprepared,
    PreparedNoSession,
    PreparedActive,
}

/// Diagnostic counters summed over all channels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames the model processed
    pub frames_inferred: u64,
    /// Frames passed through after an inference failure
    pub frames_bypassed: u64,
    /// Samples lost to FIFO overflow
    pub dropped_samples: u64,
}

/// Streaming neural denoiser
pub struct StreamDenoiser {
    sessions: SessionManager,
    channels: Vec<ChannelPipeline>,
    ratios: BridgeRatios,
    sample_rate: f64,
    max_block: usize,
    prepared: bool,
    enabled: bool,
}

impl StreamDenoiser {
    /// Denoiser over the platform backends and the tract CPU loader
    pub fn new() -> Self {
        Self::with_session_manager(SessionManager::new())
    }

    /// Denoiser over a custom session manager
    pub fn with_session_manager(sessions: SessionManager) -> Self {
        let model_rate = MODEL_SAMPLE_RATE as f64;
        Self {
            sessions,
            channels: Vec::new(),
            ratios: BridgeRatios::new(model_rate, model_rate),
            sample_rate: model_rate,
            max_block: 0,
            prepared: false,
            enabled: true,
        }
    }

    /// Size all buffers and try to load a model
    ///
    /// Returns an error only for an invalid configuration; a missing model
    /// or backend leaves the denoiser prepared in passthrough.
    pub fn prepare(&mut self, sample_rate: f64, num_channels: usize, max_block: usize) -> DenoiseResult<()> {
        self.prepared = false;
        self.channels.clear();

        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(DenoiseError::InvalidConfig(format!("sample rate {sample_rate}")));
        }
        if num_channels == 0 {
            return Err(DenoiseError::InvalidConfig("no channels".into()));
        }
        if max_block == 0 {
            return Err(DenoiseError::InvalidConfig("zero block size".into()));
        }

        let frame_size = self.sessions.frame_size();
        self.ratios = BridgeRatios::new(sample_rate, MODEL_SAMPLE_RATE as f64);
        self.sample_rate = sample_rate;
        self.max_block = max_block;
        self.channels = (0..num_channels)
            .map(|_| ChannelPipeline::new(frame_size, frame_size * FIFO_FRAMES, max_block, self.ratios))
            .collect();
        self.prepared = true;

        if self.sessions.ensure_loaded() {
            log::info!(
                "Denoiser prepared: {} Hz, {} ch, block {}, backend {}",
                sample_rate,
                num_channels,
                max_block,
                self.sessions.active_backend()
            );
        } else {
            log::info!(
                "Denoiser prepared without model: {} Hz, {} ch (passthrough)",
                sample_rate,
                num_channels
            );
        }
        Ok(())
    }

    /// Clear buffered audio and interpolation phase
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }

    /// Session changed: restart streaming state and reload if prepared
    fn reconfigure(&mut self) {
        if !self.prepared {
            return;
        }
        self.reset();
        self.sessions.ensure_loaded();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_model_path(&mut self, path: impl Into<PathBuf>) {
        self.sessions.set_model_path(path);
        self.reconfigure();
    }

    pub fn clear_model_path(&mut self) {
        self.sessions.clear_model_path();
        self.reconfigure();
    }

    /// Set the model path and load it now, reporting why it failed
    pub fn load_model(&mut self, path: impl Into<PathBuf>) -> DenoiseResult<Backend> {
        let path = path.into();
        self.sessions.set_model_path(path.clone());
        self.reset();
        self.sessions.load_model(&path)
    }

    pub fn set_preferred_backend(&mut self, backend: Backend) {
        self.sessions.set_preferred_backend(backend);
        self.reconfigure();
    }

    pub fn set_allow_fallback(&mut self, allow: bool) {
        self.sessions.set_allow_fallback(allow);
        self.reconfigure();
    }

    /// Set a backend parameter (`device_index`, `accelerator_library_path`, ...)
    pub fn set_backend_parameter(&mut self, key: &str, value: &str) -> DenoiseResult<()> {
        self.sessions.set_parameter(key, value)?;
        self.reconfigure();
        Ok(())
    }

    /// Apply a whole settings record, rebuilding the session once
    pub fn apply_settings(&mut self, settings: &DenoiseSettings) {
        self.sessions.set_preferred_backend(settings.backend());
        self.sessions.set_allow_fallback(settings.allow_fallback);
        self.sessions.set_params(settings.backend_params());
        match settings.model_path() {
            Some(path) => self.sessions.set_model_path(path),
            None => self.sessions.clear_model_path(),
        }
        self.reconfigure();
    }

    /// Process planar channel buffers in place
    ///
    /// Untouched when disabled, unprepared, without a session, or when
    /// `mix <= 0`. Channels beyond the prepared count are left as they are.
    pub fn process_block<B: AsMut<[f32]>>(&mut self, buffer: &mut [B], mix: f32) {
        if !self.enabled || !self.prepared || !(mix > 0.0) {
            return;
        }
        let Some(session) = self.sessions.session_mut() else {
            return;
        };

        let mix = mix.min(1.0);
        for (pipeline, channel) in self.channels.iter_mut().zip(buffer.iter_mut()) {
            pipeline.process(channel.as_mut(), self.ratios, mix, &mut *session);
        }
    }

    /// Process an interleaved buffer with `num_channels` channels in place
    pub fn process_interleaved(&mut self, data: &mut [f32], num_channels: usize, mix: f32) {
        if !self.enabled || !self.prepared || !(mix > 0.0) || num_channels == 0 {
            return;
        }
        let Some(session) = self.sessions.session_mut() else {
            return;
        };

        let mix = mix.min(1.0);
        for (index, pipeline) in self.channels.iter_mut().enumerate().take(num_channels) {
            pipeline.process_strided(data, index, num_channels, self.ratios, mix, &mut *session);
        }
    }

    /// A model is loaded and frames will be inferred
    pub fn is_ready(&self) -> bool {
        self.prepared && self.sessions.is_ready()
    }

    /// Backend of the live session, `Auto` when none
    pub fn active_backend(&self) -> Backend {
        self.sessions.active_backend()
    }

    pub fn state(&self) -> StreamState {
        match (self.prepared, self.sessions.is_ready()) {
            (false, _) => StreamState::Unprepared,
            (true, false) => StreamState::PreparedNoSession,
            (true, true) => StreamState::PreparedActive,
        }
    }

    /// Host-rate delay between input and processed output
    pub fn latency_samples(&self) -> usize {
        let Some(channel) = self.channels.first().filter(|_| self.is_ready()) else {
            return 0;
        };
        let model_delay = (channel.primed_samples() + RateBridge::DELAY) as f64;
        (RateBridge::DELAY as f64 + model_delay * self.ratios.input).round() as usize
    }

    pub fn stats(&self) -> StreamStats {
        self.channels
            .iter()
            .fold(StreamStats::default(), |mut stats, channel| {
                stats.frames_inferred += channel.frames_inferred();
                stats.frames_bypassed += channel.frames_bypassed();
                stats.dropped_samples += channel.dropped_samples();
                stats
            })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }
}

impl Default for StreamDenoiser {
    fn default() -> Self {
        Self::new()
    }
}
