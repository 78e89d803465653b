//! Channel pipeline
//!
//! Per-channel streaming transform:
//!
//! ```text
//! host block → RateBridge(in) → FIFO(in) → [frame ready?] → model
//!            → FIFO(out) → RateBridge(out) → dry/wet mix → host block
//! ```
//!
//! Every buffer is sized in [`ChannelPipeline::new`]; processing never
//! allocates. Channels share no mutable state, so each pipeline can be
//! driven independently.

use crate::buffer::ElasticFrameBuffer;
use crate::resample::RateBridge;
use crate::session::FrameModel;

/// Extra silence primed into the output FIFO beyond one frame, covering
/// the one-sample phase disagreement between the two rate bridges
pub const PHASE_MARGIN: usize = 4;

/// Conversion ratios for both directions (input samples per output sample)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BridgeRatios {
    /// Host → model: `host_rate / model_rate`
    pub input: f64,
    /// Model → host: `model_rate / host_rate`
    pub output: f64,
}

impl BridgeRatios {
    pub fn new(host_rate: f64, model_rate: f64) -> Self {
        Self {
            input: host_rate / model_rate,
            output: model_rate / host_rate,
        }
    }

    /// Check both ratios are finite and positive
    pub fn is_valid(&self) -> bool {
        self.input.is_finite() && self.input > 0.0 && self.output.is_finite() && self.output > 0.0
    }
}

/// Streaming state for one audio channel
#[derive(Debug, Clone)]
pub struct ChannelPipeline {
    bridge_in: RateBridge,
    bridge_out: RateBridge,
    input_fifo: ElasticFrameBuffer,
    output_fifo: ElasticFrameBuffer,
    /// Model-rate samples produced from one host chunk
    scratch_in: Vec<f32>,
    /// Model-rate samples consumed for one host chunk
    scratch_out: Vec<f32>,
    frame_in: Vec<f32>,
    frame_out: Vec<f32>,
    /// Unprocessed copy of the current chunk for mixing
    dry: Vec<f32>,
    /// De-interleaved lane for strided input
    lane: Vec<f32>,
    frame_size: usize,
    max_block: usize,
    /// Largest host chunk whose model-rate image fits the FIFOs
    chunk_limit: usize,
    frames_inferred: u64,
    frames_bypassed: u64,
}

impl ChannelPipeline {
    /// Create pipeline sized for `max_block` host samples per call
    ///
    /// Host blocks are split so one chunk never carries more model-rate
    /// samples than the FIFOs can hold next to a pending frame and the
    /// primed silence.
    pub fn new(frame_size: usize, fifo_capacity: usize, max_block: usize, ratios: BridgeRatios) -> Self {
        let frame_size = frame_size.max(1);
        let max_block = max_block.max(1);
        let fifo_capacity = fifo_capacity.max(4 * frame_size + PHASE_MARGIN);
        let chunk_limit = Self::max_chunk(frame_size, fifo_capacity, ratios).min(max_block);
        let scratch_in_len = (chunk_limit as f64 / ratios.input).ceil() as usize + 2;
        let scratch_out_len = (chunk_limit as f64 * ratios.output).ceil() as usize + 3;

        let mut pipeline = Self {
            bridge_in: RateBridge::new(),
            bridge_out: RateBridge::new(),
            input_fifo: ElasticFrameBuffer::new(fifo_capacity),
            output_fifo: ElasticFrameBuffer::new(fifo_capacity),
            scratch_in: vec![0.0; scratch_in_len],
            scratch_out: vec![0.0; scratch_out_len],
            frame_in: vec![0.0; frame_size],
            frame_out: vec![0.0; frame_size],
            dry: vec![0.0; chunk_limit],
            lane: vec![0.0; chunk_limit],
            frame_size,
            max_block,
            chunk_limit,
            frames_inferred: 0,
            frames_bypassed: 0,
        };
        pipeline.prime();
        pipeline
    }

    /// Host samples per chunk so that neither FIFO can overflow
    ///
    /// The output FIFO peaks near the primed silence plus the model-rate
    /// image of one chunk; the input FIFO holds under a frame plus the same.
    fn max_chunk(frame_size: usize, fifo_capacity: usize, ratios: BridgeRatios) -> usize {
        let model_budget = fifo_capacity.saturating_sub(2 * frame_size + PHASE_MARGIN + 4);
        if !ratios.is_valid() {
            return model_budget.max(1);
        }
        ((model_budget as f64 * ratios.input).floor() as usize).max(1)
    }

    /// Silence the output FIFO holds right after `new`/`reset`
    pub fn primed_samples(&self) -> usize {
        self.frame_size + PHASE_MARGIN
    }

    fn prime(&mut self) {
        self.output_fifo.push_silence(self.primed_samples());
    }

    /// Clear phase and buffered audio. Sizes are kept.
    pub fn reset(&mut self) {
        self.bridge_in.reset();
        self.bridge_out.reset();
        self.input_fifo.clear();
        self.output_fifo.clear();
        self.prime();
    }

    /// Process a host block in place
    ///
    /// Blocks longer than the prepared maximum are handled in chunks.
    pub fn process(
        &mut self,
        block: &mut [f32],
        ratios: BridgeRatios,
        mix: f32,
        model: &mut dyn FrameModel,
    ) {
        let chunk_limit = self.chunk_limit;
        for chunk in block.chunks_mut(chunk_limit) {
            self.process_chunk(chunk, ratios, mix, model);
        }
    }

    /// Process channel `channel` of an interleaved buffer with `stride` channels
    pub fn process_strided(
        &mut self,
        data: &mut [f32],
        channel: usize,
        stride: usize,
        ratios: BridgeRatios,
        mix: f32,
        model: &mut dyn FrameModel,
    ) {
        if stride == 0 || channel >= stride {
            return;
        }

        let mut lane = std::mem::take(&mut self.lane);
        for chunk in data.chunks_mut(stride * self.chunk_limit) {
            let frames = chunk.len() / stride;
            let lane = &mut lane[..frames];

            for (i, sample) in lane.iter_mut().enumerate() {
                *sample = chunk[i * stride + channel];
            }
            self.process_chunk(lane, ratios, mix, model);
            for (i, sample) in lane.iter().enumerate() {
                chunk[i * stride + channel] = *sample;
            }
        }
        self.lane = lane;
    }

    fn process_chunk(
        &mut self,
        block: &mut [f32],
        ratios: BridgeRatios,
        mix: f32,
        model: &mut dyn FrameModel,
    ) {
        let n = block.len();
        if n == 0 {
            return;
        }

        let keep_dry = mix < 1.0;
        if keep_dry {
            self.dry[..n].copy_from_slice(block);
        }

        // Host → model
        let target = ((n as f64 / ratios.input).ceil() as usize + 1).min(self.scratch_in.len());
        let produced = self
            .bridge_in
            .process(ratios.input, block, &mut self.scratch_in[..target]);
        self.input_fifo.push(&self.scratch_in[..produced]);

        // Whole frames only; a failed frame passes through unchanged
        while self.input_fifo.available() >= self.frame_size {
            self.input_fifo.pop(&mut self.frame_in, false);
            match model.run(&self.frame_in, &mut self.frame_out) {
                Ok(()) => {
                    self.output_fifo.push(&self.frame_out);
                    self.frames_inferred += 1;
                }
                Err(_) => {
                    self.output_fifo.push(&self.frame_in);
                    self.frames_bypassed += 1;
                }
            }
        }

        // Model → host
        let required = self
            .bridge_out
            .input_required(ratios.output, n)
            .min(self.scratch_out.len());
        self.output_fifo.pop(&mut self.scratch_out[..required], true);
        let written = self
            .bridge_out
            .process(ratios.output, &self.scratch_out[..required], block);
        block[written..].fill(0.0);

        if keep_dry {
            let dry_gain = 1.0 - mix;
            for (out, dry) in block.iter_mut().zip(&self.dry[..n]) {
                *out = *dry * dry_gain + *out * mix;
            }
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    /// Host samples handed to the model path in one step
    pub fn chunk_size(&self) -> usize {
        self.chunk_limit
    }

    /// Frames the model processed successfully
    pub fn frames_inferred(&self) -> u64 {
        self.frames_inferred
    }

    /// Frames passed through after an inference failure
    pub fn frames_bypassed(&self) -> u64 {
        self.frames_bypassed
    }

    /// Samples lost to FIFO overflow in either direction
    pub fn dropped_samples(&self) -> u64 {
        self.input_fifo.dropped() + self.output_fifo.dropped()
    }

    /// Model-rate samples waiting for a full frame
    pub fn pending_input(&self) -> usize {
        self.input_fifo.available()
    }

    /// Model-rate samples ready for the host
    pub fn pending_output(&self) -> usize {
        self.output_fifo.available()
    }
}
