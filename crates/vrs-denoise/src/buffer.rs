//! Elastic frame buffer
//!
//! Fixed-capacity circular FIFO that reshapes arbitrary host-sized pushes
//! into fixed model-sized pops. Storage is allocated once in
//! [`ElasticFrameBuffer::new`] / [`ElasticFrameBuffer::resize`]; `push` and
//! `pop` never allocate.

/// Circular sample FIFO
#[derive(Debug, Clone)]
pub struct ElasticFrameBuffer {
    /// Sample storage
    buffer: Vec<f32>,
    /// Next sample to read
    read_pos: usize,
    /// Next slot to write
    write_pos: usize,
    /// Samples currently stored
    available: usize,
    /// Samples overwritten because a push exceeded free space
    dropped: u64,
}

impl ElasticFrameBuffer {
    /// Create buffer holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            read_pos: 0,
            write_pos: 0,
            available: 0,
            dropped: 0,
        }
    }

    /// Change capacity. Clears contents.
    pub fn resize(&mut self, capacity: usize) {
        self.buffer.clear();
        self.buffer.resize(capacity.max(1), 0.0);
        self.read_pos = 0;
        self.write_pos = 0;
        self.available = 0;
        self.dropped = 0;
    }

    /// Drop all stored samples
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.read_pos = 0;
        self.write_pos = 0;
        self.available = 0;
    }

    /// Samples ready to pop
    #[inline]
    pub fn available(&self) -> usize {
        self.available
    }

    /// Maximum number of stored samples
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Free slots before a push starts overwriting
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - self.available
    }

    /// Total samples lost to overflow since the last resize
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Append samples
    ///
    /// When `samples` exceeds the free space the oldest stored samples are
    /// overwritten. A push longer than the whole capacity keeps only its
    /// newest `capacity` samples.
    pub fn push(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let capacity = self.capacity();
        let overflow = (self.available + samples.len()).saturating_sub(capacity);
        self.dropped += overflow as u64;

        let samples = &samples[samples.len().saturating_sub(capacity)..];
        self.write_wrapped(samples);

        self.available = (self.available + samples.len()).min(capacity);
        if overflow > 0 {
            self.read_pos = (self.write_pos + capacity - self.available) % capacity;
        }
    }

    /// Append `count` zero samples
    pub fn push_silence(&mut self, count: usize) {
        let capacity = self.capacity();
        let count = count.min(capacity);
        let overflow = (self.available + count).saturating_sub(capacity);
        self.dropped += overflow as u64;

        let first = count.min(capacity - self.write_pos);
        self.buffer[self.write_pos..self.write_pos + first].fill(0.0);
        self.buffer[..count - first].fill(0.0);
        self.write_pos = (self.write_pos + count) % capacity;

        self.available = (self.available + count).min(capacity);
        if overflow > 0 {
            self.read_pos = (self.write_pos + capacity - self.available) % capacity;
        }
    }

    /// Remove up to `dest.len()` samples in arrival order
    ///
    /// Returns the number of stored samples copied. With `zero_pad` the rest
    /// of `dest` is filled with silence; otherwise it is left untouched.
    pub fn pop(&mut self, dest: &mut [f32], zero_pad: bool) -> usize {
        let to_read = dest.len().min(self.available);
        let capacity = self.capacity();

        let first = to_read.min(capacity - self.read_pos);
        dest[..first].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + first]);
        dest[first..to_read].copy_from_slice(&self.buffer[..to_read - first]);

        self.read_pos = (self.read_pos + to_read) % capacity;
        self.available -= to_read;

        if zero_pad {
            dest[to_read..].fill(0.0);
        }

        to_read
    }

    fn write_wrapped(&mut self, samples: &[f32]) {
        let capacity = self.capacity();
        let first = samples.len().min(capacity - self.write_pos);
        self.buffer[self.write_pos..self.write_pos + first].copy_from_slice(&samples[..first]);
        self.buffer[..samples.len() - first].copy_from_slice(&samples[first..]);
        self.write_pos = (self.write_pos + samples.len()) % capacity;
    }
}
