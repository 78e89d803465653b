//! Rate bridge
//!
//! Streaming sample-rate converter used on both sides of the model. The
//! conversion ratio is passed on every call so a host rate change never
//! reallocates, and the interpolation phase carries across calls so blocks
//! splice without discontinuities.
//!
//! ## Interpolation
//!
//! 4-point, 3rd-order Lagrange over the newest four input samples. Output
//! sample positions advance by `ratio` input samples; the fractional phase
//! is kept in `[0, 1)` between history taps 1 and 2, giving a fixed delay of
//! two input samples.

/// Stateful streaming interpolator
#[derive(Debug, Clone)]
pub struct RateBridge {
    /// Newest input sample at index 3
    history: [f32; 4],
    /// Position of the next output sample relative to `history[1]`,
    /// in input samples. `>= 1` means more input must be consumed first.
    phase: f64,
}

impl Default for RateBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl RateBridge {
    /// Input delay introduced by the interpolator, in input samples
    pub const DELAY: usize = 2;

    pub fn new() -> Self {
        Self {
            history: [0.0; 4],
            phase: 1.0,
        }
    }

    /// Clear phase state to silence
    pub fn reset(&mut self) {
        self.history = [0.0; 4];
        self.phase = 1.0;
    }

    /// Convert `input` into `output`
    ///
    /// `ratio` is input samples per output sample (`R_in / R_out`). All of
    /// `input` is consumed as long as `output` has room for
    /// `ceil(input.len() / ratio)` samples. Returns the number of samples
    /// written, which need not equal `input.len() / ratio`.
    pub fn process(&mut self, ratio: f64, input: &[f32], output: &mut [f32]) -> usize {
        if !(ratio > 0.0) {
            return 0;
        }

        let mut consumed = 0;
        let mut produced = 0;

        loop {
            while self.phase >= 1.0 {
                let Some(&sample) = input.get(consumed) else {
                    return produced;
                };
                self.history.copy_within(1.., 0);
                self.history[3] = sample;
                consumed += 1;
                self.phase -= 1.0;
            }

            if produced == output.len() {
                return produced;
            }

            output[produced] = self.interpolate(self.phase as f32);
            produced += 1;
            self.phase += ratio;
        }
    }

    /// Exact number of input samples `process` consumes to emit `count`
    /// output samples from the current phase
    pub fn input_required(&self, ratio: f64, count: usize) -> usize {
        if count == 0 || !(ratio > 0.0) {
            return 0;
        }

        let mut phase = self.phase;
        let mut required = 0;
        let mut produced = 0;

        while produced < count {
            while phase >= 1.0 {
                required += 1;
                phase -= 1.0;
            }
            produced += 1;
            phase += ratio;
        }
        required
    }

    #[inline]
    fn interpolate(&self, t: f32) -> f32 {
        let [xm1, x0, x1, x2] = self.history;

        let c0 = -t * (t - 1.0) * (t - 2.0) / 6.0;
        let c1 = (t + 1.0) * (t - 1.0) * (t - 2.0) / 2.0;
        let c2 = -(t + 1.0) * t * (t - 2.0) / 2.0;
        let c3 = (t + 1.0) * t * (t - 1.0) / 6.0;

        c0 * xm1 + c1 * x0 + c2 * x1 + c3 * x2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_unity_ratio_is_pure_delay() {
        let mut bridge = RateBridge::new();
        let input: Vec<f32> = (1..=16).map(|i| i as f32).collect();
        let mut output = vec![0.0; 16];

        let produced = bridge.process(1.0, &input, &mut output);
        assert_eq!(produced, 16);
        assert_eq!(output[0], 0.0);
        assert_eq!(output[1], 0.0);
        for i in RateBridge::DELAY..16 {
            assert_relative_eq!(output[i], input[i - RateBridge::DELAY], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_produced_count_tracks_ratio() {
        let mut bridge = RateBridge::new();
        let ratio = 44_100.0 / 48_000.0;
        let input = vec![0.0; 441];
        let mut output = vec![0.0; 1024];

        let mut total = 0;
        for _ in 0..100 {
            let produced = bridge.process(ratio, &input, &mut output);
            assert!(produced <= (441.0 / ratio).ceil() as usize + 1);
            total += produced;
        }
        let expected = 44_100.0 / ratio;
        assert!((total as f64 - expected).abs() <= 2.0);
    }

    #[test]
    fn test_input_required_matches_process() {
        let ratio = 48_000.0 / 44_100.0;
        let mut bridge = RateBridge::new();
        let mut output = vec![0.0; 512];

        for block in [512usize, 1, 17, 256, 480, 511] {
            let required = bridge.input_required(ratio, block);
            assert!(required <= (block as f64 * ratio).ceil() as usize + 1);

            let input = vec![0.25; required];
            let produced = bridge.process(ratio, &input, &mut output[..block]);
            assert_eq!(produced, block);
        }
    }

    #[test]
    fn test_linear_ramp_is_reproduced() {
        // Cubic interpolation is exact on polynomials up to degree 3.
        let mut bridge = RateBridge::new();
        let ratio = 0.75;
        let input: Vec<f32> = (0..64).map(|i| i as f32).collect();
        let mut output = vec![0.0; 128];

        let produced = bridge.process(ratio, &input, &mut output);
        assert!(produced > 64);
        // Output k sits at input position k * ratio - DELAY; skip the
        // outputs whose taps still reach into the initial silence.
        for (k, &y) in output[..produced].iter().enumerate().skip(8) {
            let position = k as f32 * ratio as f32 - RateBridge::DELAY as f32;
            assert_relative_eq!(y, position, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_block_splicing_is_seamless() {
        let ratio = 44_100.0 / 48_000.0;
        let signal: Vec<f32> = (0..4096)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 44_100.0).sin())
            .collect();

        let mut whole = RateBridge::new();
        let mut expected = vec![0.0; 8192];
        let n = whole.process(ratio, &signal, &mut expected);

        let mut split = RateBridge::new();
        let mut actual = Vec::new();
        let mut scratch = vec![0.0; 8192];
        for chunk in signal.chunks(333) {
            let produced = split.process(ratio, chunk, &mut scratch);
            actual.extend_from_slice(&scratch[..produced]);
        }

        assert_eq!(actual.len(), n);
        for (a, e) in actual.iter().zip(&expected[..n]) {
            assert_relative_eq!(*a, *e, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_reset_restores_silence() {
        let mut bridge = RateBridge::new();
        let mut out = [0.0; 8];
        bridge.process(1.0, &[1.0; 8], &mut out);
        bridge.reset();

        bridge.process(1.0, &[0.0; 8], &mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_invalid_ratio_produces_nothing() {
        let mut bridge = RateBridge::new();
        let mut out = [0.0; 8];
        assert_eq!(bridge.process(0.0, &[1.0; 8], &mut out), 0);
        assert_eq!(bridge.process(f64::NAN, &[1.0; 8], &mut out), 0);
        assert_eq!(bridge.input_required(-1.0, 8), 0);
    }
}
