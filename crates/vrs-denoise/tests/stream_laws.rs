//! Streaming pipeline laws
//!
//! - Passthrough without a session
//! - Dry bypass at mix = 0
//! - Host → model → host round trip with an identity model
//! - Backend fallback picks the working backend and never re-probes
//! - Interleaved and planar entry points agree

mod common;

use std::sync::atomic::Ordering;

use common::{CountingProbe, IdentityLoader, identity_denoiser, model_file, sine};
use vrs_denoise::{
    Backend, BackendRegistry, SessionManager, StreamDenoiser, StreamState,
};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZE: usize = 512;
const NUM_CHANNELS: usize = 2;

// ═══════════════════════════════════════════════════════════════════════════════
// PASSTHROUGH
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_no_model_is_bit_exact_passthrough() {
    let mut denoiser = StreamDenoiser::new();
    denoiser.prepare(SAMPLE_RATE, NUM_CHANNELS, BLOCK_SIZE).unwrap();
    assert!(!denoiser.is_ready());
    assert_eq!(denoiser.state(), StreamState::PreparedNoSession);

    let left = sine(440.0, SAMPLE_RATE, BLOCK_SIZE, 0.5);
    let right = sine(1234.5, SAMPLE_RATE, BLOCK_SIZE, 0.25);
    let mut buffer = vec![left.clone(), right.clone()];

    for _ in 0..10 {
        denoiser.process_block(&mut buffer, 1.0);
        assert_eq!(buffer[0], left);
        assert_eq!(buffer[1], right);
    }
    assert_eq!(denoiser.latency_samples(), 0);
}

#[test]
fn test_no_model_passthrough_any_mix() {
    let mut denoiser = StreamDenoiser::new();
    denoiser.prepare(44100.0, 1, 300).unwrap();

    let original = sine(997.0, 44100.0, 300, 0.8);
    for mix in [0.0, 0.3, 1.0, 2.5] {
        let mut buffer = [original.clone()];
        denoiser.process_block(&mut buffer, mix);
        assert_eq!(buffer[0], original);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRY BYPASS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_zero_mix_is_dry() {
    let file = model_file();
    let mut denoiser = identity_denoiser(file.path());
    denoiser.prepare(44100.0, NUM_CHANNELS, BLOCK_SIZE).unwrap();
    assert!(denoiser.is_ready());

    let original = sine(440.0, 44100.0, BLOCK_SIZE, 0.7);
    for _ in 0..20 {
        let mut buffer = vec![original.clone(), original.clone()];
        denoiser.process_block(&mut buffer, 0.0);
        assert_eq!(buffer[0], original);
        assert_eq!(buffer[1], original);
    }
    assert_eq!(denoiser.stats().frames_inferred, 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUND TRIP
// ═══════════════════════════════════════════════════════════════════════════════

/// Least-squares fit of `a sin(wk) + b cos(wk)`; returns (amplitude, rms residual)
fn fit_sine(signal: &[f32], start: usize, freq: f64, sample_rate: f64) -> (f64, f64) {
    let w = 2.0 * std::f64::consts::PI * freq / sample_rate;
    let (mut ss, mut sc, mut cc, mut ys, mut yc) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (offset, &y) in signal[start..].iter().enumerate() {
        let k = (start + offset) as f64;
        let (s, c) = (w * k).sin_cos();
        let y = y as f64;
        ss += s * s;
        sc += s * c;
        cc += c * c;
        ys += y * s;
        yc += y * c;
    }
    let det = ss * cc - sc * sc;
    let a = (ys * cc - yc * sc) / det;
    let b = (yc * ss - ys * sc) / det;

    let mut err = 0.0;
    for (offset, &y) in signal[start..].iter().enumerate() {
        let k = (start + offset) as f64;
        let (s, c) = (w * k).sin_cos();
        let e = y as f64 - (a * s + b * c);
        err += e * e;
    }
    let rms = (err / (signal.len() - start) as f64).sqrt();
    ((a * a + b * b).sqrt(), rms)
}

fn round_trip(host_rate: f64, block: usize, freq: f64) {
    let file = model_file();
    let mut denoiser = identity_denoiser(file.path());
    denoiser.prepare(host_rate, 1, block).unwrap();
    assert!(denoiser.is_ready());

    let total = ((host_rate * 0.5) as usize).max(block * 8);
    let input = sine(freq, host_rate, total, 1.0);

    let mut output = Vec::with_capacity(total);
    for chunk in input.chunks(block) {
        let mut buffer = [chunk.to_vec()];
        denoiser.process_block(&mut buffer, 1.0);
        output.extend_from_slice(&buffer[0]);
    }

    let (amplitude, residual) = fit_sine(&output, total / 2, freq, host_rate);
    assert!((amplitude - 1.0).abs() < 0.01, "{host_rate} Hz: amplitude {amplitude}");
    assert!(residual < 1e-3, "{host_rate} Hz: residual {residual}");
    assert_eq!(denoiser.stats().frames_bypassed, 0);
    assert_eq!(denoiser.stats().dropped_samples, 0);
}

#[test]
fn test_round_trip_44100() {
    round_trip(44100.0, BLOCK_SIZE, 1000.0);
}

#[test]
fn test_round_trip_96000() {
    round_trip(96000.0, 256, 1000.0);
}

#[test]
fn test_round_trip_odd_block() {
    round_trip(22050.0, 333, 1000.0);
}

#[test]
fn test_round_trip_low_rate_large_block() {
    round_trip(8000.0, 4096, 200.0);
}

#[test]
fn test_round_trip_huge_block() {
    round_trip(44100.0, 16384, 1000.0);
}

#[test]
fn test_latency_matches_observed_delay() {
    let file = model_file();
    let mut denoiser = identity_denoiser(file.path());
    denoiser.prepare(SAMPLE_RATE, 1, 256).unwrap();
    let latency = denoiser.latency_samples();
    assert!(latency > 0);

    let mut impulse = vec![0.0f32; 4096];
    impulse[100] = 1.0;
    let mut output = Vec::new();
    for chunk in impulse.chunks(256) {
        let mut buffer = [chunk.to_vec()];
        denoiser.process_block(&mut buffer, 1.0);
        output.extend_from_slice(&buffer[0]);
    }

    let peak = output
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(peak, 100 + latency);
}

// ═══════════════════════════════════════════════════════════════════════════════
// BACKEND FALLBACK
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_fallback_selects_working_backend() {
    let file = model_file();
    let (failing, failing_calls) = CountingProbe::new(Backend::Qnn, false);
    let (working, working_calls) = CountingProbe::new(Backend::Cuda, true);

    let registry = BackendRegistry::new(vec![Box::new(failing), Box::new(working)]);
    let sessions = SessionManager::with_components(registry, Box::new(IdentityLoader));
    let mut denoiser = StreamDenoiser::with_session_manager(sessions);
    denoiser.set_model_path(file.path());
    denoiser.prepare(SAMPLE_RATE, NUM_CHANNELS, BLOCK_SIZE).unwrap();

    assert!(denoiser.is_ready());
    assert_eq!(denoiser.active_backend(), Backend::Cuda);
    assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(working_calls.load(Ordering::SeqCst), 1);

    for _ in 0..50 {
        let mut buffer = vec![vec![0.1; BLOCK_SIZE]; NUM_CHANNELS];
        denoiser.process_block(&mut buffer, 1.0);
    }

    assert!(denoiser.stats().frames_inferred > 0);
    assert_eq!(failing_calls.load(Ordering::SeqCst), 1);
    assert_eq!(working_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_no_fallback_stays_in_passthrough() {
    let file = model_file();
    let (failing, failing_calls) = CountingProbe::new(Backend::Qnn, false);
    let (working, working_calls) = CountingProbe::new(Backend::Cpu, true);

    let registry = BackendRegistry::new(vec![Box::new(failing), Box::new(working)]);
    let sessions = SessionManager::with_components(registry, Box::new(IdentityLoader));
    let mut denoiser = StreamDenoiser::with_session_manager(sessions);
    denoiser.set_preferred_backend(Backend::Qnn);
    denoiser.set_allow_fallback(false);
    denoiser.set_model_path(file.path());
    denoiser.prepare(SAMPLE_RATE, 1, BLOCK_SIZE).unwrap();

    assert!(!denoiser.is_ready());
    assert_eq!(denoiser.active_backend(), Backend::Auto);
    assert_eq!(working_calls.load(Ordering::SeqCst), 0);
    assert!(failing_calls.load(Ordering::SeqCst) >= 1);

    // Re-enabling fallback rebuilds the session on the working backend
    denoiser.set_allow_fallback(true);
    assert!(denoiser.is_ready());
    assert_eq!(denoiser.active_backend(), Backend::Cpu);
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTERLEAVED
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_interleaved_matches_planar() {
    let file = model_file();
    let mut planar = identity_denoiser(file.path());
    let mut interleaved = identity_denoiser(file.path());
    planar.prepare(44100.0, NUM_CHANNELS, BLOCK_SIZE).unwrap();
    interleaved.prepare(44100.0, NUM_CHANNELS, BLOCK_SIZE).unwrap();

    let left = sine(440.0, 44100.0, BLOCK_SIZE * 8, 0.5);
    let right = sine(660.0, 44100.0, BLOCK_SIZE * 8, 0.5);

    for (l, r) in left.chunks(BLOCK_SIZE).zip(right.chunks(BLOCK_SIZE)) {
        let mut buffer = vec![l.to_vec(), r.to_vec()];
        planar.process_block(&mut buffer, 0.8);

        let mut data: Vec<f32> = l.iter().zip(r).flat_map(|(a, b)| [*a, *b]).collect();
        interleaved.process_interleaved(&mut data, NUM_CHANNELS, 0.8);

        for i in 0..l.len() {
            assert_eq!(data[i * 2], buffer[0][i]);
            assert_eq!(data[i * 2 + 1], buffer[1][i]);
        }
    }
}
