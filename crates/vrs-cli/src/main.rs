//! VRS Denoise CLI
//!
//! Streams a WAV file through the real-time denoiser in host-sized blocks,
//! exactly as an audio callback would, and writes 32-bit float output.
//!
//! Usage:
//!   vrs-denoise in.wav out.wav --mix 0.8 --backend CPU
//!   vrs-denoise in.wav out.wav --model models/rnnoise_48k.onnx --save-settings

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use vrs_denoise::{DenoiseSettings, StreamDenoiser};

#[derive(Parser, Debug)]
#[command(name = "vrs-denoise", about = "Streaming neural denoiser for WAV files")]
struct Cli {
    /// Input WAV file
    input: PathBuf,

    /// Output WAV file (32-bit float)
    output: PathBuf,

    /// Dry/wet mix, 0 = dry, 1 = fully processed
    #[arg(short, long, default_value_t = 1.0)]
    mix: f32,

    /// Model file (otherwise discovered under <dir>/models/)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Preferred backend: Auto, CPU, DML, QNN, CUDA, ROCM, CoreML
    #[arg(short, long)]
    backend: Option<String>,

    /// Only try the preferred backend
    #[arg(long)]
    no_fallback: bool,

    /// Host block size in frames
    #[arg(long, default_value_t = 512)]
    block_size: usize,

    /// DirectML adapter index
    #[arg(long)]
    device_id: Option<i32>,

    /// QNN accelerator backend library
    #[arg(long)]
    qnn_backend_path: Option<PathBuf>,

    /// Settings file (defaults to the per-user config location)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Persist the effective settings
    #[arg(long)]
    save_settings: bool,

    /// Keep the processing delay instead of trimming it
    #[arg(long)]
    keep_latency: bool,
}

impl Cli {
    /// Command line values layered over stored settings
    fn apply_to(&self, settings: &mut DenoiseSettings) {
        if let Some(model) = &self.model {
            settings.model_path = model.display().to_string();
        }
        if let Some(backend) = &self.backend {
            settings.set_backend(backend.parse().unwrap_or_default());
        }
        if self.no_fallback {
            settings.allow_fallback = false;
        }
        if let Some(device_id) = self.device_id {
            settings.dml_device_id = device_id;
        }
        if let Some(path) = &self.qnn_backend_path {
            settings.qnn_backend_path = path.display().to_string();
        }
    }
}

/// Interleaved audio
struct Audio {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

fn read_wav(path: &Path) -> Result<Audio> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to decode {}", path.display()))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to decode {}", path.display()))?
        }
    };

    Ok(Audio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels as usize,
    })
}

fn write_wav(path: &Path, audio: &Audio) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels as u16,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for &sample in &audio.samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Run the whole file through the denoiser block by block
fn process(denoiser: &mut StreamDenoiser, audio: &Audio, block_size: usize, mix: f32, trim_latency: bool) -> Vec<f32> {
    let channels = audio.channels;
    let latency = if trim_latency { denoiser.latency_samples() } else { 0 };

    let mut padded = audio.samples.clone();
    padded.resize(audio.samples.len() + latency * channels, 0.0);

    for block in padded.chunks_mut(block_size * channels) {
        denoiser.process_interleaved(block, channels, mix);
    }

    padded.drain(..latency * channels);
    padded
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.block_size == 0 {
        bail!("block size must be positive");
    }

    let settings_path = cli.settings.clone().unwrap_or_else(DenoiseSettings::default_path);
    let mut settings = DenoiseSettings::load_from(&settings_path);
    cli.apply_to(&mut settings);
    if cli.save_settings {
        settings
            .save_to(&settings_path)
            .with_context(|| format!("Failed to save settings to {}", settings_path.display()))?;
        log::info!("Settings saved to {}", settings_path.display());
    }

    let audio = read_wav(&cli.input)?;
    if audio.channels == 0 {
        bail!("{} has no channels", cli.input.display());
    }
    log::info!(
        "{}: {} Hz, {} ch, {} frames",
        cli.input.display(),
        audio.sample_rate,
        audio.channels,
        audio.samples.len() / audio.channels
    );

    let mut denoiser = StreamDenoiser::new();
    denoiser.apply_settings(&settings);
    denoiser.prepare(audio.sample_rate as f64, audio.channels, cli.block_size)?;

    if denoiser.is_ready() {
        log::info!(
            "Denoising on {} ({} samples latency)",
            denoiser.active_backend(),
            denoiser.latency_samples()
        );
    } else {
        log::warn!("No model could be loaded, output is a copy of the input");
    }

    let samples = process(&mut denoiser, &audio, cli.block_size, cli.mix, !cli.keep_latency);
    let stats = denoiser.stats();
    log::info!(
        "{} frames inferred, {} bypassed, {} samples dropped",
        stats.frames_inferred,
        stats.frames_bypassed,
        stats.dropped_samples
    );

    write_wav(
        &cli.output,
        &Audio {
            samples,
            sample_rate: audio.sample_rate,
            channels: audio.channels,
        },
    )?;
    log::info!("Wrote {}", cli.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrs_denoise::Backend;

    #[test]
    fn test_cli_overrides_settings() {
        let cli = Cli::parse_from([
            "vrs-denoise",
            "in.wav",
            "out.wav",
            "--backend",
            "directml",
            "--no-fallback",
            "--device-id",
            "2",
            "--model",
            "/models/rnnoise_48k.onnx",
        ]);

        let mut settings = DenoiseSettings::default();
        cli.apply_to(&mut settings);
        assert_eq!(settings.backend(), Backend::DirectMl);
        assert_eq!(settings.provider, "DML");
        assert!(!settings.allow_fallback);
        assert_eq!(settings.dml_device_id, 2);
        assert_eq!(settings.model_path, "/models/rnnoise_48k.onnx");
        assert!(settings.qnn_backend_path.is_empty());
    }

    #[test]
    fn test_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["vrs-denoise", "in.wav", "out.wav"]);
        assert_eq!(cli.mix, 1.0);
        assert_eq!(cli.block_size, 512);

        let mut settings = DenoiseSettings {
            provider: "CUDA".into(),
            ..DenoiseSettings::default()
        };
        cli.apply_to(&mut settings);
        assert_eq!(settings.backend(), Backend::Cuda);
        assert!(settings.allow_fallback);
    }

    #[test]
    fn test_wav_round_trip_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.wav");

        let audio = Audio {
            samples: (0..2000).map(|i| (i as f32 * 0.01).sin() * 0.5).collect(),
            sample_rate: 44100,
            channels: 2,
        };
        write_wav(&input, &audio).unwrap();

        let loaded = read_wav(&input).unwrap();
        assert_eq!(loaded.channels, 2);
        assert_eq!(loaded.sample_rate, 44100);

        // Not prepared: processing leaves the audio untouched
        let mut denoiser = StreamDenoiser::new();
        let processed = process(&mut denoiser, &loaded, 256, 1.0, true);
        assert_eq!(processed, audio.samples);

        write_wav(&output, &Audio { samples: processed, ..loaded }).unwrap();
        assert_eq!(read_wav(&output).unwrap().samples, audio.samples);
    }
}
