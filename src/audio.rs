//! Audio input: WAV decode, mono mixdown and resampling to the analysis rate.

use crate::error::Result;
use std::path::Path;
use tracing::debug;

/// Decoded mono audio for one run.
#[derive(Debug, Clone)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Channel count of the source file, before mixdown.
    pub source_channels: u16,
}

impl AudioData {
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Load a WAV file, mix to mono and resample to `target_rate`.
///
/// An unreadable or undecodable file is fatal; this runs before any pass and
/// before any network activity.
pub fn load_mono(path: &Path, target_rate: u32) -> Result<AudioData> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    debug!(
        "decoding {}: {} ch, {} Hz, {} bits",
        path.display(),
        spec.channels,
        spec.sample_rate,
        spec.bits_per_sample
    );

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let mono: Vec<f32> = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / spec.channels as f32)
            .collect()
    } else {
        samples
    };

    let resampled = if spec.sample_rate == target_rate {
        mono
    } else {
        resample_linear(&mono, spec.sample_rate, target_rate)
    };

    Ok(AudioData {
        samples: resampled,
        sample_rate: target_rate,
        source_channels: spec.channels,
    })
}

/// Linear-interpolation resampler. Quality is secondary here; the analysis
/// operators only need a consistent rate.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if input.is_empty() {
        return Vec::new();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (input.len() as f64 / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = input[idx.min(input.len() - 1)];
        let b = input[(idx + 1).min(input.len() - 1)];
        out.push(a + (b - a) * frac);
    }
    out
}
