//! Shared DSP primitives for the analysis operators: framing, windowing,
//! magnitude spectra, filterbanks, DCT and pitch autocorrelation.

use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Cut a signal into hop-spaced frames of `frame_size`, zero-padding the
/// tail. Produces `ceil(len / hop)` frames, matching the frame count the
/// timeline builder converts back into times.
pub fn frames(samples: &[f32], frame_size: usize, hop: usize) -> Vec<Vec<f32>> {
    if samples.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(samples.len() / hop + 1);
    let mut start = 0;
    while start < samples.len() {
        let end = (start + frame_size).min(samples.len());
        let mut frame = samples[start..end].to_vec();
        frame.resize(frame_size, 0.0);
        out.push(frame);
        start += hop;
    }
    out
}

pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// FFT wrapper producing magnitude spectra (`frame_size / 2 + 1` bins) of
/// Hann-windowed frames.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    frame_size: usize,
}

impl SpectrumAnalyzer {
    pub fn new(frame_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(frame_size),
            window: hann_window(frame_size),
            frame_size,
        }
    }

    pub fn bins(&self) -> usize {
        self.frame_size / 2 + 1
    }

    pub fn magnitude_spectrum(&self, frame: &[f32]) -> Vec<f32> {
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(&self.window)
            .map(|(&x, &w)| Complex { re: x * w, im: 0.0 })
            .collect();
        buffer.resize(self.frame_size, Complex { re: 0.0, im: 0.0 });
        self.fft.process(&mut buffer);
        buffer[..self.bins()]
            .iter()
            .map(|c| (c.re * c.re + c.im * c.im).sqrt())
            .collect()
    }
}

/// Frequency of spectrum bin `k` for the given analysis parameters.
pub fn bin_freq(k: usize, frame_size: usize, sample_rate: u32) -> f32 {
    k as f32 * sample_rate as f32 / frame_size as f32
}

/// One detected spectral peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub frequency: f32,
    pub magnitude: f32,
}

/// Local-maximum peak picking over a magnitude spectrum, strongest first,
/// capped at `max_peaks`. `min_freq` filters out low bins (the dissonance and
/// inharmonicity operators cannot handle 0 Hz peaks).
pub fn spectral_peaks(
    spectrum: &[f32],
    frame_size: usize,
    sample_rate: u32,
    min_freq: f32,
    max_peaks: usize,
) -> Vec<Peak> {
    let mut peaks = Vec::new();
    for k in 1..spectrum.len().saturating_sub(1) {
        let freq = bin_freq(k, frame_size, sample_rate);
        if freq < min_freq {
            continue;
        }
        if spectrum[k] > spectrum[k - 1] && spectrum[k] > spectrum[k + 1] && spectrum[k] > 0.0 {
            peaks.push(Peak {
                frequency: freq,
                magnitude: spectrum[k],
            });
        }
    }
    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks.truncate(max_peaks);
    peaks.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
    peaks
}

/// DCT-II of `input`, truncated to `n_out` coefficients. Used for MFCC.
pub fn dct_ii(input: &[f32], n_out: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; n_out];
    }
    let mut out = Vec::with_capacity(n_out);
    for k in 0..n_out {
        let mut sum = 0.0f32;
        for (i, &x) in input.iter().enumerate() {
            sum += x * (PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n as f32)).cos();
        }
        out.push(sum);
    }
    out
}

/// Triangular filterbank: `filters[b]` is a list of `(bin, weight)` pairs.
pub struct Filterbank {
    filters: Vec<Vec<(usize, f32)>>,
}

impl Filterbank {
    /// Build a triangular filterbank whose band edges are uniform on an
    /// arbitrary warped frequency scale (mel, bark, ERB).
    pub fn new(
        n_bands: usize,
        n_bins: usize,
        frame_size: usize,
        sample_rate: u32,
        scale: fn(f32) -> f32,
        inverse: fn(f32) -> f32,
    ) -> Self {
        let max_freq = sample_rate as f32 / 2.0;
        let lo = scale(0.0);
        let hi = scale(max_freq);
        // n_bands triangles need n_bands + 2 edge points
        let edges: Vec<f32> = (0..n_bands + 2)
            .map(|i| inverse(lo + (hi - lo) * i as f32 / (n_bands + 1) as f32))
            .collect();

        let mut filters = Vec::with_capacity(n_bands);
        for b in 0..n_bands {
            let (left, center, right) = (edges[b], edges[b + 1], edges[b + 2]);
            let mut taps = Vec::new();
            for k in 0..n_bins {
                let f = bin_freq(k, frame_size, sample_rate);
                let w = if f > left && f <= center {
                    (f - left) / (center - left)
                } else if f > center && f < right {
                    (right - f) / (right - center)
                } else {
                    0.0
                };
                if w > 0.0 {
                    taps.push((k, w));
                }
            }
            filters.push(taps);
        }
        Self { filters }
    }

    /// Per-band energies of a magnitude spectrum.
    pub fn apply(&self, spectrum: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|taps| {
                taps.iter()
                    .map(|&(k, w)| spectrum.get(k).copied().unwrap_or(0.0) * w)
                    .sum()
            })
            .collect()
    }
}

pub fn mel_scale(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub fn mel_inverse(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

pub fn bark_scale(hz: f32) -> f32 {
    13.0 * (0.00076 * hz).atan() + 3.5 * ((hz / 7500.0) * (hz / 7500.0)).atan()
}

/// Numeric inverse of the bark scale (bisection; the scale is monotonic).
pub fn bark_inverse(bark: f32) -> f32 {
    let (mut lo, mut hi) = (0.0f32, 24000.0f32);
    for _ in 0..40 {
        let mid = 0.5 * (lo + hi);
        if bark_scale(mid) < bark {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

pub fn erb_scale(hz: f32) -> f32 {
    21.4 * (1.0 + 0.00437 * hz).log10()
}

pub fn erb_inverse(erb: f32) -> f32 {
    (10.0f32.powf(erb / 21.4) - 1.0) / 0.00437
}

/// Autocorrelation pitch estimate over one frame. Returns frequency and a
/// normalized-correlation confidence; unvoiced frames come back as (0, conf).
pub fn autocorr_pitch(
    frame: &[f32],
    sample_rate: u32,
    min_freq: f32,
    max_freq: f32,
) -> (f32, f32) {
    let min_period = (sample_rate as f32 / max_freq) as usize;
    let max_period = ((sample_rate as f32 / min_freq) as usize).min(frame.len() / 2);
    if min_period == 0 || min_period >= max_period {
        return (0.0, 0.0);
    }

    let mut correlations = Vec::with_capacity(max_period - min_period + 1);
    for period in min_period..=max_period {
        let mut correlation = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for i in 0..frame.len() - period {
            let a = frame[i];
            let b = frame[i + period];
            correlation += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        if norm_a > 0.0 && norm_b > 0.0 {
            correlation /= (norm_a * norm_b).sqrt();
        } else {
            correlation = 0.0;
        }
        correlations.push(correlation);
    }

    let best = correlations.iter().fold(0.0f32, |a, &c| a.max(c));
    if best <= 0.3 {
        return (0.0, best);
    }
    // lags at integer multiples of the true period correlate almost as well
    // as the period itself; take the shortest lag among the near-equal
    // maxima so subharmonics never win
    let idx = correlations
        .iter()
        .position(|&c| c >= best * 0.95)
        .unwrap_or(0);
    (
        sample_rate as f32 / (min_period + idx) as f32,
        correlations[idx],
    )
}
