//! Analysis orchestration: decides which extraction passes the active filter
//! needs, runs them over the decoded file, and collects their outputs into a
//! strongly-typed per-run result struct consumed by the timeline builder.
//!
//! Passes are mutually independent; each writes a disjoint set of result
//! fields. A pass that legitimately finds nothing leaves its fields empty —
//! that is a "no signal" outcome, not an error.

use crate::audio::{self, AudioData};
use crate::config::Config;
use crate::dsp::{
    bark_inverse, bark_scale, erb_inverse, erb_scale, frames, mel_inverse, mel_scale,
    spectral_peaks, Filterbank, SpectrumAnalyzer,
};
use crate::error::Result;
use crate::events::{needs_any, EventFilter, EventType};
use crate::features::{self, KeyEstimate, MfccExtractor};
use tracing::{debug, info};

/// Everything the passes produce for one run. One pass writes each field;
/// only the timeline builder reads them.
#[derive(Debug, Default, Clone)]
pub struct AnalysisResults {
    pub duration: f64,
    pub channels: u32,

    // rhythm pass
    pub beat_ticks: Vec<f32>,
    /// Single overall tracker confidence; zipped 1:1 onto ticks with missing
    /// entries defaulting to zero.
    pub beat_confidence: Vec<f32>,

    // onset pass
    pub onset_times: Vec<f32>,

    // silence pass: first sound frame and last sound frame
    pub silence_bounds: Option<(usize, usize)>,

    // loudness/energy pass
    pub loudness: Vec<f32>,
    pub energy: Vec<f32>,

    // spectral pass
    pub spectral_centroid: Vec<f32>,
    pub spectral_flux: Vec<f32>,
    pub spectral_complexity: Vec<f32>,
    pub spectral_contrast: Vec<Vec<f32>>,
    pub spectral_rolloff: Vec<f32>,
    pub hfc: Vec<f32>,
    pub mfcc: Vec<Vec<f32>>,
    pub bands_mel: Vec<Vec<f32>>,
    pub bands_bark: Vec<Vec<f32>>,
    pub bands_erb: Vec<Vec<f32>>,
    pub chroma: Vec<Vec<f32>>,
    pub key: Option<KeyEstimate>,
    pub chords: Vec<String>,
    pub chord_strengths: Vec<f32>,
    pub dissonance: Vec<f32>,
    pub inharmonicity: Vec<f32>,
    pub pitch: Vec<f32>,
    pub pitch_confidence: Vec<f32>,

    // melody pass (its own hop size)
    pub melody: Vec<f32>,
}

const RHYTHM_TYPES: &[EventType] = &[
    EventType::Beat,
    EventType::TempoChange,
    EventType::Downbeat,
];
const ONSET_TYPES: &[EventType] = &[EventType::Onset, EventType::OnsetRate, EventType::Novelty];
const SILENCE_TYPES: &[EventType] = &[
    EventType::SilenceStart,
    EventType::SilenceEnd,
    EventType::Gap,
];
const LOUDNESS_TYPES: &[EventType] = &[
    EventType::Loudness,
    EventType::LoudnessPeak,
    EventType::Energy,
    EventType::DynamicChange,
];
const SPECTRAL_TYPES: &[EventType] = &[
    EventType::SpectralCentroid,
    EventType::SpectralFlux,
    EventType::SpectralComplexity,
    EventType::SpectralContrast,
    EventType::SpectralRolloff,
    EventType::Mfcc,
    EventType::TimbreChange,
    EventType::BandsMel,
    EventType::BandsBark,
    EventType::BandsErb,
    EventType::Hfc,
    EventType::Chroma,
    EventType::KeyChange,
    EventType::ChordChange,
    EventType::Tuning,
    EventType::Dissonance,
    EventType::Inharmonicity,
    EventType::Pitch,
    EventType::PitchChange,
    EventType::SegmentBoundary,
];

/// Frame-level silence threshold in dB, matching the fixed threshold of the
/// silence operator.
const SILENCE_THRESHOLD_DB: f32 = -60.0;

/// Run all passes the filter requires and return the collected results.
///
/// Decoding happens once up front; an unreadable or undecodable input is
/// fatal before any pass runs. Duration is always measured, filter or not.
pub fn analyze(cfg: &Config) -> Result<AnalysisResults> {
    let audio = audio::load_mono(&cfg.input_file, cfg.sample_rate)?;

    let mut results = AnalysisResults {
        duration: audio.duration(),
        channels: audio.source_channels as u32,
        ..Default::default()
    };

    let filter = &cfg.enabled_events;

    if needs_any(filter, RHYTHM_TYPES) {
        run_rhythm_pass(&audio, &mut results);
    }
    if needs_any(filter, ONSET_TYPES) {
        run_onset_pass(&audio, &mut results);
    }
    if needs_any(filter, SILENCE_TYPES) {
        run_silence_pass(cfg, &audio, &mut results);
    }
    if needs_any(filter, LOUDNESS_TYPES) {
        run_loudness_energy_pass(cfg, &audio, &mut results);
    }
    if needs_any(filter, SPECTRAL_TYPES) {
        run_spectral_pass(cfg, filter, &audio, &mut results);
    }
    if filter.contains(&EventType::Melody) {
        run_melody_pass(&audio, &mut results);
    }

    Ok(results)
}

fn run_rhythm_pass(audio: &AudioData, results: &mut AnalysisResults) {
    info!("analyzing beats");
    let (ticks, confidence) = features::track_beats(&audio.samples, audio.sample_rate);
    debug!("{} beats, confidence {confidence:.3}", ticks.len());
    results.beat_ticks = ticks;
    results.beat_confidence = vec![confidence];
}

fn run_onset_pass(audio: &AudioData, results: &mut AnalysisResults) {
    info!("analyzing onsets");
    results.onset_times = features::detect_onsets(&audio.samples, audio.sample_rate);
    debug!("{} onsets", results.onset_times.len());
}

fn run_silence_pass(cfg: &Config, audio: &AudioData, results: &mut AnalysisResults) {
    info!("analyzing silence");
    let cut = frames(&audio.samples, cfg.frame_size, cfg.hop_size);
    results.silence_bounds = features::start_stop_silence(&cut, SILENCE_THRESHOLD_DB);
    debug!("silence bounds: {:?}", results.silence_bounds);
}

fn run_loudness_energy_pass(cfg: &Config, audio: &AudioData, results: &mut AnalysisResults) {
    info!("analyzing loudness & energy");
    for frame in frames(&audio.samples, cfg.frame_size, cfg.hop_size) {
        results.energy.push(features::frame_energy(&frame));
        results.loudness.push(features::loudness(&frame));
    }
}

/// Shared decode → frame → window → FFT pipeline, fanning out only to the
/// branches the filter asks for. A call-based pipeline simply skips branches
/// no one consumes.
fn run_spectral_pass(
    cfg: &Config,
    filter: &EventFilter,
    audio: &AudioData,
    results: &mut AnalysisResults,
) {
    info!("analyzing spectral features");
    let analyzer = SpectrumAnalyzer::new(cfg.frame_size);
    let n_bins = analyzer.bins();

    let want_centroid = filter.contains(&EventType::SpectralCentroid);
    let want_flux = filter.contains(&EventType::SpectralFlux);
    let want_complexity = filter.contains(&EventType::SpectralComplexity);
    let want_contrast = filter.contains(&EventType::SpectralContrast);
    let want_rolloff = filter.contains(&EventType::SpectralRolloff);
    let want_hfc = filter.contains(&EventType::Hfc);
    let want_mfcc = needs_any(
        filter,
        &[
            EventType::Mfcc,
            EventType::TimbreChange,
            EventType::SegmentBoundary,
        ],
    );
    let want_mel = filter.contains(&EventType::BandsMel);
    let want_bark = filter.contains(&EventType::BandsBark);
    let want_erb = filter.contains(&EventType::BandsErb);
    let want_hpcp = needs_any(
        filter,
        &[
            EventType::Chroma,
            EventType::KeyChange,
            EventType::ChordChange,
            EventType::Tuning,
        ],
    );
    // dissonance and inharmonicity need a peak picker with a frequency
    // floor; 0 Hz peaks would divide by zero
    let want_diss = filter.contains(&EventType::Dissonance);
    let want_inharm = filter.contains(&EventType::Inharmonicity);
    let want_pitch = needs_any(filter, &[EventType::Pitch, EventType::PitchChange]);

    let mfcc_extractor = want_mfcc.then(|| MfccExtractor::new(n_bins, cfg.frame_size, cfg.sample_rate));
    let mel_bank = want_mel.then(|| {
        Filterbank::new(24, n_bins, cfg.frame_size, cfg.sample_rate, mel_scale, mel_inverse)
    });
    let bark_bank = want_bark.then(|| {
        Filterbank::new(27, n_bins, cfg.frame_size, cfg.sample_rate, bark_scale, bark_inverse)
    });
    let erb_bank = want_erb.then(|| {
        Filterbank::new(40, n_bins, cfg.frame_size, cfg.sample_rate, erb_scale, erb_inverse)
    });

    let mut prev_spectrum: Option<Vec<f32>> = None;

    for frame in frames(&audio.samples, cfg.frame_size, cfg.hop_size) {
        let spectrum = analyzer.magnitude_spectrum(&frame);

        if want_centroid {
            results.spectral_centroid.push(features::spectral_centroid(
                &spectrum,
                cfg.frame_size,
                cfg.sample_rate,
            ));
        }
        if want_flux {
            let flux = prev_spectrum
                .as_ref()
                .map(|prev| features::spectral_flux(prev, &spectrum))
                .unwrap_or(0.0);
            results.spectral_flux.push(flux);
        }
        if want_rolloff {
            results.spectral_rolloff.push(features::spectral_rolloff(
                &spectrum,
                cfg.frame_size,
                cfg.sample_rate,
                0.85,
            ));
        }
        if want_hfc {
            results.hfc.push(features::hfc(&spectrum));
        }
        if want_contrast {
            results
                .spectral_contrast
                .push(features::spectral_contrast(&spectrum, 6));
        }
        if let Some(extractor) = &mfcc_extractor {
            results.mfcc.push(extractor.compute(&spectrum));
        }
        if let Some(bank) = &mel_bank {
            results.bands_mel.push(bank.apply(&spectrum));
        }
        if let Some(bank) = &bark_bank {
            results.bands_bark.push(bank.apply(&spectrum));
        }
        if let Some(bank) = &erb_bank {
            results.bands_erb.push(bank.apply(&spectrum));
        }

        if want_complexity || want_hpcp {
            let peaks = spectral_peaks(&spectrum, cfg.frame_size, cfg.sample_rate, 0.0, 100);
            if want_complexity {
                results
                    .spectral_complexity
                    .push(features::spectral_complexity(&peaks));
            }
            if want_hpcp {
                results.chroma.push(features::chroma_from_peaks(&peaks));
            }
        }

        if want_diss || want_inharm {
            let filtered_peaks =
                spectral_peaks(&spectrum, cfg.frame_size, cfg.sample_rate, 20.0, 100);
            if want_diss {
                results.dissonance.push(features::dissonance(&filtered_peaks));
            }
            if want_inharm {
                results
                    .inharmonicity
                    .push(features::inharmonicity(&filtered_peaks));
            }
        }

        if want_pitch {
            let (freq, conf) =
                crate::dsp::autocorr_pitch(&frame, cfg.sample_rate, 80.0, 2000.0);
            results.pitch.push(freq);
            results.pitch_confidence.push(conf);
        }

        if want_flux {
            prev_spectrum = Some(spectrum);
        }
    }

    // key and chords consume the accumulated chroma
    if filter.contains(&EventType::KeyChange) && !results.chroma.is_empty() {
        let dim = 12;
        let mut mean = vec![0.0f32; dim];
        for frame in &results.chroma {
            for (m, &v) in mean.iter_mut().zip(frame) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= results.chroma.len() as f32;
        }
        results.key = features::estimate_key(&mean);
        if let Some(key) = &results.key {
            debug!("key: {} {}", key.key, key.scale);
        }
    }
    if filter.contains(&EventType::ChordChange) && !results.chroma.is_empty() {
        let (labels, strengths) = features::detect_chords(&results.chroma);
        results.chords = labels;
        results.chord_strengths = strengths;
    }
}

fn run_melody_pass(audio: &AudioData, results: &mut AnalysisResults) {
    info!("analyzing melody");
    results.melody = features::melody_contour(&audio.samples, audio.sample_rate);
    debug!("{} melody frames", results.melody.len());
}
