//! Timeline construction: converts analysis results into a single
//! time-ordered list of envelopes. Continuous series are throttled to the
//! configured sampling interval, derived events are computed from their
//! source series, and transport bookkeeping frames the whole run.

use crate::analyzer::AnalysisResults;
use crate::config::Config;
use crate::events::EventType;
use crate::features::{self, MELODY_HOP};
use crate::wire::{Envelope, EventPayload, Timeline};
use tracing::debug;

/// A local loudness maximum must reach this fraction of the global maximum
/// to count as a peak.
const PEAK_RATIO: f32 = 0.9;
/// Loudness delta threshold for dynamic.change, as a fraction of the global
/// maximum.
const DYNAMIC_RATIO: f32 = 0.3;
/// Euclidean MFCC distance between consecutive frames that flags a timbre
/// change.
const TIMBRE_DISTANCE: f32 = 50.0;
/// Minimum pitch confidence for pitch.change detection.
const PITCH_MIN_CONFIDENCE: f32 = 0.5;
/// Pitch ratio beyond which a step counts as a change (about a semitone).
const PITCH_RATIO: f32 = 1.06;
/// Silent regions shorter than this are ignored.
const MIN_SILENCE_SECS: f64 = 0.05;

/// Build the complete, sorted timeline for one run.
pub fn build(cfg: &Config, results: &AnalysisResults) -> Timeline {
    let mut timeline = Timeline::new();
    let hop_time = cfg.hop_size as f64 / cfg.sample_rate as f64;
    let filter = &cfg.enabled_events;
    let duration = results.duration;

    // pushed first so the stable sort keeps it ahead of other t=0 events
    timeline.push(Envelope::new(
        0.0,
        EventPayload::TrackStart {
            filename: cfg.input_file.display().to_string(),
            duration,
            sample_rate: cfg.sample_rate,
            channels: results.channels,
        },
    ));

    if filter.contains(&EventType::Beat) {
        add_beats(&mut timeline, results);
    }
    if filter.contains(&EventType::Onset) {
        for &t in &results.onset_times {
            timeline.push(Envelope::new(t as f64, EventPayload::Onset { strength: 1.0 }));
        }
    }
    add_silence(cfg, results, &mut timeline, hop_time);
    add_loudness_energy(cfg, results, &mut timeline, hop_time);
    add_spectral(cfg, results, &mut timeline, hop_time);
    add_tonal(cfg, results, &mut timeline, hop_time);
    add_pitch(cfg, results, &mut timeline, hop_time);
    if filter.contains(&EventType::Melody) {
        let melody_hop = MELODY_HOP as f64 / cfg.sample_rate as f64;
        throttled(&results.melody, melody_hop, duration, cfg.continuous_interval, |t, &f| {
            if f > 0.0 {
                timeline.push(Envelope::new(t, EventPayload::Melody { frequency: f as f64 }));
                true
            } else {
                false
            }
        });
    }
    if filter.contains(&EventType::SegmentBoundary) {
        add_segments(results, &mut timeline, hop_time);
    }

    add_bookkeeping(cfg, results, &mut timeline);

    // stable, so same-timestamp events keep insertion order
    timeline.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    debug!("timeline: {} events over {:.2}s", timeline.len(), duration);
    timeline
}

/// Walk a hop-spaced series and offer each due frame to `emit` once at least
/// `interval` seconds have passed since the last accepted emission. `emit`
/// reports whether it emitted; a declined frame (say, unvoiced pitch) leaves
/// the slot open for the next frame. Samples past the track duration are
/// dropped.
fn throttled<T>(
    series: &[T],
    hop_time: f64,
    duration: f64,
    interval: f64,
    mut emit: impl FnMut(f64, &T) -> bool,
) {
    let mut last = f64::NEG_INFINITY;
    for (i, value) in series.iter().enumerate() {
        let t = i as f64 * hop_time;
        if t > duration {
            break;
        }
        if t - last >= interval && emit(t, value) {
            last = t;
        }
    }
}

fn add_beats(timeline: &mut Timeline, results: &AnalysisResults) {
    // one overall confidence; remaining ticks carry zero
    let confs = results
        .beat_confidence
        .iter()
        .copied()
        .chain(std::iter::repeat(0.0));
    for (&tick, conf) in results.beat_ticks.iter().zip(confs) {
        timeline.push(Envelope::new(
            tick as f64,
            EventPayload::Beat {
                confidence: conf as f64,
            },
        ));
    }
}

fn add_silence(cfg: &Config, results: &AnalysisResults, timeline: &mut Timeline, hop_time: f64) {
    let Some((first, last)) = results.silence_bounds else {
        return;
    };
    let filter = &cfg.enabled_events;
    let sound_start = first as f64 * hop_time;
    let sound_stop = last as f64 * hop_time;

    // each silent region yields a start/end pair plus a gap with its length
    let mut region = |from: f64, to: f64| {
        if to - from <= MIN_SILENCE_SECS {
            return;
        }
        if filter.contains(&EventType::SilenceStart) {
            timeline.push(Envelope::new(from, EventPayload::SilenceStart {}));
        }
        if filter.contains(&EventType::SilenceEnd) {
            timeline.push(Envelope::new(to, EventPayload::SilenceEnd {}));
        }
        if filter.contains(&EventType::Gap) {
            timeline.push(Envelope::new(from, EventPayload::Gap { duration: to - from }));
        }
    };

    region(0.0, sound_start); // leading
    region(sound_stop, results.duration); // trailing
}

fn add_loudness_energy(
    cfg: &Config,
    results: &AnalysisResults,
    timeline: &mut Timeline,
    hop_time: f64,
) {
    let filter = &cfg.enabled_events;
    let duration = results.duration;
    let interval = cfg.continuous_interval;

    if filter.contains(&EventType::Loudness) {
        throttled(&results.loudness, hop_time, duration, interval, |t, &v| {
            timeline.push(Envelope::new(t, EventPayload::Loudness { value: v as f64 }));
            true
        });
    }
    if filter.contains(&EventType::Energy) {
        throttled(&results.energy, hop_time, duration, interval, |t, &v| {
            timeline.push(Envelope::new(t, EventPayload::Energy { value: v as f64 }));
            true
        });
    }

    let global_max = results.loudness.iter().copied().fold(0.0f32, f32::max);
    if global_max <= 0.0 {
        return;
    }

    if filter.contains(&EventType::LoudnessPeak) {
        for i in 1..results.loudness.len().saturating_sub(1) {
            let v = results.loudness[i];
            if v > results.loudness[i - 1]
                && v > results.loudness[i + 1]
                && v >= PEAK_RATIO * global_max
            {
                timeline.push(Envelope::new(
                    i as f64 * hop_time,
                    EventPayload::LoudnessPeak { value: v as f64 },
                ));
            }
        }
    }
    if filter.contains(&EventType::DynamicChange) {
        for (i, pair) in results.loudness.windows(2).enumerate() {
            let delta = pair[1] - pair[0];
            if delta.abs() > DYNAMIC_RATIO * global_max {
                timeline.push(Envelope::new(
                    (i + 1) as f64 * hop_time,
                    EventPayload::DynamicChange {
                        magnitude: delta.abs() as f64,
                    },
                ));
            }
        }
    }
}

fn add_spectral(cfg: &Config, results: &AnalysisResults, timeline: &mut Timeline, hop_time: f64) {
    let filter = &cfg.enabled_events;
    let duration = results.duration;
    let interval = cfg.continuous_interval;

    macro_rules! scalar_series {
        ($ty:ident, $series:expr, $variant:ident, $field:ident) => {
            if filter.contains(&EventType::$ty) {
                throttled($series, hop_time, duration, interval, |t, &v| {
                    timeline.push(Envelope::new(t, EventPayload::$variant { $field: v as f64 }));
                    true
                });
            }
        };
    }
    macro_rules! vector_series {
        ($ty:ident, $series:expr, $variant:ident) => {
            if filter.contains(&EventType::$ty) {
                throttled($series, hop_time, duration, interval, |t, v: &Vec<f32>| {
                    timeline.push(Envelope::new(t, EventPayload::$variant { values: v.clone() }));
                    true
                });
            }
        };
    }

    scalar_series!(SpectralCentroid, &results.spectral_centroid, SpectralCentroid, value);
    scalar_series!(SpectralFlux, &results.spectral_flux, SpectralFlux, value);
    scalar_series!(SpectralComplexity, &results.spectral_complexity, SpectralComplexity, value);
    scalar_series!(SpectralRolloff, &results.spectral_rolloff, SpectralRolloff, value);
    scalar_series!(Hfc, &results.hfc, Hfc, value);
    scalar_series!(Dissonance, &results.dissonance, Dissonance, value);
    scalar_series!(Inharmonicity, &results.inharmonicity, Inharmonicity, value);
    vector_series!(SpectralContrast, &results.spectral_contrast, SpectralContrast);
    vector_series!(Mfcc, &results.mfcc, Mfcc);
    vector_series!(BandsMel, &results.bands_mel, BandsMel);
    vector_series!(BandsBark, &results.bands_bark, BandsBark);
    vector_series!(BandsErb, &results.bands_erb, BandsErb);
    vector_series!(Chroma, &results.chroma, Chroma);

    if filter.contains(&EventType::TimbreChange) {
        for (i, pair) in results.mfcc.windows(2).enumerate() {
            let dist: f32 = pair[0]
                .iter()
                .zip(&pair[1])
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            if dist > TIMBRE_DISTANCE {
                timeline.push(Envelope::new(
                    (i + 1) as f64 * hop_time,
                    EventPayload::TimbreChange {
                        distance: dist as f64,
                    },
                ));
            }
        }
    }
}

fn add_tonal(cfg: &Config, results: &AnalysisResults, timeline: &mut Timeline, hop_time: f64) {
    let filter = &cfg.enabled_events;

    // one global estimate, reported at the head of the track
    if filter.contains(&EventType::KeyChange) {
        if let Some(key) = &results.key {
            timeline.push(Envelope::new(
                0.0,
                EventPayload::KeyChange {
                    key: key.key.clone(),
                    scale: key.scale.clone(),
                    strength: key.strength as f64,
                },
            ));
        }
    }

    // run-length compression: one event per chord change, first chord included
    if filter.contains(&EventType::ChordChange) {
        let mut prev: Option<&str> = None;
        for (i, chord) in results.chords.iter().enumerate() {
            if prev != Some(chord.as_str()) {
                let strength = results.chord_strengths.get(i).copied().unwrap_or(0.0);
                timeline.push(Envelope::new(
                    i as f64 * hop_time,
                    EventPayload::ChordChange {
                        chord: chord.clone(),
                        strength: strength as f64,
                    },
                ));
                prev = Some(chord.as_str());
            }
        }
    }
}

fn add_pitch(cfg: &Config, results: &AnalysisResults, timeline: &mut Timeline, hop_time: f64) {
    let filter = &cfg.enabled_events;

    if filter.contains(&EventType::Pitch) {
        let paired: Vec<(f32, f32)> = results
            .pitch
            .iter()
            .copied()
            .zip(results.pitch_confidence.iter().copied())
            .collect();
        throttled(
            &paired,
            hop_time,
            results.duration,
            cfg.continuous_interval,
            |t, &(freq, conf)| {
                if freq > 0.0 {
                    timeline.push(Envelope::new(
                        t,
                        EventPayload::Pitch {
                            frequency: freq as f64,
                            confidence: conf as f64,
                        },
                    ));
                    true
                } else {
                    false
                }
            },
        );
    }

    if filter.contains(&EventType::PitchChange) {
        for i in 1..results.pitch.len() {
            let (from, to) = (results.pitch[i - 1], results.pitch[i]);
            let conf_ok = results.pitch_confidence[i - 1] > PITCH_MIN_CONFIDENCE
                && results.pitch_confidence[i] > PITCH_MIN_CONFIDENCE;
            if !conf_ok || from <= 0.0 || to <= 0.0 {
                continue;
            }
            let ratio = to / from;
            if ratio > PITCH_RATIO || ratio < 1.0 / PITCH_RATIO {
                timeline.push(Envelope::new(
                    i as f64 * hop_time,
                    EventPayload::PitchChange {
                        from_hz: from as f64,
                        to_hz: to as f64,
                    },
                ));
            }
        }
    }
}

fn add_segments(results: &AnalysisResults, timeline: &mut Timeline, hop_time: f64) {
    let boundaries = features::segment_boundaries(&results.mfcc);
    if boundaries.len() < 3 {
        return;
    }
    // interior boundaries only; the track edges are not segment changes
    for &frame in &boundaries[1..boundaries.len() - 1] {
        timeline.push(Envelope::new(
            frame as f64 * hop_time,
            EventPayload::SegmentBoundary {},
        ));
    }
}

/// Transport bookkeeping added to every timeline regardless of filter:
/// position heartbeats on the position interval and track.end at the full
/// duration (track.start went in before the passes so it sorts first).
fn add_bookkeeping(cfg: &Config, results: &AnalysisResults, timeline: &mut Timeline) {
    let mut k = 1u64;
    loop {
        let t = k as f64 * cfg.position_interval;
        if t >= results.duration {
            break;
        }
        timeline.push(Envelope::new(t, EventPayload::TrackPosition { position: t }));
        k += 1;
    }

    timeline.push(Envelope::new(results.duration, EventPayload::TrackEnd {}));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::parse_event_filter;

    fn base_config(events: &str) -> Config {
        Config {
            input_file: "test.wav".into(),
            sample_rate: 44100,
            frame_size: 2048,
            hop_size: 1024,
            continuous_interval: 0.1,
            position_interval: 1.0,
            enabled_events: parse_event_filter(events),
            ..Default::default()
        }
    }

    fn base_results(duration: f64) -> AnalysisResults {
        AnalysisResults {
            duration,
            channels: 2,
            ..Default::default()
        }
    }

    fn is_type(env: &Envelope, ty: EventType) -> bool {
        env.event.event_type() == ty
    }

    #[test]
    fn bookkeeping_frames_every_timeline() {
        let cfg = base_config("beat");
        let results = base_results(3.5);
        let timeline = build(&cfg, &results);

        assert!(matches!(
            timeline.first().map(|e| &e.event),
            Some(EventPayload::TrackStart { .. })
        ));
        assert!(matches!(
            timeline.last().map(|e| &e.event),
            Some(EventPayload::TrackEnd {})
        ));
        let positions: Vec<f64> = timeline
            .iter()
            .filter(|e| is_type(e, EventType::TrackPosition))
            .map(|e| e.timestamp)
            .collect();
        assert_eq!(positions, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn timestamps_are_non_decreasing() {
        let cfg = base_config("beat,loudness");
        let mut results = base_results(2.0);
        results.beat_ticks = vec![0.4, 0.9, 1.4];
        results.beat_confidence = vec![0.8];
        results.loudness = vec![0.5; 80];
        let timeline = build(&cfg, &results);
        for pair in timeline.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn first_beat_carries_confidence() {
        let cfg = base_config("beat");
        let mut results = base_results(2.0);
        results.beat_ticks = vec![0.5, 1.0, 1.5];
        results.beat_confidence = vec![0.9];
        let timeline = build(&cfg, &results);

        let beats: Vec<f64> = timeline
            .iter()
            .filter_map(|e| match &e.event {
                EventPayload::Beat { confidence } => Some(*confidence),
                _ => None,
            })
            .collect();
        assert_eq!(beats.len(), 3);
        // confidence travels as f32, so allow for the widening conversion
        assert!((beats[0] - 0.9).abs() < 1e-6);
        assert_eq!(beats[1], 0.0);
        assert_eq!(beats[2], 0.0);
    }

    #[test]
    fn continuous_series_is_throttled() {
        let cfg = base_config("loudness");
        let mut results = base_results(2.0);
        // hop time ~23ms; without throttling this would be 80 events
        results.loudness = vec![0.5; 80];
        let timeline = build(&cfg, &results);

        let times: Vec<f64> = timeline
            .iter()
            .filter(|e| is_type(e, EventType::Loudness))
            .map(|e| e.timestamp)
            .collect();
        assert!(times.len() < 25);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= cfg.continuous_interval - 1e-9);
        }
    }

    #[test]
    fn unselected_types_never_appear() {
        let cfg = base_config("beat");
        let mut results = base_results(2.0);
        results.loudness = vec![0.9; 50];
        results.energy = vec![0.9; 50];
        let timeline = build(&cfg, &results);
        assert!(!timeline.iter().any(|e| is_type(e, EventType::Loudness)));
        assert!(!timeline.iter().any(|e| is_type(e, EventType::Energy)));
    }

    #[test]
    fn loudness_peak_requires_strict_local_max_near_global() {
        let cfg = base_config("loudness.peak");
        let mut results = base_results(5.0);
        // one qualifying peak at index 2, a sub-threshold bump at index 6
        results.loudness = vec![0.1, 0.5, 1.0, 0.5, 0.1, 0.2, 0.3, 0.2, 0.1];
        let timeline = build(&cfg, &results);
        let peaks: Vec<&Envelope> = timeline
            .iter()
            .filter(|e| is_type(e, EventType::LoudnessPeak))
            .collect();
        assert_eq!(peaks.len(), 1);
        assert!((peaks[0].timestamp - 2.0 * 1024.0 / 44100.0).abs() < 1e-9);
    }

    #[test]
    fn dynamic_change_carries_absolute_magnitude() {
        let cfg = base_config("dynamic.change");
        let mut results = base_results(5.0);
        results.loudness = vec![1.0, 1.0, 0.2, 0.2];
        let timeline = build(&cfg, &results);
        let mags: Vec<f64> = timeline
            .iter()
            .filter_map(|e| match &e.event {
                EventPayload::DynamicChange { magnitude } => Some(*magnitude),
                _ => None,
            })
            .collect();
        // the drop from 1.0 to 0.2 is reported as a positive magnitude
        assert_eq!(mags.len(), 1);
        assert!((mags[0] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn unvoiced_frames_do_not_consume_throttle_slots() {
        let cfg = base_config("pitch");
        let mut results = base_results(2.0);
        let hop_time = 1024.0 / 44100.0;
        // four unvoiced frames, then voiced from frame 4 (~0.093s, inside
        // the first 0.1s throttle window)
        results.pitch = vec![0.0, 0.0, 0.0, 0.0, 440.0, 440.0, 440.0];
        results.pitch_confidence = vec![0.9; 7];
        let timeline = build(&cfg, &results);
        let first = timeline
            .iter()
            .find(|e| is_type(e, EventType::Pitch))
            .expect("no pitch event");
        assert!((first.timestamp - 4.0 * hop_time).abs() < 1e-9);
    }

    #[test]
    fn key_is_a_single_event_at_zero() {
        let cfg = base_config("key.change");
        let mut results = base_results(2.0);
        results.key = Some(crate::features::KeyEstimate {
            key: "A".into(),
            scale: "major".into(),
            strength: 0.8,
        });
        let timeline = build(&cfg, &results);
        let keys: Vec<&Envelope> = timeline
            .iter()
            .filter(|e| is_type(e, EventType::KeyChange))
            .collect();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].timestamp, 0.0);
    }

    #[test]
    fn chord_runs_are_compressed() {
        let cfg = base_config("chord.change");
        let mut results = base_results(2.0);
        results.chords = vec!["Am", "Am", "Am", "C", "C", "Am"]
            .into_iter()
            .map(String::from)
            .collect();
        results.chord_strengths = vec![0.7; 6];
        let timeline = build(&cfg, &results);
        let chords: Vec<String> = timeline
            .iter()
            .filter_map(|e| match &e.event {
                EventPayload::ChordChange { chord, .. } => Some(chord.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(chords, vec!["Am", "C", "Am"]);
    }

    #[test]
    fn pitch_change_requires_confidence_and_ratio() {
        let cfg = base_config("pitch.change");
        let mut results = base_results(2.0);
        results.pitch = vec![440.0, 440.0, 494.0, 494.0, 496.0];
        results.pitch_confidence = vec![0.9, 0.9, 0.9, 0.3, 0.9];
        let timeline = build(&cfg, &results);
        let changes: Vec<(f64, f64)> = timeline
            .iter()
            .filter_map(|e| match &e.event {
                EventPayload::PitchChange { from_hz, to_hz } => Some((*from_hz, *to_hz)),
                _ => None,
            })
            .collect();
        // 440 -> 494 qualifies; the low-confidence and small-ratio steps do not
        assert_eq!(changes.len(), 1);
        assert!((changes[0].0 - 440.0).abs() < 1e-9);
        assert!((changes[0].1 - 494.0).abs() < 1e-9);
    }

    #[test]
    fn silent_regions_report_start_end_and_gap_pairs() {
        let cfg = base_config("silence.start,silence.end,gap");
        let mut results = base_results(5.0);
        // first sound at frame 20 (~0.46s), last at frame 100 (~2.3s)
        results.silence_bounds = Some((20, 100));
        let timeline = build(&cfg, &results);
        let hop_time = 1024.0 / 44100.0;

        let starts: Vec<f64> = timeline
            .iter()
            .filter(|e| is_type(e, EventType::SilenceStart))
            .map(|e| e.timestamp)
            .collect();
        let ends: Vec<f64> = timeline
            .iter()
            .filter(|e| is_type(e, EventType::SilenceEnd))
            .map(|e| e.timestamp)
            .collect();
        // leading region [0, 0.46] and trailing region [2.3, 5.0]
        assert_eq!(starts.len(), 2);
        assert_eq!(ends.len(), 2);
        assert_eq!(starts[0], 0.0);
        assert!((ends[0] - 20.0 * hop_time).abs() < 1e-9);
        assert!((starts[1] - 100.0 * hop_time).abs() < 1e-9);
        assert_eq!(ends[1], 5.0);

        let gaps: Vec<f64> = timeline
            .iter()
            .filter_map(|e| match &e.event {
                EventPayload::Gap { duration } => Some(*duration),
                _ => None,
            })
            .collect();
        assert_eq!(gaps.len(), 2);
        assert!((gaps[0] - 20.0 * hop_time).abs() < 1e-9);
        assert!((gaps[1] - (5.0 - 100.0 * hop_time)).abs() < 1e-9);
    }

    #[test]
    fn immediate_sound_produces_no_silence_events() {
        let cfg = base_config("silence.start,silence.end");
        let mut results = base_results(2.36);
        // sound from the very first frame to within 50ms of the end
        let last = (2.36 * 44100.0 / 1024.0) as usize;
        results.silence_bounds = Some((0, last));
        let timeline = build(&cfg, &results);
        assert!(!timeline.iter().any(|e| is_type(e, EventType::SilenceStart)));
        assert!(!timeline.iter().any(|e| is_type(e, EventType::SilenceEnd)));
    }
}
