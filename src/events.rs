//! Event catalog: every event type the wire protocol knows about, grouped
//! into categories, with bidirectional name lookup and filter presets.
//!
//! Transport events are always emitted and can never be selected in a filter.
//! Some catalog entries (quality, envelope, fades, tuning, novelty) have no
//! producing analysis pass yet; selecting them is legal and simply yields no
//! events.

use lazy_static::lazy_static;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventType {
    // Transport
    TrackStart,
    TrackEnd,
    TrackPosition,
    TrackAbort,
    TrackPrepare,
    // Beat/Rhythm
    Beat,
    TempoChange,
    Downbeat,
    // Onset
    Onset,
    OnsetRate,
    Novelty,
    // Tonal
    KeyChange,
    ChordChange,
    Chroma,
    Tuning,
    Dissonance,
    Inharmonicity,
    // Pitch/Melody
    Pitch,
    PitchChange,
    Melody,
    // Loudness/Energy
    Loudness,
    LoudnessPeak,
    Energy,
    DynamicChange,
    // Silence/Gap
    SilenceStart,
    SilenceEnd,
    Gap,
    // Spectral
    SpectralCentroid,
    SpectralFlux,
    SpectralComplexity,
    SpectralContrast,
    SpectralRolloff,
    Mfcc,
    TimbreChange,
    // Bands
    BandsMel,
    BandsBark,
    BandsErb,
    Hfc,
    // Structure
    SegmentBoundary,
    FadeIn,
    FadeOut,
    // Quality
    Click,
    Discontinuity,
    NoiseBurst,
    Saturation,
    Hum,
    // Envelope/Transient
    Envelope,
    Attack,
    Decay,
}

/// Category membership, mirroring the catalog groups above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Transport,
    Rhythm,
    Onset,
    Tonal,
    Pitch,
    Loudness,
    Silence,
    Spectral,
    Bands,
    Structure,
    Quality,
    Envelope,
}

/// A set of enabled non-transport event types for one run.
pub type EventFilter = BTreeSet<EventType>;

static CATALOG: &[(EventType, &str, EventCategory)] = &[
    (EventType::TrackStart, "track.start", EventCategory::Transport),
    (EventType::TrackEnd, "track.end", EventCategory::Transport),
    (EventType::TrackPosition, "track.position", EventCategory::Transport),
    (EventType::TrackAbort, "track.abort", EventCategory::Transport),
    (EventType::TrackPrepare, "track.prepare", EventCategory::Transport),
    (EventType::Beat, "beat", EventCategory::Rhythm),
    (EventType::TempoChange, "tempo.change", EventCategory::Rhythm),
    (EventType::Downbeat, "downbeat", EventCategory::Rhythm),
    (EventType::Onset, "onset", EventCategory::Onset),
    (EventType::OnsetRate, "onset.rate", EventCategory::Onset),
    (EventType::Novelty, "novelty", EventCategory::Onset),
    (EventType::KeyChange, "key.change", EventCategory::Tonal),
    (EventType::ChordChange, "chord.change", EventCategory::Tonal),
    (EventType::Chroma, "chroma", EventCategory::Tonal),
    (EventType::Tuning, "tuning", EventCategory::Tonal),
    (EventType::Dissonance, "dissonance", EventCategory::Tonal),
    (EventType::Inharmonicity, "inharmonicity", EventCategory::Tonal),
    (EventType::Pitch, "pitch", EventCategory::Pitch),
    (EventType::PitchChange, "pitch.change", EventCategory::Pitch),
    (EventType::Melody, "melody", EventCategory::Pitch),
    (EventType::Loudness, "loudness", EventCategory::Loudness),
    (EventType::LoudnessPeak, "loudness.peak", EventCategory::Loudness),
    (EventType::Energy, "energy", EventCategory::Loudness),
    (EventType::DynamicChange, "dynamic.change", EventCategory::Loudness),
    (EventType::SilenceStart, "silence.start", EventCategory::Silence),
    (EventType::SilenceEnd, "silence.end", EventCategory::Silence),
    (EventType::Gap, "gap", EventCategory::Silence),
    (EventType::SpectralCentroid, "spectral.centroid", EventCategory::Spectral),
    (EventType::SpectralFlux, "spectral.flux", EventCategory::Spectral),
    (EventType::SpectralComplexity, "spectral.complexity", EventCategory::Spectral),
    (EventType::SpectralContrast, "spectral.contrast", EventCategory::Spectral),
    (EventType::SpectralRolloff, "spectral.rolloff", EventCategory::Spectral),
    (EventType::Mfcc, "mfcc", EventCategory::Spectral),
    (EventType::TimbreChange, "timbre.change", EventCategory::Spectral),
    (EventType::BandsMel, "bands.mel", EventCategory::Bands),
    (EventType::BandsBark, "bands.bark", EventCategory::Bands),
    (EventType::BandsErb, "bands.erb", EventCategory::Bands),
    (EventType::Hfc, "hfc", EventCategory::Bands),
    (EventType::SegmentBoundary, "segment.boundary", EventCategory::Structure),
    (EventType::FadeIn, "fade.in", EventCategory::Structure),
    (EventType::FadeOut, "fade.out", EventCategory::Structure),
    (EventType::Click, "click", EventCategory::Quality),
    (EventType::Discontinuity, "discontinuity", EventCategory::Quality),
    (EventType::NoiseBurst, "noise.burst", EventCategory::Quality),
    (EventType::Saturation, "saturation", EventCategory::Quality),
    (EventType::Hum, "hum", EventCategory::Quality),
    (EventType::Envelope, "envelope", EventCategory::Envelope),
    (EventType::Attack, "attack", EventCategory::Envelope),
    (EventType::Decay, "decay", EventCategory::Envelope),
];

lazy_static! {
    static ref NAME_TO_TYPE: HashMap<&'static str, EventType> =
        CATALOG.iter().map(|&(t, n, _)| (n, t)).collect();
    static ref TYPE_TO_NAME: HashMap<EventType, &'static str> =
        CATALOG.iter().map(|&(t, n, _)| (t, n)).collect();
}

impl EventType {
    pub fn name(self) -> &'static str {
        TYPE_TO_NAME.get(&self).copied().unwrap_or("unknown")
    }

    pub fn from_name(name: &str) -> Option<EventType> {
        NAME_TO_TYPE.get(name).copied()
    }

    pub fn category(self) -> EventCategory {
        CATALOG
            .iter()
            .find(|&&(t, _, _)| t == self)
            .map(|&(_, _, c)| c)
            .unwrap_or(EventCategory::Transport)
    }

    /// Transport events are implicit and always emitted.
    pub fn is_transport(self) -> bool {
        self.category() == EventCategory::Transport
    }
}

/// Every selectable (non-transport) event name, sorted. Used by
/// `--list-events`.
pub fn selectable_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = CATALOG
        .iter()
        .filter(|&&(t, _, _)| !t.is_transport())
        .map(|&(_, n, _)| n)
        .collect();
    names.sort_unstable();
    names
}

/// Backward-compatible default: beat + onset.
pub fn default_events() -> EventFilter {
    [EventType::Beat, EventType::Onset].into_iter().collect()
}

/// Tier 1: beat, onset, silence, loudness, energy.
pub fn tier1_events() -> EventFilter {
    [
        EventType::Beat,
        EventType::Onset,
        EventType::SilenceStart,
        EventType::SilenceEnd,
        EventType::Gap,
        EventType::Loudness,
        EventType::LoudnessPeak,
        EventType::Energy,
        EventType::DynamicChange,
    ]
    .into_iter()
    .collect()
}

/// Tier 2: tier 1 plus tonal, pitch/melody, rhythm extras, spectral, bands
/// and structure.
pub fn tier2_events() -> EventFilter {
    let mut filter = tier1_events();
    filter.extend([
        EventType::KeyChange,
        EventType::ChordChange,
        EventType::Chroma,
        EventType::Tuning,
        EventType::Dissonance,
        EventType::Inharmonicity,
        EventType::Pitch,
        EventType::PitchChange,
        EventType::Melody,
        EventType::TempoChange,
        EventType::Downbeat,
        EventType::OnsetRate,
        EventType::Novelty,
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
        EventType::SegmentBoundary,
        EventType::FadeIn,
        EventType::FadeOut,
    ]);
    filter
}

/// Everything except transport.
pub fn all_events() -> EventFilter {
    CATALOG
        .iter()
        .filter(|&&(t, _, _)| !t.is_transport())
        .map(|&(t, _, _)| t)
        .collect()
}

/// Parse a comma-separated list of event names into a filter.
///
/// Unknown names and transport names are skipped with a warning; the caller
/// must treat an entirely empty result as a configuration error.
pub fn parse_event_filter(csv: &str) -> EventFilter {
    let mut filter = EventFilter::new();
    for token in csv.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match EventType::from_name(token) {
            None => warn!("unknown event type '{token}', skipping"),
            Some(t) if t.is_transport() => {
                warn!("transport event '{token}' is always enabled, skipping")
            }
            Some(t) => {
                filter.insert(t);
            }
        }
    }
    filter
}

/// True if the filter contains any of the given types.
pub fn needs_any(filter: &EventFilter, types: &[EventType]) -> bool {
    types.iter().any(|t| filter.contains(t))
}
