//! Wire envelope: one datagram carries one serialized event, a file-relative
//! timestamp plus exactly one payload variant. Consumers discriminate by the
//! variant tag (the dotted event name).

use crate::events::EventType;
use serde::{Deserialize, Serialize};

/// Top-level message for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub timestamp: f64,
    pub event: EventPayload,
}

impl Envelope {
    pub fn new(timestamp: f64, event: EventPayload) -> Self {
        Self { timestamp, event }
    }

    /// Serialized datagram body.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// One payload variant per catalog entry. Tags are the dotted event names so
/// receivers can dispatch on them directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    // Transport
    #[serde(rename = "track.start")]
    TrackStart {
        filename: String,
        duration: f64,
        sample_rate: u32,
        channels: u32,
    },
    #[serde(rename = "track.end")]
    TrackEnd {},
    #[serde(rename = "track.position")]
    TrackPosition { position: f64 },
    #[serde(rename = "track.abort")]
    TrackAbort { reason: String },
    #[serde(rename = "track.prepare")]
    TrackPrepare { countdown: f64, path: String },

    // Beat/Rhythm
    #[serde(rename = "beat")]
    Beat { confidence: f64 },
    #[serde(rename = "tempo.change")]
    TempoChange { bpm: f64 },
    #[serde(rename = "downbeat")]
    Downbeat { confidence: f64 },

    // Onset
    #[serde(rename = "onset")]
    Onset { strength: f64 },
    #[serde(rename = "onset.rate")]
    OnsetRate { rate: f64 },
    #[serde(rename = "novelty")]
    Novelty { value: f64 },

    // Tonal
    #[serde(rename = "key.change")]
    KeyChange {
        key: String,
        scale: String,
        strength: f64,
    },
    #[serde(rename = "chord.change")]
    ChordChange { chord: String, strength: f64 },
    #[serde(rename = "chroma")]
    Chroma { values: Vec<f32> },
    #[serde(rename = "tuning")]
    Tuning { frequency: f64 },
    #[serde(rename = "dissonance")]
    Dissonance { value: f64 },
    #[serde(rename = "inharmonicity")]
    Inharmonicity { value: f64 },

    // Pitch/Melody
    #[serde(rename = "pitch")]
    Pitch { frequency: f64, confidence: f64 },
    #[serde(rename = "pitch.change")]
    PitchChange { from_hz: f64, to_hz: f64 },
    #[serde(rename = "melody")]
    Melody { frequency: f64 },

    // Loudness/Energy
    #[serde(rename = "loudness")]
    Loudness { value: f64 },
    #[serde(rename = "loudness.peak")]
    LoudnessPeak { value: f64 },
    #[serde(rename = "energy")]
    Energy { value: f64 },
    #[serde(rename = "dynamic.change")]
    DynamicChange { magnitude: f64 },

    // Silence/Gap
    #[serde(rename = "silence.start")]
    SilenceStart {},
    #[serde(rename = "silence.end")]
    SilenceEnd {},
    #[serde(rename = "gap")]
    Gap { duration: f64 },

    // Spectral
    #[serde(rename = "spectral.centroid")]
    SpectralCentroid { value: f64 },
    #[serde(rename = "spectral.flux")]
    SpectralFlux { value: f64 },
    #[serde(rename = "spectral.complexity")]
    SpectralComplexity { value: f64 },
    #[serde(rename = "spectral.contrast")]
    SpectralContrast { values: Vec<f32> },
    #[serde(rename = "spectral.rolloff")]
    SpectralRolloff { value: f64 },
    #[serde(rename = "mfcc")]
    Mfcc { values: Vec<f32> },
    #[serde(rename = "timbre.change")]
    TimbreChange { distance: f64 },

    // Bands
    #[serde(rename = "bands.mel")]
    BandsMel { values: Vec<f32> },
    #[serde(rename = "bands.bark")]
    BandsBark { values: Vec<f32> },
    #[serde(rename = "bands.erb")]
    BandsErb { values: Vec<f32> },
    #[serde(rename = "hfc")]
    Hfc { value: f64 },

    // Structure
    #[serde(rename = "segment.boundary")]
    SegmentBoundary {},
    #[serde(rename = "fade.in")]
    FadeIn { end_time: f64 },
    #[serde(rename = "fade.out")]
    FadeOut { start_time: f64 },

    // Quality
    #[serde(rename = "click")]
    Click {},
    #[serde(rename = "discontinuity")]
    Discontinuity {},
    #[serde(rename = "noise.burst")]
    NoiseBurst {},
    #[serde(rename = "saturation")]
    Saturation { duration: f64 },
    #[serde(rename = "hum")]
    Hum { frequency: f64 },

    // Envelope/Transient
    #[serde(rename = "envelope")]
    Envelope { value: f64 },
    #[serde(rename = "attack")]
    Attack { log_attack_time: f64 },
    #[serde(rename = "decay")]
    Decay { value: f64 },
}

impl EventPayload {
    /// Catalog type of this payload.
    pub fn event_type(&self) -> EventType {
        use EventPayload::*;
        match self {
            TrackStart { .. } => EventType::TrackStart,
            TrackEnd {} => EventType::TrackEnd,
            TrackPosition { .. } => EventType::TrackPosition,
            TrackAbort { .. } => EventType::TrackAbort,
            TrackPrepare { .. } => EventType::TrackPrepare,
            Beat { .. } => EventType::Beat,
            TempoChange { .. } => EventType::TempoChange,
            Downbeat { .. } => EventType::Downbeat,
            Onset { .. } => EventType::Onset,
            OnsetRate { .. } => EventType::OnsetRate,
            Novelty { .. } => EventType::Novelty,
            KeyChange { .. } => EventType::KeyChange,
            ChordChange { .. } => EventType::ChordChange,
            Chroma { .. } => EventType::Chroma,
            Tuning { .. } => EventType::Tuning,
            Dissonance { .. } => EventType::Dissonance,
            Inharmonicity { .. } => EventType::Inharmonicity,
            Pitch { .. } => EventType::Pitch,
            PitchChange { .. } => EventType::PitchChange,
            Melody { .. } => EventType::Melody,
            Loudness { .. } => EventType::Loudness,
            LoudnessPeak { .. } => EventType::LoudnessPeak,
            Energy { .. } => EventType::Energy,
            DynamicChange { .. } => EventType::DynamicChange,
            SilenceStart {} => EventType::SilenceStart,
            SilenceEnd {} => EventType::SilenceEnd,
            Gap { .. } => EventType::Gap,
            SpectralCentroid { .. } => EventType::SpectralCentroid,
            SpectralFlux { .. } => EventType::SpectralFlux,
            SpectralComplexity { .. } => EventType::SpectralComplexity,
            SpectralContrast { .. } => EventType::SpectralContrast,
            SpectralRolloff { .. } => EventType::SpectralRolloff,
            Mfcc { .. } => EventType::Mfcc,
            TimbreChange { .. } => EventType::TimbreChange,
            BandsMel { .. } => EventType::BandsMel,
            BandsBark { .. } => EventType::BandsBark,
            BandsErb { .. } => EventType::BandsErb,
            Hfc { .. } => EventType::Hfc,
            SegmentBoundary {} => EventType::SegmentBoundary,
            FadeIn { .. } => EventType::FadeIn,
            FadeOut { .. } => EventType::FadeOut,
            Click {} => EventType::Click,
            Discontinuity {} => EventType::Discontinuity,
            NoiseBurst {} => EventType::NoiseBurst,
            Saturation { .. } => EventType::Saturation,
            Hum { .. } => EventType::Hum,
            Envelope { .. } => EventType::Envelope,
            Attack { .. } => EventType::Attack,
            Decay { .. } => EventType::Decay,
        }
    }
}

/// Final sorted sequence of events for one analyzed file.
pub type Timeline = Vec<Envelope>;
