//! # Trackcast - Audio Event Timeline Broadcaster
//!
//! Trackcast analyzes an audio file ahead of time, builds a timeline of
//! musical events, then replays that timeline in real time as UDP datagrams
//! so that lighting rigs, visualizers and other listeners on the LAN can
//! react in sync with playback.
//!
//! ## Pipeline
//!
//! - **Analysis**: decode once, run only the extraction passes the event
//!   filter requires (rhythm, onsets, silence, loudness, spectral, melody)
//! - **Timeline**: convert pass results into timestamped envelopes, derive
//!   change events, throttle continuous series, add transport bookkeeping
//! - **Emission**: pace the sorted timeline against the wall clock and send
//!   each envelope to a multicast group (plus an optional unicast mirror)
//!
//! ## Quick Start
//!
//! ```no_run
//! use trackcast::{analyzer, timeline, Config};
//!
//! let mut cfg = Config::default();
//! cfg.input_file = "song.wav".into();
//!
//! let results = analyzer::analyze(&cfg)?;
//! let events = timeline::build(&cfg, &results);
//! println!("{} events over {:.1}s", events.len(), results.duration);
//! # Ok::<(), trackcast::TrackcastError>(())
//! ```

pub mod analyzer;
pub mod audio;
pub mod config;
pub mod dsp;
pub mod emitter;
pub mod error;
pub mod events;
pub mod features;
pub mod timeline;
pub mod transport;
pub mod wire;

pub use config::Config;
pub use emitter::{CancelToken, EventSink, Outcome};
pub use error::{Result, TrackcastError};
pub use wire::{Envelope, EventPayload, Timeline};
