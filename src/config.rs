//! Run configuration: built-in defaults, overridden field-by-field by a TOML
//! config file, overridden again by CLI flags. The resulting `Config` is an
//! immutable snapshot for the whole run.

use crate::error::{Result, TrackcastError};
use crate::events::{default_events, EventFilter};
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    // network
    pub multicast_group: Ipv4Addr,
    pub port: u16,
    pub ttl: u32,
    pub loopback: bool,
    pub interface: Option<Ipv4Addr>,
    /// Optional unicast fallback: "host:port", "host" (uses `port`), or
    /// "gateway" to resolve via the default-gateway lookup.
    pub unicast: Option<String>,

    // analysis
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,

    // emission pacing
    pub position_interval: f64,
    pub continuous_interval: f64,
    /// Pre-roll countdown in seconds before playback starts.
    pub preroll: Option<f64>,

    // event filtering
    pub enabled_events: EventFilter,

    // input
    pub input_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            multicast_group: Ipv4Addr::new(239, 255, 0, 1),
            port: 5000,
            ttl: 1,
            loopback: true,
            interface: None,
            unicast: None,
            sample_rate: 44100,
            frame_size: 2048,
            hop_size: 1024,
            position_interval: 1.0,
            continuous_interval: 0.1,
            preroll: None,
            enabled_events: default_events(),
            input_file: PathBuf::new(),
        }
    }
}

impl Config {
    /// Overlay values from a TOML config file. Missing fields keep their
    /// current value; a malformed file is a fatal configuration error.
    pub fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&text)
            .map_err(|e| TrackcastError::Config(format!("{}: {e}", path.display())))?;
        file.apply(self)
    }

    /// Validate cross-field constraints after all layers are merged.
    pub fn validate(&self) -> Result<()> {
        if self.input_file.as_os_str().is_empty() {
            return Err(TrackcastError::Config("no input file specified".into()));
        }
        if self.enabled_events.is_empty() {
            return Err(TrackcastError::Config("no valid events specified".into()));
        }
        if self.sample_rate == 0 {
            return Err(TrackcastError::Config("sample rate must be nonzero".into()));
        }
        if self.frame_size == 0 || self.hop_size == 0 {
            return Err(TrackcastError::Config(
                "frame size and hop size must be nonzero".into(),
            ));
        }
        if self.continuous_interval < 0.0 || self.position_interval <= 0.0 {
            return Err(TrackcastError::Config("intervals must be positive".into()));
        }
        if self.preroll.map_or(false, |p| p < 0.0) {
            return Err(TrackcastError::Config("pre-roll must be non-negative".into()));
        }
        Ok(())
    }
}

/// TOML file layout. Every field is optional; sections mirror the config
/// groups.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    network: NetworkSection,
    #[serde(default)]
    analysis: AnalysisSection,
    #[serde(default)]
    transport: TransportSection,
    #[serde(default)]
    events: EventsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct NetworkSection {
    multicast_group: Option<String>,
    port: Option<u16>,
    ttl: Option<u32>,
    loopback: Option<bool>,
    interface: Option<String>,
    unicast: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnalysisSection {
    sample_rate: Option<u32>,
    frame_size: Option<usize>,
    hop_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TransportSection {
    position_interval: Option<f64>,
    preroll: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EventsSection {
    continuous_interval: Option<f64>,
}

fn parse_addr(s: &str, what: &str) -> Result<Ipv4Addr> {
    s.parse()
        .map_err(|_| TrackcastError::Config(format!("invalid {what} address '{s}'")))
}

impl FileConfig {
    fn apply(self, cfg: &mut Config) -> Result<()> {
        if let Some(group) = self.network.multicast_group {
            cfg.multicast_group = parse_addr(&group, "multicast group")?;
        }
        if let Some(port) = self.network.port {
            cfg.port = port;
        }
        if let Some(ttl) = self.network.ttl {
            cfg.ttl = ttl;
        }
        if let Some(loopback) = self.network.loopback {
            cfg.loopback = loopback;
        }
        if let Some(iface) = self.network.interface {
            cfg.interface = Some(parse_addr(&iface, "interface")?);
        }
        if let Some(unicast) = self.network.unicast {
            cfg.unicast = Some(unicast);
        }
        if let Some(rate) = self.analysis.sample_rate {
            cfg.sample_rate = rate;
        }
        if let Some(size) = self.analysis.frame_size {
            cfg.frame_size = size;
        }
        if let Some(hop) = self.analysis.hop_size {
            cfg.hop_size = hop;
        }
        if let Some(interval) = self.transport.position_interval {
            cfg.position_interval = interval;
        }
        if let Some(preroll) = self.transport.preroll {
            cfg.preroll = Some(preroll);
        }
        if let Some(interval) = self.events.continuous_interval {
            cfg.continuous_interval = interval;
        }
        Ok(())
    }
}
