//! Trackcast CLI - analyze an audio file and broadcast its event timeline.

use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing::{error, info};
use trackcast::emitter::{self, CancelToken, Outcome};
use trackcast::events::{self, parse_event_filter};
use trackcast::transport::UdpTransport;
use trackcast::{analyzer, timeline, Config, Result, TrackcastError};

#[derive(Parser)]
#[command(name = "trackcast")]
#[command(about = "Analyze an audio file and broadcast its event timeline over UDP", long_about = None)]
struct Cli {
    /// Input audio file (WAV)
    input: Option<PathBuf>,

    /// TOML config file, applied under CLI flags
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated event types to emit (default: beat,onset)
    #[arg(short, long)]
    events: Option<String>,

    /// Enable the primary event set (beat, onset, silence, loudness, energy)
    #[arg(long)]
    primary: bool,

    /// Enable every selectable event type
    #[arg(long)]
    all: bool,

    /// Print the selectable event names and exit
    #[arg(long)]
    list_events: bool,

    /// Multicast group address
    #[arg(short, long)]
    group: Option<Ipv4Addr>,

    /// UDP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Multicast TTL
    #[arg(long)]
    ttl: Option<u32>,

    /// Disable multicast loopback
    #[arg(long)]
    no_loopback: bool,

    /// Outbound interface address for multicast
    #[arg(long)]
    interface: Option<Ipv4Addr>,

    /// Unicast mirror: "host:port", "host", or "gateway"
    #[arg(short, long)]
    unicast: Option<String>,

    /// Pre-roll countdown in seconds before playback
    #[arg(long)]
    preroll: Option<f64>,

    /// Seconds between track.position heartbeats
    #[arg(long)]
    position_interval: Option<f64>,

    /// Minimum seconds between samples of a continuous series
    #[arg(short = 'i', long)]
    interval: Option<f64>,

    /// Analysis sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Analysis frame size in samples
    #[arg(long)]
    frame_size: Option<usize>,

    /// Analysis hop size in samples
    #[arg(long)]
    hop_size: Option<usize>,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut cfg = Config::default();
        if let Some(path) = &self.config {
            cfg.apply_file(path)?;
        }

        if let Some(group) = self.group {
            cfg.multicast_group = group;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(ttl) = self.ttl {
            cfg.ttl = ttl;
        }
        if self.no_loopback {
            cfg.loopback = false;
        }
        if let Some(iface) = self.interface {
            cfg.interface = Some(iface);
        }
        if let Some(unicast) = self.unicast {
            cfg.unicast = Some(unicast);
        }
        if let Some(preroll) = self.preroll {
            cfg.preroll = Some(preroll);
        }
        if let Some(interval) = self.position_interval {
            cfg.position_interval = interval;
        }
        if let Some(interval) = self.interval {
            cfg.continuous_interval = interval;
        }
        if let Some(rate) = self.sample_rate {
            cfg.sample_rate = rate;
        }
        if let Some(size) = self.frame_size {
            cfg.frame_size = size;
        }
        if let Some(hop) = self.hop_size {
            cfg.hop_size = hop;
        }

        // preset precedence: --all over --primary over --events
        if self.all {
            cfg.enabled_events = events::all_events();
        } else if self.primary {
            cfg.enabled_events = events::tier1_events();
        } else if let Some(csv) = &self.events {
            cfg.enabled_events = parse_event_filter(csv);
        }

        if let Some(input) = self.input {
            cfg.input_file = input;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn run(cli: Cli) -> Result<()> {
    let cfg = cli.into_config()?;

    let results = analyzer::analyze(&cfg)?;
    let timeline = timeline::build(&cfg, &results);
    info!(
        "{} events over {:.2}s, {} types enabled",
        timeline.len(),
        results.duration,
        cfg.enabled_events.len()
    );

    let mut transport = UdpTransport::new(&cfg)?;

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel())
            .map_err(|e| TrackcastError::Config(format!("signal handler: {e}")))?;
    }

    match emitter::run(&cfg, &timeline, &mut transport, &cancel) {
        Outcome::Completed => Ok(()),
        Outcome::Aborted => Err(TrackcastError::Interrupted),
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if cli.list_events {
        for name in events::selectable_names() {
            println!("{name}");
        }
        return;
    }

    if let Err(e) = run(cli) {
        // the emitter already reported an interrupt; only failures get logged
        if !matches!(e, TrackcastError::Interrupted) {
            error!("{e}");
        }
        std::process::exit(e.exit_code());
    }
}
