//! UDP transport: serialized envelopes go to a multicast group, with an
//! optional unicast mirror for receivers that cannot join the group. Send
//! failures are logged and skipped; a lossy datagram feed must never stop
//! playback.

use crate::config::Config;
use crate::emitter::EventSink;
use crate::error::{Result, TrackcastError};
use crate::wire::Envelope;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, ToSocketAddrs, UdpSocket};
use tracing::{info, warn};

/// Resolves the LAN default gateway for the "gateway" unicast target.
pub trait GatewayLookup {
    fn default_gateway(&self) -> Option<Ipv4Addr>;
}

/// Reads the kernel routing table.
pub struct ProcRouteTable;

impl GatewayLookup for ProcRouteTable {
    fn default_gateway(&self) -> Option<Ipv4Addr> {
        let text = std::fs::read_to_string("/proc/net/route").ok()?;
        parse_route_table(&text)
    }
}

/// Gateway of the all-zero destination route. Fields in /proc/net/route are
/// little-endian hex.
fn parse_route_table(text: &str) -> Option<Ipv4Addr> {
    for line in text.lines().skip(1) {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() >= 3 && cols[1] == "00000000" {
            if let Ok(raw) = u32::from_str_radix(cols[2], 16) {
                if raw != 0 {
                    return Some(Ipv4Addr::from(raw.swap_bytes()));
                }
            }
        }
    }
    None
}

pub struct UdpTransport {
    socket: UdpSocket,
    multicast_target: SocketAddrV4,
    unicast_target: Option<SocketAddr>,
}

impl UdpTransport {
    pub fn new(cfg: &Config) -> Result<Self> {
        Self::with_gateway_lookup(cfg, &ProcRouteTable)
    }

    /// Open and configure the sending socket. Unicast resolution happens
    /// here, once: a target that cannot be resolved logs a single warning
    /// and the mirror stays disabled for the run.
    pub fn with_gateway_lookup(cfg: &Config, lookup: &dyn GatewayLookup) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| TrackcastError::Network(format!("socket: {e}")))?;
        socket
            .set_multicast_ttl_v4(cfg.ttl)
            .map_err(|e| TrackcastError::Network(format!("multicast ttl: {e}")))?;
        socket
            .set_multicast_loop_v4(cfg.loopback)
            .map_err(|e| TrackcastError::Network(format!("multicast loopback: {e}")))?;
        if let Some(iface) = cfg.interface {
            socket
                .set_multicast_if_v4(&iface)
                .map_err(|e| TrackcastError::Network(format!("multicast interface: {e}")))?;
        }
        socket
            .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())
            .map_err(|e| TrackcastError::Network(format!("bind: {e}")))?;

        let multicast_target = SocketAddrV4::new(cfg.multicast_group, cfg.port);
        info!("multicast target {multicast_target}, ttl {}", cfg.ttl);

        let unicast_target = cfg
            .unicast
            .as_deref()
            .and_then(|spec| resolve_unicast(spec, cfg.port, lookup));
        if let Some(target) = unicast_target {
            info!("unicast mirror {target}");
        }

        Ok(Self {
            socket: socket.into(),
            multicast_target,
            unicast_target,
        })
    }
}

/// Resolve a unicast target spec: "host:port", "host" (config port), or
/// "gateway" (default route, config port). Returns None, with a warning, if
/// the spec cannot be resolved.
fn resolve_unicast(spec: &str, default_port: u16, lookup: &dyn GatewayLookup) -> Option<SocketAddr> {
    if spec == "gateway" {
        return match lookup.default_gateway() {
            Some(gw) => Some(SocketAddr::new(gw.into(), default_port)),
            None => {
                warn!("no default gateway found, unicast mirror disabled");
                None
            }
        };
    }

    let candidate = if spec.contains(':') {
        spec.to_string()
    } else {
        format!("{spec}:{default_port}")
    };
    match candidate.to_socket_addrs() {
        Ok(mut addrs) => addrs.next(),
        Err(_) => {
            warn!("cannot resolve unicast target '{spec}', unicast mirror disabled");
            None
        }
    }
}

impl EventSink for UdpTransport {
    fn send(&mut self, envelope: &Envelope) {
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("serialize failed: {e}");
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&bytes, self.multicast_target) {
            warn!("multicast send failed: {e}");
        }
        if let Some(target) = self.unicast_target {
            if let Err(e) = self.socket.send_to(&bytes, target) {
                warn!("unicast send failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::EventPayload;
    use std::time::Duration;

    struct FixedGateway(Option<Ipv4Addr>);

    impl GatewayLookup for FixedGateway {
        fn default_gateway(&self) -> Option<Ipv4Addr> {
            self.0
        }
    }

    #[test]
    fn route_table_yields_default_gateway() {
        let table = "Iface\tDestination\tGateway\tFlags\n\
                     eth0\t00000000\t0101A8C0\t0003\n\
                     eth0\t0001A8C0\t00000000\t0001\n";
        assert_eq!(
            parse_route_table(table),
            Some(Ipv4Addr::new(192, 168, 1, 1))
        );
    }

    #[test]
    fn route_table_without_default_route() {
        let table = "Iface\tDestination\tGateway\tFlags\n\
                     eth0\t0001A8C0\t00000000\t0001\n";
        assert_eq!(parse_route_table(table), None);
    }

    #[test]
    fn unicast_spec_forms() {
        let lookup = FixedGateway(Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(
            resolve_unicast("127.0.0.1:9000", 5000, &lookup),
            Some("127.0.0.1:9000".parse().unwrap())
        );
        assert_eq!(
            resolve_unicast("127.0.0.1", 5000, &lookup),
            Some("127.0.0.1:5000".parse().unwrap())
        );
        assert_eq!(
            resolve_unicast("gateway", 5000, &lookup),
            Some("10.0.0.1:5000".parse().unwrap())
        );
    }

    #[test]
    fn unresolvable_unicast_disables_mirror() {
        let lookup = FixedGateway(None);
        assert_eq!(resolve_unicast("gateway", 5000, &lookup), None);
        assert_eq!(
            resolve_unicast("no.such.host.invalid", 5000, &lookup),
            None
        );
    }

    #[test]
    fn bad_unicast_target_does_not_fail_construction() {
        let mut cfg = Config::default();
        cfg.unicast = Some("gateway".into());
        let transport = UdpTransport::with_gateway_lookup(&cfg, &FixedGateway(None)).unwrap();
        assert!(transport.unicast_target.is_none());
    }

    #[test]
    fn unicast_mirror_delivers_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();

        let mut cfg = Config::default();
        cfg.unicast = Some(format!("127.0.0.1:{port}"));
        let mut transport = UdpTransport::new(&cfg).unwrap();

        let envelope = Envelope::new(1.25, EventPayload::Beat { confidence: 0.5 });
        transport.send(&envelope);

        let mut buf = [0u8; 2048];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let received = Envelope::from_bytes(&buf[..n]).unwrap();
        assert_eq!(received, envelope);
    }
}
