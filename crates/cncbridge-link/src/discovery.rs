//! UDP discovery of machines on the local network (component B).
//!
//! A single `?` byte is broadcast once; every reply received within the
//! configured window is parsed as a comma-separated ASCII record and
//! collected into a [`MachineInfo`], de-duplicated by `(ip, port)`.
//! Malformed records are dropped silently rather than failing the whole
//! query, since one noisy device on the subnet shouldn't sink discovery
//! for every other one.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;

use cncbridge_core::{DiscoveryError, Result};

/// The UDP payload broadcast to find machines.
const QUERY_PAYLOAD: &[u8] = b"?";

/// Discovery tuning: which port to broadcast on and how long to collect replies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscoveryConfig {
    /// UDP port both the query and replies use.
    pub port: u16,
    /// How long to keep collecting replies after the query is sent.
    pub window: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: 3333,
            window: Duration::from_secs(3),
        }
    }
}

/// One machine's reply to a discovery query.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineInfo {
    /// The machine's advertised name.
    pub name: String,
    /// The address it replied from.
    pub ip: String,
    /// The control port it wants connections on.
    pub port: u16,
    /// Whether it reported itself as already busy with a job.
    pub busy: bool,
}

/// Parse one `<name>,<ip>,<port>,<busy-flag>` record; `None` on any malformed field.
fn parse_record(raw: &str) -> Option<MachineInfo> {
    let mut fields = raw.trim().split(',');
    let name = fields.next()?.to_string();
    let ip = fields.next()?.to_string();
    let port: u16 = fields.next()?.parse().ok()?;
    let busy_field = fields.next()?.trim();
    let busy = busy_field == "1" || busy_field.eq_ignore_ascii_case("true");
    if name.is_empty() || ip.is_empty() {
        return None;
    }
    Some(MachineInfo { name, ip, port, busy })
}

/// Broadcast one discovery query and collect replies for `config.window`,
/// de-duplicated by `(ip, port)`.
pub async fn discover(config: DiscoveryConfig) -> Result<Vec<MachineInfo>> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .await
        .map_err(|e| DiscoveryError::Socket {
            reason: e.to_string(),
        })?;
    socket.set_broadcast(true).map_err(|e| DiscoveryError::Socket {
        reason: e.to_string(),
    })?;

    let broadcast: SocketAddr = (Ipv4Addr::BROADCAST, config.port).into();
    socket
        .send_to(QUERY_PAYLOAD, broadcast)
        .await
        .map_err(|e| DiscoveryError::Socket {
            reason: e.to_string(),
        })?;

    let deadline = Instant::now() + config.window;
    let mut seen: HashMap<(String, u16), MachineInfo> = HashMap::new();
    let mut buf = [0u8; 2048];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((n, _from))) => {
                let text = String::from_utf8_lossy(&buf[..n]);
                if let Some(info) = parse_record(&text) {
                    seen.insert((info.ip.clone(), info.port), info);
                }
            }
            Ok(Err(e)) => {
                return Err(DiscoveryError::Socket {
                    reason: e.to_string(),
                }
                .into())
            }
            Err(_elapsed) => break,
        }
    }

    Ok(seen.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_beacon_port() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.port, 3333);
        assert_eq!(config.window, Duration::from_secs(3));
    }

    #[test]
    fn parses_well_formed_record() {
        let info = parse_record("shop-router,192.168.1.42,23,0").unwrap();
        assert_eq!(info.name, "shop-router");
        assert_eq!(info.ip, "192.168.1.42");
        assert_eq!(info.port, 23);
        assert!(!info.busy);
    }

    #[test]
    fn busy_flag_accepts_one_or_true() {
        assert!(parse_record("m,1.2.3.4,23,1").unwrap().busy);
        assert!(parse_record("m,1.2.3.4,23,true").unwrap().busy);
        assert!(!parse_record("m,1.2.3.4,23,0").unwrap().busy);
    }

    #[test]
    fn malformed_record_is_dropped() {
        assert!(parse_record("missing-fields,1.2.3.4").is_none());
        assert!(parse_record("name,ip,not-a-port,0").is_none());
    }
}
