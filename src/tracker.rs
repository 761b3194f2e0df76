//! Connection tracking
//!
//! Turns the stream of decoded packets into per-connection request counts.
//! A request is counted when a client→server packet to a monitored port
//! starts with an HTTP method token; the count is resolved when a FIN is
//! seen for the connection.

use std::collections::HashMap;

use crate::capture::{DecodedPacket, Endpoint};

/// Request methods recognized at the start of a payload.
pub const HTTP_METHODS: [&str; 9] = [
    "CONNECT", "DELETE", "GET", "HEAD", "OPTIONS", "PATCH", "POST", "PUT", "TRACE",
];

/// Does the payload begin with an HTTP method token?
///
/// Matching is case-sensitive at offset 0. Payloads shorter than any token
/// simply fail to match; a token split across two packets is not detected.
pub fn starts_with_method(payload: &[u8]) -> bool {
    HTTP_METHODS
        .iter()
        .any(|method| payload.starts_with(method.as_bytes()))
}

/// Connection identity, oriented so `server` is always the monitored-port
/// side regardless of which packet direction was seen first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ConnectionKey {
    client: Endpoint,
    server: Endpoint,
}

/// Emitted once per connection close that carried at least one request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompletedConnection {
    /// The monitored-port side of the connection.
    pub destination: Endpoint,

    /// Requests observed on the connection before it closed.
    pub requests: u64,
}

/// Tracks in-flight request counts keyed by connection identity.
///
/// Designed for a single consumer thread; all per-key updates go through
/// one exclusive map.
#[derive(Debug)]
pub struct ConnectionTracker {
    ports: Vec<u16>,
    in_flight: HashMap<ConnectionKey, u64>,
}

impl ConnectionTracker {
    /// Create a tracker for the given monitored ports.
    pub fn new(ports: Vec<u16>) -> Self {
        Self {
            ports,
            in_flight: HashMap::new(),
        }
    }

    /// Consume one decoded packet, returning a record when the packet
    /// closes a connection that carried requests.
    pub fn process(&mut self, packet: &DecodedPacket) -> Option<CompletedConnection> {
        // Orient: a monitored source port means server→client traffic.
        // When both ports are monitored (proxy chains, port-to-port
        // traffic) the source port wins, so such packets are never
        // counted as requests.
        let (client, server, to_server) = if self.ports.contains(&packet.src.port) {
            (packet.dst, packet.src, false)
        } else {
            (packet.src, packet.dst, self.ports.contains(&packet.dst.port))
        };

        let key = ConnectionKey { client, server };

        if packet.fin {
            let requests = self.in_flight.remove(&key).unwrap_or(0);

            // FIN from the other end, a duplicate, or a half-close
            if requests == 0 {
                return None;
            }

            return Some(CompletedConnection {
                destination: server,
                requests,
            });
        }

        if to_server && starts_with_method(&packet.payload) {
            *self.in_flight.entry(key).or_default() += 1;
        }

        None
    }

    /// Number of connections with unresolved requests.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}
