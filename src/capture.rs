//! Packet capture and frame decoding
//!
//! Opens live devices or tcpdump capture files through `pcap`, applies the
//! generated BPF filter, and decodes captured frames into
//! [`DecodedPacket`]s with `etherparse`. One capture source is driven by
//! one producer thread ([`capture_loop`]).

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap::{Activated, Capture, Device, Linktype};

use crate::queue::PacketQueue;
use crate::{MonitorError, Result};

/// Capture length: room for the link, IP and TCP headers plus the longest
/// request method token at the start of the payload.
pub const SNAPLEN: i32 = 107;

/// Live-capture read timeout, bounds how long a producer can miss a
/// shutdown request.
const READ_TIMEOUT_MS: i32 = 500;

/// One side of a TCP connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub addr: IpAddr,
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from an address and port.
    pub fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Decoded frame contract consumed by the connection tracker.
#[derive(Clone, Debug)]
pub struct DecodedPacket {
    /// Sending endpoint.
    pub src: Endpoint,

    /// Receiving endpoint.
    pub dst: Endpoint,

    /// TCP FIN flag.
    pub fin: bool,

    /// Raw application payload bytes.
    pub payload: Vec<u8>,
}

/// BPF filter for the monitored ports: request-direction packets plus FIN
/// control packets, to minimize capture volume.
pub fn build_filter(ports: &[u16]) -> String {
    ports
        .iter()
        .map(|port| {
            format!(
                "((tcp dst port {port}) or \
                 (tcp src port {port} and (tcp[tcpflags] & tcp-fin != 0)))"
            )
        })
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Devices monitored when none are configured: the pcap default device and
/// the loopback device, deduplicated.
pub fn default_devices() -> Result<Vec<String>> {
    let devices = Device::list()?;

    if devices.is_empty() {
        return Err(MonitorError::NoDevices);
    }

    let mut names = Vec::new();

    if let Ok(Some(default)) = Device::lookup() {
        names.push(default.name);
    }

    let loopback = devices.iter().find(|device| {
        device.addresses.iter().any(|address| {
            address.addr == IpAddr::V4(Ipv4Addr::LOCALHOST)
                || address.addr == IpAddr::V6(Ipv6Addr::LOCALHOST)
        })
    });

    if let Some(device) = loopback {
        if !names.contains(&device.name) {
            names.push(device.name.clone());
        }
    }

    if names.is_empty() {
        return Err(MonitorError::NoDevices);
    }

    Ok(names)
}

/// An opened capture source: a live device or a tcpdump capture file.
pub struct CaptureSource {
    /// Device name or capture file path.
    pub name: String,

    linktype: Linktype,
    capture: Capture<dyn Activated>,
}

impl CaptureSource {
    /// Open `name` with `filter` applied. A name that is an existing file
    /// opens as a capture file; anything else as a live device.
    pub fn open(name: &str, filter: &str) -> Result<Self> {
        let mut capture: Capture<dyn Activated> = if Path::new(name).is_file() {
            Capture::from_file(name)?.into()
        } else {
            Capture::from_device(name)?
                .snaplen(SNAPLEN)
                .timeout(READ_TIMEOUT_MS)
                .open()?
                .into()
        };

        capture.filter(filter, true)?;
        let linktype = capture.get_datalink();

        Ok(Self {
            name: name.to_string(),
            linktype,
            capture,
        })
    }
}

/// Producer loop: reads frames from `source` until the source is exhausted
/// or `running` clears, enqueueing every decodable TCP packet.
pub fn capture_loop(mut source: CaptureSource, queue: PacketQueue, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match source.capture.next_packet() {
            Ok(frame) => match decode(source.linktype, frame.data) {
                Some(packet) => queue.enqueue(packet),
                None => tracing::trace!(device = %source.name, "skipped undecodable frame"),
            },
            Err(pcap::Error::TimeoutExpired) => continue,
            Err(pcap::Error::NoMorePackets) => break,
            Err(error) => {
                tracing::warn!(device = %source.name, %error, "capture read failed");
                break;
            }
        }
    }

    tracing::debug!(device = %source.name, "capture loop finished");
}

/// Decode a captured frame into endpoints, the FIN flag and the payload.
///
/// Returns `None` for anything that is not a decodable TCP packet.
pub fn decode(linktype: Linktype, frame: &[u8]) -> Option<DecodedPacket> {
    let sliced = if linktype == Linktype::ETHERNET {
        SlicedPacket::from_ethernet(frame).ok()?
    } else if linktype == Linktype::NULL || linktype == Linktype::LOOP {
        // BSD loopback: 4-byte address-family header before the IP packet
        if frame.len() <= 4 {
            return None;
        }
        SlicedPacket::from_ip(&frame[4..]).ok()?
    } else {
        SlicedPacket::from_ip(frame).ok()?
    };

    let (src_addr, dst_addr) = match sliced.net {
        Some(NetSlice::Ipv4(v4)) => (
            IpAddr::V4(v4.header().source_addr()),
            IpAddr::V4(v4.header().destination_addr()),
        ),
        Some(NetSlice::Ipv6(v6)) => (
            IpAddr::V6(v6.header().source_addr()),
            IpAddr::V6(v6.header().destination_addr()),
        ),
        _ => return None,
    };

    let tcp = match sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => tcp,
        _ => return None,
    };

    Some(DecodedPacket {
        src: Endpoint::new(src_addr, tcp.source_port()),
        dst: Endpoint::new(dst_addr, tcp.destination_port()),
        fin: tcp.fin(),
        payload: tcp.payload().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use etherparse::PacketBuilder;

    fn ethernet_frame(src_port: u16, dst_port: u16, fin: bool, payload: &[u8]) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(src_port, dst_port, 0, 1024);

        let builder = if fin { builder.fin() } else { builder };

        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, payload).unwrap();
        frame
    }

    #[test]
    fn test_build_filter() {
        assert_eq!(
            "((tcp dst port 80) or \
             (tcp src port 80 and (tcp[tcpflags] & tcp-fin != 0)))",
            build_filter(&[80])
        );
    }

    #[test]
    fn test_build_filter_multiple_ports() {
        let filter = build_filter(&[80, 8080]);

        assert_eq!(
            "((tcp dst port 80) or \
             (tcp src port 80 and (tcp[tcpflags] & tcp-fin != 0))) or \
             ((tcp dst port 8080) or \
             (tcp src port 8080 and (tcp[tcpflags] & tcp-fin != 0)))",
            filter
        );
    }

    #[test]
    fn test_decode_ethernet() {
        let frame = ethernet_frame(5000, 80, false, b"GET / HTTP/1.1\r\n");

        let packet = decode(Linktype::ETHERNET, &frame).unwrap();

        assert_eq!("10.0.0.1:5000", packet.src.to_string());
        assert_eq!("10.0.0.2:80", packet.dst.to_string());
        assert!(!packet.fin);
        assert_eq!(b"GET / HTTP/1.1\r\n".as_slice(), packet.payload);
    }

    #[test]
    fn test_decode_fin() {
        let frame = ethernet_frame(80, 5000, true, b"");

        let packet = decode(Linktype::ETHERNET, &frame).unwrap();

        assert!(packet.fin);
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_decode_ipv6() {
        let builder = PacketBuilder::ethernet2([1; 6], [2; 6])
            .ipv6([1; 16], [2; 16], 64)
            .tcp(5000, 80, 0, 1024);

        let mut frame = Vec::new();
        builder.write(&mut frame, b"HEAD / HTTP/1.1\r\n").unwrap();

        let packet = decode(Linktype::ETHERNET, &frame).unwrap();

        assert_eq!(80, packet.dst.port);
        assert!(packet.src.addr.is_ipv6());
    }

    #[test]
    fn test_decode_null_linktype() {
        let builder = PacketBuilder::ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64).tcp(5000, 80, 0, 1024);

        let mut ip_packet = Vec::new();
        builder.write(&mut ip_packet, b"").unwrap();

        // 4-byte AF_INET family header
        let mut frame = vec![2, 0, 0, 0];
        frame.extend_from_slice(&ip_packet);

        let packet = decode(Linktype::NULL, &frame).unwrap();

        assert_eq!(80, packet.dst.port);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode(Linktype::ETHERNET, b"bogus").is_none());
        assert!(decode(Linktype::NULL, b"ab").is_none());
    }
}
