//! IPv4 and UDP parsing and construction.
//!
//! The tunnel device delivers raw IP packets, so there is no link-layer
//! framing to deal with. Parsed views borrow the underlying buffer and
//! validate just enough to make the accessors safe.

// DNS-over-UDP packets are small (512 bytes plus headers), so these
// casts from usize to u16 never truncate.
#![allow(clippy::cast_possible_truncation)]

use std::net::Ipv4Addr;

/// IPv4 header size in bytes (without options).
pub const IPV4_HEADER_SIZE: usize = 20;
/// UDP header size in bytes.
pub const UDP_HEADER_SIZE: usize = 8;
/// IP protocol number for TCP.
pub const PROTO_TCP: u8 = 6;
/// IP protocol number for UDP.
pub const PROTO_UDP: u8 = 17;

/// Borrowed view over an IPv4 packet.
pub struct Ipv4Packet<'a> {
    data: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Packet<'a> {
    /// Parse the buffer as an IPv4 packet.
    ///
    /// Returns `None` when the buffer is too short, the version field is
    /// not 4, or the declared header length exceeds the buffer.
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < IPV4_HEADER_SIZE {
            return None;
        }
        if data[0] >> 4 != 4 {
            return None;
        }
        let header_len = usize::from(data[0] & 0x0F) * 4;
        if header_len < IPV4_HEADER_SIZE || header_len > data.len() {
            return None;
        }
        Some(Self { data, header_len })
    }

    pub fn protocol(&self) -> u8 {
        self.data[9]
    }

    pub fn source(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[12], self.data[13], self.data[14], self.data[15])
    }

    pub fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[16], self.data[17], self.data[18], self.data[19])
    }

    /// Bytes after the IP header.
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.header_len..]
    }
}

/// Borrowed view over a UDP datagram.
pub struct UdpDatagram<'a> {
    data: &'a [u8],
}

impl<'a> UdpDatagram<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < UDP_HEADER_SIZE {
            return None;
        }
        Some(Self { data })
    }

    pub fn source_port(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    pub fn dest_port(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.data[UDP_HEADER_SIZE..]
    }
}

/// Internet checksum: one's complement of the one's-complement sum of
/// the buffer taken as big-endian 16-bit words, an odd trailing byte
/// padded with zero.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [tail] = chunks.remainder() {
        sum += u32::from(u16::from_be_bytes([*tail, 0]));
    }
    // Fold the carries back in until the sum fits in 16 bits.
    while sum >> 16 != 0 {
        sum = (sum >> 16) + (sum & 0xFFFF);
    }
    !(sum as u16)
}

/// Build a complete IPv4+UDP packet carrying `payload`.
///
/// Header fields follow the synthesized-response convention: don't
/// fragment, TTL 64, UDP checksum zero (optional over IPv4).
#[must_use]
pub fn build_udp_packet(
    source: Ipv4Addr,
    source_port: u16,
    dest: Ipv4Addr,
    dest_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = UDP_HEADER_SIZE + payload.len();
    let total_len = IPV4_HEADER_SIZE + udp_len;
    let mut packet = vec![0u8; total_len];

    // IPv4 header
    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    packet[4..6].copy_from_slice(&1u16.to_be_bytes()); // identification
    packet[6] = 0x40; // don't fragment
    packet[8] = 64; // TTL
    packet[9] = PROTO_UDP;
    packet[12..16].copy_from_slice(&source.octets());
    packet[16..20].copy_from_slice(&dest.octets());
    let header_checksum = checksum(&packet[..IPV4_HEADER_SIZE]);
    packet[10..12].copy_from_slice(&header_checksum.to_be_bytes());

    // UDP header
    packet[20..22].copy_from_slice(&source_port.to_be_bytes());
    packet[22..24].copy_from_slice(&dest_port.to_be_bytes());
    packet[24..26].copy_from_slice(&(udp_len as u16).to_be_bytes());
    packet[28..].copy_from_slice(payload);

    packet
}
