//! TCP segment parsing and RST construction.
//!
//! The filter never proxies TCP. Any SYN that reaches the tunnel is
//! answered with an immediate RST+ACK so the client fails fast instead
//! of timing out against a black hole.

#![allow(clippy::cast_possible_truncation)]

use std::net::Ipv4Addr;

use super::ipv4::{checksum, IPV4_HEADER_SIZE, PROTO_TCP};

/// TCP header size in bytes (without options).
pub const TCP_HEADER_SIZE: usize = 20;

/// Borrowed view over a TCP segment.
pub struct TcpSegment<'a> {
    data: &'a [u8],
}

impl<'a> TcpSegment<'a> {
    pub fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < TCP_HEADER_SIZE {
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

    pub fn sequence(&self) -> u32 {
        u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]])
    }

    pub fn is_syn(&self) -> bool {
        self.data[13] & 0x02 != 0
    }
}

/// Build a 40-byte IPv4+TCP RST+ACK.
///
/// `ack` must be the peer's sequence number plus one. The transport
/// checksum is left zero; the reset travels only across the local
/// tunnel device, which does not verify it.
#[must_use]
pub fn build_rst_packet(
    source: Ipv4Addr,
    source_port: u16,
    dest: Ipv4Addr,
    dest_port: u16,
    ack: u32,
) -> Vec<u8> {
    let total_len = IPV4_HEADER_SIZE + TCP_HEADER_SIZE;
    let mut packet = vec![0u8; total_len];

    // IPv4 header
    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    packet[4..6].copy_from_slice(&2u16.to_be_bytes()); // identification
    packet[6] = 0x40; // don't fragment
    packet[8] = 64; // TTL
    packet[9] = PROTO_TCP;
    packet[12..16].copy_from_slice(&source.octets());
    packet[16..20].copy_from_slice(&dest.octets());
    let header_checksum = checksum(&packet[..IPV4_HEADER_SIZE]);
    packet[10..12].copy_from_slice(&header_checksum.to_be_bytes());

    // TCP header
    packet[20..22].copy_from_slice(&source_port.to_be_bytes());
    packet[22..24].copy_from_slice(&dest_port.to_be_bytes());
    // sequence stays zero
    packet[28..32].copy_from_slice(&ack.to_be_bytes());
    packet[32] = 0x50; // data offset 5, no options
    packet[33] = 0x14; // RST | ACK
    // window stays zero

    packet
}
