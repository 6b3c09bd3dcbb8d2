//! Wire-format views and builders for the packet path.
//!
//! Everything here is stateless: parsers are borrowed views over raw
//! buffers that return `None` on malformed input, builders produce
//! complete IPv4 packets ready to write back to the tunnel device.

pub mod dns;
pub mod ipv4;
pub mod tcp;

pub use dns::DnsQuestion;
pub use ipv4::{Ipv4Packet, UdpDatagram};
pub use tcp::TcpSegment;
