//! TUN device plumbing and the filtering session built on top of it.

pub mod device;
pub mod session;

pub use device::{PacketSink, PacketSource, TunDevice};
pub use session::TunnelFilter;
