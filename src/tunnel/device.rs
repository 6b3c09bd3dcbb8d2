//! Virtual interface access.
//!
//! The packet loop talks to the device through [`PacketSource`] and
//! [`PacketSink`] so tests can drive it without a real interface.
//! [`TunDevice::open`] provides the production implementation on top
//! of a TUN device.
//!
//! Routing contract: the host routes exactly two /32 targets into the
//! device (the resolver address and the sentinel address). Everything
//! else never reaches the filter.

use std::io::{Read, Write};

use crate::config::TunnelConfig;
use crate::error::TunnelError;

/// Packet-at-a-time read side of the device.
///
/// `recv` returns `WouldBlock` while idle; the read loop polls. Any
/// other error is fatal for the packet loop.
pub trait PacketSource: Send + 'static {
    /// Read one packet into `buffer`, returning its length.
    ///
    /// # Errors
    ///
    /// `WouldBlock` when no packet is pending; other I/O errors when
    /// the device is gone.
    fn recv(&mut self, buffer: &mut [u8]) -> std::io::Result<usize>;
}

/// Packet-at-a-time write side of the device.
pub trait PacketSink: Send + 'static {
    /// Write one complete packet.
    ///
    /// # Errors
    ///
    /// Returns the device I/O error; the caller drops the packet.
    fn send(&mut self, packet: &[u8]) -> std::io::Result<()>;
}

/// Production TUN device.
pub struct TunDevice;

impl TunDevice {
    /// Create and bring up the tunnel interface.
    ///
    /// The device is switched to non-blocking mode; the read loop
    /// polls it so a stop request is noticed while the tunnel is
    /// idle.
    ///
    /// # Errors
    ///
    /// Returns [`TunnelError::DeviceOpen`] when the platform refuses
    /// the device (missing privileges, name collision, missing TUN
    /// support).
    pub fn open(config: &TunnelConfig) -> Result<(DeviceSource, DeviceSink), TunnelError> {
        let mut tun_config = tun::Configuration::default();
        tun_config
            .address(config.address)
            .netmask(config.netmask)
            .mtu(i32::from(config.mtu))
            .up();
        if let Some(name) = &config.name {
            tun_config.name(name);
        }

        let device =
            tun::create(&tun_config).map_err(|error| TunnelError::DeviceOpen(error.to_string()))?;
        device
            .set_nonblock()
            .map_err(|error| TunnelError::DeviceOpen(error.to_string()))?;

        let (reader, writer) = device.split();
        Ok((DeviceSource { reader }, DeviceSink { writer }))
    }
}

/// Read half of the production device.
pub struct DeviceSource {
    reader: tun::platform::posix::Reader,
}

impl PacketSource for DeviceSource {
    fn recv(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buffer)
    }
}

/// Write half of the production device.
pub struct DeviceSink {
    writer: tun::platform::posix::Writer,
}

impl PacketSink for DeviceSink {
    fn send(&mut self, packet: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(packet)
    }
}
