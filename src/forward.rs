//! Upstream DNS forwarding.
//!
//! Permitted queries are relayed to the configured public resolver on
//! a transient socket, one task per query, bounded by the upstream
//! timeout. The raw reply bytes come back unmodified; the packet loop
//! rebuilds the tunnel-side envelope around them.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::config::UpstreamConfig;

/// Keeps forwarding sockets out of the tunnel.
///
/// On platforms where the filter's own routes would capture its
/// upstream traffic, the host must mark the socket to bypass the
/// device. The hook runs after bind, before the first send.
pub trait SocketProtector: Send + Sync {
    /// Mark `socket` so its traffic does not re-enter the tunnel.
    ///
    /// # Errors
    ///
    /// Returns the platform error; the query is then dropped rather
    /// than risk a forwarding loop.
    fn protect(&self, socket: &UdpSocket) -> io::Result<()>;
}

/// Protector for hosts whose routing already excludes upstream
/// traffic from the device (only the resolver and sentinel /32s are
/// routed in).
#[derive(Debug, Default)]
pub struct NoOpProtector;

impl SocketProtector for NoOpProtector {
    fn protect(&self, _socket: &UdpSocket) -> io::Result<()> {
        Ok(())
    }
}

/// Forwarding failure. The caller drops the query; nothing is sent
/// back to the client.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to bind forwarding socket: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to protect forwarding socket: {0}")]
    Protect(#[source] io::Error),

    #[error("upstream send failed: {0}")]
    Send(#[source] io::Error),

    #[error("upstream receive failed: {0}")]
    Receive(#[source] io::Error),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),
}

/// Relays queries to the fixed upstream resolver.
pub struct Forwarder {
    upstream: SocketAddr,
    timeout: Duration,
    protector: Arc<dyn SocketProtector>,
}

impl Forwarder {
    #[must_use]
    pub fn new(config: &UpstreamConfig, protector: Arc<dyn SocketProtector>) -> Self {
        Self {
            upstream: config.resolver,
            timeout: Duration::from_millis(config.timeout_ms),
            protector,
        }
    }

    /// Send `query` upstream and wait for one reply.
    ///
    /// # Errors
    ///
    /// Returns a [`ForwardError`] when the socket cannot be set up,
    /// the exchange fails, or no reply arrives within the timeout.
    pub async fn forward(&self, query: &[u8]) -> Result<Vec<u8>, ForwardError> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(ForwardError::Bind)?;
        self.protector
            .protect(&socket)
            .map_err(ForwardError::Protect)?;

        socket
            .send_to(query, self.upstream)
            .await
            .map_err(ForwardError::Send)?;

        let mut buffer = vec![0u8; 4096];
        let (len, _) = tokio::time::timeout(self.timeout, socket.recv_from(&mut buffer))
            .await
            .map_err(|_| ForwardError::Timeout(self.timeout))?
            .map_err(ForwardError::Receive)?;
        buffer.truncate(len);
        Ok(buffer)
    }
}
