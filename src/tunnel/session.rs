//! Tunnel lifecycle and the packet loop.
//!
//! [`TunnelFilter`] owns one filtering session: a blocking reader task
//! pulls packets off the device into a bounded channel, an async
//! session task classifies and answers them, and a one-shot task loads
//! the blocklists and arms the filter. Until arming completes every
//! non-whitelisted query is answered with a server failure, so nothing
//! leaks during startup.
//!
//! Responses and forwarded replies share one serialized writer, since
//! upstream replies land on separate tasks.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::blocklist::ListStore;
use crate::classify::{classify, normalize, SuffixPolicy, Verdict};
use crate::config::{Config, TunnelConfig};
use crate::forward::Forwarder;
use crate::notify::BlockNotifier;
use crate::packet::ipv4::{build_udp_packet, PROTO_TCP, PROTO_UDP};
use crate::packet::tcp::build_rst_packet;
use crate::packet::{DnsQuestion, Ipv4Packet, TcpSegment, UdpDatagram};
use crate::status::FilterStatus;
use crate::tunnel::device::{PacketSink, PacketSource};

const DNS_PORT: u16 = 53;

/// How long the reader sleeps when the device has nothing pending.
/// Also bounds how quickly a stop request is noticed on an idle tunnel.
const IDLE_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Stopped,
    Running,
}

/// One filtering session over a tunnel device.
///
/// `start` and `stop` are idempotent; a second start while running is
/// ignored, so at most one packet loop exists at a time.
pub struct TunnelFilter {
    tunnel: TunnelConfig,
    policy: SuffixPolicy,
    store: Arc<ListStore>,
    status: Arc<FilterStatus>,
    notifier: Arc<BlockNotifier>,
    forwarder: Arc<Forwarder>,
    state: Arc<Mutex<Lifecycle>>,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TunnelFilter {
    #[must_use]
    pub fn new(
        config: &Config,
        store: Arc<ListStore>,
        status: Arc<FilterStatus>,
        notifier: Arc<BlockNotifier>,
        forwarder: Arc<Forwarder>,
    ) -> Self {
        Self {
            tunnel: config.tunnel.clone(),
            policy: SuffixPolicy::new(
                config.filter.whitelist_suffixes.clone(),
                config.filter.infrastructure_suffixes.clone(),
            ),
            store,
            status,
            notifier,
            forwarder,
            state: Arc::new(Mutex::new(Lifecycle::Stopped)),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the packet loop over `source` and `sink`.
    ///
    /// Spawns the reader, the session and the list-loading task, then
    /// returns. The filter answers queries immediately; it arms (and
    /// stops deferring) once the lists finish loading. Ignored when
    /// already running.
    pub fn start<S, K>(&self, source: S, sink: K)
    where
        S: PacketSource,
        K: PacketSink,
    {
        let mut state = self.state.lock();
        if *state == Lifecycle::Running {
            debug!("filter already running, ignoring start");
            return;
        }

        self.running.store(true, Ordering::SeqCst);
        self.status.set_running(true);
        self.status.set_armed(false);
        info!(
            device_address = %self.tunnel.address,
            resolver = %self.tunnel.resolver_address,
            sentinel = %self.tunnel.sentinel_address,
            "starting filter"
        );

        let (packets_tx, packets_rx) = mpsc::channel(self.tunnel.channel_capacity);
        let mut tasks = self.tasks.lock();

        let store = Arc::clone(&self.store);
        let status = Arc::clone(&self.status);
        tasks.push(tokio::spawn(async move {
            match store.load_all().await {
                Ok(count) => {
                    status.set_armed(true);
                    info!(domains = count, "blocklists loaded, filter armed");
                }
                Err(error) => {
                    error!(error = %error, "blocklist load failed, queries stay deferred");
                }
            }
        }));

        let running = Arc::clone(&self.running);
        let buffer_size = usize::from(self.tunnel.mtu);
        tasks.push(tokio::task::spawn_blocking(move || {
            run_reader(source, &packets_tx, &running, buffer_size);
        }));

        let pipeline = Pipeline {
            policy: self.policy.clone(),
            sentinel: self.tunnel.sentinel_address,
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            forwarder: Arc::clone(&self.forwarder),
            sink: Arc::new(Mutex::new(sink)),
        };
        let running = Arc::clone(&self.running);
        let status = Arc::clone(&self.status);
        let lifecycle = Arc::clone(&self.state);
        tasks.push(tokio::spawn(async move {
            run_session(packets_rx, &pipeline, &running).await;
            // Reached through stop(), but also when the device dies;
            // either way the filter is down and may be restarted.
            running.store(false, Ordering::SeqCst);
            status.set_running(false);
            status.set_armed(false);
            *lifecycle.lock() = Lifecycle::Stopped;
        }));

        *state = Lifecycle::Running;
    }

    /// Stop the packet loop and wait for its tasks to finish.
    ///
    /// Ignored when already stopped. In-flight upstream queries are
    /// abandoned; their late replies are dropped.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == Lifecycle::Stopped {
                return;
            }
            *state = Lifecycle::Stopped;
        }
        self.running.store(false, Ordering::SeqCst);

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        self.status.set_running(false);
        self.status.set_armed(false);
        info!("filter stopped");
    }
}

/// Blocking read loop: device to channel.
///
/// Exits when the running flag clears, the session side hangs up, or
/// the device fails. Dropping the sender is what ends the session loop.
fn run_reader<S: PacketSource>(
    mut source: S,
    packets: &mpsc::Sender<Vec<u8>>,
    running: &AtomicBool,
    buffer_size: usize,
) {
    let mut buffer = vec![0u8; buffer_size];
    while running.load(Ordering::SeqCst) {
        match source.recv(&mut buffer) {
            Ok(0) => {}
            Ok(len) => {
                if packets.blocking_send(buffer[..len].to_vec()).is_err() {
                    break;
                }
            }
            Err(error) if error.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(IDLE_POLL);
            }
            Err(error) if error.kind() == std::io::ErrorKind::Interrupted => {}
            Err(error) => {
                error!(error = %error, "device read failed, leaving packet loop");
                break;
            }
        }
    }
    debug!("packet reader finished");
}

/// Async session loop: channel to verdicts.
async fn run_session<K: PacketSink>(
    mut packets: mpsc::Receiver<Vec<u8>>,
    pipeline: &Pipeline<K>,
    running: &AtomicBool,
) {
    info!("packet session started");
    while running.load(Ordering::SeqCst) {
        let Some(packet) = packets.recv().await else {
            break;
        };
        pipeline.handle_packet(&packet);
    }
    debug!("packet session finished");
}

/// Per-packet classification and response.
struct Pipeline<K: PacketSink> {
    policy: SuffixPolicy,
    sentinel: Ipv4Addr,
    store: Arc<ListStore>,
    notifier: Arc<BlockNotifier>,
    forwarder: Arc<Forwarder>,
    sink: Arc<Mutex<K>>,
}

impl<K: PacketSink> Pipeline<K> {
    fn handle_packet(&self, packet: &[u8]) {
        let Some(ip) = Ipv4Packet::new(packet) else {
            return;
        };
        match ip.protocol() {
            PROTO_UDP => self.handle_udp(&ip),
            PROTO_TCP => self.handle_tcp(&ip),
            _ => {}
        }
    }

    fn handle_udp(&self, ip: &Ipv4Packet<'_>) {
        let Some(udp) = UdpDatagram::new(ip.payload()) else {
            return;
        };
        if udp.dest_port() != DNS_PORT {
            return;
        }
        counter!("breakwater_queries_total").increment(1);

        let Some(question) = DnsQuestion::parse(udp.payload()) else {
            debug!("dropping unparseable dns query");
            return;
        };

        let snapshot = self.store.snapshot();
        match classify(&question.name, &snapshot, &self.policy) {
            verdict @ (Verdict::Block | Verdict::BlockSilent) => {
                counter!("breakwater_blocked_total").increment(1);
                let domain = normalize(&question.name);
                debug!(domain = %domain, silent = (verdict == Verdict::BlockSilent), "blocking query");
                let response = question.blocked_answer(self.sentinel);
                self.reply_udp(ip, &udp, &response);
                self.notifier.notify(&domain, verdict == Verdict::BlockSilent);
            }
            Verdict::Defer => {
                counter!("breakwater_deferred_total").increment(1);
                debug!(domain = %question.name, "lists not ready, failing query");
                let response = question.servfail();
                self.reply_udp(ip, &udp, &response);
            }
            Verdict::Allow => self.forward_query(ip, &udp),
        }
    }

    /// Reset any TCP connection attempt immediately. The client gets a
    /// connection-refused instead of a long timeout against the
    /// sentinel address.
    fn handle_tcp(&self, ip: &Ipv4Packet<'_>) {
        let Some(tcp) = TcpSegment::new(ip.payload()) else {
            return;
        };
        if !tcp.is_syn() {
            return;
        }
        counter!("breakwater_tcp_resets_total").increment(1);
        debug!(port = tcp.dest_port(), "resetting tcp connection attempt");
        let reset = build_rst_packet(
            ip.destination(),
            tcp.dest_port(),
            ip.source(),
            tcp.source_port(),
            tcp.sequence().wrapping_add(1),
        );
        self.write_packet(&reset);
    }

    /// Hand the query to the upstream resolver on its own task so a
    /// slow upstream never stalls the packet loop.
    fn forward_query(&self, ip: &Ipv4Packet<'_>, udp: &UdpDatagram<'_>) {
        let query = udp.payload().to_vec();
        let client = ip.source();
        let client_port = udp.source_port();
        let server = ip.destination();
        let server_port = udp.dest_port();
        let forwarder = Arc::clone(&self.forwarder);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            match forwarder.forward(&query).await {
                Ok(reply) => {
                    counter!("breakwater_forwarded_total").increment(1);
                    let packet = build_udp_packet(server, server_port, client, client_port, &reply);
                    if let Err(error) = sink.lock().send(&packet) {
                        warn!(error = %error, "device write failed, dropping upstream reply");
                    }
                }
                Err(error) => {
                    counter!("breakwater_forward_errors_total").increment(1);
                    debug!(error = %error, "upstream query failed");
                }
            }
        });
    }

    /// Write a response back through the tunnel with the endpoints of
    /// the original packet swapped.
    fn reply_udp(&self, ip: &Ipv4Packet<'_>, udp: &UdpDatagram<'_>, payload: &[u8]) {
        let packet = build_udp_packet(
            ip.destination(),
            udp.dest_port(),
            ip.source(),
            udp.source_port(),
            payload,
        );
        self.write_packet(&packet);
    }

    fn write_packet(&self, packet: &[u8]) {
        if let Err(error) = self.sink.lock().send(packet) {
            warn!(error = %error, "device write failed, dropping packet");
        }
    }
}
