//! End-to-end tests for the filtering session.
//!
//! Drive a whole [`TunnelFilter`] with scripted device halves: packets
//! go in through a fake source, synthesized responses come back out of
//! a recording sink. No real tunnel device is involved.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use breakwater::blocklist::ListStore;
use breakwater::config::{
    Config, CustomListConfig, FilterConfig, GuardConfig, ListFormat, ListsConfig, MainListConfig,
    MetricsConfig, TunnelConfig, UpstreamConfig,
};
use breakwater::forward::{Forwarder, NoOpProtector};
use breakwater::notify::BlockNotifier;
use breakwater::overlay::{InterceptKind, Overlay};
use breakwater::packet::ipv4::build_udp_packet;
use breakwater::packet::{Ipv4Packet, TcpSegment, UdpDatagram};
use breakwater::status::FilterStatus;
use breakwater::tunnel::{PacketSink, PacketSource, TunnelFilter};

const CLIENT: Ipv4Addr = Ipv4Addr::new(10, 111, 222, 1);
const RESOLVER: Ipv4Addr = Ipv4Addr::new(10, 111, 222, 2);
const SENTINEL: Ipv4Addr = Ipv4Addr::new(10, 111, 222, 3);

/// Device read half scripted with a fixed set of inbound packets.
struct ScriptedSource {
    packets: VecDeque<Vec<u8>>,
}

impl ScriptedSource {
    fn new(packets: impl IntoIterator<Item = Vec<u8>>) -> Self {
        Self {
            packets: packets.into_iter().collect(),
        }
    }
}

impl PacketSource for ScriptedSource {
    fn recv(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        match self.packets.pop_front() {
            Some(packet) => {
                let len = packet.len().min(buffer.len());
                buffer[..len].copy_from_slice(&packet[..len]);
                Ok(len)
            }
            None => Err(io::Error::new(io::ErrorKind::WouldBlock, "idle")),
        }
    }
}

/// Device write half that records everything.
#[derive(Clone, Default)]
struct RecordingSink {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSink {
    fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }
}

impl PacketSink for RecordingSink {
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        self.written.lock().push(packet.to_vec());
        Ok(())
    }
}

/// Overlay that counts what it was asked to show.
#[derive(Default)]
struct CountingOverlay {
    shown: Mutex<Vec<String>>,
}

impl CountingOverlay {
    fn shown(&self) -> Vec<String> {
        self.shown.lock().clone()
    }
}

impl Overlay for CountingOverlay {
    fn show(&self, _kind: InterceptKind, payload: &str) {
        self.shown.lock().push(payload.to_string());
    }

    fn hide(&self) {}

    fn take_dismissed(&self) -> bool {
        false
    }
}

fn lists_config(dir: &TempDir) -> ListsConfig {
    ListsConfig {
        main: MainListConfig {
            path: dir.path().join("main.txt"),
            update_path: None,
            format: ListFormat::Domains,
        },
        custom: CustomListConfig {
            path: dir.path().join("custom.txt"),
            format: ListFormat::Domains,
        },
    }
}

fn config(dir: &TempDir, upstream: Option<SocketAddr>) -> Config {
    let mut upstream_config = UpstreamConfig::default();
    if let Some(resolver) = upstream {
        upstream_config.resolver = resolver;
        upstream_config.timeout_ms = 1000;
    }
    Config {
        tunnel: TunnelConfig::default(),
        upstream: upstream_config,
        lists: lists_config(dir),
        filter: FilterConfig {
            whitelist_suffixes: vec!["trusted.example".to_string()],
            infrastructure_suffixes: vec!["tracker-cdn.example".to_string()],
            ..FilterConfig::default()
        },
        guard: GuardConfig::default(),
        metrics: MetricsConfig::default(),
    }
}

struct Harness {
    filter: TunnelFilter,
    sink: RecordingSink,
    overlay: Arc<CountingOverlay>,
    status: Arc<FilterStatus>,
}

async fn start_filter(config: &Config, packets: Vec<Vec<u8>>, preload: bool) -> Harness {
    let store = Arc::new(ListStore::new(config.lists.clone()));
    if preload {
        store.load_all().await.unwrap();
    }

    let status = Arc::new(FilterStatus::new());
    let overlay = Arc::new(CountingOverlay::default());
    let notifier = Arc::new(BlockNotifier::new(
        Arc::clone(&status),
        overlay.clone(),
        &config.filter,
        config.guard.self_id.clone(),
    ));
    let forwarder = Arc::new(Forwarder::new(&config.upstream, Arc::new(NoOpProtector)));
    let filter = TunnelFilter::new(config, store, Arc::clone(&status), notifier, forwarder);

    let sink = RecordingSink::default();
    filter.start(ScriptedSource::new(packets), sink.clone());

    Harness {
        filter,
        sink,
        overlay,
        status,
    }
}

async fn wait_for_packets(sink: &RecordingSink, count: usize) -> Vec<Vec<u8>> {
    for _ in 0..200 {
        let written = sink.written();
        if written.len() >= count {
            return written;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {count} written packets");
}

fn dns_query(id: u16, name: &str) -> Vec<u8> {
    let mut query = vec![0u8; 12];
    query[0..2].copy_from_slice(&id.to_be_bytes());
    query[2] = 0x01; // recursion desired
    query[5] = 1; // one question
    for label in name.split('.') {
        query.push(u8::try_from(label.len()).unwrap());
        query.extend_from_slice(label.as_bytes());
    }
    query.push(0);
    query.extend_from_slice(&1u16.to_be_bytes()); // A
    query.extend_from_slice(&1u16.to_be_bytes()); // IN
    query
}

fn query_packet(id: u16, name: &str, client_port: u16) -> Vec<u8> {
    build_udp_packet(CLIENT, client_port, RESOLVER, 53, &dns_query(id, name))
}

fn syn_packet(dest: Ipv4Addr, dest_port: u16, sequence: u32) -> Vec<u8> {
    let mut segment = vec![0u8; 20];
    segment[0..2].copy_from_slice(&40001u16.to_be_bytes());
    segment[2..4].copy_from_slice(&dest_port.to_be_bytes());
    segment[4..8].copy_from_slice(&sequence.to_be_bytes());
    segment[12] = 0x50;
    segment[13] = 0x02; // SYN

    let total_len = 20 + segment.len();
    let mut packet = vec![0u8; total_len];
    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&u16::try_from(total_len).unwrap().to_be_bytes());
    packet[8] = 64;
    packet[9] = 6; // TCP
    packet[12..16].copy_from_slice(&CLIENT.octets());
    packet[16..20].copy_from_slice(&dest.octets());
    packet[20..].copy_from_slice(&segment);
    packet
}

/// One-shot upstream resolver on loopback answering with canned bytes.
async fn fake_upstream(reply: &'static [u8]) -> (SocketAddr, JoinHandle<()>) {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut buffer = [0u8; 1500];
        let (_, peer) = socket.recv_from(&mut buffer).await.unwrap();
        socket.send_to(reply, peer).await.unwrap();
    });
    (addr, handle)
}

#[tokio::test]
async fn should_answer_blocked_query_with_sentinel_address() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("main.txt"), "ads.example.com\n").unwrap();
    let config = config(&dir, None);

    let harness = start_filter(&config, vec![query_packet(7, "ads.example.com", 40000)], true).await;
    let written = wait_for_packets(&harness.sink, 1).await;

    let ip = Ipv4Packet::new(&written[0]).unwrap();
    assert_eq!(ip.source(), RESOLVER);
    assert_eq!(ip.destination(), CLIENT);
    let udp = UdpDatagram::new(ip.payload()).unwrap();
    assert_eq!(udp.source_port(), 53);
    assert_eq!(udp.dest_port(), 40000);

    let reply = udp.payload();
    assert_eq!(reply[0..2], 7u16.to_be_bytes());
    assert_eq!(reply[2..4], [0x81, 0x80]);
    assert_eq!(reply[reply.len() - 4..], SENTINEL.octets());

    assert_eq!(harness.overlay.shown(), vec!["ads.example.com".to_string()]);
    assert_eq!(
        harness.status.last_blocked().map(|(domain, _)| domain),
        Some("ads.example.com".to_string())
    );

    harness.filter.stop().await;
}

#[tokio::test]
async fn should_forward_allowed_query_and_relay_reply() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("main.txt"), "ads.example.com\n").unwrap();

    let (upstream_addr, upstream) = fake_upstream(b"upstream-reply-bytes").await;
    let config = config(&dir, Some(upstream_addr));

    let harness = start_filter(
        &config,
        vec![query_packet(8, "news.example.org", 40002)],
        true,
    )
    .await;
    let written = wait_for_packets(&harness.sink, 1).await;
    upstream.await.unwrap();

    let ip = Ipv4Packet::new(&written[0]).unwrap();
    assert_eq!(ip.source(), RESOLVER);
    assert_eq!(ip.destination(), CLIENT);
    let udp = UdpDatagram::new(ip.payload()).unwrap();
    assert_eq!(udp.dest_port(), 40002);
    assert_eq!(udp.payload(), b"upstream-reply-bytes");

    assert!(harness.overlay.shown().is_empty());

    harness.filter.stop().await;
}

#[tokio::test]
async fn should_fail_queries_while_lists_are_missing() {
    // No main list file at all: loading fails and the filter never
    // arms, so queries are answered with a server failure.
    let dir = TempDir::new().unwrap();
    let config = config(&dir, None);

    let harness = start_filter(&config, vec![query_packet(9, "ads.example.com", 40003)], false).await;
    let written = wait_for_packets(&harness.sink, 1).await;

    let ip = Ipv4Packet::new(&written[0]).unwrap();
    let udp = UdpDatagram::new(ip.payload()).unwrap();
    let reply = udp.payload();
    assert_eq!(reply[0..2], 9u16.to_be_bytes());
    assert_eq!(reply[2..4], [0x81, 0x82]); // SERVFAIL
    assert_eq!(reply[6..8], [0, 0]); // no answers

    assert!(!harness.status.armed());
    assert!(harness.overlay.shown().is_empty());

    harness.filter.stop().await;
}

#[tokio::test]
async fn should_let_whitelisted_query_through_even_unarmed() {
    let dir = TempDir::new().unwrap();

    let (upstream_addr, upstream) = fake_upstream(b"whitelisted-reply").await;
    let config = config(&dir, Some(upstream_addr));

    let harness = start_filter(
        &config,
        vec![query_packet(10, "api.trusted.example", 40004)],
        false,
    )
    .await;
    let written = wait_for_packets(&harness.sink, 1).await;
    upstream.await.unwrap();

    let udp = UdpDatagram::new(Ipv4Packet::new(&written[0]).unwrap().payload()).unwrap();
    assert_eq!(udp.payload(), b"whitelisted-reply");

    harness.filter.stop().await;
}

#[tokio::test]
async fn should_reset_tcp_connection_attempts() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("main.txt"), "ads.example.com\n").unwrap();
    let config = config(&dir, None);

    let harness = start_filter(&config, vec![syn_packet(SENTINEL, 443, 0x2000)], true).await;
    let written = wait_for_packets(&harness.sink, 1).await;

    let ip = Ipv4Packet::new(&written[0]).unwrap();
    assert_eq!(ip.source(), SENTINEL);
    assert_eq!(ip.destination(), CLIENT);
    let tcp = TcpSegment::new(ip.payload()).unwrap();
    assert_eq!(tcp.source_port(), 443);
    assert_eq!(tcp.dest_port(), 40001);
    assert_eq!(ip.payload()[8..12], 0x2001u32.to_be_bytes()); // ack = seq + 1
    assert_eq!(ip.payload()[13], 0x14); // RST | ACK

    harness.filter.stop().await;
}

#[tokio::test]
async fn should_surface_repeated_blocks_once_within_debounce_window() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("main.txt"), "ads.example.com\n").unwrap();
    let config = config(&dir, None);

    // Same domain twice in a burst: both queries get the sentinel
    // answer, the overlay fires once.
    let harness = start_filter(
        &config,
        vec![
            query_packet(11, "ads.example.com", 40005),
            query_packet(12, "ads.example.com", 40006),
        ],
        true,
    )
    .await;
    let written = wait_for_packets(&harness.sink, 2).await;

    assert_eq!(written.len(), 2);
    assert_eq!(harness.overlay.shown(), vec!["ads.example.com".to_string()]);

    harness.filter.stop().await;
}

#[tokio::test]
async fn should_silence_infrastructure_blocks() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("main.txt"), "tracker-cdn.example\n").unwrap();
    let config = config(&dir, None);

    let harness = start_filter(
        &config,
        vec![query_packet(13, "cdn.tracker-cdn.example", 40007)],
        true,
    )
    .await;
    let written = wait_for_packets(&harness.sink, 1).await;

    // Blocked on the wire but no overlay.
    let udp = UdpDatagram::new(Ipv4Packet::new(&written[0]).unwrap().payload()).unwrap();
    assert_eq!(udp.payload()[2..4], [0x81, 0x80]);
    assert!(harness.overlay.shown().is_empty());
    assert_eq!(
        harness.status.last_blocked().map(|(domain, _)| domain),
        Some("cdn.tracker-cdn.example".to_string())
    );

    harness.filter.stop().await;
}

#[tokio::test]
async fn should_ignore_second_start_and_stop_cleanly() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("main.txt"), "ads.example.com\n").unwrap();
    let config = config(&dir, None);

    let harness = start_filter(&config, vec![query_packet(14, "ads.example.com", 40008)], true).await;
    assert!(harness.status.running());

    // A second start while running is ignored; its source never gets
    // read.
    let second_sink = RecordingSink::default();
    harness.filter.start(
        ScriptedSource::new(vec![query_packet(15, "ads.example.com", 40009)]),
        second_sink.clone(),
    );

    let written = wait_for_packets(&harness.sink, 1).await;
    assert_eq!(written.len(), 1);
    assert!(second_sink.written().is_empty());

    harness.filter.stop().await;
    assert!(!harness.status.running());
    assert!(!harness.status.armed());

    harness.filter.stop().await;
    assert!(!harness.status.running());
}
