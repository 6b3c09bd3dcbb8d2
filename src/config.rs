//! Configuration loading and validation.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Top-level configuration for the breakwater filter.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Virtual interface settings.
    #[serde(default)]
    pub tunnel: TunnelConfig,

    /// Upstream resolver settings.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Blocklist sources.
    pub lists: ListsConfig,

    /// Classification policy and notification tuning.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Foreground guard settings.
    #[serde(default)]
    pub guard: GuardConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Virtual interface settings.
///
/// Only the resolver and sentinel addresses are meant to be routed into
/// the device (two /32 routes); everything else bypasses the filter.
/// Route installation belongs to whatever platform layer brings the
/// interface up.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunnelConfig {
    /// Device name. If None, the platform picks one.
    pub name: Option<String>,

    /// Address assigned to the tunnel side.
    #[serde(default = "default_tunnel_address")]
    pub address: Ipv4Addr,

    /// Netmask for the tunnel network.
    #[serde(default = "default_tunnel_netmask")]
    pub netmask: Ipv4Addr,

    /// Address clients are told to use as their DNS resolver.
    #[serde(default = "default_resolver_address")]
    pub resolver_address: Ipv4Addr,

    /// Address returned in answers for blocked domains.
    #[serde(default = "default_sentinel_address")]
    pub sentinel_address: Ipv4Addr,

    /// Device MTU.
    #[serde(default = "default_mtu")]
    pub mtu: u16,

    /// Capacity of the inbound packet channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            name: None,
            address: default_tunnel_address(),
            netmask: default_tunnel_netmask(),
            resolver_address: default_resolver_address(),
            sentinel_address: default_sentinel_address(),
            mtu: default_mtu(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Upstream resolver settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Public resolver that permitted queries are relayed to.
    #[serde(
        default = "default_upstream",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub resolver: SocketAddr,

    /// How long to wait for an upstream reply, in milliseconds.
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            resolver: default_upstream(),
            timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

/// Blocklist sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListsConfig {
    /// The large published list.
    pub main: MainListConfig,

    /// The user-maintained additions.
    pub custom: CustomListConfig,
}

/// Main list source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MainListConfig {
    /// Bundled list file.
    pub path: PathBuf,

    /// Where the external update job drops refreshed copies. Preferred
    /// over `path` when present on disk.
    pub update_path: Option<PathBuf>,

    /// File format.
    #[serde(default = "default_main_format")]
    pub format: ListFormat,
}

/// Custom list source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CustomListConfig {
    /// Custom list file. May not exist until the user adds a domain.
    pub path: PathBuf,

    /// File format.
    #[serde(default = "default_custom_format")]
    pub format: ListFormat,
}

/// Supported blocklist file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    /// One domain per line.
    Domains,
    /// `/etc/hosts` sinkhole format.
    Hosts,
}

/// Classification policy and notification tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Suffixes that are always allowed, ahead of every block set.
    #[serde(default = "default_whitelist_suffixes")]
    pub whitelist_suffixes: Vec<String>,

    /// Suffixes whose blocks stay silent. Ad and analytics backends
    /// that apps probe constantly end up on the main list; answering
    /// them with the sentinel is wanted, surfacing each hit is not.
    #[serde(default = "default_infrastructure_suffixes")]
    pub infrastructure_suffixes: Vec<String>,

    /// Window during which repeated blocks of the same domain are not
    /// re-surfaced, in milliseconds.
    #[serde(default = "default_block_debounce_ms")]
    pub block_debounce_ms: u64,

    /// How recent the foreground observation must be for the
    /// own-app-foreground suppression to apply, in milliseconds.
    #[serde(default = "default_foreground_stale_ms")]
    pub foreground_stale_ms: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            whitelist_suffixes: default_whitelist_suffixes(),
            infrastructure_suffixes: default_infrastructure_suffixes(),
            block_debounce_ms: default_block_debounce_ms(),
            foreground_stale_ms: default_foreground_stale_ms(),
        }
    }
}

/// Foreground guard settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardConfig {
    /// Run the guard loop from the binary with the built-in logging
    /// overlay. Embedders wire their own overlay and sources instead.
    #[serde(default)]
    pub enabled: bool,

    /// Poll period for foreground detection, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long after a user dismissal before the same target may be
    /// intercepted again, in milliseconds.
    #[serde(default = "default_dismiss_cooldown_ms")]
    pub dismiss_cooldown_ms: u64,

    /// How long an overlay may stay up with no foreground signal at
    /// all before it is taken down, in milliseconds.
    #[serde(default = "default_overlay_timeout_ms")]
    pub overlay_timeout_ms: u64,

    /// Detection window queried from each foreground source, in
    /// milliseconds.
    #[serde(default = "default_source_window_ms")]
    pub source_window_ms: u64,

    /// Maximum age of a usage-stats sample before it is discarded, in
    /// milliseconds.
    #[serde(default = "default_sample_max_age_ms")]
    pub sample_max_age_ms: u64,

    /// Where the guarded-target set is persisted. If None, targets
    /// live only for the process lifetime.
    pub targets_path: Option<PathBuf>,

    /// Identity of the protection app itself. Never intercepted.
    #[serde(default = "default_self_id")]
    pub self_id: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: default_poll_interval_ms(),
            dismiss_cooldown_ms: default_dismiss_cooldown_ms(),
            overlay_timeout_ms: default_overlay_timeout_ms(),
            source_window_ms: default_source_window_ms(),
            sample_max_age_ms: default_sample_max_age_ms(),
            targets_path: None,
            self_id: default_self_id(),
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable the exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter listen address.
    #[serde(
        default = "default_metrics_listen",
        deserialize_with = "deserialize_socket_addr"
    )]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

const fn default_tunnel_address() -> Ipv4Addr {
    Ipv4Addr::new(10, 111, 222, 1)
}

const fn default_tunnel_netmask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 255, 0)
}

const fn default_resolver_address() -> Ipv4Addr {
    Ipv4Addr::new(10, 111, 222, 2)
}

const fn default_sentinel_address() -> Ipv4Addr {
    Ipv4Addr::new(10, 111, 222, 3)
}

const fn default_mtu() -> u16 {
    1500
}

const fn default_channel_capacity() -> usize {
    512
}

fn default_upstream() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::new(8, 8, 8, 8), 53))
}

const fn default_upstream_timeout_ms() -> u64 {
    3000
}

const fn default_main_format() -> ListFormat {
    ListFormat::Hosts
}

const fn default_custom_format() -> ListFormat {
    ListFormat::Domains
}

fn default_whitelist_suffixes() -> Vec<String> {
    [
        "google.com",
        "googleapis.com",
        "gstatic.com",
        "googlevideo.com",
        "googleusercontent.com",
        "googletagmanager.com",
        "firebase.com",
        "firebaseapp.com",
        "firebaseio.com",
        "firebasestorage.googleapis.com",
        "goog",
        "braze.com",
        "revenuecat.com",
        "apple.com",
        "icloud.com",
        "mzstatic.com",
    ]
    .map(String::from)
    .to_vec()
}

fn default_infrastructure_suffixes() -> Vec<String> {
    [
        "googleapis.com",
        "gstatic.com",
        "google.com",
        "googlevideo.com",
        "firebase.com",
        "firebaseapp.com",
        "firebaseio.com",
        "crashlytics.com",
        "app-measurement.com",
        "googletagmanager.com",
        "doubleclick.net",
        "googleadservices.com",
        "googlesyndication.com",
        "2mdn.net",
        "braze.com",
        "branch.io",
        "facebook.com",
        "fbcdn.net",
        "appsflyer.com",
        "adjust.com",
        "kochava.com",
        "mixpanel.com",
        "amplitude.com",
        "segment.io",
        "segment.com",
    ]
    .map(String::from)
    .to_vec()
}

const fn default_block_debounce_ms() -> u64 {
    3000
}

const fn default_foreground_stale_ms() -> u64 {
    30_000
}

const fn default_poll_interval_ms() -> u64 {
    300
}

const fn default_dismiss_cooldown_ms() -> u64 {
    2000
}

const fn default_overlay_timeout_ms() -> u64 {
    15_000
}

const fn default_source_window_ms() -> u64 {
    10_000
}

const fn default_sample_max_age_ms() -> u64 {
    5000
}

fn default_self_id() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::new(127, 0, 0, 1), 9100))
}

fn deserialize_socket_addr<'de, D>(deserializer: D) -> std::result::Result<SocketAddr, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<()> {
        if self.tunnel.mtu < 576 {
            return Err(ConfigError::Validation("tunnel.mtu must be >= 576".into()).into());
        }

        if self.tunnel.channel_capacity == 0 {
            return Err(
                ConfigError::Validation("tunnel.channel_capacity must be > 0".into()).into(),
            );
        }

        if self.tunnel.resolver_address == self.tunnel.sentinel_address {
            return Err(ConfigError::Validation(
                "tunnel.resolver_address and tunnel.sentinel_address must differ".into(),
            )
            .into());
        }

        if self.upstream.timeout_ms == 0 {
            return Err(ConfigError::Validation("upstream.timeout_ms must be > 0".into()).into());
        }

        for suffix in self
            .filter
            .whitelist_suffixes
            .iter()
            .chain(&self.filter.infrastructure_suffixes)
        {
            if suffix.is_empty() {
                return Err(ConfigError::Validation("empty filter suffix".into()).into());
            }
        }

        if self.filter.block_debounce_ms == 0 {
            return Err(
                ConfigError::Validation("filter.block_debounce_ms must be > 0".into()).into(),
            );
        }

        if self.guard.poll_interval_ms == 0 {
            return Err(ConfigError::Validation("guard.poll_interval_ms must be > 0".into()).into());
        }

        if self.guard.self_id.is_empty() {
            return Err(ConfigError::Validation("guard.self_id must be set".into()).into());
        }

        Ok(())
    }
}
