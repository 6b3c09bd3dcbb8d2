//! Prometheus exporter setup.

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;
use crate::error::{Error, Result};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Disabled metrics are a no-op: counters still compile down to
/// nothing being recorded anywhere.
///
/// # Errors
///
/// Returns [`Error::Metrics`] when the recorder is already installed
/// or the listener cannot bind.
pub fn init(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .install()
        .map_err(|error| Error::Metrics(error.to_string()))?;

    Ok(())
}
