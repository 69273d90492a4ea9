//! Prometheus registry for a single run.

use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::warn;

/// Registry holding the core conversion metrics.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

fn register_metrics(registry: &Registry) {
    for metric in rekonv_core::metrics::all_metrics() {
        if let Err(e) = registry.register(metric) {
            warn!(error = %e, "failed to register metric");
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics are not valid UTF-8")
}

/// Writes the text exposition to `path`, for the node-exporter textfile
/// collector. Goes through a temp file so a scrape never sees half a file.
pub fn write_metrics(path: &Path) -> Result<()> {
    let text = encode_metrics()?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    std::fs::write(&tmp, text)
        .with_context(|| format!("Failed to write metrics to {:?}", tmp))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics into {:?}", path))?;
    Ok(())
}
