use std::env;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn resolve_port(raw: Option<String>, default_port: u16) -> u16 {
    raw.and_then(|raw| raw.trim().parse::<u16>().ok())
        .unwrap_or(default_port)
}

/// Starts a Prometheus scrape endpoint on `0.0.0.0:<port>` and installs it as the global recorder.
///
/// The port comes from `port_env` (e.g. `BM_METRICS_PORT`) or `default_port`. Must be called
/// from within a tokio runtime. Later calls return the first handle.
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    let port = resolve_port(env::var(port_env).ok(), default_port);

    let (recorder, exporter) = match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .build()
    {
        Ok(parts) => parts,
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to build prometheus exporter");
            return None;
        }
    };

    let handle = recorder.handle();
    if let Err(err) = metrics::set_global_recorder(recorder) {
        warn!(error = %err, "metrics recorder already installed");
        return None;
    }

    tokio::spawn(async move {
        // `ExporterError` implements neither `Debug` nor `Display`.
        if exporter.await.is_err() {
            warn!("prometheus exporter stopped");
        }
    });

    let _ = PROMETHEUS_HANDLE.set(handle);
    info!(metrics_port = port, "started prometheus exporter");
    PROMETHEUS_HANDLE.get()
}
