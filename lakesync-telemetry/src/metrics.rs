//! Prometheus metrics bootstrap for lakesync services.

use std::sync::Mutex;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// Global cache for the Prometheus handle used by [`init_metrics_handle`].
//
// A [`Mutex`] is used instead of [`OnceLock`] because the initialization code
// is fallible and `OnceLock::get_or_try_init` is unstable. Installing the
// recorder twice fails, and tests initialize metrics repeatedly, so the first
// successful handle is cached and cloned afterwards.
static PROMETHEUS_HANDLE: Mutex<Option<PrometheusHandle>> = Mutex::new(None);

/// Initializes metrics and returns a handle for rendering them on demand.
///
/// No HTTP server is started; the caller decides where (and whether) to expose
/// the rendered text. Repeated calls return clones of the first handle.
pub fn init_metrics_handle() -> Result<PrometheusHandle, BuildError> {
    let mut prometheus_handle = PROMETHEUS_HANDLE
        .lock()
        .expect("prometheus handle lock poisoned");

    if let Some(handle) = &*prometheus_handle {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    *prometheus_handle = Some(handle.clone());

    Ok(handle)
}

/// Initializes metrics with an automatic HTTP listener on port 9000.
///
/// Intended for standalone services scraped by Prometheus directly. The
/// optional `instance` label distinguishes deployments sharing a scrape
/// target.
pub fn init_metrics(instance: Option<&str>) -> Result<(), BuildError> {
    let mut builder = PrometheusBuilder::new().with_http_listener(std::net::SocketAddr::new(
        std::net::IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
        9000,
    ));

    if let Some(instance) = instance {
        builder = builder.add_global_label("instance", instance);
    }

    builder.install()?;

    Ok(())
}
