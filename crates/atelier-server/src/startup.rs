//! Server startup utilities.

use atelier_config::{AppConfig, ObservabilityConfig};
use atelier_core::{AtelierError, AtelierResult};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::info;

/// Interval between Prometheus histogram upkeep runs.
pub const METRICS_UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Prints the startup banner.
pub fn print_banner() {
    info!(r"
    ___   __       ___
   /   | / /____  / (_)__  _____
  / /| |/ __/ _ \/ / / _ \/ ___/
 / ___ / /_/  __/ / /  __/ /
/_/  |_\__/\___/_/_/\___/_/

            job queue
    ");
}

/// Prints server startup information.
pub fn print_startup_info(config: &AppConfig) {
    let addr = config.server.addr();
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("REST API:    http://{}/api/v1", addr);
    info!("Health:      http://{}/health", addr);
    info!("Metrics:     http://{}/metrics", addr);
    info!("Worker tick: http://{}/internal/worker/tick", addr);
    info!(
        "Dispatcher:  {}",
        if config.dispatcher.enabled {
            format!(
                "polling every {}s, {} concurrent drains",
                config.dispatcher.interval_secs, config.dispatcher.concurrency
            )
        } else {
            "disabled, waiting for external ticks".to_string()
        }
    );
    info!("{}", separator);
}

/// Installs the global Prometheus recorder when metrics are enabled.
pub fn install_metrics_recorder(
    config: &ObservabilityConfig,
) -> AtelierResult<Option<PrometheusHandle>> {
    if !config.metrics_enabled {
        info!("Metrics disabled");
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AtelierError::Internal(format!("Failed to install metrics recorder: {e}")))?;
    atelier_jobs::metrics::register_metrics();

    let upkeep = handle.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(METRICS_UPKEEP_INTERVAL);
        loop {
            ticker.tick().await;
            upkeep.run_upkeep();
        }
    });

    info!("Prometheus recorder installed");
    Ok(Some(handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_banner_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_banner();
    }

    #[test]
    fn test_print_startup_info_does_not_panic() {
        let _ = tracing_subscriber::fmt::try_init();
        print_startup_info(&AppConfig::default());

        let mut config = AppConfig::default();
        config.dispatcher.enabled = false;
        print_startup_info(&config);
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let config = ObservabilityConfig {
            metrics_enabled: false,
            ..ObservabilityConfig::default()
        };
        assert!(install_metrics_recorder(&config).unwrap().is_none());
    }
}
