//! Bridge example keeping a Eureka registry in sync with Kubernetes `Endpoints`.
//!
//! Runs until interrupted, then prints what the registry holds and stops.
//!
//! # Running in Kubernetes
//!
//! The bridge expects to run inside a Kubernetes cluster with access to
//! `Endpoints` (and optionally `Service`) resources, and to reach a Eureka
//! server.
//!
//! # Environment Variables
//!
//! - `NAMESPACE`: Kubernetes namespace (default: uses pod's namespace)
//! - `LABEL_ENABLED`: discovery label key (default: cloud.spring.io/enabled)
//! - `LABEL_REGISTER`: registration label key (default: cloud.spring.io/register)
//! - `PRIMARY_PORT_NAME`: port name used for multi-port subsets (default: `primary_port`, empty disables)
//! - `RESYNC_INTERVAL_SECS`: seconds between lease renewals (default: 30)
//! - `TRACK_SERVICES`: also track labeled services (default: false)
//! - `EUREKA_SERVICE_URL`: Eureka base URL (default: <http://localhost:8761/eureka>)
//! - `EUREKA_TIMEOUT_SECS`: registry request timeout (default: 10)

use std::env;
use std::time::Duration;

use eureka_k8s_sync::{
    DEFAULT_EUREKA_URL, Eureka, EurekaConfig, HttpTransport, SyncConfig, parse_flag, sync,
};
use tracing::{Level, error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()),
        )
        .init();

    // Read configuration from environment
    let mut config = SyncConfig::new();
    if let Ok(ns) = env::var("NAMESPACE") {
        config = config.namespace(ns);
    }

    if let Ok(key) = env::var("LABEL_ENABLED") {
        config = config.label_enabled(key);
    }

    if let Ok(key) = env::var("LABEL_REGISTER") {
        config = config.label_register(key);
    }

    if let Ok(name) = env::var("PRIMARY_PORT_NAME") {
        config = config.primary_port_name(name);
    }

    if let Some(secs) = env::var("RESYNC_INTERVAL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
    {
        config = config.resync_interval(Duration::from_secs(secs));
    }

    if let Ok(flag) = env::var("TRACK_SERVICES") {
        config = config.track_services(parse_flag(&flag));
    }

    let service_url =
        env::var("EUREKA_SERVICE_URL").unwrap_or_else(|_| DEFAULT_EUREKA_URL.to_string());
    let timeout_secs: u64 = env::var("EUREKA_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10);

    info!("Starting Eureka sync");
    info!("Eureka: {service_url}");
    info!("Labels: {} / {}", config.label_enabled, config.label_register);
    if let Some(ref name) = config.primary_port_name {
        info!("Primary port name: {name}");
    }

    info!("Resync interval: {}s", config.resync_interval.as_secs());

    let eureka_config =
        EurekaConfig::new(service_url).request_timeout(Duration::from_secs(timeout_secs));

    let handle = sync(config, Eureka::new(HttpTransport::new(&eureka_config)?));

    // Run until interrupted, or until the sync stops on its own
    let mut check = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Interrupted, shutting down");
                break;
            }

            _ = check.tick() => {
                if handle.is_finished() {
                    error!("Synchronization stopped, see the log above");
                    break;
                }
            }
        }
    }

    handle.shutdown().await;

    // Print summary
    let eureka = Eureka::new(HttpTransport::new(&eureka_config)?);
    match eureka.applications().await {
        Ok(applications) => {
            info!("=== Registry Summary ===");
            for (app, registrations) in &applications {
                info!("{app}: {} instances", registrations.len());
            }
        }

        Err(e) => error!("Unable to read registry: {e}"),
    }

    Ok(())
}
