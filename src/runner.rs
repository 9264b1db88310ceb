//! Wiring of bootstrap, watches and handlers into one background task.

use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Endpoints, Service};
use kube::api::ListParams;
use kube::{Api, Client};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::cache::MemoryCache;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::eureka::{Eureka, RegistryTransport};
use crate::handler::EndpointsHandler;
use crate::informer::watch_resources;
use crate::service::ServiceTracker;

/// Capacity of the channel between a watch and its handler.
const EVENT_BUFFER: usize = 1024;

/// Handle on a running synchronization task.
#[derive(Debug)]
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stops watching and waits for the in-flight notification to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);

        if let Err(e) = self.task.await {
            tracing::error!("Eureka synchronization task failed: {e}");
        }
    }

    /// Returns whether the task has already stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Starts synchronizing Kubernetes `Endpoints` with the Eureka registry.
///
/// This function spawns a background task that:
///
/// 1. Lists the existing `Endpoints` and seeds the identity cache with them
/// 2. Watches `Endpoints` in the configured namespace
/// 3. Registers, renews and cancels registry instances as notifications arrive
///
/// With [`SyncConfig::track_services`] set, labeled `Service` objects are
/// tracked alongside. Errors setting up the Kubernetes client or listing
/// resources stop the task and are logged; no watch is started in that case.
///
/// # Requirements
///
/// - The application must have RBAC permissions to list and watch `Endpoints`
///   (and `Services` when tracked)
/// - Kubernetes client configuration (in-cluster or kubeconfig)
///
/// # Example
///
/// ```ignore
/// use eureka_k8s_sync::{sync, Eureka, EurekaConfig, HttpTransport, SyncConfig};
///
/// let transport = HttpTransport::new(&EurekaConfig::new("http://eureka:8761/eureka"))?;
/// let handle = sync(SyncConfig::new().namespace("shop"), Eureka::new(transport));
///
/// tokio::signal::ctrl_c().await?;
/// handle.shutdown().await;
/// ```
pub fn sync<T>(config: SyncConfig, eureka: Eureka<T>) -> SyncHandle
where
    T: RegistryTransport + 'static,
{
    spawn_sync(config, eureka, async { Client::try_default().await.map_err(Error::from) })
}

/// Like [`sync`], with an already configured Kubernetes client.
pub fn sync_with_client<T>(client: Client, config: SyncConfig, eureka: Eureka<T>) -> SyncHandle
where
    T: RegistryTransport + 'static,
{
    spawn_sync(config, eureka, async move { Ok(client) })
}

fn spawn_sync<T, F>(config: SyncConfig, eureka: Eureka<T>, client: F) -> SyncHandle
where
    T: RegistryTransport + 'static,
    F: Future<Output = Result<Client>> + Send + 'static,
{
    let (shutdown, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let result = match client.await {
            Ok(client) => sync_loop(client, config, eureka, shutdown_rx).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            tracing::error!("Eureka synchronization failed: {e}");
        }
    });

    SyncHandle { shutdown, task }
}

async fn sync_loop<T>(
    client: Client,
    config: SyncConfig,
    eureka: Eureka<T>,
    shutdown: watch::Receiver<bool>,
) -> Result<()>
where
    T: RegistryTransport + 'static,
{
    let namespace = config
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());

    tracing::info!("Synchronizing endpoints in namespace {namespace} with Eureka");

    let services = if config.track_services {
        let api: Api<Service> = Api::namespaced(client.clone(), &namespace);
        let tracker = ServiceTracker::new(&config, Arc::new(MemoryCache::new()));
        tracker.bootstrap(&api.list(&ListParams::default()).await?.items);
        Some((api, tracker))
    } else {
        None
    };

    let endpoints: Api<Endpoints> = Api::namespaced(client, &namespace);
    let handler = EndpointsHandler::new(&config, Arc::new(MemoryCache::new()), eureka);
    handler.bootstrap(&endpoints.list(&ListParams::default()).await?.items);

    // Both kinds are bootstrapped; nothing is spawned before this point.
    let mut tasks = Vec::new();

    if let Some((api, tracker)) = services {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        tasks.push(tokio::spawn(watch_resources(
            api,
            config.resync_interval,
            tx,
            shutdown.clone(),
        )));
        tasks.push(tokio::spawn(tracker.run(rx, shutdown.clone())));
    }

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tasks.push(tokio::spawn(watch_resources(
        endpoints,
        config.resync_interval,
        tx,
        shutdown.clone(),
    )));

    handler.run(rx, shutdown).await;

    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!("background task failed: {e}");
        }
    }

    tracing::info!("Eureka synchronization stopped");
    Ok(())
}
