//! Reconciliation of `Endpoints` change notifications with the registry.
//!
//! The handler decides, per notification, whether to register, renew or
//! unregister instances, consulting the discovery and registration labels
//! and the [`IdentityCache`]:
//!
//! | Notification | Guard | Action |
//! |---|---|---|
//! | added | discovery label, not cached | cache, then register |
//! | updated, changed | discovery label on both, old cached | register new, cancel stale, re-cache |
//! | updated, unchanged | discovery label on both, old cached | heartbeat |
//! | deleted | discovery label, cached | cancel, uncache |
//!
//! A failed guard means no registry call and no cache mutation. Nothing is
//! handled before the cache bootstrap completes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use k8s_openapi::api::core::v1::Endpoints;
use tokio::sync::{mpsc, watch};

use crate::cache::IdentityCache;
use crate::config::SyncConfig;
use crate::eureka::{Application, Eureka, InstanceInfo, RegistryTransport};
use crate::informer::ResourceEvent;
use crate::labels::is_enabled;
use crate::translate::{Translation, Translator};

/// What handling one notification did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The cache bootstrap has not completed; the notification was ignored.
    NotReady,

    /// A guard failed; nothing was done.
    Skipped,

    /// A new resource was cached and its instances registered.
    Added {
        /// Successful registrations.
        registered: usize,
        /// Failed registrations and untranslatable subsets.
        failed: usize,
    },

    /// A resource changed; its instances were registered again and stale ones removed.
    Changed {
        /// Successful registrations.
        registered: usize,
        /// Failed registrations and untranslatable subsets.
        failed: usize,
        /// Instances no longer backing the resource that were cancelled.
        unregistered: usize,
    },

    /// An unchanged resource was redelivered; its leases were renewed.
    Renewed {
        /// Instances holding a live lease after the heartbeat.
        renewed: usize,
        /// Heartbeats that failed.
        failed: usize,
    },

    /// A resource was removed and its instances cancelled.
    Removed {
        /// Cancelled instances.
        unregistered: usize,
    },
}

struct RegisterSummary {
    registered: usize,
    failed: usize,
    live_keys: HashSet<String>,
    complete: bool,
}

/// Drives registry calls from `Endpoints` notifications.
pub struct EndpointsHandler<C, T> {
    cache: Arc<C>,
    translator: Translator,
    eureka: Eureka<T>,
    label_enabled: String,
    label_register: String,
    leases: Mutex<HashMap<String, Leases>>,
}

/// Descriptors submitted at registration, by lease key.
type Leases = HashMap<String, InstanceInfo>;

impl<C: IdentityCache, T: RegistryTransport> EndpointsHandler<C, T> {
    /// Creates a handler over an injected cache and registry facade.
    #[must_use]
    pub fn new(config: &SyncConfig, cache: Arc<C>, eureka: Eureka<T>) -> Self {
        Self {
            cache,
            translator: Translator::new(config.primary_port_name.clone()),
            eureka,
            label_enabled: config.label_enabled.clone(),
            label_register: config.label_register.clone(),
            leases: Mutex::default(),
        }
    }

    /// Returns the identity cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// Returns the registry facade.
    #[must_use]
    pub fn eureka(&self) -> &Eureka<T> {
        &self.eureka
    }

    /// Seeds the cache with the currently existing resources and marks it synced.
    ///
    /// Resources already present when the process starts are then treated as
    /// known: their first notification renews instead of registering twice.
    pub fn bootstrap(&self, items: &[Endpoints]) {
        tracing::info!("Start syncing cache");

        for ep in items.iter().filter(|ep| self.discoverable(ep)) {
            if let Some((uid, version)) = identity(ep) {
                self.cache.insert(uid, version);
            }
        }

        self.cache.mark_synced();
        tracing::info!("Cache is synced with {} endpoints", self.cache.len());
    }

    /// Handles one notification.
    pub async fn handle(&self, event: ResourceEvent<Endpoints>) -> Outcome {
        match event {
            ResourceEvent::Added(ep) => self.on_add(&ep).await,
            ResourceEvent::Updated { old, new } => self.on_update(&old, &new).await,
            ResourceEvent::Deleted { object, stale } => self.on_delete(&object, stale).await,
        }
    }

    /// Handles a newly seen resource.
    pub async fn on_add(&self, ep: &Endpoints) -> Outcome {
        if !self.cache.is_synced() {
            return Outcome::NotReady;
        }

        let Some((uid, version)) = identity(ep) else {
            return Outcome::Skipped;
        };

        if !self.discoverable(ep) || self.cache.contains(uid) {
            return Outcome::Skipped;
        }

        tracing::debug!("Add endpoints -> {}", describe(ep));
        self.cache.insert(uid, version);

        let summary = self.register_all(uid, ep).await;
        Outcome::Added {
            registered: summary.registered,
            failed: summary.failed,
        }
    }

    /// Handles a redelivered resource, changed or not.
    pub async fn on_update(&self, old: &Endpoints, new: &Endpoints) -> Outcome {
        if !self.cache.is_synced() {
            return Outcome::NotReady;
        }

        let (Some((old_uid, old_version)), Some((new_uid, new_version))) =
            (identity(old), identity(new))
        else {
            return Outcome::Skipped;
        };

        if !self.discoverable(old) || !self.discoverable(new) || !self.cache.contains(old_uid) {
            return Outcome::Skipped;
        }

        let cached_version = self.cache.version(old_uid);
        let changed = old_uid != new_uid
            || old_version != new_version
            || cached_version.as_deref() != Some(new_version);

        if !changed {
            tracing::trace!("Resync endpoints -> {}", describe(new));
            let (renewed, failed) = self.renew_all(new_uid, new).await;
            return Outcome::Renewed { renewed, failed };
        }

        tracing::debug!("Update endpoints (old) -> {}", describe(old));
        tracing::debug!("Update endpoints (new) -> {}", describe(new));

        let summary = self.register_all(new_uid, new).await;
        let unregistered = if summary.complete {
            self.unregister(old_uid, old, &summary.live_keys).await
        } else {
            tracing::warn!(
                "keeping previous registrations of {}: current addresses could not all be translated",
                describe(old)
            );
            0
        };

        if old_uid != new_uid {
            self.cache.remove(old_uid);
            self.leases().remove(old_uid);
        }

        self.cache.insert(new_uid, new_version);

        Outcome::Changed {
            registered: summary.registered,
            failed: summary.failed,
            unregistered,
        }
    }

    /// Handles a removed resource.
    pub async fn on_delete(&self, ep: &Endpoints, stale: bool) -> Outcome {
        if !self.cache.is_synced() {
            return Outcome::NotReady;
        }

        let Some((uid, _)) = identity(ep) else {
            return Outcome::Skipped;
        };

        if !self.discoverable(ep) || !self.cache.contains(uid) {
            return Outcome::Skipped;
        }

        tracing::debug!("Delete endpoints (stale: {stale}) -> {}", describe(ep));

        let unregistered = self.unregister(uid, ep, &HashSet::new()).await;
        self.cache.remove(uid);
        self.leases().remove(uid);

        Outcome::Removed { unregistered }
    }

    /// Consumes notifications one at a time until `shutdown` fires or the
    /// sending side closes.
    ///
    /// A notification already being handled when `shutdown` fires runs to
    /// completion.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<ResourceEvent<Endpoints>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let event = tokio::select! {
                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let outcome = self.handle(event).await;
            tracing::trace!("endpoints event handled: {outcome:?}");
        }

        tracing::debug!("endpoints handler stopped");
    }

    fn discoverable(&self, ep: &Endpoints) -> bool {
        is_enabled(&ep.metadata, &self.label_enabled)
    }

    fn registrable(&self, ep: &Endpoints) -> bool {
        is_enabled(&ep.metadata, &self.label_register)
    }

    fn translate(&self, ep: &Endpoints) -> Translation {
        let translation = self.translator.translate(ep);
        for failure in &translation.failures {
            tracing::error!("cannot translate {}: {failure}", describe(ep));
        }

        translation
    }

    async fn register_all(&self, uid: &str, ep: &Endpoints) -> RegisterSummary {
        if !self.registrable(ep) {
            tracing::debug!("service registration label is disabled for {}", describe(ep));
            return RegisterSummary {
                registered: 0,
                failed: 0,
                live_keys: HashSet::new(),
                complete: true,
            };
        }

        let translation = self.translate(ep);
        let mut summary = RegisterSummary {
            registered: 0,
            failed: translation.failures.len(),
            live_keys: HashSet::new(),
            complete: translation.failures.is_empty(),
        };

        for app in &translation.applications {
            summary.live_keys.insert(app.lease_key());

            match self.eureka.register(app).await {
                Ok(info) => {
                    self.leases()
                        .entry(uid.to_string())
                        .or_default()
                        .insert(app.lease_key(), info);
                    summary.registered += 1;
                }
                Err(e) => {
                    tracing::error!("{app} is not discoverable: {e}");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    async fn renew_all(&self, uid: &str, ep: &Endpoints) -> (usize, usize) {
        if !self.registrable(ep) {
            return (0, 0);
        }

        let translation = self.translate(ep);
        let mut renewed = 0;
        let mut failed = translation.failures.len();

        for app in &translation.applications {
            let info = self.lease_for(uid, app);
            if self.eureka.renew(&info).await {
                renewed += 1;
            } else {
                failed += 1;
            }
        }

        (renewed, failed)
    }

    /// Cancels the instances of `ep` whose lease key is not in `keep`.
    async fn unregister(&self, uid: &str, ep: &Endpoints, keep: &HashSet<String>) -> usize {
        if !self.registrable(ep) {
            tracing::debug!("service registration label is disabled for {}", describe(ep));
            return 0;
        }

        let mut unregistered = 0;
        for app in self.translate(ep).applications {
            let key = app.lease_key();
            if keep.contains(&key) {
                continue;
            }

            self.eureka.cancel(&app.name, app.registry_id()).await;
            if let Some(leases) = self.leases().get_mut(uid) {
                leases.remove(&key);
            }

            unregistered += 1;
        }

        unregistered
    }

    /// Descriptor to heartbeat with: the one submitted at registration, so
    /// the dirty timestamp stays stable, or a fresh one without a dirty
    /// timestamp for instances registered before this process started.
    fn lease_for(&self, uid: &str, app: &Application) -> InstanceInfo {
        self.leases()
            .get(uid)
            .and_then(|leases| leases.get(&app.lease_key()))
            .cloned()
            .unwrap_or_else(|| InstanceInfo {
                last_dirty_timestamp: 0,
                ..InstanceInfo::from(app)
            })
    }

    fn leases(&self) -> std::sync::MutexGuard<'_, HashMap<String, Leases>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn lease_count(&self) -> usize {
        self.leases().values().map(HashMap::len).sum()
    }
}

/// Returns the `uid` and `resourceVersion` of a resource, if both are set.
fn identity(ep: &Endpoints) -> Option<(&str, &str)> {
    let uid = ep.metadata.uid.as_deref().filter(|uid| !uid.is_empty())?;
    let version = ep.metadata.resource_version.as_deref().unwrap_or_default();
    Some((uid, version))
}

fn describe(ep: &Endpoints) -> String {
    format!(
        "name: {}, namespace: {}, uid: {}, version: {}",
        ep.metadata.name.as_deref().unwrap_or_default(),
        ep.metadata.namespace.as_deref().unwrap_or_default(),
        ep.metadata.uid.as_deref().unwrap_or_default(),
        ep.metadata.resource_version.as_deref().unwrap_or_default()
    )
}
