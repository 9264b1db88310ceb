//! Observational tracking of labeled `Service` objects.
//!
//! The tracker mirrors discovery-labeled services into its own
//! [`IdentityCache`] and logs their lifecycle. It never talks to the registry.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Service;
use tokio::sync::{mpsc, watch};

use crate::cache::IdentityCache;
use crate::config::SyncConfig;
use crate::informer::ResourceEvent;
use crate::labels::is_enabled;

/// Keeps a cache of discovery-labeled services.
pub struct ServiceTracker<C> {
    cache: Arc<C>,
    label_enabled: String,
}

impl<C: IdentityCache> ServiceTracker<C> {
    /// Creates a tracker over an injected cache.
    #[must_use]
    pub fn new(config: &SyncConfig, cache: Arc<C>) -> Self {
        Self {
            cache,
            label_enabled: config.label_enabled.clone(),
        }
    }

    /// Returns the tracker's cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// Seeds the cache with the currently existing services and marks it synced.
    pub fn bootstrap(&self, items: &[Service]) {
        for svc in items.iter().filter(|svc| self.discoverable(svc)) {
            if let Some((uid, version)) = identity(svc) {
                self.cache.insert(uid, version);
            }
        }

        self.cache.mark_synced();
        tracing::info!("Service cache is synced with {} services", self.cache.len());
    }

    /// Handles one notification. Returns whether the cache changed.
    pub fn handle(&self, event: &ResourceEvent<Service>) -> bool {
        match event {
            ResourceEvent::Added(svc) => self.on_add(svc),
            ResourceEvent::Updated { old, new } => self.on_update(old, new),
            ResourceEvent::Deleted { object, .. } => self.on_delete(object),
        }
    }

    /// Caches a newly seen service.
    pub fn on_add(&self, svc: &Service) -> bool {
        if !self.cache.is_synced() || !self.discoverable(svc) {
            return false;
        }

        let Some((uid, version)) = identity(svc) else {
            return false;
        };

        if self.cache.contains(uid) {
            return false;
        }

        tracing::debug!("Add service -> {}", describe(svc));
        self.cache.insert(uid, version);
        true
    }

    /// Refreshes the cached version of a known service.
    pub fn on_update(&self, old: &Service, new: &Service) -> bool {
        if !self.cache.is_synced() || !self.discoverable(old) || !self.discoverable(new) {
            return false;
        }

        let (Some((old_uid, _)), Some((new_uid, new_version))) = (identity(old), identity(new))
        else {
            return false;
        };

        if !self.cache.contains(old_uid)
            || (old_uid == new_uid && self.cache.version(old_uid).as_deref() == Some(new_version))
        {
            return false;
        }

        tracing::debug!("Update service -> {}", describe(new));

        if old_uid != new_uid {
            self.cache.remove(old_uid);
        }

        self.cache.insert(new_uid, new_version);
        true
    }

    /// Forgets a removed service.
    pub fn on_delete(&self, svc: &Service) -> bool {
        if !self.cache.is_synced() || !self.discoverable(svc) {
            return false;
        }

        let Some((uid, _)) = identity(svc) else {
            return false;
        };

        let removed = self.cache.remove(uid);
        if removed {
            tracing::debug!("Delete service -> {}", describe(svc));
        }

        removed
    }

    /// Consumes notifications until `shutdown` fires or the sending side closes.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<ResourceEvent<Service>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle(&event);
                    }
                    None => break,
                },
            }
        }

        tracing::debug!("service tracker stopped");
    }

    fn discoverable(&self, svc: &Service) -> bool {
        is_enabled(&svc.metadata, &self.label_enabled)
    }
}

fn identity(svc: &Service) -> Option<(&str, &str)> {
    let uid = svc.metadata.uid.as_deref().filter(|uid| !uid.is_empty())?;
    let version = svc.metadata.resource_version.as_deref().unwrap_or_default();
    Some((uid, version))
}

fn describe(svc: &Service) -> String {
    format!(
        "name: {}, namespace: {}, uid: {}",
        svc.metadata.name.as_deref().unwrap_or_default(),
        svc.metadata.namespace.as_deref().unwrap_or_default(),
        svc.metadata.uid.as_deref().unwrap_or_default()
    )
}
