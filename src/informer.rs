//! Kubernetes watch adapter producing typed change notifications.
//!
//! This module watches Kubernetes resources and turns raw watch events into
//! [`ResourceEvent`]s sent over a channel. Consumers handle those events one
//! at a time, so all events of one resource kind are processed sequentially.
//!
//! # How It Works
//!
//! 1. Watches resources of one kind in a namespace
//! 2. Keeps the last seen object per `namespace/name` in a local store
//! 3. Emits `Added` for unseen objects and `Updated` (old and new) for seen ones
//! 4. After a relist, emits stale `Deleted` events for objects that vanished
//! 5. On every resync tick, replays the store as unchanged `Updated` events

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Config as WatcherConfig, Event};
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio::time::{Interval, MissedTickBehavior};

use crate::config::MIN_RESYNC_INTERVAL;

/// A change notification for one resource.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceEvent<K> {
    /// An object was seen for the first time.
    Added(K),

    /// A known object was delivered again, changed or not.
    Updated {
        /// The previously seen state.
        old: K,
        /// The current state.
        new: K,
    },

    /// An object was removed.
    Deleted {
        /// The last known state.
        object: K,
        /// `true` if the deletion was inferred from a relist rather than observed.
        stale: bool,
    },
}

/// Local store turning watch events into [`ResourceEvent`]s.
#[derive(Debug)]
pub struct Informer<K> {
    store: HashMap<String, K>,
    relisted: Option<HashSet<String>>,
}

impl<K> Default for Informer<K> {
    fn default() -> Self {
        Self {
            store: HashMap::new(),
            relisted: None,
        }
    }
}

impl<K: Resource + Clone> Informer<K> {
    /// Creates an informer with an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Processes a watcher event and returns the resulting notifications.
    pub fn process_event(&mut self, event: &Event<K>) -> Vec<ResourceEvent<K>> {
        match event {
            Event::Init => {
                tracing::debug!("Kubernetes watcher relist started");
                self.relisted = Some(HashSet::new());
                Vec::new()
            }

            Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(store_key(obj));
                }

                vec![self.apply(obj)]
            }

            Event::Apply(obj) => vec![self.apply(obj)],

            Event::InitDone => {
                let Some(seen) = self.relisted.take() else {
                    return Vec::new();
                };

                let vanished: Vec<String> = self
                    .store
                    .keys()
                    .filter(|key| !seen.contains(*key))
                    .cloned()
                    .collect();

                tracing::debug!(
                    "Kubernetes watcher relist done: {} objects, {} vanished",
                    seen.len(),
                    vanished.len()
                );

                vanished
                    .into_iter()
                    .filter_map(|key| self.store.remove(&key))
                    .map(|object| ResourceEvent::Deleted {
                        object,
                        stale: true,
                    })
                    .collect()
            }

            Event::Delete(obj) => {
                self.store.remove(&store_key(obj));
                vec![ResourceEvent::Deleted {
                    object: obj.clone(),
                    stale: false,
                }]
            }
        }
    }

    /// Replays every stored object as an unchanged update.
    #[must_use]
    pub fn resync(&self) -> Vec<ResourceEvent<K>> {
        self.store
            .values()
            .map(|obj| ResourceEvent::Updated {
                old: obj.clone(),
                new: obj.clone(),
            })
            .collect()
    }

    fn apply(&mut self, obj: &K) -> ResourceEvent<K> {
        match self.store.insert(store_key(obj), obj.clone()) {
            Some(old) => ResourceEvent::Updated {
                old,
                new: obj.clone(),
            },
            None => ResourceEvent::Added(obj.clone()),
        }
    }
}

fn store_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Timer for store replays, first ticking one period from now.
///
/// Periods below [`MIN_RESYNC_INTERVAL`] are raised to it.
fn resync_timer(period: Duration) -> Interval {
    let period = period.max(MIN_RESYNC_INTERVAL);
    let mut timer = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Watches resources through `api` and sends notifications to `tx`.
///
/// Watch errors are logged and retried with the watcher's default backoff.
/// Returns when `shutdown` fires, the watch stream ends, or the receiving
/// side of `tx` is closed.
pub async fn watch_resources<K>(
    api: Api<K>,
    resync_interval: Duration,
    tx: mpsc::Sender<ResourceEvent<K>>,
    mut shutdown: watch::Receiver<bool>,
) where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    K::DynamicType: Default,
{
    let stream = watcher::watcher(api, WatcherConfig::default()).default_backoff();
    tokio::pin!(stream);

    let mut informer = Informer::new();
    let mut resync = resync_timer(resync_interval);

    tracing::debug!(
        "Starting Kubernetes watch for {} (resync every {}s)",
        K::kind(&K::DynamicType::default()),
        resync.period().as_secs()
    );

    loop {
        if *shutdown.borrow() {
            break;
        }

        let events = tokio::select! {
            _ = shutdown.changed() => break,
            _ = resync.tick() => informer.resync(),
            event = stream.next() => match event {
                Some(Ok(event)) => informer.process_event(&event),
                Some(Err(e)) => {
                    tracing::warn!("Kubernetes watch error: {e}");
                    Vec::new()
                }
                None => break,
            },
        };

        for event in events {
            if tx.send(event).await.is_err() {
                tracing::warn!("channel closed, stopping Kubernetes watcher");
                return;
            }
        }
    }

    tracing::debug!("Kubernetes watch stopped");
}
