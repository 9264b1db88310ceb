#![deny(missing_docs)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Kubernetes `Endpoints` synchronization into a [Eureka](https://github.com/Netflix/eureka) registry.
//!
//! Services running in Kubernetes are invisible to clients that discover their
//! peers through Eureka. This crate watches Kubernetes `Endpoints` resources and
//! keeps the registry in step: every ready address of an opted-in resource is
//! registered as an instance, leases are renewed on every resync, and instances
//! are cancelled when their addresses disappear.
//!
//! # Features
//!
//! - **Label opt-in**: `cloud.spring.io/enabled` enables tracking,
//!   `cloud.spring.io/register` enables registration
//! - **Restart-safe**: existing resources are cached at startup, so a restart
//!   renews leases instead of registering everything again
//! - **Self-healing leases**: instances evicted by the registry are registered
//!   again on the next heartbeat
//! - **Port disambiguation**: multi-port subsets use the port named by
//!   [`SyncConfig::primary_port_name`]
//!
//! # Usage
//!
//! ```ignore
//! use eureka_k8s_sync::{sync, Eureka, EurekaConfig, HttpTransport, SyncConfig};
//!
//! let transport = HttpTransport::new(&EurekaConfig::new("http://eureka:8761/eureka"))?;
//! let handle = sync(SyncConfig::new(), Eureka::new(transport));
//!
//! // Later, stop watching
//! handle.shutdown().await;
//! ```

mod cache;
mod config;
mod error;
pub mod eureka;
mod handler;
mod informer;
mod labels;
mod runner;
mod service;
mod translate;

pub use cache::{IdentityCache, MemoryCache};
pub use config::{
    DEFAULT_EUREKA_URL, DEFAULT_LABEL_ENABLED, DEFAULT_LABEL_REGISTER, DEFAULT_PRIMARY_PORT_NAME,
    EurekaConfig, MIN_RESYNC_INTERVAL, SyncConfig,
};
pub use error::{Error, Result};
pub use eureka::{Application, Eureka, HttpTransport, InstanceInfo, RegistryTransport};
pub use handler::{EndpointsHandler, Outcome};
pub use informer::{Informer, ResourceEvent, watch_resources};
pub use labels::{is_enabled, parse_flag};
pub use runner::{SyncHandle, sync, sync_with_client};
pub use service::ServiceTracker;
pub use translate::{Translation, Translator};
