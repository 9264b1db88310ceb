//! Configuration for the synchronizer and the Eureka transport.

use std::time::Duration;

/// Default label that opts an `Endpoints` resource into discovery.
pub const DEFAULT_LABEL_ENABLED: &str = "cloud.spring.io/enabled";

/// Default label that opts an `Endpoints` resource into registry registration.
pub const DEFAULT_LABEL_REGISTER: &str = "cloud.spring.io/register";

/// Default primary port name.
pub const DEFAULT_PRIMARY_PORT_NAME: &str = "primary_port";

/// Shortest accepted resync interval.
pub const MIN_RESYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Default Eureka service URL.
pub const DEFAULT_EUREKA_URL: &str = "http://localhost:8761/eureka";

/// Configuration for Kubernetes-to-Eureka synchronization.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// The Kubernetes namespace to watch.
    /// If `None`, uses the current namespace from the kube client.
    pub namespace: Option<String>,

    /// Label that opts a resource into discovery (cache membership).
    pub label_enabled: String,

    /// Label that opts a resource into registration with the registry.
    pub label_register: String,

    /// Port name preferred when a subset declares several ports.
    /// `None` (or an empty name) picks the first declared port.
    pub primary_port_name: Option<String>,

    /// How often unchanged objects are redelivered as updates.
    pub resync_interval: Duration,

    /// Whether to track labeled `Service` objects alongside `Endpoints`.
    pub track_services: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            label_enabled: DEFAULT_LABEL_ENABLED.to_string(),
            label_register: DEFAULT_LABEL_REGISTER.to_string(),
            primary_port_name: Some(DEFAULT_PRIMARY_PORT_NAME.to_string()),
            resync_interval: Duration::from_secs(30),
            track_services: false,
        }
    }
}

impl SyncConfig {
    /// Creates a configuration with default labels, primary port and resync interval.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit namespace to watch.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the discovery label key.
    #[must_use]
    pub fn label_enabled(mut self, key: impl Into<String>) -> Self {
        self.label_enabled = key.into();
        self
    }

    /// Sets the registration label key.
    #[must_use]
    pub fn label_register(mut self, key: impl Into<String>) -> Self {
        self.label_register = key.into();
        self
    }

    /// Sets the primary port name; an empty name clears it.
    #[must_use]
    pub fn primary_port_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.primary_port_name = (!name.is_empty()).then_some(name);
        self
    }

    /// Clears the primary port name.
    #[must_use]
    pub fn without_primary_port(mut self) -> Self {
        self.primary_port_name = None;
        self
    }

    /// Sets the resync interval, raised to at least [`MIN_RESYNC_INTERVAL`].
    #[must_use]
    pub fn resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = interval.max(MIN_RESYNC_INTERVAL);
        self
    }

    /// Enables or disables `Service` tracking.
    #[must_use]
    pub fn track_services(mut self, enabled: bool) -> Self {
        self.track_services = enabled;
        self
    }
}

/// Configuration for the Eureka REST transport.
#[derive(Clone, Debug)]
pub struct EurekaConfig {
    /// Base service URL, e.g. `http://eureka:8761/eureka`.
    pub service_url: String,

    /// Timeout applied to every registry request.
    pub request_timeout: Duration,
}

impl Default for EurekaConfig {
    fn default() -> Self {
        Self::new(DEFAULT_EUREKA_URL)
    }
}

impl EurekaConfig {
    /// Creates a configuration for the given service URL.
    #[must_use]
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
