//! Error types for registry synchronization.

use reqwest::StatusCode;

/// Error type for synchronization failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A subset declares several ports (or none) and none of them can be chosen.
    #[error("no matching port in subset of {service} (primary port: {primary:?})")]
    NoMatchingPort {
        /// Name of the `Endpoints` resource being translated.
        service: String,
        /// The configured primary port name, if any.
        primary: Option<String>,
    },

    /// A declared port number does not fit a TCP port.
    #[error("invalid port {port} in subset of {service}")]
    InvalidPort {
        /// Name of the `Endpoints` resource being translated.
        service: String,
        /// The offending port number.
        port: i32,
    },

    /// The registry did not accept a registration.
    #[error("registration of {app}/{instance_id} rejected with status {status}")]
    RegistrationFailed {
        /// Registry application name.
        app: String,
        /// Registry instance id.
        instance_id: String,
        /// Status code returned by the registry.
        status: StatusCode,
    },

    /// The registry answered a read request with an unexpected status.
    #[error("registry request {what} failed with status {status}")]
    UnexpectedStatus {
        /// Description of the request.
        what: String,
        /// Status code returned by the registry.
        status: StatusCode,
    },

    /// Transport failure talking to the registry.
    #[error("registry transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Kubernetes API failure.
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

/// Result type for synchronization operations.
pub type Result<T> = std::result::Result<T, Error>;
