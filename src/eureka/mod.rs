//! Eureka registry client facade.
//!
//! [`Eureka`] wraps a [`RegistryTransport`] and interprets its status codes:
//!
//! - registration succeeds only on `204 No Content`; anything else is an error
//!   returned to the caller
//! - a heartbeat answered with `404 Not Found` means the registry evicted the
//!   instance, which is then registered again
//! - other heartbeat failures and every cancellation failure are logged and
//!   otherwise ignored

mod model;
#[cfg(test)]
pub(crate) mod testing;
mod transport;

use std::collections::BTreeMap;

use reqwest::StatusCode;

pub use model::{
    Application, ApplicationInfo, DataCenterInfo, InstanceInfo, InstanceState, InstanceStatus,
    LeaseInfo, PortInfo, Registration,
};
pub use transport::{HttpTransport, RegistryTransport};

use crate::error::{Error, Result};

/// Registry client facade.
#[derive(Debug)]
pub struct Eureka<T> {
    transport: T,
}

impl<T: RegistryTransport> Eureka<T> {
    /// Creates a facade over the given transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Returns the underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Registers an application and returns the submitted descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegistrationFailed`] if the registry answers with
    /// anything but `204 No Content`, or the transport error if the call
    /// could not be made.
    pub async fn register(&self, application: &Application) -> Result<InstanceInfo> {
        tracing::debug!("registering {application}");
        let info = InstanceInfo::from(application);
        self.register_instance(&info).await?;
        Ok(info)
    }

    async fn register_instance(&self, info: &InstanceInfo) -> Result<()> {
        let status = self.transport.register(info).await.inspect_err(|e| {
            tracing::warn!("{}/{}: registration failed: {e}", info.app, info.id());
        })?;

        tracing::info!("{}/{}: registration status {status}", info.app, info.id());

        if status == StatusCode::NO_CONTENT {
            Ok(())
        } else {
            Err(Error::RegistrationFailed {
                app: info.app.clone(),
                instance_id: info.id().to_string(),
                status,
            })
        }
    }

    /// Sends a heartbeat for an instance, registering it again if the
    /// registry no longer knows it.
    ///
    /// Returns whether the instance ends up holding a live lease.
    pub async fn renew(&self, info: &InstanceInfo) -> bool {
        let status = match self.transport.send_heartbeat(&info.app, info.id(), info).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("{}/{}: unable to send heartbeat: {e}", info.app, info.id());
                return false;
            }
        };

        tracing::debug!("{}/{}: heartbeat status {status}", info.app, info.id());

        if status == StatusCode::NOT_FOUND {
            tracing::info!("{}/{}: lease evicted, registering again", info.app, info.id());
            return match self.register_instance(info).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("{}/{}: re-registration failed: {e}", info.app, info.id());
                    false
                }
            };
        }

        status == StatusCode::OK
    }

    /// Removes an instance from the registry. Failures are logged only.
    pub async fn cancel(&self, app: &str, instance_id: &str) {
        match self.transport.cancel(app, instance_id).await {
            Ok(status) => tracing::info!("{app}/{instance_id}: deregistration status {status}"),
            Err(e) => tracing::error!("{app}/{instance_id}: deregistration failed: {e}"),
        }
    }

    /// Fetches the registration of one instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be reached or does not know
    /// the instance.
    pub async fn registration(&self, app: &str, instance_id: &str) -> Result<Registration> {
        let info = self.transport.get_instance(app, instance_id).await?;
        Ok(Registration::from(&info))
    }

    /// Fetches every registration of one application.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be reached or does not know
    /// the application.
    pub async fn registrations(&self, app: &str) -> Result<Vec<Registration>> {
        let application = self.transport.get_application(app).await?;
        Ok(application.instances.iter().map(Registration::from).collect())
    }

    /// Fetches every registration, grouped by application name.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be reached.
    pub async fn applications(&self) -> Result<BTreeMap<String, Vec<Registration>>> {
        let applications = self.transport.get_applications().await?;

        Ok(applications
            .into_iter()
            .map(|application| {
                let registrations = application.instances.iter().map(Registration::from).collect();
                (application.name, registrations)
            })
            .collect())
    }
}
