//! Registry transport: the network calls behind the facade.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};

use super::model::{
    ApplicationEnvelope, ApplicationInfo, ApplicationsEnvelope, InstanceEnvelope, InstanceInfo,
};
use crate::config::EurekaConfig;
use crate::error::{Error, Result};

/// Network calls against the remote registry.
///
/// Write calls return the raw status code; interpreting it is left to
/// [`Eureka`](super::Eureka). Read calls decode the response body.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Submits an instance registration.
    async fn register(&self, info: &InstanceInfo) -> Result<StatusCode>;

    /// Sends a lease heartbeat for an instance.
    async fn send_heartbeat(
        &self,
        app: &str,
        instance_id: &str,
        info: &InstanceInfo,
    ) -> Result<StatusCode>;

    /// Removes an instance registration.
    async fn cancel(&self, app: &str, instance_id: &str) -> Result<StatusCode>;

    /// Fetches one instance.
    async fn get_instance(&self, app: &str, instance_id: &str) -> Result<InstanceInfo>;

    /// Fetches one application with its instances.
    async fn get_application(&self, app: &str) -> Result<ApplicationInfo>;

    /// Fetches every registered application.
    async fn get_applications(&self) -> Result<Vec<ApplicationInfo>>;
}

/// [`RegistryTransport`] speaking the Eureka REST API with JSON payloads.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for the configured service URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &EurekaConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            base_url: config.service_url.trim_end_matches('/').to_string(),
        })
    }

    fn app_url(&self, app: &str) -> String {
        format!("{}/apps/{app}", self.base_url)
    }

    fn instance_url(&self, app: &str, instance_id: &str) -> String {
        format!("{}/apps/{app}/{instance_id}", self.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String, what: String) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::UnexpectedStatus { what, status });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RegistryTransport for HttpTransport {
    async fn register(&self, info: &InstanceInfo) -> Result<StatusCode> {
        let response = self
            .client
            .post(self.app_url(&info.app))
            .json(&InstanceEnvelope {
                instance: info.clone(),
            })
            .send()
            .await?;

        Ok(response.status())
    }

    async fn send_heartbeat(
        &self,
        app: &str,
        instance_id: &str,
        info: &InstanceInfo,
    ) -> Result<StatusCode> {
        let mut query = vec![("status", info.status.to_string())];
        if info.last_dirty_timestamp > 0 {
            query.push(("lastDirtyTimestamp", info.last_dirty_timestamp.to_string()));
        }

        let response = self
            .client
            .put(self.instance_url(app, instance_id))
            .query(&query)
            .send()
            .await?;
        Ok(response.status())
    }

    async fn cancel(&self, app: &str, instance_id: &str) -> Result<StatusCode> {
        let response = self
            .client
            .delete(self.instance_url(app, instance_id))
            .send()
            .await?;

        Ok(response.status())
    }

    async fn get_instance(&self, app: &str, instance_id: &str) -> Result<InstanceInfo> {
        let envelope: InstanceEnvelope = self
            .get_json(
                self.instance_url(app, instance_id),
                format!("get instance {app}/{instance_id}"),
            )
            .await?;

        Ok(envelope.instance)
    }

    async fn get_application(&self, app: &str) -> Result<ApplicationInfo> {
        let envelope: ApplicationEnvelope = self
            .get_json(self.app_url(app), format!("get application {app}"))
            .await?;

        Ok(envelope.application)
    }

    async fn get_applications(&self) -> Result<Vec<ApplicationInfo>> {
        let envelope: ApplicationsEnvelope = self
            .get_json(format!("{}/apps", self.base_url), "get applications".to_string())
            .await?;

        Ok(envelope.applications.applications)
    }
}
