//! Translation of `Endpoints` snapshots into registry applications.

use k8s_openapi::api::core::v1::{EndpointPort, EndpointSubset, Endpoints};

use crate::error::{Error, Result};
use crate::eureka::Application;

/// Result of translating one `Endpoints` snapshot.
///
/// Subsets whose port cannot be resolved contribute no applications; their
/// failures are collected instead so the remaining subsets still translate.
#[derive(Debug, Default)]
pub struct Translation {
    /// Applications derived from subsets with a resolvable port.
    pub applications: Vec<Application>,

    /// One failure per subset that could not be translated.
    pub failures: Vec<Error>,
}

/// Converts `Endpoints` into registry-ready [`Application`]s.
#[derive(Clone, Debug, Default)]
pub struct Translator {
    primary_port_name: Option<String>,
}

impl Translator {
    /// Creates a translator preferring the given port name for multi-port subsets.
    #[must_use]
    pub fn new(primary_port_name: Option<String>) -> Self {
        Self {
            primary_port_name: primary_port_name.filter(|name| !name.is_empty()),
        }
    }

    /// Translates an `Endpoints` snapshot into one application per ready address.
    ///
    /// Missing subsets or addresses yield an empty translation: the backing
    /// pods may simply not be scheduled yet.
    #[must_use]
    pub fn translate(&self, ep: &Endpoints) -> Translation {
        let service = ep.metadata.name.clone().unwrap_or_default();
        let mut translation = Translation::default();

        let subsets = ep.subsets.as_deref().unwrap_or_default();
        if subsets.is_empty() {
            tracing::debug!("subsets are not available yet for endpoints {service}");
            return translation;
        }

        for subset in subsets {
            match self.translate_subset(&service, subset) {
                Ok(applications) => translation.applications.extend(applications),
                Err(e) => translation.failures.push(e),
            }
        }

        translation
    }

    fn translate_subset(&self, service: &str, subset: &EndpointSubset) -> Result<Vec<Application>> {
        let addresses = subset.addresses.as_deref().unwrap_or_default();
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let port = self.resolve_port(service, subset.ports.as_deref().unwrap_or_default())?;

        Ok(addresses
            .iter()
            .map(|address| {
                let instance_id = address.target_ref.as_ref().and_then(|r| r.uid.clone());
                if instance_id.is_none() {
                    tracing::debug!("address {} of {service} has no target reference", address.ip);
                }

                Application::new(service, instance_id, address.ip.clone(), port)
            })
            .collect())
    }

    /// Picks the port used to register the addresses of one subset.
    ///
    /// A single declared port always wins. Otherwise the configured primary
    /// port name is matched case-insensitively; without one, the first
    /// declared port is used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMatchingPort`] when no port is declared, or when a
    /// primary port name is configured and no declared port carries it, and
    /// [`Error::InvalidPort`] when the chosen port does not fit a TCP port.
    pub fn resolve_port(&self, service: &str, ports: &[EndpointPort]) -> Result<u16> {
        let chosen = if let [port] = ports {
            Some(port)
        } else if let Some(primary) = &self.primary_port_name {
            ports.iter().find(|port| {
                port.name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(primary))
            })
        } else {
            ports.first()
        };

        let Some(port) = chosen else {
            return Err(Error::NoMatchingPort {
                service: service.to_string(),
                primary: self.primary_port_name.clone(),
            });
        };

        u16::try_from(port.port).map_err(|_| Error::InvalidPort {
            service: service.to_string(),
            port: port.port,
        })
    }
}
