//! Registry-facing data model.
//!
//! [`InstanceInfo`] follows the JSON shape of the Eureka REST API. Eureka
//! encodes timestamps as strings and collapses single-element lists into a
//! bare object, so decoding accepts both forms.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Normalized registration identity of one backing address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Application {
    /// Service name.
    pub name: String,
    /// Identity of the backing workload, if the address references one.
    pub instance_id: Option<String>,
    /// Address the instance is reachable at.
    pub hostname: String,
    /// Port the instance is reachable at.
    pub port: u16,
}

impl Application {
    /// Creates an application record.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        instance_id: Option<String>,
        hostname: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            name: name.into(),
            instance_id,
            hostname: hostname.into(),
            port,
        }
    }

    /// Key identifying this application at the registry boundary.
    #[must_use]
    pub fn registration_key(&self) -> String {
        format!("{}:{}", self.name, self.instance_id.as_deref().unwrap_or_default())
    }

    /// Key of the instance actually held by the registry.
    ///
    /// Unlike [`registration_key`](Self::registration_key), addresses without
    /// a workload identity stay distinct here.
    #[must_use]
    pub fn lease_key(&self) -> String {
        format!("{}:{}", self.name, self.registry_id())
    }

    /// Instance id the registry files this application under.
    ///
    /// Falls back to the host name when no workload identity is known.
    #[must_use]
    pub fn registry_id(&self) -> &str {
        self.instance_id.as_deref().unwrap_or(&self.hostname)
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({}:{})", self.name, self.registry_id(), self.hostname, self.port)
    }
}

/// Instance status as reported to and by the registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
    /// Ready to receive traffic.
    Up,
    /// Not available.
    Down,
    /// Starting up.
    Starting,
    /// Deliberately taken out of service.
    OutOfService,
    /// Status not known.
    #[default]
    Unknown,
}

impl InstanceStatus {
    /// Wire name of the status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Starting => "STARTING",
            Self::OutOfService => "OUT_OF_SERVICE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Port declaration of an instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// Port number.
    #[serde(rename = "$")]
    pub port: u16,
    /// Whether the port is enabled.
    #[serde(rename = "@enabled", with = "flex::flag", default)]
    pub enabled: bool,
}

impl PortInfo {
    /// An enabled port.
    #[must_use]
    pub fn enabled(port: u16) -> Self {
        Self { port, enabled: true }
    }
}

/// Data center descriptor required by the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCenterInfo {
    /// Descriptor class understood by the registry.
    #[serde(rename = "@class")]
    pub class: String,
    /// Data center name.
    pub name: String,
}

impl Default for DataCenterInfo {
    fn default() -> Self {
        Self {
            class: "com.netflix.appinfo.InstanceInfo$DefaultDataCenterInfo".to_string(),
            name: "MyOwn".to_string(),
        }
    }
}

/// Lease parameters of an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseInfo {
    /// Expected heartbeat interval.
    pub renewal_interval_in_secs: u32,
    /// Time without heartbeat after which the registry evicts the instance.
    pub duration_in_secs: u32,
}

impl Default for LeaseInfo {
    fn default() -> Self {
        Self {
            renewal_interval_in_secs: 30,
            duration_in_secs: 90,
        }
    }
}

/// Instance descriptor exchanged with the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInfo {
    /// Explicit instance id; the host name stands in when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Host name of the instance.
    pub host_name: String,
    /// Application name (upper case, as the registry stores it).
    pub app: String,
    /// IP address of the instance.
    #[serde(default)]
    pub ip_addr: String,
    /// Virtual host name clients resolve the application by.
    #[serde(default)]
    pub vip_address: String,
    /// Current status.
    #[serde(default)]
    pub status: InstanceStatus,
    /// Non-secure port.
    #[serde(default)]
    pub port: PortInfo,
    /// Data center descriptor.
    #[serde(default)]
    pub data_center_info: DataCenterInfo,
    /// Lease parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_info: Option<LeaseInfo>,
    /// Last time the instance changed on the client side (epoch millis).
    #[serde(default, with = "flex::timestamp")]
    pub last_dirty_timestamp: u64,
    /// Last time the registry updated the instance (epoch millis).
    #[serde(default, with = "flex::timestamp")]
    pub last_updated_timestamp: u64,
}

impl InstanceInfo {
    /// Id the registry files this instance under.
    #[must_use]
    pub fn id(&self) -> &str {
        self.instance_id.as_deref().unwrap_or(&self.host_name)
    }
}

impl From<&Application> for InstanceInfo {
    fn from(app: &Application) -> Self {
        let now = now_millis();

        Self {
            instance_id: app.instance_id.clone(),
            host_name: app.hostname.clone(),
            app: app.name.to_uppercase(),
            ip_addr: app.hostname.clone(),
            vip_address: app.name.clone(),
            status: InstanceStatus::Up,
            port: PortInfo::enabled(app.port),
            data_center_info: DataCenterInfo::default(),
            lease_info: Some(LeaseInfo::default()),
            last_dirty_timestamp: now,
            last_updated_timestamp: now,
        }
    }
}

/// Registry-side bookkeeping of one instance.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InstanceState {
    /// Status last reported by the registry.
    pub status: InstanceStatus,
    /// Last dirty timestamp (epoch millis).
    pub last_dirty_timestamp: u64,
    /// Last updated timestamp (epoch millis).
    pub last_updated_timestamp: u64,
}

impl InstanceState {
    /// Refreshes the bookkeeping from a registry response.
    pub fn update(&mut self, info: &InstanceInfo) {
        self.status = info.status;
        self.last_dirty_timestamp = info.last_dirty_timestamp;
        self.last_updated_timestamp = info.last_updated_timestamp;
    }
}

/// An application together with its registry-side state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    /// The registered application.
    pub application: Application,
    /// Registry-side state of the instance.
    pub instance: InstanceState,
}

impl Registration {
    /// Refreshes the instance state from a registry response.
    pub fn update(&mut self, info: &InstanceInfo) {
        self.instance.update(info);
    }
}

impl From<&InstanceInfo> for Registration {
    fn from(info: &InstanceInfo) -> Self {
        let mut registration = Self {
            application: Application::new(
                info.app.clone(),
                info.instance_id.clone(),
                info.host_name.clone(),
                info.port.port,
            ),
            instance: InstanceState::default(),
        };

        registration.update(info);
        registration
    }
}

/// One application as listed by the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ApplicationInfo {
    /// Application name.
    pub name: String,
    /// Registered instances.
    #[serde(rename = "instance", default, deserialize_with = "flex::one_or_many")]
    pub instances: Vec<InstanceInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct InstanceEnvelope {
    pub(crate) instance: InstanceInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApplicationEnvelope {
    pub(crate) application: ApplicationInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApplicationsEnvelope {
    pub(crate) applications: ApplicationList,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApplicationList {
    #[serde(rename = "application", default, deserialize_with = "flex::one_or_many")]
    pub(crate) applications: Vec<ApplicationInfo>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Lenient codecs for the registry's JSON dialect.
mod flex {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany<T> {
        Many(Vec<T>),
        One(T),
    }

    pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(match Option::<OneOrMany<T>>::deserialize(deserializer)? {
            Some(OneOrMany::Many(items)) => items,
            Some(OneOrMany::One(item)) => vec![item],
            None => Vec::new(),
        })
    }

    pub(crate) mod timestamp {
        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serializer};

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        #[allow(clippy::trivially_copy_pass_by_ref)]
        pub(crate) fn serialize<S: Serializer>(
            value: &u64,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&value.to_string())
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<u64, D::Error> {
            match Raw::deserialize(deserializer)? {
                Raw::Number(value) => Ok(value),
                Raw::Text(text) => text.parse().map_err(D::Error::custom),
            }
        }
    }

    pub(crate) mod flag {
        use serde::{Deserialize, Deserializer, Serializer};

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }

        #[allow(clippy::trivially_copy_pass_by_ref)]
        pub(crate) fn serialize<S: Serializer>(
            value: &bool,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(if *value { "true" } else { "false" })
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<bool, D::Error> {
            Ok(match Raw::deserialize(deserializer)? {
                Raw::Bool(value) => value,
                Raw::Text(text) => crate::labels::parse_flag(&text),
            })
        }
    }
}
