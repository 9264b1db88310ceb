//! Recording registry transport for unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::model::{ApplicationInfo, InstanceInfo};
use super::transport::RegistryTransport;
use crate::error::{Error, Result};

/// A registry call as seen by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Register { app: String, instance_id: String },
    Heartbeat { app: String, instance_id: String },
    Cancel { app: String, instance_id: String },
}

impl Call {
    pub(crate) fn register(app: &str, instance_id: &str) -> Self {
        Self::Register {
            app: app.to_string(),
            instance_id: instance_id.to_string(),
        }
    }

    pub(crate) fn heartbeat(app: &str, instance_id: &str) -> Self {
        Self::Heartbeat {
            app: app.to_string(),
            instance_id: instance_id.to_string(),
        }
    }

    pub(crate) fn cancel(app: &str, instance_id: &str) -> Self {
        Self::Cancel {
            app: app.to_string(),
            instance_id: instance_id.to_string(),
        }
    }
}

/// Canned reply of the fake transport.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Reply {
    Status(StatusCode),
    Unreachable,
}

impl Reply {
    fn into_result(self) -> Result<StatusCode> {
        match self {
            Self::Status(status) => Ok(status),
            Self::Unreachable => Err(Error::UnexpectedStatus {
                what: "connect".to_string(),
                status: StatusCode::SERVICE_UNAVAILABLE,
            }),
        }
    }
}

/// Records every call and answers with canned replies.
///
/// Accepted registrations are kept so the read paths can serve them back.
pub(crate) struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    registered: Mutex<BTreeMap<(String, String), InstanceInfo>>,
    register_reply: Reply,
    heartbeat_reply: Reply,
    cancel_reply: Reply,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            calls: Mutex::default(),
            registered: Mutex::default(),
            register_reply: Reply::Status(StatusCode::NO_CONTENT),
            heartbeat_reply: Reply::Status(StatusCode::OK),
            cancel_reply: Reply::Status(StatusCode::OK),
        }
    }
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_reply(mut self, reply: Reply) -> Self {
        self.register_reply = reply;
        self
    }

    pub(crate) fn heartbeat_reply(mut self, reply: Reply) -> Self {
        self.heartbeat_reply = reply;
        self
    }

    pub(crate) fn cancel_reply(mut self, reply: Reply) -> Self {
        self.cancel_reply = reply;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub(crate) fn registers(&self) -> usize {
        self.count(|c| matches!(c, Call::Register { .. }))
    }

    pub(crate) fn heartbeats(&self) -> usize {
        self.count(|c| matches!(c, Call::Heartbeat { .. }))
    }

    pub(crate) fn cancels(&self) -> usize {
        self.count(|c| matches!(c, Call::Cancel { .. }))
    }

    pub(crate) fn seed(&self, info: InstanceInfo) {
        self.registered
            .lock()
            .unwrap()
            .insert((info.app.clone(), info.id().to_string()), info);
    }
}

#[async_trait]
impl RegistryTransport for RecordingTransport {
    async fn register(&self, info: &InstanceInfo) -> Result<StatusCode> {
        self.calls.lock().unwrap().push(Call::register(&info.app, info.id()));

        let status = self.register_reply.into_result()?;
        if status == StatusCode::NO_CONTENT {
            self.seed(info.clone());
        }

        Ok(status)
    }

    async fn send_heartbeat(
        &self,
        app: &str,
        instance_id: &str,
        _info: &InstanceInfo,
    ) -> Result<StatusCode> {
        self.calls.lock().unwrap().push(Call::heartbeat(app, instance_id));
        self.heartbeat_reply.into_result()
    }

    async fn cancel(&self, app: &str, instance_id: &str) -> Result<StatusCode> {
        self.calls.lock().unwrap().push(Call::cancel(app, instance_id));
        self.registered
            .lock()
            .unwrap()
            .remove(&(app.to_uppercase(), instance_id.to_string()));

        self.cancel_reply.into_result()
    }

    async fn get_instance(&self, app: &str, instance_id: &str) -> Result<InstanceInfo> {
        self.registered
            .lock()
            .unwrap()
            .get(&(app.to_uppercase(), instance_id.to_string()))
            .cloned()
            .ok_or_else(|| Error::UnexpectedStatus {
                what: format!("get instance {app}/{instance_id}"),
                status: StatusCode::NOT_FOUND,
            })
    }

    async fn get_application(&self, app: &str) -> Result<ApplicationInfo> {
        let name = app.to_uppercase();
        let instances: Vec<InstanceInfo> = self
            .registered
            .lock()
            .unwrap()
            .values()
            .filter(|info| info.app == name)
            .cloned()
            .collect();

        if instances.is_empty() {
            return Err(Error::UnexpectedStatus {
                what: format!("get application {app}"),
                status: StatusCode::NOT_FOUND,
            });
        }

        Ok(ApplicationInfo { name, instances })
    }

    async fn get_applications(&self) -> Result<Vec<ApplicationInfo>> {
        let mut apps: BTreeMap<String, Vec<InstanceInfo>> = BTreeMap::new();
        for info in self.registered.lock().unwrap().values() {
            apps.entry(info.app.clone()).or_default().push(info.clone());
        }

        Ok(apps
            .into_iter()
            .map(|(name, instances)| ApplicationInfo { name, instances })
            .collect())
    }
}
