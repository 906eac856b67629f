//! Authenticated vSphere session
//!
//! A [`Session`] resolves inventory objects (datacenter, network folder,
//! switches, hosts) and submits the switch tasks. It implements
//! [`RemoteManagementClient`] so the watcher can poll its tasks.

use super::client::SESSION_HEADER;
use super::types::{
    DvsConfigInfo, DvsConfigSpec, DvsCreateSpec, FindByDnsName, FindByIp, HostMemberConfigSpec,
    PortgroupConfigSpec, ServiceContent, SpecArg, TaskInfo, fault_from_value,
};
use crate::client::RemoteManagementClient;
use crate::error::{CoreError, Result};
use crate::operation::{OperationHandle, OperationKind};
use crate::params::HostMember;
use crate::request::{ManagedObjectRef, OperationRequest};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::net::IpAddr;
use tracing::{debug, info, trace, warn};

/// Logged-in session; cheap to clone, all clones share the same token
#[derive(Clone)]
pub struct Session {
    http: reqwest::Client,
    root: String,
    session_id: String,
    content: ServiceContent,
    datacenter: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.root)
            .field("datacenter", &self.datacenter)
            .finish_non_exhaustive()
    }
}

fn is_switch_type(kind: &str) -> bool {
    kind.ends_with("DistributedVirtualSwitch")
}

impl Session {
    pub(crate) fn new(
        http: reqwest::Client,
        root: String,
        session_id: String,
        content: ServiceContent,
        datacenter: Option<String>,
    ) -> Self {
        Self {
            http,
            root,
            session_id,
            content,
            datacenter,
        }
    }

    pub fn service_content(&self) -> &ServiceContent {
        &self.content
    }

    /// End the session on the server
    pub async fn logout(&self) -> Result<()> {
        let manager = self.content.session_manager.clone();
        let _: Option<Value> = self.invoke(&manager, "Logout", &Value::Null).await?;
        info!("Logged out");
        Ok(())
    }

    /// The datacenter to work in: the configured one by name, otherwise the
    /// first datacenter under the root folder
    pub async fn datacenter(&self) -> Result<ManagedObjectRef> {
        let children: Vec<ManagedObjectRef> = self
            .get_property(&self.content.root_folder, "childEntity")
            .await?;
        let mut datacenters = children.into_iter().filter(|c| c.kind == "Datacenter");

        match &self.datacenter {
            None => datacenters
                .next()
                .ok_or_else(|| CoreError::Config("inventory contains no datacenter".to_string())),
            Some(wanted) => {
                for dc in datacenters {
                    let name: String = self.get_property(&dc, "name").await?;
                    if name == *wanted {
                        return Ok(dc);
                    }
                }
                Err(CoreError::Config(format!("datacenter '{}' not found", wanted)))
            }
        }
    }

    /// Folder that holds switches and port groups for the datacenter
    pub async fn network_folder(&self) -> Result<ManagedObjectRef> {
        let dc = self.datacenter().await?;
        let folder: ManagedObjectRef = self.get_property(&dc, "networkFolder").await?;
        debug!("Using network folder {} of {}", folder, dc);
        Ok(folder)
    }

    /// Find a switch by name directly under the network folder
    pub async fn find_switch(&self, name: &str) -> Result<Option<ManagedObjectRef>> {
        let folder = self.network_folder().await?;
        let children: Vec<ManagedObjectRef> = self.get_property(&folder, "childEntity").await?;
        for child in children.into_iter().filter(|c| is_switch_type(&c.kind)) {
            let child_name: String = self.get_property(&child, "name").await?;
            if child_name == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Like [`Session::find_switch`] but a missing switch is an error
    pub async fn require_switch(&self, name: &str) -> Result<ManagedObjectRef> {
        self.find_switch(name)
            .await?
            .ok_or_else(|| CoreError::Validation(format!("switch '{}' not found", name)))
    }

    /// Resolve a host by IP address or DNS name
    pub async fn find_host(&self, host: &str) -> Result<ManagedObjectRef> {
        let index = self
            .content
            .search_index
            .clone()
            .ok_or_else(|| CoreError::Config("endpoint exposes no SearchIndex".to_string()))?;

        let found: Option<ManagedObjectRef> = if host.parse::<IpAddr>().is_ok() {
            self.invoke(&index, "FindByIp", &FindByIp { ip: host, vm_search: false })
                .await?
        } else {
            self.invoke(
                &index,
                "FindByDnsName",
                &FindByDnsName {
                    dns_name: host,
                    vm_search: false,
                },
            )
            .await?
        };
        found.ok_or_else(|| CoreError::Validation(format!("host '{}' not found in inventory", host)))
    }

    /// Current `configVersion` of a switch, required to reconfigure it
    pub async fn config_version(&self, switch: &ManagedObjectRef) -> Result<String> {
        let config: DvsConfigInfo = self.get_property(switch, "config").await?;
        Ok(config.config_version)
    }

    async fn host_specs(&self, members: &[HostMember]) -> Result<Vec<HostMemberConfigSpec>> {
        let mut specs = Vec::with_capacity(members.len());
        for member in members {
            let host = self.find_host(&member.host).await?;
            debug!("Host {} resolved to {}", member.host, host);
            specs.push(HostMemberConfigSpec::add(host, &member.nics));
        }
        Ok(specs)
    }

    async fn task_handle(&self, task: ManagedObjectRef, kind: OperationKind) -> Result<OperationHandle> {
        let info: TaskInfo = self.get_property(&task, "info").await.map_err(|e| match e {
            CoreError::UnexpectedFault { message, .. } => CoreError::unexpected(
                kind.to_string(),
                &task.value,
                format!("reading task info: {}", message),
            ),
            other => other,
        })?;
        trace!("Task {} ({}) is {}", task.value, info.key, info.state);
        info.into_handle(&task, kind)
            .map_err(|msg| CoreError::unexpected(kind.to_string(), &task.value, msg))
    }

    fn url(&self, moref: &ManagedObjectRef, member: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.root,
            urlencoding::encode(&moref.kind),
            urlencoding::encode(&moref.value),
            member
        )
    }

    /// Read one property of a managed object
    pub async fn get_property<T: DeserializeOwned>(
        &self,
        moref: &ManagedObjectRef,
        property: &str,
    ) -> Result<T> {
        let url = self.url(moref, property);
        trace!("GET {}", url);
        let response = self
            .http
            .get(&url)
            .header(SESSION_HEADER, &self.session_id)
            .send()
            .await?;
        self.read(response, moref, property)
            .await?
            .ok_or_else(|| CoreError::unexpected(property, &moref.value, "property was empty"))
    }

    /// Invoke a method on a managed object; `None` for methods returning nothing
    pub async fn invoke<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        moref: &ManagedObjectRef,
        method: &str,
        body: &B,
    ) -> Result<Option<T>> {
        let url = self.url(moref, method);
        trace!("POST {}", url);
        let mut request = self.http.post(&url).header(SESSION_HEADER, &self.session_id);
        let body = serde_json::to_value(body)
            .map_err(|e| CoreError::unexpected(method, &moref.value, e.to_string()))?;
        if !body.is_null() {
            request = request.json(&body);
        }
        let response = request.send().await?;
        self.read(response, moref, method).await
    }

    async fn read<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        moref: &ManagedObjectRef,
        member: &str,
    ) -> Result<Option<T>> {
        let status = response.status();
        let bytes = response.bytes().await?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CoreError::Connection(
                "session is no longer authenticated".to_string(),
            ));
        }

        if !status.is_success() {
            let message = serde_json::from_slice::<Value>(&bytes)
                .ok()
                .map(|v| fault_from_value(v).to_string())
                .unwrap_or_else(|| format!("HTTP {}", status));
            warn!("{} on {} failed: {}", member, moref, message);
            return Err(CoreError::unexpected(member, &moref.value, message));
        }

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::unexpected(member, &moref.value, format!("invalid JSON: {}", e)))?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| CoreError::unexpected(member, &moref.value, format!("unexpected response: {}", e)))
    }
}

#[async_trait]
impl RemoteManagementClient for Session {
    async fn submit_operation(&self, request: &OperationRequest) -> Result<OperationHandle> {
        request.validate()?;
        let kind = request.kind();
        info!("Submitting: {}", request.describe());

        let (target, method, body) = match request {
            OperationRequest::CreateSwitch(params) => {
                let hosts = self.host_specs(&params.hosts).await?;
                let spec = DvsCreateSpec::new(DvsConfigSpec::for_create(params, hosts));
                let folder = self.network_folder().await?;
                (folder, "CreateDVS_Task", serde_json::to_value(SpecArg { spec }))
            }
            OperationRequest::AddPortGroup(params) => {
                let spec = vec![PortgroupConfigSpec::from(params)];
                (
                    params.switch.clone(),
                    "AddDVPortgroup_Task",
                    serde_json::to_value(SpecArg { spec }),
                )
            }
            OperationRequest::AddHostMembers(params) => {
                let version = self.config_version(&params.switch).await?;
                let hosts = self.host_specs(&params.hosts).await?;
                let spec = DvsConfigSpec::for_reconfigure(version, hosts);
                (
                    params.switch.clone(),
                    "ReconfigureDvs_Task",
                    serde_json::to_value(SpecArg { spec }),
                )
            }
        };
        let body = body.map_err(|e| CoreError::unexpected(kind.to_string(), "-", e.to_string()))?;

        let task: ManagedObjectRef = self
            .invoke(&target, method, &body)
            .await?
            .ok_or_else(|| CoreError::unexpected(kind.to_string(), "-", format!("{} returned no task", method)))?;
        debug!("{} started task {}", method, task.value);
        self.task_handle(task, kind).await
    }

    async fn refresh(&self, handle: &OperationHandle) -> Result<OperationHandle> {
        self.task_handle(ManagedObjectRef::new("Task", handle.id.clone()), handle.kind)
            .await
    }
}
