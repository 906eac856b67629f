//! Wire types for the VI/JSON protocol
//!
//! Only the handful of vim25 data objects the switch workflows touch are
//! modeled. Every outgoing data object carries its `_typeName`.

use crate::operation::{OperationHandle, OperationKind, OperationState, RemoteFault};
use crate::params::{CreateSwitchParams, PortGroupParams};
use crate::request::ManagedObjectRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Subset of `ServiceContent`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContent {
    pub root_folder: ManagedObjectRef,
    pub session_manager: ManagedObjectRef,
    #[serde(default)]
    pub search_index: Option<ManagedObjectRef>,
    #[serde(default)]
    pub about: Option<AboutInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AboutInfo {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub user_name: &'a str,
    pub password: &'a str,
}

/// `LocalizedMethodFault`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedMethodFault {
    #[serde(default)]
    pub fault: Value,
    #[serde(default)]
    pub localized_message: Option<String>,
}

/// Subset of `TaskInfo`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub key: String,
    pub state: String,
    #[serde(default)]
    pub progress: Option<i32>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub entity: Option<ManagedObjectRef>,
    #[serde(default)]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub queue_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub complete_time: Option<DateTime<Utc>>,
}

impl TaskInfo {
    /// Convert to a handle.
    ///
    /// Tasks whose method returns nothing (adding a port group,
    /// reconfiguring a switch) report their target `entity` as the result.
    pub fn into_handle(self, task: &ManagedObjectRef, kind: OperationKind) -> Result<OperationHandle, String> {
        let state: OperationState = self
            .state
            .parse()
            .map_err(|_| format!("server reported unknown task state '{}'", self.state))?;

        let mut handle = OperationHandle::new(task.value.clone(), kind, state);
        handle.progress = self.progress.map(|p| p.clamp(0, 100) as u8);

        match state {
            OperationState::Success => {
                handle.result = self
                    .result
                    .filter(|v| !v.is_null())
                    .or_else(|| self.entity.and_then(|e| serde_json::to_value(e).ok()));
            }
            OperationState::Error => {
                handle.error = self.error.map(fault_from_value);
            }
            OperationState::Queued | OperationState::Running => {}
        }
        Ok(handle)
    }
}

/// Build a [`RemoteFault`] from a `LocalizedMethodFault` or a bare fault body
pub fn fault_from_value(value: Value) -> RemoteFault {
    let parsed: Option<LocalizedMethodFault> = serde_json::from_value(value.clone()).ok();
    let fault = parsed
        .as_ref()
        .map(|p| &p.fault)
        .filter(|f| !f.is_null())
        .unwrap_or(&value);

    let fault_type = fault
        .get("_typeName")
        .and_then(Value::as_str)
        .map(String::from);
    let message = parsed
        .as_ref()
        .and_then(|p| p.localized_message.clone())
        .filter(|m| !m.is_empty())
        .or_else(|| fault_message(fault))
        .or_else(|| fault_type.clone())
        .unwrap_or_else(|| "operation failed without a message".to_string());

    let mut remote = RemoteFault::new(message).with_detail(value.clone());
    if let Some(t) = fault_type {
        remote = remote.with_fault_type(t);
    }
    remote
}

/// First readable message in a fault body
pub fn fault_message(fault: &Value) -> Option<String> {
    if let Some(msg) = fault.get("message").and_then(Value::as_str) {
        return Some(msg.to_string());
    }
    fault
        .get("faultMessage")
        .and_then(Value::as_array)
        .and_then(|msgs| msgs.iter().find_map(|m| m.get("message")?.as_str()))
        .map(String::from)
}

#[derive(Debug, Serialize)]
pub struct PnicSpec {
    #[serde(rename = "_typeName")]
    type_name: &'static str,
    #[serde(rename = "pnicDevice")]
    pub pnic_device: String,
}

#[derive(Debug, Serialize)]
pub struct PnicBacking {
    #[serde(rename = "_typeName")]
    type_name: &'static str,
    #[serde(rename = "pnicSpec")]
    pub pnic_spec: Vec<PnicSpec>,
}

/// `DistributedVirtualSwitchHostMemberConfigSpec` for an `add`
#[derive(Debug, Serialize)]
pub struct HostMemberConfigSpec {
    #[serde(rename = "_typeName")]
    type_name: &'static str,
    pub operation: &'static str,
    pub host: ManagedObjectRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backing: Option<PnicBacking>,
}

impl HostMemberConfigSpec {
    pub fn add(host: ManagedObjectRef, nics: &[String]) -> Self {
        let backing = (!nics.is_empty()).then(|| PnicBacking {
            type_name: "DistributedVirtualSwitchHostMemberPnicBacking",
            pnic_spec: nics
                .iter()
                .map(|nic| PnicSpec {
                    type_name: "DistributedVirtualSwitchHostMemberPnicSpec",
                    pnic_device: nic.clone(),
                })
                .collect(),
        });
        Self {
            type_name: "DistributedVirtualSwitchHostMemberConfigSpec",
            operation: "add",
            host,
            backing,
        }
    }
}

/// `DVSConfigSpec`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvsConfigSpec {
    #[serde(rename = "_typeName")]
    type_name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ports: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_standalone_ports: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<HostMemberConfigSpec>,
}

impl DvsConfigSpec {
    pub fn for_create(params: &CreateSwitchParams, host: Vec<HostMemberConfigSpec>) -> Self {
        Self {
            type_name: "DVSConfigSpec",
            config_version: None,
            name: Some(params.name.trim().to_string()),
            description: params.description.clone(),
            max_ports: params.max_ports,
            num_standalone_ports: params.num_standalone_ports,
            host,
        }
    }

    pub fn for_reconfigure(config_version: String, host: Vec<HostMemberConfigSpec>) -> Self {
        Self {
            type_name: "DVSConfigSpec",
            config_version: Some(config_version),
            name: None,
            description: None,
            max_ports: None,
            num_standalone_ports: None,
            host,
        }
    }
}

/// `DVSCreateSpec`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DvsCreateSpec {
    #[serde(rename = "_typeName")]
    type_name: &'static str,
    pub config_spec: DvsConfigSpec,
}

impl DvsCreateSpec {
    pub fn new(config_spec: DvsConfigSpec) -> Self {
        Self {
            type_name: "DVSCreateSpec",
            config_spec,
        }
    }
}

/// `DVPortgroupConfigSpec`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortgroupConfigSpec {
    #[serde(rename = "_typeName")]
    type_name: &'static str,
    pub name: String,
    pub num_ports: u32,
    #[serde(rename = "type")]
    pub binding: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&PortGroupParams> for PortgroupConfigSpec {
    fn from(params: &PortGroupParams) -> Self {
        Self {
            type_name: "DVPortgroupConfigSpec",
            name: params.name.trim().to_string(),
            num_ports: params.num_ports,
            binding: params.binding.as_vim_type(),
            description: params.description.clone(),
        }
    }
}

/// Body of a method taking a single `spec` argument
#[derive(Debug, Serialize)]
pub struct SpecArg<T: Serialize> {
    pub spec: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindByDnsName<'a> {
    pub dns_name: &'a str,
    pub vm_search: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindByIp<'a> {
    pub ip: &'a str,
    pub vm_search: bool,
}

/// Subset of `DVSConfigInfo`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DvsConfigInfo {
    pub config_version: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{HostMember, PortBinding};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task() -> ManagedObjectRef {
        ManagedObjectRef::new("Task", "task-101")
    }

    #[test]
    fn task_info_success_with_result() {
        let info: TaskInfo = serde_json::from_value(json!({
            "_typeName": "TaskInfo",
            "key": "task-101",
            "state": "success",
            "result": {"_typeName": "ManagedObjectReference", "type": "VmwareDistributedVirtualSwitch", "value": "dvs-42"},
            "queueTime": "2024-03-01T10:00:00Z"
        }))
        .unwrap();
        assert!(info.queue_time.is_some());
        let handle = info.into_handle(&task(), OperationKind::CreateSwitch).unwrap();
        assert_eq!(handle.state, OperationState::Success);
        assert_eq!(handle.result.unwrap()["value"], "dvs-42");
    }

    #[test]
    fn task_info_void_success_uses_entity() {
        let info: TaskInfo = serde_json::from_value(json!({
            "key": "task-102",
            "state": "success",
            "entity": {"type": "VmwareDistributedVirtualSwitch", "value": "dvs-42"}
        }))
        .unwrap();
        let handle = info.into_handle(&task(), OperationKind::AddPortGroup).unwrap();
        assert_eq!(handle.result.unwrap()["value"], "dvs-42");
    }

    #[test]
    fn task_info_error_keeps_fault() {
        let error = json!({
            "_typeName": "LocalizedMethodFault",
            "fault": {"_typeName": "DuplicateName", "name": "dvs-01"},
            "localizedMessage": "The name 'dvs-01' already exists."
        });
        let info: TaskInfo = serde_json::from_value(json!({
            "key": "task-103",
            "state": "error",
            "error": error.clone()
        }))
        .unwrap();
        let handle = info.into_handle(&task(), OperationKind::CreateSwitch).unwrap();
        let fault = handle.error.unwrap();
        assert_eq!(fault.message, "The name 'dvs-01' already exists.");
        assert_eq!(fault.fault_type.as_deref(), Some("DuplicateName"));
        assert_eq!(fault.detail, error);
    }

    #[test]
    fn task_info_unknown_state() {
        let info: TaskInfo =
            serde_json::from_value(json!({"key": "task-1", "state": "paused"})).unwrap();
        assert!(info.into_handle(&task(), OperationKind::CreateSwitch).is_err());
    }

    #[test]
    fn bare_fault_message() {
        let fault = fault_from_value(json!({
            "_typeName": "InvalidLogin",
            "faultMessage": [{"key": "x", "message": "Cannot complete login"}]
        }));
        assert_eq!(fault.message, "Cannot complete login");
        assert_eq!(fault.fault_type.as_deref(), Some("InvalidLogin"));
    }

    #[test]
    fn create_spec_shape() {
        let params = CreateSwitchParams::new(" dvs-01 ").with_max_ports(64);
        let hosts = vec![HostMemberConfigSpec::add(
            ManagedObjectRef::new("HostSystem", "host-12"),
            &HostMember::new("esx01").with_nic("vmnic1").nics,
        )];
        let spec = DvsCreateSpec::new(DvsConfigSpec::for_create(&params, hosts));
        assert_eq!(
            serde_json::to_value(&SpecArg { spec }).unwrap(),
            json!({
                "spec": {
                    "_typeName": "DVSCreateSpec",
                    "configSpec": {
                        "_typeName": "DVSConfigSpec",
                        "name": "dvs-01",
                        "maxPorts": 64,
                        "host": [{
                            "_typeName": "DistributedVirtualSwitchHostMemberConfigSpec",
                            "operation": "add",
                            "host": {"_typeName": "ManagedObjectReference", "type": "HostSystem", "value": "host-12"},
                            "backing": {
                                "_typeName": "DistributedVirtualSwitchHostMemberPnicBacking",
                                "pnicSpec": [{
                                    "_typeName": "DistributedVirtualSwitchHostMemberPnicSpec",
                                    "pnicDevice": "vmnic1"
                                }]
                            }
                        }]
                    }
                }
            })
        );
    }

    #[test]
    fn portgroup_spec_shape() {
        let params = PortGroupParams::new(ManagedObjectRef::new("VmwareDistributedVirtualSwitch", "dvs-42"), "pg-web")
            .with_ports(16)
            .with_binding(PortBinding::Late);
        let spec = PortgroupConfigSpec::from(&params);
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"_typeName": "DVPortgroupConfigSpec", "name": "pg-web", "numPorts": 16, "type": "lateBinding"})
        );
    }
}
