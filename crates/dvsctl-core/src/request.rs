//! Typed requests submitted to the remote management client

use crate::error::Result;
use crate::operation::OperationKind;
use crate::params::{CreateSwitchParams, HostMembershipParams, PortGroupParams};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Reference to a managed object on the server (`type` + `value`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct ManagedObjectRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl ManagedObjectRef {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

// VI/JSON wants the type discriminator on every data object it receives
impl Serialize for ManagedObjectRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ManagedObjectReference", 3)?;
        s.serialize_field("_typeName", "ManagedObjectReference")?;
        s.serialize_field("type", &self.kind)?;
        s.serialize_field("value", &self.value)?;
        s.end()
    }
}

impl fmt::Display for ManagedObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// One request per operation kind
#[derive(Debug, Clone, PartialEq)]
pub enum OperationRequest {
    CreateSwitch(CreateSwitchParams),
    AddPortGroup(PortGroupParams),
    AddHostMembers(HostMembershipParams),
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::CreateSwitch(_) => OperationKind::CreateSwitch,
            OperationRequest::AddPortGroup(_) => OperationKind::AddPortGroup,
            OperationRequest::AddHostMembers(_) => OperationKind::AddHostMembers,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            OperationRequest::CreateSwitch(p) => p.validate(),
            OperationRequest::AddPortGroup(p) => p.validate(),
            OperationRequest::AddHostMembers(p) => p.validate(),
        }
    }

    /// Short description for logs and progress messages
    pub fn describe(&self) -> String {
        match self {
            OperationRequest::CreateSwitch(p) => format!("create switch '{}'", p.name),
            OperationRequest::AddPortGroup(p) => {
                format!("add port group '{}' to {}", p.name, p.switch)
            }
            OperationRequest::AddHostMembers(p) => {
                format!("add {} host(s) to {}", p.hosts.len(), p.switch)
            }
        }
    }
}

impl From<CreateSwitchParams> for OperationRequest {
    fn from(p: CreateSwitchParams) -> Self {
        OperationRequest::CreateSwitch(p)
    }
}

impl From<PortGroupParams> for OperationRequest {
    fn from(p: PortGroupParams) -> Self {
        OperationRequest::AddPortGroup(p)
    }
}

impl From<HostMembershipParams> for OperationRequest {
    fn from(p: HostMembershipParams) -> Self {
        OperationRequest::AddHostMembers(p)
    }
}
