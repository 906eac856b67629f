//! Convenience parameter structs for switch operations
//!
//! Each struct is validated before anything is sent to the server, so a
//! malformed name or an empty host list never turns into a half-created
//! switch.

use crate::error::{CoreError, Result};
use crate::request::ManagedObjectRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv6Addr};

/// Longest entity name vCenter accepts
pub const MAX_NAME_LEN: usize = 80;

/// Port count vCenter assigns a new port group when none is given
pub const DEFAULT_PORTGROUP_PORTS: u32 = 8;

fn validate_name(what: &str, name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{} must not be empty", what)));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "{} '{}' is longer than {} characters",
            what, trimmed, MAX_NAME_LEN
        )));
    }
    if let Some(c) = trimmed.chars().find(|c| matches!(c, '/' | '\\' | '%')) {
        return Err(CoreError::Validation(format!(
            "{} '{}' contains reserved character '{}'",
            what, trimmed, c
        )));
    }
    Ok(())
}

/// A physical host and the NICs to uplink into the switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMember {
    /// DNS name or IP address of the ESXi host
    pub host: String,
    /// Physical NIC device names, e.g. `vmnic1`
    #[serde(default)]
    pub nics: Vec<String>,
}

impl HostMember {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            nics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_nic(mut self, nic: impl Into<String>) -> Self {
        self.nics.push(nic.into());
        self
    }

    /// Parse `host[:nic[,nic...]]`, the form accepted on the command line.
    ///
    /// A bare IPv6 address is a host without NICs; to give it NICs write
    /// `[addr]:nic,nic`.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (host, nics) = if spec.parse::<IpAddr>().is_ok() {
            (spec, None)
        } else if let Some(rest) = spec.strip_prefix('[') {
            let (addr, tail) = rest.split_once(']').ok_or_else(|| {
                CoreError::Validation(format!("missing ']' in host '{}'", spec))
            })?;
            if addr.parse::<Ipv6Addr>().is_err() {
                return Err(CoreError::Validation(format!(
                    "'{}' is not an IPv6 address",
                    addr
                )));
            }
            match tail {
                "" => (addr, None),
                _ => match tail.strip_prefix(':') {
                    Some(nics) => (addr, Some(nics)),
                    None => {
                        return Err(CoreError::Validation(format!(
                            "expected ':' after ']' in host '{}'",
                            spec
                        )));
                    }
                },
            }
        } else {
            match spec.split_once(':') {
                Some((_, nics)) if nics.contains(':') => {
                    return Err(CoreError::Validation(format!(
                        "cannot tell host from NICs in '{}'; write IPv6 hosts as [addr]:nic",
                        spec
                    )));
                }
                Some((host, nics)) => (host, Some(nics)),
                None => (spec, None),
            }
        };
        let member = Self {
            host: host.trim().to_string(),
            nics: nics
                .map(|nics| {
                    nics.split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        };
        member.validate()?;
        Ok(member)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(CoreError::Validation("host name must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for nic in &self.nics {
            if nic.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "empty NIC name for host '{}'",
                    self.host
                )));
            }
            if !seen.insert(nic.as_str()) {
                return Err(CoreError::Validation(format!(
                    "NIC '{}' listed twice for host '{}'",
                    nic, self.host
                )));
            }
        }
        Ok(())
    }
}

fn validate_members(members: &[HostMember]) -> Result<()> {
    let mut seen = HashSet::new();
    for member in members {
        member.validate()?;
        if !seen.insert(member.host.to_lowercase()) {
            return Err(CoreError::Validation(format!(
                "host '{}' listed more than once",
                member.host
            )));
        }
    }
    Ok(())
}

/// Parameters for creating a distributed virtual switch
///
/// # Example
///
/// ```rust
/// use dvsctl_core::params::{CreateSwitchParams, HostMember};
///
/// let params = CreateSwitchParams::new("dvs-prod")
///     .with_description("production uplinks")
///     .with_max_ports(512)
///     .with_host(HostMember::new("esx01.lab").with_nic("vmnic1"));
///
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSwitchParams {
    /// Switch name (required)
    pub name: String,
    pub description: Option<String>,
    /// Upper bound on ports across all port groups
    pub max_ports: Option<u32>,
    /// Ports not bound to any port group
    pub num_standalone_ports: Option<u32>,
    /// Hosts joined to the switch as part of creation
    #[serde(default)]
    pub hosts: Vec<HostMember>,
}

impl CreateSwitchParams {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            max_ports: None,
            num_standalone_ports: None,
            hosts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_max_ports(mut self, max_ports: u32) -> Self {
        self.max_ports = Some(max_ports);
        self
    }

    #[must_use]
    pub fn with_standalone_ports(mut self, ports: u32) -> Self {
        self.num_standalone_ports = Some(ports);
        self
    }

    #[must_use]
    pub fn with_host(mut self, member: HostMember) -> Self {
        self.hosts.push(member);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name("switch name", &self.name)?;
        if self.max_ports == Some(0) {
            return Err(CoreError::Validation(
                "max ports must be at least 1".to_string(),
            ));
        }
        if let (Some(max), Some(standalone)) = (self.max_ports, self.num_standalone_ports)
            && standalone > max
        {
            return Err(CoreError::Validation(format!(
                "standalone ports ({}) exceed max ports ({})",
                standalone, max
            )));
        }
        validate_members(&self.hosts)
    }
}

/// How ports in a port group are bound to virtual NICs
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PortBinding {
    /// Static binding: a port is assigned when a VM is connected
    #[default]
    Early,
    /// Dynamic binding: a port is assigned when a VM powers on
    Late,
    /// No binding: ports are created on demand
    Ephemeral,
}

impl PortBinding {
    /// Value of `DVPortgroupConfigSpec.type`
    pub fn as_vim_type(self) -> &'static str {
        match self {
            PortBinding::Early => "earlyBinding",
            PortBinding::Late => "lateBinding",
            PortBinding::Ephemeral => "ephemeral",
        }
    }
}

/// Parameters for adding a port group to an existing switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortGroupParams {
    pub switch: ManagedObjectRef,
    pub name: String,
    pub num_ports: u32,
    pub binding: PortBinding,
    pub description: Option<String>,
}

impl PortGroupParams {
    #[must_use]
    pub fn new(switch: ManagedObjectRef, name: impl Into<String>) -> Self {
        Self {
            switch,
            name: name.into(),
            num_ports: DEFAULT_PORTGROUP_PORTS,
            binding: PortBinding::default(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_ports(mut self, num_ports: u32) -> Self {
        self.num_ports = num_ports;
        self
    }

    #[must_use]
    pub fn with_binding(mut self, binding: PortBinding) -> Self {
        self.binding = binding;
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name("port group name", &self.name)?;
        if self.num_ports == 0 && self.binding != PortBinding::Ephemeral {
            return Err(CoreError::Validation(
                "port group needs at least 1 port unless binding is ephemeral".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parameters for joining hosts (and their uplink NICs) to a switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostMembershipParams {
    pub switch: ManagedObjectRef,
    pub hosts: Vec<HostMember>,
}

impl HostMembershipParams {
    #[must_use]
    pub fn new(switch: ManagedObjectRef) -> Self {
        Self {
            switch,
            hosts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_host(mut self, member: HostMember) -> Self {
        self.hosts.push(member);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(CoreError::Validation(
                "at least one host is required".to_string(),
            ));
        }
        validate_members(&self.hosts)
    }
}
