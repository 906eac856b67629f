//! Switch workflows - submit and wait
//!
//! These compose [`RemoteManagementClient`] calls with the
//! [`OperationWatcher`] so callers get the finished object back instead of
//! a task handle. Nothing here retries: the first failure is returned.

use crate::client::RemoteManagementClient;
use crate::error::{CoreError, Result};
use crate::operation::OperationKind;
use crate::params::{CreateSwitchParams, HostMember, HostMembershipParams, PortBinding, PortGroupParams};
use crate::progress::{OperationWatcher, PollPolicy, ProgressCallback};
use crate::request::{ManagedObjectRef, OperationRequest};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

pub use crate::progress::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT};

fn watcher<C: RemoteManagementClient + ?Sized>(
    client: &C,
    policy: PollPolicy,
    on_progress: Option<ProgressCallback>,
) -> OperationWatcher<'_, C> {
    let watcher = OperationWatcher::new(client).with_policy(policy);
    match on_progress {
        Some(cb) => watcher.on_progress(cb),
        None => watcher,
    }
}

/// Submit one request and return its success payload
async fn run<C: RemoteManagementClient + ?Sized>(
    watcher: &mut OperationWatcher<'_, C>,
    request: OperationRequest,
) -> Result<Value> {
    watcher.submit(&request).await?.into_result()
}

fn to_moref(kind: OperationKind, value: Value) -> Result<ManagedObjectRef> {
    serde_json::from_value(value.clone()).map_err(|_| {
        CoreError::unexpected(
            kind.to_string(),
            "-",
            format!("expected a managed object reference, got {}", value),
        )
    })
}

/// Create a distributed virtual switch and wait for completion
///
/// # Arguments
///
/// * `client` - Anything that can submit and refresh operations
/// * `params` - Switch name, description, port limits and initial hosts
/// * `policy` - Polling interval and deadline
/// * `on_progress` - Optional callback for progress updates
///
/// # Example
///
/// ```rust,ignore
/// use dvsctl_core::{CreateSwitchParams, PollPolicy, create_switch_and_wait};
///
/// let switch = create_switch_and_wait(
///     &session,
///     &CreateSwitchParams::new("dvs-prod"),
///     PollPolicy::default(),
///     None,
/// ).await?;
///
/// println!("Created {}", switch);
/// ```
pub async fn create_switch_and_wait<C: RemoteManagementClient + ?Sized>(
    client: &C,
    params: &CreateSwitchParams,
    policy: PollPolicy,
    on_progress: Option<ProgressCallback>,
) -> Result<ManagedObjectRef> {
    let mut watcher = watcher(client, policy, on_progress);
    let value = run(&mut watcher, params.clone().into()).await?;
    to_moref(OperationKind::CreateSwitch, value)
}

/// Add a port group to an existing switch and wait for completion
pub async fn add_port_group_and_wait<C: RemoteManagementClient + ?Sized>(
    client: &C,
    params: &PortGroupParams,
    policy: PollPolicy,
    on_progress: Option<ProgressCallback>,
) -> Result<()> {
    let mut watcher = watcher(client, policy, on_progress);
    run(&mut watcher, params.clone().into()).await?;
    Ok(())
}

/// Join hosts (and their uplink NICs) to an existing switch
pub async fn add_hosts_and_wait<C: RemoteManagementClient + ?Sized>(
    client: &C,
    params: &HostMembershipParams,
    policy: PollPolicy,
    on_progress: Option<ProgressCallback>,
) -> Result<()> {
    let mut watcher = watcher(client, policy, on_progress);
    run(&mut watcher, params.clone().into()).await?;
    Ok(())
}

/// Port group to add once the switch exists
#[derive(Debug, Clone, PartialEq)]
pub struct PortGroupTemplate {
    pub name: String,
    pub num_ports: u32,
    pub binding: PortBinding,
    pub description: Option<String>,
}

impl PortGroupTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            num_ports: crate::params::DEFAULT_PORTGROUP_PORTS,
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

    pub fn for_switch(&self, switch: ManagedObjectRef) -> PortGroupParams {
        let params = PortGroupParams::new(switch, self.name.clone())
            .with_ports(self.num_ports)
            .with_binding(self.binding);
        match &self.description {
            Some(d) => params.with_description(d.clone()),
            None => params,
        }
    }
}

/// Everything `provision_switch` should do, in order
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionPlan {
    pub switch: CreateSwitchParams,
    pub port_group: Option<PortGroupTemplate>,
    /// Joined after creation with a separate reconfigure task
    pub hosts: Vec<HostMember>,
}

impl ProvisionPlan {
    pub fn new(switch: CreateSwitchParams) -> Self {
        Self {
            switch,
            port_group: None,
            hosts: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_port_group(mut self, port_group: PortGroupTemplate) -> Self {
        self.port_group = Some(port_group);
        self
    }

    #[must_use]
    pub fn with_host(mut self, member: HostMember) -> Self {
        self.hosts.push(member);
        self
    }

    /// Check every step up front so a bad port group never leaves a
    /// half-provisioned switch behind
    pub fn validate(&self) -> Result<()> {
        self.switch.validate()?;
        let placeholder = ManagedObjectRef::new("VmwareDistributedVirtualSwitch", "pending");
        if let Some(pg) = &self.port_group {
            pg.for_switch(placeholder.clone()).validate()?;
        }
        if !self.hosts.is_empty() {
            HostMembershipParams {
                switch: placeholder,
                hosts: self.hosts.clone(),
            }
            .validate()?;
        }
        Ok(())
    }
}

/// What `provision_switch` did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionReport {
    pub switch: ManagedObjectRef,
    pub switch_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_group: Option<String>,
    pub hosts_added: usize,
    /// Refresh calls made across all steps
    pub polls: u32,
}

/// Create a switch, then optionally add a port group, then optionally join
/// hosts. Stops at the first failed step.
pub async fn provision_switch<C: RemoteManagementClient + ?Sized>(
    client: &C,
    plan: &ProvisionPlan,
    policy: PollPolicy,
    on_progress: Option<ProgressCallback>,
) -> Result<ProvisionReport> {
    plan.validate()?;
    let mut watcher = watcher(client, policy, on_progress);

    // Step 1: the switch itself
    let value = run(&mut watcher, plan.switch.clone().into()).await?;
    let switch = to_moref(OperationKind::CreateSwitch, value)?;
    info!("Switch '{}' created as {}", plan.switch.name, switch);

    // Step 2: port group
    let port_group = match &plan.port_group {
        Some(template) => {
            run(&mut watcher, template.for_switch(switch.clone()).into()).await?;
            info!("Port group '{}' added", template.name);
            Some(template.name.clone())
        }
        None => None,
    };

    // Step 3: host members
    if !plan.hosts.is_empty() {
        let params = HostMembershipParams {
            switch: switch.clone(),
            hosts: plan.hosts.clone(),
        };
        run(&mut watcher, params.into()).await?;
        info!("{} host(s) joined", plan.hosts.len());
    }

    Ok(ProvisionReport {
        switch,
        switch_name: plan.switch.name.clone(),
        port_group,
        hosts_added: plan.hosts.len(),
        polls: watcher.polls(),
    })
}
