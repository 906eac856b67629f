//! # dvsctl-core
//!
//! Library behind the `dvsctl` CLI: submit an asynchronous operation to a
//! vSphere endpoint, poll it until it finishes, and hand back the result.
//!
//! ## Layers
//!
//! - [`operation`] - handles, states, faults and outcomes
//! - [`progress`] - the [`OperationWatcher`] that polls a handle to a
//!   terminal state, with throttling, deadline and cancellation
//! - [`client`] - the [`RemoteManagementClient`] seam the watcher polls through
//! - [`request`] / [`params`] - typed, validated requests
//! - [`vsphere`] - the VI/JSON collaborator ([`VsphereClient`], [`Session`])
//! - [`workflows`] - submit-and-wait helpers for switches, port groups and hosts
//! - [`config`] - profiles and credentials
//!
//! ## Example
//!
//! ```rust,ignore
//! use dvsctl_core::{CreateSwitchParams, PollPolicy, VsphereClient, create_switch_and_wait, with_session};
//!
//! let client = VsphereClient::builder()
//!     .host("vcenter.lab.local")
//!     .username("administrator@vsphere.local")
//!     .password(password)
//!     .build()?;
//!
//! let switch = with_session(&client, |session| async move {
//!     create_switch_and_wait(&session, &CreateSwitchParams::new("dvs-01"), PollPolicy::default(), None).await
//! })
//! .await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod operation;
pub mod params;
pub mod progress;
pub mod request;
pub mod vsphere;
pub mod workflows;

pub use client::RemoteManagementClient;
pub use config::{Config, ConfigError, CredentialStore, Profile};
pub use error::{CoreError, Result};
pub use operation::{OperationHandle, OperationKind, OperationOutcome, OperationState, RemoteFault};
pub use params::{CreateSwitchParams, HostMember, HostMembershipParams, PortBinding, PortGroupParams};
pub use progress::{
    OperationWatcher, PollPolicy, ProgressCallback, ProgressEvent, poll_operation, submit_and_watch,
};
pub use request::{ManagedObjectRef, OperationRequest};
pub use vsphere::{Session, VsphereClient, VsphereClientBuilder, with_session, with_session_until};
pub use workflows::{
    PortGroupTemplate, ProvisionPlan, ProvisionReport, add_hosts_and_wait, add_port_group_and_wait,
    create_switch_and_wait, provision_switch,
};
