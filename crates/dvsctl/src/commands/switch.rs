//! Distributed switch command implementations
//!
//! Each handler logs in, submits one or more vCenter tasks through the core
//! workflows, drives a spinner from the watcher's progress events, and logs
//! out again no matter how the task ended.

use std::future::Future;
use std::time::Duration;

use dvsctl_core::{
    CreateSwitchParams, HostMember, HostMembershipParams, OperationState, PollPolicy,
    PortGroupParams, PortGroupTemplate, ProgressCallback, ProgressEvent, ProvisionPlan, Session,
    VsphereClient, add_hosts_and_wait, add_port_group_and_wait, create_switch_and_wait,
    provision_switch, with_session_until,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::{ConnectionArgs, OutputFormat, SwitchCommands, WaitArgs};
use crate::connection::ConnectionManager;
use crate::error::Result as CliResult;
use crate::output;

/// Handle switch commands
pub async fn handle_switch_command(
    cmd: &SwitchCommands,
    conn_mgr: &ConnectionManager,
    profile_name: Option<&str>,
    connection: &ConnectionArgs,
    wait: &WaitArgs,
    output_format: OutputFormat,
    cancel: CancellationToken,
) -> CliResult<()> {
    // Requests are validated before any password prompt or network call
    let connect = || -> CliResult<(VsphereClient, PollPolicy)> {
        let settings = conn_mgr.resolve_settings(profile_name, connection, wait)?;
        let policy = settings.policy;
        Ok((conn_mgr.create_client(settings)?, policy))
    };
    let format = output::OutputFormat::from(output_format);

    match cmd {
        SwitchCommands::Create {
            name,
            description,
            max_ports,
            standalone_ports,
            members,
        } => {
            let mut params = CreateSwitchParams::new(name);
            if let Some(description) = description {
                params = params.with_description(description);
            }
            if let Some(max) = max_ports {
                params = params.with_max_ports(*max);
            }
            if let Some(ports) = standalone_ports {
                params = params.with_standalone_ports(*ports);
            }
            for member in parse_members(members)? {
                params = params.with_host(member);
            }
            params.validate()?;
            let (client, policy) = connect()?;

            let spinner = spinner(format!("Creating switch '{}'", name));
            let callback = spinner_callback(&spinner);
            let switch = in_session(&client, &cancel, &spinner, |session| async move {
                create_switch_and_wait(&session, &params, policy, Some(callback)).await
            })
            .await?;
            info!("Switch '{}' created as {}", name, switch);

            output::print_output(
                json!({
                    "name": name,
                    "switch": switch,
                    "hosts": members.len(),
                }),
                format,
            )?;
        }

        SwitchCommands::AddPortgroup {
            switch,
            name,
            ports,
            binding,
            description,
        } => {
            let template = {
                let mut t = PortGroupTemplate::new(name).with_ports(*ports).with_binding(*binding);
                if let Some(description) = description {
                    t = t.with_description(description);
                }
                t
            };
            let (client, policy) = connect()?;

            let spinner = spinner(format!("Adding port group '{}' to '{}'", name, switch));
            let callback = spinner_callback(&spinner);
            let switch_name = switch.clone();
            let switch_ref = in_session(&client, &cancel, &spinner, |session| async move {
                let switch_ref = session.require_switch(&switch_name).await?;
                let params: PortGroupParams = template.for_switch(switch_ref.clone());
                add_port_group_and_wait(&session, &params, policy, Some(callback)).await?;
                Ok(switch_ref)
            })
            .await?;

            output::print_output(
                json!({
                    "switch": switch,
                    "switch_ref": switch_ref,
                    "port_group": name,
                    "ports": ports,
                    "binding": binding,
                }),
                format,
            )?;
        }

        SwitchCommands::AddHost { switch, members } => {
            let members = parse_members(members)?;
            let hosts: Vec<String> = members.iter().map(|m| m.host.clone()).collect();
            let (client, policy) = connect()?;

            let spinner = spinner(format!("Joining {} host(s) to '{}'", members.len(), switch));
            let callback = spinner_callback(&spinner);
            let switch_name = switch.clone();
            in_session(&client, &cancel, &spinner, |session| async move {
                let switch_ref = session.require_switch(&switch_name).await?;
                let params = HostMembershipParams {
                    switch: switch_ref,
                    hosts: members,
                };
                add_hosts_and_wait(&session, &params, policy, Some(callback)).await
            })
            .await?;

            output::print_output(json!({ "switch": switch, "hosts_added": hosts }), format)?;
        }

        SwitchCommands::Provision {
            name,
            description,
            max_ports,
            portgroup,
            portgroup_ports,
            binding,
            members,
        } => {
            let mut switch = CreateSwitchParams::new(name);
            if let Some(description) = description {
                switch = switch.with_description(description);
            }
            if let Some(max) = max_ports {
                switch = switch.with_max_ports(*max);
            }
            let mut plan = ProvisionPlan::new(switch);
            if let Some(pg) = portgroup {
                let mut template = PortGroupTemplate::new(pg);
                if let Some(ports) = portgroup_ports {
                    template = template.with_ports(*ports);
                }
                if let Some(binding) = binding {
                    template = template.with_binding(*binding);
                }
                plan = plan.with_port_group(template);
            }
            for member in parse_members(members)? {
                plan = plan.with_host(member);
            }
            plan.validate()?;
            let (client, policy) = connect()?;

            let spinner = spinner(format!("Provisioning switch '{}'", name));
            let callback = spinner_callback(&spinner);
            let report = in_session(&client, &cancel, &spinner, |session| async move {
                provision_switch(&session, &plan, policy, Some(callback)).await
            })
            .await?;

            output::print_output(&report, format)?;
        }
    }

    Ok(())
}

fn parse_members(specs: &[String]) -> CliResult<Vec<HostMember>> {
    specs
        .iter()
        .map(|spec| HostMember::parse(spec).map_err(Into::into))
        .collect()
}

/// Run `f` inside a vCenter session, racing login and work against Ctrl-C.
///
/// A session that was established is still logged out after cancellation.
async fn in_session<T, F, Fut>(
    client: &VsphereClient,
    cancel: &CancellationToken,
    spinner: &ProgressBar,
    f: F,
) -> CliResult<T>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = dvsctl_core::Result<T>>,
{
    let result = with_session_until(client, cancel, f).await;

    match &result {
        Ok(_) => spinner.finish_and_clear(),
        Err(e) => spinner.abandon_with_message(format!("\u{2717} {}", e)),
    }
    Ok(result?)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed_precise}]")
    {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Bridge watcher events onto the spinner
fn spinner_callback(pb: &ProgressBar) -> ProgressCallback {
    let pb = pb.clone();
    Box::new(move |event: ProgressEvent| match event {
        ProgressEvent::Started { operation_id, kind } => {
            pb.set_message(format!("{} {}: submitted", kind, operation_id));
        }
        ProgressEvent::StateChanged {
            operation_id,
            state,
            progress,
            ..
        } => {
            let percent = progress.map(|p| format!(" {}%", p)).unwrap_or_default();
            pb.set_message(format!(
                "{}: {}{}",
                operation_id,
                format_state(state),
                percent
            ));
        }
        ProgressEvent::Completed { operation_id } => {
            pb.println(format!("\u{2713} {} completed", operation_id));
        }
        ProgressEvent::Failed {
            operation_id,
            error,
        } => {
            pb.println(format!("\u{2717} {} failed: {}", operation_id, error));
        }
    })
}

/// Format task state for display with status icons
fn format_state(state: OperationState) -> String {
    match state {
        OperationState::Success => format!("\u{2713} {}", state),
        OperationState::Error => format!("\u{2717} {}", state),
        OperationState::Running => format!("\u{21bb} {}", state),
        OperationState::Queued => format!("\u{2026} {}", state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_parse_host_and_nics() {
        let members =
            parse_members(&["esx01:vmnic1,vmnic2".to_string(), "10.0.0.7".to_string()]).unwrap();
        assert_eq!(members[0].host, "esx01");
        assert_eq!(members[0].nics, vec!["vmnic1", "vmnic2"]);
        assert!(members[1].nics.is_empty());
    }

    #[test]
    fn empty_member_is_rejected() {
        assert!(parse_members(&[":vmnic1".to_string()]).is_err());
    }

    #[test]
    fn state_icons() {
        assert_eq!(format_state(OperationState::Running), "\u{21bb} running");
        assert!(format_state(OperationState::Error).ends_with("error"));
    }

    #[tokio::test]
    async fn callback_tolerates_every_event() {
        let pb = ProgressBar::hidden();
        let callback = spinner_callback(&pb);
        callback(ProgressEvent::Started {
            operation_id: "task-1".into(),
            kind: dvsctl_core::OperationKind::CreateSwitch,
        });
        callback(ProgressEvent::StateChanged {
            operation_id: "task-1".into(),
            state: OperationState::Running,
            progress: Some(40),
            elapsed: Duration::from_secs(1),
        });
        assert!(pb.message().contains("40%"));
        callback(ProgressEvent::Completed {
            operation_id: "task-1".into(),
        });
    }
}
