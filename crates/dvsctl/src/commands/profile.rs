//! Profile management command implementations

use std::io::{IsTerminal, Write};

use anyhow::Context;
use colored::Colorize;
use dvsctl_core::{Config, CredentialStore, Profile};
use serde::Serialize;
use tracing::{debug, trace};

use crate::cli::{ConnectionArgs, OutputFormat, ProfileCommands, WaitArgs};
use crate::connection::ConnectionManager;
use crate::error::{DvsCtlError, Result as CliResult};
use crate::output;

/// Profile as shown to the user, never carrying the password itself
#[derive(Debug, Serialize, PartialEq)]
struct ProfileView<'a> {
    name: &'a str,
    host: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    username: &'a str,
    password: &'static str,
    insecure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    datacenter: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_interval_secs: Option<u64>,
    default: bool,
}

impl<'a> ProfileView<'a> {
    fn new(name: &'a str, profile: &'a Profile, config: &Config) -> Self {
        let password = match profile.password.as_deref() {
            None => "not set",
            Some(p) if CredentialStore::is_keyring_reference(p) => "keyring",
            Some(_) => "configured",
        };
        Self {
            name,
            host: &profile.host,
            port: profile.port,
            username: &profile.username,
            password,
            insecure: profile.insecure,
            datacenter: profile.datacenter.as_deref(),
            wait_timeout_secs: profile.wait_timeout_secs,
            wait_interval_secs: profile.wait_interval_secs,
            default: config.default_profile.as_deref() == Some(name),
        }
    }
}

/// Handle profile management commands
pub async fn handle_profile_command(
    profile_cmd: &ProfileCommands,
    conn_mgr: &ConnectionManager,
    connection: &ConnectionArgs,
    wait: &WaitArgs,
    output_format: OutputFormat,
) -> CliResult<()> {
    use ProfileCommands::*;

    match profile_cmd {
        List => handle_list(conn_mgr, output_format),
        Path => handle_path(conn_mgr, output_format),
        Show { name } => handle_show(conn_mgr, name, output_format),
        Set {
            name,
            api_release,
            #[cfg(feature = "secure-storage")]
            use_keyring,
        } => {
            #[cfg(not(feature = "secure-storage"))]
            let use_keyring = &false;
            handle_set(
                conn_mgr,
                name,
                connection,
                wait,
                api_release.as_deref(),
                *use_keyring,
            )
        }
        Remove { name, yes } => handle_remove(conn_mgr, name, *yes),
        ProfileCommands::Default { name } => handle_default(conn_mgr, name),
    }
}

fn handle_list(conn_mgr: &ConnectionManager, output_format: OutputFormat) -> CliResult<()> {
    debug!("Listing all configured profiles");
    let profiles = conn_mgr.config.list_profiles();
    trace!("Found {} profiles", profiles.len());

    let format = output::OutputFormat::from(output_format);
    if profiles.is_empty() && !format.is_structured() {
        println!("No profiles configured.");
        println!("Create one with: dvsctl profile set <name> --host <vcenter> --user <user>");
        return Ok(());
    }

    let views: Vec<ProfileView<'_>> = profiles
        .into_iter()
        .map(|(name, profile)| ProfileView::new(name, profile, &conn_mgr.config))
        .collect();
    output::print_output(&views, format)?;
    Ok(())
}

fn config_path(conn_mgr: &ConnectionManager) -> CliResult<std::path::PathBuf> {
    match &conn_mgr.config_path {
        Some(path) => Ok(path.clone()),
        None => Ok(Config::config_path()?),
    }
}

fn handle_path(conn_mgr: &ConnectionManager, output_format: OutputFormat) -> CliResult<()> {
    let path = config_path(conn_mgr)?;

    match output_format {
        OutputFormat::Json | OutputFormat::Yaml => {
            output::print_output(
                serde_json::json!({ "config_path": path.to_string_lossy() }),
                output_format.into(),
            )?;
        }
        _ => println!("{}", path.display()),
    }
    Ok(())
}

fn handle_show(
    conn_mgr: &ConnectionManager,
    name: &str,
    output_format: OutputFormat,
) -> CliResult<()> {
    let profile = conn_mgr
        .config
        .profiles
        .get(name)
        .ok_or_else(|| DvsCtlError::ProfileNotFound { name: name.into() })?;
    let view = ProfileView::new(name, profile, &conn_mgr.config);
    output::print_output(&view, output_format.into())?;
    Ok(())
}

/// Create or update a profile from the global connection and wait flags
fn handle_set(
    conn_mgr: &ConnectionManager,
    name: &str,
    connection: &ConnectionArgs,
    wait: &WaitArgs,
    api_release: Option<&str>,
    use_keyring: bool,
) -> CliResult<()> {
    debug!("Setting profile: {}", name);

    let existing = conn_mgr.config.profiles.get(name).cloned();
    let is_new = existing.is_none();
    let mut profile = match existing {
        Some(profile) => profile,
        None => {
            let host = connection
                .host
                .clone()
                .ok_or_else(|| DvsCtlError::InvalidInput {
                    message: format!("--host is required to create profile '{}'", name),
                })?;
            let user = connection
                .user
                .clone()
                .ok_or_else(|| DvsCtlError::InvalidInput {
                    message: format!("--user is required to create profile '{}'", name),
                })?;
            Profile::new(host, user)
        }
    };

    if let Some(host) = &connection.host {
        profile.host = host.clone();
    }
    if let Some(user) = &connection.user {
        profile.username = user.clone();
    }
    if connection.port.is_some() {
        profile.port = connection.port;
    }
    if connection.insecure {
        profile.insecure = true;
    }
    if let Some(datacenter) = &connection.datacenter {
        profile.datacenter = Some(datacenter.clone());
    }
    if let Some(release) = api_release {
        profile.api_release = Some(release.to_string());
    }
    if wait.wait_timeout.is_some() {
        profile.wait_timeout_secs = wait.wait_timeout;
    }
    if wait.wait_interval.is_some() {
        profile.wait_interval_secs = wait.wait_interval;
    }

    if let Some(password) = &connection.password {
        profile.password = Some(if use_keyring {
            let store = CredentialStore::new();
            if store.storage_backend() != "keyring" {
                return Err(DvsCtlError::Configuration(
                    "OS keyring is not available on this system".to_string(),
                ));
            }
            store
                .store_credential(&format!("{}-password", name), password)
                .context("Failed to store password in keyring")?
        } else {
            password.clone()
        });
    }

    let mut mgr = conn_mgr.clone();
    mgr.config.set_profile(name.to_string(), profile);
    if mgr.config.profiles.len() == 1 && mgr.config.default_profile.is_none() {
        mgr.config.default_profile = Some(name.to_string());
    }
    mgr.save_config()?;

    let verb = if is_new { "created" } else { "updated" };
    println!("Profile '{}' {} successfully.", name.bold(), verb);
    if connection.password.is_some() && !use_keyring {
        println!(
            "{}",
            "Note: the password is stored in plaintext. Consider --password '${VSPHERE_PASSWORD}' or --use-keyring."
                .yellow()
        );
    }
    Ok(())
}

fn handle_remove(conn_mgr: &ConnectionManager, name: &str, yes: bool) -> CliResult<()> {
    debug!("Removing profile: {}", name);

    if !conn_mgr.config.profiles.contains_key(name) {
        return Err(DvsCtlError::ProfileNotFound { name: name.into() });
    }

    let is_default = conn_mgr.config.default_profile.as_deref() == Some(name);
    if is_default {
        println!("Warning: '{}' is the default profile.", name);
    }

    if !yes {
        if !std::io::stdin().is_terminal() {
            return Err(DvsCtlError::InvalidInput {
                message: "refusing to remove a profile without confirmation; pass --yes"
                    .to_string(),
            });
        }
        print!("Are you sure you want to remove profile '{}'? (y/N): ", name);
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();
        if input != "y" && input != "yes" {
            println!("Profile removal cancelled.");
            return Ok(());
        }
    }

    let mut mgr = conn_mgr.clone();
    if let Some(removed) = mgr.config.remove_profile(name)
        && let Some(password) = removed.password.as_deref()
        && CredentialStore::is_keyring_reference(password)
        && let Err(e) = CredentialStore::new().delete_credential(password)
    {
        debug!("Could not delete keyring entry for '{}': {}", name, e);
    }
    mgr.save_config()?;

    if is_default {
        println!("Default profile cleared.");
    }
    println!("Profile '{}' removed successfully.", name);
    Ok(())
}

fn handle_default(conn_mgr: &ConnectionManager, name: &str) -> CliResult<()> {
    debug!("Setting default profile: {}", name);

    if !conn_mgr.config.profiles.contains_key(name) {
        return Err(DvsCtlError::ProfileNotFound { name: name.into() });
    }

    let mut mgr = conn_mgr.clone();
    mgr.config.default_profile = Some(name.to_string());
    mgr.save_config()?;

    println!("Default profile set to '{}'.", name);
    Ok(())
}
