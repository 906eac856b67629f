//! Connection management for vCenter sessions
//!
//! Settings are layered: command-line flags, then `VSPHERE_*` environment
//! variables, then the selected profile. When `--config-file` is given
//! explicitly the environment layer is skipped.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use dvsctl_core::{Config, ConfigError, PollPolicy, Profile, VsphereClient};
use tracing::{debug, info, trace};

use crate::cli::{ConnectionArgs, WaitArgs};
use crate::error::{DvsCtlError, Result as CliResult};

/// User agent string for dvsctl HTTP requests
const DVSCTL_USER_AGENT: &str = concat!("dvsctl/", env!("CARGO_PKG_VERSION"));

/// Connection manager for creating authenticated clients
#[derive(Clone)]
pub struct ConnectionManager {
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

/// Fully resolved connection settings
#[derive(Clone, PartialEq)]
pub struct ConnectionSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub username: String,
    pub password: Option<String>,
    pub insecure: bool,
    pub datacenter: Option<String>,
    pub api_release: Option<String>,
    pub request_timeout: Option<Duration>,
    pub policy: PollPolicy,
}

impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("insecure", &self.insecure)
            .field("datacenter", &self.datacenter)
            .field("request_timeout", &self.request_timeout)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Values read from `VSPHERE_*` variables
#[derive(Debug, Default)]
struct EnvOverrides {
    host: Option<String>,
    port: Option<u16>,
    url: Option<String>,
    user: Option<String>,
    password: Option<String>,
    insecure: Option<bool>,
    datacenter: Option<String>,
}

impl EnvOverrides {
    fn from_env() -> Self {
        let var = |name: &str| {
            let value = std::env::var(name).ok().filter(|v| !v.is_empty());
            if value.is_some() {
                debug!("Found {} environment variable", name);
            }
            value
        };
        Self {
            host: var("VSPHERE_HOST"),
            port: var("VSPHERE_PORT").and_then(|p| p.parse().ok()),
            url: var("VSPHERE_URL"),
            user: var("VSPHERE_USER"),
            password: var("VSPHERE_PASSWORD"),
            insecure: var("VSPHERE_INSECURE").map(|s| s.eq_ignore_ascii_case("true") || s == "1"),
            datacenter: var("VSPHERE_DATACENTER"),
        }
    }
}

impl ConnectionManager {
    /// Create a new connection manager with a custom config path
    pub fn with_config_path(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Save the configuration to the appropriate location
    pub fn save_config(&self) -> CliResult<()> {
        if let Some(ref path) = self.config_path {
            self.config
                .save_to_path(path)
                .context("Failed to save configuration")?;
        } else {
            self.config.save().context("Failed to save configuration")?;
        }
        Ok(())
    }

    /// Merge flags, environment and profile into one set of settings.
    ///
    /// The password may still be `None`; [`create_client`](Self::create_client)
    /// prompts for it.
    pub fn resolve_settings(
        &self,
        profile_name: Option<&str>,
        args: &ConnectionArgs,
        wait: &WaitArgs,
    ) -> CliResult<ConnectionSettings> {
        trace!("Profile name: {:?}", profile_name);

        let use_env_vars = self.config_path.is_none();
        debug!(
            "Config path: {:?}, use_env_vars: {}",
            self.config_path, use_env_vars
        );
        let env = if use_env_vars {
            EnvOverrides::from_env()
        } else {
            info!("--config-file specified explicitly, ignoring environment variables");
            EnvOverrides::default()
        };

        // A missing profile is fine as long as flags or env cover the gaps
        let stored: Option<&Profile> = match self.config.profile(profile_name) {
            Ok((name, profile)) => {
                info!("Using profile: {}", name);
                Some(profile)
            }
            Err(ConfigError::NoProfiles { .. }) if profile_name.is_none() => None,
            Err(e) => return Err(e.into()),
        };
        let profile = stored.map(Profile::expanded);

        let url = args.url.clone().or(env.url);
        let host = args
            .host
            .clone()
            .or(env.host)
            .or_else(|| profile.as_ref().map(|p| p.host.clone()));
        if url.is_none() && host.is_none() {
            return Err(DvsCtlError::NoConnectionConfigured);
        }

        let username = args
            .user
            .clone()
            .or(env.user)
            .or_else(|| profile.as_ref().map(|p| p.username.clone()))
            .ok_or_else(|| DvsCtlError::MissingCredentials {
                what: "user name (--user or VSPHERE_USER)".to_string(),
            })?;

        let password = match args.password.clone().or(env.password) {
            Some(p) => Some(p),
            None => match stored {
                Some(p) => p
                    .resolve_password()
                    .context("Failed to resolve profile password")?,
                None => None,
            },
        };

        let insecure = args.insecure
            || env
                .insecure
                .unwrap_or_else(|| profile.as_ref().is_some_and(|p| p.insecure));

        let settings = ConnectionSettings {
            host,
            port: args
                .port
                .or(env.port)
                .or_else(|| profile.as_ref().and_then(|p| p.port)),
            url,
            username,
            password,
            insecure,
            datacenter: args
                .datacenter
                .clone()
                .or(env.datacenter)
                .or_else(|| profile.as_ref().and_then(|p| p.datacenter.clone())),
            api_release: profile.as_ref().and_then(|p| p.api_release.clone()),
            request_timeout: args.request_timeout.map(Duration::from_secs),
            policy: poll_policy(profile.as_ref(), wait),
        };
        debug!("Resolved connection settings: {:?}", settings);
        Ok(settings)
    }

    /// Build a client from resolved settings, prompting for a missing password
    pub fn create_client(&self, mut settings: ConnectionSettings) -> CliResult<VsphereClient> {
        if settings.password.is_none() {
            settings.password = Some(prompt_password(&settings)?);
        }

        let mut builder = VsphereClient::builder()
            .username(&settings.username)
            .insecure(settings.insecure)
            .user_agent(DVSCTL_USER_AGENT);
        if let Some(password) = settings.password {
            builder = builder.password(password);
        }
        if let Some(url) = settings.url {
            builder = builder.base_url(url);
        }
        if let Some(host) = settings.host {
            builder = builder.host(host);
        }
        if let Some(port) = settings.port {
            builder = builder.port(port);
        }
        if let Some(datacenter) = settings.datacenter {
            builder = builder.datacenter(datacenter);
        }
        if let Some(release) = settings.api_release {
            builder = builder.api_release(release);
        }
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        if settings.insecure {
            debug!("TLS certificate verification disabled");
        }

        let client = builder.build()?;
        info!("Connecting to vSphere endpoint: {}", client.base_url());
        Ok(client)
    }
}

/// Flags win over profile polling defaults
fn poll_policy(profile: Option<&Profile>, wait: &WaitArgs) -> PollPolicy {
    let mut policy = profile.map(Profile::poll_policy).unwrap_or_default();
    if let Some(secs) = wait.wait_interval {
        let timeout = policy.timeout;
        policy = PollPolicy::fixed(Duration::from_secs(secs));
        policy.timeout = timeout;
    }
    if let Some(secs) = wait.wait_timeout {
        policy = policy.with_timeout(Duration::from_secs(secs));
    }
    policy
}

fn prompt_password(settings: &ConnectionSettings) -> CliResult<String> {
    if !std::io::stdin().is_terminal() {
        return Err(DvsCtlError::MissingCredentials {
            what: "password (--password or VSPHERE_PASSWORD)".to_string(),
        });
    }
    let target = settings
        .host
        .as_deref()
        .or(settings.url.as_deref())
        .unwrap_or("vCenter");
    let password = rpassword::prompt_password(format!("Password for {}@{}: ", settings.username, target))
        .context("Failed to read password")?;
    Ok(password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(config: Config) -> ConnectionManager {
        // An explicit path keeps the environment out of these tests
        ConnectionManager::with_config_path(config, Some(PathBuf::from("/nonexistent/config.toml")))
    }

    fn lab_config() -> Config {
        let mut config = Config::default();
        config.set_profile(
            "lab".to_string(),
            Profile {
                password: Some("profile-secret".to_string()),
                datacenter: Some("DC1".to_string()),
                wait_timeout_secs: Some(120),
                ..Profile::new("vc.lab", "root")
            },
        );
        config
    }

    #[test]
    fn profile_supplies_defaults() {
        let settings = manager(lab_config())
            .resolve_settings(None, &ConnectionArgs::default(), &WaitArgs::default())
            .unwrap();
        assert_eq!(settings.host.as_deref(), Some("vc.lab"));
        assert_eq!(settings.username, "root");
        assert_eq!(settings.password.as_deref(), Some("profile-secret"));
        assert_eq!(settings.datacenter.as_deref(), Some("DC1"));
        assert_eq!(settings.policy.timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn flags_override_profile() {
        let args = ConnectionArgs {
            host: Some("10.0.0.5".to_string()),
            password: Some("flag-secret".to_string()),
            insecure: true,
            ..Default::default()
        };
        let wait = WaitArgs {
            wait_timeout: Some(30),
            wait_interval: Some(2),
        };
        let settings = manager(lab_config())
            .resolve_settings(Some("lab"), &args, &wait)
            .unwrap();
        assert_eq!(settings.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(settings.username, "root");
        assert_eq!(settings.password.as_deref(), Some("flag-secret"));
        assert!(settings.insecure);
        assert_eq!(settings.policy.interval, Duration::from_secs(2));
        assert_eq!(settings.policy.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn flags_alone_are_enough() {
        let args = ConnectionArgs {
            host: Some("vc".to_string()),
            user: Some("admin".to_string()),
            ..Default::default()
        };
        let settings = manager(Config::default())
            .resolve_settings(None, &args, &WaitArgs::default())
            .unwrap();
        assert!(settings.password.is_none());
        assert_eq!(settings.policy, PollPolicy::default());
    }

    #[test]
    fn nothing_configured() {
        let err = manager(Config::default())
            .resolve_settings(None, &ConnectionArgs::default(), &WaitArgs::default())
            .unwrap_err();
        assert!(matches!(err, DvsCtlError::NoConnectionConfigured));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let err = manager(lab_config())
            .resolve_settings(Some("prod"), &ConnectionArgs::default(), &WaitArgs::default())
            .unwrap_err();
        assert!(matches!(err, DvsCtlError::ProfileNotFound { ref name } if name == "prod"));
    }

    #[test]
    fn request_timeout_flag_is_carried() {
        let args = ConnectionArgs {
            request_timeout: Some(5),
            ..Default::default()
        };
        let settings = manager(lab_config())
            .resolve_settings(None, &args, &WaitArgs::default())
            .unwrap();
        assert_eq!(settings.request_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn profile_env_references_resolve_without_touching_config() {
        let mut config = Config::default();
        config.set_profile(
            "lab".to_string(),
            Profile {
                password: Some("${DVSCTL_CONN_UNSET_PW:-from-default}".to_string()),
                ..Profile::new("${DVSCTL_CONN_UNSET_HOST:-vc.expanded}", "root")
            },
        );
        let mgr = manager(config);
        let settings = mgr
            .resolve_settings(None, &ConnectionArgs::default(), &WaitArgs::default())
            .unwrap();
        assert_eq!(settings.host.as_deref(), Some("vc.expanded"));
        assert_eq!(settings.password.as_deref(), Some("from-default"));
        assert_eq!(
            mgr.config.profiles["lab"].host,
            "${DVSCTL_CONN_UNSET_HOST:-vc.expanded}"
        );
    }

    #[test]
    fn debug_output_hides_password() {
        let settings = manager(lab_config())
            .resolve_settings(None, &ConnectionArgs::default(), &WaitArgs::default())
            .unwrap();
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("profile-secret"));
    }
}
