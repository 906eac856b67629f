//! Profile configuration for dvsctl
//!
//! Profiles live in a TOML file and describe how to reach a vCenter
//! endpoint plus optional polling defaults. `${VAR}` and `${VAR:-default}`
//! references stay as written in memory and on disk; they are expanded only
//! when a profile is resolved for a connection.

#[cfg(target_os = "macos")]
use directories::BaseDirs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::credential::CredentialStore;
use super::error::{ConfigError, Result};
use crate::progress::PollPolicy;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Profile used when none is named on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// Map of profile name -> profile configuration
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// One vCenter endpoint
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Profile {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub username: String,
    /// Plaintext, `${ENV}` reference, or `keyring:<key>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Accept self-signed certificates
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub insecure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<String>,
    /// vim25 release in request paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_interval_secs: Option<u64>,
}

impl Profile {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            ..Default::default()
        }
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Copy of this profile with `${VAR}` references expanded
    pub fn expanded(&self) -> Profile {
        let expand = |value: &str| Config::expand_env_vars(value);
        Profile {
            host: expand(&self.host),
            username: expand(&self.username),
            password: self.password.as_deref().map(expand),
            datacenter: self.datacenter.as_deref().map(expand),
            api_release: self.api_release.as_deref().map(expand),
            ..self.clone()
        }
    }

    /// Password with env and keyring references resolved
    pub fn resolve_password(&self) -> Result<Option<String>> {
        match &self.password {
            Some(value) => CredentialStore::new()
                .get_credential(&Config::expand_env_vars(value))
                .map(Some)
                .map_err(|e| {
                    ConfigError::CredentialError(format!("Failed to resolve password: {}", e))
                }),
            None => Ok(None),
        }
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    pub fn wait_interval(&self) -> Option<Duration> {
        self.wait_interval_secs.map(Duration::from_secs)
    }

    /// Polling policy with this profile's overrides applied to the defaults
    pub fn poll_policy(&self) -> PollPolicy {
        let mut policy = match self.wait_interval() {
            Some(interval) => PollPolicy::fixed(interval),
            None => PollPolicy::default(),
        };
        if let Some(timeout) = self.wait_timeout() {
            policy = policy.with_timeout(timeout);
        }
        policy
    }
}

impl Config {
    /// Pick the profile to use.
    ///
    /// Order: the explicit name, then `default_profile`, then the first
    /// profile alphabetically.
    pub fn resolve_profile(&self, explicit_profile: Option<&str>) -> Result<String> {
        if let Some(name) = explicit_profile {
            if !self.profiles.contains_key(name) {
                return Err(ConfigError::ProfileNotFound {
                    name: name.to_string(),
                });
            }
            return Ok(name.to_string());
        }

        if let Some(ref default) = self.default_profile {
            return Ok(default.clone());
        }

        let mut names: Vec<_> = self.profiles.keys().collect();
        names.sort();
        names
            .first()
            .map(|n| n.to_string())
            .ok_or_else(|| ConfigError::NoProfiles {
                suggestion: "Use 'dvsctl profile set' to create a profile.".to_string(),
            })
    }

    /// The resolved profile itself
    pub fn profile(&self, explicit_profile: Option<&str>) -> Result<(String, &Profile)> {
        let name = self.resolve_profile(explicit_profile)?;
        let profile = self
            .profiles
            .get(&name)
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.clone() })?;
        Ok((name, profile))
    }

    /// Load configuration from the standard location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path; a missing file is an empty config
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::LoadError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the standard location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveError {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(config_path, content).map_err(|e| ConfigError::SaveError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        Ok(())
    }

    pub fn set_profile(&mut self, name: String, profile: Profile) {
        self.profiles.insert(name, profile);
    }

    /// Remove a profile by name, clearing the default if it pointed there
    pub fn remove_profile(&mut self, name: &str) -> Option<Profile> {
        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        self.profiles.remove(name)
    }

    /// List all profiles sorted by name
    pub fn list_profiles(&self) -> Vec<(&String, &Profile)> {
        let mut profiles: Vec<_> = self.profiles.iter().collect();
        profiles.sort_by_key(|(name, _)| *name);
        profiles
    }

    /// Get the path to the configuration file
    ///
    /// On macOS `~/.config/dvsctl/config.toml` is preferred when it (or its
    /// directory) exists, falling back to
    /// `~/Library/Application Support/com.dvsctl.dvsctl/config.toml`.
    ///
    /// On Linux: ~/.config/dvsctl/config.toml
    /// On Windows: %APPDATA%\dvsctl\dvsctl\config.toml
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(base_dirs) = BaseDirs::new() {
                let linux_style_path = base_dirs
                    .home_dir()
                    .join(".config")
                    .join("dvsctl")
                    .join("config.toml");

                if linux_style_path.exists()
                    || linux_style_path
                        .parent()
                        .map(|p| p.exists())
                        .unwrap_or(false)
                {
                    return Ok(linux_style_path);
                }
            }
        }

        let proj_dirs =
            ProjectDirs::from("com", "dvsctl", "dvsctl").ok_or(ConfigError::ConfigDirError)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Expand `${VAR}` and `${VAR:-default}` references.
    ///
    /// Unset variables without a default are left as written so profiles
    /// that are not in use never fail to load.
    ///
    /// ```toml
    /// password = "${VSPHERE_PASSWORD}"
    /// host = "${VSPHERE_HOST:-vcenter.lab.local}"
    /// ```
    pub(crate) fn expand_env_vars(content: &str) -> String {
        shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok()).to_string()
    }
}
