//! Error types for dvsctl
//!
//! Every failure ends up here so `main` can print one diagnostic with tips
//! and exit non-zero.

use colored::Colorize;
use dvsctl_core::CoreError;
use thiserror::Error;

/// Cargo-style diagnostic formatter for CLI errors.
///
/// ```text
/// error: Connection error: could not log in as 'root': incorrect user name or password
///
///   tip: check the profile: dvsctl profile show <profile>
/// ```
pub struct CliDiagnostic {
    message: String,
    detail: Option<String>,
    tips: Vec<String>,
}

impl CliDiagnostic {
    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            detail: None,
            tips: Vec::new(),
        }
    }

    pub fn detail(mut self, text: &str) -> Self {
        self.detail = Some(text.to_string());
        self
    }

    pub fn tip(mut self, description: &str) -> Self {
        self.tips.push(description.to_string());
        self
    }

    /// Print the diagnostic to stderr with colored formatting.
    pub fn print(&self) {
        eprint!("{}{}", "error".red().bold(), ": ".bold());
        eprintln!("{}", self.message);

        if let Some(detail) = &self.detail {
            eprintln!("  {}", detail);
        }

        for description in &self.tips {
            eprintln!();
            eprint!("  {}{}", "tip".yellow().bold(), ": ".bold());
            eprintln!("{}", description);
        }
    }
}

/// Main error type for the dvsctl application
#[derive(Error, Debug)]
pub enum DvsCtlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("No connection configured. Pass --host/--user or create a profile with 'dvsctl profile set'.")]
    NoConnectionConfigured,

    #[error("Missing {what}")]
    MissingCredentials { what: String },

    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("Operation failed: {message}")]
    OperationFailed {
        message: String,
        detail: serde_json::Value,
    },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("Unexpected response from server: {message}")]
    Unexpected { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Output formatting error: {message}")]
    OutputError { message: String },
}

/// Result type for dvsctl operations
pub type Result<T> = std::result::Result<T, DvsCtlError>;

impl DvsCtlError {
    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            DvsCtlError::ProfileNotFound { name } => vec![
                "List available profiles: dvsctl profile list".to_string(),
                format!(
                    "Create profile '{}': dvsctl profile set {} --host <vcenter> --user <user>",
                    name, name
                ),
            ],
            DvsCtlError::NoConnectionConfigured => vec![
                "Create a profile: dvsctl profile set lab --host vcenter.lab.local --user administrator@vsphere.local".to_string(),
                "Or set VSPHERE_HOST, VSPHERE_USER and VSPHERE_PASSWORD".to_string(),
            ],
            DvsCtlError::MissingCredentials { .. } => vec![
                "Pass --password, set VSPHERE_PASSWORD, or store it in the profile".to_string(),
            ],
            DvsCtlError::ConnectionError { message }
                if message.contains("certificate") || message.to_lowercase().contains("tls") =>
            {
                vec![
                    "For self-signed certificates use --insecure".to_string(),
                    "Or store it in the profile: dvsctl profile set <name> ... --insecure".to_string(),
                ]
            }
            DvsCtlError::ConnectionError { message } if message.contains("log in") => vec![
                "Check the user name and password: dvsctl profile show <profile>".to_string(),
            ],
            DvsCtlError::ConnectionError { .. } => vec![
                "Check network connectivity to the vCenter endpoint".to_string(),
                "Verify --host and --port (default 443)".to_string(),
            ],
            DvsCtlError::Timeout { .. } => vec![
                "The task may still finish on the server; check the vSphere task list before retrying".to_string(),
                "Raise the deadline with --wait-timeout <seconds>".to_string(),
            ],
            DvsCtlError::InvalidInput { .. } => vec![
                "Check the command syntax: dvsctl <command> --help".to_string(),
            ],
            _ => vec![],
        }
    }

    /// Print a cargo-style diagnostic to stderr using colored formatting.
    pub fn print_diagnostic(&self) {
        let mut diag = CliDiagnostic::error(&self.to_string());

        if let DvsCtlError::OperationFailed { detail, .. } = self
            && let Some(kind) = detail
                .get("fault")
                .and_then(|f| f.get("_typeName"))
                .and_then(|t| t.as_str())
        {
            diag = diag.detail(&format!("fault: {}", kind));
        }

        for suggestion in self.suggestions() {
            diag = diag.tip(&suggestion);
        }

        diag.print();
    }
}

impl From<CoreError> for DvsCtlError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Connection(message) => DvsCtlError::ConnectionError { message },
            CoreError::OperationFailed { message, detail } => {
                DvsCtlError::OperationFailed { message, detail }
            }
            CoreError::Timeout(duration) => DvsCtlError::Timeout {
                message: format!(
                    "operation did not finish within {} seconds",
                    duration.as_secs()
                ),
            },
            CoreError::Cancelled => DvsCtlError::Cancelled,
            e @ CoreError::UnexpectedFault { .. } => DvsCtlError::Unexpected {
                message: e.to_string(),
            },
            CoreError::Validation(message) => DvsCtlError::InvalidInput { message },
            CoreError::Config(message) => DvsCtlError::Configuration(message),
            CoreError::Http(e) => DvsCtlError::ConnectionError {
                message: e.to_string(),
            },
        }
    }
}

impl From<dvsctl_core::ConfigError> for DvsCtlError {
    fn from(err: dvsctl_core::ConfigError) -> Self {
        match err {
            dvsctl_core::ConfigError::ProfileNotFound { name } => {
                DvsCtlError::ProfileNotFound { name }
            }
            other => DvsCtlError::Configuration(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DvsCtlError {
    fn from(err: serde_json::Error) -> Self {
        DvsCtlError::OutputError {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<std::io::Error> for DvsCtlError {
    fn from(err: std::io::Error) -> Self {
        DvsCtlError::OutputError {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<anyhow::Error> for DvsCtlError {
    fn from(err: anyhow::Error) -> Self {
        DvsCtlError::Configuration(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn core_errors_map_to_cli_variants() {
        let err: DvsCtlError = CoreError::Connection("refused".into()).into();
        assert!(matches!(err, DvsCtlError::ConnectionError { .. }));

        let err: DvsCtlError = CoreError::Timeout(Duration::from_secs(90)).into();
        assert_eq!(
            err.to_string(),
            "Timeout: operation did not finish within 90 seconds"
        );

        let err: DvsCtlError = CoreError::Validation("bad name".into()).into();
        assert!(matches!(err, DvsCtlError::InvalidInput { .. }));

        let err: DvsCtlError = CoreError::unexpected("create-switch", "task-1", "boom").into();
        assert!(err.to_string().contains("task-1"));
    }

    #[test]
    fn timeout_suggests_checking_before_retry() {
        let err = DvsCtlError::Timeout {
            message: "x".into(),
        };
        assert!(err.suggestions().iter().any(|s| s.contains("--wait-timeout")));
    }

    #[test]
    fn certificate_errors_suggest_insecure() {
        let err = DvsCtlError::ConnectionError {
            message: "invalid peer certificate: UnknownIssuer".into(),
        };
        assert!(err.suggestions().iter().any(|s| s.contains("--insecure")));
    }

    #[test]
    fn suggested_profile_commands_parse() {
        use crate::cli::Cli;
        use clap::Parser;

        let errors = [
            DvsCtlError::ProfileNotFound { name: "lab".into() },
            DvsCtlError::NoConnectionConfigured,
        ];
        let commands: Vec<String> = errors
            .iter()
            .flat_map(|e| e.suggestions())
            .filter_map(|tip| tip.split_once(": dvsctl profile set ").map(|(_, rest)| rest.to_string()))
            .collect();
        assert_eq!(commands.len(), 2);

        for rest in commands {
            let args = ["dvsctl", "profile", "set"]
                .into_iter()
                .map(String::from)
                .chain(rest.split_whitespace().map(String::from));
            assert!(Cli::try_parse_from(args).is_ok(), "tip does not parse: {rest}");
        }
    }
}
