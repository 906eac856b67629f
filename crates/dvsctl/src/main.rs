use clap::{CommandFactory, Parser};
use clap_complete::{generate, shells};
use dvsctl_core::Config;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod connection;
mod error;
mod output;

use cli::{Cli, Commands};
use connection::ConnectionManager;
use error::DvsCtlError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level
    init_tracing(cli.verbose);

    // Load configuration from specified path or default location
    let loaded = if let Some(config_file) = &cli.config_file {
        let path = std::path::PathBuf::from(config_file);
        debug!("Loading config from explicit path: {:?}", path);
        Config::load_from_path(&path).map(|config| (config, Some(path)))
    } else {
        debug!("Loading config from default location");
        Config::load().map(|config| (config, None))
    };
    let (config, config_path) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            DvsCtlError::from(e).print_diagnostic();
            std::process::exit(1);
        }
    };
    debug!(
        "Creating ConnectionManager with config_path: {:?}",
        config_path
    );
    let conn_mgr = ConnectionManager::with_config_path(config, config_path);

    // Ctrl-C stops polling; the session is still logged out
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    if let Err(e) = execute_command(&cli, &conn_mgr, cancel).await {
        e.print_diagnostic();
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    // Check for RUST_LOG env var first, then fall back to verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "dvsctl=warn,dvsctl_core=warn",
            1 => "dvsctl=info,dvsctl_core=info",
            2 => "dvsctl=debug,dvsctl_core=debug",
            _ => "dvsctl=trace,dvsctl_core=trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    debug!("Tracing initialized with verbosity level: {}", verbose);
}

async fn execute_command(
    cli: &Cli,
    conn_mgr: &ConnectionManager,
    cancel: CancellationToken,
) -> Result<(), DvsCtlError> {
    // Log command execution with sanitized parameters
    trace!("Executing command: {:?}", cli.command);
    info!("Command: {}", format_command(&cli.command));

    let start = std::time::Instant::now();
    let result = match &cli.command {
        Commands::Version => {
            debug!("Showing version information");
            match cli.output {
                cli::OutputFormat::Json | cli::OutputFormat::Yaml => {
                    let output_data = serde_json::json!({
                        "version": env!("CARGO_PKG_VERSION"),
                        "name": env!("CARGO_PKG_NAME"),
                    });
                    output::print_output(&output_data, cli.output.into())?;
                }
                _ => {
                    println!("dvsctl {}", env!("CARGO_PKG_VERSION"));
                }
            }
            Ok(())
        }
        Commands::Completions { shell } => {
            debug!("Generating completions for {:?}", shell);
            generate_completions(*shell);
            Ok(())
        }

        Commands::Profile(profile_cmd) => {
            debug!("Executing profile command");
            commands::profile::handle_profile_command(
                profile_cmd,
                conn_mgr,
                &cli.connection,
                &cli.wait,
                cli.output,
            )
            .await
        }

        Commands::Switch(switch_cmd) => {
            debug!("Executing switch command");
            commands::switch::handle_switch_command(
                switch_cmd,
                conn_mgr,
                cli.profile.as_deref(),
                &cli.connection,
                &cli.wait,
                cli.output,
                cancel,
            )
            .await
        }
    };

    let duration = start.elapsed();
    match &result {
        Ok(_) => info!("Command completed successfully in {:?}", duration),
        Err(e) => error!("Command failed after {:?}: {}", duration, e),
    }

    result
}

/// Generate shell completions
fn generate_completions(shell: cli::Shell) {
    let mut cmd = cli::Cli::command();
    let name = cmd.get_name().to_string();

    match shell {
        cli::Shell::Bash => generate(shells::Bash, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Zsh => generate(shells::Zsh, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::Fish => generate(shells::Fish, &mut cmd, name, &mut std::io::stdout()),
        cli::Shell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, name, &mut std::io::stdout())
        }
        cli::Shell::Elvish => generate(shells::Elvish, &mut cmd, name, &mut std::io::stdout()),
    }
}

/// Format command for human-readable logging (without sensitive data)
fn format_command(command: &Commands) -> String {
    match command {
        Commands::Version => "version".to_string(),
        Commands::Completions { shell } => format!("completions {:?}", shell),
        Commands::Profile(cmd) => {
            use cli::ProfileCommands::*;
            match cmd {
                List => "profile list".to_string(),
                Path => "profile path".to_string(),
                Show { name } => format!("profile show {}", name),
                Set { name, .. } => format!("profile set {} [credentials redacted]", name),
                Remove { name, .. } => format!("profile remove {}", name),
                cli::ProfileCommands::Default { name } => format!("profile default {}", name),
            }
        }
        Commands::Switch(cmd) => {
            use cli::SwitchCommands::*;
            match cmd {
                Create { name, members, .. } => {
                    format!("switch create {} ({} member(s))", name, members.len())
                }
                AddPortgroup { switch, name, .. } => {
                    format!("switch add-portgroup {} {}", switch, name)
                }
                AddHost { switch, members } => {
                    format!("switch add-host {} ({} member(s))", switch, members.len())
                }
                Provision { name, .. } => format!("switch provision {}", name),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_command_never_includes_password() {
        let cli = Cli::try_parse_from([
            "dvsctl",
            "--password",
            "hunter2",
            "profile",
            "set",
            "lab",
            "--host",
            "vc",
        ])
        .unwrap();
        let rendered = format_command(&cli.command);
        assert!(!rendered.contains("hunter2"));
        assert_eq!(rendered, "profile set lab [credentials redacted]");
    }

    #[test]
    fn format_switch_commands() {
        let cli =
            Cli::try_parse_from(["dvsctl", "switch", "add-host", "dvs-01", "esx01", "esx02"]).unwrap();
        assert_eq!(format_command(&cli.command), "switch add-host dvs-01 (2 member(s))");
    }
}
