//! CLI structure and command definitions
//!
//! Connection and wait flags are global so every subcommand that talks to
//! vCenter accepts them in the same place.

use clap::{Parser, Subcommand};
use dvsctl_core::PortBinding;

/// vSphere distributed switch provisioning CLI
#[derive(Parser, Debug)]
#[command(name = "dvsctl")]
#[command(
    version,
    about = "Provision vSphere distributed virtual switches and wait for the tasks to finish"
)]
#[command(long_about = "
Provision vSphere distributed virtual switches and wait for the tasks to finish

Every command submits an asynchronous vCenter task and polls it until it
succeeds, fails, or the wait deadline passes. The exit code is 0 only when
the task succeeded.

EXAMPLES:
    # Save connection settings once
    dvsctl profile set lab --host vcenter.lab.local --user administrator@vsphere.local

    # Create a switch
    dvsctl switch create dvs-prod --max-ports 512

    # Add a port group and join two hosts
    dvsctl switch add-portgroup dvs-prod pg-vm --ports 64 --binding late
    dvsctl switch add-host dvs-prod esx01.lab.local:vmnic1 esx02.lab.local:vmnic1,vmnic2

    # Everything in one go
    dvsctl switch provision dvs-prod --portgroup pg-vm --member esx01.lab.local:vmnic1

    # Without a profile
    dvsctl -s 10.0.0.5 -u root --password secret --insecure switch create dvs-lab

For more help on a specific command, run:
    dvsctl <command> --help
")]
pub struct Cli {
    /// Profile to use for this command
    #[arg(long, short, global = true, env = "DVSCTL_PROFILE")]
    pub profile: Option<String>,

    /// Path to alternate configuration file
    #[arg(long, global = true, env = "DVSCTL_CONFIG_FILE")]
    pub config_file: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value = "auto")]
    pub output: OutputFormat,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub wait: WaitArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// vCenter connection overrides
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    /// vCenter or ESXi host name or IP address
    #[arg(long, short = 's', global = true)]
    pub host: Option<String>,

    /// HTTPS port of the endpoint (default 443)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// User name to log in with
    #[arg(long, short = 'u', global = true)]
    pub user: Option<String>,

    /// Password (prompted for when missing and stdin is a terminal)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Accept self-signed or otherwise invalid certificates
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Datacenter whose network folder holds the switch
    #[arg(long, global = true)]
    pub datacenter: Option<String>,

    /// Give up on any single HTTP request after this many seconds (default 60)
    #[arg(long, global = true, value_name = "SECONDS")]
    pub request_timeout: Option<u64>,

    /// Full VI/JSON endpoint URL, overriding --host and --port
    #[arg(long, global = true, hide = true)]
    pub url: Option<String>,
}

/// How long and how often to poll a submitted task
#[derive(clap::Args, Debug, Clone, Default)]
pub struct WaitArgs {
    /// Maximum time to wait for a task, in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub wait_timeout: Option<u64>,

    /// Polling interval, in seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub wait_interval: Option<u64>,
}

/// Output format options
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Automatically choose format based on command and context
    Auto,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Human-readable table format
    Table,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Distributed switch operations
    #[command(subcommand, visible_alias = "dvs", visible_alias = "sw")]
    #[command(after_help = "EXAMPLES:
    dvsctl switch create dvs-prod --description 'Production network'
    dvsctl switch add-portgroup dvs-prod pg-vm --ports 64
    dvsctl switch add-host dvs-prod esx01.lab.local:vmnic1
    dvsctl switch provision dvs-prod --portgroup pg-vm --member esx01.lab.local:vmnic1
")]
    Switch(SwitchCommands),

    /// Profile management
    #[command(subcommand, visible_alias = "prof", visible_alias = "pr")]
    #[command(after_help = "EXAMPLES:
    # Create a profile (password will be prompted when needed)
    dvsctl profile set lab --host vcenter.lab.local --user administrator@vsphere.local

    # List all profiles
    dvsctl profile list

    # Show profile details
    dvsctl profile show lab

    # Set the default profile
    dvsctl profile default lab
")]
    Profile(ProfileCommands),

    /// Version information
    #[command(visible_alias = "ver", visible_alias = "v")]
    Version,

    /// Generate shell completions
    #[command(visible_alias = "comp")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion generation
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bourne Again Shell
    Bash,
    /// Z Shell
    Zsh,
    /// Friendly Interactive Shell
    Fish,
    /// PowerShell
    #[value(name = "powershell", alias = "power-shell")]
    PowerShell,
    /// Elvish
    Elvish,
}

/// Distributed switch commands
#[derive(Subcommand, Debug)]
pub enum SwitchCommands {
    /// Create a distributed virtual switch and wait for the task
    #[command(visible_alias = "new")]
    Create {
        /// Switch name
        name: String,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,

        /// Upper bound on ports across all port groups
        #[arg(long)]
        max_ports: Option<u32>,

        /// Ports not bound to any port group
        #[arg(long)]
        standalone_ports: Option<u32>,

        /// Host to join at creation, as HOST[:NIC[,NIC...]] (repeatable)
        #[arg(long = "member", value_name = "HOST[:NICS]")]
        members: Vec<String>,
    },

    /// Add a port group to an existing switch
    #[command(name = "add-portgroup", visible_alias = "add-pg")]
    AddPortgroup {
        /// Name of the existing switch
        switch: String,

        /// Port group name
        name: String,

        /// Number of ports
        #[arg(long, default_value_t = dvsctl_core::params::DEFAULT_PORTGROUP_PORTS)]
        ports: u32,

        /// Port binding
        #[arg(long, value_enum, default_value = "early")]
        binding: PortBinding,

        /// Free-form description
        #[arg(long)]
        description: Option<String>,
    },

    /// Join hosts and their uplink NICs to an existing switch
    #[command(name = "add-host", visible_alias = "add-hosts")]
    AddHost {
        /// Name of the existing switch
        switch: String,

        /// Hosts as HOST[:NIC[,NIC...]], IPv6 hosts as [ADDR]:NIC
        #[arg(required = true, value_name = "HOST[:NICS]")]
        members: Vec<String>,
    },

    /// Create a switch, then a port group, then join hosts
    #[command(after_help = "Steps run in order and stop at the first failure. A switch that was
already created is left in place.")]
    Provision {
        /// Switch name
        name: String,

        /// Switch description
        #[arg(long)]
        description: Option<String>,

        /// Upper bound on ports across all port groups
        #[arg(long)]
        max_ports: Option<u32>,

        /// Port group to add once the switch exists
        #[arg(long)]
        portgroup: Option<String>,

        /// Ports in the port group
        #[arg(long, requires = "portgroup")]
        portgroup_ports: Option<u32>,

        /// Port group binding
        #[arg(long, value_enum, requires = "portgroup")]
        binding: Option<PortBinding>,

        /// Host to join as HOST[:NIC[,NIC...]] (repeatable)
        #[arg(long = "member", value_name = "HOST[:NICS]")]
        members: Vec<String>,
    },
}

/// Profile management commands
///
/// `profile set` takes its connection settings from the global flags
/// (`--host`, `--port`, `--user`, `--password`, `--insecure`,
/// `--datacenter`, `--wait-timeout`, `--wait-interval`).
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// List all configured profiles
    #[command(visible_alias = "ls", visible_alias = "l")]
    List,

    /// Show the path to the configuration file
    Path,

    /// Show details of a specific profile
    #[command(visible_alias = "sh", visible_alias = "get")]
    Show {
        /// Profile name to show
        name: String,
    },

    /// Set or create a profile
    #[command(visible_alias = "add", visible_alias = "create")]
    #[command(after_help = "EXAMPLES:
    # Create a profile (password will be prompted)
    dvsctl profile set prod --host vcenter.example.com --user svc-dvs@vsphere.local

    # Store the password as an environment reference
    dvsctl profile set lab --host 10.0.0.5 --user root --password '${VSPHERE_PASSWORD}' --insecure

    # Update only the polling defaults of an existing profile
    dvsctl profile set prod --wait-timeout 1200 --wait-interval 5
")]
    Set {
        /// Profile name
        name: String,

        /// vSphere API release in the endpoint path
        #[arg(long)]
        api_release: Option<String>,

        /// Store the password in the OS keyring instead of the config file
        #[cfg(feature = "secure-storage")]
        #[arg(long)]
        use_keyring: bool,
    },

    /// Remove a profile
    #[command(visible_alias = "rm", visible_alias = "del", visible_alias = "delete")]
    Remove {
        /// Profile name to remove
        name: String,

        /// Do not ask for confirmation
        #[arg(long, short)]
        yes: bool,
    },

    /// Set the default profile
    #[command(name = "default", visible_alias = "def")]
    Default {
        /// Profile name to use when --profile is not given
        name: String,
    },
}
