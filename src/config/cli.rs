use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "edge-ip-sync")]
#[command(about = "Sync nginx real-IP/geo config and ufw rules with the CDN's published IP ranges")]
#[command(version)]
pub struct CliArgs {
    /// Path to TOML configuration file (built-in defaults when absent)
    #[arg(short, long, default_value = "edge-ip-sync.toml")]
    pub config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Fetch and render, show planned changes, write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Leave firewall rules untouched
    #[arg(long)]
    pub skip_firewall: bool,

    /// Apply and validate files without reloading the proxy
    #[arg(long)]
    pub skip_reload: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    pub print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub validate: bool,
}
