mod commands;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use commands::NodeArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "knode")]
#[command(about = "Provision a RHEL-family host as a Kubernetes worker node and join it to a cluster", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Config file (defaults to /etc/knode/config.toml, then ~/.config/knode/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run the provisioning steps and join the cluster
    Provision {
        #[command(flatten)]
        node: NodeArgs,
        /// Start at this step (1-9), assuming the earlier ones already succeeded
        #[arg(long, default_value_t = 1)]
        from_step: usize,
        /// Print what would change without touching the host
        #[arg(long)]
        dry_run: bool,
        /// Never prompt; keep a placeholder hostname and fail if no join command can be fetched
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Check this host and the control plane before provisioning
    Preflight {
        #[command(flatten)]
        node: NodeArgs,
    },
    /// List the provisioning steps
    Steps,
    /// Show the resolved configuration
    Config {
        #[command(flatten)]
        node: NodeArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .parse_default_env()
        .format_timestamp(None)
        .init();

    commands::handle_command(cli.config.as_deref(), cli.command)
}
