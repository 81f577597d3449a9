//! netmgr - Network Management CLI Tool
//!
//! Records port forwards in `forwarding.json` and applies them with the
//! host's native tools.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use libnetmgr::forward::{FixedPlatform, HostDetector};
use libnetmgr::*;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process;
use std::sync::Mutex;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "netmgr")]
#[command(version, about = "Network management tool - persistent port forwarding", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log the commands that would run without changing anything
    #[arg(short = 'n', long, global = true)]
    dry_run: bool,

    /// Tool configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Directory holding forwarding.json (overrides the config file)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Drive the backend of another platform
    #[arg(long, global = true, hide = true, value_enum)]
    platform: Option<PlatformArg>,
}

#[derive(Subcommand)]
enum Commands {
    /// Port forwarding management
    #[command(subcommand, visible_alias = "fwd")]
    Forward(ForwardCommands),
}

#[derive(Subcommand)]
enum ForwardCommands {
    /// Show all port forwards
    #[command(visible_alias = "list")]
    Show,
    /// Add a port forward
    Add {
        /// Unique forward name
        name: String,
        /// Local port
        src_port: String,
        /// Destination address
        dest_ip: String,
        /// Destination port
        dest_port: String,
        /// tcp or udp
        #[arg(default_value = "tcp")]
        protocol: Protocol,
    },
    /// Remove a port forward
    #[command(visible_alias = "del")]
    Remove {
        /// Forward name
        name: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PlatformArg {
    Linux,
    Windows,
    Macos,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Linux => Platform::Linux,
            PlatformArg::Windows => Platform::Windows,
            PlatformArg::Macos => Platform::MacOs,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging needs the log directory, so configuration comes first
    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    };

    init_logging(&cli, &config);

    if let Err(e) = run(&cli, &config).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<NetmgrConfig> {
    let mut config = NetmgrConfig::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    if let Some(dir) = &cli.config_dir {
        config = config.with_config_dir(dir.clone());
    }

    config.ensure_directories()?;
    Ok(config)
}

async fn run(cli: &Cli, config: &NetmgrConfig) -> Result<()> {
    debug!("Using config directory {}", config.paths.config_dir.display());
    ConfigStore::new(config.paths.config_dir.clone()).bootstrap()?;

    let options = ExecOptions {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
    };

    let manager = match cli.platform {
        Some(platform) => ForwardManager::from_config(config, options, &FixedPlatform(platform.into()))?,
        None => ForwardManager::from_config(config, options, &HostDetector)?,
    };

    match &cli.command {
        Commands::Forward(cmd) => handle_forward(cmd, &manager, cli).await,
    }
}

async fn handle_forward(cmd: &ForwardCommands, manager: &ForwardManager, cli: &Cli) -> Result<()> {
    match cmd {
        ForwardCommands::Show => {
            let forwards = manager.list()?;
            if forwards.is_empty() {
                println!("No port forwards configured");
            } else {
                print!("{}", render_table(&forwards));
            }
        }

        ForwardCommands::Add { name, src_port, dest_ip, dest_port, protocol } => {
            preflight(manager, cli)?;
            let rule = manager.add(name, src_port, dest_ip, dest_port, *protocol).await?;
            if !cli.dry_run {
                println!("Port forward {} added: {} ({})", rule.name, rule.target(), rule.protocol);
            }
        }

        ForwardCommands::Remove { name } => {
            preflight(manager, cli)?;
            let report = manager.remove(name).await?;
            if !cli.dry_run {
                if report.is_clean() {
                    println!("Port forward {} removed", name);
                } else {
                    println!("Port forward {} removed (teardown incomplete, check the host rules)", name);
                }
            }
        }
    }

    Ok(())
}

/// Checks run before any command that changes host state
fn preflight(manager: &ForwardManager, cli: &Cli) -> Result<()> {
    if cli.dry_run {
        info!("[DRY-RUN] Skipping privilege and tool checks");
        return Ok(());
    }

    if !is_privileged() {
        return Err(NetmgrError::PermissionDenied(
            "Port forwarding requires root/administrator privileges".to_string(),
        )
        .into());
    }

    let backend = manager.backend();
    if let Err(e) = check_dependencies(backend.required_tools()) {
        warn!("The {} backend cannot run: {}", backend.name(), e);
        return Err(e.into());
    }

    Ok(())
}

fn init_logging(cli: &Cli, config: &NetmgrConfig) {
    let log_level = if cli.verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("netmgr={},libnetmgr={}", log_level, log_level)));

    let log_file = config.paths.log_file();
    let (file_layer, file_error) = match OpenOptions::new().create(true).append(true).open(&log_file) {
        Ok(file) => {
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(atty::is(atty::Stream::Stdout)),
        )
        .with(file_layer)
        .init();

    // Unprivileged runs usually cannot write the system log directory
    if let Some(e) = file_error {
        debug!("Not logging to {}: {}", log_file.display(), e);
    }
}
