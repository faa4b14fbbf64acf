//! Native-messaging host: relays frames between the browser and the monitor.

mod launcher;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use gamemon_core::config::transport::{DEFAULT_ADDRESS, DEFAULT_AUTH_KEY};
use gamemon_core::logging::init_file_logging;
use gamemon_core::relay::{Direction, run_pump};
use gamemon_core::transport::{BrowserReceiver, BrowserSender, SocketListener};
use gamemon_core::{HostConfig, HostHello};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "gamemon-host")]
#[command(version, about = "Native messaging host for the game monitor")]
struct Args {
    /// Address to listen on for the monitor
    #[arg(long, env = "GAMEMON_ADDRESS", default_value = DEFAULT_ADDRESS)]
    address: SocketAddr,

    /// Shared handshake key
    #[arg(long, env = "GAMEMON_AUTH_KEY", default_value = DEFAULT_AUTH_KEY, hide_env_values = true)]
    auth_key: String,

    /// Monitor executable (default: gamemon next to this binary)
    #[arg(long, env = "GAMEMON_MONITOR")]
    monitor: Option<PathBuf>,

    /// Do not start the monitor; wait for one started separately
    #[arg(long)]
    no_launch: bool,

    /// Log file, truncated on start
    #[arg(long, env = "GAMEMON_HOST_LOG", default_value = "gamemon-host.log")]
    log_file: PathBuf,

    /// Arguments the browser passes to native hosts (origin, parent window)
    #[arg(hide = true, trailing_var_arg = true, allow_hyphen_values = true)]
    browser_args: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let monitor_exe = if args.no_launch {
        None
    } else {
        Some(launcher::resolve_monitor_path(args.monitor)?)
    };
    let config = HostConfig {
        address: args.address,
        auth_key: args.auth_key,
        monitor_exe,
        log_file: args.log_file,
    };

    init_file_logging(&config.log_file, "gamemon_host=info,gamemon_core=info")
        .with_context(|| format!("Failed to open log file {}", config.log_file.display()))?;

    info!("gamemon-host {}", env!("CARGO_PKG_VERSION"));
    if !args.browser_args.is_empty() {
        info!("Started by browser with {:?}", args.browser_args);
    }

    if let Err(e) = run(&config) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run(config: &HostConfig) -> Result<()> {
    // Listen first so the monitor's first connection attempt can succeed
    let listener = SocketListener::bind(config.address, &config.auth_key)
        .with_context(|| format!("Failed to listen on {}", config.address))?;

    if let Some(exe) = &config.monitor_exe {
        let monitor_args = vec!["--address".to_string(), listener.local_addr()?.to_string()];
        match launcher::launch_monitor(exe, &monitor_args, &config.auth_key) {
            Ok(pid) => info!("Launched monitor {} (pid {})", exe.display(), pid),
            Err(e) => warn!("{}; waiting for a monitor started separately", e),
        }
    }

    let mut browser_tx = BrowserSender::stdout();
    browser_tx
        .send_json(&HostHello::default())
        .context("Failed to greet the browser")?;

    info!("Waiting for the monitor on {}", listener.local_addr()?);
    let connection = listener.accept_authenticated()?;
    let (monitor_tx, monitor_rx) = connection.split()?;

    let exit = run_pump(BrowserReceiver::stdin(), browser_tx, monitor_rx, monitor_tx);
    match (exit.direction, exit.outcome) {
        (Direction::BrowserToMonitor, Ok(frames)) => {
            info!("Browser closed the pipe after {} messages", frames);
            Ok(())
        }
        (Direction::MonitorToBrowser, Ok(frames)) => {
            bail!("Monitor disconnected after {} messages", frames)
        }
        (direction, Err(e)) => Err(e).with_context(|| format!("Relay failed ({})", direction)),
    }
}
