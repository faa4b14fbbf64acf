use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use gamemon_core::config::timing::CONNECT_RETRY_DELAY;
use gamemon_core::config::transport::{DEFAULT_ADDRESS, DEFAULT_AUTH_KEY};
use gamemon_core::logging::init_file_logging;
use gamemon_core::monitor::run_control_loop;
use gamemon_core::transport::connect_with_retry;
use gamemon_core::{
    FixedDelay, Monitor, MonitorConfig, MonitorState, PointerWidth, ShutdownSignal,
    SystemProcesses,
};
use tracing::{error, info};

const WATCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "gamemon")]
#[command(version, about = "Game memory monitor for the browser extension")]
struct Args {
    /// Host socket address
    #[arg(long, env = "GAMEMON_ADDRESS", default_value = DEFAULT_ADDRESS)]
    address: SocketAddr,

    /// Shared handshake key
    #[arg(long, env = "GAMEMON_AUTH_KEY", default_value = DEFAULT_AUTH_KEY, hide_env_values = true)]
    auth_key: String,

    /// Pointer size of the target process in bytes (4 or 8)
    #[arg(long, env = "GAMEMON_POINTER_WIDTH", default_value = "8")]
    pointer_width: PointerWidth,

    /// Log file, truncated on start
    #[arg(long, env = "GAMEMON_LOG", default_value = "gamemon.log")]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = MonitorConfig::builder()
        .address(args.address)
        .auth_key(args.auth_key)
        .pointer_width(args.pointer_width)
        .log_file(args.log_file)
        .build();

    init_file_logging(&config.log_file, "gamemon=info,gamemon_core=info")
        .with_context(|| format!("Failed to open log file {}", config.log_file.display()))?;

    info!("gamemon {}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&config) {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run(config: &MonitorConfig) -> Result<()> {
    let shutdown = Arc::new(ShutdownSignal::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping...");
        shutdown_ctrlc.trigger();
    })?;

    let mut retry = FixedDelay::forever(CONNECT_RETRY_DELAY);
    let Some(connection) =
        connect_with_retry(config.address, &config.auth_key, &mut retry, &shutdown)?
    else {
        info!("Shutdown before the host was reachable");
        return Ok(());
    };

    let closer = Arc::new(connection.closer()?);
    let (mut sender, mut receiver) = connection.split()?;
    let state = MonitorState::shared();

    // Ctrl+C only wakes waits; closing the socket also ends the blocked read
    let watcher_shutdown = Arc::clone(&shutdown);
    let watcher_closer = Arc::clone(&closer);
    thread::Builder::new()
        .name("shutdown-watch".to_string())
        .spawn(move || {
            while !watcher_shutdown.wait(WATCH_INTERVAL) {}
            watcher_closer.close();
        })?;

    let poll_state = Arc::clone(&state);
    let poll_shutdown = Arc::clone(&shutdown);
    let poll_closer = Arc::clone(&closer);
    let poll_config = config.clone();
    let poller = thread::Builder::new()
        .name("poll".to_string())
        .spawn(move || {
            let mut monitor = Monitor::new(SystemProcesses, poll_state, &poll_config);
            let result = monitor.run(&poll_shutdown, |event| sender.send_event(event));
            if let Err(e) = result {
                error!("Monitor loop failed: {}", e);
                poll_shutdown.fail(e.to_string());
                poll_closer.close();
            }
        })?;

    let control_result = run_control_loop(&mut receiver, &state);
    if control_result.is_ok() {
        info!("Host closed the connection");
    }
    shutdown.trigger();

    if poller.join().is_err() {
        bail!("Poll thread panicked");
    }
    if let Some(reason) = shutdown.failure() {
        bail!("Monitoring stopped: {}", reason);
    }

    match control_result {
        Ok(()) => Ok(()),
        Err(e) if e.is_disconnect() => {
            info!("Connection to host lost: {}", e);
            Ok(())
        }
        Err(e) => Err(e).context("Control stream failed"),
    }
}
