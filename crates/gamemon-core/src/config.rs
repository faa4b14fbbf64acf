//! Runtime configuration for the monitor and the native-messaging host.
//!
//! Constants are grouped by concern. `MonitorConfig` and `HostConfig` carry
//! the values the binaries may override from the command line.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::memory::PointerWidth;

/// Timing constants for polling and reconnection
pub mod timing {
    use std::time::Duration;

    /// Interval between scan ticks while attached to the game
    pub const ATTACHED_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Interval between attempts while waiting for a target name or process
    pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

    /// Delay between local socket connection attempts
    pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
}

/// Local socket and framing constants
pub mod transport {
    /// Address the host listens on and the monitor connects to
    pub const DEFAULT_ADDRESS: &str = "127.0.0.1:6000";

    /// Shared key both processes present during the handshake
    pub const DEFAULT_AUTH_KEY: &str = "xtoysnotverysecretkey";

    /// Reply sent by the listener after a successful handshake
    pub const WELCOME: &[u8] = b"#WELCOME#";

    /// Reply sent by the listener when the key does not match
    pub const FAILURE: &[u8] = b"#FAILURE#";

    /// Upper bound for a single frame body
    pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

    /// Protocol version announced to the browser on startup
    pub const HOST_VERSION: &str = "1.0";
}

/// Address resolution constants
pub mod scan {
    /// Highest user-space address scanned for static and variable anchors
    pub const USER_SPACE_LIMIT: u64 = 0x7FFF_FFFF_FFFF;

    /// Sentinel stored in `address` and `result` for unresolvable entries
    pub const UNRESOLVABLE: i64 = -1;

    /// Largest `length` accepted for `string` and `bytes` entries
    pub const MAX_READ_LEN: usize = 64 * 1024;
}

/// Configuration for the monitor process
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Host socket address
    pub address: SocketAddr,
    /// Shared handshake key
    pub auth_key: String,
    /// Pointer width used when walking pointer chains
    pub pointer_width: PointerWidth,
    /// Tick interval while attached
    pub attached_interval: Duration,
    /// Wait interval while idle or searching for the process
    pub idle_interval: Duration,
    /// Log file path
    pub log_file: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            auth_key: transport::DEFAULT_AUTH_KEY.to_string(),
            pointer_width: PointerWidth::default(),
            attached_interval: timing::ATTACHED_POLL_INTERVAL,
            idle_interval: timing::IDLE_POLL_INTERVAL,
            log_file: PathBuf::from("gamemon.log"),
        }
    }
}

impl MonitorConfig {
    /// Create a new configuration builder
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }
}

/// Builder for MonitorConfig
#[derive(Debug, Clone, Default)]
pub struct MonitorConfigBuilder {
    address: Option<SocketAddr>,
    auth_key: Option<String>,
    pointer_width: Option<PointerWidth>,
    attached_interval: Option<Duration>,
    idle_interval: Option<Duration>,
    log_file: Option<PathBuf>,
}

impl MonitorConfigBuilder {
    pub fn address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }

    pub fn auth_key<S: Into<String>>(mut self, key: S) -> Self {
        self.auth_key = Some(key.into());
        self
    }

    pub fn pointer_width(mut self, width: PointerWidth) -> Self {
        self.pointer_width = Some(width);
        self
    }

    pub fn attached_interval(mut self, interval: Duration) -> Self {
        self.attached_interval = Some(interval);
        self
    }

    pub fn idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = Some(interval);
        self
    }

    pub fn log_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> MonitorConfig {
        let default = MonitorConfig::default();
        MonitorConfig {
            address: self.address.unwrap_or(default.address),
            auth_key: self.auth_key.unwrap_or(default.auth_key),
            pointer_width: self.pointer_width.unwrap_or(default.pointer_width),
            attached_interval: self.attached_interval.unwrap_or(default.attached_interval),
            idle_interval: self.idle_interval.unwrap_or(default.idle_interval),
            log_file: self.log_file.unwrap_or(default.log_file),
        }
    }
}

/// Configuration for the native-messaging host
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address to listen on
    pub address: SocketAddr,
    /// Shared handshake key
    pub auth_key: String,
    /// Monitor executable to launch, `None` to skip launching
    pub monitor_exe: Option<PathBuf>,
    /// Log file path
    pub log_file: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            auth_key: transport::DEFAULT_AUTH_KEY.to_string(),
            monitor_exe: None,
            log_file: PathBuf::from("gamemon-host.log"),
        }
    }
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6000))
}
