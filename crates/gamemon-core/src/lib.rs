//! # gamemon-core
//!
//! Core library for the game memory monitor and its browser relay.
//!
//! This crate provides:
//! - Process memory access (Windows, plus a mock image for tests)
//! - Scan entries, address resolution and change detection
//! - The monitor poll loop and its shared state
//! - Length-prefixed framing, the local socket and stdio transports
//! - The relay pump used by the native-messaging host

pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod monitor;
pub mod protocol;
pub mod relay;
pub mod retry;
pub mod scan;
pub mod shutdown;
pub mod transport;

pub use config::{HostConfig, MonitorConfig, MonitorConfigBuilder};
pub use error::{Error, Result};
pub use memory::{
    AttachedProcess, MemoryRegion, ModuleInfo, PointerWidth, ProcessProvider, ReadMemory,
    SystemProcesses,
};
pub use monitor::{Monitor, MonitorPhase, MonitorState, SharedState};
pub use protocol::{ControlMessage, EventMessage, FrameReader, FrameWriter, HostHello};
pub use relay::{Direction, PumpExit, run_pump};
pub use retry::{FixedDelay, RetryStrategy};
pub use scan::{Anchor, Pattern, ScanEngine, ScanEntry, ScanValue, ValueKind};
pub use shutdown::ShutdownSignal;
