//! Process monitor: attaches to the target game and polls scan entries.
//!
//! The control path mutates [`MonitorState`] as browser messages arrive; the
//! poll path ([`Monitor`]) reads it every tick, attaching to the target
//! process and running the [`ScanEngine`] over the entry table.

mod control;
mod state;

use std::time::Duration;

use strum::Display;
use tracing::{debug, info, trace, warn};

pub use control::{apply_control_frame, run_control_loop};
pub use state::{MonitorState, SharedState, lock_state};

use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::memory::{AttachedProcess, PointerWidth, ProcessProvider};
use crate::protocol::EventMessage;
use crate::scan::ScanEngine;
use crate::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MonitorPhase {
    /// No target name configured
    Idle,
    /// Target name set, process not open yet
    Attaching,
    /// Process open and modules enumerated
    Attached,
}

/// Everything tied to one open process
struct Session<T> {
    process: T,
    engine: ScanEngine,
    /// State generation the process was opened for
    generation: u64,
}

/// Poll loop over a [`ProcessProvider`]
pub struct Monitor<P: ProcessProvider> {
    provider: P,
    state: SharedState,
    pointer_width: PointerWidth,
    attached_interval: Duration,
    idle_interval: Duration,
    session: Option<Session<P::Process>>,
}

impl<P: ProcessProvider> Monitor<P> {
    pub fn new(provider: P, state: SharedState, config: &MonitorConfig) -> Self {
        Self {
            provider,
            state,
            pointer_width: config.pointer_width,
            attached_interval: config.attached_interval,
            idle_interval: config.idle_interval,
            session: None,
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        if self.session.is_some() {
            MonitorPhase::Attached
        } else if lock_state(&self.state).target().is_some() {
            MonitorPhase::Attaching
        } else {
            MonitorPhase::Idle
        }
    }

    /// Run one poll iteration and return the events it produced.
    ///
    /// Detaches when the target changed since the attach, tries to attach
    /// when a target is set, and ticks the scan engine when attached. Only
    /// read faults at resolved addresses and unsupported platforms are
    /// returned as errors.
    pub fn step(&mut self) -> Result<Vec<EventMessage>> {
        let mut events = Vec::new();
        let (target, generation) = {
            let state = lock_state(&self.state);
            (state.target().map(str::to_string), state.generation())
        };

        if self
            .session
            .as_ref()
            .is_some_and(|session| session.generation != generation)
        {
            self.detach();
            events.push(EventMessage::ActiveChanged { state: false });
        }

        let Some(target) = target else {
            return Ok(events);
        };

        if self.session.is_none() {
            if !self.attach(&target, generation)? {
                return Ok(events);
            }
            events.push(EventMessage::ActiveChanged { state: true });
        }

        let Some(session) = self.session.as_mut() else {
            return Ok(events);
        };

        let mut state = lock_state(&self.state);
        // set_name raced with this tick; the next step detaches
        if state.generation() != session.generation {
            return Ok(events);
        }
        events.extend(session.engine.tick(&session.process, state.entries_mut())?);

        Ok(events)
    }

    /// Poll until shutdown, handing every event to `emit`.
    ///
    /// Stops with an error when a step fails or `emit` fails.
    pub fn run<F>(&mut self, shutdown: &ShutdownSignal, mut emit: F) -> Result<()>
    where
        F: FnMut(&EventMessage) -> Result<()>,
    {
        info!("Monitor loop started");

        while !shutdown.is_shutdown() {
            for event in self.step()? {
                emit(&event)?;
            }

            let interval = if self.session.is_some() {
                self.attached_interval
            } else {
                self.idle_interval
            };
            if shutdown.wait(interval) {
                break;
            }
        }

        self.detach();
        info!("Monitor loop stopped");
        Ok(())
    }

    /// Open the target and enumerate its modules. Returns `false` when the
    /// process is not available yet.
    fn attach(&mut self, target: &str, generation: u64) -> Result<bool> {
        let process = match self.provider.open(target) {
            Ok(process) => process,
            Err(e) if e.is_not_found() => {
                trace!("Waiting for {}", target);
                return Ok(false);
            }
            Err(Error::ProcessOpenFailed(message)) => {
                warn!("Found {} but could not open it: {}", target, message);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let modules = match process.modules() {
            Ok(modules) => modules,
            Err(e) => {
                warn!("Failed to enumerate modules of {}: {}", target, e);
                return Ok(false);
            }
        };

        let mut state = lock_state(&self.state);
        if state.generation() != generation {
            debug!("Target changed while attaching to {}", target);
            return Ok(false);
        }
        state.set_game_active(true);

        info!(
            "Attached to {} (pid {}, {} modules)",
            target,
            process.pid(),
            modules.len()
        );
        self.session = Some(Session {
            process,
            engine: ScanEngine::new(modules, self.pointer_width),
            generation,
        });
        Ok(true)
    }

    fn detach(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Detached from pid {}", session.process.pid());
        }
    }
}
