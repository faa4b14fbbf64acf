use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::protocol::ControlMessage;
use crate::scan::ScanEntry;

/// State shared between the control loop and the poll loop
pub type SharedState = Arc<Mutex<MonitorState>>;

/// Lock shared state, recovering from a poisoned mutex
pub fn lock_state(state: &SharedState) -> MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Target selection and the scan entry table
#[derive(Debug, Default)]
pub struct MonitorState {
    target: Option<String>,
    game_active: bool,
    /// Kept in insertion order so variable anchors resolve predictably
    entries: Vec<ScanEntry>,
    /// Bumped on every target change; the poll loop detaches when it moves
    generation: u64,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn game_active(&self) -> bool {
        self.game_active
    }

    pub fn set_game_active(&mut self, active: bool) {
        self.game_active = active;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> &[ScanEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [ScanEntry] {
        &mut self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&ScanEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Select the target process.
    ///
    /// Returns `false` if `name` is already the target. Otherwise every
    /// entry's address and last value are forgotten, since they belong to
    /// the previous process.
    pub fn set_target(&mut self, name: String) -> bool {
        if self.target.as_deref() == Some(name.as_str()) {
            return false;
        }

        info!("Target process set to {}", name);
        self.target = Some(name);
        self.game_active = false;
        self.generation += 1;
        for entry in &mut self.entries {
            entry.invalidate();
        }
        true
    }

    /// Insert a new entry or replace the one with the same name in place
    pub fn upsert_entry(&mut self, name: String, mut entry: ScanEntry) {
        entry.name = name;
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => {
                debug!("Replacing scan entry {}", entry.name);
                *existing = entry;
            }
            None => {
                debug!("Adding scan entry {}", entry.name);
                self.entries.push(entry);
            }
        }
    }

    pub fn apply(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::SetName { name } => {
                self.set_target(name);
            }
            ControlMessage::SetScanEntry { name, scan_data } => self.upsert_entry(name, scan_data),
        }
    }
}
