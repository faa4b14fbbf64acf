use serde::{Deserialize, Serialize};

use crate::config::transport::HOST_VERSION;
use crate::error::{Error, Result};
use crate::scan::ScanEntry;

/// Browser -> monitor
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Select the target process by executable name
    SetName { name: String },
    /// Insert or replace a scan entry
    SetScanEntry { name: String, scan_data: ScanEntry },
}

impl ControlMessage {
    /// Decode and validate one frame body
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidMessage(e.to_string()))
    }
}

/// Monitor -> browser
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventMessage {
    ActiveChanged { state: bool },
    EntryChanged { name: String, scan_data: ScanEntry },
}

impl EventMessage {
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// First message the host writes to the browser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostHello {
    pub version: String,
}

impl Default for HostHello {
    fn default() -> Self {
        Self {
            version: HOST_VERSION.to_string(),
        }
    }
}
