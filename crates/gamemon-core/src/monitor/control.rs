use tracing::{debug, warn};

use crate::error::Result;
use crate::monitor::{SharedState, lock_state};
use crate::protocol::ControlMessage;
use crate::transport::FrameSource;

/// Validate one control frame and apply it to the shared state.
///
/// Malformed messages are logged and dropped. Returns whether the frame was applied.
pub fn apply_control_frame(state: &SharedState, frame: &[u8]) -> bool {
    debug!("Message from browser: {}", String::from_utf8_lossy(frame));

    match ControlMessage::from_slice(frame) {
        Ok(message) => {
            lock_state(state).apply(message);
            true
        }
        Err(e) => {
            warn!("Ignoring control message: {}", e);
            false
        }
    }
}

/// Apply control frames from `source` until it reaches end of stream
pub fn run_control_loop<S: FrameSource>(source: &mut S, state: &SharedState) -> Result<()> {
    while let Some(frame) = source.recv_frame()? {
        apply_control_frame(state, &frame);
    }
    debug!("Control stream closed");
    Ok(())
}
