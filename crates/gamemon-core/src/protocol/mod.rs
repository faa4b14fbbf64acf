//! Message schema and the length-prefixed wire framing.

mod framing;
mod message;

pub use framing::{FrameReader, FrameWriter};
pub use message::{ControlMessage, EventMessage, HostHello};
