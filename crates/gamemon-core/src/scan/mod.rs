//! Scan entries, address resolution and the per-tick scan engine.

mod engine;
mod entry;
mod pattern;
mod resolver;
mod value;

pub use engine::ScanEngine;
pub use entry::{Anchor, AnchorKind, Resolution, ScanEntry};
pub use pattern::Pattern;
pub use resolver::{ResolveError, Resolver, VariableMap, scan_pattern};
pub use value::{ScanValue, ValueKind};
