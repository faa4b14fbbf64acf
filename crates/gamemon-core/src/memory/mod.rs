mod process;
mod reader;

#[cfg(test)]
pub mod mock;

pub use process::*;
pub use reader::{MemoryRegion, PointerWidth, ReadMemory};

#[cfg(test)]
pub use mock::{MockProcess, MockProcessProvider};
