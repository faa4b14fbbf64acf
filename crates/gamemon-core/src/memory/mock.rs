//! In-memory process image for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::config::scan::USER_SPACE_LIMIT;
use crate::error::{Error, Result};
use crate::memory::{AttachedProcess, MemoryRegion, ModuleInfo, ProcessProvider, ReadMemory};

#[derive(Default)]
struct MockImage {
    segments: BTreeMap<u64, Vec<u8>>,
    modules: Vec<ModuleInfo>,
    reads: usize,
}

impl MockImage {
    fn segment_containing(&self, address: u64) -> Option<(u64, &Vec<u8>)> {
        self.segments
            .range(..=address)
            .next_back()
            .filter(|(base, data)| address < **base + data.len() as u64)
            .map(|(base, data)| (*base, data))
    }
}

/// A fake process whose memory is a set of mapped segments.
///
/// Clones share the same image, so a test can keep a handle and change
/// memory after the monitor has attached.
#[derive(Clone, Default)]
pub struct MockProcess {
    pid: u32,
    image: Arc<Mutex<MockImage>>,
}

impl MockProcess {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            image: Arc::default(),
        }
    }

    /// Map `size` zeroed bytes at `base`
    pub fn map(self, base: u64, size: usize) -> Self {
        self.image
            .lock()
            .unwrap()
            .segments
            .insert(base, vec![0; size]);
        self
    }

    /// Register a module and map its image
    pub fn module(self, name: &str, base: u64, size: u64) -> Self {
        self.image.lock().unwrap().modules.push(ModuleInfo {
            name: name.to_string(),
            base,
            size,
        });
        self.map(base, size as usize)
    }

    pub fn write(&self, address: u64, bytes: &[u8]) {
        let mut image = self.image.lock().unwrap();
        let base = image
            .segment_containing(address)
            .map(|(base, _)| base)
            .unwrap_or_else(|| panic!("address {:#x} is not mapped", address));
        let data = image.segments.get_mut(&base).unwrap();
        let start = (address - base) as usize;
        data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn write_i32(&self, address: u64, value: i32) {
        self.write(address, &value.to_le_bytes());
    }

    pub fn write_u64(&self, address: u64, value: u64) {
        self.write(address, &value.to_le_bytes());
    }

    /// Number of `read_bytes` calls served so far
    pub fn reads(&self) -> usize {
        self.image.lock().unwrap().reads
    }
}

impl ReadMemory for MockProcess {
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        let mut image = self.image.lock().unwrap();
        image.reads += 1;

        let fault = || Error::MemoryReadFailed {
            address,
            message: "unmapped".to_string(),
        };
        let (base, data) = image.segment_containing(address).ok_or_else(fault)?;
        let start = (address - base) as usize;
        let end = start.checked_add(size).ok_or_else(fault)?;
        if end > data.len() {
            return Err(fault());
        }
        Ok(data[start..end].to_vec())
    }

    fn query_region(&self, address: u64) -> Result<Option<MemoryRegion>> {
        if address >= USER_SPACE_LIMIT {
            return Ok(None);
        }

        let image = self.image.lock().unwrap();
        if let Some((base, data)) = image.segment_containing(address) {
            return Ok(Some(MemoryRegion {
                base,
                size: data.len() as u64,
                readable: true,
            }));
        }

        // Unmapped gap up to the next segment
        let next = image
            .segments
            .range(address..)
            .next()
            .map(|(base, _)| *base)
            .unwrap_or(USER_SPACE_LIMIT);
        Ok(Some(MemoryRegion {
            base: address,
            size: next - address,
            readable: false,
        }))
    }
}

impl AttachedProcess for MockProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn modules(&self) -> Result<Vec<ModuleInfo>> {
        Ok(self.image.lock().unwrap().modules.clone())
    }
}

/// Serves `MockProcess` images by executable name
#[derive(Clone, Default)]
pub struct MockProcessProvider {
    processes: Arc<Mutex<HashMap<String, MockProcess>>>,
}

impl MockProcessProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, process: MockProcess) {
        self.processes
            .lock()
            .unwrap()
            .insert(name.to_ascii_lowercase(), process);
    }
}

impl ProcessProvider for MockProcessProvider {
    type Process = MockProcess;

    fn open(&self, name: &str) -> Result<MockProcess> {
        self.processes
            .lock()
            .unwrap()
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::ProcessNotFound(name.to_string()))
    }
}
