//! Turns a scan entry's anchor/pattern/offset/pointer description into an
//! absolute address in the target process.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, trace};

use crate::config::scan::USER_SPACE_LIMIT;
use crate::error::Error;
use crate::memory::{ModuleInfo, PointerWidth, ReadMemory};
use crate::scan::{Anchor, AnchorKind, Pattern, ScanEntry};

/// Bytes read per step while scanning a large region
const SCAN_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Entry name -> resolved address, usable as a `variable` anchor
pub type VariableMap = HashMap<String, u64>;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{kind} '{name}' not found")]
    AnchorMissing { kind: AnchorKind, name: String },

    #[error("pattern '{pattern}' not found between {start:#x} and {end:#x}")]
    PatternNotFound {
        pattern: String,
        start: u64,
        end: u64,
    },

    #[error(transparent)]
    Fault(#[from] Error),
}

impl ResolveError {
    /// Misses leave the entry unresolvable; faults end the session
    pub fn is_miss(&self) -> bool {
        !matches!(self, Self::Fault(_))
    }
}

pub struct Resolver<'a, R: ReadMemory> {
    reader: &'a R,
    modules: &'a HashMap<String, ModuleInfo>,
    variables: &'a VariableMap,
    pointer_width: PointerWidth,
}

impl<'a, R: ReadMemory> Resolver<'a, R> {
    pub fn new(
        reader: &'a R,
        modules: &'a HashMap<String, ModuleInfo>,
        variables: &'a VariableMap,
        pointer_width: PointerWidth,
    ) -> Self {
        Self {
            reader,
            modules,
            variables,
            pointer_width,
        }
    }

    pub fn resolve(&self, entry: &ScanEntry) -> Result<u64, ResolveError> {
        let (mut address, end) = self.anchor(&entry.anchor)?;

        if let Some(pattern) = &entry.pattern {
            address = scan_pattern(self.reader, pattern, address, end)?.ok_or_else(|| {
                ResolveError::PatternNotFound {
                    pattern: pattern.to_string(),
                    start: address,
                    end,
                }
            })?;
            trace!("{}: pattern matched at {:#x}", entry.name, address);
        }

        if let Some(offset) = entry.offset {
            address = address.wrapping_add_signed(offset);
        }

        // base -> *base -> *(p1) -> ... -> *(p[n-2]) + p[n-1]
        if let Some((last, walk)) = entry.pointers.split_last() {
            address = self.reader.read_pointer(address, self.pointer_width)?;
            for pointer in walk {
                address = self
                    .reader
                    .read_pointer(address.wrapping_add_signed(*pointer), self.pointer_width)?;
            }
            address = address.wrapping_add_signed(*last);
        }

        Ok(address)
    }

    /// Start address and scan upper bound for an anchor
    fn anchor(&self, anchor: &Anchor) -> Result<(u64, u64), ResolveError> {
        match anchor {
            Anchor::Module(name) => {
                let module = self
                    .modules
                    .get(name)
                    .or_else(|| {
                        self.modules
                            .values()
                            .find(|m| m.name.eq_ignore_ascii_case(name))
                    })
                    .ok_or_else(|| ResolveError::AnchorMissing {
                        kind: AnchorKind::Module,
                        name: name.clone(),
                    })?;
                Ok((module.base, module.end()))
            }
            Anchor::Variable(name) => {
                let address =
                    self.variables
                        .get(name)
                        .copied()
                        .ok_or_else(|| ResolveError::AnchorMissing {
                            kind: AnchorKind::Variable,
                            name: name.clone(),
                        })?;
                Ok((address, USER_SPACE_LIMIT))
            }
            Anchor::Static(address) => Ok((*address, USER_SPACE_LIMIT)),
        }
    }
}

/// Find the first occurrence of `pattern` in `[start, end)`.
///
/// Walks the address space region by region, skipping regions that are not
/// committed or readable. Large regions are read in chunks that overlap by
/// `pattern.len() - 1` bytes so matches straddling a chunk edge are found.
pub fn scan_pattern<R: ReadMemory>(
    reader: &R,
    pattern: &Pattern,
    start: u64,
    end: u64,
) -> crate::Result<Option<u64>> {
    let mut address = start;

    while address < end {
        let Some(region) = reader.query_region(address)? else {
            break;
        };
        let region_end = region.end().min(end);
        if region_end <= address {
            break;
        }

        if region.readable
            && let Some(found) = scan_region(reader, pattern, address, region_end)
        {
            return Ok(Some(found));
        }

        address = region_end;
    }

    Ok(None)
}

fn scan_region<R: ReadMemory>(reader: &R, pattern: &Pattern, start: u64, end: u64) -> Option<u64> {
    let keep = pattern.len().saturating_sub(1);
    let mut tail: Vec<u8> = Vec::new();
    let mut address = start;

    while address < end {
        let read_size = SCAN_CHUNK_SIZE.min((end - address) as usize);
        let chunk = match reader.read_bytes(address, read_size) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("Pattern scan skipped region at {:#x}: {}", address, e);
                return None;
            }
        };

        let mut data = Vec::with_capacity(tail.len() + chunk.len());
        data.extend_from_slice(&tail);
        data.extend_from_slice(&chunk);
        let data_base = address - tail.len() as u64;

        if let Some(pos) = pattern.find_in(&data) {
            return Some(data_base + pos as u64);
        }

        tail = data[data.len().saturating_sub(keep)..].to_vec();
        address += read_size as u64;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockProcess;
    use crate::scan::ValueKind;

    fn modules_of(process: &MockProcess) -> HashMap<String, ModuleInfo> {
        use crate::memory::AttachedProcess;
        process
            .modules()
            .unwrap()
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect()
    }

    fn resolve(process: &MockProcess, variables: &VariableMap, entry: &ScanEntry) -> Result<u64, ResolveError> {
        let modules = modules_of(process);
        Resolver::new(process, &modules, variables, PointerWidth::Eight).resolve(entry)
    }

    #[test]
    fn test_static_anchor_plus_offset() {
        let process = MockProcess::new(1);
        for (base, offset) in [(0x1000u64, 0x10i64), (0x7000, -0x20), (0, 0)] {
            let entry = ScanEntry::new("v", Anchor::Static(base), ValueKind::Int).with_offset(offset);
            let address = resolve(&process, &VariableMap::new(), &entry).unwrap();
            assert_eq!(address, base.wrapping_add_signed(offset));
        }
        // No memory is touched for a plain static address
        assert_eq!(process.reads(), 0);
    }

    #[test]
    fn test_module_anchor_plus_offset() {
        let process = MockProcess::new(1).module("main.exe", 0x400000, 0x1000);
        let entry = ScanEntry::new("hp", Anchor::Module("main.exe".into()), ValueKind::Int)
            .with_offset(0x10);
        assert_eq!(resolve(&process, &VariableMap::new(), &entry).unwrap(), 0x400010);

        let upper = ScanEntry::new("hp", Anchor::Module("MAIN.EXE".into()), ValueKind::Int);
        assert_eq!(resolve(&process, &VariableMap::new(), &upper).unwrap(), 0x400000);
    }

    #[test]
    fn test_missing_anchors_are_misses() {
        let process = MockProcess::new(1);
        let module = ScanEntry::new("a", Anchor::Module("nope.dll".into()), ValueKind::Int);
        let err = resolve(&process, &VariableMap::new(), &module).unwrap_err();
        assert!(err.is_miss());
        assert!(matches!(err, ResolveError::AnchorMissing { kind: AnchorKind::Module, .. }));

        let variable = ScanEntry::new("b", Anchor::Variable("player".into()), ValueKind::Int);
        let err = resolve(&process, &VariableMap::new(), &variable).unwrap_err();
        assert!(matches!(err, ResolveError::AnchorMissing { kind: AnchorKind::Variable, .. }));
    }

    #[test]
    fn test_variable_anchor_uses_earlier_address() {
        let process = MockProcess::new(1);
        let mut variables = VariableMap::new();
        variables.insert("player".to_string(), 0x2000);

        let entry = ScanEntry::new("hp", Anchor::Variable("player".into()), ValueKind::Int)
            .with_offset(0x8);
        assert_eq!(resolve(&process, &variables, &entry).unwrap(), 0x2008);
    }

    #[test]
    fn test_pointer_chain_walk() {
        let process = MockProcess::new(1)
            .module("main.exe", 0x400000, 0x1000)
            .map(0x10000, 0x100)
            .map(0x20000, 0x100);
        // base slot -> 0x10000; *(0x10000 + 0x8) -> 0x20000; *(0x20000 + 0x10) -> 0x30000
        process.write_u64(0x400100, 0x10000);
        process.write_u64(0x10008, 0x20000);
        process.write_u64(0x20010, 0x30000);

        let entry = ScanEntry::new("hp", Anchor::Module("main.exe".into()), ValueKind::Int)
            .with_offset(0x100)
            .with_pointers(vec![0x8, 0x10, 0x24]);
        let address = resolve(&process, &VariableMap::new(), &entry).unwrap();

        assert_eq!(address, 0x30024);
        // One read of the base slot plus one per non-final pointer
        assert_eq!(process.reads(), 3);
    }

    #[test]
    fn test_pointer_chain_single_element_is_deref_plus_offset() {
        let process = MockProcess::new(1).map(0x5000, 0x10);
        process.write_u64(0x5000, 0x9000);

        let entry = ScanEntry::new("x", Anchor::Static(0x5000), ValueKind::Int)
            .with_pointers(vec![0x4]);
        assert_eq!(resolve(&process, &VariableMap::new(), &entry).unwrap(), 0x9004);
        assert_eq!(process.reads(), 1);
    }

    #[test]
    fn test_pointer_chain_four_byte_width() {
        let process = MockProcess::new(1).map(0x5000, 0x10).map(0x9000, 0x10);
        process.write_i32(0x5000, 0x9000);
        process.write_i32(0x9004, 0xA000);

        let entry = ScanEntry::new("x", Anchor::Static(0x5000), ValueKind::Int)
            .with_pointers(vec![0x4, 0x2]);
        let modules = HashMap::new();
        let variables = VariableMap::new();
        let address = Resolver::new(&process, &modules, &variables, PointerWidth::Four)
            .resolve(&entry)
            .unwrap();
        assert_eq!(address, 0xA002);
    }

    #[test]
    fn test_pointer_into_unmapped_memory_is_fault() {
        let process = MockProcess::new(1).map(0x5000, 0x10);
        process.write_u64(0x5000, 0xDEAD0000);

        let entry = ScanEntry::new("x", Anchor::Static(0x5000), ValueKind::Int)
            .with_pointers(vec![0x0, 0x0]);
        let err = resolve(&process, &VariableMap::new(), &entry).unwrap_err();
        assert!(!err.is_miss());
    }

    #[test]
    fn test_pattern_scan_within_module() {
        let process = MockProcess::new(1).module("main.exe", 0x400000, 0x1000);
        process.write(0x400800, &[0x48, 0x8B, 0x05, 0x11, 0x22, 0x89]);

        let entry = ScanEntry::new("hp", Anchor::Module("main.exe".into()), ValueKind::Int)
            .with_pattern(Pattern::parse("48 8B 05 . . 89").unwrap())
            .with_offset(3);
        assert_eq!(resolve(&process, &VariableMap::new(), &entry).unwrap(), 0x400803);
    }

    #[test]
    fn test_pattern_scan_skips_unmapped_gaps() {
        let process = MockProcess::new(1).map(0x1000, 0x100).map(0x8000, 0x100);
        process.write(0x8040, &[0xDE, 0xAD, 0xBE, 0xEF]);

        let entry = ScanEntry::new("x", Anchor::Static(0x1000), ValueKind::Int)
            .with_pattern(Pattern::parse("DEADBEEF").unwrap());
        assert_eq!(resolve(&process, &VariableMap::new(), &entry).unwrap(), 0x8040);
    }

    #[test]
    fn test_pattern_outside_module_bounds_is_miss() {
        let process = MockProcess::new(1)
            .module("main.exe", 0x400000, 0x1000)
            .map(0x401000, 0x100);
        process.write(0x401010, &[0xCA, 0xFE]);

        let entry = ScanEntry::new("x", Anchor::Module("main.exe".into()), ValueKind::Int)
            .with_pattern(Pattern::parse("CA FE").unwrap());
        let err = resolve(&process, &VariableMap::new(), &entry).unwrap_err();
        assert!(matches!(err, ResolveError::PatternNotFound { .. }));
    }

    #[test]
    fn test_scan_finds_match_across_chunk_edge() {
        let size = SCAN_CHUNK_SIZE + 0x100;
        let process = MockProcess::new(1).map(0x100000, size);
        let edge = 0x100000 + SCAN_CHUNK_SIZE as u64 - 2;
        process.write(edge, &[0x01, 0x02, 0x03, 0x04]);

        let pattern = Pattern::parse("01 02 03 04").unwrap();
        let found = scan_pattern(&process, &pattern, 0x100000, 0x100000 + size as u64).unwrap();
        assert_eq!(found, Some(edge));
    }
}
