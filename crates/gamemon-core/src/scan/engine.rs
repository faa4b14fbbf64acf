use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::Result;
use crate::memory::{ModuleInfo, PointerWidth, ReadMemory};
use crate::protocol::EventMessage;
use crate::scan::{ResolveError, Resolution, Resolver, ScanEntry, VariableMap};

/// Per-attach scan state: module table and resolved variables.
///
/// A new engine is created for every process attach, so nothing resolved
/// against one process survives into the next.
pub struct ScanEngine {
    modules: HashMap<String, ModuleInfo>,
    variables: VariableMap,
    pointer_width: PointerWidth,
}

impl ScanEngine {
    pub fn new(modules: Vec<ModuleInfo>, pointer_width: PointerWidth) -> Self {
        let modules = modules
            .into_iter()
            .map(|module| (module.name.clone(), module))
            .collect();

        Self {
            modules,
            variables: VariableMap::new(),
            pointer_width,
        }
    }

    pub fn variables(&self) -> &VariableMap {
        &self.variables
    }

    /// Resolve pending entries, read every resolved one and report changes.
    ///
    /// Entries are visited in order, so an entry may anchor on a variable
    /// resolved earlier in the same pass. A read fault at a resolved address
    /// aborts the pass with an error.
    pub fn tick<R: ReadMemory>(
        &mut self,
        reader: &R,
        entries: &mut [ScanEntry],
    ) -> Result<Vec<EventMessage>> {
        let mut events = Vec::new();

        for entry in entries.iter_mut() {
            if entry.is_pending() {
                self.resolve_entry(reader, entry)?;
            }

            let Resolution::Resolved(address) = entry.resolution else {
                continue;
            };

            let width = entry.kind.width(entry.length)?;
            let bytes = reader.read_bytes(address, width)?;
            let value = entry.kind.decode(&bytes);

            if entry
                .result
                .as_ref()
                .is_some_and(|previous| previous.same_as(&value))
            {
                continue;
            }

            debug!("{}: Value {:?}", entry.name, value);
            entry.result = Some(value);
            events.push(EventMessage::EntryChanged {
                name: entry.name.clone(),
                scan_data: entry.clone(),
            });
        }

        Ok(events)
    }

    fn resolve_entry<R: ReadMemory>(&mut self, reader: &R, entry: &mut ScanEntry) -> Result<()> {
        let resolver = Resolver::new(reader, &self.modules, &self.variables, self.pointer_width);

        match resolver.resolve(entry) {
            Ok(address) => {
                debug!("{}: Address {:#x}", entry.name, address);
                entry.mark_resolved(address);
                self.variables.insert(entry.name.clone(), address);
                Ok(())
            }
            Err(ResolveError::Fault(e)) => Err(e),
            Err(miss) => {
                warn!("{}: {}, skipping until the target changes", entry.name, miss);
                entry.mark_unresolvable();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AttachedProcess, MockProcess};
    use crate::scan::{Anchor, ScanValue, ValueKind};

    fn engine_for(process: &MockProcess) -> ScanEngine {
        ScanEngine::new(process.modules().unwrap(), PointerWidth::Eight)
    }

    fn changed_values(events: &[EventMessage]) -> Vec<ScanValue> {
        events
            .iter()
            .filter_map(|event| match event {
                EventMessage::EntryChanged { scan_data, .. } => scan_data.result.clone(),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_read_emits_then_idle_ticks_are_silent() {
        let process = MockProcess::new(1).module("main.exe", 0x400000, 0x1000);
        process.write_i32(0x400010, 42);
        let mut engine = engine_for(&process);
        let mut entries = vec![
            ScanEntry::new("hp", Anchor::Module("main.exe".into()), ValueKind::Int).with_offset(0x10),
        ];

        let events = engine.tick(&process, &mut entries).unwrap();
        assert_eq!(changed_values(&events), vec![ScanValue::Int(42)]);

        for _ in 0..5 {
            assert!(engine.tick(&process, &mut entries).unwrap().is_empty());
        }
    }

    #[test]
    fn test_change_detection_five_five_seven() {
        let process = MockProcess::new(1).map(0x1000, 0x10);
        let mut engine = engine_for(&process);
        let mut entries = vec![ScanEntry::new("v", Anchor::Static(0x1000), ValueKind::Int)];

        process.write_i32(0x1000, 5);
        let first = engine.tick(&process, &mut entries).unwrap();
        process.write_i32(0x1000, 5);
        let second = engine.tick(&process, &mut entries).unwrap();
        process.write_i32(0x1000, 7);
        let third = engine.tick(&process, &mut entries).unwrap();

        assert_eq!(changed_values(&first), vec![ScanValue::Int(5)]);
        assert!(second.is_empty());
        assert_eq!(changed_values(&third), vec![ScanValue::Int(7)]);
    }

    #[test]
    fn test_missing_module_is_skipped_without_retry() {
        let process = MockProcess::new(1).module("main.exe", 0x400000, 0x1000);
        let mut engine = engine_for(&process);
        let mut entries = vec![
            ScanEntry::new("gone", Anchor::Module("other.dll".into()), ValueKind::Int),
        ];

        for _ in 0..10 {
            assert!(engine.tick(&process, &mut entries).unwrap().is_empty());
        }

        assert_eq!(entries[0].resolution, Resolution::Unresolvable);
        assert_eq!(entries[0].result, Some(ScanValue::Int(-1)));
        assert_eq!(process.reads(), 0);
    }

    #[test]
    fn test_unresolvable_variable_is_not_retried_after_it_appears() {
        let process = MockProcess::new(1).map(0x1000, 0x10);
        let mut engine = engine_for(&process);
        let mut entries = vec![
            ScanEntry::new("child", Anchor::Variable("parent".into()), ValueKind::Int),
            ScanEntry::new("parent", Anchor::Static(0x1000), ValueKind::Int),
        ];

        engine.tick(&process, &mut entries).unwrap();
        engine.tick(&process, &mut entries).unwrap();

        assert_eq!(entries[0].resolution, Resolution::Unresolvable);
        assert_eq!(engine.variables().get("parent"), Some(&0x1000));
    }

    #[test]
    fn test_entries_chain_through_variables_in_one_tick() {
        let process = MockProcess::new(1).map(0x1000, 0x20);
        process.write_i32(0x1000, 1);
        process.write_i32(0x1008, 2);
        let mut engine = engine_for(&process);
        let mut entries = vec![
            ScanEntry::new("player", Anchor::Static(0x1000), ValueKind::Int),
            ScanEntry::new("ammo", Anchor::Variable("player".into()), ValueKind::Int).with_offset(8),
        ];

        let events = engine.tick(&process, &mut entries).unwrap();

        assert_eq!(entries[1].address(), Some(0x1008));
        assert_eq!(changed_values(&events), vec![ScanValue::Int(1), ScanValue::Int(2)]);
    }

    #[test]
    fn test_read_fault_is_fatal() {
        let process = MockProcess::new(1);
        let mut engine = engine_for(&process);
        let mut entries = vec![ScanEntry::new("v", Anchor::Static(0x9000), ValueKind::Int)];

        let err = engine.tick(&process, &mut entries).unwrap_err();
        assert!(matches!(err, crate::Error::MemoryReadFailed { address: 0x9000, .. }));
    }

    #[test]
    fn test_string_and_bytes_entries() {
        let process = MockProcess::new(1).map(0x2000, 0x40);
        process.write(0x2000, b"Stage 1\0");
        process.write(0x2020, &[0x00, 0x10]);
        let mut engine = engine_for(&process);
        let mut entries = vec![
            ScanEntry::new("stage", Anchor::Static(0x2000), ValueKind::String).with_length(16),
            ScanEntry::new("flags", Anchor::Static(0x2020), ValueKind::Bytes).with_length(2),
        ];

        let events = engine.tick(&process, &mut entries).unwrap();
        assert_eq!(
            changed_values(&events),
            vec![
                ScanValue::Text("Stage 1".to_string()),
                ScanValue::Bytes(vec![0x00, 0x10])
            ]
        );

        process.write(0x2020, &[0x00, 0x11]);
        let events = engine.tick(&process, &mut entries).unwrap();
        assert_eq!(changed_values(&events), vec![ScanValue::Bytes(vec![0x00, 0x11])]);
    }

    #[test]
    fn test_event_carries_full_descriptor() {
        let process = MockProcess::new(1).module("main.exe", 0x400000, 0x1000);
        process.write_i32(0x400010, 9);
        let mut engine = engine_for(&process);
        let mut entries = vec![
            ScanEntry::new("hp", Anchor::Module("main.exe".into()), ValueKind::Int).with_offset(0x10),
        ];

        let events = engine.tick(&process, &mut entries).unwrap();
        let json = serde_json::to_value(&events[0]).unwrap();

        assert_eq!(json["event"], "entry_changed");
        assert_eq!(json["name"], "hp");
        assert_eq!(json["scan_data"]["address"], 0x400010);
        assert_eq!(json["scan_data"]["result"], 9);
        assert_eq!(json["scan_data"]["start_from"], "main.exe");
    }
}
