use crate::error::Result;
use crate::memory::ReadMemory;

/// A module loaded in the target process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

impl ModuleInfo {
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }
}

/// An open handle to the target process
pub trait AttachedProcess: ReadMemory {
    fn pid(&self) -> u32;

    /// Enumerate the modules currently loaded in the process
    fn modules(&self) -> Result<Vec<ModuleInfo>>;
}

/// Finds and opens processes by executable name
pub trait ProcessProvider {
    type Process: AttachedProcess + Send;

    /// Open the first process whose executable name matches `name`
    /// (case-insensitive). Fails with `Error::ProcessNotFound` when absent.
    fn open(&self, name: &str) -> Result<Self::Process>;
}

/// Process access backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

#[cfg(target_os = "windows")]
pub use self::windows_impl::ProcessHandle;

#[cfg(not(target_os = "windows"))]
pub use self::unsupported::ProcessHandle;

#[cfg(target_os = "windows")]
mod windows_impl {
    use std::ffi::c_void;
    use std::mem::size_of;

    use tracing::debug;
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Diagnostics::Debug::ReadProcessMemory;
    use windows::Win32::System::Diagnostics::ToolHelp::{
        CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
        Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32,
        TH32CS_SNAPPROCESS,
    };
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_GUARD, PAGE_NOACCESS, VirtualQueryEx,
    };
    use windows::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ,
    };

    use super::{AttachedProcess, ModuleInfo, ProcessProvider, SystemProcesses};
    use crate::error::{Error, Result};
    use crate::memory::{MemoryRegion, ReadMemory};

    /// Closes a raw handle on drop
    struct OwnedHandle(HANDLE);

    impl Drop for OwnedHandle {
        fn drop(&mut self) {
            // SAFETY: the handle was returned by a successful Win32 call and is closed once.
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }

    pub struct ProcessHandle {
        pub pid: u32,
        handle: OwnedHandle,
    }

    // SAFETY: process handles are kernel object references valid from any thread.
    unsafe impl Send for ProcessHandle {}

    impl ProcessHandle {
        pub fn open(pid: u32) -> Result<Self> {
            // SAFETY: OpenProcess has no pointer arguments; failure is reported via Result.
            let handle =
                unsafe { OpenProcess(PROCESS_VM_READ | PROCESS_QUERY_INFORMATION, false, pid) }
                    .map_err(|e| Error::ProcessOpenFailed(format!("pid {}: {}", pid, e)))?;

            Ok(Self {
                pid,
                handle: OwnedHandle(handle),
            })
        }
    }

    fn wide_to_string(wide: &[u16]) -> String {
        let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..len])
    }

    fn find_pid(name: &str) -> Result<u32> {
        // SAFETY: snapshot creation takes no pointers; the handle is owned below.
        let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
            .map_err(|e| Error::ProcessOpenFailed(format!("process snapshot: {}", e)))?;
        let snapshot = OwnedHandle(snapshot);

        let mut entry = PROCESSENTRY32W {
            dwSize: size_of::<PROCESSENTRY32W>() as u32,
            ..Default::default()
        };

        // SAFETY: `entry` is a properly sized PROCESSENTRY32W with dwSize set.
        let mut more = unsafe { Process32FirstW(snapshot.0, &mut entry) }.is_ok();
        while more {
            if wide_to_string(&entry.szExeFile).eq_ignore_ascii_case(name) {
                return Ok(entry.th32ProcessID);
            }
            // SAFETY: same entry buffer as above.
            more = unsafe { Process32NextW(snapshot.0, &mut entry) }.is_ok();
        }

        Err(Error::ProcessNotFound(name.to_string()))
    }

    impl ProcessProvider for SystemProcesses {
        type Process = ProcessHandle;

        fn open(&self, name: &str) -> Result<ProcessHandle> {
            let pid = find_pid(name)?;
            debug!("{} resolved to pid {}", name, pid);
            ProcessHandle::open(pid)
        }
    }

    impl ReadMemory for ProcessHandle {
        fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; size];
            let mut read = 0usize;

            // SAFETY: the buffer holds `size` writable bytes and outlives the call.
            unsafe {
                ReadProcessMemory(
                    self.handle.0,
                    address as *const c_void,
                    buffer.as_mut_ptr().cast(),
                    size,
                    Some(&mut read as *mut usize),
                )
            }
            .map_err(|e| Error::MemoryReadFailed {
                address,
                message: e.to_string(),
            })?;

            if read != size {
                return Err(Error::MemoryReadFailed {
                    address,
                    message: format!("short read: {} of {} bytes", read, size),
                });
            }

            Ok(buffer)
        }

        fn query_region(&self, address: u64) -> Result<Option<MemoryRegion>> {
            let mut info = MEMORY_BASIC_INFORMATION::default();

            // SAFETY: `info` is a valid MEMORY_BASIC_INFORMATION and its size is passed.
            let written = unsafe {
                VirtualQueryEx(
                    self.handle.0,
                    Some(address as *const c_void),
                    &mut info,
                    size_of::<MEMORY_BASIC_INFORMATION>(),
                )
            };
            if written == 0 {
                return Ok(None);
            }

            let readable = info.State == MEM_COMMIT
                && info.Protect.0 & (PAGE_NOACCESS.0 | PAGE_GUARD.0) == 0;

            Ok(Some(MemoryRegion {
                base: info.BaseAddress as u64,
                size: info.RegionSize as u64,
                readable,
            }))
        }
    }

    impl AttachedProcess for ProcessHandle {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn modules(&self) -> Result<Vec<ModuleInfo>> {
            // SAFETY: snapshot creation takes no pointers; the handle is owned below.
            let snapshot = unsafe {
                CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, self.pid)
            }
            .map_err(|e| Error::ProcessOpenFailed(format!("module snapshot: {}", e)))?;
            let snapshot = OwnedHandle(snapshot);

            let mut entry = MODULEENTRY32W {
                dwSize: size_of::<MODULEENTRY32W>() as u32,
                ..Default::default()
            };
            let mut modules = Vec::new();

            // SAFETY: `entry` is a properly sized MODULEENTRY32W with dwSize set.
            let mut more = unsafe { Module32FirstW(snapshot.0, &mut entry) }.is_ok();
            while more {
                modules.push(ModuleInfo {
                    name: wide_to_string(&entry.szModule),
                    base: entry.modBaseAddr as u64,
                    size: entry.modBaseSize as u64,
                });
                // SAFETY: same entry buffer as above.
                more = unsafe { Module32NextW(snapshot.0, &mut entry) }.is_ok();
            }

            Ok(modules)
        }
    }
}

#[cfg(not(target_os = "windows"))]
mod unsupported {
    use super::{AttachedProcess, ModuleInfo, ProcessProvider, SystemProcesses};
    use crate::error::{Error, Result};
    use crate::memory::{MemoryRegion, ReadMemory};

    const REASON: &str = "process memory access requires Windows";

    pub struct ProcessHandle {
        pub pid: u32,
    }

    impl ProcessProvider for SystemProcesses {
        type Process = ProcessHandle;

        fn open(&self, _name: &str) -> Result<ProcessHandle> {
            Err(Error::Unsupported(REASON))
        }
    }

    impl ReadMemory for ProcessHandle {
        fn read_bytes(&self, _address: u64, _size: usize) -> Result<Vec<u8>> {
            Err(Error::Unsupported(REASON))
        }

        fn query_region(&self, _address: u64) -> Result<Option<MemoryRegion>> {
            Err(Error::Unsupported(REASON))
        }
    }

    impl AttachedProcess for ProcessHandle {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn modules(&self) -> Result<Vec<ModuleInfo>> {
            Err(Error::Unsupported(REASON))
        }
    }
}
