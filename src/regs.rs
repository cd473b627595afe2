//! Memory-mapped register access.
//!
//! This module gives word-addressed access to windows of physical address
//! space. A [`RegisterBus`] opens windows, and each window is a
//! [`RegisterPort`] that can read and write 32-bit little-endian registers
//! until it is closed.
//!
//! Two buses are provided: [`DevMem`], which maps physical memory through
//! `/dev/mem`, and [`MemoryBus`], which backs the windows with ordinary memory
//! and is used for dry runs and tests.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Source of register windows.
pub trait RegisterBus {
    /// Type of the windows opened by this bus.
    type Port: RegisterPort;

    /// Opens a window of `window_size` bytes starting at the physical address
    /// `physical_address`.
    fn open(&self, physical_address: usize, window_size: usize) -> Result<Self::Port>;
}

/// Window of 32-bit registers.
///
/// Registers are addressed by word offset, so the register at `word_offset`
/// occupies bytes `4 * word_offset` to `4 * word_offset + 3` of the window.
/// Accessing a register that does not fit in the window, or accessing a
/// closed window, is a programming error and panics.
pub trait RegisterPort {
    /// Size of the window in bytes.
    fn window_size(&self) -> usize;

    /// Reads the register at `word_offset`.
    fn read_word(&self, word_offset: usize) -> u32;

    /// Writes `value` to the register at `word_offset`.
    fn write_word(&mut self, word_offset: usize, value: u32);

    /// Releases the window.
    ///
    /// Closing an already closed window does nothing.
    fn close(&mut self) -> Result<()>;
}

impl<P: RegisterPort + ?Sized> RegisterPort for &mut P {
    fn window_size(&self) -> usize {
        (**self).window_size()
    }

    fn read_word(&self, word_offset: usize) -> u32 {
        (**self).read_word(word_offset)
    }

    fn write_word(&mut self, word_offset: usize, value: u32) {
        (**self).write_word(word_offset, value)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

fn check_bounds(word_offset: usize, window_size: usize) {
    assert!(
        word_offset
            .checked_mul(4)
            .and_then(|b| b.checked_add(4))
            .is_some_and(|end| end <= window_size),
        "register word offset {word_offset} out of bounds for window of {window_size} bytes"
    );
}

/// Physical memory bus.
///
/// This bus maps physical memory through the `/dev/mem` character device (or
/// another device or file with the same semantics). Opening it usually
/// requires root privileges.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct DevMem {
    path: PathBuf,
}

/// Window of physical memory mapped through [`DevMem`].
///
/// Dropping this struct closes the window.
#[derive(Debug)]
pub struct DevMemPort {
    physical_address: usize,
    window_size: usize,
    mapping: Option<Mapping>,
    file: Option<File>,
}

#[derive(Debug)]
struct Mapping {
    base: *mut libc::c_void,
    effective: *mut libc::c_void,
    map_size: usize,
}

// The port has exclusive ownership of its mapping.
unsafe impl Send for DevMemPort {}

impl DevMem {
    /// Default path of the physical memory device.
    pub const DEFAULT_PATH: &'static str = "/dev/mem";

    /// Creates a bus that uses `/dev/mem`.
    pub fn new() -> DevMem {
        DevMem::with_path(Self::DEFAULT_PATH)
    }

    /// Creates a bus that uses the device or file at `path`.
    ///
    /// Physical addresses are used as offsets into this file.
    pub fn with_path<P: AsRef<Path>>(path: P) -> DevMem {
        DevMem {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the path of the physical memory device.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for DevMem {
    fn default() -> DevMem {
        DevMem::new()
    }
}

impl RegisterBus for DevMem {
    type Port = DevMemPort;

    #[tracing::instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    fn open(&self, physical_address: usize, window_size: usize) -> Result<DevMemPort> {
        if physical_address % 4 != 0 {
            anyhow::bail!("physical address {physical_address:#010x} is not word aligned");
        }
        // O_SYNC makes the mapping uncached, so that register writes reach
        // the hardware immediately
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let page_offset = physical_address % page_size::get();
        let map_address = physical_address - page_offset;
        let map_size = window_size + page_offset;
        let offset = libc::off_t::try_from(map_address).with_context(|| {
            format!("physical address {physical_address:#010x} is out of range")
        })?;
        let base = unsafe {
            match libc::mmap(
                std::ptr::null_mut::<libc::c_void>(),
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                offset,
            ) {
                libc::MAP_FAILED => {
                    return Err(std::io::Error::last_os_error()).with_context(|| {
                        format!(
                            "failed to map {window_size} bytes at physical address \
                             {physical_address:#010x}"
                        )
                    })
                }
                x => x,
            }
        };
        let effective = unsafe { base.add(page_offset) };
        tracing::debug!(
            "mapped {} bytes at physical address {:#010x}",
            window_size,
            physical_address
        );
        Ok(DevMemPort {
            physical_address,
            window_size,
            mapping: Some(Mapping {
                base,
                effective,
                map_size,
            }),
            file: Some(file),
        })
    }
}

impl DevMemPort {
    /// Returns the physical address at which the window starts.
    pub fn physical_address(&self) -> usize {
        self.physical_address
    }

    fn register(&self, word_offset: usize) -> *mut u32 {
        let Some(mapping) = &self.mapping else {
            panic!(
                "register window at {:#010x} used after close",
                self.physical_address
            );
        };
        check_bounds(word_offset, self.window_size);
        unsafe { mapping.effective.cast::<u32>().add(word_offset) }
    }
}

impl RegisterPort for DevMemPort {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn read_word(&self, word_offset: usize) -> u32 {
        u32::from_le(unsafe { self.register(word_offset).read_volatile() })
    }

    fn write_word(&mut self, word_offset: usize, value: u32) {
        unsafe { self.register(word_offset).write_volatile(value.to_le()) }
    }

    fn close(&mut self) -> Result<()> {
        let unmapped = match self.mapping.take() {
            Some(mapping) => mapping.unmap(),
            None => Ok(()),
        };
        // the file is closed even if munmap fails
        drop(self.file.take());
        unmapped.with_context(|| {
            format!(
                "failed to unmap physical address {:#010x}",
                self.physical_address
            )
        })
    }
}

impl Mapping {
    fn unmap(self) -> std::io::Result<()> {
        if unsafe { libc::munmap(self.base, self.map_size) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }
}

/// Unmaps the window and closes the device.
impl Drop for DevMemPort {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!("{err:#}");
        }
    }
}

/// Memory-backed bus.
///
/// Each physical address opened in this bus is backed by a zero-initialized
/// block of memory that lives as long as the bus, so values written through
/// one port can be read by ports opened later at the same address. The bus is
/// cheaply clonable and clones share the same memory.
///
/// Opening an address can be made to fail with [`MemoryBus::fail_open`], and
/// the bus keeps track of how many ports are currently open.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus(Arc<Mutex<MemoryBusState>>);

#[derive(Debug, Default)]
struct MemoryBusState {
    blocks: HashMap<usize, Arc<Mutex<Vec<u8>>>>,
    failures: HashMap<usize, String>,
    open_ports: usize,
}

/// Window opened on a [`MemoryBus`].
#[derive(Debug)]
pub struct MemoryPort {
    physical_address: usize,
    window_size: usize,
    memory: Option<Arc<Mutex<Vec<u8>>>>,
    bus: MemoryBus,
}

impl MemoryBus {
    /// Creates a new memory bus.
    pub fn new() -> MemoryBus {
        MemoryBus::default()
    }

    /// Makes opening `physical_address` fail with the error `message`.
    pub fn fail_open(&self, physical_address: usize, message: &str) {
        self.0
            .lock()
            .unwrap()
            .failures
            .insert(physical_address, message.to_string());
    }

    /// Returns the number of ports that are currently open.
    pub fn open_ports(&self) -> usize {
        self.0.lock().unwrap().open_ports
    }

    /// Reads a register directly from the memory behind the bus.
    ///
    /// Returns `None` if the address has never been opened or the register is
    /// beyond the memory allocated for it.
    pub fn peek(&self, physical_address: usize, word_offset: usize) -> Option<u32> {
        let block = self.0.lock().unwrap().blocks.get(&physical_address)?.clone();
        let memory = block.lock().unwrap();
        let start = word_offset.checked_mul(4)?;
        let bytes = memory.get(start..start.checked_add(4)?)?;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    /// Writes a register directly in the memory behind the bus.
    ///
    /// The memory for `physical_address` is allocated or grown as needed.
    pub fn poke(&self, physical_address: usize, word_offset: usize, value: u32) {
        let block = self.block(physical_address, 4 * word_offset + 4);
        let mut memory = block.lock().unwrap();
        memory[4 * word_offset..4 * word_offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn block(&self, physical_address: usize, size: usize) -> Arc<Mutex<Vec<u8>>> {
        let block = self
            .0
            .lock()
            .unwrap()
            .blocks
            .entry(physical_address)
            .or_default()
            .clone();
        {
            let mut memory = block.lock().unwrap();
            if memory.len() < size {
                memory.resize(size, 0);
            }
        }
        block
    }
}

impl RegisterBus for MemoryBus {
    type Port = MemoryPort;

    fn open(&self, physical_address: usize, window_size: usize) -> Result<MemoryPort> {
        if let Some(message) = self.0.lock().unwrap().failures.get(&physical_address) {
            anyhow::bail!("{message}");
        }
        let memory = self.block(physical_address, window_size);
        self.0.lock().unwrap().open_ports += 1;
        Ok(MemoryPort {
            physical_address,
            window_size,
            memory: Some(memory),
            bus: self.clone(),
        })
    }
}

impl MemoryPort {
    fn memory(&self) -> &Mutex<Vec<u8>> {
        match &self.memory {
            Some(memory) => memory,
            None => panic!(
                "register window at {:#010x} used after close",
                self.physical_address
            ),
        }
    }
}

impl RegisterPort for MemoryPort {
    fn window_size(&self) -> usize {
        self.window_size
    }

    fn read_word(&self, word_offset: usize) -> u32 {
        let memory = self.memory();
        check_bounds(word_offset, self.window_size);
        let memory = memory.lock().unwrap();
        let start = 4 * word_offset;
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&memory[start..start + 4]);
        u32::from_le_bytes(bytes)
    }

    fn write_word(&mut self, word_offset: usize, value: u32) {
        let memory = self.memory();
        check_bounds(word_offset, self.window_size);
        let start = 4 * word_offset;
        memory.lock().unwrap()[start..start + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn close(&mut self) -> Result<()> {
        if self.memory.take().is_some() {
            self.bus.0.lock().unwrap().open_ports -= 1;
        }
        Ok(())
    }
}

impl Drop for MemoryPort {
    fn drop(&mut self) {
        // closing a MemoryPort never fails
        let _ = self.close();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const BASE: usize = 0x43C0_0000;
    const SIZE: usize = 4096;

    #[test]
    fn write_read() {
        let bus = MemoryBus::new();
        let mut port = bus.open(BASE, SIZE).unwrap();
        port.write_word(0, 10737418);
        port.write_word(1, -5368709i32 as u32);
        port.write_word(1023, 0xdeadbeef);
        assert_eq!(port.read_word(0), 10737418);
        assert_eq!(port.read_word(1), 0xFFAE147B);
        assert_eq!(port.read_word(1023), 0xdeadbeef);
        assert_eq!(port.read_word(2), 0);
    }

    #[test]
    fn little_endian_layout() {
        let bus = MemoryBus::new();
        let mut port = bus.open(BASE, SIZE).unwrap();
        port.write_word(1, 0x1234_5678);
        let memory = port.memory.as_ref().unwrap().lock().unwrap();
        assert_eq!(&memory[4..8], &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn close_twice() {
        let bus = MemoryBus::new();
        let mut port = bus.open(BASE, SIZE).unwrap();
        port.write_word(0, 42);
        let value = port.read_word(0);
        assert_eq!(bus.open_ports(), 1);
        port.close().unwrap();
        port.close().unwrap();
        assert_eq!(bus.open_ports(), 0);
        drop(port);
        assert_eq!(bus.open_ports(), 0);
        assert_eq!(value, 42);
    }

    #[test]
    fn persists_across_ports() {
        let bus = MemoryBus::new();
        {
            let mut port = bus.open(BASE, SIZE).unwrap();
            port.write_word(3, 7);
        }
        assert_eq!(bus.open_ports(), 0);
        assert_eq!(bus.peek(BASE, 3), Some(7));
        bus.poke(BASE, 2, 9);
        let port = bus.open(BASE, SIZE).unwrap();
        assert_eq!(port.read_word(2), 9);
    }

    #[test]
    fn simulated_failure() {
        let bus = MemoryBus::new();
        bus.fail_open(BASE, "Permission denied");
        let err = bus.open(BASE, SIZE).unwrap_err();
        assert_eq!(format!("{err:#}"), "Permission denied");
        assert_eq!(bus.open_ports(), 0);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds() {
        let bus = MemoryBus::new();
        let port = bus.open(BASE, SIZE).unwrap();
        port.read_word(1024);
    }

    #[test]
    #[should_panic(expected = "used after close")]
    fn use_after_close() {
        let bus = MemoryBus::new();
        let mut port = bus.open(BASE, SIZE).unwrap();
        port.close().unwrap();
        port.write_word(0, 1);
    }

    fn sparse_file(name: &str, len: u64) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "radio-tuner-{}-{}",
            name,
            std::process::id()
        ));
        let file = File::create(&path).unwrap();
        file.set_len(len).unwrap();
        path
    }

    #[test]
    fn devmem_over_file() {
        use std::io::{Read, Seek, SeekFrom};

        let path = sparse_file("devmem", (BASE + SIZE) as u64);
        let bus = DevMem::with_path(&path);
        let mut port = bus.open(BASE, SIZE).unwrap();
        port.write_word(0, 10737418);
        port.write_word(1, 0xFFAE147B);
        assert_eq!(port.read_word(0), 10737418);
        assert_eq!(port.read_word(1), 0xFFAE147B);
        port.close().unwrap();
        port.close().unwrap();

        let mut file = File::open(&path).unwrap();
        file.seek(SeekFrom::Start(BASE as u64)).unwrap();
        let mut bytes = [0; 8];
        file.read_exact(&mut bytes).unwrap();
        assert_eq!(bytes, [0x0A, 0xD7, 0xA3, 0x00, 0x7B, 0x14, 0xAE, 0xFF]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn devmem_unaligned_page() {
        let path = sparse_file("unaligned", (BASE + 2 * SIZE) as u64);
        let bus = DevMem::with_path(&path);
        let mut port = bus.open(BASE + 0x20, 64).unwrap();
        port.write_word(0, 0x0102_0304);
        drop(port);
        let port = bus.open(BASE, SIZE).unwrap();
        assert_eq!(port.read_word(8), 0x0102_0304);
        drop(port);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn devmem_open_failure() {
        let bus = DevMem::with_path("/nonexistent/radio-tuner/mem");
        let err = bus.open(BASE, SIZE).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.starts_with("failed to open /nonexistent/radio-tuner/mem: "));
        assert!(message.contains("No such file or directory"));
    }
}
