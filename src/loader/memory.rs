//! The guest address-space abstraction this core drives but does not own.
//!
//! A real implementation backs these calls with the emulator's page tables;
//! this crate only ever calls `map`/`init`/`write`/`read_string`/
//! `grow_heap_break`/`set_heap_break` in the fixed sequence the loader's
//! bootstrap steps require.

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Per-page access permissions. `Init` governs whether
    /// [`Memory::init`] may write to a page; `Write` governs
    /// [`Memory::write`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perm: u8 {
        /// Page may receive load-time initialization bytes.
        const INIT = 0b0001;
        /// Page may be read by the guest.
        const READ = 0b0010;
        /// Page may be written by the guest at runtime.
        const WRITE = 0b0100;
        /// Page may be executed by the guest.
        const EXEC = 0b1000;
    }
}

/// A failure performing a guest memory operation, e.g. writing to a page
/// without the required permission, or mapping over an already-mapped,
/// incompatible region.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("guest memory error: {0}")]
pub struct MemoryError(pub String);

/// The guest virtual address space.
///
/// Implementations are expected to be idempotent under [`Memory::map`] for
/// overlapping regions, raising permissions cumulatively rather than
/// rejecting a second `map` call over the same range. The loader relies on
/// this when, for example, a `PT_LOAD` segment and the program-header-table
/// placement fall in the same page.
pub trait Memory {
    /// Guest page size in bytes.
    fn page_size(&self) -> u32;

    /// Map `[addr, addr+size)` with at least `perm`. Idempotent: mapping an
    /// already-mapped overlapping region raises its permissions to the
    /// union of the old and new sets rather than erroring.
    fn map(&mut self, addr: u32, size: u32, perm: Perm) -> Result<(), MemoryError>;

    /// Write `bytes` into `[addr, addr+bytes.len())` as load-time
    /// initialization data. Requires [`Perm::INIT`] on the whole range.
    fn init(&mut self, addr: u32, bytes: &[u8]) -> Result<(), MemoryError>;

    /// Write `bytes` into `[addr, addr+bytes.len())` as a runtime write.
    /// Requires [`Perm::WRITE`] on the whole range.
    fn write(&mut self, addr: u32, bytes: &[u8]) -> Result<(), MemoryError>;

    /// Read a NUL-terminated string starting at `addr`.
    fn read_string(&self, addr: u32) -> Result<String, MemoryError>;

    /// Unconditionally set the heap break to `addr`.
    fn set_heap_break(&mut self, addr: u32);

    /// Raise the heap break to `addr` if it is currently lower; a no-op
    /// otherwise.
    fn grow_heap_break(&mut self, addr: u32);
}
