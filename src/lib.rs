//! Guest-process bootstrap core for a 32-bit x86 user-mode emulator.
//!
//! Two tightly coupled pieces live here:
//!
//! - [`elf`]: a read-only ELF32 little-endian decoder (header, sections,
//!   program headers, symbols).
//! - [`loader`]: the context loader that uses the decoder to build a guest
//!   process's initial virtual address space (mapped segments, an optional
//!   interpreter, the System V i386 initial stack) and initial register
//!   state.
//!
//! Everything downstream of these two (the instruction emulator, the
//! debugger, the CLI) is out of scope; [`loader`] defines the trait
//! surfaces (`Memory`, `RegisterFile`, `FileTable`) those collaborators
//! implement, but owns none of their behavior.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod elf;
pub mod loader;
