//! ELF32 program (segment) headers.
//!
//! Like [`super::section::Section`], a [`ProgramHeader`] stores its byte
//! range rather than a borrowed slice; use [`super::File::program_header_bytes`].

use super::raw::{u32_at, PHDR_SIZE};
use super::Error;
use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::path::Path;

/// Recognized `p_type` values from the ELF gABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum ProgramHeaderType {
    /// `PT_NULL`
    Null = 0,
    /// `PT_LOAD`: a loadable segment.
    Load = 1,
    /// `PT_DYNAMIC`: dynamic linking information.
    Dynamic = 2,
    /// `PT_INTERP`: path to the program interpreter.
    Interp = 3,
    /// `PT_NOTE`
    Note = 4,
    /// `PT_SHLIB`: reserved, unspecified semantics.
    Shlib = 5,
    /// `PT_PHDR`: location of the program header table itself.
    Phdr = 6,
    /// `PT_TLS`: thread-local storage template.
    Tls = 7,
}

bitflags! {
    /// `p_flags` bits from the ELF gABI.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProgramHeaderFlags: u32 {
        /// `PF_X`: executable.
        const X = 1;
        /// `PF_W`: writable.
        const W = 2;
        /// `PF_R`: readable.
        const R = 4;
    }
}

/// A decoded program header. `offset`/`filesz` describe its byte range in
/// the file buffer.
#[derive(Debug)]
pub struct ProgramHeader {
    pub(crate) raw_type: u32,
    pub ty: Option<ProgramHeaderType>,
    pub offset: u32,
    pub vaddr: u32,
    pub paddr: u32,
    pub filesz: u32,
    pub memsz: u32,
    pub flags: ProgramHeaderFlags,
    pub align: u32,
}

impl ProgramHeader {
    pub(crate) fn parse(buf: &[u8], path: &Path, pos: usize) -> Result<Self, Error> {
        if pos + PHDR_SIZE > buf.len() {
            return Err(Error::MalformedProgramHeaderTable { path: path.to_path_buf() });
        }
        let raw_type = u32_at(buf, path, pos)?;
        let offset = u32_at(buf, path, pos + 4)?;
        let vaddr = u32_at(buf, path, pos + 8)?;
        let paddr = u32_at(buf, path, pos + 12)?;
        let filesz = u32_at(buf, path, pos + 16)?;
        let memsz = u32_at(buf, path, pos + 20)?;
        let flags = ProgramHeaderFlags::from_bits_truncate(u32_at(buf, path, pos + 24)?);
        let align = u32_at(buf, path, pos + 28)?;

        let end = (offset as u64) + (filesz as u64);
        if end > buf.len() as u64 {
            return Err(Error::MalformedProgramHeaderTable { path: path.to_path_buf() });
        }

        Ok(ProgramHeader {
            raw_type,
            ty: <ProgramHeaderType as FromPrimitive>::from_u32(raw_type),
            offset,
            vaddr,
            paddr,
            filesz,
            memsz,
            flags,
            align,
        })
    }

    /// `true` for `PT_LOAD` segments.
    pub fn is_load(&self) -> bool {
        self.ty == Some(ProgramHeaderType::Load)
    }

    /// `true` for the `PT_INTERP` segment, if present.
    pub fn is_interp(&self) -> bool {
        self.ty == Some(ProgramHeaderType::Interp)
    }

    /// `true` for the `PT_PHDR` segment, if present.
    pub fn is_phdr(&self) -> bool {
        self.ty == Some(ProgramHeaderType::Phdr)
    }
}
