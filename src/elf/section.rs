//! ELF32 section headers and their on-disk contents.
//!
//! A [`Section`] stores only the decoded header fields and its byte *range*
//! within the owning [`super::File`]'s buffer, not a borrowed slice. This
//! sidesteps the self-referential struct that a direct `&'f [u8]` field
//! would create: the File hands out indices into its own arena of children
//! rather than handing out borrows tied to its own lifetime. Use
//! [`super::File::section_bytes`] to get the actual bytes.

use super::raw::{u32_at, SHDR_SIZE};
use super::Error;
use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::path::Path;

/// Recognized `sh_type` values from the ELF gABI. Anything else round-trips
/// as `ty: None`, since the ELF gABI reserves OS/processor-specific ranges
/// and this core never needs to reject them, only branch on
/// `Strtab`/`Nobits`/`Symtab`/`Dynsym`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum SectionType {
    /// `SHT_NULL`: inactive section header.
    Null = 0,
    /// `SHT_PROGBITS`: program-defined contents.
    Progbits = 1,
    /// `SHT_SYMTAB`: full symbol table.
    Symtab = 2,
    /// `SHT_STRTAB`: string table.
    Strtab = 3,
    /// `SHT_NOBITS`: occupies no file space; contents are zero-filled.
    Nobits = 8,
    /// `SHT_DYNSYM`: minimal dynamic-linking symbol table.
    Dynsym = 11,
}

bitflags! {
    /// `sh_flags` bits this core distinguishes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u32 {
        /// `SHF_WRITE`: section is writable at runtime.
        const WRITE = 1;
        /// `SHF_ALLOC`: section occupies memory during execution.
        const ALLOC = 2;
        /// `SHF_EXECINSTR`: section contains executable instructions.
        const EXECINSTR = 4;
    }
}

/// A decoded section header. `offset`/`size` describe its byte range in the
/// file buffer (empty range for `SHT_NOBITS`).
#[derive(Debug)]
pub struct Section {
    pub(crate) raw_type: u32,
    pub ty: Option<SectionType>,
    pub flags: SectionFlags,
    pub addr: u32,
    pub offset: u32,
    pub size: u32,
    pub link: u32,
    pub entsize: u32,
    pub(crate) name_offset: u32,
    pub name: String,
}

impl Section {
    pub(crate) fn parse(buf: &[u8], path: &Path, pos: usize) -> Result<Self, Error> {
        if pos + SHDR_SIZE > buf.len() {
            return Err(Error::MalformedSectionTable { path: path.to_path_buf() });
        }
        let name_offset = u32_at(buf, path, pos)?;
        let raw_type = u32_at(buf, path, pos + 4)?;
        let flags = SectionFlags::from_bits_truncate(u32_at(buf, path, pos + 8)?);
        let addr = u32_at(buf, path, pos + 12)?;
        let offset = u32_at(buf, path, pos + 16)?;
        let size = u32_at(buf, path, pos + 20)?;
        let link = u32_at(buf, path, pos + 24)?;
        let entsize = u32_at(buf, path, pos + 36)?;
        let ty = <SectionType as FromPrimitive>::from_u32(raw_type);

        // SHT_NOBITS sections occupy no file space; everything else must
        // lie fully within the buffer.
        if ty != Some(SectionType::Nobits) {
            let end = (offset as u64) + (size as u64);
            if end > buf.len() as u64 {
                return Err(Error::MalformedSectionTable { path: path.to_path_buf() });
            }
        }

        Ok(Section {
            raw_type,
            ty,
            flags,
            addr,
            offset,
            size,
            link,
            entsize,
            name_offset,
            name: String::new(),
        })
    }

    /// `true` for `SHT_NOBITS` sections: they occupy no file space.
    pub fn is_nobits(&self) -> bool {
        self.ty == Some(SectionType::Nobits)
    }

    /// `true` for sections whose raw `sh_type` isn't one of the recognized
    /// `SectionType` values.
    pub fn has_unrecognized_type(&self) -> bool {
        self.ty.is_none()
    }
}
