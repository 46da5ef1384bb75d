//! Bounds-checked little-endian field access into an owned ELF32 byte buffer.
//!
//! The original `ELFReader.cc` reads fields by casting a raw `char *` into the
//! relevant `Elf32_*` struct pointer, which works in C++ but relies on the
//! file buffer being large enough and aligned correctly. Here every field
//! access is checked against the buffer length explicitly so a truncated or
//! adversarial file produces a [`crate::elf::Error`] instead of an
//! out-of-bounds read.

use crate::elf::Error;
use std::path::Path;

/// Size in bytes of an `Elf32_Ehdr`.
pub const EHDR_SIZE: usize = 52;
/// Size in bytes of an `Elf32_Shdr`.
pub const SHDR_SIZE: usize = 40;
/// Size in bytes of an `Elf32_Phdr`.
pub const PHDR_SIZE: usize = 32;
/// Size in bytes of an `Elf32_Sym`.
pub const SYM_SIZE: usize = 16;

/// ELF magic bytes, `\x7fELF`.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// Byte offset of `EI_CLASS` within `e_ident`.
const EI_CLASS: usize = 4;
/// Value of `EI_CLASS` for 64-bit objects.
const ELFCLASS64: u8 = 2;

pub(crate) fn u16_at(buf: &[u8], path: &Path, off: usize) -> Result<u16, Error> {
    let bytes = buf
        .get(off..off + 2)
        .ok_or_else(|| Error::InvalidElf { path: path.to_path_buf() })?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn u32_at(buf: &[u8], path: &Path, off: usize) -> Result<u32, Error> {
    let bytes = buf
        .get(off..off + 4)
        .ok_or_else(|| Error::InvalidElf { path: path.to_path_buf() })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Validate the ELF magic and reject 64-bit objects. Does not parse the rest
/// of the header; callers follow up with [`crate::elf::header::ElfHeader::parse`].
pub(crate) fn check_magic_and_class(buf: &[u8], path: &Path) -> Result<(), Error> {
    if buf.len() < EHDR_SIZE {
        return Err(Error::InvalidElf { path: path.to_path_buf() });
    }
    if buf[..4] != ELF_MAGIC {
        return Err(Error::InvalidElf { path: path.to_path_buf() });
    }
    if buf[EI_CLASS] == ELFCLASS64 {
        return Err(Error::Unsupported64Bit { path: path.to_path_buf() });
    }
    Ok(())
}
