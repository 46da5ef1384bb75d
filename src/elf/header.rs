//! The ELF32 file header (`Elf32_Ehdr`).

use super::raw::{check_magic_and_class, u16_at, u32_at};
use super::Error;
use std::path::Path;

/// Decoded fields of `Elf32_Ehdr`. Field names follow the ELF spec's `e_*`
/// naming, dropping the prefix (`e_entry` -> `entry`) as is conventional for
/// a Rust decoder (see e.g. the `goblin`-style crates in the wider
/// ecosystem).
#[derive(Debug, Clone)]
pub struct ElfHeader {
    /// `e_ident[EI_CLASS]`. Always `1` (`ELFCLASS32`); [`super::File::load`]
    /// rejects anything else before this struct is ever returned.
    pub class: u8,
    /// `e_ident[EI_DATA]`.
    pub data: u8,
    /// `e_ident[EI_VERSION]`.
    pub version: u8,
    /// `e_type`.
    pub object_type: u16,
    /// `e_machine`.
    pub machine: u16,
    /// `e_entry`.
    pub entry: u32,
    /// `e_phoff`.
    pub phoff: u32,
    /// `e_phentsize`.
    pub phentsize: u16,
    /// `e_phnum`.
    pub phnum: u16,
    /// `e_shoff`.
    pub shoff: u32,
    /// `e_shentsize`.
    pub shentsize: u16,
    /// `e_shnum`.
    pub shnum: u16,
    /// `e_shstrndx`.
    pub shstrndx: u16,
}

impl ElfHeader {
    pub(crate) fn parse(buf: &[u8], path: &Path) -> Result<Self, Error> {
        check_magic_and_class(buf, path)?;

        Ok(ElfHeader {
            class: buf[4],
            data: buf[5],
            version: buf[6],
            object_type: u16_at(buf, path, 16)?,
            machine: u16_at(buf, path, 18)?,
            entry: u32_at(buf, path, 24)?,
            phoff: u32_at(buf, path, 28)?,
            shoff: u32_at(buf, path, 32)?,
            phentsize: u16_at(buf, path, 42)?,
            phnum: u16_at(buf, path, 44)?,
            shentsize: u16_at(buf, path, 46)?,
            shnum: u16_at(buf, path, 48)?,
            shstrndx: u16_at(buf, path, 50)?,
        })
    }
}
