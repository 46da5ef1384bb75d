//! ELF32 symbol table entries.
//!
//! Symbols are read from every `SHT_SYMTAB`/`SHT_DYNSYM` section and sorted
//! once, after decode, by value then bind then name. All later lookups
//! (`File::symbol_at`) are binary searches over that sorted order.

use super::raw::{u16_at, u32_at, SYM_SIZE};
use super::Error;
use std::cmp::Ordering;
use std::path::Path;

/// A resolved symbol table entry.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub value: u32,
    pub size: u32,
    pub info: u8,
    pub other: u8,
    pub shndx: u16,
}

impl Symbol {
    /// `ST_BIND`: the high nibble of `st_info` (bits 4-7).
    pub fn bind(&self) -> u8 {
        self.info >> 4
    }

    /// `ST_TYPE`: the low nibble of `st_info` (bits 0-3).
    pub fn sym_type(&self) -> u8 {
        self.info & 0xf
    }

    pub(crate) fn parse(
        symtab: &[u8],
        strtab_bytes: &[u8],
        path: &Path,
        pos: usize,
    ) -> Result<Self, Error> {
        if pos + SYM_SIZE > symtab.len() {
            return Err(Error::MalformedSymbolTable { path: path.to_path_buf() });
        }
        let name_off = u32_at(symtab, path, pos)?;
        let value = u32_at(symtab, path, pos + 4)?;
        let size = u32_at(symtab, path, pos + 8)?;
        let info = symtab[pos + 12];
        let other = symtab[pos + 13];
        let shndx = u16_at(symtab, path, pos + 14)?;

        if name_off as usize >= strtab_bytes.len() {
            return Err(Error::MalformedSymbolTable { path: path.to_path_buf() });
        }
        let name = read_cstr(strtab_bytes, name_off as usize);

        Ok(Symbol { name, value, size, info, other, shndx })
    }

    /// The total order: by value, then by `ST_BIND`, then by name in
    /// lexical byte order.
    ///
    /// The original C++ comparator reads `bind` from `a` for both operands
    /// (`ELFReader.cc`'s `Symbol::Compare`), a strict-weak-ordering bug.
    /// Fixed here: `b`'s bind is read from `b`.
    pub(crate) fn sort_key_cmp(a: &Symbol, b: &Symbol) -> Ordering {
        a.value
            .cmp(&b.value)
            .then_with(|| a.bind().cmp(&b.bind()))
            .then_with(|| a.name.as_bytes().cmp(b.name.as_bytes()))
    }
}

fn read_cstr(buf: &[u8], offset: usize) -> String {
    let rest = &buf[offset..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..end]).into_owned()
}
