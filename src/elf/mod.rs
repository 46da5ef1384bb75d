//! ELF32 little-endian decoder.
//!
//! [`File::load`] reads a whole executable into memory and runs four passes
//! over it: header, section table, program header table, symbol table. The
//! result is immutable and never partially constructed; any validation
//! failure aborts before a [`File`] is returned.

mod error;
mod header;
mod program_header;
mod raw;
mod section;
mod symbol;

pub use error::{Error, Result};
pub use header::ElfHeader;
pub use program_header::{ProgramHeader, ProgramHeaderFlags, ProgramHeaderType};
pub use section::{Section, SectionFlags, SectionType};
pub use symbol::Symbol;

use raw::{PHDR_SIZE, SHDR_SIZE, SYM_SIZE};
use std::fmt;
use std::path::{Path, PathBuf};

/// A decoded ELF32 object: header, sections, program headers, and a sorted
/// symbol table.
///
/// Sections/program headers store byte *ranges* rather than borrowed slices
/// (see [`section`] module docs); call [`File::section_bytes`] /
/// [`File::program_header_bytes`] to get the actual on-disk bytes. The
/// `buffer` field outlives every other field and must not be mutated or
/// dropped while a `File` is in use; ownership is exclusive.
pub struct File {
    path: PathBuf,
    buffer: Vec<u8>,
    header: ElfHeader,
    sections: Vec<Section>,
    program_headers: Vec<ProgramHeader>,
    /// Index of the section-header-string-table section.
    shstrndx: usize,
    symbols: Vec<Symbol>,
}

impl File {
    /// Read `path` from the host filesystem and decode it as an ELF32
    /// object. Fails fast: no partially-constructed `File` is ever
    /// observable.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let buffer = std::fs::read(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::decode(path.to_path_buf(), buffer)
    }

    /// Decode an already-loaded buffer as an ELF32 object. Exposed
    /// separately from [`File::load`] so tests (and a future interpreter
    /// loader that already has the bytes in hand) don't need to touch disk.
    pub fn decode(path: PathBuf, buffer: Vec<u8>) -> Result<Self> {
        let header = ElfHeader::parse(&buffer, &path)?;
        let shstrndx = header.shstrndx as usize;
        let mut sections = Self::read_sections(&buffer, &path, &header)?;
        Self::resolve_string_table(&buffer, &path, &header, shstrndx, &mut sections)?;
        let program_headers = Self::read_program_headers(&buffer, &path, &header)?;
        let symbols = Self::read_symbols(&buffer, &path, &sections)?;

        log::debug!(
            "decoded ELF {}: {} sections, {} program headers, {} symbols",
            path.display(),
            sections.len(),
            program_headers.len(),
            symbols.len()
        );

        Ok(File {
            path,
            buffer,
            header,
            sections,
            program_headers,
            shstrndx,
            symbols,
        })
    }

    fn read_sections(buf: &[u8], path: &Path, header: &ElfHeader) -> Result<Vec<Section>> {
        if header.shnum == 0 || header.shentsize as usize != SHDR_SIZE {
            return Err(Error::MalformedSectionTable { path: path.to_path_buf() });
        }
        (0..header.shnum as usize)
            .map(|i| Section::parse(buf, path, header.shoff as usize + i * SHDR_SIZE))
            .collect()
    }

    fn resolve_string_table(
        buf: &[u8],
        path: &Path,
        header: &ElfHeader,
        shstrndx: usize,
        sections: &mut [Section],
    ) -> Result<()> {
        if shstrndx >= header.shnum as usize {
            return Err(Error::InvalidStringTable { path: path.to_path_buf() });
        }
        if sections[shstrndx].ty != Some(SectionType::Strtab) {
            return Err(Error::InvalidStringTable { path: path.to_path_buf() });
        }
        let strtab_offset = sections[shstrndx].offset;
        let strtab_size = sections[shstrndx].size as usize;
        let strtab = &buf[strtab_offset as usize..strtab_offset as usize + strtab_size];

        for section in sections.iter_mut() {
            if section.name_offset as usize >= strtab.len() {
                return Err(Error::InvalidStringTable { path: path.to_path_buf() });
            }
            section.name = read_cstr(strtab, section.name_offset as usize);
        }
        Ok(())
    }

    fn read_program_headers(
        buf: &[u8],
        path: &Path,
        header: &ElfHeader,
    ) -> Result<Vec<ProgramHeader>> {
        if header.phentsize as usize != PHDR_SIZE {
            return Err(Error::MalformedProgramHeaderTable { path: path.to_path_buf() });
        }
        (0..header.phnum as usize)
            .map(|i| ProgramHeader::parse(buf, path, header.phoff as usize + i * PHDR_SIZE))
            .collect()
    }

    fn read_symbols(buf: &[u8], path: &Path, sections: &[Section]) -> Result<Vec<Symbol>> {
        let mut symbols = Vec::new();
        for section in sections {
            if !matches!(section.ty, Some(SectionType::Symtab) | Some(SectionType::Dynsym)) {
                continue;
            }
            let link = section.link as usize;
            if link >= sections.len() {
                return Err(Error::MalformedSymbolTable { path: path.to_path_buf() });
            }
            let strtab = &sections[link];
            let strtab_offset = strtab.offset as usize;
            let strtab_bytes = &buf[strtab_offset..strtab_offset + strtab.size as usize];

            let symtab_offset = section.offset as usize;
            let symtab_bytes = &buf[symtab_offset..symtab_offset + section.size as usize];
            if section.size as usize % SYM_SIZE != 0 {
                return Err(Error::MalformedSymbolTable { path: path.to_path_buf() });
            }
            let count = section.size as usize / SYM_SIZE;
            for i in 0..count {
                let symbol = Symbol::parse(symtab_bytes, strtab_bytes, path, i * SYM_SIZE)?;
                if symbol.name.is_empty() {
                    continue;
                }
                symbols.push(symbol);
            }
        }
        symbols.sort_by(Symbol::sort_key_cmp);
        Ok(symbols)
    }

    /// The host path this object was decoded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decoded ELF header fields.
    pub fn header(&self) -> &ElfHeader {
        &self.header
    }

    /// All decoded sections, in file order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// All decoded program headers, in file order.
    pub fn program_headers(&self) -> &[ProgramHeader] {
        &self.program_headers
    }

    /// Symbols, sorted by value ascending, then bind ascending, then name
    /// ascending.
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// On-disk bytes of `sections()[index]`. Empty for `SHT_NOBITS`.
    pub fn section_bytes(&self, index: usize) -> &[u8] {
        let section = &self.sections[index];
        if section.is_nobits() {
            &[]
        } else {
            &self.buffer[section.offset as usize..(section.offset + section.size) as usize]
        }
    }

    /// On-disk bytes of `program_headers()[index]`, i.e.
    /// `[offset, offset+filesz)`.
    pub fn program_header_bytes(&self, index: usize) -> &[u8] {
        let ph = &self.program_headers[index];
        &self.buffer[ph.offset as usize..(ph.offset + ph.filesz) as usize]
    }

    /// The raw 32-byte on-disk record for `program_headers()[index]`, used
    /// to populate the in-guest program header table verbatim.
    pub fn program_header_raw(&self, index: usize) -> &[u8] {
        let pos = self.header.phoff as usize + index * PHDR_SIZE;
        &self.buffer[pos..pos + PHDR_SIZE]
    }

    /// Read a NUL-terminated string starting at `vaddr` within a `PT_LOAD`
    /// segment's file-backed bytes, identified by scanning program headers
    /// for the one containing `vaddr`. Used to resolve `PT_INTERP`'s path
    /// directly from the file, before any guest mapping exists.
    pub fn read_string_at_vaddr(&self, vaddr: u32) -> Option<String> {
        let ph = self
            .program_headers
            .iter()
            .find(|ph| vaddr >= ph.vaddr && vaddr < ph.vaddr + ph.filesz)?;
        let file_off = ph.offset + (vaddr - ph.vaddr);
        let rest = &self.buffer[file_off as usize..];
        let end = rest.iter().position(|&b| b == 0)?;
        Some(String::from_utf8_lossy(&rest[..end]).into_owned())
    }

    /// Find the symbol with the largest `value <= addr` among non-zero
    /// valued symbols, along with `addr - value`. Ties at the same value
    /// resolve to the first symbol in sort order.
    pub fn symbol_at(&self, addr: u32) -> Option<(&Symbol, u32)> {
        if self.symbols.is_empty() {
            return None;
        }
        if addr < self.symbols[0].value {
            return None;
        }
        // Binary search for the partition point: first index whose value
        // exceeds addr. The symbol just before it is our candidate.
        let idx = self.symbols.partition_point(|s| s.value <= addr);
        if idx == 0 {
            return None;
        }
        let candidate = &self.symbols[idx - 1];
        if candidate.value == 0 {
            return None;
        }
        // Walk back to the first symbol sharing that value (sort order tie).
        let mut first = idx - 1;
        while first > 0 && self.symbols[first - 1].value == candidate.value {
            first -= 1;
        }
        let symbol = &self.symbols[first];
        Some((symbol, addr - symbol.value))
    }
}

fn read_cstr(buf: &[u8], offset: usize) -> String {
    let rest = &buf[offset..];
    let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    String::from_utf8_lossy(&rest[..end]).into_owned()
}

impl fmt::Display for File {
    /// A formatted dump of header, section table, program-header table, and
    /// symbol table, for debugging. Column layout is not normative; each
    /// row identifies its entity unambiguously.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ELF header:")?;
        writeln!(f, "  class={} data={} type=0x{:x} machine=0x{:x}",
            self.header.class, self.header.data, self.header.object_type, self.header.machine)?;
        writeln!(f, "  entry=0x{:08x} phoff={} shoff={}",
            self.header.entry, self.header.phoff, self.header.shoff)?;
        writeln!(f)?;

        writeln!(f, "Section headers:")?;
        writeln!(f, "  [Nr] name                 type       addr     offset   size     flags")?;
        for (i, s) in self.sections.iter().enumerate() {
            writeln!(
                f,
                "  [{i:2}] {:<20} {:<10} {:08x} {:08x} {:08x} {:?}",
                s.name, s.raw_type, s.addr, s.offset, s.size, s.flags
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Program headers:")?;
        writeln!(f, "  idx type       offset   vaddr    filesz   memsz    flags")?;
        for (i, ph) in self.program_headers.iter().enumerate() {
            writeln!(
                f,
                "  {i:3} {:<10} {:08x} {:08x} {:08x} {:08x} {:?}",
                ph.raw_type, ph.offset, ph.vaddr, ph.filesz, ph.memsz, ph.flags
            )?;
        }
        writeln!(f)?;

        writeln!(f, "Symbol table:")?;
        writeln!(f, "  {:<40} {:>10} {:>10} shndx", "name", "value", "size")?;
        for sym in &self.symbols {
            writeln!(f, "  {:<40} {:08x} {:>10} {}", sym.name, sym.value, sym.size, sym.shndx)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn push_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    fn push_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Build a minimal well-formed ELF32 LE object with a section-name
    /// string table, a symbol-name string table, one PROGBITS section, and
    /// a symbol table, usable by both this module's tests and
    /// `tests/loader.rs`.
    pub(crate) fn build_minimal_elf(entry: u32) -> Vec<u8> {
        // Section names: index 0 "", 1 ".text", 7 ".symtab", 15 ".strtab", 23 ".shstrtab"
        let shstrtab: &[u8] = b"\0.text\0.symtab\0.strtab\0.shstrtab\0";
        // Symbol names: index 0 "", 1 "main", 6 "helper"
        let strtab: &[u8] = b"\0main\0helper\0";

        let ehdr_size = 52usize;
        let shstrtab_off = ehdr_size;
        let strtab_off = shstrtab_off + shstrtab.len();
        let text_off = strtab_off + strtab.len();
        let text: &[u8] = &[0x90, 0x90, 0xC3];
        let symtab_off = text_off + text.len();

        // Two symbols pointing at "main" (bind 0) and "helper" (bind 1).
        let mut symtab = Vec::new();
        // sym 0: name at strtab offset 1 ("main"), value=entry, bind 0
        push_u32(&mut symtab, 1);
        push_u32(&mut symtab, entry);
        push_u32(&mut symtab, 0);
        symtab.push(0x00); // info: bind 0, type 0
        symtab.push(0);
        push_u16(&mut symtab, 1);
        // sym 1: name at strtab offset 6 ("helper"), value=entry (tie), bind 1
        push_u32(&mut symtab, 6);
        push_u32(&mut symtab, entry);
        push_u32(&mut symtab, 0);
        symtab.push(0x10); // info: bind 1, type 0
        symtab.push(0);
        push_u16(&mut symtab, 1);

        let shdr_off = symtab_off + symtab.len();
        // 5 sections: NULL, .text (PROGBITS+ALLOC+EXEC), .symtab, .strtab, .shstrtab
        let shnum = 5u16;
        let phdr_off = shdr_off + shnum as usize * SHDR_SIZE;

        let mut buf = vec![0u8; ehdr_size];
        buf[0..4].copy_from_slice(&raw::ELF_MAGIC);
        buf[4] = 1; // ELFCLASS32
        buf[5] = 1; // little-endian
        buf[6] = 1; // EI_VERSION
        push_u16_at(&mut buf, 16, 2); // e_type = ET_EXEC
        push_u16_at(&mut buf, 18, 3); // e_machine = EM_386
        push_u32_at(&mut buf, 24, entry);
        push_u32_at(&mut buf, 28, phdr_off as u32); // e_phoff
        push_u32_at(&mut buf, 32, shdr_off as u32); // e_shoff
        push_u16_at(&mut buf, 42, PHDR_SIZE as u16); // e_phentsize
        push_u16_at(&mut buf, 44, 1); // e_phnum
        push_u16_at(&mut buf, 46, SHDR_SIZE as u16); // e_shentsize
        push_u16_at(&mut buf, 48, shnum); // e_shnum
        push_u16_at(&mut buf, 50, 4); // e_shstrndx -> .shstrtab section index

        buf.extend_from_slice(shstrtab);
        buf.extend_from_slice(strtab);
        buf.extend_from_slice(text);
        buf.extend_from_slice(&symtab);

        // Section 0: NULL
        buf.extend(std::iter::repeat(0).take(SHDR_SIZE));
        // Section 1: .text
        push_section(&mut buf, 1, 1, 6, entry, text_off as u32, text.len() as u32, 0, 0);
        // Section 2: .symtab, link -> section 3 (.strtab)
        push_section(
            &mut buf, 7, 2, 0, 0, symtab_off as u32, symtab.len() as u32, 3, 16,
        );
        // Section 3: .strtab (symbol names)
        push_section(&mut buf, 15, 3, 0, 0, strtab_off as u32, strtab.len() as u32, 0, 0);
        // Section 4: .shstrtab (section names)
        push_section(&mut buf, 23, 3, 0, 0, shstrtab_off as u32, shstrtab.len() as u32, 0, 0);

        // Program header: PT_LOAD covering the .text bytes
        push_u32(&mut buf, 1); // p_type = PT_LOAD
        push_u32(&mut buf, text_off as u32); // p_offset
        push_u32(&mut buf, entry); // p_vaddr
        push_u32(&mut buf, entry); // p_paddr
        push_u32(&mut buf, text.len() as u32); // p_filesz
        push_u32(&mut buf, text.len() as u32); // p_memsz
        push_u32(&mut buf, 5); // p_flags = PF_R | PF_X
        push_u32(&mut buf, 0x1000); // p_align

        buf
    }

    fn push_u16_at(buf: &mut [u8], pos: usize, v: u16) {
        buf[pos..pos + 2].copy_from_slice(&v.to_le_bytes());
    }
    fn push_u32_at(buf: &mut [u8], pos: usize, v: u32) {
        buf[pos..pos + 4].copy_from_slice(&v.to_le_bytes());
    }

    #[allow(clippy::too_many_arguments)]
    fn push_section(
        buf: &mut Vec<u8>,
        name: u32,
        ty: u32,
        flags: u32,
        addr: u32,
        offset: u32,
        size: u32,
        link: u32,
        entsize: u32,
    ) {
        push_u32(buf, name);
        push_u32(buf, ty);
        push_u32(buf, flags);
        push_u32(buf, addr);
        push_u32(buf, offset);
        push_u32(buf, size);
        push_u32(buf, link);
        push_u32(buf, 0); // info
        push_u32(buf, 0); // addralign
        push_u32(buf, entsize);
    }

    #[test]
    fn decodes_header_and_sections() {
        let buf = build_minimal_elf(0x0804_8000);
        let file = File::decode(PathBuf::from("test.elf"), buf).unwrap();
        assert_eq!(file.header().entry, 0x0804_8000);
        assert_eq!(file.sections().len(), 5);
        assert_eq!(file.sections()[1].name, ".text");
        assert_eq!(file.section_bytes(1), &[0x90, 0x90, 0xC3]);
    }

    #[test]
    fn section_slice_matches_file_bytes() {
        let buf = build_minimal_elf(0x0804_8000);
        let original = buf.clone();
        let file = File::decode(PathBuf::from("test.elf"), buf).unwrap();
        for (i, s) in file.sections().iter().enumerate() {
            if s.is_nobits() {
                continue;
            }
            let expect = &original[s.offset as usize..(s.offset + s.size) as usize];
            assert_eq!(file.section_bytes(i), expect);
        }
    }

    #[test]
    fn program_header_slice_matches_file_bytes() {
        let buf = build_minimal_elf(0x0804_8000);
        let original = buf.clone();
        let file = File::decode(PathBuf::from("test.elf"), buf).unwrap();
        for (i, ph) in file.program_headers().iter().enumerate() {
            let expect = &original[ph.offset as usize..(ph.offset + ph.filesz) as usize];
            assert_eq!(file.program_header_bytes(i), expect);
        }
    }

    #[test]
    fn symbols_sorted_by_value_then_bind_then_name() {
        let buf = build_minimal_elf(0x0804_8000);
        let file = File::decode(PathBuf::from("test.elf"), buf).unwrap();
        let names: Vec<&str> = file.symbols().iter().map(|s| s.name.as_str()).collect();
        // Both share value=entry; "main" has bind 0, "helper" has bind 1,
        // so "main" (lower bind) sorts first despite "helper" < "main" lexically.
        assert_eq!(names, vec!["main", "helper"]);
    }

    #[test]
    fn symbol_at_finds_nearest_preceding_symbol() {
        let buf = build_minimal_elf(0x0804_8000);
        let file = File::decode(PathBuf::from("test.elf"), buf).unwrap();
        let (sym, off) = file.symbol_at(0x0804_8002).unwrap();
        assert_eq!(sym.name, "main");
        assert_eq!(off, 2);
    }

    #[test]
    fn symbol_at_below_smallest_value_is_none() {
        let buf = build_minimal_elf(0x0804_8000);
        let file = File::decode(PathBuf::from("test.elf"), buf).unwrap();
        assert!(file.symbol_at(0x100).is_none());
    }

    #[test]
    fn rejects_missing_magic() {
        let mut buf = build_minimal_elf(0x1000);
        buf[0] = 0;
        assert!(matches!(
            File::decode(PathBuf::from("bad.elf"), buf).unwrap_err(),
            Error::InvalidElf { .. }
        ));
    }

    #[test]
    fn rejects_truncated_header() {
        let buf = vec![0x7f, b'E', b'L', b'F'];
        assert!(matches!(
            File::decode(PathBuf::from("short.elf"), buf).unwrap_err(),
            Error::InvalidElf { .. }
        ));
    }

    #[test]
    fn rejects_64_bit_class() {
        let mut buf = build_minimal_elf(0x1000);
        buf[4] = 2; // ELFCLASS64
        assert!(matches!(
            File::decode(PathBuf::from("elf64.elf"), buf).unwrap_err(),
            Error::Unsupported64Bit { .. }
        ));
    }

    #[test]
    fn display_mentions_every_entity() {
        let buf = build_minimal_elf(0x0804_8000);
        let file = File::decode(PathBuf::from("test.elf"), buf).unwrap();
        let dump = file.to_string();
        assert!(dump.contains("ELF header"));
        assert!(dump.contains("Section headers"));
        assert!(dump.contains("Program headers"));
        assert!(dump.contains("Symbol table"));
        assert!(dump.contains(".text"));
        assert!(dump.contains("main"));
    }
}
