use std::path::PathBuf;

/// Errors raised while decoding an ELF32 object.
///
/// Every variant is path-qualified, for a single-line, user-visible message.
/// A [`File`](super::File) is never partially constructed: any of these
/// aborts `File::load` before a value is returned.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The buffer is shorter than an `Elf32_Ehdr`, or the first four bytes
    /// are not `\x7fELF`.
    #[error("{path}: invalid ELF file")]
    InvalidElf { path: PathBuf },
    /// `EI_CLASS` is `ELFCLASS64`.
    #[error("{path}: 64-bit ELF not supported")]
    Unsupported64Bit { path: PathBuf },
    /// `e_shnum == 0`, or `e_shentsize` does not match `Elf32_Shdr`'s size,
    /// or a section's `(offset, size)` range escapes the file buffer.
    #[error("{path}: malformed section header table")]
    MalformedSectionTable { path: PathBuf },
    /// `e_phentsize` does not match `Elf32_Phdr`'s size, or a program
    /// header's `(offset, filesz)` range escapes the file buffer.
    #[error("{path}: malformed program header table")]
    MalformedProgramHeaderTable { path: PathBuf },
    /// A `SHT_SYMTAB`/`SHT_DYNSYM` section's size is not a multiple of
    /// `Elf32_Sym`'s size, or a symbol's name offset escapes its string
    /// table.
    #[error("{path}: malformed symbol table")]
    MalformedSymbolTable { path: PathBuf },
    /// `e_shstrndx` is out of range, or the section it names is not of
    /// type `SHT_STRTAB`.
    #[error("{path}: invalid string table")]
    InvalidStringTable { path: PathBuf },
    /// Reading the executable from the host filesystem failed.
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience alias used throughout [`crate::elf`].
pub type Result<T> = std::result::Result<T, Error>;
