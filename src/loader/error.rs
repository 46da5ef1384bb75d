use super::memory::MemoryError;
use crate::elf;
use std::path::PathBuf;

/// Errors raised while building a guest process's initial address space and
/// register state. All are fatal to the context being loaded; no partial
/// [`super::Context`] is ever exposed.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Decoding the main executable or the interpreter failed.
    #[error(transparent)]
    Elf(#[from] elf::Error),
    /// A guest memory operation (map/init/write) failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),
    /// The interpreter named by `PT_INTERP` could not be opened.
    #[error("{path}: invalid interpreter")]
    InvalidInterpreter { path: PathBuf },
    /// The interpreter file exceeds `LoaderInterpMaxSize` (8 MiB).
    #[error("{path}: interpreter too large")]
    InterpreterTooLarge { path: PathBuf },
    /// A `stdin`/`stdout` redirection file could not be opened.
    #[error("{path}: cannot open for stdio redirection: {source}")]
    StdioRedirectionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The initial stack layout (argv/envp/auxv/strings/random/platform)
    /// overflowed `LoaderMaxEnviron`.
    #[error("initial stack overflow, increase LoaderMaxEnviron")]
    StackOverflow,
}

/// Convenience alias used throughout [`crate::loader`].
pub type Result<T> = std::result::Result<T, Error>;
