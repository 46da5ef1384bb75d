//! Context loader: turns an ELF executable plus argv/envp into a fully
//! initialized guest address space and initial register state.
//!
//! [`Context::load_binary`] drives the steps in order: FD redirection,
//! binary decode, segment mapping, program-header placement, interpreter
//! loading, stack construction, register init, with no loops or retries.
//! Any step failing aborts the whole load; no partially-built [`Context`]
//! is ever returned.

pub mod error;
pub mod fdtable;
pub mod memory;
pub mod regs;
mod stack;

pub use error::{Error, Result};
pub use fdtable::{DescriptorKind, FileTable};
pub use memory::{Memory, MemoryError, Perm};
pub use regs::RegisterFile;

use crate::elf;
use stack::{AuxInputs, AuxVector, HostIdentity, PLATFORM_STRING};

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{geteuid, getegid, getgid, getuid};
use rand::RngCore;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use typed_builder::TypedBuilder;

/// Base guest address the interpreter (dynamic linker) is loaded at, if one
/// is present.
const LOADER_INTERP_BASE: u32 = 0xC000_1000;
/// Maximum interpreter file size: 8 MiB.
const LOADER_INTERP_MAX_SIZE: u64 = 8 * 1024 * 1024;
/// Top of the guest stack region.
const LOADER_STACK_BASE: u32 = 0xC000_0000;
/// Size of the mapped guest stack region: 8 MiB.
const LOADER_STACK_SIZE: u32 = 0x0080_0000;
/// Reserved space at the top of the stack for argc/argv/envp/auxv/strings:
/// 64 KiB.
const LOADER_MAX_ENVIRON: u32 = 0x0001_0000;
/// Size in bytes of one raw `Elf32_Phdr` record, as copied into the guest
/// program-header table.
const PHDR_RAW_SIZE: u32 = 32;
/// Permission bits used when creating a redirected stdout file: `0660`.
const STDOUT_REDIRECT_MODE: u32 = 0o660;

/// What the caller wants the initial guest process to look like: the
/// executable, its arguments and environment, and optional stdio
/// redirection. Built with a [`TypedBuilder`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct Config {
    /// Host path of the executable to load.
    pub exe: PathBuf,
    /// Guest `argv`, in order. `argv[0]` is not synthesized; callers
    /// supply it explicitly.
    #[builder(default)]
    pub argv: Vec<String>,
    /// Guest `envp`, each entry a raw `KEY=VALUE` string.
    #[builder(default)]
    pub envp: Vec<String>,
    /// Host file to redirect guest FD 0 from, if any.
    #[builder(default, setter(into, strip_option))]
    pub stdin_file_name: Option<PathBuf>,
    /// Host file to redirect guest FDs 1 and 2 to, if any.
    #[builder(default, setter(into, strip_option))]
    pub stdout_file_name: Option<PathBuf>,
}

/// The populated state of a loaded guest process.
/// Read-only once [`Context::load_binary`] returns; the instruction
/// emulator consumes it from here on.
#[derive(Debug)]
pub struct Context {
    exe: PathBuf,
    stdin_file_name: Option<PathBuf>,
    stdout_file_name: Option<PathBuf>,
    argv: Vec<String>,
    envp: Vec<String>,
    file: elf::File,
    bottom: u32,
    stack_base: u32,
    stack_top: u32,
    stack_size: u32,
    environ_base: u32,
    phdt_base: u32,
    phdr_count: u32,
    prog_entry: u32,
    interp_prog_entry: Option<u32>,
    at_random_addr: u32,
    at_platform_addr: u32,
    interp: Option<String>,
    exec_sections: Vec<(String, u32, u32, u32)>,
}

impl Context {
    /// Build a fully initialized guest process: FD redirection, ELF decode,
    /// segment/program-header mapping, optional interpreter load, stack
    /// construction, and register init.
    pub fn load_binary(
        config: Config,
        memory: &mut impl Memory,
        regs: &mut impl RegisterFile,
        fdtable: &mut impl FileTable,
    ) -> Result<Self> {
        Self::redirect_stdio(&config, fdtable)?;

        let file = elf::File::load(&config.exe).map_err(Error::Elf)?;
        let prog_entry = file.header().entry;
        log::debug!("loading {}: entry=0x{:08x}", config.exe.display(), prog_entry);

        let (bottom, exec_sections, alloc_section_ends) = Self::scan_sections(&file);
        let file_interp_hint = Self::interp_from_file(&file);

        let segments_top = Self::load_segments(&file, memory)?;

        let page_size = memory.page_size();
        memory.set_heap_break(round_up(segments_top, page_size));
        // Grow the heap break past every SHF_ALLOC section's end too, not
        // just the PT_LOAD segments' (matches the original loader's
        // separate section-table walk).
        for end in alloc_section_ends {
            memory.grow_heap_break(round_up(end, page_size));
        }

        let phdr_count = file.header().phnum as u32;
        let phdt_size = phdr_count * PHDR_RAW_SIZE;
        let phdt_base = match file.program_headers().iter().find(|ph| ph.is_phdr()) {
            Some(ph) => ph.vaddr,
            None => bottom.wrapping_sub(phdt_size),
        };
        memory.map(phdt_base, phdt_size, Perm::INIT | Perm::READ)?;
        for i in 0..phdr_count as usize {
            memory.init(phdt_base + i as u32 * PHDR_RAW_SIZE, file.program_header_raw(i))?;
        }

        let interp = Self::resolve_interp(&file, memory, file_interp_hint, &config.exe)?;

        let mut interp_prog_entry = None;
        if let Some(interp_path) = &interp {
            interp_prog_entry = Some(Self::load_interpreter(interp_path, memory)?);
        }

        let identity = HostIdentity {
            uid: getuid().as_raw(),
            euid: geteuid().as_raw(),
            gid: getgid().as_raw(),
            egid: getegid().as_raw(),
        };
        let aux_inputs = AuxInputs {
            phdt_base,
            phdr_count,
            page_size,
            interp_base: interp.as_ref().map(|_| LOADER_INTERP_BASE),
            prog_entry,
            identity,
        };

        let stack_base = LOADER_STACK_BASE;
        let stack_size = LOADER_STACK_SIZE;
        memory.map(stack_base - stack_size, stack_size, Perm::READ | Perm::WRITE)?;

        let layout = Self::write_stack(&config.argv, &config.envp, &aux_inputs, memory)?;

        regs.set_esp(layout.environ_base);
        regs.set_eip(interp_prog_entry.unwrap_or(prog_entry));

        Ok(Context {
            exe: config.exe,
            stdin_file_name: config.stdin_file_name,
            stdout_file_name: config.stdout_file_name,
            argv: config.argv,
            envp: config.envp,
            file,
            bottom,
            stack_base,
            stack_top: stack_base - stack_size,
            stack_size,
            environ_base: layout.environ_base,
            phdt_base,
            phdr_count,
            prog_entry,
            interp_prog_entry,
            at_random_addr: layout.random_addr,
            at_platform_addr: layout.platform_addr,
            interp,
            exec_sections,
        })
    }

    /// Step 1: open redirection files and install them over guest FDs
    /// 0/1/2.
    fn redirect_stdio(config: &Config, fdtable: &mut impl FileTable) -> Result<()> {
        if let Some(path) = &config.stdin_file_name {
            let fd = open(path.as_path(), OFlag::O_RDONLY, Mode::empty())
                .map_err(|source| Error::StdioRedirectionFailed {
                    path: path.clone(),
                    source: std::io::Error::from(source),
                })?;
            install_standard_fd(fdtable, 0, fd, path, OFlag::O_RDONLY.bits());
        }
        if let Some(path) = &config.stdout_file_name {
            let flags = OFlag::O_CREAT | OFlag::O_APPEND | OFlag::O_TRUNC | OFlag::O_WRONLY;
            let mode = Mode::from_bits_truncate(STDOUT_REDIRECT_MODE);
            let fd = open(path.as_path(), flags, mode).map_err(|source| {
                Error::StdioRedirectionFailed {
                    path: path.clone(),
                    source: std::io::Error::from(source),
                }
            })?;
            install_standard_fd(fdtable, 1, fd, path, flags.bits());
            // FD 2 shares the same host descriptor as FD 1.
            fdtable.free_descriptor(2);
            fdtable.new_descriptor(
                DescriptorKind::Standard,
                2,
                fd,
                &path.to_string_lossy(),
                flags.bits(),
            );
        }
        Ok(())
    }

    /// The section-table pass folded into segment loading: establishes
    /// `bottom` (lowest `SHF_ALLOC` section address), the executable-section
    /// map for [`Context::exec_sections`], and a sections-driven upper bound
    /// on the heap break, matching the original loader's separate
    /// `LoadELFSections` walk.
    fn scan_sections(file: &elf::File) -> (u32, Vec<(String, u32, u32, u32)>, Vec<u32>) {
        let mut bottom = u32::MAX;
        let mut exec_sections = Vec::new();
        let mut alloc_section_ends = Vec::new();
        for section in file.sections() {
            if !section.flags.contains(elf::SectionFlags::ALLOC) {
                continue;
            }
            bottom = bottom.min(section.addr);
            alloc_section_ends.push(section.addr + section.size);
            if section.flags.contains(elf::SectionFlags::EXECINSTR) {
                exec_sections.push((section.name.clone(), section.offset, section.addr, section.size));
            }
        }
        if bottom == u32::MAX {
            bottom = 0;
        }
        (bottom, exec_sections, alloc_section_ends)
    }

    /// Step 3: map and populate every `PT_LOAD` segment. Also used
    /// unmodified by Step 5 to load the interpreter's own segments.
    fn load_segments(file: &elf::File, memory: &mut impl Memory) -> Result<u32> {
        let mut top = 0u32;
        for (i, ph) in file.program_headers().iter().enumerate() {
            if !ph.is_load() {
                continue;
            }
            let mut perm = Perm::INIT | Perm::READ;
            if ph.flags.contains(elf::ProgramHeaderFlags::W) {
                perm |= Perm::WRITE;
            }
            if ph.flags.contains(elf::ProgramHeaderFlags::X) {
                perm |= Perm::EXEC;
            }
            memory.map(ph.vaddr, ph.memsz, perm)?;
            memory.init(ph.vaddr, file.program_header_bytes(i))?;
            top = top.max(ph.vaddr + ph.memsz);
        }
        Ok(top)
    }

    /// A first read of the `PT_INTERP` path straight from the file buffer,
    /// taken during the section/segment pass, before any guest mapping
    /// backs it.
    fn interp_from_file(file: &elf::File) -> Option<String> {
        let interp_ph = file.program_headers().iter().find(|ph| ph.is_interp())?;
        file.read_string_at_vaddr(interp_ph.vaddr)
    }

    /// Step 4's program-header scan: find `PT_PHDR`/`PT_INTERP`, and read
    /// the interpreter path a second time, this time from guest memory (the
    /// segment carrying it is already mapped at this point). This
    /// program-header-scan value is authoritative if it disagrees with
    /// `file_hint`, since it is the one the ABI specifies.
    fn resolve_interp(
        file: &elf::File,
        memory: &impl Memory,
        file_hint: Option<String>,
        exe: &Path,
    ) -> Result<Option<String>> {
        let Some(interp_ph) = file.program_headers().iter().find(|ph| ph.is_interp()) else {
            return Ok(None);
        };
        let from_memory = memory.read_string(interp_ph.vaddr)?;
        if file_hint.as_deref() != Some(from_memory.as_str()) {
            log::debug!(
                "{}: PT_INTERP path disagreement between file scan ({:?}) and \
                 program-header scan ({:?}); using the program-header value",
                exe.display(),
                file_hint,
                from_memory,
            );
        }
        Ok(Some(from_memory))
    }

    /// Step 5: load the interpreter named by `PT_INTERP`, if any. Returns
    /// its ELF entry point.
    fn load_interpreter(interp_path: &str, memory: &mut impl Memory) -> Result<u32> {
        let path = PathBuf::from(interp_path);
        let bytes = std::fs::read(&path).map_err(|_| Error::InvalidInterpreter { path: path.clone() })?;
        if bytes.len() as u64 > LOADER_INTERP_MAX_SIZE {
            return Err(Error::InterpreterTooLarge { path });
        }
        memory.map(LOADER_INTERP_BASE, bytes.len() as u32, Perm::INIT)?;
        memory.init(LOADER_INTERP_BASE, &bytes)?;

        let interp_file = elf::File::decode(path, bytes).map_err(Error::Elf)?;
        Self::load_segments(&interp_file, memory)?;
        Ok(interp_file.header().entry)
    }

    /// Step 6: construct the initial stack: argc, argv, envp, auxv,
    /// strings, random bytes, platform string, with pointer-slot fixups
    /// applied once the strings they reference have been written.
    fn write_stack(
        argv: &[String],
        envp: &[String],
        aux_inputs: &AuxInputs,
        memory: &mut impl Memory,
    ) -> Result<StackLayout> {
        let aux = AuxVector::build(aux_inputs);

        let sp = LOADER_STACK_BASE - LOADER_MAX_ENVIRON;
        let argv_ptr_base = sp + 4;
        let envp_ptr_base = argv_ptr_base + 4 * (argv.len() as u32 + 1);
        let auxv_base = envp_ptr_base + 4 * (envp.len() as u32 + 1);
        let strings_base = auxv_base + aux.byte_len();

        let mut cursor = strings_base;
        let mut argv_addrs = Vec::with_capacity(argv.len());
        for s in argv {
            argv_addrs.push(cursor);
            cursor += s.len() as u32 + 1;
        }
        let mut envp_addrs = Vec::with_capacity(envp.len());
        for s in envp {
            envp_addrs.push(cursor);
            cursor += s.len() as u32 + 1;
        }
        let random_addr = cursor;
        cursor += 16;
        let platform_addr = cursor;
        cursor += PLATFORM_STRING.len() as u32;

        if cursor > LOADER_STACK_BASE {
            return Err(Error::StackOverflow);
        }

        memory.write(sp, &(argv.len() as u32).to_le_bytes())?;
        for (i, addr) in argv_addrs.iter().enumerate() {
            memory.write(argv_ptr_base + 4 * i as u32, &addr.to_le_bytes())?;
        }
        memory.write(argv_ptr_base + 4 * argv.len() as u32, &0u32.to_le_bytes())?;

        for (i, addr) in envp_addrs.iter().enumerate() {
            memory.write(envp_ptr_base + 4 * i as u32, &addr.to_le_bytes())?;
        }
        memory.write(envp_ptr_base + 4 * envp.len() as u32, &0u32.to_le_bytes())?;

        for (i, (ty, val)) in aux.entries.iter().enumerate() {
            let addr = auxv_base + i as u32 * 8;
            memory.write(addr, &ty.to_le_bytes())?;
            memory.write(addr + 4, &val.to_le_bytes())?;
        }

        for (addr, s) in argv_addrs.iter().zip(argv) {
            memory.write(*addr, s.as_bytes())?;
            memory.write(*addr + s.len() as u32, &[0])?;
        }
        for (addr, s) in envp_addrs.iter().zip(envp) {
            memory.write(*addr, s.as_bytes())?;
            memory.write(*addr + s.len() as u32, &[0])?;
        }

        let mut random_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        memory.write(random_addr, &random_bytes)?;
        memory.write(platform_addr, PLATFORM_STRING)?;

        memory.write(
            AuxVector::slot_addr(auxv_base, aux.platform_slot),
            &platform_addr.to_le_bytes(),
        )?;
        memory.write(
            AuxVector::slot_addr(auxv_base, aux.random_slot),
            &random_addr.to_le_bytes(),
        )?;

        Ok(StackLayout { environ_base: sp, random_addr, platform_addr })
    }

    /// Host path of the executable this context was loaded from.
    pub fn exe(&self) -> &Path {
        &self.exe
    }

    /// The decoded main executable.
    pub fn file(&self) -> &elf::File {
        &self.file
    }

    /// Lowest `SHF_ALLOC` section address of the main executable; the
    /// fallback location for the program header table when no `PT_PHDR`
    /// segment is present.
    pub fn bottom(&self) -> u32 {
        self.bottom
    }

    /// `[stack_top, stack_base)` is the mapped guest stack region.
    pub fn stack_base(&self) -> u32 {
        self.stack_base
    }

    /// See [`Context::stack_base`].
    pub fn stack_top(&self) -> u32 {
        self.stack_top
    }

    /// Size in bytes of the mapped stack region.
    pub fn stack_size(&self) -> u32 {
        self.stack_size
    }

    /// Initial `ESP`: the guest address of `argc` at the bottom of the
    /// initialized stack layout.
    pub fn environ_base(&self) -> u32 {
        self.environ_base
    }

    /// Guest address of the in-memory program header table.
    pub fn phdt_base(&self) -> u32 {
        self.phdt_base
    }

    /// Number of program header entries (`AT_PHNUM`).
    pub fn phdr_count(&self) -> u32 {
        self.phdr_count
    }

    /// The main executable's entry point (`AT_ENTRY`).
    pub fn prog_entry(&self) -> u32 {
        self.prog_entry
    }

    /// The interpreter's entry point, if one was loaded.
    pub fn interp_prog_entry(&self) -> Option<u32> {
        self.interp_prog_entry
    }

    /// Guest address of the 16 `AT_RANDOM` bytes.
    pub fn at_random_addr(&self) -> u32 {
        self.at_random_addr
    }

    /// Guest address of the `AT_PLATFORM` string (`"i686\0"`).
    pub fn at_platform_addr(&self) -> u32 {
        self.at_platform_addr
    }

    /// The interpreter path named by `PT_INTERP`, if any.
    pub fn interp(&self) -> Option<&str> {
        self.interp.as_deref()
    }

    /// The guest argument list this context was loaded with.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The guest environment this context was loaded with.
    pub fn envp(&self) -> &[String] {
        &self.envp
    }

    /// Every executable, memory-resident section of the main executable, as
    /// `(name, file_offset, vaddr, size)`: the mapping a debugger needs to
    /// resolve addresses to sections for symbolic backtraces, matching the
    /// original loader's `CallStack` registration hook without this crate
    /// depending on a debugger type.
    pub fn exec_sections(&self) -> impl Iterator<Item = (&str, u32, u32, u32)> {
        self.exec_sections.iter().map(|(name, off, addr, size)| (name.as_str(), *off, *addr, *size))
    }
}

struct StackLayout {
    environ_base: u32,
    random_addr: u32,
    platform_addr: u32,
}

fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    (value + align - 1) / align * align
}

fn install_standard_fd(fdtable: &mut impl FileTable, guest_fd: u32, host_fd: RawFd, name: &Path, flags: i32) {
    fdtable.free_descriptor(guest_fd);
    fdtable.new_descriptor(DescriptorKind::Standard, guest_fd, host_fd, &name.to_string_lossy(), flags);
}
