//! The guest file descriptor table: only the operations stdio redirection
//! needs during process bootstrap.

use std::os::unix::io::RawFd;

/// The kind of guest file descriptor being installed. The loader only ever
/// installs [`DescriptorKind::Standard`] descriptors, for redirected
/// stdin/stdout/stderr; other kinds exist for the table's own bookkeeping
/// and are never constructed by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// A descriptor backed directly by a host file descriptor.
    Standard,
}

/// The guest process's file descriptor table.
pub trait FileTable {
    /// Release whatever is currently installed at guest descriptor `fd`.
    fn free_descriptor(&mut self, fd: u32);

    /// Install a new descriptor at guest slot `guest_fd`, backed by host
    /// descriptor `host_fd`. `name` and `open_flags` are bookkeeping for
    /// `/proc`-style introspection, not behavior this crate depends on.
    fn new_descriptor(
        &mut self,
        kind: DescriptorKind,
        guest_fd: u32,
        host_fd: RawFd,
        name: &str,
        open_flags: i32,
    );
}
