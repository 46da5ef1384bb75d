//! The guest CPU register file: only the two setters this core needs.

/// The portion of the guest register file the loader touches. All other
/// registers are left at the implementation's default (conventionally
/// zero).
pub trait RegisterFile {
    /// Set the instruction pointer.
    fn set_eip(&mut self, value: u32);
    /// Set the stack pointer.
    fn set_esp(&mut self, value: u32);
}
