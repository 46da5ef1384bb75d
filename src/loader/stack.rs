//! Auxiliary vector construction and the initial stack layout, per the
//! System V i386 ABI's process initialization image.
//!
//! The original `LoadAV`/`LoadStack` write the AT_PLATFORM and AT_RANDOM
//! auxv *value* slots as zero placeholders, then overwrite them once the
//! platform string and random bytes have been placed later in the stack.
//! Rather than keep a raw pointer into guest memory alive past the write
//! that produced it, [`AuxVector`] returns the two slot *indices*, and the
//! caller turns those into guest addresses once it knows where the vector
//! itself was written.

/// `AT_NULL`: vector terminator.
const AT_NULL: u32 = 0;
/// `AT_PHDR`: base address of the program header table.
const AT_PHDR: u32 = 3;
/// `AT_PHENT`: size of one program header entry.
const AT_PHENT: u32 = 4;
/// `AT_PHNUM`: number of program header entries.
const AT_PHNUM: u32 = 5;
/// `AT_PAGESZ`: system page size.
const AT_PAGESZ: u32 = 6;
/// `AT_BASE`: base address the interpreter was loaded at.
const AT_BASE: u32 = 7;
/// `AT_FLAGS`: always 0.
const AT_FLAGS: u32 = 8;
/// `AT_ENTRY`: entry point of the main program (not the interpreter).
const AT_ENTRY: u32 = 9;
/// `AT_UID`.
const AT_UID: u32 = 11;
/// `AT_EUID`.
const AT_EUID: u32 = 12;
/// `AT_GID`.
const AT_GID: u32 = 13;
/// `AT_EGID`.
const AT_EGID: u32 = 14;
/// `AT_PLATFORM`: guest address of the platform name string.
const AT_PLATFORM: u32 = 15;
/// `AT_HWCAP`.
const AT_HWCAP: u32 = 16;
/// `AT_CLKTCK`.
const AT_CLKTCK: u32 = 17;
/// `AT_SECURE`.
const AT_SECURE: u32 = 23;
/// `AT_RANDOM`: guest address of 16 random bytes.
const AT_RANDOM: u32 = 25;

/// `AT_HWCAP` value the original reports for an i686 target.
const HWCAP_I686: u32 = 0x078B_FBFF;
/// `AT_CLKTCK` value (100 ticks per second).
const CLKTCK: u32 = 100;

/// The guest platform name string written near the top of the stack.
pub(crate) const PLATFORM_STRING: &[u8] = b"i686\0";

/// Host identity values the auxiliary vector reports (AT_UID, AT_EUID,
/// AT_GID, AT_EGID).
pub(crate) struct HostIdentity {
    pub uid: u32,
    pub euid: u32,
    pub gid: u32,
    pub egid: u32,
}

/// The facts the auxiliary vector is built from.
pub(crate) struct AuxInputs {
    pub phdt_base: u32,
    pub phdr_count: u32,
    pub page_size: u32,
    pub interp_base: Option<u32>,
    pub prog_entry: u32,
    pub identity: HostIdentity,
}

/// A built auxiliary vector: the `(type, value)` pairs in the kernel's exact
/// emission order, plus the indices of the two entries whose value is a
/// placeholder patched later.
pub(crate) struct AuxVector {
    pub entries: Vec<(u32, u32)>,
    pub platform_slot: usize,
    pub random_slot: usize,
}

impl AuxVector {
    pub(crate) fn build(inputs: &AuxInputs) -> Self {
        let mut entries = Vec::with_capacity(16);
        entries.push((AT_PHDR, inputs.phdt_base));
        entries.push((AT_PHENT, 32));
        entries.push((AT_PHNUM, inputs.phdr_count));
        entries.push((AT_PAGESZ, inputs.page_size));
        if let Some(base) = inputs.interp_base {
            entries.push((AT_BASE, base));
        }
        entries.push((AT_FLAGS, 0));
        entries.push((AT_ENTRY, inputs.prog_entry));
        entries.push((AT_UID, inputs.identity.uid));
        entries.push((AT_EUID, inputs.identity.euid));
        entries.push((AT_GID, inputs.identity.gid));
        entries.push((AT_EGID, inputs.identity.egid));

        let platform_slot = entries.len();
        entries.push((AT_PLATFORM, 0));

        entries.push((AT_HWCAP, HWCAP_I686));
        entries.push((AT_CLKTCK, CLKTCK));
        entries.push((AT_SECURE, 0));

        let random_slot = entries.len();
        entries.push((AT_RANDOM, 0));

        entries.push((AT_NULL, 0));

        AuxVector { entries, platform_slot, random_slot }
    }

    /// Total size in bytes once written to guest memory.
    pub(crate) fn byte_len(&self) -> u32 {
        self.entries.len() as u32 * 8
    }

    /// Guest address of the `value` half of `self.entries[slot]`, given the
    /// address the vector itself starts at.
    pub(crate) fn slot_addr(base: u32, slot: usize) -> u32 {
        base + (slot as u32) * 8 + 4
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn inputs(interp_base: Option<u32>) -> AuxInputs {
        AuxInputs {
            phdt_base: 0x1000,
            phdr_count: 3,
            page_size: 4096,
            interp_base,
            prog_entry: 0x0804_8000,
            identity: HostIdentity { uid: 1, euid: 1, gid: 1, egid: 1 },
        }
    }

    #[test]
    fn static_binary_omits_at_base() {
        let aux = AuxVector::build(&inputs(None));
        assert!(!aux.entries.iter().any(|(ty, _)| *ty == AT_BASE));
        assert_eq!(aux.entries.last(), Some(&(AT_NULL, 0)));
    }

    #[test]
    fn dynamic_binary_includes_at_base_with_interp_address() {
        let aux = AuxVector::build(&inputs(Some(0xC000_1000)));
        assert!(aux.entries.iter().any(|(ty, v)| *ty == AT_BASE && *v == 0xC000_1000));
    }

    #[test]
    fn order_matches_auxv_layout() {
        let aux = AuxVector::build(&inputs(Some(0xC000_1000)));
        let types: Vec<u32> = aux.entries.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            types,
            vec![
                AT_PHDR, AT_PHENT, AT_PHNUM, AT_PAGESZ, AT_BASE, AT_FLAGS, AT_ENTRY, AT_UID,
                AT_EUID, AT_GID, AT_EGID, AT_PLATFORM, AT_HWCAP, AT_CLKTCK, AT_SECURE, AT_RANDOM,
                AT_NULL,
            ]
        );
    }

    #[test]
    fn platform_and_random_slots_point_at_placeholders() {
        let aux = AuxVector::build(&inputs(None));
        assert_eq!(aux.entries[aux.platform_slot].0, AT_PLATFORM);
        assert_eq!(aux.entries[aux.random_slot].0, AT_RANDOM);
    }
}
