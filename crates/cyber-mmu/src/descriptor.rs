//! Segment descriptor and page table entry codecs.

/// Execute privilege (SDE bits 62..=63).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExecutePrivilege {
    #[default]
    NonExecutable,
    NonPrivileged,
    LocalPrivileged,
    GlobalPrivileged,
}

impl ExecutePrivilege {
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 3 {
            0 => Self::NonExecutable,
            1 => Self::NonPrivileged,
            2 => Self::LocalPrivileged,
            _ => Self::GlobalPrivileged,
        }
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self as u64
    }
}

/// Read or write protection level (SDE bits 60..=61 and 58..=59).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Protection {
    #[default]
    NoAccess,
    /// Access requires the key/lock check.
    KeyLock,
    Open,
    /// Open; on read-protection, additionally marks the segment as a binding section.
    Binding,
}

impl Protection {
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        match bits & 3 {
            0 => Self::NoAccess,
            1 => Self::KeyLock,
            2 => Self::Open,
            _ => Self::Binding,
        }
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self as u64
    }

    #[inline]
    const fn permits(self, key_matches: bool) -> bool {
        match self {
            Self::NoAccess => false,
            Self::KeyLock => key_matches,
            Self::Open | Self::Binding => true,
        }
    }
}

const SDE_XP_SHIFT: u32 = 62;
const SDE_RP_SHIFT: u32 = 60;
const SDE_WP_SHIFT: u32 = 58;
const SDE_VALID: u64 = 1 << 57;
const SDE_R1_SHIFT: u32 = 52;
const SDE_R2_SHIFT: u32 = 48;
const SDE_ASID_SHIFT: u32 = 32;
const SDE_LOCK_SHIFT: u32 = 24;

/// Decoded segment descriptor table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SegmentDescriptor {
    pub execute: ExecutePrivilege,
    pub read: Protection,
    pub write: Protection,
    pub valid: bool,
    /// Lowest ring allowed to execute; highest ring allowed to write.
    pub r1: u8,
    /// Highest ring allowed to execute or read.
    pub r2: u8,
    pub asid: u16,
    pub lock: u8,
}

impl SegmentDescriptor {
    pub const fn from_word(word: u64) -> Self {
        Self {
            execute: ExecutePrivilege::from_bits(word >> SDE_XP_SHIFT),
            read: Protection::from_bits(word >> SDE_RP_SHIFT),
            write: Protection::from_bits(word >> SDE_WP_SHIFT),
            valid: word & SDE_VALID != 0,
            r1: ((word >> SDE_R1_SHIFT) & 0xF) as u8,
            r2: ((word >> SDE_R2_SHIFT) & 0xF) as u8,
            asid: (word >> SDE_ASID_SHIFT) as u16,
            lock: ((word >> SDE_LOCK_SHIFT) & 0x3F) as u8,
        }
    }

    pub const fn to_word(&self) -> u64 {
        (self.execute.bits() << SDE_XP_SHIFT)
            | (self.read.bits() << SDE_RP_SHIFT)
            | (self.write.bits() << SDE_WP_SHIFT)
            | if self.valid { SDE_VALID } else { 0 }
            | ((self.r1 as u64 & 0xF) << SDE_R1_SHIFT)
            | ((self.r2 as u64 & 0xF) << SDE_R2_SHIFT)
            | ((self.asid as u64) << SDE_ASID_SHIFT)
            | ((self.lock as u64 & 0x3F) << SDE_LOCK_SHIFT)
    }

    /// Key 0 and lock 0 are both masters.
    #[inline]
    pub const fn key_matches(&self, key: u8) -> bool {
        key == 0 || self.lock == 0 || key == self.lock
    }

    #[inline]
    pub const fn can_execute(&self, ring: u8, key: u8) -> bool {
        !matches!(self.execute, ExecutePrivilege::NonExecutable)
            && self.r1 <= ring
            && ring <= self.r2
            && self.key_matches(key)
    }

    #[inline]
    pub const fn can_read(&self, ring: u8, key: u8) -> bool {
        ring <= self.r2 && self.read.permits(self.key_matches(key))
    }

    #[inline]
    pub const fn can_write(&self, ring: u8, key: u8) -> bool {
        ring <= self.r1 && self.write.permits(self.key_matches(key))
    }

    #[inline]
    pub const fn is_binding_section(&self) -> bool {
        matches!(self.read, Protection::Binding)
    }
}

pub const PTE_VALID: u64 = 1 << 63;
pub const PTE_CONTINUE: u64 = 1 << 62;
pub const PTE_USED: u64 = 1 << 61;
pub const PTE_MODIFIED: u64 = 1 << 60;
const PTE_SPID_SHIFT: u32 = 22;
const PTE_SPID_MASK: u64 = (1 << 38) - 1;
const PTE_PFA_MASK: u64 = (1 << 22) - 1;

/// Segment/page identifier: the composite key a page table entry is searched by.
#[inline]
pub const fn spid(asid: u16, page: u32) -> u64 {
    ((asid as u64) << 22) | (page as u64 & 0x3F_FFFF)
}

/// Decoded page table entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PageTableEntry {
    pub valid: bool,
    pub cont: bool,
    pub used: bool,
    pub modified: bool,
    pub spid: u64,
    /// Page frame address in 512-byte units.
    pub pfa: u32,
}

impl PageTableEntry {
    pub const fn from_word(word: u64) -> Self {
        Self {
            valid: word & PTE_VALID != 0,
            cont: word & PTE_CONTINUE != 0,
            used: word & PTE_USED != 0,
            modified: word & PTE_MODIFIED != 0,
            spid: (word >> PTE_SPID_SHIFT) & PTE_SPID_MASK,
            pfa: (word & PTE_PFA_MASK) as u32,
        }
    }

    pub const fn to_word(&self) -> u64 {
        (if self.valid { PTE_VALID } else { 0 })
            | if self.cont { PTE_CONTINUE } else { 0 }
            | if self.used { PTE_USED } else { 0 }
            | if self.modified { PTE_MODIFIED } else { 0 }
            | ((self.spid & PTE_SPID_MASK) << PTE_SPID_SHIFT)
            | (self.pfa as u64 & PTE_PFA_MASK)
    }

    /// Real byte address of the frame.
    #[inline]
    pub const fn frame_rma(&self) -> u64 {
        (self.pfa as u64) << 9
    }
}
