use core::fmt;

/// Mask of the 48 architecturally visible PVA bits.
pub const PVA_MASK: u64 = 0xFFFF_FFFF_FFFF;

/// A process virtual address: ring (bits 44..=47), segment (bits 32..=43) and a 32-bit byte
/// number (bits 0..=31).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Pva(u64);

impl Pva {
    #[inline]
    pub const fn new(ring: u8, segment: u16, bn: u32) -> Self {
        Self(
            ((ring as u64 & 0xF) << 44) | ((segment as u64 & 0xFFF) << 32) | bn as u64,
        )
    }

    /// Build from the low 48 bits of a register or memory word.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits & PVA_MASK)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn ring(self) -> u8 {
        ((self.0 >> 44) & 0xF) as u8
    }

    #[inline]
    pub const fn segment(self) -> u16 {
        ((self.0 >> 32) & 0xFFF) as u16
    }

    #[inline]
    pub const fn bn(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn with_ring(self, ring: u8) -> Self {
        Self((self.0 & !(0xF << 44)) | ((ring as u64 & 0xF) << 44))
    }

    #[inline]
    pub const fn with_bn(self, bn: u32) -> Self {
        Self((self.0 & !0xFFFF_FFFF) | bn as u64)
    }

    /// Add a signed byte displacement to the byte number, wrapping within 32 bits.
    #[inline]
    pub const fn offset(self, delta: i64) -> Self {
        self.with_bn(self.bn().wrapping_add(delta as u32))
    }

    /// Raise the ring field to at least `floor`.
    #[inline]
    pub fn ring_at_least(self, floor: u8) -> Self {
        if self.ring() < floor {
            self.with_ring(floor)
        } else {
            self
        }
    }
}

impl fmt::Debug for Pva {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pva({self})")
    }
}

impl fmt::Display for Pva {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}:{:03x}:{:08x}", self.ring(), self.segment(), self.bn())
    }
}
