//! Register state of the 170-compatibility instruction set and its packing into the native
//! register layout.
//!
//! The legacy processor itself lives outside this crate behind [`LegacyStepper`]; this module
//! only moves its state across exchanges, trap entry and returns.

use cyber_mem::MemoryBus;
use cyber_mmu::Pva;

use crate::bits::{sext60, BIT_MASKS};

const MASK18: u64 = (1 << 18) - 1;
const MASK24: u64 = (1 << 24) - 1;
const MASK60: u64 = (1 << 60) - 1;

/// Register file of the legacy (170-state) processor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyContext {
    /// Word address of the current instruction word.
    pub p: u32,
    /// Parcel (0..=3) within the instruction word.
    pub parcel: u8,
    pub a: [u32; 8],
    pub b: [u32; 8],
    /// 60-bit operand registers, held sign-extended to 64 bits.
    pub x: [u64; 8],
    pub ra: u32,
    pub fl: u32,
    pub em: u32,
    pub rae: u32,
    pub fle: u32,
    pub ma: u32,
}

impl LegacyContext {
    /// Byte number of the native P equivalent to (`p`, `parcel`).
    #[inline]
    pub fn p_bn(&self) -> u32 {
        ((self.p & MASK18 as u32) << 3) | (u32::from(self.parcel & 3) << 1)
    }

    fn control_fields(&self) -> [u32; 6] {
        [self.ra, self.fl, self.em, self.rae, self.fle, self.ma]
    }

    /// Unpack from native registers: P's byte number gives the word and parcel, A0..=A7 carry
    /// 18-bit A registers, X0..=X7 60-bit X registers and X8..=XF the B registers plus the
    /// control fields.
    pub fn from_native(p: Pva, a: &[Pva; 16], x: &[u64; 16]) -> Self {
        let bn = p.bn();
        let field = |i: usize| ((x[8 + i] >> 18) & MASK24) as u32;
        Self {
            p: (bn >> 3) & MASK18 as u32,
            parcel: ((bn >> 1) & 3) as u8,
            a: core::array::from_fn(|i| a[i].bn() & MASK18 as u32),
            b: core::array::from_fn(|i| (x[8 + i] & MASK18) as u32),
            x: core::array::from_fn(|i| sext60(x[i] & MASK60)),
            ra: field(0),
            fl: field(1),
            em: field(2),
            rae: field(3),
            fle: field(4),
            ma: field(5),
        }
    }

    /// Pack into native registers. A registers are tagged with `p`'s ring and segment.
    pub fn to_native(&self, p: Pva) -> (Pva, [Pva; 16], [u64; 16]) {
        let base = Pva::new(p.ring(), p.segment(), 0);
        let mut a = [base; 16];
        for (slot, &reg) in a.iter_mut().zip(self.a.iter()) {
            *slot = base.with_bn(reg & MASK18 as u32);
        }

        let controls = self.control_fields();
        let mut x = [0u64; 16];
        for i in 0..8 {
            x[i] = sext60(self.x[i] & BIT_MASKS[60]);
            let control = controls.get(i).map_or(0, |&c| u64::from(c) & MASK24);
            x[8 + i] = (control << 18) | (u64::from(self.b[i]) & MASK18);
        }
        (p.with_bn(self.p_bn()), a, x)
    }
}

/// Why the legacy processor stopped stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyExit {
    Continue,
    /// Exchange jump: hand control back to the monitor.
    ExchangeJump,
    /// Error exit or program stop.
    Halt,
}

/// Executes 170-state instructions on behalf of a processor in legacy mode.
pub trait LegacyStepper: Send {
    fn step(&mut self, ctx: &mut LegacyContext, bus: &mut dyn MemoryBus) -> LegacyExit;
}
