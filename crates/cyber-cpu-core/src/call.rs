//! Procedure call, return and pop, and trap entry.
//!
//! All four share one save-area layout written at the caller's A0:
//!
//! | Word | Contents |
//! |---|---|
//! | 0 | key (48..=53), return P |
//! | 1 | caller VMID (60..=63), A0 |
//! | 2 | frame descriptor (48..=63), A1 |
//! | 3 | UMR (48..=63), A2 |
//! | 4.. | A3..=At, then Xs..=Xt |
//! | last | trap frames only: MCR (16..=31), UCR (0..=15) |

use cyber_mem::MemoryBus;
use cyber_mmu::{Pva, PVA_MASK};

use crate::conditions::{MonitorCondition, UserCondition};
use crate::error::CoreError;
use crate::legacy::LegacyContext;
use crate::state::{Cpu, Flags, IsaState, TrapControl, VMID_LEGACY, VMID_NATIVE};
use crate::{Abort, ExecResult};

const DESC_TRAP: u16 = 0x2000;
const DESC_FLAGS: u16 = Flags::CRITICAL_FRAME.bits() | Flags::ON_CONDITION.bits();

/// Code base pointer: external reference (binding pointer in the next word).
pub const CBP_EXTERNAL: u64 = 1 << 63;
/// Code base pointer: entry is valid.
pub const CBP_VALID: u64 = 1 << 62;

/// A register range saved in a frame: A3..=At and Xs..=Xt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameRange {
    at: u8,
    xs: u8,
    xt: u8,
}

impl FrameRange {
    const FULL: Self = Self {
        at: 15,
        xs: 0,
        xt: 15,
    };

    /// Range requested by a caller in X0 bits 0..=11.
    fn from_x0(x0: u64) -> Self {
        Self {
            at: (((x0 >> 8) & 0xF) as u8).max(2),
            xs: ((x0 >> 4) & 0xF) as u8,
            xt: (x0 & 0xF) as u8,
        }
    }

    fn from_descriptor(desc: u16) -> Self {
        Self::from_x0(u64::from(desc))
    }

    fn descriptor(self) -> u16 {
        (u16::from(self.at) << 8) | (u16::from(self.xs) << 4) | u16::from(self.xt)
    }

    fn a_regs(self) -> core::ops::RangeInclusive<usize> {
        3..=usize::from(self.at)
    }

    fn x_regs(self) -> core::ops::RangeInclusive<usize> {
        usize::from(self.xs)..=usize::from(self.xt)
    }
}

/// Everything a save area holds, independent of where the registers came from.
struct FrameImage<'a> {
    ret_p: Pva,
    key: u8,
    vmid: u8,
    flags: Flags,
    umr: u16,
    a: &'a [Pva; 16],
    x: &'a [u64; 16],
    range: FrameRange,
    trap_word: Option<u64>,
}

#[inline]
fn pva_of(word: u64) -> Pva {
    Pva::from_bits(word & PVA_MASK)
}

impl Cpu {
    /// Write a save area at `frame` and return the new stack top just past it.
    fn push_frame(
        &mut self,
        bus: &mut dyn MemoryBus,
        frame: Pva,
        image: &FrameImage<'_>,
    ) -> Result<Pva, Abort> {
        let mut desc = (image.flags.bits() & DESC_FLAGS) | image.range.descriptor();
        if image.trap_word.is_some() {
            desc |= DESC_TRAP;
        }

        let mut words = Vec::with_capacity(4 + 13 + 16 + 1);
        words.push((u64::from(image.key & 0x3F) << 48) | image.ret_p.bits());
        words.push((u64::from(image.vmid) << 60) | image.a[0].bits());
        words.push((u64::from(desc) << 48) | image.a[1].bits());
        words.push((u64::from(image.umr) << 48) | image.a[2].bits());
        words.extend(image.range.a_regs().map(|i| image.a[i].bits()));
        words.extend(image.range.x_regs().map(|i| image.x[i]));
        words.extend(image.trap_word);

        let mut at = frame;
        for word in words {
            self.store_word(bus, at, word)?;
            at = at.offset(8);
        }
        Ok(at)
    }

    /// Switch to the new activation after a frame was pushed at `frame` ending at `top`.
    fn activate(&mut self, frame: Pva, top: Pva, caller_ring: u8, new_ring: u8) {
        self.set_top_of_stack(caller_ring, top);
        self.lrn = self.lrn.max(caller_ring);
        let stack = if new_ring != caller_ring {
            self.top_of_stack(new_ring)
        } else {
            top
        };
        self.a[0] = stack;
        self.a[1] = stack;
        self.a[2] = frame;
        self.flags.remove(Flags::CRITICAL_FRAME | Flags::ON_CONDITION);
    }

    /// The segment holding `pva` must be a valid binding section.
    fn require_binding_section(&mut self, bus: &mut dyn MemoryBus, pva: Pva) -> ExecResult {
        match self.atu.segment_descriptor(bus, pva.segment()) {
            Some(sde) if sde.valid && sde.is_binding_section() => Ok(()),
            _ => {
                self.atu.set_untranslatable_pointer(pva);
                Err(self.fault_monitor(MonitorCondition::AccessViolation))
            }
        }
    }

    /// Follow a code base pointer at `cbp`. Returns the entry point with its ring settled
    /// and the binding section pointer for external references.
    ///
    /// With `binding` set, the pointer and any binding section it names must both live in
    /// binding sections.
    pub(crate) fn resolve_code_base_pointer(
        &mut self,
        bus: &mut dyn MemoryBus,
        cbp: Pva,
        ring: u8,
        binding: bool,
    ) -> Result<(Pva, Option<Pva>), Abort> {
        if binding {
            self.require_binding_section(bus, cbp)?;
        }
        let word = self.load_word(bus, cbp)?;
        if word & CBP_VALID == 0 {
            self.atu.set_untranslatable_pointer(cbp);
            return Err(self.fault_monitor(MonitorCondition::EnvironmentSpecification));
        }
        let code = pva_of(word);
        let section = if word & CBP_EXTERNAL != 0 {
            let bp = pva_of(self.load_word(bus, cbp.offset(8))?);
            if binding {
                self.require_binding_section(bus, bp)?;
            }
            Some(bp.ring_at_least(ring))
        } else {
            None
        };

        let sde = match self.atu.segment_descriptor(bus, code.segment()) {
            Some(sde) if sde.valid => sde,
            _ => {
                self.atu.set_untranslatable_pointer(code);
                return Err(self.fault_monitor(MonitorCondition::InvalidSegmentRingZero));
            }
        };
        let target = ring.min(code.ring()).max(sde.r1);
        if target > ring {
            self.atu.set_untranslatable_pointer(code);
            return Err(self.fault_monitor(MonitorCondition::OutwardCallInwardReturn));
        }
        Ok((code.with_ring(target), section))
    }

    fn call(
        &mut self,
        bus: &mut dyn MemoryBus,
        target: Pva,
        binding: Option<Pva>,
        arg: Pva,
    ) -> ExecResult {
        let caller_ring = self.cur_p.ring();
        let frame = self.a[0];
        let (a, x) = (self.a, self.x);
        let image = FrameImage {
            ret_p: self.cur_p.offset(i64::from(self.inst.len())),
            key: self.key,
            vmid: VMID_NATIVE,
            flags: self.flags,
            umr: self.umr,
            a: &a,
            x: &x,
            range: FrameRange::from_x0(self.x[0]),
            trap_word: None,
        };
        let top = self.push_frame(bus, frame, &image)?;

        self.activate(frame, top, caller_ring, target.ring());
        if let Some(binding) = binding {
            self.a[3] = binding;
        }
        self.a[4] = arg;
        self.next_p = target;
        tracing::trace!(cpu = self.id, from = %self.cur_p, to = %target, "call");
        let from = self.cur_p;
        self.observe(|o, id| o.on_call(id, from, target));
        Ok(())
    }

    /// CALLREL: call within the current segment at P + 2Q.
    pub(crate) fn call_relative(&mut self, bus: &mut dyn MemoryBus) -> ExecResult {
        let target = self.cur_p.offset(2 * self.inst.q_signed());
        let arg = self.a[usize::from(self.inst.k)];
        self.call(bus, target, None, arg)
    }

    /// CALLSEG: call through the code base pointer at Aj + 8(index + D).
    pub(crate) fn call_segment(&mut self, bus: &mut dyn MemoryBus) -> ExecResult {
        let cbp = self.indexed_operand(8);
        let ring = self.cur_p.ring();
        let (target, binding) = self.resolve_code_base_pointer(bus, cbp, ring, true)?;
        let arg = self.a[usize::from(self.inst.k)];
        self.call(bus, target, binding, arg)
    }

    /// RETURN: restore the caller's activation from the save area at A2.
    pub(crate) fn return_from_call(&mut self, bus: &mut dyn MemoryBus) -> ExecResult {
        let frame = self.a[2];
        let cur_ring = self.cur_p.ring();

        let w0 = self.load_word(bus, frame)?;
        let ret_p = pva_of(w0);
        if ret_p.ring() < cur_ring {
            self.atu.set_untranslatable_pointer(ret_p);
            return Err(self.fault_monitor(MonitorCondition::OutwardCallInwardReturn));
        }
        if self.flags.contains(Flags::CRITICAL_FRAME) {
            return Err(self.fault_user(UserCondition::CriticalFrameFlag));
        }

        let mut fixed = [0u64; 3];
        for (i, w) in fixed.iter_mut().enumerate() {
            *w = self.load_word(bus, frame.offset(8 * (i as i64 + 1)))?;
        }
        let [w1, w2, w3] = fixed;
        let desc = (w2 >> 48) as u16;
        let range = FrameRange::from_descriptor(desc);

        let mut at = frame.offset(32);
        let mut saved_a = Vec::with_capacity(13);
        for _ in range.a_regs() {
            saved_a.push(self.load_word(bus, at)?);
            at = at.offset(8);
        }
        let mut saved_x = Vec::with_capacity(16);
        for _ in range.x_regs() {
            saved_x.push(self.load_word(bus, at)?);
            at = at.offset(8);
        }

        let floor = frame.ring().max(ret_p.ring());
        let new_ring = ret_p.ring();
        if new_ring != cur_ring {
            self.set_top_of_stack(cur_ring, self.a[0]);
        }
        self.a[0] = pva_of(w1).ring_at_least(floor);
        self.a[1] = pva_of(w2).ring_at_least(floor);
        self.a[2] = pva_of(w3).ring_at_least(floor);
        for (i, word) in range.a_regs().zip(saved_a) {
            self.a[i] = pva_of(word).ring_at_least(floor);
        }
        for (i, word) in range.x_regs().zip(saved_x) {
            self.x[i] = word;
        }
        self.umr = (w3 >> 48) as u16;
        self.flags = (self.flags - Flags::CRITICAL_FRAME - Flags::ON_CONDITION)
            | Flags::from_bits_truncate(desc & DESC_FLAGS);
        self.next_p = ret_p;
        self.next_key = ((w0 >> 48) & 0x3F) as u8;

        if ((w1 >> 60) & 0xF) as u8 == VMID_LEGACY {
            self.isa = IsaState::Legacy(LegacyContext::from_native(ret_p, &self.a, &self.x));
            self.observe(|o, id| o.invalidate_legacy_cache(id));
        }

        tracing::trace!(cpu = self.id, from = %self.cur_p, to = %ret_p, trap = desc & DESC_TRAP != 0, "return");
        let from = self.cur_p;
        self.observe(|o, id| o.on_return(id, from, ret_p));

        if desc & DESC_TRAP != 0 {
            self.trap.insert(TrapControl::TRAP_ENABLE);
            self.rescan_out_of_band();
        }
        Ok(())
    }

    /// POP: discard the current save area without restoring registers.
    pub(crate) fn pop_frame(&mut self, bus: &mut dyn MemoryBus) -> ExecResult {
        let frame = self.a[2];
        let w0 = self.load_word(bus, frame)?;
        if pva_of(w0).ring() != self.cur_p.ring() {
            return Err(self.fault_user(UserCondition::InterRingPop));
        }
        let w2 = self.load_word(bus, frame.offset(16))?;
        let w3 = self.load_word(bus, frame.offset(24))?;
        self.a[0] = frame;
        self.a[1] = self.ring_adjust(pva_of(w2));
        self.a[2] = self.ring_adjust(pva_of(w3));
        Ok(())
    }

    /// Deliver pending trap-class conditions to the handler named by the trap pointer.
    pub(crate) fn trap_entry(&mut self, bus: &mut dyn MemoryBus) {
        let (mcr_bits, ucr_bits) = self.deliverable_conditions();
        self.trap.remove(TrapControl::TRAP_ENABLE);
        let from = self.p;

        match self.build_trap_frame(bus, mcr_bits, ucr_bits) {
            Ok(handler) => {
                self.mcr &= !mcr_bits;
                self.ucr &= !ucr_bits;
                tracing::debug!(
                    cpu = self.id,
                    %from,
                    %handler,
                    mcr = mcr_bits,
                    ucr = ucr_bits,
                    "trap"
                );
                self.observe(|o, id| o.on_trap(id, from, handler));
            }
            Err(Abort) => {
                let err = CoreError::TrapEntry {
                    utp: self.atu.untranslatable_pointer(),
                };
                tracing::error!(cpu = self.id, %from, error = %err, "trap entry failed");
                self.raise_monitor(MonitorCondition::TrapException);
            }
        }
    }

    fn build_trap_frame(
        &mut self,
        bus: &mut dyn MemoryBus,
        mcr_bits: u16,
        ucr_bits: u16,
    ) -> Result<Pva, Abort> {
        let (p, a, x, vmid) = match &self.isa {
            IsaState::Native => (self.p, self.a, self.x, VMID_NATIVE),
            IsaState::Legacy(ctx) => {
                let (p, a, x) = ctx.to_native(self.p);
                (p, a, x, VMID_LEGACY)
            }
        };

        let caller_ring = p.ring();
        let pointer = pva_of(self.trap_pointer);
        let ring = pointer.ring().min(caller_ring);
        let (handler, binding) = self.resolve_code_base_pointer(bus, pointer, ring, false)?;

        let frame = a[0];
        let image = FrameImage {
            ret_p: p,
            key: self.key,
            vmid,
            flags: self.flags,
            umr: self.umr,
            a: &a,
            x: &x,
            range: FrameRange::FULL,
            trap_word: Some((u64::from(mcr_bits) << 16) | u64::from(ucr_bits)),
        };
        let top = self.push_frame(bus, frame, &image)?;

        if vmid == VMID_LEGACY {
            self.isa = IsaState::Native;
            self.observe(|o, id| o.invalidate_legacy_cache(id));
        }
        self.a = a;
        self.x = x;
        self.activate(frame, top, caller_ring, handler.ring());
        if let Some(binding) = binding {
            self.a[3] = binding;
        }
        self.p = handler;
        self.next_p = handler;
        self.cur_p = handler;
        Ok(handler)
    }

    /// Pointer Aj + `scale` * (index(i) + D) for the current JkiD instruction.
    pub(crate) fn indexed_operand(&self, scale: i64) -> Pva {
        let base = self.a[usize::from(self.inst.j)];
        base.offset(scale * (self.index_i() + i64::from(self.inst.d)))
    }
}
