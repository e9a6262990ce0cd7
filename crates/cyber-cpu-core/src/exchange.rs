//! Exchange: swap the complete register state with an exchange package in real memory.
//!
//! Package layout (word offsets, 58 words):
//!
//! | Word | Contents |
//! |---|---|
//! | 0 | key (48..=53), P |
//! | 1 | VMID (60..=63), UVMID (56..=59), A0 |
//! | 2 | flags (48..=63), A1 |
//! | 3 | trap control (48..=63), A2 |
//! | 4..=7 | UMR, MMR, UCR, MCR (48..=63), A3..=A6 |
//! | 8 | LPID (48..=55), A7 |
//! | 9 | keypoint mask (48..=63), A8 |
//! | 10..=16 | A9..=AF |
//! | 17..=32 | X0..=XF |
//! | 33 | MPS |
//! | 34 | keypoint class and code |
//! | 35 | STL (32..=43), STA (0..=31) |
//! | 36 | base constant |
//! | 37 | process interval timer |
//! | 38 | untranslatable pointer |
//! | 39 | trap pointer |
//! | 40 | debug list pointer |
//! | 41 | debug mask (16..=31), largest ring number (0..=3) |
//! | 42..=56 | top of stack, rings 1..=15 |
//! | 57 | reserved |

use cyber_mem::{MemoryBus, WORD_BYTES};
use cyber_mmu::{Pva, PVA_MASK};

use crate::conditions::MonitorCondition;
use crate::error::CoreError;
use crate::legacy::LegacyContext;
use crate::state::{Cpu, Flags, IsaState, TrapControl, VMID_LEGACY};

pub const EXCHANGE_PACKAGE_WORDS: usize = 58;

const W_P: usize = 0;
const W_A0: usize = 1;
const W_FLAGS: usize = 2;
const W_TRAP: usize = 3;
const W_UMR: usize = 4;
const W_MMR: usize = 5;
const W_UCR: usize = 6;
const W_MCR: usize = 7;
const W_LPID: usize = 8;
const W_KEYPOINT_MASK: usize = 9;
const W_X0: usize = 17;
const W_MPS: usize = 33;
const W_KEYPOINT: usize = 34;
const W_SEGMENT_TABLE: usize = 35;
const W_BASE_CONSTANT: usize = 36;
const W_PIT: usize = 37;
const W_UTP: usize = 38;
const W_TRAP_POINTER: usize = 39;
const W_DEBUG_LIST: usize = 40;
const W_LRN: usize = 41;
const W_TOS: usize = 42;

#[inline]
fn word_rma(base: u32, word: usize) -> u64 {
    u64::from(base) + word as u64 * WORD_BYTES
}

#[inline]
fn high16(word: u64) -> u16 {
    (word >> 48) as u16
}

/// VMID and P of the package at `rma`, checked against the mode it would run in.
fn validate_package(
    bus: &mut dyn MemoryBus,
    rma: u32,
    to_monitor: bool,
) -> Result<u8, CoreError> {
    let vmid = ((bus.read_word(word_rma(rma, W_A0)) >> 60) & 0xF) as u8;
    if vmid > VMID_LEGACY {
        return Err(CoreError::UnsupportedVmid { rma, vmid });
    }
    if vmid == VMID_LEGACY {
        if to_monitor {
            return Err(CoreError::LegacyNotAllowed {
                rma,
                reason: "in monitor mode",
            });
        }
        if Pva::from_bits(bus.read_word(word_rma(rma, W_P))).ring() == 1 {
            return Err(CoreError::LegacyNotAllowed {
                rma,
                reason: "in ring 1",
            });
        }
    }
    Ok(vmid)
}

impl Cpu {
    /// Write the active state as an exchange package at `rma`.
    pub(crate) fn store_package(&mut self, bus: &mut dyn MemoryBus, rma: u32) {
        let (p, a, x) = match &self.isa {
            IsaState::Native => (self.p, self.a, self.x),
            IsaState::Legacy(ctx) => ctx.to_native(self.p),
        };

        let mut words = [0u64; EXCHANGE_PACKAGE_WORDS];
        words[W_P] = (u64::from(self.key & 0x3F) << 48) | p.bits();
        for (i, reg) in a.iter().enumerate() {
            words[W_A0 + i] = reg.bits();
        }
        words[W_A0] |= (u64::from(self.isa.vmid()) << 60) | (u64::from(self.uvmid & 0xF) << 56);
        words[W_FLAGS] |= u64::from(self.flags.bits()) << 48;
        words[W_TRAP] |= u64::from(self.trap.bits()) << 48;
        words[W_UMR] |= u64::from(self.umr) << 48;
        words[W_MMR] |= u64::from(self.mmr) << 48;
        words[W_UCR] |= u64::from(self.ucr) << 48;
        words[W_MCR] |= u64::from(self.mcr) << 48;
        words[W_LPID] |= u64::from(self.lpid) << 48;
        words[W_KEYPOINT_MASK] |= u64::from(self.keypoint_mask) << 48;
        words[W_X0..W_X0 + 16].copy_from_slice(&x);
        words[W_MPS] = u64::from(self.mps);
        words[W_KEYPOINT] = self.keypoint_code;
        let (sta, stl) = self.atu.segment_table();
        words[W_SEGMENT_TABLE] = (u64::from(stl) << 32) | u64::from(sta);
        words[W_BASE_CONSTANT] = self.base_constant;
        words[W_PIT] = u64::from(self.pit);
        words[W_UTP] = self.atu.untranslatable_pointer().bits();
        words[W_TRAP_POINTER] = self.trap_pointer;
        words[W_DEBUG_LIST] = self.debug_list;
        words[W_LRN] = (u64::from(self.debug_mask) << 16) | u64::from(self.lrn & 0xF);
        for (i, tos) in self.tos.iter().enumerate() {
            words[W_TOS + i] = tos.bits();
        }

        for (i, &w) in words.iter().enumerate() {
            bus.write_word(word_rma(rma, i), w);
        }
    }

    /// Load the package at `rma` as the active state.
    pub(crate) fn load_package(
        &mut self,
        bus: &mut dyn MemoryBus,
        rma: u32,
        to_monitor: bool,
        vmid: u8,
    ) {
        let mut words = [0u64; EXCHANGE_PACKAGE_WORDS];
        for (i, w) in words.iter_mut().enumerate() {
            *w = bus.read_word(word_rma(rma, i));
        }

        self.key = ((words[W_P] >> 48) & 0x3F) as u8;
        self.p = Pva::from_bits(words[W_P]);
        for i in 0..16 {
            self.a[i] = Pva::from_bits(words[W_A0 + i] & PVA_MASK);
        }
        self.uvmid = ((words[W_A0] >> 56) & 0xF) as u8;
        self.flags = Flags::from_bits_truncate(high16(words[W_FLAGS]));
        self.trap = TrapControl::from_bits_truncate(high16(words[W_TRAP]));
        self.umr = high16(words[W_UMR]);
        self.mmr = high16(words[W_MMR]);
        self.ucr = high16(words[W_UCR]);
        self.mcr = high16(words[W_MCR]);
        self.lpid = (words[W_LPID] >> 48) as u8;
        self.keypoint_mask = high16(words[W_KEYPOINT_MASK]);
        self.x.copy_from_slice(&words[W_X0..W_X0 + 16]);
        // The monitor package is by definition the one at MPS.
        self.mps = if to_monitor { rma } else { words[W_MPS] as u32 };
        self.keypoint_code = words[W_KEYPOINT];
        let st = words[W_SEGMENT_TABLE];
        self.atu
            .set_segment_table(st as u32, ((st >> 32) & 0xFFF) as u16);
        self.base_constant = words[W_BASE_CONSTANT];
        self.pit = words[W_PIT] as u32;
        self.atu
            .set_untranslatable_pointer(Pva::from_bits(words[W_UTP]));
        self.trap_pointer = words[W_TRAP_POINTER];
        self.debug_list = words[W_DEBUG_LIST];
        self.lrn = (words[W_LRN] & 0xF) as u8;
        self.debug_mask = (words[W_LRN] >> 16) as u16;
        for (i, tos) in self.tos.iter_mut().enumerate() {
            *tos = Pva::from_bits(words[W_TOS + i]);
        }

        self.isa = if vmid == VMID_LEGACY {
            IsaState::Legacy(LegacyContext::from_native(self.p, &self.a, &self.x))
        } else {
            IsaState::Native
        };
        self.monitor_mode = to_monitor;
        self.cur_p = self.p;
        self.next_p = self.p;
        self.next_key = self.key;
    }

    /// Swap state between job and monitor: store at JPS and load MPS from job mode, or the
    /// reverse from monitor mode.
    pub(crate) fn exchange(&mut self, bus: &mut dyn MemoryBus) {
        let to_monitor = !self.monitor_mode;
        let (store_at, load_from) = if self.monitor_mode {
            (self.mps, self.jps)
        } else {
            (self.jps, self.mps)
        };

        let vmid = match validate_package(bus, load_from, to_monitor) {
            Ok(vmid) => vmid,
            Err(err) if to_monitor => {
                // Re-raising would only exchange again into the same package.
                tracing::error!(cpu = self.id, error = %err, "bad monitor exchange package; halting");
                self.stopped = true;
                return;
            }
            Err(err) => {
                tracing::warn!(cpu = self.id, error = %err, "exchange rejected");
                self.raise_monitor(MonitorCondition::EnvironmentSpecification);
                return;
            }
        };

        let was_legacy = self.isa.is_legacy();
        let from = self.p;
        self.store_package(bus, store_at);
        self.load_package(bus, load_from, to_monitor, vmid);

        if was_legacy || self.isa.is_legacy() {
            self.observe(|o, id| o.invalidate_legacy_cache(id));
        }
        tracing::debug!(
            cpu = self.id,
            %from,
            to = %self.p,
            to_monitor,
            vmid,
            stored = store_at,
            loaded = load_from,
            "exchange"
        );
        self.observe(|o, id| o.on_exchange(id, to_monitor, vmid));
        self.rescan_conditions();
    }

    /// Deadstart: make the package at `rma` the active state without storing anything.
    pub fn load_exchange_package<B: MemoryBus>(
        &mut self,
        bus: &mut B,
        rma: u32,
        monitor: bool,
    ) -> Result<(), CoreError> {
        if rma & 7 != 0 {
            return Err(CoreError::MisalignedExchangePackage(rma));
        }
        let bus: &mut dyn MemoryBus = bus;
        let vmid = validate_package(bus, rma, monitor)?;
        self.load_package(bus, rma, monitor, vmid);
        self.pending = Default::default();
        if vmid == VMID_LEGACY {
            self.observe(|o, id| o.invalidate_legacy_cache(id));
        }
        Ok(())
    }

    /// Write the active state as an exchange package at `rma`, e.g. for a dump.
    pub fn store_exchange_package<B: MemoryBus>(&mut self, bus: &mut B, rma: u32) {
        self.store_package(bus, rma);
    }
}
