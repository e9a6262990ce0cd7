use core::fmt;

use bitflags::bitflags;
use cyber_mmu::{Atu, Pva};

use crate::conditions::Action;
use crate::config::CpuConfig;
use crate::decode::Instruction;
use crate::legacy::{LegacyContext, LegacyStepper};
use crate::observer::CpuObserver;

/// VMID of the native instruction set.
pub const VMID_NATIVE: u8 = 0;
/// VMID of the 170-compatibility instruction set.
pub const VMID_LEGACY: u8 = 1;

bitflags! {
    /// Program-visible flags (exchange package word 2, bits 48..=63).
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u16 {
        const CRITICAL_FRAME = 1 << 15;
        const ON_CONDITION = 1 << 14;
    }
}

bitflags! {
    /// Trap control (exchange package word 3, bits 48..=63).
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct TrapControl: u16 {
        const TRAP_ENABLE = 1 << 15;
        const TRAP_ENABLE_DELAY = 1 << 14;
        const KEYPOINT_ENABLE = 1 << 13;
    }
}

/// Which instruction set the context is currently executing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IsaState {
    #[default]
    Native,
    Legacy(LegacyContext),
}

impl IsaState {
    #[inline]
    pub fn is_legacy(&self) -> bool {
        matches!(self, IsaState::Legacy(_))
    }

    #[inline]
    pub fn vmid(&self) -> u8 {
        match self {
            IsaState::Native => VMID_NATIVE,
            IsaState::Legacy(_) => VMID_LEGACY,
        }
    }
}

/// Complete architectural and staging state of one CYBER 180 processor.
pub struct Cpu {
    pub id: usize,

    pub p: Pva,
    pub key: u8,
    pub a: [Pva; 16],
    pub x: [u64; 16],

    pub uvmid: u8,
    pub flags: Flags,
    pub trap: TrapControl,
    pub umr: u16,
    pub mmr: u16,
    pub ucr: u16,
    pub mcr: u16,
    pub monitor_mode: bool,

    /// Segment/page table registers and page geometry.
    pub atu: Atu,
    /// Real address of the monitor exchange package.
    pub mps: u32,
    /// Real address of the job exchange package.
    pub jps: u32,
    pub pit: u32,
    pub sit: u32,
    pub base_constant: u64,
    /// PVA of the trap handler's code base pointer.
    pub trap_pointer: u64,
    pub debug_list: u64,
    pub debug_mask: u16,
    pub keypoint_mask: u16,
    /// Class (bits 32..=35) and code (bits 0..=31) of the last keypoint.
    pub keypoint_code: u64,
    pub lpid: u8,
    /// Largest ring number with a recorded top of stack.
    pub lrn: u8,
    /// Top-of-stack pointer for rings 1..=15.
    pub tos: [Pva; 15],

    pub pending: Action,
    pub inst: Instruction,
    pub cur_p: Pva,
    pub next_p: Pva,
    pub next_key: u8,
    pub stopped: bool,
    pub free_running: u64,
    pub retired: u64,
    /// Target processor of an INTRUPT instruction, for the machine to deliver.
    pub interrupt_request: Option<usize>,

    pub isa: IsaState,

    /// A handler is executing; conditions may redirect `next_p`.
    pub(crate) executing: bool,
    /// Every condition raised by the current instruction lets it complete.
    pub(crate) step_completes: bool,
    pub(crate) observer: Option<Box<dyn CpuObserver>>,
    pub(crate) legacy: Option<Box<dyn LegacyStepper>>,
}

impl fmt::Debug for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("id", &self.id)
            .field("p", &self.p)
            .field("key", &self.key)
            .field("monitor_mode", &self.monitor_mode)
            .field("vmid", &self.isa.vmid())
            .field("mcr", &format_args!("{:#06x}", self.mcr))
            .field("ucr", &format_args!("{:#06x}", self.ucr))
            .field("pending", &self.pending)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl Cpu {
    pub fn new(id: usize, config: &CpuConfig) -> Self {
        let p = Pva::new(config.start_ring, 0, 0);
        let mut atu = Atu::new();
        atu.set_page_size_mask(config.page_size_mask);
        Self {
            id,
            p,
            key: 0,
            a: [Pva::default(); 16],
            x: [0; 16],
            uvmid: 0,
            flags: Flags::empty(),
            trap: TrapControl::TRAP_ENABLE,
            umr: config.user_mask,
            mmr: config.monitor_mask,
            ucr: 0,
            mcr: 0,
            monitor_mode: true,
            atu,
            mps: config.monitor_exchange_package.unwrap_or(0),
            jps: config.job_exchange_package.unwrap_or(0),
            pit: 0,
            sit: 0,
            base_constant: 0,
            trap_pointer: 0,
            debug_list: 0,
            debug_mask: 0,
            keypoint_mask: 0,
            keypoint_code: 0,
            lpid: 0,
            lrn: 0,
            tos: [Pva::default(); 15],
            pending: Action::Continue,
            inst: Instruction::default(),
            cur_p: p,
            next_p: p,
            next_key: 0,
            stopped: config.start_halted,
            free_running: 0,
            retired: 0,
            interrupt_request: None,
            isa: IsaState::Native,
            executing: false,
            step_completes: true,
            observer: None,
            legacy: None,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn CpuObserver>) {
        self.observer = Some(observer);
    }

    pub fn set_legacy_stepper(&mut self, stepper: Box<dyn LegacyStepper>) {
        self.legacy = Some(stepper);
    }

    #[inline]
    pub(crate) fn observe(&mut self, f: impl FnOnce(&mut dyn CpuObserver, usize)) {
        if let Some(observer) = self.observer.as_deref_mut() {
            f(observer, self.id);
        }
    }

    /// Ring of the executing instruction.
    #[inline]
    pub fn ring(&self) -> u8 {
        self.p.ring()
    }

    /// Top of stack recorded for `ring` (1..=15).
    #[inline]
    pub fn top_of_stack(&self, ring: u8) -> Pva {
        self.tos
            .get(usize::from(ring).wrapping_sub(1))
            .copied()
            .unwrap_or_default()
    }

    #[inline]
    pub fn set_top_of_stack(&mut self, ring: u8, pva: Pva) {
        if let Some(slot) = self.tos.get_mut(usize::from(ring).wrapping_sub(1)) {
            *slot = pva;
        }
    }

    /// Copy of `pva` with its ring raised to at least the executing ring.
    #[inline]
    pub fn ring_adjust(&self, pva: Pva) -> Pva {
        pva.ring_at_least(self.cur_p.ring())
    }

    /// Restart a halted processor at its current state.
    pub fn restart(&mut self) {
        self.stopped = false;
        self.pending = Action::Continue;
    }
}
