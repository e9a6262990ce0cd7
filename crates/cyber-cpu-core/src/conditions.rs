//! Monitor and user condition registers, their static action policy, and escalation of the
//! pending action.
//!
//! Condition ordinal `n` of a 16-bit condition register is bit `15 - n` (the architecture numbers
//! them 48..=63 within a word, MSB first).

use core::fmt;

use cyber_mem::MemoryBus;
use cyber_mmu::TranslateFault;

use crate::state::{Cpu, TrapControl};
use crate::Abort;

/// Outcome of a raised condition, ordered by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    #[default]
    Continue,
    /// Recorded; acted upon at the next exchange or trap return.
    Stack,
    Trap,
    Exchange,
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MonitorCondition {
    DetectedUncorrectableError = 0,
    NotAssigned = 1,
    ShortWarning = 2,
    InstructionSpecification = 3,
    AddressSpecification = 4,
    ExchangeRequest = 5,
    AccessViolation = 6,
    EnvironmentSpecification = 7,
    ExternalInterrupt = 8,
    PageTableSearchWithoutFind = 9,
    SystemCall = 10,
    SystemIntervalTimer = 11,
    InvalidSegmentRingZero = 12,
    OutwardCallInwardReturn = 13,
    SoftErrorLog = 14,
    TrapException = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UserCondition {
    PrivilegedInstruction = 0,
    UnimplementedInstruction = 1,
    FreeFlag = 2,
    ProcessIntervalTimer = 3,
    InterRingPop = 4,
    CriticalFrameFlag = 5,
    Keypoint = 6,
    DivideFault = 7,
    Debug = 8,
    ArithmeticOverflow = 9,
    ExponentOverflow = 10,
    ExponentUnderflow = 11,
    FpLossOfSignificance = 12,
    FpIndefinite = 13,
    ArithmeticLossOfSignificance = 14,
    InvalidBdpData = 15,
}

const MONITOR_ORDER: [MonitorCondition; 16] = [
    MonitorCondition::DetectedUncorrectableError,
    MonitorCondition::NotAssigned,
    MonitorCondition::ShortWarning,
    MonitorCondition::InstructionSpecification,
    MonitorCondition::AddressSpecification,
    MonitorCondition::ExchangeRequest,
    MonitorCondition::AccessViolation,
    MonitorCondition::EnvironmentSpecification,
    MonitorCondition::ExternalInterrupt,
    MonitorCondition::PageTableSearchWithoutFind,
    MonitorCondition::SystemCall,
    MonitorCondition::SystemIntervalTimer,
    MonitorCondition::InvalidSegmentRingZero,
    MonitorCondition::OutwardCallInwardReturn,
    MonitorCondition::SoftErrorLog,
    MonitorCondition::TrapException,
];

const USER_ORDER: [UserCondition; 16] = [
    UserCondition::PrivilegedInstruction,
    UserCondition::UnimplementedInstruction,
    UserCondition::FreeFlag,
    UserCondition::ProcessIntervalTimer,
    UserCondition::InterRingPop,
    UserCondition::CriticalFrameFlag,
    UserCondition::Keypoint,
    UserCondition::DivideFault,
    UserCondition::Debug,
    UserCondition::ArithmeticOverflow,
    UserCondition::ExponentOverflow,
    UserCondition::ExponentUnderflow,
    UserCondition::FpLossOfSignificance,
    UserCondition::FpIndefinite,
    UserCondition::ArithmeticLossOfSignificance,
    UserCondition::InvalidBdpData,
];

impl MonitorCondition {
    #[inline]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Bit within MCR/MMR.
    #[inline]
    pub const fn bit(self) -> u16 {
        0x8000 >> self as u8
    }

    pub const fn from_ordinal(n: u8) -> Self {
        MONITOR_ORDER[(n & 0xF) as usize]
    }

    #[inline]
    pub const fn policy(self) -> Policy {
        MONITOR_POLICY[self as usize]
    }

    /// Condition raised for a translation failure.
    pub const fn for_fault(fault: &TranslateFault) -> Self {
        match fault {
            TranslateFault::AddressSpecification(_) => Self::AddressSpecification,
            TranslateFault::InvalidSegment(_) => Self::InvalidSegmentRingZero,
            TranslateFault::AccessViolation(_) => Self::AccessViolation,
            TranslateFault::PageFault(_) => Self::PageTableSearchWithoutFind,
        }
    }
}

impl UserCondition {
    #[inline]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Bit within UCR/UMR.
    #[inline]
    pub const fn bit(self) -> u16 {
        0x8000 >> self as u8
    }

    pub const fn from_ordinal(n: u8) -> Self {
        USER_ORDER[(n & 0xF) as usize]
    }

    #[inline]
    pub const fn policy(self) -> Policy {
        USER_POLICY[self as usize]
    }
}

/// Either class of condition, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Monitor(MonitorCondition),
    User(UserCondition),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Monitor(c) => write!(f, "MCR{} {:?}", 48 + c.ordinal(), c),
            Condition::User(c) => write!(f, "UCR{} {:?}", 48 + c.ordinal(), c),
        }
    }
}

/// Static per-condition policy row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// The instruction that raised the condition is considered complete.
    pub completes: bool,
    /// For actions beyond [`Action::Stack`], resume at the raising instruction.
    pub retain_p: bool,
    /// Action when the condition's mask bit is clear.
    pub no_mask: Action,
    /// Job mode, indexed by `[trap enabled, trap disabled]`.
    pub job: [Action; 2],
    /// Monitor mode, indexed by `[trap enabled, trap disabled]`.
    pub monitor: [Action; 2],
}

impl Policy {
    /// Select the action for the given mask and mode state.
    #[inline]
    pub const fn action(&self, masked_in: bool, monitor_mode: bool, trap_enabled: bool) -> Action {
        if !masked_in {
            return self.no_mask;
        }
        let column = if trap_enabled { 0 } else { 1 };
        if monitor_mode {
            self.monitor[column]
        } else {
            self.job[column]
        }
    }
}

use Action::{Continue as C, Exchange as X, Halt as H, Stack as S, Trap as T};

const fn row(
    completes: bool,
    retain_p: bool,
    no_mask: Action,
    job: [Action; 2],
    monitor: [Action; 2],
) -> Policy {
    Policy {
        completes,
        retain_p,
        no_mask,
        job,
        monitor,
    }
}

/// Hardware/privileged faults: resume at the faulting instruction once handled.
const MONITOR_ERROR: Policy = row(false, true, H, [X, X], [T, H]);
/// Interrupt-class conditions: the current instruction completes first.
const MONITOR_INTERRUPT: Policy = row(true, false, S, [X, X], [T, S]);

pub const MONITOR_POLICY: [Policy; 16] = [
    row(false, true, H, [X, X], [H, H]), // detected uncorrectable error
    row(true, false, C, [C, C], [C, C]), // not assigned
    MONITOR_INTERRUPT,                   // short warning
    MONITOR_ERROR,                       // instruction specification
    MONITOR_ERROR,                       // address specification
    row(true, false, S, [X, X], [S, S]), // exchange request
    MONITOR_ERROR,                       // access violation
    MONITOR_ERROR,                       // environment specification
    MONITOR_INTERRUPT,                   // external interrupt
    MONITOR_ERROR,                       // page table search without find
    row(true, false, X, [X, X], [T, H]), // system call
    MONITOR_INTERRUPT,                   // system interval timer
    MONITOR_ERROR,                       // invalid segment / ring zero
    MONITOR_ERROR,                       // outward call / inward return
    MONITOR_INTERRUPT,                   // soft error log
    row(false, true, H, [X, X], [H, H]), // trap exception
];

/// Program faults that cannot be masked off.
const USER_FAULT: Policy = row(false, true, T, [T, X], [T, H]);
/// Arithmetic results: the destination is left unchanged but the instruction completes.
const USER_ARITH: Policy = row(true, false, C, [T, S], [T, H]);
/// Informational conditions.
const USER_NOTE: Policy = row(true, false, C, [T, S], [T, S]);

pub const USER_POLICY: [Policy; 16] = [
    USER_FAULT,                          // privileged instruction
    USER_FAULT,                          // unimplemented instruction
    USER_NOTE,                           // free flag
    row(true, false, S, [T, S], [S, S]), // process interval timer
    USER_FAULT,                          // inter-ring pop
    USER_FAULT,                          // critical frame flag
    USER_NOTE,                           // keypoint
    USER_ARITH,                          // divide fault
    USER_NOTE,                           // debug
    USER_ARITH,                          // arithmetic overflow
    USER_ARITH,                          // exponent overflow
    USER_ARITH,                          // exponent underflow
    USER_ARITH,                          // FP loss of significance
    USER_ARITH,                          // FP indefinite
    USER_ARITH,                          // arithmetic loss of significance
    USER_ARITH,                          // invalid BDP data
];

impl Cpu {
    #[inline]
    fn trap_enabled(&self) -> bool {
        self.trap.contains(TrapControl::TRAP_ENABLE)
    }

    /// Current action for a monitor condition, as if it were raised now.
    pub fn monitor_action(&self, cond: MonitorCondition) -> Action {
        cond.policy().action(
            self.mmr & cond.bit() != 0,
            self.monitor_mode,
            self.trap_enabled(),
        )
    }

    /// Current action for a user condition, as if it were raised now.
    pub fn user_action(&self, cond: UserCondition) -> Action {
        cond.policy()
            .action(self.umr & cond.bit() != 0, self.monitor_mode, self.trap_enabled())
    }

    /// Raise the pending action to `action` if that is more severe.
    pub fn escalate(&mut self, action: Action) {
        if action > self.pending {
            self.pending = action;
        }
    }

    fn apply(&mut self, cond: Condition, policy: Policy, action: Action) {
        if !policy.completes {
            self.step_completes = false;
        }
        if self.executing && action > Action::Stack && policy.retain_p {
            self.next_p = self.cur_p;
            self.next_key = self.key;
        }
        self.escalate(action);
        tracing::trace!(cpu = self.id, condition = %cond, ?action, p = %self.cur_p, "condition raised");
        self.observe(|o, id| o.on_condition(id, cond, action));
    }

    /// Set a monitor condition bit and escalate per its policy.
    pub fn raise_monitor(&mut self, cond: MonitorCondition) {
        self.mcr |= cond.bit();
        let action = self.monitor_action(cond);
        self.apply(Condition::Monitor(cond), cond.policy(), action);
    }

    /// Set a user condition bit and escalate per its policy.
    pub fn raise_user(&mut self, cond: UserCondition) {
        self.ucr |= cond.bit();
        let action = self.user_action(cond);
        self.apply(Condition::User(cond), cond.policy(), action);
    }

    /// Raise `cond` and return the abort marker, for use as `return Err(cpu.fault_monitor(..))`.
    #[inline]
    pub(crate) fn fault_monitor(&mut self, cond: MonitorCondition) -> Abort {
        self.raise_monitor(cond);
        Abort
    }

    #[inline]
    pub(crate) fn fault_user(&mut self, cond: UserCondition) -> Abort {
        self.raise_user(cond);
        Abort
    }

    /// Raise the monitor condition matching a translation failure.
    pub(crate) fn fault_translation(&mut self, fault: &TranslateFault) -> Abort {
        self.fault_monitor(MonitorCondition::for_fault(fault))
    }

    /// Re-raise every condition still set in MCR and UCR, lowest ordinal first.
    pub fn rescan_conditions(&mut self) {
        for n in 0..16u8 {
            let cond = MonitorCondition::from_ordinal(n);
            if self.mcr & cond.bit() != 0 {
                self.raise_monitor(cond);
            }
        }
        for n in 0..16u8 {
            let cond = UserCondition::from_ordinal(n);
            if self.ucr & cond.bit() != 0 {
                self.raise_user(cond);
            }
        }
    }

    /// Rescan from inside a handler without redirecting `next_p` or uncounting the instruction.
    pub(crate) fn rescan_out_of_band(&mut self) {
        let executing = core::mem::replace(&mut self.executing, false);
        let completes = self.step_completes;
        self.rescan_conditions();
        self.executing = executing;
        self.step_completes = completes;
    }

    /// Condition bits whose current action delivers them to a trap handler.
    pub(crate) fn deliverable_conditions(&self) -> (u16, u16) {
        let mut mcr = 0;
        let mut ucr = 0;
        for n in 0..16u8 {
            let m = MonitorCondition::from_ordinal(n);
            if self.mcr & m.bit() != 0 && self.monitor_action(m) >= Action::Trap {
                mcr |= m.bit();
            }
            let u = UserCondition::from_ordinal(n);
            if self.ucr & u.bit() != 0 && self.user_action(u) >= Action::Trap {
                ucr |= u.bit();
            }
        }
        (mcr, ucr)
    }

    /// Resolve the pending action at the start of a step. Returns `true` if execution may
    /// proceed with the fetch.
    pub(crate) fn resolve_pending(&mut self, bus: &mut dyn MemoryBus) -> bool {
        let action = core::mem::take(&mut self.pending);
        match action {
            Action::Continue | Action::Stack => {}
            Action::Trap => self.trap_entry(bus),
            Action::Exchange => self.exchange(bus),
            Action::Halt => {
                self.stopped = true;
                tracing::warn!(cpu = self.id, p = %self.p, mcr = self.mcr, ucr = self.ucr, "processor halted");
            }
        }
        !self.stopped && self.pending < Action::Trap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinals_map_to_msb_first_bits() {
        assert_eq!(MonitorCondition::DetectedUncorrectableError.bit(), 0x8000);
        assert_eq!(MonitorCondition::TrapException.bit(), 0x0001);
        assert_eq!(UserCondition::DivideFault.bit(), 0x0100);
        for n in 0..16 {
            assert_eq!(MonitorCondition::from_ordinal(n).ordinal(), n);
            assert_eq!(UserCondition::from_ordinal(n).ordinal(), n);
        }
    }

    #[test]
    fn severity_order() {
        assert!(Action::Continue < Action::Stack);
        assert!(Action::Stack < Action::Trap);
        assert!(Action::Trap < Action::Exchange);
        assert!(Action::Exchange < Action::Halt);
    }

    #[test]
    fn policy_columns() {
        let p = MonitorCondition::AccessViolation.policy();
        assert_eq!(p.action(false, false, true), Action::Halt);
        assert_eq!(p.action(true, false, true), Action::Exchange);
        assert_eq!(p.action(true, true, true), Action::Trap);
        assert_eq!(p.action(true, true, false), Action::Halt);

        let p = UserCondition::ArithmeticOverflow.policy();
        assert_eq!(p.action(false, false, true), Action::Continue);
        assert_eq!(p.action(true, false, true), Action::Trap);
        assert_eq!(p.action(true, false, false), Action::Stack);
    }

    #[test]
    fn error_conditions_retain_p_and_interrupts_complete() {
        assert!(MonitorCondition::PageTableSearchWithoutFind.policy().retain_p);
        assert!(!MonitorCondition::PageTableSearchWithoutFind.policy().completes);
        assert!(MonitorCondition::ExternalInterrupt.policy().completes);
        assert!(!MonitorCondition::ExternalInterrupt.policy().retain_p);
        assert!(UserCondition::DivideFault.policy().completes);
    }
}
