//! Processor control: halt, exchange, interrupts, state-register copies, page table queries
//! and keypoints.

use cyber_mem::MemoryBus;
use cyber_mmu::{ExecutePrivilege, PVA_MASK};

use crate::bits::right_half;
use crate::conditions::{Action, MonitorCondition, UserCondition};
use crate::state::{Cpu, Flags, TrapControl};
use crate::ExecResult;

/// Registers reachable through CPYSX/CPYXS, by the number in Xj bits 0..=7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateRegister {
    Umr = 0x00,
    Ucr = 0x01,
    ProcessIntervalTimer = 0x02,
    Flags = 0x03,
    Mmr = 0x10,
    Mcr = 0x11,
    SystemIntervalTimer = 0x12,
    PageTableAddress = 0x13,
    PageTableLength = 0x14,
    PageSizeMask = 0x15,
    /// STL in bits 32..=43, STA in bits 0..=31.
    SegmentTable = 0x16,
    MonitorProcessState = 0x17,
    JobProcessState = 0x18,
    BaseConstant = 0x19,
    TrapPointer = 0x1A,
    DebugList = 0x1B,
    Lpid = 0x1C,
    KeypointCode = 0x1D,
    TrapControl = 0x1E,
    Uvmid = 0x1F,
}

impl StateRegister {
    pub fn from_number(n: u8) -> Option<Self> {
        Some(match n {
            0x00 => Self::Umr,
            0x01 => Self::Ucr,
            0x02 => Self::ProcessIntervalTimer,
            0x03 => Self::Flags,
            0x10 => Self::Mmr,
            0x11 => Self::Mcr,
            0x12 => Self::SystemIntervalTimer,
            0x13 => Self::PageTableAddress,
            0x14 => Self::PageTableLength,
            0x15 => Self::PageSizeMask,
            0x16 => Self::SegmentTable,
            0x17 => Self::MonitorProcessState,
            0x18 => Self::JobProcessState,
            0x19 => Self::BaseConstant,
            0x1A => Self::TrapPointer,
            0x1B => Self::DebugList,
            0x1C => Self::Lpid,
            0x1D => Self::KeypointCode,
            0x1E => Self::TrapControl,
            0x1F => Self::Uvmid,
            _ => return None,
        })
    }

    /// Registers numbered 0x10 and above are privileged.
    #[inline]
    pub fn is_privileged(self) -> bool {
        self as u8 >= 0x10
    }
}

impl Cpu {
    pub fn state_register(&self, reg: StateRegister) -> u64 {
        match reg {
            StateRegister::Umr => u64::from(self.umr),
            StateRegister::Ucr => u64::from(self.ucr),
            StateRegister::ProcessIntervalTimer => u64::from(self.pit),
            StateRegister::Flags => u64::from(self.flags.bits()),
            StateRegister::Mmr => u64::from(self.mmr),
            StateRegister::Mcr => u64::from(self.mcr),
            StateRegister::SystemIntervalTimer => u64::from(self.sit),
            StateRegister::PageTableAddress => u64::from(self.atu.page_table().0),
            StateRegister::PageTableLength => u64::from(self.atu.page_table().1),
            StateRegister::PageSizeMask => u64::from(self.atu.page_size_mask()),
            StateRegister::SegmentTable => {
                let (sta, stl) = self.atu.segment_table();
                (u64::from(stl) << 32) | u64::from(sta)
            }
            StateRegister::MonitorProcessState => u64::from(self.mps),
            StateRegister::JobProcessState => u64::from(self.jps),
            StateRegister::BaseConstant => self.base_constant,
            StateRegister::TrapPointer => self.trap_pointer,
            StateRegister::DebugList => self.debug_list,
            StateRegister::Lpid => u64::from(self.lpid),
            StateRegister::KeypointCode => self.keypoint_code,
            StateRegister::TrapControl => u64::from(self.trap.bits()),
            StateRegister::Uvmid => u64::from(self.uvmid),
        }
    }

    /// Write a state register. Condition register writes take effect immediately.
    pub fn set_state_register(&mut self, reg: StateRegister, value: u64) {
        match reg {
            StateRegister::Umr => self.umr = value as u16,
            StateRegister::Ucr => self.ucr = value as u16,
            StateRegister::ProcessIntervalTimer => self.pit = value as u32,
            StateRegister::Flags => self.flags = Flags::from_bits_truncate(value as u16),
            StateRegister::Mmr => self.mmr = value as u16,
            StateRegister::Mcr => self.mcr = value as u16,
            StateRegister::SystemIntervalTimer => self.sit = value as u32,
            StateRegister::PageTableAddress => {
                let (_, ptl) = self.atu.page_table();
                self.atu.set_page_table(value as u32, ptl);
            }
            StateRegister::PageTableLength => {
                let (pta, _) = self.atu.page_table();
                self.atu.set_page_table(pta, value as u8);
            }
            StateRegister::PageSizeMask => self.atu.set_page_size_mask(value as u8),
            StateRegister::SegmentTable => self
                .atu
                .set_segment_table(value as u32, ((value >> 32) & 0xFFF) as u16),
            StateRegister::MonitorProcessState => self.mps = value as u32,
            StateRegister::JobProcessState => self.jps = value as u32,
            StateRegister::BaseConstant => self.base_constant = value,
            StateRegister::TrapPointer => self.trap_pointer = value & PVA_MASK,
            StateRegister::DebugList => self.debug_list = value,
            StateRegister::Lpid => self.lpid = value as u8,
            StateRegister::KeypointCode => self.keypoint_code = value,
            StateRegister::TrapControl => {
                self.trap = TrapControl::from_bits_truncate(value as u16)
            }
            StateRegister::Uvmid => self.uvmid = (value & 0xF) as u8,
        }
        if matches!(
            reg,
            StateRegister::Ucr | StateRegister::Mcr | StateRegister::Umr | StateRegister::Mmr
                | StateRegister::TrapControl
        ) {
            self.rescan_out_of_band();
        }
    }

    fn decode_state_register(&mut self, number: u64) -> Result<StateRegister, crate::Abort> {
        let reg = StateRegister::from_number(number as u8)
            .ok_or_else(|| self.fault_monitor(MonitorCondition::InstructionSpecification))?;
        if reg.is_privileged() {
            self.require_privilege(ExecutePrivilege::LocalPrivileged)?;
        }
        Ok(reg)
    }
}

pub(super) fn halt(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.require_privilege(ExecutePrivilege::GlobalPrivileged)?;
    tracing::info!(cpu = cpu.id, p = %cpu.cur_p, "halt instruction");
    cpu.escalate(Action::Halt);
    Ok(())
}

pub(super) fn sync(_cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    std::sync::atomic::fence(std::sync::atomic::Ordering::SeqCst);
    Ok(())
}

/// Job mode: system call to the monitor. Monitor mode: exchange back to the job.
pub(super) fn exchange(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    if cpu.monitor_mode {
        cpu.escalate(Action::Exchange);
    } else {
        cpu.raise_monitor(MonitorCondition::SystemCall);
    }
    Ok(())
}

/// Post an external interrupt to the processor numbered by Xk.
pub(super) fn interrupt(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.require_privilege(ExecutePrivilege::LocalPrivileged)?;
    let k = usize::from(cpu.inst.k);
    cpu.interrupt_request = Some(right_half(cpu.x[k]) as usize);
    Ok(())
}

/// Xk ← state register numbered by Xj.
pub(super) fn cpysx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let reg = cpu.decode_state_register(cpu.x[j])?;
    cpu.x[k] = cpu.state_register(reg);
    Ok(())
}

/// State register numbered by Xj ← Xk.
pub(super) fn cpyxs(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let reg = cpu.decode_state_register(cpu.x[j])?;
    cpu.set_state_register(reg, cpu.x[k]);
    Ok(())
}

/// There are no translation buffers to purge.
pub(super) fn purge(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.require_privilege(ExecutePrivilege::LocalPrivileged)
}

/// Xk ← page table entry for the page holding Aj, or 0 if there is none.
pub(super) fn tpage(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.require_privilege(ExecutePrivilege::LocalPrivileged)?;
    let (j, k) = cpu.jk();
    cpu.x[k] = match cpu.atu.probe(bus, cpu.a[j]) {
        Ok(Some(hit)) => hit.entry.to_word(),
        Ok(None) | Err(_) => 0,
    };
    Ok(())
}

/// Xk ← index of the page table entry for the page holding Aj, or -1 if there is none.
pub(super) fn lpage(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.require_privilege(ExecutePrivilege::LocalPrivileged)?;
    let (j, k) = cpu.jk();
    cpu.x[k] = match cpu.atu.probe(bus, cpu.a[j]) {
        Ok(Some(hit)) => u64::from(hit.index),
        Ok(None) | Err(_) => u64::MAX,
    };
    Ok(())
}

/// Model-dependent algorithm S (the low opcode bits). This model defines none; every EXECUTE
/// is an instruction specification error for the monitor to emulate.
pub(super) fn execute(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let algorithm = cpu.inst.opcode & 7;
    tracing::debug!(cpu = cpu.id, algorithm, p = %cpu.cur_p, "execute algorithm not provided");
    Err(cpu.fault_monitor(MonitorCondition::InstructionSpecification))
}

/// Keypoint class j with code Xk.r + Q. Raises the keypoint condition when keypoints are
/// enabled and class j is selected by the keypoint mask.
pub(super) fn keypoint(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let class = j as u8;
    let code = right_half(cpu.x[k]).wrapping_add(u32::from(cpu.inst.q));
    tracing::trace!(cpu = cpu.id, class, code, p = %cpu.cur_p, "keypoint");
    cpu.observe(|o, id| o.on_keypoint(id, class, code));

    if cpu.trap.contains(TrapControl::KEYPOINT_ENABLE) && cpu.keypoint_mask & (0x8000 >> j) != 0 {
        cpu.keypoint_code = (u64::from(class) << 32) | u64::from(code);
        cpu.raise_user(UserCondition::Keypoint);
    }
    Ok(())
}
