//! Register copies and immediate entries.

use cyber_mem::MemoryBus;
use cyber_mmu::{Pva, PVA_MASK};

use crate::bits::{right_half, sign_extend, with_right_half};
use crate::conditions::MonitorCondition;
use crate::state::Cpu;
use crate::ExecResult;

/// Xk ← free-running counter
pub(super) fn cpytx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    cpu.x[k] = cpu.free_running;
    Ok(())
}

/// Ak ← Aj, ring raised to the executing ring.
pub(super) fn cpyaa(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.a[k] = cpu.ring_adjust(cpu.a[j]);
    Ok(())
}

/// Ak ← Xj bits 0..=47, ring raised to the executing ring.
pub(super) fn cpyxa(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.a[k] = cpu.ring_adjust(Pva::from_bits(cpu.x[j] & PVA_MASK));
    Ok(())
}

pub(super) fn cpyax(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.x[k] = cpu.a[j].bits();
    Ok(())
}

pub(super) fn cpyrr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.x[k] = with_right_half(cpu.x[k], right_half(cpu.x[j]));
    Ok(())
}

pub(super) fn cpyxx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.x[k] = cpu.x[j];
    Ok(())
}

/// j selects ENTZ (Xk ← 0), ENTO (Xk ← all ones) or ENTS (Xk ← the sign of X1 in every bit).
pub(super) fn ent_fill(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.x[k] = match j {
        0 => 0,
        1 => u64::MAX,
        2 => ((cpu.x[1] as i64) >> 63) as u64,
        _ => return Err(cpu.fault_monitor(MonitorCondition::InstructionSpecification)),
    };
    Ok(())
}

/// Xk ← j
pub(super) fn entp(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (_, k) = cpu.jk();
    cpu.x[k] = u64::from(cpu.inst.j);
    Ok(())
}

/// Xk ← -j
pub(super) fn entn(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (_, k) = cpu.jk();
    cpu.x[k] = u64::from(cpu.inst.j).wrapping_neg();
    Ok(())
}

/// X0 ← jk, an unsigned 8-bit constant.
pub(super) fn entl(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.x[0] = u64::from((cpu.inst.j << 4) | cpu.inst.k);
    Ok(())
}

/// Xk ← j:Q sign extended from 20 bits.
pub(super) fn entc(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (_, k) = cpu.jk();
    let raw = (u64::from(cpu.inst.j) << 16) | u64::from(cpu.inst.q);
    cpu.x[k] = sign_extend(raw, 20);
    Ok(())
}

/// Xk ← Q sign extended.
pub(super) fn ente(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (_, k) = cpu.jk();
    cpu.x[k] = cpu.inst.q_signed() as u64;
    Ok(())
}

/// X0 ← j:k:Q sign extended from 24 bits.
pub(super) fn enta(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let raw = (u64::from(cpu.inst.j) << 20) | (u64::from(cpu.inst.k) << 16) | u64::from(cpu.inst.q);
    cpu.x[0] = sign_extend(raw, 24);
    Ok(())
}
