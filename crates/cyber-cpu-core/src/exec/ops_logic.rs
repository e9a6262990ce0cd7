use cyber_mem::MemoryBus;

use crate::state::Cpu;
use crate::ExecResult;

#[inline]
fn logical(cpu: &mut Cpu, f: impl FnOnce(u64, u64) -> u64) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.x[k] = f(cpu.x[k], cpu.x[j]);
    Ok(())
}

pub(super) fn iorx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    logical(cpu, |xk, xj| xk | xj)
}

pub(super) fn xorx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    logical(cpu, |xk, xj| xk ^ xj)
}

pub(super) fn andx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    logical(cpu, |xk, xj| xk & xj)
}

pub(super) fn notx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    logical(cpu, |_, xj| !xj)
}

/// Inhibit: clear in Xk the bits set in Xj.
pub(super) fn inhx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    logical(cpu, |xk, xj| xk & !xj)
}

/// Mark to boolean: bit 0 of Xk ← 1 if the low bytes of X1 and Xj are equal, else 0. The rest
/// of Xk is kept.
pub(super) fn mark(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let equal = (cpu.x[1] ^ cpu.x[j]) & 0xFF == 0;
    cpu.x[k] = (cpu.x[k] & !1) | u64::from(equal);
    Ok(())
}
