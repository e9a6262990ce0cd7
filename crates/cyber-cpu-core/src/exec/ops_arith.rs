//! Integer arithmetic on X registers (full words and 32-bit right halves) and A-register
//! address arithmetic.
//!
//! Results that overflow or divide by zero raise their user condition and leave the
//! destination unchanged.

use cyber_mem::MemoryBus;

use crate::bits::{
    add32, add64, div32, div64, mul32, mul64, right_half, sub32, sub64, with_right_half,
    ArithFault,
};
use crate::state::Cpu;
use crate::ExecResult;

use super::ordering_word;

type Op32 = fn(u32, u32) -> Result<u32, ArithFault>;
type Op64 = fn(u64, u64) -> Result<u64, ArithFault>;

/// Xk.r ← Xk.r op `rhs`.
fn right_half_op(cpu: &mut Cpu, rhs: u32, f: Op32) -> ExecResult {
    let (_, k) = cpu.jk();
    let result = f(right_half(cpu.x[k]), rhs).map(u64::from);
    if let Some(value) = cpu.arith(result) {
        cpu.x[k] = with_right_half(cpu.x[k], value as u32);
    }
    Ok(())
}

/// Xk ← Xk op `rhs`.
fn word_op(cpu: &mut Cpu, rhs: u64, f: Op64) -> ExecResult {
    let (_, k) = cpu.jk();
    if let Some(value) = cpu.arith(f(cpu.x[k], rhs)) {
        cpu.x[k] = value;
    }
    Ok(())
}

/// Xk.r ← Xj.r op Q.
fn right_half_q(cpu: &mut Cpu, f: Op32) -> ExecResult {
    let (j, k) = cpu.jk();
    let q = cpu.inst.q_signed() as u32;
    let result = f(right_half(cpu.x[j]), q).map(u64::from);
    if let Some(value) = cpu.arith(result) {
        cpu.x[k] = with_right_half(cpu.x[k], value as u32);
    }
    Ok(())
}

/// Xk ← Xj op Q.
fn word_q(cpu: &mut Cpu, f: Op64) -> ExecResult {
    let (j, k) = cpu.jk();
    let q = cpu.inst.q_signed() as u64;
    if let Some(value) = cpu.arith(f(cpu.x[j], q)) {
        cpu.x[k] = value;
    }
    Ok(())
}

pub(super) fn addr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = right_half(cpu.x[usize::from(cpu.inst.j)]);
    right_half_op(cpu, rhs, add32)
}

pub(super) fn subr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = right_half(cpu.x[usize::from(cpu.inst.j)]);
    right_half_op(cpu, rhs, sub32)
}

pub(super) fn mulr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = right_half(cpu.x[usize::from(cpu.inst.j)]);
    right_half_op(cpu, rhs, mul32)
}

pub(super) fn divr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = right_half(cpu.x[usize::from(cpu.inst.j)]);
    right_half_op(cpu, rhs, div32)
}

pub(super) fn addx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = cpu.x[usize::from(cpu.inst.j)];
    word_op(cpu, rhs, add64)
}

pub(super) fn subx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = cpu.x[usize::from(cpu.inst.j)];
    word_op(cpu, rhs, sub64)
}

pub(super) fn mulx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = cpu.x[usize::from(cpu.inst.j)];
    word_op(cpu, rhs, mul64)
}

pub(super) fn divx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = cpu.x[usize::from(cpu.inst.j)];
    word_op(cpu, rhs, div64)
}

pub(super) fn incx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = u64::from(cpu.inst.j);
    word_op(cpu, rhs, add64)
}

pub(super) fn decx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = u64::from(cpu.inst.j);
    word_op(cpu, rhs, sub64)
}

pub(super) fn incr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = u32::from(cpu.inst.j);
    right_half_op(cpu, rhs, add32)
}

pub(super) fn decr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let rhs = u32::from(cpu.inst.j);
    right_half_op(cpu, rhs, sub32)
}

pub(super) fn addrq(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    right_half_q(cpu, add32)
}

pub(super) fn mulrq(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    right_half_q(cpu, mul32)
}

pub(super) fn addxq(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    word_q(cpu, add64)
}

pub(super) fn mulxq(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    word_q(cpu, mul64)
}

/// X1 ← -1, 0 or 1 as Xj.r is less than, equal to or greater than Xk.r.
pub(super) fn cmpr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let lhs = right_half(cpu.x[j]) as i32;
    let rhs = right_half(cpu.x[k]) as i32;
    cpu.x[1] = ordering_word(lhs.cmp(&rhs));
    Ok(())
}

pub(super) fn cmpx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.x[1] = ordering_word((cpu.x[j] as i64).cmp(&(cpu.x[k] as i64)));
    Ok(())
}

/// Ak ← Ak + Xj.r
pub(super) fn addax(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let delta = i64::from(right_half(cpu.x[j]) as i32);
    cpu.a[k] = cpu.a[k].offset(delta);
    Ok(())
}

/// Ak ← Aj + Q
pub(super) fn addaq(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.a[k] = cpu.a[j].offset(cpu.inst.q_signed());
    Ok(())
}

/// Ak ← P + Xj.r + Q
pub(super) fn addpxq(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let delta = i64::from(right_half(cpu.x[j]) as i32) + cpu.inst.q_signed();
    cpu.a[k] = cpu.cur_p.offset(delta);
    Ok(())
}

/// Ak ← Aj + index(i) + D
pub(super) fn addad(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    cpu.a[k] = cpu.indexed_operand(1);
    Ok(())
}
