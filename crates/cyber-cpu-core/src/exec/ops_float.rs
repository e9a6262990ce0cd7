use cyber_mem::MemoryBus;

use super::ordering_word;
use crate::conditions::UserCondition;
use crate::float::{self, FloatFault};
use crate::state::Cpu;
use crate::ExecResult;

impl Cpu {
    /// Unwrap a floating result, raising its condition if there is none.
    pub(crate) fn float_result<T>(&mut self, result: Result<T, FloatFault>) -> Option<T> {
        let cond = match result {
            Ok(value) => return Some(value),
            Err(FloatFault::Indefinite) => UserCondition::FpIndefinite,
            Err(FloatFault::ExponentOverflow) => UserCondition::ExponentOverflow,
            Err(FloatFault::ExponentUnderflow) => UserCondition::ExponentUnderflow,
            Err(FloatFault::DivideByZero) => UserCondition::DivideFault,
            Err(FloatFault::IntegerOverflow) => UserCondition::ArithmeticOverflow,
        };
        self.raise_user(cond);
        None
    }
}

/// Xk ← Xk op Xj
fn binary(cpu: &mut Cpu, f: fn(u64, u64) -> Result<u64, FloatFault>) -> ExecResult {
    let (j, k) = cpu.jk();
    let result = f(cpu.x[k], cpu.x[j]);
    if let Some(value) = cpu.float_result(result) {
        cpu.x[k] = value;
    }
    Ok(())
}

/// Xk ← f(Xj)
fn unary(cpu: &mut Cpu, f: fn(u64) -> Result<u64, FloatFault>) -> ExecResult {
    let (j, k) = cpu.jk();
    let result = f(cpu.x[j]);
    if let Some(value) = cpu.float_result(result) {
        cpu.x[k] = value;
    }
    Ok(())
}

pub(super) fn addf(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    binary(cpu, float::add)
}

pub(super) fn subf(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    binary(cpu, float::sub)
}

pub(super) fn mulf(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    binary(cpu, float::mul)
}

pub(super) fn divf(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    binary(cpu, float::div)
}

pub(super) fn cnif(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    unary(cpu, float::from_integer)
}

pub(super) fn cnfi(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    unary(cpu, float::to_integer)
}

/// X1 ← -1, 0 or 1 comparing Xj with Xk.
pub(super) fn cmpf(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let result = float::compare(cpu.x[j], cpu.x[k]);
    if let Some(ord) = cpu.float_result(result) {
        cpu.x[1] = ordering_word(ord);
    }
    Ok(())
}
