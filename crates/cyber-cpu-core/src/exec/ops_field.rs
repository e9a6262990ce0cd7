//! Shifts and bit-field isolate/insert. The shift count or field descriptor comes from
//! index(i) + D.

use cyber_mem::MemoryBus;

use crate::bits::{
    right_half, shift_arithmetic, shift_circular, shift_logical, with_right_half, BitField,
};
use crate::conditions::MonitorCondition;
use crate::state::Cpu;
use crate::ExecResult;

impl Cpu {
    /// Shift count: the low eight bits of index(i) + D, signed; negative shifts right.
    fn shift_count(&self) -> i32 {
        let raw = self.index_i() + i64::from(self.inst.d);
        i32::from(raw as u8 as i8)
    }

    fn field(&mut self) -> Result<BitField, crate::Abort> {
        let raw = self.index_i() + i64::from(self.inst.d);
        BitField::from_descriptor(raw as u32)
            .ok_or_else(|| self.fault_monitor(MonitorCondition::InstructionSpecification))
    }
}

pub(super) fn shfc(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.x[k] = shift_circular(cpu.x[j], cpu.shift_count());
    Ok(())
}

pub(super) fn shfx(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.x[k] = shift_arithmetic(cpu.x[j], cpu.shift_count());
    Ok(())
}

/// Logical shift of the 32-bit right half.
pub(super) fn shfr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let count = cpu.shift_count();
    let shifted = match count {
        -31..=31 => shift_logical(u64::from(right_half(cpu.x[j])), count) as u32,
        _ => 0,
    };
    cpu.x[k] = with_right_half(cpu.x[k], shifted);
    Ok(())
}

/// Xk ← mask of the field.
pub(super) fn isom(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let field = cpu.field()?;
    cpu.x[k] = field.mask();
    Ok(())
}

/// Xk ← field of Xj, right justified.
pub(super) fn isob(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let field = cpu.field()?;
    cpu.x[k] = field.isolate(cpu.x[j]);
    Ok(())
}

/// Field of Xk ← low bits of Xj.
pub(super) fn insb(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let field = cpu.field()?;
    cpu.x[k] = field.insert(cpu.x[k], cpu.x[j]);
    Ok(())
}
