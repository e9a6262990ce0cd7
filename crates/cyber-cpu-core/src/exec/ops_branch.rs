//! Branches and the call/return instructions.

use core::cmp::Ordering;

use cyber_mem::MemoryBus;

use crate::bits::right_half;
use crate::conditions::{MonitorCondition, UserCondition};
use crate::float;
use crate::state::Cpu;
use crate::ExecResult;

#[inline]
fn branch_if(cpu: &mut Cpu, taken: bool) -> ExecResult {
    if taken {
        cpu.next_p = cpu.cur_p.offset(2 * cpu.inst.q_signed());
    }
    Ok(())
}

fn compare_right(cpu: &Cpu) -> Ordering {
    let (j, k) = cpu.jk();
    (right_half(cpu.x[j]) as i32).cmp(&(right_half(cpu.x[k]) as i32))
}

fn compare_word(cpu: &Cpu) -> Ordering {
    let (j, k) = cpu.jk();
    (cpu.x[j] as i64).cmp(&(cpu.x[k] as i64))
}

pub(super) fn brreq(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let ord = compare_right(cpu);
    branch_if(cpu, ord.is_eq())
}

pub(super) fn brrne(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let ord = compare_right(cpu);
    branch_if(cpu, ord.is_ne())
}

pub(super) fn brrgt(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let ord = compare_right(cpu);
    branch_if(cpu, ord.is_gt())
}

pub(super) fn brrge(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let ord = compare_right(cpu);
    branch_if(cpu, ord.is_ge())
}

pub(super) fn brxeq(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let ord = compare_word(cpu);
    branch_if(cpu, ord.is_eq())
}

pub(super) fn brxne(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let ord = compare_word(cpu);
    branch_if(cpu, ord.is_ne())
}

pub(super) fn brxgt(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let ord = compare_word(cpu);
    branch_if(cpu, ord.is_gt())
}

pub(super) fn brxge(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let ord = compare_word(cpu);
    branch_if(cpu, ord.is_ge())
}

/// Floating compare of Xj with Xk; an invalid operand raises its condition and falls through.
fn branch_float(cpu: &mut Cpu, taken: fn(Ordering) -> bool) -> ExecResult {
    let (j, k) = cpu.jk();
    let result = float::compare(cpu.x[j], cpu.x[k]);
    match cpu.float_result(result) {
        Some(ord) => branch_if(cpu, taken(ord)),
        None => Ok(()),
    }
}

pub(super) fn brfeq(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    branch_float(cpu, Ordering::is_eq)
}

pub(super) fn brfne(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    branch_float(cpu, Ordering::is_ne)
}

pub(super) fn brfgt(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    branch_float(cpu, Ordering::is_gt)
}

pub(super) fn brfge(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    branch_float(cpu, Ordering::is_ge)
}

/// Xk ← Xk + 1, then branch while Xk < Xj.
pub(super) fn brinc(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    cpu.x[k] = cpu.x[k].wrapping_add(1);
    let taken = (cpu.x[k] as i64) < (cpu.x[j] as i64);
    branch_if(cpu, taken)
}

/// Branch if Aj and Ak name the same segment.
pub(super) fn brseg(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let taken = cpu.a[j].segment() == cpu.a[k].segment();
    branch_if(cpu, taken)
}

/// Test and clear condition bit j of UCR (k even) or MCR (k odd, monitor mode only), branching
/// if it was set.
pub(super) fn brcr(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let was_set = if k & 1 != 0 {
        if !cpu.monitor_mode {
            return Err(cpu.fault_user(UserCondition::PrivilegedInstruction));
        }
        let bit = MonitorCondition::from_ordinal(j as u8).bit();
        let set = cpu.mcr & bit != 0;
        cpu.mcr &= !bit;
        set
    } else {
        let bit = UserCondition::from_ordinal(j as u8).bit();
        let set = cpu.ucr & bit != 0;
        cpu.ucr &= !bit;
        set
    };
    branch_if(cpu, was_set)
}

/// P ← P + 2 * Xk.r
pub(super) fn brrel(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let parcels = i64::from(right_half(cpu.x[k]) as i32);
    cpu.next_p = cpu.cur_p.offset(2 * parcels);
    Ok(())
}

/// P ← Aj + Xk.r, never to a more privileged ring.
pub(super) fn brdir(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let target = cpu.a[j].offset(i64::from(right_half(cpu.x[k]) as i32));
    cpu.next_p = cpu.ring_adjust(target);
    Ok(())
}

pub(super) fn callrel(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.call_relative(bus)
}

pub(super) fn callseg(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.call_segment(bus)
}

pub(super) fn return_(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.return_from_call(bus)
}

pub(super) fn pop(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    cpu.pop_frame(bus)
}
