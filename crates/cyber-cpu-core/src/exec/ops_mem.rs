//! Loads and stores of A and X registers, byte strings and single bits.

use cyber_mem::MemoryBus;
use cyber_mmu::{Access, Pva, PVA_MASK};

use crate::bits::{right_half, BIT_SELECTORS};
use crate::conditions::MonitorCondition;
use crate::state::Cpu;
use crate::ExecResult;

#[inline]
fn pva_of(word: u64) -> Pva {
    Pva::from_bits(word & PVA_MASK)
}

/// Aj + 8Q
fn word_operand(cpu: &Cpu) -> Pva {
    cpu.a[usize::from(cpu.inst.j)].offset(8 * cpu.inst.q_signed())
}

/// Byte holding the bit addressed by Aj + Q with bit offset X0.r, and the bit's MSB-first
/// position within that byte.
fn bit_operand(cpu: &Cpu, q: i64) -> (Pva, u32) {
    let offset = i64::from(right_half(cpu.x[0]) as i32);
    let byte = cpu.a[usize::from(cpu.inst.j)].offset(q + (offset >> 3));
    (byte, (offset & 7) as u32)
}

pub(super) fn lx(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    cpu.x[k] = cpu.load_word(bus, word_operand(cpu))?;
    Ok(())
}

pub(super) fn sx(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    cpu.store_word(bus, word_operand(cpu), cpu.x[k])
}

pub(super) fn la(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let word = cpu.load_word(bus, word_operand(cpu))?;
    cpu.a[k] = cpu.ring_adjust(pva_of(word));
    Ok(())
}

pub(super) fn sa(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    cpu.store_word(bus, word_operand(cpu), cpu.a[k].bits())
}

pub(super) fn lai(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let word = cpu.load_word(bus, cpu.indexed_operand(8))?;
    cpu.a[k] = cpu.ring_adjust(pva_of(word));
    Ok(())
}

pub(super) fn sai(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    cpu.store_word(bus, cpu.indexed_operand(8), cpu.a[k].bits())
}

pub(super) fn lxi(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    cpu.x[k] = cpu.load_word(bus, cpu.indexed_operand(8))?;
    Ok(())
}

pub(super) fn sxi(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    cpu.store_word(bus, cpu.indexed_operand(8), cpu.x[k])
}

/// Xk ← (X0 & 7) + 1 bytes at Aj + index(i) + D, right justified.
pub(super) fn lbyt(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let len = (cpu.x[0] & 7) as usize + 1;
    cpu.x[k] = cpu.load_bytes(bus, cpu.indexed_operand(1), len)?;
    Ok(())
}

pub(super) fn sbyt(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let len = (cpu.x[0] & 7) as usize + 1;
    cpu.store_bytes(bus, cpu.indexed_operand(1), len, cpu.x[k])
}

/// As LBYT with the length taken from the opcode.
pub(super) fn lbyts(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let len = cpu.inst.s_length();
    cpu.x[k] = cpu.load_bytes(bus, cpu.indexed_operand(1), len)?;
    Ok(())
}

pub(super) fn sbyts(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let len = cpu.inst.s_length();
    cpu.store_bytes(bus, cpu.indexed_operand(1), len, cpu.x[k])
}

pub(super) fn lbit(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let (byte, bit) = bit_operand(cpu, cpu.inst.q_signed());
    let value = cpu.load_bytes(bus, byte, 1)?;
    cpu.x[k] = (value >> (7 - bit)) & 1;
    Ok(())
}

pub(super) fn sbit(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let (byte, bit) = bit_operand(cpu, cpu.inst.q_signed());
    let old = cpu.load_bytes(bus, byte, 1)?;
    let mask = 0x80u64 >> bit;
    let new = if cpu.x[k] & 1 != 0 {
        old | mask
    } else {
        old & !mask
    };
    cpu.store_bytes(bus, byte, 1, new)
}

/// Atomically set the bit at Aj with bit offset X0.r; Xk ← its previous value.
pub(super) fn lbset(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let (byte, bit) = bit_operand(cpu, 0);
    let rma = cpu.translate(bus, byte, Access::READ | Access::WRITE)?;
    let mask = BIT_SELECTORS[(rma & 7) as usize * 8 + bit as usize];
    let old = bus.read_modify_write(rma & !7, &mut |word| word | mask);
    cpu.x[k] = u64::from(old & mask != 0);
    Ok(())
}

/// Compare and swap the word at Aj + 8Q. Equal to X0: the word ← Xk and X1 ← 0. Otherwise
/// X0 ← the word and X1 ← 1.
pub(super) fn cmpxa(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let k = usize::from(cpu.inst.k);
    let at = word_operand(cpu);
    if at.bn() & 7 != 0 {
        cpu.atu.set_untranslatable_pointer(at);
        return Err(cpu.fault_monitor(MonitorCondition::AddressSpecification));
    }
    let rma = cpu.translate(bus, at, Access::READ | Access::WRITE)?;
    let (expected, new) = (cpu.x[0], cpu.x[k]);
    let old = bus.read_modify_write(rma, &mut |word| if word == expected { new } else { word });
    if old == expected {
        cpu.x[1] = 0;
    } else {
        cpu.x[0] = old;
        cpu.x[1] = 1;
    }
    Ok(())
}

/// Register ranges named by the descriptor in Xk: As..=At (bits 8..=15) and Xs..=Xt
/// (bits 0..=7).
fn multiple_ranges(
    descriptor: u64,
) -> (
    core::ops::RangeInclusive<usize>,
    core::ops::RangeInclusive<usize>,
) {
    let nibble = |shift: u32| ((descriptor >> shift) & 0xF) as usize;
    (nibble(12)..=nibble(8), nibble(4)..=nibble(0))
}

/// Load As..=At then Xs..=Xt from consecutive words at Aj + 8Q.
pub(super) fn lmult(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let (a_range, x_range) = multiple_ranges(cpu.x[usize::from(cpu.inst.k)]);
    let mut at = word_operand(cpu);
    let mut words = Vec::with_capacity(32);
    for _ in a_range.clone().chain(x_range.clone()) {
        words.push(cpu.load_word(bus, at)?);
        at = at.offset(8);
    }

    let mut words = words.into_iter();
    for (i, word) in a_range.zip(words.by_ref()) {
        cpu.a[i] = cpu.ring_adjust(pva_of(word));
    }
    for (i, word) in x_range.zip(words) {
        cpu.x[i] = word;
    }
    Ok(())
}

pub(super) fn smult(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let (a_range, x_range) = multiple_ranges(cpu.x[usize::from(cpu.inst.k)]);
    let mut at = word_operand(cpu);
    let words: Vec<u64> = a_range
        .map(|i| cpu.a[i].bits())
        .chain(x_range.map(|i| cpu.x[i]))
        .collect();
    for word in words {
        cpu.store_word(bus, at, word)?;
        at = at.offset(8);
    }
    Ok(())
}
