//! Byte block move, compare, translate, scan and edit. The source (Aj) length is X0 and the
//! destination (Ak) length X1, both the low nine bits capped at 256. The shorter operand is
//! padded with spaces.
//!
//! The table-driven instructions take their table from Ai + D.

use core::cmp::Ordering;

use cyber_mem::MemoryBus;
use cyber_mmu::Pva;

use super::ordering_word;
use crate::conditions::MonitorCondition;
use crate::state::Cpu;
use crate::{Abort, ExecResult};

const MAX_BLOCK: usize = 256;
const FILL: u8 = 0x20;

fn block_length(x: u64) -> usize {
    ((x & 0x1FF) as usize).min(MAX_BLOCK)
}

fn table_operand(cpu: &Cpu) -> Pva {
    cpu.a[usize::from(cpu.inst.i)].offset(i64::from(cpu.inst.d))
}

fn read_table(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> Result<[u8; 256], Abort> {
    let mut table = [0u8; 256];
    cpu.read_virtual(bus, table_operand(cpu), &mut table)?;
    Ok(table)
}

pub(super) fn movb(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let src_len = block_length(cpu.x[0]);
    let dst_len = block_length(cpu.x[1]);

    let mut buf = [FILL; MAX_BLOCK];
    let copied = src_len.min(dst_len);
    cpu.read_virtual(bus, cpu.a[j], &mut buf[..copied])?;
    cpu.write_virtual(bus, cpu.a[k], &buf[..dst_len])
}

fn compare(cpu: &mut Cpu, bus: &mut dyn MemoryBus, collate: Option<&[u8; 256]>) -> ExecResult {
    let (j, k) = cpu.jk();
    let lhs_len = block_length(cpu.x[0]);
    let rhs_len = block_length(cpu.x[1]);
    let len = lhs_len.max(rhs_len);

    let mut lhs = [FILL; MAX_BLOCK];
    let mut rhs = [FILL; MAX_BLOCK];
    cpu.read_virtual(bus, cpu.a[j], &mut lhs[..lhs_len])?;
    cpu.read_virtual(bus, cpu.a[k], &mut rhs[..rhs_len])?;

    let key = |b: u8| collate.map_or(b, |table| table[usize::from(b)]);
    let mismatch = lhs[..len]
        .iter()
        .zip(&rhs[..len])
        .position(|(&l, &r)| key(l) != key(r));
    let (ord, index) = match mismatch {
        Some(i) => (key(lhs[i]).cmp(&key(rhs[i])), i),
        None => (Ordering::Equal, len),
    };
    cpu.x[0] = ordering_word(ord);
    cpu.x[1] = index as u64;
    Ok(())
}

/// X0 ← -1, 0 or 1 for Aj less than, equal to or greater than Ak; X1 ← index of the first
/// differing byte (the compared length when equal).
pub(super) fn cmpb(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    compare(cpu, bus, None)
}

/// CMPB with every byte, padding included, mapped through the collating table first.
pub(super) fn cmpc(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let table = read_table(cpu, bus)?;
    compare(cpu, bus, Some(&table))
}

/// Ak ← the bytes at Aj mapped through the table. Padding spaces are translated too.
pub(super) fn tranb(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let table = read_table(cpu, bus)?;
    let src_len = block_length(cpu.x[0]);
    let dst_len = block_length(cpu.x[1]);

    let mut buf = [FILL; MAX_BLOCK];
    let copied = src_len.min(dst_len);
    cpu.read_virtual(bus, cpu.a[j], &mut buf[..copied])?;
    for b in &mut buf[..dst_len] {
        *b = table[usize::from(*b)];
    }
    cpu.write_virtual(bus, cpu.a[k], &buf[..dst_len])
}

/// Scan the bytes at Aj for the first member of the 256-bit set at Ai + D (bit b, MSB first,
/// stands for byte value b). X1 ← its index and X0 ← its value, or X1 ← the scanned length and
/// X0 ← -1 when there is none.
pub(super) fn scnb(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let j = usize::from(cpu.inst.j);
    let len = block_length(cpu.x[0]);
    let mut set = [0u8; 32];
    cpu.read_virtual(bus, table_operand(cpu), &mut set)?;
    let mut buf = [0u8; MAX_BLOCK];
    cpu.read_virtual(bus, cpu.a[j], &mut buf[..len])?;

    let member = |b: u8| set[usize::from(b >> 3)] & (0x80 >> (b & 7)) != 0;
    match buf[..len].iter().position(|&b| member(b)) {
        Some(i) => {
            cpu.x[0] = u64::from(buf[i]);
            cpu.x[1] = i as u64;
        }
        None => {
            cpu.x[0] = u64::MAX;
            cpu.x[1] = len as u64;
        }
    }
    Ok(())
}

const EDIT_END: u8 = 0x0;
const EDIT_SUPPRESS: u8 = 0x1;
const EDIT_MOVE: u8 = 0x2;
const EDIT_INSERT: u8 = 0x3;
const EDIT_SKIP: u8 = 0x4;
const EDIT_FILL: u8 = 0x5;

struct Editor<'a> {
    src: &'a [u8],
    next: usize,
    out: Vec<u8>,
    fill: u8,
    significant: bool,
}

impl Editor<'_> {
    fn move_bytes(&mut self, n: usize, suppress: bool) -> bool {
        let src = self.src;
        let Some(bytes) = src.get(self.next..self.next + n) else {
            return false;
        };
        self.next += n;
        for &b in bytes {
            if suppress && !self.significant && b == b'0' {
                self.out.push(self.fill);
            } else {
                self.significant = true;
                self.out.push(b);
            }
        }
        true
    }

    fn insert(&mut self, literal: u8, n: usize) {
        let b = if self.significant { literal } else { self.fill };
        self.out.extend(core::iter::repeat(b).take(n));
    }

    fn skip(&mut self, n: usize) -> bool {
        if self.next + n > self.src.len() {
            return false;
        }
        self.next += n;
        true
    }
}

/// Edit the bytes at Aj into the bytes at Ak under the mask at Ai + D. Each mask byte holds an
/// operation (high nibble) and a count n (low nibble):
///
/// | Op | Effect |
/// |---|---|
/// | 0 | end of mask |
/// | 1 | move n source bytes, leading `0`s replaced by the fill byte |
/// | 2 | move n source bytes and start significance |
/// | 3 | insert the next mask byte n times (the fill byte before significance) |
/// | 4 | skip n source bytes |
/// | 5 | the next mask byte becomes the fill byte |
///
/// The fill byte starts as a space and pads the destination. Running out of source, overrunning
/// the destination or an unknown operation is an instruction specification error and stores
/// nothing.
pub(super) fn edit(cpu: &mut Cpu, bus: &mut dyn MemoryBus) -> ExecResult {
    let (j, k) = cpu.jk();
    let src_len = block_length(cpu.x[0]);
    let dst_len = block_length(cpu.x[1]);
    let mut src = [0u8; MAX_BLOCK];
    cpu.read_virtual(bus, cpu.a[j], &mut src[..src_len])?;

    let mask = table_operand(cpu);
    let mut editor = Editor {
        src: &src[..src_len],
        next: 0,
        out: Vec::with_capacity(dst_len),
        fill: FILL,
        significant: false,
    };
    let mut at = 0;
    while at < MAX_BLOCK as i64 {
        let byte = cpu.load_bytes(bus, mask.offset(at), 1)? as u8;
        at += 1;
        let (op, n) = (byte >> 4, usize::from(byte & 0xF));
        let ok = match op {
            EDIT_END => break,
            EDIT_SUPPRESS => editor.move_bytes(n, true),
            EDIT_MOVE => editor.move_bytes(n, false),
            EDIT_INSERT | EDIT_FILL => {
                let operand = cpu.load_bytes(bus, mask.offset(at), 1)? as u8;
                at += 1;
                if op == EDIT_INSERT {
                    editor.insert(operand, n);
                } else {
                    editor.fill = operand;
                }
                true
            }
            EDIT_SKIP => editor.skip(n),
            _ => false,
        };
        if !ok || editor.out.len() > dst_len {
            return Err(cpu.fault_monitor(MonitorCondition::InstructionSpecification));
        }
    }

    let fill = editor.fill;
    let mut out = editor.out;
    out.resize(dst_len, fill);
    cpu.write_virtual(bus, cpu.a[k], &out)
}
