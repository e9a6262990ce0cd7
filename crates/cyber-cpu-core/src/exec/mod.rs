//! Instruction dispatch.
//!
//! Every opcode maps to a `{ format, handler }` entry in a static 256-entry table built at
//! compile time. Handlers stage control transfers in `next_p`/`next_key`; the step loop commits
//! them after the handler returns.

mod ops_arith;
mod ops_block;
mod ops_branch;
mod ops_copy;
mod ops_field;
mod ops_float;
mod ops_logic;
mod ops_mem;
mod ops_system;

use core::cmp::Ordering;

use cyber_mem::MemoryBus;
use cyber_mmu::ExecutePrivilege;

use crate::bits::{right_half, ArithFault};
use crate::conditions::UserCondition;
use crate::decode::Format;
use crate::state::Cpu;
use crate::ExecResult;

pub use ops_system::StateRegister;

pub type Handler = fn(&mut Cpu, &mut dyn MemoryBus) -> ExecResult;

#[derive(Clone, Copy)]
pub struct OpcodeEntry {
    pub format: Format,
    pub handler: Handler,
    pub mnemonic: &'static str,
}

impl OpcodeEntry {
    #[inline]
    pub fn is_implemented(&self) -> bool {
        !self.mnemonic.is_empty()
    }
}

impl core::fmt::Debug for OpcodeEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpcodeEntry")
            .field("format", &self.format)
            .field("mnemonic", &self.mnemonic)
            .finish()
    }
}

const UNASSIGNED: OpcodeEntry = OpcodeEntry {
    format: Format::Jk,
    handler: unimplemented,
    mnemonic: "",
};

const fn op(format: Format, mnemonic: &'static str, handler: Handler) -> OpcodeEntry {
    OpcodeEntry {
        format,
        handler,
        mnemonic,
    }
}

pub static OPCODES: [OpcodeEntry; 256] = build_opcodes();

const fn build_opcodes() -> [OpcodeEntry; 256] {
    use Format::{Jk, JkQ, JkiD};

    let mut t = [UNASSIGNED; 256];

    t[0x00] = op(Jk, "HALT", ops_system::halt);
    t[0x01] = op(Jk, "SYNC", ops_system::sync);
    t[0x02] = op(Jk, "EXCHANGE", ops_system::exchange);
    t[0x03] = op(Jk, "INTRUPT", ops_system::interrupt);
    t[0x04] = op(Jk, "RETURN", ops_branch::return_);
    t[0x05] = op(Jk, "POP", ops_branch::pop);
    t[0x07] = op(Jk, "CPYTX", ops_copy::cpytx);
    t[0x08] = op(Jk, "CPYAA", ops_copy::cpyaa);
    t[0x09] = op(Jk, "CPYXA", ops_copy::cpyxa);
    t[0x0A] = op(Jk, "CPYAX", ops_copy::cpyax);
    t[0x0B] = op(Jk, "CPYRR", ops_copy::cpyrr);
    t[0x0C] = op(Jk, "CPYXX", ops_copy::cpyxx);
    t[0x0D] = op(Jk, "CPYSX", ops_system::cpysx);
    t[0x0E] = op(Jk, "CPYXS", ops_system::cpyxs);
    t[0x0F] = op(Jk, "INCX", ops_arith::incx);

    t[0x10] = op(Jk, "DECX", ops_arith::decx);
    t[0x14] = op(Jk, "LBSET", ops_mem::lbset);
    t[0x15] = op(Jk, "PURGE", ops_system::purge);
    t[0x16] = op(Jk, "TPAGE", ops_system::tpage);
    t[0x17] = op(Jk, "LPAGE", ops_system::lpage);
    t[0x18] = op(Jk, "IORX", ops_logic::iorx);
    t[0x19] = op(Jk, "XORX", ops_logic::xorx);
    t[0x1A] = op(Jk, "ANDX", ops_logic::andx);
    t[0x1B] = op(Jk, "NOTX", ops_logic::notx);
    t[0x1C] = op(Jk, "INHX", ops_logic::inhx);
    t[0x1E] = op(Jk, "MARK", ops_logic::mark);
    t[0x1F] = op(Jk, "ENTZ/ENTO/ENTS", ops_copy::ent_fill);

    t[0x20] = op(Jk, "ADDR", ops_arith::addr);
    t[0x21] = op(Jk, "SUBR", ops_arith::subr);
    t[0x22] = op(Jk, "MULR", ops_arith::mulr);
    t[0x23] = op(Jk, "DIVR", ops_arith::divr);
    t[0x24] = op(Jk, "ADDX", ops_arith::addx);
    t[0x25] = op(Jk, "SUBX", ops_arith::subx);
    t[0x26] = op(Jk, "MULX", ops_arith::mulx);
    t[0x27] = op(Jk, "DIVX", ops_arith::divx);
    t[0x28] = op(Jk, "INCR", ops_arith::incr);
    t[0x29] = op(Jk, "DECR", ops_arith::decr);
    t[0x2A] = op(Jk, "ADDAX", ops_arith::addax);
    t[0x2C] = op(Jk, "CMPR", ops_arith::cmpr);
    t[0x2D] = op(Jk, "CMPX", ops_arith::cmpx);
    t[0x2E] = op(Jk, "BRREL", ops_branch::brrel);
    t[0x2F] = op(Jk, "BRDIR", ops_branch::brdir);

    t[0x30] = op(Jk, "ADDF", ops_float::addf);
    t[0x31] = op(Jk, "SUBF", ops_float::subf);
    t[0x32] = op(Jk, "MULF", ops_float::mulf);
    t[0x33] = op(Jk, "DIVF", ops_float::divf);
    t[0x3A] = op(Jk, "CNIF", ops_float::cnif);
    t[0x3B] = op(Jk, "CNFI", ops_float::cnfi);
    t[0x3C] = op(Jk, "CMPF", ops_float::cmpf);
    t[0x3D] = op(Jk, "ENTP", ops_copy::entp);
    t[0x3E] = op(Jk, "ENTN", ops_copy::entn);
    t[0x3F] = op(Jk, "ENTL", ops_copy::entl);

    t[0x80] = op(JkQ, "LMULT", ops_mem::lmult);
    t[0x81] = op(JkQ, "SMULT", ops_mem::smult);
    t[0x82] = op(JkQ, "LX", ops_mem::lx);
    t[0x83] = op(JkQ, "SX", ops_mem::sx);
    t[0x84] = op(JkQ, "LA", ops_mem::la);
    t[0x85] = op(JkQ, "SA", ops_mem::sa);
    t[0x87] = op(JkQ, "ENTC", ops_copy::entc);
    t[0x88] = op(JkQ, "LBIT", ops_mem::lbit);
    t[0x89] = op(JkQ, "SBIT", ops_mem::sbit);
    t[0x8A] = op(JkQ, "ADDRQ", ops_arith::addrq);
    t[0x8B] = op(JkQ, "ADDXQ", ops_arith::addxq);
    t[0x8C] = op(JkQ, "MULRQ", ops_arith::mulrq);
    t[0x8D] = op(JkQ, "ENTE", ops_copy::ente);
    t[0x8E] = op(JkQ, "ADDAQ", ops_arith::addaq);
    t[0x8F] = op(JkQ, "ADDPXQ", ops_arith::addpxq);

    t[0x90] = op(JkQ, "BRREQ", ops_branch::brreq);
    t[0x91] = op(JkQ, "BRRNE", ops_branch::brrne);
    t[0x92] = op(JkQ, "BRRGT", ops_branch::brrgt);
    t[0x93] = op(JkQ, "BRRGE", ops_branch::brrge);
    t[0x94] = op(JkQ, "BRXEQ", ops_branch::brxeq);
    t[0x95] = op(JkQ, "BRXNE", ops_branch::brxne);
    t[0x96] = op(JkQ, "BRXGT", ops_branch::brxgt);
    t[0x97] = op(JkQ, "BRXGE", ops_branch::brxge);
    t[0x98] = op(JkQ, "BRFEQ", ops_branch::brfeq);
    t[0x99] = op(JkQ, "BRFNE", ops_branch::brfne);
    t[0x9A] = op(JkQ, "BRFGT", ops_branch::brfgt);
    t[0x9B] = op(JkQ, "BRFGE", ops_branch::brfge);
    t[0x9C] = op(JkQ, "BRINC", ops_branch::brinc);
    t[0x9D] = op(JkQ, "BRSEG", ops_branch::brseg);
    t[0x9F] = op(JkQ, "BRCR", ops_branch::brcr);

    t[0xA0] = op(JkiD, "LAI", ops_mem::lai);
    t[0xA1] = op(JkiD, "SAI", ops_mem::sai);
    t[0xA2] = op(JkiD, "LXI", ops_mem::lxi);
    t[0xA3] = op(JkiD, "SXI", ops_mem::sxi);
    t[0xA4] = op(JkiD, "LBYT", ops_mem::lbyt);
    t[0xA5] = op(JkiD, "SBYT", ops_mem::sbyt);
    t[0xA7] = op(JkiD, "ADDAD", ops_arith::addad);
    t[0xA8] = op(JkiD, "SHFC", ops_field::shfc);
    t[0xA9] = op(JkiD, "SHFX", ops_field::shfx);
    t[0xAA] = op(JkiD, "SHFR", ops_field::shfr);
    t[0xAC] = op(JkiD, "ISOM", ops_field::isom);
    t[0xAD] = op(JkiD, "ISOB", ops_field::isob);
    t[0xAE] = op(JkiD, "INSB", ops_field::insb);

    t[0xB0] = op(JkQ, "CALLREL", ops_branch::callrel);
    t[0xB1] = op(JkQ, "KEYPOINT", ops_system::keypoint);
    t[0xB2] = op(JkQ, "MULXQ", ops_arith::mulxq);
    t[0xB3] = op(JkQ, "ENTA", ops_copy::enta);
    t[0xB4] = op(JkQ, "CMPXA", ops_mem::cmpxa);
    t[0xB5] = op(JkiD, "CALLSEG", ops_branch::callseg);

    let mut s = 0xC0;
    while s <= 0xC7 {
        t[s] = op(JkiD, "EXECUTE", ops_system::execute);
        t[s + 0x10] = op(JkiD, "LBYTS", ops_mem::lbyts);
        t[s + 0x18] = op(JkiD, "SBYTS", ops_mem::sbyts);
        s += 1;
    }

    t[0xE9] = op(JkiD, "CMPC", ops_block::cmpc);
    t[0xEB] = op(JkiD, "TRANB", ops_block::tranb);
    t[0xED] = op(JkiD, "EDIT", ops_block::edit);
    t[0xF3] = op(JkiD, "SCNB", ops_block::scnb);
    t[0xF9] = op(Jk, "MOVB", ops_block::movb);
    t[0xFA] = op(Jk, "CMPB", ops_block::cmpb);

    t
}

/// -1, 0 or 1 as a word.
pub(crate) fn ordering_word(ord: Ordering) -> u64 {
    match ord {
        Ordering::Less => u64::MAX,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

fn unimplemented(cpu: &mut Cpu, _bus: &mut dyn MemoryBus) -> ExecResult {
    tracing::debug!(cpu = cpu.id, opcode = cpu.inst.opcode, p = %cpu.cur_p, "unimplemented opcode");
    Err(cpu.fault_user(UserCondition::UnimplementedInstruction))
}

impl Cpu {
    /// Register numbers j and k of the current instruction.
    #[inline]
    pub(crate) fn jk(&self) -> (usize, usize) {
        (usize::from(self.inst.j), usize::from(self.inst.k))
    }

    /// Signed right half of Xi, or 0 when i is 0.
    #[inline]
    pub(crate) fn index_i(&self) -> i64 {
        match self.inst.i {
            0 => 0,
            i => i64::from(right_half(self.x[usize::from(i)]) as i32),
        }
    }

    /// Privileged instructions run in monitor mode or from code whose segment grants `level`.
    pub(crate) fn require_privilege(&mut self, level: ExecutePrivilege) -> ExecResult {
        if self.monitor_mode || self.atu.execute_privilege() >= level {
            Ok(())
        } else {
            Err(self.fault_user(UserCondition::PrivilegedInstruction))
        }
    }

    /// Unwrap an arithmetic result, raising its condition if there is none.
    pub(crate) fn arith(&mut self, result: Result<u64, ArithFault>) -> Option<u64> {
        match result {
            Ok(value) => Some(value),
            Err(ArithFault::Overflow) => {
                self.raise_user(UserCondition::ArithmeticOverflow);
                None
            }
            Err(ArithFault::DivideByZero) => {
                self.raise_user(UserCondition::DivideFault);
                None
            }
        }
    }

    /// Run the handler for the decoded instruction in `self.inst`.
    #[inline]
    pub(crate) fn execute(&mut self, bus: &mut dyn MemoryBus) -> ExecResult {
        (OPCODES[usize::from(self.inst.opcode)].handler)(self, bus)
    }
}
