// Shared test helpers (integration tests compile as separate crates, so keep them in a
// submodule instead of a test target of their own).
#![allow(dead_code)]

use cyber_cpu_core::{Cpu, CpuConfig, StepExit};
use cyber_mem::{MemoryBus, RealMemory};
use cyber_mmu::{ExecutePrivilege, Protection, Pva, SegmentDescriptor};

pub const STA: u32 = 0x1000;
pub const PTA: u32 = 0x4000;
/// First page frame handed out by [`Rig::map_segment`].
pub const FIRST_FRAME: u32 = 0x10000 >> 9;

pub const CODE: u16 = 1;
pub const DATA: u16 = 2;
pub const STACK: u16 = 3;
/// Not mapped by [`Rig::new`]; tests that call through code base pointers map it.
pub const BINDING: u16 = 5;

/// Ring the rig's job runs in.
pub const RING: u8 = 3;

pub fn jk(opcode: u8, j: u8, k: u8) -> u16 {
    (u16::from(opcode) << 8) | (u16::from(j & 0xF) << 4) | u16::from(k & 0xF)
}

pub fn jkq(opcode: u8, j: u8, k: u8, q: i16) -> [u16; 2] {
    [jk(opcode, j, k), q as u16]
}

pub fn jkid(opcode: u8, j: u8, k: u8, i: u8, d: u16) -> [u16; 2] {
    [jk(opcode, j, k), (u16::from(i & 0xF) << 12) | (d & 0xFFF)]
}

pub fn code_segment(asid: u16, xp: ExecutePrivilege) -> SegmentDescriptor {
    SegmentDescriptor {
        execute: xp,
        read: Protection::Open,
        write: Protection::NoAccess,
        valid: true,
        r1: 1,
        r2: 15,
        asid,
        lock: 0,
    }
}

pub fn data_segment(asid: u16) -> SegmentDescriptor {
    SegmentDescriptor {
        execute: ExecutePrivilege::NonExecutable,
        read: Protection::Open,
        write: Protection::Open,
        valid: true,
        r1: 15,
        r2: 15,
        asid,
        lock: 0,
    }
}

pub fn binding_segment(asid: u16) -> SegmentDescriptor {
    SegmentDescriptor {
        execute: ExecutePrivilege::NonExecutable,
        read: Protection::Binding,
        write: Protection::NoAccess,
        valid: true,
        r1: 1,
        r2: 15,
        asid,
        lock: 0,
    }
}

/// A processor in job mode at the start of the code segment, sharing the rig's tables.
pub fn job_cpu(id: usize) -> Cpu {
    let mut cpu = Cpu::new(id, &CpuConfig::default());
    cpu.atu.set_segment_table(STA, 15);
    cpu.atu.set_page_table(PTA, 1);
    cpu.monitor_mode = false;
    cpu.p = Pva::new(RING, CODE, 0);
    cpu.a[0] = Pva::new(RING, STACK, 0x100);
    cpu.a[1] = cpu.a[0];
    cpu
}

/// One processor in job mode at ring 3, with code, data and stack segments of four 512-byte
/// pages each.
pub struct Rig {
    pub mem: RealMemory,
    pub cpu: Cpu,
    next_frame: u32,
}

impl Rig {
    pub fn new() -> Self {
        Self::with_memory(RealMemory::with_words(1 << 17).unwrap())
    }

    pub fn with_memory(mem: RealMemory) -> Self {
        let mut rig = Self {
            mem,
            cpu: job_cpu(0),
            next_frame: FIRST_FRAME,
        };
        rig.map_segment(CODE, code_segment(0x11, ExecutePrivilege::NonPrivileged), 4);
        rig.map_segment(DATA, data_segment(0x22), 4);
        rig.map_segment(STACK, data_segment(0x33), 4);
        rig
    }

    pub fn map_segment(&mut self, segment: u16, sde: SegmentDescriptor, pages: u32) {
        let mut bus = &self.mem;
        assert!(self.cpu.atu.install_segment(&mut bus, segment, &sde));
        for page in 0..pages {
            self.cpu
                .atu
                .install_page(&mut bus, sde.asid, page, self.next_frame)
                .unwrap();
            self.next_frame += 1;
        }
    }

    pub fn rma(&self, pva: Pva) -> u64 {
        let mut bus = &self.mem;
        self.cpu.atu.probe(&mut bus, pva).unwrap().unwrap().rma
    }

    pub fn write_parcels(&self, at: Pva, parcels: &[u16]) {
        let mut bus = &self.mem;
        for (i, parcel) in parcels.iter().enumerate() {
            let rma = self.rma(at.offset(2 * i as i64));
            bus.write_bytes(rma, &parcel.to_be_bytes());
        }
    }

    /// Write parcels at the start of the code segment.
    pub fn load_code(&self, parcels: &[u16]) {
        self.write_parcels(Pva::new(RING, CODE, 0), parcels);
    }

    pub fn write_word(&self, pva: Pva, value: u64) {
        let mut bus = &self.mem;
        bus.write_word(self.rma(pva), value);
    }

    pub fn read_word(&self, pva: Pva) -> u64 {
        let mut bus = &self.mem;
        bus.read_word(self.rma(pva))
    }

    pub fn write_bytes(&self, pva: Pva, bytes: &[u8]) {
        let mut bus = &self.mem;
        bus.write_bytes(self.rma(pva), bytes);
    }

    pub fn read_bytes(&self, pva: Pva, len: usize) -> Vec<u8> {
        let mut bus = &self.mem;
        let mut out = vec![0; len];
        bus.read_bytes(self.rma(pva), &mut out);
        out
    }

    pub fn step(&mut self) -> StepExit {
        let mut bus = &self.mem;
        self.cpu.step(&mut bus)
    }
}

pub fn data(bn: u32) -> Pva {
    Pva::new(RING, DATA, bn)
}

pub fn code(bn: u32) -> Pva {
    Pva::new(RING, CODE, bn)
}

pub fn stack(bn: u32) -> Pva {
    Pva::new(RING, STACK, bn)
}

pub fn binding(bn: u32) -> Pva {
    Pva::new(RING, BINDING, bn)
}
