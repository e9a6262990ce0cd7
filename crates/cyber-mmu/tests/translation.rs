use cyber_mem::{MemoryBus, RealMemory};
use cyber_mmu::{
    spid, Access, Atu, ExecutePrivilege, PageTableEntry, Protection, Pva, SegmentDescriptor,
    TranslateFault, MAX_PROBES,
};
use proptest::prelude::*;

const STA: u32 = 0x1000;
const PTA: u32 = 0x4000;

fn machine() -> (Atu, RealMemory) {
    let mut atu = Atu::new();
    atu.set_segment_table(STA, 0xFFF);
    atu.set_page_table(PTA, 1);
    (atu, RealMemory::with_words(1 << 16).unwrap())
}

fn data_segment(asid: u16) -> SegmentDescriptor {
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

#[test]
fn exhausted_probe_chain_is_a_page_fault() {
    let (mut atu, mem) = machine();
    let mut bus = &mem;
    atu.install_segment(&mut bus, 6, &data_segment(0x30));

    // Fill the whole search window starting at the hashed index with foreign entries that all
    // claim a continuation, then place the wanted entry one slot past the window.
    let page = 2;
    let start = (0x30 ^ page) & (atu.page_table_entries() - 1);
    for probe in 0..=MAX_PROBES {
        let index = (start + probe) & (atu.page_table_entries() - 1);
        let entry = PageTableEntry {
            valid: true,
            cont: true,
            used: false,
            modified: false,
            spid: if probe == MAX_PROBES {
                spid(0x30, page)
            } else {
                spid(0x7777, probe)
            },
            pfa: 0x100 + probe,
        };
        bus.write_word(u64::from(PTA) + u64::from(index) * 8, entry.to_word());
    }

    let pva = Pva::new(7, 6, page * 512 + 0x10);
    assert_eq!(
        atu.translate(&mut bus, pva, Access::READ, 0),
        Err(TranslateFault::PageFault(pva))
    );
    assert_eq!(atu.untranslatable_pointer(), pva);
}

#[test]
fn larger_pages_use_more_offset_bits() {
    let (mut atu, mem) = machine();
    let mut bus = &mem;
    atu.set_page_size_mask(0x7C);
    atu.install_segment(&mut bus, 1, &data_segment(1));
    atu.install_page(&mut bus, 1, 1, 0x40).unwrap();

    let rma = atu
        .translate(&mut bus, Pva::new(3, 1, 0x800 + 0x7F0), Access::READ, 0)
        .unwrap();
    assert_eq!(rma, (0x40 << 9) + 0x7F0);
}

proptest! {
    #[test]
    fn translation_is_deterministic(
        ring in 1u8..=15,
        segment in 1u16..64,
        page in 0u32..0x400,
        offset in 0u32..512,
        write in any::<bool>(),
    ) {
        let (mut atu, mem) = machine();
        let mut bus = &mem;
        let asid = segment + 0x100;
        atu.install_segment(&mut bus, segment, &data_segment(asid));
        let index = atu.install_page(&mut bus, asid, page, 0x200).unwrap();
        let entry_rma = u64::from(PTA) + u64::from(index) * 8;

        let access = if write { Access::WRITE } else { Access::READ };
        let pva = Pva::new(ring, segment, page * 512 + offset);
        let first = atu.translate(&mut bus, pva, access, 0).unwrap();
        let second = atu.translate(&mut bus, pva, access, 0).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(first, (0x200u64 << 9) | u64::from(offset));

        let entry = PageTableEntry::from_word(bus.read_word(entry_rma));
        prop_assert!(entry.used);
        prop_assert_eq!(entry.modified, write);
    }
}
