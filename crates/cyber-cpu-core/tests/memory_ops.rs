mod common;

use std::sync::Barrier;
use std::thread;

use common::{code, data, jk, jkid, jkq, job_cpu, Rig};
use cyber_cpu_core::{Action, MonitorCondition, StepExit};

#[test]
fn movb_pads_destination_with_spaces() {
    let mut rig = Rig::new();
    rig.load_code(&[jk(0xF9, 1, 2)]);
    rig.write_bytes(data(0), b"ABCDEF");
    rig.write_bytes(data(0x40), b"zzzzzzzz");
    rig.cpu.a[1] = data(0);
    rig.cpu.a[2] = data(0x40);
    rig.cpu.x[0] = 3;
    rig.cpu.x[1] = 5;

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.read_bytes(data(0x40), 6), b"ABC  z");
}

#[test]
fn cmpb_reports_first_difference() {
    let mut rig = Rig::new();
    let cmpb = jk(0xFA, 1, 2);
    rig.load_code(&[cmpb, cmpb]);
    rig.write_bytes(data(0), b"ABC");
    rig.write_bytes(data(0x40), b"ABD");
    rig.cpu.a[1] = data(0);
    rig.cpu.a[2] = data(0x40);
    rig.cpu.x[0] = 3;
    rig.cpu.x[1] = 3;

    rig.step();
    assert_eq!(rig.cpu.x[0], u64::MAX);
    assert_eq!(rig.cpu.x[1], 2);

    // Same operand on both sides.
    rig.cpu.a[2] = data(0);
    rig.cpu.x[0] = 2;
    rig.cpu.x[1] = 2;
    rig.step();
    assert_eq!(rig.cpu.x[0], 0);
    assert_eq!(rig.cpu.x[1], 2);
}

#[test]
fn word_load_and_store() {
    let mut rig = Rig::new();
    let [lx0, lx1] = jkq(0x82, 1, 4, 2);
    let [sx0, sx1] = jkq(0x83, 1, 4, -1);
    rig.load_code(&[lx0, lx1, sx0, sx1]);
    rig.cpu.a[1] = data(0x20);
    rig.write_word(data(0x30), 0x0123_4567_89AB_CDEF);

    rig.step();
    assert_eq!(rig.cpu.x[4], 0x0123_4567_89AB_CDEF);
    rig.step();
    assert_eq!(rig.read_word(data(0x18)), 0x0123_4567_89AB_CDEF);
    assert_eq!(rig.cpu.p, code(8));
}

#[test]
fn fetch_from_unmapped_page_aborts_with_page_fault() {
    let mut rig = Rig::new();
    rig.cpu.p = code(0x1000);

    assert_eq!(rig.step(), StepExit::Aborted);
    assert_eq!(rig.cpu.mcr, MonitorCondition::PageTableSearchWithoutFind.bit());
    assert_eq!(rig.cpu.mcr, 0x0040);
    assert_eq!(rig.cpu.atu.untranslatable_pointer(), code(0x1000));
    assert_eq!(rig.cpu.p, code(0x1000));
    assert_eq!(rig.cpu.pending, Action::Exchange);
    assert_eq!(rig.cpu.retired, 0);
}

#[test]
fn fetch_from_odd_address_is_an_address_specification() {
    let mut rig = Rig::new();
    rig.cpu.p = code(3);

    assert_eq!(rig.step(), StepExit::Aborted);
    assert_eq!(rig.cpu.mcr, MonitorCondition::AddressSpecification.bit());
}

#[test]
fn store_to_read_only_segment_is_an_access_violation() {
    let mut rig = Rig::new();
    let [sx0, sx1] = jkq(0x83, 1, 4, 0);
    rig.load_code(&[sx0, sx1]);
    rig.cpu.a[1] = code(0x100);

    rig.step();
    assert_eq!(rig.cpu.mcr, MonitorCondition::AccessViolation.bit());
    assert_eq!(rig.cpu.p, code(0));
    assert_eq!(rig.cpu.atu.untranslatable_pointer(), code(0x100));
}

#[test]
fn lbset_is_atomic_across_processors() {
    const CPUS: usize = 8;

    let rig = Rig::new();
    rig.load_code(&[jk(0x14, 1, 2)]);
    let mem = &rig.mem;
    let barrier = Barrier::new(CPUS);

    let olds: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..CPUS)
            .map(|id| {
                let barrier = &barrier;
                s.spawn(move || {
                    let mut cpu = job_cpu(id);
                    cpu.a[1] = data(0x10);
                    cpu.x[0] = 5;
                    let mut bus = mem;
                    barrier.wait();
                    assert_eq!(cpu.step(&mut bus), StepExit::Executed);
                    cpu.x[2]
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(olds.iter().filter(|&&old| old == 0).count(), 1);
    assert_eq!(olds.iter().filter(|&&old| old == 1).count(), CPUS - 1);
    assert_eq!(rig.read_bytes(data(0x10), 1), [0x04]);
}

#[test]
fn byte_store_across_missing_page_keeps_leading_bytes() {
    let mut rig = Rig::new();
    // SBYTS, eight bytes, at A5 + 5: the last three bytes of the data segment's fourth page.
    rig.load_code(&jkid(0xDF, 5, 6, 0, 5));
    rig.cpu.a[5] = data(2040);
    rig.cpu.x[6] = 0x1122_3344_5566_7788;

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.cpu.mcr, MonitorCondition::PageTableSearchWithoutFind.bit());
    assert_eq!(rig.cpu.p, code(0));
    assert_eq!(rig.cpu.atu.untranslatable_pointer(), data(2048));
    assert_eq!(rig.read_bytes(data(2045), 3), [0x11, 0x22, 0x33]);
}

#[test]
fn cmpxa_swaps_only_on_match() {
    let mut rig = Rig::new();
    let [c0, c1] = jkq(0xB4, 1, 4, 2);
    rig.load_code(&[c0, c1, c0, c1, c0, c1]);
    rig.cpu.a[1] = data(0x20);
    rig.write_word(data(0x30), 7);
    rig.cpu.x[0] = 7;
    rig.cpu.x[4] = 9;

    rig.step();
    assert_eq!(rig.read_word(data(0x30)), 9);
    assert_eq!(rig.cpu.x[0], 7);
    assert_eq!(rig.cpu.x[1], 0);

    // X0 is stale now: nothing is stored and X0 picks up the current word.
    rig.cpu.x[4] = 11;
    rig.step();
    assert_eq!(rig.read_word(data(0x30)), 9);
    assert_eq!(rig.cpu.x[0], 9);
    assert_eq!(rig.cpu.x[1], 1);

    rig.cpu.a[1] = data(0x21);
    rig.step();
    assert_eq!(rig.cpu.mcr, MonitorCondition::AddressSpecification.bit());
    assert_eq!(rig.cpu.p, code(8));
}

/// Identity table with lower case letters mapped to upper case.
fn upper_case_table() -> Vec<u8> {
    (0..=255u8).map(|b| b.to_ascii_uppercase()).collect()
}

#[test]
fn cmpc_compares_through_collating_table() {
    let mut rig = Rig::new();
    let cmpc = jkid(0xE9, 1, 2, 7, 0);
    rig.load_code(&[cmpc[0], cmpc[1], cmpc[0], cmpc[1]]);
    rig.write_bytes(data(0x200), &upper_case_table());
    rig.write_bytes(data(0), b"abc");
    rig.write_bytes(data(0x40), b"ABD");
    rig.write_bytes(data(0x80), b"ABC");
    rig.cpu.a[1] = data(0);
    rig.cpu.a[2] = data(0x40);
    rig.cpu.a[7] = data(0x200);
    rig.cpu.x[0] = 3;
    rig.cpu.x[1] = 3;

    rig.step();
    assert_eq!(rig.cpu.x[0], u64::MAX);
    assert_eq!(rig.cpu.x[1], 2);

    rig.cpu.a[2] = data(0x80);
    rig.cpu.x[0] = 3;
    rig.cpu.x[1] = 3;
    rig.step();
    assert_eq!(rig.cpu.x[0], 0);
    assert_eq!(rig.cpu.x[1], 3);
}

#[test]
fn tranb_translates_and_pads() {
    let mut rig = Rig::new();
    rig.load_code(&jkid(0xEB, 1, 2, 7, 0));
    rig.write_bytes(data(0x200), &upper_case_table());
    rig.write_bytes(data(0), b"hello");
    rig.write_bytes(data(0x40), b"........");
    rig.cpu.a[1] = data(0);
    rig.cpu.a[2] = data(0x40);
    rig.cpu.a[7] = data(0x200);
    rig.cpu.x[0] = 5;
    rig.cpu.x[1] = 7;

    rig.step();
    assert_eq!(rig.cpu.mcr, 0);
    assert_eq!(rig.read_bytes(data(0x40), 8), b"HELLO  .");
}

#[test]
fn scnb_finds_first_member() {
    let mut rig = Rig::new();
    let scnb = jkid(0xF3, 1, 0, 7, 0);
    rig.load_code(&[scnb[0], scnb[1], scnb[0], scnb[1]]);
    let mut set = [0u8; 32];
    set[usize::from(b',' >> 3)] |= 0x80 >> (b',' & 7);
    rig.write_bytes(data(0x200), &set);
    rig.write_bytes(data(0), b"ab,cd");
    rig.cpu.a[1] = data(0);
    rig.cpu.a[7] = data(0x200);
    rig.cpu.x[0] = 5;

    rig.step();
    assert_eq!(rig.cpu.x[0], u64::from(b','));
    assert_eq!(rig.cpu.x[1], 2);

    // Only the first two bytes.
    rig.cpu.x[0] = 2;
    rig.step();
    assert_eq!(rig.cpu.x[0], u64::MAX);
    assert_eq!(rig.cpu.x[1], 2);
}

#[test]
fn edit_suppresses_zeros_and_inserts_separators() {
    let mut rig = Rig::new();
    let edit = jkid(0xED, 1, 2, 7, 0);
    rig.load_code(&[edit[0], edit[1], edit[0], edit[1], edit[0], edit[1]]);
    rig.cpu.a[1] = data(0);
    rig.cpu.a[2] = data(0x40);
    rig.cpu.a[7] = data(0x200);
    let mask = [0x12, 0x12, 0x31, b',', 0x23, 0x00];
    rig.write_bytes(data(0x200), &mask);

    rig.write_bytes(data(0), b"0012345");
    rig.cpu.x[0] = 7;
    rig.cpu.x[1] = 10;
    rig.step();
    assert_eq!(rig.cpu.mcr, 0);
    assert_eq!(rig.read_bytes(data(0x40), 10), b"  12,345  ");

    // The separator is suppressed until a significant digit appears.
    rig.write_bytes(data(0), b"0000045");
    rig.cpu.x[0] = 7;
    rig.cpu.x[1] = 8;
    rig.step();
    assert_eq!(rig.read_bytes(data(0x40), 8), b"     045");

    // An unknown operation stores nothing.
    rig.write_bytes(data(0x200), &[0x90]);
    rig.write_bytes(data(0x40), b"xxxxxxxx");
    rig.step();
    assert_eq!(rig.cpu.mcr, MonitorCondition::InstructionSpecification.bit());
    assert_eq!(rig.read_bytes(data(0x40), 8), b"xxxxxxxx");
    assert_eq!(rig.cpu.p, code(8));
}
