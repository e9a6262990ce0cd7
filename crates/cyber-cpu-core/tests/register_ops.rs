mod common;

use common::{code, jk, jkid, jkq, Rig};
use cyber_cpu_core::{Action, MonitorCondition, StepExit};

#[test]
fn mark_sets_bit_zero_on_low_byte_match() {
    let mut rig = Rig::new();
    let mark = jk(0x1E, 2, 3);
    rig.load_code(&[mark, mark]);
    rig.cpu.x[1] = 0x41;
    rig.cpu.x[2] = 0x1241;
    rig.cpu.x[3] = 0xF0;

    rig.step();
    assert_eq!(rig.cpu.x[3], 0xF1);

    rig.cpu.x[2] = 0x42;
    rig.step();
    assert_eq!(rig.cpu.x[3], 0xF0);
}

#[test]
fn fill_opcode_selects_on_j() {
    let mut rig = Rig::new();
    rig.load_code(&[jk(0x1F, 0, 2), jk(0x1F, 1, 3), jk(0x1F, 2, 4), jk(0x1F, 2, 5)]);
    rig.cpu.x[2] = 0x55;
    rig.cpu.x[1] = 1u64 << 63;

    rig.step();
    assert_eq!(rig.cpu.x[2], 0);
    rig.step();
    assert_eq!(rig.cpu.x[3], u64::MAX);
    rig.step();
    assert_eq!(rig.cpu.x[4], u64::MAX);

    rig.cpu.x[1] = 0x7FFF;
    rig.cpu.x[5] = 0x55;
    rig.step();
    assert_eq!(rig.cpu.x[5], 0);
    assert_eq!(rig.cpu.mcr, 0);
}

#[test]
fn fill_opcode_rejects_other_selectors() {
    let mut rig = Rig::new();
    rig.load_code(&[jk(0x1F, 3, 2)]);
    rig.cpu.x[2] = 0x55;

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.cpu.mcr, MonitorCondition::InstructionSpecification.bit());
    assert_eq!(rig.cpu.x[2], 0x55);
    assert_eq!(rig.cpu.p, code(0));
}

#[test]
fn enta_sign_extends_twenty_four_bits_into_x0() {
    let mut rig = Rig::new();
    let [a0, a1] = jkq(0xB3, 8, 0, 1);
    let [b0, b1] = jkq(0xB3, 1, 2, 0x0304);
    rig.load_code(&[a0, a1, b0, b1]);

    rig.step();
    assert_eq!(rig.cpu.x[0], 0xFFFF_FFFF_FF80_0001);
    rig.step();
    assert_eq!(rig.cpu.x[0], 0x12_0304);
    assert_eq!(rig.cpu.p, code(8));
}

#[test]
fn execute_without_algorithm_is_a_specification_error() {
    let mut rig = Rig::new();
    rig.load_code(&jkid(0xC3, 1, 2, 0, 0));

    rig.step();
    assert_eq!(rig.cpu.mcr, MonitorCondition::InstructionSpecification.bit());
    assert_eq!(rig.cpu.mcr, 0x1000);
    assert_eq!(rig.cpu.p, code(0));
    assert_eq!(rig.cpu.pending, Action::Exchange);
}
