mod common;

use common::{code, jk, jkq, Rig};
use cyber_cpu_core::{Action, StepExit, UserCondition};
use proptest::prelude::*;

const ADDX_X3_TO_X2: u16 = 0x2432;
const DIVX_X2_BY_X3: u16 = 0x2732;
const DIVR_X2_BY_X3: u16 = 0x2332;

#[test]
fn divx_overflow_leaves_destination_and_completes() {
    let mut rig = Rig::new();
    rig.load_code(&[DIVX_X2_BY_X3]);
    rig.cpu.x[2] = i64::MIN as u64;
    rig.cpu.x[3] = -1i64 as u64;

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.cpu.ucr, UserCondition::ArithmeticOverflow.bit());
    assert_eq!(rig.cpu.ucr, 0x0040);
    assert_eq!(rig.cpu.x[2], i64::MIN as u64);
    assert_eq!(rig.cpu.p, code(2));
    assert_eq!(rig.cpu.retired, 1);
    assert_eq!(rig.cpu.pending, Action::Trap);
}

#[test]
fn divx_by_zero_raises_divide_fault() {
    let mut rig = Rig::new();
    rig.load_code(&[DIVX_X2_BY_X3]);
    rig.cpu.x[2] = 17;
    rig.cpu.x[3] = 0;

    rig.step();
    assert_eq!(rig.cpu.ucr, 0x0100);
    assert_eq!(rig.cpu.x[2], 17);
    assert_eq!(rig.cpu.p, code(2));
}

#[test]
fn divr_works_on_right_halves() {
    let mut rig = Rig::new();
    rig.load_code(&[DIVR_X2_BY_X3, DIVR_X2_BY_X3]);
    rig.cpu.x[2] = 0xAAAA_AAAA_0000_0064;
    rig.cpu.x[3] = 0xFFFF_FFFF_FFFF_FFFB; // right half -5

    rig.step();
    assert_eq!(rig.cpu.ucr, 0);
    assert_eq!(rig.cpu.x[2], 0xAAAA_AAAA_FFFF_FFEC); // -20

    rig.cpu.x[3] = 0x1234_5678_0000_0000;
    rig.step();
    assert_eq!(rig.cpu.ucr, UserCondition::DivideFault.bit());
    assert_eq!(rig.cpu.x[2], 0xAAAA_AAAA_FFFF_FFEC);
}

#[test]
fn masked_off_arithmetic_condition_is_recorded_without_action() {
    let mut rig = Rig::new();
    rig.load_code(&[DIVX_X2_BY_X3]);
    rig.cpu.umr = 0;
    rig.cpu.x[2] = 9;

    rig.step();
    assert_eq!(rig.cpu.ucr, UserCondition::DivideFault.bit());
    assert_eq!(rig.cpu.pending, Action::Continue);
}

#[test]
fn unimplemented_opcode_retains_p() {
    let mut rig = Rig::new();
    rig.load_code(&[jk(0x40, 1, 2)]);

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.cpu.ucr, 0x4000);
    assert_eq!(rig.cpu.p, code(0));
    assert_eq!(rig.cpu.retired, 0);
    assert_eq!(rig.cpu.pending, Action::Trap);
}

#[test]
fn pending_action_never_decreases() {
    let mut rig = Rig::new();
    rig.cpu.escalate(Action::Exchange);
    rig.cpu.raise_user(UserCondition::ArithmeticOverflow);
    assert_eq!(rig.cpu.pending, Action::Exchange);

    rig.cpu.escalate(Action::Stack);
    assert_eq!(rig.cpu.pending, Action::Exchange);

    rig.cpu.escalate(Action::Halt);
    assert_eq!(rig.cpu.pending, Action::Halt);
    assert_eq!(rig.step(), StepExit::Halted);
    assert!(rig.cpu.stopped);
    assert_eq!(rig.step(), StepExit::Halted);
}

#[test]
fn keypoint_raises_only_when_enabled_and_selected() {
    use cyber_cpu_core::TrapControl;

    let mut rig = Rig::new();
    let [first, second] = jkq(0xB1, 3, 4, 0x10);
    rig.load_code(&[first, second, first, second]);
    rig.cpu.x[4] = 0x20;

    rig.step();
    assert_eq!(rig.cpu.ucr, 0);
    assert_eq!(rig.cpu.keypoint_code, 0);

    rig.cpu.trap.insert(TrapControl::KEYPOINT_ENABLE);
    rig.cpu.keypoint_mask = 0x8000 >> 3;
    rig.step();
    assert_eq!(rig.cpu.ucr, UserCondition::Keypoint.bit());
    assert_eq!(rig.cpu.keypoint_code, (3 << 32) | 0x30);
    assert_eq!(rig.cpu.p, code(8));
}

proptest! {
    #[test]
    fn addx_matches_checked_add(a in any::<i64>(), b in any::<i64>()) {
        let mut rig = Rig::new();
        rig.load_code(&[ADDX_X3_TO_X2]);
        rig.cpu.x[2] = a as u64;
        rig.cpu.x[3] = b as u64;
        rig.step();

        match a.checked_add(b) {
            Some(sum) => {
                prop_assert_eq!(rig.cpu.x[2], sum as u64);
                prop_assert_eq!(rig.cpu.ucr, 0);
            }
            None => {
                prop_assert_eq!(rig.cpu.x[2], a as u64);
                prop_assert_eq!(rig.cpu.ucr, UserCondition::ArithmeticOverflow.bit());
            }
        }
        prop_assert_eq!(rig.cpu.p, code(2));
    }
}
