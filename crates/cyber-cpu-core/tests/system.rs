mod common;

use common::{code, code_segment, jk, Rig, RING};
use cyber_cpu_core::{Action, MonitorCondition, StepExit, UserCondition};
use cyber_mmu::{ExecutePrivilege, Pva};

const HALT: u16 = 0x0000;

#[test]
fn halt_requires_global_privilege() {
    let mut rig = Rig::new();
    rig.load_code(&[HALT]);

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.cpu.ucr, UserCondition::PrivilegedInstruction.bit());
    assert_eq!(rig.cpu.p, code(0));
    assert!(!rig.cpu.stopped);
}

#[test]
fn halt_from_privileged_segment_stops() {
    let mut rig = Rig::new();
    rig.map_segment(4, code_segment(0x44, ExecutePrivilege::GlobalPrivileged), 1);
    let p = Pva::new(RING, 4, 0);
    rig.write_parcels(p, &[HALT]);
    rig.cpu.p = p;

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.cpu.ucr, 0);
    assert_eq!(rig.cpu.pending, Action::Halt);
    assert_eq!(rig.step(), StepExit::Halted);
    assert!(rig.cpu.stopped);

    rig.cpu.restart();
    assert_eq!(rig.cpu.pending, Action::Continue);
    assert!(!rig.cpu.stopped);
}

#[test]
fn state_register_copies_respect_privilege() {
    let mut rig = Rig::new();
    let cpysx = jk(0x0D, 1, 2);
    rig.load_code(&[cpysx, cpysx, cpysx]);
    rig.cpu.umr = 0;
    rig.cpu.ucr = UserCondition::FreeFlag.bit();

    // UCR
    rig.cpu.x[1] = 0x01;
    rig.step();
    assert_eq!(rig.cpu.x[2], u64::from(UserCondition::FreeFlag.bit()));

    // MCR needs local privilege.
    rig.cpu.x[1] = 0x11;
    rig.step();
    assert_ne!(rig.cpu.ucr & UserCondition::PrivilegedInstruction.bit(), 0);
    assert_eq!(rig.cpu.p, code(2));

    // Unassigned register number.
    rig.cpu.pending = Action::Continue;
    rig.cpu.x[1] = 0x7F;
    rig.cpu.p = code(4);
    rig.step();
    assert_eq!(rig.cpu.mcr, MonitorCondition::InstructionSpecification.bit());
}

#[test]
fn writing_user_mask_redelivers_recorded_conditions() {
    let mut rig = Rig::new();
    rig.load_code(&[jk(0x0E, 1, 2)]);
    rig.cpu.umr = 0;
    rig.cpu.ucr = UserCondition::ArithmeticOverflow.bit();
    rig.cpu.x[1] = 0x00;
    rig.cpu.x[2] = 0xFFFF;

    rig.step();
    assert_eq!(rig.cpu.umr, 0xFFFF);
    assert_eq!(rig.cpu.pending, Action::Trap);
    // The copy itself completed.
    assert_eq!(rig.cpu.p, code(2));
    assert_eq!(rig.cpu.retired, 1);
}

#[test]
fn interval_timers_expire_on_zero_or_wrap() {
    let mut rig = Rig::new();
    rig.cpu.sit = 5;
    rig.cpu.pit = 10;
    rig.cpu.tick_interval_timers(10);
    assert_eq!(rig.cpu.sit, 5u32.wrapping_sub(10));
    assert_eq!(rig.cpu.pit, 0);
    assert_eq!(rig.cpu.mcr, MonitorCondition::SystemIntervalTimer.bit());
    assert_eq!(rig.cpu.ucr, UserCondition::ProcessIntervalTimer.bit());
    assert_eq!(rig.cpu.pending, Action::Exchange);
}

#[test]
fn process_timer_is_frozen_in_monitor_mode() {
    let mut rig = Rig::new();
    rig.cpu.monitor_mode = true;
    rig.cpu.sit = 100;
    rig.cpu.pit = 3;
    rig.cpu.tick_interval_timers(10);
    assert_eq!(rig.cpu.pit, 3);
    assert_eq!(rig.cpu.sit, 90);
    assert_eq!(rig.cpu.ucr, 0);
    assert_eq!(rig.cpu.mcr, 0);
}

#[test]
fn intrupt_posts_request_for_the_machine() {
    let mut rig = Rig::new();
    rig.map_segment(4, code_segment(0x44, ExecutePrivilege::LocalPrivileged), 1);
    let p = Pva::new(RING, 4, 0);
    rig.write_parcels(p, &[jk(0x03, 0, 6)]);
    rig.cpu.p = p;
    rig.cpu.x[6] = 2;

    rig.step();
    assert_eq!(rig.cpu.interrupt_request, Some(2));
    assert_eq!(rig.cpu.ucr, 0);
}
