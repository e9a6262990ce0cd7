mod common;

use std::sync::{Arc, Mutex};

use common::{code, jk, Rig, CODE, STA};
use cyber_cpu_core::{
    Action, CoreError, CpuObserver, LegacyContext, LegacyExit, LegacyStepper, MonitorCondition,
    StepExit, EXCHANGE_PACKAGE_WORDS,
};
use cyber_mem::MemoryBus;
use cyber_mmu::Pva;

const JPS: u32 = 0x2000;
const MPS: u32 = 0x2400;
const SPARE: u32 = 0x2800;

const EXCHANGE: u16 = 0x0200;

fn write_package(rig: &Rig, rma: u32, words: &[(usize, u64)]) {
    let mut bus = &rig.mem;
    for i in 0..EXCHANGE_PACKAGE_WORDS {
        bus.write_word(u64::from(rma) + 8 * i as u64, 0);
    }
    for &(i, w) in words {
        bus.write_word(u64::from(rma) + 8 * i as u64, w);
    }
}

fn package_word(rig: &Rig, rma: u32, word: usize) -> u64 {
    let mut bus = &rig.mem;
    bus.read_word(u64::from(rma) + 8 * word as u64)
}

/// Monitor package running at ring 1 in the rig's code segment.
fn monitor_package(rig: &Rig, p: Pva) {
    write_package(
        rig,
        MPS,
        &[
            (0, p.bits()),
            (3, 0x8000 << 48),
            (5, 0xFFFF << 48),
            (35, (15 << 32) | u64::from(STA)),
        ],
    );
}

#[derive(Default)]
struct Exchanges(Arc<Mutex<Vec<(bool, u8)>>>);

impl CpuObserver for Exchanges {
    fn on_exchange(&mut self, _cpu: usize, to_monitor: bool, vmid: u8) {
        self.0.lock().unwrap().push((to_monitor, vmid));
    }
}

#[test]
fn exchange_instruction_round_trip() {
    let mut rig = Rig::new();
    let log = Exchanges::default();
    let seen = Arc::clone(&log.0);
    rig.cpu.set_observer(Box::new(log));
    rig.cpu.jps = JPS;
    rig.cpu.mps = MPS;

    // Job: EXCHANGE, then ENTP 7 -> X4.
    rig.load_code(&[EXCHANGE, jk(0x3D, 7, 4)]);
    let monitor_p = Pva::new(1, CODE, 0x80);
    rig.write_parcels(monitor_p, &[EXCHANGE]);
    monitor_package(&rig, monitor_p);
    rig.cpu.x[9] = 0x99;

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.cpu.mcr, MonitorCondition::SystemCall.bit());
    assert_eq!(rig.cpu.pending, Action::Exchange);
    assert_eq!(rig.cpu.p, code(2));

    // Into the monitor, which exchanges straight back.
    assert_eq!(rig.step(), StepExit::Executed);
    assert!(rig.cpu.monitor_mode);
    assert_eq!(rig.cpu.p, monitor_p.offset(2));
    assert_eq!(rig.cpu.x[9], 0);
    assert_eq!(rig.cpu.pending, Action::Exchange);
    assert_eq!(package_word(&rig, JPS, 0), code(2).bits());
    assert_eq!(package_word(&rig, JPS, 7) >> 48, u64::from(MonitorCondition::SystemCall.bit()));
    assert_eq!(package_word(&rig, JPS, 17 + 9), 0x99);
    assert_eq!(package_word(&rig, JPS, 33), u64::from(MPS));

    // The monitor acknowledges the system call.
    {
        let mut bus = &rig.mem;
        bus.write_word(u64::from(JPS) + 8 * 7, 0);
    }

    assert_eq!(rig.step(), StepExit::Executed);
    assert!(!rig.cpu.monitor_mode);
    assert_eq!(rig.cpu.mcr, 0);
    assert_eq!(rig.cpu.x[9], 0x99);
    assert_eq!(rig.cpu.x[4], 7);
    assert_eq!(rig.cpu.p, code(4));
    assert_eq!(rig.cpu.mps, MPS);
    assert_eq!(package_word(&rig, MPS, 0), monitor_p.offset(2).bits());

    assert_eq!(*seen.lock().unwrap(), vec![(true, 0), (false, 0)]);
}

#[test]
fn exchange_to_unsupported_job_package_raises_environment_specification() {
    let mut rig = Rig::new();
    rig.cpu.monitor_mode = true;
    rig.cpu.p = Pva::new(1, CODE, 0x80);
    rig.cpu.jps = JPS;
    rig.cpu.mps = MPS;
    rig.write_parcels(rig.cpu.p, &[EXCHANGE]);
    write_package(&rig, JPS, &[(0, code(0).bits()), (1, 2 << 60)]);

    rig.step();
    assert_eq!(rig.cpu.pending, Action::Exchange);
    rig.step();
    assert!(rig.cpu.monitor_mode);
    assert_ne!(rig.cpu.mcr & MonitorCondition::EnvironmentSpecification.bit(), 0);
    // Nothing was stored at MPS.
    assert_eq!(package_word(&rig, MPS, 0), 0);
}

#[test]
fn bad_monitor_package_stops_the_processor() {
    let mut rig = Rig::new();
    rig.cpu.jps = JPS;
    rig.cpu.mps = MPS;
    write_package(&rig, MPS, &[(1, 1 << 60)]);
    rig.cpu.escalate(Action::Exchange);

    assert_eq!(rig.step(), StepExit::Halted);
    assert!(rig.cpu.stopped);
}

#[test]
fn load_validates_vmid_and_legacy_placement() {
    let mut rig = Rig::new();
    let mut bus = &rig.mem;

    write_package(&rig, SPARE, &[(0, code(0).bits()), (1, 2 << 60)]);
    assert_eq!(
        rig.cpu.load_exchange_package(&mut bus, SPARE, false),
        Err(CoreError::UnsupportedVmid { rma: SPARE, vmid: 2 })
    );

    write_package(&rig, SPARE, &[(0, code(0).bits()), (1, 1 << 60)]);
    assert!(matches!(
        rig.cpu.load_exchange_package(&mut bus, SPARE, true),
        Err(CoreError::LegacyNotAllowed { .. })
    ));

    write_package(&rig, SPARE, &[(0, Pva::new(1, CODE, 0).bits()), (1, 1 << 60)]);
    assert_eq!(
        rig.cpu.load_exchange_package(&mut bus, SPARE, false),
        Err(CoreError::LegacyNotAllowed {
            rma: SPARE,
            reason: "in ring 1"
        })
    );

    assert_eq!(
        rig.cpu.load_exchange_package(&mut bus, SPARE + 4, false),
        Err(CoreError::MisalignedExchangePackage(SPARE + 4))
    );
}

#[test]
fn legacy_package_round_trips_through_store() {
    let mut rig = Rig::new();
    let p = code(0x18);
    write_package(&rig, SPARE, &[(0, p.bits()), (1, 1 << 60), (17, 5)]);
    {
        let mut bus = &rig.mem;
        rig.cpu
            .load_exchange_package(&mut bus, SPARE, false)
            .unwrap();
    }
    assert!(rig.cpu.isa.is_legacy());
    assert_eq!(rig.step(), StepExit::Legacy);

    let mut bus = &rig.mem;
    rig.cpu.store_exchange_package(&mut bus, JPS);
    assert_eq!(package_word(&rig, JPS, 0), p.bits());
    assert_eq!(package_word(&rig, JPS, 1) >> 60, 1);
    assert_eq!(package_word(&rig, JPS, 17), 5);
}

struct CountingStepper {
    exit_after: u32,
}

impl LegacyStepper for CountingStepper {
    fn step(&mut self, ctx: &mut LegacyContext, _bus: &mut dyn MemoryBus) -> LegacyExit {
        ctx.p += 1;
        if self.exit_after == 0 {
            return LegacyExit::ExchangeJump;
        }
        self.exit_after -= 1;
        LegacyExit::Continue
    }
}

#[test]
fn legacy_stepper_drives_p_and_exchange_jump_calls_monitor() {
    let mut rig = Rig::new();
    write_package(&rig, SPARE, &[(0, code(0x18).bits()), (1, 1 << 60)]);
    {
        let mut bus = &rig.mem;
        rig.cpu
            .load_exchange_package(&mut bus, SPARE, false)
            .unwrap();
    }
    rig.cpu.set_legacy_stepper(Box::new(CountingStepper { exit_after: 1 }));

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.cpu.p, code(0x20));
    assert_eq!(rig.cpu.pending, Action::Continue);

    assert_eq!(rig.step(), StepExit::Executed);
    assert_eq!(rig.cpu.p, code(0x28));
    assert_eq!(rig.cpu.mcr, MonitorCondition::SystemCall.bit());
    assert_eq!(rig.cpu.pending, Action::Exchange);
    assert_eq!(rig.cpu.retired, 2);
}
