//! CYBER 180 processor core: register state, the instruction step, condition handling,
//! exchange and the call/return protocol.
//!
//! A [`Cpu`] owns no memory. Every operation that touches memory takes a [`MemoryBus`], and all
//! virtual accesses go through the processor's own [`cyber_mmu::Atu`].
//!
//! [`MemoryBus`]: cyber_mem::MemoryBus

#![forbid(unsafe_code)]

mod access;
pub mod bits;
mod call;
pub mod conditions;
pub mod config;
pub mod decode;
pub mod error;
mod exchange;
pub mod exec;
pub mod float;
pub mod legacy;
pub mod observer;
pub mod state;
mod step;

pub use call::{CBP_EXTERNAL, CBP_VALID};
pub use conditions::{Action, Condition, MonitorCondition, UserCondition};
pub use config::{CpuConfig, MAX_CPUS};
pub use error::CoreError;
pub use exchange::EXCHANGE_PACKAGE_WORDS;
pub use exec::StateRegister;
pub use legacy::{LegacyContext, LegacyExit, LegacyStepper};
pub use observer::CpuObserver;
pub use state::{Cpu, Flags, IsaState, TrapControl, VMID_LEGACY, VMID_NATIVE};
pub use step::StepExit;

/// An instruction stopped early. The condition describing why has already been raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Abort;

pub type ExecResult = Result<(), Abort>;
