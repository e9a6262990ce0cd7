use cyber_mmu::Pva;
use thiserror::Error;

/// Errors surfaced to the host rather than to the emulated program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("processor count {count} outside 1..={max}")]
    CpuCount { count: usize, max: usize },
    #[error("ring {0} is not a valid starting ring")]
    InvalidRing(u8),
    #[error("page size mask {0:#x} wider than 7 bits")]
    PageSizeMask(u8),
    #[error("exchange package address {0:#x} is not word aligned")]
    MisalignedExchangePackage(u32),
    #[error("exchange package at {rma:#x} has unsupported VMID {vmid}")]
    UnsupportedVmid { rma: u32, vmid: u8 },
    #[error("legacy exchange package at {rma:#x} cannot run {reason}")]
    LegacyNotAllowed { rma: u32, reason: &'static str },
    #[error("trap frame could not be built (untranslatable pointer {utp})")]
    TrapEntry { utp: Pva },
    #[error("no processor {0}")]
    NoSuchCpu(usize),
}
