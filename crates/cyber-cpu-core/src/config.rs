use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Most processors a machine may configure.
pub const MAX_CPUS: usize = 16;

/// Processor configuration applied at deadstart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Number of processor contexts to allocate.
    pub count: usize,
    /// Initial page size mask (0x7F selects 512-byte pages).
    pub page_size_mask: u8,
    /// Ring of the initial program address when no exchange package is loaded.
    pub start_ring: u8,
    /// Processors start stopped and wait for an external deadstart.
    pub start_halted: bool,
    pub monitor_mask: u16,
    pub user_mask: u16,
    /// Real address of the monitor exchange package loaded at deadstart.
    pub monitor_exchange_package: Option<u32>,
    /// Initial job exchange package pointer.
    pub job_exchange_package: Option<u32>,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            count: 1,
            page_size_mask: 0x7F,
            start_ring: 1,
            start_halted: false,
            monitor_mask: 0xFFFF,
            user_mask: 0xFFFF,
            monitor_exchange_package: None,
            job_exchange_package: None,
        }
    }
}

impl CpuConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.count == 0 || self.count > MAX_CPUS {
            return Err(CoreError::CpuCount {
                count: self.count,
                max: MAX_CPUS,
            });
        }
        if !(1..=15).contains(&self.start_ring) {
            return Err(CoreError::InvalidRing(self.start_ring));
        }
        if self.page_size_mask > 0x7F {
            return Err(CoreError::PageSizeMask(self.page_size_mask));
        }
        for rma in [self.monitor_exchange_package, self.job_exchange_package]
            .into_iter()
            .flatten()
        {
            if rma & 7 != 0 {
                return Err(CoreError::MisalignedExchangePackage(rma));
            }
        }
        Ok(())
    }
}
