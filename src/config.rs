use cyber_cpu_core::{CoreError, CpuConfig, EXCHANGE_PACKAGE_WORDS};
use cyber_mem::{MemoryConfig, MemoryError, WORD_BYTES};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Cpu(#[from] CoreError),
    #[error("exchange package at {rma:#x} does not fit in {size_bytes:#x} bytes of memory")]
    ExchangePackageOutOfRange { rma: u32, size_bytes: u64 },
    #[error("malformed machine configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything needed to build a [`crate::Machine`].
///
/// Missing fields take their defaults, so `{}` is a valid configuration:
///
/// ```
/// let config = cyber180::MachineConfig::from_json(r#"{ "cpu": { "count": 2 } }"#).unwrap();
/// assert_eq!(config.cpu.count, 2);
/// assert_eq!(config.memory.size_words, 1 << 20);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub memory: MemoryConfig,
    pub cpu: CpuConfig,
}

impl MachineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.memory.validate()?;
        self.cpu.validate()?;

        let size_bytes = self.memory.size_words * WORD_BYTES;
        let package_bytes = EXCHANGE_PACKAGE_WORDS as u64 * WORD_BYTES;
        for rma in [self.cpu.monitor_exchange_package, self.cpu.job_exchange_package]
            .into_iter()
            .flatten()
        {
            if u64::from(rma) + package_bytes > size_bytes && !self.memory.wrap_addresses {
                return Err(ConfigError::ExchangePackageOutOfRange { rma, size_bytes });
            }
        }
        Ok(())
    }
}
