//! A CYBER 180 mainframe: shared central memory and the processors attached to it.
//!
//! [`Machine`] is the arena the external scheduler drives. It owns every [`Cpu`] and hands each
//! one the shared [`RealMemory`] for the duration of a step; it also carries inter-processor
//! interrupts posted by `INTRUPT` to their target.

#![forbid(unsafe_code)]

mod config;

use std::sync::Arc;

pub use config::{ConfigError, MachineConfig};
pub use cyber_cpu_core::{
    Action, CoreError, Cpu, CpuConfig, CpuObserver, LegacyStepper, MonitorCondition, StepExit,
    UserCondition,
};
pub use cyber_mem::{MemoryBus, MemoryConfig, RealMemory};

pub struct Machine {
    config: MachineConfig,
    memory: Arc<RealMemory>,
    cpus: Vec<Cpu>,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let memory = Arc::new(RealMemory::new(&config.memory)?);
        let cpus = (0..config.cpu.count)
            .map(|id| Cpu::new(id, &config.cpu))
            .collect();
        tracing::debug!(
            cpus = config.cpu.count,
            words = config.memory.size_words,
            "machine created"
        );
        Ok(Self {
            config,
            memory,
            cpus,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Self::new(MachineConfig::from_json(json)?)
    }

    #[inline]
    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// The shared memory, for collaborators that run alongside the processors.
    #[inline]
    pub fn memory(&self) -> &Arc<RealMemory> {
        &self.memory
    }

    #[inline]
    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    pub fn cpu(&self, id: usize) -> Result<&Cpu, CoreError> {
        self.cpus.get(id).ok_or(CoreError::NoSuchCpu(id))
    }

    pub fn cpu_mut(&mut self, id: usize) -> Result<&mut Cpu, CoreError> {
        self.cpus.get_mut(id).ok_or(CoreError::NoSuchCpu(id))
    }

    /// Execute one step on processor `id`, then deliver any interrupt it posted.
    pub fn step_cpu(&mut self, id: usize) -> Result<StepExit, CoreError> {
        let cpu = self.cpus.get_mut(id).ok_or(CoreError::NoSuchCpu(id))?;
        let mut bus = &*self.memory;
        let exit = cpu.step(&mut bus);
        if let Some(target) = cpu.interrupt_request.take() {
            self.deliver_interrupt(id, target);
        }
        Ok(exit)
    }

    /// One step on every processor in id order. Returns how many were still running.
    pub fn step_all(&mut self) -> usize {
        let mut running = 0;
        for id in 0..self.cpus.len() {
            if let Ok(exit) = self.step_cpu(id) {
                if exit != StepExit::Halted {
                    running += 1;
                }
            }
        }
        running
    }

    fn deliver_interrupt(&mut self, from: usize, target: usize) {
        match self.cpus.get_mut(target) {
            Some(cpu) => {
                tracing::debug!(from, target, "external interrupt");
                cpu.raise_monitor(MonitorCondition::ExternalInterrupt);
            }
            None => tracing::warn!(from, target, "interrupt to nonexistent processor dropped"),
        }
    }

    /// Advance every processor's interval timers by `elapsed` ticks.
    pub fn tick(&mut self, elapsed: u32) {
        for cpu in &mut self.cpus {
            cpu.tick_interval_timers(elapsed);
        }
    }

    pub fn raise_monitor_condition(
        &mut self,
        id: usize,
        cond: MonitorCondition,
    ) -> Result<(), CoreError> {
        self.cpu_mut(id)?.raise_monitor(cond);
        Ok(())
    }

    pub fn raise_user_condition(&mut self, id: usize, cond: UserCondition) -> Result<(), CoreError> {
        self.cpu_mut(id)?.raise_user(cond);
        Ok(())
    }

    /// Read a word without address translation.
    #[inline]
    pub fn read_real_word(&self, rma: u64) -> u64 {
        self.memory.load(rma)
    }

    /// Write a word without address translation.
    #[inline]
    pub fn write_real_word(&self, rma: u64, value: u64) {
        self.memory.store(rma, value);
    }

    /// Copy consecutive words into memory starting at the word-aligned `rma`.
    pub fn load_words(&self, rma: u64, words: &[u64]) {
        self.memory.load_words(rma, words);
    }

    /// Start processor `id` in monitor mode from the exchange package at `rma`, or from the
    /// configured monitor package when `rma` is `None`.
    pub fn deadstart(&mut self, id: usize, rma: Option<u32>) -> Result<(), CoreError> {
        let rma = rma
            .or(self.config.cpu.monitor_exchange_package)
            .unwrap_or(0);
        let cpu = self.cpus.get_mut(id).ok_or(CoreError::NoSuchCpu(id))?;
        let mut bus = &*self.memory;
        cpu.load_exchange_package(&mut bus, rma, true)?;
        cpu.restart();
        tracing::info!(cpu = id, rma, p = %cpu.p, "deadstart");
        Ok(())
    }
}
