//! The per-instruction step: resolve pending actions, fetch, decode, dispatch, commit.

use cyber_mem::MemoryBus;
use cyber_mmu::{Access, Pva};

use crate::conditions::{Action, MonitorCondition, UserCondition};
use crate::decode::Instruction;
use crate::exec::OPCODES;
use crate::legacy::LegacyExit;
use crate::state::{Cpu, IsaState};
use crate::Abort;

/// What a call to [`Cpu::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepExit {
    /// An instruction was dispatched and its P committed.
    Executed,
    /// The instruction fetch failed; nothing was committed.
    Aborted,
    /// The step was spent on a pending trap or exchange that left another action pending.
    Resolved,
    /// The processor is stopped.
    Halted,
    /// Legacy mode with no legacy stepper installed.
    Legacy,
}

/// Count `old` down by `elapsed`; expiry is reaching zero or wrapping past it.
#[inline]
fn count_down(old: u32, elapsed: u32) -> (u32, bool) {
    let new = old.wrapping_sub(elapsed);
    (new, new > old || new == 0)
}

impl Cpu {
    /// Execute one step.
    pub fn step<B: MemoryBus>(&mut self, bus: &mut B) -> StepExit {
        let bus: &mut dyn MemoryBus = bus;
        if self.stopped {
            return StepExit::Halted;
        }
        self.free_running = self.free_running.wrapping_add(1);

        if !self.resolve_pending(bus) {
            return if self.stopped {
                StepExit::Halted
            } else {
                StepExit::Resolved
            };
        }

        if self.isa.is_legacy() {
            return self.step_legacy(bus);
        }

        let p = self.p;
        self.cur_p = p;
        self.next_p = p;
        self.next_key = self.key;
        self.step_completes = true;

        let Ok(first) = self.fetch_parcel(bus, p) else {
            return StepExit::Aborted;
        };
        let entry = &OPCODES[usize::from(first >> 8)];
        let second = if entry.format.has_second_parcel() {
            match self.fetch_parcel(bus, p.offset(2)) {
                Ok(parcel) => parcel,
                Err(Abort) => return StepExit::Aborted,
            }
        } else {
            0
        };
        self.inst = Instruction::decode(entry.format, first, second);
        self.next_p = p.offset(i64::from(self.inst.len()));

        self.executing = true;
        let result = self.execute(bus);
        self.executing = false;
        if result.is_err() {
            tracing::trace!(cpu = self.id, p = %p, mnemonic = entry.mnemonic, "instruction aborted");
        }

        self.p = self.next_p;
        self.key = self.next_key;
        if self.step_completes {
            self.retired += 1;
        }
        StepExit::Executed
    }

    /// Fetch the 16-bit parcel at `pva`.
    fn fetch_parcel(&mut self, bus: &mut dyn MemoryBus, pva: Pva) -> Result<u16, Abort> {
        if pva.bn() & 1 != 0 {
            self.atu.set_untranslatable_pointer(pva);
            return Err(self.fault_monitor(MonitorCondition::AddressSpecification));
        }
        let rma = self.translate(bus, pva, Access::EXECUTE)?;
        let shift = (6 - (rma & 6)) * 8;
        Ok((bus.read_word(rma) >> shift) as u16)
    }

    fn step_legacy(&mut self, bus: &mut dyn MemoryBus) -> StepExit {
        let (Some(stepper), IsaState::Legacy(ctx)) = (self.legacy.as_deref_mut(), &mut self.isa)
        else {
            return StepExit::Legacy;
        };
        let exit = stepper.step(ctx, bus);
        let bn = ctx.p_bn();
        self.p = self.p.with_bn(bn);

        match exit {
            LegacyExit::Continue => self.retired += 1,
            LegacyExit::ExchangeJump => {
                tracing::debug!(cpu = self.id, p = %self.p, "legacy exchange jump");
                self.retired += 1;
                self.raise_monitor(MonitorCondition::SystemCall);
            }
            LegacyExit::Halt => {
                tracing::warn!(cpu = self.id, p = %self.p, "legacy processor halted");
                self.escalate(Action::Halt);
            }
        }
        StepExit::Executed
    }

    /// Advance the interval timers by `elapsed` ticks. The system interval timer always runs;
    /// the process interval timer runs only in job mode.
    pub fn tick_interval_timers(&mut self, elapsed: u32) {
        if elapsed == 0 {
            return;
        }
        let (sit, expired) = count_down(self.sit, elapsed);
        self.sit = sit;
        if expired {
            self.raise_monitor(MonitorCondition::SystemIntervalTimer);
        }
        if !self.monitor_mode {
            let (pit, expired) = count_down(self.pit, elapsed);
            self.pit = pit;
            if expired {
                self.raise_user(UserCondition::ProcessIntervalTimer);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_down_detects_zero_and_wrap() {
        assert_eq!(count_down(10, 3), (7, false));
        assert_eq!(count_down(3, 3), (0, true));
        assert_eq!(count_down(2, 3), (u32::MAX, true));
        assert_eq!(count_down(0, 1), (u32::MAX, true));
    }
}
