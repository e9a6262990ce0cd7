//! Diagnostic hooks. Every method defaults to a no-op; installing an observer never changes
//! what the processor does.

use cyber_mmu::{Access, Pva, TranslateFault};

use crate::conditions::{Action, Condition};

pub trait CpuObserver: Send {
    fn on_translate(
        &mut self,
        _cpu: usize,
        _pva: Pva,
        _access: Access,
        _result: Result<u64, TranslateFault>,
    ) {
    }

    fn on_condition(&mut self, _cpu: usize, _condition: Condition, _action: Action) {}

    /// A full exchange completed; `to_monitor` gives the new mode.
    fn on_exchange(&mut self, _cpu: usize, _to_monitor: bool, _vmid: u8) {}

    fn on_call(&mut self, _cpu: usize, _from: Pva, _to: Pva) {}

    fn on_return(&mut self, _cpu: usize, _from: Pva, _to: Pva) {}

    fn on_trap(&mut self, _cpu: usize, _from: Pva, _handler: Pva) {}

    fn on_keypoint(&mut self, _cpu: usize, _class: u8, _code: u32) {}

    /// Any cached decode of legacy-mode code must be discarded.
    fn invalidate_legacy_cache(&mut self, _cpu: usize) {}
}
