//! Translated memory access for instruction operands.
//!
//! Multi-byte transfers are split at page boundaries and each piece is translated separately.
//! A failure part way through leaves the bytes already moved in place.

use cyber_mem::MemoryBus;
use cyber_mmu::{Access, Pva};

use crate::state::Cpu;
use crate::Abort;

impl Cpu {
    /// Translate `pva` for `access` with the current key, raising the matching monitor
    /// condition on failure.
    pub(crate) fn translate(
        &mut self,
        bus: &mut dyn MemoryBus,
        pva: Pva,
        access: Access,
    ) -> Result<u64, Abort> {
        let result = self.atu.translate(bus, pva, access, self.key);
        self.observe(|o, id| o.on_translate(id, pva, access, result));
        result.map_err(|fault| self.fault_translation(&fault))
    }

    /// Bytes from `pva` to the end of its page.
    #[inline]
    fn page_remaining(&self, pva: Pva) -> usize {
        let offset = pva.bn() & self.atu.page_offset_mask();
        (self.atu.page_offset_mask() - offset) as usize + 1
    }

    pub(crate) fn read_virtual(
        &mut self,
        bus: &mut dyn MemoryBus,
        pva: Pva,
        dst: &mut [u8],
    ) -> Result<(), Abort> {
        let mut done = 0;
        while done < dst.len() {
            let at = pva.offset(done as i64);
            let rma = self.translate(bus, at, Access::READ)?;
            let chunk = self.page_remaining(at).min(dst.len() - done);
            bus.read_bytes(rma, &mut dst[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    pub(crate) fn write_virtual(
        &mut self,
        bus: &mut dyn MemoryBus,
        pva: Pva,
        src: &[u8],
    ) -> Result<(), Abort> {
        let mut done = 0;
        while done < src.len() {
            let at = pva.offset(done as i64);
            let rma = self.translate(bus, at, Access::WRITE)?;
            let chunk = self.page_remaining(at).min(src.len() - done);
            bus.write_bytes(rma, &src[done..done + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Load `len` (1..=8) bytes, right justified.
    pub(crate) fn load_bytes(
        &mut self,
        bus: &mut dyn MemoryBus,
        pva: Pva,
        len: usize,
    ) -> Result<u64, Abort> {
        let len = len.clamp(1, 8);
        if len == 8 && pva.bn() & 7 == 0 {
            let rma = self.translate(bus, pva, Access::READ)?;
            return Ok(bus.read_word(rma));
        }
        let mut buf = [0u8; 8];
        self.read_virtual(bus, pva, &mut buf[8 - len..])?;
        Ok(u64::from_be_bytes(buf))
    }

    /// Store the low `len` (1..=8) bytes of `value`.
    pub(crate) fn store_bytes(
        &mut self,
        bus: &mut dyn MemoryBus,
        pva: Pva,
        len: usize,
        value: u64,
    ) -> Result<(), Abort> {
        let len = len.clamp(1, 8);
        if len == 8 && pva.bn() & 7 == 0 {
            let rma = self.translate(bus, pva, Access::WRITE)?;
            bus.write_word(rma, value);
            return Ok(());
        }
        let bytes = value.to_be_bytes();
        self.write_virtual(bus, pva, &bytes[8 - len..])
    }

    #[inline]
    pub(crate) fn load_word(&mut self, bus: &mut dyn MemoryBus, pva: Pva) -> Result<u64, Abort> {
        self.load_bytes(bus, pva, 8)
    }

    #[inline]
    pub(crate) fn store_word(
        &mut self,
        bus: &mut dyn MemoryBus,
        pva: Pva,
        value: u64,
    ) -> Result<(), Abort> {
        self.store_bytes(bus, pva, 8, value)
    }
}
