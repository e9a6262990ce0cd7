//! CYBER 180 address translation: PVA → RMA through the segment descriptor table and the
//! hashed page table.
//!
//! A PVA names a ring, a segment and a byte number. The segment selects an SDE (from the table at
//! STA, bounded by STL) which carries the ring brackets, protection levels, lock and the active
//! segment identifier (ASID). The ASID and page number are hashed into the page table; entries
//! are probed linearly while their continue bit is set, up to [`MAX_PROBES`] entries.
//!
//! The unit keeps no translation cache, so page or segment table updates take effect on the next
//! access.

#![forbid(unsafe_code)]

mod descriptor;
mod pva;

use bitflags::bitflags;
use cyber_mem::{MemoryBus, WORD_BYTES};
use thiserror::Error;

pub use descriptor::{
    spid, ExecutePrivilege, PageTableEntry, Protection, SegmentDescriptor, PTE_CONTINUE,
    PTE_MODIFIED, PTE_USED, PTE_VALID,
};
pub use pva::{Pva, PVA_MASK};


/// Longest page-table chain the hardware searches before reporting a page fault.
pub const MAX_PROBES: u32 = 32;

/// Smallest page size is 512 bytes.
pub const MIN_PAGE_SHIFT: u32 = 9;

/// Page size mask selecting 512-byte pages.
pub const PSM_512: u8 = 0x7F;

bitflags! {
    /// Requested access modes; a translation checks every requested mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const EXECUTE = 1 << 0;
        const READ = 1 << 1;
        const WRITE = 1 << 2;
    }
}

/// A translation failure. Each variant maps onto one monitor condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TranslateFault {
    /// Byte number has its sign bit set.
    #[error("address specification error at {0}")]
    AddressSpecification(Pva),
    /// Ring zero, segment beyond the table length, or invalid SDE.
    #[error("invalid segment at {0}")]
    InvalidSegment(Pva),
    #[error("access violation at {0}")]
    AccessViolation(Pva),
    /// No page table entry matched within the probe limit.
    #[error("page table search without find at {0}")]
    PageFault(Pva),
}

impl TranslateFault {
    pub fn pva(&self) -> Pva {
        match *self {
            Self::AddressSpecification(pva)
            | Self::InvalidSegment(pva)
            | Self::AccessViolation(pva)
            | Self::PageFault(pva) => pva,
        }
    }
}

/// Result of a side-effect free page table search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLookup {
    /// Index of the matching entry within the page table.
    pub index: u32,
    /// Real address of the entry itself.
    pub entry_rma: u64,
    pub entry: PageTableEntry,
    /// Translated real address of the probed PVA.
    pub rma: u64,
}

/// Address translation unit state for one CPU.
#[derive(Debug, Clone)]
pub struct Atu {
    sta: u32,
    stl: u16,
    pta: u32,
    ptl: u8,
    psm: u8,
    page_shift: u32,
    page_offset_mask: u32,
    page_table_mask: u32,
    utp: Pva,
    exec_privilege: ExecutePrivilege,
}

impl Default for Atu {
    fn default() -> Self {
        Self::new()
    }
}

impl Atu {
    pub fn new() -> Self {
        let mut atu = Self {
            sta: 0,
            stl: 0,
            pta: 0,
            ptl: 0,
            psm: PSM_512,
            page_shift: MIN_PAGE_SHIFT,
            page_offset_mask: 0,
            page_table_mask: 0,
            utp: Pva::default(),
            exec_privilege: ExecutePrivilege::NonExecutable,
        };
        atu.update_cached_state();
        atu
    }

    /// Recompute the page geometry derived from PSM and PTL.
    #[inline]
    fn update_cached_state(&mut self) {
        // Each clear bit of the 7-bit mask doubles the page size.
        self.page_shift = MIN_PAGE_SHIFT + (self.psm | 0x80).count_zeros();
        self.page_offset_mask = (1u32 << self.page_shift) - 1;
        self.page_table_mask = (u32::from(self.ptl) << 9) | 0x1FF;
    }

    #[inline]
    pub fn segment_table(&self) -> (u32, u16) {
        (self.sta, self.stl)
    }

    pub fn set_segment_table(&mut self, sta: u32, stl: u16) {
        self.sta = sta;
        self.stl = stl & 0xFFF;
    }

    #[inline]
    pub fn page_table(&self) -> (u32, u8) {
        (self.pta, self.ptl)
    }

    pub fn set_page_table(&mut self, pta: u32, ptl: u8) {
        self.pta = pta;
        self.ptl = ptl;
        self.update_cached_state();
    }

    #[inline]
    pub fn page_size_mask(&self) -> u8 {
        self.psm
    }

    pub fn set_page_size_mask(&mut self, psm: u8) {
        self.psm = psm & 0x7F;
        self.update_cached_state();
    }

    #[inline]
    pub fn page_shift(&self) -> u32 {
        self.page_shift
    }

    #[inline]
    pub fn page_offset_mask(&self) -> u32 {
        self.page_offset_mask
    }

    /// Number of entries in the page table.
    #[inline]
    pub fn page_table_entries(&self) -> u32 {
        self.page_table_mask + 1
    }

    /// Faulting PVA recorded by the most recent failed translation.
    #[inline]
    pub fn untranslatable_pointer(&self) -> Pva {
        self.utp
    }

    pub fn set_untranslatable_pointer(&mut self, pva: Pva) {
        self.utp = pva;
    }

    /// Execute privilege of the segment most recently translated for execution.
    #[inline]
    pub fn execute_privilege(&self) -> ExecutePrivilege {
        self.exec_privilege
    }

    /// Page number of `bn` under the current page size.
    #[inline]
    pub fn page_of(&self, bn: u32) -> u32 {
        bn >> self.page_shift
    }

    #[inline]
    fn hash(&self, asid: u16, page: u32) -> u32 {
        (u32::from(asid) ^ page) & self.page_table_mask
    }

    #[inline]
    fn page_entry_rma(&self, index: u32) -> u64 {
        u64::from(self.pta) + u64::from(index & self.page_table_mask) * WORD_BYTES
    }

    #[inline]
    fn segment_entry_rma(&self, segment: u16) -> u64 {
        u64::from(self.sta) + u64::from(segment) * WORD_BYTES
    }

    /// Read the SDE for `segment` without any validation beyond the table length.
    pub fn segment_descriptor<B: MemoryBus + ?Sized>(
        &self,
        bus: &mut B,
        segment: u16,
    ) -> Option<SegmentDescriptor> {
        if segment > self.stl {
            return None;
        }
        Some(SegmentDescriptor::from_word(
            bus.read_word(self.segment_entry_rma(segment)),
        ))
    }

    /// Address, ring and segment validation shared by translation and probing.
    fn resolve_segment<B: MemoryBus + ?Sized>(
        &self,
        bus: &mut B,
        pva: Pva,
    ) -> Result<SegmentDescriptor, TranslateFault> {
        if pva.bn() & 0x8000_0000 != 0 {
            return Err(TranslateFault::AddressSpecification(pva));
        }
        if pva.ring() == 0 {
            return Err(TranslateFault::InvalidSegment(pva));
        }
        match self.segment_descriptor(bus, pva.segment()) {
            Some(sde) if sde.valid => Ok(sde),
            _ => Err(TranslateFault::InvalidSegment(pva)),
        }
    }

    fn search<B: MemoryBus + ?Sized>(
        &self,
        bus: &mut B,
        sde: &SegmentDescriptor,
        pva: Pva,
    ) -> Option<PageLookup> {
        let page = self.page_of(pva.bn());
        let key = spid(sde.asid, page);
        let start = self.hash(sde.asid, page);

        for probe in 0..MAX_PROBES {
            let index = (start + probe) & self.page_table_mask;
            let entry_rma = self.page_entry_rma(index);
            let entry = PageTableEntry::from_word(bus.read_word(entry_rma));
            if entry.valid && entry.spid == key {
                return Some(PageLookup {
                    index,
                    entry_rma,
                    entry,
                    rma: entry.frame_rma() | u64::from(pva.bn() & self.page_offset_mask),
                });
            }
            if !entry.cont {
                break;
            }
        }
        None
    }

    fn check_access(
        sde: &SegmentDescriptor,
        pva: Pva,
        access: Access,
        key: u8,
    ) -> Result<(), TranslateFault> {
        let ring = pva.ring();
        let ok = (!access.contains(Access::EXECUTE) || sde.can_execute(ring, key))
            && (!access.contains(Access::READ) || sde.can_read(ring, key))
            && (!access.contains(Access::WRITE) || sde.can_write(ring, key));
        if ok {
            Ok(())
        } else {
            Err(TranslateFault::AccessViolation(pva))
        }
    }

    /// Translate a PVA to a real address, validating `access` against the segment descriptor
    /// with the ring taken from the PVA and the given `key`.
    ///
    /// On success the page's used bit (and modified bit for writes) is set. On failure the PVA
    /// is recorded as the untranslatable pointer.
    pub fn translate<B: MemoryBus + ?Sized>(
        &mut self,
        bus: &mut B,
        pva: Pva,
        access: Access,
        key: u8,
    ) -> Result<u64, TranslateFault> {
        match self.translate_inner(bus, pva, access, key) {
            Ok(rma) => Ok(rma),
            Err(fault) => {
                self.utp = pva;
                tracing::trace!(%pva, ?access, key, %fault, "translation fault");
                Err(fault)
            }
        }
    }

    fn translate_inner<B: MemoryBus + ?Sized>(
        &mut self,
        bus: &mut B,
        pva: Pva,
        access: Access,
        key: u8,
    ) -> Result<u64, TranslateFault> {
        let sde = self.resolve_segment(bus, pva)?;
        Self::check_access(&sde, pva, access, key)?;

        let hit = self
            .search(bus, &sde, pva)
            .ok_or(TranslateFault::PageFault(pva))?;

        let mut word = hit.entry.to_word() | PTE_USED;
        if access.contains(Access::WRITE) {
            word |= PTE_MODIFIED;
        }
        if word != hit.entry.to_word() {
            bus.write_word(hit.entry_rma, word);
        }

        if access.contains(Access::EXECUTE) {
            self.exec_privilege = sde.execute;
        }
        Ok(hit.rma)
    }

    /// Search for the page holding `pva` without access checks or any side effect.
    ///
    /// Segment-level failures are still reported; a missing page yields `Ok(None)`.
    pub fn probe<B: MemoryBus + ?Sized>(
        &self,
        bus: &mut B,
        pva: Pva,
    ) -> Result<Option<PageLookup>, TranslateFault> {
        let sde = self.resolve_segment(bus, pva)?;
        Ok(self.search(bus, &sde, pva))
    }

    /// Write an SDE into the segment table. Returns `false` if `segment` is beyond STL.
    pub fn install_segment<B: MemoryBus + ?Sized>(
        &self,
        bus: &mut B,
        segment: u16,
        sde: &SegmentDescriptor,
    ) -> bool {
        if segment > self.stl {
            return false;
        }
        bus.write_word(self.segment_entry_rma(segment), sde.to_word());
        true
    }

    /// Enter a valid page for (`asid`, `page`) at the first free slot of its hash chain.
    ///
    /// Occupied entries passed over get their continue bit set so the search reaches the new
    /// entry. An existing entry for the same key is replaced in place. Returns the entry index,
    /// or `None` if no slot is free within [`MAX_PROBES`] entries.
    pub fn install_page<B: MemoryBus + ?Sized>(
        &self,
        bus: &mut B,
        asid: u16,
        page: u32,
        pfa: u32,
    ) -> Option<u32> {
        let key = spid(asid, page);
        let start = self.hash(asid, page);

        let mut slot = None;
        for probe in 0..MAX_PROBES {
            let index = (start + probe) & self.page_table_mask;
            let entry = PageTableEntry::from_word(bus.read_word(self.page_entry_rma(index)));
            if !entry.valid || entry.spid == key {
                slot = Some((probe, entry.cont));
                break;
            }
        }
        let (len, cont) = slot?;

        for probe in 0..len {
            let rma = self.page_entry_rma(start + probe);
            let word = bus.read_word(rma);
            bus.write_word(rma, word | PTE_CONTINUE);
        }

        let index = (start + len) & self.page_table_mask;
        let entry = PageTableEntry {
            valid: true,
            cont,
            used: false,
            modified: false,
            spid: key,
            pfa: pfa & 0x3F_FFFF,
        };
        bus.write_word(self.page_entry_rma(index), entry.to_word());
        Some(index)
    }
}
