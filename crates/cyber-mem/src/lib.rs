//! Shared real (central) memory for the CYBER 180 CPU core.
//!
//! Memory is a flat array of 64-bit words addressed by *real memory address* (RMA), a byte
//! address. Bytes within a word are numbered from the most significant end, so byte 0 of a word
//! is bits 56..=63.
//!
//! [`MemoryBus`] is the narrow interface the address translation unit and the CPU use. It is
//! implemented by [`RealMemory`] (and by `&RealMemory`, so several CPU contexts and DMA-style
//! collaborators can share one array through an `Arc`).

#![forbid(unsafe_code)]

mod real_memory;

pub use real_memory::{MemoryConfig, MemoryError, RealMemory};

/// Bytes per memory word.
pub const WORD_BYTES: u64 = 8;

/// Value returned for reads outside the configured memory.
pub const OPEN_BUS: u64 = u64::MAX;

/// Word address (RMA with the byte-in-word bits dropped).
#[inline]
pub const fn word_index(rma: u64) -> u64 {
    rma >> 3
}

#[inline]
const fn byte_shift(rma: u64) -> u32 {
    ((7 - (rma & 7)) * 8) as u32
}

/// Real-memory access used by address translation and instruction execution.
///
/// Reads and writes always operate on the whole word containing `rma`. The byte helpers are
/// built on top of them; backends may override the bulk helpers with something faster.
pub trait MemoryBus {
    fn read_word(&mut self, rma: u64) -> u64;
    fn write_word(&mut self, rma: u64, value: u64);

    /// Atomically replace the word containing `rma` with `f(old)` and return `old`.
    ///
    /// Backends shared between threads must serialize this against other read-modify-write
    /// sequences. The default is only correct for single-owner memories.
    fn read_modify_write(&mut self, rma: u64, f: &mut dyn FnMut(u64) -> u64) -> u64 {
        let old = self.read_word(rma);
        self.write_word(rma, f(old));
        old
    }

    #[inline]
    fn read_byte(&mut self, rma: u64) -> u8 {
        (self.read_word(rma) >> byte_shift(rma)) as u8
    }

    #[inline]
    fn write_byte(&mut self, rma: u64, value: u8) {
        let shift = byte_shift(rma);
        let word = self.read_word(rma);
        let merged = (word & !(0xFFu64 << shift)) | (u64::from(value) << shift);
        self.write_word(rma, merged);
    }

    /// Read consecutive bytes starting at `rma`.
    fn read_bytes(&mut self, rma: u64, dst: &mut [u8]) {
        let mut offset = 0usize;
        while offset < dst.len() {
            let addr = rma.wrapping_add(offset as u64);
            let remaining = dst.len() - offset;
            if addr & 7 == 0 && remaining >= 8 {
                dst[offset..offset + 8].copy_from_slice(&self.read_word(addr).to_be_bytes());
                offset += 8;
            } else {
                dst[offset] = self.read_byte(addr);
                offset += 1;
            }
        }
    }

    /// Write consecutive bytes starting at `rma`.
    fn write_bytes(&mut self, rma: u64, src: &[u8]) {
        let mut offset = 0usize;
        while offset < src.len() {
            let addr = rma.wrapping_add(offset as u64);
            let remaining = src.len() - offset;
            if addr & 7 == 0 && remaining >= 8 {
                let mut word = [0u8; 8];
                word.copy_from_slice(&src[offset..offset + 8]);
                self.write_word(addr, u64::from_be_bytes(word));
                offset += 8;
            } else {
                self.write_byte(addr, src[offset]);
                offset += 1;
            }
        }
    }
}

impl<T: MemoryBus + ?Sized> MemoryBus for &mut T {
    #[inline]
    fn read_word(&mut self, rma: u64) -> u64 {
        <T as MemoryBus>::read_word(&mut **self, rma)
    }

    #[inline]
    fn write_word(&mut self, rma: u64, value: u64) {
        <T as MemoryBus>::write_word(&mut **self, rma, value)
    }

    #[inline]
    fn read_modify_write(&mut self, rma: u64, f: &mut dyn FnMut(u64) -> u64) -> u64 {
        <T as MemoryBus>::read_modify_write(&mut **self, rma, f)
    }

    #[inline]
    fn read_bytes(&mut self, rma: u64, dst: &mut [u8]) {
        <T as MemoryBus>::read_bytes(&mut **self, rma, dst)
    }

    #[inline]
    fn write_bytes(&mut self, rma: u64, src: &[u8]) {
        <T as MemoryBus>::write_bytes(&mut **self, rma, src)
    }
}

impl<T: MemoryBus + ?Sized> MemoryBus for Box<T> {
    #[inline]
    fn read_word(&mut self, rma: u64) -> u64 {
        <T as MemoryBus>::read_word(&mut **self, rma)
    }

    #[inline]
    fn write_word(&mut self, rma: u64, value: u64) {
        <T as MemoryBus>::write_word(&mut **self, rma, value)
    }

    #[inline]
    fn read_modify_write(&mut self, rma: u64, f: &mut dyn FnMut(u64) -> u64) -> u64 {
        <T as MemoryBus>::read_modify_write(&mut **self, rma, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Words(Vec<u64>);

    impl MemoryBus for Words {
        fn read_word(&mut self, rma: u64) -> u64 {
            self.0[word_index(rma) as usize]
        }

        fn write_word(&mut self, rma: u64, value: u64) {
            self.0[word_index(rma) as usize] = value;
        }
    }

    #[test]
    fn bytes_are_big_endian_within_a_word() {
        let mut mem = Words(vec![0x0102_0304_0506_0708, 0]);
        assert_eq!(mem.read_byte(0), 0x01);
        assert_eq!(mem.read_byte(7), 0x08);

        mem.write_byte(9, 0xAB);
        assert_eq!(mem.0[1], 0x00AB_0000_0000_0000);
    }

    #[test]
    fn bulk_helpers_cross_word_boundaries() {
        let mut mem = Words(vec![0; 4]);
        let src: Vec<u8> = (1..=13).collect();
        mem.write_bytes(5, &src);

        let mut dst = [0u8; 13];
        mem.read_bytes(5, &mut dst);
        assert_eq!(&dst[..], &src[..]);
        assert_eq!(mem.0[0], 0x0000_0000_0001_0203);
    }

    #[test]
    fn default_read_modify_write_returns_old_value() {
        let mut mem = Words(vec![0x10]);
        let old = mem.read_modify_write(0, &mut |w| w | 1);
        assert_eq!(old, 0x10);
        assert_eq!(mem.0[0], 0x11);
    }
}
