use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{word_index, MemoryBus, OPEN_BUS};

/// Largest supported memory: the RMA is 32 bits wide.
pub const MAX_WORDS: u64 = 1 << 29;

/// Errors returned when constructing [`RealMemory`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("real memory size must be non-zero")]
    ZeroSize,
    #[error("real memory size {words:#x} words exceeds the {max:#x}-word RMA space")]
    TooLarge { words: u64, max: u64 },
}

/// Sizing and addressing policy for [`RealMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Number of 64-bit words.
    pub size_words: u64,
    /// Wrap out-of-range addresses modulo the memory size instead of treating them as open bus.
    pub wrap_addresses: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            size_words: 1 << 20,
            wrap_addresses: false,
        }
    }
}

impl MemoryConfig {
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.size_words == 0 {
            return Err(MemoryError::ZeroSize);
        }
        if self.size_words > MAX_WORDS {
            return Err(MemoryError::TooLarge {
                words: self.size_words,
                max: MAX_WORDS,
            });
        }
        Ok(())
    }
}

/// Flat word-addressed central memory.
///
/// All accessors take `&self`: words are stored as relaxed atomics so a single array can be
/// shared between CPU contexts and collaborator threads. Plain reads and writes are not ordered
/// against each other; [`RealMemory::update`] (and [`MemoryBus::read_modify_write`]) hold a
/// dedicated lock for the whole read-modify-write sequence.
#[derive(Debug)]
pub struct RealMemory {
    words: Box<[AtomicU64]>,
    wrap: bool,
    rmw_lock: Mutex<()>,
}

impl RealMemory {
    pub fn new(config: &MemoryConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        let words = (0..config.size_words).map(|_| AtomicU64::new(0)).collect();
        Ok(Self {
            words,
            wrap: config.wrap_addresses,
            rmw_lock: Mutex::new(()),
        })
    }

    /// Memory of `size_words` words with open-bus (non-wrapping) addressing.
    pub fn with_words(size_words: u64) -> Result<Self, MemoryError> {
        Self::new(&MemoryConfig {
            size_words,
            wrap_addresses: false,
        })
    }

    #[inline]
    pub fn size_words(&self) -> u64 {
        self.words.len() as u64
    }

    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.size_words() * crate::WORD_BYTES
    }

    #[inline]
    pub fn wraps(&self) -> bool {
        self.wrap
    }

    #[inline]
    fn slot(&self, rma: u64) -> Option<&AtomicU64> {
        let word = word_index(rma);
        let len = self.words.len() as u64;
        let index = if word < len {
            word
        } else if self.wrap {
            word % len
        } else {
            return None;
        };
        self.words.get(index as usize)
    }

    /// Read the word containing `rma`; out-of-range reads return [`OPEN_BUS`].
    #[inline]
    pub fn load(&self, rma: u64) -> u64 {
        self.slot(rma)
            .map(|w| w.load(Ordering::Relaxed))
            .unwrap_or(OPEN_BUS)
    }

    /// Write the word containing `rma`; out-of-range writes are dropped.
    #[inline]
    pub fn store(&self, rma: u64, value: u64) {
        if let Some(w) = self.slot(rma) {
            w.store(value, Ordering::Relaxed);
        }
    }

    /// Locked read-modify-write of the word containing `rma`. Returns the previous value.
    pub fn update(&self, rma: u64, f: &mut dyn FnMut(u64) -> u64) -> u64 {
        let _guard = self
            .rmw_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match self.slot(rma) {
            Some(w) => {
                let old = w.load(Ordering::Relaxed);
                w.store(f(old), Ordering::Relaxed);
                old
            }
            None => OPEN_BUS,
        }
    }

    /// Copy words in from a host buffer starting at `rma` (word aligned).
    pub fn load_words(&self, rma: u64, words: &[u64]) {
        for (i, &w) in words.iter().enumerate() {
            self.store(rma + (i as u64) * crate::WORD_BYTES, w);
        }
    }
}

impl MemoryBus for RealMemory {
    #[inline]
    fn read_word(&mut self, rma: u64) -> u64 {
        self.load(rma)
    }

    #[inline]
    fn write_word(&mut self, rma: u64, value: u64) {
        self.store(rma, value)
    }

    #[inline]
    fn read_modify_write(&mut self, rma: u64, f: &mut dyn FnMut(u64) -> u64) -> u64 {
        self.update(rma, f)
    }
}

impl MemoryBus for &RealMemory {
    #[inline]
    fn read_word(&mut self, rma: u64) -> u64 {
        self.load(rma)
    }

    #[inline]
    fn write_word(&mut self, rma: u64, value: u64) {
        self.store(rma, value)
    }

    #[inline]
    fn read_modify_write(&mut self, rma: u64, f: &mut dyn FnMut(u64) -> u64) -> u64 {
        self.update(rma, f)
    }
}
