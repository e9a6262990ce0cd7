//! Arithmetic and bit-field helpers shared by the instruction handlers.
//!
//! Bit fields are numbered the way the architecture documents them: bit 0 is the most
//! significant bit of a 64-bit word.

/// Low-order masks: `BIT_MASKS[n]` has the low `n` bits set.
pub static BIT_MASKS: [u64; 65] = build_masks();

/// Single-bit selectors in MSB-first numbering: `BIT_SELECTORS[n] == 1 << (63 - n)`.
pub static BIT_SELECTORS: [u64; 64] = build_selectors();

/// Bits to OR into a value of width `n` whose sign bit is set: `SIGN_EXTEND[n] == !BIT_MASKS[n]`.
pub static SIGN_EXTEND: [u64; 65] = build_sign_extend();

const fn build_masks() -> [u64; 65] {
    let mut t = [0u64; 65];
    let mut n = 1;
    while n < 64 {
        t[n] = (1u64 << n) - 1;
        n += 1;
    }
    t[64] = u64::MAX;
    t
}

const fn build_selectors() -> [u64; 64] {
    let mut t = [0u64; 64];
    let mut n = 0;
    while n < 64 {
        t[n] = 1u64 << (63 - n);
        n += 1;
    }
    t
}

const fn build_sign_extend() -> [u64; 65] {
    let masks = build_masks();
    let mut t = [0u64; 65];
    let mut n = 0;
    while n < 65 {
        t[n] = !masks[n];
        n += 1;
    }
    t
}

/// Sign-extend the low `bits` bits of `value`.
#[inline]
pub fn sign_extend(value: u64, bits: u32) -> u64 {
    let bits = bits.min(64) as usize;
    if bits == 0 {
        return 0;
    }
    let v = value & BIT_MASKS[bits];
    if v & (1u64 << (bits - 1)) != 0 {
        v | SIGN_EXTEND[bits]
    } else {
        v
    }
}

#[inline]
pub fn sext60(value: u64) -> u64 {
    sign_extend(value, 60)
}

#[inline]
pub fn right_half(x: u64) -> u32 {
    x as u32
}

/// Replace the right (low) 32 bits of `x`.
#[inline]
pub fn with_right_half(x: u64, right: u32) -> u64 {
    (x & 0xFFFF_FFFF_0000_0000) | u64::from(right)
}

/// Why an arithmetic operation produced no result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithFault {
    Overflow,
    DivideByZero,
}

#[inline]
pub fn add32(a: u32, b: u32) -> Result<u32, ArithFault> {
    let sum = a.wrapping_add(b);
    // Same-sign operands with an opposite-sign result.
    if (!(a ^ b) & (a ^ sum)) & 0x8000_0000 != 0 {
        Err(ArithFault::Overflow)
    } else {
        Ok(sum)
    }
}

#[inline]
pub fn sub32(a: u32, b: u32) -> Result<u32, ArithFault> {
    let diff = a.wrapping_sub(b);
    if ((a ^ b) & (a ^ diff)) & 0x8000_0000 != 0 {
        Err(ArithFault::Overflow)
    } else {
        Ok(diff)
    }
}

#[inline]
pub fn mul32(a: u32, b: u32) -> Result<u32, ArithFault> {
    let wide = i64::from(a as i32) * i64::from(b as i32);
    i32::try_from(wide)
        .map(|v| v as u32)
        .map_err(|_| ArithFault::Overflow)
}

#[inline]
pub fn div32(a: u32, b: u32) -> Result<u32, ArithFault> {
    let (a, b) = (a as i32, b as i32);
    if b == 0 {
        return Err(ArithFault::DivideByZero);
    }
    a.checked_div(b)
        .map(|v| v as u32)
        .ok_or(ArithFault::Overflow)
}

#[inline]
pub fn add64(a: u64, b: u64) -> Result<u64, ArithFault> {
    let sum = a.wrapping_add(b);
    if (!(a ^ b) & (a ^ sum)) >> 63 != 0 {
        Err(ArithFault::Overflow)
    } else {
        Ok(sum)
    }
}

#[inline]
pub fn sub64(a: u64, b: u64) -> Result<u64, ArithFault> {
    let diff = a.wrapping_sub(b);
    if ((a ^ b) & (a ^ diff)) >> 63 != 0 {
        Err(ArithFault::Overflow)
    } else {
        Ok(diff)
    }
}

/// Full 128-bit signed product.
#[inline]
pub fn mul64_wide(a: u64, b: u64) -> i128 {
    i128::from(a as i64) * i128::from(b as i64)
}

#[inline]
pub fn mul64(a: u64, b: u64) -> Result<u64, ArithFault> {
    i64::try_from(mul64_wide(a, b))
        .map(|v| v as u64)
        .map_err(|_| ArithFault::Overflow)
}

#[inline]
pub fn div64(a: u64, b: u64) -> Result<u64, ArithFault> {
    let (a, b) = (a as i64, b as i64);
    if b == 0 {
        return Err(ArithFault::DivideByZero);
    }
    a.checked_div(b)
        .map(|v| v as u64)
        .ok_or(ArithFault::Overflow)
}

/// A bit field in MSB-first numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    pub pos: u32,
    pub len: u32,
}

impl BitField {
    /// Decode the 12-bit field descriptor used by the isolate/insert instructions: bits 6..=11
    /// give the leftmost bit position, bits 0..=5 the length minus one. Fields running past
    /// bit 63 are rejected.
    pub fn from_descriptor(descriptor: u32) -> Option<Self> {
        let descriptor = descriptor & 0xFFF;
        let pos = descriptor >> 6;
        let len = (descriptor & 0x3F) + 1;
        (pos + len <= 64).then_some(Self { pos, len })
    }

    #[inline]
    fn shift(self) -> u32 {
        64 - self.pos - self.len
    }

    /// Mask with the field's bits set in place.
    #[inline]
    pub fn mask(self) -> u64 {
        BIT_MASKS[self.len as usize] << self.shift()
    }

    /// Field contents, right justified.
    #[inline]
    pub fn isolate(self, word: u64) -> u64 {
        (word >> self.shift()) & BIT_MASKS[self.len as usize]
    }

    /// Replace the field with the low `len` bits of `value`.
    #[inline]
    pub fn insert(self, word: u64, value: u64) -> u64 {
        (word & !self.mask()) | ((value & BIT_MASKS[self.len as usize]) << self.shift())
    }
}

/// Shift `value` left by `count` (negative shifts right). Counts of 64 or more clear the value
/// (or propagate the sign for arithmetic right shifts).
pub fn shift_logical(value: u64, count: i32) -> u64 {
    match count {
        0 => value,
        1..=63 => value << count,
        -63..=-1 => value >> -count,
        _ => 0,
    }
}

pub fn shift_arithmetic(value: u64, count: i32) -> u64 {
    match count {
        0..=63 => shift_logical(value, count),
        -63..=-1 => ((value as i64) >> -count) as u64,
        c if c > 0 => 0,
        _ => ((value as i64) >> 63) as u64,
    }
}

pub fn shift_circular(value: u64, count: i32) -> u64 {
    if count >= 0 {
        value.rotate_left(count as u32 & 63)
    } else {
        value.rotate_right(count.unsigned_abs() & 63)
    }
}
