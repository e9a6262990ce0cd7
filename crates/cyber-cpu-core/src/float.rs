//! CYBER 180 single-precision floating point.
//!
//! A word holds the sign in bit 63, a 15-bit exponent biased by 0x4000 in bits 48..=62 and a
//! 48-bit coefficient in bits 0..=47. The value is `0.coefficient * 2^(exponent - 0x4000)`;
//! normalized results have coefficient bit 47 set. Exponents outside 0x3000..=0x4FFF are
//! infinite or indefinite operands. Results are truncated, not rounded.

use core::cmp::Ordering;

const COEFF_BITS: u32 = 48;
const COEFF_MASK: u64 = (1 << COEFF_BITS) - 1;
const BIAS: i32 = 0x4000;
const EXP_MIN: i32 = 0x3000;
const EXP_MAX: i32 = 0x4FFF;
const SIGN: u64 = 1 << 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatFault {
    /// An operand is infinite or indefinite.
    Indefinite,
    ExponentOverflow,
    ExponentUnderflow,
    DivideByZero,
    /// Conversion to an integer does not fit in 64 bits.
    IntegerOverflow,
}

/// A nonzero operand: value = coeff * 2^(exp - 48).
#[derive(Debug, Clone, Copy)]
struct Unpacked {
    neg: bool,
    exp: i32,
    coeff: u64,
}

/// `None` for zero.
fn unpack(word: u64) -> Result<Option<Unpacked>, FloatFault> {
    let biased = ((word >> COEFF_BITS) & 0x7FFF) as i32;
    let coeff = word & COEFF_MASK;
    if biased == 0 && coeff == 0 {
        return Ok(None);
    }
    if !(EXP_MIN..=EXP_MAX).contains(&biased) {
        return Err(FloatFault::Indefinite);
    }
    if coeff == 0 {
        return Ok(None);
    }
    // Unnormalized operands are accepted and normalized here.
    let shift = coeff.leading_zeros() - (64 - COEFF_BITS);
    Ok(Some(Unpacked {
        neg: word & SIGN != 0,
        exp: biased - BIAS - shift as i32,
        coeff: coeff << shift,
    }))
}

/// Pack `mag * 2^(exp - frac_bits)`.
fn normalize(neg: bool, exp: i32, mag: u128, frac_bits: u32) -> Result<u64, FloatFault> {
    if mag == 0 {
        return Ok(0);
    }
    let bits = 128 - mag.leading_zeros();
    let coeff = if bits > COEFF_BITS {
        (mag >> (bits - COEFF_BITS)) as u64
    } else {
        (mag << (COEFF_BITS - bits)) as u64
    };
    let biased = exp - frac_bits as i32 + bits as i32 + BIAS;
    if biased > EXP_MAX {
        return Err(FloatFault::ExponentOverflow);
    }
    if biased < EXP_MIN {
        return Err(FloatFault::ExponentUnderflow);
    }
    let sign = if neg { SIGN } else { 0 };
    Ok(sign | ((biased as u64) << COEFF_BITS) | coeff)
}

/// Guard bits kept below the coefficient while aligning addends.
const GUARD: u32 = 64;

fn aligned(op: Option<Unpacked>, exp: i32) -> i128 {
    let Some(op) = op else { return 0 };
    let shift = (exp - op.exp) as u32;
    let mag = if shift >= 127 {
        0
    } else {
        (i128::from(op.coeff) << GUARD) >> shift
    };
    if op.neg {
        -mag
    } else {
        mag
    }
}

pub fn add(a: u64, b: u64) -> Result<u64, FloatFault> {
    let (ua, ub) = (unpack(a)?, unpack(b)?);
    let exp = match (ua, ub) {
        (None, None) => return Ok(0),
        (Some(x), None) | (None, Some(x)) => x.exp,
        (Some(x), Some(y)) => x.exp.max(y.exp),
    };
    let sum = aligned(ua, exp) + aligned(ub, exp);
    normalize(sum < 0, exp, sum.unsigned_abs(), COEFF_BITS + GUARD)
}

pub fn sub(a: u64, b: u64) -> Result<u64, FloatFault> {
    // Negating zero would yield a negative zero; leave it alone.
    let negated = if b & !SIGN == 0 { b } else { b ^ SIGN };
    add(a, negated)
}

pub fn mul(a: u64, b: u64) -> Result<u64, FloatFault> {
    let (Some(x), Some(y)) = (unpack(a)?, unpack(b)?) else {
        return Ok(0);
    };
    let mag = u128::from(x.coeff) * u128::from(y.coeff);
    normalize(x.neg != y.neg, x.exp + y.exp, mag, 2 * COEFF_BITS)
}

pub fn div(a: u64, b: u64) -> Result<u64, FloatFault> {
    let (ua, ub) = (unpack(a)?, unpack(b)?);
    let Some(y) = ub else {
        return Err(FloatFault::DivideByZero);
    };
    let Some(x) = ua else { return Ok(0) };
    let mag = (u128::from(x.coeff) << 64) / u128::from(y.coeff);
    normalize(x.neg != y.neg, x.exp - y.exp, mag, 64)
}

/// Signed 64-bit integer to floating point.
pub fn from_integer(value: u64) -> Result<u64, FloatFault> {
    let value = value as i64;
    normalize(value < 0, 0, u128::from(value.unsigned_abs()), 0)
}

/// Floating point to signed 64-bit integer, truncating toward zero.
pub fn to_integer(word: u64) -> Result<u64, FloatFault> {
    let Some(x) = unpack(word)? else { return Ok(0) };
    if x.exp > 64 {
        return Err(FloatFault::IntegerOverflow);
    }
    let shift = x.exp - COEFF_BITS as i32;
    let mag = if shift >= 0 {
        i128::from(x.coeff) << shift
    } else if shift <= -64 {
        0
    } else {
        i128::from(x.coeff >> (-shift) as u32)
    };
    let value = if x.neg { -mag } else { mag };
    i64::try_from(value)
        .map(|v| v as u64)
        .map_err(|_| FloatFault::IntegerOverflow)
}

pub fn compare(a: u64, b: u64) -> Result<Ordering, FloatFault> {
    let key = |op: Option<Unpacked>| -> (i8, i32, u64) {
        match op {
            None => (0, 0, 0),
            Some(x) if x.neg => (-1, -x.exp, !x.coeff),
            Some(x) => (1, x.exp, x.coeff),
        }
    };
    Ok(key(unpack(a)?).cmp(&key(unpack(b)?)))
}
