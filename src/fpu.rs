//! Single-precision (binary32) floating-point unit
//!
//! Implements `FADD.S`, `FSUB.S` and `FMUL.S` as the classic
//! unpack -> align -> operate -> normalize -> round -> repack
//! pipeline. Every add/subtract/compare on a significand or exponent
//! goes through [`crate::alu`]; every shift goes through
//! [`crate::shifter`]; the significand multiply reuses
//! [`crate::mdu::unsigned_multiply`]. The only host arithmetic in this
//! file lives in [`to_f32`]/[`from_f32`], which convert to and from
//! the host's own `f32` bit pattern — an explicit I/O boundary, not
//! part of the arithmetic pipeline.
//!
//! Only round-to-nearest-even is exercised by the test suite; the
//! other four rounding modes are implemented from their textbook
//! definitions but not validated here. Subnormal *inputs* are
//! unpacked correctly (hidden bit forced to zero); subnormal
//! *results* are flushed to a signed zero with the underflow flag
//! set rather than produced bit-for-bit.

use crate::alu::{self, AluOp};
use crate::bits::BitVec;
use crate::mdu;
use crate::shifter::{self, ShiftOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingMode {
    Rne,
    Rtz,
    Rdn,
    Rup,
    Rmm,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FpFlags {
    pub invalid: bool,
    pub divide_by_zero: bool,
    pub overflow: bool,
    pub underflow: bool,
    pub inexact: bool,
}

impl FpFlags {
    pub fn any(&self) -> bool {
        self.invalid || self.divide_by_zero || self.overflow || self.underflow || self.inexact
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatClass {
    Zero,
    Subnormal,
    Normal,
    Infinity,
    NaN,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Unpacked {
    sign: bool,
    exponent: BitVec,
    /// Hidden bit followed by the 23 fraction bits (24 bits total).
    /// The hidden bit is 1 for [`FloatClass::Normal`], 0 otherwise.
    significand: BitVec,
    class: FloatClass,
}

fn is_zero(v: &BitVec) -> bool {
    v.bits().iter().all(|b| !b)
}

fn is_all_ones(v: &BitVec) -> bool {
    v.bits().iter().all(|b| *b)
}

/// A single 1 bit at the LSB position of a `width`-wide vector.
fn one(width: usize) -> BitVec {
    let mut bits = vec![false; width];
    bits[width - 1] = true;
    BitVec::from_bits(bits)
}

fn bias127_10() -> BitVec {
    BitVec::from_bits(vec![
        false, false, false, true, true, true, true, true, true, true,
    ])
}

fn const255_10() -> BitVec {
    BitVec::from_bits(vec![
        false, false, true, true, true, true, true, true, true, true,
    ])
}

fn set_last_bit_true(v: &BitVec) -> BitVec {
    let width = v.width();
    v.slice(0, width - 1).expect("width >= 1").concat(&BitVec::from_bits(vec![true]))
}

fn negate(v: &BitVec) -> BitVec {
    alu::execute(&BitVec::zeros(v.width()), v, AluOp::Sub)
        .expect("equal width by construction")
        .result
}

fn increment_with_carry(v: &BitVec) -> (BitVec, bool) {
    let r = alu::execute(v, &one(v.width()), AluOp::Add).expect("equal width");
    (r.result, r.c)
}

fn decrement_with_borrow(v: &BitVec) -> (BitVec, bool) {
    let r = alu::execute(v, &one(v.width()), AluOp::Sub).expect("equal width");
    (r.result, !r.c)
}

fn classify(exponent: &BitVec, fraction: &BitVec) -> FloatClass {
    let exp_zero = is_zero(exponent);
    let exp_ones = is_all_ones(exponent);
    let frac_zero = is_zero(fraction);
    if exp_zero && frac_zero {
        FloatClass::Zero
    } else if exp_zero {
        FloatClass::Subnormal
    } else if exp_ones && frac_zero {
        FloatClass::Infinity
    } else if exp_ones {
        FloatClass::NaN
    } else {
        FloatClass::Normal
    }
}

fn unpack(bits: &BitVec) -> Unpacked {
    let sign = bits.bit(0);
    let exponent = bits.slice(1, 9).expect("32-bit operand");
    let fraction = bits.slice(9, 32).expect("32-bit operand");
    let class = classify(&exponent, &fraction);
    let hidden = matches!(class, FloatClass::Normal);
    let significand = BitVec::from_bits(vec![hidden]).concat(&fraction);
    Unpacked {
        sign,
        exponent,
        significand,
        class,
    }
}

fn repack(sign: bool, exponent: &BitVec, fraction: &BitVec) -> BitVec {
    BitVec::from_bits(vec![sign]).concat(exponent).concat(fraction)
}

fn pack_zero(sign: bool) -> BitVec {
    repack(sign, &BitVec::zeros(8), &BitVec::zeros(23))
}

fn pack_infinity(sign: bool) -> BitVec {
    repack(sign, &BitVec::from_bits(vec![true; 8]), &BitVec::zeros(23))
}

fn canonical_quiet_nan() -> BitVec {
    let mut fraction = vec![false; 23];
    fraction[0] = true;
    repack(false, &BitVec::from_bits(vec![true; 8]), &BitVec::from_bits(fraction))
}

/// A NaN whose fraction's leading (quiet) bit is 0 is signaling.
fn is_signaling_nan(u: &Unpacked) -> bool {
    matches!(u.class, FloatClass::NaN) && !u.significand.bit(1)
}

/// Convert a bit vector to the host's `f32` via its raw bit pattern.
/// This is the pack/unpack I/O boundary: no arithmetic pipeline code
/// in this file ever calls this.
pub fn to_f32(bits: &BitVec) -> f32 {
    let mut raw: u32 = 0;
    for &b in bits.bits() {
        raw = (raw << 1) | u32::from(b);
    }
    f32::from_bits(raw)
}

/// Convert a host `f32` to its raw-bit-pattern vector. See [`to_f32`].
pub fn from_f32(value: f32) -> BitVec {
    let raw = value.to_bits();
    let mut bits = vec![false; 32];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (raw >> (31 - i)) & 1 == 1;
    }
    BitVec::from_bits(bits)
}

fn should_round_up(guard: bool, round_or_sticky: bool, lsb: bool, sign: bool, mode: RoundingMode) -> bool {
    match mode {
        RoundingMode::Rne => guard && (round_or_sticky || lsb),
        RoundingMode::Rtz => false,
        RoundingMode::Rdn => sign && (guard || round_or_sticky),
        RoundingMode::Rup => !sign && (guard || round_or_sticky),
        RoundingMode::Rmm => guard,
    }
}

// ---------------------------------------------------------------- //
// Add / Subtract
// ---------------------------------------------------------------- //

/// `{2 headroom}{1 hidden}{23 fraction}{guard}{round}{sticky}` = 29 bits.
fn extend_for_add(significand: &BitVec) -> BitVec {
    BitVec::zeros(2).concat(significand).concat(&BitVec::zeros(3))
}

/// Normalize the 29-bit extended sum, adjusting `exponent` to match.
/// Returns the normalized field, the adjusted exponent, whether the
/// exponent overflowed past 255, and whether a left-normalizing shift
/// ran out of room (cancellation past what 23 bits of fraction can
/// represent — treated as underflow to zero).
fn normalize_after_add(mut sum: BitVec, mut exponent: BitVec) -> (BitVec, BitVec, bool, bool) {
    if is_zero(&sum) {
        return (sum, exponent, false, false);
    }
    let mut overflow = false;
    while sum.bit(0) || sum.bit(1) {
        let dropped = sum.bit(sum.width() - 1);
        sum = shifter::shift_right_logical_unbounded(&sum, 1);
        if dropped {
            sum = set_last_bit_true(&sum);
        }
        let (incremented, carry) = increment_with_carry(&exponent);
        exponent = incremented;
        if carry {
            overflow = true;
            break;
        }
    }
    let mut underflow = false;
    let mut shifts = 0;
    while !sum.bit(2) && shifts < 23 {
        sum = shifter::shift_left_unbounded(&sum, 1);
        let (decremented, borrow) = decrement_with_borrow(&exponent);
        exponent = decremented;
        if borrow {
            underflow = true;
            break;
        }
        shifts += 1;
    }
    if shifts == 23 && !sum.bit(2) {
        underflow = true;
    }
    (sum, exponent, overflow, underflow)
}

fn finish_add(sign: bool, sum: BitVec, mut exponent: BitVec, rounding: RoundingMode, mut flags: FpFlags, norm_underflow: bool) -> (BitVec, FpFlags) {
    if is_zero(&sum) {
        return (pack_zero(sign), flags);
    }
    if norm_underflow || is_zero(&exponent) {
        flags.underflow = true;
        flags.inexact = true;
        return (pack_zero(sign), flags);
    }
    let guard = sum.bit(26);
    let round = sum.bit(27);
    let sticky = sum.bit(28);
    let mut significand = sum.slice(2, 26).expect("29-bit normalized field");
    let lsb = significand.bit(23);
    if should_round_up(guard, round || sticky, lsb, sign, rounding) {
        let (incremented, carry) = increment_with_carry(&significand);
        if carry {
            significand = one(1).concat(&BitVec::zeros(23));
            let (incremented_exp, exp_carry) = increment_with_carry(&exponent);
            exponent = incremented_exp;
            if exp_carry {
                flags.overflow = true;
            }
        } else {
            significand = incremented;
        }
    }
    if guard || round || sticky {
        flags.inexact = true;
    }
    if flags.overflow || is_all_ones(&exponent) {
        flags.overflow = true;
        flags.inexact = true;
        return (pack_infinity(sign), flags);
    }
    let fraction = significand.slice(1, 24).expect("24-bit significand");
    (repack(sign, &exponent, &fraction), flags)
}

fn add_or_sub(a: &BitVec, b: &BitVec, is_sub: bool, rounding: RoundingMode) -> (BitVec, FpFlags) {
    let mut flags = FpFlags::default();
    let ua = unpack(a);
    let mut ub = unpack(b);
    if is_sub {
        ub.sign = !ub.sign;
    }

    if matches!(ua.class, FloatClass::NaN) || matches!(ub.class, FloatClass::NaN) {
        if is_signaling_nan(&ua) || is_signaling_nan(&ub) {
            flags.invalid = true;
        }
        return (canonical_quiet_nan(), flags);
    }
    if matches!(ua.class, FloatClass::Infinity) && matches!(ub.class, FloatClass::Infinity) {
        if ua.sign != ub.sign {
            flags.invalid = true;
            return (canonical_quiet_nan(), flags);
        }
        return (pack_infinity(ua.sign), flags);
    }
    if matches!(ua.class, FloatClass::Infinity) {
        return (pack_infinity(ua.sign), flags);
    }
    if matches!(ub.class, FloatClass::Infinity) {
        return (pack_infinity(ub.sign), flags);
    }
    if matches!(ua.class, FloatClass::Zero) && matches!(ub.class, FloatClass::Zero) {
        let sign = if ua.sign == ub.sign { ua.sign } else { false };
        return (pack_zero(sign), flags);
    }
    if matches!(ua.class, FloatClass::Zero) {
        let fraction = ub.significand.slice(1, 24).expect("24-bit significand");
        return (repack(ub.sign, &ub.exponent, &fraction), flags);
    }
    if matches!(ub.class, FloatClass::Zero) {
        return (a.clone(), flags);
    }

    let cmp = alu::execute(&ua.exponent, &ub.exponent, AluOp::Sub).expect("8-bit operands");
    let (larger, smaller, result_exp) = if cmp.z || cmp.c {
        (ua.clone(), ub.clone(), ua.exponent.clone())
    } else {
        (ub.clone(), ua.clone(), ub.exponent.clone())
    };
    let diff_bits = if cmp.z {
        BitVec::zeros(8)
    } else if cmp.c {
        cmp.result
    } else {
        alu::execute(&ub.exponent, &ua.exponent, AluOp::Sub).expect("8-bit operands").result
    };

    let larger_ext = extend_for_add(&larger.significand);
    let mut shifted = extend_for_add(&smaller.significand);
    let mut sticky = false;
    let mut remaining = diff_bits;
    // Walks the exponent difference down one ALU decrement at a time
    // rather than converting it to a host loop count, so the shift
    // amount never leaves bit-vector form.
    for _ in 0..32 {
        if is_zero(&remaining) {
            break;
        }
        let dropped = shifted.bit(shifted.width() - 1);
        if dropped {
            sticky = true;
        }
        shifted = shifter::shift_right_logical_unbounded(&shifted, 1);
        remaining = alu::execute(&remaining, &one(8), AluOp::Sub).expect("8-bit").result;
    }
    if !is_zero(&remaining) {
        sticky = sticky || !is_zero(&shifted);
        shifted = BitVec::zeros(29);
    }
    if sticky {
        shifted = set_last_bit_true(&shifted);
    }

    let same_sign = larger.sign == smaller.sign;
    let (sum, mut result_sign) = if same_sign {
        let add = alu::execute(&larger_ext, &shifted, AluOp::Add).expect("29-bit operands");
        (add.result, larger.sign)
    } else {
        let diff = alu::execute(&larger_ext, &shifted, AluOp::Sub).expect("29-bit operands");
        if diff.c {
            (diff.result, larger.sign)
        } else {
            (negate(&diff.result), smaller.sign)
        }
    };
    if is_zero(&sum) {
        result_sign = false;
    }

    let (normalized_sum, normalized_exp, norm_overflow, norm_underflow) = normalize_after_add(sum, result_exp);
    if norm_overflow {
        flags.overflow = true;
    }
    finish_add(result_sign, normalized_sum, normalized_exp, rounding, flags, norm_underflow)
}

pub fn add(a: &BitVec, b: &BitVec, rounding: RoundingMode) -> (BitVec, FpFlags) {
    add_or_sub(a, b, false, rounding)
}

pub fn sub(a: &BitVec, b: &BitVec, rounding: RoundingMode) -> (BitVec, FpFlags) {
    add_or_sub(a, b, true, rounding)
}

// ---------------------------------------------------------------- //
// Multiply
// ---------------------------------------------------------------- //

pub fn mul(a: &BitVec, b: &BitVec, rounding: RoundingMode) -> (BitVec, FpFlags) {
    let mut flags = FpFlags::default();
    let ua = unpack(a);
    let ub = unpack(b);
    let sign = ua.sign != ub.sign;

    if matches!(ua.class, FloatClass::NaN) || matches!(ub.class, FloatClass::NaN) {
        if is_signaling_nan(&ua) || is_signaling_nan(&ub) {
            flags.invalid = true;
        }
        return (canonical_quiet_nan(), flags);
    }
    let a_inf = matches!(ua.class, FloatClass::Infinity);
    let b_inf = matches!(ub.class, FloatClass::Infinity);
    let a_zero = matches!(ua.class, FloatClass::Zero);
    let b_zero = matches!(ub.class, FloatClass::Zero);
    if (a_inf && b_zero) || (b_inf && a_zero) {
        flags.invalid = true;
        return (canonical_quiet_nan(), flags);
    }
    if a_inf || b_inf {
        return (pack_infinity(sign), flags);
    }
    if a_zero || b_zero {
        return (pack_zero(sign), flags);
    }

    // True exponent, still biased by 127, held in a 10-bit field wide
    // enough that Ea + Eb - 127 can never wrap (max magnitude ~509).
    let ea10 = ua.exponent.zero_extend(10).expect("8 -> 10 widening");
    let eb10 = ub.exponent.zero_extend(10).expect("8 -> 10 widening");
    let sum10 = alu::execute(&ea10, &eb10, AluOp::Add).expect("10-bit operands").result;
    let mut exp10 = alu::execute(&sum10, &bias127_10(), AluOp::Sub).expect("10-bit operands").result;

    let (product, _trace) = mdu::unsigned_multiply(&ua.significand, &ub.significand);
    let normalized = if product.bit(0) {
        let dropped = product.bit(product.width() - 1);
        let mut shifted = shifter::shift_right_logical_unbounded(&product, 1);
        if dropped {
            shifted = set_last_bit_true(&shifted);
        }
        let (incremented, _carry) = increment_with_carry(&exp10);
        exp10 = incremented;
        shifted
    } else {
        product
    };

    let mut significand = normalized.slice(1, 25).expect("48-bit product");
    let guard = normalized.bit(25);
    let round = normalized.bit(26);
    let sticky = normalized.slice(27, 48).expect("48-bit product").bits().iter().any(|b| *b);
    let lsb = significand.bit(23);

    if should_round_up(guard, round || sticky, lsb, sign, rounding) {
        let (incremented, carry) = increment_with_carry(&significand);
        if carry {
            significand = one(1).concat(&BitVec::zeros(23));
            let (incremented_exp, _carry) = increment_with_carry(&exp10);
            exp10 = incremented_exp;
        } else {
            significand = incremented;
        }
    }
    if guard || round || sticky {
        flags.inexact = true;
    }

    if exp10.bit(0) || is_zero(&exp10) {
        flags.underflow = true;
        flags.inexact = true;
        return (pack_zero(sign), flags);
    }
    let over = alu::execute(&exp10, &const255_10(), AluOp::Sub).expect("10-bit operands");
    if over.c {
        flags.overflow = true;
        flags.inexact = true;
        return (pack_infinity(sign), flags);
    }
    let exponent = exp10.slice(2, 10).expect("value < 255 checked above");
    let fraction = significand.slice(1, 24).expect("24-bit significand");
    (repack(sign, &exponent, &fraction), flags)
}
