//! Multiply/divide unit
//!
//! Both operations reduce to the classic sequential algorithms taught
//! alongside a single-cycle datapath: shift-add multiplication and
//! restoring division. Every addition/subtraction step goes through
//! [`crate::alu`]; every shift goes through [`crate::shifter`]. No
//! host `*`, `/` or `%` appears in this file.

use crate::alu::{self, AluOp};
use crate::bits::BitVec;
use crate::shifter::{self, ShiftOp};

fn shift_amount_one() -> BitVec {
    BitVec::from_bits(vec![false, false, false, false, true])
}

fn is_zero(v: &BitVec) -> bool {
    v.bits().iter().all(|b| !b)
}

/// Two's-complement negation via the ALU: `0 - v`.
fn negate(v: &BitVec) -> BitVec {
    alu::execute(&BitVec::zeros(v.width()), v, AluOp::Sub)
        .expect("equal width by construction")
        .result
}

/// Split a signed operand into its unsigned magnitude and a sign
/// flag. Unsigned operands are returned unchanged with `sign = false`.
fn magnitude_and_sign(v: &BitVec, signed: bool) -> (BitVec, bool) {
    if signed && v.msb() {
        (negate(v), true)
    } else {
        (v.clone(), false)
    }
}

fn set_last_bit(v: &BitVec, value: bool) -> BitVec {
    let width = v.width();
    v.slice(0, width - 1)
        .expect("width >= 1")
        .concat(&BitVec::from_bits(vec![value]))
}

// ---------------------------------------------------------------- //
// Multiplier
// ---------------------------------------------------------------- //

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulVariant {
    Mul,
    Mulh,
    Mulhu,
    Mulhsu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulTraceEntry {
    pub accumulator: BitVec,
    pub multiplier: BitVec,
    pub partial_product: BitVec,
    pub step: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulResult {
    pub lo: BitVec,
    pub hi: BitVec,
    pub trace: Vec<MulTraceEntry>,
    /// Grading-only signal: true iff the mathematical product does
    /// not fit in a signed 32-bit value. RISC-V `mul`/`mulh` never
    /// trap or flag on overflow, so this has no effect on the
    /// architectural result; it exists purely as a diagnostic.
    pub overflow: bool,
}

/// Unsigned shift-add multiply of two equal-width magnitudes,
/// returning the `2 * width`-bit product as hi:lo and a per-iteration
/// trace. Generic over width so the FPU can reuse it on 24-bit
/// significands as well as the 32-bit `MUL*` path.
///
/// The accumulator is logically `{carry, hi, lo}`: on each iteration
/// the multiplicand is conditionally added into `hi` (via the ALU,
/// producing a carry bit), then the whole `2 * width + 1`-bit register
/// is shifted right by one through the barrel shifter. The extra
/// carry bit is what lets a `width`-bit adder be reused without
/// losing the top bit of the partial sum.
pub fn unsigned_multiply(multiplicand: &BitVec, multiplier: &BitVec) -> (BitVec, Vec<MulTraceEntry>) {
    let width = multiplicand.width();
    let mut hi = BitVec::zeros(width);
    let mut lo = multiplier.clone();
    let mut carry = false;
    let mut trace = Vec::with_capacity(width);

    for step in 0..width {
        let partial_product = if lo.bit(width - 1) {
            let add = alu::execute(&hi, multiplicand, AluOp::Add).expect("equal width");
            hi = add.result;
            carry = add.c;
            multiplicand.clone()
        } else {
            carry = false;
            BitVec::zeros(width)
        };

        trace.push(MulTraceEntry {
            accumulator: hi.concat(&lo),
            multiplier: lo.clone(),
            partial_product,
            step,
        });

        let combined = BitVec::from_bits(vec![carry]).concat(&hi).concat(&lo);
        let shifted = shifter::execute(&combined, &shift_amount_one(), ShiftOp::Srl);
        hi = shifted.slice(1, width + 1).expect("combined register");
        lo = shifted.slice(width + 1, 2 * width + 1).expect("combined register");
    }

    (hi.concat(&lo), trace)
}

fn mul_overflow(hi: &BitVec, lo: &BitVec) -> bool {
    let expected_hi = BitVec::from_bits(vec![lo.msb(); 32]);
    *hi != expected_hi
}

/// Run the multiplier for one of the four RV32M `MUL*` variants.
/// `a` and `b` must both be 32 bits wide.
pub fn multiply(a: &BitVec, b: &BitVec, variant: MulVariant) -> MulResult {
    let (a_signed, b_signed) = match variant {
        MulVariant::Mul | MulVariant::Mulh => (true, true),
        MulVariant::Mulhu => (false, false),
        MulVariant::Mulhsu => (true, false),
    };
    let (a_mag, a_neg) = magnitude_and_sign(a, a_signed);
    let (b_mag, b_neg) = magnitude_and_sign(b, b_signed);
    let (magnitude_product, trace) = unsigned_multiply(&a_mag, &b_mag);

    let product = if a_neg != b_neg {
        negate(&magnitude_product)
    } else {
        magnitude_product
    };

    let hi = product.slice(0, 32).expect("64-bit product");
    let lo = product.slice(32, 64).expect("64-bit product");
    let overflow = mul_overflow(&hi, &lo);

    MulResult { lo, hi, trace, overflow }
}

// ---------------------------------------------------------------- //
// Divider
// ---------------------------------------------------------------- //

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivVariant {
    Div,
    Divu,
    Rem,
    Remu,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivTraceEntry {
    pub remainder: BitVec,
    pub quotient: BitVec,
    /// True if this step committed the trial subtraction; false if it
    /// restored (discarded the subtraction and left the quotient bit
    /// zero).
    pub committed: bool,
    pub step: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivResult {
    pub quotient: BitVec,
    pub remainder: BitVec,
    pub trace: Vec<DivTraceEntry>,
    pub div_by_zero: bool,
    /// Grading-only signal for the INT_MIN / -1 edge case: RISC-V
    /// leaves this case fully defined (quotient = dividend, no trap
    /// or flag), so this has no effect on the architectural result
    /// and exists purely as a diagnostic.
    pub overflow: bool,
}

/// Unsigned restoring division of two 32-bit magnitudes.
fn restoring_divide(
    dividend: &BitVec,
    divisor: &BitVec,
) -> (BitVec, BitVec, Vec<DivTraceEntry>) {
    let mut remainder = BitVec::zeros(32);
    let mut quotient = dividend.clone();
    let mut trace = Vec::with_capacity(32);

    for step in 0..32 {
        let combined = remainder.concat(&quotient);
        let shifted = shifter::execute(&combined, &shift_amount_one(), ShiftOp::Sll);
        remainder = shifted.slice(0, 32).expect("64-bit combined register");
        quotient = shifted.slice(32, 64).expect("64-bit combined register");

        let trial = alu::execute(&remainder, divisor, AluOp::Sub).expect("equal width");
        let committed = !trial.result.msb();
        if committed {
            remainder = trial.result;
            quotient = set_last_bit(&quotient, true);
        }

        trace.push(DivTraceEntry {
            remainder: remainder.clone(),
            quotient: quotient.clone(),
            committed,
            step,
        });
    }

    (quotient, remainder, trace)
}

/// Run the divider for one of the four RV32M `DIV*`/`REM*` variants.
/// `signed` controls whether the dividend-is-INT_MIN/-1 grading flag
/// and the sign-correction rules apply.
pub fn divide(dividend: &BitVec, divisor: &BitVec, variant: DivVariant) -> DivResult {
    let signed = matches!(variant, DivVariant::Div | DivVariant::Rem);

    if is_zero(divisor) {
        return DivResult {
            quotient: BitVec::from_bits(vec![true; 32]),
            remainder: dividend.clone(),
            trace: vec![],
            div_by_zero: true,
            overflow: false,
        };
    }

    if signed {
        let int_min = BitVec::from_bits(
            std::iter::once(true).chain(std::iter::repeat(false).take(31)).collect(),
        );
        let minus_one = BitVec::from_bits(vec![true; 32]);
        if *dividend == int_min && *divisor == minus_one {
            return DivResult {
                quotient: dividend.clone(),
                remainder: BitVec::zeros(32),
                trace: vec![],
                div_by_zero: false,
                overflow: true,
            };
        }
    }

    let (dividend_mag, dividend_neg) = magnitude_and_sign(dividend, signed);
    let (divisor_mag, divisor_neg) = magnitude_and_sign(divisor, signed);
    let (quotient_mag, remainder_mag, trace) = restoring_divide(&dividend_mag, &divisor_mag);

    let quotient = if signed && (dividend_neg != divisor_neg) {
        negate(&quotient_mag)
    } else {
        quotient_mag
    };
    let remainder = if signed && dividend_neg {
        negate(&remainder_mag)
    } else {
        remainder_mag
    };

    DivResult {
        quotient,
        remainder,
        trace,
        div_by_zero: false,
        overflow: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bits_from_i32, bits_from_u64, i32_from_bits, u64_from_bits};

    #[test]
    fn mul_reference_example() {
        let a = bits_from_i32(12_345_678);
        let b = bits_from_i32(-87_654_321);
        let result = multiply(&a, &b, MulVariant::Mul);
        assert_eq!(u64_from_bits(&result.lo), 0xd91d_0712);
        assert!(result.overflow);
    }

    #[test]
    fn mulh_reference_example() {
        let a = bits_from_i32(12_345_678);
        let b = bits_from_i32(-87_654_321);
        let result = multiply(&a, &b, MulVariant::Mulh);
        assert_eq!(u64_from_bits(&result.hi), 0xfffc_27c9);
    }

    #[test]
    fn mulhu_small_values() {
        let a = bits_from_u64(32, 1000);
        let b = bits_from_u64(32, 1000);
        let result = multiply(&a, &b, MulVariant::Mulhu);
        assert_eq!(u64_from_bits(&result.hi), 0);
        assert_eq!(u64_from_bits(&result.lo), 1_000_000);
    }

    #[test]
    fn mulhsu_matches_signed_times_unsigned() {
        let a = bits_from_i32(-5);
        let b = bits_from_u64(32, 3);
        let result = multiply(&a, &b, MulVariant::Mulhsu);
        // -15 as a 64-bit two's complement value: high word is all ones.
        assert_eq!(u64_from_bits(&result.hi), 0xffff_ffff);
        assert_eq!(i32_from_bits(&result.lo), -15);
    }

    #[test]
    fn div_reference_example() {
        let result = divide(&bits_from_i32(-7), &bits_from_i32(3), DivVariant::Div);
        assert_eq!(i32_from_bits(&result.quotient), -2);
        let result = divide(&bits_from_i32(-7), &bits_from_i32(3), DivVariant::Rem);
        assert_eq!(i32_from_bits(&result.remainder), -1);
    }

    #[test]
    fn divu_reference_example() {
        let result = divide(
            &bits_from_u64(32, 0x8000_0000),
            &bits_from_u64(32, 3),
            DivVariant::Divu,
        );
        assert_eq!(u64_from_bits(&result.quotient), 0x2aaa_aaaa);
        let result = divide(
            &bits_from_u64(32, 0x8000_0000),
            &bits_from_u64(32, 3),
            DivVariant::Remu,
        );
        assert_eq!(u64_from_bits(&result.remainder), 2);
    }

    #[test]
    fn div_by_zero() {
        let dividend = bits_from_i32(100);
        let zero = bits_from_i32(0);
        let q = divide(&dividend, &zero, DivVariant::Div);
        assert_eq!(u64_from_bits(&q.quotient), 0xffff_ffff);
        assert!(q.div_by_zero);
        let r = divide(&dividend, &zero, DivVariant::Rem);
        assert_eq!(i32_from_bits(&r.remainder), 100);
    }

    #[test]
    fn div_int_min_by_minus_one_overflows() {
        let dividend = bits_from_i32(i32::MIN);
        let divisor = bits_from_i32(-1);
        let result = divide(&dividend, &divisor, DivVariant::Div);
        assert_eq!(i32_from_bits(&result.quotient), i32::MIN);
        assert_eq!(u64_from_bits(&result.remainder), 0);
        assert!(result.overflow);
    }

    #[test]
    fn div_then_check_division_identity() {
        for (dividend, divisor) in [(100, 7), (-100, 7), (100, -7), (-100, -7), (7, 100)] {
            let d = bits_from_i32(dividend);
            let v = bits_from_i32(divisor);
            let div = divide(&d, &v, DivVariant::Div);
            let rem = divide(&d, &v, DivVariant::Rem);
            let q = i32_from_bits(&div.quotient) as i64;
            let r = i32_from_bits(&rem.remainder) as i64;
            assert_eq!(q * (divisor as i64) + r, dividend as i64);
            assert!(r.unsigned_abs() < (divisor as i64).unsigned_abs());
        }
    }
}
