//! 5-stage barrel shifter
//!
//! Implements SLL/SRL/SRA for 32-bit operands. Each of the five
//! stages conditionally shifts by 16, 8, 4, 2 or 1 bits (in that
//! order — the bits of the shift amount taken MSB-first) using only
//! [`BitVec::slice`] and [`BitVec::concat`]. No host `<<` or `>>`
//! appears in this file.

use crate::bits::BitVec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Sll,
    Srl,
    Sra,
}

const STAGE_AMOUNTS: [usize; 5] = [16, 8, 4, 2, 1];

/// Mask a 5-bit shift-amount vector (RISC-V semantics: amounts
/// greater than 31 wrap). The amount vector is exactly 5 bits wide
/// already in this crate's decoder output, so this is a width check,
/// not a numeric reduction.
fn stage_bits(amount: &BitVec) -> [bool; 5] {
    let mut bits = [false; 5];
    for (i, bit) in amount.bits().iter().enumerate().take(5) {
        bits[i] = *bit;
    }
    bits
}

fn shift_left_by(data: &BitVec, amount: usize) -> BitVec {
    if amount == 0 {
        return data.clone();
    }
    let width = data.width();
    let kept = data.slice(amount, width).expect("amount < width by construction");
    kept.concat(&BitVec::zeros(amount))
}

fn shift_right_logical_by(data: &BitVec, amount: usize) -> BitVec {
    if amount == 0 {
        return data.clone();
    }
    let width = data.width();
    let kept = data.slice(0, width - amount).expect("amount < width by construction");
    BitVec::zeros(amount).concat(&kept)
}

fn shift_right_arithmetic_by(data: &BitVec, amount: usize) -> BitVec {
    if amount == 0 {
        return data.clone();
    }
    let width = data.width();
    let kept = data.slice(0, width - amount).expect("amount < width by construction");
    let fill = BitVec::from_bits(vec![data.msb(); amount]);
    fill.concat(&kept)
}

/// Shift `data` by the amount encoded in the low bits of `amount`
/// (5 bits for the 32-bit ALU-facing path; the multiply/divide unit
/// reuses this same barrel for single-bit shifts of its wider
/// accumulators), per `op`.
pub fn execute(data: &BitVec, amount: &BitVec, op: ShiftOp) -> BitVec {
    let stage_flags = stage_bits(amount);
    let mut current = data.clone();
    for (stage_index, &shift_here) in stage_flags.iter().enumerate() {
        if !shift_here {
            continue;
        }
        let stage_amount = STAGE_AMOUNTS[stage_index];
        current = match op {
            ShiftOp::Sll => shift_left_by(&current, stage_amount),
            ShiftOp::Srl => shift_right_logical_by(&current, stage_amount),
            ShiftOp::Sra => shift_right_arithmetic_by(&current, stage_amount),
        };
    }
    current
}

/// Shift left by an arbitrary (not just 5-bit) amount, used by the
/// FPU's normalize stage where a left-normalizing shift for
/// cancellation can exceed 31 bits of travel. Shifting by at least
/// `width` positions yields all zeros.
pub fn shift_left_unbounded(data: &BitVec, amount: usize) -> BitVec {
    let width = data.width();
    if amount >= width {
        BitVec::zeros(width)
    } else {
        shift_left_by(data, amount)
    }
}

/// Shift right (logical) by an arbitrary amount, used by the FPU's
/// align stage where the exponent difference is not bounded to 5 bits.
pub fn shift_right_logical_unbounded(data: &BitVec, amount: usize) -> BitVec {
    let width = data.width();
    if amount >= width {
        BitVec::zeros(width)
    } else {
        shift_right_logical_by(data, amount)
    }
}

/// OR of the low `amount` bits of `data` that an unbounded right
/// shift by `amount` would discard — the sticky bit the FPU folds
/// back in so no information silently vanishes during alignment.
pub fn discarded_bits_are_nonzero(data: &BitVec, amount: usize) -> bool {
    let width = data.width();
    let take = amount.min(width);
    if take == 0 {
        return false;
    }
    data.slice(width - take, width)
        .expect("take <= width by construction")
        .bits()
        .iter()
        .any(|b| *b)
}
