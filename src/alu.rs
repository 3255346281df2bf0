//! 32-bit arithmetic logic unit
//!
//! The adder is 32 one-bit full-adder cells wired in ripple-carry
//! order, LSB to MSB (index 31 down to 0 of the MSB-first [`BitVec`]
//! representation). Subtraction reuses the adder with the B operand
//! inverted and carry-in forced to one. No host `+` or `-` appears
//! anywhere in this file.

use crate::bits::{BitVec, BitVecError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Nor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AluResult {
    pub result: BitVec,
    pub n: bool,
    pub z: bool,
    pub c: bool,
    pub v: bool,
}

/// One bit of ripple-carry addition: sum = a xor b xor cin, carry-out
/// is the majority of the three inputs.
fn full_adder(a: bool, b: bool, cin: bool) -> (bool, bool) {
    let sum = (a != b) != cin;
    let cout = (a && b) || (b && cin) || (a && cin);
    (sum, cout)
}

/// Ripple-carry add two 32-bit vectors with an explicit carry-in.
/// Returns the sum and the carry out of the MSB cell.
fn ripple_add(a: &BitVec, b: &BitVec, carry_in: bool) -> (BitVec, bool) {
    let width = a.width();
    let mut sum_bits = vec![false; width];
    let mut carry = carry_in;
    for i in (0..width).rev() {
        let (sum, cout) = full_adder(a.bit(i), b.bit(i), carry);
        sum_bits[i] = sum;
        carry = cout;
    }
    (BitVec::from_bits(sum_bits), carry)
}

fn is_all_zero(v: &BitVec) -> bool {
    v.bits().iter().all(|b| !b)
}

/// Run the 32-bit ALU. `a` and `b` must both be 32 bits wide.
pub fn execute(a: &BitVec, b: &BitVec, op: AluOp) -> Result<AluResult, BitVecError> {
    let (result, c, v) = match op {
        AluOp::Add => {
            let (sum, cout) = ripple_add(a, b, false);
            let overflow = a.msb() == b.msb() && sum.msb() != a.msb();
            (sum, cout, overflow)
        }
        AluOp::Sub => {
            let b_inverted = b.not();
            let (diff, cout) = ripple_add(a, &b_inverted, true);
            let overflow = a.msb() != b.msb() && diff.msb() != a.msb();
            (diff, cout, overflow)
        }
        AluOp::And => (a.and(b)?, false, false),
        AluOp::Or => (a.or(b)?, false, false),
        AluOp::Xor => (a.xor(b)?, false, false),
        AluOp::Nor => (a.or(b)?.not(), false, false),
    };
    let n = result.msb();
    let z = is_all_zero(&result);
    Ok(AluResult { result, n, z, c, v })
}
