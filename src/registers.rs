//! Integer/FP register banks and the floating-point control-and-status
//! register.
//!
//! x0 is hardwired to zero: writes are silent no-ops, reads always
//! return the all-zero vector regardless of what was last written.
//! FCSR's exception flags are sticky — arithmetic only ever sets bits
//! via [`Fcsr::accumulate`]; clearing is a distinct, explicit
//! operation.

use thiserror::Error;

use crate::bits::BitVec;
use crate::fpu::{FpFlags, RoundingMode};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegisterError {
    #[error("register index {index} out of range (0..32)")]
    OutOfRange { index: usize },
    #[error("fcsr write requires an 8-bit vector, got {0}")]
    BadFcsrWidth(usize),
}

fn check_index(index: usize) -> Result<(), RegisterError> {
    if index >= 32 {
        Err(RegisterError::OutOfRange { index })
    } else {
        Ok(())
    }
}

fn rounding_mode_from_bits(bits: (bool, bool, bool)) -> RoundingMode {
    match bits {
        (false, false, false) => RoundingMode::Rne,
        (false, false, true) => RoundingMode::Rtz,
        (false, true, false) => RoundingMode::Rdn,
        (false, true, true) => RoundingMode::Rup,
        (true, false, false) => RoundingMode::Rmm,
        _ => RoundingMode::Rne,
    }
}

fn bits_from_rounding_mode(mode: RoundingMode) -> [bool; 3] {
    match mode {
        RoundingMode::Rne => [false, false, false],
        RoundingMode::Rtz => [false, false, true],
        RoundingMode::Rdn => [false, true, false],
        RoundingMode::Rup => [false, true, true],
        RoundingMode::Rmm => [true, false, false],
    }
}

/// 8-bit FCSR: 3-bit rounding mode, 5 sticky exception flags (NV, DZ,
/// OF, UF, NX), in that bit order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fcsr {
    bits: BitVec,
}

impl Fcsr {
    pub fn new() -> Self {
        Self { bits: BitVec::zeros(8) }
    }

    pub fn raw(&self) -> &BitVec {
        &self.bits
    }

    pub fn set_raw(&mut self, bits: BitVec) -> Result<(), RegisterError> {
        if bits.width() != 8 {
            return Err(RegisterError::BadFcsrWidth(bits.width()));
        }
        self.bits = bits;
        Ok(())
    }

    pub fn rounding_mode(&self) -> RoundingMode {
        rounding_mode_from_bits((self.bits.bit(0), self.bits.bit(1), self.bits.bit(2)))
    }

    pub fn set_rounding_mode(&mut self, mode: RoundingMode) {
        let [b0, b1, b2] = bits_from_rounding_mode(mode);
        let flags = self.bits.slice(3, 8).expect("fixed 8-bit fcsr");
        self.bits = BitVec::from_bits(vec![b0, b1, b2]).concat(&flags);
    }

    pub fn flags(&self) -> FpFlags {
        FpFlags {
            invalid: self.bits.bit(3),
            divide_by_zero: self.bits.bit(4),
            overflow: self.bits.bit(5),
            underflow: self.bits.bit(6),
            inexact: self.bits.bit(7),
        }
    }

    /// Bitwise-OR the given flags into FCSR's sticky bits. Never
    /// clears a bit that was already set.
    pub fn accumulate(&mut self, flags: &FpFlags) {
        let mode = self.bits.slice(0, 3).expect("fixed 8-bit fcsr");
        let merged = [
            self.bits.bit(3) || flags.invalid,
            self.bits.bit(4) || flags.divide_by_zero,
            self.bits.bit(5) || flags.overflow,
            self.bits.bit(6) || flags.underflow,
            self.bits.bit(7) || flags.inexact,
        ];
        self.bits = mode.concat(&BitVec::from_bits(merged.to_vec()));
    }

    pub fn clear(&mut self) {
        self.bits = BitVec::zeros(8);
    }
}

impl Default for Fcsr {
    fn default() -> Self {
        Self::new()
    }
}

/// The 32 integer registers, 32 FP registers, and FCSR that make up a
/// hart's architectural state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    int_registers: [BitVec; 32],
    fp_registers: [BitVec; 32],
    fcsr: Fcsr,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            int_registers: std::array::from_fn(|_| BitVec::zeros(32)),
            fp_registers: std::array::from_fn(|_| BitVec::zeros(32)),
            fcsr: Fcsr::new(),
        }
    }

    pub fn reset(&mut self) {
        self.int_registers = std::array::from_fn(|_| BitVec::zeros(32));
        self.fp_registers = std::array::from_fn(|_| BitVec::zeros(32));
        self.fcsr.clear();
    }

    pub fn read_int(&self, index: usize) -> Result<BitVec, RegisterError> {
        check_index(index)?;
        if index == 0 {
            Ok(BitVec::zeros(32))
        } else {
            Ok(self.int_registers[index].clone())
        }
    }

    pub fn write_int(&mut self, index: usize, value: BitVec) -> Result<(), RegisterError> {
        check_index(index)?;
        if index != 0 {
            self.int_registers[index] = value;
        }
        Ok(())
    }

    pub fn read_fp(&self, index: usize) -> Result<BitVec, RegisterError> {
        check_index(index)?;
        Ok(self.fp_registers[index].clone())
    }

    pub fn write_fp(&mut self, index: usize, value: BitVec) -> Result<(), RegisterError> {
        check_index(index)?;
        self.fp_registers[index] = value;
        Ok(())
    }

    pub fn fcsr(&self) -> &Fcsr {
        &self.fcsr
    }

    pub fn fcsr_mut(&mut self) -> &mut Fcsr {
        &mut self.fcsr
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::bits_from_u64;

    #[test]
    fn x0_reads_as_zero_even_after_write() {
        let mut regs = RegisterFile::new();
        regs.write_int(0, bits_from_u64(32, 0xdead_beef)).unwrap();
        assert_eq!(regs.read_int(0).unwrap(), BitVec::zeros(32));
    }

    #[test]
    fn nonzero_register_round_trips() {
        let mut regs = RegisterFile::new();
        regs.write_int(5, bits_from_u64(32, 42)).unwrap();
        assert_eq!(regs.read_int(5).unwrap(), bits_from_u64(32, 42));
    }

    #[test]
    fn out_of_range_index_is_fatal() {
        let regs = RegisterFile::new();
        assert!(matches!(
            regs.read_int(32),
            Err(RegisterError::OutOfRange { index: 32 })
        ));
    }

    #[test]
    fn fcsr_flags_are_sticky_until_cleared() {
        let mut fcsr = Fcsr::new();
        fcsr.accumulate(&FpFlags { inexact: true, ..Default::default() });
        fcsr.accumulate(&FpFlags::default());
        assert!(fcsr.flags().inexact);
        fcsr.clear();
        assert!(!fcsr.flags().inexact);
    }

    #[test]
    fn fcsr_rounding_mode_round_trips() {
        let mut fcsr = Fcsr::new();
        for mode in [
            RoundingMode::Rne,
            RoundingMode::Rtz,
            RoundingMode::Rdn,
            RoundingMode::Rup,
            RoundingMode::Rmm,
        ] {
            fcsr.set_rounding_mode(mode);
            assert_eq!(fcsr.rounding_mode(), mode);
        }
    }

    #[test]
    fn reset_clears_registers_and_fcsr() {
        let mut regs = RegisterFile::new();
        regs.write_int(3, bits_from_u64(32, 99)).unwrap();
        regs.fcsr_mut().accumulate(&FpFlags { overflow: true, ..Default::default() });
        regs.reset();
        assert_eq!(regs.read_int(3).unwrap(), BitVec::zeros(32));
        assert!(!regs.fcsr().flags().overflow);
    }
}
