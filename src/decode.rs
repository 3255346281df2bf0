//! Instruction decoder
//!
//! Field extraction is slice-only; format and mnemonic are both
//! determined by a fixed table keyed on the opcode (and, where the
//! opcode is ambiguous, funct3/funct7). An unrecognized opcode/funct
//! combination decodes successfully to [`Mnemonic::Unknown`] — the
//! datapath treats that as a halt condition, not this module.

use thiserror::Error;

use crate::bits::BitVec;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
    #[error("instruction word must be 32 bits wide, got {0}")]
    WrongWidth(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    R,
    I,
    S,
    B,
    U,
    J,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Sll,
    Srl,
    Sra,
    Addi,
    Andi,
    Ori,
    Xori,
    Slli,
    Srli,
    Srai,
    Lw,
    Sw,
    Beq,
    Bne,
    Jal,
    Jalr,
    Lui,
    Auipc,
    Mul,
    Mulh,
    Mulhu,
    Mulhsu,
    Div,
    Divu,
    Rem,
    Remu,
    FaddS,
    FsubS,
    FmulS,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub raw: BitVec,
    pub format: Format,
    pub mnemonic: Mnemonic,
    pub rd: usize,
    pub rs1: usize,
    pub rs2: usize,
    pub funct3: BitVec,
    pub funct7: BitVec,
    /// Already sign- (or, for U-type, zero-) extended to 32 bits.
    pub immediate: BitVec,
}

/// Build a literal bit-pattern vector from a string of '0'/'1' chars,
/// used for the opcode/funct3/funct7 lookup table.
fn pattern(bits: &str) -> BitVec {
    BitVec::from_bits(bits.chars().map(|c| c == '1').collect())
}

/// A 5-bit register field, doubled-accumulated into a host index —
/// the same array-index idiom used elsewhere in this crate, not
/// arithmetic on a data value.
fn register_index(v: &BitVec) -> usize {
    let mut acc = 0usize;
    for &bit in v.bits() {
        acc = acc + acc + usize::from(bit);
    }
    acc
}

fn match_funct3_r(funct3: &BitVec, funct7: &BitVec) -> Mnemonic {
    if *funct3 == pattern("000") {
        if *funct7 == pattern("0100000") {
            Mnemonic::Sub
        } else {
            Mnemonic::Add
        }
    } else if *funct3 == pattern("001") {
        Mnemonic::Sll
    } else if *funct3 == pattern("100") {
        Mnemonic::Xor
    } else if *funct3 == pattern("101") {
        if *funct7 == pattern("0100000") {
            Mnemonic::Sra
        } else {
            Mnemonic::Srl
        }
    } else if *funct3 == pattern("110") {
        Mnemonic::Or
    } else if *funct3 == pattern("111") {
        Mnemonic::And
    } else {
        Mnemonic::Unknown
    }
}

fn match_funct3_mdu(funct3: &BitVec) -> Mnemonic {
    if *funct3 == pattern("000") {
        Mnemonic::Mul
    } else if *funct3 == pattern("001") {
        Mnemonic::Mulh
    } else if *funct3 == pattern("010") {
        Mnemonic::Mulhsu
    } else if *funct3 == pattern("011") {
        Mnemonic::Mulhu
    } else if *funct3 == pattern("100") {
        Mnemonic::Div
    } else if *funct3 == pattern("101") {
        Mnemonic::Divu
    } else if *funct3 == pattern("110") {
        Mnemonic::Rem
    } else if *funct3 == pattern("111") {
        Mnemonic::Remu
    } else {
        Mnemonic::Unknown
    }
}

fn match_funct3_i(funct3: &BitVec, shift_type: &BitVec) -> Mnemonic {
    if *funct3 == pattern("000") {
        Mnemonic::Addi
    } else if *funct3 == pattern("100") {
        Mnemonic::Xori
    } else if *funct3 == pattern("110") {
        Mnemonic::Ori
    } else if *funct3 == pattern("111") {
        Mnemonic::Andi
    } else if *funct3 == pattern("001") {
        Mnemonic::Slli
    } else if *funct3 == pattern("101") {
        if *shift_type == pattern("0100000") {
            Mnemonic::Srai
        } else {
            Mnemonic::Srli
        }
    } else {
        Mnemonic::Unknown
    }
}

fn match_funct7_fp(funct7: &BitVec) -> Mnemonic {
    if *funct7 == pattern("0000000") {
        Mnemonic::FaddS
    } else if *funct7 == pattern("0000100") {
        Mnemonic::FsubS
    } else if *funct7 == pattern("0001000") {
        Mnemonic::FmulS
    } else {
        Mnemonic::Unknown
    }
}

fn classify(opcode: &BitVec, funct3: &BitVec, funct7: &BitVec) -> (Format, Mnemonic) {
    if *opcode == pattern("0110011") {
        if *funct7 == pattern("0000001") {
            (Format::R, match_funct3_mdu(funct3))
        } else {
            (Format::R, match_funct3_r(funct3, funct7))
        }
    } else if *opcode == pattern("0010011") {
        (Format::I, match_funct3_i(funct3, funct7))
    } else if *opcode == pattern("0000011") {
        if *funct3 == pattern("010") {
            (Format::I, Mnemonic::Lw)
        } else {
            (Format::I, Mnemonic::Unknown)
        }
    } else if *opcode == pattern("0100011") {
        if *funct3 == pattern("010") {
            (Format::S, Mnemonic::Sw)
        } else {
            (Format::S, Mnemonic::Unknown)
        }
    } else if *opcode == pattern("1100011") {
        if *funct3 == pattern("000") {
            (Format::B, Mnemonic::Beq)
        } else if *funct3 == pattern("001") {
            (Format::B, Mnemonic::Bne)
        } else {
            (Format::B, Mnemonic::Unknown)
        }
    } else if *opcode == pattern("1101111") {
        (Format::J, Mnemonic::Jal)
    } else if *opcode == pattern("1100111") {
        if *funct3 == pattern("000") {
            (Format::I, Mnemonic::Jalr)
        } else {
            (Format::I, Mnemonic::Unknown)
        }
    } else if *opcode == pattern("0110111") {
        (Format::U, Mnemonic::Lui)
    } else if *opcode == pattern("0010111") {
        (Format::U, Mnemonic::Auipc)
    } else if *opcode == pattern("1010011") {
        (Format::R, match_funct7_fp(funct7))
    } else {
        (Format::R, Mnemonic::Unknown)
    }
}

fn build_immediate(raw: &BitVec, format: Format) -> BitVec {
    match format {
        Format::I => raw.slice(0, 12).expect("32-bit word").sign_extend(32).expect("12 < 32"),
        Format::S => {
            let hi = raw.slice(0, 7).expect("32-bit word");
            let lo = raw.slice(20, 25).expect("32-bit word");
            hi.concat(&lo).sign_extend(32).expect("12 < 32")
        }
        Format::B => {
            let bit12 = raw.slice(0, 1).expect("32-bit word");
            let bit11 = raw.slice(24, 25).expect("32-bit word");
            let bits10_5 = raw.slice(1, 7).expect("32-bit word");
            let bits4_1 = raw.slice(20, 24).expect("32-bit word");
            let zero = BitVec::from_bits(vec![false]);
            bit12
                .concat(&bit11)
                .concat(&bits10_5)
                .concat(&bits4_1)
                .concat(&zero)
                .sign_extend(32)
                .expect("13 < 32")
        }
        Format::U => {
            let hi = raw.slice(0, 20).expect("32-bit word");
            hi.concat(&BitVec::zeros(12))
        }
        Format::J => {
            let bit20 = raw.slice(0, 1).expect("32-bit word");
            let bits19_12 = raw.slice(12, 20).expect("32-bit word");
            let bit11 = raw.slice(11, 12).expect("32-bit word");
            let bits10_1 = raw.slice(1, 11).expect("32-bit word");
            let zero = BitVec::from_bits(vec![false]);
            bit20
                .concat(&bits19_12)
                .concat(&bit11)
                .concat(&bits10_1)
                .concat(&zero)
                .sign_extend(32)
                .expect("21 < 32")
        }
        Format::R => BitVec::zeros(32),
    }
}

pub fn decode(raw: &BitVec) -> Result<Instruction, DecodeError> {
    if raw.width() != 32 {
        return Err(DecodeError::WrongWidth(raw.width()));
    }
    let opcode = raw.slice(25, 32).expect("32-bit word");
    let rd_bits = raw.slice(20, 25).expect("32-bit word");
    let funct3 = raw.slice(17, 20).expect("32-bit word");
    let rs1_bits = raw.slice(12, 17).expect("32-bit word");
    let rs2_bits = raw.slice(7, 12).expect("32-bit word");
    let funct7 = raw.slice(0, 7).expect("32-bit word");

    let (format, mnemonic) = classify(&opcode, &funct3, &funct7);
    let immediate = build_immediate(raw, format);

    Ok(Instruction {
        raw: raw.clone(),
        format,
        mnemonic,
        rd: register_index(&rd_bits),
        rs1: register_index(&rs1_bits),
        rs2: register_index(&rs2_bits),
        funct3,
        funct7,
        immediate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bits_from_i32, bits_from_u64, i32_from_bits};

    fn reg5(n: u8) -> BitVec {
        bits_from_u64(5, n as u64)
    }

    fn assemble_r(funct7: &str, rs2: u8, rs1: u8, funct3: &str, rd: u8, opcode: &str) -> BitVec {
        pattern(funct7)
            .concat(&reg5(rs2))
            .concat(&reg5(rs1))
            .concat(&pattern(funct3))
            .concat(&reg5(rd))
            .concat(&pattern(opcode))
    }

    fn assemble_i(imm12: &BitVec, rs1: u8, funct3: &str, rd: u8, opcode: &str) -> BitVec {
        imm12
            .concat(&reg5(rs1))
            .concat(&pattern(funct3))
            .concat(&reg5(rd))
            .concat(&pattern(opcode))
    }

    fn assemble_s(imm12: &BitVec, rs2: u8, rs1: u8, funct3: &str, opcode: &str) -> BitVec {
        let hi = imm12.slice(0, 7).unwrap();
        let lo = imm12.slice(7, 12).unwrap();
        hi.concat(&reg5(rs2))
            .concat(&reg5(rs1))
            .concat(&pattern(funct3))
            .concat(&lo)
            .concat(&pattern(opcode))
    }

    fn assemble_b(imm13: &BitVec, rs2: u8, rs1: u8, funct3: &str, opcode: &str) -> BitVec {
        let bit12 = imm13.slice(0, 1).unwrap();
        let bit11 = imm13.slice(1, 2).unwrap();
        let bits10_5 = imm13.slice(2, 8).unwrap();
        let bits4_1 = imm13.slice(8, 12).unwrap();
        let hi = bit12.concat(&bits10_5);
        let lo = bits4_1.concat(&bit11);
        hi.concat(&reg5(rs2))
            .concat(&reg5(rs1))
            .concat(&pattern(funct3))
            .concat(&lo)
            .concat(&pattern(opcode))
    }

    fn assemble_u(imm20: &BitVec, rd: u8, opcode: &str) -> BitVec {
        imm20.concat(&reg5(rd)).concat(&pattern(opcode))
    }

    fn assemble_j(imm21: &BitVec, rd: u8, opcode: &str) -> BitVec {
        let bit20 = imm21.slice(0, 1).unwrap();
        let bits19_12 = imm21.slice(1, 9).unwrap();
        let bit11 = imm21.slice(9, 10).unwrap();
        let bits10_1 = imm21.slice(10, 20).unwrap();
        bit20
            .concat(&bits10_1)
            .concat(&bit11)
            .concat(&bits19_12)
            .concat(&reg5(rd))
            .concat(&pattern(opcode))
    }

    #[test]
    fn decodes_add_r_type() {
        let word = assemble_r("0000000", 3, 2, "000", 1, "0110011");
        let instr = decode(&word).unwrap();
        assert_eq!(instr.mnemonic, Mnemonic::Add);
        assert_eq!(instr.format, Format::R);
        assert_eq!((instr.rd, instr.rs1, instr.rs2), (1, 2, 3));
    }

    #[test]
    fn decodes_sub_by_funct7() {
        let word = assemble_r("0100000", 3, 2, "000", 1, "0110011");
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::Sub);
    }

    #[test]
    fn decodes_mdu_variants_by_funct7_and_funct3() {
        let word = assemble_r("0000001", 3, 2, "100", 1, "0110011");
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::Div);
        let word = assemble_r("0000001", 3, 2, "000", 1, "0110011");
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::Mul);
    }

    #[test]
    fn decodes_fp_variants_by_funct7() {
        let word = assemble_r("0000000", 0, 2, "000", 1, "1010011");
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::FaddS);
        let word = assemble_r("0000100", 0, 2, "000", 1, "1010011");
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::FsubS);
        let word = assemble_r("0001000", 0, 2, "000", 1, "1010011");
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::FmulS);
    }

    #[test]
    fn decodes_i_type_immediate_with_sign_extension() {
        let imm = bits_from_i32(-5).slice(20, 32).unwrap(); // low 12 bits, two's complement
        let word = assemble_i(&imm, 0, "000", 1, "0010011");
        let instr = decode(&word).unwrap();
        assert_eq!(instr.mnemonic, Mnemonic::Addi);
        assert_eq!(i32_from_bits(&instr.immediate), -5);
    }

    #[test]
    fn decodes_shift_immediate_variants() {
        let shamt = bits_from_u64(12, 31);
        let word = assemble_i(&shamt, 1, "001", 2, "0010011");
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::Slli);

        let srli_imm = pattern("0000000") .concat(&bits_from_u64(5, 31));
        let word = assemble_i(&srli_imm, 2, "101", 3, "0010011");
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::Srli);

        let srai_imm = pattern("0100000").concat(&bits_from_u64(5, 31));
        let word = assemble_i(&srai_imm, 2, "101", 4, "0010011");
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::Srai);
    }

    #[test]
    fn decodes_s_type_store_immediate() {
        let imm = bits_from_i32(-4).slice(20, 32).unwrap();
        let word = assemble_s(&imm, 3, 5, "010", "0100011");
        let instr = decode(&word).unwrap();
        assert_eq!(instr.mnemonic, Mnemonic::Sw);
        assert_eq!((instr.rs1, instr.rs2), (5, 3));
        assert_eq!(i32_from_bits(&instr.immediate), -4);
    }

    #[test]
    fn decodes_b_type_branch_with_even_immediate() {
        let imm13 = bits_from_u64(13, 8); // +8, forward branch
        let word = assemble_b(&imm13, 2, 1, "000", "1100011");
        let instr = decode(&word).unwrap();
        assert_eq!(instr.mnemonic, Mnemonic::Beq);
        assert_eq!(i32_from_bits(&instr.immediate), 8);
    }

    #[test]
    fn decodes_u_type_lui() {
        let imm20 = bits_from_u64(20, 0x10); // upper bits of 0x00010000
        let word = assemble_u(&imm20, 5, "0110111");
        let instr = decode(&word).unwrap();
        assert_eq!(instr.mnemonic, Mnemonic::Lui);
        assert_eq!(i32_from_bits(&instr.immediate), 0x0001_0000);
    }

    #[test]
    fn decodes_j_type_jal_with_negative_immediate() {
        let imm21 = bits_from_i32(-16).slice(11, 32).unwrap(); // low 21 bits, LSB forced 0 by construction below
        let word = assemble_j(&imm21, 0, "1101111");
        let instr = decode(&word).unwrap();
        assert_eq!(instr.mnemonic, Mnemonic::Jal);
        assert_eq!(i32_from_bits(&instr.immediate), -16);
    }

    #[test]
    fn halt_marker_decodes_to_jal_x0_zero() {
        let word = BitVec::from_hex("0000006f").unwrap();
        let instr = decode(&word).unwrap();
        assert_eq!(instr.mnemonic, Mnemonic::Jal);
        assert_eq!(instr.rd, 0);
        assert_eq!(i32_from_bits(&instr.immediate), 0);
    }

    #[test]
    fn unrecognized_opcode_decodes_to_unknown() {
        let word = pattern("0000000").concat(&reg5(0)).concat(&reg5(0)).concat(&pattern("000")).concat(&reg5(0)).concat(&pattern("1111111"));
        assert_eq!(decode(&word).unwrap().mnemonic, Mnemonic::Unknown);
    }

    #[test]
    fn wrong_width_is_fatal() {
        assert!(matches!(decode(&BitVec::zeros(16)), Err(DecodeError::WrongWidth(16))));
    }
}
