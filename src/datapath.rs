//! Single-cycle datapath: fetch, decode, execute, memory, writeback,
//! PC update, all in one pass over the functional units.
//!
//! This module is an orchestrator, not a functional unit: it is the
//! one place in the crate allowed to convert between [`BitVec`]
//! addresses and the host `u32` addresses [`Memory`] expects, via
//! [`memory::bits_to_word`]/[`memory::word_to_bits`] — the same
//! array-index exception the register file's 5-bit index conversion
//! already relies on.

use thiserror::Error;

use crate::alu::{self, AluOp};
use crate::bits::{BitVec, BitVecError};
use crate::decode::{self, DecodeError, Instruction, Mnemonic};
use crate::fpu;
use crate::mdu::{self, DivVariant, MulVariant};
use crate::memory::{self, Memory, MemoryError};
use crate::registers::{RegisterError, RegisterFile};
use crate::shifter::{self, ShiftOp};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DatapathError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error(transparent)]
    Bits(#[from] BitVecError),
}

/// Why execution stopped. [`UnknownInstruction`] and [`SelfBranch`]
/// are detected per-cycle by [`step`]; [`MaxCycles`] and [`TargetPc`]
/// are run-loop conditions the CPU layer checks after each step. In
/// priority order (a single cycle can only ever trigger the first
/// two, never both): `UnknownInstruction` > `SelfBranch` > `MaxCycles`
/// > `TargetPc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCause {
    UnknownInstruction,
    SelfBranch,
    MaxCycles,
    TargetPc,
}

/// Selects the ALU's first operand: the register file (`rs1`) or the
/// program counter (branches, jumps, AUIPC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandA {
    Register,
    ProgramCounter,
}

/// Selects the ALU's second operand: the register file (`rs2`) or the
/// decoded immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandB {
    Register,
    Immediate,
}

/// Selects what gets written back to the destination register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSrc {
    Alu,
    Shifter,
    Memory,
    Mdu,
    Fpu,
    /// `pc + 4`, for JAL/JALR's link value.
    LinkAddress,
    /// The raw (U-type) immediate, for LUI.
    Immediate,
}

/// Selects the source of the next PC value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcSrc {
    Sequential,
    Branch,
    Jump,
}

/// The control unit's outputs for one cycle: everything the datapath
/// decides purely from the opcode/funct fields, before any operand
/// values are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSignals {
    pub reg_write: bool,
    pub alu_op: Option<AluOp>,
    pub operand_a: OperandA,
    pub operand_b: OperandB,
    pub mem_read: bool,
    pub mem_write: bool,
    pub branch: bool,
    pub jump: bool,
    pub result_src: ResultSrc,
    pub pc_src: PcSrc,
}

impl ControlSignals {
    fn idle() -> Self {
        ControlSignals {
            reg_write: false,
            alu_op: None,
            operand_a: OperandA::Register,
            operand_b: OperandB::Register,
            mem_read: false,
            mem_write: false,
            branch: false,
            jump: false,
            result_src: ResultSrc::Alu,
            pc_src: PcSrc::Sequential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleRecord {
    pub cycle_index: u64,
    pub pc: BitVec,
    pub raw: BitVec,
    pub instruction: Instruction,
    pub control: ControlSignals,
    pub alu_result: Option<BitVec>,
    pub memory_data: Option<BitVec>,
    pub writeback_data: Option<BitVec>,
    pub next_pc: BitVec,
    pub branch_taken: Option<bool>,
    pub memory_address: Option<u32>,
    pub halt: Option<HaltCause>,
}

fn is_all_zero(v: &BitVec) -> bool {
    v.bits().iter().all(|b| !b)
}

fn force_low_bit_zero(v: &BitVec) -> BitVec {
    let width = v.width();
    v.slice(0, width - 1)
        .expect("width >= 1")
        .concat(&BitVec::from_bits(vec![false]))
}

/// Run one fetch-decode-execute-memory-writeback-PC-update cycle.
/// `cycle_index` is the caller's running cycle counter, recorded
/// verbatim into the returned [`CycleRecord`].
pub fn step(
    cycle_index: u64,
    pc: &BitVec,
    regs: &mut RegisterFile,
    mem: &mut Memory,
) -> Result<CycleRecord, DatapathError> {
    let pc_addr = memory::bits_to_word(pc);
    let raw_word = mem.read_word(pc_addr)?;
    let raw = memory::word_to_bits(raw_word);
    let instr = decode::decode(&raw)?;

    let pc_plus_4 = alu::execute(pc, &memory::word_to_bits(4), AluOp::Add)?.result;
    let rs1_val = regs.read_int(instr.rs1)?;
    let rs2_val = regs.read_int(instr.rs2)?;

    let mut next_pc = pc_plus_4.clone();
    let mut branch_taken = None;
    let mut halt = None;
    let mut memory_address = None;
    let mut memory_data = None;
    let mut alu_result = None;
    let mut writeback_data = None;
    let mut control = ControlSignals::idle();

    match instr.mnemonic {
        Mnemonic::Add | Mnemonic::Sub | Mnemonic::And | Mnemonic::Or | Mnemonic::Xor => {
            let op = match instr.mnemonic {
                Mnemonic::Add => AluOp::Add,
                Mnemonic::Sub => AluOp::Sub,
                Mnemonic::And => AluOp::And,
                Mnemonic::Or => AluOp::Or,
                Mnemonic::Xor => AluOp::Xor,
                _ => unreachable!(),
            };
            let result = alu::execute(&rs1_val, &rs2_val, op)?.result;
            control.reg_write = true;
            control.alu_op = Some(op);
            control.result_src = ResultSrc::Alu;
            alu_result = Some(result.clone());
            writeback_data = Some(result.clone());
            regs.write_int(instr.rd, result)?;
        }
        Mnemonic::Sll | Mnemonic::Srl | Mnemonic::Sra => {
            let shift_op = match instr.mnemonic {
                Mnemonic::Sll => ShiftOp::Sll,
                Mnemonic::Srl => ShiftOp::Srl,
                Mnemonic::Sra => ShiftOp::Sra,
                _ => unreachable!(),
            };
            let amount = rs2_val.slice(27, 32)?;
            let result = shifter::execute(&rs1_val, &amount, shift_op);
            control.reg_write = true;
            control.result_src = ResultSrc::Shifter;
            writeback_data = Some(result.clone());
            regs.write_int(instr.rd, result)?;
        }
        Mnemonic::Addi | Mnemonic::Andi | Mnemonic::Ori | Mnemonic::Xori => {
            let op = match instr.mnemonic {
                Mnemonic::Addi => AluOp::Add,
                Mnemonic::Andi => AluOp::And,
                Mnemonic::Ori => AluOp::Or,
                Mnemonic::Xori => AluOp::Xor,
                _ => unreachable!(),
            };
            let result = alu::execute(&rs1_val, &instr.immediate, op)?.result;
            control.reg_write = true;
            control.alu_op = Some(op);
            control.operand_b = OperandB::Immediate;
            control.result_src = ResultSrc::Alu;
            alu_result = Some(result.clone());
            writeback_data = Some(result.clone());
            regs.write_int(instr.rd, result)?;
        }
        Mnemonic::Slli | Mnemonic::Srli | Mnemonic::Srai => {
            let shift_op = match instr.mnemonic {
                Mnemonic::Slli => ShiftOp::Sll,
                Mnemonic::Srli => ShiftOp::Srl,
                Mnemonic::Srai => ShiftOp::Sra,
                _ => unreachable!(),
            };
            let amount = instr.immediate.slice(27, 32)?;
            let result = shifter::execute(&rs1_val, &amount, shift_op);
            control.reg_write = true;
            control.operand_b = OperandB::Immediate;
            control.result_src = ResultSrc::Shifter;
            writeback_data = Some(result.clone());
            regs.write_int(instr.rd, result)?;
        }
        Mnemonic::Lw => {
            let address_bits = alu::execute(&rs1_val, &instr.immediate, AluOp::Add)?.result;
            let address = memory::bits_to_word(&address_bits);
            let word = mem.read_word(address)?;
            let data = memory::word_to_bits(word);
            control.reg_write = true;
            control.alu_op = Some(AluOp::Add);
            control.operand_b = OperandB::Immediate;
            control.mem_read = true;
            control.result_src = ResultSrc::Memory;
            alu_result = Some(address_bits);
            memory_address = Some(address);
            memory_data = Some(data.clone());
            writeback_data = Some(data.clone());
            regs.write_int(instr.rd, data)?;
        }
        Mnemonic::Sw => {
            let address_bits = alu::execute(&rs1_val, &instr.immediate, AluOp::Add)?.result;
            let address = memory::bits_to_word(&address_bits);
            control.alu_op = Some(AluOp::Add);
            control.operand_b = OperandB::Immediate;
            control.mem_write = true;
            control.result_src = ResultSrc::Memory;
            alu_result = Some(address_bits);
            memory_address = Some(address);
            memory_data = Some(rs2_val.clone());
            mem.write_word(address, memory::bits_to_word(&rs2_val))?;
        }
        Mnemonic::Beq | Mnemonic::Bne => {
            let cmp = alu::execute(&rs1_val, &rs2_val, AluOp::Sub)?;
            let taken = if instr.mnemonic == Mnemonic::Beq { cmp.z } else { !cmp.z };
            control.alu_op = Some(AluOp::Sub);
            control.branch = true;
            alu_result = Some(cmp.result);
            branch_taken = Some(taken);
            if taken {
                next_pc = alu::execute(pc, &instr.immediate, AluOp::Add)?.result;
                control.operand_a = OperandA::ProgramCounter;
                control.operand_b = OperandB::Immediate;
                control.pc_src = PcSrc::Branch;
            }
        }
        Mnemonic::Jal => {
            control.reg_write = true;
            control.jump = true;
            control.operand_a = OperandA::ProgramCounter;
            control.operand_b = OperandB::Immediate;
            control.result_src = ResultSrc::LinkAddress;
            control.pc_src = PcSrc::Jump;
            writeback_data = Some(pc_plus_4.clone());
            regs.write_int(instr.rd, pc_plus_4.clone())?;
            next_pc = alu::execute(pc, &instr.immediate, AluOp::Add)?.result;
            if instr.rd == 0 && is_all_zero(&instr.immediate) {
                halt = Some(HaltCause::SelfBranch);
            }
        }
        Mnemonic::Jalr => {
            control.reg_write = true;
            control.jump = true;
            control.operand_b = OperandB::Immediate;
            control.result_src = ResultSrc::LinkAddress;
            control.pc_src = PcSrc::Jump;
            writeback_data = Some(pc_plus_4.clone());
            regs.write_int(instr.rd, pc_plus_4.clone())?;
            let target = alu::execute(&rs1_val, &instr.immediate, AluOp::Add)?.result;
            alu_result = Some(target.clone());
            next_pc = force_low_bit_zero(&target);
        }
        Mnemonic::Lui => {
            control.reg_write = true;
            control.operand_b = OperandB::Immediate;
            control.result_src = ResultSrc::Immediate;
            writeback_data = Some(instr.immediate.clone());
            regs.write_int(instr.rd, instr.immediate.clone())?;
        }
        Mnemonic::Auipc => {
            let result = alu::execute(pc, &instr.immediate, AluOp::Add)?.result;
            control.reg_write = true;
            control.alu_op = Some(AluOp::Add);
            control.operand_a = OperandA::ProgramCounter;
            control.operand_b = OperandB::Immediate;
            control.result_src = ResultSrc::Alu;
            alu_result = Some(result.clone());
            writeback_data = Some(result.clone());
            regs.write_int(instr.rd, result)?;
        }
        Mnemonic::Mul | Mnemonic::Mulh | Mnemonic::Mulhu | Mnemonic::Mulhsu => {
            let variant = match instr.mnemonic {
                Mnemonic::Mul => MulVariant::Mul,
                Mnemonic::Mulh => MulVariant::Mulh,
                Mnemonic::Mulhu => MulVariant::Mulhu,
                Mnemonic::Mulhsu => MulVariant::Mulhsu,
                _ => unreachable!(),
            };
            let result = mdu::multiply(&rs1_val, &rs2_val, variant);
            let value = if matches!(instr.mnemonic, Mnemonic::Mul) {
                result.lo
            } else {
                result.hi
            };
            control.reg_write = true;
            control.result_src = ResultSrc::Mdu;
            writeback_data = Some(value.clone());
            regs.write_int(instr.rd, value)?;
        }
        Mnemonic::Div | Mnemonic::Divu | Mnemonic::Rem | Mnemonic::Remu => {
            let variant = match instr.mnemonic {
                Mnemonic::Div => DivVariant::Div,
                Mnemonic::Divu => DivVariant::Divu,
                Mnemonic::Rem => DivVariant::Rem,
                Mnemonic::Remu => DivVariant::Remu,
                _ => unreachable!(),
            };
            let result = mdu::divide(&rs1_val, &rs2_val, variant);
            let value = if matches!(instr.mnemonic, Mnemonic::Div | Mnemonic::Divu) {
                result.quotient
            } else {
                result.remainder
            };
            control.reg_write = true;
            control.result_src = ResultSrc::Mdu;
            writeback_data = Some(value.clone());
            regs.write_int(instr.rd, value)?;
        }
        Mnemonic::FaddS | Mnemonic::FsubS | Mnemonic::FmulS => {
            let a = regs.read_fp(instr.rs1)?;
            let b = regs.read_fp(instr.rs2)?;
            let rounding = regs.fcsr().rounding_mode();
            let (result, flags) = match instr.mnemonic {
                Mnemonic::FaddS => fpu::add(&a, &b, rounding),
                Mnemonic::FsubS => fpu::sub(&a, &b, rounding),
                Mnemonic::FmulS => fpu::mul(&a, &b, rounding),
                _ => unreachable!(),
            };
            control.reg_write = true;
            control.result_src = ResultSrc::Fpu;
            writeback_data = Some(result.clone());
            regs.write_fp(instr.rd, result)?;
            regs.fcsr_mut().accumulate(&flags);
        }
        Mnemonic::Unknown => {
            halt = Some(HaltCause::UnknownInstruction);
        }
    }

    Ok(CycleRecord {
        cycle_index,
        pc: pc.clone(),
        raw,
        instruction: instr,
        control,
        alu_result,
        memory_data,
        writeback_data,
        next_pc,
        branch_taken,
        memory_address,
        halt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bits_from_i32, bits_from_u64, i32_from_bits, u64_from_bits};

    fn w32(v: u64) -> BitVec {
        bits_from_u64(32, v)
    }

    #[test]
    fn addi_writes_register_and_advances_pc() {
        let mut regs = RegisterFile::new();
        let mut mem = Memory::new();
        mem.write_word(memory::INSTRUCTION_BASE, memory::bits_to_word(&BitVec::from_hex("00500093").unwrap()))
            .unwrap();
        let record = step(0, &w32(0), &mut regs, &mut mem).unwrap();
        assert_eq!(i32_from_bits(&regs.read_int(1).unwrap()), 5);
        assert_eq!(u64_from_bits(&record.next_pc), 4);
        assert!(record.halt.is_none());
        assert_eq!(record.instruction.mnemonic, Mnemonic::Addi);
        assert!(record.control.reg_write);
        assert_eq!(record.control.result_src, ResultSrc::Alu);
        assert_eq!(i32_from_bits(&record.writeback_data.unwrap()), 5);
    }

    #[test]
    fn beq_not_taken_falls_through() {
        let mut regs = RegisterFile::new();
        regs.write_int(1, bits_from_i32(1)).unwrap();
        regs.write_int(2, bits_from_i32(2)).unwrap();
        let mut mem = Memory::new();
        // beq x1, x2, 8
        let word = BitVec::from_hex("00208463").unwrap();
        mem.write_word(memory::INSTRUCTION_BASE, memory::bits_to_word(&word)).unwrap();
        let record = step(0, &w32(0), &mut regs, &mut mem).unwrap();
        assert_eq!(record.branch_taken, Some(false));
        assert_eq!(u64_from_bits(&record.next_pc), 4);
        assert_eq!(record.control.pc_src, PcSrc::Sequential);
    }

    #[test]
    fn jal_x0_zero_is_a_self_branch_halt() {
        let mut regs = RegisterFile::new();
        let mut mem = Memory::new();
        mem.write_word(memory::INSTRUCTION_BASE, memory::bits_to_word(&BitVec::from_hex("0000006f").unwrap()))
            .unwrap();
        let record = step(7, &w32(0), &mut regs, &mut mem).unwrap();
        assert_eq!(record.halt, Some(HaltCause::SelfBranch));
        assert_eq!(u64_from_bits(&record.next_pc), 0);
        assert_eq!(record.cycle_index, 7);
        assert_eq!(record.control.pc_src, PcSrc::Jump);
    }

    #[test]
    fn unknown_opcode_halts() {
        let mut regs = RegisterFile::new();
        let mut mem = Memory::new();
        mem.write_word(memory::INSTRUCTION_BASE, memory::bits_to_word(&BitVec::from_hex("0000007f").unwrap()))
            .unwrap();
        let record = step(0, &w32(0), &mut regs, &mut mem).unwrap();
        assert_eq!(record.halt, Some(HaltCause::UnknownInstruction));
    }

    #[test]
    fn sw_then_lw_round_trips_through_memory() {
        let mut regs = RegisterFile::new();
        regs.write_int(1, w32(memory::DATA_BASE as u64)).unwrap();
        regs.write_int(2, bits_from_i32(-42)).unwrap();
        let mut mem = Memory::new();
        // sw x2, 0(x1)
        let sw = BitVec::from_hex("0020a023").unwrap();
        mem.write_word(memory::INSTRUCTION_BASE, memory::bits_to_word(&sw)).unwrap();
        let record = step(0, &w32(0), &mut regs, &mut mem).unwrap();
        assert_eq!(record.memory_address, Some(memory::DATA_BASE));
        assert_eq!(i32_from_bits(&record.memory_data.unwrap()), -42);
        assert!(record.control.mem_write);
        assert_eq!(i32_from_bits(&memory::word_to_bits(mem.read_word(memory::DATA_BASE).unwrap())), -42);
    }
}
