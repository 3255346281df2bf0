//! Top-level CPU: owns architectural state and the run loop.
//!
//! A single-cycle core retires exactly one instruction per cycle, so
//! CPI is always 1.0 here — [`Stats`] still computes it the way a
//! pipelined simulator would, since a later multi-cycle extension
//! would only need to start incrementing `cycles` faster than
//! `instructions_retired`.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

use crate::bits::BitVec;
use crate::datapath::{self, DatapathError, HaltCause};
use crate::decode::Mnemonic;
use crate::loader::{self, LoaderError};
use crate::memory::{self, Memory, MemoryError};
use crate::registers::{RegisterError, RegisterFile};

#[derive(Error, Debug)]
pub enum CpuError {
    #[error(transparent)]
    Datapath(#[from] DatapathError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub cycles: u64,
    pub instructions_retired: u64,
    pub mnemonic_counts: HashMap<Mnemonic, u64>,
    pub branches_taken: u64,
    pub branches_not_taken: u64,
    pub memory_reads: u64,
    pub memory_writes: u64,
}

impl Stats {
    pub fn record(&mut self, record: &datapath::CycleRecord) {
        let mnemonic = record.instruction.mnemonic;
        self.cycles += 1;
        self.instructions_retired += 1;
        *self.mnemonic_counts.entry(mnemonic).or_insert(0) += 1;
        match record.branch_taken {
            Some(true) => self.branches_taken += 1,
            Some(false) => self.branches_not_taken += 1,
            None => {}
        }
        if record.memory_address.is_some() {
            match mnemonic {
                Mnemonic::Lw => self.memory_reads += 1,
                Mnemonic::Sw => self.memory_writes += 1,
                _ => {}
            }
        }
    }

    pub fn cpi(&self) -> f64 {
        if self.instructions_retired == 0 {
            0.0
        } else {
            self.cycles as f64 / self.instructions_retired as f64
        }
    }
}

/// Result of a completed run: the stopping cause, the counts of
/// cycles and retired instructions (equal on this single-cycle core,
/// but tracked separately for the same reason [`Stats::cpi`] is), and
/// the PC at the moment execution stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub halt: HaltCause,
    pub cycles_executed: u64,
    pub instruction_count: u64,
    pub final_pc: BitVec,
}

pub struct Cpu {
    pc: BitVec,
    registers: RegisterFile,
    memory: Memory,
    pub stats: Stats,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            pc: memory::word_to_bits(memory::INSTRUCTION_BASE),
            registers: RegisterFile::new(),
            memory: Memory::new(),
            stats: Stats::default(),
        }
    }

    pub fn reset(&mut self) {
        self.pc = memory::word_to_bits(memory::INSTRUCTION_BASE);
        self.registers.reset();
        self.stats = Stats::default();
    }

    pub fn load_program(&mut self, bytes: &[u8]) -> Result<(), CpuError> {
        self.memory.load_program(bytes)?;
        Ok(())
    }

    pub fn load_hex_file(&mut self, path: &Path) -> Result<(), CpuError> {
        let bytes = loader::load_hex_file(path)?;
        self.load_program(&bytes)
    }

    pub fn pc(&self) -> &BitVec {
        &self.pc
    }

    pub fn get_register(&self, index: usize) -> Result<BitVec, CpuError> {
        Ok(self.registers.read_int(index)?)
    }

    pub fn set_register(&mut self, index: usize, value: BitVec) -> Result<(), CpuError> {
        Ok(self.registers.write_int(index, value)?)
    }

    pub fn get_fp_register(&self, index: usize) -> Result<BitVec, CpuError> {
        Ok(self.registers.read_fp(index)?)
    }

    pub fn set_fp_register(&mut self, index: usize, value: BitVec) -> Result<(), CpuError> {
        Ok(self.registers.write_fp(index, value)?)
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn get_memory_word(&self, address: u32) -> Result<u32, CpuError> {
        Ok(self.memory.read_word(address)?)
    }

    pub fn set_memory_word(&mut self, address: u32, value: u32) -> Result<(), CpuError> {
        Ok(self.memory.write_word(address, value)?)
    }

    /// Run exactly one cycle, updating the PC and statistics.
    pub fn step(&mut self) -> Result<datapath::CycleRecord, CpuError> {
        let record = datapath::step(self.stats.cycles, &self.pc, &mut self.registers, &mut self.memory)?;
        self.stats.record(&record);
        self.pc = record.next_pc.clone();
        Ok(record)
    }

    /// Run until a halt condition is reached: an unrecognized
    /// instruction, a self-branch (`jal x0, 0`), `max_cycles` cycles
    /// have executed, or (if given) the PC reaches `target_pc`.
    /// Checked in that priority order, so a cycle that simultaneously
    /// hits the cycle budget and lands on `target_pc` reports
    /// `MaxCycles`.
    pub fn run(&mut self, max_cycles: u64, target_pc: Option<&BitVec>) -> Result<RunOutcome, CpuError> {
        self.run_with_trace(max_cycles, target_pc, false).map(|(outcome, _)| outcome)
    }

    pub fn run_until_pc(&mut self, target_pc: &BitVec, max_cycles: u64) -> Result<RunOutcome, CpuError> {
        self.run(max_cycles, Some(target_pc))
    }

    /// Same as [`Cpu::run`], but when `collect_trace` is set also
    /// returns every cycle's [`datapath::CycleRecord`] in execution
    /// order. Tracing is opt-in since a long-running program would
    /// otherwise accumulate one record per cycle for no reason.
    pub fn run_with_trace(
        &mut self,
        max_cycles: u64,
        target_pc: Option<&BitVec>,
        collect_trace: bool,
    ) -> Result<(RunOutcome, Vec<datapath::CycleRecord>), CpuError> {
        let mut cycles_executed = 0u64;
        let mut trace = Vec::new();
        loop {
            let record = self.step()?;
            cycles_executed += 1;
            let halt = record.halt;
            if collect_trace {
                trace.push(record);
            }
            if let Some(cause) = halt {
                return Ok((
                    RunOutcome {
                        halt: cause,
                        cycles_executed,
                        instruction_count: cycles_executed,
                        final_pc: self.pc.clone(),
                    },
                    trace,
                ));
            }
            if cycles_executed >= max_cycles {
                return Ok((
                    RunOutcome {
                        halt: HaltCause::MaxCycles,
                        cycles_executed,
                        instruction_count: cycles_executed,
                        final_pc: self.pc.clone(),
                    },
                    trace,
                ));
            }
            if let Some(target) = target_pc {
                if self.pc == *target {
                    return Ok((
                        RunOutcome {
                            halt: HaltCause::TargetPc,
                            cycles_executed,
                            instruction_count: cycles_executed,
                            final_pc: self.pc.clone(),
                        },
                        trace,
                    ));
                }
            }
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bits_from_i32, i32_from_bits};

    #[test]
    fn runs_addi_sequence_to_self_branch_halt() {
        let mut cpu = Cpu::new();
        // addi x1, x0, 5 ; addi x1, x1, 5 ; jal x0, 0
        cpu.load_program(&[
            0x93, 0x00, 0x50, 0x00,
            0x93, 0x80, 0x50, 0x00,
            0x6f, 0x00, 0x00, 0x00,
        ])
        .unwrap();
        let outcome = cpu.run(100, None).unwrap();
        assert_eq!(outcome.halt, HaltCause::SelfBranch);
        assert_eq!(outcome.cycles_executed, 3);
        assert_eq!(i32_from_bits(&cpu.get_register(1).unwrap()), 10);
    }

    #[test]
    fn max_cycles_halts_a_tight_loop() {
        // addi x5, x5, 1 ; beq x0, x0, -4 (branches back to the addi, forever)
        let mut cpu = Cpu::new();
        cpu.load_program(&[
            0x93, 0x82, 0x12, 0x00, // addi x5, x5, 1
            0xe3, 0x0e, 0x00, 0xfe, // beq x0, x0, -4
        ])
        .unwrap();
        let outcome = cpu.run(10, None).unwrap();
        assert_eq!(outcome.halt, HaltCause::MaxCycles);
        assert_eq!(outcome.cycles_executed, 10);
    }

    #[test]
    fn run_until_pc_stops_at_target() {
        let mut cpu = Cpu::new();
        cpu.load_program(&[
            0x93, 0x00, 0x50, 0x00, // addi x1, x0, 5
            0x6f, 0x00, 0x00, 0x00, // jal x0, 0
        ])
        .unwrap();
        let target = memory::word_to_bits(4);
        let outcome = cpu.run_until_pc(&target, 10).unwrap();
        assert_eq!(outcome.halt, HaltCause::TargetPc);
        assert_eq!(outcome.cycles_executed, 1);
    }

    #[test]
    fn max_cycles_outranks_target_pc_on_the_same_cycle() {
        // addi x5, x5, 1 ; beq x0, x0, -4 (infinite loop; never self-halts)
        let mut cpu = Cpu::new();
        cpu.load_program(&[
            0x93, 0x82, 0x12, 0x00, // addi x5, x5, 1
            0xe3, 0x0e, 0x00, 0xfe, // beq x0, x0, -4
        ])
        .unwrap();
        // After one cycle the PC lands on 4 (the beq), matching both
        // the cycle budget and the target in the same step.
        let target = memory::word_to_bits(4);
        let outcome = cpu.run_until_pc(&target, 1).unwrap();
        assert_eq!(outcome.halt, HaltCause::MaxCycles);
        assert_eq!(outcome.cycles_executed, 1);
    }

    #[test]
    fn reset_clears_pc_and_registers() {
        let mut cpu = Cpu::new();
        cpu.set_register(3, bits_from_i32(7)).unwrap();
        cpu.reset();
        assert_eq!(i32_from_bits(&cpu.get_register(3).unwrap()), 0);
        assert_eq!(cpu.pc(), &memory::word_to_bits(memory::INSTRUCTION_BASE));
    }
}
