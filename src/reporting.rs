//! Human-readable dumps: register aliases and the statistics report.
//!
//! The core never uses these names — registers are addressed by
//! numeric index everywhere else in the crate. This module exists
//! purely so a trace or a final-state dump reads the way a RISC-V
//! programmer expects.

use std::fmt;

use crate::cpu::{Cpu, Stats};

const ABI_NAMES: [&str; 32] = [
    "zero", "ra", "sp", "gp", "tp", "t0", "t1", "t2", "s0", "s1", "a0", "a1", "a2", "a3", "a4",
    "a5", "a6", "a7", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "t3", "t4",
    "t5", "t6",
];

/// The standard RISC-V ABI name for integer register `index` (0..32).
/// Fatal on an out-of-range index, mirroring [`crate::registers`].
pub fn register_alias(index: usize) -> &'static str {
    ABI_NAMES[index]
}

/// Dump all 32 integer registers as `name = 0xXXXXXXXX` lines.
pub fn format_registers(cpu: &Cpu) -> String {
    let mut out = String::new();
    for index in 0..32 {
        let value = cpu.get_register(index).expect("index < 32");
        out.push_str(&format!("  x{:<2} ({:<4}) = 0x{}\n", index, register_alias(index), value.to_hex()));
    }
    out
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==========================================================")?;
        writeln!(f, "RV32 SINGLE-CYCLE SIMULATION STATISTICS")?;
        writeln!(f, "==========================================================")?;
        writeln!(f, "cycles                   {}", self.cycles)?;
        writeln!(f, "instructions_retired     {}", self.instructions_retired)?;
        writeln!(f, "cpi                      {:.4}", self.cpi())?;
        writeln!(f, "----------------------------------------------------------")?;
        writeln!(f, "BRANCHES")?;
        writeln!(f, "  taken                  {}", self.branches_taken)?;
        writeln!(f, "  not_taken              {}", self.branches_not_taken)?;
        writeln!(f, "----------------------------------------------------------")?;
        writeln!(f, "MEMORY")?;
        writeln!(f, "  reads                  {}", self.memory_reads)?;
        writeln!(f, "  writes                 {}", self.memory_writes)?;
        writeln!(f, "----------------------------------------------------------")?;
        writeln!(f, "INSTRUCTION MIX")?;
        let mut counts: Vec<_> = self.mnemonic_counts.iter().collect();
        counts.sort_by_key(|(mnemonic, _)| format!("{:?}", mnemonic));
        for (mnemonic, count) in counts {
            writeln!(f, "  {:<10} {}", format!("{:?}", mnemonic), count)?;
        }
        writeln!(f, "==========================================================")
    }
}
