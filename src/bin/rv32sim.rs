use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap_num::maybe_hex;

use rv32sim::cpu::Cpu;
use rv32sim::reporting;

/// Single-cycle RV32I(M)(F) simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a hex-text program image (one 32-bit instruction word
    /// per line, most-significant nibble first)
    program: PathBuf,

    /// Maximum number of cycles to execute before giving up (use 0x
    /// prefix for hexadecimal)
    #[arg(short = 'c', long, default_value_t = 1_000_000, value_parser=maybe_hex::<u64>)]
    max_cycles: u64,

    /// Print every executed instruction as it runs
    #[arg(short, long)]
    trace: bool,

    /// Dump all 32 integer registers after execution halts
    #[arg(short, long)]
    dump_registers: bool,

    /// Print simulation statistics after execution halts
    #[arg(short, long)]
    stats: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut cpu = Cpu::new();

    if let Err(e) = cpu.load_hex_file(&args.program) {
        eprintln!("error loading program: {e}");
        return ExitCode::FAILURE;
    }

    if args.trace {
        loop {
            let record = match cpu.step() {
                Ok(record) => record,
                Err(e) => {
                    eprintln!("error executing instruction: {e}");
                    return ExitCode::FAILURE;
                }
            };
            println!(
                "pc=0x{} raw=0x{} {:?}",
                record.pc.to_hex(),
                record.raw.to_hex(),
                record.instruction.mnemonic
            );
            if record.halt.is_some() || cpu.stats.cycles >= args.max_cycles {
                break;
            }
        }
    } else {
        match cpu.run(args.max_cycles, None) {
            Ok(outcome) => {
                println!("halted: {:?} after {} cycles", outcome.halt, outcome.cycles_executed);
            }
            Err(e) => {
                eprintln!("error executing program: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    if args.dump_registers {
        print!("{}", reporting::format_registers(&cpu));
    }
    if args.stats {
        print!("{}", cpu.stats);
    }

    ExitCode::SUCCESS
}
