//! Out-of-order core simulator CLI.
//!
//! This binary provides the entry points for running the simulator:
//! 1. **Workload run:** Execute a built-in microbenchmark on the
//!    out-of-order core and print statistics.
//! 2. **Trace replay:** Replay a memory trace file through the cache model
//!    at a fixed injection rate.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use ooosim_core::cache::{CacheController, FixedLatencyCache};
use ooosim_core::config::CpuConfig;
use ooosim_core::event::CycleAccurateEventQueue;
use ooosim_core::isa::context::SimContext;
use ooosim_core::mem::Endianness;
use ooosim_core::sim::Simulation;
use ooosim_core::sim::trace::{self, TraceAccess, TraceTrafficGenerator};
use ooosim_core::sim::workload::{self, WORKLOAD_BASE_PC};

#[derive(Parser, Debug)]
#[command(
    name = "ooosim",
    author,
    version,
    about = "Cycle-accurate out-of-order core simulator",
    long_about = "Run a built-in microbenchmark on the out-of-order core, or replay a memory \
                  trace through the cache model.\n\nExamples:\n  ooosim run --workload chain\n  \
                  ooosim run --workload loop --config cpu.json\n  ooosim trace traces/qsort.txt"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a built-in workload (chain, stride, loop).
    Run {
        /// Workload name.
        #[arg(short, long, default_value = "chain")]
        workload: String,

        /// Workload size parameter (chain length, array words, iterations).
        #[arg(short, long, default_value_t = 100)]
        size: usize,

        /// JSON configuration file (defaults when omitted).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Cycle limit before giving up.
        #[arg(long, default_value_t = 10_000_000)]
        max_cycles: u64,

        /// Statistics sections to print (summary, rename, branch, fu).
        #[arg(long)]
        stats: Vec<String>,
    },

    /// Replay a memory trace file (threadId, pc, R|W, ea; hex, comma-separated).
    Trace {
        /// Trace file path.
        path: PathBuf,

        /// Inject one record every N cycles.
        #[arg(long, default_value_t = 100)]
        interval: u64,
    },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            workload,
            size,
            config,
            max_cycles,
            stats,
        } => cmd_run(&workload, size, config, max_cycles, stats),
        Commands::Trace { path, interval } => cmd_trace(&path, interval),
    }
}

fn load_config(path: Option<PathBuf>) -> CpuConfig {
    match path {
        None => CpuConfig::default(),
        Some(path) => {
            let text = std::fs::read_to_string(&path).unwrap_or_else(|e| {
                eprintln!("Error reading config {}: {e}", path.display());
                process::exit(1);
            });
            serde_json::from_str(&text).unwrap_or_else(|e| {
                eprintln!("Error parsing config {}: {e}", path.display());
                process::exit(1);
            })
        }
    }
}

fn cmd_run(workload: &str, size: usize, config: Option<PathBuf>, max_cycles: u64, stats: Vec<String>) {
    let config = load_config(config);

    let program = match workload {
        "chain" => workload::dependency_chain(size),
        "stride" => workload::memory_stride(size),
        "loop" => workload::branchy_loop(size.min(i16::MAX as usize) as i16),
        other => {
            eprintln!("Unknown workload {other:?}, expected chain, stride, or loop");
            process::exit(1);
        }
    };

    let context = SimContext::new(program, WORKLOAD_BASE_PC, Endianness::Little);
    let mut simulation = Simulation::with_context(config, context);

    println!("[*] workload={workload} size={size}");
    let finished = simulation.run(max_cycles);
    if !finished {
        eprintln!("[!] cycle limit of {max_cycles} reached before completion");
        simulation.core.stats.print(&simulation.core.fu_pool);
        process::exit(1);
    }

    simulation
        .core
        .stats
        .print_sections(&stats, &simulation.core.fu_pool);

    let regs = &simulation.core.threads[0].context.regs;
    println!("r1={} r2={} r4={}", regs.gpr[1], regs.gpr[2], regs.gpr[4]);
}

fn cmd_trace(path: &std::path::Path, interval: u64) {
    let records = trace::read_trace_file(path).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        process::exit(1);
    });
    let total = records.len();
    println!("[*] {total} records from {}", path.display());

    // Pace the records through the cache model, tracking outstanding
    // completions on the event queue.
    let mut cache = FixedLatencyCache::new(&CpuConfig::default().cache);
    let mut generator = TraceTrafficGenerator::new(records, interval);
    let mut events: CycleAccurateEventQueue<TraceAccess> = CycleAccurateEventQueue::new();

    let mut reads = 0u64;
    let mut writes = 0u64;
    while generator.remaining() > 0 || !events.is_empty() {
        let cycle = events.current_cycle();
        if let Some(record) = generator.advance_one_cycle(cycle) {
            let thread = record.thread_id as usize;
            let address = record.effective_address as u32;
            let latency = match record.access {
                TraceAccess::Read => cache.load(thread, address),
                TraceAccess::Write => cache.store(thread, address),
            };
            events.schedule(latency.max(1), record.access);
        }
        while let Some(access) = events.pop_due() {
            match access {
                TraceAccess::Read => reads += 1,
                TraceAccess::Write => writes += 1,
            }
        }
        events.advance();
    }

    println!(
        "[*] replay complete: {reads} reads, {writes} writes over {} cycles",
        events.current_cycle()
    );
}
