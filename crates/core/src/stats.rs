//! Simulation statistics collection and reporting.
//!
//! Tracks performance counters for the out-of-order core. It provides:
//! 1. **Cycle and retirement:** Total cycles, committed instructions, IPC.
//! 2. **Speculation:** Squash count and branch prediction outcomes.
//! 3. **Stalls:** Per-cause rename stalls and fetch stalls; functional unit
//!    stall counters live on [`FuPool`] and are printed alongside.
//!
//! [`FuPool`]: crate::pipeline::fu::FuPool

use crate::pipeline::fu::{FuOperationType, FuPool, FuType};

/// Flat counters for one core.
#[derive(Clone, Debug, Default)]
pub struct CoreStats {
    /// Total simulated cycles.
    pub cycles: u64,
    /// Instructions retired across all threads.
    pub instructions_retired: u64,
    /// Pipeline squashes (mispredictions resolved at commit).
    pub num_squashes: u64,
    /// Reorder buffer entries discarded by squashes.
    pub num_squashed_entries: u64,

    /// Rename stalls: some class file had too few free physical registers.
    pub rename_stalls_on_physical_registers: u64,
    /// Rename stalls: the load/store queue was full.
    pub rename_stalls_on_load_store_queue: u64,
    /// Rename stalls: the reorder buffer was full.
    pub rename_stalls_on_reorder_buffer: u64,
    /// Cycles fetch spent waiting on instruction line fills.
    pub fetch_stall_cycles: u64,

    /// Control instructions committed with a correct prediction.
    pub branch_predictions_correct: u64,
    /// Control instructions committed with a wrong prediction.
    pub branch_predictions_wrong: u64,

    /// Commit watchdog dump requests (diagnosis of apparent deadlock).
    pub watchdog_dumps: u64,
}

/// Section names accepted by [`CoreStats::print_sections`].
pub const STATS_SECTIONS: &[&str] = &["summary", "rename", "branch", "fu"];

impl CoreStats {
    /// Prints the requested sections to stdout; an empty slice prints all.
    pub fn print_sections(&self, sections: &[String], fu_pool: &FuPool) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let cycles = self.cycles.max(1);

        if want("summary") {
            let ipc = self.instructions_retired as f64 / cycles as f64;
            println!("==================================================");
            println!("OUT-OF-ORDER CORE SIMULATION STATISTICS");
            println!("==================================================");
            println!("sim_cycles               {}", self.cycles);
            println!("sim_insts                {}", self.instructions_retired);
            println!("sim_ipc                  {ipc:.4}");
            println!("squashes                 {}", self.num_squashes);
            println!("squashed_entries         {}", self.num_squashed_entries);
            println!("--------------------------------------------------");
        }
        if want("rename") {
            println!("RENAME / FETCH STALLS");
            println!(
                "  stalls.phys_regs       {}",
                self.rename_stalls_on_physical_registers
            );
            println!(
                "  stalls.lsq_full        {}",
                self.rename_stalls_on_load_store_queue
            );
            println!(
                "  stalls.rob_full        {}",
                self.rename_stalls_on_reorder_buffer
            );
            println!("  stalls.ifetch          {}", self.fetch_stall_cycles);
            println!("--------------------------------------------------");
        }
        if want("branch") {
            let total = self.branch_predictions_correct + self.branch_predictions_wrong;
            let accuracy = if total > 0 {
                100.0 * self.branch_predictions_correct as f64 / total as f64
            } else {
                0.0
            };
            println!("BRANCH PREDICTION");
            println!("  bp.lookups             {total}");
            println!("  bp.mispredicts         {}", self.branch_predictions_wrong);
            println!("  bp.accuracy            {accuracy:.2}%");
            println!("--------------------------------------------------");
        }
        if want("fu") {
            println!("FUNCTIONAL UNIT STALLS");
            for fu_type in FuType::ALL {
                println!(
                    "  fu.{:<20} {}",
                    format!("{fu_type:?}"),
                    fu_pool.stalls_on_no_free_fu(fu_type)
                );
            }
            for op in FuOperationType::ALL {
                let stalls = fu_pool.stalls_on_acquire_failed(op);
                if stalls > 0 {
                    println!("  op.{:<20} {stalls}", format!("{op:?}"));
                }
            }
        }
        println!("==================================================");
    }

    /// Prints every section.
    pub fn print(&self, fu_pool: &FuPool) {
        self.print_sections(&[], fu_pool);
    }
}
