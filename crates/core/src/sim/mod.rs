//! Simulation drivers.
//!
//! [`Simulation`] paces a core to completion; [`run_functional`] executes a
//! context's program with no timing model at all, serving as the oracle the
//! out-of-order result must match.

pub mod trace;
pub mod workload;

use crate::cache::{CacheController, FixedLatencyCache};
use crate::config::CpuConfig;
use crate::core::Core;
use crate::isa::context::{Context, ContextState, SimContext};

/// Top-level driver: owns the core and paces it cycle by cycle.
pub struct Simulation<C: Context, H: CacheController> {
    /// The simulated core.
    pub core: Core<C, H>,
}

impl<C: Context> Simulation<C, FixedLatencyCache> {
    /// Convenience constructor: one thread over the fixed-latency cache.
    pub fn with_context(config: CpuConfig, context: C) -> Self {
        let cache = FixedLatencyCache::new(&config.cache);
        Self {
            core: Core::new(config, cache, vec![context]),
        }
    }
}

impl<C: Context, H: CacheController> Simulation<C, H> {
    /// Wraps an already-built core.
    pub fn new(core: Core<C, H>) -> Self {
        Self { core }
    }

    /// True once every thread has finished its program, retired its last
    /// decoded instruction, and drained its in-flight window.
    pub fn done(&self) -> bool {
        self.core.threads.iter().all(|thread| {
            thread.context.state() == ContextState::Finished
                && thread.is_last_decoded_inst_committed()
                && thread.reorder_buffer.is_empty()
                && thread.load_store_queue.is_empty()
        })
    }

    /// Runs until completion or `max_cycles`, whichever comes first.
    /// Returns true when the simulation completed.
    pub fn run(&mut self, max_cycles: u64) -> bool {
        while !self.done() {
            if self.core.stats.cycles >= max_cycles {
                return false;
            }
            self.core.advance_one_cycle();
        }
        true
    }
}

/// Executes the context's program functionally (no pipeline, no timing).
/// The architected register and memory state afterwards is the reference the
/// out-of-order run must reproduce.
pub fn run_functional(context: &mut SimContext) {
    while context.state == ContextState::Running {
        let inst = context.decode_next_static_inst();
        if context.state != ContextState::Running {
            break;
        }
        context.execute(&inst);
    }
}
