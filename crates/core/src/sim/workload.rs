//! Built-in microbenchmark programs.
//!
//! Small synthetic workloads exercising distinct pipeline behaviors,
//! used by the command-line front end and as demonstration inputs.

use crate::isa::StaticInst;
use std::sync::Arc;

/// Base address programs are laid out from.
pub const WORKLOAD_BASE_PC: u32 = 0x0040_0000;

/// A serial dependency chain: `length` increments of r1, each depending on
/// the previous. Retires one instruction per ALU latency once the window
/// fills; the final architected r1 equals `length`.
pub fn dependency_chain(length: usize) -> Vec<Arc<StaticInst>> {
    let mut program = Vec::with_capacity(length + 1);
    for _ in 0..length {
        program.push(StaticInst::addi(1, 1, 1));
    }
    program.push(StaticInst::halt());
    program
}

/// A store/load stride walk: writes `count` words to an array, reads them
/// back, and accumulates the sum in r4. Exercises the load/store queue and
/// memory-port contention.
pub fn memory_stride(count: usize) -> Vec<Arc<StaticInst>> {
    let mut program = Vec::new();
    // r1 = array base, r2 = value seed
    program.push(StaticInst::addi(1, 0, 0x1000));
    program.push(StaticInst::addi(2, 0, 3));
    for i in 0..count {
        program.push(StaticInst::addi(2, 2, 1));
        program.push(StaticInst::sw(2, (i * 4) as i16, 1));
    }
    for i in 0..count {
        program.push(StaticInst::lw(3, (i * 4) as i16, 1));
        program.push(StaticInst::add(4, 4, 3));
    }
    program.push(StaticInst::halt());
    program
}

/// A counted loop with a backwards conditional branch: decrements r1 from
/// `iterations` to zero, accumulating into r2 and counting trips in r5 from
/// the branch's delay slot. Exercises prediction training and commit-time
/// misprediction recovery on the loop entry and exit.
pub fn branchy_loop(iterations: i16) -> Vec<Arc<StaticInst>> {
    let base = WORKLOAD_BASE_PC;
    vec![
        StaticInst::addi(1, 0, iterations),
        // loop body at base + 4
        StaticInst::addi(2, 2, 2),
        StaticInst::addi(1, 1, -1),
        StaticInst::bne(1, 0, base + 4),
        StaticInst::addi(5, 5, 1), // delay slot, executes every trip
        StaticInst::halt(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::context::{ContextState, SimContext};
    use crate::mem::Endianness;
    use crate::sim::run_functional;

    #[test]
    fn test_dependency_chain_functional_result() {
        let mut context = SimContext::new(dependency_chain(100), WORKLOAD_BASE_PC, Endianness::Little);
        run_functional(&mut context);
        assert_eq!(context.regs.gpr[1], 100);
        assert_eq!(context.state, ContextState::Finished);
    }

    #[test]
    fn test_memory_stride_functional_result() {
        let mut context = SimContext::new(memory_stride(4), WORKLOAD_BASE_PC, Endianness::Little);
        run_functional(&mut context);
        // Values 4, 5, 6, 7 summed.
        assert_eq!(context.regs.gpr[4], 22);
    }

    #[test]
    fn test_branchy_loop_functional_result() {
        let mut context = SimContext::new(branchy_loop(10), WORKLOAD_BASE_PC, Endianness::Little);
        run_functional(&mut context);
        assert_eq!(context.regs.gpr[1], 0);
        assert_eq!(context.regs.gpr[2], 20);
        assert_eq!(context.regs.gpr[5], 10);
    }
}
