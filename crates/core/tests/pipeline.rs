//! End-to-end pipeline scenarios.
//!
//! Each test runs a small program through the full out-of-order core and
//! checks timing/ordering properties alongside the architected result. The
//! functional-only runner serves as the oracle: whatever the pipeline does,
//! the final register and memory state must match a plain sequential
//! execution of the same program.

use std::sync::Arc;

use ooosim_core::cache::{CacheController, FixedLatencyCache};
use ooosim_core::common::reg::RegisterClass;
use ooosim_core::config::CpuConfig;
use ooosim_core::core::Core;
use ooosim_core::isa::context::{ContextState, SimContext};
use ooosim_core::isa::{StaticInst, StaticInstType};
use ooosim_core::mem::Endianness;
use ooosim_core::pipeline::fu::{FuOperationType, FuType};
use ooosim_core::sim::workload::{self, WORKLOAD_BASE_PC};
use ooosim_core::sim::{Simulation, run_functional};

const BASE: u32 = WORKLOAD_BASE_PC;
const MAX_CYCLES: u64 = 1_000_000;

fn simulation(
    program: Vec<Arc<StaticInst>>,
    config: CpuConfig,
    setup: impl Fn(&mut SimContext),
) -> Simulation<SimContext, FixedLatencyCache> {
    let mut context = SimContext::new(program, BASE, Endianness::Little);
    setup(&mut context);
    Simulation::with_context(config, context)
}

fn functional_reference(program: Vec<Arc<StaticInst>>, setup: impl Fn(&mut SimContext)) -> SimContext {
    let mut context = SimContext::new(program, BASE, Endianness::Little);
    setup(&mut context);
    run_functional(&mut context);
    context
}

fn assert_arch_state_matches(sim: &Simulation<SimContext, FixedLatencyCache>, reference: &SimContext) {
    let actual = &sim.core.threads[0].context;
    assert_eq!(actual.regs.gpr, reference.regs.gpr, "integer registers diverged");
    assert_eq!(actual.regs.fpr, reference.regs.fpr, "fp registers diverged");
    assert_eq!(actual.regs.pc, reference.regs.pc, "pc diverged");
    assert_eq!(actual.state, ContextState::Finished);
}

fn assert_prf_accounting(sim: &Simulation<SimContext, FixedLatencyCache>) {
    // With the pipeline drained, the only live registers are the committed
    // architectural mappings: one per logical register of each class.
    let thread = &sim.core.threads[0];
    for class in RegisterClass::ALL {
        let file = thread.physical_register_file(class);
        assert_eq!(
            file.num_free(),
            file.capacity() as u32 - class.num_registers(),
            "{class:?} file leaked physical registers"
        );
    }
}

// --- seed scenario 1: pure ALU dependency chain -------------------------

#[test]
fn test_alu_dependency_chain() {
    let program = workload::dependency_chain(100);
    let reference = functional_reference(program.clone(), |_| {});
    let mut sim = simulation(program, CpuConfig::default(), |_| {});

    assert!(sim.run(MAX_CYCLES), "chain did not complete");

    assert_eq!(sim.core.threads[0].context.regs.gpr[1], 100);
    assert_arch_state_matches(&sim, &reference);
    assert_prf_accounting(&sim);

    // A serial chain: one result per ALU latency, no contention, no
    // speculation.
    assert_eq!(sim.core.stats.num_squashes, 0);
    for op in FuOperationType::ALL {
        assert_eq!(sim.core.fu_pool.stalls_on_acquire_failed(op), 0);
    }
    let cycles = sim.core.stats.cycles;
    assert!(
        (200..320).contains(&cycles),
        "expected ~100 * latency(2) + fill cycles, got {cycles}"
    );
}

// --- seed scenario 2: divide latency gates a dependent ------------------

#[test]
fn test_div_latency_gates_dependent() {
    let program = vec![
        StaticInst::addi(2, 0, 40),
        StaticInst::addi(3, 0, 2),
        StaticInst::div(1, 2, 3),
        StaticInst::add(4, 1, 3),
        StaticInst::halt(),
    ];
    let reference = functional_reference(program.clone(), |_| {});
    let mut sim = simulation(program, CpuConfig::default(), |_| {});

    let mut div_issue_cycle = None;
    let mut add_issue_cycle = None;
    for _ in 0..10_000 {
        if sim.done() {
            break;
        }
        sim.core.advance_one_cycle();
        let cycle = sim.core.stats.cycles;
        for (_, entry) in sim.core.threads[0].reorder_buffer.iter() {
            let name = entry.dynamic_inst.static_inst.mnemonic.name;
            if entry.issued && name == "div" && div_issue_cycle.is_none() {
                div_issue_cycle = Some(cycle);
            }
            if entry.issued && name == "add" && add_issue_cycle.is_none() {
                add_issue_cycle = Some(cycle);
            }
        }
    }
    assert!(sim.done(), "divide scenario did not complete");

    let div_issue = div_issue_cycle.expect("div never issued");
    let add_issue = add_issue_cycle.expect("add never issued");
    assert!(
        add_issue >= div_issue + 20,
        "add issued at {add_issue}, before div ({div_issue}) + operation latency 20"
    );

    assert_eq!(sim.core.threads[0].context.regs.gpr[1], 20);
    assert_eq!(sim.core.threads[0].context.regs.gpr[4], 22);
    assert_arch_state_matches(&sim, &reference);
}

// --- seed scenario 3: store-to-load ordering ----------------------------

#[test]
fn test_store_load_disambiguation() {
    // The store's data comes from a 20-cycle divide, so its address is known
    // long before its data. The younger load to the same address must stay
    // off the ready-load queue until the divide writes back.
    let program = vec![
        StaticInst::addi(2, 0, 0x100),
        StaticInst::addi(6, 0, 60),
        StaticInst::addi(7, 0, 3),
        StaticInst::div(1, 6, 7),
        StaticInst::sw(1, 0, 2),
        StaticInst::lw(3, 0, 2),
        StaticInst::add(4, 3, 7),
        StaticInst::halt(),
    ];
    let reference = functional_reference(program.clone(), |_| {});
    let mut sim = simulation(program, CpuConfig::default(), |_| {});

    let mut saw_load_held_back = false;
    for _ in 0..10_000 {
        if sim.done() {
            break;
        }
        sim.core.advance_one_cycle();

        let thread = &sim.core.threads[0];
        let store_data_pending = thread.load_store_queue.iter().any(|(_, e)| {
            e.dynamic_inst.static_inst.mnemonic.inst_type == StaticInstType::St
                && e.store_address_ready
                && !e.all_operands_ready()
        });
        let load_waiting = thread
            .load_store_queue
            .iter()
            .any(|(_, e)| e.dynamic_inst.static_inst.mnemonic.inst_type == StaticInstType::Ld);
        if store_data_pending {
            assert!(
                sim.core.queues.ready_loads.is_empty(),
                "load promoted past a store with unknown data"
            );
            if load_waiting {
                saw_load_held_back = true;
            }
        }
    }
    assert!(sim.done(), "store/load scenario did not complete");
    assert!(saw_load_held_back, "scenario never exercised the ordering window");

    let regs = &sim.core.threads[0].context.regs;
    assert_eq!(regs.gpr[1], 20);
    assert_eq!(regs.gpr[3], 20, "load observed a value other than the store's");
    assert_eq!(regs.gpr[4], 23);
    assert_eq!(sim.core.threads[0].context.memory.read_word_at(0x100), 20);
    assert_arch_state_matches(&sim, &reference);
}

// --- seed scenario 4: misprediction recovery at commit ------------------

#[test]
fn test_branch_misprediction_recovery() {
    let program = workload::branchy_loop(3);
    let reference = functional_reference(program.clone(), |_| {});
    let mut sim = simulation(program, CpuConfig::default(), |_| {});

    assert!(sim.run(MAX_CYCLES), "loop did not complete");

    // Loop entry (cold BTB) and loop exit both mispredict; the middle trip
    // is predicted correctly.
    assert!(sim.core.stats.num_squashes >= 1, "no squash observed");
    assert!(sim.core.stats.branch_predictions_wrong >= 1);
    assert!(sim.core.stats.num_squashed_entries >= 1);

    let regs = &sim.core.threads[0].context.regs;
    assert_eq!(regs.gpr[1], 0);
    assert_eq!(regs.gpr[2], 6);
    assert_eq!(regs.gpr[5], 3);
    assert_arch_state_matches(&sim, &reference);

    // After every squash and drain, the physical register files hold
    // exactly the committed state.
    assert_prf_accounting(&sim);
    assert!(sim.core.threads[0].reorder_buffer.is_empty());
    assert!(sim.core.threads[0].load_store_queue.is_empty());
}

// --- seed scenario 5: functional unit saturation ------------------------

#[test]
fn test_fu_saturation_on_divides() {
    let mut config = CpuConfig::default();
    config.decode_width = 16;
    config.dispatch_width = 16;
    config.issue_width = 16;

    let mut program: Vec<Arc<StaticInst>> = (0..10).map(|i| StaticInst::div(4 + i, 2, 3)).collect();
    program.push(StaticInst::halt());

    let mut sim = simulation(program, config, |context| {
        context.regs.set_gpr(2, 40);
        context.regs.set_gpr(3, 2);
    });

    // Ten independent divides meet two divide units: the first issue cycle
    // succeeds twice and counts one stall per remaining candidate.
    let mut first_stall_count = None;
    for _ in 0..10_000 {
        if sim.done() {
            break;
        }
        sim.core.advance_one_cycle();
        let stalls = sim.core.fu_pool.stalls_on_acquire_failed(FuOperationType::IntDiv);
        if stalls > 0 && first_stall_count.is_none() {
            first_stall_count = Some(stalls);
            assert_eq!(sim.core.fu_pool.num_free(FuType::IntMultDiv), 0);
        }
    }
    assert!(sim.done(), "saturation scenario did not complete");
    assert_eq!(
        first_stall_count,
        Some(8),
        "first contended cycle should stall all eight blocked divides"
    );

    let regs = &sim.core.threads[0].context.regs;
    for i in 0..10 {
        assert_eq!(regs.gpr[4 + i], 20);
    }
    // Units never over- or under-released.
    assert_eq!(sim.core.fu_pool.num_free(FuType::IntMultDiv), 2);
    assert_prf_accounting(&sim);
}

// --- round trip: out-of-order result equals functional execution --------

#[test]
fn test_round_trip_memory_stride() {
    let program = workload::memory_stride(8);
    let reference = functional_reference(program.clone(), |_| {});
    let mut sim = simulation(program, CpuConfig::default(), |_| {});

    assert!(sim.run(MAX_CYCLES), "stride workload did not complete");
    assert_arch_state_matches(&sim, &reference);

    // Committed memory must match the functional run word for word.
    let memory = &mut sim.core.threads[0].context.memory;
    let mut reference = reference;
    for i in 0..8u32 {
        let address = 0x1000 + i * 4;
        assert_eq!(
            memory.read_word_at(address),
            reference.memory.read_word_at(address),
            "memory diverged at {address:#x}"
        );
    }
    assert_prf_accounting(&sim);
}

#[test]
fn test_round_trip_floating_point() {
    let program = vec![
        StaticInst::fadd(3, 1, 2),
        StaticInst::fmul(4, 3, 1),
        StaticInst::fdiv(5, 4, 2),
        StaticInst::fsqrt(6, 5),
        StaticInst::fcmp(7, 1, 2),
        StaticInst::fcvt(8, 5),
        StaticInst::halt(),
    ];
    let setup = |context: &mut SimContext| {
        context.regs.fpr[1] = 2.25f64.to_bits();
        context.regs.fpr[2] = 0.5f64.to_bits();
    };
    let reference = functional_reference(program.clone(), setup);
    let mut sim = simulation(program, CpuConfig::default(), setup);

    assert!(sim.run(MAX_CYCLES), "fp workload did not complete");
    assert_arch_state_matches(&sim, &reference);
    assert_eq!(sim.core.stats.num_squashes, 0);
    assert_prf_accounting(&sim);
}

#[test]
fn test_round_trip_call_and_return() {
    let program = vec![
        StaticInst::jal(BASE + 24),
        StaticInst::addi(9, 9, 1), // delay slot of jal
        StaticInst::addi(2, 0, 1),
        StaticInst::halt(),
        StaticInst::nop(),
        StaticInst::nop(),
        StaticInst::addi(3, 0, 7), // function body at BASE + 24
        StaticInst::jr(31),
        StaticInst::addi(9, 9, 1), // delay slot of jr
    ];
    let reference = functional_reference(program.clone(), |_| {});
    let mut sim = simulation(program, CpuConfig::default(), |_| {});

    assert!(sim.run(MAX_CYCLES), "call/return did not complete");

    let regs = &sim.core.threads[0].context.regs;
    assert_eq!(regs.gpr[31], BASE + 8);
    assert_eq!(regs.gpr[3], 7);
    assert_eq!(regs.gpr[2], 1);
    assert_eq!(regs.gpr[9], 2);
    assert_arch_state_matches(&sim, &reference);
    assert_prf_accounting(&sim);
}

// --- commit watchdog ----------------------------------------------------

/// Hand-written cache double counting watchdog dump requests.
struct CountingCache {
    inner: FixedLatencyCache,
    dumps: u64,
}

impl CacheController for CountingCache {
    fn line_size(&self) -> u32 {
        self.inner.line_size()
    }
    fn can_ifetch(&mut self, thread: usize, pc: u32) -> bool {
        self.inner.can_ifetch(thread, pc)
    }
    fn ifetch(&mut self, thread: usize, pc: u32) -> u64 {
        self.inner.ifetch(thread, pc)
    }
    fn load(&mut self, thread: usize, address: u32) -> u64 {
        self.inner.load(thread, address)
    }
    fn store(&mut self, thread: usize, address: u32) -> u64 {
        self.inner.store(thread, address)
    }
    fn dump_pending_flows(&mut self) {
        self.dumps += 1;
    }
}

#[test]
fn test_commit_watchdog_requests_dump() {
    let config = CpuConfig::default();
    let cache = CountingCache {
        inner: FixedLatencyCache::new(&config.cache),
        dumps: 0,
    };
    let mut context = SimContext::new(vec![StaticInst::halt()], BASE, Endianness::Little);
    // A blocked context never fetches, so nothing ever commits.
    context.state = ContextState::Blocked;

    let mut core = Core::new(config, cache, vec![context]);
    // Six escalation windows of a million cycles each, then dumps begin.
    for _ in 0..7_200_000u64 {
        core.advance_one_cycle();
        if core.stats.watchdog_dumps > 0 {
            break;
        }
    }
    assert!(core.stats.watchdog_dumps > 0, "watchdog never escalated");
    assert!(core.cache.dumps > 0, "pending-flow dump never requested");
}
