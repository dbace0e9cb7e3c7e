//! The out-of-order core.
//!
//! [`Core`] owns the hardware threads, the core-wide issue queues, the
//! functional unit pool, the event queue, and the cache seam, and drives one
//! cycle at a time in reverse pipeline order: commit → writeback arrivals
//! (event drain) → load/store queue refresh → issue → dispatch → rename →
//! fetch. Each stage therefore observes the previous cycle's tail.
//!
//! This module implements the core-wide halves: issue arbitration across the
//! three ready queues, register writeback with dependent wakeup, and event
//! handling. The per-thread stages (fetch, rename, dispatch, refresh,
//! commit, squash) live in [`thread`].

pub mod thread;

use crate::cache::CacheController;
use crate::config::CpuConfig;
use crate::event::CycleAccurateEventQueue;
use crate::isa::StaticInstType;
use crate::isa::context::Context;
use crate::pipeline::fu::{FuOperationType, FuPool, FuType};
use crate::pipeline::prf::Wakeup;
use crate::pipeline::rob::{EntryKind, EntryRef, PhysRegRef};
use crate::stats::CoreStats;
use std::collections::VecDeque;

pub use thread::Thread;

/// Events scheduled on the core's virtual-time queue.
///
/// Entry-targeted events carry an [`EntryRef`]; handlers no-op when the
/// referenced slot no longer holds the same entry (it was squashed and
/// possibly reused), so nothing is ever removed from the queue.
pub enum CoreEvent {
    /// A pipelined functional unit accepts the next issue.
    FuReleased {
        /// Unit type to release.
        fu_type: FuType,
    },
    /// An instruction-queue operation finished its unit latency.
    OperationCompleted {
        /// Reorder buffer entry.
        entry: EntryRef,
    },
    /// The instruction line a thread stalled on is available.
    IfetchCompleted {
        /// Stalled thread.
        thread: usize,
    },
    /// A load's data returned from the cache controller.
    LoadCompleted {
        /// Load/store queue entry.
        entry: EntryRef,
    },
    /// A store was acknowledged by the cache controller.
    StoreAcknowledged {
        /// Load/store queue entry.
        entry: EntryRef,
    },
}

/// The core-wide ready/waiting queues feeding issue.
///
/// Membership is scanned linearly; queue sizes are bounded by the reorder
/// buffer and load/store queue capacities.
#[derive(Default)]
pub struct IssueQueues {
    /// Reorder entries ready to claim a functional unit.
    pub ready_instructions: VecDeque<EntryRef>,
    /// Reorder entries with pending source operands.
    pub waiting_instructions: Vec<EntryRef>,
    /// Load queue entries cleared by disambiguation.
    pub ready_loads: VecDeque<EntryRef>,
    /// Store queue entries with address and data ready.
    pub ready_stores: VecDeque<EntryRef>,
    /// Store queue entries with pending operands.
    pub waiting_stores: Vec<EntryRef>,
}

impl IssueQueues {
    /// Removes an entry from every queue it appears on.
    pub fn remove_from_all(&mut self, entry: EntryRef) {
        self.ready_instructions.retain(|e| *e != entry);
        self.waiting_instructions.retain(|e| *e != entry);
        self.ready_loads.retain(|e| *e != entry);
        self.ready_stores.retain(|e| *e != entry);
        self.waiting_stores.retain(|e| *e != entry);
    }

    /// Removes an entry from the waiting instruction queue, reporting
    /// whether it was present.
    pub fn remove_waiting_instruction(&mut self, entry: EntryRef) -> bool {
        let before = self.waiting_instructions.len();
        self.waiting_instructions.retain(|e| *e != entry);
        self.waiting_instructions.len() != before
    }

    /// Removes an entry from the waiting store queue, reporting whether it
    /// was present.
    pub fn remove_waiting_store(&mut self, entry: EntryRef) -> bool {
        let before = self.waiting_stores.len();
        self.waiting_stores.retain(|e| *e != entry);
        self.waiting_stores.len() != before
    }
}

/// A superscalar out-of-order core over a set of hardware threads.
pub struct Core<C: Context, H: CacheController> {
    /// Capacities and widths.
    pub config: CpuConfig,
    /// Memory hierarchy seam.
    pub cache: H,
    /// Virtual-time scheduler.
    pub event_queue: CycleAccurateEventQueue<CoreEvent>,
    /// Functional unit pool.
    pub fu_pool: FuPool,
    /// Core-wide issue queues.
    pub queues: IssueQueues,
    /// Hardware threads.
    pub threads: Vec<Thread<C>>,
    /// Performance counters.
    pub stats: CoreStats,
    /// Allocation sequence for in-flight entries (validates [`EntryRef`]s).
    pub(crate) next_entry_seq: u64,
    /// Decode order for dynamic instructions.
    pub(crate) next_inst_uid: u64,
}

impl<C: Context, H: CacheController> Core<C, H> {
    /// Builds a core with one hardware thread per context.
    pub fn new(config: CpuConfig, cache: H, contexts: Vec<C>) -> Self {
        let threads = contexts
            .into_iter()
            .enumerate()
            .map(|(id, context)| Thread::new(id, context, &config))
            .collect();
        Self {
            config,
            cache,
            event_queue: CycleAccurateEventQueue::new(),
            fu_pool: FuPool::new(),
            queues: IssueQueues::default(),
            threads,
            stats: CoreStats::default(),
            next_entry_seq: 0,
            next_inst_uid: 0,
        }
    }

    /// Advances the core by one cycle, running the stages in reverse
    /// pipeline order.
    pub fn advance_one_cycle(&mut self) {
        for tid in 0..self.threads.len() {
            self.commit(tid);
        }
        while let Some(event) = self.event_queue.pop_due() {
            self.handle_event(event);
        }
        for tid in 0..self.threads.len() {
            self.refresh_load_store_queue(tid);
        }
        self.issue();
        for tid in 0..self.threads.len() {
            self.dispatch(tid);
        }
        for tid in 0..self.threads.len() {
            self.register_rename(tid);
        }
        for tid in 0..self.threads.len() {
            self.fetch(tid);
        }
        self.event_queue.advance();
        self.stats.cycles += 1;
    }

    fn handle_event(&mut self, event: CoreEvent) {
        match event {
            CoreEvent::FuReleased { fu_type } => self.fu_pool.release(fu_type),
            CoreEvent::IfetchCompleted { thread } => self.threads[thread].fetch_stalled = false,
            CoreEvent::OperationCompleted { entry } => self.complete_operation(entry),
            CoreEvent::LoadCompleted { entry } => self.complete_load(entry),
            CoreEvent::StoreAcknowledged { entry } => self.complete_store(entry),
        }
    }

    /// An instruction-queue operation finished. Non-memory entries write
    /// back their targets; memory entries only finish their effective-address
    /// computation; their targets belong to the load/store queue half.
    fn complete_operation(&mut self, entry: EntryRef) {
        debug_assert_eq!(entry.kind, EntryKind::Reorder);
        let Some((is_ea_computation, targets)) = ({
            let thread = &self.threads[entry.thread];
            thread.reorder_buffer.get(entry.id).and_then(|e| {
                if e.seq == entry.seq && !e.squashed {
                    Some((e.effective_address_computation, e.target_physical_registers.clone()))
                } else {
                    None
                }
            })
        }) else {
            return;
        };

        if !is_ea_computation {
            self.writeback_targets(entry.thread, &targets);
        }

        if let Some(rob_entry) = self.threads[entry.thread].reorder_buffer.get_mut(entry.id) {
            rob_entry.completed = true;
        }
    }

    /// A load's data returned: write back the shared target registers and
    /// complete both halves of the pair.
    fn complete_load(&mut self, entry: EntryRef) {
        debug_assert_eq!(entry.kind, EntryKind::LoadStore);
        let Some((targets, rob_id)) = ({
            let thread = &self.threads[entry.thread];
            thread.load_store_queue.get(entry.id).and_then(|e| {
                if e.seq == entry.seq && !e.squashed {
                    Some((e.target_physical_registers.clone(), e.reorder_buffer_entry))
                } else {
                    None
                }
            })
        }) else {
            return;
        };

        self.writeback_targets(entry.thread, &targets);

        let thread = &mut self.threads[entry.thread];
        if let Some(lsq_entry) = thread.load_store_queue.get_mut(entry.id) {
            lsq_entry.completed = true;
        }
        if let Some(rob_entry) = thread.reorder_buffer.get_mut(rob_id) {
            rob_entry.completed = true;
        }
    }

    /// A store acknowledgement arrived: the load/store queue half completes.
    /// The reorder half completed at its effective-address computation.
    fn complete_store(&mut self, entry: EntryRef) {
        debug_assert_eq!(entry.kind, EntryKind::LoadStore);
        let thread = &mut self.threads[entry.thread];
        if let Some(lsq_entry) = thread.load_store_queue.get_mut(entry.id) {
            if lsq_entry.seq == entry.seq && !lsq_entry.squashed {
                lsq_entry.completed = true;
            }
        }
    }

    /// Writes back target registers that are not yet ready, waking their
    /// dependents. Target maps are shared between a memory op's reorder and
    /// load/store queue halves; the readiness guard keeps writeback
    /// single-shot per allocation.
    pub(crate) fn writeback_targets(&mut self, tid: usize, targets: &[(crate::common::reg::RegisterDependency, PhysRegRef)]) {
        for &(_, phys) in targets {
            if self.threads[tid].physical_register_file(phys.class).is_ready(phys.index) {
                continue;
            }
            let wakeup = self.threads[tid]
                .physical_register_file_mut(phys.class)
                .writeback(phys.index);
            self.process_wakeup(tid, wakeup);
        }
    }

    /// Delivers a register's drained wakeup lists: operand counters drop,
    /// fully-ready entries promote from waiting to ready queues, address
    /// operands unblock effective-address computations and store
    /// disambiguation.
    fn process_wakeup(&mut self, tid: usize, wakeup: Wakeup) {
        for entry in wakeup.dependents {
            match entry.kind {
                EntryKind::Reorder => {
                    let Some(rob_entry) = self.threads[tid].reorder_buffer.get_mut(entry.id) else {
                        continue;
                    };
                    if rob_entry.seq != entry.seq || rob_entry.squashed {
                        continue;
                    }
                    debug_assert!(rob_entry.num_not_ready_operands > 0);
                    rob_entry.num_not_ready_operands -= 1;
                    let promote = rob_entry.num_not_ready_operands == 0
                        && rob_entry.dispatched
                        && !rob_entry.effective_address_computation;
                    if promote && self.queues.remove_waiting_instruction(entry) {
                        self.queues.ready_instructions.push_back(entry);
                    }
                }
                EntryKind::LoadStore => {
                    let Some(lsq_entry) = self.threads[tid].load_store_queue.get_mut(entry.id) else {
                        continue;
                    };
                    if lsq_entry.seq != entry.seq || lsq_entry.squashed {
                        continue;
                    }
                    debug_assert!(lsq_entry.num_not_ready_operands > 0);
                    lsq_entry.num_not_ready_operands -= 1;
                    let promote = lsq_entry.num_not_ready_operands == 0
                        && lsq_entry.dispatched
                        && lsq_entry.dynamic_inst.static_inst.mnemonic.inst_type == StaticInstType::St;
                    // Loads reach the ready queue through the refresh pass.
                    if promote && self.queues.remove_waiting_store(entry) {
                        self.queues.ready_stores.push_back(entry);
                    }
                }
            }
        }

        for entry in wakeup.effective_address_dependents {
            debug_assert_eq!(entry.kind, EntryKind::Reorder);
            let Some(rob_entry) = self.threads[tid].reorder_buffer.get_mut(entry.id) else {
                continue;
            };
            if rob_entry.seq != entry.seq || rob_entry.squashed {
                continue;
            }
            rob_entry.effective_address_computation_operand_ready = true;
            if rob_entry.dispatched && self.queues.remove_waiting_instruction(entry) {
                self.queues.ready_instructions.push_back(entry);
            }
        }

        let mut refresh = false;
        for entry in wakeup.store_address_dependents {
            debug_assert_eq!(entry.kind, EntryKind::LoadStore);
            let Some(lsq_entry) = self.threads[tid].load_store_queue.get_mut(entry.id) else {
                continue;
            };
            if lsq_entry.seq != entry.seq || lsq_entry.squashed {
                continue;
            }
            lsq_entry.store_address_ready = true;
            refresh = true;
        }
        if refresh {
            self.refresh_load_store_queue(tid);
        }
    }

    /// Per cycle, up to `issue_width` successful issues across the three
    /// ready queues, loads first. An acquire failure leaves the entry in
    /// place, counts a stall, and moves on to the next candidate.
    fn issue(&mut self) {
        let mut remaining = self.config.issue_width;
        self.issue_loads(&mut remaining);
        self.issue_stores(&mut remaining);
        self.issue_instructions(&mut remaining);
    }

    fn issue_loads(&mut self, remaining: &mut usize) {
        let pending: Vec<EntryRef> = self.queues.ready_loads.drain(..).collect();
        let mut kept = VecDeque::with_capacity(pending.len());

        for entry in pending {
            if *remaining == 0 {
                kept.push_back(entry);
                continue;
            }
            let Some(address) = ({
                let thread = &self.threads[entry.thread];
                thread.load_store_queue.get(entry.id).and_then(|e| {
                    (e.seq == entry.seq && !e.squashed).then_some(e.effective_address)
                })
            }) else {
                continue; // squashed while queued
            };

            match self.fu_pool.acquire(FuOperationType::ReadPort) {
                None => kept.push_back(entry),
                Some(allocation) => {
                    self.event_queue.schedule(
                        allocation.issue_latency,
                        CoreEvent::FuReleased {
                            fu_type: allocation.fu_type,
                        },
                    );
                    let latency = self.cache.load(entry.thread, address).max(1);
                    self.event_queue
                        .schedule(latency, CoreEvent::LoadCompleted { entry });
                    if let Some(lsq_entry) =
                        self.threads[entry.thread].load_store_queue.get_mut(entry.id)
                    {
                        lsq_entry.issued = true;
                    }
                    *remaining -= 1;
                }
            }
        }

        self.queues.ready_loads = kept;
    }

    fn issue_stores(&mut self, remaining: &mut usize) {
        let pending: Vec<EntryRef> = self.queues.ready_stores.drain(..).collect();
        let mut kept = VecDeque::with_capacity(pending.len());

        for entry in pending {
            if *remaining == 0 {
                kept.push_back(entry);
                continue;
            }
            let Some(address) = ({
                let thread = &self.threads[entry.thread];
                thread.load_store_queue.get(entry.id).and_then(|e| {
                    (e.seq == entry.seq && !e.squashed).then_some(e.effective_address)
                })
            }) else {
                continue;
            };

            match self.fu_pool.acquire(FuOperationType::WritePort) {
                None => kept.push_back(entry),
                Some(allocation) => {
                    self.event_queue.schedule(
                        allocation.issue_latency,
                        CoreEvent::FuReleased {
                            fu_type: allocation.fu_type,
                        },
                    );
                    let latency = self.cache.store(entry.thread, address).max(1);
                    self.event_queue
                        .schedule(latency, CoreEvent::StoreAcknowledged { entry });
                    if let Some(lsq_entry) =
                        self.threads[entry.thread].load_store_queue.get_mut(entry.id)
                    {
                        lsq_entry.issued = true;
                    }
                    *remaining -= 1;
                }
            }
        }

        self.queues.ready_stores = kept;
    }

    fn issue_instructions(&mut self, remaining: &mut usize) {
        let pending: Vec<EntryRef> = self.queues.ready_instructions.drain(..).collect();
        let mut kept = VecDeque::with_capacity(pending.len());

        for entry in pending {
            if *remaining == 0 {
                kept.push_back(entry);
                continue;
            }
            let Some(operation) = ({
                let thread = &self.threads[entry.thread];
                thread.reorder_buffer.get(entry.id).and_then(|e| {
                    (e.seq == entry.seq && !e.squashed)
                        .then_some(e.dynamic_inst.static_inst.mnemonic.fu_operation)
                })
            }) else {
                continue;
            };

            match operation {
                None => {
                    // No functional unit involved; completes next cycle.
                    self.event_queue
                        .schedule(1, CoreEvent::OperationCompleted { entry });
                    if let Some(rob_entry) =
                        self.threads[entry.thread].reorder_buffer.get_mut(entry.id)
                    {
                        rob_entry.issued = true;
                    }
                    *remaining -= 1;
                }
                Some(operation) => match self.fu_pool.acquire(operation) {
                    None => kept.push_back(entry),
                    Some(allocation) => {
                        self.event_queue.schedule(
                            allocation.issue_latency,
                            CoreEvent::FuReleased {
                                fu_type: allocation.fu_type,
                            },
                        );
                        self.event_queue.schedule(
                            allocation.operation_latency.max(1),
                            CoreEvent::OperationCompleted { entry },
                        );
                        if let Some(rob_entry) =
                            self.threads[entry.thread].reorder_buffer.get_mut(entry.id)
                        {
                            rob_entry.issued = true;
                        }
                        *remaining -= 1;
                    }
                },
            }
        }

        self.queues.ready_instructions = kept;
    }
}
