//! Hardware thread state and the per-thread pipeline stages.
//!
//! A [`Thread`] owns the architected context, the branch predictor, the
//! three physical register files with their rename table, and the decode,
//! reorder, and load/store buffers. The stages that drain and fill them
//! (fetch, rename, dispatch, load/store queue refresh, commit, squash)
//! are implemented on [`Core`] because they arbitrate for core-wide
//! resources (issue queues, functional units, the cache port).

use crate::cache::CacheController;
use crate::common::reg::{RegisterClass, RegisterDependency};
use crate::config::CpuConfig;
use crate::core::{Core, CoreEvent};
use crate::isa::{Mnemonic, StaticInstType};
use crate::isa::context::{Context, ContextState};
use crate::pipeline::bpred::{BranchPredictor, BranchPredictorUpdate};
use crate::pipeline::buffer::PipelineBuffer;
use crate::pipeline::prf::PhysicalRegisterFile;
use crate::pipeline::rename_table::RenameTable;
use crate::pipeline::rob::{
    DecodeBufferEntry, DynamicInst, EntryKind, EntryRef, LoadStoreQueueEntry, PhysRegRef,
    ReorderBufferEntry,
};

/// Cycles without a commit before the watchdog reacts.
const COMMIT_TIMEOUT: u64 = 1_000_000;

/// Watchdog resets tolerated before it requests a pending-flow dump.
const WATCHDOG_ESCALATION_THRESHOLD: u32 = 5;

/// Per-thread microarchitectural state.
pub struct Thread<C: Context> {
    /// Thread index within the core.
    pub id: usize,
    /// Architected state and functional execution.
    pub context: C,
    /// Branch predictor.
    pub branch_predictor: BranchPredictor,
    /// Logical→physical mapping.
    pub rename_table: RenameTable,
    /// Fetched, not yet renamed.
    pub decode_buffer: PipelineBuffer<DecodeBufferEntry>,
    /// In-flight window, retired in program order.
    pub reorder_buffer: PipelineBuffer<ReorderBufferEntry>,
    /// Memory-op mirror of the reorder buffer.
    pub load_store_queue: PipelineBuffer<LoadStoreQueueEntry>,
    /// Next PC fetch will request.
    pub fetch_npc: u32,
    /// Predicted PC after that.
    pub fetch_nnpc: u32,
    /// Waiting on an instruction line fill.
    pub(crate) fetch_stalled: bool,
    /// Last line delivered, to gate refills.
    pub(crate) last_fetched_line: Option<u32>,
    /// Cycle of the most recent commit (watchdog input).
    pub last_commit_cycle: u64,
    pub(crate) watchdog_escalations: u32,
    /// Instructions this thread has retired.
    pub num_dynamic_insts: u64,
    pub(crate) last_decoded_uid: Option<u64>,
    pub(crate) last_decoded_committed: bool,
    int_physical_registers: PhysicalRegisterFile,
    fp_physical_registers: PhysicalRegisterFile,
    misc_physical_registers: PhysicalRegisterFile,
}

impl<C: Context> Thread<C> {
    /// Builds a thread, seeding each physical register file with one
    /// committed register per logical slot and the rename table with the
    /// identity mapping over them.
    pub fn new(id: usize, context: C, config: &CpuConfig) -> Self {
        let seeded_file = |class: RegisterClass| {
            assert!(
                config.physical_register_file_size >= class.num_registers() as usize,
                "physical register file ({}) smaller than the {class:?} logical register count",
                config.physical_register_file_size
            );
            let mut file = PhysicalRegisterFile::new(class, config.physical_register_file_size);
            for index in 0..class.num_registers() {
                file.reserve(index, RegisterDependency::new(class, index));
            }
            file
        };

        let fetch_npc = context.regs().npc;
        let fetch_nnpc = context.regs().nnpc;

        Self {
            id,
            context,
            branch_predictor: BranchPredictor::new(
                config.branch_predictor_size,
                config.btb_num_sets,
                config.btb_assoc,
                config.return_address_stack_size,
            ),
            rename_table: RenameTable::identity(),
            decode_buffer: PipelineBuffer::new(config.decode_buffer_size),
            reorder_buffer: PipelineBuffer::new(config.reorder_buffer_size),
            load_store_queue: PipelineBuffer::new(config.load_store_queue_size),
            fetch_npc,
            fetch_nnpc,
            fetch_stalled: false,
            last_fetched_line: None,
            last_commit_cycle: 0,
            watchdog_escalations: 0,
            num_dynamic_insts: 0,
            last_decoded_uid: None,
            last_decoded_committed: false,
            int_physical_registers: seeded_file(RegisterClass::Int),
            fp_physical_registers: seeded_file(RegisterClass::Fp),
            misc_physical_registers: seeded_file(RegisterClass::Misc),
        }
    }

    /// The physical register file backing a class.
    pub fn physical_register_file(&self, class: RegisterClass) -> &PhysicalRegisterFile {
        match class {
            RegisterClass::Int => &self.int_physical_registers,
            RegisterClass::Fp => &self.fp_physical_registers,
            RegisterClass::Misc => &self.misc_physical_registers,
        }
    }

    /// Mutable access to the file backing a class.
    pub fn physical_register_file_mut(&mut self, class: RegisterClass) -> &mut PhysicalRegisterFile {
        match class {
            RegisterClass::Int => &mut self.int_physical_registers,
            RegisterClass::Fp => &mut self.fp_physical_registers,
            RegisterClass::Misc => &mut self.misc_physical_registers,
        }
    }

    /// True once the final architected instruction has retired (or no
    /// program end has been decoded yet).
    pub fn is_last_decoded_inst_committed(&self) -> bool {
        self.last_decoded_uid.is_none() || self.last_decoded_committed
    }

    fn update_fetch_npc_and_nnpc_from_regs(&mut self, now: u64) {
        self.fetch_npc = self.context.regs().npc;
        self.fetch_nnpc = self.context.regs().nnpc;
        self.last_commit_cycle = now;
    }
}

/// Copies of the reorder buffer head a commit decision needs.
struct CommitHead {
    id: usize,
    seq: u64,
    completed: bool,
    speculative: bool,
    ras_recover_top: u32,
    lsq_id: Option<usize>,
    pc: u32,
    npc: u32,
    nnpc: u32,
    predicted_nnpc: u32,
    uid: u64,
    mnemonic: Mnemonic,
    bp_update: BranchPredictorUpdate,
    olds: Vec<(RegisterDependency, PhysRegRef)>,
    targets: Vec<(RegisterDependency, PhysRegRef)>,
}

impl<C: Context, H: CacheController> Core<C, H> {
    // ----- fetch ------------------------------------------------------

    /// Gates fetch on the instruction line: a new line starts a fill and
    /// stalls the stage until the completion event clears it.
    fn can_fetch(&mut self, tid: usize) -> bool {
        if self.threads[tid].fetch_stalled {
            self.stats.fetch_stall_cycles += 1;
            return false;
        }

        let fetch_npc = self.threads[tid].fetch_npc;
        let line = self.cache.tag(fetch_npc);
        if self.threads[tid].last_fetched_line != Some(line) {
            if !self.cache.can_ifetch(tid, fetch_npc) {
                return false;
            }
            let latency = self.cache.ifetch(tid, fetch_npc).max(1);
            self.event_queue
                .schedule(latency, CoreEvent::IfetchCompleted { thread: tid });
            let thread = &mut self.threads[tid];
            thread.fetch_stalled = true;
            thread.last_fetched_line = Some(line);
            return false;
        }
        true
    }

    /// Fetch stage: decode and functionally execute instructions along the
    /// (possibly predicted) path, filling the decode buffer until the line
    /// ends, the prediction goes non-sequential, the buffer fills, or the
    /// context stops running. NOPs are consumed transparently.
    pub(crate) fn fetch(&mut self, tid: usize) {
        if !self.can_fetch(tid) {
            return;
        }
        let now = self.event_queue.current_cycle();

        loop {
            {
                let thread = &self.threads[tid];
                if thread.context.state() != ContextState::Running {
                    break;
                }
                if thread.decode_buffer.is_full() {
                    break;
                }
            }

            // Fetch has diverged from architected flow: follow the predicted
            // path functionally, entering a speculative context first.
            {
                let thread = &mut self.threads[tid];
                if thread.context.regs().npc != thread.fetch_npc {
                    if !thread.context.speculative() {
                        thread.context.enter_speculative_state();
                    }
                    let fetch_npc = thread.fetch_npc;
                    thread.context.regs_mut().npc = fetch_npc;
                }
            }

            let uid = self.next_inst_uid;
            let dynamic_inst = {
                let thread = &mut self.threads[tid];
                let mut decoded = None;
                loop {
                    if thread.context.state() != ContextState::Running {
                        break;
                    }
                    let inst = thread.context.decode_next_static_inst();
                    if thread.context.state() != ContextState::Running {
                        // Decode ran past the architected program.
                        break;
                    }
                    let pc = thread.context.regs().pc;
                    let effective_address = thread.context.execute(&inst);
                    if inst.mnemonic.inst_type == StaticInstType::Nop {
                        thread.update_fetch_npc_and_nnpc_from_regs(now);
                        continue;
                    }
                    decoded = Some(DynamicInst {
                        uid,
                        pc,
                        static_inst: inst,
                        effective_address,
                    });
                    break;
                }
                decoded
            };
            let Some(dynamic_inst) = dynamic_inst else {
                break;
            };
            self.next_inst_uid += 1;

            let thread = &mut self.threads[tid];
            thread.fetch_npc = thread.fetch_nnpc;

            if !thread.context.speculative() && thread.context.state() != ContextState::Running {
                thread.last_decoded_uid = Some(dynamic_inst.uid);
                thread.last_decoded_committed = false;
            }

            let line_size = self.config.cache.line_size;
            let mut has_done = thread.fetch_npc.wrapping_add(4) % line_size == 0;

            let mut bp_update = BranchPredictorUpdate::default();
            let (predicted_nnpc, ras_recover_top) =
                if dynamic_inst.static_inst.mnemonic.inst_type.is_control() {
                    thread.branch_predictor.predict(
                        dynamic_inst.pc,
                        &dynamic_inst.static_inst.mnemonic,
                        &mut bp_update,
                    )
                } else {
                    (
                        thread.fetch_npc.wrapping_add(4),
                        thread.branch_predictor.return_address_stack.top(),
                    )
                };
            thread.fetch_nnpc = predicted_nnpc;
            if thread.fetch_nnpc != thread.fetch_npc.wrapping_add(4) {
                has_done = true;
            }

            let entry = DecodeBufferEntry {
                npc: thread.context.regs().npc,
                nnpc: thread.context.regs().nnpc,
                predicted_nnpc,
                ras_recover_top,
                bp_update,
                speculative: thread.context.speculative(),
                dynamic_inst,
            };
            let inserted = thread.decode_buffer.push_back(entry);
            debug_assert!(inserted.is_some(), "decode buffer fullness checked above");

            if has_done {
                break;
            }
        }
    }

    // ----- rename -----------------------------------------------------

    /// Rename stage: drains the decode buffer head by head, up to
    /// `decode_width` per cycle, stalling on any structural shortage.
    pub(crate) fn register_rename(&mut self, tid: usize) {
        for _ in 0..self.config.decode_width {
            if self.threads[tid].decode_buffer.is_empty() {
                break;
            }
            if !self.register_rename_one(tid) {
                break;
            }
        }
    }

    fn register_rename_one(&mut self, tid: usize) -> bool {
        // Admission: reorder buffer space, free physical registers in every
        // class the instruction writes, and a load/store queue slot for
        // memory ops.
        {
            let thread = &self.threads[tid];
            let (_, head) = thread.decode_buffer.front().expect("caller checked non-empty");
            let inst = &head.dynamic_inst.static_inst;

            if thread.reorder_buffer.is_full() {
                self.stats.rename_stalls_on_reorder_buffer += 1;
                return false;
            }
            for class in RegisterClass::ALL {
                let needed = inst.num_physical_registers_to_allocate(class);
                if needed > 0 && thread.physical_register_file(class).num_free() < needed {
                    self.stats.rename_stalls_on_physical_registers += 1;
                    return false;
                }
            }
            if inst.mnemonic.inst_type.is_load_or_store() && thread.load_store_queue.is_full() {
                self.stats.rename_stalls_on_load_store_queue += 1;
                return false;
            }
        }

        let seq = self.next_entry_seq;
        self.next_entry_seq += 1;

        let thread = &mut self.threads[tid];
        let head = thread.decode_buffer.pop_front().expect("caller checked non-empty");
        let inst = head.dynamic_inst.static_inst.clone();
        let is_memory_op = inst.mnemonic.inst_type.is_load_or_store();

        let sources: Vec<(RegisterDependency, PhysRegRef)> = inst
            .input_dependencies()
            .iter()
            .map(|&dep| (dep, thread.rename_table.get(dep)))
            .collect();

        let mut olds = Vec::with_capacity(inst.output_dependencies().len());
        let mut targets = Vec::with_capacity(inst.output_dependencies().len());
        for &dep in inst.output_dependencies() {
            olds.push((dep, thread.rename_table.get(dep)));
            let index = thread
                .physical_register_file_mut(dep.class)
                .allocate(dep)
                .expect("admission check guarantees a free physical register");
            let physical = PhysRegRef {
                class: dep.class,
                index,
            };
            thread.rename_table.set(dep, physical);
            targets.push((dep, physical));
        }

        let entry = ReorderBufferEntry {
            seq,
            dynamic_inst: head.dynamic_inst.clone(),
            npc: head.npc,
            nnpc: head.nnpc,
            predicted_nnpc: head.predicted_nnpc,
            ras_recover_top: head.ras_recover_top,
            bp_update: head.bp_update,
            speculative: head.speculative,
            dispatched: false,
            issued: false,
            completed: false,
            squashed: false,
            effective_address_computation: is_memory_op,
            effective_address_computation_operand_ready: false,
            num_not_ready_operands: 0,
            source_physical_registers: sources.clone(),
            old_physical_registers: olds,
            target_physical_registers: targets.clone(),
            load_store_queue_entry: None,
        };
        let rob_id = thread
            .reorder_buffer
            .push_back(entry)
            .expect("admission check guarantees reorder buffer space");
        let rob_ref = EntryRef {
            thread: tid,
            kind: EntryKind::Reorder,
            id: rob_id,
            seq,
        };

        let mut num_not_ready = 0;
        for &(_, physical) in &sources {
            if !thread.physical_register_file(physical.class).is_ready(physical.index) {
                num_not_ready += 1;
                thread
                    .physical_register_file_mut(physical.class)
                    .add_dependent(physical.index, rob_ref);
            }
        }
        thread
            .reorder_buffer
            .get_mut(rob_id)
            .expect("just inserted")
            .num_not_ready_operands = num_not_ready;

        if is_memory_op {
            // The first input dependency is the address operand.
            let (_, address_physical) = sources[0];
            if thread
                .physical_register_file(address_physical.class)
                .is_ready(address_physical.index)
            {
                thread
                    .reorder_buffer
                    .get_mut(rob_id)
                    .expect("just inserted")
                    .effective_address_computation_operand_ready = true;
            } else {
                thread
                    .physical_register_file_mut(address_physical.class)
                    .add_effective_address_dependent(address_physical.index, rob_ref);
            }

            let lsq_seq = self.next_entry_seq;
            self.next_entry_seq += 1;

            let effective_address = head
                .dynamic_inst
                .effective_address
                .expect("functional execution computed the memory op's address");
            let lsq_entry = LoadStoreQueueEntry {
                seq: lsq_seq,
                dynamic_inst: head.dynamic_inst,
                npc: head.npc,
                nnpc: head.nnpc,
                predicted_nnpc: head.predicted_nnpc,
                effective_address,
                dispatched: false,
                issued: false,
                completed: false,
                squashed: false,
                store_address_ready: false,
                num_not_ready_operands: num_not_ready,
                source_physical_registers: sources.clone(),
                target_physical_registers: targets,
                reorder_buffer_entry: rob_id,
            };
            let lsq_id = thread
                .load_store_queue
                .push_back(lsq_entry)
                .expect("admission check guarantees load/store queue space");
            let lsq_ref = EntryRef {
                thread: tid,
                kind: EntryKind::LoadStore,
                id: lsq_id,
                seq: lsq_seq,
            };

            for &(_, physical) in &sources {
                if !thread.physical_register_file(physical.class).is_ready(physical.index) {
                    thread
                        .physical_register_file_mut(physical.class)
                        .add_dependent(physical.index, lsq_ref);
                }
            }

            if inst.mnemonic.inst_type == StaticInstType::St {
                if thread
                    .physical_register_file(address_physical.class)
                    .is_ready(address_physical.index)
                {
                    thread
                        .load_store_queue
                        .get_mut(lsq_id)
                        .expect("just inserted")
                        .store_address_ready = true;
                } else {
                    thread
                        .physical_register_file_mut(address_physical.class)
                        .add_store_address_dependent(address_physical.index, lsq_ref);
                }
            }

            thread
                .reorder_buffer
                .get_mut(rob_id)
                .expect("just inserted")
                .load_store_queue_entry = Some(lsq_id);
        }

        true
    }

    // ----- dispatch ---------------------------------------------------

    /// Dispatch stage: up to `dispatch_width` reorder entries per cycle move
    /// onto the ready or waiting queues.
    pub(crate) fn dispatch(&mut self, tid: usize) {
        for _ in 0..self.config.dispatch_width {
            if !self.dispatch_one(tid) {
                break;
            }
        }
    }

    /// Moves the oldest undispatched reorder entry onto the instruction
    /// queues; a paired store also lands on the store queues. Loads are not
    /// queued directly; the refresh pass promotes them.
    fn dispatch_one(&mut self, tid: usize) -> bool {
        let Some((rob_id, seq, ready, lsq_id)) = ({
            let thread = &self.threads[tid];
            thread
                .reorder_buffer
                .iter()
                .find(|(_, e)| !e.dispatched)
                .map(|(id, e)| (id, e.seq, e.ready_to_issue(), e.load_store_queue_entry))
        }) else {
            return false;
        };

        let rob_ref = EntryRef {
            thread: tid,
            kind: EntryKind::Reorder,
            id: rob_id,
            seq,
        };
        if ready {
            self.queues.ready_instructions.push_back(rob_ref);
        } else {
            self.queues.waiting_instructions.push(rob_ref);
        }

        let thread = &mut self.threads[tid];
        thread
            .reorder_buffer
            .get_mut(rob_id)
            .expect("entry found above")
            .dispatched = true;

        if let Some(lsq_id) = lsq_id {
            let lsq_entry = thread
                .load_store_queue
                .get_mut(lsq_id)
                .expect("memory op keeps its load/store queue pair");
            lsq_entry.dispatched = true;
            let store_info = (lsq_entry.dynamic_inst.static_inst.mnemonic.inst_type
                == StaticInstType::St)
                .then_some((lsq_entry.seq, lsq_entry.all_operands_ready()));
            if let Some((lsq_seq, operands_ready)) = store_info {
                let lsq_ref = EntryRef {
                    thread: tid,
                    kind: EntryKind::LoadStore,
                    id: lsq_id,
                    seq: lsq_seq,
                };
                if operands_ready {
                    self.queues.ready_stores.push_back(lsq_ref);
                } else {
                    self.queues.waiting_stores.push(lsq_ref);
                }
            }
        }

        true
    }

    // ----- load/store queue refresh ------------------------------------

    /// Load disambiguation: walks the queue oldest→youngest carrying the set
    /// of store addresses whose data is still unknown. A store whose address
    /// is itself unknown stops the walk. Ready loads whose address collides
    /// with no unknown store are promoted to the ready-load queue.
    pub(crate) fn refresh_load_store_queue(&mut self, tid: usize) {
        let mut std_unknowns: Vec<u32> = Vec::new();
        let mut promotions: Vec<EntryRef> = Vec::new();

        {
            let thread = &self.threads[tid];
            for (id, entry) in thread.load_store_queue.iter() {
                match entry.dynamic_inst.static_inst.mnemonic.inst_type {
                    StaticInstType::St => {
                        if !entry.store_address_ready {
                            break;
                        } else if !entry.all_operands_ready() {
                            std_unknowns.push(entry.effective_address);
                        } else {
                            std_unknowns.retain(|&address| address != entry.effective_address);
                        }
                    }
                    StaticInstType::Ld => {
                        if entry.dispatched
                            && !entry.issued
                            && !entry.completed
                            && entry.all_operands_ready()
                        {
                            let entry_ref = EntryRef {
                                thread: tid,
                                kind: EntryKind::LoadStore,
                                id,
                                seq: entry.seq,
                            };
                            let already_ready =
                                self.queues.ready_loads.iter().any(|e| *e == entry_ref);
                            let aliased = std_unknowns.contains(&entry.effective_address);
                            if !already_ready && !aliased {
                                promotions.push(entry_ref);
                            }
                        }
                    }
                    _ => unreachable!("non-memory op in the load/store queue"),
                }
            }
        }

        for entry_ref in promotions {
            self.queues.ready_loads.push_back(entry_ref);
        }
    }

    // ----- commit -----------------------------------------------------

    fn commit_head_view(&self, tid: usize) -> Option<CommitHead> {
        let thread = &self.threads[tid];
        thread.reorder_buffer.front().map(|(id, e)| CommitHead {
            id,
            seq: e.seq,
            completed: e.completed,
            speculative: e.speculative,
            ras_recover_top: e.ras_recover_top,
            lsq_id: e.load_store_queue_entry,
            pc: e.dynamic_inst.pc,
            npc: e.npc,
            nnpc: e.nnpc,
            predicted_nnpc: e.predicted_nnpc,
            uid: e.dynamic_inst.uid,
            mnemonic: e.dynamic_inst.static_inst.mnemonic,
            bp_update: e.bp_update,
            olds: e.old_physical_registers.clone(),
            targets: e.target_physical_registers.clone(),
        })
    }

    /// Commit stage: retires up to `commit_width` completed head entries in
    /// program order. A speculative head is a detected misprediction: the
    /// return address stack and architected fetch PCs are restored and the
    /// pipeline squashed. The watchdog diagnoses apparent deadlock without
    /// aborting.
    pub(crate) fn commit(&mut self, tid: usize) {
        let now = self.event_queue.current_cycle();

        let mut request_dump = false;
        {
            let thread = &mut self.threads[tid];
            if now.saturating_sub(thread.last_commit_cycle) > COMMIT_TIMEOUT {
                if thread.watchdog_escalations > WATCHDOG_ESCALATION_THRESHOLD {
                    request_dump = true;
                } else {
                    thread.last_commit_cycle = now;
                    thread.watchdog_escalations += 1;
                }
            }
        }
        if request_dump {
            self.stats.watchdog_dumps += 1;
            self.cache.dump_pending_flows();
        }

        let mut num_committed = 0;
        while num_committed < self.config.commit_width {
            let Some(head) = self.commit_head_view(tid) else {
                break;
            };
            if !head.completed {
                break;
            }

            if head.speculative {
                let thread = &mut self.threads[tid];
                thread
                    .branch_predictor
                    .return_address_stack
                    .recover(head.ras_recover_top);
                thread.context.exit_speculative_state();
                thread.fetch_npc = thread.context.regs().npc;
                thread.fetch_nnpc = thread.context.regs().nnpc;
                self.stats.num_squashes += 1;
                self.squash(tid);
                break;
            }

            if let Some(lsq_id) = head.lsq_id {
                let (lsq_seq, lsq_completed) = {
                    let thread = &self.threads[tid];
                    let lsq_entry = thread
                        .load_store_queue
                        .get(lsq_id)
                        .expect("memory op keeps its load/store queue pair");
                    (lsq_entry.seq, lsq_entry.completed)
                };
                if !lsq_completed {
                    break;
                }
                self.queues.remove_from_all(EntryRef {
                    thread: tid,
                    kind: EntryKind::LoadStore,
                    id: lsq_id,
                    seq: lsq_seq,
                });
                self.threads[tid].load_store_queue.remove(lsq_id);
            }

            {
                let thread = &mut self.threads[tid];
                for index in 0..head.targets.len() {
                    let (dep, target) = head.targets[index];
                    let (_, old) = head.olds[index];
                    if dep.to_flat() != 0 {
                        thread.physical_register_file_mut(old.class).reclaim(old.index);
                        thread
                            .physical_register_file_mut(target.class)
                            .commit(target.index);
                    }
                }

                if head.mnemonic.inst_type.is_control() {
                    let taken = head.nnpc != head.npc.wrapping_add(4);
                    let correct = head.predicted_nnpc == head.nnpc;
                    if correct {
                        self.stats.branch_predictions_correct += 1;
                    } else {
                        self.stats.branch_predictions_wrong += 1;
                    }
                    thread.branch_predictor.update(
                        head.pc,
                        head.nnpc,
                        taken,
                        correct,
                        &head.mnemonic,
                        &head.bp_update,
                    );
                }
            }

            self.queues.remove_from_all(EntryRef {
                thread: tid,
                kind: EntryKind::Reorder,
                id: head.id,
                seq: head.seq,
            });

            let thread = &mut self.threads[tid];
            if thread.context.state() == ContextState::Finished
                && thread.last_decoded_uid == Some(head.uid)
            {
                thread.last_decoded_committed = true;
            }
            thread.reorder_buffer.pop_front();
            thread.num_dynamic_insts += 1;
            thread.last_commit_cycle = now;
            thread.watchdog_escalations = 0;
            self.stats.instructions_retired += 1;
            num_committed += 1;
        }
    }

    // ----- squash -----------------------------------------------------

    /// Discards the entire in-flight window. Every reorder and load/store
    /// entry is first marked `squashed`, so in-flight events and queue scans
    /// that reach an entry before its eviction see a dead entry; the
    /// youngest-first walk then recovers allocated targets without waking
    /// dependents and reverts the rename table to each entry's old mappings.
    /// Afterwards every functional unit is released and the decode buffer
    /// cleared.
    pub(crate) fn squash(&mut self, tid: usize) {
        {
            let thread = &mut self.threads[tid];
            let rob_ids: Vec<usize> = thread.reorder_buffer.ids().collect();
            for id in rob_ids {
                if let Some(entry) = thread.reorder_buffer.get_mut(id) {
                    entry.squashed = true;
                }
            }
            let lsq_ids: Vec<usize> = thread.load_store_queue.ids().collect();
            for id in lsq_ids {
                if let Some(entry) = thread.load_store_queue.get_mut(id) {
                    entry.squashed = true;
                }
            }
        }

        loop {
            let Some((rob_id, seq, lsq_id, olds, targets)) = ({
                let thread = &self.threads[tid];
                thread.reorder_buffer.back().map(|(id, e)| {
                    (
                        id,
                        e.seq,
                        e.load_store_queue_entry,
                        e.old_physical_registers.clone(),
                        e.target_physical_registers.clone(),
                    )
                })
            }) else {
                break;
            };

            if let Some(lsq_id) = lsq_id {
                if let Some(lsq_seq) = self.threads[tid].load_store_queue.get(lsq_id).map(|e| e.seq)
                {
                    self.queues.remove_from_all(EntryRef {
                        thread: tid,
                        kind: EntryKind::LoadStore,
                        id: lsq_id,
                        seq: lsq_seq,
                    });
                    self.threads[tid].load_store_queue.remove(lsq_id);
                }
            }

            self.queues.remove_from_all(EntryRef {
                thread: tid,
                kind: EntryKind::Reorder,
                id: rob_id,
                seq,
            });

            let thread = &mut self.threads[tid];
            for index in 0..targets.len() {
                let (dep, target) = targets[index];
                let (_, old) = olds[index];
                if dep.to_flat() != 0 {
                    thread
                        .physical_register_file_mut(target.class)
                        .recover(target.index);
                    thread.rename_table.set(dep, old);
                }
            }
            thread.reorder_buffer.pop_back();
            self.stats.num_squashed_entries += 1;
        }

        {
            let thread = &self.threads[tid];
            assert!(
                thread.reorder_buffer.is_empty() && thread.load_store_queue.is_empty(),
                "non-empty reorder or load/store queue after squash"
            );
        }
        self.fu_pool.release_all();
        self.threads[tid].decode_buffer.clear();
    }
}
