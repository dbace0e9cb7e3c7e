//! In-flight instruction entries.
//!
//! Types for the decode buffer, reorder buffer, and load/store queue. The
//! reorder buffer entry is the lifetime anchor of a dynamic instruction:
//! it owns the source/old/target physical register maps and (for memory
//! operations) a link to the paired load/store queue entry. Entries are
//! referenced across structures by [`EntryRef`], a non-owning `(thread,
//! kind, slot, seq)` key whose sequence number invalidates references to
//! reused slots; in-flight events must no-op when their entry was squashed.

use crate::common::reg::{RegisterClass, RegisterDependency};
use crate::isa::StaticInst;
use crate::pipeline::bpred::BranchPredictorUpdate;
use std::sync::Arc;

/// A fetched instance of a static instruction.
#[derive(Clone)]
pub struct DynamicInst {
    /// Monotonic per-core decode id.
    pub uid: u64,
    /// Architected PC the instruction executed at.
    pub pc: u32,
    /// The decoded static instruction.
    pub static_inst: Arc<StaticInst>,
    /// Effective address computed by functional execution (memory ops).
    pub effective_address: Option<u32>,
}

/// Which arena an [`EntryRef`] points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// Reorder buffer entry.
    Reorder,
    /// Load/store queue entry.
    LoadStore,
}

/// Non-owning reference to an in-flight entry.
///
/// `seq` is the entry's allocation sequence number; a reference is live only
/// while the slot still holds an entry with the same `seq`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryRef {
    /// Owning thread index.
    pub thread: usize,
    /// Arena the slot belongs to.
    pub kind: EntryKind,
    /// Slot id within the arena.
    pub id: usize,
    /// Allocation sequence number of the referenced entry.
    pub seq: u64,
}

/// Handle to a physical register: class plus index within that class's file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhysRegRef {
    /// Register file class.
    pub class: RegisterClass,
    /// Index within the file.
    pub index: u32,
}

/// One fetched instruction parked between fetch and rename.
pub struct DecodeBufferEntry {
    /// The fetched instruction.
    pub dynamic_inst: DynamicInst,
    /// Architected next PC after the instruction.
    pub npc: u32,
    /// Architected next-next PC after the instruction.
    pub nnpc: u32,
    /// Predicted next-next PC from the fetch stage.
    pub predicted_nnpc: u32,
    /// Return-address-stack top saved before prediction.
    pub ras_recover_top: u32,
    /// Predictor token threaded through to commit.
    pub bp_update: BranchPredictorUpdate,
    /// Fetched on a predicted, unresolved path.
    pub speculative: bool,
}

/// A reorder buffer entry. For memory operations this entry models the
/// effective-address computation; the memory access itself lives in the
/// paired load/store queue entry.
pub struct ReorderBufferEntry {
    /// Allocation sequence number (validates [`EntryRef`]s).
    pub seq: u64,
    /// The in-flight instruction.
    pub dynamic_inst: DynamicInst,
    /// Architected next PC.
    pub npc: u32,
    /// Architected next-next PC.
    pub nnpc: u32,
    /// Predicted next-next PC.
    pub predicted_nnpc: u32,
    /// RAS top to restore on misprediction.
    pub ras_recover_top: u32,
    /// Predictor token for the commit-time update.
    pub bp_update: BranchPredictorUpdate,
    /// Fetched on a predicted, unresolved path.
    pub speculative: bool,
    /// Placed on an issue queue.
    pub dispatched: bool,
    /// Accepted by a functional unit.
    pub issued: bool,
    /// Result (or effective address) available; eligible to commit.
    pub completed: bool,
    /// Squashed; in-flight events targeting this entry must no-op.
    pub squashed: bool,
    /// This entry is a memory op's effective-address computation.
    pub effective_address_computation: bool,
    /// The sole effective-address operand is ready.
    pub effective_address_computation_operand_ready: bool,
    /// Source operands still pending writeback.
    pub num_not_ready_operands: u32,
    /// Current rename-table mapping of every source, at rename time.
    pub source_physical_registers: Vec<(RegisterDependency, PhysRegRef)>,
    /// Previous mapping of every output, restored on squash, reclaimed at commit.
    pub old_physical_registers: Vec<(RegisterDependency, PhysRegRef)>,
    /// Freshly allocated mapping of every output.
    pub target_physical_registers: Vec<(RegisterDependency, PhysRegRef)>,
    /// Paired load/store queue slot, for memory operations.
    pub load_store_queue_entry: Option<usize>,
}

impl ReorderBufferEntry {
    /// True when every source operand has been written back.
    pub fn all_operands_ready(&self) -> bool {
        self.num_not_ready_operands == 0
    }

    /// Readiness criterion for the issue queues: memory ops wait only for
    /// their address operand, everything else for all operands.
    pub fn ready_to_issue(&self) -> bool {
        if self.effective_address_computation {
            self.effective_address_computation_operand_ready
        } else {
            self.all_operands_ready()
        }
    }
}

/// A load/store queue entry mirroring its reorder buffer pair.
pub struct LoadStoreQueueEntry {
    /// Allocation sequence number (validates [`EntryRef`]s).
    pub seq: u64,
    /// The in-flight instruction.
    pub dynamic_inst: DynamicInst,
    /// Architected next PC.
    pub npc: u32,
    /// Architected next-next PC.
    pub nnpc: u32,
    /// Predicted next-next PC.
    pub predicted_nnpc: u32,
    /// Effective address from functional execution.
    pub effective_address: u32,
    /// Placed with its reorder buffer pair at dispatch.
    pub dispatched: bool,
    /// Sent to the cache controller.
    pub issued: bool,
    /// Loads: data returned. Stores: write acknowledged.
    pub completed: bool,
    /// Squashed; in-flight events targeting this entry must no-op.
    pub squashed: bool,
    /// The store's address operand is ready (disambiguation input).
    pub store_address_ready: bool,
    /// Source operands still pending writeback.
    pub num_not_ready_operands: u32,
    /// Shared with the reorder buffer pair.
    pub source_physical_registers: Vec<(RegisterDependency, PhysRegRef)>,
    /// Shared with the reorder buffer pair.
    pub target_physical_registers: Vec<(RegisterDependency, PhysRegRef)>,
    /// The paired reorder buffer slot.
    pub reorder_buffer_entry: usize,
}

impl LoadStoreQueueEntry {
    /// True when every source operand has been written back.
    pub fn all_operands_ready(&self) -> bool {
        self.num_not_ready_operands == 0
    }
}
