//! Pipeline building blocks: buffers, register renaming, functional units,
//! branch prediction, and the in-flight entry types.

pub mod bpred;
pub mod buffer;
pub mod fu;
pub mod prf;
pub mod rename_table;
pub mod rob;

pub use bpred::{BranchPredictor, BranchPredictorUpdate};
pub use buffer::PipelineBuffer;
pub use fu::{FuAllocation, FuOperationType, FuPool, FuType};
pub use prf::{PhysicalRegisterFile, PhysicalRegisterFileError, PhysicalRegisterState};
pub use rename_table::RenameTable;
pub use rob::{
    DecodeBufferEntry, DynamicInst, EntryKind, EntryRef, LoadStoreQueueEntry, PhysRegRef,
    ReorderBufferEntry,
};
