//! Physical register file.
//!
//! One file per register class. Each physical register is in exactly one of
//! four states and carries three wakeup lists of non-owning entry
//! references:
//! 1. **dependents**: reorder buffer / load-store queue entries waiting for
//!    this register as a source operand.
//! 2. **effective-address dependents**: reorder buffer entries of memory
//!    ops waiting for their sole address operand.
//! 3. **store-address dependents**: load-store queue store entries waiting
//!    for their address operand (disambiguation input).
//!
//! `writeback` drains the lists and hands them to the caller; the pipeline
//! owns the entries, the registers only remember who is waiting.

use crate::common::reg::{RegisterClass, RegisterDependency};
use crate::pipeline::rob::EntryRef;
use std::fmt;

/// Lifecycle state of a physical register.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysicalRegisterState {
    /// On the free list.
    Available,
    /// Committed mapping of some logical register.
    ArchRegister,
    /// Allocated and written back, not yet committed.
    RenameBuffer,
    /// Allocated, writeback still pending.
    RenameBufferNotReady,
}

/// Recoverable physical-register-file errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhysicalRegisterFileError {
    /// The free list is empty.
    NoFreePhysicalRegister,
}

impl fmt::Display for PhysicalRegisterFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalRegisterFileError::NoFreePhysicalRegister => write!(f, "NoFreePhysicalRegister"),
        }
    }
}

impl std::error::Error for PhysicalRegisterFileError {}

/// Wakeup lists drained from a register at writeback.
#[derive(Default)]
pub struct Wakeup {
    /// Entries waiting on this register as a source operand.
    pub dependents: Vec<EntryRef>,
    /// Memory-op reorder entries waiting on their address operand.
    pub effective_address_dependents: Vec<EntryRef>,
    /// Store queue entries waiting on their address operand.
    pub store_address_dependents: Vec<EntryRef>,
}

/// One physical register.
pub struct PhysicalRegister {
    state: PhysicalRegisterState,
    ready: bool,
    reserved_for: Option<RegisterDependency>,
    dependents: Vec<EntryRef>,
    effective_address_dependents: Vec<EntryRef>,
    store_address_dependents: Vec<EntryRef>,
}

impl PhysicalRegister {
    fn new() -> Self {
        Self {
            state: PhysicalRegisterState::Available,
            ready: false,
            reserved_for: None,
            dependents: Vec::new(),
            effective_address_dependents: Vec::new(),
            store_address_dependents: Vec::new(),
        }
    }

    fn clear_wakeup_lists(&mut self) {
        self.dependents.clear();
        self.effective_address_dependents.clear();
        self.store_address_dependents.clear();
    }
}

/// Fixed-capacity physical register file for one register class.
pub struct PhysicalRegisterFile {
    class: RegisterClass,
    registers: Vec<PhysicalRegister>,
    free_list: Vec<u32>,
}

impl PhysicalRegisterFile {
    /// Creates a file of `capacity` available registers.
    pub fn new(class: RegisterClass, capacity: usize) -> Self {
        let mut registers = Vec::with_capacity(capacity);
        registers.resize_with(capacity, PhysicalRegister::new);
        Self {
            class,
            registers,
            // Low indices allocate first.
            free_list: (0..capacity as u32).rev().collect(),
        }
    }

    /// The register class this file backs.
    pub fn class(&self) -> RegisterClass {
        self.class
    }

    /// Total registers in the file.
    pub fn capacity(&self) -> usize {
        self.registers.len()
    }

    /// Registers currently on the free list.
    pub fn num_free(&self) -> u32 {
        self.free_list.len() as u32
    }

    /// State of a register.
    pub fn state(&self, index: u32) -> PhysicalRegisterState {
        self.registers[index as usize].state
    }

    /// True once the register's value has been written back (or committed).
    pub fn is_ready(&self, index: u32) -> bool {
        self.registers[index as usize].ready
    }

    /// The logical register this physical register is bound to.
    pub fn reserved_for(&self, index: u32) -> Option<RegisterDependency> {
        self.registers[index as usize].reserved_for
    }

    /// Init-time binding: takes `index` off the free list as the committed,
    /// ready mapping of `logical`. Used to seed the rename table.
    pub fn reserve(&mut self, index: u32, logical: RegisterDependency) {
        let position = self
            .free_list
            .iter()
            .position(|&i| i == index)
            .unwrap_or_else(|| panic!("reserve of non-free physical register {index}"));
        self.free_list.remove(position);

        let reg = &mut self.registers[index as usize];
        assert_eq!(
            reg.state,
            PhysicalRegisterState::Available,
            "reserve of {index} in state {:?}",
            reg.state
        );
        reg.state = PhysicalRegisterState::ArchRegister;
        reg.ready = true;
        reg.reserved_for = Some(logical);
    }

    /// Takes a register off the free list for `logical`, entering
    /// `RenameBufferNotReady` with the ready flag down.
    pub fn allocate(&mut self, logical: RegisterDependency) -> Result<u32, PhysicalRegisterFileError> {
        let index = self
            .free_list
            .pop()
            .ok_or(PhysicalRegisterFileError::NoFreePhysicalRegister)?;
        let reg = &mut self.registers[index as usize];
        assert_eq!(
            reg.state,
            PhysicalRegisterState::Available,
            "allocate found {index} in state {:?}",
            reg.state
        );
        reg.state = PhysicalRegisterState::RenameBufferNotReady;
        reg.ready = false;
        reg.reserved_for = Some(logical);
        Ok(index)
    }

    /// Registers `entry` for wakeup when this register becomes ready.
    pub fn add_dependent(&mut self, index: u32, entry: EntryRef) {
        self.registers[index as usize].dependents.push(entry);
    }

    /// Registers a memory-op reorder entry waiting on its address operand.
    pub fn add_effective_address_dependent(&mut self, index: u32, entry: EntryRef) {
        self.registers[index as usize]
            .effective_address_dependents
            .push(entry);
    }

    /// Registers a store queue entry waiting on its address operand.
    pub fn add_store_address_dependent(&mut self, index: u32, entry: EntryRef) {
        self.registers[index as usize]
            .store_address_dependents
            .push(entry);
    }

    /// Marks the register written back and ready, returning the drained
    /// wakeup lists for the caller to process. May be invoked only once per
    /// allocation.
    pub fn writeback(&mut self, index: u32) -> Wakeup {
        let reg = &mut self.registers[index as usize];
        assert_eq!(
            reg.state,
            PhysicalRegisterState::RenameBufferNotReady,
            "writeback of {index} in state {:?}",
            reg.state
        );
        reg.state = PhysicalRegisterState::RenameBuffer;
        reg.ready = true;
        Wakeup {
            dependents: std::mem::take(&mut reg.dependents),
            effective_address_dependents: std::mem::take(&mut reg.effective_address_dependents),
            store_address_dependents: std::mem::take(&mut reg.store_address_dependents),
        }
    }

    /// Commits a written-back register as the architectural mapping of its
    /// logical register.
    pub fn commit(&mut self, index: u32) {
        let reg = &mut self.registers[index as usize];
        assert_eq!(
            reg.state,
            PhysicalRegisterState::RenameBuffer,
            "commit of {index} in state {:?}",
            reg.state
        );
        reg.state = PhysicalRegisterState::ArchRegister;
    }

    /// Returns a superseded architectural register to the free list. Only
    /// valid after a later allocation committed over the same logical slot.
    pub fn reclaim(&mut self, index: u32) {
        let reg = &mut self.registers[index as usize];
        assert_eq!(
            reg.state,
            PhysicalRegisterState::ArchRegister,
            "reclaim of {index} in state {:?}",
            reg.state
        );
        reg.state = PhysicalRegisterState::Available;
        reg.ready = false;
        reg.reserved_for = None;
        reg.clear_wakeup_lists();
        self.free_list.push(index);
    }

    /// Squash recovery: forcibly returns an allocated, uncommitted target to
    /// the free list without waking dependents.
    pub fn recover(&mut self, index: u32) {
        let reg = &mut self.registers[index as usize];
        assert!(
            matches!(
                reg.state,
                PhysicalRegisterState::RenameBuffer | PhysicalRegisterState::RenameBufferNotReady
            ),
            "recover of {index} in state {:?}",
            reg.state
        );
        reg.state = PhysicalRegisterState::Available;
        reg.ready = false;
        reg.reserved_for = None;
        reg.clear_wakeup_lists();
        self.free_list.push(index);
    }

    /// Registers currently allocated or committed (capacity minus free).
    pub fn num_live(&self) -> u32 {
        self.capacity() as u32 - self.num_free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rob::EntryKind;

    fn dep(index: u32) -> RegisterDependency {
        RegisterDependency::new(RegisterClass::Int, index)
    }

    fn entry(id: usize) -> EntryRef {
        EntryRef {
            thread: 0,
            kind: EntryKind::Reorder,
            id,
            seq: id as u64,
        }
    }

    #[test]
    fn test_allocate_lifecycle() {
        let mut prf = PhysicalRegisterFile::new(RegisterClass::Int, 4);
        let r = prf.allocate(dep(1)).unwrap();
        assert_eq!(prf.state(r), PhysicalRegisterState::RenameBufferNotReady);
        assert!(!prf.is_ready(r));
        assert_eq!(prf.num_free(), 3);

        prf.writeback(r);
        assert_eq!(prf.state(r), PhysicalRegisterState::RenameBuffer);
        assert!(prf.is_ready(r));

        prf.commit(r);
        assert_eq!(prf.state(r), PhysicalRegisterState::ArchRegister);

        prf.reclaim(r);
        assert_eq!(prf.state(r), PhysicalRegisterState::Available);
        assert_eq!(prf.num_free(), 4);
    }

    #[test]
    fn test_free_accounting_invariant() {
        let mut prf = PhysicalRegisterFile::new(RegisterClass::Int, 8);
        prf.reserve(0, dep(0));
        let a = prf.allocate(dep(1)).unwrap();
        let _b = prf.allocate(dep(2)).unwrap();
        assert_eq!(prf.num_free() + prf.num_live(), prf.capacity() as u32);

        prf.writeback(a);
        prf.commit(a);
        assert_eq!(prf.num_free() + prf.num_live(), prf.capacity() as u32);
    }

    #[test]
    fn test_exhaustion() {
        let mut prf = PhysicalRegisterFile::new(RegisterClass::Fp, 2);
        prf.allocate(dep(1)).unwrap();
        prf.allocate(dep(2)).unwrap();
        assert_eq!(
            prf.allocate(dep(3)),
            Err(PhysicalRegisterFileError::NoFreePhysicalRegister)
        );
    }

    #[test]
    fn test_writeback_drains_wakeup_lists() {
        let mut prf = PhysicalRegisterFile::new(RegisterClass::Int, 4);
        let r = prf.allocate(dep(1)).unwrap();
        prf.add_dependent(r, entry(1));
        prf.add_dependent(r, entry(2));
        prf.add_effective_address_dependent(r, entry(3));
        prf.add_store_address_dependent(r, entry(4));

        let wakeup = prf.writeback(r);
        assert_eq!(wakeup.dependents.len(), 2);
        assert_eq!(wakeup.effective_address_dependents.len(), 1);
        assert_eq!(wakeup.store_address_dependents.len(), 1);
    }

    #[test]
    fn test_recover_without_waking() {
        let mut prf = PhysicalRegisterFile::new(RegisterClass::Int, 4);
        let r = prf.allocate(dep(1)).unwrap();
        prf.add_dependent(r, entry(1));
        prf.recover(r);
        assert_eq!(prf.state(r), PhysicalRegisterState::Available);
        assert_eq!(prf.num_free(), 4);
    }

    #[test]
    #[should_panic(expected = "writeback")]
    fn test_double_writeback_is_fatal() {
        let mut prf = PhysicalRegisterFile::new(RegisterClass::Int, 4);
        let r = prf.allocate(dep(1)).unwrap();
        prf.writeback(r);
        prf.writeback(r);
    }

    #[test]
    #[should_panic(expected = "reclaim")]
    fn test_reclaim_of_available_is_fatal() {
        let mut prf = PhysicalRegisterFile::new(RegisterClass::Int, 4);
        prf.reclaim(0);
    }
}
