//! Rename table: the current logical-to-physical register mapping.
//!
//! A total mapping: every logical register of every class maps to exactly
//! one live physical register at any instant. Dense per-class arrays keyed
//! by the structural `(class, index)` dependency.

use crate::common::reg::{RegisterClass, RegisterDependency};
use crate::pipeline::rob::PhysRegRef;

/// Total logical→physical mapping across the three register classes.
pub struct RenameTable {
    int: Vec<u32>,
    fp: Vec<u32>,
    misc: Vec<u32>,
}

impl RenameTable {
    /// Identity-initialized table: logical register `i` of each class maps
    /// to physical register `i` of that class's file. The caller is expected
    /// to have `reserve`d those physical registers as committed mappings.
    pub fn identity() -> Self {
        Self {
            int: (0..RegisterClass::Int.num_registers()).collect(),
            fp: (0..RegisterClass::Fp.num_registers()).collect(),
            misc: (0..RegisterClass::Misc.num_registers()).collect(),
        }
    }

    fn slot(&self, dependency: RegisterDependency) -> u32 {
        match dependency.class {
            RegisterClass::Int => self.int[dependency.index as usize],
            RegisterClass::Fp => self.fp[dependency.index as usize],
            RegisterClass::Misc => self.misc[dependency.index as usize],
        }
    }

    /// The live physical register for a logical register.
    pub fn get(&self, dependency: RegisterDependency) -> PhysRegRef {
        PhysRegRef {
            class: dependency.class,
            index: self.slot(dependency),
        }
    }

    /// Installs a new mapping for a logical register.
    pub fn set(&mut self, dependency: RegisterDependency, physical: PhysRegRef) {
        debug_assert_eq!(dependency.class, physical.class, "cross-class rename");
        match dependency.class {
            RegisterClass::Int => self.int[dependency.index as usize] = physical.index,
            RegisterClass::Fp => self.fp[dependency.index as usize] = physical.index,
            RegisterClass::Misc => self.misc[dependency.index as usize] = physical.index,
        }
    }
}
