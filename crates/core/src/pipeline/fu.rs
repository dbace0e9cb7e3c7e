//! Functional unit pool.
//!
//! The pool owns one descriptor per functional unit type; each descriptor
//! carries a quantity, a free count, and the `(operation latency, issue
//! latency)` pair for every operation it implements. It provides:
//! 1. **Acquire:** Claims a unit for an operation and reports its latencies;
//!    the caller schedules the pipelined release at `+issue_latency`.
//! 2. **Release:** Returns a unit, saturating at the descriptor quantity so
//!    releases racing a squash-time `release_all` stay within bounds.
//! 3. **Stall accounting:** Counters per unit type and per operation type.

/// Functional unit type: an execution resource class.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FuType {
    /// Integer ALUs.
    IntAlu,
    /// Integer multiply/divide units.
    IntMultDiv,
    /// Floating-point adders.
    FpAdd,
    /// Floating-point multiply/divide units.
    FpMultDiv,
    /// Memory ports.
    MemPort,
}

impl FuType {
    /// All unit types, in table order.
    pub const ALL: [FuType; 5] = [
        FuType::IntAlu,
        FuType::IntMultDiv,
        FuType::FpAdd,
        FuType::FpMultDiv,
        FuType::MemPort,
    ];

    fn index(self) -> usize {
        match self {
            FuType::IntAlu => 0,
            FuType::IntMultDiv => 1,
            FuType::FpAdd => 2,
            FuType::FpMultDiv => 3,
            FuType::MemPort => 4,
        }
    }
}

/// Operation type dispatched onto a functional unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FuOperationType {
    /// Integer ALU operation (also used for effective-address computation).
    IntAlu,
    /// Integer multiply.
    IntMult,
    /// Integer divide.
    IntDiv,
    /// Floating-point add/subtract.
    FpAdd,
    /// Floating-point compare.
    FpCmp,
    /// Floating-point convert.
    FpCvt,
    /// Floating-point multiply.
    FpMult,
    /// Floating-point divide.
    FpDiv,
    /// Floating-point square root.
    FpSqrt,
    /// Cache read port claim for an issuing load.
    ReadPort,
    /// Cache write port claim for an issuing store.
    WritePort,
}

impl FuOperationType {
    /// All operation types, in table order.
    pub const ALL: [FuOperationType; 11] = [
        FuOperationType::IntAlu,
        FuOperationType::IntMult,
        FuOperationType::IntDiv,
        FuOperationType::FpAdd,
        FuOperationType::FpCmp,
        FuOperationType::FpCvt,
        FuOperationType::FpMult,
        FuOperationType::FpDiv,
        FuOperationType::FpSqrt,
        FuOperationType::ReadPort,
        FuOperationType::WritePort,
    ];

    /// The unit type implementing this operation.
    pub fn fu_type(self) -> FuType {
        match self {
            FuOperationType::IntAlu => FuType::IntAlu,
            FuOperationType::IntMult | FuOperationType::IntDiv => FuType::IntMultDiv,
            FuOperationType::FpAdd | FuOperationType::FpCmp | FuOperationType::FpCvt => FuType::FpAdd,
            FuOperationType::FpMult | FuOperationType::FpDiv | FuOperationType::FpSqrt => {
                FuType::FpMultDiv
            }
            FuOperationType::ReadPort | FuOperationType::WritePort => FuType::MemPort,
        }
    }

    fn index(self) -> usize {
        match self {
            FuOperationType::IntAlu => 0,
            FuOperationType::IntMult => 1,
            FuOperationType::IntDiv => 2,
            FuOperationType::FpAdd => 3,
            FuOperationType::FpCmp => 4,
            FuOperationType::FpCvt => 5,
            FuOperationType::FpMult => 6,
            FuOperationType::FpDiv => 7,
            FuOperationType::FpSqrt => 8,
            FuOperationType::ReadPort => 9,
            FuOperationType::WritePort => 10,
        }
    }
}

/// Latency pair for one operation on one unit type.
#[derive(Clone, Copy, Debug)]
pub struct FuOperation {
    /// Cycles from issue to result writeback.
    pub operation_latency: u64,
    /// Cycles the unit stays claimed before the next issue (pipelining).
    pub issue_latency: u64,
}

/// One functional unit type's units and operation table.
pub struct FuDescriptor {
    /// Unit type.
    pub fu_type: FuType,
    /// Total units of this type.
    pub quantity: u32,
    /// Units currently free.
    pub num_free: u32,
    operations: Vec<(FuOperationType, FuOperation)>,
}

impl FuDescriptor {
    fn new(fu_type: FuType, quantity: u32) -> Self {
        Self {
            fu_type,
            quantity,
            num_free: quantity,
            operations: Vec::new(),
        }
    }

    fn add_operation(mut self, op: FuOperationType, operation_latency: u64, issue_latency: u64) -> Self {
        debug_assert_eq!(op.fu_type(), self.fu_type);
        self.operations.push((
            op,
            FuOperation {
                operation_latency,
                issue_latency,
            },
        ));
        self
    }

    /// Latencies of `op` on this unit type, if implemented.
    pub fn operation(&self, op: FuOperationType) -> Option<FuOperation> {
        self.operations.iter().find(|(o, _)| *o == op).map(|(_, l)| *l)
    }

    /// True when every unit is claimed.
    pub fn is_exhausted(&self) -> bool {
        self.num_free == 0
    }
}

/// A successful unit acquisition.
#[derive(Clone, Copy, Debug)]
pub struct FuAllocation {
    /// Unit type claimed.
    pub fu_type: FuType,
    /// Cycles until the result is available.
    pub operation_latency: u64,
    /// Cycles until the unit accepts the next issue.
    pub issue_latency: u64,
}

/// Pool of typed functional units with stall accounting.
pub struct FuPool {
    descriptors: [FuDescriptor; 5],
    /// Stalls observed per unit type (issue found the type exhausted).
    pub num_stalls_on_no_free_fu: [u64; 5],
    /// Acquire failures per operation type.
    pub num_stalls_on_acquire_failed: [u64; 11],
}

impl Default for FuPool {
    fn default() -> Self {
        Self::new()
    }
}

impl FuPool {
    /// Builds the pool with the default unit and latency table.
    pub fn new() -> Self {
        use FuOperationType as Op;
        Self {
            descriptors: [
                FuDescriptor::new(FuType::IntAlu, 8).add_operation(Op::IntAlu, 2, 1),
                FuDescriptor::new(FuType::IntMultDiv, 2)
                    .add_operation(Op::IntMult, 3, 1)
                    .add_operation(Op::IntDiv, 20, 19),
                FuDescriptor::new(FuType::FpAdd, 8)
                    .add_operation(Op::FpAdd, 4, 1)
                    .add_operation(Op::FpCmp, 4, 1)
                    .add_operation(Op::FpCvt, 4, 1),
                FuDescriptor::new(FuType::FpMultDiv, 2)
                    .add_operation(Op::FpMult, 8, 1)
                    .add_operation(Op::FpDiv, 40, 20)
                    .add_operation(Op::FpSqrt, 80, 40),
                FuDescriptor::new(FuType::MemPort, 4)
                    .add_operation(Op::ReadPort, 1, 1)
                    .add_operation(Op::WritePort, 1, 1),
            ],
            num_stalls_on_no_free_fu: [0; 5],
            num_stalls_on_acquire_failed: [0; 11],
        }
    }

    /// The descriptor for a unit type.
    pub fn descriptor(&self, fu_type: FuType) -> &FuDescriptor {
        &self.descriptors[fu_type.index()]
    }

    /// Free units of a type.
    pub fn num_free(&self, fu_type: FuType) -> u32 {
        self.descriptors[fu_type.index()].num_free
    }

    /// Claims a unit for `op`. On success the free count drops and the
    /// latency pair is returned; the caller must schedule a release at
    /// `+issue_latency`. On failure both stall counter families advance.
    pub fn acquire(&mut self, op: FuOperationType) -> Option<FuAllocation> {
        let fu_type = op.fu_type();
        let descriptor = &mut self.descriptors[fu_type.index()];
        let latencies = descriptor
            .operation(op)
            .unwrap_or_else(|| panic!("operation {op:?} not implemented by {fu_type:?}"));

        if descriptor.num_free == 0 {
            self.num_stalls_on_no_free_fu[fu_type.index()] += 1;
            self.num_stalls_on_acquire_failed[op.index()] += 1;
            return None;
        }

        descriptor.num_free -= 1;
        Some(FuAllocation {
            fu_type,
            operation_latency: latencies.operation_latency,
            issue_latency: latencies.issue_latency,
        })
    }

    /// Returns one unit of a type. Saturates at the quantity: a pipelined
    /// release landing after `release_all` must not overflow the pool.
    pub fn release(&mut self, fu_type: FuType) {
        let descriptor = &mut self.descriptors[fu_type.index()];
        if descriptor.num_free < descriptor.quantity {
            descriptor.num_free += 1;
        }
    }

    /// Restores every descriptor to fully free (squash recovery).
    pub fn release_all(&mut self) {
        for descriptor in &mut self.descriptors {
            descriptor.num_free = descriptor.quantity;
        }
    }

    /// Stall count for a unit type.
    pub fn stalls_on_no_free_fu(&self, fu_type: FuType) -> u64 {
        self.num_stalls_on_no_free_fu[fu_type.index()]
    }

    /// Acquire-failure count for an operation type.
    pub fn stalls_on_acquire_failed(&self, op: FuOperationType) -> u64 {
        self.num_stalls_on_acquire_failed[op.index()]
    }
}
