//! Static instruction descriptors.
//!
//! The pipeline is ISA-agnostic: it consumes static instructions through a
//! narrow descriptor (mnemonic class, flags, register dependencies, functional
//! unit operation) and delegates semantics to [`Context::execute`]. This
//! module provides:
//! 1. **Metadata:** `StaticInstType`, `StaticInstFlag`, and `Mnemonic`.
//! 2. **Descriptors:** `StaticInst` with input/output dependency lists and
//!    per-class physical register demand.
//! 3. **A synthetic op set** used by the built-in workloads and the tests:
//!    integer/FP arithmetic, loads/stores, branches, calls and returns over
//!    the two-step `npc`/`nnpc` control-flow model.
//!
//! [`Context::execute`]: crate::isa::context::Context::execute

pub mod context;

use crate::common::reg::{REGISTER_RA, RegisterClass, RegisterDependency};
use crate::pipeline::fu::FuOperationType;
use std::sync::Arc;

/// Classification of a static instruction, used for pipeline control decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaticInstType {
    /// Integer computation.
    IntComp,
    /// Floating-point computation.
    FpComp,
    /// Conditional branch.
    Cond,
    /// Unconditional jump.
    Uncond,
    /// Load.
    Ld,
    /// Store.
    St,
    /// Function call.
    FuncCall,
    /// Function return.
    FuncRet,
    /// Trap (system operation).
    Trap,
    /// No-operation; consumed transparently by fetch.
    Nop,
}

impl StaticInstType {
    /// Control-transfer instructions interact with the branch predictor.
    pub fn is_control(self) -> bool {
        matches!(
            self,
            StaticInstType::Cond | StaticInstType::Uncond | StaticInstType::FuncCall | StaticInstType::FuncRet
        )
    }

    /// Memory operations get a paired load/store queue entry.
    pub fn is_load_or_store(self) -> bool {
        matches!(self, StaticInstType::Ld | StaticInstType::St)
    }
}

/// Flags attached to a mnemonic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StaticInstFlag {
    /// Integer computation.
    IntComp,
    /// Floating-point computation.
    FpComp,
    /// Unconditional control transfer.
    Uncond,
    /// Conditional control transfer.
    Cond,
    /// Load.
    Ld,
    /// Store.
    St,
    /// Direct jump (target encoded in the instruction).
    DirectJump,
    /// Indirect jump (target from a register).
    IndirectJump,
    /// Function call.
    FuncCall,
    /// Function return.
    FuncRet,
    /// Has an immediate operand.
    Imm,
    /// Base-plus-displacement addressing.
    DisplacedAddressing,
    /// Trap.
    Trap,
    /// No-operation.
    Nop,
}

/// Mnemonic metadata: type, flags, and the functional unit operation the
/// instruction claims at issue. Memory ops claim an integer ALU here: the
/// instruction-queue half of a memory op is its effective-address
/// computation; the memory port is claimed by the load/store queue half.
#[derive(Clone, Copy, Debug)]
pub struct Mnemonic {
    /// Assembly name.
    pub name: &'static str,
    /// Instruction classification.
    pub inst_type: StaticInstType,
    /// Flag set.
    pub flags: &'static [StaticInstFlag],
    /// Functional unit operation claimed at issue; `None` issues without a unit.
    pub fu_operation: Option<FuOperationType>,
}

impl Mnemonic {
    pub const ADD: Mnemonic = Mnemonic {
        name: "add",
        inst_type: StaticInstType::IntComp,
        flags: &[StaticInstFlag::IntComp],
        fu_operation: Some(FuOperationType::IntAlu),
    };
    pub const ADDI: Mnemonic = Mnemonic {
        name: "addi",
        inst_type: StaticInstType::IntComp,
        flags: &[StaticInstFlag::IntComp, StaticInstFlag::Imm],
        fu_operation: Some(FuOperationType::IntAlu),
    };
    pub const MULT: Mnemonic = Mnemonic {
        name: "mult",
        inst_type: StaticInstType::IntComp,
        flags: &[StaticInstFlag::IntComp],
        fu_operation: Some(FuOperationType::IntMult),
    };
    pub const DIV: Mnemonic = Mnemonic {
        name: "div",
        inst_type: StaticInstType::IntComp,
        flags: &[StaticInstFlag::IntComp],
        fu_operation: Some(FuOperationType::IntDiv),
    };
    pub const FADD: Mnemonic = Mnemonic {
        name: "fadd",
        inst_type: StaticInstType::FpComp,
        flags: &[StaticInstFlag::FpComp],
        fu_operation: Some(FuOperationType::FpAdd),
    };
    pub const FCMP: Mnemonic = Mnemonic {
        name: "fcmp",
        inst_type: StaticInstType::FpComp,
        flags: &[StaticInstFlag::FpComp],
        fu_operation: Some(FuOperationType::FpCmp),
    };
    pub const FCVT: Mnemonic = Mnemonic {
        name: "fcvt",
        inst_type: StaticInstType::FpComp,
        flags: &[StaticInstFlag::FpComp],
        fu_operation: Some(FuOperationType::FpCvt),
    };
    pub const FMUL: Mnemonic = Mnemonic {
        name: "fmul",
        inst_type: StaticInstType::FpComp,
        flags: &[StaticInstFlag::FpComp],
        fu_operation: Some(FuOperationType::FpMult),
    };
    pub const FDIV: Mnemonic = Mnemonic {
        name: "fdiv",
        inst_type: StaticInstType::FpComp,
        flags: &[StaticInstFlag::FpComp],
        fu_operation: Some(FuOperationType::FpDiv),
    };
    pub const FSQRT: Mnemonic = Mnemonic {
        name: "fsqrt",
        inst_type: StaticInstType::FpComp,
        flags: &[StaticInstFlag::FpComp],
        fu_operation: Some(FuOperationType::FpSqrt),
    };
    pub const LW: Mnemonic = Mnemonic {
        name: "lw",
        inst_type: StaticInstType::Ld,
        flags: &[StaticInstFlag::Ld, StaticInstFlag::DisplacedAddressing],
        fu_operation: Some(FuOperationType::IntAlu),
    };
    pub const SW: Mnemonic = Mnemonic {
        name: "sw",
        inst_type: StaticInstType::St,
        flags: &[StaticInstFlag::St, StaticInstFlag::DisplacedAddressing],
        fu_operation: Some(FuOperationType::IntAlu),
    };
    pub const BEQ: Mnemonic = Mnemonic {
        name: "beq",
        inst_type: StaticInstType::Cond,
        flags: &[StaticInstFlag::Cond, StaticInstFlag::DirectJump],
        fu_operation: Some(FuOperationType::IntAlu),
    };
    pub const BNE: Mnemonic = Mnemonic {
        name: "bne",
        inst_type: StaticInstType::Cond,
        flags: &[StaticInstFlag::Cond, StaticInstFlag::DirectJump],
        fu_operation: Some(FuOperationType::IntAlu),
    };
    pub const J: Mnemonic = Mnemonic {
        name: "j",
        inst_type: StaticInstType::Uncond,
        flags: &[StaticInstFlag::Uncond, StaticInstFlag::DirectJump],
        fu_operation: Some(FuOperationType::IntAlu),
    };
    pub const JAL: Mnemonic = Mnemonic {
        name: "jal",
        inst_type: StaticInstType::FuncCall,
        flags: &[StaticInstFlag::FuncCall, StaticInstFlag::DirectJump],
        fu_operation: Some(FuOperationType::IntAlu),
    };
    pub const JR: Mnemonic = Mnemonic {
        name: "jr",
        inst_type: StaticInstType::FuncRet,
        flags: &[StaticInstFlag::FuncRet, StaticInstFlag::IndirectJump],
        fu_operation: Some(FuOperationType::IntAlu),
    };
    pub const NOP: Mnemonic = Mnemonic {
        name: "nop",
        inst_type: StaticInstType::Nop,
        flags: &[StaticInstFlag::Nop],
        fu_operation: None,
    };
    pub const HALT: Mnemonic = Mnemonic {
        name: "halt",
        inst_type: StaticInstType::Trap,
        flags: &[StaticInstFlag::Trap],
        fu_operation: None,
    };
    /// Filler decoded when a speculative path runs past the program.
    pub const SPEC_FILL: Mnemonic = Mnemonic {
        name: "spec.fill",
        inst_type: StaticInstType::IntComp,
        flags: &[StaticInstFlag::IntComp],
        fu_operation: Some(FuOperationType::IntAlu),
    };
}

/// Operation payload interpreted by [`context::SimContext::execute`].
///
/// Register fields are in-class indices; branch targets are absolute
/// addresses; `nnpc` semantics follow the two-step control-flow model (a
/// branch redirects the *next-next* PC, so the instruction after it always
/// executes).
#[derive(Clone, Copy, Debug)]
pub enum Op {
    /// No operation.
    Nop,
    /// Stop the context (sets state FINISHED when non-speculative).
    Halt,
    /// Speculative-path filler past the end of the program.
    Bubble,
    /// `rd = rs + rt`.
    Add { rd: u32, rs: u32, rt: u32 },
    /// `rd = rs + imm`.
    Addi { rd: u32, rs: u32, imm: i16 },
    /// `rd = rs * rt`.
    Mult { rd: u32, rs: u32, rt: u32 },
    /// `rd = rs / rt` (zero divisor yields zero).
    Div { rd: u32, rs: u32, rt: u32 },
    /// `fd = fs + ft`.
    FpAdd { fd: u32, fs: u32, ft: u32 },
    /// `fd = (fs < ft) as f64`.
    FpCmp { fd: u32, fs: u32, ft: u32 },
    /// `fd = trunc(fs)`.
    FpCvt { fd: u32, fs: u32 },
    /// `fd = fs * ft`.
    FpMult { fd: u32, fs: u32, ft: u32 },
    /// `fd = fs / ft`.
    FpDiv { fd: u32, fs: u32, ft: u32 },
    /// `fd = sqrt(fs)`.
    FpSqrt { fd: u32, fs: u32 },
    /// `rt = mem[rs + offset]`.
    Lw { rt: u32, base: u32, offset: i16 },
    /// `mem[rs + offset] = rt`.
    Sw { rt: u32, base: u32, offset: i16 },
    /// Branch to `target` when `rs == rt`.
    Beq { rs: u32, rt: u32, target: u32 },
    /// Branch to `target` when `rs != rt`.
    Bne { rs: u32, rt: u32, target: u32 },
    /// Jump to `target`.
    J { target: u32 },
    /// Call: link in `ra`, jump to `target`.
    Jal { target: u32 },
    /// Indirect jump to `rs` (return when `rs == ra`).
    Jr { rs: u32 },
}

/// A decoded static instruction: mnemonic metadata, operation payload, and
/// the register dependency lists the rename stage consumes. For memory
/// operations the first input dependency is the address operand.
pub struct StaticInst {
    /// Mnemonic metadata.
    pub mnemonic: Mnemonic,
    /// Operation payload.
    pub op: Op,
    input_dependencies: Vec<RegisterDependency>,
    output_dependencies: Vec<RegisterDependency>,
}

impl StaticInst {
    fn new(
        mnemonic: Mnemonic,
        op: Op,
        input_dependencies: Vec<RegisterDependency>,
        output_dependencies: Vec<RegisterDependency>,
    ) -> Arc<Self> {
        Arc::new(Self {
            mnemonic,
            op,
            input_dependencies,
            output_dependencies,
        })
    }

    /// Registers this instruction reads. For loads and stores the first
    /// entry is the effective-address operand.
    pub fn input_dependencies(&self) -> &[RegisterDependency] {
        &self.input_dependencies
    }

    /// Registers this instruction writes.
    pub fn output_dependencies(&self) -> &[RegisterDependency] {
        &self.output_dependencies
    }

    /// Physical registers the rename stage must allocate in `class`.
    pub fn num_physical_registers_to_allocate(&self, class: RegisterClass) -> u32 {
        self.output_dependencies
            .iter()
            .filter(|d| d.class == class)
            .count() as u32
    }

    pub fn add(rd: u32, rs: u32, rt: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::ADD,
            Op::Add { rd, rs, rt },
            vec![int(rs), int(rt)],
            vec![int(rd)],
        )
    }

    pub fn addi(rd: u32, rs: u32, imm: i16) -> Arc<Self> {
        Self::new(Mnemonic::ADDI, Op::Addi { rd, rs, imm }, vec![int(rs)], vec![int(rd)])
    }

    pub fn mult(rd: u32, rs: u32, rt: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::MULT,
            Op::Mult { rd, rs, rt },
            vec![int(rs), int(rt)],
            vec![int(rd)],
        )
    }

    pub fn div(rd: u32, rs: u32, rt: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::DIV,
            Op::Div { rd, rs, rt },
            vec![int(rs), int(rt)],
            vec![int(rd)],
        )
    }

    pub fn fadd(fd: u32, fs: u32, ft: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::FADD,
            Op::FpAdd { fd, fs, ft },
            vec![fp(fs), fp(ft)],
            vec![fp(fd)],
        )
    }

    pub fn fcmp(fd: u32, fs: u32, ft: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::FCMP,
            Op::FpCmp { fd, fs, ft },
            vec![fp(fs), fp(ft)],
            vec![fp(fd)],
        )
    }

    pub fn fcvt(fd: u32, fs: u32) -> Arc<Self> {
        Self::new(Mnemonic::FCVT, Op::FpCvt { fd, fs }, vec![fp(fs)], vec![fp(fd)])
    }

    pub fn fmul(fd: u32, fs: u32, ft: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::FMUL,
            Op::FpMult { fd, fs, ft },
            vec![fp(fs), fp(ft)],
            vec![fp(fd)],
        )
    }

    pub fn fdiv(fd: u32, fs: u32, ft: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::FDIV,
            Op::FpDiv { fd, fs, ft },
            vec![fp(fs), fp(ft)],
            vec![fp(fd)],
        )
    }

    pub fn fsqrt(fd: u32, fs: u32) -> Arc<Self> {
        Self::new(Mnemonic::FSQRT, Op::FpSqrt { fd, fs }, vec![fp(fs)], vec![fp(fd)])
    }

    pub fn lw(rt: u32, offset: i16, base: u32) -> Arc<Self> {
        Self::new(Mnemonic::LW, Op::Lw { rt, base, offset }, vec![int(base)], vec![int(rt)])
    }

    pub fn sw(rt: u32, offset: i16, base: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::SW,
            Op::Sw { rt, base, offset },
            vec![int(base), int(rt)],
            vec![],
        )
    }

    pub fn beq(rs: u32, rt: u32, target: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::BEQ,
            Op::Beq { rs, rt, target },
            vec![int(rs), int(rt)],
            vec![],
        )
    }

    pub fn bne(rs: u32, rt: u32, target: u32) -> Arc<Self> {
        Self::new(
            Mnemonic::BNE,
            Op::Bne { rs, rt, target },
            vec![int(rs), int(rt)],
            vec![],
        )
    }

    pub fn j(target: u32) -> Arc<Self> {
        Self::new(Mnemonic::J, Op::J { target }, vec![], vec![])
    }

    pub fn jal(target: u32) -> Arc<Self> {
        Self::new(Mnemonic::JAL, Op::Jal { target }, vec![], vec![int(REGISTER_RA)])
    }

    pub fn jr(rs: u32) -> Arc<Self> {
        Self::new(Mnemonic::JR, Op::Jr { rs }, vec![int(rs)], vec![])
    }

    pub fn nop() -> Arc<Self> {
        Self::new(Mnemonic::NOP, Op::Nop, vec![], vec![])
    }

    pub fn halt() -> Arc<Self> {
        Self::new(Mnemonic::HALT, Op::Halt, vec![], vec![])
    }

    pub(crate) fn spec_fill() -> Arc<Self> {
        Self::new(Mnemonic::SPEC_FILL, Op::Bubble, vec![], vec![])
    }
}

fn int(index: u32) -> RegisterDependency {
    RegisterDependency::new(RegisterClass::Int, index)
}

fn fp(index: u32) -> RegisterDependency {
    RegisterDependency::new(RegisterClass::Fp, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_and_memory_classification() {
        assert!(Mnemonic::BEQ.inst_type.is_control());
        assert!(Mnemonic::JAL.inst_type.is_control());
        assert!(Mnemonic::JR.inst_type.is_control());
        assert!(!Mnemonic::ADD.inst_type.is_control());
        assert!(Mnemonic::LW.inst_type.is_load_or_store());
        assert!(Mnemonic::SW.inst_type.is_load_or_store());
        assert!(!Mnemonic::BEQ.inst_type.is_load_or_store());
    }

    #[test]
    fn test_memory_ops_put_address_operand_first() {
        let lw = StaticInst::lw(3, 0, 2);
        assert_eq!(lw.input_dependencies()[0], int(2));
        let sw = StaticInst::sw(1, 4, 2);
        assert_eq!(sw.input_dependencies()[0], int(2));
        assert_eq!(sw.input_dependencies()[1], int(1));
        assert!(sw.output_dependencies().is_empty());
    }

    #[test]
    fn test_register_demand_by_class() {
        let fadd = StaticInst::fadd(1, 2, 3);
        assert_eq!(fadd.num_physical_registers_to_allocate(RegisterClass::Fp), 1);
        assert_eq!(fadd.num_physical_registers_to_allocate(RegisterClass::Int), 0);

        let jal = StaticInst::jal(0x100);
        assert_eq!(jal.num_physical_registers_to_allocate(RegisterClass::Int), 1);
        assert_eq!(jal.output_dependencies()[0], int(REGISTER_RA));
    }
}
