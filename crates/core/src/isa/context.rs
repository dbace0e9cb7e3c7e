//! Execution contexts.
//!
//! A context is the architected side of a hardware thread: register state,
//! memory, and the decode/execute services the fetch stage consumes. The
//! pipeline talks to it through the narrow [`Context`] trait so the decoder
//! is swappable; [`SimContext`] is the built-in implementation running the
//! synthetic op set over paged memory.
//!
//! Control flow is two-step: `pc` is the executing instruction, `npc` the
//! next one, and `nnpc` the one after that. Branches redirect `nnpc`, so the
//! instruction following a branch always executes.

use crate::isa::{Op, StaticInst};
use crate::mem::{Endianness, PagedMemory};
use std::collections::HashMap;
use std::sync::Arc;

/// Scheduling state of a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    /// Fetch may proceed.
    Running,
    /// Waiting on an external condition; fetch is paused.
    Blocked,
    /// The program has ended.
    Finished,
}

/// Architected register state.
#[derive(Clone, Debug)]
pub struct ArchRegs {
    /// Program counter of the executing instruction.
    pub pc: u32,
    /// Next program counter.
    pub npc: u32,
    /// Next-next program counter (branch redirect point).
    pub nnpc: u32,
    /// Integer registers; index 0 is hardwired to zero.
    pub gpr: [u32; 32],
    /// Floating-point registers (f64 bit patterns).
    pub fpr: [u64; 32],
    /// Miscellaneous registers (HI, LO, FCSR).
    pub misc: [u32; 3],
}

impl ArchRegs {
    /// Registers reset with control flow starting at `entry`.
    pub fn at_entry(entry: u32) -> Self {
        Self {
            pc: entry,
            npc: entry,
            nnpc: entry.wrapping_add(4),
            gpr: [0; 32],
            fpr: [0; 32],
            misc: [0; 3],
        }
    }

    /// Writes an integer register, keeping index 0 at zero.
    pub fn set_gpr(&mut self, index: u32, value: u32) {
        if index != 0 {
            self.gpr[index as usize] = value;
        }
    }
}

/// The architected-state services the pipeline consumes.
pub trait Context {
    /// Scheduling state.
    fn state(&self) -> ContextState;

    /// Architected registers.
    fn regs(&self) -> &ArchRegs;

    /// Mutable architected registers (fetch realigns `npc` on divergence).
    fn regs_mut(&mut self) -> &mut ArchRegs;

    /// True while executing down a predicted, unresolved path.
    fn speculative(&self) -> bool;

    /// Checkpoints architected state and enters the speculative path.
    fn enter_speculative_state(&mut self);

    /// Restores the checkpoint taken at speculation entry.
    fn exit_speculative_state(&mut self);

    /// Decodes the instruction at `npc`, making it current (`pc = npc`).
    fn decode_next_static_inst(&mut self) -> Arc<StaticInst>;

    /// Functionally executes `inst` against architected state, returning the
    /// effective address for memory operations.
    fn execute(&mut self, inst: &StaticInst) -> Option<u32>;
}

/// Built-in context: a program of synthetic static instructions over paged
/// memory, with register-checkpoint speculation and a byte overlay that keeps
/// wrong-path stores out of committed memory.
pub struct SimContext {
    /// Architected registers.
    pub regs: ArchRegs,
    /// Committed memory.
    pub memory: PagedMemory,
    /// Scheduling state.
    pub state: ContextState,
    program: Vec<Arc<StaticInst>>,
    base_pc: u32,
    speculative: bool,
    checkpoint: Option<ArchRegs>,
    /// Wrong-path store bytes, discarded at speculation exit.
    speculative_bytes: HashMap<u32, u8>,
    spec_fill: Arc<StaticInst>,
    nop: Arc<StaticInst>,
}

impl SimContext {
    /// Creates a context executing `program` laid out from `base_pc`.
    pub fn new(program: Vec<Arc<StaticInst>>, base_pc: u32, endianness: Endianness) -> Self {
        Self {
            regs: ArchRegs::at_entry(base_pc),
            memory: PagedMemory::new(endianness),
            state: ContextState::Running,
            program,
            base_pc,
            speculative: false,
            checkpoint: None,
            speculative_bytes: HashMap::new(),
            spec_fill: StaticInst::spec_fill(),
            nop: StaticInst::nop(),
        }
    }

    fn read_word(&mut self, address: u32) -> u32 {
        if self.speculative {
            let mut bytes = [0u8; 4];
            for (i, byte) in bytes.iter_mut().enumerate() {
                let a = address.wrapping_add(i as u32);
                *byte = match self.speculative_bytes.get(&a) {
                    Some(&b) => b,
                    None => self.memory.read_byte_at(a),
                };
            }
            match self.memory.endianness() {
                Endianness::Little => u32::from_le_bytes(bytes),
                Endianness::Big => u32::from_be_bytes(bytes),
            }
        } else {
            self.memory.read_word_at(address)
        }
    }

    fn write_word(&mut self, address: u32, value: u32) {
        if self.speculative {
            let bytes = match self.memory.endianness() {
                Endianness::Little => value.to_le_bytes(),
                Endianness::Big => value.to_be_bytes(),
            };
            for (i, byte) in bytes.iter().enumerate() {
                self.speculative_bytes.insert(address.wrapping_add(i as u32), *byte);
            }
        } else {
            self.memory.write_word_at(address, value);
        }
    }

    fn fpr(&self, index: u32) -> f64 {
        f64::from_bits(self.regs.fpr[index as usize])
    }

    fn set_fpr(&mut self, index: u32, value: f64) {
        self.regs.fpr[index as usize] = value.to_bits();
    }
}

impl Context for SimContext {
    fn state(&self) -> ContextState {
        self.state
    }

    fn regs(&self) -> &ArchRegs {
        &self.regs
    }

    fn regs_mut(&mut self) -> &mut ArchRegs {
        &mut self.regs
    }

    fn speculative(&self) -> bool {
        self.speculative
    }

    fn enter_speculative_state(&mut self) {
        assert!(!self.speculative, "nested speculative state");
        self.checkpoint = Some(self.regs.clone());
        self.speculative_bytes.clear();
        self.speculative = true;
    }

    fn exit_speculative_state(&mut self) {
        let checkpoint = self
            .checkpoint
            .take()
            .expect("exit_speculative_state without checkpoint");
        self.regs = checkpoint;
        self.speculative_bytes.clear();
        self.speculative = false;
    }

    fn decode_next_static_inst(&mut self) -> Arc<StaticInst> {
        self.regs.pc = self.regs.npc;
        let index = self.regs.pc.wrapping_sub(self.base_pc) / 4;
        match self.program.get(index as usize) {
            Some(inst) => Arc::clone(inst),
            None if self.speculative => Arc::clone(&self.spec_fill),
            None => {
                // Fell off the program on the architected path.
                self.state = ContextState::Finished;
                Arc::clone(&self.nop)
            }
        }
    }

    fn execute(&mut self, inst: &StaticInst) -> Option<u32> {
        self.regs.npc = self.regs.nnpc;
        self.regs.nnpc = self.regs.nnpc.wrapping_add(4);

        let gpr = |regs: &ArchRegs, i: u32| regs.gpr[i as usize];

        match inst.op {
            Op::Nop | Op::Bubble => None,
            Op::Halt => {
                if !self.speculative {
                    self.state = ContextState::Finished;
                }
                None
            }
            Op::Add { rd, rs, rt } => {
                let value = gpr(&self.regs, rs).wrapping_add(gpr(&self.regs, rt));
                self.regs.set_gpr(rd, value);
                None
            }
            Op::Addi { rd, rs, imm } => {
                let value = gpr(&self.regs, rs).wrapping_add(imm as i32 as u32);
                self.regs.set_gpr(rd, value);
                None
            }
            Op::Mult { rd, rs, rt } => {
                let value = gpr(&self.regs, rs).wrapping_mul(gpr(&self.regs, rt));
                self.regs.set_gpr(rd, value);
                None
            }
            Op::Div { rd, rs, rt } => {
                let divisor = gpr(&self.regs, rt);
                let value = if divisor == 0 {
                    0
                } else {
                    gpr(&self.regs, rs) / divisor
                };
                self.regs.set_gpr(rd, value);
                None
            }
            Op::FpAdd { fd, fs, ft } => {
                let value = self.fpr(fs) + self.fpr(ft);
                self.set_fpr(fd, value);
                None
            }
            Op::FpCmp { fd, fs, ft } => {
                let value = if self.fpr(fs) < self.fpr(ft) { 1.0 } else { 0.0 };
                self.set_fpr(fd, value);
                None
            }
            Op::FpCvt { fd, fs } => {
                let value = self.fpr(fs).trunc();
                self.set_fpr(fd, value);
                None
            }
            Op::FpMult { fd, fs, ft } => {
                let value = self.fpr(fs) * self.fpr(ft);
                self.set_fpr(fd, value);
                None
            }
            Op::FpDiv { fd, fs, ft } => {
                let value = self.fpr(fs) / self.fpr(ft);
                self.set_fpr(fd, value);
                None
            }
            Op::FpSqrt { fd, fs } => {
                let value = self.fpr(fs).sqrt();
                self.set_fpr(fd, value);
                None
            }
            Op::Lw { rt, base, offset } => {
                let address = gpr(&self.regs, base).wrapping_add(offset as i32 as u32);
                let value = self.read_word(address);
                self.regs.set_gpr(rt, value);
                Some(address)
            }
            Op::Sw { rt, base, offset } => {
                let address = gpr(&self.regs, base).wrapping_add(offset as i32 as u32);
                let value = gpr(&self.regs, rt);
                self.write_word(address, value);
                Some(address)
            }
            Op::Beq { rs, rt, target } => {
                if gpr(&self.regs, rs) == gpr(&self.regs, rt) {
                    self.regs.nnpc = target;
                }
                None
            }
            Op::Bne { rs, rt, target } => {
                if gpr(&self.regs, rs) != gpr(&self.regs, rt) {
                    self.regs.nnpc = target;
                }
                None
            }
            Op::J { target } => {
                self.regs.nnpc = target;
                None
            }
            Op::Jal { target } => {
                // Link past the delay slot.
                let link = self.regs.pc.wrapping_add(8);
                self.regs.set_gpr(crate::common::reg::REGISTER_RA, link);
                self.regs.nnpc = target;
                None
            }
            Op::Jr { rs } => {
                self.regs.nnpc = gpr(&self.regs, rs);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::StaticInst;

    fn run_functional(ctx: &mut SimContext) {
        while ctx.state == ContextState::Running {
            let inst = ctx.decode_next_static_inst();
            if ctx.state != ContextState::Running {
                break;
            }
            ctx.execute(&inst);
        }
    }

    #[test]
    fn test_straight_line_arithmetic() {
        let program = vec![
            StaticInst::addi(1, 0, 5),
            StaticInst::addi(2, 0, 7),
            StaticInst::add(3, 1, 2),
            StaticInst::mult(4, 1, 2),
            StaticInst::div(5, 4, 1),
            StaticInst::halt(),
        ];
        let mut ctx = SimContext::new(program, 0x1000, Endianness::Little);
        run_functional(&mut ctx);
        assert_eq!(ctx.regs.gpr[3], 12);
        assert_eq!(ctx.regs.gpr[4], 35);
        assert_eq!(ctx.regs.gpr[5], 7);
        assert_eq!(ctx.state, ContextState::Finished);
    }

    #[test]
    fn test_zero_register_stays_zero() {
        let program = vec![StaticInst::addi(0, 0, 42), StaticInst::halt()];
        let mut ctx = SimContext::new(program, 0, Endianness::Little);
        run_functional(&mut ctx);
        assert_eq!(ctx.regs.gpr[0], 0);
    }

    #[test]
    fn test_branch_with_delay_slot() {
        // r1 = 2; loop: r1 -= 1; bne r1, r0, loop; nop; r2 = 9; halt
        let program = vec![
            StaticInst::addi(1, 0, 2),
            StaticInst::addi(1, 1, -1),
            StaticInst::bne(1, 0, 0x0004),
            StaticInst::nop(),
            StaticInst::addi(2, 0, 9),
            StaticInst::halt(),
        ];
        let mut ctx = SimContext::new(program, 0, Endianness::Little);
        run_functional(&mut ctx);
        assert_eq!(ctx.regs.gpr[1], 0);
        assert_eq!(ctx.regs.gpr[2], 9);
    }

    #[test]
    fn test_call_and_return() {
        // 0x00 jal 0x18; 0x04 nop (delay); 0x08 addi r2,r0,1; 0x0c halt;
        // 0x10 (pad) nop; 0x14 nop; 0x18 addi r3,r0,7; 0x1c jr r31; 0x20 nop
        let program = vec![
            StaticInst::jal(0x18),
            StaticInst::nop(),
            StaticInst::addi(2, 0, 1),
            StaticInst::halt(),
            StaticInst::nop(),
            StaticInst::nop(),
            StaticInst::addi(3, 0, 7),
            StaticInst::jr(31),
            StaticInst::nop(),
        ];
        let mut ctx = SimContext::new(program, 0, Endianness::Little);
        run_functional(&mut ctx);
        assert_eq!(ctx.regs.gpr[31], 0x08);
        assert_eq!(ctx.regs.gpr[3], 7);
        assert_eq!(ctx.regs.gpr[2], 1);
    }

    #[test]
    fn test_load_store() {
        let program = vec![
            StaticInst::addi(1, 0, 0x100),
            StaticInst::addi(2, 0, 55),
            StaticInst::sw(2, 4, 1),
            StaticInst::lw(3, 4, 1),
            StaticInst::halt(),
        ];
        let mut ctx = SimContext::new(program, 0, Endianness::Little);
        run_functional(&mut ctx);
        assert_eq!(ctx.regs.gpr[3], 55);
        assert_eq!(ctx.memory.read_word_at(0x104), 55);
    }

    #[test]
    fn test_speculative_stores_do_not_touch_memory() {
        let program = vec![
            StaticInst::addi(1, 0, 0x200),
            StaticInst::addi(2, 0, 1),
            StaticInst::halt(),
        ];
        let mut ctx = SimContext::new(program, 0, Endianness::Little);
        ctx.memory.write_word_at(0x200, 11);

        ctx.enter_speculative_state();
        ctx.write_word(0x200, 99);
        assert_eq!(ctx.read_word(0x200), 99);
        ctx.exit_speculative_state();

        assert_eq!(ctx.memory.read_word_at(0x200), 11);
        assert_eq!(ctx.regs.pc, 0);
    }

    #[test]
    fn test_speculation_checkpoint_restores_registers() {
        let program = vec![StaticInst::addi(1, 0, 3), StaticInst::halt()];
        let mut ctx = SimContext::new(program, 0, Endianness::Little);
        ctx.regs.set_gpr(5, 10);
        ctx.enter_speculative_state();
        ctx.regs.set_gpr(5, 20);
        ctx.exit_speculative_state();
        assert_eq!(ctx.regs.gpr[5], 10);
    }
}
