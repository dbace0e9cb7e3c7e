//! Branch prediction.
//!
//! The pipeline requires only determinism given equal history: `predict`
//! supplies a next-next-PC guess and a return-address-stack snapshot at
//! fetch, `update` trains the tables at commit. The implementation is a
//! two-bit direction table, a set-associative BTB, and a recoverable RAS.
//!
//! Control flow is two-step: a branch at `pc` redirects the PC *after* the
//! instruction at `pc + 4`, so the not-taken path continues at `pc + 8`.

pub mod btb;
pub mod ras;

pub use btb::Btb;
pub use ras::ReturnAddressStack;

use crate::isa::{Mnemonic, StaticInstType};

/// Token filled at prediction time and consumed by the commit-time update.
#[derive(Clone, Copy, Debug, Default)]
pub struct BranchPredictorUpdate {
    /// Direction-table entry consulted, for conditional branches.
    pub counter_index: Option<usize>,
    /// Direction the table predicted.
    pub predicted_taken: bool,
}

/// Two-bit direction table + BTB + RAS branch predictor.
pub struct BranchPredictor {
    /// Saturating two-bit counters; >= 2 predicts taken.
    counters: Vec<u8>,
    btb: Btb,
    /// Return address stack; commit restores its top on misprediction.
    pub return_address_stack: ReturnAddressStack,
}

impl BranchPredictor {
    /// Creates a predictor with `size` direction counters (power of two),
    /// a BTB of `btb_num_sets` sets of `btb_assoc` ways, and `ras_size`
    /// return-address slots.
    pub fn new(size: usize, btb_num_sets: usize, btb_assoc: usize, ras_size: usize) -> Self {
        assert!(size.is_power_of_two(), "direction table size {size} not a power of two");
        Self {
            // Weakly taken out of reset.
            counters: vec![2; size],
            btb: Btb::new(btb_num_sets, btb_assoc),
            return_address_stack: ReturnAddressStack::new(ras_size),
        }
    }

    fn counter_index(&self, pc: u32) -> usize {
        ((pc >> 2) as usize) & (self.counters.len() - 1)
    }

    /// Predicts the next-next PC for the control instruction at `pc` and
    /// returns it together with the RAS top snapshot taken before any
    /// speculative push or pop.
    pub fn predict(&mut self, pc: u32, mnemonic: &Mnemonic, update: &mut BranchPredictorUpdate) -> (u32, u32) {
        let recover_top = self.return_address_stack.top();
        let fallthrough = pc.wrapping_add(8);

        let predicted_nnpc = match mnemonic.inst_type {
            StaticInstType::FuncRet => self.return_address_stack.pop(),
            StaticInstType::FuncCall => {
                self.return_address_stack.push(fallthrough);
                self.btb.lookup(pc).unwrap_or(fallthrough)
            }
            StaticInstType::Uncond => self.btb.lookup(pc).unwrap_or(fallthrough),
            StaticInstType::Cond => {
                let index = self.counter_index(pc);
                let taken = self.counters[index] >= 2;
                update.counter_index = Some(index);
                update.predicted_taken = taken;
                if taken {
                    self.btb.lookup(pc).unwrap_or(fallthrough)
                } else {
                    fallthrough
                }
            }
            _ => fallthrough,
        };

        (predicted_nnpc, recover_top)
    }

    /// Trains the tables with the committed outcome of the control
    /// instruction at `pc`.
    pub fn update(
        &mut self,
        pc: u32,
        nnpc: u32,
        taken: bool,
        _correct: bool,
        mnemonic: &Mnemonic,
        update: &BranchPredictorUpdate,
    ) {
        if let Some(index) = update.counter_index {
            if taken {
                if self.counters[index] < 3 {
                    self.counters[index] += 1;
                }
            } else if self.counters[index] > 0 {
                self.counters[index] -= 1;
            }
        }

        if taken && mnemonic.inst_type != StaticInstType::FuncRet {
            self.btb.update(pc, nnpc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictor() -> BranchPredictor {
        BranchPredictor::new(1024, 128, 4, 16)
    }

    #[test]
    fn test_cond_learns_taken_target() {
        let mut bp = predictor();
        let pc = 0x40;
        let target = 0x10;

        let mut update = BranchPredictorUpdate::default();
        let (first, _) = bp.predict(pc, &Mnemonic::BNE, &mut update);
        // No BTB entry yet: prediction falls through past the delay slot.
        assert_eq!(first, pc + 8);

        bp.update(pc, target, true, false, &Mnemonic::BNE, &update);
        bp.update(pc, target, true, true, &Mnemonic::BNE, &update);

        let mut update = BranchPredictorUpdate::default();
        let (trained, _) = bp.predict(pc, &Mnemonic::BNE, &mut update);
        assert_eq!(trained, target);
        assert!(update.predicted_taken);
    }

    #[test]
    fn test_cond_learns_not_taken() {
        let mut bp = predictor();
        let pc = 0x80;
        let mut update = BranchPredictorUpdate::default();
        bp.predict(pc, &Mnemonic::BEQ, &mut update);
        bp.update(pc, pc + 8, false, true, &Mnemonic::BEQ, &update);
        bp.update(pc, pc + 8, false, true, &Mnemonic::BEQ, &update);

        let mut update = BranchPredictorUpdate::default();
        let (predicted, _) = bp.predict(pc, &Mnemonic::BEQ, &mut update);
        assert!(!update.predicted_taken);
        assert_eq!(predicted, pc + 8);
    }

    #[test]
    fn test_call_return_pair() {
        let mut bp = predictor();
        let call_pc = 0x100;
        let return_pc = 0x200;

        let mut update = BranchPredictorUpdate::default();
        bp.predict(call_pc, &Mnemonic::JAL, &mut update);

        let mut update = BranchPredictorUpdate::default();
        let (predicted, _) = bp.predict(return_pc, &Mnemonic::JR, &mut update);
        assert_eq!(predicted, call_pc + 8);
    }

    #[test]
    fn test_recover_top_undoes_call() {
        let mut bp = predictor();
        let mut update = BranchPredictorUpdate::default();
        let (_, top_before) = bp.predict(0x100, &Mnemonic::JAL, &mut update);
        bp.return_address_stack.recover(top_before);

        // The speculative push is gone: a return now pops whatever was
        // below, not 0x108.
        let mut update = BranchPredictorUpdate::default();
        let (predicted, _) = bp.predict(0x300, &Mnemonic::JR, &mut update);
        assert_ne!(predicted, 0x108);
    }
}
