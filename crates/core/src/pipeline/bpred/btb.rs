//! Branch target buffer (BTB).
//!
//! Set-associative cache of resolved control-flow targets. Fetch asks it for
//! the target of a just-decoded control instruction before the instruction
//! resolves; commit installs the actual target of taken branches. Sets are
//! replaced least-recently-used, with recency tracked by a shared access
//! clock.

/// One way of a BTB set: the full PC of a control instruction and the
/// target it last resolved to.
struct BtbWay {
    pc: u32,
    target: u32,
    /// Access-clock stamp of the most recent hit or install.
    stamp: u64,
}

/// Set-associative branch target buffer with LRU replacement.
pub struct Btb {
    /// `num_sets` sets, each holding up to `assoc` ways.
    sets: Vec<Vec<BtbWay>>,
    assoc: usize,
    clock: u64,
}

impl Btb {
    /// Creates a BTB with `num_sets` sets (a power of two) of `assoc` ways.
    pub fn new(num_sets: usize, assoc: usize) -> Self {
        assert!(num_sets.is_power_of_two(), "BTB set count {num_sets} not a power of two");
        assert!(assoc > 0, "BTB associativity must be positive");
        let mut sets = Vec::with_capacity(num_sets);
        sets.resize_with(num_sets, || Vec::with_capacity(assoc));
        Self {
            sets,
            assoc,
            clock: 0,
        }
    }

    fn set_for(&mut self, pc: u32) -> &mut Vec<BtbWay> {
        let index = ((pc >> 2) as usize) & (self.sets.len() - 1);
        &mut self.sets[index]
    }

    /// The recorded target for the control instruction at `pc`, if any.
    /// A hit refreshes the way's recency.
    pub fn lookup(&mut self, pc: u32) -> Option<u32> {
        self.clock += 1;
        let stamp = self.clock;
        let way = self.set_for(pc).iter_mut().find(|w| w.pc == pc)?;
        way.stamp = stamp;
        Some(way.target)
    }

    /// Records the resolved target for `pc`, filling an empty way or
    /// evicting the least recently used one.
    pub fn update(&mut self, pc: u32, target: u32) {
        self.clock += 1;
        let stamp = self.clock;
        let assoc = self.assoc;
        let set = self.set_for(pc);

        if let Some(way) = set.iter_mut().find(|w| w.pc == pc) {
            way.target = target;
            way.stamp = stamp;
            return;
        }

        let way = BtbWay { pc, target, stamp };
        if set.len() < assoc {
            set.push(way);
        } else if let Some(victim) = set.iter_mut().min_by_key(|w| w.stamp) {
            *victim = way;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let mut btb = Btb::new(64, 4);
        assert_eq!(btb.lookup(0x1000), None);
        btb.update(0x1000, 0x2000);
        assert_eq!(btb.lookup(0x1000), Some(0x2000));
    }

    #[test]
    fn test_update_overwrites_target() {
        let mut btb = Btb::new(64, 4);
        btb.update(0x1000, 0x2000);
        btb.update(0x1000, 0x3000);
        assert_eq!(btb.lookup(0x1000), Some(0x3000));
    }

    #[test]
    fn test_aliasing_branches_share_a_set() {
        let mut btb = Btb::new(64, 2);
        // Same set index (stride = num_sets * 4), distinct PCs.
        let a = 0x1000;
        let b = a + 64 * 4;
        btb.update(a, 0x111);
        btb.update(b, 0x222);
        assert_eq!(btb.lookup(a), Some(0x111));
        assert_eq!(btb.lookup(b), Some(0x222));
    }

    #[test]
    fn test_lru_eviction_within_set() {
        let mut btb = Btb::new(64, 2);
        let a = 0x1000;
        let b = a + 64 * 4;
        let c = b + 64 * 4;
        btb.update(a, 0x111);
        btb.update(b, 0x222);
        // Touch a so b becomes the LRU victim.
        assert_eq!(btb.lookup(a), Some(0x111));
        btb.update(c, 0x333);
        assert_eq!(btb.lookup(b), None);
        assert_eq!(btb.lookup(a), Some(0x111));
        assert_eq!(btb.lookup(c), Some(0x333));
    }
}
