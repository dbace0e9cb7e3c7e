//! Cache controller seam.
//!
//! The pipeline touches the memory hierarchy only through this trait: line
//! geometry for fetch gating, and latencies for instruction fills, loads,
//! and stores. Completions are modelled by the caller scheduling an event at
//! `now + latency`, which keeps cancellation squash-safe (the event checks
//! its entry's sequence number instead of being removed from the queue).

use crate::config::CacheConfig;

/// Interface the core uses to reach the memory hierarchy.
pub trait CacheController {
    /// Cache line size in bytes.
    fn line_size(&self) -> u32;

    /// Line-aligned tag of an address.
    fn tag(&self, address: u32) -> u32 {
        address & !(self.line_size() - 1)
    }

    /// True if an instruction fill for `pc` can be accepted this cycle.
    fn can_ifetch(&mut self, thread: usize, pc: u32) -> bool;

    /// Starts an instruction line fill; returns the cycles until the line
    /// is available.
    fn ifetch(&mut self, thread: usize, pc: u32) -> u64;

    /// Starts a load; returns the cycles until the data returns.
    fn load(&mut self, thread: usize, address: u32) -> u64;

    /// Starts a store; returns the cycles until the acknowledgement.
    fn store(&mut self, thread: usize, address: u32) -> u64;

    /// Commit-watchdog hook: dump pending request state for diagnosis.
    fn dump_pending_flows(&mut self) {}
}

/// Fixed-latency stand-in for the cache hierarchy.
pub struct FixedLatencyCache {
    line_size: u32,
    ifetch_latency: u64,
    load_latency: u64,
    store_latency: u64,
}

impl FixedLatencyCache {
    /// Builds the model from the cache section of the configuration.
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.line_size.is_power_of_two(),
            "cache line size {} not a power of two",
            config.line_size
        );
        Self {
            line_size: config.line_size,
            ifetch_latency: config.ifetch_latency,
            load_latency: config.load_latency,
            store_latency: config.store_latency,
        }
    }
}

impl CacheController for FixedLatencyCache {
    fn line_size(&self) -> u32 {
        self.line_size
    }

    fn can_ifetch(&mut self, _thread: usize, _pc: u32) -> bool {
        true
    }

    fn ifetch(&mut self, _thread: usize, _pc: u32) -> u64 {
        self.ifetch_latency
    }

    fn load(&mut self, _thread: usize, _address: u32) -> u64 {
        self.load_latency
    }

    fn store(&mut self, _thread: usize, _address: u32) -> u64 {
        self.store_latency
    }
}
