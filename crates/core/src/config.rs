//! Simulator configuration.
//!
//! This module defines the configuration structures used to parameterize the
//! core. It provides:
//! 1. **Defaults:** Baseline capacities and widths for the pipeline and the
//!    fixed-latency cache model.
//! 2. **Structures:** `CpuConfig` and the nested `CacheConfig`, both
//!    deserializable from JSON with per-field defaults.

use serde::Deserialize;

/// Default configuration constants.
mod defaults {
    /// Physical registers per class file.
    pub const PHYSICAL_REGISTER_FILE_SIZE: usize = 128;

    /// Decode buffer capacity (fetched, not yet renamed).
    pub const DECODE_BUFFER_SIZE: usize = 96;

    /// Reorder buffer capacity (in-flight window).
    pub const REORDER_BUFFER_SIZE: usize = 96;

    /// Load/store queue capacity.
    pub const LOAD_STORE_QUEUE_SIZE: usize = 48;

    /// Instructions renamed per cycle.
    pub const DECODE_WIDTH: usize = 4;

    /// Reorder entries dispatched onto the issue queues per cycle.
    pub const DISPATCH_WIDTH: usize = 4;

    /// Successful issues per cycle across the three ready queues.
    pub const ISSUE_WIDTH: usize = 4;

    /// Instructions retired per cycle.
    pub const COMMIT_WIDTH: usize = 4;

    /// Two-bit direction counters in the branch predictor (power of two).
    pub const BRANCH_PREDICTOR_SIZE: usize = 2048;

    /// Branch target buffer sets (power of two).
    pub const BTB_NUM_SETS: usize = 128;

    /// Branch target buffer ways per set.
    pub const BTB_ASSOC: usize = 4;

    /// Return address stack slots (power of two).
    pub const RETURN_ADDRESS_STACK_SIZE: usize = 16;

    /// I-cache line size in bytes; fetch stops at line boundaries.
    pub const CACHE_LINE_SIZE: u32 = 64;

    /// Cycles for an instruction line fill.
    pub const IFETCH_LATENCY: u64 = 1;

    /// Cycles from load issue to data return.
    pub const LOAD_LATENCY: u64 = 2;

    /// Cycles from store issue to acknowledgement.
    pub const STORE_LATENCY: u64 = 2;
}

/// Fixed-latency cache model parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Line size in bytes; fetch stops at line boundaries.
    pub line_size: u32,
    /// Cycles for an instruction line fill.
    pub ifetch_latency: u64,
    /// Cycles from load issue to data return.
    pub load_latency: u64,
    /// Cycles from store issue to acknowledgement.
    pub store_latency: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            line_size: defaults::CACHE_LINE_SIZE,
            ifetch_latency: defaults::IFETCH_LATENCY,
            load_latency: defaults::LOAD_LATENCY,
            store_latency: defaults::STORE_LATENCY,
        }
    }
}

/// Core configuration: every capacity and width the pipeline consumes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CpuConfig {
    /// Physical registers per class file.
    pub physical_register_file_size: usize,
    /// Decode buffer capacity.
    pub decode_buffer_size: usize,
    /// Reorder buffer capacity.
    pub reorder_buffer_size: usize,
    /// Load/store queue capacity.
    pub load_store_queue_size: usize,
    /// Instructions renamed per cycle.
    pub decode_width: usize,
    /// Reorder entries dispatched onto the issue queues per cycle.
    pub dispatch_width: usize,
    /// Successful issues per cycle.
    pub issue_width: usize,
    /// Instructions retired per cycle.
    pub commit_width: usize,
    /// Branch predictor direction-table size.
    pub branch_predictor_size: usize,
    /// Branch target buffer sets.
    pub btb_num_sets: usize,
    /// Branch target buffer ways per set.
    pub btb_assoc: usize,
    /// Return address stack slots.
    pub return_address_stack_size: usize,
    /// Cache model parameters.
    pub cache: CacheConfig,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            physical_register_file_size: defaults::PHYSICAL_REGISTER_FILE_SIZE,
            decode_buffer_size: defaults::DECODE_BUFFER_SIZE,
            reorder_buffer_size: defaults::REORDER_BUFFER_SIZE,
            load_store_queue_size: defaults::LOAD_STORE_QUEUE_SIZE,
            decode_width: defaults::DECODE_WIDTH,
            dispatch_width: defaults::DISPATCH_WIDTH,
            issue_width: defaults::ISSUE_WIDTH,
            commit_width: defaults::COMMIT_WIDTH,
            branch_predictor_size: defaults::BRANCH_PREDICTOR_SIZE,
            btb_num_sets: defaults::BTB_NUM_SETS,
            btb_assoc: defaults::BTB_ASSOC,
            return_address_stack_size: defaults::RETURN_ADDRESS_STACK_SIZE,
            cache: CacheConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CpuConfig::default();
        assert_eq!(config.physical_register_file_size, 128);
        assert_eq!(config.reorder_buffer_size, 96);
        assert_eq!(config.issue_width, 4);
        assert_eq!(config.dispatch_width, 4);
        assert_eq!(config.btb_num_sets, 128);
        assert_eq!(config.btb_assoc, 4);
        assert_eq!(config.cache.line_size, 64);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: CpuConfig = serde_json::from_str(
            r#"{ "reorder_buffer_size": 32, "cache": { "load_latency": 7 } }"#,
        )
        .unwrap();
        assert_eq!(config.reorder_buffer_size, 32);
        assert_eq!(config.cache.load_latency, 7);
        // Untouched fields fall back to defaults.
        assert_eq!(config.commit_width, 4);
        assert_eq!(config.cache.line_size, 64);
    }
}
