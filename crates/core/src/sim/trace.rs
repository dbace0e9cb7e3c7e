//! Memory trace files.
//!
//! Plain-text traces drive the memory side of the simulator without a
//! program: one record per line, comma-separated hexadecimal fields
//! `threadId, pc, R|W, effectiveAddress`. A record whose first field is
//! empty is skipped. I/O and parse failures are fatal to the run.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Direction of a traced memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraceAccess {
    /// Load.
    Read,
    /// Store.
    Write,
}

/// One memory access from a trace file.
#[derive(Clone, Copy, Debug)]
pub struct TraceRecord {
    /// Originating thread.
    pub thread_id: u32,
    /// PC of the access.
    pub pc: u64,
    /// Load or store.
    pub access: TraceAccess,
    /// Accessed virtual address.
    pub effective_address: u64,
}

/// Trace-file reading failures.
#[derive(Debug)]
pub enum TraceError {
    /// The file could not be read.
    Io(std::io::Error),
    /// A line did not match the record format.
    Parse {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        reason: String,
    },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Io(e) => write!(f, "trace I/O error: {e}"),
            TraceError::Parse { line, reason } => write!(f, "trace line {line}: {reason}"),
        }
    }
}

impl std::error::Error for TraceError {}

impl From<std::io::Error> for TraceError {
    fn from(e: std::io::Error) -> Self {
        TraceError::Io(e)
    }
}

/// Reads every record of a trace file.
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceRecord>, TraceError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let number = index + 1;
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();

        if parts.first().is_none_or(|p| p.is_empty()) {
            continue;
        }
        if parts.len() != 4 {
            return Err(TraceError::Parse {
                line: number,
                reason: format!("expected 4 fields, found {}", parts.len()),
            });
        }

        let hex = |field: &str, what: &str| {
            u64::from_str_radix(field, 16).map_err(|e| TraceError::Parse {
                line: number,
                reason: format!("bad {what} field {field:?}: {e}"),
            })
        };

        let thread_id = hex(parts[0], "thread id")? as u32;
        let pc = hex(parts[1], "pc")?;
        let access = match parts[2] {
            "R" => TraceAccess::Read,
            "W" => TraceAccess::Write,
            other => {
                return Err(TraceError::Parse {
                    line: number,
                    reason: format!("bad access field {other:?}, expected R or W"),
                });
            }
        };
        let effective_address = hex(parts[3], "effective address")?;

        records.push(TraceRecord {
            thread_id,
            pc,
            access,
            effective_address,
        });
    }

    Ok(records)
}

/// Replays a trace at a fixed pace: one record every `interval` cycles.
pub struct TraceTrafficGenerator {
    records: Vec<TraceRecord>,
    position: usize,
    interval: u64,
}

impl TraceTrafficGenerator {
    /// Wraps a record list with the given injection interval (cycles).
    pub fn new(records: Vec<TraceRecord>, interval: u64) -> Self {
        assert!(interval > 0, "injection interval must be positive");
        Self {
            records,
            position: 0,
            interval,
        }
    }

    /// Records not yet injected.
    pub fn remaining(&self) -> usize {
        self.records.len() - self.position
    }

    /// Called once per cycle; yields the next record on injection cycles.
    pub fn advance_one_cycle(&mut self, cycle: u64) -> Option<TraceRecord> {
        if cycle % self.interval != 0 || self.position >= self.records.len() {
            return None;
        }
        let record = self.records[self.position];
        self.position += 1;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_paces_records() {
        let record = TraceRecord {
            thread_id: 0,
            pc: 0x400000,
            access: TraceAccess::Read,
            effective_address: 0x1000,
        };
        let mut generator = TraceTrafficGenerator::new(vec![record; 3], 100);

        assert!(generator.advance_one_cycle(0).is_some());
        assert!(generator.advance_one_cycle(1).is_none());
        assert!(generator.advance_one_cycle(99).is_none());
        assert!(generator.advance_one_cycle(100).is_some());
        assert!(generator.advance_one_cycle(200).is_some());
        assert!(generator.advance_one_cycle(300).is_none());
        assert_eq!(generator.remaining(), 0);
    }
}
