//! Trace files: one memory request per line, `T<task>:<hex address>:<size><unit>`.
//!
//! ```text
//! T1:10000040:4KB
//! T2:0x20000000:512B
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use rand::Rng;

use crate::config::Sections;
use crate::constants::*;
use crate::error::{Result, VmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    B,
    KB,
    MB,
}

impl SizeUnit {
    pub fn bytes(self) -> u64 {
        match self {
            SizeUnit::B => 1,
            SizeUnit::KB => KB,
            SizeUnit::MB => MB,
        }
    }

    /// Largest unit that expresses `bytes` as a whole number
    pub fn best_fit(bytes: u64) -> Self {
        if bytes >= MB && bytes % MB == 0 {
            SizeUnit::MB
        } else if bytes >= KB && bytes % KB == 0 {
            SizeUnit::KB
        } else {
            SizeUnit::B
        }
    }
}

impl fmt::Display for SizeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SizeUnit::B => "B",
            SizeUnit::KB => "KB",
            SizeUnit::MB => "MB",
        })
    }
}

/// One recorded memory request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    pub task_id: u32,
    pub virtual_address: u64,
    /// Request size in bytes
    pub size: u64,
}

impl TraceEntry {
    pub fn new(task_id: u32, virtual_address: u64, size: u64) -> Self {
        TraceEntry {
            task_id,
            virtual_address,
            size,
        }
    }

    /// Size in whole KB, rounded up
    pub fn size_kb(&self) -> u64 {
        self.size.div_ceil(KB)
    }
}

fn malformed(reason: impl Into<String>) -> VmError {
    VmError::MalformedTraceLine {
        line: 0,
        reason: reason.into(),
    }
}

fn parse_size(token: &str) -> Result<u64> {
    let split = token
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| malformed(format!("size {token:?} has no unit")))?;
    let (digits, unit) = token.split_at(split);
    let unit = match unit {
        "B" => SizeUnit::B,
        "KB" => SizeUnit::KB,
        "MB" => SizeUnit::MB,
        _ => return Err(malformed(format!("unrecognized size unit {unit:?}"))),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| malformed(format!("invalid size {token:?}")))?;
    value
        .checked_mul(unit.bytes())
        .ok_or_else(|| malformed(format!("size {token:?} overflows")))
}

impl FromStr for TraceEntry {
    type Err = VmError;

    /// Parse one line. Errors carry line number 0; [`parse_trace`] fills it in.
    fn from_str(line: &str) -> Result<Self> {
        let mut fields = line.trim().split(':');
        let (Some(task), Some(address), Some(size), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed("expected T<task>:<address>:<size>"));
        };

        let task_id = task
            .strip_prefix('T')
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| malformed(format!("invalid task id {task:?}")))?;

        let hex = address
            .strip_prefix("0x")
            .or_else(|| address.strip_prefix("0X"))
            .unwrap_or(address);
        let virtual_address = u64::from_str_radix(hex, 16)
            .map_err(|_| malformed(format!("invalid virtual address {address:?}")))?;

        Ok(TraceEntry {
            task_id,
            virtual_address,
            size: parse_size(size)?,
        })
    }
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = SizeUnit::best_fit(self.size);
        write!(
            f,
            "T{}:{:x}:{}{}",
            self.task_id,
            self.virtual_address,
            self.size / unit.bytes(),
            unit
        )
    }
}

/// Parse every non-blank line. A bad line yields an error for that line only.
pub fn parse_trace(content: &str) -> Vec<Result<TraceEntry>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| line.parse::<TraceEntry>().map_err(|e| e.at_line(i + 1)))
        .collect()
}

pub fn read_trace<P: AsRef<Path>>(path: P) -> Result<Vec<Result<TraceEntry>>> {
    let content = fs::read_to_string(path.as_ref())?;
    Ok(parse_trace(&content))
}

pub fn write_trace<P: AsRef<Path>>(path: P, entries: &[TraceEntry]) -> Result<()> {
    let content: String = entries.iter().map(|e| format!("{e}\n")).collect();
    fs::write(path.as_ref(), content)?;
    Ok(())
}

/// Random trace writer: for every task and every section, 1 to 10 requests
/// of 1 to 10 pages each at page-aligned addresses inside the section.
pub struct TraceGenerator<'a, R: Rng> {
    sections: &'a Sections,
    page_size: u64,
    rng: R,
}

impl<'a, R: Rng> TraceGenerator<'a, R> {
    pub fn new(sections: &'a Sections, page_size: u64, rng: R) -> Self {
        TraceGenerator {
            sections,
            page_size,
            rng,
        }
    }

    /// Requests for tasks `1..=num_tasks`, grouped by task
    pub fn generate(&mut self, num_tasks: u32) -> Vec<TraceEntry> {
        let mut entries = Vec::new();
        for task_id in 1..=num_tasks {
            for (_, section) in self.sections.iter() {
                let slots = (section.size / self.page_size).max(1);
                let allocations = self.rng.gen_range(1..=MAX_ALLOCATIONS_PER_SECTION);
                for _ in 0..allocations {
                    let page = self.rng.gen_range(0..slots);
                    let pages = self.rng.gen_range(1..=MAX_PAGES_PER_ALLOCATION);
                    entries.push(TraceEntry::new(
                        task_id,
                        section.base + page * self.page_size,
                        pages * self.page_size,
                    ));
                }
            }
        }
        entries
    }
}
