//! Error type shared by the allocator, the page tables and the trace driver.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VmError>;

#[derive(Debug, Error)]
pub enum VmError {
    /// The frame pool cannot satisfy the request. Batch requests reserve nothing.
    #[error("out of memory: requested {requested} frame(s), {available} available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("invalid frame {frame}: pool holds {total} frames")]
    InvalidFrame { frame: usize, total: usize },

    #[error("virtual page {page} is beyond table capacity of {capacity} pages")]
    PageOutOfRange { page: u64, capacity: usize },

    #[error("no mapping for virtual address {address:#010x}")]
    UnmappedPage { address: u64 },

    #[error("malformed trace line {line}: {reason}")]
    MalformedTraceLine { line: usize, reason: String },

    #[error("virtual address {address:#010x} is not aligned to page size {page_size}")]
    MalformedRequest { address: u64, page_size: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VmError {
    /// Attach a line number to a parse failure produced without one.
    pub(crate) fn at_line(self, line: usize) -> Self {
        match self {
            VmError::MalformedTraceLine { reason, .. } => VmError::MalformedTraceLine { line, reason },
            other => other,
        }
    }
}
