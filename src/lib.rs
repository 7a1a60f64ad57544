pub mod address;
pub mod config;
pub mod constants;
pub mod error;
pub mod memory;
pub mod multilevel;
pub mod page_table;
pub mod session;
pub mod trace;

// Re-export commonly used items for convenience
pub use address::{AddressLayout, PageRange, VirtualAddress};
pub use config::{SimConfig, TableKind};
pub use error::{Result, VmError};
pub use memory::{Frame, FrameAllocator};
pub use multilevel::{HierarchicalPageTable, Snapshot};
pub use page_table::{PageMap, RequestOutcome, TaskPageTable};
pub use session::{Session, SessionStats};
pub use trace::{TraceEntry, TraceGenerator};
