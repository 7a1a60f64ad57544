pub const KB: u64 = 1024;
pub const MB: u64 = 1024 * KB;

/// Page sizes the simulator accepts, in KB.
pub const PAGE_SIZES_KB: [u64; 6] = [1, 2, 4, 8, 16, 32];
pub const DEFAULT_PAGE_SIZE_KB: u64 = 1;

// Span of a task's address space; every section must end inside it.
pub const VIRTUAL_MEMORY_SIZE: u64 = 1 << 32;
pub const PHYSICAL_MEMORY_SIZE: u64 = 1 << 23;

pub const SINGLE_LEVEL_ENTRIES: usize = 1024;
// With the default 1 KB page these cover 12 + 10 + 10 = 32 address bits.
pub const TOP_LEVEL_ENTRIES: usize = 4096;
pub const SECOND_LEVEL_ENTRIES: usize = 1024;

// Two-level layout of a 32-bit address: | top: 10 | second: 10 | offset: 12 |
pub const TOP_BITS: u32 = 10;
pub const SECOND_BITS: u32 = 10;
pub const OFFSET_BITS: u32 = 12;

pub const TEXT_SECTION_START: u64 = 0x1000_0000;
pub const DATA_SECTION_START: u64 = 0x2000_0000;
pub const STACK_SECTION_START: u64 = 0x3000_0000;
pub const SHARED_LIB_SECTION_START: u64 = 0x4000_0000;
pub const HEAP_SECTION_START: u64 = 0x5000_0000;

pub const TEXT_SECTION_SIZE: u64 = 1 << 20;
pub const DATA_SECTION_SIZE: u64 = 1 << 20;
pub const STACK_SECTION_SIZE: u64 = 1 << 20;
pub const SHARED_LIB_SECTION_SIZE: u64 = 1 << 20;
pub const HEAP_SECTION_SIZE: u64 = 1 << 20;

// Trace generator: allocations per section and pages per allocation.
pub const MAX_ALLOCATIONS_PER_SECTION: u32 = 10;
pub const MAX_PAGES_PER_ALLOCATION: u64 = 10;
