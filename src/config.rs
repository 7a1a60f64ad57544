//! Simulation configuration.
//!
//! Every field has a default taken from [`crate::constants`], so a TOML file
//! only needs the keys it overrides:
//!
//! ```toml
//! page_size_kb = 4
//! physical_memory_size = 65536
//! table = "hierarchical"
//!
//! [sections.heap]
//! base = 0x60000000
//! size = 2097152
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::address::AddressLayout;
use crate::constants::*;
use crate::error::{Result, VmError};

/// Page table structure used for every task of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Flat,
    #[default]
    Sparse,
    Hierarchical,
}

/// One region of a task's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Section {
    pub base: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Sections {
    pub text: Section,
    pub data: Section,
    pub stack: Section,
    pub shared_lib: Section,
    pub heap: Section,
}

impl Sections {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Section)> {
        [
            ("text", &self.text),
            ("data", &self.data),
            ("stack", &self.stack),
            ("shared_lib", &self.shared_lib),
            ("heap", &self.heap),
        ]
        .into_iter()
    }
}

impl Default for Sections {
    fn default() -> Self {
        Sections {
            text: Section { base: TEXT_SECTION_START, size: TEXT_SECTION_SIZE },
            data: Section { base: DATA_SECTION_START, size: DATA_SECTION_SIZE },
            stack: Section { base: STACK_SECTION_START, size: STACK_SECTION_SIZE },
            shared_lib: Section { base: SHARED_LIB_SECTION_START, size: SHARED_LIB_SECTION_SIZE },
            heap: Section { base: HEAP_SECTION_START, size: HEAP_SECTION_SIZE },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub page_size_kb: u64,
    pub virtual_memory_size: u64,
    pub physical_memory_size: u64,
    pub single_level_entries: usize,
    pub top_level_entries: usize,
    pub second_level_entries: usize,
    pub table: TableKind,
    pub sections: Sections,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            page_size_kb: DEFAULT_PAGE_SIZE_KB,
            virtual_memory_size: VIRTUAL_MEMORY_SIZE,
            physical_memory_size: PHYSICAL_MEMORY_SIZE,
            single_level_entries: SINGLE_LEVEL_ENTRIES,
            top_level_entries: TOP_LEVEL_ENTRIES,
            second_level_entries: SECOND_LEVEL_ENTRIES,
            table: TableKind::default(),
            sections: Sections::default(),
        }
    }
}

impl SimConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !PAGE_SIZES_KB.contains(&self.page_size_kb) {
            return Err(VmError::InvalidConfig(format!(
                "page size {} KB is not one of {:?}",
                self.page_size_kb, PAGE_SIZES_KB
            )));
        }
        let page_size = self.page_size();
        if self.physical_memory_size == 0 || self.physical_memory_size % page_size != 0 {
            return Err(VmError::InvalidConfig(format!(
                "physical memory size {} is not a positive multiple of the page size {}",
                self.physical_memory_size, page_size
            )));
        }
        if self.single_level_entries == 0 {
            return Err(VmError::InvalidConfig(
                "single-level table needs at least one entry".to_string(),
            ));
        }
        for (name, entries) in [
            ("top-level", self.top_level_entries),
            ("second-level", self.second_level_entries),
        ] {
            if !entries.is_power_of_two() {
                return Err(VmError::InvalidConfig(format!(
                    "{name} entry count {entries} is not a power of two"
                )));
            }
        }
        if let Some((name, section)) = self.sections.iter().find(|(_, s)| s.size < page_size) {
            return Err(VmError::InvalidConfig(format!(
                "section {name} is {} bytes, smaller than one page",
                section.size
            )));
        }
        if !self.virtual_memory_size.is_power_of_two() || self.virtual_memory_size < page_size {
            return Err(VmError::InvalidConfig(format!(
                "virtual memory size {} is not a power of two of at least one page",
                self.virtual_memory_size
            )));
        }
        for (name, section) in self.sections.iter() {
            let end = section.base.checked_add(section.size);
            if end.is_none_or(|end| end > self.virtual_memory_size) {
                return Err(VmError::InvalidConfig(format!(
                    "section {name} at {:#x} does not fit in {:#x} bytes of virtual memory",
                    section.base, self.virtual_memory_size
                )));
            }
        }
        let layout = self.layout();
        let span = 1u128.checked_shl(layout.address_bits()).unwrap_or(u128::MAX);
        if span < u128::from(self.virtual_memory_size) {
            return Err(VmError::InvalidConfig(format!(
                "{} top-level x {} second-level entries of {page_size}-byte pages cover {} address bits, \
                 less than the {} bytes of virtual memory",
                self.top_level_entries,
                self.second_level_entries,
                layout.address_bits(),
                self.virtual_memory_size
            )));
        }
        Ok(())
    }

    /// Page size in bytes
    #[inline]
    pub fn page_size(&self) -> u64 {
        self.page_size_kb * KB
    }

    pub fn num_frames(&self) -> usize {
        (self.physical_memory_size / self.page_size()) as usize
    }

    /// Bit widths for the hierarchical table, derived from the entry counts
    /// and the page size. [`SimConfig::validate`] checks that they span the
    /// whole virtual memory, so no two sections share a table entry.
    pub fn layout(&self) -> AddressLayout {
        AddressLayout::new(
            self.top_level_entries.trailing_zeros(),
            self.second_level_entries.trailing_zeros(),
            self.page_size().trailing_zeros(),
        )
    }
}
