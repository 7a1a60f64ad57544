//! Two-level page table: a directory of second-level tables, each mapping
//! second-level indices to frames.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use log::debug;

use crate::address::{AddressLayout, PageRange};
use crate::error::{Result, VmError};
use crate::memory::{Frame, FrameAllocator};

type SecondLevelTable = BTreeMap<usize, Frame>;

#[derive(Debug, Clone, Default)]
pub struct HierarchicalPageTable {
    layout: AddressLayout,
    directory: BTreeMap<usize, SecondLevelTable>,
    accessed: HashSet<u64>,
    page_hits: u64,
}

impl HierarchicalPageTable {
    pub fn new(layout: AddressLayout) -> Self {
        HierarchicalPageTable {
            layout,
            directory: BTreeMap::new(),
            accessed: HashSet::new(),
            page_hits: 0,
        }
    }

    pub fn layout(&self) -> AddressLayout {
        self.layout
    }

    pub fn page_size(&self) -> u64 {
        self.layout.page_size()
    }

    /// Frame mapped for the page holding `virtual_address`, without side effects
    pub fn lookup(&self, virtual_address: u64) -> Option<Frame> {
        let va = self.layout.decompose(virtual_address);
        self.directory.get(&va.top)?.get(&va.second).copied()
    }

    /// Translate to a physical address.
    ///
    /// Hits are counted per exact virtual address, not per page: the first
    /// translation of an address records it, later ones count as hits.
    pub fn translate(&mut self, virtual_address: u64) -> Result<u64> {
        let va = self.layout.decompose(virtual_address);
        let frame = self
            .lookup(virtual_address)
            .ok_or(VmError::UnmappedPage {
                address: virtual_address,
            })?;

        if !self.accessed.insert(virtual_address) {
            self.page_hits += 1;
        }
        Ok(self.layout.compose(frame, va.offset))
    }

    /// Map the page holding `virtual_address` to `frame`, creating its
    /// second-level table if needed. Returns the frame previously mapped there.
    pub fn map_address(&mut self, virtual_address: u64, frame: Frame) -> Option<Frame> {
        let va = self.layout.decompose(virtual_address);
        debug!("map {va} -> frame {frame}");
        self.directory
            .entry(va.top)
            .or_default()
            .insert(va.second, frame)
    }

    /// Reserve `ceil(size / page_size)` frames in one batch and map them to
    /// consecutive pages from `virtual_address`.
    ///
    /// Frames displaced by remapping an already mapped page go back to `frames`.
    pub fn allocate_and_map(
        &mut self,
        frames: &mut FrameAllocator,
        virtual_address: u64,
        size: u64,
    ) -> Result<Vec<Frame>> {
        let page_size = self.page_size();
        let range = PageRange::new(virtual_address, size, page_size);
        let allocated = frames.allocate_many(range.count as usize)?;

        let mut displaced = Vec::new();
        for (i, &frame) in allocated.iter().enumerate() {
            let address = virtual_address + i as u64 * page_size;
            displaced.extend(self.map_address(address, frame));
        }
        frames.free_many(&displaced)?;
        Ok(allocated)
    }

    /// Map every page covering `size` bytes from `virtual_address` that is
    /// not mapped yet, reserving the frames in one batch. Pages already mapped
    /// keep their frames. Returns the frames newly mapped.
    pub fn map_missing(
        &mut self,
        frames: &mut FrameAllocator,
        virtual_address: u64,
        size: u64,
    ) -> Result<Vec<Frame>> {
        let page_size = self.page_size();
        let range = PageRange::new(virtual_address, size, page_size);
        // Addresses past the layout's reach alias pages already in the range
        let count = range.count.min(self.layout.addressable_pages());
        let reachable = self.mapped_page_count() as u64 + frames.available_count() as u64;
        if count > reachable {
            return Err(VmError::OutOfMemory {
                requested: usize::try_from(count).unwrap_or(usize::MAX),
                available: frames.available_count(),
            });
        }

        let missing: Vec<u64> = (0..count)
            .map(|i| virtual_address.wrapping_add(i * page_size))
            .filter(|&address| self.lookup(address).is_none())
            .collect();
        let allocated = frames.allocate_many(missing.len())?;
        for (&address, &frame) in missing.iter().zip(&allocated) {
            self.map_address(address, frame);
        }
        Ok(allocated)
    }

    /// Unmap the pages covering `size` bytes from a page-aligned
    /// `virtual_address`, drop second-level tables left empty and return the
    /// collected frames to `frames`. Returns the frames released.
    pub fn free_pages_for(
        &mut self,
        frames: &mut FrameAllocator,
        virtual_address: u64,
        size: u64,
    ) -> Result<Vec<Frame>> {
        let page_size = self.page_size();
        if virtual_address % page_size != 0 {
            return Err(VmError::MalformedRequest {
                address: virtual_address,
                page_size,
            });
        }

        let range = PageRange::new(virtual_address, size, page_size);
        let mut released = Vec::new();
        let mut address = virtual_address;
        for _ in 0..range.count.min(self.layout.addressable_pages()) {
            let va = self.layout.decompose(address);
            if let Some(frame) = self
                .directory
                .get_mut(&va.top)
                .and_then(|table| table.remove(&va.second))
            {
                debug!("unmap {va} (frame {frame})");
                released.push(frame);
            }
            address = address.wrapping_add(page_size);
        }

        self.directory.retain(|_, table| !table.is_empty());
        frames.free_many(&released)?;
        Ok(released)
    }

    /// Unmap everything and return all frames to `frames`
    pub fn clear(&mut self, frames: &mut FrameAllocator) -> Result<usize> {
        let released: Vec<Frame> = std::mem::take(&mut self.directory)
            .into_values()
            .flat_map(BTreeMap::into_values)
            .collect();
        frames.free_many(&released)?;
        Ok(released.len())
    }

    pub fn page_hits(&self) -> u64 {
        self.page_hits
    }

    pub fn mapped_page_count(&self) -> usize {
        self.directory.values().map(BTreeMap::len).sum()
    }

    /// Number of second-level tables currently allocated
    pub fn second_level_count(&self) -> usize {
        self.directory.len()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.directory.clone())
    }
}

/// Ordered copy of a hierarchical table: top index -> {second index -> frame}
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(pub BTreeMap<usize, BTreeMap<usize, Frame>>);

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Page Table:")?;
        for (top, table) in &self.0 {
            writeln!(f, "Top-Level Index: {top}")?;
            for (second, frame) in table {
                writeln!(f, "  Second-Level Index: {second} -> Physical Page: {frame}")?;
            }
        }
        Ok(())
    }
}
