//! Per-task page tables.
//!
//! A task's table is either a flat array sized to a fixed number of virtual
//! pages, or a sparse map with no upper bound on the page number. Both share
//! the same request/release contract; the variant is chosen at construction.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::debug;

use crate::address::PageRange;
use crate::error::{Result, VmError};
use crate::memory::{Frame, FrameAllocator};

/// Backing storage for virtual page -> frame mappings
#[derive(Debug, Clone)]
pub enum PageMap {
    /// One slot per virtual page in `[0, len)`
    Flat(Vec<Option<Frame>>),
    /// Only mapped pages are present
    Sparse(HashMap<u64, Frame>),
}

impl PageMap {
    pub fn flat(num_pages: usize) -> Self {
        PageMap::Flat(vec![None; num_pages])
    }

    pub fn sparse() -> Self {
        PageMap::Sparse(HashMap::new())
    }

    /// Highest number of pages the map can hold, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        match self {
            PageMap::Flat(slots) => Some(slots.len()),
            PageMap::Sparse(_) => None,
        }
    }

    pub fn get(&self, page: u64) -> Option<Frame> {
        match self {
            PageMap::Flat(slots) => usize::try_from(page)
                .ok()
                .and_then(|i| slots.get(i).copied().flatten()),
            PageMap::Sparse(map) => map.get(&page).copied(),
        }
    }

    /// Caller must have checked `page` against [`PageMap::capacity`].
    fn insert(&mut self, page: u64, frame: Frame) {
        match self {
            PageMap::Flat(slots) => slots[page as usize] = Some(frame),
            PageMap::Sparse(map) => {
                map.insert(page, frame);
            }
        }
    }

    fn remove(&mut self, page: u64) -> Option<Frame> {
        match self {
            PageMap::Flat(slots) => usize::try_from(page)
                .ok()
                .and_then(|i| slots.get_mut(i))
                .and_then(Option::take),
            PageMap::Sparse(map) => map.remove(&page),
        }
    }

    /// Number of pages currently mapped
    pub fn mapped(&self) -> usize {
        match self {
            PageMap::Flat(slots) => slots.iter().filter(|slot| slot.is_some()).count(),
            PageMap::Sparse(map) => map.len(),
        }
    }

    /// Number of entries the structure itself occupies
    pub fn footprint(&self) -> usize {
        match self {
            PageMap::Flat(slots) => slots.len(),
            PageMap::Sparse(map) => map.len(),
        }
    }

    /// Every mapping, ordered by virtual page
    pub fn entries(&self) -> Vec<(u64, Frame)> {
        match self {
            PageMap::Flat(slots) => slots
                .iter()
                .enumerate()
                .filter_map(|(page, slot)| slot.map(|frame| (page as u64, frame)))
                .collect(),
            PageMap::Sparse(map) => map
                .iter()
                .map(|(&page, &frame)| (page, frame))
                .collect::<BTreeMap<_, _>>()
                .into_iter()
                .collect(),
        }
    }
}

/// Pages of one request that were already mapped (hits) vs. newly mapped (faults)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOutcome {
    pub hits: u64,
    pub faults: u64,
}

/// Page table owned by a single task
#[derive(Debug, Clone)]
pub struct TaskPageTable {
    task_id: u32,
    page_size: u64,
    map: PageMap,
    page_hits: u64,
}

impl TaskPageTable {
    /// Flat table of `num_pages` slots; `page_size` is in bytes
    pub fn flat(task_id: u32, page_size: u64, num_pages: usize) -> Self {
        Self::with_map(task_id, page_size, PageMap::flat(num_pages))
    }

    /// Sparse table; `page_size` is in bytes
    pub fn sparse(task_id: u32, page_size: u64) -> Self {
        Self::with_map(task_id, page_size, PageMap::sparse())
    }

    fn with_map(task_id: u32, page_size: u64, map: PageMap) -> Self {
        TaskPageTable {
            task_id,
            page_size,
            map,
            page_hits: 0,
        }
    }

    /// Map every page covering `size` bytes from `virtual_address`, one page
    /// at a time.
    ///
    /// A mapped page counts as a hit; an unmapped one takes a frame from
    /// `frames`. When the pool runs dry the pages handled so far stay mapped
    /// and their hits stay counted. A flat table rejects the whole range up
    /// front if it runs past the last slot.
    pub fn request(
        &mut self,
        frames: &mut FrameAllocator,
        virtual_address: u64,
        size: u64,
    ) -> Result<RequestOutcome> {
        let range = PageRange::new(virtual_address, size, self.page_size);
        if let (Some(capacity), Some(end)) = (self.map.capacity(), range.end()) {
            if end >= capacity as u64 {
                return Err(VmError::PageOutOfRange { page: end, capacity });
            }
        }

        let mut outcome = RequestOutcome::default();
        for page in range.pages() {
            if self.map.get(page).is_some() {
                self.page_hits += 1;
                outcome.hits += 1;
                continue;
            }
            let frame = frames.allocate_one()?;
            debug!("task {}: page {page} -> frame {frame}", self.task_id);
            self.map.insert(page, frame);
            outcome.faults += 1;
        }
        Ok(outcome)
    }

    /// Unmap every mapped page in the range and return its frame to `frames`.
    ///
    /// Unmapped pages are skipped. Returns the number of pages released.
    pub fn release(
        &mut self,
        frames: &mut FrameAllocator,
        virtual_address: u64,
        size: u64,
    ) -> Result<u64> {
        let range = PageRange::new(virtual_address, size, self.page_size);
        // Walk whichever is shorter: the range or the pages actually mapped
        let pages: Vec<u64> = if range.count > self.map.mapped() as u64 {
            let span = range.pages();
            self.map
                .entries()
                .into_iter()
                .map(|(page, _)| page)
                .filter(|page| span.contains(page))
                .collect()
        } else {
            range.pages().collect()
        };

        let mut released = 0;
        for page in pages {
            if let Some(frame) = self.map.get(page) {
                frames.free(frame)?;
                self.map.remove(page);
                debug!("task {}: released page {page} (frame {frame})", self.task_id);
                released += 1;
            }
        }
        Ok(released)
    }

    /// Release every page the task holds
    pub fn release_all(&mut self, frames: &mut FrameAllocator) -> Result<u64> {
        let mut released = 0;
        for (page, frame) in self.map.entries() {
            frames.free(frame)?;
            self.map.remove(page);
            released += 1;
        }
        Ok(released)
    }

    /// True iff the page holding `virtual_address` is mapped
    pub fn is_hit(&self, virtual_address: u64) -> bool {
        self.map.get(virtual_address / self.page_size).is_some()
    }

    pub fn frame_of(&self, virtual_address: u64) -> Option<Frame> {
        self.map.get(virtual_address / self.page_size)
    }

    pub fn page_hits(&self) -> u64 {
        self.page_hits
    }

    pub fn mapped_page_count(&self) -> usize {
        self.map.mapped()
    }

    /// Table entries held by the structure: the fixed slot count for a flat
    /// table, present keys for a sparse one. Not the physical memory in use.
    pub fn footprint(&self) -> usize {
        self.map.footprint()
    }

    pub fn entries(&self) -> Vec<(u64, Frame)> {
        self.map.entries()
    }

    pub fn task_id(&self) -> u32 {
        self.task_id
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn map(&self) -> &PageMap {
        &self.map
    }
}

impl fmt::Display for TaskPageTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Task {} Page Table:", self.task_id)?;
        for (page, frame) in self.entries() {
            writeln!(f, "Virtual Page: {page} -> Physical Page: {frame:#06x}")?;
        }
        Ok(())
    }
}
