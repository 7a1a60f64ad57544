//! Trace-driven simulation.
//!
//! A [`Session`] owns the frame pool and every task's page table. Tables only
//! borrow the pool for the duration of a call, so the pool always outlives them.
//! Requests are serviced one at a time; a failed request is reported and the
//! session moves on to the next one.

use std::collections::BTreeMap;
use std::io::Write;

use log::{info, warn};

use crate::config::{SimConfig, TableKind};
use crate::error::Result;
use crate::memory::FrameAllocator;
use crate::multilevel::HierarchicalPageTable;
use crate::page_table::{RequestOutcome, TaskPageTable};
use crate::trace::TraceEntry;

/// Page table of one task
#[derive(Debug, Clone)]
pub enum TaskTable {
    Paged(TaskPageTable),
    Hierarchical(HierarchicalPageTable),
}

impl TaskTable {
    fn new(config: &SimConfig, task_id: u32) -> Self {
        match config.table {
            TableKind::Flat => TaskTable::Paged(TaskPageTable::flat(
                task_id,
                config.page_size(),
                config.single_level_entries,
            )),
            TableKind::Sparse => TaskTable::Paged(TaskPageTable::sparse(task_id, config.page_size())),
            TableKind::Hierarchical => {
                TaskTable::Hierarchical(HierarchicalPageTable::new(config.layout()))
            }
        }
    }

    pub fn page_hits(&self) -> u64 {
        match self {
            TaskTable::Paged(table) => table.page_hits(),
            TaskTable::Hierarchical(table) => table.page_hits(),
        }
    }

    pub fn mapped_page_count(&self) -> usize {
        match self {
            TaskTable::Paged(table) => table.mapped_page_count(),
            TaskTable::Hierarchical(table) => table.mapped_page_count(),
        }
    }

    fn request(&mut self, frames: &mut FrameAllocator, entry: &TraceEntry) -> Result<RequestOutcome> {
        match self {
            TaskTable::Paged(table) => table.request(frames, entry.virtual_address, entry.size),
            TaskTable::Hierarchical(table) => {
                let before = table.page_hits();
                let mapped = table.map_missing(frames, entry.virtual_address, entry.size)?;
                // Hits follow the per-address rule, so only the start address is touched
                if entry.size > 0 {
                    table.translate(entry.virtual_address)?;
                }
                Ok(RequestOutcome {
                    hits: table.page_hits() - before,
                    faults: mapped.len() as u64,
                })
            }
        }
    }

    fn release(&mut self, frames: &mut FrameAllocator, virtual_address: u64, size: u64) -> Result<u64> {
        match self {
            TaskTable::Paged(table) => table.release(frames, virtual_address, size),
            TaskTable::Hierarchical(table) => table
                .free_pages_for(frames, virtual_address, size)
                .map(|released| released.len() as u64),
        }
    }

    fn release_all(&mut self, frames: &mut FrameAllocator) -> Result<u64> {
        match self {
            TaskTable::Paged(table) => table.release_all(frames),
            TaskTable::Hierarchical(table) => table.clear(frames).map(|n| n as u64),
        }
    }

    fn dump<W: Write>(&self, task_id: u32, out: &mut W) -> std::io::Result<()> {
        match self {
            TaskTable::Paged(table) => write!(out, "{table}"),
            TaskTable::Hierarchical(table) => {
                writeln!(out, "Task {task_id}")?;
                write!(out, "{}", table.snapshot())
            }
        }
    }
}

/// Cumulative counters for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub requests: u64,
    pub failed: u64,
    pub skipped_lines: u64,
    pub page_hits: u64,
    pub page_faults: u64,
    pub frames_in_use: usize,
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Requests:        {}", self.requests)?;
        writeln!(f, "Failed requests: {}", self.failed)?;
        writeln!(f, "Skipped lines:   {}", self.skipped_lines)?;
        writeln!(f, "Page hits:       {}", self.page_hits)?;
        writeln!(f, "Page faults:     {}", self.page_faults)?;
        write!(f, "Frames in use:   {}", self.frames_in_use)
    }
}

/// Per-request report line, e.g. `Task 1 allocated pages for virtual address 0x10000040`
pub fn report_line(entry: &TraceEntry) -> String {
    format!(
        "Task {} allocated pages for virtual address {:#010x}",
        entry.task_id, entry.virtual_address
    )
}

pub struct Session {
    config: SimConfig,
    frames: FrameAllocator,
    tasks: BTreeMap<u32, TaskTable>,
    stats: SessionStats,
}

impl Session {
    pub fn new(config: SimConfig) -> Self {
        let frames = FrameAllocator::new(config.num_frames());
        info!(
            "session: {} frames of {} bytes, {:?} tables",
            frames.total_count(),
            config.page_size(),
            config.table
        );
        Session {
            config,
            frames,
            tasks: BTreeMap::new(),
            stats: SessionStats::default(),
        }
    }

    /// Service one request, creating the task's table on first use
    pub fn process(&mut self, entry: &TraceEntry) -> Result<RequestOutcome> {
        self.stats.requests += 1;
        let config = &self.config;
        let table = self
            .tasks
            .entry(entry.task_id)
            .or_insert_with(|| TaskTable::new(config, entry.task_id));

        let hits_before = table.page_hits();
        let mapped_before = table.mapped_page_count();
        let result = table.request(&mut self.frames, entry);
        // A request that fails partway keeps the pages it already mapped
        self.stats.page_hits += table.page_hits() - hits_before;
        self.stats.page_faults += table.mapped_page_count().saturating_sub(mapped_before) as u64;

        match result {
            Ok(outcome) => {
                info!("{entry}: {} hit(s), {} fault(s)", outcome.hits, outcome.faults);
                Ok(outcome)
            }
            Err(e) => {
                self.stats.failed += 1;
                Err(e)
            }
        }
    }

    /// Drive a whole trace, writing one report line per serviced request.
    ///
    /// Malformed lines and failed requests are logged and skipped; only a
    /// failure to write the report stops the run.
    pub fn run<I, W>(&mut self, entries: I, out: &mut W) -> Result<SessionStats>
    where
        I: IntoIterator<Item = Result<TraceEntry>>,
        W: Write,
    {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("skipping trace line: {e}");
                    self.stats.skipped_lines += 1;
                    continue;
                }
            };
            match self.process(&entry) {
                Ok(_) => writeln!(out, "{}", report_line(&entry))?,
                Err(e) => {
                    warn!("task {} request {entry} failed: {e}", entry.task_id);
                    writeln!(out, "Task {} request {entry} failed: {e}", entry.task_id)?;
                }
            }
        }
        Ok(self.stats())
    }

    /// Release a range previously requested by `task_id`
    pub fn release(&mut self, task_id: u32, virtual_address: u64, size: u64) -> Result<u64> {
        match self.tasks.get_mut(&task_id) {
            Some(table) => table.release(&mut self.frames, virtual_address, size),
            None => Ok(0),
        }
    }

    /// Return every frame held by `task_id` and forget its table
    pub fn release_task(&mut self, task_id: u32) -> Result<u64> {
        let Some(mut table) = self.tasks.remove(&task_id) else {
            return Ok(0);
        };
        let released = table.release_all(&mut self.frames)?;
        info!("task {task_id}: released {released} page(s)");
        Ok(released)
    }

    /// Release every task and return the final counters
    pub fn finish(mut self) -> Result<SessionStats> {
        let ids: Vec<u32> = self.tasks.keys().copied().collect();
        for id in ids {
            self.release_task(id)?;
        }
        let stats = self.stats();
        info!(
            "session finished: {} request(s), {} failed, {} hit(s), {} fault(s)",
            stats.requests, stats.failed, stats.page_hits, stats.page_faults
        );
        Ok(stats)
    }

    /// Write every task's page table followed by its hit count
    pub fn dump<W: Write>(&self, out: &mut W) -> Result<()> {
        for (&task_id, table) in &self.tasks {
            table.dump(task_id, out)?;
            writeln!(out, "Task {task_id} page hits: {}", table.page_hits())?;
        }
        Ok(())
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            frames_in_use: self.frames.in_use_count(),
            ..self.stats
        }
    }

    pub fn frames(&self) -> &FrameAllocator {
        &self.frames
    }

    pub fn task(&self, task_id: u32) -> Option<&TaskTable> {
        self.tasks.get(&task_id)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }
}
