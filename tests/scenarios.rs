//! End-to-end scenarios over the public API.

use paging_sim::constants::KB;
use paging_sim::trace::{parse_trace, write_trace};
use paging_sim::{
    AddressLayout, FrameAllocator, HierarchicalPageTable, RequestOutcome, Session, SimConfig,
    TableKind, TaskPageTable, TraceEntry, VmError,
};

#[test]
fn flat_table_request_hit_release() {
    let mut frames = FrameAllocator::new(4);
    let mut table = TaskPageTable::flat(1, KB, 1024);

    table.request(&mut frames, 0x0, 2 * KB).unwrap();
    assert_eq!(table.entries(), vec![(0, 0), (1, 1)]);

    table.request(&mut frames, 0x0, KB).unwrap();
    assert_eq!(table.page_hits(), 1);

    table.release(&mut frames, 0x0, 2 * KB).unwrap();
    assert_eq!(frames.available_count(), 4);
    assert!(frames.is_free(0));
    assert!(frames.is_free(1));
}

#[test]
fn allocate_many_beyond_pool_changes_nothing() {
    let mut frames = FrameAllocator::new(4);
    let err = frames.allocate_many(5).unwrap_err();
    assert!(matches!(err, VmError::OutOfMemory { .. }));
    assert_eq!(frames.available_count(), 4);
}

#[test]
fn trace_line_parsing() {
    let entry: TraceEntry = "T3:20000010:8KB".parse().unwrap();
    assert_eq!(entry.task_id, 3);
    assert_eq!(entry.virtual_address, 0x2000_0010);
    assert_eq!(entry.size_kb(), 8);

    let err = "T3:20000010:8XB".parse::<TraceEntry>().unwrap_err();
    assert!(matches!(err, VmError::MalformedTraceLine { .. }));
}

#[test]
fn hierarchical_translate_after_map() {
    let layout = AddressLayout::default();
    let mut table = HierarchicalPageTable::new(layout);
    let va = 0x1234_5678;
    table.map_address(va, 42);

    let pa = table.translate(va).unwrap();
    assert_eq!(pa, (42 << layout.offset_bits) | (va & layout.offset_mask()));

    assert!(matches!(
        table.translate(0x8765_4321),
        Err(VmError::UnmappedPage { address: 0x8765_4321 })
    ));
}

#[test]
fn tables_share_one_pool() {
    let mut frames = FrameAllocator::new(6);
    let mut flat = TaskPageTable::flat(1, KB, 64);
    let mut sparse = TaskPageTable::sparse(2, KB);
    let mut multi = HierarchicalPageTable::new(AddressLayout::new(8, 8, 10));

    flat.request(&mut frames, 0, 2 * KB).unwrap();
    sparse.request(&mut frames, 0x4000_0000, 2 * KB).unwrap();
    multi.allocate_and_map(&mut frames, 0x1000_0000, 2 * KB).unwrap();
    assert_eq!(frames.available_count(), 0);

    let err = sparse.request(&mut frames, 0, KB).unwrap_err();
    assert!(matches!(err, VmError::OutOfMemory { .. }));

    multi.free_pages_for(&mut frames, 0x1000_0000, 2 * KB).unwrap();
    let outcome = sparse.request(&mut frames, 0, KB).unwrap();
    assert_eq!(outcome, RequestOutcome { hits: 0, faults: 1 });
    // FIFO reuse: the hierarchical table's first frame comes back first
    assert_eq!(sparse.frame_of(0), Some(4));
}

#[test]
fn session_replays_trace_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracefile.txt");
    write_trace(
        &path,
        &[
            TraceEntry::new(1, 0x1000_0000, 4 * KB),
            TraceEntry::new(2, 0x2000_0000, 2 * KB),
            TraceEntry::new(1, 0x1000_0000, 4 * KB),
        ],
    )
    .unwrap();

    for table in [TableKind::Sparse, TableKind::Hierarchical] {
        let config = SimConfig {
            table,
            physical_memory_size: 32 * KB,
            ..SimConfig::default()
        };
        let mut session = Session::new(config);
        let mut report = Vec::new();
        let entries = paging_sim::trace::read_trace(&path).unwrap();
        let stats = session.run(entries, &mut report).unwrap();

        assert_eq!(stats.requests, 3);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.page_faults, 6);
        assert!(stats.page_hits > 0);

        let report = String::from_utf8(report).unwrap();
        assert_eq!(
            report.lines().next(),
            Some("Task 1 allocated pages for virtual address 0x10000000")
        );

        let stats = session.finish().unwrap();
        assert_eq!(stats.frames_in_use, 0);
    }
}

#[test]
fn malformed_line_does_not_disturb_state() {
    let mut session = Session::new(SimConfig {
        physical_memory_size: 8 * KB,
        ..SimConfig::default()
    });
    let trace = "T1:10000000:2KB\nT1:10000800:2GB\nT1:10000800:1KB\n";
    let stats = session.run(parse_trace(trace), &mut std::io::sink()).unwrap();

    assert_eq!(stats.skipped_lines, 1);
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.frames_in_use, 3);
}
