//! Property-based tests for the frame pool and the page tables.

use std::collections::HashSet;

use paging_sim::constants::KB;
use paging_sim::{AddressLayout, Frame, FrameAllocator, HierarchicalPageTable, TaskPageTable};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

#[derive(Debug, Clone)]
enum PoolOp {
    AllocateOne,
    AllocateMany(usize),
    /// Free the held frame at this position (modulo the number held)
    Free(usize),
}

fn pool_op() -> impl Strategy<Value = PoolOp> {
    prop_oneof![
        Just(PoolOp::AllocateOne),
        (0usize..6).prop_map(PoolOp::AllocateMany),
        any::<usize>().prop_map(PoolOp::Free),
    ]
}

fn free_frames(frames: &FrameAllocator) -> Vec<Frame> {
    (0..frames.total_count()).filter(|&f| frames.is_free(f)).collect()
}

// ============================================================================
// Frame pool properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_frames_are_conserved(total in 1usize..32, ops in prop::collection::vec(pool_op(), 0..64)) {
        let mut frames = FrameAllocator::new(total);
        let mut held: Vec<Frame> = Vec::new();

        for op in ops {
            match op {
                PoolOp::AllocateOne => {
                    if let Ok(frame) = frames.allocate_one() {
                        held.push(frame);
                    }
                }
                PoolOp::AllocateMany(n) => {
                    if let Ok(got) = frames.allocate_many(n) {
                        held.extend(got);
                    }
                }
                PoolOp::Free(i) => {
                    if !held.is_empty() {
                        let frame = held.swap_remove(i % held.len());
                        frames.free(frame).unwrap();
                    }
                }
            }

            // Held and free frames partition the pool exactly
            let held_set: HashSet<Frame> = held.iter().copied().collect();
            prop_assert_eq!(held_set.len(), held.len());
            prop_assert_eq!(held.len() + frames.available_count(), total);
            for frame in &held {
                prop_assert!(!frames.is_free(*frame));
            }
            prop_assert_eq!(free_frames(&frames).len(), frames.available_count());
        }
    }

    #[test]
    fn prop_allocate_many_all_or_nothing(total in 0usize..16, taken in 0usize..16, n in 0usize..20) {
        let mut frames = FrameAllocator::new(total);
        let _ = frames.allocate_many(taken.min(total)).unwrap();
        let before = free_frames(&frames);

        match frames.allocate_many(n) {
            Ok(got) => {
                prop_assert_eq!(got.len(), n);
                let distinct: HashSet<Frame> = got.iter().copied().collect();
                prop_assert_eq!(distinct.len(), n);
                for frame in &got {
                    prop_assert!(before.contains(frame));
                }
            }
            Err(_) => {
                prop_assert!(n > before.len());
                prop_assert_eq!(free_frames(&frames), before);
            }
        }
    }
}

// ============================================================================
// Page table properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_request_release_round_trip(
        page in 0u64..256,
        offset in 0u64..1024,
        size in 1u64..(16 * KB),
        flat in any::<bool>()
    ) {
        let mut frames = FrameAllocator::new(64);
        let mut table = if flat {
            TaskPageTable::flat(1, KB, 512)
        } else {
            TaskPageTable::sparse(1, KB)
        };
        let va = page * KB + offset;

        table.request(&mut frames, va, size).unwrap();
        table.release(&mut frames, va, size).unwrap();

        prop_assert_eq!(frames.available_count(), 64);
        prop_assert_eq!(table.mapped_page_count(), 0);
    }

    #[test]
    fn prop_second_request_is_all_hits(page in 0u64..1024, pages in 1u64..8) {
        let mut frames = FrameAllocator::new(16);
        let mut table = TaskPageTable::sparse(1, KB);
        let va = page * KB;

        let first = table.request(&mut frames, va, pages * KB).unwrap();
        prop_assert_eq!(first.hits, 0);
        prop_assert_eq!(table.page_hits(), 0);

        let second = table.request(&mut frames, va, pages * KB).unwrap();
        prop_assert_eq!(second.hits, pages);
        prop_assert_eq!(table.page_hits(), pages);
    }

    #[test]
    fn prop_failed_request_keeps_pool_consistent(
        total in 1usize..8,
        held in 0u64..8,
        pages in 1u64..16
    ) {
        let mut frames = FrameAllocator::new(total);
        let mut table = TaskPageTable::sparse(1, KB);
        let _ = table.request(&mut frames, 4 * KB, held * KB);

        let result = table.request(&mut frames, 0, pages * KB);
        prop_assert_eq!(table.mapped_page_count() + frames.available_count(), total);
        if result.is_err() {
            prop_assert_eq!(frames.available_count(), 0);
        }
    }

    #[test]
    fn prop_translate_after_map(va in 0u64..(1 << 32), frame in 0usize..(1 << 20)) {
        let layout = AddressLayout::default();
        let mut table = HierarchicalPageTable::new(layout);
        table.map_address(va, frame);

        let pa = table.translate(va).unwrap();
        prop_assert_eq!(pa, ((frame as u64) << layout.offset_bits) | (va & layout.offset_mask()));
    }

    #[test]
    fn prop_hierarchical_map_free_round_trip(page in 0u64..((1 << 20) - 16), pages in 1u64..12) {
        let mut frames = FrameAllocator::new(16);
        let mut table = HierarchicalPageTable::new(AddressLayout::default());
        let va = page * table.page_size();
        let size = pages * table.page_size();

        table.allocate_and_map(&mut frames, va, size).unwrap();
        prop_assert_eq!(table.mapped_page_count() as u64, pages);

        table.free_pages_for(&mut frames, va, size).unwrap();
        prop_assert_eq!(frames.available_count(), 16);
        prop_assert_eq!(table.second_level_count(), 0);
    }
}
