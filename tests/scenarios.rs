use rsheap::{Heap, HeapConfig, HeapError, PlacementPolicy, HEADER_SIZE};

const UNITS: usize = 64;

fn heap() -> Heap {
    let heap = Heap::new(HeapConfig::new().with_capacity(UNITS * HEADER_SIZE)).unwrap();
    heap.initialize();
    heap
}

#[test]
fn third_allocation_reuses_freed_block() {
    let heap = heap();

    let first = heap.allocate(1).unwrap();
    let second = heap.allocate(1).unwrap();
    heap.release(first.as_ptr());
    let third = heap.allocate(1).unwrap();

    assert_eq!(third, first);
    assert!(second.as_ptr() > third.as_ptr());
    heap.verify().unwrap();
}

#[test]
fn adjacent_releases_merge_into_full_arena() {
    let heap = heap();

    let a = heap.allocate(32).unwrap();
    let b = heap.allocate(32).unwrap();
    let c = heap.allocate(32).unwrap();
    let block = 32 + HEADER_SIZE;

    heap.release(b.as_ptr());
    heap.release(c.as_ptr());

    // b absorbed c and the untouched tail behind it
    let snapshot = heap.dump().unwrap();
    assert_eq!(snapshot.free_list.len(), 1);
    assert_eq!(snapshot.free_list[0].offset, block);
    assert_eq!(snapshot.free_list[0].size, UNITS * HEADER_SIZE - block);
    assert!(snapshot.blocks[0].allocated);
    heap.verify().unwrap();

    heap.release(a.as_ptr());

    let snapshot = heap.dump().unwrap();
    assert_eq!(snapshot.blocks.len(), 1);
    assert_eq!(snapshot.free_list.len(), 1);
    assert_eq!(snapshot.free_list[0].offset, 0);
    assert_eq!(snapshot.free_list[0].size, UNITS * HEADER_SIZE);
}

#[test]
fn middle_blocks_merge_with_each_other() {
    let heap = heap();

    let _a = heap.allocate(32).unwrap();
    let b = heap.allocate(32).unwrap();
    let c = heap.allocate(32).unwrap();
    let _guard = heap.allocate(32).unwrap();

    heap.release(b.as_ptr());
    heap.release(c.as_ptr());

    let snapshot = heap.dump().unwrap();
    let free: Vec<_> = snapshot.blocks.iter().filter(|b| !b.allocated).collect();
    assert_eq!(free.len(), 2);
    assert_eq!(free[0].offset, 48);
    assert_eq!(free[0].size, 96);
    heap.verify().unwrap();
}

#[test]
fn conservation_holds_across_history() {
    let heap = heap();
    let mut live = Vec::new();

    for size in [5, 60, 0, 17, 100, 3, 44] {
        if let Some(ptr) = heap.allocate(size) {
            live.push(ptr);
        }
        let stats = heap.verify().unwrap();
        assert_eq!(stats.allocated_bytes + stats.free_bytes, UNITS * HEADER_SIZE);
    }

    // release in a scrambled order
    for index in [3, 0, 5, 1, 6, 2, 4] {
        if let Some(ptr) = live.get(index) {
            heap.release(ptr.as_ptr());
            let stats = heap.verify().unwrap();
            assert_eq!(stats.allocated_bytes + stats.free_bytes, UNITS * HEADER_SIZE);
        }
    }

    let stats = heap.verify().unwrap();
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.allocated_blocks, 0);
}

#[test]
fn exhaustion_is_not_fatal() {
    let heap = heap();
    let mut live = Vec::new();

    while let Some(ptr) = heap.allocate(48) {
        live.push(ptr);
    }
    // 64 bytes per block, 16 of them fit exactly
    assert_eq!(live.len(), UNITS * HEADER_SIZE / 64);
    assert_eq!(heap.stats().unwrap().max_request(), None);

    heap.release(live[7].as_ptr());
    assert_eq!(heap.allocate(49), None);
    assert_eq!(heap.allocate(48), Some(live[7]));
}

#[test]
fn best_fit_prefers_tight_holes() {
    let config = HeapConfig::new()
        .with_capacity(UNITS * HEADER_SIZE)
        .with_policy(PlacementPolicy::BestFit);
    let heap = Heap::new(config).unwrap();
    heap.initialize();
    assert_eq!(heap.policy(), PlacementPolicy::BestFit);

    let wide = heap.allocate(200).unwrap();
    let _a = heap.allocate(16).unwrap();
    let narrow = heap.allocate(16).unwrap();
    let _b = heap.allocate(16).unwrap();

    heap.release(wide.as_ptr());
    heap.release(narrow.as_ptr());

    assert_eq!(heap.allocate(10), Some(narrow));
    heap.verify().unwrap();
}

#[test]
fn dump_text_matches_layout() {
    let heap = heap();
    let _a = heap.allocate(16).unwrap();

    let text = heap.dump().unwrap().to_string();
    assert_eq!(
        text,
        "All blocks:\n  Block starting at 0, size 32 (allocated)\n  Block starting at 32, size 992 (free)\n\
         Current free block list:\n  Free block starting at 32, size 992\n"
    );
}

#[test]
fn independent_heaps_do_not_interfere() {
    let left = heap();
    let right = heap();

    let ptr = left.allocate(8).unwrap();
    assert!(matches!(
        right.try_release(ptr.as_ptr()),
        Err(HeapError::OutOfBounds { .. })
    ));
    assert_eq!(right.stats().unwrap().allocated_blocks, 0);
    assert_eq!(left.stats().unwrap().allocated_blocks, 1);
}
