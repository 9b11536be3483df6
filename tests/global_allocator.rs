use rsheap::{Heap, HeapRegion, PlacementPolicy, HEADER_SIZE};
use std::collections::BTreeMap;

static REGION: HeapRegion<{ 4 * 1024 * 1024 }> = HeapRegion::new();

// every allocation in this test binary, the harness included, lands here
#[global_allocator]
static HEAP: Heap = unsafe { Heap::from_region(&REGION, PlacementPolicy::FirstFit) };

#[test]
fn std_collections_run_on_a_static_heap() {
    let mut words: BTreeMap<String, usize> = BTreeMap::new();
    for (i, word) in "the quick brown fox jumps over the lazy dog".split(' ').enumerate() {
        *words.entry(word.to_string()).or_default() += i;
    }
    let mut numbers: Vec<u64> = (0..1000).collect();
    numbers.retain(|n| n % 3 == 0);
    numbers.shrink_to_fit();

    assert_eq!(words["the"], 6);
    assert_eq!(numbers.len(), 334);

    // the vector's buffer is a live block of the static heap
    let ptr = numbers.as_ptr() as *const u8;
    assert_eq!(ptr as usize % HEADER_SIZE, 0);
    assert!(HEAP.usable_size(ptr).unwrap() >= 334 * 8);
}
