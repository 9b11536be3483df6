use super::{HeapError, HEADER_SIZE};
use crate::block::{BlockRef, RawHeader, MAX_UNITS};
use std::alloc::{self, Layout};
use std::cell::UnsafeCell;
use std::ptr::{self, NonNull};

/// Statically allocated backing memory for a [`Heap`](crate::Heap).
///
/// Lets a heap live in a `static` item, and so serve as the
/// `#[global_allocator]`, without ever asking another allocator for memory.
///
/// ```
/// use rsheap::{Heap, HeapRegion, PlacementPolicy};
///
/// static REGION: HeapRegion<4096> = HeapRegion::new();
/// static HEAP: Heap = unsafe { Heap::from_region(&REGION, PlacementPolicy::FirstFit) };
///
/// HEAP.initialize();
/// let ptr = HEAP.allocate(100).unwrap();
/// HEAP.release(ptr.as_ptr());
/// ```
#[repr(C, align(16))]
pub struct HeapRegion<const N: usize> {
    bytes: UnsafeCell<[u8; N]>,
}

// SAFETY: the bytes are only touched through the one heap built over the
// region, which serializes header access behind its lock
unsafe impl<const N: usize> Sync for HeapRegion<N> {}

const _: () = assert!(core::mem::align_of::<HeapRegion<HEADER_SIZE>>() == HEADER_SIZE);

impl<const N: usize> HeapRegion<N> {
    const VALID: () = assert!(
        N != 0 && N % HEADER_SIZE == 0 && N / HEADER_SIZE <= MAX_UNITS,
        "region size must be a non-zero multiple of the header size that fits the link field"
    );

    pub const fn new() -> Self {
        let () = Self::VALID;
        Self {
            bytes: UnsafeCell::new([0; N]),
        }
    }
}

impl<const N: usize> Default for HeapRegion<N> {
    fn default() -> Self {
        Self::new()
    }
}

enum Backing {
    /// Obtained from the system allocator, returned on drop.
    System(Layout),
    /// Borrowed from a [`HeapRegion`] for the life of the program.
    Region,
}

/// Fixed-size, header-aligned byte region backing every block of a heap.
///
/// The region either comes once from the system allocator and is handed
/// back when the arena is dropped, or is a `'static` [`HeapRegion`]. It
/// never grows, shrinks or moves, so offsets and the data pointers derived
/// from them stay valid for the arena's whole lifetime.
pub struct Arena {
    base: NonNull<u8>,
    size: usize,
    backing: Backing,
}

impl Arena {
    pub fn new(capacity: usize) -> Result<Self, HeapError> {
        if capacity == 0 {
            return Err(HeapError::InvalidCapacity { capacity });
        }
        let layout = Layout::from_size_align(capacity, HEADER_SIZE)
            .map_err(|_| HeapError::InvalidCapacity { capacity })?;

        // SAFETY: layout has a non-zero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let base = NonNull::new(raw).ok_or(HeapError::ArenaUnavailable { capacity })?;

        Ok(Self {
            base,
            size: capacity,
            backing: Backing::System(layout),
        })
    }

    pub const fn from_region<const N: usize>(region: &'static HeapRegion<N>) -> Self {
        // SAFETY: UnsafeCell::get never returns null
        let base = unsafe { NonNull::new_unchecked(region.bytes.get() as *mut u8) };
        Self {
            base,
            size: N,
            backing: Backing::Region,
        }
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.base.as_ptr() as usize
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.start() + self.size()
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn units(&self) -> usize {
        self.size() / HEADER_SIZE
    }

    /// Whether `block` names a header position inside the arena.
    #[inline]
    pub fn holds(&self, block: BlockRef) -> bool {
        block.index() < self.units()
    }

    /// Address of the first usable byte of `block`.
    pub fn data_ptr(&self, block: BlockRef) -> NonNull<u8> {
        assert!(self.holds(block));
        // SAFETY: offset + HEADER_SIZE is at most the arena size, so the
        // result stays in bounds or one past the end of the allocation
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(block.offset() + HEADER_SIZE)) }
    }

    /// Recovers the block owning the data region that starts at `ptr`.
    pub fn block_of(&self, ptr: *const u8) -> Result<BlockRef, HeapError> {
        let addr = ptr as usize;

        // a zero-sized last block has its data pointer exactly at the end
        if addr < self.start() + HEADER_SIZE || addr > self.end() {
            return Err(HeapError::OutOfBounds { addr });
        }

        let offset = addr - self.start() - HEADER_SIZE;
        if offset % HEADER_SIZE != 0 {
            return Err(HeapError::Misaligned { offset });
        }

        Ok(BlockRef::from_offset(offset))
    }

    /// Reads the raw header stored at `block`.
    ///
    /// # Safety
    ///
    /// The caller must hold the heap guard, so no other thread is writing
    /// headers concurrently.
    pub unsafe fn read_header(&self, block: BlockRef) -> RawHeader {
        assert!(self.holds(block));
        // SAFETY: in bounds and header-aligned; every bit pattern is a valid
        // RawHeader
        unsafe { ptr::read(self.base.as_ptr().add(block.offset()) as *const RawHeader) }
    }

    /// Overwrites the raw header stored at `block`.
    ///
    /// # Safety
    ///
    /// Same as [`Arena::read_header`], and `block` must not lie inside the
    /// data region of a live allocation.
    pub unsafe fn write_header(&self, block: BlockRef, header: RawHeader) {
        assert!(self.holds(block));
        // SAFETY: in bounds and header-aligned
        unsafe { ptr::write(self.base.as_ptr().add(block.offset()) as *mut RawHeader, header) };
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if let Backing::System(layout) = self.backing {
            // SAFETY: base was allocated in `new` with this exact layout
            unsafe { alloc::dealloc(self.base.as_ptr(), layout) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Header;

    #[test]
    fn start_is_header_aligned() {
        let arena = Arena::new(64 * HEADER_SIZE).unwrap();

        assert_eq!(arena.start() % HEADER_SIZE, 0);
        assert_eq!(arena.size(), 64 * HEADER_SIZE);
        assert_eq!(arena.units(), 64);
        assert_eq!(arena.end() - arena.start(), arena.size());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            Arena::new(0).err(),
            Some(HeapError::InvalidCapacity { capacity: 0 })
        );
    }

    #[test]
    fn failed_system_allocation_is_an_error() {
        // a valid layout, but far beyond any address space the system can map
        let capacity = (isize::MAX as usize / 2) & !(HEADER_SIZE - 1);
        assert_eq!(
            Arena::new(capacity).err(),
            Some(HeapError::ArenaUnavailable { capacity })
        );
    }

    #[test]
    fn region_backed_arena_covers_the_region() {
        static REGION: HeapRegion<{ 8 * HEADER_SIZE }> = HeapRegion::new();
        let arena = Arena::from_region(&REGION);

        assert_eq!(arena.start(), REGION.bytes.get() as usize);
        assert_eq!(arena.start() % HEADER_SIZE, 0);
        assert_eq!(arena.units(), 8);

        let block = BlockRef::from_offset(7 * HEADER_SIZE);
        assert_eq!(arena.block_of(arena.data_ptr(block).as_ptr()), Ok(block));
    }

    #[test]
    fn data_pointer_maps_back_to_its_block() {
        let arena = Arena::new(8 * HEADER_SIZE).unwrap();

        for index in 0..8 {
            let block = BlockRef::from_offset(index * HEADER_SIZE);
            let data = arena.data_ptr(block);

            assert_eq!(data.as_ptr() as usize, arena.start() + (index + 1) * HEADER_SIZE);
            assert_eq!(arena.block_of(data.as_ptr()), Ok(block));
        }
    }

    #[test]
    fn foreign_pointers_are_rejected() {
        let arena = Arena::new(8 * HEADER_SIZE).unwrap();

        // the base itself can never be a data pointer
        let base = arena.start() as *const u8;
        assert_eq!(
            arena.block_of(base),
            Err(HeapError::OutOfBounds { addr: arena.start() })
        );

        let past_end = (arena.end() + HEADER_SIZE) as *const u8;
        assert!(matches!(
            arena.block_of(past_end),
            Err(HeapError::OutOfBounds { .. })
        ));

        let inside = (arena.start() + HEADER_SIZE + 4) as *const u8;
        assert_eq!(
            arena.block_of(inside),
            Err(HeapError::Misaligned { offset: 4 })
        );
    }

    #[test]
    fn headers_round_trip_through_memory() {
        let arena = Arena::new(4 * HEADER_SIZE).unwrap();
        let block = BlockRef::from_offset(2 * HEADER_SIZE);
        let header = RawHeader::from(Header::free(2 * HEADER_SIZE, None));

        unsafe {
            arena.write_header(block, header);
            assert_eq!(arena.read_header(block), header);
        }
    }
}
