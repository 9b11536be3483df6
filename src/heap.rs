use super::arena::{Arena, HeapRegion};
use super::block::BlockRef;
use super::diagnostics::{HeapSnapshot, HeapStats};
use super::free_list::FreeList;
use super::{HeapConfig, HeapError, PlacementPolicy, HEADER_SIZE};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull};
use parking_lot::{Mutex, MutexGuard};

struct HeapState {
    free_list: FreeList,
    initialized: bool,
}

impl HeapState {
    fn install(&mut self, arena: &Arena) {
        self.free_list.reset(arena);
        self.initialized = true;
    }
}

/// Fixed-capacity allocator handing out header-aligned regions of one arena.
///
/// Every mutation of block headers happens under a single lock, and the
/// search for a free block and the split that claims it run in the same
/// critical section. A heap must be [initialized](Heap::initialize) exactly
/// once before it is used.
///
/// ```
/// use rsheap::{Heap, HeapConfig};
///
/// let heap = Heap::new(HeapConfig::new().with_capacity(1024)).unwrap();
/// heap.initialize();
///
/// let ptr = heap.allocate(24).unwrap();
/// unsafe { ptr.as_ptr().write_bytes(0xAB, 24) };
/// heap.release(ptr.as_ptr());
///
/// assert_eq!(heap.stats().unwrap().free_bytes, 1024);
/// ```
pub struct Heap {
    arena: Arena,
    state: Mutex<HeapState>,
}

// SAFETY: headers are only read or written while `state` is locked, and the
// data regions belong to whoever holds the pointers handed out for them
unsafe impl Send for Heap {}
unsafe impl Sync for Heap {}

impl Heap {
    pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
        config.validate()?;

        Ok(Self {
            arena: Arena::new(config.capacity)?,
            state: Mutex::new(HeapState {
                free_list: FreeList::new(config.policy),
                initialized: false,
            }),
        })
    }

    /// Builds a heap over a static region without touching any allocator,
    /// so it can initialize a `static` item or a `#[global_allocator]`.
    ///
    /// # Safety
    ///
    /// No other heap may be built over `region`.
    pub const unsafe fn from_region<const N: usize>(
        region: &'static HeapRegion<N>,
        policy: PlacementPolicy,
    ) -> Self {
        Self {
            arena: Arena::from_region(region),
            state: parking_lot::const_mutex(HeapState {
                free_list: FreeList::new(policy),
                initialized: false,
            }),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.size()
    }

    pub fn policy(&self) -> PlacementPolicy {
        self.state.lock().free_list.policy()
    }

    /// Turns the arena into a single free block.
    ///
    /// # Panics
    ///
    /// If the heap was already initialized.
    pub fn initialize(&self) {
        let mut state = self.state.lock();
        assert!(!state.initialized, "heap initialized twice");
        state.install(&self.arena);
        drop(state);

        log::debug!(
            "heap initialized: capacity={} policy={:?}",
            self.capacity(),
            self.policy()
        );
    }

    fn lock(&self) -> Result<MutexGuard<'_, HeapState>, HeapError> {
        let state = self.state.lock();
        if !state.initialized {
            return Err(HeapError::Uninitialized);
        }
        Ok(state)
    }

    /// Allocates a region with room for at least `size` bytes.
    ///
    /// The region is aligned to [`HEADER_SIZE`]. `None` means no free block
    /// is large enough, which is an ordinary outcome the caller has to
    /// handle.
    ///
    /// # Panics
    ///
    /// If the heap is not initialized or its headers are corrupt.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let block = match self.allocate_block(size) {
            Ok(block) => block,
            Err(err) => panic!("allocate({size}): {err}"),
        };

        match block {
            Some(block) => {
                log::trace!("allocate({}) -> offset {}", size, block.offset());
                Some(self.arena.data_ptr(block))
            }
            None => {
                log::warn!("allocate({}) -> out of memory", size);
                None
            }
        }
    }

    fn allocate_block(&self, size: usize) -> Result<Option<BlockRef>, HeapError> {
        let mut state = self.lock()?;
        state.free_list.allocate(&self.arena, size)
    }

    /// Returns the region starting at `ptr` to the heap.
    ///
    /// A null pointer is ignored. Anything that is not a live allocation of
    /// this heap is reported instead of being linked into the free list.
    pub fn try_release(&self, ptr: *mut u8) -> Result<(), HeapError> {
        if ptr.is_null() {
            return Ok(());
        }

        match self.release_block(ptr) {
            Ok((block, size)) => {
                log::trace!("release(offset {}) -> {} bytes freed", block.offset(), size);
                Ok(())
            }
            Err(err) => {
                log::warn!("release({:p}) rejected: {}", ptr, err);
                Err(err)
            }
        }
    }

    fn release_block(&self, ptr: *mut u8) -> Result<(BlockRef, usize), HeapError> {
        let mut state = self.lock()?;
        let block = self.arena.block_of(ptr)?;
        let size = state.free_list.release(&self.arena, block)?;
        Ok((block, size))
    }

    /// Like [`Heap::try_release`], but treats misuse as fatal.
    ///
    /// # Panics
    ///
    /// On a foreign, misaligned or already released pointer.
    pub fn release(&self, ptr: *mut u8) {
        if let Err(err) = self.try_release(ptr) {
            panic!("invalid release of {ptr:p}: {err}");
        }
    }

    /// Usable bytes of the live allocation at `ptr`.
    pub fn usable_size(&self, ptr: *const u8) -> Result<usize, HeapError> {
        let state = self.lock()?;
        let block = self.arena.block_of(ptr)?;
        let size = state.free_list.allocated_size(&self.arena, block)?;
        Ok(size - HEADER_SIZE)
    }

    /// Walks every block and the free list under the guard.
    ///
    /// The snapshot is built while the guard is held, so a heap installed
    /// as the `#[global_allocator]` must not be dumped: it would deadlock
    /// on its own lock.
    pub fn dump(&self) -> Result<HeapSnapshot, HeapError> {
        let state = self.lock()?;
        HeapSnapshot::capture(&state.free_list, &self.arena)
    }

    pub fn stats(&self) -> Result<HeapStats, HeapError> {
        self.dump().map(|snapshot| snapshot.stats())
    }

    /// Checks every structural invariant and returns the stats on success.
    pub fn verify(&self) -> Result<HeapStats, HeapError> {
        let snapshot = self.dump()?;
        snapshot.verify()?;
        Ok(snapshot.stats())
    }
}

impl Default for Heap {
    fn default() -> Self {
        match Self::new(HeapConfig::default()) {
            Ok(heap) => heap,
            Err(err) => panic!("default heap config rejected: {err}"),
        }
    }
}

// A heap installed with `#[global_allocator]` serves requests before `main`
// could call `initialize`, so this path installs the free list on first use.
// It never logs: a logger that allocates would come straight back here.
unsafe impl GlobalAlloc for Heap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEADER_SIZE {
            return ptr::null_mut();
        }

        let mut state = self.state.lock();
        if !state.initialized {
            state.install(&self.arena);
        }

        match state.free_list.allocate(&self.arena, layout.size()) {
            Ok(Some(block)) => self.arena.data_ptr(block).as_ptr(),
            Ok(None) | Err(_) => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let mut state = self.state.lock();
        let released = self
            .arena
            .block_of(ptr)
            .and_then(|block| state.free_list.release(&self.arena, block));
        drop(state);

        // unwinding out of an allocator is not allowed
        if released.is_err() {
            std::process::abort();
        }
    }
}
