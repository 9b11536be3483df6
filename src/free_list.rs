use super::arena::Arena;
use super::block::{BlockRef, BlockState, Header, RawHeader};
use super::utils::block_size_for;
use super::{HeapError, PlacementPolicy, HEADER_SIZE};

/// A free block picked for a request, together with its list neighbours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    prev: Option<BlockRef>,
    block: BlockRef,
    size: usize,
    next: Option<BlockRef>,
}

/// Address-ordered singly linked list threaded through the free blocks'
/// headers.
///
/// Only the head lives here; every link is stored in the arena. A
/// `FreeList` is owned by the heap state behind the heap guard, so holding
/// `&self` or `&mut self` means no other thread is touching any header.
pub struct FreeList {
    head: Option<BlockRef>,
    policy: PlacementPolicy,
}

impl FreeList {
    pub const fn new(policy: PlacementPolicy) -> Self {
        Self { head: None, policy }
    }

    #[inline]
    pub fn policy(&self) -> PlacementPolicy {
        self.policy
    }

    /// Turns the whole arena into one free block with no successor.
    pub fn reset(&mut self, arena: &Arena) {
        self.store(arena, BlockRef::BASE, Header::free(arena.size(), None));
        self.head = Some(BlockRef::BASE);
    }

    fn load(&self, arena: &Arena, block: BlockRef) -> Result<Header, HeapError> {
        let offset = block.offset();
        if !arena.holds(block) {
            return Err(HeapError::Corrupt {
                offset,
                reason: "link points past the arena end",
            });
        }

        // SAFETY: the free list is only reachable through the heap guard
        let raw = unsafe { arena.read_header(block) };
        raw.decode().ok_or(HeapError::Corrupt {
            offset,
            reason: "unreadable block header",
        })
    }

    fn store(&mut self, arena: &Arena, block: BlockRef, header: Header) {
        // SAFETY: `&mut self` proves the heap guard is held
        unsafe { arena.write_header(block, header.into()) };
    }

    fn set_next(
        &mut self,
        arena: &Arena,
        prev: Option<BlockRef>,
        next: Option<BlockRef>,
    ) -> Result<(), HeapError> {
        match prev {
            None => self.head = next,
            Some(prev) => {
                let header = self.load(arena, prev)?;
                self.store(arena, prev, Header::free(header.size, next));
            }
        }
        Ok(())
    }

    // walks the list in address order and picks a block according to the policy
    fn find(&self, arena: &Arena, needed: usize) -> Result<Option<Candidate>, HeapError> {
        let mut prev = None;
        let mut current = self.head;
        let mut best: Option<Candidate> = None;

        while let Some(block) = current {
            let header = self.load(arena, block)?;
            if !header.is_free() {
                return Err(HeapError::Corrupt {
                    offset: block.offset(),
                    reason: "allocated block on the free list",
                });
            }

            if header.size >= needed {
                let candidate = Candidate {
                    prev,
                    block,
                    size: header.size,
                    next: header.next(),
                };

                match self.policy {
                    PlacementPolicy::FirstFit => return Ok(Some(candidate)),
                    PlacementPolicy::BestFit => {
                        if best.map_or(true, |best| candidate.size < best.size) {
                            best = Some(candidate);
                        }
                        // nothing can beat an exact fit
                        if candidate.size == needed {
                            break;
                        }
                    }
                }
            }

            prev = current;
            current = header.next();
        }

        Ok(best)
    }

    // takes `needed` bytes off the front of the candidate, the remainder keeps its list slot
    fn claim(
        &mut self,
        arena: &Arena,
        candidate: Candidate,
        needed: usize,
    ) -> Result<BlockRef, HeapError> {
        let replacement = if candidate.size == needed {
            candidate.next
        } else {
            let remainder = candidate.block.advance(needed);
            self.store(
                arena,
                remainder,
                Header::free(candidate.size - needed, candidate.next),
            );
            Some(remainder)
        };

        self.set_next(arena, candidate.prev, replacement)?;
        self.store(arena, candidate.block, Header::allocated(needed));

        Ok(candidate.block)
    }

    /// Carves a block with room for `requested` usable bytes.
    ///
    /// `Ok(None)` means no free block is large enough; the arena is left
    /// untouched in that case.
    pub fn allocate(
        &mut self,
        arena: &Arena,
        requested: usize,
    ) -> Result<Option<BlockRef>, HeapError> {
        let Some(needed) = block_size_for(requested) else {
            return Ok(None);
        };

        match self.find(arena, needed)? {
            Some(candidate) => self.claim(arena, candidate, needed).map(Some),
            None => Ok(None),
        }
    }

    /// Total size of the allocated block at `block`, rejecting anything
    /// that is not a live allocation.
    pub fn allocated_size(&self, arena: &Arena, block: BlockRef) -> Result<usize, HeapError> {
        let offset = block.offset();
        if !arena.holds(block) {
            return Err(HeapError::OutOfBounds {
                addr: arena.start() + offset,
            });
        }

        // SAFETY: the free list is only reachable through the heap guard
        let raw = unsafe { arena.read_header(block) };
        match raw.decode() {
            Some(Header {
                size,
                state: BlockState::Allocated,
            }) => {
                if size < HEADER_SIZE || size % HEADER_SIZE != 0 || size > arena.size() - offset {
                    return Err(HeapError::Corrupt {
                        offset,
                        reason: "allocated block has an impossible size",
                    });
                }
                Ok(size)
            }
            Some(_) => Err(HeapError::DoubleRelease { offset }),
            None => Err(HeapError::NotAllocated { offset }),
        }
    }

    /// Returns an allocated block to the list, keeping address order, and
    /// merges it with free neighbours on both sides.
    pub fn release(&mut self, arena: &Arena, block: BlockRef) -> Result<usize, HeapError> {
        let size = self.allocated_size(arena, block)?;

        match self.head {
            Some(head) if head < block => {
                // last free block below the released one
                let mut prev = head;
                loop {
                    match self.load(arena, prev)?.next() {
                        Some(next) if next < block => prev = next,
                        _ => break,
                    }
                }

                let prev_header = self.load(arena, prev)?;
                self.store(arena, block, Header::free(size, prev_header.next()));
                self.store(arena, prev, Header::free(prev_header.size, Some(block)));

                self.try_merge(arena, block)?;
                self.try_merge(arena, prev)?;
            }
            head => {
                self.store(arena, block, Header::free(size, head));
                self.head = Some(block);

                self.try_merge(arena, block)?;
            }
        }

        Ok(size)
    }

    /// Absorbs the list successor of `block` if it starts exactly where
    /// `block` ends.
    fn try_merge(&mut self, arena: &Arena, block: BlockRef) -> Result<bool, HeapError> {
        let header = self.load(arena, block)?;
        let Some(next) = header.next() else {
            return Ok(false);
        };

        if block.advance(header.size) != next {
            return Ok(false);
        }

        let next_header = self.load(arena, next)?;
        self.store(
            arena,
            block,
            Header::free(header.size + next_header.size, next_header.next()),
        );
        // SAFETY: the absorbed header now lies in free space owned by `block`
        unsafe { arena.write_header(next, RawHeader::scrubbed()) };

        Ok(true)
    }

    /// Every block of the arena in address order, walked header to header.
    pub fn walk_blocks(&self, arena: &Arena) -> Result<Vec<(BlockRef, Header)>, HeapError> {
        let mut blocks = Vec::new();
        let mut offset = 0;

        while offset < arena.size() {
            let block = BlockRef::from_offset(offset);
            let header = self.load(arena, block)?;

            if header.size == 0 || header.size % HEADER_SIZE != 0 {
                return Err(HeapError::Corrupt {
                    offset,
                    reason: "block size is not a positive multiple of the header size",
                });
            }
            if header.size > arena.size() - offset {
                return Err(HeapError::Corrupt {
                    offset,
                    reason: "block overruns the arena end",
                });
            }

            blocks.push((block, header));
            offset += header.size;
        }

        Ok(blocks)
    }

    /// Every free-list node in list order with its size.
    pub fn walk_free(&self, arena: &Arena) -> Result<Vec<(BlockRef, usize)>, HeapError> {
        let mut nodes = Vec::new();
        let mut last: Option<BlockRef> = None;
        let mut current = self.head;

        while let Some(block) = current {
            // strictly ascending also rules out cycles
            if last.is_some_and(|last| block <= last) {
                return Err(HeapError::Corrupt {
                    offset: block.offset(),
                    reason: "free list is not in ascending address order",
                });
            }

            let header = self.load(arena, block)?;
            if !header.is_free() {
                return Err(HeapError::Corrupt {
                    offset: block.offset(),
                    reason: "allocated block on the free list",
                });
            }

            nodes.push((block, header.size));
            last = Some(block);
            current = header.next();
        }

        Ok(nodes)
    }
}
