use super::HEADER_SIZE;
use core::mem::size_of;

const TAG_FREE: u32 = 0xF4EE_B10C;
const TAG_ALLOCATED: u32 = 0xA110_CA7E;
const NIL: u32 = u32::MAX;

/// Largest arena, in header units, the 32-bit link field can address.
pub const MAX_UNITS: usize = NIL as usize;

/// Handle to a block: the index of its header in header-sized units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRef(u32);

impl BlockRef {
    pub const BASE: BlockRef = BlockRef(0);

    #[inline]
    pub fn from_offset(offset: usize) -> Self {
        debug_assert!(offset % HEADER_SIZE == 0);
        debug_assert!(offset / HEADER_SIZE < MAX_UNITS);
        BlockRef((offset / HEADER_SIZE) as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn offset(self) -> usize {
        self.index() * HEADER_SIZE
    }

    /// The block that starts right after a block of `size` bytes at `self`.
    #[inline]
    pub fn advance(self, size: usize) -> Self {
        Self::from_offset(self.offset() + size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Free { next: Option<BlockRef> },
    Allocated,
}

/// Decoded block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Total bytes including the header itself.
    pub size: usize,
    pub state: BlockState,
}

impl Header {
    pub fn free(size: usize, next: Option<BlockRef>) -> Self {
        Self {
            size,
            state: BlockState::Free { next },
        }
    }

    pub fn allocated(size: usize) -> Self {
        Self {
            size,
            state: BlockState::Allocated,
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        matches!(self.state, BlockState::Free { .. })
    }

    /// Free-list successor, `None` for allocated blocks and the list tail.
    #[inline]
    pub fn next(&self) -> Option<BlockRef> {
        match self.state {
            BlockState::Free { next } => next,
            BlockState::Allocated => None,
        }
    }
}

/// In-arena representation of a [`Header`].
///
/// The tag word says which variant the link belongs to; headers with any
/// other tag were never written by the allocator (or were absorbed by a
/// merge) and decode to `None`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    size: u64,
    next: u32,
    tag: u32,
}

const _: () = assert!(size_of::<RawHeader>() == HEADER_SIZE);

impl RawHeader {
    /// Header left behind in place of a block swallowed by its predecessor.
    pub fn scrubbed() -> Self {
        Self {
            size: 0,
            next: NIL,
            tag: 0,
        }
    }

    pub fn decode(self) -> Option<Header> {
        let size = usize::try_from(self.size).ok()?;
        let state = match self.tag {
            TAG_FREE => BlockState::Free {
                next: (self.next != NIL).then_some(BlockRef(self.next)),
            },
            TAG_ALLOCATED => BlockState::Allocated,
            _ => return None,
        };
        Some(Header { size, state })
    }
}

impl From<Header> for RawHeader {
    fn from(header: Header) -> Self {
        let (next, tag) = match header.state {
            BlockState::Free { next } => (next.map_or(NIL, |block| block.0), TAG_FREE),
            BlockState::Allocated => (NIL, TAG_ALLOCATED),
        };
        Self {
            size: header.size as u64,
            next,
            tag,
        }
    }
}
