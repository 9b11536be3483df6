use thiserror::Error;

/// Errors reported by [`Heap`](crate::Heap).
///
/// Running out of memory is not one of them: `allocate` answers that with
/// `None`. Everything here is either a rejected configuration or caller
/// misuse detected before it could damage the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("capacity {capacity} must be a non-zero multiple of the header size that fits the link field")]
    InvalidCapacity { capacity: usize },
    #[error("system allocator could not provide a {capacity}-byte arena")]
    ArenaUnavailable { capacity: usize },
    #[error("heap used before initialize")]
    Uninitialized,
    #[error("pointer {addr:#x} lies outside the arena")]
    OutOfBounds { addr: usize },
    #[error("offset {offset} is not on a block boundary")]
    Misaligned { offset: usize },
    #[error("block at offset {offset} is already free")]
    DoubleRelease { offset: usize },
    #[error("no allocated block header at offset {offset}")]
    NotAllocated { offset: usize },
    #[error("heap corrupted at offset {offset}: {reason}")]
    Corrupt { offset: usize, reason: &'static str },
}
