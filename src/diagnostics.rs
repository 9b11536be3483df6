use super::arena::Arena;
use super::free_list::FreeList;
use super::{HeapError, HEADER_SIZE};
use std::collections::BTreeMap;
use std::fmt;

/// One block of the arena as seen by a header-to-header walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the header from the arena base.
    pub offset: usize,
    /// Total size including the header.
    pub size: usize,
    pub allocated: bool,
}

/// One node of the free list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlockInfo {
    pub offset: usize,
    pub size: usize,
}

/// Consistent picture of a heap taken under its guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapSnapshot {
    pub capacity: usize,
    /// Every block in address order.
    pub blocks: Vec<BlockInfo>,
    /// Free-list nodes in list order.
    pub free_list: Vec<FreeBlockInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub capacity: usize,
    pub allocated_blocks: usize,
    pub allocated_bytes: usize,
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub largest_free_block: usize,
}

impl HeapStats {
    /// Largest `allocate` request that can currently succeed.
    pub fn max_request(&self) -> Option<usize> {
        self.largest_free_block.checked_sub(HEADER_SIZE)
    }
}

impl HeapSnapshot {
    pub(crate) fn capture(free_list: &FreeList, arena: &Arena) -> Result<Self, HeapError> {
        let blocks = free_list
            .walk_blocks(arena)?
            .into_iter()
            .map(|(block, header)| BlockInfo {
                offset: block.offset(),
                size: header.size,
                allocated: !header.is_free(),
            })
            .collect();

        let free_list = free_list
            .walk_free(arena)?
            .into_iter()
            .map(|(block, size)| FreeBlockInfo {
                offset: block.offset(),
                size,
            })
            .collect();

        Ok(Self {
            capacity: arena.size(),
            blocks,
            free_list,
        })
    }

    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            capacity: self.capacity,
            ..HeapStats::default()
        };

        for block in &self.blocks {
            if block.allocated {
                stats.allocated_blocks += 1;
                stats.allocated_bytes += block.size;
            } else {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
                stats.largest_free_block = stats.largest_free_block.max(block.size);
            }
        }

        stats
    }

    /// Checks the structural invariants of the heap.
    ///
    /// The blocks must partition the arena exactly, the free list must hold
    /// exactly the free blocks in ascending address order, and no free
    /// block may be directly followed by another free block.
    pub fn verify(&self) -> Result<(), HeapError> {
        let mut expected_offset = 0;
        for block in &self.blocks {
            if block.offset != expected_offset {
                return Err(HeapError::Corrupt {
                    offset: expected_offset,
                    reason: "gap or overlap between blocks",
                });
            }
            expected_offset += block.size;
        }
        if expected_offset != self.capacity {
            return Err(HeapError::Corrupt {
                offset: expected_offset,
                reason: "blocks do not cover the arena",
            });
        }

        for pair in self.blocks.windows(2) {
            if !pair[0].allocated && !pair[1].allocated {
                return Err(HeapError::Corrupt {
                    offset: pair[1].offset,
                    reason: "adjacent free blocks were not coalesced",
                });
            }
        }

        let mut free: BTreeMap<usize, usize> = self
            .blocks
            .iter()
            .filter(|block| !block.allocated)
            .map(|block| (block.offset, block.size))
            .collect();

        let mut last = None;
        for node in &self.free_list {
            if last.is_some_and(|last| node.offset <= last) {
                return Err(HeapError::Corrupt {
                    offset: node.offset,
                    reason: "free list is not in ascending address order",
                });
            }
            last = Some(node.offset);

            if free.remove(&node.offset) != Some(node.size) {
                return Err(HeapError::Corrupt {
                    offset: node.offset,
                    reason: "free-list node is not a free block",
                });
            }
        }

        if let Some((&offset, _)) = free.iter().next() {
            return Err(HeapError::Corrupt {
                offset,
                reason: "free block missing from the free list",
            });
        }

        Ok(())
    }
}

impl fmt::Display for HeapSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "All blocks:")?;
        for block in &self.blocks {
            writeln!(
                f,
                "  Block starting at {}, size {} ({})",
                block.offset,
                block.size,
                if block.allocated { "allocated" } else { "free" }
            )?;
        }

        writeln!(f, "Current free block list:")?;
        for node in &self.free_list {
            writeln!(
                f,
                "  Free block starting at {}, size {}",
                node.offset, node.size
            )?;
        }

        Ok(())
    }
}
