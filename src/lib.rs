//! # rsheap - a fixed-capacity heap over a single arena
//!
//! The heap owns one header-aligned byte region and never grows or shrinks
//! it. Blocks are laid out back to back from the arena base, each starting
//! with a 16-byte header:
//!
//! ```text
//!   ┌────────┬───────────────┬────────┬──────┬────────┬───────────────────┐
//!   │ header │  data (used)  │ header │ data │ header │    data (free)    │
//!   └────────┴───────────────┴────────┴──────┴────────┴───────────────────┘
//!   ▲                        ▲                ▲
//!   arena base               block            free list head
//! ```
//!
//! Free blocks are chained through their headers in ascending address
//! order. Allocation picks a block (first fit by default), splits off the
//! unused tail and hands out the data region; release links the block back
//! in and merges it with free neighbours on both sides.

mod arena;
mod block;
mod config;
mod diagnostics;
mod error;
mod free_list;
mod heap;
mod utils;

pub use arena::HeapRegion;
pub use config::{HeapConfig, PlacementPolicy};
pub use diagnostics::{BlockInfo, FreeBlockInfo, HeapSnapshot, HeapStats};
pub use error::HeapError;
pub use heap::Heap;
pub use utils::round_up;

/// Size of a block header and the alignment of every data region.
pub const HEADER_SIZE: usize = 16;

/// Default arena capacity.
pub const HEAP_SIZE: usize = 128 * 1024;
