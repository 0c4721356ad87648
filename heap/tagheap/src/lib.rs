//! # Boundary-Tag Heap Allocator
//!
//! A general-purpose heap allocator serving variable-size requests from
//! fixed-size regions obtained through a monotonic growth primitive. Blocks
//! carry their metadata in-band as boundary tags; freed blocks are indexed
//! by size class in segregated free lists and merged with free neighbors on
//! release.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            Entry Points ([`global`])                │
//! │    alloc / free / calloc / realloc / verify,        │
//! │    serialized by one process-wide SpinMutex         │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │            Allocator Engine ([`heap`])              │
//! │    first-fit search, split-from-the-left,           │
//! │    three-way coalescing, growth with stitching      │
//! └───────┬─────────────────────┬───────────────────────┘
//!         │                     │
//! ┌───────▼──────────┐ ┌────────▼────────────────────────┐
//! │ Free-List Index  │ │     Region Manager ([`region`]) │
//! │ (`free_list`)    │ │  fencepost installation,        │
//! │ 59 size classes, │ │  region registry, monotonic     │
//! │ circular lists   │ │  [`RegionSource`] growth        │
//! └──────────────────┘ └─────────────────────────────────┘
//! ```
//!
//! Everything rests on the block model of [`block`]: one header shape for
//! allocated blocks, free blocks, and the fenceposts that terminate each
//! region. The structural [`verify`](Heap::verify) walk and the logging
//! helpers in [`debug`] read the same structures.
//!
//! ## Concurrency
//!
//! The engine performs no locking itself; the public entry points in
//! [`global`] route every call through a single [`tagheap_sync::SpinMutex`].
//! There is no per-thread state.
//!
//! ## Limits
//!
//! Alignment is fixed at the natural word (8 bytes), regions are never
//! returned to the source, and `realloc` always moves. Double frees are
//! detected and fatal; other misuse of foreign pointers is undefined.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod block;
pub mod debug;
mod free_list;
pub mod global;
pub mod heap;
pub mod region;
mod verify;

pub use global::{alloc, calloc, free, realloc, verify};
pub use heap::{DeallocError, Heap};
pub use region::{BumpSource, RegionSource};
pub use verify::VerifyError;

/// Size in bytes of every region obtained from the growth source.
pub const ARENA_SIZE: usize = 4096;

/// Number of free-list size classes; the final class is the catch-all.
pub const NUM_LISTS: usize = 59;

/// Upper bound on the regions tracked for verification.
pub const MAX_NUM_CHUNKS: usize = 1024;

/// Allocation grain and guaranteed pointer alignment.
pub const MIN_ALIGN: usize = 8;

const _: () = assert!(NUM_LISTS >= 1);
const _: () = assert!(ARENA_SIZE % MIN_ALIGN == 0);
const _: () =
    assert!(ARENA_SIZE >= 2 * block::ALLOC_HEADER_SIZE + block::UNALLOC_HEADER_SIZE);
