//! # Allocator Core
//!
//! [`Heap`] owns the segregated free-list index, the region registry, and a
//! [`RegionSource`] to grow from. It implements the first-fit
//! allocate-and-split algorithm and the three-way coalescing deallocator.
//!
//! ## Allocation
//!
//! A request is rounded up to the 8-byte grain, widened to the minimum free
//! block footprint, and classified. The search walks the request's class and
//! every larger one (the catch-all always included), returning the first
//! block that fits. An oversized block is split: it shrinks in place at the
//! left, keeping its address and usually its list position, and the
//! allocation is carved from its right edge. A remainder too small to ever
//! become a free block again is handed out whole instead.
//!
//! When no class yields a fit, one more region is acquired from the source.
//! If it lands directly after the previous region, the two fenceposts at the
//! junction are dissolved and the new interior is merged with whatever
//! borders the junction from the left; otherwise the region is registered on
//! its own. The search then restarts.
//!
//! ## Deallocation
//!
//! Freeing inspects both in-memory neighbors and merges with each one that
//! is free, so two free blocks never sit side by side. Fenceposts count as
//! busy here: region junctions are only dissolved by the growth path above.

use core::ptr::null_mut;

use crate::block::{
    ALLOC_HEADER_SIZE, BlockHeader, BlockState, UNALLOC_HEADER_SIZE, header_of, left_neighbor,
    right_neighbor, user_ptr,
};
use crate::free_list::FreeLists;
use crate::region::{self, ChunkRegistry, RegionSource};
use crate::{ARENA_SIZE, MIN_ALIGN, NUM_LISTS};

/// A failure detected while releasing memory.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeallocError {
    /// The block behind the pointer was already free.
    #[error("double free of pointer {addr:#x}")]
    DoubleFree {
        /// The user pointer passed to `deallocate`.
        addr: usize,
    },
}

/// Align `n` upwards to `align` (must be a power of two), saturating at the
/// top of the address space.
#[inline]
const fn align_up(n: usize, align: usize) -> usize {
    n.saturating_add(align - 1) & !(align - 1)
}

/// The block size needed to serve a request of `raw_size` bytes: header plus
/// rounded payload, but never less than the minimum free-block footprint, so
/// the block can always shrink back into a valid free block later.
#[inline]
const fn request_size(raw_size: usize) -> usize {
    let with_header = align_up(raw_size, MIN_ALIGN).saturating_add(ALLOC_HEADER_SIZE);
    if with_header < UNALLOC_HEADER_SIZE {
        UNALLOC_HEADER_SIZE
    } else {
        with_header
    }
}

/// The allocator engine.
///
/// # Invariants
/// - After [`init`](Self::init), the value must not move in memory: the
///   free-list sentinels are self-referential.
/// - All methods that touch blocks must run inside the owner's critical
///   section; the engine itself performs no locking.
pub struct Heap<S> {
    /// The monotonic growth primitive.
    source: S,
    /// Segregated free-list index.
    pub(crate) lists: FreeLists,
    /// Regions registered for verification.
    pub(crate) chunks: ChunkRegistry,
    /// Right fencepost of the most recently acquired region; used to detect
    /// physically contiguous growth.
    last_fencepost: *mut BlockHeader,
    /// Left fencepost of the first region (diagnostic base).
    pub(crate) base: *mut BlockHeader,
    /// Set by [`init`](Self::init).
    initialized: bool,
}

// Safety: the engine is only driven under the owner's lock; raw pointers are
// never accessed outside of it.
unsafe impl<S: Send> Send for Heap<S> {}

impl<S> Heap<S> {
    /// Construct an engine around `source` (heap not yet initialized).
    pub const fn new(source: S) -> Self {
        Self {
            source,
            lists: FreeLists::new(),
            chunks: ChunkRegistry::new(),
            last_fencepost: null_mut(),
            base: null_mut(),
            initialized: false,
        }
    }

    /// Indicates whether [`init`](Self::init) has run.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of independently registered regions.
    #[must_use]
    pub const fn region_count(&self) -> usize {
        self.chunks.len()
    }

    /// The growth primitive, e.g. to attach backing storage before `init`.
    pub const fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: RegionSource> Heap<S> {
    /// Acquire the first region and set up the free lists.
    ///
    /// # Panics
    /// Panics when the source cannot provide the initial region.
    ///
    /// # Safety
    /// - Must be called exactly once, before any allocation.
    /// - The heap must be at its final address and must not move afterwards.
    pub unsafe fn init(&mut self) {
        debug_assert!(!self.initialized);
        unsafe {
            self.lists.init();

            let interior = region::acquire(&mut self.source, ARENA_SIZE)
                .expect("failed to acquire the initial heap region");
            let left_fence = region::left_fencepost_of(interior);
            self.chunks.push(left_fence);
            self.last_fencepost = right_neighbor(interior);
            self.base = left_fence;
            self.lists.insert(interior);
        }
        self.initialized = true;
        log::debug!("heap initialized with one {ARENA_SIZE}-byte region");
    }

    /// Allocate at least `raw_size` bytes of 8-byte-aligned memory.
    ///
    /// Returns null when `raw_size` is zero or the source is exhausted.
    ///
    /// # Safety
    /// [`init`](Self::init) must have run, and the call must be serialized
    /// with every other use of this heap.
    pub unsafe fn allocate(&mut self, raw_size: usize) -> *mut u8 {
        debug_assert!(self.initialized);
        if raw_size == 0 {
            return null_mut();
        }
        let actual = request_size(raw_size);
        let start_class = FreeLists::class_of(actual);
        loop {
            let ptr = unsafe { self.search(start_class, actual) };
            if !ptr.is_null() {
                return ptr;
            }
            if !unsafe { self.grow() } {
                log::warn!("heap growth failed for a request of {raw_size} bytes");
                return null_mut();
            }
        }
    }

    /// First-fit walk over `start_class` and every larger class.
    unsafe fn search(&mut self, start_class: usize, actual: usize) -> *mut u8 {
        for class in start_class..NUM_LISTS {
            // The catch-all mixes heterogeneous sizes and is always walked.
            if class < NUM_LISTS - 1 && self.lists.is_empty(class) {
                continue;
            }
            let head = self.lists.sentinel(class);
            let mut candidate = unsafe { (*head).next };
            while candidate != head {
                if unsafe { (*candidate).size() } >= actual {
                    return unsafe { self.take(candidate, class, actual) };
                }
                candidate = unsafe { (*candidate).next };
            }
        }
        null_mut()
    }

    /// Serve `actual` bytes from the free block `block` of class `class`,
    /// splitting off the excess when it is large enough to live on its own.
    unsafe fn take(&mut self, block: *mut BlockHeader, class: usize, actual: usize) -> *mut u8 {
        unsafe {
            let size = (*block).size();
            debug_assert!(size >= actual);

            if size - actual < UNALLOC_HEADER_SIZE {
                // The remainder could not hold a free-block header; hand the
                // whole block out and accept the internal fragmentation.
                FreeLists::remove(block);
                (*block).set_state(BlockState::Allocated);
                return user_ptr(block);
            }

            // Shrink in place at the left: the block keeps its address, so
            // its list links stay valid while its class may change.
            let remainder = size - actual;
            (*block).set_size(remainder);

            let carved = right_neighbor(block);
            carved.write(BlockHeader::new(actual, BlockState::Allocated, remainder));
            (*right_neighbor(carved)).set_left_size(actual);

            if FreeLists::class_of(remainder) != class {
                self.lists.reclassify(block);
            }
            user_ptr(carved)
        }
    }

    /// Release the allocation behind `ptr`, coalescing with free neighbors.
    ///
    /// Null is accepted and ignored.
    ///
    /// # Errors
    /// Freeing an already-free block is reported as
    /// [`DeallocError::DoubleFree`] with the heap unmodified.
    ///
    /// # Safety
    /// `ptr` must be null or a pointer previously returned by
    /// [`allocate`](Self::allocate) on this heap, and the call must be
    /// serialized with every other use of this heap.
    pub unsafe fn deallocate(&mut self, ptr: *mut u8) -> Result<(), DeallocError> {
        if ptr.is_null() {
            return Ok(());
        }
        unsafe {
            let block = header_of(ptr);
            if (*block).state() == BlockState::Unallocated {
                return Err(DeallocError::DoubleFree { addr: ptr.addr() });
            }
            (*block).set_state(BlockState::Unallocated);

            let left = left_neighbor(block);
            let right = right_neighbor(block);
            let left_free = (*left).state() == BlockState::Unallocated;
            let right_free = (*right).state() == BlockState::Unallocated;

            if left_free && right_free {
                // Both sides merge into the left survivor.
                let merged = (*left).size() + (*block).size() + (*right).size();
                let old_class = FreeLists::class_of((*left).size());
                let beyond = right_neighbor(right);
                FreeLists::remove(right);
                (*left).set_size(merged);
                (*beyond).set_left_size(merged);
                if FreeLists::class_of(merged) != old_class {
                    self.lists.reclassify(left);
                }
            } else if left_free {
                let merged = (*left).size() + (*block).size();
                let old_class = FreeLists::class_of((*left).size());
                (*left).set_size(merged);
                (*right).set_left_size(merged);
                if FreeLists::class_of(merged) != old_class {
                    self.lists.reclassify(left);
                }
            } else if right_free {
                // The survivor keeps this block's address.
                let merged = (*block).size() + (*right).size();
                let beyond = right_neighbor(right);
                FreeLists::remove(right);
                (*block).set_size(merged);
                (*beyond).set_left_size(merged);
                self.lists.insert(block);
            } else {
                self.lists.insert(block);
            }
        }
        Ok(())
    }

    /// Acquire one more region and make its interior findable, either by
    /// merging across the junction with the previous region or by
    /// registering it on its own.
    ///
    /// Returns `false` when the source is exhausted.
    unsafe fn grow(&mut self) -> bool {
        let Some(interior) = (unsafe { region::acquire(&mut self.source, ARENA_SIZE) }) else {
            return false;
        };
        unsafe {
            let left_fence = region::left_fencepost_of(interior);
            let right_fence = right_neighbor(interior);
            // If the span directly before the new region is the previous
            // right fencepost, the two regions are physically contiguous.
            let junction = left_fence
                .cast::<u8>()
                .sub(ALLOC_HEADER_SIZE)
                .cast::<BlockHeader>();

            if junction == self.last_fencepost {
                // Dissolve the two fenceposts at the junction. What they and
                // the new interior become depends on the block bordering the
                // junction from the left.
                let bordering = left_neighbor(junction);
                let absorbed = (*interior).size() + 2 * ALLOC_HEADER_SIZE;
                if (*bordering).state() == BlockState::Unallocated {
                    let merged = (*bordering).size() + absorbed;
                    let old_class = FreeLists::class_of((*bordering).size());
                    (*bordering).set_size(merged);
                    (*right_fence).set_left_size(merged);
                    if FreeLists::class_of(merged) != old_class {
                        self.lists.reclassify(bordering);
                    }
                } else {
                    // Reuse the old right fencepost in place as the header
                    // of the span the junction turned into.
                    (*junction).set_size(absorbed);
                    (*junction).set_state(BlockState::Unallocated);
                    (*right_fence).set_left_size(absorbed);
                    self.lists.insert(junction);
                }
                log::trace!("stitched {ARENA_SIZE} contiguous bytes onto the previous region");
            } else {
                self.chunks.push(left_fence);
                self.lists.insert(interior);
                log::trace!("registered an independent {ARENA_SIZE}-byte region");
            }
            self.last_fencepost = right_fence;
        }
        true
    }
}
